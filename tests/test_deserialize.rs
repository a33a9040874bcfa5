use pretty_assertions::assert_eq;
use qs_codec::{
    decode, decode_str, Charset, DecodeKind, DecodeOptions, Duplicates, Error, Map, Value,
};
use regex::Regex;
use serde_json::json;

fn qs(input: &str, options: &DecodeOptions) -> serde_json::Value {
    let decoded = decode_str(input, options).expect("decode");
    serde_json::to_value(decoded).expect("json")
}

fn default() -> DecodeOptions {
    DecodeOptions::new()
}

#[test]
fn deserialize_simple() {
    assert_eq!(qs("a=b", &default()), json!({"a": "b"}));
    assert_eq!(qs("a=b&c=d", &default()), json!({"a": "b", "c": "d"}));
    assert_eq!(qs("a[b]=c", &default()), json!({"a": {"b": "c"}}));
    assert_eq!(qs("a=", &default()), json!({"a": ""}));
    assert_eq!(qs("a", &default()), json!({"a": ""}));
    assert_eq!(qs("", &default()), json!({}));
    assert_eq!(qs("=b&&=", &default()), json!({}));
}

#[test]
fn deserialize_empty_inputs() {
    assert!(decode(Value::Null, &default()).unwrap().is_empty());
    assert!(decode(Value::Undefined, &default()).unwrap().is_empty());
    assert!(decode(Value::Object(Map::new()), &default()).unwrap().is_empty());
    assert!(matches!(
        decode(Value::Int(1), &default()),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn deserialize_lists() {
    assert_eq!(qs("a[]=b&a[]=c", &default()), json!({"a": ["b", "c"]}));
    assert_eq!(qs("a[1]=c&a[0]=b", &default()), json!({"a": ["b", "c"]}));
    assert_eq!(qs("a[10]=1&a[2]=2", &default()), json!({"a": ["2", "1"]}));
    assert_eq!(qs("a[20]=a", &default()), json!({"a": ["a"]}));
    assert_eq!(qs("a[21]=a", &default()), json!({"a": {"21": "a"}}));
    assert_eq!(qs("a[01]=a", &default()), json!({"a": {"01": "a"}}));
    assert_eq!(qs("a[-1]=a", &default()), json!({"a": {"-1": "a"}}));
    assert_eq!(qs("[]=&a=b", &default()), json!({"0": "", "a": "b"}));
}

#[test]
fn deserialize_mixed_lists_and_maps() {
    assert_eq!(
        qs("foo[0]=bar&foo[bad]=baz", &default()),
        json!({"foo": {"0": "bar", "bad": "baz"}})
    );
    assert_eq!(
        qs("foo[bad]=baz&foo[0]=bar", &default()),
        json!({"foo": {"bad": "baz", "0": "bar"}})
    );
    assert_eq!(
        qs("a[0][b]=c&a[1][d]=e", &default()),
        json!({"a": [{"b": "c"}, {"d": "e"}]})
    );
    assert_eq!(qs("a=b&a[c]=d", &default()), json!({"a": ["b", {"c": "d"}]}));
    assert_eq!(
        qs("a[b]=c&a=d", &default()),
        json!({"a": {"b": "c", "d": true}})
    );
}

#[test]
fn deserialize_list_options() {
    assert_eq!(
        qs("a[0]=b", &default().list_limit(-1)),
        json!({"a": {"0": "b"}})
    );
    assert_eq!(
        qs("a[]=b", &default().parse_lists(false)),
        json!({"a": {"0": "b"}})
    );
    assert_eq!(
        qs("a[]=&b=c", &default().allow_empty_lists(true)),
        json!({"a": [], "b": "c"})
    );
    assert_eq!(
        qs("a[1]=b&a[3]=c", &default().allow_sparse_lists(true)),
        json!({"a": [null, "b", null, "c"]})
    );
}

#[test]
fn deserialize_many_keys_disable_lists() {
    assert_eq!(
        qs("a[0]=b&c=d", &default().list_limit(1)),
        json!({"a": {"0": "b"}, "c": "d"})
    );
}

#[test]
fn deserialize_list_overflow() {
    assert_eq!(
        qs("a[]=b&a[]=c&a[]=d", &default().list_limit(2)),
        json!({"a": {"0": "b", "1": "c", "2": "d"}})
    );
    assert_eq!(
        decode_str(
            "a[]=1&a[]=2&a[]=3&a[]=4",
            &default().list_limit(3).throw_on_limit_exceeded(true)
        ),
        Err(Error::LimitExceeded(
            "List limit exceeded. Only 3 elements allowed in a list.".to_owned()
        ))
    );
}

#[test]
fn deserialize_duplicates() {
    assert_eq!(
        qs("foo=bar&foo=baz", &default()),
        json!({"foo": ["bar", "baz"]})
    );
    assert_eq!(
        qs("foo=bar&foo=baz", &default().duplicates(Duplicates::First)),
        json!({"foo": "bar"})
    );
    assert_eq!(
        qs("foo=bar&foo=baz", &default().duplicates(Duplicates::Last)),
        json!({"foo": "baz"})
    );
}

#[test]
fn deserialize_depth() {
    assert_eq!(
        qs("a[b][c][d][e][f][g][h]=i", &default()),
        json!({"a": {"b": {"c": {"d": {"e": {"f": {"[g][h]": "i"}}}}}}})
    );
    assert_eq!(
        qs("a[b][c][d][e][f][g][h]=i", &default().depth(1)),
        json!({"a": {"b": {"[c][d][e][f][g][h]": "i"}}})
    );
    assert_eq!(
        qs("a[b][c]=d", &default().depth(0)),
        json!({"a[b][c]": "d"})
    );
    assert_eq!(
        decode_str("a[b][c][d]=e", &default().depth(2).strict_depth(true)),
        Err(Error::LimitExceeded(
            "Input depth exceeded depth option of 2 and strictDepth is true".to_owned()
        ))
    );
    assert_eq!(
        qs("a[b][c=d", &default().strict_depth(true)),
        json!({"a": {"b": {"[c": "d"}}})
    );
}

#[test]
fn deserialize_brackets_edge_cases() {
    assert_eq!(qs("[foo]=bar", &default()), json!({"foo": "bar"}));
    assert_eq!(qs("a%5Bb%5D=c", &default()), json!({"a": {"b": "c"}}));
    assert_eq!(qs("a%5bb%5d=c", &default()), json!({"a": {"b": "c"}}));
    assert_eq!(
        qs("a[b[c]]=d", &default()),
        json!({"a": {"b[c]": "d"}})
    );
}

#[test]
fn deserialize_query_prefix() {
    assert_eq!(qs("?foo=bar", &default()), json!({"?foo": "bar"}));
    assert_eq!(
        qs("?foo=bar", &default().ignore_query_prefix(true)),
        json!({"foo": "bar"})
    );
}

#[test]
fn deserialize_percent_decoding() {
    assert_eq!(qs("foo=%:%}", &default()), json!({"foo": "%:%}"}));
    assert_eq!(qs("a=b+c", &default()), json!({"a": "b c"}));
    assert_eq!(qs("a=%E2%82%AC", &default()), json!({"a": "€"}));
    assert_eq!(qs("a%20b=c", &default()), json!({"a b": "c"}));
}

#[test]
fn deserialize_delimiters() {
    assert_eq!(
        qs("a=b;c=d", &default().delimiter(";")),
        json!({"a": "b", "c": "d"})
    );
    let re = Regex::new("[;,] *").unwrap();
    assert_eq!(
        qs("a=b; c=d,e=f", &default().delimiter(re)),
        json!({"a": "b", "c": "d", "e": "f"})
    );
    assert!(matches!(
        decode_str("a=b", &default().delimiter("")),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn deserialize_parameter_limit() {
    assert_eq!(
        qs("a=b&c=d&e=f", &default().parameter_limit(2)),
        json!({"a": "b", "c": "d"})
    );
    assert_eq!(
        decode_str(
            "a=b&c=d",
            &default().parameter_limit(1).throw_on_limit_exceeded(true)
        ),
        Err(Error::LimitExceeded(
            "Parameter limit exceeded. Only 1 parameter allowed.".to_owned()
        ))
    );
    assert_eq!(
        qs("a=b&c=d", &default().parameter_limit(usize::MAX)),
        json!({"a": "b", "c": "d"})
    );
    assert!(matches!(
        decode_str("a=b", &default().parameter_limit(0)),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn deserialize_comma() {
    let comma = default().comma(true);
    assert_eq!(qs("a=b,c", &comma), json!({"a": ["b", "c"]}));
    assert_eq!(qs("a=b", &comma), json!({"a": "b"}));
    assert_eq!(qs("a[]=b,c", &comma), json!({"a": [["b", "c"]]}));
    assert_eq!(qs("a=b%2Cc", &comma), json!({"a": "b,c"}));
    assert_eq!(
        decode_str(
            "a=b,c,d,e,f",
            &comma.list_limit(3).throw_on_limit_exceeded(true)
        ),
        Err(Error::LimitExceeded(
            "List limit exceeded. Only 3 elements allowed in a list.".to_owned()
        ))
    );
}

#[test]
fn deserialize_strict_null_handling() {
    assert_eq!(
        qs("a&b=", &default().strict_null_handling(true)),
        json!({"a": null, "b": ""})
    );
    assert_eq!(
        qs("a[]", &default().strict_null_handling(true).allow_empty_lists(true)),
        json!({"a": []})
    );
}

#[test]
fn deserialize_dots() {
    let dots = default().allow_dots(true);
    assert_eq!(qs("a.b=c", &dots), json!({"a": {"b": "c"}}));
    assert_eq!(qs("a.b=c", &default()), json!({"a.b": "c"}));
    assert_eq!(qs("a.b.c=d", &dots.clone().depth(1)), json!({"a": {"b": {"[c]": "d"}}}));
    assert_eq!(qs("a[b].c=d", &dots), json!({"a": {"b": {"c": "d"}}}));
    assert_eq!(qs("a.[b]=c", &dots), json!({"a": {"b": "c"}}));
    assert_eq!(qs("a.=b", &dots), json!({"a.": "b"}));
}

#[test]
fn deserialize_encoded_dots_in_keys() {
    assert_eq!(qs("a%2Eb=c", &default()), json!({"a.b": "c"}));
    assert_eq!(
        qs("a%2eb.c=d", &default().allow_dots(true)),
        json!({"a%2eb": {"c": "d"}})
    );
    assert_eq!(
        qs("name%252Eobj.first=John", &default().allow_dots(true)),
        json!({"name%2Eobj": {"first": "John"}})
    );
    assert_eq!(
        qs("name%252Eobj.first=John", &default().decode_dot_in_keys(true)),
        json!({"name.obj": {"first": "John"}})
    );
    assert_eq!(qs("a[%2E]=x", &default()), json!({"a": {"%2E": "x"}}));
    assert_eq!(
        qs("a[%2E]=x", &default().allow_dots(true).decode_dot_in_keys(true)),
        json!({"a": {".": "x"}})
    );
    assert!(matches!(
        decode_str("a=b", &default().allow_dots(false).decode_dot_in_keys(true)),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn deserialize_charsets() {
    let iso = default().charset(Charset::Iso88591);
    assert_eq!(qs("%A2=%BD", &iso), json!({"¢": "½"}));
    assert_eq!(qs("a=%C3%B8", &default()), json!({"a": "ø"}));

    let sentinel = default().charset_sentinel(true);
    assert_eq!(
        qs("utf8=%26%2310003%3B&a=%F8", &sentinel),
        json!({"a": "ø"})
    );
    assert_eq!(
        qs(
            "utf8=%E2%9C%93&a=%C3%B8",
            &sentinel.clone().charset(Charset::Iso88591)
        ),
        json!({"a": "ø"})
    );
    // unknown sentinel values are skipped without changing the charset
    assert_eq!(qs("utf8=foo&a=%C3%B8", &sentinel), json!({"a": "ø"}));
}

#[test]
fn deserialize_numeric_entities() {
    let options = default()
        .charset(Charset::Iso88591)
        .interpret_numeric_entities(true);
    assert_eq!(qs("a=%26%239786%3B", &options), json!({"a": "☺"}));
    assert_eq!(
        qs("a=%26%239786%3B", &default().charset(Charset::Iso88591)),
        json!({"a": "&#9786;"})
    );
    assert_eq!(
        qs("a=%26%239786%3B", &default().interpret_numeric_entities(true)),
        json!({"a": "&#9786;"})
    );
}

#[test]
fn deserialize_custom_decoder() {
    let options = default().decoder(|s, _, kind| match kind {
        DecodeKind::Key => Some(s.to_owned()),
        DecodeKind::Value => Some(s.replace("%20", "_")),
    });
    assert_eq!(qs("a%20b=c%20d", &options), json!({"a%20b": "c_d"}));
}

#[test]
fn deserialize_map_input() {
    let input = Map::from_iter([("a[b]", "c"), ("d.e", "f%20g")]);
    let decoded = decode(Value::Object(input), &default().allow_dots(true)).unwrap();
    assert_eq!(
        serde_json::to_value(decoded).unwrap(),
        json!({"a": {"b": "c"}, "d": {"e": "f%20g"}})
    );

    let comma = Map::from_iter([("a", "b,c")]);
    let decoded = decode(Value::Object(comma), &default().comma(true)).unwrap();
    assert_eq!(
        serde_json::to_value(decoded).unwrap(),
        json!({"a": ["b", "c"]})
    );
}

#[test]
fn deserialize_positional_merge() {
    assert_eq!(
        qs("a[0]=b&a[1][c]=d&a[1][e]=f", &default()),
        json!({"a": ["b", {"c": "d", "e": "f"}]})
    );
    assert_eq!(
        qs("a[0][0]=x&a[0][1]=y", &default()),
        json!({"a": [["x", "y"]]})
    );
    assert_eq!(
        qs("a[1][c]=d&a[0]=b&a[1][e]=f", &default()),
        json!({"a": ["b", {"c": "d", "e": "f"}]})
    );
    // a scalar already at the index is kept and the map is appended
    assert_eq!(
        qs("a[1]=b&a[1][c]=d", &default()),
        json!({"a": ["b", {"c": "d"}]})
    );
}

/// Takes a nested value apart one level at a time, so comparing and
/// dropping it stays shallow.
fn unwind(mut value: Value, key: &str) -> (usize, Value) {
    let mut depth = 0;
    loop {
        match value {
            Value::Object(mut map) => match map.remove(key) {
                Some(child) => {
                    depth += 1;
                    value = child;
                }
                None => return (depth, Value::Object(map)),
            },
            other => return (depth, other),
        }
    }
}

#[test]
fn deserialize_deep_nesting() {
    let path = "[p]".repeat(5000);
    let input = format!("foo{path}[x]=1&foo{path}[y]=2");
    let mut decoded = decode_str(&input, &default().depth(5010)).expect("decode");

    let foo = decoded.remove("foo").expect("foo");
    assert!(decoded.is_empty());
    let (depth, leaf) = unwind(foo, "p");
    assert_eq!(depth, 5000);
    assert_eq!(leaf, Value::Object(Map::from_iter([("x", "1"), ("y", "2")])));
}
