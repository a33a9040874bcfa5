use qs_codec::{
    decode_str, encode, Charset, DecodeOptions, EncodeOptions, ListFormat, Map, Value,
};
use serde_json::json;

/// macro for testing that encoding and then decoding gives the data back
///
/// The encoded string is snapshotted inline so that format changes show
/// up in review.
macro_rules! roundtrip_test {
    (
        $data:expr, ($encode:expr, $decode:expr), @$snapshot:literal
    ) => {
        let data: serde_json::Value = $data;
        let value: Value = serde_json::from_value(data.clone()).expect("valid value");

        let encoded = encode(&value, &$encode).expect("encode");
        insta::assert_snapshot!(encoded, @$snapshot);

        let decoded = decode_str(&encoded, &$decode).expect("decode");
        let decoded = serde_json::to_value(&decoded).expect("json");

        // check we get the same data back
        pretty_assertions::assert_eq!(data, decoded);
    };
    (
        $data:expr, @$snapshot:literal
    ) => {
        roundtrip_test!($data, (EncodeOptions::new(), DecodeOptions::new()), @$snapshot)
    };
}

#[test]
fn flat_map() {
    roundtrip_test!(json!({"a": "1", "b": "2"}), @"a=1&b=2");
}

#[test]
fn nested_maps() {
    roundtrip_test!(json!({"a": {"b": {"c": "d"}}}), @"a%5Bb%5D%5Bc%5D=d");
}

#[test]
fn list_with_indices() {
    roundtrip_test!(json!({"a": ["b", "c"]}), @"a%5B0%5D=b&a%5B1%5D=c");
}

#[test]
fn list_with_brackets() {
    roundtrip_test!(
        json!({"a": ["b", "c"]}),
        (
            EncodeOptions::new().list_format(ListFormat::Brackets),
            DecodeOptions::new()
        ),
        @"a%5B%5D=b&a%5B%5D=c"
    );
}

#[test]
fn list_with_repeated_keys() {
    roundtrip_test!(
        json!({"a": ["b", "c"]}),
        (
            EncodeOptions::new().list_format(ListFormat::Repeat),
            DecodeOptions::new()
        ),
        @"a=b&a=c"
    );
}

#[test]
fn comma_list() {
    roundtrip_test!(
        json!({"a": ["b", "c"]}),
        (
            EncodeOptions::new()
                .list_format(ListFormat::Comma)
                .encode_values_only(true),
            DecodeOptions::new().comma(true)
        ),
        @"a=b,c"
    );
}

#[test]
fn single_element_comma_list() {
    roundtrip_test!(
        json!({"a": ["b"]}),
        (
            EncodeOptions::new()
                .list_format(ListFormat::Comma)
                .comma_round_trip(true),
            DecodeOptions::new().comma(true)
        ),
        @"a%5B%5D=b"
    );
}

#[test]
fn list_of_maps() {
    roundtrip_test!(
        json!({"a": [{"b": "c"}, {"d": "e"}]}),
        @"a%5B0%5D%5Bb%5D=c&a%5B1%5D%5Bd%5D=e"
    );
}

#[test]
fn list_of_scalars_and_maps() {
    roundtrip_test!(
        json!({"a": ["b", {"c": "d", "e": "f"}]}),
        @"a%5B0%5D=b&a%5B1%5D%5Bc%5D=d&a%5B1%5D%5Be%5D=f"
    );
}

#[test]
fn nested_lists() {
    roundtrip_test!(
        json!({"a": [["b", "c"], ["d"]]}),
        (
            EncodeOptions::new().encode(false),
            DecodeOptions::new()
        ),
        @"a[0][0]=b&a[0][1]=c&a[1][0]=d"
    );
}

#[test]
fn dot_notation() {
    roundtrip_test!(
        json!({"a": {"b": "c"}}),
        (
            EncodeOptions::new().allow_dots(true),
            DecodeOptions::new().allow_dots(true)
        ),
        @"a.b=c"
    );
}

#[test]
fn dots_inside_keys() {
    roundtrip_test!(
        json!({"name.obj": {"first": "John", "last": "Doe"}}),
        (
            EncodeOptions::new().encode_dot_in_keys(true),
            DecodeOptions::new().decode_dot_in_keys(true)
        ),
        @"name%252Eobj.first=John&name%252Eobj.last=Doe"
    );
}

#[test]
fn unicode_values() {
    roundtrip_test!(json!({"a": "€ ☺"}), @"a=%E2%82%AC%20%E2%98%BA");
}

#[test]
fn reserved_characters() {
    roundtrip_test!(
        json!({"a&b": "100%", "c=d": "e+f"}),
        @"a%26b=100%25&c%3Dd=e%2Bf"
    );
}

#[test]
fn latin1_values() {
    roundtrip_test!(
        json!({"a": "æ"}),
        (
            EncodeOptions::new().charset(Charset::Iso88591),
            DecodeOptions::new().charset(Charset::Iso88591)
        ),
        @"a=%E6"
    );
}

#[test]
fn charset_sentinel() {
    roundtrip_test!(
        json!({"a": "æ"}),
        (
            EncodeOptions::new().charset_sentinel(true),
            DecodeOptions::new()
                .charset(Charset::Iso88591)
                .charset_sentinel(true)
        ),
        @"utf8=%E2%9C%93&a=%C3%A6"
    );
}

#[test]
fn strict_nulls() {
    roundtrip_test!(
        json!({"a": null, "b": ""}),
        (
            EncodeOptions::new().strict_null_handling(true),
            DecodeOptions::new().strict_null_handling(true)
        ),
        @"a&b="
    );
}

#[test]
fn empty_lists() {
    roundtrip_test!(
        json!({"a": [], "b": "c"}),
        (
            EncodeOptions::new().allow_empty_lists(true).encode_values_only(true),
            DecodeOptions::new().allow_empty_lists(true)
        ),
        @"a[]&b=c"
    );
}

#[test]
fn deep_nesting() {
    roundtrip_test!(
        json!({"a": {"b": [{"c": {"d": ["e", "f"]}}]}}),
        (
            EncodeOptions::new().encode(false),
            DecodeOptions::new()
        ),
        @"a[b][0][c][d][0]=e&a[b][0][c][d][1]=f"
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
fn very_deep_nesting() {
    let value = (0..5000).fold(Value::from("x"), |inner, _| {
        Value::Object(Map::from_iter([("p", inner)]))
    });

    let encoded = encode(&value, &EncodeOptions::new().encode(false)).expect("encode");
    assert_eq!(encoded, format!("p{}=x", "[p]".repeat(4999)));

    let decoded = decode_str(&encoded, &DecodeOptions::new().depth(5000)).expect("decode");
    let (depth, leaf) = unwind(Value::Object(decoded), "p");
    assert_eq!(depth, 5000);
    assert_eq!(leaf, Value::from("x"));

    let (depth, _) = unwind(value, "p");
    assert_eq!(depth, 5000);
}
