//! Encoding [`Value`] trees into querystrings.

mod encode;

use std::borrow::Cow;

use encode::{Frame, Walker};

use crate::config::{EncodeOptions, Filter, Sentinel};
use crate::error::Result;
use crate::Value;

/// Encodes a map (or a list, keyed by index) into a querystring.
///
/// Any other value, and an empty map or list, encodes to an empty string.
///
/// ```
/// use qs_codec::{encode, EncodeOptions, Map, Value};
///
/// let mut inner = Map::new();
/// inner.insert("b", "c");
/// let mut map = Map::new();
/// map.insert("a", Value::Object(inner));
///
/// let options = EncodeOptions::new().encode(false);
/// assert_eq!(encode(&Value::Object(map), &options).unwrap(), "a[b]=c");
/// ```
///
/// ## Errors
///
/// Returns [`Error::CyclicReference`](crate::Error::CyclicReference) if a
/// [`SharedValue`](crate::SharedValue) contains itself.
pub fn encode(data: &Value, options: &EncodeOptions) -> Result<String> {
    if let Value::Shared(shared) = data {
        return encode(&shared.borrow(), options);
    }

    let mut root: Cow<'_, Value> = match data {
        Value::Object(_) | Value::Array(_) => Cow::Borrowed(data),
        _ => return Ok(String::new()),
    };

    let mut keys: Option<Vec<String>> = None;
    match &options.filter {
        Some(Filter::Function(filter)) => {
            let filtered = filter("", &root);
            if matches!(filtered, Value::Object(_) | Value::Array(_)) {
                root = Cow::Owned(filtered);
            }
        }
        Some(Filter::Keys(filter)) => keys = Some(filter.clone()),
        None => {}
    }

    let mut keys = match (keys, root.as_ref()) {
        (_, Value::Object(map)) if map.is_empty() => return Ok(String::new()),
        (_, Value::Array(items)) if items.is_empty() => return Ok(String::new()),
        (Some(keys), _) => keys,
        (None, Value::Object(map)) => map.keys().cloned().collect(),
        (None, Value::Array(items)) => (0..items.len()).map(|i| i.to_string()).collect(),
        (None, _) => return Ok(String::new()),
    };
    if let Some(sort) = &options.sort {
        keys.sort_by(|a, b| sort(a, b));
    }

    tracing::debug!(keys = keys.len(), "encoding root keys");

    let mut walker = Walker::new(options);
    for key in &keys {
        let value = root_child(&root, key);
        if options.skip_nulls && value.is_none_or(Value::is_null) {
            continue;
        }
        walker.walk(Frame::root(
            value.unwrap_or(&Value::Null),
            key,
            value.is_some(),
            options.encode,
        ))?;
    }

    let joined = walker.pairs.join(&options.delimiter);
    tracing::debug!(pairs = walker.pairs.len(), "encoded querystring");

    let mut out = String::with_capacity(joined.len() + 24);
    if options.add_query_prefix {
        out.push('?');
    }
    if options.charset_sentinel {
        out.push_str(Sentinel::for_charset(options.charset).encoded());
        if !joined.is_empty() {
            out.push_str(&options.delimiter);
        }
    }
    out.push_str(&joined);
    Ok(out)
}

/// Looks up a root key. Lists are keyed by their indices.
fn root_child<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    match root {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
