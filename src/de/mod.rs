//! Decoding querystrings into [`Value`] trees.
//!
//! ### An overview of the design
//!
//! Decoding runs in two passes. The first, [`parse_query_string_values`],
//! splits the raw string into parameters and percent-decodes each of them
//! into a flat `key -> value` map. Nothing is nested yet: `a[b]=1` is
//! stored under the literal key `"a[b]"`. Repeated keys are resolved here
//! according to [`Duplicates`].
//!
//! The second pass hands every flat key to the `parse` module, which splits
//! it into segments and wraps the value in one map or list per segment.
//! Those fragments are then merged into the output one at a time, and any
//! holes left behind by sparse indices are compacted away at the end.
//!
//! Keeping the passes separate means parameters can arrive in any order:
//! `a[1]=c&a[0]=b` and `a[0]=b&a[1]=c` both decode to `{a: [b, c]}`.

use std::borrow::Cow;

use crate::config::{Charset, DecodeKind, DecodeOptions, Delimiter, Duplicates, Sentinel};
use crate::error::{Error, Result};
use crate::map::Map;
use crate::utils;
use crate::Value;

mod parse;

/// Decodes a querystring, or an already split map of flat keys, into a
/// nested [`Map`].
///
/// `Null`, `Undefined` and empty input decode to an empty map. Map input
/// is used as the flat key/value map directly: its keys are parsed for
/// brackets and dots, but nothing is percent-decoded.
///
/// ```
/// use qs_codec::{decode, DecodeOptions, Map, Value};
///
/// let decoded = decode("a[b]=c&a[d][]=e", &DecodeOptions::new()).unwrap();
/// assert_eq!(
///     decoded.get("a").and_then(|a| a.get("d")),
///     Some(&Value::from(vec!["e"]))
/// );
/// ```
pub fn decode(input: impl Into<Value>, options: &DecodeOptions) -> Result<Map> {
    options.validate()?;

    let (flat, values_parsed) = match input.into() {
        Value::Null | Value::Undefined => return Ok(Map::new()),
        Value::String(s) if s.is_empty() => return Ok(Map::new()),
        Value::String(s) => (parse_query_string_values(&s, options)?, true),
        Value::Object(map) => (map, false),
        Value::Shared(shared) => return decode(shared.borrow().clone(), options),
        other => {
            return Err(Error::InvalidArgument(format!(
                "the input must be a string or a map, got {other:?}"
            )));
        }
    };

    let options: Cow<'_, DecodeOptions> =
        if options.parse_lists && options.list_limit > 0 && flat.len() > options.list_limit as usize {
            tracing::debug!(
                keys = flat.len(),
                list_limit = options.list_limit,
                "too many keys, disabling list parsing"
            );
            Cow::Owned(options.clone().parse_lists(false))
        } else {
            Cow::Borrowed(options)
        };

    let mut obj = Map::new();
    for (key, value) in flat {
        let parsed = parse::parse_keys(&key, value, &options, values_parsed)?;

        if obj.is_empty() {
            if let Value::Object(map) = parsed {
                obj = map;
                continue;
            }
        }

        obj = utils::merge_into_map(obj, parsed, &options);
    }

    utils::compact(&mut obj, options.allow_sparse_lists);
    tracing::debug!(keys = obj.len(), "decoded querystring");
    Ok(obj)
}

/// Decodes a querystring into a nested [`Map`].
///
/// Shorthand for [`decode`] with a `&str`.
pub fn decode_str(input: &str, options: &DecodeOptions) -> Result<Map> {
    decode(input, options)
}

/// Splits `input` into a flat, percent-decoded `key -> value` map.
pub(crate) fn parse_query_string_values(input: &str, options: &DecodeOptions) -> Result<Map> {
    let input = if options.ignore_query_prefix {
        input.strip_prefix('?').unwrap_or(input)
    } else {
        input
    };

    let input: Cow<'_, str> = if input.contains('%') {
        Cow::Owned(replace_encoded_brackets(input))
    } else {
        Cow::Borrowed(input)
    };

    let limit = (options.parameter_limit != usize::MAX).then_some(options.parameter_limit);
    // one extra part tells a truncated input from one that fits exactly
    let take = limit.map_or(usize::MAX, |limit| limit.saturating_add(1));

    let mut parts: Vec<&str> = match &options.delimiter {
        Delimiter::Str(delimiter) => input
            .split(delimiter.as_ref())
            .filter(|part| !part.is_empty())
            .take(take)
            .collect(),
        Delimiter::Regex(re) => re
            .split(&input)
            .filter(|part| !part.is_empty())
            .take(take)
            .collect(),
    };

    if let Some(limit) = limit {
        if parts.len() > limit {
            if options.throw_on_limit_exceeded {
                return Err(Error::parameter_limit(limit));
            }
            tracing::debug!(limit, "parameter limit reached, ignoring the rest of the input");
            parts.truncate(limit);
        }
    }
    tracing::debug!(parts = parts.len(), "split querystring");

    let mut charset = options.charset;
    let mut skip_index = None;
    if options.charset_sentinel {
        let prefix = format!("{}=", Sentinel::PARAM_NAME);
        if let Some(i) = parts.iter().position(|part| part.starts_with(&prefix)) {
            if parts[i] == Sentinel::Charset.encoded() {
                charset = Charset::Utf8;
            } else if parts[i] == Sentinel::Iso.encoded() {
                charset = Charset::Iso88591;
            }
            tracing::debug!(?charset, "charset sentinel found");
            skip_index = Some(i);
        }
    }

    let mut obj = Map::new();
    for (i, part) in parts.iter().enumerate() {
        if Some(i) == skip_index {
            continue;
        }

        let pos = match part.find("]=") {
            Some(bracket_equals) => Some(bracket_equals + 1),
            None => part.find('='),
        };

        let (key, mut value) = match pos {
            None => {
                let key = decode_component(part, charset, DecodeKind::Key, options);
                let value = if options.strict_null_handling {
                    Value::Null
                } else {
                    Value::from("")
                };
                (key, value)
            }
            Some(pos) => {
                let key = decode_component(&part[..pos], charset, DecodeKind::Key, options);
                let current_len = key
                    .as_deref()
                    .and_then(|key| obj.get(key))
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                let raw = parse_list_value(Value::from(&part[pos + 1..]), options, current_len)?;
                let value = match raw {
                    Value::Array(items) => Value::Array(
                        items
                            .into_iter()
                            .map(|item| decode_value(item, charset, options))
                            .collect(),
                    ),
                    raw => decode_value(raw, charset, options),
                };
                (key, value)
            }
        };

        let Some(key) = key.filter(|key| !key.is_empty()) else {
            continue;
        };

        if options.interpret_numeric_entities && charset == Charset::Iso88591 {
            let text = match &value {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Array(items) if !items.is_empty() => Some(
                    items
                        .iter()
                        .map(|item| item.scalar_string().unwrap_or_default())
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                _ => None,
            };
            if let Some(text) = text {
                value = Value::String(utils::interpret_numeric_entities(&text).into_owned());
            }
        }

        if part.contains("[]=") && matches!(value, Value::Array(_)) {
            value = Value::Array(vec![value]);
        }

        match obj.entry(key) {
            indexmap::map::Entry::Occupied(mut entry) => match options.duplicates {
                Duplicates::Combine => {
                    let existing = std::mem::take(entry.get_mut());
                    *entry.get_mut() = utils::combine(existing, value, options.list_limit);
                }
                Duplicates::Last => *entry.get_mut() = value,
                Duplicates::First => {}
            },
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }

    Ok(obj)
}

/// Case-insensitively replaces `%5B` and `%5D` with `[` and `]`.
fn replace_encoded_brackets(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let bracket = match bytes.get(i + 1..i + 3) {
                Some(b"5B" | b"5b") => Some('['),
                Some(b"5D" | b"5d") => Some(']'),
                _ => None,
            };
            if let Some(bracket) = bracket {
                out.push_str(&input[last..i]);
                out.push(bracket);
                i += 3;
                last = i;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&input[last..]);
    out
}

/// Splits a comma-separated value into a list when `comma` is enabled,
/// honoring the list limit for a list that already has `current_len`
/// elements.
pub(crate) fn parse_list_value(
    value: Value,
    options: &DecodeOptions,
    current_len: usize,
) -> Result<Value> {
    let limit = options.list_limit;

    if let Value::String(s) = &value {
        if options.comma && !s.is_empty() && s.contains(',') {
            if limit < 0 {
                return Ok(split_comma(s, usize::MAX));
            }

            let remaining = limit - current_len as isize;
            if options.throw_on_limit_exceeded {
                if remaining < 0 {
                    return Err(Error::list_limit(limit));
                }
                let parts = split_comma(s, remaining as usize + 1);
                if parts.as_array().map_or(0, Vec::len) > remaining as usize {
                    return Err(Error::list_limit(limit));
                }
                return Ok(parts);
            }

            if remaining <= 0 {
                tracing::debug!(list_limit = limit, "list limit reached, dropping comma values");
                return Ok(Value::Array(Vec::new()));
            }
            let parts = split_comma(s, remaining as usize);
            if parts.as_array().map_or(0, Vec::len) < s.split(',').count() {
                tracing::debug!(list_limit = limit, "list limit reached, truncating comma values");
            }
            return Ok(parts);
        }
    }

    if limit >= 0 && options.throw_on_limit_exceeded && current_len >= limit as usize {
        return Err(Error::list_limit(limit));
    }

    Ok(value)
}

fn split_comma(s: &str, max_parts: usize) -> Value {
    Value::Array(s.split(',').take(max_parts).map(Value::from).collect())
}

fn decode_value(value: Value, charset: Charset, options: &DecodeOptions) -> Value {
    match value {
        Value::String(s) => decode_component(&s, charset, DecodeKind::Value, options)
            .map_or(Value::Null, Value::String),
        other => other,
    }
}

/// Percent-decodes a key or value with the custom decoder if one is set.
fn decode_component(
    s: &str,
    charset: Charset,
    kind: DecodeKind,
    options: &DecodeOptions,
) -> Option<String> {
    if let Some(decoder) = &options.decoder {
        return decoder(s, charset, kind);
    }
    Some(match kind {
        DecodeKind::Value => utils::decode(s, charset),
        DecodeKind::Key => decode_key(s, charset, options.dots_enabled()),
    })
}

/// Decodes a key, leaving `%2E` encoded inside brackets (and everywhere
/// when dots are enabled) so it is not mistaken for a separator.
fn decode_key(s: &str, charset: Charset, protect_top_level: bool) -> String {
    if !s.contains("%2E") && !s.contains("%2e") {
        return utils::decode(s, charset);
    }

    let bytes = s.as_bytes();
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'%' if (depth > 0 || protect_top_level)
                && matches!(bytes.get(i + 1..i + 3), Some(b"2E" | b"2e")) =>
            {
                out.push_str(&utils::decode(&s[last..i], charset));
                out.push_str(&s[i..i + 3]);
                i += 3;
                last = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    out.push_str(&utils::decode(&s[last..], charset));
    out
}
