//! Turning a single flat key such as `a[b][0]` (or `a.b.0` with dots
//! enabled) into a nested value.

use crate::config::DecodeOptions;
use crate::error::{Error, Result};
use crate::map::Map;
use crate::utils;
use crate::Value;

/// Parses `key` and wraps `value` in the structure it describes.
///
/// Returns [`Value::Undefined`] for an empty key. When `values_parsed` is
/// `false`, comma splitting is applied to `value` first.
pub(crate) fn parse_keys(
    key: &str,
    value: Value,
    options: &DecodeOptions,
    values_parsed: bool,
) -> Result<Value> {
    if key.is_empty() {
        return Ok(Value::Undefined);
    }

    let segments = split_key_into_segments(
        key,
        options.dots_enabled(),
        options.depth,
        options.strict_depth,
    )?;
    tracing::trace!(key, ?segments, "split key");
    parse_object(&segments, value, options, values_parsed)
}

/// Rewrites top-level dots as brackets: `a.b[c].d` becomes `a[b][c][d]`.
///
/// Dots inside brackets are kept. `.[` drops the dot, so `a.[b]` reads
/// like `a[b]`. A trailing dot, and the first of two consecutive dots,
/// stay literal. Percent-encoded dots are never split on.
pub(crate) fn dot_to_bracket_top_level(key: &str) -> String {
    let bytes = key.as_bytes();
    let mut out = String::with_capacity(key.len() + 4);
    let mut depth = 0usize;
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'.' if depth == 0 => match bytes.get(i + 1) {
                Some(b'[') => {
                    out.push_str(&key[last..i]);
                    i += 1;
                    last = i;
                    continue;
                }
                None | Some(b'.') => {}
                Some(_) => {
                    out.push_str(&key[last..i]);
                    let start = i + 1;
                    let end = bytes[start..]
                        .iter()
                        .position(|&b| b == b'.' || b == b'[')
                        .map_or(bytes.len(), |p| start + p);
                    out.push('[');
                    out.push_str(&key[start..end]);
                    out.push(']');
                    i = end;
                    last = end;
                    continue;
                }
            },
            _ => {}
        }
        i += 1;
    }

    out.push_str(&key[last..]);
    out
}

/// Splits a key into its parent and bracket groups.
///
/// `a[b][c]` gives `["a", "[b]", "[c]"]`. Brackets nested within a group
/// stay in that group. At most `max_depth` groups are collected; whatever
/// is left becomes one final group (e.g. `[[d][e]]`) unless `strict_depth`
/// is set, which is an error instead. An unterminated group is never an
/// error. A `max_depth` of zero keeps the key whole.
pub(crate) fn split_key_into_segments(
    original_key: &str,
    allow_dots: bool,
    max_depth: usize,
    strict_depth: bool,
) -> Result<Vec<String>> {
    if max_depth == 0 {
        return Ok(vec![original_key.to_owned()]);
    }

    let key = if allow_dots {
        dot_to_bracket_top_level(original_key)
    } else {
        original_key.to_owned()
    };

    let mut segments = Vec::with_capacity(key.matches('[').count() + 1);

    let first = key.find('[');
    let parent = first.map_or(key.as_str(), |first| &key[..first]);
    if !parent.is_empty() {
        segments.push(parent.to_owned());
    }

    let bytes = key.as_bytes();
    let mut open = first;
    let mut unterminated = false;
    let mut depth = 0;

    while let Some(start) = open {
        if depth >= max_depth {
            break;
        }

        let mut level = 1usize;
        let mut close = None;
        for (i, &b) in bytes.iter().enumerate().skip(start + 1) {
            match b {
                b'[' => level += 1,
                b']' => {
                    level -= 1;
                    if level == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }

        let Some(close) = close else {
            unterminated = true;
            break;
        };

        segments.push(key[start..=close].to_owned());
        depth += 1;
        open = key[close + 1..].find('[').map(|p| close + 1 + p);
    }

    if let Some(rest) = open {
        if strict_depth && !unterminated {
            return Err(Error::depth_limit(max_depth));
        }
        segments.push(format!("[{}]", &key[rest..]));
    }

    Ok(segments)
}

/// Builds the nested value for `chain`, innermost segment first.
pub(crate) fn parse_object(
    chain: &[String],
    value: Value,
    options: &DecodeOptions,
    values_parsed: bool,
) -> Result<Value> {
    let current_len = match chain.split_last() {
        Some((last, parents)) if last == "[]" => {
            let parent = parents.concat();
            match (parent.parse::<usize>(), &value) {
                (Ok(index), Value::Array(items)) => match items.get(index) {
                    Some(Value::Array(inner)) => inner.len(),
                    _ => 0,
                },
                _ => 0,
            }
        }
        _ => 0,
    };

    let mut leaf = if values_parsed {
        value
    } else {
        super::parse_list_value(value, options, current_len)?
    };

    for root in chain.iter().rev() {
        leaf = if root == "[]" && options.parse_lists {
            let is_empty = match &leaf {
                Value::String(s) => s.is_empty(),
                Value::Null => options.strict_null_handling,
                _ => false,
            };
            match leaf {
                _ if options.allow_empty_lists && is_empty => Value::Array(Vec::new()),
                Value::Object(map) if map.is_overflow() => Value::Object(map),
                leaf => utils::combine(Value::Array(Vec::new()), leaf, options.list_limit),
            }
        } else {
            let clean_root = match root.strip_prefix('[') {
                Some(inner) => match root.rfind(']') {
                    Some(last) if last > 0 => &root[1..last],
                    _ => inner,
                },
                None => root.as_str(),
            };

            let decoded_root = if options.decode_dot_in_keys && clean_root.contains("%2") {
                clean_root.replace("%2E", ".").replace("%2e", ".")
            } else {
                clean_root.to_owned()
            };

            let index = bracketed_index(root, &decoded_root);

            if !options.parse_lists || options.list_limit < 0 {
                let key = if decoded_root.is_empty() {
                    "0".to_owned()
                } else {
                    decoded_root
                };
                Value::Object(Map::from_iter([(key, leaf)]))
            } else if let Some(index) = index.filter(|&i| i <= options.list_limit as usize) {
                let mut list = vec![Value::Undefined; index + 1];
                list[index] = leaf;
                Value::Array(list)
            } else {
                Value::Object(Map::from_iter([(decoded_root, leaf)]))
            }
        };
    }

    Ok(leaf)
}

/// The list index named by a bracketed segment like `[3]`.
///
/// Only canonical numbers count: `[03]` and bare `3` are map keys.
fn bracketed_index(root: &str, decoded: &str) -> Option<usize> {
    let index = utils::parse_index(decoded)?;
    (root != decoded && index.to_string() == decoded).then_some(index)
}
