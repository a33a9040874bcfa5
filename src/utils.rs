//! Percent-encoding primitives and the structural helpers shared by the
//! decoder and encoder.

use std::borrow::Cow;
use std::mem;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

use crate::config::{Charset, DecodeOptions, Format};
use crate::map::Map;
use crate::Value;

/// Characters left unescaped by `encodeURIComponent`-style encoding:
/// ASCII alphanumerics and `-._~`.
const RFC3986_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// As above, but `(` and `)` are also left alone.
const RFC1738_SET: &AsciiSet = &RFC3986_SET.remove(b'(').remove(b')');

const fn encode_set(format: Format) -> &'static AsciiSet {
    match format {
        Format::Rfc3986 => RFC3986_SET,
        Format::Rfc1738 => RFC1738_SET,
    }
}

/// Percent-encodes a scalar value.
///
/// ## UTF-8
/// Every byte outside the unreserved set is written as an uppercase `%XX`.
/// [`Value::Bytes`] are encoded byte for byte.
///
/// ## ISO-8859-1
/// Characters are escaped with [`escape`], except that anything outside
/// Latin-1 becomes a numeric entity (`%26%239786%3B` for `☺`). Code
/// points above U+FFFF become one entity per UTF-16 surrogate.
///
/// Composite values, `Null` and `Undefined` encode to an empty string.
pub fn encode(value: &Value, charset: Charset, format: Format) -> String {
    match value {
        Value::Bytes(bytes) => match charset {
            Charset::Utf8 => percent_encoding::percent_encode(bytes, encode_set(format)).to_string(),
            Charset::Iso88591 => escape_with(&latin1_to_string(bytes), format, push_entity),
        },
        Value::Shared(shared) => encode(&shared.borrow(), charset, format),
        other => match other.scalar_string() {
            Some(s) => encode_str(&s, charset, format),
            None => String::new(),
        },
    }
}

/// Percent-encodes a string. See [`encode`].
pub fn encode_str(input: &str, charset: Charset, format: Format) -> String {
    if input.is_empty() {
        return String::new();
    }
    match charset {
        Charset::Utf8 => percent_encoding::utf8_percent_encode(input, encode_set(format)).to_string(),
        Charset::Iso88591 => escape_with(input, format, push_entity),
    }
}

/// Bytes as text in the given charset, for writing them unencoded.
pub(crate) fn bytes_to_string(bytes: &[u8], charset: Charset) -> String {
    match charset {
        Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        Charset::Iso88591 => latin1_to_string(bytes),
    }
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn push_entity(out: &mut String, unit: u16) {
    out.push_str("%26%23");
    let mut buffer = itoa::Buffer::new();
    out.push_str(buffer.format(unit));
    out.push_str("%3B");
}

fn push_unicode_escape(out: &mut String, unit: u16) {
    out.push_str(&format!("%u{unit:04X}"));
}

#[inline(always)]
fn is_escape_safe(c: char, format: Format) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(c, '@' | '*' | '_' | '+' | '-' | '.' | '/')
        || (format == Format::Rfc1738 && matches!(c, '(' | ')'))
}

fn escape_with(input: &str, format: Format, wide: fn(&mut String, u16)) -> String {
    let mut out = String::with_capacity(input.len());
    let mut units = [0u16; 2];
    for c in input.chars() {
        if is_escape_safe(c, format) {
            out.push(c);
            continue;
        }
        for &unit in c.encode_utf16(&mut units).iter() {
            if unit < 256 {
                out.push_str(&format!("%{unit:02X}"));
            } else {
                wide(&mut out, unit);
            }
        }
    }
    out
}

/// The legacy JavaScript `escape`.
///
/// ASCII alphanumerics and `@*_+-./` pass through (plus `(`/`)` for
/// RFC 1738). Other code units below 256 become `%XX`; the rest `%uXXXX`.
pub fn escape(input: &str, format: Format) -> String {
    escape_with(input, format, push_unicode_escape)
}

#[inline(always)]
fn hex_value(bytes: &[u8]) -> Option<u16> {
    bytes.iter().try_fold(0u16, |acc, &b| {
        char::from(b).to_digit(16).map(|d| acc * 16 + d as u16)
    })
}

/// The legacy JavaScript `unescape`: reverses `%XX` and `%uXXXX`.
///
/// A `%` that does not start a valid sequence is kept literally.
pub fn unescape(input: &str) -> String {
    if !input.contains('%') {
        return input.to_owned();
    }
    let bytes = input.as_bytes();
    let mut units: Vec<u16> = Vec::with_capacity(input.len());
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        let (unit, len) = if bytes.get(i + 1) == Some(&b'u') {
            (bytes.get(i + 2..i + 6).and_then(hex_value), 6)
        } else {
            (bytes.get(i + 1..i + 3).and_then(hex_value), 3)
        };
        match unit {
            Some(unit) => {
                units.extend(input[last..i].encode_utf16());
                units.push(unit);
                i += len;
                last = i;
            }
            None => i += 1,
        }
    }
    units.extend(input[last..].encode_utf16());
    String::from_utf16_lossy(&units)
}

#[inline(always)]
fn char_to_digit(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|d| d as u8)
}

/// Decodes every `%XX` in `input`, or returns `None` if any `%` does not
/// start a valid sequence.
fn percent_decode_strict(input: &[u8]) -> Option<Cow<'_, [u8]>> {
    if !input.contains(&b'%') {
        return Some(Cow::Borrowed(input));
    }

    let mut bytes_iter = input.iter().enumerate();
    let mut decoded = Vec::with_capacity(input.len());
    let mut last_segment = 0;

    while let Some((idx, &b)) = bytes_iter.next() {
        if b == b'%' {
            let h = bytes_iter.next().and_then(|(_, b)| char_to_digit(*b))?;
            let l = bytes_iter.next().and_then(|(_, b)| char_to_digit(*b))?;

            decoded.extend_from_slice(&input[last_segment..idx]);
            decoded.push(h * 0x10 + l);
            last_segment = idx + 3;
        }
    }

    decoded.extend_from_slice(&input[last_segment..]);
    Some(Cow::Owned(decoded))
}

/// Percent-decodes a key or value.
///
/// `+` is always read as a space.
///
/// ## UTF-8
/// If the input contains a malformed `%` sequence, or decodes to invalid
/// UTF-8, it is returned as-is (with `+` still replaced). This matches
/// `decodeURIComponent` wrapped in a `try`.
///
/// ## ISO-8859-1
/// Each `%XX` becomes the Latin-1 character with that code; anything else
/// is left alone.
pub fn decode(input: &str, charset: Charset) -> String {
    let replaced = if input.contains('+') {
        Cow::Owned(input.replace('+', " "))
    } else {
        Cow::Borrowed(input)
    };

    match charset {
        Charset::Iso88591 => decode_latin1(&replaced),
        Charset::Utf8 => {
            let decoded = percent_decode_strict(replaced.as_bytes())
                .and_then(|bytes| String::from_utf8(bytes.into_owned()).ok());
            decoded.unwrap_or_else(|| replaced.into_owned())
        }
    }
}

fn decode_latin1(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if let Some(code) = bytes.get(i + 1..i + 3).and_then(hex_value) {
                out.push_str(&input[last..i]);
                out.push(char::from(code as u8));
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

/// Parses `&#<digits>;` starting at `start`, returning the code and the
/// index just past the `;`.
fn parse_entity(bytes: &[u8], start: usize) -> Option<(u32, usize)> {
    let rest = bytes.get(start..)?;
    if !rest.starts_with(b"&#") {
        return None;
    }
    let digits = rest[2..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 || rest.get(2 + digits) != Some(&b';') {
        return None;
    }
    let mut code: u32 = 0;
    for &d in &rest[2..2 + digits] {
        code = code * 10 + u32::from(d - b'0');
        if code > 0x10FFFF {
            return None;
        }
    }
    Some((code, start + digits + 3))
}

/// Replaces numeric HTML entities (`&#9786;`) with the characters they name.
///
/// A high/low surrogate pair written as two entities is combined into one
/// character. Lone surrogates, out-of-range codes and anything else that is
/// not a well-formed entity are left untouched.
pub fn interpret_numeric_entities(input: &str) -> Cow<'_, str> {
    if input.len() < 4 || !input.contains("&#") {
        return Cow::Borrowed(input);
    }

    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        if let Some((code, end)) = parse_entity(bytes, i) {
            let resolved = if (0xD800..0xDC00).contains(&code) {
                parse_entity(bytes, end)
                    .filter(|(low, _)| (0xDC00..0xE000).contains(low))
                    .map(|(low, end)| (0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00), end))
            } else {
                Some((code, end))
            };
            if let Some((c, end)) = resolved.and_then(|(cp, end)| Some((char::from_u32(cp)?, end)))
            {
                out.push_str(&input[last..i]);
                out.push(c);
                i = end;
                last = end;
                continue;
            }
        }
        i += 1;
    }
    out.push_str(&input[last..]);
    Cow::Owned(out)
}

/// Parses a canonical list index: ASCII digits only, no sign.
pub(crate) fn parse_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Concatenates `a` and `b` (either of which may already be a list).
///
/// If the result has more than `limit` elements (and `limit` is not
/// negative), it is returned as an overflow map instead. Appending to an
/// overflow map extends it after its highest index.
pub fn combine(a: Value, b: Value, limit: isize) -> Value {
    let mut result = match a {
        Value::Object(mut map) if map.is_overflow() => {
            match b {
                Value::Array(items) => items.into_iter().for_each(|item| map.push_overflow(item)),
                b => map.push_overflow(b),
            }
            return Value::Object(map);
        }
        Value::Array(items) => items,
        a => vec![a],
    };

    match b {
        Value::Array(items) => result.extend(items),
        b => result.push(b),
    }

    if limit >= 0 && result.len() > limit as usize {
        return Value::Object(Map::overflow_from(result));
    }
    Value::Array(result)
}

/// Merges `source` into `target`.
///
/// This is how two decoded parameters that share a root key are folded
/// together, e.g. `a[b]=1` and `a[c]=2`. Maps merge key by key and lists
/// merge position by position. Mismatched shapes are combined into a list
/// (or a map, when one side is already keyed).
///
/// Nested merges are driven by an explicit stack, so arbitrarily deep
/// values do not grow the call stack.
pub fn merge(target: Value, source: Value, options: &DecodeOptions) -> Value {
    let mut stack = vec![MergeFrame::Start { target, source }];
    let mut finished = Value::Undefined;

    while let Some(frame) = stack.last_mut() {
        let step = match frame {
            MergeFrame::Start { target, source } => {
                merge_shallow(mem::take(target), mem::take(source), options)
            }
            MergeFrame::Map {
                target,
                entries,
                pending,
            } => {
                if let Some(key) = pending.take() {
                    target.insert(key, mem::take(&mut finished));
                }
                merge_map_entries(target, entries, pending)
            }
            MergeFrame::List {
                target,
                items,
                pending,
            } => {
                if let Some(i) = pending.take() {
                    target[i] = mem::take(&mut finished);
                }
                merge_list_items(target, items, pending, options)
            }
        };

        match step {
            MergeStep::Done(value) => {
                stack.pop();
                finished = value;
            }
            MergeStep::Resume(next) => {
                stack.pop();
                stack.push(next);
            }
            MergeStep::Descend { target, source } => {
                stack.push(MergeFrame::Start { target, source });
            }
        }
    }

    finished
}

/// A merge in progress. `pending` names the slot waiting for the result
/// of the frame above it.
enum MergeFrame {
    Start {
        target: Value,
        source: Value,
    },
    Map {
        target: Map,
        entries: indexmap::map::IntoIter<String, Value>,
        pending: Option<String>,
    },
    List {
        target: Vec<Value>,
        items: std::iter::Enumerate<std::vec::IntoIter<Value>>,
        pending: Option<usize>,
    },
}

enum MergeStep {
    Done(Value),
    Resume(MergeFrame),
    Descend { target: Value, source: Value },
}

/// Handles every case that needs no nested merge, and sets up a frame for
/// the ones that do.
fn merge_shallow(target: Value, source: Value, options: &DecodeOptions) -> MergeStep {
    match (target, source) {
        (target, Value::Null | Value::Undefined) => MergeStep::Done(target),
        (Value::Object(target), Value::Object(source)) => MergeStep::Resume(MergeFrame::Map {
            target,
            entries: source.into_iter(),
            pending: None,
        }),
        (target, Value::Object(source)) => MergeStep::Done(merge_map_into(target, source)),
        (Value::Array(target), Value::Array(items)) => MergeStep::Resume(MergeFrame::List {
            target,
            items: items.into_iter().enumerate(),
            pending: None,
        }),
        (Value::Array(mut target), source) => {
            target.push(source);
            MergeStep::Done(finish_slots(target, options))
        }
        (Value::Object(map), source) => {
            MergeStep::Done(Value::Object(merge_value_into_map(map, source)))
        }
        (target, Value::Array(items)) => {
            let mut list = Vec::with_capacity(items.len() + 1);
            list.push(target);
            list.extend(items.into_iter().filter(|v| !v.is_undefined()));
            MergeStep::Done(Value::Array(list))
        }
        (target, source) => MergeStep::Done(Value::Array(vec![target, source])),
    }
}

/// Copies source entries into `target` until one collides with an
/// existing key, which is then merged one level down.
fn merge_map_entries(
    target: &mut Map,
    entries: &mut indexmap::map::IntoIter<String, Value>,
    pending: &mut Option<String>,
) -> MergeStep {
    for (key, value) in entries.by_ref() {
        if let (Some(max), Some(index)) = (target.overflow_max(), parse_index(&key)) {
            target.set_overflow_max(max.max(index));
        }
        match target.get_mut(&key) {
            Some(existing) if !matches!(value, Value::Null | Value::Undefined) => {
                let existing = mem::take(existing);
                *pending = Some(key);
                return MergeStep::Descend {
                    target: existing,
                    source: value,
                };
            }
            Some(_) => {}
            None => {
                target.insert(key, value);
            }
        }
    }
    MergeStep::Done(Value::Object(mem::take(target)))
}

/// Applies source items by position: holes are filled, two composites at
/// the same index are merged, anything else is appended. Indices past the
/// end extend the list with holes.
fn merge_list_items(
    target: &mut Vec<Value>,
    items: &mut std::iter::Enumerate<std::vec::IntoIter<Value>>,
    pending: &mut Option<usize>,
    options: &DecodeOptions,
) -> MergeStep {
    for (i, item) in items.by_ref() {
        if item.is_undefined() {
            continue;
        }
        if i >= target.len() {
            target.resize(i, Value::Undefined);
            target.push(item);
            continue;
        }
        let slot = &mut target[i];
        if slot.is_undefined() {
            *slot = item;
        } else if is_container(slot) && is_container(&item) {
            let existing = mem::take(slot);
            *pending = Some(i);
            return MergeStep::Descend {
                target: existing,
                source: item,
            };
        } else {
            target.push(item);
        }
    }
    MergeStep::Done(finish_slots(mem::take(target), options))
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Merges a map `source` into anything but a map.
fn merge_map_into(target: Value, source: Map) -> Value {
    match target {
        Value::Array(items) => {
            let mut map: Map = items
                .into_iter()
                .enumerate()
                .filter(|(_, v)| !v.is_undefined())
                .map(|(i, v)| (i.to_string(), v))
                .collect();
            for (key, value) in source {
                map.insert(key, value);
            }
            Value::Object(map)
        }
        target if source.is_overflow() => {
            // shift the overflow list right to make room for `target` at 0
            let max = source.overflow_max().unwrap_or(0);
            let mut shifted = Map::with_capacity(source.len() + 1);
            let has_target = !matches!(target, Value::Null | Value::Undefined);
            if has_target {
                shifted.insert("0", target);
            }
            for (key, value) in source {
                match parse_index(&key) {
                    Some(index) => shifted.insert((index + 1).to_string(), value),
                    None => shifted.insert(key, value),
                };
            }
            shifted.set_overflow_max(max + 1);
            Value::Object(shifted)
        }
        target => {
            let mut list = Vec::with_capacity(2);
            if !matches!(target, Value::Null | Value::Undefined) {
                list.push(target);
            }
            list.push(Value::Object(source));
            Value::Array(list)
        }
    }
}

/// Merges `source` into a map, which always yields a map.
pub(crate) fn merge_into_map(mut target: Map, source: Value, options: &DecodeOptions) -> Map {
    match source {
        Value::Null | Value::Undefined => target,
        Value::Object(source) => {
            for (key, value) in source {
                if let (Some(max), Some(index)) = (target.overflow_max(), parse_index(&key)) {
                    target.set_overflow_max(max.max(index));
                }
                match target.entry(key) {
                    indexmap::map::Entry::Occupied(mut entry) => {
                        let existing = mem::take(entry.get_mut());
                        *entry.get_mut() = merge(existing, value, options);
                    }
                    indexmap::map::Entry::Vacant(entry) => {
                        entry.insert(value);
                    }
                }
            }
            target
        }
        source => merge_value_into_map(target, source),
    }
}

fn merge_value_into_map(mut map: Map, source: Value) -> Map {
    if map.is_overflow() {
        match source {
            Value::Array(items) => items
                .into_iter()
                .filter(|v| !v.is_undefined())
                .for_each(|item| map.push_overflow(item)),
            source => map.push_overflow(source),
        }
        return map;
    }
    match source {
        Value::Array(items) => {
            for (i, item) in items.into_iter().enumerate() {
                if !item.is_undefined() {
                    map.insert(i.to_string(), item);
                }
            }
        }
        source => {
            if let Some(key) = source.scalar_string().filter(|k| !k.is_empty()) {
                map.insert(key, true);
            }
        }
    }
    map
}

/// Keeps a merged list as is, unless list parsing is off and holes
/// remain, in which case only the filled positions survive as a map.
fn finish_slots(items: Vec<Value>, options: &DecodeOptions) -> Value {
    if !options.parse_lists && items.iter().any(Value::is_undefined) {
        return Value::Object(
            items
                .into_iter()
                .enumerate()
                .filter(|(_, v)| !v.is_undefined())
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        );
    }
    Value::Array(items)
}

/// Removes every [`Value::Undefined`] from a decoded tree.
///
/// Holes in lists are dropped, or replaced with `Null` when
/// `allow_sparse` is set.
pub fn compact(map: &mut Map, allow_sparse: bool) {
    map.retain(|_, v| !v.is_undefined());
    let mut stack: Vec<&mut Value> = map.iter_mut().map(|(_, v)| v).collect();

    while let Some(value) = stack.pop() {
        match value {
            Value::Object(map) => {
                map.retain(|_, v| !v.is_undefined());
                stack.extend(map.iter_mut().map(|(_, v)| v));
            }
            Value::Array(items) => {
                if allow_sparse {
                    for item in items.iter_mut().filter(|v| v.is_undefined()) {
                        *item = Value::Null;
                    }
                } else {
                    items.retain(|v| !v.is_undefined());
                }
                stack.extend(items.iter_mut());
            }
            _ => {}
        }
    }
}
