use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashSet;
use std::mem;

use crate::config::{EncodeOptions, Filter, ListFormat};
use crate::error::{Error, Result};
use crate::utils;
use crate::value::default_date_string;
use crate::Value;

/// Walks a value depth-first, collecting one `key=value` pair per leaf.
///
/// The walk keeps its own stack of pending nodes instead of recursing, so
/// the depth of a value is bounded by memory only. Pointers of the
/// [`SharedValue`](crate::SharedValue)s on the current branch are kept in
/// `seen`; meeting one again means the value contains itself.
pub(super) struct Walker<'o> {
    options: &'o EncodeOptions,
    comma_round_trip: bool,
    seen: HashSet<*const RefCell<Value>>,
    pub(super) pairs: Vec<String>,
}

/// A node waiting to be visited, with the state that changes on the way down.
pub(super) struct Frame<'v> {
    value: Cow<'v, Value>,
    path: String,
    /// `false` for a key that was absent, as opposed to present and `Null`.
    present: bool,
    /// Comma lists with `encode_values_only` encode their elements before
    /// joining, so the joined value must not be encoded again.
    encode: bool,
    /// Set once the filter function has seen this node.
    filtered: bool,
}

impl<'v> Frame<'v> {
    pub(super) fn root(value: &'v Value, path: &str, present: bool, encode: bool) -> Self {
        Frame {
            value: Cow::Borrowed(value),
            path: path.to_owned(),
            present,
            encode,
            filtered: false,
        }
    }
}

enum Work<'v> {
    Visit(Frame<'v>),
    /// The subtree of a shared node is done.
    Leave(*const RefCell<Value>),
}

impl<'o> Walker<'o> {
    pub(super) fn new(options: &'o EncodeOptions) -> Self {
        Walker {
            options,
            comma_round_trip: options.list_format == ListFormat::Comma && options.comma_round_trip,
            seen: HashSet::new(),
            pairs: Vec::new(),
        }
    }

    /// Encodes a key path or scalar with the configured encoder.
    fn encode_value(&self, value: &Value) -> String {
        let options = self.options;
        match &options.encoder {
            Some(encoder) => encoder(value, options.charset, options.format),
            None => utils::encode(value, options.charset, options.format),
        }
    }

    fn encode_key(&self, path: &str) -> String {
        self.encode_value(&Value::from(path))
    }

    fn serialize_date(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Date(date) => Some(Value::String(match &self.options.serialize_date {
                Some(serialize) => serialize(date),
                None => default_date_string(date),
            })),
            _ => None,
        }
    }

    pub(super) fn walk(&mut self, root: Frame<'_>) -> Result<()> {
        let mut stack = vec![Work::Visit(root)];
        while let Some(work) = stack.pop() {
            match work {
                Work::Leave(ptr) => {
                    self.seen.remove(&ptr);
                }
                Work::Visit(frame) => self.visit(frame, &mut stack)?,
            }
        }
        Ok(())
    }

    /// Emits the pairs of a leaf, or pushes the children of a list or map.
    fn visit<'v>(&mut self, frame: Frame<'v>, stack: &mut Vec<Work<'v>>) -> Result<()> {
        let options = self.options;
        let Frame {
            mut value,
            path,
            present,
            encode,
            filtered,
        } = frame;

        if !filtered {
            if let Some(Filter::Function(filter)) = &options.filter {
                value = Cow::Owned(filter(path.as_str(), value.as_ref()));
            }
        }

        if let Value::Shared(shared) = value.as_ref() {
            let ptr = shared.as_ptr();
            if !self.seen.insert(ptr) {
                return Err(Error::CyclicReference);
            }
            let inner = shared.borrow().clone();
            stack.push(Work::Leave(ptr));
            stack.push(Work::Visit(Frame {
                value: Cow::Owned(inner),
                path,
                present,
                encode,
                filtered: true,
            }));
            return Ok(());
        }

        if let Some(date) = self.serialize_date(&value) {
            value = Cow::Owned(date);
        }

        if value.is_undefined() {
            return Ok(());
        }
        if value.is_null() && present {
            if options.strict_null_handling {
                let key = if encode && !options.encode_values_only {
                    self.encode_key(&path)
                } else {
                    path
                };
                self.pairs.push(key);
                return Ok(());
            }
            value = Cow::Owned(Value::from(""));
        }

        if self.is_leaf(&value) {
            self.push_leaf(&value, &path, encode);
            return Ok(());
        }

        if !present {
            return Ok(());
        }

        let (keys, is_list, list_format, path) = match value.as_ref() {
            Value::Array(items) => {
                if options.list_format == ListFormat::Comma
                    && !items.iter().any(Value::is_composite)
                {
                    if let Some(joined) = self.visit_comma_list(items, &path, encode) {
                        stack.push(Work::Visit(joined));
                    }
                    return Ok(());
                }
                // lists of maps or lists cannot be joined, so fall back to indices
                let list_format = match options.list_format {
                    ListFormat::Comma => ListFormat::Indices,
                    other => other,
                };
                let keys: Vec<String> = (0..items.len()).map(|i| i.to_string()).collect();
                (keys, true, list_format, self.path_for_children(&path))
            }
            Value::Object(map) => {
                let keys: Vec<String> = map.keys().cloned().collect();
                (keys, false, options.list_format, path)
            }
            _ => return Ok(()),
        };

        let children = self.children(value, keys, is_list, path, list_format, encode);
        stack.extend(children.into_iter().rev().map(Work::Visit));
        Ok(())
    }

    fn is_leaf(&self, value: &Value) -> bool {
        match value {
            Value::String(s) => !(self.options.skip_nulls && s.is_empty()),
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Bytes(_) | Value::Date(_) => {
                true
            }
            _ => false,
        }
    }

    fn push_leaf(&mut self, value: &Value, path: &str, encode: bool) {
        let format = self.options.format;
        let pair = if encode {
            let key = if self.options.encode_values_only {
                path.to_owned()
            } else {
                self.encode_key(path)
            };
            let value = self.encode_value(value);
            format!("{}={}", format.format(&key), format.format(&value))
        } else {
            let raw = match value {
                Value::Bytes(bytes) => utils::bytes_to_string(bytes, self.options.charset),
                other => other.scalar_string().unwrap_or_default(),
            };
            format!("{}={}", format.format(path), format.format(&raw))
        };
        self.pairs.push(pair);
    }

    /// Joins a list of scalars with `,`. Returns the joined value still to
    /// be visited, if anything is left to write.
    fn visit_comma_list(
        &mut self,
        items: &[Value],
        path: &str,
        encode: bool,
    ) -> Option<Frame<'static>> {
        let options = self.options;

        let dates: Vec<Value>;
        let items: &[Value] = if items.iter().any(|v| matches!(v, Value::Date(_))) {
            dates = items
                .iter()
                .map(|v| self.serialize_date(v).unwrap_or_else(|| v.clone()))
                .collect();
            &dates
        } else {
            items
        };

        let elements: Vec<&Value> = items
            .iter()
            .filter(|v| !(options.comma_compact_nulls && v.is_null()))
            .collect();

        let mut path = self.path_for_children(path);

        if items.is_empty() {
            if options.allow_empty_lists {
                path.push_str("[]");
                self.pairs.push(path);
            }
            return None;
        }

        if self.comma_round_trip && elements.len() == 1 {
            path.push_str("[]");
        }

        if elements.is_empty() {
            return None;
        }

        let pre_encode = options.encode_values_only && encode;
        let joined = elements
            .iter()
            .map(|element| match element {
                Value::Null | Value::Undefined => String::new(),
                element if pre_encode => self.encode_value(element),
                Value::Bytes(bytes) => utils::bytes_to_string(bytes, options.charset),
                element => element.scalar_string().unwrap_or_default(),
            })
            .collect::<Vec<_>>()
            .join(",");

        let joined = if joined.is_empty() {
            Value::Null
        } else {
            Value::String(joined)
        };

        if options.skip_nulls && joined.is_null() {
            return None;
        }

        Some(Frame {
            value: Cow::Owned(joined),
            path,
            present: true,
            encode: encode && !pre_encode,
            filtered: false,
        })
    }

    /// The path children of `path` are appended to.
    fn path_for_children(&self, path: &str) -> String {
        if self.options.encode_dot_in_keys {
            path.replace('.', "%2E")
        } else {
            path.to_owned()
        }
    }

    /// The frames for the children of `parent`, in output order.
    fn children<'v>(
        &mut self,
        mut parent: Cow<'v, Value>,
        own_keys: Vec<String>,
        is_list: bool,
        path: String,
        list_format: ListFormat,
        encode: bool,
    ) -> Vec<Frame<'v>> {
        let options = self.options;

        if is_list && own_keys.is_empty() && options.allow_empty_lists {
            self.pairs.push(format!("{path}[]"));
            return Vec::new();
        }

        let path = if is_list {
            path
        } else {
            self.path_for_children(&path)
        };

        let mut keys: Vec<String> = match &options.filter {
            Some(Filter::Keys(keys)) => keys.clone(),
            _ => own_keys,
        };
        if let Some(sort) = &options.sort {
            keys.sort_by(|a, b| sort(a, b));
        }

        let dots = options.dots_enabled();
        let mut frames = Vec::with_capacity(keys.len());
        for key in keys {
            let child = take_child(&mut parent, &key);
            if options.skip_nulls && child.as_deref().is_none_or(Value::is_null) {
                continue;
            }

            let encoded_key: Cow<'_, str> = if dots && options.encode_dot_in_keys {
                Cow::Owned(key.replace('.', "%2E"))
            } else {
                Cow::Borrowed(key.as_str())
            };

            let child_path = if is_list {
                match list_format {
                    ListFormat::Indices => format!("{path}[{encoded_key}]"),
                    ListFormat::Brackets => format!("{path}[]"),
                    ListFormat::Repeat | ListFormat::Comma => path.clone(),
                }
            } else if dots {
                format!("{path}.{encoded_key}")
            } else {
                format!("{path}[{encoded_key}]")
            };

            frames.push(Frame {
                present: child.is_some(),
                value: child.unwrap_or(Cow::Owned(Value::Null)),
                path: child_path,
                encode,
                filtered: false,
            });
        }

        frames
    }
}

/// Looks up a child by key (or list index). Children of a borrowed node are
/// borrowed; children of an owned node are moved out of it.
fn take_child<'v>(parent: &mut Cow<'v, Value>, key: &str) -> Option<Cow<'v, Value>> {
    match parent {
        Cow::Borrowed(value) => {
            let value: &'v Value = *value;
            match value {
                Value::Object(map) => map.get(key),
                Value::Array(items) => utils::parse_index(key).and_then(|i| items.get(i)),
                _ => None,
            }
            .map(Cow::Borrowed)
        }
        Cow::Owned(value) => match value {
            Value::Object(map) => map.take(key),
            Value::Array(items) => utils::parse_index(key)
                .and_then(|i| items.get_mut(i))
                .map(|slot| mem::replace(slot, Value::Undefined)),
            _ => None,
        }
        .map(Cow::Owned),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::map::Map;
    use pretty_assertions::assert_eq;

    fn walk(value: &Value, options: &EncodeOptions) -> Result<Vec<String>> {
        let mut walker = Walker::new(options);
        walker.walk(Frame::root(value, "a", true, options.encode))?;
        Ok(walker.pairs)
    }

    #[test]
    fn children_of_owned_nodes_are_moved() {
        let mut parent: Cow<'_, Value> = Cow::Owned(Value::from(vec!["x", "y"]));
        assert_eq!(take_child(&mut parent, "1"), Some(Cow::Owned(Value::from("y"))));
        assert_eq!(take_child(&mut parent, "1"), Some(Cow::Owned(Value::Undefined)));
        assert_eq!(take_child(&mut parent, "01"), None);
    }

    #[test]
    fn shared_subtrees_keep_order() {
        let inner = Value::Object(Map::from_iter([("b", "1"), ("c", "2")])).shared();
        let value = Value::from(vec![inner.clone(), Value::from("x"), inner]);
        let options = EncodeOptions::new().encode(false);
        assert_eq!(
            walk(&value, &options).unwrap(),
            ["a[0][b]=1", "a[0][c]=2", "a[1]=x", "a[2][b]=1", "a[2][c]=2"]
        );
    }

    #[test]
    fn filter_runs_before_shared_nodes_are_followed() {
        let options = EncodeOptions::new()
            .encode(false)
            .filter(Filter::function(|path, value| {
                if path == "a[b]" {
                    Value::from("replaced")
                } else {
                    value.clone()
                }
            }));
        let value = Value::Object(Map::from_iter([("b", Value::from("x").shared())]));
        assert_eq!(walk(&value, &options).unwrap(), ["a[b]=replaced"]);
    }
}
