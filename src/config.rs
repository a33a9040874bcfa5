use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{Error, Result};
use crate::Value;

/// Character set used to percent-encode and -decode values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Charset {
    #[default]
    Utf8,
    /// Latin-1. Characters outside of it are written as numeric
    /// entities (`&#9786;`) when encoding.
    Iso88591,
}

impl FromStr for Charset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => Ok(Charset::Iso88591),
            _ => Err(Error::UnsupportedCharset(s.to_owned())),
        }
    }
}

/// Output dialect for percent-encoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    /// Spaces are written as `%20`.
    #[default]
    Rfc3986,
    /// Spaces are written as `+`, and `(`/`)` are left unescaped.
    Rfc1738,
}

impl Format {
    /// Applies the final rewrite of this format to an already-encoded string.
    pub fn format<'a>(self, encoded: &'a str) -> Cow<'a, str> {
        match self {
            Format::Rfc3986 => Cow::Borrowed(encoded),
            Format::Rfc1738 if encoded.contains("%20") => Cow::Owned(encoded.replace("%20", "+")),
            Format::Rfc1738 => Cow::Borrowed(encoded),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ListFormat {
    /// Use the `a[0]=b&a[1]=c` format.
    #[default]
    Indices,
    /// Use the `a[]=b&a[]=c` format.
    Brackets,
    /// Use the `a=b&a=c` format.
    Repeat,
    /// Use the `a=b,c` format.
    Comma,
}

/// What to do when the same flat key appears more than once.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Duplicates {
    /// Collect every value into a list.
    #[default]
    Combine,
    /// Keep the first value.
    First,
    /// Keep the last value.
    Last,
}

/// Tells a custom decoder whether it is decoding a key or a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecodeKind {
    Key,
    Value,
}

/// The `utf8=` parameter used to announce the charset of a querystring.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Sentinel {
    /// What browsers send for a `✓` in an ISO-8859-1 form: `&#10003;`.
    Iso,
    /// A `✓` in UTF-8.
    Charset,
}

impl Sentinel {
    pub const PARAM_NAME: &'static str = "utf8";

    /// The unencoded checkmark.
    pub const fn raw(self) -> &'static str {
        match self {
            Sentinel::Iso => "&#10003;",
            Sentinel::Charset => "\u{2713}",
        }
    }

    /// The full `utf8=...` parameter as it appears on the wire.
    pub const fn encoded(self) -> &'static str {
        match self {
            Sentinel::Iso => "utf8=%26%2310003%3B",
            Sentinel::Charset => "utf8=%E2%9C%93",
        }
    }

    pub const fn for_charset(charset: Charset) -> Self {
        match charset {
            Charset::Utf8 => Sentinel::Charset,
            Charset::Iso88591 => Sentinel::Iso,
        }
    }
}

/// Splits the raw querystring into parameters.
#[derive(Clone, Debug)]
pub enum Delimiter {
    Str(Cow<'static, str>),
    Regex(Regex),
}

impl Delimiter {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            Delimiter::Str(s) => s,
            Delimiter::Regex(re) => re.as_str(),
        }
    }
}

impl From<&'static str> for Delimiter {
    fn from(s: &'static str) -> Self {
        Delimiter::Str(Cow::Borrowed(s))
    }
}

impl From<String> for Delimiter {
    fn from(s: String) -> Self {
        Delimiter::Str(Cow::Owned(s))
    }
}

impl From<Regex> for Delimiter {
    fn from(re: Regex) -> Self {
        Delimiter::Regex(re)
    }
}

/// A caller-supplied function stored on an options struct.
pub struct Hook<F: ?Sized>(Arc<F>);

impl<F: ?Sized> Clone for Hook<F> {
    fn clone(&self) -> Self {
        Hook(Arc::clone(&self.0))
    }
}

impl<F: ?Sized> fmt::Debug for Hook<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<fn>")
    }
}

impl<F: ?Sized> std::ops::Deref for Hook<F> {
    type Target = F;

    fn deref(&self) -> &F {
        &self.0
    }
}

pub type DecoderFn = dyn Fn(&str, Charset, DecodeKind) -> Option<String> + Send + Sync;
pub type EncoderFn = dyn Fn(&Value, Charset, Format) -> String + Send + Sync;
pub type DateSerializerFn = dyn Fn(&DateTime<Utc>) -> String + Send + Sync;
pub type SortFn = dyn Fn(&str, &str) -> Ordering + Send + Sync;
pub type FilterFn = dyn Fn(&str, &Value) -> Value + Send + Sync;

/// Restricts or rewrites what gets encoded.
#[derive(Clone, Debug)]
pub enum Filter {
    /// Called with the key path and value of every node (the root is
    /// called with an empty path). The returned value replaces the
    /// original; returning [`Value::Undefined`] drops the node.
    Function(Hook<FilterFn>),
    /// Only these keys (or list indices) are encoded, in this order.
    Keys(Vec<String>),
}

impl Filter {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&str, &Value) -> Value + Send + Sync + 'static,
    {
        Filter::Function(Hook(Arc::new(f)))
    }

    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Keys(keys.into_iter().map(Into::into).collect())
    }
}

/// Configuration for decoding a querystring.
///
/// All options start from the defaults of the `qs` JavaScript library and
/// are changed through chained setters:
///
/// ```
/// use qs_codec::{decode_str, DecodeOptions, Map, Value};
///
/// let options = DecodeOptions::new().allow_dots(true).depth(1);
/// let decoded = decode_str("a.b.c=d", &options).unwrap();
///
/// let mut inner = Map::new();
/// inner.insert("[c]", "d");
/// let mut middle = Map::new();
/// middle.insert("b", Value::Object(inner));
/// assert_eq!(decoded.get("a"), Some(&Value::Object(middle)));
/// ```
///
/// ## Limits
///
/// `depth`, `parameter_limit` and `list_limit` bound the work done for
/// hostile input. By default exceeding them truncates silently; set
/// `throw_on_limit_exceeded` (and `strict_depth` for depth) to get an
/// [`Error::LimitExceeded`] instead.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    pub(crate) allow_dots: Option<bool>,
    pub(crate) decode_dot_in_keys: bool,
    pub(crate) allow_empty_lists: bool,
    pub(crate) allow_sparse_lists: bool,
    pub(crate) list_limit: isize,
    pub(crate) charset: Charset,
    pub(crate) charset_sentinel: bool,
    pub(crate) comma: bool,
    pub(crate) delimiter: Delimiter,
    pub(crate) depth: usize,
    pub(crate) parameter_limit: usize,
    pub(crate) duplicates: Duplicates,
    pub(crate) ignore_query_prefix: bool,
    pub(crate) interpret_numeric_entities: bool,
    pub(crate) parse_lists: bool,
    pub(crate) strict_depth: bool,
    pub(crate) strict_null_handling: bool,
    pub(crate) throw_on_limit_exceeded: bool,
    pub(crate) decoder: Option<Hook<DecoderFn>>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeOptions {
    pub const fn new() -> Self {
        Self {
            allow_dots: None,
            decode_dot_in_keys: false,
            allow_empty_lists: false,
            allow_sparse_lists: false,
            list_limit: 20,
            charset: Charset::Utf8,
            charset_sentinel: false,
            comma: false,
            delimiter: Delimiter::Str(Cow::Borrowed("&")),
            depth: 5,
            parameter_limit: 1000,
            duplicates: Duplicates::Combine,
            ignore_query_prefix: false,
            interpret_numeric_entities: false,
            parse_lists: true,
            strict_depth: false,
            strict_null_handling: false,
            throw_on_limit_exceeded: false,
            decoder: None,
        }
    }

    /// Treat `a.b` like `a[b]`. Defaults to the value of `decode_dot_in_keys`.
    pub const fn allow_dots(mut self, allow_dots: bool) -> Self {
        self.allow_dots = Some(allow_dots);
        self
    }

    /// Decode `%2E` inside key segments to a literal `.`. Default is `false`.
    ///
    /// Enabling this also enables `allow_dots` unless it was set explicitly.
    pub const fn decode_dot_in_keys(mut self, decode_dot_in_keys: bool) -> Self {
        self.decode_dot_in_keys = decode_dot_in_keys;
        self
    }

    /// Decode `a[]` (with an empty value) as an empty list. Default is `false`.
    pub const fn allow_empty_lists(mut self, allow_empty_lists: bool) -> Self {
        self.allow_empty_lists = allow_empty_lists;
        self
    }

    /// Keep holes in lists as `Null` instead of compacting them. Default is `false`.
    pub const fn allow_sparse_lists(mut self, allow_sparse_lists: bool) -> Self {
        self.allow_sparse_lists = allow_sparse_lists;
        self
    }

    /// The highest list index that still produces a list; larger indices
    /// produce maps. A negative limit disables lists entirely. Default is 20.
    pub const fn list_limit(mut self, list_limit: isize) -> Self {
        self.list_limit = list_limit;
        self
    }

    /// Default is UTF-8.
    pub const fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Let a `utf8=` parameter pick the charset. Default is `false`.
    pub const fn charset_sentinel(mut self, charset_sentinel: bool) -> Self {
        self.charset_sentinel = charset_sentinel;
        self
    }

    /// Split values on `,` into lists. Default is `false`.
    pub const fn comma(mut self, comma: bool) -> Self {
        self.comma = comma;
        self
    }

    /// A string or [`Regex`] to split parameters on. Default is `&`.
    pub fn delimiter(mut self, delimiter: impl Into<Delimiter>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Maximum number of bracket segments in a key. Default is 5.
    ///
    /// A depth of 0 disables nesting: keys are used verbatim.
    pub const fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Maximum number of parameters to read. Default is 1000.
    ///
    /// `usize::MAX` means no limit.
    pub const fn parameter_limit(mut self, parameter_limit: usize) -> Self {
        self.parameter_limit = parameter_limit;
        self
    }

    /// Default is [`Duplicates::Combine`].
    pub const fn duplicates(mut self, duplicates: Duplicates) -> Self {
        self.duplicates = duplicates;
        self
    }

    /// Strip a leading `?`. Default is `false`.
    pub const fn ignore_query_prefix(mut self, ignore_query_prefix: bool) -> Self {
        self.ignore_query_prefix = ignore_query_prefix;
        self
    }

    /// Turn `&#9786;` into `☺` when decoding ISO-8859-1. Default is `false`.
    pub const fn interpret_numeric_entities(mut self, interpret_numeric_entities: bool) -> Self {
        self.interpret_numeric_entities = interpret_numeric_entities;
        self
    }

    /// Default is `true`. When `false`, `a[0]=b` decodes to `{a: {"0": b}}`.
    pub const fn parse_lists(mut self, parse_lists: bool) -> Self {
        self.parse_lists = parse_lists;
        self
    }

    /// Fail instead of folding the rest of an over-deep key into one segment.
    /// Default is `false`.
    pub const fn strict_depth(mut self, strict_depth: bool) -> Self {
        self.strict_depth = strict_depth;
        self
    }

    /// Decode `a` (no `=`) as `Null` rather than `""`. Default is `false`.
    pub const fn strict_null_handling(mut self, strict_null_handling: bool) -> Self {
        self.strict_null_handling = strict_null_handling;
        self
    }

    /// Fail when the parameter or list limit is exceeded. Default is `false`.
    pub const fn throw_on_limit_exceeded(mut self, throw_on_limit_exceeded: bool) -> Self {
        self.throw_on_limit_exceeded = throw_on_limit_exceeded;
        self
    }

    /// Replaces the default percent-decoder for keys and values.
    ///
    /// Returning `None` decodes a value to `Null` (and drops the parameter
    /// when decoding a key).
    pub fn decoder<F>(mut self, decoder: F) -> Self
    where
        F: Fn(&str, Charset, DecodeKind) -> Option<String> + Send + Sync + 'static,
    {
        self.decoder = Some(Hook(Arc::new(decoder)));
        self
    }

    pub(crate) fn dots_enabled(&self) -> bool {
        self.allow_dots.unwrap_or(self.decode_dot_in_keys)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.parameter_limit == 0 {
            return Err(Error::InvalidArgument(
                "Parameter limit must be a positive integer.".to_owned(),
            ));
        }
        if self.decode_dot_in_keys && self.allow_dots == Some(false) {
            return Err(Error::InvalidArgument(
                "decodeDotInKeys requires allowDots to be true".to_owned(),
            ));
        }
        if self.delimiter.as_str().is_empty() {
            return Err(Error::InvalidArgument(
                "Delimiter must not be empty.".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Configuration for encoding a value into a querystring.
///
/// ```
/// use qs_codec::{encode, EncodeOptions, ListFormat, Map, Value};
///
/// let mut map = Map::new();
/// map.insert("a", vec!["b", "c"]);
///
/// let options = EncodeOptions::new()
///     .list_format(ListFormat::Brackets)
///     .encode_values_only(true);
/// assert_eq!(encode(&Value::Object(map), &options).unwrap(), "a[]=b&a[]=c");
/// ```
#[derive(Clone, Debug)]
pub struct EncodeOptions {
    pub(crate) add_query_prefix: bool,
    pub(crate) allow_dots: Option<bool>,
    pub(crate) allow_empty_lists: bool,
    pub(crate) list_format: ListFormat,
    pub(crate) charset: Charset,
    pub(crate) charset_sentinel: bool,
    pub(crate) comma_round_trip: bool,
    pub(crate) comma_compact_nulls: bool,
    pub(crate) delimiter: Cow<'static, str>,
    pub(crate) encode: bool,
    pub(crate) encode_dot_in_keys: bool,
    pub(crate) encode_values_only: bool,
    pub(crate) format: Format,
    pub(crate) skip_nulls: bool,
    pub(crate) strict_null_handling: bool,
    pub(crate) encoder: Option<Hook<EncoderFn>>,
    pub(crate) serialize_date: Option<Hook<DateSerializerFn>>,
    pub(crate) sort: Option<Hook<SortFn>>,
    pub(crate) filter: Option<Filter>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl EncodeOptions {
    pub const fn new() -> Self {
        Self {
            add_query_prefix: false,
            allow_dots: None,
            allow_empty_lists: false,
            list_format: ListFormat::Indices,
            charset: Charset::Utf8,
            charset_sentinel: false,
            comma_round_trip: false,
            comma_compact_nulls: false,
            delimiter: Cow::Borrowed("&"),
            encode: true,
            encode_dot_in_keys: false,
            encode_values_only: false,
            format: Format::Rfc3986,
            skip_nulls: false,
            strict_null_handling: false,
            encoder: None,
            serialize_date: None,
            sort: None,
            filter: None,
        }
    }

    /// Prefix the output with `?`. Default is `false`.
    pub const fn add_query_prefix(mut self, add_query_prefix: bool) -> Self {
        self.add_query_prefix = add_query_prefix;
        self
    }

    /// Write nested keys as `a.b` instead of `a[b]`. Defaults to the value
    /// of `encode_dot_in_keys`.
    pub const fn allow_dots(mut self, allow_dots: bool) -> Self {
        self.allow_dots = Some(allow_dots);
        self
    }

    /// Write empty lists as `a[]`. Default is `false`, which omits them.
    pub const fn allow_empty_lists(mut self, allow_empty_lists: bool) -> Self {
        self.allow_empty_lists = allow_empty_lists;
        self
    }

    /// Specifies how lists are written.
    ///
    /// The default is `Indices`, which results in keys like `a[0]=1&a[1]=2`.
    pub const fn list_format(mut self, list_format: ListFormat) -> Self {
        self.list_format = list_format;
        self
    }

    /// Default is UTF-8.
    pub const fn charset(mut self, charset: Charset) -> Self {
        self.charset = charset;
        self
    }

    /// Prepend a `utf8=✓` parameter announcing the charset. Default is `false`.
    pub const fn charset_sentinel(mut self, charset_sentinel: bool) -> Self {
        self.charset_sentinel = charset_sentinel;
        self
    }

    /// With [`ListFormat::Comma`], write single-element lists as `a[]=b`
    /// so they decode back into lists. Default is `false`.
    pub const fn comma_round_trip(mut self, comma_round_trip: bool) -> Self {
        self.comma_round_trip = comma_round_trip;
        self
    }

    /// With [`ListFormat::Comma`], drop nulls before joining. Default is `false`.
    pub const fn comma_compact_nulls(mut self, comma_compact_nulls: bool) -> Self {
        self.comma_compact_nulls = comma_compact_nulls;
        self
    }

    /// Default is `&`.
    pub fn delimiter(mut self, delimiter: impl Into<Cow<'static, str>>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Percent-encode keys and values. Default is `true`.
    pub const fn encode(mut self, encode: bool) -> Self {
        self.encode = encode;
        self
    }

    /// Write `.` inside keys as `%2E`. Default is `false`.
    ///
    /// Enabling this also enables `allow_dots` unless it was set explicitly.
    pub const fn encode_dot_in_keys(mut self, encode_dot_in_keys: bool) -> Self {
        self.encode_dot_in_keys = encode_dot_in_keys;
        self
    }

    /// Percent-encode values but leave keys untouched. Default is `false`.
    pub const fn encode_values_only(mut self, encode_values_only: bool) -> Self {
        self.encode_values_only = encode_values_only;
        self
    }

    /// Default is [`Format::Rfc3986`].
    pub const fn format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Omit keys whose value is `Null`. Default is `false`.
    pub const fn skip_nulls(mut self, skip_nulls: bool) -> Self {
        self.skip_nulls = skip_nulls;
        self
    }

    /// Write `Null` as a bare key (`a`) rather than `a=`. Default is `false`.
    pub const fn strict_null_handling(mut self, strict_null_handling: bool) -> Self {
        self.strict_null_handling = strict_null_handling;
        self
    }

    /// Replaces the default percent-encoder. It receives key paths as
    /// [`Value::String`] as well as every scalar value.
    pub fn encoder<F>(mut self, encoder: F) -> Self
    where
        F: Fn(&Value, Charset, Format) -> String + Send + Sync + 'static,
    {
        self.encoder = Some(Hook(Arc::new(encoder)));
        self
    }

    /// Replaces the default date rendering (`2023-01-01T00:00:00.001Z`).
    pub fn serialize_date<F>(mut self, serialize_date: F) -> Self
    where
        F: Fn(&DateTime<Utc>) -> String + Send + Sync + 'static,
    {
        self.serialize_date = Some(Hook(Arc::new(serialize_date)));
        self
    }

    /// Orders keys at every level of nesting.
    pub fn sort<F>(mut self, sort: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.sort = Some(Hook(Arc::new(sort)));
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub(crate) fn dots_enabled(&self) -> bool {
        self.allow_dots.unwrap_or(self.encode_dot_in_keys)
    }
}
