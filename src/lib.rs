//! Querystring encoding and decoding for nested values.
//!
//! Querystrings are not formally defined and loosely take the form of
//! _nested_ urlencoded queries: `a[b][0]=c&a[d]=e`. This library follows
//! the syntax and behavior of the JavaScript [qs](https://github.com/ljharb/qs)
//! library, so strings produced by one decode identically in the other.
//!
//! Rather than targeting typed structs, everything goes through a dynamic
//! [`Value`] tree (maps keep insertion order). This keeps the odd corners
//! of the format representable: sparse lists, lists that turned into maps
//! after growing past a limit, and keys that are only present as `a`.
//!
//! ## Decoding
//!
//! ```
//! use qs_codec::{decode_str, DecodeOptions, Map, Value};
//!
//! let decoded = decode_str("a[b]=c&a[e][]=f&a[e][]=g", &DecodeOptions::new()).unwrap();
//!
//! let mut inner = Map::new();
//! inner.insert("b", "c");
//! inner.insert("e", vec!["f", "g"]);
//! assert_eq!(decoded.get("a"), Some(&Value::Object(inner)));
//! ```
//!
//! Bracket and dot notation, list indices, duplicates, charsets and the
//! various limits are controlled through [`DecodeOptions`].
//!
//! ## Encoding
//!
//! ```
//! use qs_codec::{encode, EncodeOptions, ListFormat, Map, Value};
//!
//! let mut map = Map::new();
//! map.insert("a", vec!["b", "c"]);
//! map.insert("d", "e f");
//! let data = Value::Object(map);
//!
//! assert_eq!(
//!     encode(&data, &EncodeOptions::new()).unwrap(),
//!     "a%5B0%5D=b&a%5B1%5D=c&d=e%20f"
//! );
//! assert_eq!(
//!     encode(&data, &EncodeOptions::new().list_format(ListFormat::Repeat)).unwrap(),
//!     "a=b&a=c&d=e%20f"
//! );
//! ```
//!
//! ## Serde
//!
//! [`Value`] and [`Map`] implement `Serialize`, and `Value` implements
//! `Deserialize`, so decoded trees can be handed on to any serde format.
//!
//! ## Logging
//!
//! Decoding and encoding emit `tracing` events at `debug` (one per call) and
//! `trace` (limit and charset decisions) level.

mod config;
mod de;
mod error;
mod map;
mod ser;
pub mod utils;
mod value;

#[doc(inline)]
pub use config::{
    Charset, DateSerializerFn, DecodeKind, DecodeOptions, DecoderFn, Delimiter, Duplicates,
    EncodeOptions, EncoderFn, Filter, FilterFn, Format, Hook, ListFormat, Sentinel, SortFn,
};
#[doc(inline)]
pub use de::{decode, decode_str};
#[doc(inline)]
pub use error::{Error, Result};
#[doc(inline)]
pub use map::Map;
#[doc(inline)]
pub use ser::encode;
#[doc(inline)]
pub use value::{SharedValue, Value};
