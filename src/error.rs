use thiserror::Error;

/// Errors produced while decoding or encoding a querystring.
///
/// Malformed percent sequences and malformed numeric entities are never
/// errors: they are passed through as literal text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The call itself was malformed, e.g. an unsupported input type
    /// or a parameter limit of zero.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A parameter, list, or depth limit was exceeded while the
    /// corresponding `throw` option was enabled.
    #[error("{0}")]
    LimitExceeded(String),

    /// The requested charset is not one of `utf-8` or `iso-8859-1`.
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// The value being encoded contains itself.
    #[error("Cyclic object value")]
    CyclicReference,
}

impl Error {
    pub(crate) fn parameter_limit(limit: usize) -> Self {
        Error::LimitExceeded(format!(
            "Parameter limit exceeded. Only {limit} parameter{} allowed.",
            if limit == 1 { "" } else { "s" }
        ))
    }

    pub(crate) fn list_limit(limit: isize) -> Self {
        Error::LimitExceeded(format!(
            "List limit exceeded. Only {limit} element{} allowed in a list.",
            if limit == 1 { "" } else { "s" }
        ))
    }

    pub(crate) fn depth_limit(depth: usize) -> Self {
        Error::LimitExceeded(format!(
            "Input depth exceeded depth option of {depth} and strictDepth is true"
        ))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
