use thiserror::Error;

/// Errors raised from within transform hooks, propagated unchanged.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Everything that can go wrong while encoding or decoding.
///
/// No error is recovered internally: the current traversal is abandoned and,
/// on a streaming adapter, the stream ends. Output already produced before
/// the error remains produced.
#[derive(Error, Debug)]
pub enum Error {
    /// An integer on the wire cannot be represented exactly by the value
    /// model. Carries the original value.
    #[error("integer {0} is outside the exactly-representable range")]
    UnsafeInteger(i128),

    /// A semantic tag (major type 6) was encountered.
    #[error("tagged item {0} is not supported")]
    UnsupportedTag(u64),

    /// An indefinite-length string, array or map was encountered.
    #[error("indefinite-length items are not supported")]
    IndefiniteLength,

    /// A "break" stop code (major type 7, additional info 31) was found
    /// outside any indefinite-length item.
    #[error("unexpected break stop code")]
    UnexpectedBreak,

    /// A simple value outside false/true/null/undefined.
    #[error("unassigned simple value {0}")]
    UnassignedSimple(u8),

    /// Additional info 28-30, or 31 where no argument may follow.
    #[error("invalid additional-info value {0}")]
    InvalidAdditionalInfo(u8),

    /// A text string or map key is not valid UTF-8.
    #[error(transparent)]
    InvalidUtf8(#[from] core::str::Utf8Error),

    /// A map key with a major type other than 3.
    #[error("map key is not a text string")]
    NonStringKey,

    /// The same key appeared twice within one map.
    #[error("duplicate map key {0:?}")]
    DuplicateKey(String),

    /// An encoded float is narrower than the configured minimum width.
    #[error("float narrower than the configured minimum width")]
    FloatBelowMinimum,

    /// The input ended in the middle of an item.
    #[error("need at least {0} more bytes to decode value")]
    PrematureEnd(usize),

    /// One-shot decode consumed a complete value but bytes remain.
    #[error("additional bytes after the decoded value")]
    TrailingBytes,

    /// An item's declared length exceeds addressable memory.
    #[error("an encoded item requires more memory than available")]
    TooBig,

    /// Undefined was encountered while `allow_undefined` is off.
    #[error("undefined value disallowed by options")]
    UndefinedDisallowed,

    /// Nesting deeper than the configured `max_depth`.
    #[error("maximum nesting depth reached")]
    MaxDepth,

    /// An error raised by an `on_key`/`on_value` hook, propagated unchanged.
    #[error(transparent)]
    Hook(BoxError),

    /// A write or read against a streaming endpoint that has been closed,
    /// aborted or cancelled.
    #[error("stream closed")]
    StreamClosed,
}
