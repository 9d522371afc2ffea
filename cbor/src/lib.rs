/*!
A streaming codec for the RFC 8949 CBOR interchange subset.

The codec is bidirectional and incremental: the [`encode`] side turns
dynamic [`Value`]s into a sequence of size-bounded chunks, the [`decode`]
side turns a sequence of chunks back into values, and neither needs the
complete input or output in memory.

Supported wire format: definite-length items of major types 0-5 and 7, with
text-string map keys. Tags, indefinite lengths, duplicate or non-string map
keys, and integers outside the exactly-representable double range are hard
errors, never silent coercions.
*/

pub mod decode;
pub mod encode;

mod error;
mod rope;
mod value;


#[cfg(test)]
mod encode_tests;

pub use error::{BoxError, Error};
pub use value::{PathSegment, Value};

/// An IEEE 754 float width on the wire.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum FloatWidth {
    /// binary16, 2 payload bytes.
    #[default]
    F16,
    /// binary32, 4 payload bytes.
    F32,
    /// binary64, 8 payload bytes.
    F64,
}
