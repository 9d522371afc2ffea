/*!
Asynchronous adapters for the `brook-cbor` codec.

The core codec is a pull-style state machine; this crate bridges it to async
byte and value streams without unbounded buffering. Each adapter pairs the
synchronous codec, running on a blocking worker, with one-slot bounded
channels on both sides: the producer is held to the rate at which the codec
consumes, and the codec is held to the rate at which the consumer pulls.

- [`decode::stream`] / [`encode::stream`]: pull-style, `futures::Stream` in
  and out.
- [`decode::duplex`] / [`encode::duplex`]: push-style endpoints. The decode
  writer's `write` resolves only once the decoder has fully consumed the
  chunk; the encode worker suspends on every emitted chunk until the reader
  pulls it.

All adapters must be created inside a tokio runtime.
*/

pub mod decode;
pub mod encode;
