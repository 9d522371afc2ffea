/*!
A streaming CBOR encoder for dynamic values.

The encoder walks a [`Value`] tree and appends its wire form to a
fixed-capacity output buffer. Whenever the buffer fills, one chunk is handed
to the [`ChunkSink`]; after the last value, [`Encoder::finish`] flushes the
partial tail chunk. Neither the complete input nor the complete output is
ever required to be in memory at once.

Every integer argument is emitted at the smallest width that holds it, and
floats are downcast to the narrowest IEEE 754 width that round-trips the
value exactly, bounded below by [`EncodeOptions::min_float_size`].

# Usage

```
use brook_cbor::{encode, Value};

let value = Value::map([("a", Value::Integer(1))]);
let bytes = encode::emit(&value, &encode::EncodeOptions::default()).unwrap();
assert_eq!(bytes, vec![0xA1, 0x61, b'a', 0x01]);
```
*/
use crate::value::{PathSegment, Value};
use crate::{BoxError, Error, FloatWidth};
use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// Transform hook consulted for every value before it is encoded.
///
/// Returning `Some` encodes the replacement instead of the original;
/// returning an error aborts the traversal.
pub type ValueHook =
    Box<dyn Fn(&Value, &[PathSegment]) -> Result<Option<Value>, BoxError> + Send>;

/// Transform hook consulted for every map key before it is encoded.
pub type KeyHook = Box<dyn Fn(&str) -> Result<Option<String>, BoxError> + Send>;

/// Encoder configuration.
pub struct EncodeOptions {
    /// When false, encoding [`Value::Undefined`] is an error.
    pub allow_undefined: bool,
    /// When true, every emitted chunk borrows the one backing buffer, which
    /// is reused for the next chunk; the sink must copy before returning.
    pub chunk_recycling: bool,
    /// Output chunk capacity in bytes.
    pub chunk_size: usize,
    /// Narrowest float width the encoder may emit.
    pub min_float_size: FloatWidth,
    pub on_value: Option<ValueHook>,
    pub on_key: Option<KeyHook>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            allow_undefined: true,
            chunk_recycling: false,
            chunk_size: 4096,
            min_float_size: FloatWidth::F16,
            on_value: None,
            on_key: None,
        }
    }
}

/// One output chunk, with the ownership semantics of the recycling option
/// made explicit.
pub enum OutChunk<'a> {
    /// Independently owned storage, valid indefinitely.
    Fresh(Bytes),
    /// A view over the encoder's recycled buffer, valid only for the
    /// duration of the [`ChunkSink::accept`] call.
    Recycled(&'a [u8]),
}

impl OutChunk<'_> {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            OutChunk::Fresh(b) => b,
            OutChunk::Recycled(v) => v,
        }
    }

    /// Takes ownership, copying if the chunk is a recycled view.
    pub fn into_bytes(self) -> Bytes {
        match self {
            OutChunk::Fresh(b) => b,
            OutChunk::Recycled(v) => Bytes::copy_from_slice(v),
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

/// Consumer of the encoder's chunk sequence.
pub trait ChunkSink {
    fn accept(&mut self, chunk: OutChunk<'_>) -> Result<(), Error>;
}

/// Accumulates all chunks into one contiguous buffer.
impl ChunkSink for Vec<u8> {
    fn accept(&mut self, chunk: OutChunk<'_>) -> Result<(), Error> {
        self.extend_from_slice(chunk.as_slice());
        Ok(())
    }
}

/// Collects owned chunks, copying recycled views.
impl ChunkSink for VecDeque<Bytes> {
    fn accept(&mut self, chunk: OutChunk<'_>) -> Result<(), Error> {
        self.push_back(chunk.into_bytes());
        Ok(())
    }
}

/// Adapts a closure into a [`ChunkSink`].
pub struct FnSink<F>(pub F);

impl<F> ChunkSink for FnSink<F>
where
    F: FnMut(OutChunk<'_>) -> Result<(), Error>,
{
    fn accept(&mut self, chunk: OutChunk<'_>) -> Result<(), Error> {
        (self.0)(chunk)
    }
}

/// Fixed-capacity append buffer that emits a chunk when full.
struct OutBuf {
    buf: BytesMut,
    cap: usize,
    recycle: bool,
}

impl OutBuf {
    fn new(cap: usize, recycle: bool) -> Self {
        let cap = cap.max(1);
        Self {
            buf: BytesMut::with_capacity(cap),
            cap,
            recycle,
        }
    }

    fn write<S: ChunkSink>(&mut self, sink: &mut S, mut bytes: &[u8]) -> Result<(), Error> {
        while !bytes.is_empty() {
            let room = self.cap - self.buf.len();
            if room == 0 {
                self.emit(sink)?;
                continue;
            }
            let take = room.min(bytes.len());
            self.buf.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
        }
        Ok(())
    }

    fn push<S: ChunkSink>(&mut self, sink: &mut S, byte: u8) -> Result<(), Error> {
        if self.buf.len() == self.cap {
            self.emit(sink)?;
        }
        self.buf.extend_from_slice(&[byte]);
        Ok(())
    }

    fn emit<S: ChunkSink>(&mut self, sink: &mut S) -> Result<(), Error> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.recycle {
            sink.accept(OutChunk::Recycled(&self.buf))?;
            self.buf.clear();
        } else {
            sink.accept(OutChunk::Fresh(self.buf.split().freeze()))?;
            self.buf.reserve(self.cap);
        }
        Ok(())
    }
}

/// A stateful encoder over a [`ChunkSink`].
///
/// Feed it any number of top-level values, then call [`Encoder::finish`] to
/// flush the partial tail chunk and recover the sink.
pub struct Encoder<'o, S: ChunkSink> {
    opts: &'o EncodeOptions,
    sink: S,
    buf: OutBuf,
    path: Vec<PathSegment>,
}

impl<'o, S: ChunkSink> Encoder<'o, S> {
    pub fn new(sink: S, opts: &'o EncodeOptions) -> Self {
        Self {
            sink,
            buf: OutBuf::new(opts.chunk_size, opts.chunk_recycling),
            path: Vec::new(),
            opts,
        }
    }

    /// Encodes one top-level value.
    pub fn feed(&mut self, value: &Value) -> Result<(), Error> {
        self.path.clear();
        self.emit_value(value)
    }

    /// Emits any buffered partial chunk.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.buf.emit(&mut self.sink)
    }

    /// Flushes and returns the sink.
    pub fn finish(mut self) -> Result<S, Error> {
        self.flush()?;
        Ok(self.sink)
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn emit_value(&mut self, value: &Value) -> Result<(), Error> {
        if let Some(hook) = &self.opts.on_value
            && let Some(replacement) = hook(value, &self.path).map_err(Error::Hook)?
        {
            // The replacement's own node is not re-hooked, its children are.
            return self.emit_item(&replacement);
        }
        self.emit_item(value)
    }

    fn emit_item(&mut self, value: &Value) -> Result<(), Error> {
        match value {
            Value::Integer(n) => {
                if *n > Value::MAX_INTEGER || *n < Value::MIN_INTEGER {
                    Err(Error::UnsafeInteger(*n as i128))
                } else if *n >= 0 {
                    self.emit_uint(0, *n as u64)
                } else {
                    self.emit_uint(1, n.unsigned_abs() - 1)
                }
            }
            Value::Bytes(b) => {
                self.emit_uint(2, b.len() as u64)?;
                self.write(b)
            }
            Value::Text(s) => {
                // str is UTF-8 already: the byte length is exact and the
                // payload transcodes by straight copy, split across chunk
                // emits as needed.
                self.emit_uint(3, s.len() as u64)?;
                self.write(s.as_bytes())
            }
            Value::Array(items) => {
                self.emit_uint(4, items.len() as u64)?;
                for (idx, item) in items.iter().enumerate() {
                    self.path.push(PathSegment::Index(idx));
                    let r = self.emit_value(item);
                    self.path.pop();
                    r?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                self.emit_uint(5, entries.len() as u64)?;
                for (key, item) in entries {
                    let key = match &self.opts.on_key {
                        Some(hook) => hook(key)
                            .map_err(Error::Hook)?
                            .unwrap_or_else(|| key.clone()),
                        None => key.clone(),
                    };
                    self.emit_uint(3, key.len() as u64)?;
                    self.write(key.as_bytes())?;
                    self.path.push(PathSegment::Key(key));
                    let r = self.emit_value(item);
                    self.path.pop();
                    r?;
                }
                Ok(())
            }
            Value::Bool(b) => self.push_byte((7 << 5) | if *b { 21 } else { 20 }),
            Value::Null => self.push_byte((7 << 5) | 22),
            Value::Undefined => {
                if !self.opts.allow_undefined {
                    return Err(Error::UndefinedDisallowed);
                }
                self.push_byte((7 << 5) | 23)
            }
            Value::Float(v) => self.emit_float(*v),
        }
    }

    fn emit_uint(&mut self, major: u8, val: u64) -> Result<(), Error> {
        const U8_END: u64 = (u8::MAX as u64) + 1;
        const U16_END: u64 = (u16::MAX as u64) + 1;
        const U32_END: u64 = (u32::MAX as u64) + 1;

        match val {
            0..24 => self.push_byte((major << 5) | (val as u8)),
            24..U8_END => {
                self.push_byte((major << 5) | 24)?;
                self.push_byte(val as u8)
            }
            U8_END..U16_END => {
                self.push_byte((major << 5) | 25)?;
                self.write(&(val as u16).to_be_bytes())
            }
            U16_END..U32_END => {
                self.push_byte((major << 5) | 26)?;
                self.write(&(val as u32).to_be_bytes())
            }
            _ => {
                self.push_byte((major << 5) | 27)?;
                self.write(&val.to_be_bytes())
            }
        }
    }

    fn emit_float(&mut self, v: f64) -> Result<(), Error> {
        if v.is_nan() {
            // Canonical quiet NaN at the narrowest permitted width.
            return match self.opts.min_float_size {
                FloatWidth::F16 => {
                    self.push_byte((7 << 5) | 25)?;
                    self.write(&half::f16::NAN.to_be_bytes())
                }
                FloatWidth::F32 => {
                    self.push_byte((7 << 5) | 26)?;
                    self.write(&f32::NAN.to_be_bytes())
                }
                FloatWidth::F64 => {
                    self.push_byte((7 << 5) | 27)?;
                    self.write(&f64::NAN.to_be_bytes())
                }
            };
        }
        // Narrow only when the downcast converts back to the identical
        // double; out-of-range values saturate on conversion and fail the
        // comparison, so they fall through to a wider width.
        if self.opts.min_float_size <= FloatWidth::F16 {
            let narrow = half::f16::from_f64(v);
            if f64::from(narrow) == v {
                self.push_byte((7 << 5) | 25)?;
                return self.write(&narrow.to_be_bytes());
            }
        }
        if self.opts.min_float_size <= FloatWidth::F32 {
            let narrow = v as f32;
            if narrow as f64 == v {
                self.push_byte((7 << 5) | 26)?;
                return self.write(&narrow.to_be_bytes());
            }
        }
        self.push_byte((7 << 5) | 27)?;
        self.write(&v.to_be_bytes())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.buf.write(&mut self.sink, bytes)
    }

    fn push_byte(&mut self, byte: u8) -> Result<(), Error> {
        self.buf.push(&mut self.sink, byte)
    }
}

/// Encodes a single value into a contiguous byte vector.
pub fn emit(value: &Value, opts: &EncodeOptions) -> Result<Vec<u8>, Error> {
    let mut encoder = Encoder::new(Vec::new(), opts);
    encoder.feed(value)?;
    encoder.finish()
}

/// Encodes an iterator of values as a lazy sequence of chunks.
///
/// Chunks are produced value by value: at most one value's worth of encoded
/// chunks is queued at a time. Recycled views are copied at this boundary,
/// so the yielded chunks are always independently owned.
pub fn emit_chunks<'o, I>(
    values: I,
    opts: &'o EncodeOptions,
) -> impl Iterator<Item = Result<Bytes, Error>> + 'o
where
    I: IntoIterator<Item = Value>,
    I::IntoIter: 'o,
{
    ChunkIter {
        values: values.into_iter(),
        encoder: Encoder::new(VecDeque::new(), opts),
        pending_err: None,
        done: false,
    }
}

struct ChunkIter<'o, I> {
    values: I,
    encoder: Encoder<'o, VecDeque<Bytes>>,
    pending_err: Option<Error>,
    done: bool,
}

impl<I> Iterator for ChunkIter<'_, I>
where
    I: Iterator<Item = Value>,
{
    type Item = Result<Bytes, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Chunks emitted before a failure are still observed first.
            if let Some(chunk) = self.encoder.sink_mut().pop_front() {
                return Some(Ok(chunk));
            }
            if let Some(e) = self.pending_err.take() {
                self.done = true;
                return Some(Err(e));
            }
            if self.done {
                return None;
            }
            match self.values.next() {
                Some(value) => {
                    if let Err(e) = self.encoder.feed(&value) {
                        self.pending_err = Some(e);
                    }
                }
                None => match self.encoder.flush() {
                    Ok(()) => self.done = true,
                    Err(e) => self.pending_err = Some(e),
                },
            }
        }
    }
}
