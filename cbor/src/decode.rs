/*!
A streaming CBOR decoder for dynamic values.

The decoder pulls chunks lazily from a [`ChunkSource`] into a multi-chunk
rope buffer and walks the byte stream item by item. It never needs the whole
input at once: bytes are requested only as each item's header and payload
demand them, and fully consumed chunks are released back through the
decoder's `on_free` callback in receive order.

# Transform hooks

`on_value` (and `on_key` for map keys) is invoked before an item's payload
is decoded, receiving an [`Item`] handle that describes the pending item and
carries the decode thunk:

- If the hook returns a replacement *without* calling [`Item::decode`], the
  decoder still advances the cursor past the item's bytes by header-walking
  them, so the stream position is byte-exact regardless of replacement.
- If the hook calls [`Item::decode`] and then returns a replacement, the
  bytes are already consumed and nothing is skipped.
- If the hook returns `None`, the decoder produces the actual value; a
  decode the hook already performed is not repeated, since the thunk
  memoizes its result.

# Usage

```
use brook_cbor::{decode, Value};

let value = decode::parse(&[0xA1, 0x61, b'a', 0x01], &decode::DecodeOptions::default()).unwrap();
assert_eq!(value, Value::map([("a", Value::Integer(1))]));
```
*/
use crate::rope::Rope;
use crate::value::{PathSegment, Value};
use crate::{BoxError, Error, FloatWidth};
use bytes::Bytes;

pub use crate::rope::{BytesSource, ChunkSource, IterSource};

/// Transform hook consulted for every value before its payload is decoded.
pub type ValueHook = Box<dyn Fn(&mut Item<'_, '_>) -> Result<Option<Value>, BoxError> + Send>;

/// Transform hook consulted for every map key before its payload is decoded.
pub type KeyHook = Box<dyn Fn(&mut Item<'_, '_>) -> Result<Option<String>, BoxError> + Send>;

/// Decoder configuration.
pub struct DecodeOptions {
    /// When false, encountering undefined is an error.
    pub allow_undefined: bool,
    /// Floats encoded narrower than this are an error.
    pub min_float_size: FloatWidth,
    /// Maximum container nesting before decoding is abandoned.
    pub max_depth: usize,
    pub on_value: Option<ValueHook>,
    pub on_key: Option<KeyHook>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            allow_undefined: true,
            min_float_size: FloatWidth::F16,
            max_depth: 64,
            on_value: None,
            on_key: None,
        }
    }
}

/// The kind of a pending item, reported to hooks before its payload is read.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ItemKind {
    Integer,
    Bytes,
    Text,
    Array,
    Map,
    Bool,
    Null,
    Undefined,
    Float,
}

/// An item whose header has been read but whose payload has not.
///
/// The argument is already parsed; for scalars that *is* the value, for
/// strings it is the payload byte length, for containers the element count.
#[derive(Clone, Copy)]
enum Pending {
    Integer(i64),
    Bytes(u64),
    Text(u64),
    Array(u64),
    Map(u64),
    Bool(bool),
    Null,
    Undefined,
    Float16,
    Float32,
    Float64,
}

impl Pending {
    fn kind(&self) -> ItemKind {
        match self {
            Pending::Integer(_) => ItemKind::Integer,
            Pending::Bytes(_) => ItemKind::Bytes,
            Pending::Text(_) => ItemKind::Text,
            Pending::Array(_) => ItemKind::Array,
            Pending::Map(_) => ItemKind::Map,
            Pending::Bool(_) => ItemKind::Bool,
            Pending::Null => ItemKind::Null,
            Pending::Undefined => ItemKind::Undefined,
            Pending::Float16 | Pending::Float32 | Pending::Float64 => ItemKind::Float,
        }
    }

    fn len(&self) -> u64 {
        match self {
            Pending::Bytes(n) | Pending::Text(n) | Pending::Array(n) | Pending::Map(n) => *n,
            _ => 0,
        }
    }
}

/// The handle a transform hook receives for the item about to be decoded.
///
/// Dropping the handle without calling [`Item::decode`] leaves the payload
/// bytes unconsumed; the decoder then either decodes or skips them depending
/// on what the hook returned.
pub struct Item<'a, 's> {
    rope: &'a mut Rope,
    source: &'a mut (dyn ChunkSource + 's),
    opts: &'a DecodeOptions,
    path: &'a mut Vec<PathSegment>,
    depth: usize,
    pending: Pending,
    memo: Option<Value>,
}

impl Item<'_, '_> {
    pub fn kind(&self) -> ItemKind {
        self.pending.kind()
    }

    /// The item's parsed argument: payload byte length for strings, element
    /// count for arrays, entry count for maps, zero otherwise.
    pub fn len(&self) -> u64 {
        self.pending.len()
    }

    /// The traversal path from the root to this item.
    pub fn key_path(&self) -> &[PathSegment] {
        self.path
    }

    /// Decodes the item's payload, consuming its bytes.
    ///
    /// Idempotent: the first call does the work, repeated calls return
    /// clones of the memoized result.
    pub fn decode(&mut self) -> Result<Value, Error> {
        if let Some(v) = &self.memo {
            return Ok(v.clone());
        }
        let v = decode_payload(
            self.pending,
            self.rope,
            self.source,
            self.opts,
            self.path,
            self.depth,
        )?;
        self.memo = Some(v.clone());
        Ok(v)
    }

    fn into_value(mut self) -> Result<Value, Error> {
        match self.memo.take() {
            Some(v) => Ok(v),
            None => decode_payload(
                self.pending,
                self.rope,
                self.source,
                self.opts,
                self.path,
                self.depth,
            ),
        }
    }
}

const SAFE_END: u64 = 1 << 53;

fn to_usize(n: u64) -> Result<usize, Error> {
    usize::try_from(n).map_err(|_| Error::TooBig)
}

fn check_depth(depth: usize) -> Result<usize, Error> {
    depth.checked_sub(1).ok_or(Error::MaxDepth)
}

fn read_arg<'s>(
    rope: &mut Rope,
    source: &mut (dyn ChunkSource + 's),
    ai: u8,
) -> Result<u64, Error> {
    match ai {
        0..24 => Ok(ai as u64),
        24 => rope.read_u8(source).map(u64::from),
        25 => rope
            .read_array::<2>(source)
            .map(|b| u16::from_be_bytes(b) as u64),
        26 => rope
            .read_array::<4>(source)
            .map(|b| u32::from_be_bytes(b) as u64),
        27 => rope.read_array::<8>(source).map(u64::from_be_bytes),
        _ => Err(Error::InvalidAdditionalInfo(ai)),
    }
}

/// Reads one initial byte plus argument and validates it against the
/// supported subset. Shared by the decode and skip paths, so both reject
/// exactly the same items.
fn read_pending<'s>(
    rope: &mut Rope,
    source: &mut (dyn ChunkSource + 's),
    opts: &DecodeOptions,
) -> Result<Pending, Error> {
    let initial = rope.read_u8(source)?;
    match (initial >> 5, initial & 0x1F) {
        (0, 31) | (1, 31) | (6, 31) => Err(Error::InvalidAdditionalInfo(31)),
        (0, ai) => {
            let arg = read_arg(rope, source, ai)?;
            if arg > SAFE_END {
                Err(Error::UnsafeInteger(arg as i128))
            } else {
                Ok(Pending::Integer(arg as i64))
            }
        }
        (1, ai) => {
            let arg = read_arg(rope, source, ai)?;
            if arg >= SAFE_END {
                Err(Error::UnsafeInteger(-1 - arg as i128))
            } else {
                Ok(Pending::Integer(-1 - arg as i64))
            }
        }
        (2, 31) | (3, 31) | (4, 31) | (5, 31) => Err(Error::IndefiniteLength),
        (2, ai) => Ok(Pending::Bytes(read_arg(rope, source, ai)?)),
        (3, ai) => Ok(Pending::Text(read_arg(rope, source, ai)?)),
        (4, ai) => Ok(Pending::Array(read_arg(rope, source, ai)?)),
        (5, ai) => Ok(Pending::Map(read_arg(rope, source, ai)?)),
        (6, ai) => Err(Error::UnsupportedTag(read_arg(rope, source, ai)?)),
        (7, 20) => Ok(Pending::Bool(false)),
        (7, 21) => Ok(Pending::Bool(true)),
        (7, 22) => Ok(Pending::Null),
        (7, 23) => {
            if opts.allow_undefined {
                Ok(Pending::Undefined)
            } else {
                Err(Error::UndefinedDisallowed)
            }
        }
        (7, ai @ 0..=19) => Err(Error::UnassignedSimple(ai)),
        (7, 24) => Err(Error::UnassignedSimple(rope.read_u8(source)?)),
        (7, 25) => {
            if opts.min_float_size > FloatWidth::F16 {
                Err(Error::FloatBelowMinimum)
            } else {
                Ok(Pending::Float16)
            }
        }
        (7, 26) => {
            if opts.min_float_size > FloatWidth::F32 {
                Err(Error::FloatBelowMinimum)
            } else {
                Ok(Pending::Float32)
            }
        }
        (7, 27) => Ok(Pending::Float64),
        (7, 31) => Err(Error::UnexpectedBreak),
        (7, ai) => Err(Error::InvalidAdditionalInfo(ai)),
        _ => unreachable!(),
    }
}

fn decode_value<'s>(
    rope: &mut Rope,
    source: &mut (dyn ChunkSource + 's),
    opts: &DecodeOptions,
    path: &mut Vec<PathSegment>,
    depth: usize,
) -> Result<Value, Error> {
    let pending = read_pending(rope, source, opts)?;
    match &opts.on_value {
        Some(hook) => {
            let mut item = Item {
                rope,
                source,
                opts,
                path,
                depth,
                pending,
                memo: None,
            };
            match hook(&mut item).map_err(Error::Hook)? {
                Some(replacement) => {
                    if item.memo.is_none() {
                        // The hook never touched the payload: advance the
                        // cursor past it so the stream stays byte-exact.
                        skip_payload(pending, item.rope, item.source, item.opts, item.depth)?;
                    }
                    Ok(replacement)
                }
                None => item.into_value(),
            }
        }
        None => decode_payload(pending, rope, source, opts, path, depth),
    }
}

fn decode_payload<'s>(
    pending: Pending,
    rope: &mut Rope,
    source: &mut (dyn ChunkSource + 's),
    opts: &DecodeOptions,
    path: &mut Vec<PathSegment>,
    depth: usize,
) -> Result<Value, Error> {
    match pending {
        Pending::Integer(n) => Ok(Value::Integer(n)),
        Pending::Bytes(len) => Ok(Value::Bytes(rope.read_vec(to_usize(len)?, source)?)),
        Pending::Text(len) => {
            let buf = rope.read_vec(to_usize(len)?, source)?;
            String::from_utf8(buf)
                .map(Value::Text)
                .map_err(|e| Error::InvalidUtf8(e.utf8_error()))
        }
        Pending::Array(count) => {
            let depth = check_depth(depth)?;
            let count = to_usize(count)?;
            let mut items = Vec::new();
            for idx in 0..count {
                path.push(PathSegment::Index(idx));
                let r = decode_value(rope, source, opts, path, depth);
                path.pop();
                items.push(r?);
            }
            Ok(Value::Array(items))
        }
        Pending::Map(count) => {
            let depth = check_depth(depth)?;
            let count = to_usize(count)?;
            let mut entries: Vec<(String, Value)> = Vec::new();
            for _ in 0..count {
                let key = decode_key(rope, source, opts, path, depth)?;
                if entries.iter().any(|(k, _)| *k == key) {
                    return Err(Error::DuplicateKey(key));
                }
                path.push(PathSegment::Key(key.clone()));
                let r = decode_value(rope, source, opts, path, depth);
                path.pop();
                entries.push((key, r?));
            }
            Ok(Value::Map(entries))
        }
        Pending::Bool(b) => Ok(Value::Bool(b)),
        Pending::Null => Ok(Value::Null),
        Pending::Undefined => Ok(Value::Undefined),
        Pending::Float16 => {
            let v = half::f16::from_be_bytes(rope.read_array::<2>(source)?);
            Ok(Value::Float(v.into()))
        }
        Pending::Float32 => {
            let v = f32::from_be_bytes(rope.read_array::<4>(source)?);
            Ok(Value::Float(v.into()))
        }
        Pending::Float64 => Ok(Value::Float(f64::from_be_bytes(
            rope.read_array::<8>(source)?,
        ))),
    }
}

/// Decodes one map key, which must be a text string, dispatching `on_key`.
fn decode_key<'s>(
    rope: &mut Rope,
    source: &mut (dyn ChunkSource + 's),
    opts: &DecodeOptions,
    path: &mut Vec<PathSegment>,
    depth: usize,
) -> Result<String, Error> {
    let pending = read_pending(rope, source, opts)?;
    let Pending::Text(_) = pending else {
        return Err(Error::NonStringKey);
    };
    match &opts.on_key {
        Some(hook) => {
            let mut item = Item {
                rope,
                source,
                opts,
                path,
                depth,
                pending,
                memo: None,
            };
            match hook(&mut item).map_err(Error::Hook)? {
                Some(replacement) => {
                    if item.memo.is_none() {
                        skip_payload(pending, item.rope, item.source, item.opts, item.depth)?;
                    }
                    Ok(replacement)
                }
                None => match item.into_value()? {
                    Value::Text(s) => Ok(s),
                    _ => unreachable!(),
                },
            }
        }
        None => match decode_payload(pending, rope, source, opts, path, depth)? {
            Value::Text(s) => Ok(s),
            _ => unreachable!(),
        },
    }
}

/// Mirrors the decode walk without materializing payloads: strings advance
/// by their length, containers recurse item by item, scalars are already
/// fully consumed with their argument.
fn skip_payload<'s>(
    pending: Pending,
    rope: &mut Rope,
    source: &mut (dyn ChunkSource + 's),
    opts: &DecodeOptions,
    depth: usize,
) -> Result<(), Error> {
    match pending {
        Pending::Integer(_) | Pending::Bool(_) | Pending::Null | Pending::Undefined => Ok(()),
        Pending::Bytes(len) | Pending::Text(len) => rope.skip(to_usize(len)?, source),
        Pending::Array(count) => {
            let depth = check_depth(depth)?;
            for _ in 0..count {
                skip_item(rope, source, opts, depth)?;
            }
            Ok(())
        }
        Pending::Map(count) => {
            let depth = check_depth(depth)?;
            for _ in 0..count {
                skip_item(rope, source, opts, depth)?;
                skip_item(rope, source, opts, depth)?;
            }
            Ok(())
        }
        Pending::Float16 => rope.skip(2, source),
        Pending::Float32 => rope.skip(4, source),
        Pending::Float64 => rope.skip(8, source),
    }
}

fn skip_item<'s>(
    rope: &mut Rope,
    source: &mut (dyn ChunkSource + 's),
    opts: &DecodeOptions,
    depth: usize,
) -> Result<(), Error> {
    let pending = read_pending(rope, source, opts)?;
    skip_payload(pending, rope, source, opts, depth)
}

/// A pull-style decoder: a lazy sequence of values over a chunk source.
///
/// After an error the decoder is fused; further calls return `Ok(None)`.
pub struct Decoder<'o, S: ChunkSource> {
    source: S,
    rope: Rope,
    opts: &'o DecodeOptions,
    path: Vec<PathSegment>,
    done: bool,
}

impl<'o, S: ChunkSource> Decoder<'o, S> {
    pub fn new(source: S, opts: &'o DecodeOptions) -> Self {
        Self {
            source,
            rope: Rope::new(),
            opts,
            path: Vec::new(),
            done: false,
        }
    }

    /// Registers the chunk-release callback.
    ///
    /// Invoked exactly once per input chunk, in receive order, as soon as
    /// the chunk is fully consumed — or on teardown for chunks still held.
    /// This is the hook an outer adapter uses for buffer-pool reuse and
    /// write acknowledgement.
    pub fn with_on_free(mut self, cb: impl FnMut(Bytes) + 'static) -> Self {
        self.rope.set_on_free(Box::new(cb));
        self
    }

    /// Bytes pulled from the source but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.rope.unread()
    }

    /// Decodes the next top-level value, or `Ok(None)` at a clean end of
    /// input. Input ending mid-item is a [`Error::PrematureEnd`].
    pub fn decode_next(&mut self) -> Result<Option<Value>, Error> {
        if self.done {
            return Ok(None);
        }
        while self.rope.unread() == 0 {
            match self.source.pull() {
                Ok(Some(chunk)) => self.rope.push_chunk(chunk),
                Ok(None) => {
                    self.done = true;
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    return Err(e);
                }
            }
        }
        self.path.clear();
        let r = decode_value(
            &mut self.rope,
            &mut self.source,
            self.opts,
            &mut self.path,
            self.opts.max_depth,
        );
        if r.is_err() {
            self.done = true;
        }
        r.map(Some)
    }
}

impl<S: ChunkSource> Iterator for Decoder<'_, S> {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decode_next().transpose()
    }
}

/// Decodes exactly one value from a contiguous byte slice.
///
/// Bytes left over after the value are a [`Error::TrailingBytes`] error.
pub fn parse(data: &[u8], opts: &DecodeOptions) -> Result<Value, Error> {
    let mut decoder = Decoder::new(BytesSource::new(Bytes::copy_from_slice(data)), opts);
    match decoder.decode_next()? {
        None => Err(Error::PrematureEnd(1)),
        Some(value) => {
            if decoder.buffered() > 0 {
                Err(Error::TrailingBytes)
            } else {
                Ok(value)
            }
        }
    }
}
