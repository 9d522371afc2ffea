//! Multi-chunk input buffer for the decoder.
//!
//! The rope holds the chunks pulled from a [`ChunkSource`] and a read cursor
//! into the first of them. Bytes are pulled lazily: [`Rope::request`] fills
//! from the source only until the requested count is buffered. Fully consumed
//! chunks are handed back through the `on_free` callback in receive order,
//! exactly once per chunk, which is what lets an outer adapter recycle its
//! input buffers or meter a writer's progress.

use crate::Error;
use bytes::Bytes;
use std::collections::VecDeque;

/// A pull-style source of input chunks.
pub trait ChunkSource {
    /// Pulls the next chunk, or `None` once the source is exhausted.
    ///
    /// A source may block waiting for its producer; the decoder calls this
    /// only when it needs more bytes than it holds.
    fn pull(&mut self) -> Result<Option<Bytes>, Error>;
}

/// A source over a single in-memory buffer.
pub struct BytesSource(Option<Bytes>);

impl BytesSource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(Some(data.into()))
    }
}

impl ChunkSource for BytesSource {
    fn pull(&mut self) -> Result<Option<Bytes>, Error> {
        Ok(self.0.take())
    }
}

/// A source over any iterator of chunks.
pub struct IterSource<I>(I);

impl<I> IterSource<I> {
    pub fn new(chunks: I) -> Self {
        Self(chunks)
    }
}

impl<I> ChunkSource for IterSource<I>
where
    I: Iterator<Item = Bytes>,
{
    fn pull(&mut self) -> Result<Option<Bytes>, Error> {
        Ok(self.0.next())
    }
}

pub(crate) type FreeHook = Box<dyn FnMut(Bytes)>;

pub(crate) struct Rope {
    chunks: VecDeque<Bytes>,
    /// Read offset into the first chunk. Offsets into later chunks are
    /// always zero, so total unread = sum(len) - cursor.
    cursor: usize,
    unread: usize,
    on_free: Option<FreeHook>,
}

impl Rope {
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            cursor: 0,
            unread: 0,
            on_free: None,
        }
    }

    pub fn set_on_free(&mut self, cb: FreeHook) {
        self.on_free = Some(cb);
    }

    pub fn unread(&self) -> usize {
        self.unread
    }

    pub fn push_chunk(&mut self, chunk: Bytes) {
        self.unread += chunk.len();
        self.chunks.push_back(chunk);
        // An empty chunk at the front is already fully consumed.
        self.trim();
    }

    /// Pulls from `source` until at least `n` unread bytes are buffered.
    pub fn request(&mut self, n: usize, source: &mut (dyn ChunkSource + '_)) -> Result<(), Error> {
        while self.unread < n {
            match source.pull()? {
                Some(chunk) => self.push_chunk(chunk),
                None => return Err(Error::PrematureEnd(n - self.unread)),
            }
        }
        Ok(())
    }

    /// Consumes exactly one byte.
    pub fn read_u8(&mut self, source: &mut (dyn ChunkSource + '_)) -> Result<u8, Error> {
        self.read_array::<1>(source).map(|b| b[0])
    }

    /// Consumes exactly `N` bytes into a fixed array.
    pub fn read_array<const N: usize>(
        &mut self,
        source: &mut (dyn ChunkSource + '_),
    ) -> Result<[u8; N], Error> {
        self.request(N, source)?;
        let mut out = [0u8; N];
        let mut at = 0;
        self.consume(N, |part| {
            out[at..at + part.len()].copy_from_slice(part);
            at += part.len();
        });
        Ok(out)
    }

    /// Consumes exactly `n` bytes into a freshly allocated vector.
    pub fn read_vec(
        &mut self,
        n: usize,
        source: &mut (dyn ChunkSource + '_),
    ) -> Result<Vec<u8>, Error> {
        self.request(n, source)?;
        // Cap the up-front allocation: a hostile header can claim any length,
        // the actual bytes must still arrive before we grow this far.
        let mut out = Vec::with_capacity(n.min(64 * 1024));
        self.consume(n, |part| out.extend_from_slice(part));
        Ok(out)
    }

    /// Consumes exactly `n` bytes without materializing them.
    pub fn skip(&mut self, n: usize, source: &mut (dyn ChunkSource + '_)) -> Result<(), Error> {
        self.request(n, source)?;
        self.consume(n, |_| {});
        Ok(())
    }

    /// Advances the cursor by `n` buffered bytes, passing each contiguous run
    /// to `f` and releasing chunks through `on_free` as they drain.
    fn consume(&mut self, mut n: usize, mut f: impl FnMut(&[u8])) {
        debug_assert!(n <= self.unread);
        self.unread -= n;
        loop {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let avail = front.len() - self.cursor;
            let take = avail.min(n);
            if take > 0 {
                f(&front[self.cursor..self.cursor + take]);
                self.cursor += take;
                n -= take;
            }
            if self.cursor >= front.len() {
                self.cursor = 0;
                if let Some(chunk) = self.chunks.pop_front() {
                    self.free(chunk);
                }
                continue;
            }
            if n == 0 {
                break;
            }
        }
    }

    /// Releases fully consumed chunks sitting at the front of the queue.
    fn trim(&mut self) {
        while let Some(front) = self.chunks.front() {
            if self.cursor < front.len() {
                break;
            }
            self.cursor = 0;
            if let Some(chunk) = self.chunks.pop_front() {
                self.free(chunk);
            }
        }
    }

    fn free(&mut self, chunk: Bytes) {
        if let Some(cb) = &mut self.on_free {
            cb(chunk);
        }
    }
}

impl Drop for Rope {
    /// Chunks still held at teardown are released through the standard
    /// `on_free` path, in order, so cancellation never strands a buffer.
    fn drop(&mut self) {
        while let Some(chunk) = self.chunks.pop_front() {
            self.free(chunk);
        }
    }
}
