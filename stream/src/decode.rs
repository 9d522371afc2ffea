/*!
Async decode adapters: a pull-style stream transformer and a push-style
duplex endpoint, both flow-controlled to the decoder's actual consumption.

The core decoder runs on a blocking worker and pulls chunks out of a
one-slot channel; decoded values leave through another one-slot channel.
Nothing is buffered beyond the decoder's own rope, so a slow consumer stalls
the decoder and a stalled decoder stalls the producer.
*/
use brook_cbor::decode::{ChunkSource, DecodeOptions, Decoder};
use brook_cbor::{Error, Value};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tokio::sync::oneshot;
use tracing::trace;

enum Feed {
    /// One input chunk, with an optional completion handle resolved when the
    /// decoder has fully consumed the chunk.
    Chunk(Bytes, Option<oneshot::Sender<()>>),
    /// Terminal upstream failure, surfaced to the reader.
    Abort(Error),
}

/// Pull side of the chunk bridge, handed to the core decoder.
struct ChannelSource {
    rx: flume::Receiver<Feed>,
    /// Completion handles in receive order; `on_free` resolves the front.
    acks: Rc<RefCell<VecDeque<oneshot::Sender<()>>>>,
}

impl ChunkSource for ChannelSource {
    fn pull(&mut self) -> Result<Option<Bytes>, Error> {
        match self.rx.recv() {
            Ok(Feed::Chunk(chunk, ack)) => {
                if let Some(ack) = ack {
                    self.acks.borrow_mut().push_back(ack);
                }
                Ok(Some(chunk))
            }
            Ok(Feed::Abort(e)) => Err(e),
            Err(flume::RecvError::Disconnected) => Ok(None),
        }
    }
}

fn decode_worker(
    rx: flume::Receiver<Feed>,
    tx: flume::Sender<Result<Value, Error>>,
    opts: DecodeOptions,
) {
    let acks = Rc::new(RefCell::new(VecDeque::new()));
    let acks_cloned = acks.clone();
    let source = ChannelSource { rx, acks };
    let mut decoder = Decoder::new(source, &opts).with_on_free(move |chunk| {
        drop(chunk);
        // Chunks are freed in receive order, so identity is positional.
        if let Some(ack) = acks_cloned.borrow_mut().pop_front() {
            let _ = ack.send(());
        }
    });

    loop {
        match decoder.decode_next() {
            Ok(Some(value)) => {
                // One-slot backpressure: block until the reader pulls.
                if tx.send(Ok(value)).is_err() {
                    trace!("decode reader dropped, stopping");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e));
                break;
            }
        }
    }
    trace!("decode worker finished");
    // Dropping the decoder releases any chunks still held through the
    // on_free path, resolving their pending completion handles.
}

/// Decodes an async stream of chunks into an async stream of values.
///
/// The input is pulled one chunk ahead at most; an input error ends the
/// output stream with that error. Dropping the returned stream cancels the
/// decode at its next suspension point.
pub fn stream<In>(input: In, opts: DecodeOptions) -> impl Stream<Item = Result<Value, Error>>
where
    In: Stream<Item = Result<Bytes, Error>> + Send + 'static,
{
    let (chunk_tx, chunk_rx) = flume::bounded::<Feed>(1);
    let (val_tx, val_rx) = flume::bounded(1);

    tokio::spawn(async move {
        futures::pin_mut!(input);
        while let Some(next) = input.next().await {
            let feed = match next {
                Ok(chunk) => Feed::Chunk(chunk, None),
                Err(e) => Feed::Abort(e),
            };
            if chunk_tx.send_async(feed).await.is_err() {
                break;
            }
        }
    });
    tokio::task::spawn_blocking(move || decode_worker(chunk_rx, val_tx, opts));

    val_rx.into_stream()
}

/// Creates a push-style decode endpoint: chunks in, values out.
pub fn duplex(opts: DecodeOptions) -> (ChunkWriter, ValueReader) {
    let (chunk_tx, chunk_rx) = flume::bounded::<Feed>(1);
    let (val_tx, val_rx) = flume::bounded(1);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::task::spawn_blocking(move || {
        decode_worker(chunk_rx, val_tx, opts);
        let _ = done_tx.send(());
    });

    (
        ChunkWriter {
            tx: Some(chunk_tx),
            done_rx: Some(done_rx),
        },
        ValueReader { rx: val_rx },
    )
}

/// The writable half of a decode duplex.
pub struct ChunkWriter {
    tx: Option<flume::Sender<Feed>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

/// Completion handle for one written chunk, recorded per chunk and resolved
/// by the decoder's `on_free` once the chunk is fully consumed (or released
/// on teardown). Awaiting each handle flow-controls a producer to the rate
/// at which chunks are actually drained.
pub struct WriteAck(oneshot::Receiver<()>);

impl WriteAck {
    /// Resolves once the decoder has released the chunk.
    pub async fn wait(self) {
        let _ = self.0.await;
    }
}

impl ChunkWriter {
    /// Writes one chunk. The write itself resolves once the bridge accepts
    /// the chunk — the bridge holds at most one chunk, so a writer runs at
    /// most one chunk ahead of the decoder's pull. The returned [`WriteAck`]
    /// resolves only when the chunk's bytes are fully consumed.
    pub async fn write(&mut self, chunk: Bytes) -> Result<WriteAck, Error> {
        let Some(tx) = &self.tx else {
            return Err(Error::StreamClosed);
        };
        let (ack_tx, ack_rx) = oneshot::channel();
        if chunk.is_empty() {
            // Nothing to consume; resolve immediately.
            let _ = ack_tx.send(());
            return Ok(WriteAck(ack_rx));
        }
        tx.send_async(Feed::Chunk(chunk, Some(ack_tx)))
            .await
            .map_err(|_| Error::StreamClosed)?;
        Ok(WriteAck(ack_rx))
    }

    /// Propagates `error` to the reader and closes the bridge. Further
    /// writes fail with [`Error::StreamClosed`].
    pub async fn abort(&mut self, error: Error) -> Result<(), Error> {
        let Some(tx) = self.tx.take() else {
            return Err(Error::StreamClosed);
        };
        trace!("decode bridge aborted");
        tx.send_async(Feed::Abort(error))
            .await
            .map_err(|_| Error::StreamClosed)
    }

    /// Closes the write side and waits for the decoder to drain all
    /// in-flight chunks and signal the reader's end.
    ///
    /// If values are still undelivered, the read side must be consumed
    /// concurrently: the drain itself waits on the reader's pulls.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.tx.take().is_none() {
            return Err(Error::StreamClosed);
        }
        if let Some(done) = self.done_rx.take() {
            let _ = done.await;
        }
        Ok(())
    }
}

/// The readable half of a decode duplex.
pub struct ValueReader {
    rx: flume::Receiver<Result<Value, Error>>,
}

impl ValueReader {
    /// The next decoded value, an error, or `None` at end of stream.
    pub async fn next(&mut self) -> Option<Result<Value, Error>> {
        self.rx.recv_async().await.ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Value, Error>> {
        self.rx.into_stream()
    }
}
