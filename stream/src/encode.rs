/*!
Async encode adapters: a pull-style stream transformer and a push-style
duplex endpoint.

The core encoder runs on a blocking worker. Every chunk it emits is pushed
through a one-slot channel, so the worker suspends until the reader pulls
the previous chunk before producing the next one; values are accepted
through another one-slot channel, holding the producer to the encoder's
pace.
*/
use brook_cbor::encode::{ChunkSink, EncodeOptions, Encoder, OutChunk};
use brook_cbor::{Error, Value};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::oneshot;
use tracing::trace;

/// Push side of the chunk bridge, handed to the core encoder.
///
/// Copies recycled views at the boundary, so chunks crossing the channel
/// are always independently owned.
struct ChannelSink {
    tx: flume::Sender<Result<Bytes, Error>>,
}

impl ChunkSink for ChannelSink {
    fn accept(&mut self, chunk: OutChunk<'_>) -> Result<(), Error> {
        self.tx
            .send(Ok(chunk.into_bytes()))
            .map_err(|_| Error::StreamClosed)
    }
}

fn encode_worker(
    rx: flume::Receiver<Value>,
    tx: flume::Sender<Result<Bytes, Error>>,
    opts: EncodeOptions,
) {
    let mut encoder = Encoder::new(ChannelSink { tx: tx.clone() }, &opts);
    while let Ok(value) = rx.recv() {
        if let Err(e) = encoder.feed(&value) {
            if !matches!(e, Error::StreamClosed) {
                let _ = tx.send(Err(e));
            }
            trace!("encode worker stopping on error");
            return;
        }
    }
    // Input closed: flush the partial tail chunk.
    if let Err(e) = encoder.flush()
        && !matches!(e, Error::StreamClosed)
    {
        let _ = tx.send(Err(e));
    }
    trace!("encode worker finished");
}

/// Encodes an async stream of values into an async stream of chunks.
///
/// Dropping the returned stream cancels the encode at its next suspension
/// point; the value stream stops being polled shortly after.
pub fn stream<In>(values: In, opts: EncodeOptions) -> impl Stream<Item = Result<Bytes, Error>>
where
    In: Stream<Item = Value> + Send + 'static,
{
    let (val_tx, val_rx) = flume::bounded::<Value>(1);
    let (chunk_tx, chunk_rx) = flume::bounded(1);

    tokio::spawn(async move {
        futures::pin_mut!(values);
        while let Some(value) = values.next().await {
            if val_tx.send_async(value).await.is_err() {
                break;
            }
        }
    });
    tokio::task::spawn_blocking(move || encode_worker(val_rx, chunk_tx, opts));

    chunk_rx.into_stream()
}

/// Creates a push-style encode endpoint: values in, chunks out.
pub fn duplex(opts: EncodeOptions) -> (ValueWriter, ChunkReader) {
    let (val_tx, val_rx) = flume::bounded::<Value>(1);
    let (chunk_tx, chunk_rx) = flume::bounded(1);
    let (done_tx, done_rx) = oneshot::channel();

    tokio::task::spawn_blocking(move || {
        encode_worker(val_rx, chunk_tx, opts);
        let _ = done_tx.send(());
    });

    (
        ValueWriter {
            tx: Some(val_tx),
            done_rx: Some(done_rx),
        },
        ChunkReader { rx: chunk_rx },
    )
}

/// The writable half of an encode duplex.
pub struct ValueWriter {
    tx: Option<flume::Sender<Value>>,
    done_rx: Option<oneshot::Receiver<()>>,
}

impl ValueWriter {
    /// Submits one value for encoding. Suspends while the encoder is still
    /// busy with the previous value's chunks.
    pub async fn write(&mut self, value: Value) -> Result<(), Error> {
        let Some(tx) = &self.tx else {
            return Err(Error::StreamClosed);
        };
        tx.send_async(value).await.map_err(|_| Error::StreamClosed)
    }

    /// Closes the write side, flushes the partial tail chunk and waits for
    /// the encoder to finish. The read side must be consumed concurrently,
    /// since the tail flush itself awaits the reader's pull.
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

/// The readable half of an encode duplex.
pub struct ChunkReader {
    rx: flume::Receiver<Result<Bytes, Error>>,
}

impl ChunkReader {
    /// The next encoded chunk, an error, or `None` at end of stream.
    pub async fn next(&mut self) -> Option<Result<Bytes, Error>> {
        self.rx.recv_async().await.ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, Error>> {
        self.rx.into_stream()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use brook_cbor::decode::DecodeOptions;
    use brook_cbor::encode;

    fn sample_values() -> Vec<Value> {
        vec![
            Value::Integer(1),
            Value::map([("xs", Value::array([1, 2, 3]))]),
            Value::from("tail"),
        ]
    }

    fn reference_bytes(values: &[Value]) -> Vec<u8> {
        let opts = EncodeOptions::default();
        values
            .iter()
            .flat_map(|v| encode::emit(v, &opts).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn stream_reproduces_the_one_shot_encoding() {
        let values = sample_values();
        let reference = reference_bytes(&values);

        let opts = EncodeOptions {
            chunk_size: 4,
            ..Default::default()
        };
        let chunks: Vec<_> = stream(futures::stream::iter(values), opts)
            .collect()
            .await;
        let mut joined = Vec::new();
        for chunk in chunks {
            let chunk = chunk.unwrap();
            assert!(chunk.len() <= 4);
            joined.extend_from_slice(&chunk);
        }
        assert_eq!(joined, reference);
    }

    #[tokio::test]
    async fn duplex_flushes_the_tail_on_close() {
        let values = sample_values();
        let reference = reference_bytes(&values);

        let (mut writer, mut reader) = duplex(EncodeOptions::default());
        let collector = tokio::spawn(async move {
            let mut joined = Vec::new();
            while let Some(chunk) = reader.next().await {
                joined.extend_from_slice(&chunk.unwrap());
            }
            joined
        });

        for value in values {
            writer.write(value).await.unwrap();
        }
        writer.close().await.unwrap();

        assert_eq!(collector.await.unwrap(), reference);
        assert!(matches!(
            writer.write(Value::Null).await,
            Err(Error::StreamClosed)
        ));
    }

    #[tokio::test]
    async fn encode_errors_surface_to_the_reader() {
        let opts = EncodeOptions {
            allow_undefined: false,
            ..Default::default()
        };
        let (mut writer, mut reader) = duplex(opts);
        writer.write(Value::Undefined).await.unwrap();

        assert!(matches!(
            reader.next().await,
            Some(Err(Error::UndefinedDisallowed))
        ));
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn recycling_is_copied_at_the_bridge() {
        let value = Value::array((0..50).map(Value::from).collect::<Vec<_>>());
        let reference = encode::emit(&value, &EncodeOptions::default()).unwrap();

        let opts = EncodeOptions {
            chunk_recycling: true,
            chunk_size: 8,
            ..Default::default()
        };
        let (mut writer, mut reader) = duplex(opts);
        let collector = tokio::spawn(async move {
            let mut joined = Vec::new();
            while let Some(chunk) = reader.next().await {
                let chunk = chunk.unwrap();
                assert!(chunk.len() <= 8);
                joined.extend_from_slice(&chunk);
            }
            joined
        });

        writer.write(value).await.unwrap();
        writer.close().await.unwrap();
        assert_eq!(collector.await.unwrap(), reference);
    }

    #[tokio::test]
    async fn encode_and_decode_streams_round_trip() {
        let values = sample_values();
        let opts = EncodeOptions {
            chunk_size: 3,
            ..Default::default()
        };
        let chunks = stream(futures::stream::iter(values.clone()), opts);
        let decoded: Vec<_> = decode::stream(chunks, DecodeOptions::default())
            .collect()
            .await;
        let decoded: Vec<Value> = decoded.into_iter().collect::<Result<_, _>>().unwrap();
        assert_eq!(decoded, values);
    }
}
