//! # Request Body Bridge
//!
//! The store writes through blocking `std::io`, while request bodies arrive
//! as async streams. [`channel`] connects the two: the handler forwards
//! chunks through a bounded channel with [`BodySender::forward`] and the
//! blocking task reads them from a [`BodyReader`]. A slow client therefore
//! slows the copy instead of buffering the body in memory.
//!
//! The reader only reports a clean end of stream after the sender has seen
//! the body end. If the handler is dropped mid-body (client disconnect),
//! the reader fails with `UnexpectedEof` and the write rolls back.

use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::BoxError;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::{StreamReader, SyncIoBridge};

/// Chunks buffered between the handler and the blocking writer.
const CHANNEL_DEPTH: usize = 8;

type ChunkReader = SyncIoBridge<StreamReader<ReceiverStream<io::Result<Bytes>>, Bytes>>;

/// Create a connected sender and reader. Must be called within a Tokio
/// runtime.
pub fn channel() -> (BodySender, BodyReader) {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let complete = Arc::new(AtomicBool::new(false));
    let reader = SyncIoBridge::new(StreamReader::new(ReceiverStream::new(rx)));
    (
        BodySender {
            tx,
            complete: Arc::clone(&complete),
        },
        BodyReader {
            inner: reader,
            complete,
        },
    )
}

/// Async half: feeds request body chunks into the channel.
pub struct BodySender {
    tx: mpsc::Sender<io::Result<Bytes>>,
    complete: Arc<AtomicBool>,
}

impl BodySender {
    /// Forward `stream` until it ends, fails, or the reader goes away.
    pub async fn forward<S, E>(self, stream: S)
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<BoxError>,
    {
        let mut stream = std::pin::pin!(stream);
        loop {
            tokio::select! {
                _ = self.tx.closed() => return,
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        if self.tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = self.tx.send(Err(io::Error::other(e))).await;
                        return;
                    }
                    None => {
                        self.complete.store(true, Ordering::Release);
                        return;
                    }
                },
            }
        }
    }
}

/// Blocking half: a `std::io::Read` over the forwarded chunks.
pub struct BodyReader {
    inner: ChunkReader,
    complete: Arc<AtomicBool>,
}

impl Read for BodyReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() && !self.complete.load(Ordering::Acquire) {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "request body ended before it was complete",
            ));
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunks(parts: &[&'static [u8]]) -> Vec<Result<Bytes, io::Error>> {
        parts.iter().map(|p| Ok(Bytes::from_static(p))).collect()
    }

    #[tokio::test]
    async fn reader_sees_every_chunk_in_order() {
        let (sender, mut reader) = channel();
        let job = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).map(|_| out)
        });
        sender
            .forward(stream::iter(chunks(&[b"hel", b"lo ", b"world"])))
            .await;
        assert_eq!(job.await.unwrap().unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn body_larger_than_the_channel_streams_through() {
        let (sender, mut reader) = channel();
        let job = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            reader.read_to_end(&mut out).map(|_| out.len())
        });
        let parts: Vec<Result<Bytes, io::Error>> = (0..100)
            .map(|_| Ok(Bytes::from(vec![1u8; 4096])))
            .collect();
        sender.forward(stream::iter(parts)).await;
        assert_eq!(job.await.unwrap().unwrap(), 100 * 4096);
    }

    #[tokio::test]
    async fn stream_error_reaches_the_reader() {
        let (sender, mut reader) = channel();
        let job = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            reader.read_to_end(&mut out)
        });
        let items: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        sender.forward(stream::iter(items)).await;
        assert!(job.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn dropped_sender_is_not_a_clean_end() {
        let (sender, mut reader) = channel();
        drop(sender);
        let result = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            reader.read_to_end(&mut out)
        })
        .await
        .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn forward_stops_when_reader_is_gone() {
        let (sender, reader) = channel();
        drop(reader);
        // An endless stream must not hang the forwarder.
        sender
            .forward(stream::repeat_with(|| Ok::<_, io::Error>(Bytes::from_static(b"x"))))
            .await;
    }
}
