//! Bounded byte channel between the generator and the distributor.
//!
//! Chunks travel over an unbounded mpsc queue; the bound lives in a semaphore
//! holding one permit per free byte. The writer takes permits before it sends
//! and suspends while the channel is full. The reader hands permits back as it
//! consumes bytes. Occupancy is therefore `capacity - free permits`, readable
//! from either side without locking.
//!
//! ```text
//!   Generator ── acquire(n) ── send(chunk) ──▶ [ mpsc ] ──▶ staged ── read_block()
//!                   ▲                                                  │
//!                   └──────────────── add_permits(block) ◀─────────────┘
//! ```

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::{mpsc, Semaphore, TryAcquireError};

use crate::error::{ChannelError, ChannelResult};

/// State shared by both ends.
#[derive(Debug)]
struct Shared {
    capacity: usize,
    free: Semaphore,
}

impl Shared {
    fn occupied(&self) -> usize {
        self.capacity.saturating_sub(self.free.available_permits())
    }
}

/// Creates a channel holding at most `capacity_bytes` bytes.
#[must_use]
pub fn bounded(capacity_bytes: usize) -> (ChannelWriter, ChannelReader) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        capacity: capacity_bytes,
        free: Semaphore::new(capacity_bytes),
    });

    (
        ChannelWriter {
            tx,
            shared: Arc::clone(&shared),
        },
        ChannelReader {
            rx,
            staged: BytesMut::new(),
            shared,
        },
    )
}

/// Writing end, owned by the generator.
#[derive(Debug)]
pub struct ChannelWriter {
    tx: mpsc::UnboundedSender<Bytes>,
    shared: Arc<Shared>,
}

impl ChannelWriter {
    /// Writes a chunk, waiting for space if the channel is full.
    ///
    /// # Errors
    /// Returns `ChannelError::Closed` once the reader is gone and
    /// `ChannelError::ChunkTooLarge` if the chunk can never fit.
    pub async fn send(&self, chunk: Bytes) -> ChannelResult<()> {
        let permits = self.permits_for(&chunk)?;
        let permit = self
            .shared
            .free
            .acquire_many(permits)
            .await
            .map_err(|_| ChannelError::Closed)?;
        permit.forget();
        self.tx.send(chunk).map_err(|_| ChannelError::Closed)
    }

    /// Writes a chunk only if it fits right now.
    ///
    /// # Errors
    /// Returns `ChannelError::Full` if there is not enough free space, plus the
    /// errors of [`send`](Self::send).
    pub fn try_send(&self, chunk: Bytes) -> ChannelResult<()> {
        let permits = self.permits_for(&chunk)?;
        let permit = self
            .shared
            .free
            .try_acquire_many(permits)
            .map_err(|e| match e {
                TryAcquireError::Closed => ChannelError::Closed,
                TryAcquireError::NoPermits => ChannelError::Full,
            })?;
        permit.forget();
        self.tx.send(chunk).map_err(|_| ChannelError::Closed)
    }

    fn permits_for(&self, chunk: &Bytes) -> ChannelResult<u32> {
        let too_large = ChannelError::ChunkTooLarge {
            len: chunk.len(),
            capacity: self.shared.capacity,
        };
        if chunk.len() > self.shared.capacity {
            return Err(too_large);
        }
        u32::try_from(chunk.len()).map_err(|_| too_large)
    }

    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn occupied_bytes(&self) -> usize {
        self.shared.occupied()
    }

    /// Returns true once the reader is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Reading end, owned by the distributor.
#[derive(Debug)]
pub struct ChannelReader {
    rx: mpsc::UnboundedReceiver<Bytes>,
    /// Bytes received but not yet handed out as a block.
    staged: BytesMut,
    shared: Arc<Shared>,
}

impl ChannelReader {
    /// Returns the number of buffered bytes.
    #[must_use]
    pub fn occupied_bytes(&self) -> usize {
        self.shared.occupied()
    }

    /// Returns the channel capacity in bytes.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.shared.capacity
    }

    /// Returns true if a whole block of `len` bytes appears to be buffered.
    ///
    /// A writer may hold permits for a chunk it has not pushed yet, so a
    /// following [`read_block`](Self::read_block) can still come up short.
    #[must_use]
    pub fn has_block(&self, len: usize) -> bool {
        self.occupied_bytes() >= len
    }

    /// Takes exactly `len` bytes, or nothing if fewer are available.
    ///
    /// A short read leaves the channel untouched so the caller can retry.
    pub fn read_block(&mut self, len: usize) -> Option<Bytes> {
        while self.staged.len() < len {
            match self.rx.try_recv() {
                Ok(chunk) => self.staged.extend_from_slice(&chunk),
                Err(_) => break,
            }
        }

        if self.staged.len() < len {
            return None;
        }

        let block = self.staged.split_to(len).freeze();
        self.shared.free.add_permits(len);
        Some(block)
    }
}

impl Drop for ChannelReader {
    fn drop(&mut self) {
        // Wakes a writer suspended on a full channel.
        self.shared.free.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_occupancy_tracks_writes_and_reads() {
        let (writer, mut reader) = bounded(4096);
        writer.send(Bytes::from(vec![b'a'; 640])).await.unwrap();
        writer.send(Bytes::from(vec![b'b'; 640])).await.unwrap();

        assert_eq!(reader.occupied_bytes(), 1280);
        assert_eq!(writer.occupied_bytes(), 1280);

        let block = reader.read_block(1000).unwrap();
        assert_eq!(block.len(), 1000);
        assert_eq!(&block[..640], &[b'a'; 640][..]);
        assert_eq!(&block[640..], &[b'b'; 360][..]);
        assert_eq!(reader.occupied_bytes(), 280);
    }

    #[tokio::test]
    async fn test_short_read_leaves_data_in_place() {
        let (writer, mut reader) = bounded(4096);
        writer.send(Bytes::from(vec![b'x'; 640])).await.unwrap();

        assert!(!reader.has_block(3328));
        assert!(reader.read_block(3328).is_none());
        assert_eq!(reader.occupied_bytes(), 640);

        for _ in 0..5 {
            writer.send(Bytes::from(vec![b'y'; 640])).await.unwrap();
        }
        assert!(reader.has_block(3328));
        let block = reader.read_block(3328).unwrap();
        assert_eq!(block.len(), 3328);
        assert_eq!(block[0], b'x');
        assert_eq!(reader.occupied_bytes(), 3840 - 3328);
    }

    #[tokio::test]
    async fn test_try_send_reports_full() {
        let (writer, _reader) = bounded(1000);
        writer.try_send(Bytes::from(vec![0; 640])).unwrap();
        assert_eq!(
            writer.try_send(Bytes::from(vec![0; 640])),
            Err(ChannelError::Full)
        );
        assert_eq!(writer.occupied_bytes(), 640);
    }

    #[tokio::test]
    async fn test_oversized_chunk_rejected() {
        let (writer, _reader) = bounded(100);
        assert_eq!(
            writer.send(Bytes::from(vec![0; 101])).await,
            Err(ChannelError::ChunkTooLarge {
                len: 101,
                capacity: 100
            })
        );
    }

    #[tokio::test]
    async fn test_full_channel_suspends_writer_until_read() {
        let (writer, mut reader) = bounded(1280);
        writer.send(Bytes::from(vec![1; 640])).await.unwrap();
        writer.send(Bytes::from(vec![2; 640])).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            writer.send(Bytes::from(vec![3; 640])),
        )
        .await;
        assert!(blocked.is_err(), "writer should wait on a full channel");
        assert_eq!(reader.occupied_bytes(), 1280);

        reader.read_block(640).unwrap();
        writer.send(Bytes::from(vec![3; 640])).await.unwrap();
        assert_eq!(reader.occupied_bytes(), 1280);
    }

    #[tokio::test]
    async fn test_dropping_reader_releases_waiting_writer() {
        let (writer, reader) = bounded(640);
        writer.send(Bytes::from(vec![0; 640])).await.unwrap();

        let pending = tokio::spawn(async move {
            let result = writer.send(Bytes::from(vec![0; 640])).await;
            (result, writer.is_closed())
        });
        tokio::task::yield_now().await;
        drop(reader);

        let (result, closed) = pending.await.unwrap();
        assert_eq!(result, Err(ChannelError::Closed));
        assert!(closed);
    }
}
