//! Per-client state.
//!
//! A connection is a [`PendingClient`] while it waits in the admission ring
//! and becomes a [`Session`] once a unit has been promised to it. Only
//! sessions are watched for readiness.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use sluice_core::SessionId;
use tokio::net::TcpStream;

use crate::channel::ChannelReader;

/// Active sessions keyed by id. Ordered so readiness is always scanned in
/// admission order.
pub type SessionTable = BTreeMap<SessionId, Session>;

/// Upper bound on reads per readable event, so a chatty client cannot
/// starve the rest of the loop.
const MAX_DRAIN_READS: usize = 16;

/// Scratch size for discarding inbound bytes.
const DRAIN_BUFFER_BYTES: usize = 1024;

/// An accepted connection waiting for capacity.
#[derive(Debug)]
pub struct PendingClient {
    id: SessionId,
    stream: TcpStream,
    accepted_at: Instant,
}

impl PendingClient {
    /// Wraps a freshly accepted connection.
    #[must_use]
    pub fn new(id: SessionId, stream: TcpStream) -> Self {
        Self {
            id,
            stream,
            accepted_at: Instant::now(),
        }
    }

    /// Returns the session id assigned at accept time.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns how long the client has been waiting.
    #[must_use]
    pub fn waited(&self) -> Duration {
        self.accepted_at.elapsed()
    }
}

/// Result of draining a readable socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// The peer is still connected.
    Open,
    /// The peer closed its side.
    Closed,
}

/// Result of a writable event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A whole block reached the socket.
    Sent,
    /// Part of a block is still waiting in the outbox.
    Partial,
    /// The channel could not supply a whole block; nothing was drawn.
    Starved,
}

/// A client with a promised unit.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    stream: TcpStream,
    peer: SocketAddr,
    /// Blocks promised but not yet drawn from the channel.
    remaining_blocks: u32,
    /// Drawn block not yet fully written.
    outbox: Option<Bytes>,
    sent_blocks: u32,
    admitted_at: Instant,
}

impl Session {
    /// Promotes a pending client, capturing its peer address.
    ///
    /// # Errors
    /// Returns an error if the peer has already gone away.
    pub fn admit(pending: PendingClient, unit_blocks: u32) -> io::Result<Self> {
        let peer = pending.stream.peer_addr()?;
        Ok(Self {
            id: pending.id,
            stream: pending.stream,
            peer,
            remaining_blocks: unit_blocks,
            outbox: None,
            sent_blocks: 0,
            admitted_at: Instant::now(),
        })
    }

    /// Returns the session id.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the peer address captured at admission.
    #[must_use]
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Returns the blocks still to be drawn from the channel.
    #[must_use]
    pub const fn remaining_blocks(&self) -> u32 {
        self.remaining_blocks
    }

    /// Returns the blocks fully written to the socket.
    #[must_use]
    pub const fn sent_blocks(&self) -> u32 {
        self.sent_blocks
    }

    /// Returns the blocks this client would lose if it vanished now.
    #[must_use]
    pub fn undelivered_blocks(&self) -> u32 {
        self.remaining_blocks + u32::from(self.outbox.is_some())
    }

    /// Returns true once every promised block has been written.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.remaining_blocks == 0 && self.outbox.is_none()
    }

    /// Returns time since admission.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.admitted_at.elapsed()
    }

    /// Returns true if write readiness is worth watching.
    ///
    /// A session with a half-written block always wants to write; otherwise
    /// it only does when a whole block is available.
    #[must_use]
    pub const fn wants_write(&self, block_available: bool) -> bool {
        self.outbox.is_some() || (self.remaining_blocks > 0 && block_available)
    }

    /// Returns the underlying stream.
    #[must_use]
    pub const fn stream(&self) -> &TcpStream {
        &self.stream
    }

    /// Reads and discards whatever the client sent.
    ///
    /// # Errors
    /// Returns the socket error if the read fails.
    pub fn drain_inbound(&mut self) -> io::Result<Inbound> {
        let mut scratch = [0u8; DRAIN_BUFFER_BYTES];
        for _ in 0..MAX_DRAIN_READS {
            match self.stream.try_read(&mut scratch) {
                Ok(0) => return Ok(Inbound::Closed),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Inbound::Open),
                Err(e) => return Err(e),
            }
        }
        Ok(Inbound::Open)
    }

    /// Sends at most one block.
    ///
    /// Draws a new block from the channel only when the outbox is empty.
    /// Drawing decrements `remaining_blocks` immediately.
    ///
    /// # Errors
    /// Returns the socket error if the write fails.
    pub fn on_writable(
        &mut self,
        channel: &mut ChannelReader,
        block_bytes: usize,
    ) -> io::Result<WriteOutcome> {
        if self.outbox.is_none() {
            if self.remaining_blocks == 0 {
                return Ok(WriteOutcome::Starved);
            }
            let Some(block) = channel.read_block(block_bytes) else {
                return Ok(WriteOutcome::Starved);
            };
            self.remaining_blocks -= 1;
            self.outbox = Some(block);
        }

        let Some(outbox) = self.outbox.as_mut() else {
            return Ok(WriteOutcome::Starved);
        };

        while outbox.has_remaining() {
            match self.stream.try_write(outbox.chunk()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => outbox.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(WriteOutcome::Partial);
                }
                Err(e) => return Err(e),
            }
        }

        self.outbox = None;
        self.sent_blocks += 1;
        Ok(WriteOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    #[tokio::test]
    async fn test_admit_captures_peer() {
        let (server, client) = connected_pair().await;
        let pending = PendingClient::new(SessionId::new(7), server);
        let session = Session::admit(pending, 4).unwrap();

        assert_eq!(session.id(), SessionId::new(7));
        assert_eq!(session.peer(), client.local_addr().unwrap());
        assert_eq!(session.remaining_blocks(), 4);
        assert_eq!(session.undelivered_blocks(), 4);
        assert!(!session.is_complete());
    }

    #[tokio::test]
    async fn test_wants_write() {
        let (server, _client) = connected_pair().await;
        let session = Session::admit(PendingClient::new(SessionId::new(1), server), 1).unwrap();

        assert!(session.wants_write(true));
        assert!(!session.wants_write(false));
    }

    #[tokio::test]
    async fn test_delivers_unit_block_by_block() {
        let (server, mut client) = connected_pair().await;
        let (writer, mut reader) = channel::bounded(8192);
        writer.try_send(Bytes::from(vec![b'x'; 4096])).unwrap();

        let mut session = Session::admit(PendingClient::new(SessionId::new(1), server), 2).unwrap();

        session.stream().writable().await.unwrap();
        assert_eq!(
            session.on_writable(&mut reader, 1000).unwrap(),
            WriteOutcome::Sent
        );
        assert_eq!(session.remaining_blocks(), 1);
        assert_eq!(session.sent_blocks(), 1);

        session.stream().writable().await.unwrap();
        assert_eq!(
            session.on_writable(&mut reader, 1000).unwrap(),
            WriteOutcome::Sent
        );
        assert!(session.is_complete());
        assert_eq!(reader.occupied_bytes(), 2096);

        drop(session);
        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received.len(), 2000);
        assert!(received.iter().all(|&b| b == b'x'));
    }

    #[tokio::test]
    async fn test_starved_draws_nothing() {
        let (server, _client) = connected_pair().await;
        let (writer, mut reader) = channel::bounded(8192);
        writer.try_send(Bytes::from(vec![b'x'; 500])).unwrap();

        let mut session = Session::admit(PendingClient::new(SessionId::new(1), server), 4).unwrap();
        assert_eq!(
            session.on_writable(&mut reader, 1000).unwrap(),
            WriteOutcome::Starved
        );
        assert_eq!(session.remaining_blocks(), 4);
        assert_eq!(reader.occupied_bytes(), 500);
    }

    #[tokio::test]
    async fn test_drain_detects_close() {
        let (server, client) = connected_pair().await;
        let mut session = Session::admit(PendingClient::new(SessionId::new(1), server), 4).unwrap();

        drop(client);
        session.stream().readable().await.unwrap();
        assert_eq!(session.drain_inbound().unwrap(), Inbound::Closed);
    }

    #[tokio::test]
    async fn test_drain_discards_chatter() {
        let (server, client) = connected_pair().await;
        let mut session = Session::admit(PendingClient::new(SessionId::new(1), server), 4).unwrap();

        client.writable().await.unwrap();
        client.try_write(b"hello").unwrap();
        session.stream().readable().await.unwrap();
        assert_eq!(session.drain_inbound().unwrap(), Inbound::Open);
    }
}
