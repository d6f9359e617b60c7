//! The distributor event loop.
//!
//! Owns the channel reader, the block budget, the admission ring and every
//! session. Nothing here is shared with another task; the only cross-thread
//! link is the channel itself.
//!
//! # Loop pass
//!
//! 1. Admit ring entries from the front while the budget allows.
//! 2. Wait for readiness (listener, timer, sessions) up to the poll timeout.
//! 3. Handle every ready source: accept, report, or serve one block per
//!    writable session. Inbound data is drained first so hangups are seen
//!    before a block is drawn for a dead peer.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use sluice_core::SessionId;
use sluice_flow::{AdmissionRing, BlockBudget};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelReader;
use crate::config::{DistributorConfig, OverflowPolicy};
use crate::error::{ServerError, ServerResult};
use crate::multiplexer::{Event, Multiplexer, Readiness};
use crate::report::{ChannelView, Reporter};
use crate::session::{Inbound, PendingClient, Session, SessionTable, WriteOutcome};

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DistributorStats {
    /// Connections accepted.
    pub accepted: u64,
    /// Connections promised a unit.
    pub admitted: u64,
    /// Sessions that received their whole unit.
    pub completed: u64,
    /// Sessions and pending clients that went away early.
    pub disconnected: u64,
    /// Connections closed because the admission ring was full.
    pub rejected: u64,
    /// Blocks fully written to clients.
    pub blocks_sent: u64,
    /// Blocks promised to clients that disconnected.
    pub blocks_lost: u64,
}

/// Point-in-time view of the distributor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributorSnapshot {
    /// Sessions being served.
    pub active_clients: usize,
    /// Clients waiting in the admission ring.
    pub pending_clients: usize,
    /// Blocks the budget holds for active sessions.
    pub promised_blocks: u64,
    /// Sum of `remaining_blocks` across active sessions.
    pub remaining_blocks: u64,
    /// Bytes buffered in the channel.
    pub occupied_bytes: usize,
    /// Channel capacity in bytes.
    pub capacity_bytes: usize,
    /// Reports emitted so far.
    pub reports: u64,
    /// Lifetime counters.
    pub stats: DistributorStats,
}

/// Serves units of blocks to TCP clients as the channel fills.
#[derive(Debug)]
pub struct Distributor {
    config: DistributorConfig,
    mux: Multiplexer,
    channel: ChannelReader,
    budget: BlockBudget,
    ring: AdmissionRing<PendingClient>,
    sessions: SessionTable,
    next_session_id: SessionId,
    reporter: Reporter,
    stats: DistributorStats,
    shutdown: Arc<Notify>,
}

impl Distributor {
    /// Validates `config` and binds the listening socket.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the address cannot
    /// be bound.
    pub async fn bind(config: DistributorConfig, channel: ChannelReader) -> ServerResult<Self> {
        config.validate()?;

        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.listen_addr,
                source,
            })?;
        let ring = AdmissionRing::with_capacity(config.geometry.max_clients as usize)?;
        let mux = Multiplexer::new(listener, config.report_interval);

        info!(
            addr = %mux.local_addr()?,
            channel_capacity = channel.capacity_bytes(),
            max_clients = config.geometry.max_clients,
            unit_bytes = config.geometry.unit_bytes(),
            "Distributor listening"
        );

        Ok(Self {
            budget: BlockBudget::new(&config.geometry),
            config,
            mux,
            channel,
            ring,
            sessions: SessionTable::new(),
            next_session_id: SessionId::new(1),
            reporter: Reporter::new(),
            stats: DistributorStats::default(),
            shutdown: Arc::new(Notify::new()),
        })
    }

    /// Returns the bound address.
    ///
    /// # Errors
    /// Returns an error if the socket cannot report its address.
    pub fn local_addr(&self) -> ServerResult<SocketAddr> {
        Ok(self.mux.local_addr()?)
    }

    /// Returns a handle that stops [`run`](Self::run) when notified.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn snapshot(&self) -> DistributorSnapshot {
        DistributorSnapshot {
            active_clients: self.sessions.len(),
            pending_clients: self.ring.len(),
            promised_blocks: self.budget.promised_blocks(),
            remaining_blocks: self.remaining_blocks(),
            occupied_bytes: self.channel.occupied_bytes(),
            capacity_bytes: self.channel.capacity_bytes(),
            reports: self.reporter.reports(),
            stats: self.stats,
        }
    }

    /// Runs until shut down or a fatal error.
    ///
    /// # Errors
    /// Returns an error if the listener fails or the admission ring
    /// overflows under `OverflowPolicy::Exit`.
    pub async fn run(&mut self) -> ServerResult<()> {
        let shutdown = Arc::clone(&self.shutdown);
        loop {
            tokio::select! {
                biased;
                () = shutdown.notified() => {
                    info!(
                        active = self.sessions.len(),
                        pending = self.ring.len(),
                        ring_high_watermark = self.ring.stats().high_watermark,
                        "Distributor shutting down"
                    );
                    return Ok(());
                }
                result = self.step() => result?,
            }
        }
    }

    /// Runs one loop pass.
    ///
    /// # Errors
    /// See [`run`](Self::run).
    pub async fn step(&mut self) -> ServerResult<()> {
        self.admit_waiting()?;

        let block_available = self.channel.has_block(self.block_bytes());
        let events = self
            .mux
            .poll(&self.sessions, block_available, self.config.poll_timeout)
            .await?;

        for event in events {
            match event {
                Event::Connection(stream) => self.on_connection(stream)?,
                Event::Tick { expirations } => self.on_tick(expirations),
                Event::Session { id, readiness } => self.on_session(id, readiness),
            }
        }

        debug_assert_eq!(
            self.budget.promised_blocks(),
            self.remaining_blocks(),
            "budget out of step with sessions"
        );
        Ok(())
    }

    fn block_bytes(&self) -> usize {
        self.config.geometry.block_bytes as usize
    }

    fn occupied(&self) -> u64 {
        self.channel.occupied_bytes() as u64
    }

    fn remaining_blocks(&self) -> u64 {
        self.sessions
            .values()
            .map(|session| u64::from(session.remaining_blocks()))
            .sum()
    }

    /// Moves ring entries into service, oldest first, while the budget allows.
    fn admit_waiting(&mut self) -> ServerResult<()> {
        while !self.ring.is_empty() && self.budget.admits(self.occupied()) {
            let Some(pending) = self.ring.pop_front() else {
                break;
            };
            self.activate(pending)?;
        }
        Ok(())
    }

    fn on_connection(&mut self, stream: TcpStream) -> ServerResult<()> {
        let id = self.next_session_id;
        self.next_session_id = id.next();
        self.stats.accepted += 1;
        let pending = PendingClient::new(id, stream);

        if self.budget.admits(self.occupied()) {
            // Whoever has waited longest goes first.
            return match self.ring.pop_front() {
                Some(head) => {
                    self.enqueue(pending)?;
                    self.activate(head)
                }
                None => self.activate(pending),
            };
        }

        if self.ring.is_full() {
            return self.overflow(pending);
        }
        self.enqueue(pending)
    }

    fn enqueue(&mut self, pending: PendingClient) -> ServerResult<()> {
        let id = pending.id();
        self.ring.push(pending)?;
        debug!(session = %id, waiting = self.ring.len(), "Client queued");
        Ok(())
    }

    fn overflow(&mut self, pending: PendingClient) -> ServerResult<()> {
        let capacity = self.ring.capacity();
        match self.config.overflow_policy {
            OverflowPolicy::Reject => {
                self.stats.rejected += 1;
                warn!(
                    session = %pending.id(),
                    capacity,
                    "Admission ring full, rejecting client"
                );
                Ok(())
            }
            OverflowPolicy::Exit => {
                error!(capacity, "Admission ring full");
                Err(ServerError::AdmissionRingFull { capacity })
            }
        }
    }

    /// Promises a unit to `pending` and starts watching it.
    fn activate(&mut self, pending: PendingClient) -> ServerResult<()> {
        let id = pending.id();
        let waited = pending.waited();
        let unit_blocks = self.config.geometry.unit_blocks;

        let session = match Session::admit(pending, unit_blocks) {
            Ok(session) => session,
            Err(e) => {
                self.stats.disconnected += 1;
                warn!(session = %id, error = %e, "Client gone before admission");
                return Ok(());
            }
        };

        let occupied = self.occupied();
        self.budget.try_reserve(occupied)?;
        self.stats.admitted += 1;
        info!(
            session = %id,
            peer = %session.peer(),
            waited_ms = waited.as_millis(),
            promised_blocks = self.budget.promised_blocks(),
            "Client admitted"
        );
        self.sessions.insert(id, session);
        Ok(())
    }

    fn on_session(&mut self, id: SessionId, readiness: Readiness) {
        let block_bytes = self.block_bytes();
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };

        if readiness.readable {
            match session.drain_inbound() {
                Ok(Inbound::Open) => {}
                Ok(Inbound::Closed) => return self.disconnect(id, &"peer closed"),
                Err(e) => return self.disconnect(id, &e),
            }
        }

        if !readiness.writable {
            return;
        }

        let before = session.remaining_blocks();
        let outcome = session.on_writable(&mut self.channel, block_bytes);
        self.budget
            .release(u64::from(before - session.remaining_blocks()));

        match outcome {
            Ok(WriteOutcome::Sent) => {
                self.stats.blocks_sent += 1;
                if session.is_complete() {
                    self.complete(id);
                }
            }
            Ok(WriteOutcome::Partial | WriteOutcome::Starved) => {}
            Err(e) => self.disconnect(id, &e),
        }
    }

    fn complete(&mut self, id: SessionId) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        self.stats.completed += 1;
        info!(
            session = %id,
            peer = %session.peer(),
            blocks = session.sent_blocks(),
            elapsed_ms = session.age().as_millis(),
            "Client served"
        );
    }

    /// Tears down a session and hands its undrawn blocks back to the budget.
    fn disconnect(&mut self, id: SessionId, reason: &dyn fmt::Display) {
        let Some(session) = self.sessions.remove(&id) else {
            return;
        };
        self.budget.release(u64::from(session.remaining_blocks()));

        let lost_blocks = session.undelivered_blocks();
        self.stats.disconnected += 1;
        self.stats.blocks_lost += u64::from(lost_blocks);
        warn!(
            session = %id,
            peer = %session.peer(),
            lost_blocks,
            lost_bytes = u64::from(lost_blocks) * u64::from(self.config.geometry.block_bytes),
            reason = %reason,
            "Client disconnected"
        );
    }

    fn on_tick(&mut self, expirations: u64) {
        let view = ChannelView {
            occupied_bytes: self.channel.occupied_bytes(),
            capacity_bytes: self.channel.capacity_bytes(),
            active_clients: self.sessions.len(),
            pending_clients: self.ring.len(),
            expirations,
        };
        self.reporter.observe(view).emit();
    }
}

impl fmt::Display for DistributorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} admitted={} completed={} disconnected={} rejected={} sent={} lost={}",
            self.accepted,
            self.admitted,
            self.completed,
            self.disconnected,
            self.rejected,
            self.blocks_sent,
            self.blocks_lost
        )
    }
}
