//! Readiness multiplexing over the listener, the report timer and active
//! sessions.
//!
//! One call to [`Multiplexer::poll`] is one readiness pass. Every source is
//! polled with the same task context, so whichever becomes ready first wakes
//! the pass; all sources ready at that moment are returned together.

use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;

use sluice_core::SessionId;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::error::{ServerError, ServerResult};
use crate::session::SessionTable;

/// Readiness of a session socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    /// Inbound data or a hangup is waiting.
    pub readable: bool,
    /// The socket accepts more bytes.
    pub writable: bool,
}

/// Something that happened during a readiness pass.
#[derive(Debug)]
pub enum Event {
    /// A new connection was accepted.
    Connection(TcpStream),
    /// The report timer fired.
    Tick {
        /// Report periods elapsed since the previous tick, at least one.
        expirations: u64,
    },
    /// An active session became ready.
    Session {
        /// Session id.
        id: SessionId,
        /// What it is ready for.
        readiness: Readiness,
    },
}

impl Event {
    /// Returns where the event came from.
    #[must_use]
    pub const fn source(&self) -> Source {
        match self {
            Self::Connection(_) => Source::Listener,
            Self::Tick { .. } => Source::Timer,
            Self::Session { id, .. } => Source::Session(*id),
        }
    }
}

/// Origin of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The listening socket.
    Listener,
    /// The report timer.
    Timer,
    /// An active session.
    Session(SessionId),
}

/// Listener plus report timer.
#[derive(Debug)]
pub struct Multiplexer {
    listener: TcpListener,
    clock: Interval,
    period: Duration,
    last_tick: Instant,
}

impl Multiplexer {
    /// Creates a multiplexer whose timer first fires one `period` from now.
    #[must_use]
    pub fn new(listener: TcpListener, period: Duration) -> Self {
        let start = Instant::now();
        let mut clock = time::interval_at(start + period, period);
        clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self {
            listener,
            clock,
            period,
            last_tick: start,
        }
    }

    /// Returns the address the listener is bound to.
    ///
    /// # Errors
    /// Returns an error if the socket cannot report its address.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Waits up to `timeout` for any source to become ready.
    ///
    /// Write readiness is only watched for sessions that want to write given
    /// `block_available`. An empty result means the timeout elapsed.
    ///
    /// # Errors
    /// Returns `ServerError::Accept` if the listener fails.
    pub async fn poll(
        &mut self,
        sessions: &SessionTable,
        block_available: bool,
        timeout: Duration,
    ) -> ServerResult<Vec<Event>> {
        let pass = poll_fn(|cx| self.poll_sources(cx, sessions, block_available));
        time::timeout(timeout, pass)
            .await
            .unwrap_or_else(|_elapsed| Ok(Vec::new()))
    }

    fn poll_sources(
        &mut self,
        cx: &mut Context<'_>,
        sessions: &SessionTable,
        block_available: bool,
    ) -> Poll<ServerResult<Vec<Event>>> {
        let mut events = Vec::new();

        match self.listener.poll_accept(cx) {
            Poll::Ready(Ok((stream, _))) => events.push(Event::Connection(stream)),
            Poll::Ready(Err(e)) => return Poll::Ready(Err(ServerError::Accept(e))),
            Poll::Pending => {}
        }

        if self.clock.poll_tick(cx).is_ready() {
            events.push(Event::Tick {
                expirations: self.expirations(Instant::now()),
            });
        }

        for (id, session) in sessions {
            let stream = session.stream();
            // An error is reported as readable; the read surfaces it.
            let readiness = Readiness {
                readable: stream.poll_read_ready(cx).is_ready(),
                writable: session.wants_write(block_available)
                    && stream.poll_write_ready(cx).is_ready(),
            };
            if readiness.readable || readiness.writable {
                events.push(Event::Session { id: *id, readiness });
            }
        }

        if events.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(Ok(events))
        }
    }

    fn expirations(&mut self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        let periods = elapsed.as_nanos() / self.period.as_nanos().max(1);
        u64::try_from(periods).unwrap_or(u64::MAX).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{PendingClient, Session};

    async fn multiplexer(period: Duration) -> Multiplexer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Multiplexer::new(listener, period)
    }

    #[tokio::test]
    async fn test_timeout_yields_no_events() {
        let mut mux = multiplexer(Duration::from_secs(60)).await;
        let events = mux
            .poll(&SessionTable::new(), false, Duration::from_millis(5))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_accepts_connection() {
        let mut mux = multiplexer(Duration::from_secs(60)).await;
        let addr = mux.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();

        let events = mux
            .poll(&SessionTable::new(), false, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source(), Source::Listener);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_counts_skipped_periods() {
        let mut mux = multiplexer(Duration::from_secs(5)).await;

        let events = mux
            .poll(&SessionTable::new(), false, Duration::from_secs(6))
            .await
            .unwrap();
        assert!(matches!(events[..], [Event::Tick { expirations: 1 }]));

        // Stall the loop for three periods.
        time::advance(Duration::from_secs(15)).await;
        let events = mux
            .poll(&SessionTable::new(), false, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(matches!(events[..], [Event::Tick { expirations: 3 }]));
    }

    #[tokio::test]
    async fn test_write_readiness_needs_a_block() {
        let mut mux = multiplexer(Duration::from_secs(60)).await;
        let addr = mux.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = mux.listener.accept().await.unwrap();

        let id = SessionId::new(1);
        let mut sessions = SessionTable::new();
        sessions.insert(id, Session::admit(PendingClient::new(id, server), 4).unwrap());

        let idle = mux
            .poll(&sessions, false, Duration::from_millis(20))
            .await
            .unwrap();
        assert!(idle.is_empty());

        let events = mux
            .poll(&sessions, true, Duration::from_secs(5))
            .await
            .unwrap();
        match &events[..] {
            [Event::Session { id: got, readiness }] => {
                assert_eq!(*got, id);
                assert!(readiness.writable);
                assert!(!readiness.readable);
            }
            other => panic!("unexpected events: {other:?}"),
        }
        drop(client);
    }
}
