//! The consumer loop: connect, take one unit, account, repeat.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::config::ConsumerConfig;
use crate::error::{ConsumerError, ConsumerResult};
use crate::storage::Storage;
use crate::timing::{ConsumerSummary, SessionTiming};

/// Pulls units from a producer until local storage is full.
#[derive(Debug)]
pub struct Consumer {
    config: ConsumerConfig,
    storage: Storage,
    block_pause: Duration,
}

impl Consumer {
    /// Creates a consumer.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ConsumerConfig) -> ConsumerResult<Self> {
        config.validate()?;
        Ok(Self {
            storage: Storage::new(&config),
            block_pause: config.block_pause()?,
            config,
        })
    }

    /// Returns the storage state.
    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Runs sessions until storage no longer has room for a unit.
    ///
    /// # Errors
    /// Returns an error if the producer cannot be reached or closes a
    /// connection mid-unit.
    pub async fn run(mut self) -> ConsumerResult<ConsumerSummary> {
        let mut summary = ConsumerSummary::new()?;
        info!(
            server = %self.config.server_addr,
            free_bytes = self.storage.free_bytes(),
            pause_ms = self.block_pause.as_millis(),
            "Consumer started"
        );

        while self.storage.wants_unit() {
            let timing = self.session().await?;
            let recovered = self.storage.degrade(&timing);
            debug!(
                local_addr = %timing.local_addr,
                recovered,
                free_bytes = self.storage.free_bytes(),
                "Session finished"
            );
            summary.record(timing);
        }

        summary.free_bytes = self.storage.free_bytes();
        Ok(summary)
    }

    /// Runs one session on a fresh connection.
    async fn session(&mut self) -> ConsumerResult<SessionTiming> {
        let addr = self.config.server_addr;
        let mut stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ConsumerError::Connect { addr, source })?;
        let connected_at = Instant::now();
        let local_addr = stream.local_addr()?;

        let first_block_at = self.receive_unit(&mut stream).await?;
        let finished_at = Instant::now();

        Ok(SessionTiming {
            local_addr,
            wait: first_block_at.unwrap_or(connected_at) - connected_at,
            service: finished_at - first_block_at.unwrap_or(finished_at),
        })
    }

    /// Reads one unit, pausing after each block. Returns when the first block
    /// arrived.
    async fn receive_unit(&mut self, stream: &mut TcpStream) -> ConsumerResult<Option<Instant>> {
        let unit_blocks = self.config.geometry.unit_blocks;
        let mut block = vec![0u8; self.config.geometry.block_bytes as usize];
        let mut first_block_at = None;

        for received_blocks in 0..unit_blocks {
            match stream.read_exact(&mut block).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(ConsumerError::ServerClosed {
                        received_blocks,
                        expected_blocks: unit_blocks,
                    });
                }
                Err(e) => return Err(e.into()),
            }
            first_block_at.get_or_insert_with(Instant::now);
            self.storage.consume_block();
            tokio::time::sleep(self.block_pause).await;
        }

        Ok(first_block_at)
    }
}
