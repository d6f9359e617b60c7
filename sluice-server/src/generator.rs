//! Synthetic block generator.
//!
//! Writes fixed-size chunks into the channel at a steady rate regardless of
//! demand. When the channel is full the generator waits; it never drops data.
//! It stops once the distributor drops its end of the channel.

use std::io;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, info};

use crate::channel::ChannelWriter;
use crate::config::{ConfigError, DistributorConfig};
use crate::error::ChannelError;

/// First content marker written.
pub const FIRST_MARKER: u8 = b'a';

/// Returns the marker following `marker`: `a..=z`, then `A..=Z`, then back.
#[must_use]
pub const fn next_marker(marker: u8) -> u8 {
    match marker {
        b'z' => b'A',
        b'Z' => b'a',
        _ => marker + 1,
    }
}

/// Counters reported when the generator stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeneratorStats {
    /// Chunks written.
    pub chunks_written: u64,
    /// Bytes written.
    pub bytes_written: u64,
}

/// Produces chunks into the channel.
#[derive(Debug)]
pub struct Generator {
    writer: ChannelWriter,
    chunk_bytes: usize,
    interval: Duration,
    marker: u8,
}

impl Generator {
    /// Creates a generator for the given configuration.
    ///
    /// The pause between chunks is `chunk / (base_rate * frequency)` seconds,
    /// computed once here.
    ///
    /// # Errors
    /// Returns an error if the frequency does not yield a usable interval.
    pub fn new(writer: ChannelWriter, config: &DistributorConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            writer,
            chunk_bytes: config.geometry.chunk_bytes as usize,
            interval: config.chunk_interval()?,
            marker: FIRST_MARKER,
        })
    }

    /// Returns the pause between chunks.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Builds the next chunk and advances the marker.
    fn next_chunk(&mut self) -> Bytes {
        let chunk = Bytes::from(vec![self.marker; self.chunk_bytes]);
        self.marker = next_marker(self.marker);
        chunk
    }

    /// Runs until the reading side of the channel is gone.
    pub async fn run(mut self) -> GeneratorStats {
        let mut stats = GeneratorStats::default();
        info!(
            chunk_bytes = self.chunk_bytes,
            interval_us = self.interval.as_micros(),
            "Generator started"
        );

        loop {
            let chunk = self.next_chunk();
            match self.writer.send(chunk).await {
                Ok(()) => {
                    stats.chunks_written += 1;
                    stats.bytes_written += self.chunk_bytes as u64;
                }
                Err(ChannelError::Closed) => break,
                Err(e) => {
                    error!(error = %e, "Generator cannot write to channel");
                    break;
                }
            }
            tokio::time::sleep(self.interval).await;
        }

        info!(
            chunks = stats.chunks_written,
            bytes = stats.bytes_written,
            "Generator stopped"
        );
        stats
    }

    /// Runs the generator on its own thread with its own runtime.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self) -> io::Result<thread::JoinHandle<GeneratorStats>> {
        thread::Builder::new()
            .name("sluice-generator".to_string())
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(self.run()),
                    Err(e) => {
                        error!(error = %e, "Failed to start generator runtime");
                        GeneratorStats::default()
                    }
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel;

    #[test]
    fn test_marker_cycles_through_both_cases() {
        let mut marker = FIRST_MARKER;
        let mut seen = Vec::new();
        for _ in 0..53 {
            seen.push(marker);
            marker = next_marker(marker);
        }

        let expected: Vec<u8> = (b'a'..=b'z').chain(b'A'..=b'Z').chain([b'a']).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_chunks_are_uniform() {
        let (writer, _reader) = channel::bounded(65536);
        let mut generator = Generator::new(writer, &DistributorConfig::for_testing()).unwrap();

        let first = generator.next_chunk();
        let second = generator.next_chunk();
        assert_eq!(first.len(), 640);
        assert!(first.iter().all(|&b| b == b'a'));
        assert!(second.iter().all(|&b| b == b'b'));
    }

    #[tokio::test]
    async fn test_fills_channel_and_stops_when_reader_dropped() {
        let mut config = DistributorConfig::for_testing();
        config.frequency = 1000.0;
        let (writer, reader) = channel::bounded(6400);
        let generator = Generator::new(writer, &config).unwrap();

        let handle = generator.spawn().unwrap();

        // Ten chunks fill the channel; the generator then waits.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while reader.occupied_bytes() < 6400 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(reader.occupied_bytes(), 6400);

        drop(reader);
        let stats = tokio::task::spawn_blocking(move || handle.join())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.chunks_written, 10);
        assert_eq!(stats.bytes_written, 6400);
    }
}
