//! Reader side of the shared-memory market block.
//!
//! Layout of the 820-byte block:
//!
//! | offset | size | field                              |
//! |--------|------|------------------------------------|
//! | 0      | 800  | up to 100 little-endian `f64`       |
//! | 800    | 4    | little-endian `i32` element count   |
//! | 808    | 1    | consumer-ready flag (set by us)     |
//! | 809    | 1    | producer-ready flag                 |
//!
//! There is no lock on the region. A torn write is only caught when it
//! leaves the count out of range.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::lifecycle::ShutdownSignal;
use memmap2::{MmapMut, MmapOptions};
use strategy::stats;
use thiserror::Error;
use tracing::{debug, info};

pub const BLOCK_SIZE: usize = 820;
pub const DATA_SIZE: usize = 800;
pub const COUNT_OFFSET: usize = 800;
pub const CONSUMER_READY_OFFSET: usize = 808;
pub const PRODUCER_READY_OFFSET: usize = 809;
pub const MAX_SAMPLES: usize = DATA_SIZE / 8;

#[derive(Error, Debug)]
pub enum ShmError {
    #[error("failed to open shared memory {path:?}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("shared memory {path:?} is {len} bytes, need at least 820")]
    TooSmall { path: PathBuf, len: u64 },
    #[error("failed to map shared memory: {0}")]
    Map(#[source] io::Error),
}

/// Decodes the samples in `block`, or `None` when the count is outside
/// `1..=100` or the block is short.
pub fn decode_block(block: &[u8]) -> Option<Vec<f64>> {
    if block.len() < COUNT_OFFSET + 4 {
        return None;
    }
    let count_bytes: [u8; 4] = block[COUNT_OFFSET..COUNT_OFFSET + 4].try_into().ok()?;
    let count = i32::from_le_bytes(count_bytes);
    if count <= 0 || count as usize > MAX_SAMPLES {
        return None;
    }

    let samples = block[..count as usize * 8]
        .chunks_exact(8)
        .filter_map(|chunk| chunk.try_into().ok().map(f64::from_le_bytes))
        .collect();
    Some(samples)
}

/// A mapped shared-memory block. The mapping is released before the file.
pub struct ShmConnection {
    map: MmapMut,
    _file: File,
    path: PathBuf,
}

impl ShmConnection {
    /// Maps the block at `path` and raises the consumer-ready flag.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, ShmError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| ShmError::Open {
                path: path.clone(),
                source,
            })?;

        let len = file
            .metadata()
            .map_err(|source| ShmError::Open {
                path: path.clone(),
                source,
            })?
            .len();
        if len < BLOCK_SIZE as u64 {
            return Err(ShmError::TooSmall { path, len });
        }

        // SAFETY: the producer only ever writes inside the block; torn reads
        // are tolerated and filtered by the count check.
        let mut map = unsafe { MmapOptions::new().len(BLOCK_SIZE).map_mut(&file) }
            .map_err(ShmError::Map)?;
        map[CONSUMER_READY_OFFSET] = 1;
        map.flush().map_err(ShmError::Map)?;

        info!("Connected to shared memory at {:?}", path);
        Ok(Self {
            map,
            _file: file,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn producer_ready(&self) -> bool {
        self.map[PRODUCER_READY_OFFSET] != 0
    }

    /// Snapshot of the current samples, or `None` if there is no valid data.
    pub fn read(&self) -> Option<Vec<f64>> {
        let mut block = [0u8; COUNT_OFFSET + 4];
        block.copy_from_slice(&self.map[..COUNT_OFFSET + 4]);
        decode_block(&block)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStats {
    pub mean: f64,
    pub std_dev: f64,
}

impl SampleStats {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        Some(Self {
            mean: stats::mean(samples)?,
            std_dev: stats::population_std(samples)?,
        })
    }
}

/// Polls the block and logs summary statistics until shutdown.
pub struct ShmIngestor {
    connection: ShmConnection,
    poll_interval: Duration,
}

impl ShmIngestor {
    pub fn new(connection: ShmConnection, poll_interval: Duration) -> Self {
        Self {
            connection,
            poll_interval,
        }
    }

    /// One poll of the block.
    pub fn poll_once(&self) -> Option<SampleStats> {
        let samples = self.connection.read()?;
        let stats = SampleStats::from_samples(&samples)?;
        info!("Market Data Analysis - Mean: {:.2}, Std: {:.2}", stats.mean, stats.std_dev);
        Some(stats)
    }

    /// Returns the number of polls that found data.
    pub async fn run(&mut self, mut shutdown: ShutdownSignal) -> u64 {
        info!("Reading shared memory {:?} every {:?}", self.connection.path(), self.poll_interval);
        let mut observed = 0u64;
        while !shutdown.is_requested() {
            if self.poll_once().is_some() {
                observed += 1;
            } else {
                debug!("No data in shared memory");
            }
            if !shutdown.sleep(self.poll_interval).await {
                break;
            }
        }
        info!("Shared memory reader stopped after {} reads with data", observed);
        observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::lifecycle::Lifecycle;
    use std::io::{Read, Seek, SeekFrom, Write};
    use tempfile::NamedTempFile;

    fn block(samples: &[f64], count: i32) -> Vec<u8> {
        let mut bytes = vec![0u8; BLOCK_SIZE];
        for (i, v) in samples.iter().enumerate() {
            bytes[i * 8..i * 8 + 8].copy_from_slice(&v.to_le_bytes());
        }
        bytes[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&count.to_le_bytes());
        bytes
    }

    fn segment(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_decode_counts() {
        let samples = [1.5, 2.5, 3.5];
        assert_eq!(decode_block(&block(&samples, 3)), Some(samples.to_vec()));
        assert_eq!(decode_block(&block(&samples, 2)), Some(vec![1.5, 2.5]));
        assert_eq!(decode_block(&block(&samples, 0)), None);
        assert_eq!(decode_block(&block(&samples, 101)), None);
        assert_eq!(decode_block(&block(&samples, -1)), None);
        assert_eq!(decode_block(&[0u8; 10]), None);

        let full: Vec<f64> = (0..100).map(f64::from).collect();
        assert_eq!(decode_block(&block(&full, 100)).map(|v| v.len()), Some(100));
    }

    #[test]
    fn test_connect_sets_consumer_flag() {
        let mut file = segment(&block(&[10.0, 20.0], 2));
        let conn = ShmConnection::connect(file.path()).unwrap();
        assert_eq!(conn.read(), Some(vec![10.0, 20.0]));
        assert!(!conn.producer_ready());
        drop(conn);

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes[CONSUMER_READY_OFFSET], 1);
    }

    #[test]
    fn test_read_sees_producer_updates() {
        let mut file = segment(&block(&[], 0));
        let conn = ShmConnection::connect(file.path()).unwrap();
        assert_eq!(conn.read(), None);

        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(&block(&[4.0, 8.0], 2)[..COUNT_OFFSET + 4]).unwrap();
        file.flush().unwrap();
        assert_eq!(conn.read(), Some(vec![4.0, 8.0]));
    }

    #[test]
    fn test_connect_errors() {
        let small = segment(&[0u8; 100]);
        assert!(matches!(
            ShmConnection::connect(small.path()),
            Err(ShmError::TooSmall { len: 100, .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ShmConnection::connect(dir.path().join("missing")),
            Err(ShmError::Open { .. })
        ));
    }

    #[test]
    fn test_stats_are_population() {
        let file = segment(&block(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8));
        let connection = ShmConnection::connect(file.path()).unwrap();
        let ingestor = ShmIngestor::new(connection, Duration::from_millis(1));
        assert_eq!(
            ingestor.poll_once(),
            Some(SampleStats {
                mean: 5.0,
                std_dev: 2.0
            })
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let file = segment(&block(&[1.0], 1));
        let connection = ShmConnection::connect(file.path()).unwrap();
        let mut ingestor = ShmIngestor::new(connection, Duration::from_millis(5));
        let lifecycle = Lifecycle::new();

        let (observed, _) = tokio::join!(ingestor.run(lifecycle.signal()), async {
            tokio::time::sleep(Duration::from_millis(40)).await;
            lifecycle.shutdown();
        });
        assert!(observed >= 1);
    }
}
