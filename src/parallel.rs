//! Parallel processing configuration and management
//!
//! Multi-file reads fan out over a dedicated Rayon pool whose size is set here.

use crate::errors::{NdImageError, Result};
use log::info;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Worker bound; `None` means one worker per CPU core.
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Create a configuration that uses all available CPU cores
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Number of workers a pool built from this configuration will have
    pub fn effective_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Build a bounded pool for one multi-file read
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let threads = self.effective_threads();
        ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("nd-image-io-{}", i))
            .build()
            .map_err(|e| {
                NdImageError::ThreadPoolError(format!(
                    "Failed to build a pool with {} threads: {}",
                    threads, e
                ))
            })
    }
}

/// Get information about the current parallel configuration
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl ParallelInfo {
    /// Log parallel processing information
    pub fn log_info(&self) {
        info!(
            "threads: {} current, {} CPU cores, {} available parallelism",
            self.current_threads, self.available_cores, self.available_parallelism
        );
    }
}
