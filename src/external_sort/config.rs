use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::external_sort::constants::*;
use crate::external_sort::error::{Result, SortError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SortConfig {
    /// Records per chunk. Inputs no larger than this never touch disk.
    pub chunk_capacity: usize,
    /// Directory for spill files; the system temp directory when unset.
    pub temp_directory: Option<PathBuf>,
    pub io_buffer_size_kb: usize,
    pub parallel_chunk_sort: bool,
    pub memory_usage_percent: f64,
    pub estimated_record_bytes: usize,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            temp_directory: None,
            io_buffer_size_kb: DEFAULT_IO_BUFFER_SIZE_KB,
            parallel_chunk_sort: true,
            memory_usage_percent: DEFAULT_MEMORY_USAGE_PERCENT,
            estimated_record_bytes: DEFAULT_ESTIMATED_RECORD_BYTES,
        }
    }
}

impl SortConfig {
    pub fn with_chunk_capacity(chunk_capacity: usize) -> Self {
        Self {
            chunk_capacity,
            ..Default::default()
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_capacity == 0 {
            return Err(SortError::InvalidConfig(
                "Chunk capacity must be a positive number of records".to_string(),
            ));
        }

        if self.io_buffer_size_kb < MIN_IO_BUFFER_SIZE_KB
            || self.io_buffer_size_kb > MAX_IO_BUFFER_SIZE_KB
        {
            return Err(SortError::InvalidConfig(format!(
                "I/O buffer size must be between {} and {} KB",
                MIN_IO_BUFFER_SIZE_KB, MAX_IO_BUFFER_SIZE_KB
            )));
        }

        if self.memory_usage_percent < MIN_MEMORY_USAGE_PERCENT
            || self.memory_usage_percent > MAX_MEMORY_USAGE_PERCENT
        {
            return Err(SortError::InvalidConfig(format!(
                "Memory usage percent must be between {} and {}",
                MIN_MEMORY_USAGE_PERCENT, MAX_MEMORY_USAGE_PERCENT
            )));
        }

        if self.estimated_record_bytes == 0 {
            return Err(SortError::InvalidConfig(
                "Estimated record size must be positive".to_string(),
            ));
        }

        Ok(())
    }

    pub fn io_buffer_size_bytes(&self) -> usize {
        self.io_buffer_size_kb * BYTES_PER_KB
    }

    /// Chunk capacity that keeps one chunk within the configured share of
    /// system memory, given the estimated in-memory size of a record.
    pub fn auto_chunk_capacity(&self) -> usize {
        use sysinfo::System;
        let mut system = System::new();
        system.refresh_memory();

        let budget = system.total_memory() as f64 * self.memory_usage_percent / 100.0;
        capacity_for_budget(budget as usize, self.estimated_record_bytes)
    }
}

fn capacity_for_budget(budget_bytes: usize, record_bytes: usize) -> usize {
    (budget_bytes / record_bytes.max(1)).max(1)
}
