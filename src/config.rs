//! Configuration for pmapkv
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PmapError, Result};

/// Main configuration for a pmapkv store
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Where the index and the pairs live on disk
    pub layout: Layout,

    /// Record format of the pairs (fixed for the lifetime of the files)
    pub pair_format: PairFormat,

    /// Memory-map the index file (directory layouts only)
    pub cache_index: bool,

    // -------------------------------------------------------------------------
    // Concurrency Configuration
    // -------------------------------------------------------------------------
    /// Maximum time to wait for the store lock; `None` waits forever
    pub lock_timeout: Option<Duration>,
}

/// File layout of a store
#[derive(Debug, Clone)]
pub enum Layout {
    /// Index and pairs share one file. Pairs are always append-only.
    SingleFile { path: PathBuf },

    /// `{dir}/{name}.idx` for the index, `{dir}/{name}.data` for the pairs
    Directory { dir: PathBuf, name: String },

    /// `{dir}/{name}.idx` for the index, pairs split across
    /// `{dir}/{name}.data.0`, `{dir}/{name}.data.1`, ...
    SplitData {
        dir: PathBuf,
        name: String,
        max_file_size: u64,
        max_files: usize,
    },
}

/// Pair record format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairFormat {
    /// Self-contained records appended at the end of the pair storage.
    /// Removed records are never reused.
    Append,

    /// Header plus a chain of data blocks. Removed headers and blocks are
    /// recycled through free lists.
    Partitioned,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: Layout::SingleFile {
                path: PathBuf::from("./pmapkv.bin"),
            },
            pair_format: PairFormat::Append,
            cache_index: false,
            lock_timeout: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the layout matches what is on disk
    pub fn validate(&self) -> Result<()> {
        match &self.layout {
            Layout::SingleFile { path } => {
                if path.is_dir() {
                    return Err(PmapError::Config(format!(
                        "{} is a directory",
                        path.display()
                    )));
                }
            }
            Layout::Directory { dir, name } => {
                Self::check_dir(dir)?;
                Self::check_name(name)?;
            }
            Layout::SplitData {
                dir,
                name,
                max_file_size,
                max_files,
            } => {
                Self::check_dir(dir)?;
                Self::check_name(name)?;
                if *max_file_size == 0 || *max_files == 0 {
                    return Err(PmapError::Config(
                        "split data files need a non-zero size and count".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// The pair format actually used: single-file stores are always append-only
    pub fn effective_pair_format(&self) -> PairFormat {
        match self.layout {
            Layout::SingleFile { .. } => PairFormat::Append,
            _ => self.pair_format,
        }
    }

    fn check_dir(dir: &Path) -> Result<()> {
        if !dir.is_dir() {
            return Err(PmapError::Config(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
        Ok(())
    }

    fn check_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(PmapError::Config("store name must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Store everything in a single file
    pub fn single_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.layout = Layout::SingleFile { path: path.into() };
        self
    }

    /// Store the index and the pairs in two files of a directory
    pub fn directory(mut self, dir: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        self.config.layout = Layout::Directory {
            dir: dir.into(),
            name: name.into(),
        };
        self
    }

    /// Store the pairs in a set of size-capped files
    pub fn split_data(
        mut self,
        dir: impl Into<PathBuf>,
        name: impl Into<String>,
        max_file_size: u64,
        max_files: usize,
    ) -> Self {
        self.config.layout = Layout::SplitData {
            dir: dir.into(),
            name: name.into(),
            max_file_size,
            max_files,
        };
        self
    }

    /// Set the pair record format
    pub fn pair_format(mut self, format: PairFormat) -> Self {
        self.config.pair_format = format;
        self
    }

    /// Memory-map the index file
    pub fn cache_index(mut self, cache: bool) -> Self {
        self.config.cache_index = cache;
        self
    }

    /// Bound the time spent waiting for the store lock
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
