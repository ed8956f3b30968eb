//! Store Module
//!
//! The persistent map: index tree, pair chains, count and locking.
//!
//! ## Responsibilities
//! - Open or create the files of a layout and validate the header
//! - Route get/put/remove through the index and the pair chains
//! - Keep the element count mirrored in the header
//! - Invalidate live iterators on every mutation
//!
//! ## Concurrency Model: Multiple-Reader / Single-Writer
//!
//! - **Reads** (get/len/iteration steps): shared lock
//! - **Writes** (put/remove/clear): exclusive lock
//! - Each storage additionally serializes its own seek + read/write sequences
//! - With `lock_timeout` set, a lock wait that runs out fails with
//!   `Cancelled` and leaves the store untouched

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace, warn};

use crate::codec::{BincodeCodec, Codec, HashCode};
use crate::config::{Config, Layout, PairFormat};
use crate::error::{PmapError, Result};
use crate::header::{self, EOF};
use crate::index::{IndexDriver, ScanCursor};
use crate::pair::PairDriver;
use crate::storage::{FileBackend, MappedBackend, SplitBackend, Storage};

/// A file-backed map from `K` to `V`
///
/// Keys are placed by [`HashCode`] and compared with `Eq`; pairs are
/// serialized with the codec `C`.
pub struct Store<K, V, C = BincodeCodec> {
    /// Store configuration
    config: Config,

    /// Index tree over the index storage
    index: IndexDriver,

    /// Pair records over the pair storage
    pairs: PairDriver,

    /// Index and pairs share one file
    shared: bool,

    codec: C,

    /// In-memory mirror of the header count
    size: AtomicUsize,

    /// Bumped by every mutation; iterators compare it on each step
    generation: AtomicU64,

    /// Store-level reader/writer lock
    lock: RwLock<()>,

    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Store<K, V, BincodeCodec>
where
    K: HashCode + Eq + serde::Serialize + serde::de::DeserializeOwned,
    V: serde::Serialize + serde::de::DeserializeOwned,
{
    /// Open or create a store with the bincode codec
    pub fn open(config: Config) -> Result<Self> {
        Self::with_codec(config, BincodeCodec)
    }

    /// Open or create a single-file store at `path`
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().single_file(path.as_ref()).build())
    }
}

impl<K, V, C> Store<K, V, C>
where
    K: HashCode + Eq,
    C: Codec<K, V>,
{
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const INDEX_EXTENSION: &'static str = "idx";
    const DATA_EXTENSION: &'static str = "data";

    /// Open or create a store with a custom codec
    ///
    /// On startup:
    /// 1. Validate the configuration
    /// 2. Open the index and pair storages of the layout
    /// 3. Write a fresh header if the index file is new
    /// 4. Check the signature and load the count
    pub fn with_codec(config: Config, codec: C) -> Result<Self> {
        config.validate()?;
        let format = config.effective_pair_format();

        let (index, pairs, fresh) = Self::open_storages(&config)?;
        let shared = Arc::ptr_eq(&index, &pairs);

        if fresh {
            header::initialize(&index)?;
            if !shared {
                pairs.set_len(0)?;
            }
            info!(storage = index.name(), ?format, "Created store");
        }

        header::check_signature(&index)?;
        let size = header::read_count(&index)?;
        info!(storage = index.name(), size, ?format, "Opened store");

        Ok(Self {
            config,
            index: IndexDriver::new(Arc::clone(&index)),
            pairs: PairDriver::new(index, pairs, format),
            shared,
            codec,
            size: AtomicUsize::new(size),
            generation: AtomicU64::new(0),
            lock: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    fn open_storages(config: &Config) -> Result<(Arc<Storage>, Arc<Storage>, bool)> {
        match &config.layout {
            Layout::SingleFile { path } => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
                let fresh = Self::is_fresh(path)?;
                let storage = Arc::new(Storage::new(
                    path.display().to_string(),
                    FileBackend::open(path)?,
                ));
                Ok((Arc::clone(&storage), storage, fresh))
            }
            Layout::Directory { dir, name } => {
                let (index, fresh) = Self::open_index(dir, name, config.cache_index)?;
                let data_path = dir.join(format!("{}.{}", name, Self::DATA_EXTENSION));
                let pairs = Storage::new(
                    data_path.display().to_string(),
                    FileBackend::open(&data_path)?,
                );
                Ok((index, Arc::new(pairs), fresh))
            }
            Layout::SplitData {
                dir,
                name,
                max_file_size,
                max_files,
            } => {
                let (index, fresh) = Self::open_index(dir, name, config.cache_index)?;
                let base = format!("{}.{}", name, Self::DATA_EXTENSION);
                let pairs = Storage::new(
                    dir.join(&base).display().to_string(),
                    SplitBackend::open(dir, &base, *max_file_size, *max_files)?,
                );
                Ok((index, Arc::new(pairs), fresh))
            }
        }
    }

    fn open_index(dir: &Path, name: &str, cache: bool) -> Result<(Arc<Storage>, bool)> {
        let path: PathBuf = dir.join(format!("{}.{}", name, Self::INDEX_EXTENSION));
        let fresh = Self::is_fresh(&path)?;
        let label = path.display().to_string();
        let storage = if cache {
            Storage::new(label, MappedBackend::open(&path)?)
        } else {
            Storage::new(label, FileBackend::open(&path)?)
        };
        Ok((Arc::new(storage), fresh))
    }

    fn is_fresh(path: &Path) -> Result<bool> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.len() == 0),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(err) => Err(err.into()),
        }
    }

    // =========================================================================
    // Locking
    // =========================================================================

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, ()>> {
        match self.config.lock_timeout {
            None => Ok(self.lock.read()),
            Some(timeout) => self.lock.try_read_for(timeout).ok_or_else(|| {
                warn!(?timeout, "Timed out waiting for the read lock");
                PmapError::Cancelled(format!("read lock not acquired within {:?}", timeout))
            }),
        }
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        match self.config.lock_timeout {
            None => Ok(self.lock.write()),
            Some(timeout) => self.lock.try_write_for(timeout).ok_or_else(|| {
                warn!(?timeout, "Timed out waiting for the write lock");
                PmapError::Cancelled(format!("write lock not acquired within {:?}", timeout))
            }),
        }
    }

    fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn set_size(&self, size: usize) -> Result<()> {
        header::write_count(self.index.storage(), size)?;
        self.size.store(size, Ordering::SeqCst);
        Ok(())
    }

    // =========================================================================
    // Map Operations
    // =========================================================================

    /// Number of pairs
    pub fn len(&self) -> Result<usize> {
        let _guard = self.read_guard()?;
        Ok(self.size.load(Ordering::SeqCst))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Value stored for `key`
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let _guard = self.read_guard()?;
        let hash = key.hash_code();
        trace!(hash, "get");
        match self.index.find(hash)? {
            Some(node) => self.pairs.find(node.chain_head(hash)?, key, &self.codec),
            None => Ok(None),
        }
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert or replace `key`, returning the previous value
    pub fn put(&self, key: K, value: V) -> Result<Option<V>> {
        let _guard = self.write_guard()?;
        self.put_locked(&key, &value)
    }

    fn put_locked(&self, key: &K, value: &V) -> Result<Option<V>> {
        let hash = key.hash_code();
        trace!(hash, "put");

        let mut path = self.index.locate(hash)?;
        let mut node = match path.pop() {
            Some(position) if position != EOF => self.index.read_node(position)?,
            _ => self.index.insert(&mut path, hash, EOF)?,
        };

        let previous = self
            .pairs
            .add_pair(&mut node, hash, key, value, &self.codec)?;
        if previous.is_none() {
            self.set_size(self.size.load(Ordering::SeqCst) + 1)?;
        }
        self.bump_generation();
        Ok(previous)
    }

    /// Insert every pair of `entries` under one exclusive lock
    pub fn put_all<I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let _guard = self.write_guard()?;
        for (key, value) in entries {
            self.put_locked(&key, &value)?;
        }
        Ok(())
    }

    /// Remove `key`, returning its value
    pub fn remove(&self, key: &K) -> Result<Option<V>> {
        let _guard = self.write_guard()?;
        let hash = key.hash_code();
        trace!(hash, "remove");

        let mut path = self.index.locate(hash)?;
        let position = match path.last() {
            Some(&position) if position != EOF => position,
            _ => return Ok(None),
        };
        let mut node = self.index.read_node(position)?;

        let Some(removed) = self.pairs.remove_pair(&mut node, hash, key, &self.codec)? else {
            return Ok(None);
        };
        if removed.chain_empty {
            self.index.remove_hash(&mut path, hash)?;
        }

        self.set_size(self.size.load(Ordering::SeqCst).saturating_sub(1))?;
        self.bump_generation();
        Ok(Some(removed.value))
    }

    /// Drop every pair and reset the files to an empty map
    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_guard()?;
        let index = self.index.storage();
        header::initialize(index)?;
        if !self.shared {
            self.pairs.truncate()?;
        }
        self.size.store(0, Ordering::SeqCst);
        self.bump_generation();
        info!(storage = index.name(), "Cleared store");
        Ok(())
    }

    /// Is `value` stored under any key
    pub fn contains_value(&self, value: &V) -> Result<bool>
    where
        V: PartialEq,
    {
        for entry in self.iter() {
            let (_, stored) = entry?;
            if &stored == value {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Iterate all pairs in hash order
    ///
    /// Fails with `ConcurrentModification` on the first step after any
    /// mutation of the store.
    pub fn iter(&self) -> Iter<'_, K, V, C> {
        Iter {
            store: self,
            cursor: ScanCursor::new(),
            generation: self.generation.load(Ordering::SeqCst),
            done: false,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = Result<K>> + '_ {
        self.iter().map(|entry| entry.map(|(key, _)| key))
    }

    pub fn values(&self) -> impl Iterator<Item = Result<V>> + '_ {
        self.iter().map(|entry| entry.map(|(_, value)| value))
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Bytes used on disk by the index and the pairs
    pub fn file_size(&self) -> Result<u64> {
        let _guard = self.read_guard()?;
        let index = self.index.storage().len()?;
        if self.shared {
            Ok(index)
        } else {
            Ok(index + self.pairs.storage_len()?)
        }
    }

    /// Pair record format in use
    pub fn pair_format(&self) -> PairFormat {
        self.pairs.format()
    }

    /// Flush both storages to disk
    pub fn sync(&self) -> Result<()> {
        let _guard = self.write_guard()?;
        self.index.storage().sync()?;
        if !self.shared {
            self.pairs.sync()?;
        }
        Ok(())
    }

    /// Flush and close the store
    pub fn close(self) -> Result<()> {
        self.sync()?;
        debug!(storage = self.index.storage().name(), "Closed store");
        Ok(())
    }
}

/// Fail-fast iterator over the pairs of a [`Store`]
pub struct Iter<'a, K, V, C> {
    store: &'a Store<K, V, C>,
    cursor: ScanCursor,
    generation: u64,
    done: bool,
}

impl<'a, K, V, C> Iter<'a, K, V, C>
where
    K: HashCode + Eq,
    C: Codec<K, V>,
{
    fn step(&mut self) -> Result<Option<(K, V)>> {
        let _guard = self.store.read_guard()?;
        if self.store.generation.load(Ordering::SeqCst) != self.generation {
            return Err(PmapError::ConcurrentModification);
        }
        match self.cursor.next_pair(&self.store.index, &self.store.pairs)? {
            Some(pair) => Ok(Some(self.store.codec.decode(&pair.data)?)),
            None => Ok(None),
        }
    }
}

impl<'a, K, V, C> Iterator for Iter<'a, K, V, C>
where
    K: HashCode + Eq,
    C: Codec<K, V>,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.step() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
