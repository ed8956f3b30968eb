//! Split-file backend
//!
//! One logical byte space spread over `{name}.0`, `{name}.1`, ... in a
//! directory. Every file except the last is exactly `max_file_size` bytes,
//! so logical offset `o` lives in file `o / max_file_size`.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{PmapError, Result};

use super::Backend;

/// Random access over a bounded set of size-capped files
pub struct SplitBackend {
    dir: PathBuf,
    name: String,
    max_file_size: u64,
    max_files: usize,
    files: BTreeMap<usize, File>,
    position: u64,
}

impl SplitBackend {
    /// Open the file set `{dir}/{name}.N`, picking up files already on disk
    pub fn open(dir: &Path, name: &str, max_file_size: u64, max_files: usize) -> Result<Self> {
        if max_file_size == 0 || max_files == 0 {
            return Err(PmapError::Config(
                "split data files need a non-zero size and count".to_string(),
            ));
        }

        let mut backend = Self {
            dir: dir.to_path_buf(),
            name: name.to_string(),
            max_file_size,
            max_files,
            files: BTreeMap::new(),
            position: 0,
        };

        for index in 0..max_files {
            let path = backend.path_of(index);
            if path.exists() {
                backend.files.insert(index, Self::open_file(&path)?);
            }
        }
        Ok(backend)
    }

    fn path_of(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, index))
    }

    fn open_file(path: &Path) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }

    fn capacity(&self) -> u64 {
        self.max_file_size * self.max_files as u64
    }

    /// File holding `index`, created on demand
    fn file_mut(&mut self, index: usize) -> Result<&mut File> {
        if index >= self.max_files {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("split data limit of {} files reached", self.max_files),
            )
            .into());
        }
        if !self.files.contains_key(&index) {
            let file = Self::open_file(&self.path_of(index))?;
            debug!(file = index, name = %self.name, "Created split data file");
            self.files.insert(index, file);
        }
        self.files
            .get_mut(&index)
            .ok_or_else(|| PmapError::Corruption(format!("split data file {} vanished", index)))
    }

    /// File index, in-file offset and bytes left in that file for `position`
    fn split(&self, position: u64) -> (usize, u64, u64) {
        let index = (position / self.max_file_size) as usize;
        let local = position % self.max_file_size;
        (index, local, self.max_file_size - local)
    }
}

impl Backend for SplitBackend {
    fn seek(&mut self, offset: u64) -> Result<()> {
        self.position = offset;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let (index, local, left) = self.split(self.position);
            let take = left.min((buf.len() - done) as u64) as usize;
            let file = self.files.get_mut(&index).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("split data file {} does not exist", index),
                )
            })?;
            file.seek(SeekFrom::Start(local))?;
            file.read_exact(&mut buf[done..done + take])?;
            done += take;
            self.position += take as u64;
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let (index, local, left) = self.split(self.position);
            let take = left.min((buf.len() - done) as u64) as usize;
            let file = self.file_mut(index)?;
            file.seek(SeekFrom::Start(local))?;
            file.write_all(&buf[done..done + take])?;
            done += take;
            self.position += take as u64;
        }
        Ok(())
    }

    fn len(&self) -> Result<u64> {
        match self.files.iter().next_back() {
            Some((index, file)) => {
                Ok(*index as u64 * self.max_file_size + file.metadata()?.len())
            }
            None => Ok(0),
        }
    }

    fn set_len(&mut self, len: u64) -> Result<()> {
        if len > self.capacity() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{} bytes exceed the split data capacity of {}", len, self.capacity()),
            )
            .into());
        }

        let last = if len == 0 {
            0
        } else {
            ((len - 1) / self.max_file_size) as usize
        };

        let surplus: Vec<usize> = self.files.range(last + 1..).map(|(i, _)| *i).collect();
        for index in surplus {
            self.files.remove(&index);
            fs::remove_file(self.path_of(index))?;
            debug!(file = index, name = %self.name, "Removed split data file");
        }

        let max_file_size = self.max_file_size;
        for index in 0..last {
            self.file_mut(index)?.set_len(max_file_size)?;
        }
        let tail = len - last as u64 * max_file_size;
        self.file_mut(last)?.set_len(tail)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        for file in self.files.values() {
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_across_file_boundary() {
        let temp = TempDir::new().unwrap();
        let mut backend = SplitBackend::open(temp.path(), "data", 10, 4).unwrap();

        let payload: Vec<u8> = (0u8..25).collect();
        backend.write_bytes_at(3, &payload).unwrap();

        assert_eq!(backend.len().unwrap(), 28);
        assert!(temp.path().join("data.2").exists());
        assert!(!temp.path().join("data.3").exists());

        let mut read = vec![0u8; 25];
        backend.read_bytes_at(3, &mut read).unwrap();
        assert_eq!(read, payload);
    }

    #[test]
    fn test_truncate_removes_surplus_files() {
        let temp = TempDir::new().unwrap();
        let mut backend = SplitBackend::open(temp.path(), "data", 8, 4).unwrap();

        backend.write_bytes_at(0, &[7u8; 30]).unwrap();
        backend.set_len(9).unwrap();

        assert_eq!(backend.len().unwrap(), 9);
        assert!(temp.path().join("data.1").exists());
        assert!(!temp.path().join("data.2").exists());
        assert!(!temp.path().join("data.3").exists());

        backend.set_len(0).unwrap();
        assert_eq!(backend.len().unwrap(), 0);
    }

    #[test]
    fn test_reopen_sees_existing_files() {
        let temp = TempDir::new().unwrap();
        {
            let mut backend = SplitBackend::open(temp.path(), "data", 16, 3).unwrap();
            backend.write_u64_at(12, 0xDEAD_BEEF).unwrap();
        }
        let mut backend = SplitBackend::open(temp.path(), "data", 16, 3).unwrap();
        assert_eq!(backend.len().unwrap(), 20);
        assert_eq!(backend.read_u64_at(12).unwrap(), 0xDEAD_BEEF);
    }

    #[test]
    fn test_write_past_file_limit_fails() {
        let temp = TempDir::new().unwrap();
        let mut backend = SplitBackend::open(temp.path(), "data", 4, 2).unwrap();
        assert!(backend.write_bytes_at(6, &[1u8; 4]).is_err());
    }
}
