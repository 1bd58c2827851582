//! A read-only, in-memory filesystem of decompressed files.

use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Error, Result};

/// Mode reported for entries that were not given one.
pub const DEFAULT_MODE: u32 = 0o777;

/// Immutable description of a virtual file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    name: String,
    size: u64,
    mode: u32,
    modified: SystemTime,
}

impl Metadata {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn is_dir(&self) -> bool {
        false
    }
}

#[derive(Debug)]
struct Entry {
    metadata: Metadata,
    content: Arc<[u8]>,
}

/// Name-keyed table of decompressed files. Cloning shares the table.
#[derive(Debug, Clone, Default)]
pub struct VirtualFs {
    files: Arc<BTreeMap<String, Entry>>,
}

impl VirtualFs {
    pub fn builder() -> VirtualFsBuilder {
        VirtualFsBuilder::default()
    }

    /// Opens `path` with a fresh cursor at offset zero. Lookups are exact.
    pub fn open(&self, path: &str) -> Result<FileHandle> {
        let entry = self
            .files
            .get(path)
            .ok_or_else(|| Error::NotFound(path.to_string()))?;

        Ok(FileHandle {
            metadata: entry.metadata.clone(),
            content: Arc::clone(&entry.content),
            pos: 0,
        })
    }

    pub fn metadata(&self, path: &str) -> Result<Metadata> {
        self.files
            .get(path)
            .map(|entry| entry.metadata.clone())
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// True when some file lives below `path`.
    pub fn is_dir(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        if path.is_empty() || path == "." {
            return !self.files.is_empty();
        }
        let prefix = format!("{}/", path);
        self.files
            .range(prefix.clone()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(&prefix))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Collects entries for a [`VirtualFs`]. The filesystem only exists once
/// [`finish`](VirtualFsBuilder::finish) seals it.
#[derive(Debug, Default)]
pub struct VirtualFsBuilder {
    files: BTreeMap<String, Entry>,
}

impl VirtualFsBuilder {
    /// Adds a file. `name` is the base name reported by its metadata, `mode`
    /// falls back to [`DEFAULT_MODE`]. A later insert under the same path wins.
    pub fn insert(
        &mut self,
        path: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<Arc<[u8]>>,
        modified: SystemTime,
        mode: Option<u32>,
    ) -> &mut Self {
        let content = content.into();
        let metadata = Metadata {
            name: name.into(),
            size: content.len() as u64,
            mode: mode.unwrap_or(DEFAULT_MODE),
            modified,
        };
        self.files.insert(path.into(), Entry { metadata, content });
        self
    }

    pub fn finish(self) -> VirtualFs {
        VirtualFs {
            files: Arc::new(self.files),
        }
    }
}

/// An open virtual file. Each handle owns its cursor.
#[derive(Debug)]
pub struct FileHandle {
    metadata: Metadata,
    content: Arc<[u8]>,
    pos: u64,
}

impl FileHandle {
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Releases this handle's reference to the content.
    pub fn close(self) {
        drop(self);
    }
}

impl Read for FileHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.pos.min(self.content.len() as u64) as usize;
        let remaining = &self.content[start..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for FileHandle {
    /// Negative targets fail without moving the cursor; targets past the end
    /// land on the end.
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.content.len() as u64;
        let (base, offset) = match pos {
            SeekFrom::Start(n) => {
                self.pos = n.min(len);
                return Ok(self.pos);
            }
            SeekFrom::Current(n) => (self.pos, n),
            SeekFrom::End(n) => (len, n),
        };

        match base.checked_add_signed(offset) {
            Some(target) => {
                self.pos = target.min(len);
                Ok(self.pos)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}
