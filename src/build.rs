//! Turning a tree of `.gz` files into decompressed content.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use walkdir::WalkDir;

use crate::decoder::ScopedDecoder;
use crate::error::{Error, Result};
use crate::file_serving::resource::CompressedResource;
use crate::logging::LoggingExt;
use crate::vfs::{FileHandle, VirtualFs};

/// Base-name suffix marking members that need decompressing.
pub const COMPRESSION_SUFFIX: &str = ".gz";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Other,
}

/// One member of a source tree, addressed by its `/`-separated path relative
/// to the tree root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub name: String,
    pub kind: EntryKind,
}

impl TreeEntry {
    pub fn is_compressed(&self) -> bool {
        self.kind == EntryKind::File && self.name.ends_with(COMPRESSION_SUFFIX)
    }

    pub fn stripped_path(&self) -> &str {
        self.path
            .strip_suffix(COMPRESSION_SUFFIX)
            .unwrap_or(&self.path)
    }

    pub fn stripped_name(&self) -> &str {
        self.name
            .strip_suffix(COMPRESSION_SUFFIX)
            .unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub modified: SystemTime,
    pub mode: Option<u32>,
}

/// Read-only access to a tree of files.
pub trait SourceTree {
    type Reader: Read;

    /// Every entry below the root, each exactly once.
    fn entries(&self) -> Box<dyn Iterator<Item = Result<TreeEntry>> + '_>;

    fn open(&self, path: &str) -> Result<Self::Reader>;

    fn metadata(&self, path: &str) -> Result<SourceMetadata>;
}

/// A directory on disk. Symlinks are reported as [`EntryKind::Other`].
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
}

impl DirTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(metadata: &std::fs::Metadata) -> Option<u32> {
    Some(if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    })
}

impl SourceTree for DirTree {
    type Reader = File;

    fn entries(&self) -> Box<dyn Iterator<Item = Result<TreeEntry>> + '_> {
        if let Err(e) = std::fs::metadata(&self.root) {
            let root = self.root.display().to_string();
            return Box::new(std::iter::once(Err(Error::io(root, e))));
        }

        let walk = WalkDir::new(&self.root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .map(move |entry| {
                let entry = entry?;
                let file_type = entry.file_type();
                let kind = if file_type.is_file() {
                    EntryKind::File
                } else if file_type.is_dir() {
                    EntryKind::Dir
                } else {
                    EntryKind::Other
                };
                Ok(TreeEntry {
                    path: self.relative(entry.path()),
                    name: entry.file_name().to_string_lossy().into_owned(),
                    kind,
                })
            });
        Box::new(walk)
    }

    fn open(&self, path: &str) -> Result<File> {
        File::open(self.root.join(path)).map_err(|e| Error::io(path, e))
    }

    fn metadata(&self, path: &str) -> Result<SourceMetadata> {
        let metadata = std::fs::metadata(self.root.join(path)).map_err(|e| Error::io(path, e))?;
        Ok(SourceMetadata {
            modified: metadata.modified().map_err(|e| Error::io(path, e))?,
            mode: file_mode(&metadata),
        })
    }
}

impl SourceTree for VirtualFs {
    type Reader = FileHandle;

    fn entries(&self) -> Box<dyn Iterator<Item = Result<TreeEntry>> + '_> {
        Box::new(self.paths().map(|path| {
            let name = path.rsplit('/').next().unwrap_or(path);
            Ok(TreeEntry {
                path: path.to_string(),
                name: name.to_string(),
                kind: EntryKind::File,
            })
        }))
    }

    fn open(&self, path: &str) -> Result<FileHandle> {
        VirtualFs::open(self, path)
    }

    fn metadata(&self, path: &str) -> Result<SourceMetadata> {
        let metadata = VirtualFs::metadata(self, path)?;
        Ok(SourceMetadata {
            modified: metadata.modified(),
            mode: Some(metadata.mode()),
        })
    }
}

/// Decompresses every regular `.gz` file of `tree` into a sealed
/// [`VirtualFs`], keyed by the path without the suffix.
///
/// Other entries are skipped. Any failure aborts the whole build.
pub fn decompress_tree<T: SourceTree>(tree: &T) -> Result<VirtualFs> {
    let start_time = Instant::now();
    let mut decoder = ScopedDecoder::new();
    let mut builder = VirtualFs::builder();

    for entry in tree.entries() {
        let entry = entry?;
        if !entry.is_compressed() {
            log::trace!("Skipping {}", entry.path);
            continue;
        }

        let reader = tree.open(&entry.path)?;
        let content = entry.path.as_str().log_operation("decompress", || {
            decoder.decompress_from(&entry.path, reader)
        })?;
        let metadata = tree.metadata(&entry.path)?;

        log::debug!(
            "Decompressed {} -> {} ({} bytes)",
            entry.path,
            entry.stripped_path(),
            content.len()
        );
        builder.insert(
            entry.stripped_path(),
            entry.stripped_name(),
            content,
            metadata.modified,
            metadata.mode,
        );
    }

    log::info!(
        "Decompressed {} files in {:?}",
        decoder.members(),
        start_time.elapsed()
    );
    Ok(builder.finish())
}

/// Loads every regular `.gz` file of `tree` as a [`CompressedResource`],
/// keyed by the path without the suffix. Any failure aborts the load.
pub fn resources_from_tree<T: SourceTree>(tree: &T) -> Result<HashMap<String, CompressedResource>> {
    let start_time = Instant::now();
    let mut resources = HashMap::new();

    for entry in tree.entries() {
        let entry = entry?;
        if !entry.is_compressed() {
            continue;
        }

        let metadata = tree.metadata(&entry.path)?;
        let resource = entry.path.as_str().log_operation("load", || {
            CompressedResource::from_reader(
                entry.stripped_name(),
                tree.open(&entry.path)?,
                None,
                None,
                metadata.modified,
            )
        })?;
        resources.insert(entry.stripped_path().to_string(), resource);
    }

    log::info!(
        "Loaded {} compressed resources in {:?}",
        resources.len(),
        start_time.elapsed()
    );
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use std::time::Duration;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn compressed_tree() -> (VirtualFs, SystemTime) {
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
        let mut builder = VirtualFs::builder();
        builder
            .insert("dir/sub/a.txt.gz", "a.txt.gz", gzip(b"nested"), time, Some(0o600))
            .insert("top.bin.gz", "top.bin.gz", gzip(&[0, 1, 2, 3]), time, Some(0o644))
            .insert("plain.txt", "plain.txt", &b"left alone"[..], time, None);
        (builder.finish(), time)
    }

    #[test]
    fn test_suffix_stripping() {
        let (source, time) = compressed_tree();
        let fs = decompress_tree(&source).unwrap();

        assert_eq!(fs.paths().collect::<Vec<_>>(), ["dir/sub/a.txt", "top.bin"]);

        let mut a = fs.open("dir/sub/a.txt").unwrap();
        assert_eq!(a.metadata().name(), "a.txt");
        assert_eq!(a.metadata().modified(), time);
        assert_eq!(a.metadata().mode(), 0o600);
        let mut content = String::new();
        a.read_to_string(&mut content).unwrap();
        assert_eq!(content, "nested");

        let top = fs.metadata("top.bin").unwrap();
        assert_eq!(top.size(), 4);
        assert_eq!(top.mode(), 0o644);
        assert!(fs.is_dir("dir/sub"));
        assert!(fs.open("plain.txt").unwrap_err().is_not_found());
    }

    #[test]
    fn test_corrupt_member_fails_build() {
        let (source, time) = compressed_tree();
        let mut builder = VirtualFs::builder();
        for path in source.paths() {
            let mut content = Vec::new();
            source.open(path).unwrap().read_to_end(&mut content).unwrap();
            builder.insert(path, path, content, time, None);
        }
        let mut truncated = gzip(b"this member is cut short");
        truncated.truncate(truncated.len() - 4);
        builder.insert("broken.gz", "broken.gz", truncated, time, None);

        assert!(decompress_tree(&builder.finish()).is_err());
    }

    #[test]
    fn test_entry_helpers() {
        let entry = TreeEntry {
            path: "a/b.tar.gz".to_string(),
            name: "b.tar.gz".to_string(),
            kind: EntryKind::File,
        };
        assert!(entry.is_compressed());
        assert_eq!(entry.stripped_path(), "a/b.tar");
        assert_eq!(entry.stripped_name(), "b.tar");

        let dir = TreeEntry {
            kind: EntryKind::Dir,
            ..entry.clone()
        };
        assert!(!dir.is_compressed());

        let gz_only_suffix = TreeEntry {
            name: "notgz".to_string(),
            ..entry
        };
        assert!(!gz_only_suffix.is_compressed());
    }

    #[test]
    fn test_resources_from_tree() {
        let (source, time) = compressed_tree();
        let resources = resources_from_tree(&source).unwrap();

        assert_eq!(resources.len(), 2);
        let a = &resources["dir/sub/a.txt"];
        assert_eq!(a.name(), "a.txt");
        assert_eq!(a.decompressed(), b"nested");
        assert_eq!(a.last_modified(), time);
    }
}
