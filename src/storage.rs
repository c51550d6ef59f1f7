//! Storage abstraction for segment files.
//!
//! Vocabulary note:
//! - Dictionary files are **immutable**: written once through [`Directory::create_file`],
//!   then only ever read.
//! - Readers assume storage hands back the bytes that were written, or an IO error.
//!   Silent bit rot is not detected at open time by default; it surfaces when the
//!   damaged block is decoded, or eagerly through checksum verification
//!   (`OpenOptions::verify_checksum_on_open` or an explicit verify pass).

use crate::error::{TermDictError, TermDictResult};
use std::io::{Read, Seek, Write};
use std::path::PathBuf;

/// Random-access handle to an immutable file.
///
/// Every cursor opens its own input so concurrent enumerations never share a file
/// position or a read buffer.
pub trait IndexInput: Read + Seek + Send {
    /// Total length of the file in bytes.
    fn len(&self) -> u64;

    /// Whether the file has no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Trait for directory-like storage backends.
pub trait Directory: Send + Sync {
    /// Create a new file for writing (overwriting if it exists).
    fn create_file(&self, path: &str) -> TermDictResult<Box<dyn Write>>;
    /// Open an existing file for sequential reading.
    fn open_file(&self, path: &str) -> TermDictResult<Box<dyn Read>>;
    /// Open an existing file for random-access reads.
    fn open_input(&self, path: &str) -> TermDictResult<Box<dyn IndexInput>>;
    /// Return whether a path exists.
    fn exists(&self, path: &str) -> bool;
    /// Delete a file or directory (directories recursively).
    fn delete(&self, path: &str) -> TermDictResult<()>;
    /// Create a directory (and parents if needed).
    fn create_dir_all(&self, path: &str) -> TermDictResult<()>;
    /// List entries in a directory.
    fn list_dir(&self, path: &str) -> TermDictResult<Vec<String>>;
    /// Atomically write bytes to a path.
    fn atomic_write(&self, path: &str, data: &[u8]) -> TermDictResult<()>;
    /// Optional filesystem path for backends that support it.
    fn file_path(&self, path: &str) -> Option<PathBuf>;
}

/// Read a whole file out of a directory.
pub fn read_file<D: Directory + ?Sized>(dir: &D, path: &str) -> TermDictResult<Vec<u8>> {
    let mut buf = Vec::new();
    dir.open_file(path)?.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Filesystem-backed `Directory` rooted at a local path.
pub struct FsDirectory {
    root: PathBuf,
}

impl FsDirectory {
    /// Create (or open) a filesystem directory backend rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> TermDictResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Directory for FsDirectory {
    fn create_file(&self, path: &str) -> TermDictResult<Box<dyn Write>> {
        let full_path = self.resolve_path(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Box::new(std::io::BufWriter::new(std::fs::File::create(
            full_path,
        )?)))
    }

    fn open_file(&self, path: &str) -> TermDictResult<Box<dyn Read>> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Err(TermDictError::MissingPath(full_path));
        }
        Ok(Box::new(std::fs::File::open(full_path)?))
    }

    fn open_input(&self, path: &str) -> TermDictResult<Box<dyn IndexInput>> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Err(TermDictError::MissingPath(full_path));
        }
        let file = std::fs::File::open(full_path)?;
        let len = file.metadata()?.len();
        Ok(Box::new(FsIndexInput {
            inner: std::io::BufReader::new(file),
            len,
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).exists()
    }

    fn delete(&self, path: &str) -> TermDictResult<()> {
        let full_path = self.resolve_path(path);
        if full_path.is_dir() {
            std::fs::remove_dir_all(full_path)?;
        } else if full_path.exists() {
            std::fs::remove_file(full_path)?;
        }
        Ok(())
    }

    fn create_dir_all(&self, path: &str) -> TermDictResult<()> {
        std::fs::create_dir_all(self.resolve_path(path))?;
        Ok(())
    }

    fn list_dir(&self, path: &str) -> TermDictResult<Vec<String>> {
        let full_path = self.resolve_path(path);
        if !full_path.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(full_path)?;
        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            out.push(entry.file_name().to_string_lossy().to_string());
        }
        out.sort();
        Ok(out)
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> TermDictResult<()> {
        let temp_path = format!("{path}.tmp");
        let full_temp_path = self.resolve_path(&temp_path);
        if let Some(parent) = full_temp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut temp_file = std::fs::File::create(&full_temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;

        let full_path = self.resolve_path(path);
        std::fs::rename(&full_temp_path, &full_path)?;

        if let Some(parent) = full_path.parent() {
            if let Ok(parent_file) = std::fs::File::open(parent) {
                let _ = parent_file.sync_all();
            }
        }
        Ok(())
    }

    fn file_path(&self, path: &str) -> Option<PathBuf> {
        Some(self.resolve_path(path))
    }
}

struct FsIndexInput {
    inner: std::io::BufReader<std::fs::File>,
    len: u64,
}

impl Read for FsIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for FsIndexInput {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl IndexInput for FsIndexInput {
    fn len(&self) -> u64 {
        self.len
    }
}

/// In-memory `Directory` used for tests.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    files: std::sync::Arc<std::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>>,
}

impl MemoryDirectory {
    /// Create an empty in-memory directory.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Directory for MemoryDirectory {
    fn create_file(&self, path: &str) -> TermDictResult<Box<dyn Write>> {
        // Overwrite semantics: clear the file eagerly, then append in-place.
        self.files
            .write()
            .map_err(|_| TermDictError::InvalidState("memory directory lock poisoned".into()))?
            .insert(path.to_string(), Vec::new());

        Ok(Box::new(MemoryInPlaceWriter {
            files: self.files.clone(),
            path: path.to_string(),
        }))
    }

    fn open_file(&self, path: &str) -> TermDictResult<Box<dyn Read>> {
        let files = self
            .files
            .read()
            .map_err(|_| TermDictError::InvalidState("memory directory lock poisoned".into()))?;
        let data = files
            .get(path)
            .ok_or_else(|| TermDictError::NotFound(path.to_string()))?
            .clone();
        Ok(Box::new(std::io::Cursor::new(data)))
    }

    fn open_input(&self, path: &str) -> TermDictResult<Box<dyn IndexInput>> {
        let files = self
            .files
            .read()
            .map_err(|_| TermDictError::InvalidState("memory directory lock poisoned".into()))?;
        let data = files
            .get(path)
            .ok_or_else(|| TermDictError::NotFound(path.to_string()))?
            .clone();
        Ok(Box::new(MemoryIndexInput {
            cursor: std::io::Cursor::new(data),
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.files
            .read()
            .map(|f| f.contains_key(path))
            .unwrap_or(false)
    }

    fn delete(&self, path: &str) -> TermDictResult<()> {
        self.files
            .write()
            .map_err(|_| TermDictError::InvalidState("memory directory lock poisoned".into()))?
            .remove(path);
        Ok(())
    }

    fn create_dir_all(&self, _path: &str) -> TermDictResult<()> {
        Ok(())
    }

    fn list_dir(&self, path: &str) -> TermDictResult<Vec<String>> {
        let files = self
            .files
            .read()
            .map_err(|_| TermDictError::InvalidState("memory directory lock poisoned".into()))?;
        let prefix = if path.is_empty() {
            "".to_string()
        } else {
            format!("{path}/")
        };
        let mut result: Vec<String> = files
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| k.strip_prefix(&prefix).unwrap_or(k).to_string())
            .collect();
        result.sort();
        Ok(result)
    }

    fn atomic_write(&self, path: &str, data: &[u8]) -> TermDictResult<()> {
        let mut files = self
            .files
            .write()
            .map_err(|_| TermDictError::InvalidState("memory directory lock poisoned".into()))?;
        files.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn file_path(&self, _path: &str) -> Option<PathBuf> {
        None
    }
}

struct MemoryIndexInput {
    cursor: std::io::Cursor<Vec<u8>>,
}

impl Read for MemoryIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryIndexInput {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl IndexInput for MemoryIndexInput {
    fn len(&self) -> u64 {
        self.cursor.get_ref().len() as u64
    }
}

struct MemoryInPlaceWriter {
    files: std::sync::Arc<std::sync::RwLock<std::collections::HashMap<String, Vec<u8>>>>,
    path: String,
}

impl Write for MemoryInPlaceWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut files = self
            .files
            .write()
            .map_err(|_| std::io::Error::other("lock poisoned"))?;
        let entry = files.entry(self.path.clone()).or_insert_with(Vec::new);
        entry.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
