//! Name-keyed registry of dictionary formats.
//!
//! Segment metadata records which format wrote a dictionary; consumers resolve
//! that name through an explicitly constructed [`FormatRegistry`] rather than a
//! process-wide table. [`FormatRegistry::with_defaults`] seeds the block-tree
//! format under its canonical name and a compatibility alias.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{TermDictError, TermDictResult};
use crate::reader::{OpenOptions, TermDictReader, TermDictionary};
use crate::storage::Directory;
use crate::writer::{BlockTreeWriter, DictionaryWriter, EncoderConfig};

/// Canonical name of the block-tree format with deferred body verification.
pub const BLOCKTREE_FORMAT_NAME: &str = "blocktree-fastopen";
/// Alias kept for segments recorded before the open policy was part of the name.
pub const BLOCKTREE_FORMAT_ALIAS: &str = "blocktree";

/// One dictionary format: a way to create and a way to open segment dictionaries.
pub trait TermDictFormat: Send + Sync {
    /// Canonical name recorded in segment metadata.
    fn name(&self) -> &'static str;

    /// Open `segment`'s dictionary for reading.
    fn open(
        &self,
        dir: Arc<dyn Directory>,
        segment: &str,
        options: OpenOptions,
    ) -> TermDictResult<Box<dyn TermDictionary>>;

    /// Create `segment`'s dictionary files and return the writer.
    fn create(
        &self,
        dir: &dyn Directory,
        segment: &str,
        config: EncoderConfig,
    ) -> TermDictResult<Box<dyn DictionaryWriter>>;
}

/// The prefix-sharing block-tree format.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTreeFormat;

impl TermDictFormat for BlockTreeFormat {
    fn name(&self) -> &'static str {
        BLOCKTREE_FORMAT_NAME
    }

    fn open(
        &self,
        dir: Arc<dyn Directory>,
        segment: &str,
        options: OpenOptions,
    ) -> TermDictResult<Box<dyn TermDictionary>> {
        Ok(Box::new(TermDictReader::open(dir, segment, options)?))
    }

    fn create(
        &self,
        dir: &dyn Directory,
        segment: &str,
        config: EncoderConfig,
    ) -> TermDictResult<Box<dyn DictionaryWriter>> {
        Ok(Box::new(BlockTreeWriter::create(dir, segment, config)?))
    }
}

/// Explicit format table; nothing global, callers own their registry.
#[derive(Default)]
pub struct FormatRegistry {
    formats: BTreeMap<String, Arc<dyn TermDictFormat>>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in block-tree format under both of its names.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let format: Arc<dyn TermDictFormat> = Arc::new(BlockTreeFormat);
        registry
            .formats
            .insert(BLOCKTREE_FORMAT_NAME.to_string(), format.clone());
        registry
            .formats
            .insert(BLOCKTREE_FORMAT_ALIAS.to_string(), format);
        registry
    }

    /// Register `format` under `name`. Re-registering a taken name is refused;
    /// two names may map to the same format only through separate calls.
    pub fn register(
        &mut self,
        name: &str,
        format: Arc<dyn TermDictFormat>,
    ) -> TermDictResult<()> {
        if self.formats.contains_key(name) {
            return Err(TermDictError::InvalidConfig(format!(
                "dictionary format \"{name}\" is already registered"
            )));
        }
        self.formats.insert(name.to_string(), format);
        Ok(())
    }

    /// Resolve a recorded format name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn TermDictFormat>> {
        self.formats.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.formats.keys().map(String::as_str).collect()
    }

    /// Open `segment` with the format recorded under `name`.
    pub fn open(
        &self,
        name: &str,
        dir: Arc<dyn Directory>,
        segment: &str,
        options: OpenOptions,
    ) -> TermDictResult<Box<dyn TermDictionary>> {
        self.resolve(name)?.open(dir, segment, options)
    }

    /// Create `segment`'s dictionary with the format registered under `name`.
    pub fn create(
        &self,
        name: &str,
        dir: &dyn Directory,
        segment: &str,
        config: EncoderConfig,
    ) -> TermDictResult<Box<dyn DictionaryWriter>> {
        self.resolve(name)?.create(dir, segment, config)
    }

    fn resolve(&self, name: &str) -> TermDictResult<Arc<dyn TermDictFormat>> {
        self.get(name).ok_or_else(|| {
            TermDictError::NotFound(format!("dictionary format \"{name}\""))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_both_names() {
        let registry = FormatRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            vec![BLOCKTREE_FORMAT_ALIAS, BLOCKTREE_FORMAT_NAME]
        );
        let by_name = registry.get(BLOCKTREE_FORMAT_NAME).unwrap();
        let by_alias = registry.get(BLOCKTREE_FORMAT_ALIAS).unwrap();
        assert_eq!(by_name.name(), BLOCKTREE_FORMAT_NAME);
        assert_eq!(by_alias.name(), BLOCKTREE_FORMAT_NAME);
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut registry = FormatRegistry::with_defaults();
        let err = registry
            .register(BLOCKTREE_FORMAT_NAME, Arc::new(BlockTreeFormat))
            .unwrap_err();
        assert!(matches!(err, TermDictError::InvalidConfig(_)));
        registry
            .register("blocktree-v2", Arc::new(BlockTreeFormat))
            .unwrap();
    }

    #[test]
    fn unknown_name_is_not_found() {
        let registry = FormatRegistry::new();
        let err = registry.resolve(BLOCKTREE_FORMAT_NAME).err().unwrap();
        assert!(matches!(err, TermDictError::NotFound(_)));
    }
}
