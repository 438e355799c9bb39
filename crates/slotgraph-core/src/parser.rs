//! # Parser Seam
//!
//! The core never reads files. A [`PartParser`] turns a donor file into a
//! [`PartMap`] and is handed to the builder as a trait object.

use crate::{PartMap, SlotGraphError};
use std::collections::BTreeMap;
use std::path::Path;

/// Parsing collaborator for donor files.
pub trait PartParser {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Check that the parser can be used at all.
    ///
    /// Called once when a builder is constructed with this parser.
    fn check_available(&self) -> Result<(), SlotGraphError>;

    /// Parse one donor file into part records.
    ///
    /// Returns [`SlotGraphError::MalformedFile`] when the content cannot be
    /// interpreted; the builder turns that into a warning and skips the file.
    fn parse(&self, path: &Path) -> Result<PartMap, SlotGraphError>;
}

/// In-memory parser keyed by path, for fixtures and benchmarks.
#[derive(Debug, Clone, Default)]
pub struct MemoryParser {
    files: BTreeMap<String, PartMap>,
}

impl MemoryParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the parsed content of a path.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, parts: PartMap) -> Self {
        self.files.insert(path.into(), parts);
        self
    }
}

impl PartParser for MemoryParser {
    fn name(&self) -> &str {
        "memory"
    }

    fn check_available(&self) -> Result<(), SlotGraphError> {
        Ok(())
    }

    fn parse(&self, path: &Path) -> Result<PartMap, SlotGraphError> {
        let key = path.to_string_lossy();
        self.files
            .get(key.as_ref())
            .cloned()
            .ok_or_else(|| SlotGraphError::MalformedFile {
                path: key.into_owned(),
                reason: "no content registered".to_string(),
            })
    }
}

/// Parser that is never available.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableParser;

impl PartParser for UnavailableParser {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn check_available(&self) -> Result<(), SlotGraphError> {
        Err(SlotGraphError::ParserUnavailable(
            "no donor-file parser configured".to_string(),
        ))
    }

    fn parse(&self, path: &Path) -> Result<PartMap, SlotGraphError> {
        Err(SlotGraphError::ParserUnavailable(format!(
            "cannot parse {}",
            path.display()
        )))
    }
}
