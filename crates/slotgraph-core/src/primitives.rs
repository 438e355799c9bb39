//! # Engine Primitives
//!
//! Fixed constants of the slot graph engine.
//!
//! These values describe the donor slot-table format and the shape of the
//! emitted manifest. They are compiled in and immutable at runtime; anything
//! a caller may want to vary lives in [`crate::rules::RuleConfig`] instead.

/// Column names of a slot table when a part carries no header row.
///
/// Child entries are read as `[type, default, description, options?]`.
pub const DEFAULT_SLOT_COLUMNS: [&str; 3] = ["type", "default", "description"];

/// First-cell values that mark a row as a header row rather than an entry.
pub const HEADER_MARKERS: [&str; 2] = ["type", "name"];

/// Column holding the allowed part type tags.
pub const ALLOW_TYPES_COLUMN: &str = "allowTypes";

/// Column holding the denied part type tags.
pub const DENY_TYPES_COLUMN: &str = "denyTypes";

/// Manifest document version.
///
/// Bump when a field of the manifest changes meaning.
pub const MANIFEST_VERSION: &str = "3.0";

/// Shortest trailing hash accepted by suffix-agnostic slot matching.
pub const MIN_HASH_SUFFIX_LEN: usize = 4;

/// Longest trailing hash accepted by suffix-agnostic slot matching.
pub const MAX_HASH_SUFFIX_LEN: usize = 8;

/// Maximum length of a slot type or part name.
///
/// Longer identifiers are treated as malformed entries.
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Maximum number of rows read from a single part's slot table.
///
/// Rows beyond this limit are skipped with a warning.
pub const MAX_SLOT_ROWS: usize = 4096;
