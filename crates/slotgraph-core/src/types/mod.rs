//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the slot graph engine:
//! - Parsed donor records (`RowCell`, `SlotRow`, `PartRecord`, `PartMap`)
//! - Policy and lifecycle tags (`Disposition`, `SlotState`, `SlotRole`, `AssetRole`)
//! - Recoverable diagnostics (`GraphWarning`, `WarningKind`)
//! - Error types (`SlotGraphError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Implement `Ord` where they are used as keys in `BTreeMap`/`BTreeSet`
//! - Carry no floating-point data
//! - Serialize to stable, lowercase tags

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// PARSED DONOR RECORDS
// =============================================================================

/// One cell of a slot table row, as delivered by the parsing collaborator.
///
/// Donor formats are loosely typed, so the cell keeps the shape it was
/// parsed with and the builder decides what it means by column position.
/// The serde form is externally tagged so that it survives `postcard`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowCell {
    /// Missing or null value.
    Empty,
    /// Boolean flag.
    Flag(bool),
    /// Integral number.
    Integer(i64),
    /// Plain string.
    Text(String),
    /// Nested list, e.g. an `allowTypes` column.
    List(Vec<RowCell>),
    /// Trailing options map, e.g. `{"coreSlot": true}`.
    Options(BTreeMap<String, RowCell>),
}

impl RowCell {
    /// Build a text cell.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Get the cell as a string slice, if it is text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Collect text entries of a list cell (a bare text cell counts as one).
    #[must_use]
    pub fn text_items(&self) -> Vec<String> {
        match self {
            Self::Text(s) if !s.is_empty() => vec![s.clone()],
            Self::List(items) => items
                .iter()
                .filter_map(RowCell::as_text)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A row of a part's slot table.
pub type SlotRow = Vec<RowCell>;

/// A single part as parsed from a donor file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRecord {
    /// The slot this part fills, if any.
    #[serde(rename = "slotType", default, skip_serializing_if = "Option::is_none")]
    pub slot_type: Option<String>,
    /// The part's slot table: header rows and child entries.
    #[serde(default)]
    pub slots: Vec<SlotRow>,
}

impl PartRecord {
    /// Create a part that fills `slot_type`.
    #[must_use]
    pub fn filling(slot_type: impl Into<String>) -> Self {
        Self {
            slot_type: Some(slot_type.into()),
            slots: Vec::new(),
        }
    }

    /// Append a child entry `[slot_type, default, description]`.
    #[must_use]
    pub fn with_slot(mut self, slot_type: &str, default: &str, description: &str) -> Self {
        self.slots.push(vec![
            RowCell::text(slot_type),
            RowCell::text(default),
            RowCell::text(description),
        ]);
        self
    }

    /// Append a raw row.
    #[must_use]
    pub fn with_row(mut self, row: SlotRow) -> Self {
        self.slots.push(row);
        self
    }
}

/// Parsed donor file: part name -> part record.
pub type PartMap = BTreeMap<String, PartRecord>;

// =============================================================================
// DISPOSITION & STATE
// =============================================================================

/// Policy decision for a slot, assigned once during planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Rename the slot type and its default part into the target context.
    Adapt,
    /// Keep the slot exactly as the donor declared it.
    Preserve,
    /// Remove the slot and its exclusively-owned subtree.
    Prune,
    /// Slot added for the target context, absent from every donor file.
    Inject,
    /// Rename the slot type, keep the default part unless told otherwise.
    RemapDefault,
}

impl Disposition {
    /// All dispositions in declaration order.
    pub const ALL: [Disposition; 5] = [
        Disposition::Adapt,
        Disposition::Preserve,
        Disposition::Prune,
        Disposition::Inject,
        Disposition::RemapDefault,
    ];

    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Adapt => "adapt",
            Disposition::Preserve => "preserve",
            Disposition::Prune => "prune",
            Disposition::Inject => "inject",
            Disposition::RemapDefault => "remap_default",
        }
    }

    /// The state a node reaches once this disposition has been carried out.
    #[must_use]
    pub fn settled_state(&self) -> SlotState {
        match self {
            Disposition::Adapt => SlotState::Adapted,
            Disposition::Preserve => SlotState::Preserved,
            Disposition::Prune => SlotState::Pruned,
            Disposition::Inject => SlotState::Injected,
            Disposition::RemapDefault => SlotState::Remapped,
        }
    }

    /// Whether this disposition renames the slot type.
    #[must_use]
    pub fn renames_slot_type(&self) -> bool {
        matches!(self, Disposition::Adapt | Disposition::RemapDefault)
    }

    /// One-letter marker used in tree views.
    #[must_use]
    pub fn marker(&self) -> char {
        match self {
            Disposition::Adapt => 'A',
            Disposition::Preserve => 'P',
            Disposition::Prune => 'X',
            Disposition::Inject => 'I',
            Disposition::RemapDefault => 'R',
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Disposition {
    type Err = SlotGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase().replace('-', "_");
        Disposition::ALL
            .into_iter()
            .find(|d| d.as_str() == tag || (tag == "remap" && *d == Disposition::RemapDefault))
            .ok_or_else(|| SlotGraphError::InvalidConfig(format!("unknown disposition '{}'", s)))
    }
}

/// Lifecycle marker of a node, assigned by the executor.
///
/// `Pending` is the only non-terminal state. Every other state is reached
/// exactly once and never left.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Not yet touched by the executor.
    #[default]
    Pending,
    /// Renamed into the target context.
    Adapted,
    /// Kept as declared.
    Preserved,
    /// Removed from the active tree, retained for audit.
    Pruned,
    /// Added for the target context.
    Injected,
    /// Slot type renamed, default remapped.
    Remapped,
}

impl SlotState {
    /// All states in declaration order.
    pub const ALL: [SlotState; 6] = [
        SlotState::Pending,
        SlotState::Adapted,
        SlotState::Preserved,
        SlotState::Pruned,
        SlotState::Injected,
        SlotState::Remapped,
    ];

    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotState::Pending => "pending",
            SlotState::Adapted => "adapted",
            SlotState::Preserved => "preserved",
            SlotState::Pruned => "pruned",
            SlotState::Injected => "injected",
            SlotState::Remapped => "remapped",
        }
    }

    /// Check if this state is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SlotState::Pending)
    }

    /// Forward-only transition table: `Pending` -> any terminal state.
    #[must_use]
    pub fn can_transition_to(&self, next: SlotState) -> bool {
        matches!(self, SlotState::Pending) && next.is_terminal()
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role classification used for role-based default dispositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    /// Primary drivetrain/engine-class component.
    Primary,
    /// Accessory of a primary component (intake, turbo, exhaust, ...).
    Accessory,
    /// Anything else.
    Other,
}

/// Whether a slot ends up in the output, and how.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetRole {
    /// Read for extraction only; a replacement slot stands in for it.
    Source,
    /// Generated for the target context (adapted or injected).
    Target,
    /// Carried over from the donor as declared.
    Preserve,
}

impl AssetRole {
    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetRole::Source => "source",
            AssetRole::Target => "target",
            AssetRole::Preserve => "preserve",
        }
    }

    /// One-letter marker used in tree views.
    #[must_use]
    pub fn marker(&self) -> char {
        match self {
            AssetRole::Source => 'S',
            AssetRole::Target => 'T',
            AssetRole::Preserve => 'P',
        }
    }
}

impl FromStr for AssetRole {
    type Err = SlotGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "source" => Ok(AssetRole::Source),
            "target" => Ok(AssetRole::Target),
            "preserve" => Ok(AssetRole::Preserve),
            _ => Err(SlotGraphError::InvalidConfig(format!("unknown asset role '{}'", s))),
        }
    }
}

// =============================================================================
// WARNINGS
// =============================================================================

/// Kinds of recoverable issues recorded while building, planning or executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A slot row could not be interpreted and was skipped.
    MalformedSlotEntry,
    /// A whole donor file was skipped.
    MalformedFile,
    /// A second declaration disagreed with the first-seen one.
    ConflictingDeclaration,
    /// More than one parentless node; the first-added one became root.
    DuplicateRootCandidate,
    /// The graph has no root at all.
    MissingRoot,
    /// A slot was referenced but never declared.
    DanglingReference,
    /// A slot is referenced from more than one part.
    SharedReference,
    /// A link was dropped because it would have closed a cycle.
    CycleRejected,
    /// A prune was refused because the node is shared.
    PruneOfSharedNode,
    /// An injection was skipped because the slot already exists.
    InjectionSkipped,
    /// An executor operation failed its preconditions and was skipped.
    RejectedOperation,
}

impl WarningKind {
    /// Stable lowercase tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningKind::MalformedSlotEntry => "malformed_slot_entry",
            WarningKind::MalformedFile => "malformed_file",
            WarningKind::ConflictingDeclaration => "conflicting_declaration",
            WarningKind::DuplicateRootCandidate => "duplicate_root_candidate",
            WarningKind::MissingRoot => "missing_root",
            WarningKind::DanglingReference => "dangling_reference",
            WarningKind::SharedReference => "shared_reference",
            WarningKind::CycleRejected => "cycle_rejected",
            WarningKind::PruneOfSharedNode => "prune_of_shared_node",
            WarningKind::InjectionSkipped => "injection_skipped",
            WarningKind::RejectedOperation => "rejected_operation",
        }
    }
}

/// A recoverable issue, accumulated on the graph and surfaced in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphWarning {
    /// What went wrong.
    pub kind: WarningKind,
    /// The slot the warning is about, when there is one.
    pub slot_type: Option<String>,
    /// Human-readable detail.
    pub message: String,
}

impl GraphWarning {
    /// Create a warning about a specific slot.
    #[must_use]
    pub fn for_slot(kind: WarningKind, slot_type: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            slot_type: Some(slot_type.to_string()),
            message: message.into(),
        }
    }

    /// Create a warning that is not tied to one slot.
    #[must_use]
    pub fn general(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            slot_type: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the slot graph engine.
///
/// Only fatal conditions are errors. Recoverable issues are recorded as
/// [`GraphWarning`]s on the graph and never abort the pipeline.
#[derive(Debug, Error)]
pub enum SlotGraphError {
    /// The parsing collaborator is not available; no graph can be built.
    #[error("Parser unavailable: {0}")]
    ParserUnavailable(String),

    /// A donor file could not be parsed.
    #[error("Malformed donor file {path}: {reason}")]
    MalformedFile {
        /// Path of the offending file.
        path: String,
        /// Why parsing failed.
        reason: String,
    },

    /// Two distinct sources would resolve to the same target name.
    #[error("Rename collision: {sources:?} -> '{target}'")]
    RenameCollision {
        /// The shared target name.
        target: String,
        /// The colliding source names, sorted.
        sources: Vec<String>,
    },

    /// The requested slot was not found in the graph.
    #[error("Slot not found: '{0}'")]
    SlotNotFound(String),

    /// A state change violated the forward-only lifecycle.
    #[error("Invalid state transition for '{slot_type}': {from} -> {to}")]
    InvalidStateTransition {
        /// The node being transitioned.
        slot_type: String,
        /// Current state.
        from: SlotState,
        /// Requested state.
        to: SlotState,
    },

    /// A disposition was assigned to a node that already had one.
    #[error("Disposition already assigned for '{0}'")]
    DispositionAlreadyAssigned(String),

    /// The graph already carries a committed plan.
    #[error("Graph already planned ({0} operations)")]
    AlreadyPlanned(usize),

    /// An invalid rule configuration (e.g. a bad pattern).
    #[error("Invalid rule configuration: {0}")]
    InvalidConfig(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred (raised by collaborators, never by the core).
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_the_only_source_state() {
        for to in SlotState::ALL {
            assert_eq!(SlotState::Pending.can_transition_to(to), to.is_terminal());
        }
        for from in SlotState::ALL.into_iter().filter(SlotState::is_terminal) {
            for to in SlotState::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn disposition_settles_into_matching_state() {
        assert_eq!(Disposition::Adapt.settled_state(), SlotState::Adapted);
        assert_eq!(Disposition::Prune.settled_state(), SlotState::Pruned);
        assert_eq!(Disposition::RemapDefault.settled_state(), SlotState::Remapped);
    }

    #[test]
    fn markers_are_distinct() {
        let markers: std::collections::BTreeSet<char> =
            Disposition::ALL.iter().map(Disposition::marker).collect();
        assert_eq!(markers.len(), Disposition::ALL.len());
        assert_eq!(AssetRole::Source.marker(), 'S');
        assert_eq!(AssetRole::Target.as_str(), "target");
    }

    #[test]
    fn tags_parse_back() {
        for d in Disposition::ALL {
            assert_eq!(d.as_str().parse::<Disposition>().expect("tag"), d);
        }
        assert_eq!("Remap".parse::<Disposition>().expect("alias"), Disposition::RemapDefault);
        assert_eq!(" SOURCE ".parse::<AssetRole>().expect("role"), AssetRole::Source);
        assert!(matches!(
            "internal".parse::<AssetRole>(),
            Err(SlotGraphError::InvalidConfig(_))
        ));
    }

    #[test]
    fn text_items_reads_lists_and_scalars() {
        let list = RowCell::List(vec![
            RowCell::text("a"),
            RowCell::Integer(3),
            RowCell::text(""),
            RowCell::text("b"),
        ]);
        assert_eq!(list.text_items(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(RowCell::text("solo").text_items(), vec!["solo".to_string()]);
        assert!(RowCell::Empty.text_items().is_empty());
    }

    #[test]
    fn part_record_builder_appends_rows() {
        let part = PartRecord::filling("engine").with_slot("intake", "intake_stock", "Intake");
        assert_eq!(part.slot_type.as_deref(), Some("engine"));
        assert_eq!(part.slots.len(), 1);
        assert_eq!(part.slots[0][0].as_text(), Some("intake"));
    }

    #[test]
    fn warning_display_carries_kind_tag() {
        let w = GraphWarning::for_slot(WarningKind::DanglingReference, "x", "slot 'x' undeclared");
        assert_eq!(w.to_string(), "[dangling_reference] slot 'x' undeclared");
    }
}
