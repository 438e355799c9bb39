//! # slotgraph-core
//!
//! The deterministic Slot Dependency Graph Engine - THE LOGIC.
//!
//! Donor files describe parts, the slot each part fills and the child slots
//! it exposes. This crate builds a graph of those slots, decides per slot
//! whether it is adapted, preserved, pruned, remapped or injected for a
//! target context, plans the renames, applies them in place and projects the
//! result back out as slot tables and an audit manifest.
//!
//! ## Pipeline
//!
//! ```text
//! PartParser ─▶ GraphBuilder ─▶ SlotGraph ─▶ TransformationPlanner ─▶ TransformationExecutor
//!                                   │                 ▲
//!                                   │          DispositionRules
//!                                   ▼
//!                  GraphWriter / ManifestGenerator / render_tree / export
//! ```
//!
//! ## Architectural Constraints
//!
//! - No file I/O: parsing is injected through [`PartParser`]
//! - No async, no threads: the caller owns the graph for the whole run
//! - Deterministic: `BTreeMap`/`BTreeSet` only, no randomness
//! - Policy is an explicit rule table, never global state

// =============================================================================
// MODULES
// =============================================================================

pub mod builder;
pub mod executor;
pub mod export;
pub mod graph;
pub mod manifest;
pub mod parser;
pub mod pipeline;
pub mod planner;
pub mod primitives;
pub mod rules;
pub mod types;
pub mod visualize;
pub mod writer;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AssetRole, Disposition, GraphWarning, PartMap, PartRecord, RowCell, SlotGraphError, SlotRole,
    SlotRow, SlotState, WarningKind,
};

// =============================================================================
// RE-EXPORTS: Graph Engine
// =============================================================================

pub use builder::GraphBuilder;
pub use executor::TransformationExecutor;
pub use export::{
    CanonicalGraph, CanonicalHeader, canonical_checksum, export_canonical, import_canonical,
    verify_canonical,
};
pub use graph::{SlotGraph, SlotNode, ValidationReport};
pub use manifest::{Manifest, ManifestGenerator};
pub use parser::{MemoryParser, PartParser, UnavailableParser};
pub use pipeline::{Pipeline, RunReport};
pub use planner::{
    Explanation, OpStatus, Operation, PlanSummary, Transformation, TransformationPlanner,
};
pub use rules::{DispositionRules, InjectSpec, Replacement, ReplacementSpec, RuleConfig};
pub use visualize::{TreeFormat, TreeOptions, render_tree};
pub use writer::GraphWriter;

#[cfg(feature = "crypto-hash")]
pub use export::{canonical_crypto_hash, verify_crypto_hash};
