//! # Manifest Generator
//!
//! Audit report of an executed graph: statistics, validation, copy plan,
//! rename tables and the list of slots the output needs.
//!
//! Built entirely from final graph state. Never mutates.

use crate::graph::{SlotGraph, SlotNode, ValidationReport};
use crate::primitives::MANIFEST_VERSION;
use crate::RowCell;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Reason recorded for files dropped from the copy plan.
pub const EXCLUDED_ALL_PRUNED: &str = "all_slots_pruned";

/// Reason recorded for files that only declare replaced or pruned slots.
pub const EXCLUDED_EXTRACTION_ONLY: &str = "extraction_only";

// =============================================================================
// MANIFEST DOCUMENT
// =============================================================================

/// A donor file the output needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    /// Donor file path.
    pub path: String,
    /// Current slot types this file provides.
    pub provides_slots: Vec<String>,
}

/// A donor file the output does not need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedFile {
    /// Donor file path.
    pub path: String,
    /// Why it was excluded.
    pub reason: String,
    /// The slots it declared.
    pub slots: Vec<String>,
}

/// Files to copy as-is, files to regenerate, files to drop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyPlan {
    /// Files whose slots all kept their names.
    pub original_files: Vec<FileEntry>,
    /// Files that declare at least one renamed slot.
    pub generated_files: Vec<FileEntry>,
    /// Files whose every slot ended pruned or replaced.
    pub excluded_files: Vec<ExcludedFile>,
}

/// Applied rename tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Mappings {
    /// Slot type renames, original -> current.
    pub slot_types: BTreeMap<String, String>,
    /// Part renames, original -> current.
    pub part_names: BTreeMap<String, String>,
}

/// Summary counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// All nodes, pruned and merged included.
    pub total_slots: usize,
    /// Nodes in the output.
    pub active_slots: usize,
    /// Nodes pruned directly or through an ancestor.
    pub pruned_slots: usize,
    /// Nodes whose key changed.
    pub renamed_slots: usize,
    /// Contributing donor files.
    pub donor_files: usize,
    /// Accumulated warnings.
    pub warnings: usize,
    /// Node count per state.
    pub by_state: BTreeMap<String, usize>,
    /// Node count per disposition.
    pub by_disposition: BTreeMap<String, usize>,
    /// Node count per asset role, merged nodes excluded.
    pub by_role: BTreeMap<String, usize>,
    /// Operation count per kind.
    pub by_operation: BTreeMap<String, usize>,
}

/// One slot the output needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequiredSlot {
    /// Current slot type.
    pub slot_type: String,
    /// Donor slot type.
    pub original_slot_type: String,
    /// Current default part.
    pub default_part: Option<String>,
    /// Donor default part.
    pub original_default: Option<String>,
    /// Assigned disposition tag.
    pub disposition: Option<String>,
    /// State tag.
    pub state: String,
    /// Description of the slot row.
    pub description: String,
    /// Declaring donor file.
    pub source_file: Option<String>,
    /// Whether the declaring file must be regenerated.
    pub requires_generation: bool,
    /// Live children.
    pub children: Vec<String>,
    /// Slot row options.
    pub options: BTreeMap<String, RowCell>,
}

/// The manifest document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    /// Document version.
    pub version: String,
    /// Target context.
    pub target_context: String,
    /// Summary counts.
    pub statistics: Statistics,
    /// Structural validation.
    pub validation: ValidationReport,
    /// Copy plan.
    pub copy_plan: CopyPlan,
    /// Rename tables.
    pub mappings: Mappings,
    /// Slots the output needs, breadth-first from the root.
    pub required_slots: Vec<RequiredSlot>,
}

// =============================================================================
// GENERATOR
// =============================================================================

/// Builds a [`Manifest`] from a graph.
pub struct ManifestGenerator<'a> {
    graph: &'a SlotGraph,
}

impl<'a> ManifestGenerator<'a> {
    /// Create a generator.
    #[must_use]
    pub fn new(graph: &'a SlotGraph) -> Self {
        Self { graph }
    }

    /// Generate the manifest.
    #[must_use]
    pub fn generate(&self) -> Manifest {
        let copy_plan = self.copy_plan();
        let required_slots = self.required_slots(&copy_plan);
        let manifest = Manifest {
            version: MANIFEST_VERSION.to_string(),
            target_context: self.graph.target_context().to_string(),
            statistics: self.statistics(),
            validation: self.graph.validate(),
            copy_plan,
            mappings: Mappings {
                slot_types: self.graph.slot_type_map().clone(),
                part_names: self.graph.part_name_map().clone(),
            },
            required_slots,
        };
        tracing::info!(
            slots = manifest.required_slots.len(),
            original_files = manifest.copy_plan.original_files.len(),
            generated_files = manifest.copy_plan.generated_files.len(),
            excluded_files = manifest.copy_plan.excluded_files.len(),
            valid = manifest.validation.valid,
            "generated manifest"
        );
        manifest
    }

    /// In the output: not merged away, not pruned, not replaced.
    fn is_live(&self, node: &SlotNode) -> bool {
        node.merged_into.is_none()
            && node.replaced_by.is_none()
            && !self.graph.is_pruned(&node.slot_type)
    }

    fn statistics(&self) -> Statistics {
        let nodes: Vec<&SlotNode> = self.graph.nodes().collect();
        let mut by_operation = BTreeMap::new();
        for t in self.graph.transformations() {
            *by_operation.entry(t.op.kind().to_string()).or_default() += 1;
        }
        let mut by_role = BTreeMap::new();
        for node in nodes.iter().filter(|n| n.merged_into.is_none()) {
            *by_role.entry(node.asset_role().as_str().to_string()).or_default() += 1;
        }
        Statistics {
            total_slots: nodes.len(),
            active_slots: nodes.iter().filter(|n| self.is_live(n)).count(),
            pruned_slots: nodes
                .iter()
                .filter(|n| self.graph.is_pruned(&n.slot_type))
                .count(),
            renamed_slots: nodes.iter().filter(|n| n.is_renamed()).count(),
            donor_files: self.graph.donor_files().len(),
            warnings: self.graph.warnings().len(),
            by_state: self
                .graph
                .count_by_state()
                .into_iter()
                .map(|(s, c)| (s.as_str().to_string(), c))
                .collect(),
            by_disposition: self
                .graph
                .count_by_disposition()
                .into_iter()
                .map(|(d, c)| (d.as_str().to_string(), c))
                .collect(),
            by_operation,
            by_role,
        }
    }

    fn copy_plan(&self) -> CopyPlan {
        let mut plan = CopyPlan::default();
        for (path, slots) in self.graph.source_files() {
            let nodes: Vec<&SlotNode> = slots.iter().filter_map(|s| self.graph.get(s)).collect();
            let live: Vec<&SlotNode> = nodes.iter().copied().filter(|n| self.is_live(n)).collect();

            if live.is_empty() {
                let pruned = |n: &&SlotNode| self.graph.is_pruned(&n.slot_type);
                let reason = if nodes.is_empty() {
                    None
                } else if nodes.iter().all(pruned) {
                    Some(EXCLUDED_ALL_PRUNED)
                } else if nodes.iter().all(|n| pruned(n) || n.replaced_by.is_some()) {
                    Some(EXCLUDED_EXTRACTION_ONLY)
                } else {
                    None
                };
                if let Some(reason) = reason {
                    plan.excluded_files.push(ExcludedFile {
                        path: path.to_string(),
                        reason: reason.to_string(),
                        slots: nodes.iter().map(|n| n.slot_type.clone()).collect(),
                    });
                }
                continue;
            }

            let entry = FileEntry {
                path: path.to_string(),
                provides_slots: live.iter().map(|n| n.slot_type.clone()).collect(),
            };
            if live.iter().any(|n| n.is_renamed()) {
                plan.generated_files.push(entry);
            } else {
                plan.original_files.push(entry);
            }
        }
        plan
    }

    /// Breadth-first walk from the root, then from any other live top.
    fn required_slots(&self, copy_plan: &CopyPlan) -> Vec<RequiredSlot> {
        let original_parts: BTreeMap<&str, &str> = self
            .graph
            .part_name_map()
            .iter()
            .map(|(from, to)| (to.as_str(), from.as_str()))
            .collect();
        let generated: BTreeSet<&str> = copy_plan
            .generated_files
            .iter()
            .map(|f| f.path.as_str())
            .collect();

        let mut starts: Vec<&str> = self.graph.root().into_iter().collect();
        starts.extend(
            self.graph
                .nodes()
                .filter(|n| n.parent.is_none() && Some(n.slot_type.as_str()) != self.graph.root())
                .map(|n| n.slot_type.as_str()),
        );

        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<&str> = starts.into_iter().collect();
        let mut out = Vec::new();
        while let Some(key) = queue.pop_front() {
            if !visited.insert(key) {
                continue;
            }
            let Some(node) = self.graph.get(key) else {
                continue;
            };
            if node.replaced_by.is_some() && !self.graph.is_pruned(key) {
                // read for extraction only; what hangs below may still be needed
                queue.extend(node.children.iter().map(String::as_str));
                continue;
            }
            if !self.is_live(node) {
                continue;
            }
            let children: Vec<String> = node
                .children
                .iter()
                .filter(|c| self.graph.get(c).is_some_and(|n| self.is_live(n)))
                .cloned()
                .collect();
            queue.extend(node.children.iter().map(String::as_str));

            let default_part = node.default_part.clone();
            let original_default = default_part
                .as_deref()
                .map(|p| original_parts.get(p).copied().unwrap_or(p).to_string());
            out.push(RequiredSlot {
                slot_type: node.slot_type.clone(),
                original_slot_type: node.original_slot_type.clone(),
                default_part,
                original_default,
                disposition: node.disposition().map(|d| d.as_str().to_string()),
                state: node.state().as_str().to_string(),
                description: node.description.clone(),
                source_file: node.source_file.clone(),
                requires_generation: node
                    .source_file
                    .as_deref()
                    .is_some_and(|f| generated.contains(f)),
                children,
                options: node.options.clone(),
            });
        }
        out
    }
}
