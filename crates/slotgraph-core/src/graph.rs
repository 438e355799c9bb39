//! # Slot Graph
//!
//! The arena holding every slot node of one adaptation run.
//!
//! Nodes are owned by a single `BTreeMap` keyed by slot type. Every edge
//! (parent, children, referrers) is a key into that map, never a reference,
//! so renaming a slot only touches the arena key and the handful of key
//! lists that mention it. All containers are ordered for determinism.

use crate::export::CanonicalGraph;
use crate::planner::Transformation;
use crate::{AssetRole, Disposition, GraphWarning, RowCell, SlotGraphError, SlotState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SLOT NODE
// =============================================================================

/// A single slot in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotNode {
    /// Current identity key (changes when the node is renamed).
    pub slot_type: String,
    /// Key as first observed in the donor set.
    pub original_slot_type: String,
    /// Part that normally fills this slot.
    pub default_part: Option<String>,
    /// Human-readable label from the slot row.
    pub description: String,
    /// Options cell of the slot row.
    pub options: BTreeMap<String, RowCell>,
    /// Part type tags allowed in this slot.
    pub allow_types: BTreeSet<String>,
    /// Part type tags denied in this slot.
    pub deny_types: BTreeSet<String>,
    /// Donor file that declared the slot.
    pub source_file: Option<String>,
    /// Key of the tree parent (back-reference, not ownership).
    pub parent: Option<String>,
    /// Keys of tree children, in the order they were first referenced.
    pub children: Vec<String>,
    /// Keys of every slot whose part references this slot.
    pub referrers: BTreeSet<String>,
    /// Keys this slot's parts reference, in slot-table order. Superset of
    /// `children`; a shared slot appears here for every referrer.
    pub references: Vec<String>,
    /// True while the slot has only been referenced, never declared.
    pub placeholder: bool,
    /// Set when an intentional merge folded this node into another key.
    pub merged_into: Option<String>,
    /// Slot injected to stand in for this one; the node itself is not output.
    pub replaced_by: Option<String>,
    /// Planned slot type rename.
    pub target_slot_type: Option<String>,
    /// Planned default part rename.
    pub target_part_name: Option<String>,
    /// Whether `default_part` came from a declaration (vs. a reference).
    pub(crate) default_declared: bool,
    /// Discovery sequence number, stable across renames.
    pub(crate) seq: u64,
    disposition: Option<Disposition>,
    state: SlotState,
}

impl SlotNode {
    /// Create an empty placeholder node.
    #[must_use]
    pub fn new(slot_type: impl Into<String>, seq: u64) -> Self {
        let slot_type = slot_type.into();
        Self {
            original_slot_type: slot_type.clone(),
            slot_type,
            default_part: None,
            description: String::new(),
            options: BTreeMap::new(),
            allow_types: BTreeSet::new(),
            deny_types: BTreeSet::new(),
            source_file: None,
            parent: None,
            children: Vec::new(),
            referrers: BTreeSet::new(),
            references: Vec::new(),
            placeholder: true,
            merged_into: None,
            replaced_by: None,
            target_slot_type: None,
            target_part_name: None,
            default_declared: false,
            seq,
            disposition: None,
            state: SlotState::Pending,
        }
    }

    /// The planned disposition, once assigned.
    #[must_use]
    pub fn disposition(&self) -> Option<Disposition> {
        self.disposition
    }

    /// Assign the disposition. Write-once.
    pub fn assign_disposition(&mut self, disposition: Disposition) -> Result<(), SlotGraphError> {
        if self.disposition.is_some() {
            return Err(SlotGraphError::DispositionAlreadyAssigned(
                self.slot_type.clone(),
            ));
        }
        self.disposition = Some(disposition);
        Ok(())
    }

    /// The lifecycle state.
    #[must_use]
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Move to a terminal state. Forward-only.
    pub fn transition(&mut self, to: SlotState) -> Result<(), SlotGraphError> {
        if !self.state.can_transition_to(to) {
            return Err(SlotGraphError::InvalidStateTransition {
                slot_type: self.slot_type.clone(),
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Discovery sequence number.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Check if the node has more than one referencing part.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.referrers.len() > 1
    }

    /// Whether the slot type was renamed away from the donor name.
    #[must_use]
    pub fn is_renamed(&self) -> bool {
        self.slot_type != self.original_slot_type
    }

    /// How the slot reaches the output.
    #[must_use]
    pub fn asset_role(&self) -> AssetRole {
        if self.replaced_by.is_some() {
            return AssetRole::Source;
        }
        match self.disposition {
            Some(Disposition::Adapt | Disposition::Inject) => AssetRole::Target,
            _ => AssetRole::Preserve,
        }
    }

    /// Append a child key unless it is already present.
    pub(crate) fn add_child(&mut self, child: &str) {
        if !self.children.iter().any(|c| c == child) {
            self.children.push(child.to_string());
        }
    }

    /// Remove a child key. Returns whether it was present.
    pub(crate) fn remove_child(&mut self, child: &str) -> bool {
        let before = self.children.len();
        self.children.retain(|c| c != child);
        self.children.len() != before
    }

    /// Append a referenced key unless it is already present.
    pub(crate) fn add_reference(&mut self, key: &str) {
        if key != self.slot_type && !self.references.iter().any(|r| r == key) {
            self.references.push(key.to_string());
        }
    }

    /// Replace a child key in place, keeping its position.
    pub(crate) fn replace_child(&mut self, old: &str, new: &str) -> bool {
        match self.children.iter_mut().find(|c| *c == old) {
            Some(slot) => {
                *slot = new.to_string();
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// VALIDATION REPORT
// =============================================================================

/// Structural validation of a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// True when no errors were found.
    pub valid: bool,
    /// Number of errors.
    pub error_count: usize,
    /// Number of warnings.
    pub warning_count: usize,
    /// Structural errors.
    pub errors: Vec<String>,
    /// Accumulated recoverable warnings.
    pub warnings: Vec<String>,
}

// =============================================================================
// SLOT GRAPH
// =============================================================================

/// The slot dependency graph.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotGraph {
    /// Destination environment this graph is being adapted for.
    target_context: String,

    /// Node arena: slot_type -> SlotNode
    by_slot_type: BTreeMap<String, SlotNode>,

    /// Part index: part name -> slot_type the part fills
    by_part_name: BTreeMap<String, String>,

    /// Provenance index: source file -> slot_types it declared
    by_source_file: BTreeMap<String, Vec<String>>,

    /// Root slot, if one could be determined.
    root: Option<String>,

    /// Contributing donor files, in the order they were added.
    donor_files: Vec<String>,

    /// Recoverable issues, in the order they were found.
    warnings: Vec<GraphWarning>,

    /// The current plan with per-operation status.
    transformations: Vec<Transformation>,

    /// Targets for which many-to-one renames are intentional.
    merge_targets: BTreeSet<String>,

    /// Applied slot type renames: original -> current.
    slot_type_map: BTreeMap<String, String>,

    /// Applied part renames: original -> current.
    part_name_map: BTreeMap<String, String>,

    /// Next discovery sequence number.
    next_seq: u64,
}

impl SlotGraph {
    /// Create a new empty graph for a target context.
    #[must_use]
    pub fn new(target_context: impl Into<String>) -> Self {
        Self {
            target_context: target_context.into(),
            ..Self::default()
        }
    }

    /// The target context.
    #[must_use]
    pub fn target_context(&self) -> &str {
        &self.target_context
    }

    /// The root slot type.
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// Contributing donor files in insertion order.
    #[must_use]
    pub fn donor_files(&self) -> &[String] {
        &self.donor_files
    }

    /// Accumulated warnings.
    #[must_use]
    pub fn warnings(&self) -> &[GraphWarning] {
        &self.warnings
    }

    /// The current plan.
    #[must_use]
    pub fn transformations(&self) -> &[Transformation] {
        &self.transformations
    }

    /// Applied slot type renames.
    #[must_use]
    pub fn slot_type_map(&self) -> &BTreeMap<String, String> {
        &self.slot_type_map
    }

    /// Applied part renames.
    #[must_use]
    pub fn part_name_map(&self) -> &BTreeMap<String, String> {
        &self.part_name_map
    }

    /// Targets flagged as intentional merges by the current plan.
    #[must_use]
    pub fn merge_targets(&self) -> &BTreeSet<String> {
        &self.merge_targets
    }

    /// Get a node by its current slot type.
    #[must_use]
    pub fn get(&self, slot_type: &str) -> Option<&SlotNode> {
        self.by_slot_type.get(slot_type)
    }

    /// Get a node by current or original slot type.
    #[must_use]
    pub fn resolve(&self, slot_type: &str) -> Option<&SlotNode> {
        if let Some(node) = self.by_slot_type.get(slot_type) {
            return Some(node);
        }
        self.by_slot_type
            .values()
            .find(|n| n.original_slot_type == slot_type)
    }

    /// Check if a slot type is a current key.
    #[must_use]
    pub fn contains(&self, slot_type: &str) -> bool {
        self.by_slot_type.contains_key(slot_type)
    }

    /// Number of nodes, including pruned ones.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.by_slot_type.len()
    }

    /// Number of parent-child edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.by_slot_type.values().map(|n| n.children.len()).sum()
    }

    /// All nodes in key order.
    pub fn nodes(&self) -> impl Iterator<Item = &SlotNode> {
        self.by_slot_type.values()
    }

    /// All slot types in key order.
    pub fn slot_types(&self) -> impl Iterator<Item = &str> {
        self.by_slot_type.keys().map(String::as_str)
    }

    /// All parent-child edges as (parent, child), in key then child order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.by_slot_type.iter().flat_map(|(parent, node)| {
            node.children
                .iter()
                .map(move |child| (parent.as_str(), child.as_str()))
        })
    }

    /// Nodes in discovery order.
    #[must_use]
    pub fn nodes_in_discovery_order(&self) -> Vec<&SlotNode> {
        let mut nodes: Vec<&SlotNode> = self.by_slot_type.values().collect();
        nodes.sort_by_key(|n| n.seq);
        nodes
    }

    /// The slot a part fills.
    #[must_use]
    pub fn slot_for_part(&self, part_name: &str) -> Option<&SlotNode> {
        self.by_part_name
            .get(part_name)
            .and_then(|slot| self.by_slot_type.get(slot))
    }

    /// Part index in part-name order.
    pub fn parts(&self) -> impl Iterator<Item = (&str, &str)> {
        self.by_part_name
            .iter()
            .map(|(part, slot)| (part.as_str(), slot.as_str()))
    }

    /// Provenance index, keyed by source file.
    pub fn source_files(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.by_source_file
            .iter()
            .map(|(file, slots)| (file.as_str(), slots.as_slice()))
    }

    /// Ancestor keys from the immediate parent upwards.
    ///
    /// Bounded by the node count so a corrupted parent chain cannot loop.
    #[must_use]
    pub fn ancestors(&self, slot_type: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = self.by_slot_type.get(slot_type).and_then(|n| n.parent.clone());
        while let Some(key) = current {
            if out.len() > self.by_slot_type.len() || out.contains(&key) {
                break;
            }
            current = self.by_slot_type.get(&key).and_then(|n| n.parent.clone());
            out.push(key);
        }
        out
    }

    /// Check whether `candidate` is `slot_type` or one of its ancestors.
    #[must_use]
    pub fn is_self_or_ancestor(&self, candidate: &str, slot_type: &str) -> bool {
        candidate == slot_type || self.ancestors(slot_type).iter().any(|a| a == candidate)
    }

    /// Descendant keys in pre-order (children in insertion order).
    #[must_use]
    pub fn descendants(&self, slot_type: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        seen.insert(slot_type.to_string());
        let mut stack: Vec<String> = self
            .by_slot_type
            .get(slot_type)
            .map(|n| n.children.iter().rev().cloned().collect())
            .unwrap_or_default();
        while let Some(key) = stack.pop() {
            if !seen.insert(key.clone()) {
                continue;
            }
            if let Some(node) = self.by_slot_type.get(&key) {
                stack.extend(node.children.iter().rev().cloned());
            }
            out.push(key);
        }
        out
    }

    /// Check if a node or any of its ancestors is pruned.
    #[must_use]
    pub fn is_pruned(&self, slot_type: &str) -> bool {
        let pruned = |key: &str| {
            self.by_slot_type
                .get(key)
                .is_some_and(|n| n.state() == SlotState::Pruned)
        };
        pruned(slot_type) || self.ancestors(slot_type).iter().any(|a| pruned(a))
    }

    /// Nodes that are neither pruned (directly or through an ancestor) nor merged away.
    #[must_use]
    pub fn active_nodes(&self) -> Vec<&SlotNode> {
        self.by_slot_type
            .values()
            .filter(|n| n.merged_into.is_none() && !self.is_pruned(&n.slot_type))
            .collect()
    }

    /// Node counts per state (every state present, zero included).
    #[must_use]
    pub fn count_by_state(&self) -> BTreeMap<SlotState, usize> {
        let mut counts: BTreeMap<SlotState, usize> =
            SlotState::ALL.iter().map(|s| (*s, 0)).collect();
        for node in self.by_slot_type.values() {
            *counts.entry(node.state()).or_default() += 1;
        }
        counts
    }

    /// Node counts per assigned disposition (every disposition present).
    #[must_use]
    pub fn count_by_disposition(&self) -> BTreeMap<Disposition, usize> {
        let mut counts: BTreeMap<Disposition, usize> =
            Disposition::ALL.iter().map(|d| (*d, 0)).collect();
        for disposition in self.by_slot_type.values().filter_map(SlotNode::disposition) {
            *counts.entry(disposition).or_default() += 1;
        }
        counts
    }

    /// Validate graph integrity.
    ///
    /// Checks:
    /// - Edges are mirrored (parent lists child, child points at parent)
    /// - References are mirrored (referrer lists the slot, slot records the referrer)
    /// - No cycles along parent chains
    /// - Pruned nodes have no live children
    /// - Applied renames are injective outside flagged merges
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();

        if let Some(root) = &self.root {
            if !self.by_slot_type.contains_key(root) {
                errors.push(format!("Root '{}' is not in the graph", root));
            }
        }

        for (key, node) in &self.by_slot_type {
            if node.merged_into.is_some() {
                continue;
            }
            for child in &node.children {
                match self.by_slot_type.get(child) {
                    None => errors.push(format!("'{}' lists missing child '{}'", key, child)),
                    Some(c) if c.parent.as_deref() != Some(key.as_str()) => errors.push(format!(
                        "'{}' lists child '{}' whose parent is {:?}",
                        key, child, c.parent
                    )),
                    Some(c) => {
                        if node.state() == SlotState::Pruned && c.state() != SlotState::Pruned {
                            errors.push(format!(
                                "Pruned '{}' still owns live child '{}'",
                                key, child
                            ));
                        }
                    }
                }
            }
            if let Some(parent) = &node.parent {
                match self.by_slot_type.get(parent) {
                    None => errors.push(format!("'{}' points at missing parent '{}'", key, parent)),
                    Some(p) => {
                        let listed = p.children.iter().any(|c| c == key);
                        if !listed && node.state() != SlotState::Pruned {
                            errors.push(format!(
                                "'{}' points at parent '{}' which does not list it",
                                key, parent
                            ));
                        }
                    }
                }
            }
            for referrer in &node.referrers {
                match self.by_slot_type.get(referrer) {
                    None => errors.push(format!("'{}' has missing referrer '{}'", key, referrer)),
                    Some(r) if r.merged_into.is_none() && !r.references.contains(key) => {
                        errors.push(format!(
                            "'{}' refers to '{}' without listing it",
                            referrer, key
                        ))
                    }
                    Some(_) => {}
                }
            }
            for reference in &node.references {
                let mirrored = self
                    .by_slot_type
                    .get(reference)
                    .is_some_and(|r| r.referrers.contains(key));
                if !mirrored {
                    errors.push(format!(
                        "'{}' lists '{}' which does not record it as referrer",
                        key, reference
                    ));
                }
            }
            if self.ancestors(key).iter().any(|a| a == key) {
                errors.push(format!("Circular reference detected involving '{}'", key));
            }
        }

        let mut sources_by_target: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (from, to) in &self.slot_type_map {
            let pruned = self.resolve(from).is_some_and(|n| n.state() == SlotState::Pruned);
            if !pruned {
                sources_by_target.entry(to).or_default().push(from);
            }
        }
        for (target, sources) in sources_by_target {
            if sources.len() > 1 && !self.merge_targets.contains(target) {
                errors.push(format!(
                    "Rename is not injective: {:?} -> '{}'",
                    sources, target
                ));
            }
        }

        let warnings: Vec<String> = self.warnings.iter().map(ToString::to_string).collect();
        ValidationReport {
            valid: errors.is_empty(),
            error_count: errors.len(),
            warning_count: warnings.len(),
            errors,
            warnings,
        }
    }

    /// Rebuild a graph from its canonical snapshot form.
    ///
    /// Discovery sequence numbers are reassigned in key order; warnings are
    /// not part of a snapshot.
    pub(crate) fn from_canonical(canonical: &CanonicalGraph) -> Self {
        let mut graph = Self::new(canonical.target_context.clone());
        for cn in &canonical.nodes {
            let mut node = SlotNode::new(cn.slot_type.clone(), 0);
            node.original_slot_type = cn.original_slot_type.clone();
            node.default_part = cn.default_part.clone();
            node.description = cn.description.clone();
            node.options = cn.options.clone();
            node.allow_types = cn.allow_types.iter().cloned().collect();
            node.deny_types = cn.deny_types.iter().cloned().collect();
            node.source_file = cn.source_file.clone();
            node.parent = cn.parent.clone();
            node.children = cn.children.clone();
            node.referrers = cn.referrers.iter().cloned().collect();
            node.references = cn.references.clone();
            node.placeholder = cn.placeholder;
            node.merged_into = cn.merged_into.clone();
            node.replaced_by = cn.replaced_by.clone();
            node.target_slot_type = cn.target_slot_type.clone();
            node.target_part_name = cn.target_part_name.clone();
            node.default_declared = cn.default_declared;
            node.disposition = cn.disposition;
            node.state = cn.state;
            graph.insert_node(node);
        }
        graph.by_part_name = canonical.parts.iter().cloned().collect();
        graph.by_source_file = canonical.sources.iter().cloned().collect();
        graph.root = canonical.root.clone();
        graph.donor_files = canonical.donor_files.clone();
        graph.transformations = canonical.transformations.clone();
        graph.merge_targets = canonical.merge_targets.iter().cloned().collect();
        graph.slot_type_map = canonical.slot_type_map.iter().cloned().collect();
        graph.part_name_map = canonical.part_name_map.iter().cloned().collect();
        graph
    }

    // =========================================================================
    // CRATE-INTERNAL MUTATION
    // =========================================================================

    /// Get a node mutably.
    pub(crate) fn get_mut(&mut self, slot_type: &str) -> Option<&mut SlotNode> {
        self.by_slot_type.get_mut(slot_type)
    }

    /// Get or create a placeholder node. Returns whether it was created.
    pub(crate) fn get_or_create(&mut self, slot_type: &str) -> (&mut SlotNode, bool) {
        let created = !self.by_slot_type.contains_key(slot_type);
        if created {
            let seq = self.next_seq;
            self.next_seq = self.next_seq.saturating_add(1);
            self.by_slot_type
                .insert(slot_type.to_string(), SlotNode::new(slot_type, seq));
        }
        let node = self
            .by_slot_type
            .entry(slot_type.to_string())
            .or_insert_with(|| SlotNode::new(slot_type, 0));
        (node, created)
    }

    /// Insert a fully formed node under its own key, assigning a sequence number.
    pub(crate) fn insert_node(&mut self, mut node: SlotNode) {
        node.seq = self.next_seq;
        self.next_seq = self.next_seq.saturating_add(1);
        self.by_slot_type.insert(node.slot_type.clone(), node);
    }

    /// Remove a node from the arena (used only while re-keying).
    pub(crate) fn take_node(&mut self, slot_type: &str) -> Option<SlotNode> {
        self.by_slot_type.remove(slot_type)
    }

    /// Put a node back under its current key.
    pub(crate) fn put_node(&mut self, node: SlotNode) {
        self.by_slot_type.insert(node.slot_type.clone(), node);
    }

    pub(crate) fn set_root(&mut self, root: Option<String>) {
        self.root = root;
    }

    pub(crate) fn add_donor_file(&mut self, source: &str) -> bool {
        if self.donor_files.iter().any(|f| f == source) {
            return false;
        }
        self.donor_files.push(source.to_string());
        true
    }

    pub(crate) fn index_part(&mut self, part_name: &str, slot_type: &str) {
        self.by_part_name
            .entry(part_name.to_string())
            .or_insert_with(|| slot_type.to_string());
    }

    pub(crate) fn index_source(&mut self, source: &str, slot_type: &str) {
        let slots = self.by_source_file.entry(source.to_string()).or_default();
        if !slots.iter().any(|s| s == slot_type) {
            slots.push(slot_type.to_string());
        }
    }

    /// Record a warning and emit it through `tracing`.
    pub(crate) fn push_warning(&mut self, warning: GraphWarning) {
        tracing::warn!(kind = warning.kind.as_str(), "{}", warning.message);
        self.warnings.push(warning);
    }

    pub(crate) fn set_plan(&mut self, plan: Vec<Transformation>, merge_targets: BTreeSet<String>) {
        self.transformations = plan;
        self.merge_targets = merge_targets;
    }

    pub(crate) fn take_plan(&mut self) -> Vec<Transformation> {
        std::mem::take(&mut self.transformations)
    }

    pub(crate) fn restore_plan(&mut self, plan: Vec<Transformation>) {
        self.transformations = plan;
    }

    /// Re-point every index entry from `old` to `new` after a re-key.
    pub(crate) fn rekey_indices(&mut self, old: &str, new: &str) {
        for slot in self.by_part_name.values_mut() {
            if slot == old {
                *slot = new.to_string();
            }
        }
        for slots in self.by_source_file.values_mut() {
            let mut seen = BTreeSet::new();
            for slot in slots.iter_mut() {
                if slot == old {
                    *slot = new.to_string();
                }
            }
            slots.retain(|s| seen.insert(s.clone()));
        }
        if self.root.as_deref() == Some(old) {
            self.root = Some(new.to_string());
        }
    }

    /// Re-point parent back-references, referrer sets and reference lists
    /// from `old` to `new`.
    pub(crate) fn repoint_edges(&mut self, old: &str, new: &str) {
        for node in self.by_slot_type.values_mut() {
            if node.parent.as_deref() == Some(old) {
                node.parent = Some(new.to_string());
            }
            if node.referrers.remove(old) && node.slot_type != new {
                node.referrers.insert(new.to_string());
            }
            if let Some(pos) = node.references.iter().position(|r| r == old) {
                let taken = node.slot_type == new || node.references.iter().any(|r| r == new);
                if taken {
                    node.references.remove(pos);
                } else {
                    node.references[pos] = new.to_string();
                }
            }
            if node.replaced_by.as_deref() == Some(old) {
                node.replaced_by = Some(new.to_string());
            }
        }
    }

    /// Rename a part everywhere: every default that names it and the part index.
    /// Returns the slot types whose default changed.
    pub(crate) fn rename_part_everywhere(&mut self, old: &str, new: &str) -> Vec<String> {
        let mut touched = Vec::new();
        for node in self.by_slot_type.values_mut() {
            if node.default_part.as_deref() == Some(old) {
                node.default_part = Some(new.to_string());
                touched.push(node.slot_type.clone());
            }
        }
        if let Some(slot) = self.by_part_name.remove(old) {
            self.by_part_name.insert(new.to_string(), slot);
        }
        touched
    }

    pub(crate) fn record_slot_rename(&mut self, original: &str, current: &str) {
        self.slot_type_map
            .insert(original.to_string(), current.to_string());
    }

    pub(crate) fn record_part_rename(&mut self, original: &str, current: &str) {
        self.part_name_map
            .insert(original.to_string(), current.to_string());
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> SlotGraph {
        let mut graph = SlotGraph::new("pickup");
        for key in ["engine", "intake", "airbox"] {
            let (node, _) = graph.get_or_create(key);
            node.placeholder = false;
        }
        link(&mut graph, "engine", "intake");
        link(&mut graph, "intake", "airbox");
        graph.set_root(Some("engine".to_string()));
        graph
    }

    fn link(graph: &mut SlotGraph, parent: &str, child: &str) {
        let p = graph.get_mut(parent).expect("parent");
        p.add_child(child);
        p.add_reference(child);
        let c = graph.get_mut(child).expect("child");
        c.parent = Some(parent.to_string());
        c.referrers.insert(parent.to_string());
    }

    #[test]
    fn get_or_create_is_idempotent() {
        let mut graph = SlotGraph::new("pickup");
        let (_, first) = graph.get_or_create("engine");
        let (_, second) = graph.get_or_create("engine");
        assert!(first);
        assert!(!second);
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn discovery_order_follows_creation() {
        let mut graph = SlotGraph::new("pickup");
        graph.get_or_create("zeta");
        graph.get_or_create("alpha");
        let order: Vec<_> = graph
            .nodes_in_discovery_order()
            .iter()
            .map(|n| n.slot_type.clone())
            .collect();
        assert_eq!(order, vec!["zeta", "alpha"]);
    }

    #[test]
    fn ancestors_and_descendants() {
        let graph = chain();
        assert_eq!(graph.ancestors("airbox"), vec!["intake", "engine"]);
        assert_eq!(graph.descendants("engine"), vec!["intake", "airbox"]);
        assert!(graph.is_self_or_ancestor("engine", "airbox"));
        assert!(!graph.is_self_or_ancestor("airbox", "engine"));
    }

    #[test]
    fn disposition_is_write_once() {
        let mut node = SlotNode::new("engine", 0);
        node.assign_disposition(Disposition::Adapt).expect("first");
        let second = node.assign_disposition(Disposition::Prune);
        assert!(matches!(
            second,
            Err(SlotGraphError::DispositionAlreadyAssigned(_))
        ));
        assert_eq!(node.disposition(), Some(Disposition::Adapt));
    }

    #[test]
    fn state_never_reverts_to_pending() {
        let mut node = SlotNode::new("engine", 0);
        node.transition(SlotState::Adapted).expect("forward");
        assert!(node.transition(SlotState::Pending).is_err());
        assert!(node.transition(SlotState::Pruned).is_err());
        assert_eq!(node.state(), SlotState::Adapted);
    }

    #[test]
    fn pruned_ancestor_prunes_descendants() {
        let mut graph = chain();
        graph
            .get_mut("intake")
            .expect("intake")
            .transition(SlotState::Pruned)
            .expect("prune");
        assert!(graph.is_pruned("airbox"));
        assert!(!graph.is_pruned("engine"));
        assert_eq!(graph.active_nodes().len(), 1);
    }

    #[test]
    fn validate_accepts_consistent_tree() {
        let report = chain().validate();
        assert!(report.valid, "{:?}", report.errors);
        assert_eq!(report.error_count, 0);
    }

    #[test]
    fn validate_flags_unmirrored_edge() {
        let mut graph = chain();
        graph.get_mut("engine").expect("engine").add_child("airbox");
        let report = graph.validate();
        assert!(!report.valid);
        assert_eq!(report.error_count, 1);
    }

    #[test]
    fn validate_flags_non_injective_renames() {
        let mut graph = chain();
        graph.record_slot_rename("intake", "shared");
        graph.record_slot_rename("airbox", "shared");
        assert!(!graph.validate().valid);

        graph.set_plan(Vec::new(), BTreeSet::from(["shared".to_string()]));
        assert!(graph.validate().valid);
    }

    #[test]
    fn validate_flags_unmirrored_reference() {
        let mut graph = chain();
        graph
            .get_mut("airbox")
            .expect("airbox")
            .referrers
            .insert("engine".to_string());
        let report = graph.validate();
        assert!(!report.valid);
        assert!(report.errors[0].contains("without listing it"), "{:?}", report.errors);
    }

    #[test]
    fn repoint_merges_duplicate_references() {
        let mut graph = chain();
        let (turbo, _) = graph.get_or_create("turbo");
        turbo.placeholder = false;
        let engine = graph.get_mut("engine").expect("engine");
        engine.add_reference("turbo");
        assert_eq!(engine.references, vec!["intake", "turbo"]);

        graph.repoint_edges("turbo", "intake");
        assert_eq!(graph.get("engine").expect("engine").references, vec!["intake"]);
        graph.repoint_edges("intake", "intake_pickup");
        assert_eq!(
            graph.get("engine").expect("engine").references,
            vec!["intake_pickup"]
        );
    }

    #[test]
    fn replaced_node_is_a_source() {
        let mut node = SlotNode::new("engine_structure", 0);
        node.assign_disposition(Disposition::Adapt).expect("assign");
        assert_eq!(node.asset_role(), AssetRole::Target);
        node.replaced_by = Some("engine_mesh".to_string());
        assert_eq!(node.asset_role(), AssetRole::Source);
        assert_eq!(SlotNode::new("intake", 1).asset_role(), AssetRole::Preserve);
    }

    #[test]
    fn replace_child_keeps_position() {
        let mut node = SlotNode::new("engine", 0);
        node.add_child("a");
        node.add_child("b");
        node.add_child("c");
        assert!(node.replace_child("b", "b2"));
        assert_eq!(node.children, vec!["a", "b2", "c"]);
        assert!(!node.replace_child("zz", "q"));
    }
}
