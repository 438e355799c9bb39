//! # Transformation Executor
//!
//! Applies the plan stored on a graph, one operation at a time.
//!
//! Every operation is checked first and mutated second. A failed check
//! rejects only that operation, records a warning, and leaves the graph as
//! it was before the operation. Other operations are unaffected.
//!
//! Only `Pending` operations run, so a second `execute_all()` is a no-op.

use crate::graph::{SlotGraph, SlotNode};
use crate::planner::{OpStatus, Operation, Reparent};
use crate::{Disposition, GraphWarning, RowCell, SlotGraphError, SlotState, WarningKind};
use std::collections::{BTreeMap, BTreeSet};

/// Row data of a slot created by the plan.
struct NewSlot<'o> {
    slot_type: &'o str,
    default_part: &'o str,
    description: &'o str,
    options: &'o BTreeMap<String, RowCell>,
}

/// Applies a planned transformation to a graph.
pub struct TransformationExecutor<'a> {
    graph: &'a mut SlotGraph,
}

impl<'a> TransformationExecutor<'a> {
    /// Create an executor over a planned graph.
    pub fn new(graph: &'a mut SlotGraph) -> Self {
        Self { graph }
    }

    /// Apply every pending operation in plan order.
    ///
    /// Returns the number of operations applied by this call.
    pub fn execute_all(&mut self) -> usize {
        let mut plan = self.graph.take_plan();
        let mut applied = 0;
        let mut rejected = 0;

        for t in plan.iter_mut().filter(|t| t.status == OpStatus::Pending) {
            match self.execute_one(&t.op) {
                Ok(()) => {
                    tracing::debug!(op = t.op.kind(), slot = t.op.slot_type(), "applied");
                    t.status = OpStatus::Applied;
                    applied += 1;
                }
                Err(e) => {
                    t.status = OpStatus::Rejected;
                    rejected += 1;
                    self.graph.push_warning(GraphWarning::for_slot(
                        WarningKind::RejectedOperation,
                        t.op.slot_type(),
                        format!("{} rejected: {}", t.op.kind(), e),
                    ));
                }
            }
        }

        self.graph.restore_plan(plan);
        tracing::info!(applied, rejected, "executed transformation plan");
        applied
    }

    fn execute_one(&mut self, op: &Operation) -> Result<(), SlotGraphError> {
        match op {
            Operation::RenameSlotType {
                from,
                to,
                disposition,
                merge,
            } => {
                let target_exists = self.live(to).is_some();
                if *merge && target_exists {
                    self.merge_slot(from, to, *disposition)
                } else {
                    self.rename_slot(from, to, *disposition)
                }
            }
            Operation::RenamePart { from, to, .. } => self.rename_part(from, to),
            Operation::Prune {
                slot_type,
                subtree,
                reparent,
            } => self.prune(slot_type, subtree, reparent),
            Operation::Inject {
                slot_type,
                default_part,
                description,
                parent,
            } => self.inject(slot_type, default_part, description, parent.as_deref()),
            Operation::Replace {
                slot_type,
                replacement,
                default_part,
                description,
                options,
            } => {
                let new_slot = NewSlot {
                    slot_type: replacement,
                    default_part,
                    description,
                    options,
                };
                self.replace(slot_type, &new_slot)
            }
            Operation::Retain {
                slot_type,
                disposition,
            } => self.retain(slot_type, *disposition),
        }
    }

    // =========================================================================
    // KEY RESOLUTION & CHECKS
    // =========================================================================

    /// Resolve a planning-time key to the current key of a live node.
    fn current_key(&self, key: &str) -> Option<String> {
        let mut current = key.to_string();
        for _ in 0..=self.graph.node_count() {
            match self.graph.get(&current) {
                Some(node) => match &node.merged_into {
                    Some(target) => current = target.clone(),
                    None => return Some(current),
                },
                None => match self.graph.slot_type_map().get(&current) {
                    Some(next) if *next != current => current = next.clone(),
                    _ => return None,
                },
            }
        }
        None
    }

    /// A node under its exact current key, unless merged away.
    fn live(&self, key: &str) -> Option<&SlotNode> {
        self.graph.get(key).filter(|n| n.merged_into.is_none())
    }

    /// A live node that can still change state.
    fn pending(&self, key: &str) -> Result<&SlotNode, SlotGraphError> {
        let node = self
            .live(key)
            .ok_or_else(|| SlotGraphError::SlotNotFound(key.to_string()))?;
        if node.state().is_terminal() {
            return Err(SlotGraphError::InvalidStateTransition {
                slot_type: key.to_string(),
                from: node.state(),
                to: node.state(),
            });
        }
        Ok(node)
    }

    fn check_edges(&self, node: &SlotNode) -> Result<(), SlotGraphError> {
        if let Some(parent) = &node.parent {
            if !self.graph.contains(parent) {
                return Err(SlotGraphError::SlotNotFound(parent.clone()));
            }
        }
        for child in &node.children {
            if !self.graph.contains(child) {
                return Err(SlotGraphError::SlotNotFound(child.clone()));
            }
        }
        Ok(())
    }

    fn settle(&mut self, key: &str, state: SlotState) -> Result<(), SlotGraphError> {
        self.graph
            .get_mut(key)
            .ok_or_else(|| SlotGraphError::SlotNotFound(key.to_string()))?
            .transition(state)
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    fn rename_slot(
        &mut self,
        from: &str,
        to: &str,
        disposition: Disposition,
    ) -> Result<(), SlotGraphError> {
        let node = self.pending(from)?;
        self.check_edges(node)?;
        if self.graph.contains(to) {
            return Err(SlotGraphError::RenameCollision {
                target: to.to_string(),
                sources: vec![from.to_string(), to.to_string()],
            });
        }
        let parent = node.parent.clone();
        let original = node.original_slot_type.clone();

        self.settle(from, disposition.settled_state())?;
        let Some(mut node) = self.graph.take_node(from) else {
            return Err(SlotGraphError::SlotNotFound(from.to_string()));
        };
        node.slot_type = to.to_string();
        self.graph.put_node(node);

        if let Some(parent) = parent.and_then(|p| self.graph.get_mut(&p)) {
            parent.replace_child(from, to);
        }
        self.graph.repoint_edges(from, to);
        self.graph.rekey_indices(from, to);
        self.graph.record_slot_rename(&original, to);
        Ok(())
    }

    fn merge_slot(
        &mut self,
        from: &str,
        to: &str,
        disposition: Disposition,
    ) -> Result<(), SlotGraphError> {
        let source = self.pending(from)?;
        self.check_edges(source)?;
        let target = self
            .live(to)
            .ok_or_else(|| SlotGraphError::SlotNotFound(to.to_string()))?;
        if target.state() == SlotState::Pruned || self.graph.is_self_or_ancestor(from, to) {
            return Err(SlotGraphError::RenameCollision {
                target: to.to_string(),
                sources: vec![from.to_string()],
            });
        }
        let parent = source.parent.clone();
        let children = source.children.clone();
        let references = source.references.clone();
        let referrers: BTreeSet<String> = source.referrers.clone();
        let original = source.original_slot_type.clone();

        self.settle(from, disposition.settled_state())?;
        if let Some(source) = self.graph.get_mut(from) {
            source.merged_into = Some(to.to_string());
            source.children.clear();
            source.references.clear();
        }
        if let Some(parent) = parent.and_then(|p| self.graph.get_mut(&p)) {
            parent.remove_child(from);
        }
        if let Some(target) = self.graph.get_mut(to) {
            for child in &children {
                target.add_child(child);
            }
            for reference in &references {
                target.add_reference(reference);
            }
            target
                .referrers
                .extend(referrers.into_iter().filter(|r| r != to));
        }
        self.graph.repoint_edges(from, to);
        self.graph.rekey_indices(from, to);
        self.graph.record_slot_rename(&original, to);
        Ok(())
    }

    fn rename_part(&mut self, from: &str, to: &str) -> Result<(), SlotGraphError> {
        let named = |n: &SlotNode, part: &str| n.default_part.as_deref() == Some(part);
        if !self.graph.nodes().any(|n| named(n, from)) && self.graph.slot_for_part(from).is_none()
        {
            return Err(SlotGraphError::SlotNotFound(from.to_string()));
        }
        if self.graph.nodes().any(|n| named(n, to)) || self.graph.slot_for_part(to).is_some() {
            return Err(SlotGraphError::RenameCollision {
                target: to.to_string(),
                sources: vec![from.to_string(), to.to_string()],
            });
        }
        let touched = self.graph.rename_part_everywhere(from, to);
        tracing::debug!(from, to, slots = touched.len(), "renamed part");
        self.graph.record_part_rename(from, to);
        Ok(())
    }

    fn prune(
        &mut self,
        slot_type: &str,
        subtree: &[String],
        reparent: &[Reparent],
    ) -> Result<(), SlotGraphError> {
        let top = self
            .current_key(slot_type)
            .ok_or_else(|| SlotGraphError::SlotNotFound(slot_type.to_string()))?;
        let parent = self.pending(&top)?.parent.clone();

        let mut members = Vec::with_capacity(subtree.len());
        for member in subtree {
            let key = self
                .current_key(member)
                .ok_or_else(|| SlotGraphError::SlotNotFound(member.clone()))?;
            self.pending(&key)?;
            members.push(key);
        }

        let mut moves = Vec::with_capacity(reparent.len());
        for r in reparent {
            let child = self
                .current_key(&r.slot_type)
                .ok_or_else(|| SlotGraphError::SlotNotFound(r.slot_type.clone()))?;
            let new_parent = self
                .current_key(&r.new_parent)
                .ok_or_else(|| SlotGraphError::SlotNotFound(r.new_parent.clone()))?;
            let keeper = self
                .live(&new_parent)
                .ok_or_else(|| SlotGraphError::SlotNotFound(new_parent.clone()))?;
            if keeper.state() == SlotState::Pruned
                || members.contains(&new_parent)
                || new_parent == top
                || self.graph.is_self_or_ancestor(&child, &new_parent)
            {
                return Err(SlotGraphError::SlotNotFound(new_parent));
            }
            let old_parent = self.live(&child).and_then(|n| n.parent.clone());
            moves.push((child, old_parent, new_parent));
        }

        for (child, old_parent, new_parent) in moves {
            if let Some(old) = old_parent.and_then(|p| self.graph.get_mut(&p)) {
                old.remove_child(&child);
            }
            if let Some(keeper) = self.graph.get_mut(&new_parent) {
                keeper.add_child(&child);
            }
            if let Some(node) = self.graph.get_mut(&child) {
                node.parent = Some(new_parent);
            }
        }
        self.settle(&top, SlotState::Pruned)?;
        for member in &members {
            self.settle(member, SlotState::Pruned)?;
        }
        if let Some(parent) = parent.and_then(|p| self.graph.get_mut(&p)) {
            parent.remove_child(&top);
        }
        tracing::debug!(slot = %top, members = members.len(), "pruned subtree");
        Ok(())
    }

    fn inject(
        &mut self,
        slot_type: &str,
        default_part: &str,
        description: &str,
        parent: Option<&str>,
    ) -> Result<(), SlotGraphError> {
        if self.graph.contains(slot_type) {
            return Err(SlotGraphError::RenameCollision {
                target: slot_type.to_string(),
                sources: vec![slot_type.to_string()],
            });
        }
        let parent = match parent {
            Some(p) => {
                let key = self
                    .current_key(p)
                    .ok_or_else(|| SlotGraphError::SlotNotFound(p.to_string()))?;
                if self.graph.is_pruned(&key) {
                    return Err(SlotGraphError::SlotNotFound(key));
                }
                Some(key)
            }
            None => None,
        };

        let no_options = BTreeMap::new();
        let new_slot = NewSlot {
            slot_type,
            default_part,
            description,
            options: &no_options,
        };
        self.insert_injected(&new_slot, parent.as_deref())?;
        if self.graph.root().is_none() && parent.is_none() {
            self.graph.set_root(Some(slot_type.to_string()));
        }
        Ok(())
    }

    /// Add the replacement slot next to an extraction-only source. The
    /// source stays in the graph for reading and is marked as replaced.
    fn replace(&mut self, source: &str, new_slot: &NewSlot<'_>) -> Result<(), SlotGraphError> {
        let key = self
            .current_key(source)
            .ok_or_else(|| SlotGraphError::SlotNotFound(source.to_string()))?;
        if self.graph.is_pruned(&key) {
            return Err(SlotGraphError::SlotNotFound(key));
        }
        if self.graph.contains(new_slot.slot_type) {
            return Err(SlotGraphError::RenameCollision {
                target: new_slot.slot_type.to_string(),
                sources: vec![key],
            });
        }
        let parent = self.graph.get(&key).and_then(|n| n.parent.clone());
        self.insert_injected(new_slot, parent.as_deref())?;
        if let Some(node) = self.graph.get_mut(&key) {
            node.replaced_by = Some(new_slot.slot_type.to_string());
        }
        tracing::debug!(slot = %key, replacement = new_slot.slot_type, "replaced");
        Ok(())
    }

    fn insert_injected(
        &mut self,
        new_slot: &NewSlot<'_>,
        parent: Option<&str>,
    ) -> Result<(), SlotGraphError> {
        let mut node = SlotNode::new(new_slot.slot_type, 0);
        node.placeholder = false;
        node.default_part = Some(new_slot.default_part.to_string());
        node.default_declared = true;
        node.description = new_slot.description.to_string();
        node.options = new_slot.options.clone();
        node.parent = parent.map(str::to_string);
        node.assign_disposition(Disposition::Inject)?;
        node.transition(SlotState::Injected)?;
        if let Some(p) = parent {
            node.referrers.insert(p.to_string());
        }
        self.graph.insert_node(node);

        if let Some(p) = parent.and_then(|p| self.graph.get_mut(p)) {
            p.add_child(new_slot.slot_type);
            p.add_reference(new_slot.slot_type);
        }
        self.graph.index_part(new_slot.default_part, new_slot.slot_type);
        Ok(())
    }

    fn retain(&mut self, slot_type: &str, disposition: Disposition) -> Result<(), SlotGraphError> {
        let key = self
            .current_key(slot_type)
            .ok_or_else(|| SlotGraphError::SlotNotFound(slot_type.to_string()))?;
        self.pending(&key)?;
        self.settle(&key, disposition.settled_state())
    }
}

// =============================================================================
// TESTS
// =============================================================================
