//! # Transformation Planner
//!
//! Walks the graph, applies [`DispositionRules`] and emits an ordered list of
//! [`Transformation`]s.
//!
//! Planning happens in two phases. Everything is first computed into local
//! tables from a read-only view of the graph. The rename tables are then
//! validated, and only when validation passes are dispositions, targets and
//! the plan written back. A failed plan leaves the graph exactly as it was.
//!
//! ## Order
//!
//! Pre-order from the root, children in insertion order. Remaining
//! components follow, their parentless tops in key order. Replacements and
//! injections come last.
//!
//! ## Pruning
//!
//! The full set of pruned nodes is settled before any operation is emitted:
//! a descendant of a prune target is pruned with it unless some referrer
//! outside that set keeps it alive. Survivors are re-parented under such a
//! referrer, so no live node ever ends up below a pruned one.

use crate::graph::SlotGraph;
use crate::rules::DispositionRules;
use crate::{Disposition, GraphWarning, RowCell, SlotGraphError, SlotRole, WarningKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// OPERATIONS
// =============================================================================

/// Execution status of one planned operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    /// Not yet executed.
    Pending,
    /// Executed successfully.
    Applied,
    /// Preconditions failed; the graph was left as before this operation.
    Rejected,
}

/// A descendant of a pruned slot that moves under another referrer instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reparent {
    /// The slot being kept.
    pub slot_type: String,
    /// Its new tree parent (key at planning time).
    pub new_parent: String,
}

/// A single planned change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Rename a slot type. With `merge`, fold into an existing target.
    RenameSlotType {
        /// Current key.
        from: String,
        /// New key.
        to: String,
        /// Disposition the node settles into.
        disposition: Disposition,
        /// Whether the target is a flagged merge target.
        merge: bool,
    },
    /// Rename a part everywhere it is named as a default.
    RenamePart {
        /// Slot whose disposition asked for the rename.
        slot_type: String,
        /// Current part name.
        from: String,
        /// New part name.
        to: String,
    },
    /// Prune a slot and the exclusively-owned part of its subtree.
    Prune {
        /// Top of the pruned subtree.
        slot_type: String,
        /// Pruned descendants in pre-order.
        subtree: Vec<String>,
        /// Shared descendants moved under an active referrer.
        reparent: Vec<Reparent>,
    },
    /// Add a slot absent from every donor file.
    Inject {
        /// New slot type.
        slot_type: String,
        /// Default part of the new slot.
        default_part: String,
        /// Description of the new slot.
        description: String,
        /// Parent key at planning time.
        parent: Option<String>,
    },
    /// Stand a new slot in for an extraction-only one, next to it.
    Replace {
        /// The extraction-only slot (key at planning time).
        slot_type: String,
        /// New slot type.
        replacement: String,
        /// Default part of the new slot.
        default_part: String,
        /// Description of the new slot.
        description: String,
        /// Options cell of the new slot row.
        options: BTreeMap<String, RowCell>,
    },
    /// Settle a slot that needs no rewrite.
    Retain {
        /// The slot.
        slot_type: String,
        /// Disposition the node settles into.
        disposition: Disposition,
    },
}

impl Operation {
    /// Stable operation tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::RenameSlotType { .. } => "RENAME_SLOT_TYPE",
            Operation::RenamePart { .. } => "RENAME_PART",
            Operation::Prune { .. } => "PRUNE",
            Operation::Inject { .. } => "INJECT",
            Operation::Replace { .. } => "REPLACE",
            Operation::Retain { .. } => "RETAIN",
        }
    }

    /// The slot this operation is about.
    #[must_use]
    pub fn slot_type(&self) -> &str {
        match self {
            Operation::RenameSlotType { from, .. } => from,
            Operation::RenamePart { slot_type, .. }
            | Operation::Prune { slot_type, .. }
            | Operation::Inject { slot_type, .. }
            | Operation::Replace { slot_type, .. }
            | Operation::Retain { slot_type, .. } => slot_type,
        }
    }
}

/// A planned operation with its status and the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transformation {
    /// What to do.
    pub op: Operation,
    /// Execution status.
    pub status: OpStatus,
    /// Why.
    pub reason: String,
}

impl Transformation {
    fn new(op: Operation, reason: impl Into<String>) -> Self {
        Self {
            op,
            status: OpStatus::Pending,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// SUMMARY & EXPLANATION
// =============================================================================

/// Counts and rename tables of the current plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Total number of operations.
    pub total_operations: usize,
    /// Operation count per kind tag.
    pub by_operation: BTreeMap<String, usize>,
    /// Node count per assigned disposition.
    pub by_disposition: BTreeMap<String, usize>,
    /// Operation count per status.
    pub by_status: BTreeMap<String, usize>,
    /// Planned slot renames, from -> to.
    pub slot_renames: BTreeMap<String, String>,
    /// Planned part renames, from -> to.
    pub part_renames: BTreeMap<String, String>,
    /// Targets receiving an intentional merge.
    pub merge_targets: Vec<String>,
}

impl PlanSummary {
    /// Summarize the plan stored on a graph.
    #[must_use]
    pub fn from_graph(graph: &SlotGraph) -> Self {
        let mut summary = Self {
            total_operations: graph.transformations().len(),
            ..Self::default()
        };
        for (disposition, count) in graph.count_by_disposition() {
            summary
                .by_disposition
                .insert(disposition.as_str().to_string(), count);
        }
        let mut merges = BTreeSet::new();
        for t in graph.transformations() {
            *summary.by_operation.entry(t.op.kind().to_string()).or_default() += 1;
            let status = match t.status {
                OpStatus::Pending => "pending",
                OpStatus::Applied => "applied",
                OpStatus::Rejected => "rejected",
            };
            *summary.by_status.entry(status.to_string()).or_default() += 1;
            match &t.op {
                Operation::RenameSlotType { from, to, merge, .. } => {
                    summary.slot_renames.insert(from.clone(), to.clone());
                    if *merge {
                        merges.insert(to.clone());
                    }
                }
                Operation::RenamePart { from, to, .. } => {
                    summary.part_renames.insert(from.clone(), to.clone());
                }
                _ => {}
            }
        }
        summary.merge_targets = merges.into_iter().collect();
        summary
    }
}

/// Rule evaluation for one slot, computed without touching the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    /// The slot.
    pub slot_type: String,
    /// Role classification.
    pub role: SlotRole,
    /// Disposition the rules give now.
    pub disposition: Disposition,
    /// Disposition already assigned, if any.
    pub assigned: Option<Disposition>,
    /// Which rule fired.
    pub reason: String,
    /// Slot type after a rename.
    pub target_slot_type: Option<String>,
    /// Default part after a rename.
    pub target_part_name: Option<String>,
    /// Number of referrers.
    pub referrers: usize,
}

// =============================================================================
// PLANNER
// =============================================================================

/// Everything a plan computes before it is committed.
#[derive(Debug, Default)]
struct Draft {
    dispositions: BTreeMap<String, Disposition>,
    reasons: BTreeMap<String, String>,
    slot_targets: BTreeMap<String, String>,
    part_targets: BTreeMap<String, String>,
    pruned: BTreeSet<String>,
    ops: Vec<Transformation>,
    warnings: Vec<GraphWarning>,
    merges: BTreeSet<String>,
}

/// Plans the transformation of one graph under one rule table.
pub struct TransformationPlanner<'a> {
    graph: &'a mut SlotGraph,
    rules: &'a DispositionRules,
}

impl<'a> TransformationPlanner<'a> {
    /// Create a planner.
    pub fn new(graph: &'a mut SlotGraph, rules: &'a DispositionRules) -> Self {
        Self { graph, rules }
    }

    /// Nodes in planning order.
    #[must_use]
    pub fn traversal_order(&self) -> Vec<String> {
        let graph = &*self.graph;
        let mut tops: Vec<String> = graph
            .nodes()
            .filter(|n| n.parent.is_none() && n.merged_into.is_none())
            .map(|n| n.slot_type.clone())
            .collect();
        if let Some(root) = graph.root() {
            if let Some(pos) = tops.iter().position(|t| t == root) {
                let root = tops.remove(pos);
                tops.insert(0, root);
            }
        }

        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        for top in tops {
            if !seen.insert(top.clone()) {
                continue;
            }
            let below = graph.descendants(&top);
            order.push(top);
            for key in below {
                if seen.insert(key.clone()) {
                    order.push(key);
                }
            }
        }
        for key in graph.slot_types() {
            if seen.insert(key.to_string()) {
                order.push(key.to_string());
            }
        }
        order
    }

    /// Plan the transformation.
    ///
    /// On success the dispositions, rename targets and plan are stored on the
    /// graph and the plan is returned. On [`SlotGraphError::RenameCollision`]
    /// nothing is written. A graph is planned once: a second call fails with
    /// [`SlotGraphError::AlreadyPlanned`].
    pub fn plan(&mut self) -> Result<Vec<Transformation>, SlotGraphError> {
        let existing = self.graph.transformations().len();
        if existing > 0 {
            return Err(SlotGraphError::AlreadyPlanned(existing));
        }
        let order = self.traversal_order();
        let mut draft = Draft::default();

        self.decide_all(&order, &mut draft);
        self.plan_prunes(&order, &mut draft);
        self.plan_renames(&order, &mut draft);
        self.check_slot_collisions(&draft)?;
        self.check_part_collisions(&draft)?;
        self.emit_node_ops(&order, &mut draft);
        self.plan_injections(&order, &mut draft);

        self.commit(&mut draft)?;
        tracing::info!(
            operations = draft.ops.len(),
            pruned = draft.pruned.len(),
            slot_renames = draft.slot_targets.len(),
            part_renames = draft.part_targets.len(),
            "planned transformation"
        );
        Ok(draft.ops)
    }

    fn decide_all(&self, order: &[String], draft: &mut Draft) {
        let ctx = self.graph.target_context();
        for key in order {
            let Some(node) = self.graph.get(key) else {
                continue;
            };
            if node.state().is_terminal() || node.merged_into.is_some() {
                continue;
            }
            let (disposition, reason) = match node.disposition() {
                Some(d) => (d, "previously assigned".to_string()),
                None => {
                    let decision = self.rules.decide(node);
                    tracing::debug!(
                        slot = %key,
                        target_context = ctx,
                        disposition = %decision.disposition,
                        reason = %decision.reason,
                        "decided"
                    );
                    (decision.disposition, decision.reason)
                }
            };
            draft.dispositions.insert(key.clone(), disposition);
            draft.reasons.insert(key.clone(), reason);
        }
    }

    /// Resolve prune targets into pruned subtrees and re-parentings.
    fn plan_prunes(&self, order: &[String], draft: &mut Draft) {
        let mut tops = Vec::new();
        for key in order {
            if draft.dispositions.get(key) != Some(&Disposition::Prune) {
                continue;
            }
            let Some(node) = self.graph.get(key) else {
                continue;
            };
            if node.is_shared() {
                draft.dispositions.insert(key.clone(), Disposition::Preserve);
                draft
                    .reasons
                    .insert(key.clone(), "prune refused for shared slot".to_string());
                draft.warnings.push(GraphWarning::for_slot(
                    WarningKind::PruneOfSharedNode,
                    key,
                    format!(
                        "Slot '{}' is referenced by {:?}; kept instead of pruned",
                        key, node.referrers
                    ),
                ));
                continue;
            }
            tops.push(key.clone());
        }

        let doomed = self.prune_set(&tops);
        let top_set: BTreeSet<&String> = tops.iter().collect();
        let mut claimed: BTreeSet<String> = BTreeSet::new();

        for key in &tops {
            if claimed.contains(key) {
                // already inside an earlier target's subtree
                continue;
            }
            claimed.insert(key.clone());
            let mut subtree = Vec::new();
            let mut reparent = Vec::new();
            let mut stack: Vec<String> = self
                .graph
                .get(key)
                .map(|n| n.children.iter().rev().cloned().collect())
                .unwrap_or_default();
            while let Some(child) = stack.pop() {
                let Some(child_node) = self.graph.get(&child) else {
                    continue;
                };
                if child_node.merged_into.is_some() || claimed.contains(&child) {
                    continue;
                }
                if doomed.contains(&child) {
                    claimed.insert(child.clone());
                    stack.extend(child_node.children.iter().rev().cloned());
                    subtree.push(child);
                    continue;
                }
                match self.keeper(&child, &doomed) {
                    Some(r) => reparent.push(Reparent {
                        slot_type: child.clone(),
                        new_parent: r,
                    }),
                    None => {
                        tracing::warn!(slot = %child, "no keeper outside the pruned set");
                    }
                }
            }

            for member in &subtree {
                let reason = if top_set.contains(member) {
                    format!("listed in prune_slots, inside pruned subtree of '{}'", key)
                } else {
                    format!("inside pruned subtree of '{}'", key)
                };
                draft.dispositions.insert(member.clone(), Disposition::Prune);
                draft.reasons.insert(member.clone(), reason);
            }
            let reason = draft.reasons.get(key).cloned().unwrap_or_default();
            draft.ops.push(Transformation::new(
                Operation::Prune {
                    slot_type: key.clone(),
                    subtree,
                    reparent,
                },
                reason,
            ));
        }
        draft.pruned = doomed;
    }

    /// Every node pruned along with `tops`.
    ///
    /// Starts from the tops and all their descendants, then repeatedly drops
    /// any non-top node that still has a keeper outside the set. Dropping a
    /// node can only create new keepers, so the loop shrinks to a fixpoint.
    fn prune_set(&self, tops: &[String]) -> BTreeSet<String> {
        let mut doomed: BTreeSet<String> = BTreeSet::new();
        for top in tops {
            doomed.insert(top.clone());
            doomed.extend(self.graph.descendants(top));
        }
        let top_set: BTreeSet<&String> = tops.iter().collect();
        loop {
            let survivors: Vec<String> = doomed
                .iter()
                .filter(|k| !top_set.contains(k) && self.keeper(k, &doomed).is_some())
                .cloned()
                .collect();
            if survivors.is_empty() {
                return doomed;
            }
            for key in survivors {
                doomed.remove(&key);
            }
        }
    }

    /// The smallest referrer of `key` that stays live: outside `doomed`,
    /// present, not merged away and not below `key` itself.
    fn keeper(&self, key: &str, doomed: &BTreeSet<String>) -> Option<String> {
        let node = self.graph.get(key)?;
        let below: BTreeSet<String> = self.graph.descendants(key).into_iter().collect();
        node.referrers
            .iter()
            .find(|r| {
                !doomed.contains(*r)
                    && !below.contains(*r)
                    && self
                        .graph
                        .get(r)
                        .is_some_and(|n| n.merged_into.is_none() && !self.graph.is_pruned(r))
            })
            .cloned()
    }

    fn plan_renames(&self, order: &[String], draft: &mut Draft) {
        let ctx = self.graph.target_context();
        for key in order {
            let Some(disposition) = draft.dispositions.get(key).copied() else {
                continue;
            };
            if !disposition.renames_slot_type() || draft.pruned.contains(key) {
                continue;
            }
            let Some(node) = self.graph.get(key) else {
                continue;
            };

            let target = self.rules.target_slot_type(&node.original_slot_type, ctx);
            if target != *key {
                draft.slot_targets.insert(key.clone(), target);
            }

            let Some(part) = node.default_part.as_deref() else {
                continue;
            };
            let part_target = match disposition {
                Disposition::Adapt => Some(self.rules.target_part_name(part, ctx)),
                _ => self.rules.explicit_part_rename(part).map(str::to_string),
            };
            if let Some(to) = part_target.filter(|to| to != part) {
                draft.part_targets.entry(part.to_string()).or_insert(to);
            }
        }
    }

    fn check_slot_collisions(&self, draft: &Draft) -> Result<(), SlotGraphError> {
        let mut by_target: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (from, to) in &draft.slot_targets {
            by_target.entry(to).or_default().push(from.clone());
        }
        for (target, mut sources) in by_target {
            if self.rules.is_merge_target(target) {
                continue;
            }
            // an existing key is never reused, even when it is renamed away itself
            if self.graph.contains(target) {
                sources.push(target.to_string());
            }
            if sources.len() > 1 {
                sources.sort();
                sources.dedup();
                tracing::warn!(target, ?sources, "rename collision");
                return Err(SlotGraphError::RenameCollision {
                    target: target.to_string(),
                    sources,
                });
            }
        }
        Ok(())
    }

    fn check_part_collisions(&self, draft: &Draft) -> Result<(), SlotGraphError> {
        let mut known: BTreeSet<&str> = self.graph.parts().map(|(part, _)| part).collect();
        known.extend(self.graph.nodes().filter_map(|n| n.default_part.as_deref()));

        let mut by_target: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (from, to) in &draft.part_targets {
            by_target.entry(to).or_default().push(from.clone());
        }
        for (target, mut sources) in by_target {
            if known.contains(target) {
                sources.push(target.to_string());
            }
            if sources.len() > 1 {
                sources.sort();
                sources.dedup();
                tracing::warn!(target, ?sources, "part rename collision");
                return Err(SlotGraphError::RenameCollision {
                    target: target.to_string(),
                    sources,
                });
            }
        }
        Ok(())
    }

    fn emit_node_ops(&self, order: &[String], draft: &mut Draft) {
        let prunes = std::mem::take(&mut draft.ops);
        let mut prune_ops: BTreeMap<String, Transformation> = prunes
            .into_iter()
            .map(|t| (t.op.slot_type().to_string(), t))
            .collect();
        let mut emitted_parts = BTreeSet::new();
        let mut merge_sources: BTreeMap<&str, usize> = BTreeMap::new();
        for to in draft.slot_targets.values() {
            *merge_sources.entry(to.as_str()).or_default() += 1;
        }
        let mut merges = BTreeSet::new();
        let mut ops = Vec::new();

        for key in order {
            if let Some(prune) = prune_ops.remove(key) {
                ops.push(prune);
                continue;
            }
            let Some(disposition) = draft.dispositions.get(key).copied() else {
                continue;
            };
            if draft.pruned.contains(key) {
                continue;
            }
            let reason = draft.reasons.get(key).cloned().unwrap_or_default();

            if disposition.renames_slot_type() {
                if let Some(part) = self.graph.get(key).and_then(|n| n.default_part.clone()) {
                    if let Some(to) = draft.part_targets.get(&part) {
                        if emitted_parts.insert(part.clone()) {
                            ops.push(Transformation::new(
                                Operation::RenamePart {
                                    slot_type: key.clone(),
                                    from: part,
                                    to: to.clone(),
                                },
                                reason.clone(),
                            ));
                        }
                    }
                }
            }

            match draft.slot_targets.get(key) {
                Some(to) if disposition.renames_slot_type() => {
                    let merge = self.rules.is_merge_target(to)
                        && (self.graph.contains(to)
                            || merge_sources.get(to.as_str()).copied().unwrap_or(0) > 1);
                    if merge {
                        merges.insert(to.clone());
                    }
                    ops.push(Transformation::new(
                        Operation::RenameSlotType {
                            from: key.clone(),
                            to: to.clone(),
                            disposition,
                            merge,
                        },
                        reason,
                    ));
                }
                _ => ops.push(Transformation::new(
                    Operation::Retain {
                        slot_type: key.clone(),
                        disposition,
                    },
                    reason,
                )),
            }
        }
        draft.ops = ops;
        draft.merges = merges;
    }

    /// Replacements for extraction-only slots, then configured injections.
    fn plan_injections(&self, order: &[String], draft: &mut Draft) {
        let renamed_to: BTreeSet<&String> = draft.slot_targets.values().collect();
        let mut injected = BTreeSet::new();
        let mut ops = Vec::new();

        for key in order {
            if draft.pruned.contains(key) || !draft.dispositions.contains_key(key) {
                continue;
            }
            let Some(node) = self.graph.get(key) else {
                continue;
            };
            let Some(replacement) = self.rules.replacement_for(&node.original_slot_type) else {
                continue;
            };
            let slot_type = replacement.slot_type;
            if self.graph.contains(&slot_type)
                || renamed_to.contains(&slot_type)
                || !injected.insert(slot_type.clone())
            {
                draft.warnings.push(GraphWarning::for_slot(
                    WarningKind::InjectionSkipped,
                    &slot_type,
                    format!(
                        "Replacement '{}' for '{}' already exists; '{}' stays in the output",
                        slot_type, key, key
                    ),
                ));
                continue;
            }
            ops.push(Transformation::new(
                Operation::Replace {
                    slot_type: key.clone(),
                    replacement: slot_type,
                    default_part: replacement.default_part,
                    description: replacement.description,
                    options: replacement.options,
                },
                format!("replacement for extraction-only slot '{}'", key),
            ));
        }

        for spec in self.rules.injections() {
            let slot_type = spec.slot_type.trim().to_string();
            if self.graph.contains(&slot_type)
                || renamed_to.contains(&slot_type)
                || !injected.insert(slot_type.clone())
            {
                draft.warnings.push(GraphWarning::for_slot(
                    WarningKind::InjectionSkipped,
                    &slot_type,
                    format!("Slot '{}' already exists; not injected", slot_type),
                ));
                continue;
            }
            let parent = spec.parent.clone().or_else(|| self.graph.root().map(str::to_string));
            if let Some(p) = &parent {
                if !self.graph.contains(p) {
                    draft.warnings.push(GraphWarning::for_slot(
                        WarningKind::InjectionSkipped,
                        &slot_type,
                        format!("Parent '{}' of injected slot '{}' not found", p, slot_type),
                    ));
                    continue;
                }
            }
            ops.push(Transformation::new(
                Operation::Inject {
                    default_part: spec.default_part.clone().unwrap_or_else(|| slot_type.clone()),
                    description: spec.description.clone(),
                    parent,
                    slot_type,
                },
                "configured injection",
            ));
        }
        draft.ops.extend(ops);
    }

    fn commit(&mut self, draft: &mut Draft) -> Result<(), SlotGraphError> {
        for (key, disposition) in &draft.dispositions {
            let assigned = self.graph.get(key).and_then(|n| n.disposition());
            if assigned.is_some_and(|d| d != *disposition) {
                return Err(SlotGraphError::DispositionAlreadyAssigned(key.clone()));
            }
        }
        for (key, disposition) in &draft.dispositions {
            let Some(node) = self.graph.get_mut(key) else {
                continue;
            };
            if node.disposition().is_none() {
                node.assign_disposition(*disposition)?;
            }
            node.target_slot_type = draft.slot_targets.get(key).cloned();
            node.target_part_name = node
                .default_part
                .as_ref()
                .filter(|_| disposition.renames_slot_type())
                .and_then(|p| draft.part_targets.get(p).cloned());
        }
        for warning in std::mem::take(&mut draft.warnings) {
            self.graph.push_warning(warning);
        }
        self.graph
            .set_plan(draft.ops.clone(), std::mem::take(&mut draft.merges));
        Ok(())
    }

    /// Counts and rename tables of the stored plan.
    #[must_use]
    pub fn get_plan_summary(&self) -> PlanSummary {
        PlanSummary::from_graph(self.graph)
    }

    /// Evaluate the rules for one slot without changing anything.
    pub fn explain(&self, slot_type: &str) -> Result<Explanation, SlotGraphError> {
        let node = self
            .graph
            .resolve(slot_type)
            .ok_or_else(|| SlotGraphError::SlotNotFound(slot_type.to_string()))?;
        let ctx = self.graph.target_context();
        let decision = self.rules.decide(node);
        let renames = decision.disposition.renames_slot_type();
        let target_slot_type = Some(self.rules.target_slot_type(&node.original_slot_type, ctx))
            .filter(|t| renames && *t != node.slot_type);
        let target_part_name = node.default_part.as_deref().and_then(|p| {
            match decision.disposition {
                Disposition::Adapt => Some(self.rules.target_part_name(p, ctx)),
                Disposition::RemapDefault => self.rules.explicit_part_rename(p).map(str::to_string),
                _ => None,
            }
        });
        Ok(Explanation {
            slot_type: node.slot_type.clone(),
            role: self.rules.classify_role(&node.original_slot_type),
            disposition: decision.disposition,
            assigned: node.disposition(),
            reason: decision.reason,
            target_slot_type,
            target_part_name,
            referrers: node.referrers.len(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
