//! # Tree View
//!
//! Human-readable rendering of a graph at any point of a run: the slot tree
//! with state, disposition and asset role markers, counts per asset role and,
//! optionally, the transformation history.
//!
//! Read-only. Works on built, planned and executed graphs alike.
//!
//! ## Node Line
//!
//! ```text
//! ●[A/T] engine → engine_pickup = v8 → pickup_v8
//! │   ├── ●[P/P] intake = intake_stock
//! ```
//!
//! - State: `○` pending, `◐` planned, `●` settled, `✗` pruned
//! - Disposition: `A` adapt, `P` preserve, `X` prune, `I` inject, `R` remap
//! - Role: `S` source, `T` target, `P` preserve

use crate::graph::{SlotGraph, SlotNode};
use crate::planner::{OpStatus, Operation};
use crate::{AssetRole, Disposition, SlotState};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

const RULE: &str = "═══════════════════════════════════════════════════════";

/// Output flavour of [`render_tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeFormat {
    /// Console text with box-drawing rules.
    #[default]
    Text,
    /// Markdown with headings; the tree sits in a code fence.
    Markdown,
}

/// What [`render_tree`] includes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeOptions {
    /// Add the declaring donor file under each node.
    pub show_source_files: bool,
    /// Append the transformation history.
    pub show_transformations: bool,
    /// Only show nodes with this asset role.
    pub filter_role: Option<AssetRole>,
    /// Only show nodes with this disposition.
    pub filter_disposition: Option<Disposition>,
    /// Output flavour.
    pub format: TreeFormat,
}

// =============================================================================
// RENDERING
// =============================================================================

/// Render a graph as a tree view.
///
/// A node that fails a filter is hidden together with everything below it.
/// Merged nodes are never shown. Pruned nodes stay under the parent they
/// were detached from.
#[must_use]
pub fn render_tree(graph: &SlotGraph, options: &TreeOptions) -> String {
    let markdown = options.format == TreeFormat::Markdown;
    let mut out = String::new();
    let counts = [
        ("Slots", graph.node_count()),
        ("Active", graph.active_nodes().len()),
        ("Donor Files", graph.donor_files().len()),
        ("Transforms", graph.transformations().len()),
    ];
    let joined = |bold: bool| {
        counts
            .iter()
            .map(|(label, n)| if bold { format!("**{label}:** {n}") } else { format!("{label}: {n}") })
            .collect::<Vec<_>>()
            .join(" | ")
    };

    if markdown {
        let _ = writeln!(out, "# Slot Graph: {}\n", graph.target_context());
        let _ = writeln!(out, "{}\n", joined(true));
        out.push_str("## Legend\n");
        out.push_str("- **State:** ○=pending ◐=planned ●=settled ✗=pruned\n");
        out.push_str("- **Disposition:** A=adapt P=preserve X=prune I=inject R=remap\n");
        out.push_str("- **Role:** S=source(extraction) T=target(export) P=preserve\n\n");
        out.push_str("## Slot Tree\n```\n");
    } else {
        let _ = writeln!(out, "{RULE}");
        let _ = writeln!(out, " SLOT GRAPH: {}", graph.target_context());
        let _ = writeln!(out, " {}", joined(false));
        let _ = writeln!(out, "{RULE}\n");
        out.push_str(" Legend:\n");
        out.push_str("   State:       ○=pending  ◐=planned  ●=settled  ✗=pruned\n");
        out.push_str("   Disposition: A=adapt  P=preserve  X=prune  I=inject  R=remap\n");
        out.push_str("   Role:        S=source(extraction)  T=target(export)  P=preserve\n\n");
        out.push_str(" ─── Slot Tree ───\n");
    }

    let tree = TreeWalk::new(graph, options);
    let tops = tree.tops();
    if tops.is_empty() {
        out.push_str("  (empty graph)\n");
    }
    for top in tops {
        tree.node(&mut out, top, 0);
    }
    if markdown {
        out.push_str("```\n");
    }

    render_role_counts(&mut out, graph, markdown);
    if options.show_transformations && !graph.transformations().is_empty() {
        render_history(&mut out, graph, markdown);
    }
    out
}

struct TreeWalk<'g> {
    graph: &'g SlotGraph,
    options: &'g TreeOptions,
    /// Children per key: tree children, then pruned nodes still pointing here.
    children: BTreeMap<&'g str, Vec<&'g str>>,
    original_parts: BTreeMap<&'g str, &'g str>,
}

impl<'g> TreeWalk<'g> {
    fn new(graph: &'g SlotGraph, options: &'g TreeOptions) -> Self {
        let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for node in graph.nodes() {
            children
                .entry(node.slot_type.as_str())
                .or_default()
                .extend(node.children.iter().map(String::as_str));
        }
        for node in graph.nodes_in_discovery_order() {
            let Some(parent) = node.parent.as_deref() else {
                continue;
            };
            let list = children.entry(parent).or_default();
            if !list.contains(&node.slot_type.as_str()) {
                list.push(node.slot_type.as_str());
            }
        }
        let original_parts = graph
            .part_name_map()
            .iter()
            .map(|(from, to)| (to.as_str(), from.as_str()))
            .collect();
        Self {
            graph,
            options,
            children,
            original_parts,
        }
    }

    /// The root first, then other parentless nodes in discovery order.
    fn tops(&self) -> Vec<&'g str> {
        let mut tops: Vec<&str> = self.graph.root().into_iter().collect();
        for node in self.graph.nodes_in_discovery_order() {
            let key = node.slot_type.as_str();
            if node.parent.is_none() && node.merged_into.is_none() && !tops.contains(&key) {
                tops.push(key);
            }
        }
        tops
    }

    fn shown(&self, node: &SlotNode) -> bool {
        node.merged_into.is_none()
            && self.options.filter_role.is_none_or(|r| node.asset_role() == r)
            && self
                .options
                .filter_disposition
                .is_none_or(|d| node.disposition() == Some(d))
    }

    fn node(&self, out: &mut String, key: &str, depth: usize) {
        let mut visited = BTreeSet::new();
        self.walk(out, key, depth, &mut visited);
    }

    fn walk<'k>(&self, out: &mut String, key: &'k str, depth: usize, visited: &mut BTreeSet<&'k str>)
    where
        'g: 'k,
    {
        if !visited.insert(key) {
            return;
        }
        let Some(node) = self.graph.get(key) else {
            return;
        };
        if !self.shown(node) {
            return;
        }
        let prefix = "│   ".repeat(depth);
        let connector = if depth > 0 { "├── " } else { "" };
        let _ = writeln!(out, "{prefix}{connector}{}", self.line(node));
        if self.options.show_source_files {
            if let Some(file) = &node.source_file {
                let _ = writeln!(out, "{prefix}│       └─ file: {file}");
            }
        }
        let children = self.children.get(key).cloned().unwrap_or_default();
        for child in children {
            self.walk(out, child, depth + 1, visited);
        }
    }

    fn line(&self, node: &SlotNode) -> String {
        let state = match node.state() {
            SlotState::Pruned => '✗',
            SlotState::Pending if node.disposition().is_some() => '◐',
            SlotState::Pending => '○',
            _ => '●',
        };
        let disposition = node.disposition().map_or('-', |d| d.marker());
        let mut line = format!(
            "{state}[{disposition}/{}] {}",
            node.asset_role().marker(),
            arrow(&node.original_slot_type, node.target_slot_type.as_deref().unwrap_or(&node.slot_type))
        );
        if let Some(part) = &node.default_part {
            let original = self.original_parts.get(part.as_str()).copied().unwrap_or(part);
            let current = node.target_part_name.as_deref().unwrap_or(part);
            let _ = write!(line, " = {}", arrow(original, current));
        }
        if let Some(replacement) = &node.replaced_by {
            let _ = write!(line, " (replaced by {replacement})");
        }
        line
    }
}

fn arrow(from: &str, to: &str) -> String {
    if from == to {
        from.to_string()
    } else {
        format!("{from} → {to}")
    }
}

fn render_role_counts(out: &mut String, graph: &SlotGraph, markdown: bool) {
    let mut counts: BTreeMap<AssetRole, usize> = BTreeMap::new();
    for node in graph.nodes().filter(|n| n.merged_into.is_none()) {
        *counts.entry(node.asset_role()).or_default() += 1;
    }
    if markdown {
        out.push_str("\n## Statistics by Asset Role\n");
    } else {
        out.push_str("\n ─── Statistics by Asset Role ───\n");
    }
    for (role, count) in counts {
        let what = match role {
            AssetRole::Source => "Extraction only (not written)",
            AssetRole::Target => "Generated or adapted (written)",
            AssetRole::Preserve => "Donor declaration (copied)",
        };
        if markdown {
            let _ = writeln!(out, "- **{}**: {} slots - {}", role.as_str(), count, what);
        } else {
            let _ = writeln!(out, "   {:10} : {:3} slots - {}", role.as_str(), count, what);
        }
    }
}

fn render_history(out: &mut String, graph: &SlotGraph, markdown: bool) {
    if markdown {
        out.push_str("\n## Transformation History\n");
    } else {
        out.push_str("\n ─── Transformation History ───\n");
    }
    for (i, t) in graph.transformations().iter().enumerate() {
        let status = match t.status {
            OpStatus::Applied => '✓',
            OpStatus::Pending => '○',
            OpStatus::Rejected => '✗',
        };
        let change = change_of(&t.op);
        if markdown {
            let _ = writeln!(
                out,
                "{}. {} **{}** on `{}`: {} - {}",
                i + 1,
                status,
                t.op.kind(),
                t.op.slot_type(),
                change,
                t.reason
            );
        } else {
            let _ = writeln!(
                out,
                "   {:2}. {} {:18} {:30} {}",
                i + 1,
                status,
                t.op.kind(),
                t.op.slot_type(),
                change
            );
        }
    }
}

fn change_of(op: &Operation) -> String {
    match op {
        Operation::RenameSlotType { from, to, .. } | Operation::RenamePart { from, to, .. } => {
            format!("{from} -> {to}")
        }
        Operation::Prune { subtree, .. } => format!("{} below", subtree.len()),
        Operation::Inject { default_part, .. } => format!("-> {default_part}"),
        Operation::Replace { replacement, .. } => format!("-> {replacement}"),
        Operation::Retain { disposition, .. } => disposition.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
