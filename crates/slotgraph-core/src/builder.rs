//! # Graph Builder
//!
//! Ingests parsed donor files and produces a [`SlotGraph`].
//!
//! Donor files may arrive in any order. Declarations and references are
//! merged into nodes as they are seen; parent-child links are only queued
//! and resolved in [`GraphBuilder::build`], so the resulting tree does not
//! depend on file order.
//!
//! Bad input never aborts ingestion: malformed rows and files are skipped and
//! recorded as warnings on the graph.

use crate::graph::SlotGraph;
use crate::parser::PartParser;
use crate::primitives::{
    ALLOW_TYPES_COLUMN, DEFAULT_SLOT_COLUMNS, DENY_TYPES_COLUMN, HEADER_MARKERS,
    MAX_IDENTIFIER_LENGTH, MAX_SLOT_ROWS,
};
use crate::{GraphWarning, PartMap, PartRecord, RowCell, SlotGraphError, SlotRow, WarningKind};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// =============================================================================
// COLUMN LAYOUT
// =============================================================================

/// Column positions of a slot table, taken from its header row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Columns {
    slot_type: usize,
    default: Option<usize>,
    description: Option<usize>,
    allow_types: Option<usize>,
    deny_types: Option<usize>,
    width: usize,
}

impl Columns {
    fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let names: Vec<&str> = names.into_iter().collect();
        let find = |wanted: &str| names.iter().position(|n| *n == wanted);
        Self {
            slot_type: names
                .iter()
                .position(|n| HEADER_MARKERS.contains(n))
                .unwrap_or(0),
            default: find("default"),
            description: find("description"),
            allow_types: find(ALLOW_TYPES_COLUMN),
            deny_types: find(DENY_TYPES_COLUMN),
            width: names.len(),
        }
    }

    fn from_header(row: &SlotRow) -> Self {
        Self::from_names(row.iter().map(|cell| cell.as_text().unwrap_or("")))
    }
}

impl Default for Columns {
    fn default() -> Self {
        Self::from_names(DEFAULT_SLOT_COLUMNS)
    }
}

/// Check if a row is a header row.
fn is_header_row(row: &SlotRow) -> bool {
    row.first()
        .and_then(RowCell::as_text)
        .is_some_and(|first| HEADER_MARKERS.contains(&first))
}

/// A child entry after column interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChildEntry {
    slot_type: String,
    default: Option<String>,
    description: Option<String>,
    allow_types: BTreeSet<String>,
    deny_types: BTreeSet<String>,
    options: BTreeMap<String, RowCell>,
}

fn read_child_entry(
    row: &SlotRow,
    columns: &Columns,
    owner: Option<&str>,
) -> Result<ChildEntry, &'static str> {
    if row.is_empty() {
        return Err("empty row");
    }
    let slot_type = match row.get(columns.slot_type) {
        Some(RowCell::Text(s)) => s.trim(),
        Some(_) => return Err("slot type is not text"),
        None => return Err("row is shorter than its header"),
    };
    if slot_type.is_empty() {
        return Err("empty slot type");
    }
    if slot_type.len() > MAX_IDENTIFIER_LENGTH {
        return Err("slot type exceeds identifier length limit");
    }
    if owner == Some(slot_type) {
        return Err("slot references itself");
    }

    let text_at = |idx: Option<usize>| {
        idx.and_then(|i| row.get(i))
            .and_then(RowCell::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let set_at = |idx: Option<usize>| -> BTreeSet<String> {
        idx.and_then(|i| row.get(i))
            .map(|cell| cell.text_items().into_iter().collect())
            .unwrap_or_default()
    };

    let options = match row.last() {
        Some(RowCell::Options(map)) if row.len() > columns.width => map.clone(),
        _ => BTreeMap::new(),
    };

    Ok(ChildEntry {
        slot_type: slot_type.to_string(),
        default: text_at(columns.default).filter(|d| d.len() <= MAX_IDENTIFIER_LENGTH),
        description: text_at(columns.description),
        allow_types: set_at(columns.allow_types),
        deny_types: set_at(columns.deny_types),
        options,
    })
}

// =============================================================================
// PENDING LINKS
// =============================================================================

/// A queued parent-child reference.
///
/// Field order is the resolution order: children of one parent are listed by
/// the part that referenced them, then by row position.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PendingLink {
    parent: String,
    part: String,
    row: usize,
    child: String,
}

// =============================================================================
// GRAPH BUILDER
// =============================================================================

/// Builds a [`SlotGraph`] from donor files.
pub struct GraphBuilder {
    graph: SlotGraph,
    parser: Option<Box<dyn PartParser>>,
    links: BTreeSet<PendingLink>,
    conflicted: BTreeSet<String>,
}

impl GraphBuilder {
    /// Create a builder without a parser.
    ///
    /// Only [`add_donor_file`](Self::add_donor_file) is usable; loading from
    /// a path fails with [`SlotGraphError::ParserUnavailable`].
    #[must_use]
    pub fn new(target_context: impl Into<String>) -> Self {
        Self {
            graph: SlotGraph::new(target_context),
            parser: None,
            links: BTreeSet::new(),
            conflicted: BTreeSet::new(),
        }
    }

    /// Create a builder with an injected parser.
    ///
    /// Fails if the parser reports itself unavailable.
    pub fn with_parser(
        target_context: impl Into<String>,
        parser: Box<dyn PartParser>,
    ) -> Result<Self, SlotGraphError> {
        parser.check_available()?;
        tracing::debug!(parser = parser.name(), "parser available");
        let mut builder = Self::new(target_context);
        builder.parser = Some(parser);
        Ok(builder)
    }

    /// The graph under construction.
    #[must_use]
    pub fn graph(&self) -> &SlotGraph {
        &self.graph
    }

    /// Parse a donor file with the injected parser and ingest it.
    ///
    /// A malformed file is skipped with a warning and counts as zero entries.
    pub fn load_donor_file(&mut self, path: &Path) -> Result<usize, SlotGraphError> {
        let parser = self.parser.as_ref().ok_or_else(|| {
            SlotGraphError::ParserUnavailable("builder was created without a parser".to_string())
        })?;
        let source = path.display().to_string();
        match parser.parse(path) {
            Ok(parts) => Ok(self.add_donor_file(&source, &parts)),
            Err(SlotGraphError::MalformedFile { reason, .. }) => {
                self.graph.push_warning(GraphWarning::general(
                    WarningKind::MalformedFile,
                    format!("Skipped donor file {}: {}", source, reason),
                ));
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    /// Ingest one parsed donor file.
    ///
    /// Returns the number of slot entries processed (declarations plus
    /// child entries).
    pub fn add_donor_file(&mut self, source: &str, parts: &PartMap) -> usize {
        self.graph.add_donor_file(source);
        let mut entries = 0;
        for (part_name, part) in parts {
            entries += self.add_part(source, part_name, part);
        }
        tracing::debug!(source, parts = parts.len(), entries, "ingested donor file");
        entries
    }

    fn add_part(&mut self, source: &str, part_name: &str, part: &PartRecord) -> usize {
        let mut entries = 0;
        let owner = part
            .slot_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match owner {
            Some(slot) if slot.len() > MAX_IDENTIFIER_LENGTH => {
                self.graph.push_warning(GraphWarning::general(
                    WarningKind::MalformedSlotEntry,
                    format!("Part '{}' fills an over-long slot type", part_name),
                ));
                return 0;
            }
            Some(slot) => {
                self.declare(source, part_name, slot);
                entries += 1;
            }
            None => {}
        }

        let mut columns = Columns::default();
        for (row_idx, row) in part.slots.iter().enumerate() {
            if row_idx >= MAX_SLOT_ROWS {
                self.graph.push_warning(GraphWarning::general(
                    WarningKind::MalformedSlotEntry,
                    format!(
                        "Part '{}' has {} slot rows; rows past {} skipped",
                        part_name,
                        part.slots.len(),
                        MAX_SLOT_ROWS
                    ),
                ));
                break;
            }
            if is_header_row(row) {
                columns = Columns::from_header(row);
                continue;
            }
            match read_child_entry(row, &columns, owner) {
                Ok(entry) => {
                    self.reference(owner, part_name, row_idx, entry);
                    entries += 1;
                }
                Err(reason) => {
                    self.graph.push_warning(GraphWarning::general(
                        WarningKind::MalformedSlotEntry,
                        format!(
                            "Skipped slot row {} of part '{}': {}",
                            row_idx, part_name, reason
                        ),
                    ));
                }
            }
        }
        entries
    }

    /// Merge a declaration: `part_name` fills `slot_type`.
    fn declare(&mut self, source: &str, part_name: &str, slot_type: &str) {
        let (node, _) = self.graph.get_or_create(slot_type);
        if node.placeholder {
            node.placeholder = false;
            node.source_file = Some(source.to_string());
        }

        let conflict = if !node.default_declared {
            node.default_part = Some(part_name.to_string());
            node.default_declared = true;
            None
        } else if node.default_part.as_deref() != Some(part_name) {
            node.default_part.clone()
        } else {
            None
        };

        self.graph.index_part(part_name, slot_type);
        self.graph.index_source(source, slot_type);

        if let Some(kept) = conflict {
            self.conflict(
                slot_type,
                format!(
                    "Slot '{}' declared again by '{}' in {}; keeping '{}'",
                    slot_type,
                    part_name,
                    source,
                    kept
                ),
            );
        }
    }

    /// Merge a child entry of `part_name` and queue the link from its owner.
    fn reference(&mut self, owner: Option<&str>, part_name: &str, row: usize, entry: ChildEntry) {
        let (node, _) = self.graph.get_or_create(&entry.slot_type);

        if node.default_part.is_none() {
            node.default_part = entry.default;
        }
        if node.description.is_empty() {
            if let Some(description) = entry.description {
                node.description = description;
            }
        }
        for (key, value) in entry.options {
            node.options.entry(key).or_insert(value);
        }

        let mut conflict = false;
        for (current, incoming) in [
            (&mut node.allow_types, entry.allow_types),
            (&mut node.deny_types, entry.deny_types),
        ] {
            if incoming.is_empty() {
                continue;
            }
            if current.is_empty() {
                *current = incoming;
            } else if *current != incoming {
                conflict = true;
            }
        }

        if let Some(parent) = owner {
            node.referrers.insert(parent.to_string());
            self.links.insert(PendingLink {
                parent: parent.to_string(),
                part: part_name.to_string(),
                row,
                child: entry.slot_type.clone(),
            });
        }

        if conflict {
            self.conflict(
                &entry.slot_type,
                format!(
                    "Slot '{}' referenced by '{}' with different type filters; keeping the first",
                    entry.slot_type, part_name
                ),
            );
        }
    }

    /// Record at most one conflicting-declaration warning per slot.
    fn conflict(&mut self, slot_type: &str, message: String) {
        if self.conflicted.insert(slot_type.to_string()) {
            self.graph.push_warning(GraphWarning::for_slot(
                WarningKind::ConflictingDeclaration,
                slot_type,
                message,
            ));
        }
    }

    /// Resolve queued links, record reference warnings and pick the root.
    #[must_use]
    pub fn build(mut self) -> SlotGraph {
        self.resolve_parents();
        self.attach_children();
        self.record_reference_warnings();
        self.identify_root();

        tracing::info!(
            slots = self.graph.node_count(),
            edges = self.graph.edge_count(),
            files = self.graph.donor_files().len(),
            root = self.graph.root().unwrap_or(""),
            "built slot graph"
        );
        self.graph
    }

    /// For each node in key order, pick the smallest referrer that does not
    /// close a cycle.
    fn resolve_parents(&mut self) {
        let keys: Vec<String> = self.graph.slot_types().map(str::to_string).collect();
        for key in keys {
            let referrers: Vec<String> = self
                .graph
                .get(&key)
                .map(|n| n.referrers.iter().cloned().collect())
                .unwrap_or_default();

            let mut chosen = None;
            for referrer in referrers {
                if !self.graph.contains(&referrer) {
                    continue;
                }
                if self.graph.is_self_or_ancestor(&key, &referrer) {
                    self.graph.push_warning(GraphWarning::for_slot(
                        WarningKind::CycleRejected,
                        &key,
                        format!(
                            "Link '{}' -> '{}' would close a cycle; dropped",
                            referrer, key
                        ),
                    ));
                    continue;
                }
                chosen = Some(referrer);
                break;
            }
            if let Some(node) = self.graph.get_mut(&key) {
                node.parent = chosen;
            }
        }
    }

    /// Every link lands in the owner's reference list; only the resolved
    /// parent also gets the tree edge.
    fn attach_children(&mut self) {
        let links = std::mem::take(&mut self.links);
        for link in links {
            let is_parent = self
                .graph
                .get(&link.child)
                .is_some_and(|n| n.parent.as_deref() == Some(link.parent.as_str()));
            if let Some(owner) = self.graph.get_mut(&link.parent) {
                owner.add_reference(&link.child);
                if is_parent {
                    owner.add_child(&link.child);
                }
            }
        }
    }

    fn record_reference_warnings(&mut self) {
        let mut found = Vec::new();
        for node in self.graph.nodes() {
            if node.placeholder {
                found.push(GraphWarning::for_slot(
                    WarningKind::DanglingReference,
                    &node.slot_type,
                    format!("Slot '{}' is referenced but never declared", node.slot_type),
                ));
            }
            if node.is_shared() {
                found.push(GraphWarning::for_slot(
                    WarningKind::SharedReference,
                    &node.slot_type,
                    format!(
                        "Slot '{}' is referenced from {} slots: {:?}",
                        node.slot_type,
                        node.referrers.len(),
                        node.referrers
                    ),
                ));
            }
        }
        for warning in found {
            self.graph.push_warning(warning);
        }
    }

    fn identify_root(&mut self) {
        let mut candidates: Vec<(u64, String)> = self
            .graph
            .nodes()
            .filter(|n| n.parent.is_none())
            .map(|n| (n.seq(), n.slot_type.clone()))
            .collect();
        candidates.sort();

        let root = match candidates.as_slice() {
            [] => {
                self.graph.push_warning(GraphWarning::general(
                    WarningKind::MissingRoot,
                    "Slot graph has no root",
                ));
                None
            }
            [(_, only)] => Some(only.clone()),
            [(_, first), rest @ ..] => {
                let others: Vec<&str> = rest.iter().map(|(_, s)| s.as_str()).collect();
                self.graph.push_warning(GraphWarning::for_slot(
                    WarningKind::DuplicateRootCandidate,
                    first,
                    format!(
                        "Several parentless slots; using first-added '{}' over {:?}",
                        first, others
                    ),
                ));
                Some(first.clone())
            }
        };
        self.graph.set_root(root);
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{MemoryParser, UnavailableParser};

    fn parts(entries: Vec<(&str, PartRecord)>) -> PartMap {
        entries
            .into_iter()
            .map(|(name, part)| (name.to_string(), part))
            .collect()
    }

    fn warning_count(graph: &SlotGraph, kind: WarningKind) -> usize {
        graph.warnings().iter().filter(|w| w.kind == kind).count()
    }

    fn engine_file() -> PartMap {
        parts(vec![(
            "v8",
            PartRecord::filling("engine")
                .with_slot("radiator", "radiator_stock", "Radiator")
                .with_slot("intake", "intake_stock", "Intake"),
        )])
    }

    #[test]
    fn declaration_and_children_build_a_tree() {
        let mut builder = GraphBuilder::new("pickup");
        let count = builder.add_donor_file("engine.jbeam", &engine_file());
        assert_eq!(count, 3);

        let graph = builder.build();
        assert_eq!(graph.root(), Some("engine"));
        let engine = graph.get("engine").expect("engine");
        assert_eq!(engine.default_part.as_deref(), Some("v8"));
        assert_eq!(engine.children, vec!["radiator", "intake"]);
        assert_eq!(
            graph.get("intake").and_then(|n| n.parent.clone()).as_deref(),
            Some("engine")
        );
        assert_eq!(graph.slot_for_part("v8").map(|n| n.slot_type.as_str()), Some("engine"));
    }

    #[test]
    fn placeholders_are_filled_by_later_declarations() {
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("engine.jbeam", &engine_file());
        builder.add_donor_file(
            "intake.jbeam",
            &parts(vec![("intake_sport", PartRecord::filling("intake"))]),
        );
        let graph = builder.build();

        let intake = graph.get("intake").expect("intake");
        assert!(!intake.placeholder);
        assert_eq!(intake.default_part.as_deref(), Some("intake_sport"));
        assert_eq!(intake.source_file.as_deref(), Some("intake.jbeam"));
        assert_eq!(intake.description, "Intake");
        assert_eq!(warning_count(&graph, WarningKind::ConflictingDeclaration), 0);
        // radiator is still only referenced
        assert_eq!(warning_count(&graph, WarningKind::DanglingReference), 1);
    }

    #[test]
    fn duplicate_declaration_keeps_first_and_warns_once() {
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("a.jbeam", &parts(vec![("turbo_a", PartRecord::filling("turbo"))]));
        builder.add_donor_file("b.jbeam", &parts(vec![("turbo_b", PartRecord::filling("turbo"))]));
        builder.add_donor_file("c.jbeam", &parts(vec![("turbo_c", PartRecord::filling("turbo"))]));
        let graph = builder.build();

        assert_eq!(graph.node_count(), 1);
        let turbo = graph.get("turbo").expect("turbo");
        assert_eq!(turbo.default_part.as_deref(), Some("turbo_a"));
        assert_eq!(turbo.source_file.as_deref(), Some("a.jbeam"));
        assert_eq!(warning_count(&graph, WarningKind::ConflictingDeclaration), 1);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let part = PartRecord::filling("engine")
            .with_row(vec![])
            .with_row(vec![RowCell::Integer(3), RowCell::text("x")])
            .with_row(vec![RowCell::text(""), RowCell::text("x")])
            .with_row(vec![RowCell::text("engine"), RowCell::text("v8")])
            .with_slot("oilpan", "oilpan_stock", "Oil Pan");
        let mut builder = GraphBuilder::new("pickup");
        let count = builder.add_donor_file("engine.jbeam", &parts(vec![("v8", part)]));
        let graph = builder.build();

        assert_eq!(count, 2);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(warning_count(&graph, WarningKind::MalformedSlotEntry), 4);
        assert!(graph.get("engine").expect("engine").parent.is_none());
    }

    #[test]
    fn header_rows_remap_columns() {
        let part = PartRecord::filling("engine")
            .with_row(vec![
                RowCell::text("type"),
                RowCell::text("default"),
                RowCell::text("description"),
                RowCell::text("allowTypes"),
            ])
            .with_row(vec![
                RowCell::text("intake"),
                RowCell::text("intake_stock"),
                RowCell::text("Intake"),
                RowCell::List(vec![RowCell::text("street"), RowCell::text("race")]),
                RowCell::Options(BTreeMap::from([(
                    "coreSlot".to_string(),
                    RowCell::Flag(true),
                )])),
            ]);
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("engine.jbeam", &parts(vec![("v8", part)]));
        let graph = builder.build();

        let intake = graph.get("intake").expect("intake");
        assert_eq!(intake.allow_types.len(), 2);
        assert!(intake.allow_types.contains("race"));
        assert_eq!(intake.options.get("coreSlot"), Some(&RowCell::Flag(true)));
        assert_eq!(warning_count(&graph, WarningKind::MalformedSlotEntry), 0);
    }

    #[test]
    fn shared_reference_gets_smallest_referrer_as_parent() {
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file(
            "engine.jbeam",
            &parts(vec![
                (
                    "v8",
                    PartRecord::filling("engine")
                        .with_slot("intake", "intake_stock", "")
                        .with_slot("turbo", "turbo_stock", ""),
                ),
                ("intake_stock", PartRecord::filling("intake").with_slot("filter", "f", "")),
                ("turbo_stock", PartRecord::filling("turbo").with_slot("filter", "f", "")),
            ]),
        );
        let graph = builder.build();

        let filter = graph.get("filter").expect("filter");
        assert!(filter.is_shared());
        assert_eq!(filter.parent.as_deref(), Some("intake"));
        assert!(graph.get("turbo").expect("turbo").children.is_empty());
        assert_eq!(graph.get("turbo").expect("turbo").references, vec!["filter"]);
        assert_eq!(graph.get("intake").expect("intake").references, vec!["filter"]);
        assert_eq!(warning_count(&graph, WarningKind::SharedReference), 1);
        assert!(graph.validate().valid, "{:?}", graph.validate().errors);
    }

    #[test]
    fn redeclaration_warning_names_the_kept_part() {
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("a.jbeam", &parts(vec![("turbo_a", PartRecord::filling("turbo"))]));
        builder.add_donor_file("b.jbeam", &parts(vec![("turbo_b", PartRecord::filling("turbo"))]));
        let graph = builder.build();

        let warning = graph
            .warnings()
            .iter()
            .find(|w| w.kind == WarningKind::ConflictingDeclaration)
            .expect("conflict warning");
        assert_eq!(
            warning.message,
            "Slot 'turbo' declared again by 'turbo_b' in b.jbeam; keeping 'turbo_a'"
        );
    }

    #[test]
    fn cycles_are_rejected() {
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file(
            "loop.jbeam",
            &parts(vec![
                ("part_a", PartRecord::filling("a").with_slot("b", "part_b", "")),
                ("part_b", PartRecord::filling("b").with_slot("a", "part_a", "")),
            ]),
        );
        let graph = builder.build();

        assert!(graph.validate().valid);
        assert_eq!(warning_count(&graph, WarningKind::CycleRejected), 1);
        assert_eq!(graph.root(), Some("b"));
    }

    #[test]
    fn duplicate_roots_pick_first_added() {
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("one.jbeam", &parts(vec![("x", PartRecord::filling("zeta"))]));
        builder.add_donor_file("two.jbeam", &parts(vec![("y", PartRecord::filling("alpha"))]));
        let graph = builder.build();

        assert_eq!(graph.root(), Some("zeta"));
        assert_eq!(warning_count(&graph, WarningKind::DuplicateRootCandidate), 1);
    }

    #[test]
    fn empty_graph_has_no_root() {
        let graph = GraphBuilder::new("pickup").build();
        assert_eq!(graph.root(), None);
        assert_eq!(warning_count(&graph, WarningKind::MissingRoot), 1);
    }

    #[test]
    fn unavailable_parser_fails_construction() {
        let result = GraphBuilder::with_parser("pickup", Box::new(UnavailableParser));
        assert!(matches!(result, Err(SlotGraphError::ParserUnavailable(_))));
    }

    #[test]
    fn load_without_parser_fails() {
        let mut builder = GraphBuilder::new("pickup");
        let result = builder.load_donor_file(Path::new("engine.jbeam"));
        assert!(matches!(result, Err(SlotGraphError::ParserUnavailable(_))));
    }

    #[test]
    fn malformed_file_is_skipped_with_warning() {
        let parser = MemoryParser::new().with_file("engine.jbeam", engine_file());
        let mut builder =
            GraphBuilder::with_parser("pickup", Box::new(parser)).expect("parser available");

        assert_eq!(builder.load_donor_file(Path::new("engine.jbeam")).expect("load"), 3);
        assert_eq!(builder.load_donor_file(Path::new("broken.jbeam")).expect("load"), 0);

        let graph = builder.build();
        assert_eq!(graph.donor_files(), ["engine.jbeam".to_string()]);
        assert_eq!(warning_count(&graph, WarningKind::MalformedFile), 1);
    }
}
