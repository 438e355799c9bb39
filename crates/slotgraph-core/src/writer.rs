//! # Graph Writer
//!
//! Read-only projection of an executed graph into donor-format slot tables.

use crate::graph::{SlotGraph, SlotNode};
use crate::primitives::DEFAULT_SLOT_COLUMNS;
use crate::{Disposition, PartRecord, RowCell, SlotGraphError, SlotRow};

/// Emits slot tables and name lookups from final graph state.
pub struct GraphWriter<'a> {
    graph: &'a SlotGraph,
}

impl<'a> GraphWriter<'a> {
    /// Create a writer over a graph.
    #[must_use]
    pub fn new(graph: &'a SlotGraph) -> Self {
        Self { graph }
    }

    /// Slot type after renames. Unknown names pass through.
    #[must_use]
    pub fn get_adapted_slot_type(&self, original: &str) -> String {
        self.graph
            .slot_type_map()
            .get(original)
            .cloned()
            .unwrap_or_else(|| original.to_string())
    }

    /// Part name after renames. Unknown names pass through.
    #[must_use]
    pub fn get_adapted_part_name(&self, original: &str) -> String {
        self.graph
            .part_name_map()
            .get(original)
            .cloned()
            .unwrap_or_else(|| original.to_string())
    }

    /// Whether a slot belongs in the output.
    ///
    /// Unknown slots pass through. Pruned slots, slots under a pruned
    /// ancestor and replaced extraction-only slots are dropped.
    #[must_use]
    pub fn should_include_slot(&self, slot_type: &str) -> bool {
        let current = self.get_adapted_slot_type(slot_type);
        match self.graph.get(&current).or_else(|| self.graph.resolve(slot_type)) {
            Some(node) => self.is_written(node),
            None => true,
        }
    }

    fn is_written(&self, node: &SlotNode) -> bool {
        node.merged_into.is_none()
            && node.replaced_by.is_none()
            && !self.graph.is_pruned(&node.slot_type)
    }

    fn owning_slot(&self, part_name: &str) -> Result<&'a SlotNode, SlotGraphError> {
        let graph: &'a SlotGraph = self.graph;
        graph
            .slot_for_part(part_name)
            .or_else(|| graph.slot_for_part(&self.get_adapted_part_name(part_name)))
            .ok_or_else(|| SlotGraphError::SlotNotFound(part_name.to_string()))
    }

    /// Every live slot the node references, shared ones included: injected
    /// slots first, then the rest in slot-table order.
    fn live_children(&self, node: &SlotNode) -> Vec<&'a SlotNode> {
        let graph: &'a SlotGraph = self.graph;
        let children: Vec<&SlotNode> = node
            .references
            .iter()
            .filter_map(|c| graph.get(c))
            .filter(|c| self.is_written(c))
            .collect();
        let (mut injected, rest): (Vec<_>, Vec<_>) = children
            .into_iter()
            .partition(|c| c.disposition() == Some(Disposition::Inject));
        injected.extend(rest);
        injected
    }

    fn slot_row(node: &SlotNode) -> SlotRow {
        let mut row = vec![
            RowCell::text(node.slot_type.clone()),
            RowCell::text(node.default_part.clone().unwrap_or_default()),
            RowCell::text(node.description.clone()),
        ];
        if !node.options.is_empty() {
            row.push(RowCell::Options(node.options.clone()));
        }
        row
    }

    /// Slot table of a part: a header row, then one row per live slot
    /// referenced by the slot the part fills.
    ///
    /// Accepts the part's current or original name.
    pub fn generate_slots_section(&self, part_name: &str) -> Result<Vec<SlotRow>, SlotGraphError> {
        let owner = self.owning_slot(part_name)?;
        let header: SlotRow = DEFAULT_SLOT_COLUMNS.iter().map(|c| RowCell::text(*c)).collect();
        let mut rows = vec![header];
        rows.extend(self.live_children(owner).into_iter().map(Self::slot_row));
        Ok(rows)
    }

    /// The adapted record of a part: its current slot type and slot table.
    pub fn generate_part(&self, part_name: &str) -> Result<(String, PartRecord), SlotGraphError> {
        let owner = self.owning_slot(part_name)?;
        let name = self.get_adapted_part_name(part_name);
        let record = PartRecord {
            slot_type: Some(owner.slot_type.clone()),
            slots: self.generate_slots_section(part_name)?,
        };
        Ok((name, record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::executor::TransformationExecutor;
    use crate::planner::TransformationPlanner;
    use crate::rules::{DispositionRules, InjectSpec, RuleConfig};
    use crate::{PartMap, PartRecord};
    use std::collections::BTreeMap;

    fn executed(config: RuleConfig) -> SlotGraph {
        let parts: PartMap = [
            (
                "v8",
                PartRecord::filling("engine")
                    .with_slot("radiator", "radiator_stock", "Radiator")
                    .with_row(vec![
                        RowCell::text("intake"),
                        RowCell::text("intake_stock"),
                        RowCell::text("Intake"),
                        RowCell::Options(BTreeMap::from([(
                            "coreSlot".to_string(),
                            RowCell::Flag(true),
                        )])),
                    ]),
            ),
            ("radiator_stock", PartRecord::filling("radiator")),
            ("intake_stock", PartRecord::filling("intake")),
        ]
        .into_iter()
        .map(|(name, part)| (name.to_string(), part))
        .collect();
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("engine.jbeam", &parts);
        let mut graph = builder.build();
        let rules = DispositionRules::new(config).expect("rules");
        TransformationPlanner::new(&mut graph, &rules).plan().expect("plan");
        TransformationExecutor::new(&mut graph).execute_all();
        graph
    }

    #[test]
    fn section_lists_live_children_with_current_names() {
        let graph = executed(RuleConfig {
            prune_slots: vec!["radiator".to_string()],
            ..RuleConfig::default()
        });
        let writer = GraphWriter::new(&graph);
        let rows = writer.generate_slots_section("pickup_v8").expect("section");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0].as_text(), Some("type"));
        assert_eq!(rows[1][0].as_text(), Some("intake"));
        assert_eq!(rows[1].len(), 4);

        // original part name resolves through the rename table
        assert_eq!(writer.generate_slots_section("v8").expect("section"), rows);
    }

    #[test]
    fn injected_children_come_first() {
        let graph = executed(RuleConfig {
            inject_slots: vec![InjectSpec {
                slot_type: "pickup_enginemounts".to_string(),
                description: "Engine Mounts".to_string(),
                ..InjectSpec::default()
            }],
            ..RuleConfig::default()
        });
        let rows = GraphWriter::new(&graph)
            .generate_slots_section("pickup_v8")
            .expect("section");
        let order: Vec<_> = rows.iter().skip(1).filter_map(|r| r[0].as_text()).collect();
        assert_eq!(order, vec!["pickup_enginemounts", "radiator_pickup", "intake"]);
    }

    #[test]
    fn lookups_never_fail() {
        let graph = executed(RuleConfig {
            prune_slots: vec!["radiator".to_string()],
            ..RuleConfig::default()
        });
        let writer = GraphWriter::new(&graph);
        assert_eq!(writer.get_adapted_slot_type("engine"), "engine_pickup");
        assert_eq!(writer.get_adapted_slot_type("unknown"), "unknown");
        assert_eq!(writer.get_adapted_part_name("v8"), "pickup_v8");
        assert_eq!(writer.get_adapted_part_name("nope"), "nope");

        assert!(writer.should_include_slot("engine"));
        assert!(writer.should_include_slot("intake"));
        assert!(!writer.should_include_slot("radiator"));
        assert!(writer.should_include_slot("unknown"));
    }

    #[test]
    fn unknown_part_is_not_found() {
        let graph = executed(RuleConfig::default());
        let result = GraphWriter::new(&graph).generate_slots_section("ghost");
        assert!(matches!(result, Err(SlotGraphError::SlotNotFound(_))));
    }

    #[test]
    fn generate_part_uses_adapted_names() {
        let graph = executed(RuleConfig::default());
        let (name, record) = GraphWriter::new(&graph).generate_part("v8").expect("part");
        assert_eq!(name, "pickup_v8");
        assert_eq!(record.slot_type.as_deref(), Some("engine_pickup"));
        assert_eq!(record.slots.len(), 3);
    }

    #[test]
    fn shared_slot_is_listed_by_every_referrer() {
        let parts: PartMap = [
            (
                "v8",
                PartRecord::filling("engine")
                    .with_slot("intake", "i", "")
                    .with_slot("turbo", "t", ""),
            ),
            ("i", PartRecord::filling("intake").with_slot("filter", "f", "")),
            ("t", PartRecord::filling("turbo").with_slot("filter", "f", "")),
            ("f", PartRecord::filling("filter")),
        ]
        .into_iter()
        .map(|(name, part)| (name.to_string(), part))
        .collect();
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("engine.jbeam", &parts);
        let mut graph = builder.build();
        let rules = DispositionRules::new(RuleConfig {
            preserve_slots: vec!["filter".to_string()],
            ..RuleConfig::default()
        })
        .expect("rules");
        TransformationPlanner::new(&mut graph, &rules).plan().expect("plan");
        TransformationExecutor::new(&mut graph).execute_all();

        let writer = GraphWriter::new(&graph);
        for part in ["i", "t"] {
            let rows = writer.generate_slots_section(part).expect("section");
            let names: Vec<_> = rows.iter().skip(1).filter_map(|r| r[0].as_text()).collect();
            assert_eq!(names, vec!["filter"], "section of {part}");
        }
    }

    #[test]
    fn replaced_source_is_left_out() {
        let parts: PartMap = [
            (
                "v8",
                PartRecord::filling("engine")
                    .with_slot("Camso_engine_structure_ec8ba", "structure", "")
                    .with_slot("intake", "intake_stock", ""),
            ),
            ("structure", PartRecord::filling("Camso_engine_structure_ec8ba")),
            ("intake_stock", PartRecord::filling("intake")),
        ]
        .into_iter()
        .map(|(name, part)| (name.to_string(), part))
        .collect();
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("engine.jbeam", &parts);
        let mut graph = builder.build();
        let rules = DispositionRules::new(RuleConfig::default()).expect("rules");
        TransformationPlanner::new(&mut graph, &rules).plan().expect("plan");
        TransformationExecutor::new(&mut graph).execute_all();

        let writer = GraphWriter::new(&graph);
        assert!(!writer.should_include_slot("Camso_engine_structure_ec8ba"));
        assert!(writer.should_include_slot("Camso_engine_mesh_ec8ba"));
        let rows = writer.generate_slots_section("v8").expect("section");
        let names: Vec<_> = rows.iter().skip(1).filter_map(|r| r[0].as_text()).collect();
        assert_eq!(names, vec!["Camso_engine_mesh_ec8ba", "intake"]);
    }
}
