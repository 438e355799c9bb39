//! # Pipeline
//!
//! Build → plan → execute in one place.
//!
//! The pipeline owns the compiled rule table and the target context; each run
//! produces a fresh [`SlotGraph`]. A failed plan leaves the graph as it was
//! built, so the caller may inspect it or throw it away and rebuild.

use crate::builder::GraphBuilder;
use crate::executor::TransformationExecutor;
use crate::graph::SlotGraph;
use crate::parser::PartParser;
use crate::planner::{PlanSummary, TransformationPlanner};
use crate::rules::{DispositionRules, RuleConfig};
use crate::{PartMap, SlotGraphError};
use serde::Serialize;
use std::path::Path;

/// Outcome of planning and executing one graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Operations in the plan.
    pub planned: usize,
    /// Operations applied by this execution.
    pub applied: usize,
    /// Operations rejected at execution time.
    pub rejected: usize,
    /// Plan counts and rename tables after execution.
    pub summary: PlanSummary,
}

/// Build, plan and execute with one rule table.
#[derive(Debug)]
pub struct Pipeline {
    target_context: String,
    rules: DispositionRules,
}

impl Pipeline {
    /// Compile the rule table for a target context.
    pub fn new(target_context: impl Into<String>, config: RuleConfig) -> Result<Self, SlotGraphError> {
        let target_context = target_context.into();
        if target_context.is_empty() {
            return Err(SlotGraphError::InvalidConfig(
                "target context must not be empty".to_string(),
            ));
        }
        Ok(Self {
            target_context,
            rules: DispositionRules::new(config)?,
        })
    }

    /// The target context every built graph is adapted to.
    #[must_use]
    pub fn target_context(&self) -> &str {
        &self.target_context
    }

    /// The compiled rule table.
    #[must_use]
    pub fn rules(&self) -> &DispositionRules {
        &self.rules
    }

    /// Build a graph by parsing donor files with `parser`.
    ///
    /// Fails up front if the parser is unavailable. Malformed files are
    /// skipped with a warning.
    pub fn build_graph<P: AsRef<Path>>(
        &self,
        parser: Box<dyn PartParser>,
        paths: &[P],
    ) -> Result<SlotGraph, SlotGraphError> {
        let mut builder = GraphBuilder::with_parser(self.target_context.clone(), parser)?;
        for path in paths {
            builder.load_donor_file(path.as_ref())?;
        }
        Ok(builder.build())
    }

    /// Build a graph from already parsed donor files.
    #[must_use]
    pub fn build_from_parts<'p, I>(&self, files: I) -> SlotGraph
    where
        I: IntoIterator<Item = (&'p str, &'p PartMap)>,
    {
        let mut builder = GraphBuilder::new(self.target_context.clone());
        for (source, parts) in files {
            builder.add_donor_file(source, parts);
        }
        builder.build()
    }

    /// Plan without executing. Returns the plan summary.
    pub fn plan(&self, graph: &mut SlotGraph) -> Result<PlanSummary, SlotGraphError> {
        let mut planner = TransformationPlanner::new(graph, &self.rules);
        planner.plan()?;
        Ok(planner.get_plan_summary())
    }

    /// Plan and execute against `graph`.
    ///
    /// On a planning error nothing is executed and the graph is unchanged.
    /// A graph that already carries a plan fails with
    /// [`SlotGraphError::AlreadyPlanned`].
    pub fn plan_and_execute(&self, graph: &mut SlotGraph) -> Result<RunReport, SlotGraphError> {
        let plan = TransformationPlanner::new(graph, &self.rules).plan()?;
        let planned = plan.len();
        let applied = TransformationExecutor::new(graph).execute_all();
        let summary = PlanSummary::from_graph(graph);
        let rejected = summary
            .by_status
            .get("rejected")
            .copied()
            .unwrap_or_default();

        tracing::info!(
            target_context = %self.target_context,
            planned,
            applied,
            rejected,
            "pipeline run complete"
        );
        Ok(RunReport {
            planned,
            applied,
            rejected,
            summary,
        })
    }

    /// Parse, build, plan and execute in one call.
    pub fn run<P: AsRef<Path>>(
        &self,
        parser: Box<dyn PartParser>,
        paths: &[P],
    ) -> Result<(SlotGraph, RunReport), SlotGraphError> {
        let mut graph = self.build_graph(parser, paths)?;
        let report = self.plan_and_execute(&mut graph)?;
        Ok((graph, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{MemoryParser, UnavailableParser};
    use crate::{PartRecord, SlotState};

    fn parser() -> MemoryParser {
        let engine: PartMap = [(
            "v8".to_string(),
            PartRecord::filling("engine").with_slot("intake", "intake_stock", "Intake"),
        )]
        .into_iter()
        .collect();
        let intake: PartMap = [("intake_stock".to_string(), PartRecord::filling("intake"))]
            .into_iter()
            .collect();
        MemoryParser::new()
            .with_file("engine.jbeam", engine)
            .with_file("intake.jbeam", intake)
    }

    #[test]
    fn run_builds_plans_and_executes() {
        let pipeline = Pipeline::new("pickup", RuleConfig::default()).expect("pipeline");
        let (graph, report) = pipeline
            .run(Box::new(parser()), &["engine.jbeam", "intake.jbeam"])
            .expect("run");

        assert_eq!(report.planned, report.applied);
        assert_eq!(report.rejected, 0);
        assert_eq!(
            graph.get("engine_pickup").map(|n| n.state()),
            Some(SlotState::Adapted)
        );
        assert_eq!(
            graph.get("intake").map(|n| n.state()),
            Some(SlotState::Preserved)
        );
    }

    #[test]
    fn second_execution_is_a_no_op() {
        let pipeline = Pipeline::new("pickup", RuleConfig::default()).expect("pipeline");
        let mut graph = pipeline
            .build_graph(Box::new(parser()), &["engine.jbeam", "intake.jbeam"])
            .expect("build");
        pipeline.plan_and_execute(&mut graph).expect("first");
        let before = graph.clone();

        let again = TransformationExecutor::new(&mut graph).execute_all();
        assert_eq!(again, 0);
        assert_eq!(graph, before);
    }

    #[test]
    fn executed_graph_cannot_be_planned_again() {
        let pipeline = Pipeline::new("pickup", RuleConfig::default()).expect("pipeline");
        let mut graph = pipeline
            .build_graph(Box::new(parser()), &["engine.jbeam", "intake.jbeam"])
            .expect("build");
        let report = pipeline.plan_and_execute(&mut graph).expect("first");
        let before = graph.clone();

        let result = pipeline.plan_and_execute(&mut graph);
        assert!(matches!(
            result,
            Err(SlotGraphError::AlreadyPlanned(n)) if n == report.planned
        ));
        assert_eq!(graph, before);
    }

    #[test]
    fn unavailable_parser_fails_the_build() {
        let pipeline = Pipeline::new("pickup", RuleConfig::default()).expect("pipeline");
        let result = pipeline.build_graph(Box::new(UnavailableParser), &["x"]);
        assert!(matches!(result, Err(SlotGraphError::ParserUnavailable(_))));
    }

    #[test]
    fn empty_target_context_is_rejected() {
        assert!(matches!(
            Pipeline::new("", RuleConfig::default()),
            Err(SlotGraphError::InvalidConfig(_))
        ));
    }
}
