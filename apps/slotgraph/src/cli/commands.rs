//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::AppConfig;
use crate::json_parser::{JsonPartParser, cell_to_json, part_to_json};
use serde::Serialize;
use slotgraph_core::{
    AssetRole, Disposition, GraphWriter, ManifestGenerator, Pipeline, RunReport, SlotGraph,
    SlotGraphError, TransformationPlanner, TreeFormat, TreeOptions, canonical_checksum,
    canonical_crypto_hash, export_canonical, render_tree, verify_canonical, verify_crypto_hash,
};
use std::path::{Path, PathBuf};

// =============================================================================
// FILE HELPERS
// =============================================================================

/// Maximum snapshot file size for verification (256 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Resolve an input path and make sure it is a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, SlotGraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        SlotGraphError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;
    if !canonical.is_file() {
        return Err(SlotGraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Resolve an output file path whose parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, SlotGraphError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let canonical_parent = validate_output_dir(parent)?;
    let filename = path
        .file_name()
        .ok_or_else(|| SlotGraphError::IoError("Output path has no filename".to_string()))?;
    Ok(canonical_parent.join(filename))
}

/// Resolve an existing output directory.
fn validate_output_dir(dir: &Path) -> Result<PathBuf, SlotGraphError> {
    let canonical = dir.canonicalize().map_err(|e| {
        SlotGraphError::IoError(format!("Invalid output directory '{}': {}", dir.display(), e))
    })?;
    if !canonical.is_dir() {
        return Err(SlotGraphError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            dir.display()
        )));
    }
    Ok(canonical)
}

fn write_file(path: &Path, data: &[u8]) -> Result<(), SlotGraphError> {
    std::fs::write(path, data)
        .map_err(|e| SlotGraphError::IoError(format!("Write '{}': {}", path.display(), e)))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, SlotGraphError> {
    serde_json::to_string_pretty(value).map_err(|e| SlotGraphError::SerializationError(e.to_string()))
}

// =============================================================================
// PIPELINE HELPERS
// =============================================================================

/// Load the configuration and compile the rule table.
pub fn load_pipeline(
    config: Option<&Path>,
    target: Option<&str>,
) -> Result<Pipeline, SlotGraphError> {
    let config = AppConfig::load(config)?;
    let target = config.resolve_target(target)?;
    Pipeline::new(target, config.rules)
}

fn validated_inputs(files: &[PathBuf]) -> Result<Vec<PathBuf>, SlotGraphError> {
    files.iter().map(|f| validate_file_path(f)).collect()
}

/// Parse donor files into a graph without planning.
pub fn build_graph(pipeline: &Pipeline, files: &[PathBuf]) -> Result<SlotGraph, SlotGraphError> {
    let paths = validated_inputs(files)?;
    tracing::info!(files = paths.len(), target = pipeline.target_context(), "building slot graph");
    pipeline.build_graph(Box::new(JsonPartParser::new()), &paths)
}

/// Parse, plan and execute.
pub fn run_pipeline(
    pipeline: &Pipeline,
    files: &[PathBuf],
) -> Result<(SlotGraph, RunReport), SlotGraphError> {
    let mut graph = build_graph(pipeline, files)?;
    let report = pipeline.plan_and_execute(&mut graph)?;
    Ok((graph, report))
}

fn print_warnings(graph: &SlotGraph) {
    if graph.warnings().is_empty() {
        return;
    }
    println!();
    println!("Warnings ({}):", graph.warnings().len());
    for warning in graph.warnings() {
        println!("  {}", warning);
    }
}

// =============================================================================
// PLAN COMMAND
// =============================================================================

/// Show the plan without applying it.
pub fn cmd_plan(
    pipeline: &Pipeline,
    files: &[PathBuf],
    explain: Option<&str>,
    json_mode: bool,
) -> Result<(), SlotGraphError> {
    let mut graph = build_graph(pipeline, files)?;
    let summary = pipeline.plan(&mut graph)?;
    let explanation = explain
        .map(|slot| TransformationPlanner::new(&mut graph, pipeline.rules()).explain(slot))
        .transpose()?;

    if json_mode {
        let warnings: Vec<String> = graph.warnings().iter().map(ToString::to_string).collect();
        let output = serde_json::json!({
            "target_context": pipeline.target_context(),
            "summary": summary,
            "operations": graph.transformations(),
            "warnings": warnings,
            "explanation": explanation,
        });
        println!("{}", to_json(&output)?);
        return Ok(());
    }

    println!("Slot Graph Plan ({})", pipeline.target_context());
    println!("=====================");
    println!("Slots:      {}", graph.node_count());
    println!("Operations: {}", summary.total_operations);
    for (kind, count) in &summary.by_operation {
        println!("  {:<18} {}", kind, count);
    }
    println!();
    for t in graph.transformations() {
        println!("  {:<18} {:<32} {}", t.op.kind(), t.op.slot_type(), t.reason);
    }
    if !summary.slot_renames.is_empty() {
        println!();
        println!("Slot renames:");
        for (from, to) in &summary.slot_renames {
            println!("  {} -> {}", from, to);
        }
    }
    if !summary.part_renames.is_empty() {
        println!();
        println!("Part renames:");
        for (from, to) in &summary.part_renames {
            println!("  {} -> {}", from, to);
        }
    }
    if let Some(e) = explanation {
        println!();
        println!("Explain {}:", e.slot_type);
        println!("  Role:        {:?}", e.role);
        println!("  Disposition: {} ({})", e.disposition, e.reason);
        if let Some(target) = &e.target_slot_type {
            println!("  Slot type -> {}", target);
        }
        if let Some(target) = &e.target_part_name {
            println!("  Default   -> {}", target);
        }
        println!("  Referrers:   {}", e.referrers);
    }
    print_warnings(&graph);
    Ok(())
}

// =============================================================================
// ADAPT COMMAND
// =============================================================================

/// Build, plan and execute; emit the manifest and adapted parts.
pub fn cmd_adapt(
    pipeline: &Pipeline,
    files: &[PathBuf],
    output: Option<&Path>,
    json_mode: bool,
) -> Result<(), SlotGraphError> {
    let output = output.map(validate_output_dir).transpose()?;
    let (graph, report) = run_pipeline(pipeline, files)?;
    let manifest = ManifestGenerator::new(&graph).generate();

    if let Some(dir) = output {
        let parts = adapted_parts(&graph)?;
        write_file(&dir.join("manifest.json"), to_json(&manifest)?.as_bytes())?;
        write_file(&dir.join("parts.json"), to_json(&parts)?.as_bytes())?;
        tracing::info!(dir = %dir.display(), parts = parts.len(), "wrote adapted output");
    }

    if json_mode {
        println!("{}", to_json(&manifest)?);
        return Ok(());
    }

    let stats = &manifest.statistics;
    println!("Adapted for {}", manifest.target_context);
    println!("===============");
    println!("Operations: {} applied, {} rejected", report.applied, report.rejected);
    println!(
        "Slots:      {} total, {} active, {} pruned, {} renamed",
        stats.total_slots, stats.active_slots, stats.pruned_slots, stats.renamed_slots
    );
    println!("Valid:      {}", manifest.validation.valid);
    println!();
    println!("Copy plan:");
    for f in &manifest.copy_plan.original_files {
        println!("  copy      {}", f.path);
    }
    for f in &manifest.copy_plan.generated_files {
        println!("  generate  {}", f.path);
    }
    for f in &manifest.copy_plan.excluded_files {
        println!("  exclude   {} ({})", f.path, f.reason);
    }
    for error in &manifest.validation.errors {
        println!("  error: {}", error);
    }
    print_warnings(&graph);
    Ok(())
}

/// Every part whose slot survives, under its adapted name.
fn adapted_parts(
    graph: &SlotGraph,
) -> Result<serde_json::Map<String, serde_json::Value>, SlotGraphError> {
    let writer = GraphWriter::new(graph);
    let mut out = serde_json::Map::new();
    for (part, slot) in graph.parts() {
        if !writer.should_include_slot(slot) {
            continue;
        }
        let (name, record) = writer.generate_part(part)?;
        out.insert(name, part_to_json(&record));
    }
    Ok(out)
}

// =============================================================================
// SLOTS COMMAND
// =============================================================================

/// Show the adapted slot table of one part.
pub fn cmd_slots(
    pipeline: &Pipeline,
    files: &[PathBuf],
    part: &str,
    json_mode: bool,
) -> Result<(), SlotGraphError> {
    let (graph, _) = run_pipeline(pipeline, files)?;
    let writer = GraphWriter::new(&graph);
    let rows = writer.generate_slots_section(part)?;

    if json_mode {
        let rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| serde_json::Value::Array(row.iter().map(cell_to_json).collect()))
            .collect();
        println!("{}", to_json(&rows)?);
        return Ok(());
    }

    println!("Slots of {}", writer.get_adapted_part_name(part));
    for row in &rows {
        let cells: Vec<String> = row.iter().map(|c| cell_to_json(c).to_string()).collect();
        println!("  {}", cells.join(" | "));
    }
    Ok(())
}

// =============================================================================
// TREE COMMAND
// =============================================================================

/// Flags of the `tree` command.
#[derive(Debug, Clone, Default)]
pub struct TreeArgs {
    /// Stop after planning.
    pub plan_only: bool,
    /// Markdown instead of console text.
    pub markdown: bool,
    /// Show declaring donor files.
    pub show_files: bool,
    /// Append the transformation history.
    pub history: bool,
    /// Asset role filter tag.
    pub role: Option<String>,
    /// Disposition filter tag.
    pub disposition: Option<String>,
}

/// Draw the slot tree of a planned or adapted graph.
pub fn cmd_tree(
    pipeline: &Pipeline,
    files: &[PathBuf],
    args: &TreeArgs,
    json_mode: bool,
) -> Result<(), SlotGraphError> {
    let options = TreeOptions {
        show_source_files: args.show_files,
        show_transformations: args.history,
        filter_role: args.role.as_deref().map(str::parse::<AssetRole>).transpose()?,
        filter_disposition: args
            .disposition
            .as_deref()
            .map(str::parse::<Disposition>)
            .transpose()?,
        format: if args.markdown {
            TreeFormat::Markdown
        } else {
            TreeFormat::Text
        },
    };
    let graph = if args.plan_only {
        let mut graph = build_graph(pipeline, files)?;
        pipeline.plan(&mut graph)?;
        graph
    } else {
        run_pipeline(pipeline, files)?.0
    };
    let tree = render_tree(&graph, &options);

    if json_mode {
        let output = serde_json::json!({
            "target_context": pipeline.target_context(),
            "tree": tree,
        });
        println!("{}", to_json(&output)?);
        return Ok(());
    }
    print!("{}", tree);
    Ok(())
}

// =============================================================================
// SNAPSHOT COMMAND
// =============================================================================

/// Write the canonical snapshot of the adapted graph.
pub fn cmd_snapshot(
    pipeline: &Pipeline,
    files: &[PathBuf],
    output: &Path,
) -> Result<(), SlotGraphError> {
    let output = validate_output_path(output)?;
    let (graph, _) = run_pipeline(pipeline, files)?;

    let data = export_canonical(&graph)?;
    write_file(&output, &data)?;

    println!("Checksum: {}", canonical_checksum(&graph)?);
    println!("BLAKE3:   {}", canonical_crypto_hash(&graph)?);
    println!("Exported {} bytes to {:?}", data.len(), output);
    Ok(())
}

// =============================================================================
// VERIFY COMMAND
// =============================================================================

/// Verify the adapted graph against a snapshot file and/or a BLAKE3 hash.
pub fn cmd_verify(
    pipeline: &Pipeline,
    files: &[PathBuf],
    snapshot: Option<&Path>,
    hash: Option<&str>,
) -> Result<(), SlotGraphError> {
    if snapshot.is_none() && hash.is_none() {
        return Err(SlotGraphError::InvalidConfig(
            "verify needs --snapshot or --hash".to_string(),
        ));
    }
    let (graph, _) = run_pipeline(pipeline, files)?;

    if let Some(path) = snapshot {
        let path = validate_file_path(path)?;
        let size = std::fs::metadata(&path)
            .map_err(|e| SlotGraphError::IoError(format!("Cannot read file metadata: {}", e)))?
            .len();
        if size > MAX_SNAPSHOT_FILE_SIZE {
            return Err(SlotGraphError::DeserializationError(format!(
                "File size {} bytes exceeds maximum allowed {} bytes",
                size, MAX_SNAPSHOT_FILE_SIZE
            )));
        }
        let data = std::fs::read(&path)
            .map_err(|e| SlotGraphError::IoError(format!("Read '{}': {}", path.display(), e)))?;
        if !verify_canonical(&graph, &data)? {
            return Err(SlotGraphError::SerializationError(format!(
                "Snapshot {:?} does not match the adapted graph",
                path
            )));
        }
        println!("Snapshot: OK");
    }

    if let Some(expected) = hash {
        if !verify_crypto_hash(&graph, expected)? {
            return Err(SlotGraphError::SerializationError(
                "BLAKE3 hash does not match the adapted graph".to_string(),
            ));
        }
        println!("BLAKE3:   OK");
    }
    Ok(())
}
