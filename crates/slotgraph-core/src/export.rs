//! # Canonical Snapshot Export
//!
//! Deterministic, bit-exact serialization of a [`SlotGraph`].
//!
//! A snapshot is the reference form for comparing two graphs: two runs over
//! the same donor files and rules must produce identical bytes, and a plan
//! that fails validation must leave the snapshot of its graph unchanged.
//!
//! Everything is sorted before encoding. Discovery sequence numbers and
//! warnings are left out: both depend on the order donor files were fed in,
//! not on what the files say.

use crate::graph::{SlotGraph, SlotNode};
use crate::planner::Transformation;
use crate::{Disposition, RowCell, SlotGraphError, SlotState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// CANONICAL FORMAT
// =============================================================================

/// Magic bytes for the snapshot format.
pub const CANONICAL_MAGIC: [u8; 4] = *b"SGSN"; // Slot Graph SNapshot

/// Current snapshot format version.
pub const CANONICAL_VERSION: u8 = 1;

/// Maximum node count accepted on import.
pub const MAX_IMPORT_NODE_COUNT: u64 = 1_000_000;

/// Maximum edge count accepted on import.
pub const MAX_IMPORT_EDGE_COUNT: u64 = 4_000_000;

/// Header preceding the snapshot body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalHeader {
    /// Magic bytes identifying the format.
    pub magic: [u8; 4],

    /// Format version.
    pub version: u8,

    /// Number of nodes in the body.
    pub node_count: u64,

    /// Number of parent -> child edges in the body.
    pub edge_count: u64,

    /// Checksum of the encoded body.
    pub checksum: u64,
}

impl CanonicalHeader {
    /// Create a header for the given counts.
    #[must_use]
    pub fn new(node_count: u64, edge_count: u64, checksum: u64) -> Self {
        Self {
            magic: CANONICAL_MAGIC,
            version: CANONICAL_VERSION,
            node_count,
            edge_count,
            checksum,
        }
    }

    /// Check magic and version.
    pub fn validate(&self) -> Result<(), SlotGraphError> {
        if self.magic != CANONICAL_MAGIC {
            return Err(SlotGraphError::DeserializationError(
                "Invalid snapshot format".to_string(),
            ));
        }
        if self.version != CANONICAL_VERSION {
            return Err(SlotGraphError::DeserializationError(
                "Unsupported snapshot version".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CANONICAL NODE & GRAPH
// =============================================================================

/// A slot node in canonical form. Sorted by slot type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct CanonicalNode {
    pub slot_type: String,
    pub original_slot_type: String,
    pub default_part: Option<String>,
    pub description: String,
    pub options: BTreeMap<String, RowCell>,
    pub allow_types: Vec<String>,
    pub deny_types: Vec<String>,
    pub source_file: Option<String>,
    pub parent: Option<String>,
    /// Children keep their slot-table order; it is part of the output.
    pub children: Vec<String>,
    pub referrers: Vec<String>,
    /// Slot-table order, like `children`.
    pub references: Vec<String>,
    pub placeholder: bool,
    pub merged_into: Option<String>,
    pub replaced_by: Option<String>,
    pub target_slot_type: Option<String>,
    pub target_part_name: Option<String>,
    pub default_declared: bool,
    pub disposition: Option<Disposition>,
    pub state: SlotState,
}

impl From<&SlotNode> for CanonicalNode {
    fn from(node: &SlotNode) -> Self {
        Self {
            slot_type: node.slot_type.clone(),
            original_slot_type: node.original_slot_type.clone(),
            default_part: node.default_part.clone(),
            description: node.description.clone(),
            options: node.options.clone(),
            allow_types: node.allow_types.iter().cloned().collect(),
            deny_types: node.deny_types.iter().cloned().collect(),
            source_file: node.source_file.clone(),
            parent: node.parent.clone(),
            children: node.children.clone(),
            referrers: node.referrers.iter().cloned().collect(),
            references: node.references.clone(),
            placeholder: node.placeholder,
            merged_into: node.merged_into.clone(),
            replaced_by: node.replaced_by.clone(),
            target_slot_type: node.target_slot_type.clone(),
            target_part_name: node.target_part_name.clone(),
            default_declared: node.default_declared,
            disposition: node.disposition(),
            state: node.state(),
        }
    }
}

/// A slot graph in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanonicalGraph {
    pub target_context: String,

    /// Nodes sorted by slot type.
    pub nodes: Vec<CanonicalNode>,

    /// Part index sorted by part name.
    pub parts: Vec<(String, String)>,

    /// Provenance index sorted by file.
    pub sources: Vec<(String, Vec<String>)>,

    pub root: Option<String>,

    /// Donor files, sorted.
    pub donor_files: Vec<String>,

    pub merge_targets: Vec<String>,
    pub slot_type_map: Vec<(String, String)>,
    pub part_name_map: Vec<(String, String)>,

    /// The plan in execution order, with per-operation status.
    pub transformations: Vec<Transformation>,
}

impl CanonicalGraph {
    /// Canonical form of a graph.
    #[must_use]
    pub fn from_graph(graph: &SlotGraph) -> Self {
        // the arena is a BTreeMap, so nodes already come out sorted
        let nodes: Vec<CanonicalNode> = graph.nodes().map(CanonicalNode::from).collect();

        let mut donor_files = graph.donor_files().to_vec();
        donor_files.sort();

        Self {
            target_context: graph.target_context().to_string(),
            nodes,
            parts: graph
                .parts()
                .map(|(p, s)| (p.to_string(), s.to_string()))
                .collect(),
            sources: graph
                .source_files()
                .map(|(f, slots)| (f.to_string(), slots.to_vec()))
                .collect(),
            root: graph.root().map(str::to_string),
            donor_files,
            merge_targets: graph.merge_targets().iter().cloned().collect(),
            slot_type_map: pairs(graph.slot_type_map()),
            part_name_map: pairs(graph.part_name_map()),
            transformations: graph.transformations().to_vec(),
        }
    }

    /// Rebuild a graph from this canonical form.
    #[must_use]
    pub fn to_graph(&self) -> SlotGraph {
        SlotGraph::from_canonical(self)
    }

    /// Number of parent -> child edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.children.len()).sum()
    }
}

fn pairs(map: &BTreeMap<String, String>) -> Vec<(String, String)> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// FNV-1a over the encoded body.
///
/// Detects accidental corruption only. Use the `crypto-hash` feature for a
/// collision-resistant digest.
fn checksum_bytes(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    data.iter().fold(OFFSET, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(PRIME)
    })
}

fn encode_body(canonical: &CanonicalGraph) -> Result<Vec<u8>, SlotGraphError> {
    postcard::to_allocvec(canonical)
        .map_err(|e| SlotGraphError::SerializationError(format!("Body: {}", e)))
}

// =============================================================================
// EXPORT FUNCTIONS
// =============================================================================

/// Export a graph as a canonical snapshot.
///
/// Layout:
/// ```text
/// [header_len: u32 LE] [CanonicalHeader (postcard)] [CanonicalGraph (postcard)]
/// ```
pub fn export_canonical(graph: &SlotGraph) -> Result<Vec<u8>, SlotGraphError> {
    let canonical = CanonicalGraph::from_graph(graph);
    let body = encode_body(&canonical)?;
    let header = CanonicalHeader::new(
        canonical.nodes.len() as u64,
        canonical.edge_count() as u64,
        checksum_bytes(&body),
    );
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| SlotGraphError::SerializationError(format!("Header: {}", e)))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| SlotGraphError::SerializationError("Header too large".to_string()))?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + body.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Import a graph from a canonical snapshot.
///
/// The header is validated and the size limits checked before the body is
/// decoded.
pub fn import_canonical(data: &[u8]) -> Result<SlotGraph, SlotGraphError> {
    let Some((len_bytes, rest)) = data.split_first_chunk::<4>() else {
        return Err(SlotGraphError::DeserializationError(
            "Data too short".to_string(),
        ));
    };
    let header_len = u32::from_le_bytes(*len_bytes) as usize;
    if rest.len() < header_len {
        return Err(SlotGraphError::DeserializationError(
            "Data too short for header".to_string(),
        ));
    }
    let (header_bytes, body) = rest.split_at(header_len);

    let header: CanonicalHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| SlotGraphError::DeserializationError(format!("Header: {}", e)))?;
    header.validate()?;

    if header.node_count > MAX_IMPORT_NODE_COUNT {
        return Err(SlotGraphError::DeserializationError(format!(
            "Node count {} exceeds maximum allowed {}",
            header.node_count, MAX_IMPORT_NODE_COUNT
        )));
    }
    if header.edge_count > MAX_IMPORT_EDGE_COUNT {
        return Err(SlotGraphError::DeserializationError(format!(
            "Edge count {} exceeds maximum allowed {}",
            header.edge_count, MAX_IMPORT_EDGE_COUNT
        )));
    }

    let computed = checksum_bytes(body);
    if computed != header.checksum {
        return Err(SlotGraphError::DeserializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }

    let canonical: CanonicalGraph = postcard::from_bytes(body)
        .map_err(|e| SlotGraphError::DeserializationError(format!("Body: {}", e)))?;
    if canonical.nodes.len() as u64 != header.node_count {
        return Err(SlotGraphError::DeserializationError(
            "Node count mismatch".to_string(),
        ));
    }
    if canonical.edge_count() as u64 != header.edge_count {
        return Err(SlotGraphError::DeserializationError(
            "Edge count mismatch".to_string(),
        ));
    }

    Ok(canonical.to_graph())
}

/// Whether a graph matches a snapshot.
pub fn verify_canonical(graph: &SlotGraph, snapshot: &[u8]) -> Result<bool, SlotGraphError> {
    let imported = import_canonical(snapshot)?;
    Ok(CanonicalGraph::from_graph(graph) == CanonicalGraph::from_graph(&imported))
}

/// Checksum of a graph's canonical body.
pub fn canonical_checksum(graph: &SlotGraph) -> Result<u64, SlotGraphError> {
    let body = encode_body(&CanonicalGraph::from_graph(graph))?;
    Ok(checksum_bytes(&body))
}

// =============================================================================
// CRYPTOGRAPHIC HASH SUPPORT
// =============================================================================

/// BLAKE3 digest of a graph's snapshot, as 64 hex characters.
#[cfg(feature = "crypto-hash")]
pub fn canonical_crypto_hash(graph: &SlotGraph) -> Result<String, SlotGraphError> {
    let data = export_canonical(graph)?;
    Ok(blake3::hash(&data).to_hex().to_string())
}

/// Whether a graph's snapshot digest equals `expected_hash`.
#[cfg(feature = "crypto-hash")]
pub fn verify_crypto_hash(graph: &SlotGraph, expected_hash: &str) -> Result<bool, SlotGraphError> {
    Ok(canonical_crypto_hash(graph)? == expected_hash)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::executor::TransformationExecutor;
    use crate::planner::TransformationPlanner;
    use crate::rules::{DispositionRules, RuleConfig};
    use crate::{PartMap, PartRecord};

    fn engine_file() -> PartMap {
        [
            (
                "v8",
                PartRecord::filling("engine")
                    .with_slot("radiator", "radiator_stock", "Radiator")
                    .with_slot("intake", "intake_stock", "Intake"),
            ),
            ("radiator_stock", PartRecord::filling("radiator")),
            ("intake_stock", PartRecord::filling("intake")),
        ]
        .into_iter()
        .map(|(n, p)| (n.to_string(), p))
        .collect()
    }

    fn built() -> SlotGraph {
        let mut builder = GraphBuilder::new("pickup");
        builder.add_donor_file("engine.jbeam", &engine_file());
        builder.build()
    }

    fn executed() -> SlotGraph {
        let mut graph = built();
        let rules = DispositionRules::new(RuleConfig::default()).expect("rules");
        TransformationPlanner::new(&mut graph, &rules).plan().expect("plan");
        TransformationExecutor::new(&mut graph).execute_all();
        graph
    }

    #[test]
    fn export_is_deterministic() {
        let a = export_canonical(&executed()).expect("export");
        let b = export_canonical(&executed()).expect("export");
        assert_eq!(a, b, "snapshots must be bit-identical");
    }

    #[test]
    fn roundtrip_preserves_canonical_form() {
        let graph = executed();
        let bytes = export_canonical(&graph).expect("export");
        let imported = import_canonical(&bytes).expect("import");

        assert_eq!(imported.node_count(), graph.node_count());
        assert_eq!(imported.edge_count(), graph.edge_count());
        assert_eq!(imported.slot_type_map(), graph.slot_type_map());
        assert_eq!(imported.get("engine_pickup").and_then(|n| n.disposition()), Some(Disposition::Adapt));
        assert!(verify_canonical(&graph, &bytes).expect("verify"));
    }

    #[test]
    fn imported_graph_keeps_executed_state() {
        let bytes = export_canonical(&executed()).expect("export");
        let mut imported = import_canonical(&bytes).expect("import");

        // every op is already applied, so nothing runs again
        assert_eq!(TransformationExecutor::new(&mut imported).execute_all(), 0);
        assert!(imported.validate().valid);
    }

    #[test]
    fn verify_detects_a_different_graph() {
        let bytes = export_canonical(&built()).expect("export");
        assert!(!verify_canonical(&executed(), &bytes).expect("verify"));
    }

    #[test]
    fn donor_file_order_does_not_matter() {
        let radiator: PartMap = [("radiator_stock".to_string(), PartRecord::filling("radiator"))]
            .into_iter()
            .collect();
        let mut engine = engine_file();
        engine.remove("radiator_stock");

        let mut first = GraphBuilder::new("pickup");
        first.add_donor_file("engine.jbeam", &engine);
        first.add_donor_file("radiator.jbeam", &radiator);

        let mut second = GraphBuilder::new("pickup");
        second.add_donor_file("radiator.jbeam", &radiator);
        second.add_donor_file("engine.jbeam", &engine);

        assert_eq!(
            export_canonical(&first.build()).expect("export"),
            export_canonical(&second.build()).expect("export")
        );
    }

    #[test]
    fn corrupted_body_is_rejected() {
        let mut bytes = export_canonical(&executed()).expect("export");
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        assert!(import_canonical(&bytes).is_err());
    }

    #[test]
    fn truncated_data_is_rejected() {
        assert!(matches!(
            import_canonical(&[]),
            Err(SlotGraphError::DeserializationError(_))
        ));
        assert!(import_canonical(&[0x01, 0x02, 0x03]).is_err());
        assert!(import_canonical(&[0xFF, 0x00, 0x00, 0x00, 0x01]).is_err());
    }

    #[test]
    fn header_validation() {
        assert!(CanonicalHeader::new(3, 2, 0).validate().is_ok());

        let bad_magic = CanonicalHeader {
            magic: *b"XXXX",
            ..CanonicalHeader::new(0, 0, 0)
        };
        assert!(bad_magic.validate().is_err());

        let bad_version = CanonicalHeader {
            version: 99,
            ..CanonicalHeader::new(0, 0, 0)
        };
        assert!(bad_version.validate().is_err());
    }

    #[test]
    fn oversized_header_counts_are_rejected() {
        let header = CanonicalHeader::new(MAX_IMPORT_NODE_COUNT + 1, 0, 0);
        let header_bytes = postcard::to_allocvec(&header).expect("encode");
        let mut data = (header_bytes.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&header_bytes);

        let err = import_canonical(&data).expect_err("must fail");
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn empty_graph_roundtrip() {
        let graph = SlotGraph::new("pickup");
        let bytes = export_canonical(&graph).expect("export");
        let imported = import_canonical(&bytes).expect("import");
        assert_eq!(imported.node_count(), 0);
        assert_eq!(imported.target_context(), "pickup");
    }

    #[test]
    fn checksum_tracks_content() {
        let a = canonical_checksum(&built()).expect("checksum");
        let b = canonical_checksum(&executed()).expect("checksum");
        assert_eq!(a, canonical_checksum(&built()).expect("checksum"));
        assert_ne!(a, b);
    }

    #[cfg(feature = "crypto-hash")]
    #[test]
    fn crypto_hash_verifies() {
        let graph = executed();
        let digest = canonical_crypto_hash(&graph).expect("hash");
        assert_eq!(digest.len(), 64);
        assert!(verify_crypto_hash(&graph, &digest).expect("verify"));
        assert!(!verify_crypto_hash(&built(), &digest).expect("verify"));
    }
}
