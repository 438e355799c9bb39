//! # JSON Donor Parser
//!
//! [`PartParser`] over JSON donor files.
//!
//! A donor file is an object of part records:
//!
//! ```json
//! {
//!   "v8": {
//!     "slotType": "engine",
//!     "slots": [
//!       ["type", "default", "description"],
//!       ["intake", "intake_stock", "Intake", {"coreSlot": true}]
//!     ]
//!   }
//! }
//! ```
//!
//! Keys other than `slotType` and `slots` are ignored. Cells are converted
//! leniently: numbers that are not integers are kept as their text form.

use slotgraph_core::{PartMap, PartParser, PartRecord, RowCell, SlotGraphError, SlotRow};
use std::collections::BTreeMap;
use std::path::Path;

/// Maximum donor file size (16 MB).
pub const MAX_DONOR_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Parses JSON donor files.
#[derive(Debug, Clone)]
pub struct JsonPartParser {
    max_file_size: u64,
}

impl Default for JsonPartParser {
    fn default() -> Self {
        Self {
            max_file_size: MAX_DONOR_FILE_SIZE,
        }
    }
}

impl JsonPartParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the file size limit.
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Convert parsed JSON into part records.
    pub fn parse_value(value: &serde_json::Value) -> Result<PartMap, String> {
        let object = value
            .as_object()
            .ok_or_else(|| "top level is not an object".to_string())?;

        let mut parts = PartMap::new();
        for (name, record) in object {
            let Some(record) = record.as_object() else {
                return Err(format!("part '{}' is not an object", name));
            };
            let slot_type = match record.get("slotType") {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(_) => return Err(format!("part '{}' has a non-string slotType", name)),
            };
            let slots: Vec<SlotRow> = match record.get("slots") {
                None | Some(serde_json::Value::Null) => Vec::new(),
                Some(serde_json::Value::Array(rows)) => rows
                    .iter()
                    .map(|row| match row {
                        serde_json::Value::Array(cells) => cells.iter().map(json_to_cell).collect(),
                        // kept as a one-cell row; the builder reports it
                        other => vec![json_to_cell(other)],
                    })
                    .collect(),
                Some(_) => return Err(format!("part '{}' has a non-array slots table", name)),
            };
            parts.insert(name.clone(), PartRecord { slot_type, slots });
        }
        Ok(parts)
    }
}

impl PartParser for JsonPartParser {
    fn name(&self) -> &str {
        "json"
    }

    fn check_available(&self) -> Result<(), SlotGraphError> {
        if self.max_file_size == 0 {
            return Err(SlotGraphError::ParserUnavailable(
                "json parser configured with a zero size limit".to_string(),
            ));
        }
        Ok(())
    }

    fn parse(&self, path: &Path) -> Result<PartMap, SlotGraphError> {
        let malformed = |reason: String| SlotGraphError::MalformedFile {
            path: path.display().to_string(),
            reason,
        };

        let metadata = std::fs::metadata(path)
            .map_err(|e| SlotGraphError::IoError(format!("{}: {}", path.display(), e)))?;
        if metadata.len() > self.max_file_size {
            return Err(malformed(format!(
                "file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                self.max_file_size
            )));
        }

        let contents = std::fs::read(path)
            .map_err(|e| SlotGraphError::IoError(format!("{}: {}", path.display(), e)))?;
        let value: serde_json::Value =
            serde_json::from_slice(&contents).map_err(|e| malformed(e.to_string()))?;
        let parts = Self::parse_value(&value).map_err(malformed)?;
        tracing::debug!(path = %path.display(), parts = parts.len(), "parsed donor file");
        Ok(parts)
    }
}

/// Convert a JSON value into a slot table cell.
#[must_use]
pub fn json_to_cell(value: &serde_json::Value) -> RowCell {
    match value {
        serde_json::Value::Null => RowCell::Empty,
        serde_json::Value::Bool(b) => RowCell::Flag(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => RowCell::Integer(i),
            None => RowCell::Text(n.to_string()),
        },
        serde_json::Value::String(s) => RowCell::Text(s.clone()),
        serde_json::Value::Array(items) => RowCell::List(items.iter().map(json_to_cell).collect()),
        serde_json::Value::Object(map) => RowCell::Options(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_cell(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

/// Convert a slot table cell back into JSON.
#[must_use]
pub fn cell_to_json(cell: &RowCell) -> serde_json::Value {
    match cell {
        RowCell::Empty => serde_json::Value::Null,
        RowCell::Flag(b) => serde_json::Value::Bool(*b),
        RowCell::Integer(i) => serde_json::Value::from(*i),
        RowCell::Text(s) => serde_json::Value::String(s.clone()),
        RowCell::List(items) => serde_json::Value::Array(items.iter().map(cell_to_json).collect()),
        RowCell::Options(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), cell_to_json(v)))
                .collect(),
        ),
    }
}

/// A part record as donor-format JSON.
#[must_use]
pub fn part_to_json(part: &PartRecord) -> serde_json::Value {
    let slots: Vec<serde_json::Value> = part
        .slots
        .iter()
        .map(|row| serde_json::Value::Array(row.iter().map(cell_to_json).collect()))
        .collect();
    serde_json::json!({
        "slotType": part.slot_type,
        "slots": slots,
    })
}
