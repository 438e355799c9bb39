//! # Configuration
//!
//! TOML configuration for the CLI.
//!
//! ```toml
//! target = "pickup"
//!
//! [rules]
//! prune_slots = ["radiator"]
//! merge_targets = ["turbo"]
//!
//! [rules.rename_slots]
//! turbo_v6 = "turbo"
//!
//! [rules.replace_slots.Camso_engine_structure]
//! replacement_type = "Camso_engine_mesh"
//! description = "Engine Mesh"
//! core_slot = true
//! ```
//!
//! Every key is optional and unknown keys are ignored.

use serde::Deserialize;
use slotgraph_core::{RuleConfig, SlotGraphError};
use std::path::Path;

/// Maximum configuration file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// The CLI configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Target context, overridden by `--target`.
    pub target: Option<String>,
    /// Disposition and naming rules.
    pub rules: RuleConfig,
}

impl AppConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, SlotGraphError> {
        toml::from_str(text).map_err(|e| SlotGraphError::InvalidConfig(e.to_string()))
    }

    /// Load a configuration file. No path means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, SlotGraphError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let metadata = std::fs::metadata(path).map_err(|e| {
            SlotGraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(SlotGraphError::InvalidConfig(format!(
                "Config size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            SlotGraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        let config = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// The target context: the command line wins over the file.
    pub fn resolve_target(&self, cli_target: Option<&str>) -> Result<String, SlotGraphError> {
        cli_target
            .map(str::to_string)
            .or_else(|| self.target.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                SlotGraphError::InvalidConfig(
                    "no target context: pass --target or set `target` in the config".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = AppConfig::from_toml("").expect("parse");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn rules_table_is_read() {
        let config = AppConfig::from_toml(
            r#"
            target = "pickup"
            unknown_key = 1

            [rules]
            prune_slots = ["radiator"]
            merge_targets = ["turbo"]
            naming_suffix = "_truck"

            [rules.rename_slots]
            turbo_v6 = "turbo"

            [[rules.inject_slots]]
            slot_type = "pickup_enginemounts"
            description = "Engine Mounts"
            "#,
        )
        .expect("parse");

        assert_eq!(config.target.as_deref(), Some("pickup"));
        assert_eq!(config.rules.prune_slots, vec!["radiator".to_string()]);
        assert!(config.rules.merge_targets.contains("turbo"));
        assert_eq!(config.rules.naming_suffix.as_deref(), Some("_truck"));
        assert_eq!(
            config.rules.rename_slots.get("turbo_v6").map(String::as_str),
            Some("turbo")
        );
        assert_eq!(config.rules.inject_slots.len(), 1);
    }

    #[test]
    fn replacement_table_is_read() {
        let config = AppConfig::from_toml(
            r#"
            [rules.replace_slots.gearbox_frame]
            replacement_type = "gearbox_mesh"
            default_part = "gearbox_mesh_stock"
            core_slot = true
            "#,
        )
        .expect("parse");

        let spec = config.rules.replace_slots.get("gearbox_frame").expect("entry");
        assert_eq!(spec.replacement_type, "gearbox_mesh");
        assert_eq!(spec.default_part.as_deref(), Some("gearbox_mesh_stock"));
        assert!(spec.core_slot);
        assert!(spec.description.is_empty());
    }

    #[test]
    fn bad_toml_is_invalid_config() {
        assert!(matches!(
            AppConfig::from_toml("rules = ["),
            Err(SlotGraphError::InvalidConfig(_))
        ));
    }

    #[test]
    fn cli_target_overrides_file() {
        let config = AppConfig {
            target: Some("pickup".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.resolve_target(Some("van")).expect("target"), "van");
        assert_eq!(config.resolve_target(None).expect("target"), "pickup");
        assert!(AppConfig::default().resolve_target(None).is_err());
    }
}
