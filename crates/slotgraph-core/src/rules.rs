//! # Disposition Rules
//!
//! Pure policy: `(node, target context, rule table) -> Disposition`, plus the
//! naming functions that turn donor names into target names.
//!
//! The rule table is built once from a [`RuleConfig`] and passed explicitly to
//! the planner. There is no global registry.
//!
//! ## Precedence
//!
//! 1. Explicit prune list
//! 2. Explicit preserve list
//! 3. Explicit force-adapt list
//! 4. Explicit slot rename (`rename_slots`) -> `RemapDefault`
//! 5. Undeclared placeholder -> `RemapDefault`
//! 6. Role: primary -> `Adapt`, accessory -> `Preserve`, other -> `RemapDefault`
//!
//! List entries match exactly or suffix-agnostically (see
//! [`extract_slot_suffix`]).
//!
//! ## Replacements
//!
//! A slot matching a `replace_slots` entry is read for extraction only. A
//! replacement slot carrying the source's hash suffix is injected next to it
//! and takes its place in the output. [`default_replacements`] are always
//! present; configured entries override them per key.

use crate::graph::SlotNode;
use crate::primitives::{MAX_HASH_SUFFIX_LEN, MIN_HASH_SUFFIX_LEN};
use crate::{Disposition, RowCell, SlotGraphError, SlotRole};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SUFFIX HELPERS
// =============================================================================

/// Split a trailing hash suffix off a slot identifier.
///
/// A suffix is the last `_`-separated segment when it is 4 to 8 ASCII
/// alphanumerics containing at least one digit (`Camso_Intake_3813e`).
/// Plain words such as `_engine` are not suffixes.
#[must_use]
pub fn extract_slot_suffix(identifier: &str) -> (&str, Option<&str>) {
    let Some((base, suffix)) = identifier.rsplit_once('_') else {
        return (identifier, None);
    };
    let is_hash = !base.is_empty()
        && (MIN_HASH_SUFFIX_LEN..=MAX_HASH_SUFFIX_LEN).contains(&suffix.len())
        && suffix.chars().all(|c| c.is_ascii_alphanumeric())
        && suffix.chars().any(|c| c.is_ascii_digit());
    if is_hash {
        (base, Some(suffix))
    } else {
        (identifier, None)
    }
}

/// Re-attach a suffix to a base identifier.
#[must_use]
pub fn apply_slot_suffix(base: &str, suffix: Option<&str>) -> String {
    match suffix {
        Some(s) if !s.is_empty() => format!("{}_{}", base, s),
        _ => base.to_string(),
    }
}

/// Case-insensitive match of a slot type against a base name, ignoring any
/// hash suffix on the slot type.
#[must_use]
pub fn match_slot_base(slot_type: &str, pattern_base: &str) -> bool {
    let (base, _) = extract_slot_suffix(slot_type);
    base.eq_ignore_ascii_case(pattern_base) || slot_type.eq_ignore_ascii_case(pattern_base)
}

// =============================================================================
// RULE CONFIGURATION
// =============================================================================

/// A slot to add for the target context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectSpec {
    /// Slot type to create.
    pub slot_type: String,
    /// Default part; falls back to the slot type itself.
    pub default_part: Option<String>,
    /// Description of the new slot row.
    pub description: String,
    /// Parent slot; falls back to the root.
    pub parent: Option<String>,
}

/// Stand-in for an extraction-only slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementSpec {
    /// Base slot type of the replacement.
    pub replacement_type: String,
    /// Default part base; falls back to the replacement slot type.
    pub default_part: Option<String>,
    /// Description of the replacement row.
    pub description: String,
    /// Mark the replacement row with `coreSlot`.
    pub core_slot: bool,
}

/// A replacement resolved against one source slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    /// Replacement slot type, source suffix applied.
    pub slot_type: String,
    /// Default part, source suffix applied.
    pub default_part: String,
    /// Description of the replacement row.
    pub description: String,
    /// Options cell of the replacement row.
    pub options: BTreeMap<String, RowCell>,
}

/// Caller-supplied policy. All keys are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// Slots to remove with their exclusively-owned subtrees.
    pub prune_slots: Vec<String>,
    /// Slots to keep untouched.
    pub preserve_slots: Vec<String>,
    /// Slots to adapt regardless of role.
    pub force_adapt_slots: Vec<String>,
    /// Regexes classifying primary slots. Empty uses the built-in set.
    pub primary_patterns: Vec<String>,
    /// Regexes classifying accessory slots. Empty uses the built-in set.
    pub accessory_patterns: Vec<String>,
    /// Prepended to renamed slot types.
    pub naming_prefix: String,
    /// Appended to renamed slot types. `None` means `_<target_context>`.
    pub naming_suffix: Option<String>,
    /// Prepended to renamed parts. `None` means `<target_context>_`.
    pub part_prefix: Option<String>,
    /// Explicit slot renames, original -> target.
    pub rename_slots: BTreeMap<String, String>,
    /// Explicit part renames, original -> target.
    pub rename_parts: BTreeMap<String, String>,
    /// Targets where many-to-one renames are intentional merges.
    pub merge_targets: BTreeSet<String>,
    /// Slots to add for the target context.
    pub inject_slots: Vec<InjectSpec>,
    /// Mount slot injected under the root when missing.
    pub mount_slot_type: Option<String>,
    /// Extraction-only slots by base type, and what replaces them.
    pub replace_slots: BTreeMap<String, ReplacementSpec>,
}

/// Replacements that apply unless overridden.
#[must_use]
pub fn default_replacements() -> BTreeMap<String, ReplacementSpec> {
    BTreeMap::from([(
        "Camso_engine_structure".to_string(),
        ReplacementSpec {
            replacement_type: "Camso_engine_mesh".to_string(),
            default_part: None,
            description: "Engine Mesh".to_string(),
            core_slot: true,
        },
    )])
}

/// Built-in primary (engine/transmission/transfer-case class) patterns.
pub const DEFAULT_PRIMARY_PATTERNS: [&str; 3] = [
    r"(^|_)engine$",
    r"(^|_)transmission$",
    r"(^|_)transfer_?case$",
];

/// Built-in accessory patterns.
pub const DEFAULT_ACCESSORY_PATTERNS: [&str; 14] = [
    r"(^|_)intake",
    r"(^|_)engine_?management",
    r"(^|_)engine_?internals",
    r"(^|_)engine_?mesh",
    r"(^|_)engine_?structure",
    r"(^|_)turbo",
    r"(^|_)supercharger",
    r"(^|_)balancing_?mass",
    r"(^|_)rev_?limiter",
    r"(^|_)nitrous",
    r"(^|_)exhaust",
    r"(^|_)differential",
    r"(^|_)driveshaft",
    r"(^|_)tuning",
];

// =============================================================================
// DISPOSITION RULES
// =============================================================================

/// A disposition with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// The chosen disposition.
    pub disposition: Disposition,
    /// Which rule fired.
    pub reason: String,
}

/// Compiled rule table.
#[derive(Debug, Clone)]
pub struct DispositionRules {
    config: RuleConfig,
    primary: Vec<Regex>,
    accessory: Vec<Regex>,
    replacements: BTreeMap<String, ReplacementSpec>,
}

fn compile(patterns: &[String], defaults: &[&str]) -> Result<Vec<Regex>, SlotGraphError> {
    let sources: Vec<&str> = if patterns.is_empty() {
        defaults.to_vec()
    } else {
        patterns.iter().map(String::as_str).collect()
    };
    sources
        .into_iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| SlotGraphError::InvalidConfig(format!("pattern '{}': {}", p, e)))
        })
        .collect()
}

fn listed(list: &[String], slot_type: &str) -> bool {
    list.iter()
        .any(|entry| entry == slot_type || match_slot_base(slot_type, entry))
}

impl DispositionRules {
    /// Compile a rule table.
    pub fn new(config: RuleConfig) -> Result<Self, SlotGraphError> {
        let primary = compile(&config.primary_patterns, &DEFAULT_PRIMARY_PATTERNS)?;
        let accessory = compile(&config.accessory_patterns, &DEFAULT_ACCESSORY_PATTERNS)?;
        for spec in &config.inject_slots {
            if spec.slot_type.trim().is_empty() {
                return Err(SlotGraphError::InvalidConfig(
                    "inject_slots entry without slot_type".to_string(),
                ));
            }
        }
        let mut replacements = default_replacements();
        for (source, spec) in &config.replace_slots {
            if spec.replacement_type.trim().is_empty() {
                return Err(SlotGraphError::InvalidConfig(format!(
                    "replace_slots entry '{}' without replacement_type",
                    source
                )));
            }
            replacements.insert(source.clone(), spec.clone());
        }
        Ok(Self {
            config,
            primary,
            accessory,
            replacements,
        })
    }

    /// The configuration this table was built from.
    #[must_use]
    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    /// Classify a slot type by role.
    ///
    /// Patterns are tried against the full name and the suffix-free base.
    #[must_use]
    pub fn classify_role(&self, slot_type: &str) -> SlotRole {
        let (base, _) = extract_slot_suffix(slot_type);
        let hit = |set: &[Regex]| set.iter().any(|r| r.is_match(slot_type) || r.is_match(base));
        if hit(&self.primary) {
            SlotRole::Primary
        } else if hit(&self.accessory) {
            SlotRole::Accessory
        } else {
            SlotRole::Other
        }
    }

    /// Decide a disposition and report which rule fired.
    #[must_use]
    pub fn decide(&self, node: &SlotNode) -> Decision {
        let slot = node.original_slot_type.as_str();
        let decision = |disposition, reason: &str| Decision {
            disposition,
            reason: reason.to_string(),
        };

        if listed(&self.config.prune_slots, slot) {
            return decision(Disposition::Prune, "listed in prune_slots");
        }
        if listed(&self.config.preserve_slots, slot) {
            return decision(Disposition::Preserve, "listed in preserve_slots");
        }
        if listed(&self.config.force_adapt_slots, slot) {
            return decision(Disposition::Adapt, "listed in force_adapt_slots");
        }
        if self.explicit_slot_rename(slot).is_some() {
            return decision(Disposition::RemapDefault, "listed in rename_slots");
        }
        if node.placeholder {
            return decision(Disposition::RemapDefault, "referenced but never declared");
        }
        match self.classify_role(slot) {
            SlotRole::Primary => decision(Disposition::Adapt, "primary role"),
            SlotRole::Accessory => decision(Disposition::Preserve, "accessory role"),
            SlotRole::Other => decision(Disposition::RemapDefault, "no rule matched"),
        }
    }

    /// Decide a disposition for a node.
    ///
    /// Pure: the same node and rule table always give the same answer.
    #[must_use]
    pub fn determine_disposition(&self, node: &SlotNode, target_context: &str) -> Disposition {
        let decision = self.decide(node);
        tracing::trace!(
            slot = %node.slot_type,
            target_context,
            disposition = %decision.disposition,
            reason = %decision.reason,
            "disposition"
        );
        decision.disposition
    }

    fn explicit_slot_rename(&self, slot_type: &str) -> Option<String> {
        if let Some(target) = self.config.rename_slots.get(slot_type) {
            return Some(target.clone());
        }
        let (base, suffix) = extract_slot_suffix(slot_type);
        self.config
            .rename_slots
            .get(base)
            .map(|target| apply_slot_suffix(target, suffix))
    }

    /// Target name for a slot type.
    #[must_use]
    pub fn target_slot_type(&self, slot_type: &str, target_context: &str) -> String {
        if let Some(target) = self.explicit_slot_rename(slot_type) {
            return target;
        }
        let suffix = match &self.config.naming_suffix {
            Some(s) => s.clone(),
            None => format!("_{}", target_context),
        };
        format!("{}{}{}", self.config.naming_prefix, slot_type, suffix)
    }

    /// Explicit part rename, if one is configured.
    #[must_use]
    pub fn explicit_part_rename(&self, part_name: &str) -> Option<&str> {
        self.config.rename_parts.get(part_name).map(String::as_str)
    }

    /// Target name for a part.
    #[must_use]
    pub fn target_part_name(&self, part_name: &str, target_context: &str) -> String {
        if let Some(target) = self.explicit_part_rename(part_name) {
            return target.to_string();
        }
        match &self.config.part_prefix {
            Some(prefix) => format!("{}{}", prefix, part_name),
            None => format!("{}_{}", target_context, part_name),
        }
    }

    /// Whether many-to-one renames into `target` are intentional.
    #[must_use]
    pub fn is_merge_target(&self, target: &str) -> bool {
        self.config.merge_targets.contains(target)
    }

    /// Replacement for an extraction-only slot, matched on the suffix-free
    /// base first, then on the full name.
    #[must_use]
    pub fn replacement_for(&self, slot_type: &str) -> Option<Replacement> {
        let (base, suffix) = extract_slot_suffix(slot_type);
        let spec = self
            .replacements
            .get(base)
            .or_else(|| self.replacements.get(slot_type))?;
        let replacement = apply_slot_suffix(spec.replacement_type.trim(), suffix);
        let default_part = match spec.default_part.as_deref() {
            Some(part) => apply_slot_suffix(extract_slot_suffix(part).0, suffix),
            None => replacement.clone(),
        };
        let mut options = BTreeMap::new();
        if spec.core_slot {
            options.insert("coreSlot".to_string(), RowCell::Flag(true));
        }
        Some(Replacement {
            slot_type: replacement,
            default_part,
            description: spec.description.clone(),
            options,
        })
    }

    /// Whether a slot is read for extraction only.
    #[must_use]
    pub fn has_replacement(&self, slot_type: &str) -> bool {
        self.replacement_for(slot_type).is_some()
    }

    /// Slots to inject, including the mount slot when configured.
    #[must_use]
    pub fn injections(&self) -> Vec<InjectSpec> {
        let mut specs = self.config.inject_slots.clone();
        if let Some(mount) = &self.config.mount_slot_type {
            if !specs.iter().any(|s| &s.slot_type == mount) {
                specs.push(InjectSpec {
                    slot_type: mount.clone(),
                    default_part: None,
                    description: "Engine Mounts".to_string(),
                    parent: None,
                });
            }
        }
        specs
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn declared(slot_type: &str) -> SlotNode {
        let mut node = SlotNode::new(slot_type, 0);
        node.placeholder = false;
        node
    }

    fn rules(config: RuleConfig) -> DispositionRules {
        DispositionRules::new(config).expect("valid config")
    }

    #[test]
    fn suffix_requires_digit_and_length() {
        assert_eq!(
            extract_slot_suffix("Camso_engine_structure_ec8ba"),
            ("Camso_engine_structure", Some("ec8ba"))
        );
        assert_eq!(extract_slot_suffix("Camso_Intake_3813e"), ("Camso_Intake", Some("3813e")));
        assert_eq!(extract_slot_suffix("Camso_Engine"), ("Camso_Engine", None));
        assert_eq!(extract_slot_suffix("pickup_engine"), ("pickup_engine", None));
        assert_eq!(extract_slot_suffix("turbo_v8"), ("turbo_v8", None));
        assert_eq!(extract_slot_suffix("_1234"), ("_1234", None));
        assert_eq!(extract_slot_suffix("intake_a1b2c3d4e"), ("intake_a1b2c3d4e", None));
    }

    #[test]
    fn apply_and_match_suffix() {
        assert_eq!(apply_slot_suffix("Camso_engine_mesh", Some("ec8ba")), "Camso_engine_mesh_ec8ba");
        assert_eq!(apply_slot_suffix("Camso_Engine", None), "Camso_Engine");
        assert!(match_slot_base("Camso_Intake_3813e", "camso_intake"));
        assert!(match_slot_base("Camso_Intake", "Camso_Intake"));
        assert!(!match_slot_base("Camso_Intake_3813e", "Camso_Turbo"));
    }

    #[test]
    fn explicit_lists_take_precedence() {
        let r = rules(RuleConfig {
            prune_slots: vec!["engine".to_string()],
            preserve_slots: vec!["engine".to_string(), "Camso_Turbo".to_string()],
            force_adapt_slots: vec!["radio".to_string()],
            ..RuleConfig::default()
        });
        assert_eq!(r.determine_disposition(&declared("engine"), "pickup"), Disposition::Prune);
        assert_eq!(
            r.determine_disposition(&declared("Camso_Turbo_a1b2c"), "pickup"),
            Disposition::Preserve
        );
        assert_eq!(r.determine_disposition(&declared("radio"), "pickup"), Disposition::Adapt);
    }

    #[test]
    fn role_defaults() {
        let r = rules(RuleConfig::default());
        assert_eq!(r.classify_role("Camso_Engine"), SlotRole::Primary);
        assert_eq!(r.classify_role("Camso_Engine_3813e"), SlotRole::Primary);
        assert_eq!(r.classify_role("Camso_TransferCase"), SlotRole::Primary);
        assert_eq!(r.classify_role("Camso_EngineManagement_3813e"), SlotRole::Accessory);
        assert_eq!(r.classify_role("intake"), SlotRole::Accessory);
        assert_eq!(r.classify_role("radiator"), SlotRole::Other);

        assert_eq!(r.determine_disposition(&declared("engine"), "pickup"), Disposition::Adapt);
        assert_eq!(r.determine_disposition(&declared("intake"), "pickup"), Disposition::Preserve);
        assert_eq!(
            r.determine_disposition(&declared("radiator"), "pickup"),
            Disposition::RemapDefault
        );
    }

    #[test]
    fn placeholders_remap_default() {
        let r = rules(RuleConfig::default());
        let node = SlotNode::new("engine", 0);
        assert!(node.placeholder);
        assert_eq!(r.determine_disposition(&node, "pickup"), Disposition::RemapDefault);
    }

    #[test]
    fn decision_uses_original_slot_type() {
        let r = rules(RuleConfig {
            prune_slots: vec!["radiator".to_string()],
            ..RuleConfig::default()
        });
        let mut node = declared("radiator");
        node.slot_type = "radiator_pickup".to_string();
        assert_eq!(r.decide(&node).disposition, Disposition::Prune);
    }

    #[test]
    fn naming_defaults_and_overrides() {
        let r = rules(RuleConfig::default());
        assert_eq!(r.target_slot_type("engine", "pickup"), "engine_pickup");
        assert_eq!(r.target_part_name("v8", "pickup"), "pickup_v8");

        let r = rules(RuleConfig {
            naming_prefix: "pk_".to_string(),
            naming_suffix: Some(String::new()),
            part_prefix: Some("x_".to_string()),
            rename_slots: BTreeMap::from([("Camso_Intake".to_string(), "pk_intake".to_string())]),
            rename_parts: BTreeMap::from([("v8".to_string(), "pickup_v8_swap".to_string())]),
            ..RuleConfig::default()
        });
        assert_eq!(r.target_slot_type("engine", "pickup"), "pk_engine");
        assert_eq!(r.target_slot_type("Camso_Intake_3813e", "pickup"), "pk_intake_3813e");
        assert_eq!(r.target_part_name("v8", "pickup"), "pickup_v8_swap");
        assert_eq!(r.target_part_name("v6", "pickup"), "x_v6");
    }

    #[test]
    fn explicit_rename_forces_remap() {
        let r = rules(RuleConfig {
            rename_slots: BTreeMap::from([("turbo_v6".to_string(), "turbo".to_string())]),
            ..RuleConfig::default()
        });
        assert_eq!(
            r.determine_disposition(&declared("turbo_v6"), "pickup"),
            Disposition::RemapDefault
        );
    }

    #[test]
    fn bad_pattern_is_invalid_config() {
        let result = DispositionRules::new(RuleConfig {
            primary_patterns: vec!["(".to_string()],
            ..RuleConfig::default()
        });
        assert!(matches!(result, Err(SlotGraphError::InvalidConfig(_))));
    }

    #[test]
    fn replacement_keeps_the_source_suffix() {
        let r = rules(RuleConfig::default());
        let replacement = r
            .replacement_for("Camso_engine_structure_ec8ba")
            .expect("default replacement");
        assert_eq!(replacement.slot_type, "Camso_engine_mesh_ec8ba");
        assert_eq!(replacement.default_part, "Camso_engine_mesh_ec8ba");
        assert_eq!(replacement.description, "Engine Mesh");
        assert_eq!(replacement.options.get("coreSlot"), Some(&RowCell::Flag(true)));

        assert!(r.has_replacement("Camso_engine_structure"));
        assert!(!r.has_replacement("Camso_engine_mesh_ec8ba"));
        assert!(!r.has_replacement("intake"));
    }

    #[test]
    fn configured_replacement_overrides_and_extends_defaults() {
        let r = rules(RuleConfig {
            replace_slots: BTreeMap::from([
                (
                    "Camso_engine_structure".to_string(),
                    ReplacementSpec {
                        replacement_type: "engine_shell".to_string(),
                        default_part: Some("shell_stock_a1b2c".to_string()),
                        ..ReplacementSpec::default()
                    },
                ),
                (
                    "gearbox_frame".to_string(),
                    ReplacementSpec {
                        replacement_type: "gearbox_mesh".to_string(),
                        ..ReplacementSpec::default()
                    },
                ),
            ]),
            ..RuleConfig::default()
        });
        let shell = r
            .replacement_for("Camso_engine_structure_3813e")
            .expect("override");
        assert_eq!(shell.slot_type, "engine_shell_3813e");
        assert_eq!(shell.default_part, "shell_stock_3813e");
        assert!(shell.options.is_empty());
        assert_eq!(
            r.replacement_for("gearbox_frame").map(|x| x.slot_type),
            Some("gearbox_mesh".to_string())
        );
    }

    #[test]
    fn replacement_without_type_is_invalid_config() {
        let result = DispositionRules::new(RuleConfig {
            replace_slots: BTreeMap::from([("frame".to_string(), ReplacementSpec::default())]),
            ..RuleConfig::default()
        });
        assert!(matches!(result, Err(SlotGraphError::InvalidConfig(_))));
    }

    #[test]
    fn mount_slot_is_added_to_injections() {
        let r = rules(RuleConfig {
            mount_slot_type: Some("pickup_enginemounts".to_string()),
            ..RuleConfig::default()
        });
        let specs = r.injections();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].slot_type, "pickup_enginemounts");
        assert!(specs[0].parent.is_none());
    }
}
