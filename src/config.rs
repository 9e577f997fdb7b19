//! Pipeline configuration.
//!
//! Handles loading, validating, and merging `gridshard.toml`. Stock defaults
//! are the base layer; a user file in the source directory (or one passed
//! with `--config`) overrides just the keys it names.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [shards]
//! max_cells = 500        # Shard images with more grid cells than this
//! count = 2              # Random shard draws per oversized image
//! columns = 20           # Shard width in cells
//! rows = 20              # Shard height in cells
//! strategy = "sample"    # "sample" (random windows) or "tile" (22x22 blocks)
//! overlap = "allow"      # "allow", "dedup" or "reject"
//! quality = 90           # JPEG quality for shard files (1-100)
//! # seed = 42            # Fix the random plan; omit for a fresh plan each run
//!
//! [boxes]
//! label = "cell"         # displayName on every bounding box
//! border = 1             # Pixels added around each cell
//!
//! [processing]
//! max_processes = 4      # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::bbox::{BORDER, BoxOptions};
use crate::metadata::DEFAULT_LABEL;
use crate::shards::{
    DEFAULT_SHARD_COLUMNS, DEFAULT_SHARD_ROWS, OverlapPolicy, ShardPlan, ShardStrategy,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Config file looked up in the source directory.
pub const CONFIG_FILE: &str = "gridshard.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `gridshard.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GridConfig {
    /// When and how oversized maps are cut into shards.
    pub shards: ShardsConfig,
    /// Bounding box generation.
    pub boxes: BoxesConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl GridConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards.columns == 0 || self.shards.rows == 0 {
            return Err(ConfigError::Validation(
                "shards.columns and shards.rows must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&self.shards.quality) {
            return Err(ConfigError::Validation(
                "shards.quality must be 1-100".into(),
            ));
        }
        if self.boxes.label.trim().is_empty() {
            return Err(ConfigError::Validation(
                "boxes.label must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Shard decision and planning settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShardsConfig {
    /// Images with more cells than this are sharded.
    pub max_cells: u64,
    /// Number of random draws per image (`sample` strategy only).
    pub count: usize,
    pub columns: u32,
    pub rows: u32,
    pub strategy: ShardStrategy,
    pub overlap: OverlapPolicy,
    /// JPEG quality for written shard files.
    pub quality: u32,
    /// Base seed for reproducible plans. Each image mixes in its index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ShardsConfig {
    fn default() -> Self {
        Self {
            max_cells: 500,
            count: 2,
            columns: DEFAULT_SHARD_COLUMNS,
            rows: DEFAULT_SHARD_ROWS,
            strategy: ShardStrategy::Sample,
            overlap: OverlapPolicy::Allow,
            quality: 90,
            seed: None,
        }
    }
}

impl ShardsConfig {
    pub fn plan(&self) -> ShardPlan {
        ShardPlan {
            count: self.count,
            columns: self.columns,
            rows: self.rows,
            overlap: self.overlap,
        }
    }
}

/// Bounding box settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoxesConfig {
    pub label: String,
    pub border: u32,
}

impl Default for BoxesConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            border: BORDER,
        }
    }
}

impl BoxesConfig {
    pub fn options(&self) -> BoxOptions {
        BoxOptions {
            label: self.label.clone(),
            border: self.border,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel image workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(GridConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(file: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !file.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(file)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<GridConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: GridConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load `gridshard.toml` from the given directory, falling back to defaults.
pub fn load_config(root: &Path) -> Result<GridConfig, ConfigError> {
    load_config_file(&root.join(CONFIG_FILE))
}

/// Load an explicit config file. A missing file yields the defaults.
pub fn load_config_file(file: &Path) -> Result<GridConfig, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(file)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `gridshard.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# gridshard configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file as gridshard.toml in the source directory, or pass it
# with --config. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Sharding
# ---------------------------------------------------------------------------
[shards]
# Maps with more grid cells than this are cut into shards.
max_cells = 500

# Random shard windows drawn per oversized map ("sample" strategy).
count = 2

# Shard size in grid cells. Clamped to the map's own grid.
columns = 20
rows = 20

# "sample": random grid-aligned windows.
# "tile":   22x22 blocks plus right and bottom edge strips.
strategy = "sample"

# What to do with random windows that overlap earlier ones:
# "allow" keeps all, "dedup" drops exact repeats, "reject" drops any overlap.
overlap = "allow"

# JPEG quality for shard files (1-100).
quality = 90

# Fix the random plan. Each map mixes its position in the batch into
# this seed, so results do not depend on thread scheduling.
# seed = 42

# ---------------------------------------------------------------------------
# Bounding boxes
# ---------------------------------------------------------------------------
[boxes]
# Label written as displayName on every box.
label = "cell"

# Pixels added on each side of a cell.
border = 1

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers. Omit for auto (= number of CPU cores).
# Values above the core count are clamped down.
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = GridConfig::default();
        assert_eq!(config.shards.max_cells, 500);
        assert_eq!(config.shards.count, 2);
        assert_eq!((config.shards.columns, config.shards.rows), (20, 20));
        assert_eq!(config.shards.strategy, ShardStrategy::Sample);
        assert_eq!(config.shards.overlap, OverlapPolicy::Allow);
        assert_eq!(config.shards.seed, None);
        assert_eq!(config.boxes.label, "cell");
        assert_eq!(config.boxes.border, 1);
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[shards]
count = 5
strategy = "tile"
"#;
        let config: GridConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.shards.count, 5);
        assert_eq!(config.shards.strategy, ShardStrategy::Tile);
        // Defaults preserved
        assert_eq!(config.shards.max_cells, 500);
        assert_eq!(config.boxes.label, "cell");
    }

    #[test]
    fn parse_overlap_policies() {
        for (raw, expected) in [
            ("allow", OverlapPolicy::Allow),
            ("dedup", OverlapPolicy::Dedup),
            ("reject", OverlapPolicy::Reject),
        ] {
            let config: GridConfig =
                toml::from_str(&format!("[shards]\noverlap = \"{raw}\"\n")).unwrap();
            assert_eq!(config.shards.overlap, expected);
        }
    }

    #[test]
    fn plan_and_box_options_follow_config() {
        let config: GridConfig = toml::from_str(
            r#"
[shards]
count = 3
columns = 8
rows = 6
overlap = "reject"

[boxes]
label = "square"
border = 0
"#,
        )
        .unwrap();
        let plan = config.shards.plan();
        assert_eq!(plan.count, 3);
        assert_eq!((plan.columns, plan.rows), (8, 6));
        assert_eq!(plan.overlap, OverlapPolicy::Reject);

        let options = config.boxes.options();
        assert_eq!(options.label, "square");
        assert_eq!(options.border, 0);
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config, GridConfig::default());
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join(CONFIG_FILE),
            r#"
[shards]
seed = 42
max_cells = 300

[processing]
max_processes = 2
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.shards.seed, Some(42));
        assert_eq!(config.shards.max_cells, 300);
        assert_eq!(config.shards.count, 2);
        assert_eq!(config.processing.max_processes, Some(2));
    }

    #[test]
    fn load_config_file_explicit_path() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("other.toml");
        fs::write(&path, "[boxes]\nlabel = \"square\"\n").unwrap();
        assert_eq!(load_config_file(&path).unwrap().boxes.label, "square");
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "[shards\ncount = ").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    // =========================================================================
    // effective_threads
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&ProcessingConfig::default()), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);

        let zero = ProcessingConfig {
            max_processes: Some(0),
        };
        assert_eq!(effective_threads(&zero), 1);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str("[shards]\ncount = 2\nrows = 20\n").unwrap();
        let overlay: toml::Value = toml::from_str("[shards]\ncount = 7\n").unwrap();
        let merged = merge_toml(base, overlay);
        let shards = merged.get("shards").unwrap();
        assert_eq!(shards.get("count").unwrap().as_integer(), Some(7));
        assert_eq!(shards.get("rows").unwrap().as_integer(), Some(20));
    }

    #[test]
    fn merge_toml_scalar_replaces_table() {
        let base: toml::Value = toml::from_str("[a]\nb = 1\n").unwrap();
        let overlay: toml::Value = toml::from_str("a = 3\n").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("a").unwrap().as_integer(), Some(3));
    }

    // =========================================================================
    // Unknown keys and validation
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<GridConfig, _> = toml::from_str("[shards]\ncuont = 2\n");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<GridConfig, _> = toml::from_str("[shardz]\ncount = 2\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_strategy_rejected() {
        let result: Result<GridConfig, _> = toml::from_str("[shards]\nstrategy = \"spiral\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(GridConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_zero_shard_size() {
        let mut config = GridConfig::default();
        config.shards.columns = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_quality_range() {
        let mut config = GridConfig::default();
        config.shards.quality = 101;
        assert!(config.validate().is_err());
        config.shards.quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE), "[boxes]\nlabel = \" \"\n").unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: GridConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, GridConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in ["[shards]", "[boxes]", "[processing]"] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let value = stock_defaults_value();
        let table = value.as_table().unwrap();
        assert!(table.contains_key("shards"));
        assert!(table.contains_key("boxes"));
        assert!(table.contains_key("processing"));
    }
}
