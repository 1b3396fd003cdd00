//! Persistent configuration (§6) and runtime feature flags, grounded on the
//! teacher's `utils::feature_flags` registry and its CLI's TOML config
//! loading precedence.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// The persistent configuration keys observed by the core (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub archive_dir_ignore_hidden: bool,
    pub iwad_lock: bool,
    pub map_split_auto_offset: bool,
    pub zip_allow_duplicate_names: bool,
    pub vwad_allow_duplicate_names: bool,
    pub vwad_private_key: String,
    pub vwad_author_name: String,
    pub max_entry_size_mb: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            archive_dir_ignore_hidden: true,
            iwad_lock: true,
            map_split_auto_offset: true,
            zip_allow_duplicate_names: false,
            vwad_allow_duplicate_names: false,
            vwad_private_key: String::new(),
            vwad_author_name: String::new(),
            max_entry_size_mb: 256,
        }
    }
}

impl ArchiveConfig {
    /// Loads configuration with precedence: explicit path > `SLADE_CONFIG`
    /// env var > `./slade.toml` > `$XDG_CONFIG_HOME/slade/slade.toml` (or
    /// platform equivalent) > built-in defaults. Missing/unreadable files
    /// are silently skipped (matches the teacher's tolerant CLI config
    /// loader).
    #[must_use]
    pub fn load(explicit_path: Option<&Path>) -> Self {
        let mut cfg = Self::default();
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(p) = explicit_path {
            candidates.push(p.to_path_buf());
        }
        if let Ok(p) = std::env::var("SLADE_CONFIG") {
            candidates.push(PathBuf::from(p));
        }
        candidates.push(PathBuf::from("slade.toml"));
        if let Some(dir) = dirs_next::config_dir() {
            candidates.push(dir.join("slade").join("slade.toml"));
        }

        for path in candidates {
            if let Ok(text) = std::fs::read_to_string(&path)
                && let Ok(parsed) = toml::from_str::<Self>(&text)
            {
                cfg = parsed;
                break;
            }
        }
        cfg
    }

    /// Convenience: max entry size in bytes.
    #[must_use]
    pub const fn max_entry_size_bytes(&self) -> u64 {
        self.max_entry_size_mb * 1024 * 1024
    }
}

/// A single runtime feature toggle, independent of Cargo compile-time
/// features (mirrors the teacher's `FeatureFlag`).
#[derive(Clone, Debug)]
pub struct FeatureFlag {
    pub name: String,
    pub enabled: bool,
    pub description: String,
}

static FLAGS: LazyLock<RwLock<HashMap<String, FeatureFlag>>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert(
        "regex-wildcards".to_string(),
        FeatureFlag {
            name: "regex-wildcards".to_string(),
            enabled: cfg!(feature = "regex-wildcards"),
            description: "Use regex for SearchOptions wildcard name matching instead of the built-in glob matcher.".to_string(),
        },
    );
    map.insert(
        "vwad-signing".to_string(),
        FeatureFlag {
            name: "vwad-signing".to_string(),
            enabled: true,
            description: "Sign VWAD archives with a P-256 keypair on write.".to_string(),
        },
    );
    RwLock::new(map)
});

/// Enable or disable a feature flag. Returns true if the flag existed.
pub fn set(name: &str, enabled: bool) -> bool {
    let mut g = FLAGS.write();
    if let Some(f) = g.get_mut(name) {
        f.enabled = enabled;
        true
    } else {
        false
    }
}

#[must_use]
pub fn is_enabled(name: &str) -> bool {
    FLAGS.read().get(name).is_some_and(|f| f.enabled)
}

#[must_use]
pub fn all() -> Vec<FeatureFlag> {
    FLAGS.read().values().cloned().collect()
}
