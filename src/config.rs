//! Workspace configuration.
//!
//! Loaded from `.bitbake-ls.yml` at the workspace root; the editor may
//! override any field through `initializationOptions`:
//!
//! ```yaml
//! debounce_ms: 300
//! shadow_dir: /tmp/bitbake-ls
//! layer_roots:
//!   - poky/meta
//!   - meta-custom
//! trace_file: build/bitbake-env.txt
//! embedded: true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const CONFIG_FILENAME: &str = ".bitbake-ls.yml";

pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Delay before a changed document is re-analyzed
    #[serde(alias = "debounceMs")]
    pub debounce_ms: u64,

    /// Directory for shadow documents (defaults to a temp subdirectory)
    #[serde(alias = "shadowDir")]
    pub shadow_dir: Option<PathBuf>,

    /// Layer roots scanned for classes, includes, recipes and appends
    #[serde(alias = "layerRoots")]
    pub layer_roots: Vec<PathBuf>,

    /// Saved `bitbake -e` output
    #[serde(alias = "traceFile")]
    pub trace_file: Option<PathBuf>,

    /// Pre-built inventory JSON, used instead of scanning
    #[serde(alias = "inventoryFile")]
    pub inventory_file: Option<PathBuf>,

    /// Shadow documents and embedded-language features
    pub embedded: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            shadow_dir: None,
            layer_roots: Vec::new(),
            trace_file: None,
            inventory_file: None,
            embedded: true,
        }
    }
}

/// Subset of [`Config`] sent by the editor; only present fields override.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigOverrides {
    debounce_ms: Option<u64>,
    shadow_dir: Option<PathBuf>,
    layer_roots: Option<Vec<PathBuf>>,
    trace_file: Option<PathBuf>,
    inventory_file: Option<PathBuf>,
    embedded: Option<bool>,
}

impl Config {
    /// Reads `.bitbake-ls.yml` from `root`, falling back to defaults when
    /// the file does not exist. Relative paths are resolved against `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILENAME);
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };
        config.resolve_paths(root);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Applies editor-supplied overrides (camelCase JSON).
    pub fn merge_json(&mut self, options: &serde_json::Value) -> Result<()> {
        if options.is_null() {
            return Ok(());
        }
        let overrides: ConfigOverrides = serde_json::from_value(options.clone())?;
        if let Some(ms) = overrides.debounce_ms {
            self.debounce_ms = ms;
        }
        if overrides.shadow_dir.is_some() {
            self.shadow_dir = overrides.shadow_dir;
        }
        if let Some(roots) = overrides.layer_roots {
            self.layer_roots = roots;
        }
        if overrides.trace_file.is_some() {
            self.trace_file = overrides.trace_file;
        }
        if overrides.inventory_file.is_some() {
            self.inventory_file = overrides.inventory_file;
        }
        if let Some(embedded) = overrides.embedded {
            self.embedded = embedded;
        }
        Ok(())
    }

    pub fn resolve_paths(&mut self, root: &Path) {
        let absolute = |p: &PathBuf| if p.is_absolute() { p.clone() } else { root.join(p) };
        self.shadow_dir = self.shadow_dir.as_ref().map(absolute);
        self.trace_file = self.trace_file.as_ref().map(absolute);
        self.inventory_file = self.inventory_file.as_ref().map(absolute);
        self.layer_roots = self.layer_roots.iter().map(absolute).collect();
    }

    pub fn shadow_dir(&self) -> PathBuf {
        self.shadow_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("bitbake-ls"))
    }
}
