//! Project inventory: the layers, classes, include files, recipes and
//! appends of a BitBake project.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

static LAYER_PRIORITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*BBFILE_PRIORITY_\S+\s*\??=\s*["'](\d+)["']"#).expect("valid priority regex")
});

/// Build output directories that never hold metadata.
const SKIPPED_DIRS: &[&str] = &["tmp", "sstate-cache", "downloads", "cache"];

/// Parsed path, mirroring the `root/dir/base/ext/name` split editors use.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathInfo {
    pub root: String,
    pub dir: String,
    pub base: String,
    pub ext: String,
    pub name: String,
}

impl PathInfo {
    pub fn from_path(path: &Path) -> Self {
        let root = match path.components().next() {
            Some(Component::RootDir) => "/".to_string(),
            Some(Component::Prefix(prefix)) => prefix.as_os_str().to_string_lossy().to_string(),
            _ => String::new(),
        };
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Self {
            root,
            dir: path
                .parent()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            base: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            ext,
            name: path
                .file_stem()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        }
    }

    pub fn to_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.base)
    }

    /// Whether the path ends with `suffix` on a component boundary.
    pub fn ends_with(&self, suffix: &str) -> bool {
        let suffix = suffix.trim_start_matches("./");
        !suffix.is_empty() && self.to_path().ends_with(suffix)
    }
}

/// A class, include file, recipe or append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInfo {
    pub name: String,
    pub path: PathInfo,
    /// Recipe/append version (`foo_1.2.bb` → `1.2`, `foo_%.bbappend` → `%`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<String>,
}

impl ElementInfo {
    pub fn from_path(path: &Path, layer: Option<String>) -> Self {
        let path = PathInfo::from_path(path);
        let (name, version) = match path.ext.as_str() {
            ".bb" | ".bbappend" => match path.name.split_once('_') {
                Some((name, version)) => (name.to_string(), Some(version.to_string())),
                None => (path.name.clone(), None),
            },
            _ => (path.name.clone(), None),
        };
        Self {
            name,
            path,
            version,
            layer,
        }
    }

    /// Whether this append applies to `recipe`.
    pub fn appends_to(&self, recipe: &ElementInfo) -> bool {
        if self.name != recipe.name {
            return false;
        }
        match (self.version.as_deref(), recipe.version.as_deref()) {
            (None, None) => true,
            (Some(pattern), version) => match pattern.split_once('%') {
                Some((prefix, _)) => version.unwrap_or("").starts_with(prefix),
                None => version == Some(pattern),
            },
            (None, Some(_)) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectInventory {
    pub layers: Vec<LayerInfo>,
    pub classes: Vec<ElementInfo>,
    pub includes: Vec<ElementInfo>,
    pub recipes: Vec<ElementInfo>,
    #[serde(alias = "appends")]
    pub recipe_extensions: Vec<ElementInfo>,
    /// Machine and distro names usable as overrides
    pub overrides: Vec<String>,
}

impl ProjectInventory {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Classes named `name` (with or without `.bbclass`).
    pub fn classes_named(&self, name: &str) -> Vec<&ElementInfo> {
        let name = name.strip_suffix(".bbclass").unwrap_or(name);
        self.classes.iter().filter(|c| c.name == name).collect()
    }

    /// Every element whose path ends with `suffix`.
    pub fn elements_with_suffix(&self, suffix: &str) -> Vec<&ElementInfo> {
        self.elements().filter(|e| e.path.ends_with(suffix)).collect()
    }

    pub fn appends_for(&self, recipe: &ElementInfo) -> Vec<&ElementInfo> {
        self.recipe_extensions
            .iter()
            .filter(|a| a.appends_to(recipe))
            .collect()
    }

    pub fn element_at(&self, path: &Path) -> Option<&ElementInfo> {
        self.elements().find(|e| e.path.to_path() == path)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementInfo> {
        self.classes
            .iter()
            .chain(&self.includes)
            .chain(&self.recipes)
            .chain(&self.recipe_extensions)
    }

    pub fn class_names(&self) -> BTreeSet<&str> {
        self.classes.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty() && self.elements().next().is_none()
    }
}

/// Walks `roots` and classifies every metadata file.
pub fn scan(roots: &[PathBuf]) -> ProjectInventory {
    let mut inventory = ProjectInventory::default();
    let mut files = Vec::new();
    let mut overrides = BTreeSet::new();

    for root in roots {
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !(entry.file_type().is_some_and(|t| t.is_dir()) && SKIPPED_DIRS.contains(&&*name))
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("skipping unreadable entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.ends_with("conf/layer.conf") {
                if let Some(layer) = read_layer(path) {
                    inventory.layers.push(layer);
                }
                continue;
            }
            if is_override_conf(path) {
                if let Some(stem) = path.file_stem() {
                    overrides.insert(stem.to_string_lossy().to_string());
                }
                continue;
            }
            files.push(path.to_path_buf());
        }
    }

    inventory.layers.sort_by(|a, b| a.path.cmp(&b.path));
    inventory.layers.dedup_by(|a, b| a.path == b.path);

    for path in files {
        let layer = layer_of(&inventory.layers, &path);
        let element = ElementInfo::from_path(&path, layer);
        match element.path.ext.as_str() {
            ".bbclass" => inventory.classes.push(element),
            ".inc" => inventory.includes.push(element),
            ".bb" => inventory.recipes.push(element),
            ".bbappend" => inventory.recipe_extensions.push(element),
            _ => {}
        }
    }
    inventory.overrides = overrides.into_iter().collect();

    tracing::info!(
        "scanned {} layers: {} classes, {} includes, {} recipes, {} appends",
        inventory.layers.len(),
        inventory.classes.len(),
        inventory.includes.len(),
        inventory.recipes.len(),
        inventory.recipe_extensions.len()
    );
    inventory
}

/// `conf/machine/*.conf` and `conf/distro/*.conf` name overrides.
fn is_override_conf(path: &Path) -> bool {
    let Some(parent) = path.parent() else {
        return false;
    };
    path.extension().is_some_and(|e| e == "conf")
        && parent.parent().and_then(|p| p.file_name()).is_some_and(|n| n == "conf")
        && parent
            .file_name()
            .is_some_and(|n| n == "machine" || n == "distro")
}

fn read_layer(layer_conf: &Path) -> Option<LayerInfo> {
    let dir = layer_conf.parent()?.parent()?;
    let priority = std::fs::read_to_string(layer_conf).ok().and_then(|content| {
        content
            .lines()
            .find_map(|line| LAYER_PRIORITY.captures(line))
            .and_then(|caps| caps[1].parse().ok())
    });
    Some(LayerInfo {
        name: dir.file_name()?.to_string_lossy().to_string(),
        path: dir.to_path_buf(),
        priority,
    })
}

fn layer_of(layers: &[LayerInfo], path: &Path) -> Option<String> {
    layers
        .iter()
        .filter(|l| path.starts_with(&l.path))
        .max_by_key(|l| l.path.components().count())
        .map(|l| l.name.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_path_info() {
        let info = PathInfo::from_path(Path::new("/layers/meta/classes/image.bbclass"));
        assert_eq!(info.root, "/");
        assert_eq!(info.dir, "/layers/meta/classes");
        assert_eq!(info.base, "image.bbclass");
        assert_eq!(info.ext, ".bbclass");
        assert_eq!(info.name, "image");
        assert!(info.ends_with("classes/image.bbclass"));
        assert!(!info.ends_with("age.bbclass"));
    }

    #[test]
    fn test_append_matching() {
        let recipe = ElementInfo::from_path(Path::new("/l/foo_1.2.bb"), None);
        let any = ElementInfo::from_path(Path::new("/l/foo_%.bbappend"), None);
        let minor = ElementInfo::from_path(Path::new("/l/foo_1.%.bbappend"), None);
        let other = ElementInfo::from_path(Path::new("/l/foo_2.%.bbappend"), None);
        let exact = ElementInfo::from_path(Path::new("/l/foo_1.2.bbappend"), None);
        let unversioned = ElementInfo::from_path(Path::new("/l/foo.bbappend"), None);
        assert_eq!(recipe.name, "foo");
        assert_eq!(recipe.version.as_deref(), Some("1.2"));
        assert!(any.appends_to(&recipe));
        assert!(minor.appends_to(&recipe));
        assert!(exact.appends_to(&recipe));
        assert!(!other.appends_to(&recipe));
        assert!(!unversioned.appends_to(&recipe));
    }

    #[test]
    fn test_scan_classifies_files() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        create_file(root, "meta-a/conf/layer.conf", "BBFILE_PRIORITY_a = \"6\"\n");
        create_file(root, "meta-a/classes/image.bbclass", "");
        create_file(root, "meta-a/recipes-core/foo/foo_1.0.bb", "");
        create_file(root, "meta-a/recipes-core/foo/foo.inc", "");
        create_file(root, "meta-a/conf/machine/qemux86.conf", "");
        create_file(root, "meta-b/conf/layer.conf", "");
        create_file(root, "meta-b/recipes-core/foo/foo_%.bbappend", "");
        create_file(root, "build/tmp/work/foo.bb", "");

        let inventory = scan(&[root.to_path_buf()]);
        assert_eq!(inventory.layers.len(), 2);
        assert_eq!(inventory.layers[0].priority, Some(6));
        assert_eq!(inventory.classes_named("image.bbclass").len(), 1);
        assert_eq!(inventory.includes.len(), 1);
        assert_eq!(inventory.recipes.len(), 1);
        assert_eq!(inventory.recipes[0].layer.as_deref(), Some("meta-a"));
        assert_eq!(inventory.appends_for(&inventory.recipes[0]).len(), 1);
        assert_eq!(inventory.overrides, vec!["qemux86".to_string()]);
    }

    #[test]
    fn test_json_roundtrip_accepts_camel_case() {
        let json = r#"{
            "classes": [{"name": "image", "path": {"root": "/", "dir": "/m/classes", "base": "image.bbclass", "ext": ".bbclass", "name": "image"}}],
            "recipeExtensions": []
        }"#;
        let inventory = ProjectInventory::from_json(json).unwrap();
        assert_eq!(
            inventory.classes_named("image")[0].path.to_path(),
            PathBuf::from("/m/classes/image.bbclass")
        );
    }
}
