//! Per-document analysis state.
//!
//! The [`Analyzer`] owns every analyzed document, the shadow store, the
//! inventory snapshot and the scan trace. Request handlers clone `Arc`
//! snapshots out of it and never hold a lock across an `.await`.

pub mod debounce;
pub mod document;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use tower_lsp::lsp_types::{Position, Url};

use crate::analysis::SubLanguage;
use crate::config::Config;
use crate::embedded::{synthesize, translate, ShadowDocumentInfo, ShadowStore};
use crate::error::Result;
use crate::resolver::{self, DocumentSource, ProjectInventory, ResolveContext, ScanTrace};

pub use debounce::{Debouncer, PendingSlot};
pub use document::AnalyzedDocument;

#[derive(Debug)]
struct DiskEntry {
    modified: Option<SystemTime>,
    document: Arc<AnalyzedDocument>,
}

#[derive(Debug)]
pub struct Analyzer {
    config: RwLock<Config>,
    root: RwLock<Option<PathBuf>>,
    documents: RwLock<HashMap<Url, Arc<AnalyzedDocument>>>,
    disk: RwLock<HashMap<Url, DiskEntry>>,
    inventory: RwLock<Arc<ProjectInventory>>,
    trace: RwLock<Option<Arc<ScanTrace>>>,
    store: RwLock<Option<Arc<ShadowStore>>>,
    /// Serializes shadow synthesis so files follow the stored document
    shadow_writes: Mutex<()>,
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Analyzer {
    pub fn new(config: Config) -> Self {
        let analyzer = Self {
            config: RwLock::new(Config::default()),
            root: RwLock::new(None),
            documents: RwLock::new(HashMap::new()),
            disk: RwLock::new(HashMap::new()),
            inventory: RwLock::new(Arc::new(ProjectInventory::default())),
            trace: RwLock::new(None),
            store: RwLock::new(None),
            shadow_writes: Mutex::new(()),
        };
        analyzer.configure(config, None);
        analyzer
    }

    /// Replaces the configuration and reopens the shadow store. A store
    /// that cannot be created disables embedded features.
    pub fn configure(&self, config: Config, root: Option<PathBuf>) {
        let store = if config.embedded {
            match ShadowStore::new(config.shadow_dir()) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::warn!("embedded features disabled: {}", e);
                    None
                }
            }
        } else {
            None
        };
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = store;
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        if root.is_some() {
            *self.root.write().unwrap_or_else(|e| e.into_inner()) = root;
        }
    }

    pub fn config(&self) -> Config {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn store(&self) -> Option<Arc<ShadowStore>> {
        self.store.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Analyzes `text` as the current content of `uri` and refreshes its
    /// shadow documents. An editor version older than the stored one is
    /// discarded and the stored document is returned instead.
    pub fn analyze(&self, uri: &Url, version: Option<i32>, text: &str) -> Arc<AnalyzedDocument> {
        let document = Arc::new(AnalyzedDocument::analyze(uri.clone(), version, text));
        {
            let mut documents = self.documents.write().unwrap_or_else(|e| e.into_inner());
            if let Some(current) = documents.get(uri) {
                if is_newer(current.version, version) {
                    tracing::debug!("dropping stale analysis of {} ({:?} < {:?})", uri, version, current.version);
                    return current.clone();
                }
            }
            documents.insert(uri.clone(), document.clone());
        }
        self.disk.write().unwrap_or_else(|e| e.into_inner()).remove(uri);

        let _guard = self.shadow_writes.lock().unwrap_or_else(|e| e.into_inner());
        // a newer analysis or a close may have replaced this one meanwhile
        if self.get(uri).is_some_and(|current| Arc::ptr_eq(&current, &document)) {
            self.synthesize_shadows(&document);
        }
        document
    }

    fn synthesize_shadows(&self, document: &AnalyzedDocument) {
        let Some(store) = self.store() else {
            return;
        };
        let input = document.synthesis_input();
        for language in SubLanguage::ALL {
            let result = match synthesize(&input, language) {
                Some(shadow) => store.save(Arc::new(shadow)).map(|_| ()),
                None => store.delete_language(&document.uri, language),
            };
            if let Err(e) = result {
                tracing::warn!("shadow {} for {} not stored: {}", language, document.uri, e);
            }
        }
    }

    /// Forgets an open document and deletes its shadow files.
    pub fn close(&self, uri: &Url) {
        self.documents.write().unwrap_or_else(|e| e.into_inner()).remove(uri);
        let _guard = self.shadow_writes.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = self.store() {
            if let Err(e) = store.delete(uri) {
                tracing::warn!("cannot delete shadows of {}: {}", uri, e);
            }
        }
    }

    /// The analysis of an open document.
    pub fn get(&self, uri: &Url) -> Option<Arc<AnalyzedDocument>> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(uri)
            .cloned()
    }

    pub fn open_documents(&self) -> Vec<Url> {
        self.documents
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    /// Loads a closed document from disk, reusing the cached analysis while
    /// the file's modification time is unchanged.
    fn load_from_disk(&self, uri: &Url) -> Option<Arc<AnalyzedDocument>> {
        let path = uri.to_file_path().ok()?;
        let modified = std::fs::metadata(&path).ok()?.modified().ok();
        {
            let disk = self.disk.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = disk.get(uri) {
                if entry.modified.is_some() && entry.modified == modified {
                    return Some(entry.document.clone());
                }
            }
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!("cannot read {}: {}", path.display(), e);
                return None;
            }
        };
        let document = Arc::new(AnalyzedDocument::analyze(uri.clone(), None, &text));
        self.disk.write().unwrap_or_else(|e| e.into_inner()).insert(
            uri.clone(),
            DiskEntry {
                modified,
                document: document.clone(),
            },
        );
        Some(document)
    }

    pub fn set_inventory(&self, inventory: ProjectInventory) {
        *self.inventory.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(inventory);
    }

    /// Rebuilds the inventory from the configured file or by scanning the
    /// layer roots (the workspace root when none are configured).
    pub fn refresh_inventory(&self) -> Result<()> {
        let config = self.config();
        let inventory = match &config.inventory_file {
            Some(path) => ProjectInventory::load(path)?,
            None => resolver::scan(&self.layer_roots()),
        };
        self.set_inventory(inventory);
        self.disk.write().unwrap_or_else(|e| e.into_inner()).clear();
        Ok(())
    }

    pub fn layer_roots(&self) -> Vec<PathBuf> {
        let config = self.config();
        if !config.layer_roots.is_empty() {
            return config.layer_roots;
        }
        self.root
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn set_trace(&self, trace: Option<ScanTrace>) {
        *self.trace.write().unwrap_or_else(|e| e.into_inner()) = trace.map(Arc::new);
    }

    pub fn load_trace(&self, path: &Path) -> Result<()> {
        let trace = ScanTrace::load(path)?;
        self.set_trace(Some(trace));
        Ok(())
    }

    /// Shadow document of `uri` for `language`, if the document has code in
    /// that language.
    pub fn shadow(&self, uri: &Url, language: SubLanguage) -> Option<ShadowDocumentInfo> {
        self.store()?.get(uri, language)
    }

    /// Original document and language of a shadow URI.
    pub fn original_of(&self, shadow: &Url) -> Option<(Url, SubLanguage)> {
        self.store()?.original_of(shadow)
    }

    pub fn to_shadow(&self, uri: &Url, language: SubLanguage, position: Position) -> Option<Position> {
        let document = self.get(uri)?;
        let shadow = self.shadow(uri, language)?;
        translate::to_shadow(&shadow.document, &document.lines, position)
    }

    pub fn to_original(&self, uri: &Url, language: SubLanguage, position: Position) -> Option<Position> {
        let document = self.get(uri)?;
        let shadow = self.shadow(uri, language)?;
        translate::to_original(&shadow.document, &document.lines, position)
    }

    /// Files pulled in by the directive at `position`.
    pub fn directive_targets_at(&self, uri: &Url, position: Position) -> Vec<PathBuf> {
        let Some(document) = self.document(uri) else {
            return Vec::new();
        };
        let Some(directive) = document.directive_at(position) else {
            return Vec::new();
        };
        let inventory = self.inventory();
        let trace = self.trace();
        let path = document.path();
        let ctx = ResolveContext {
            document: path.as_deref(),
            declarations: &document.declarations,
            inventory: &inventory,
            trace: trace.as_deref(),
        };
        resolver::resolve(directive, &ctx)
    }
}

fn is_newer(stored: Option<i32>, incoming: Option<i32>) -> bool {
    matches!((stored, incoming), (Some(stored), Some(incoming)) if stored > incoming)
}

impl DocumentSource for Analyzer {
    fn document(&self, uri: &Url) -> Option<Arc<AnalyzedDocument>> {
        self.get(uri).or_else(|| self.load_from_disk(uri))
    }

    fn inventory(&self) -> Arc<ProjectInventory> {
        self.inventory.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn trace(&self) -> Option<Arc<ScanTrace>> {
        self.trace.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
