//! Persists shadow documents as real files so external language tools can
//! open them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tower_lsp::lsp_types::Url;
use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

use crate::analysis::SubLanguage;
use crate::embedded::synthesizer::ShadowDocument;
use crate::error::{BitbakeError, Result};

/// A stored shadow document and where it lives on disk.
#[derive(Debug, Clone)]
pub struct ShadowDocumentInfo {
    pub uri: Url,
    pub path: PathBuf,
    pub document: Arc<ShadowDocument>,
}

#[derive(Debug)]
struct StoreEntry {
    path: PathBuf,
    uri: Url,
    hash: Option<u64>,
    document: Option<Arc<ShadowDocument>>,
}

type Key = (Url, SubLanguage);

#[derive(Debug)]
pub struct ShadowStore {
    dir: PathBuf,
    entries: RwLock<HashMap<Key, StoreEntry>>,
}

impl ShadowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            tracing::warn!("cannot create shadow directory {}: {}", dir.display(), e);
            BitbakeError::Io(e)
        })?;
        Ok(Self {
            dir,
            entries: RwLock::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the document's content unless the file already holds it.
    pub fn save(&self, document: Arc<ShadowDocument>) -> Result<ShadowDocumentInfo> {
        let key = (document.original.clone(), document.language);
        let hash = xxh3_64(document.content().as_bytes());
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if !entries.contains_key(&key) {
            let entry = self.new_entry(document.language)?;
            entries.insert(key.clone(), entry);
        }
        let Some(entry) = entries.get_mut(&key) else {
            return Err(BitbakeError::Store("shadow entry vanished".to_string()));
        };

        if entry.hash != Some(hash) {
            std::fs::write(&entry.path, document.content()).map_err(|e| {
                tracing::warn!("failed to write shadow document {}: {}", entry.path.display(), e);
                BitbakeError::Io(e)
            })?;
            entry.hash = Some(hash);
            tracing::debug!("wrote shadow {} for {}", entry.path.display(), key.0);
        }
        entry.document = Some(Arc::clone(&document));

        Ok(ShadowDocumentInfo {
            uri: entry.uri.clone(),
            path: entry.path.clone(),
            document,
        })
    }

    fn new_entry(&self, language: SubLanguage) -> Result<StoreEntry> {
        let path = self
            .dir
            .join(format!("embedded-{}.{}", Uuid::new_v4(), language.extension()));
        let uri = Url::from_file_path(&path)
            .map_err(|_| BitbakeError::Uri(path.display().to_string()))?;
        Ok(StoreEntry {
            path,
            uri,
            hash: None,
            document: None,
        })
    }

    pub fn get(&self, uri: &Url, language: SubLanguage) -> Option<ShadowDocumentInfo> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(&(uri.clone(), language))?;
        Some(ShadowDocumentInfo {
            uri: entry.uri.clone(),
            path: entry.path.clone(),
            document: entry.document.clone()?,
        })
    }

    /// Removes every shadow document of `uri`.
    pub fn delete(&self, uri: &Url) -> Result<()> {
        let removed: Vec<StoreEntry> = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            let keys: Vec<Key> = entries.keys().filter(|(u, _)| u == uri).cloned().collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };
        let mut result = Ok(());
        for entry in removed {
            if let Err(e) = remove_file(&entry.path) {
                result = Err(e);
            }
        }
        result
    }

    pub fn delete_language(&self, uri: &Url, language: SubLanguage) -> Result<()> {
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.remove(&(uri.clone(), language))
        };
        match removed {
            Some(entry) => remove_file(&entry.path),
            None => Ok(()),
        }
    }

    /// Original document and language for a shadow URI.
    pub fn original_of(&self, shadow: &Url) -> Option<(Url, SubLanguage)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .find(|(_, entry)| &entry.uri == shadow)
            .map(|(key, _)| key.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_file(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            tracing::warn!("failed to remove shadow document {}: {}", path.display(), e);
            Err(BitbakeError::Io(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract_regions, index_declarations};
    use crate::embedded::synthesizer::{synthesize, SynthesisInput};
    use crate::syntax::{parse, LineIndex};
    use tempfile::TempDir;

    fn document(uri: &Url, src: &str, language: SubLanguage) -> Arc<ShadowDocument> {
        let tree = parse(src);
        let lines = LineIndex::new(src);
        let regions = extract_regions(&tree);
        let declarations = index_declarations(&tree, &lines, uri);
        let input = SynthesisInput {
            uri,
            source: src,
            tree: &tree,
            regions: &regions,
            declarations: &declarations,
        };
        Arc::new(synthesize(&input, language).unwrap())
    }

    #[test]
    fn test_save_get_and_stable_path() {
        let dir = TempDir::new().unwrap();
        let store = ShadowStore::new(dir.path()).unwrap();
        let uri = Url::parse("file:///layer/foo.bb").unwrap();

        let first = store
            .save(document(&uri, "do_a() {\n    true\n}\n", SubLanguage::Shell))
            .unwrap();
        assert!(first.path.starts_with(dir.path()));
        assert_eq!(first.path.extension().unwrap(), "sh");
        assert!(std::fs::read_to_string(&first.path).unwrap().contains("do_a() {"));

        let second = store
            .save(document(&uri, "do_a() {\n    false\n}\n", SubLanguage::Shell))
            .unwrap();
        assert_eq!(first.path, second.path);
        assert!(std::fs::read_to_string(&second.path).unwrap().contains("false"));

        let got = store.get(&uri, SubLanguage::Shell).unwrap();
        assert_eq!(got.uri, second.uri);
        assert!(store.get(&uri, SubLanguage::Dynamic).is_none());
        assert_eq!(store.original_of(&got.uri), Some((uri.clone(), SubLanguage::Shell)));
    }

    #[test]
    fn test_unchanged_content_is_not_rewritten() {
        let dir = TempDir::new().unwrap();
        let store = ShadowStore::new(dir.path()).unwrap();
        let uri = Url::parse("file:///layer/foo.bb").unwrap();
        let doc = document(&uri, "python a() {\n    pass\n}\n", SubLanguage::Dynamic);

        let info = store.save(Arc::clone(&doc)).unwrap();
        // externally modified; an unchanged save must leave it alone
        std::fs::write(&info.path, "sentinel").unwrap();
        store.save(doc).unwrap();
        assert_eq!(std::fs::read_to_string(&info.path).unwrap(), "sentinel");
    }

    #[test]
    fn test_delete_removes_files() {
        let dir = TempDir::new().unwrap();
        let store = ShadowStore::new(dir.path()).unwrap();
        let uri = Url::parse("file:///layer/foo.bb").unwrap();
        let src = "python a() {\n    pass\n}\nb() {\n    true\n}\n";

        let py = store.save(document(&uri, src, SubLanguage::Dynamic)).unwrap();
        let sh = store.save(document(&uri, src, SubLanguage::Shell)).unwrap();
        assert_eq!(store.len(), 2);

        store.delete_language(&uri, SubLanguage::Dynamic).unwrap();
        assert!(!py.path.exists());
        assert!(sh.path.exists());

        store.delete(&uri).unwrap();
        assert!(!sh.path.exists());
        assert!(store.is_empty());
        assert!(store.original_of(&sh.uri).is_none());
    }
}
