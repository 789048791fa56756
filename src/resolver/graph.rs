//! Cross-document symbol resolution.
//!
//! A document sees its own declarations plus those of every document it
//! transitively pulls in through directives. Cycles are cut with a visited
//! set keyed by URI.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tower_lsp::lsp_types::{Location, Position, Range, TextEdit, Url};

use crate::analyzer::AnalyzedDocument;
use crate::resolver::directive::{resolve, ResolveContext};
use crate::resolver::inventory::ProjectInventory;
use crate::resolver::trace::ScanTrace;

/// Provides analyzed documents and the project snapshot to resolve against.
pub trait DocumentSource {
    /// The analysis of `uri`, loading it from disk if it is not open.
    fn document(&self, uri: &Url) -> Option<Arc<AnalyzedDocument>>;
    fn inventory(&self) -> Arc<ProjectInventory>;
    fn trace(&self) -> Option<Arc<ScanTrace>>;
}

/// Files pulled in by the directives of `document`.
pub fn directive_targets<S: DocumentSource + ?Sized>(source: &S, document: &AnalyzedDocument) -> Vec<Url> {
    let inventory = source.inventory();
    let trace = source.trace();
    let path = document.path();
    let ctx = ResolveContext {
        document: path.as_deref(),
        declarations: &document.declarations,
        inventory: &inventory,
        trace: trace.as_deref(),
    };
    let mut targets = Vec::new();
    for directive in &document.directives {
        for target in resolve(directive, &ctx) {
            if let Ok(uri) = Url::from_file_path(&target) {
                if !targets.contains(&uri) {
                    targets.push(uri);
                }
            }
        }
    }
    targets
}

/// `start` followed by every document reachable from it, breadth first.
pub fn linked_documents<S: DocumentSource + ?Sized>(source: &S, start: &Url) -> Vec<Arc<AnalyzedDocument>> {
    let mut visited = HashSet::new();
    let mut queue = VecDeque::from([start.clone()]);
    let mut documents = Vec::new();

    while let Some(uri) = queue.pop_front() {
        if !visited.insert(uri.clone()) {
            continue;
        }
        let Some(document) = source.document(&uri) else {
            tracing::debug!("linked document {} is unavailable", uri);
            continue;
        };
        for target in directive_targets(source, &document) {
            if !visited.contains(&target) {
                queue.push_back(target);
            }
        }
        documents.push(document);
    }
    documents
}

type LocationKey = (Url, u32, u32, u32, u32);

fn key(location: &Location) -> LocationKey {
    let Range { start, end } = location.range;
    (location.uri.clone(), start.line, start.character, end.line, end.character)
}

fn dedup(locations: Vec<Location>) -> Vec<Location> {
    let mut seen = HashSet::new();
    locations.into_iter().filter(|l| seen.insert(key(l))).collect()
}

/// Where `name` is declared, as seen from `start`, followed by the origins
/// recorded in the scan trace.
pub fn definitions<S: DocumentSource + ?Sized>(source: &S, start: &Url, name: &str) -> Vec<Location> {
    let mut locations: Vec<Location> = linked_documents(source, start)
        .iter()
        .filter_map(|doc| doc.declarations.get(name))
        .map(|decl| decl.location.clone())
        .collect();
    if let Some(trace) = source.trace() {
        locations.extend(trace_locations(&trace, name));
    }
    dedup(locations)
}

pub fn trace_locations(trace: &ScanTrace, name: &str) -> Vec<Location> {
    trace
        .history(name)
        .iter()
        .filter_map(|origin| {
            let uri = Url::from_file_path(&origin.path).ok()?;
            let line = origin.line.saturating_sub(1);
            let at = Position::new(line, 0);
            Some(Location::new(uri, Range::new(at, at)))
        })
        .collect()
}

/// Every occurrence of `name` visible from `start`.
pub fn references<S: DocumentSource + ?Sized>(
    source: &S,
    start: &Url,
    name: &str,
    include_declaration: bool,
) -> Vec<Location> {
    let locations = linked_documents(source, start)
        .iter()
        .flat_map(|doc| {
            doc.occurrences
                .iter()
                .filter(|o| o.name == name && (include_declaration || !o.kind.is_write()))
                .map(|o| Location::new(doc.uri.clone(), o.range))
                .collect::<Vec<_>>()
        })
        .collect();
    dedup(locations)
}

/// Edits renaming every occurrence of `name` visible from `start`.
pub fn rename<S: DocumentSource + ?Sized>(
    source: &S,
    start: &Url,
    name: &str,
    new_name: &str,
) -> HashMap<Url, Vec<TextEdit>> {
    let mut changes: HashMap<Url, Vec<TextEdit>> = HashMap::new();
    for location in references(source, start, name, true) {
        changes
            .entry(location.uri)
            .or_default()
            .push(TextEdit::new(location.range, new_name.to_string()));
    }
    changes
}
