//! Definition, references and rename for BitBake symbols and directives.

use std::collections::HashMap;

use tower_lsp::lsp_types::{Location, Position, Range, Url, WorkspaceEdit};

use crate::analyzer::Analyzer;
use crate::resolver::graph;

/// Directive targets, or the declarations of the symbol under the cursor.
pub fn definition(analyzer: &Analyzer, uri: &Url, position: Position) -> Vec<Location> {
    let Some(document) = analyzer.get(uri) else {
        return Vec::new();
    };
    if document.directive_at(position).is_some() {
        let start = Range::new(Position::new(0, 0), Position::new(0, 0));
        return analyzer
            .directive_targets_at(uri, position)
            .into_iter()
            .filter_map(|path| Url::from_file_path(path).ok())
            .map(|target| Location::new(target, start))
            .collect();
    }
    match document.occurrence_at(position) {
        Some(occurrence) => graph::definitions(analyzer, uri, &occurrence.name),
        None => Vec::new(),
    }
}

pub fn references(analyzer: &Analyzer, uri: &Url, position: Position, include_declaration: bool) -> Vec<Location> {
    let Some(document) = analyzer.get(uri) else {
        return Vec::new();
    };
    match document.occurrence_at(position) {
        Some(occurrence) => graph::references(analyzer, uri, &occurrence.name, include_declaration),
        None => Vec::new(),
    }
}

/// Range and current name of the symbol at `position`.
pub fn prepare_rename(analyzer: &Analyzer, uri: &Url, position: Position) -> Option<(Range, String)> {
    let document = analyzer.get(uri)?;
    let occurrence = document.occurrence_at(position)?;
    Some((occurrence.range, occurrence.name.clone()))
}

pub fn rename(analyzer: &Analyzer, uri: &Url, position: Position, new_name: &str) -> Option<WorkspaceEdit> {
    let (_, name) = prepare_rename(analyzer, uri, position)?;
    let changes = graph::rename(analyzer, uri, &name, new_name);
    if changes.is_empty() {
        return None;
    }
    Some(WorkspaceEdit::new(changes))
}

/// Merges edits from another source into `edit`, skipping duplicates.
pub fn merge_edits(edit: &mut WorkspaceEdit, more: HashMap<Url, Vec<tower_lsp::lsp_types::TextEdit>>) {
    let changes = edit.changes.get_or_insert_with(HashMap::new);
    for (uri, edits) in more {
        let existing = changes.entry(uri).or_default();
        for text_edit in edits {
            if !existing.iter().any(|e| e.range == text_edit.range) {
                existing.push(text_edit);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::resolver::{ElementInfo, ProjectInventory};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tower_lsp::lsp_types::TextEdit;

    fn analyzer() -> Analyzer {
        Analyzer::new(Config {
            embedded: false,
            ..Config::default()
        })
    }

    #[test]
    fn test_definition_of_directive_target() {
        let analyzer = analyzer();
        analyzer.set_inventory(ProjectInventory {
            classes: vec![ElementInfo::from_path(Path::new("/l/classes/image.bbclass"), None)],
            ..Default::default()
        });
        let uri = Url::parse("file:///w/a.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "inherit image\n");
        let found = definition(&analyzer, &uri, Position::new(0, 9));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uri, Url::parse("file:///l/classes/image.bbclass").unwrap());
    }

    #[test]
    fn test_rename_follows_includes_on_disk() {
        let dir = TempDir::new().unwrap();
        let inc = dir.path().join("common.inc");
        fs::write(&inc, "FOO = \"x\"\n").unwrap();
        let recipe = dir.path().join("a.bb");
        let analyzer = analyzer();
        let uri = Url::from_file_path(&recipe).unwrap();
        analyzer.analyze(&uri, Some(1), "require common.inc\nBAR = \"${FOO}\"\n");

        let edit = rename(&analyzer, &uri, Position::new(1, 10), "NEWFOO").unwrap();
        let changes = edit.changes.unwrap();
        assert_eq!(changes.len(), 2);
        let inc_uri = Url::from_file_path(&inc).unwrap();
        assert_eq!(
            changes[&inc_uri],
            vec![TextEdit::new(Range::new(Position::new(0, 0), Position::new(0, 3)), "NEWFOO".into())]
        );
    }

    #[test]
    fn test_references_exclude_declarations() {
        let analyzer = analyzer();
        let uri = Url::parse("file:///w/a.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "FOO = \"1\"\nA = \"${FOO}\"\nB = \"${FOO}\"\n");
        assert_eq!(references(&analyzer, &uri, Position::new(0, 1), false).len(), 2);
        assert_eq!(references(&analyzer, &uri, Position::new(0, 1), true).len(), 3);
    }

    #[test]
    fn test_merge_edits_skips_duplicates() {
        let uri = Url::parse("file:///w/a.bb").unwrap();
        let range = Range::new(Position::new(0, 0), Position::new(0, 3));
        let mut edit = WorkspaceEdit::new(HashMap::from([(uri.clone(), vec![TextEdit::new(range, "X".into())])]));
        merge_edits(&mut edit, HashMap::from([(uri.clone(), vec![TextEdit::new(range, "X".into())])]));
        assert_eq!(edit.changes.unwrap()[&uri].len(), 1);
    }
}
