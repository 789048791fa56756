use std::collections::BTreeMap;
use std::path::Path;

use tower_lsp::lsp_types::{CompletionItem, CompletionItemKind, Documentation, Position, Url};

use crate::analysis::known_variables::{KEYWORDS, KNOWN_VARIABLES};
use crate::analysis::DeclarationKind;
use crate::analyzer::Analyzer;
use crate::resolver::{linked_documents, DocumentSource, ElementInfo, ProjectInventory};

#[derive(Debug, Clone, PartialEq, Eq)]
enum CompletionContext {
    /// After `inherit`
    Class,
    /// After `include`, `include_all` or `require`
    File,
    /// Inside an unclosed `${`
    Variable,
    /// Only a word so far
    Statement,
    None,
}

fn context_of(line_prefix: &str) -> CompletionContext {
    if let Some(open) = line_prefix.rfind("${") {
        let closed = line_prefix.rfind('}').is_some_and(|close| close > open);
        if !closed && !line_prefix[open + 2..].starts_with('@') {
            return CompletionContext::Variable;
        }
    }
    let trimmed = line_prefix.trim_start();
    if let Some((word, _)) = trimmed.split_once(char::is_whitespace) {
        return match word {
            "inherit" | "inherit_defer" => CompletionContext::Class,
            "include" | "include_all" | "require" => CompletionContext::File,
            _ => CompletionContext::None,
        };
    }
    if trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        CompletionContext::Statement
    } else {
        CompletionContext::None
    }
}

/// BitBake completions at `position`.
pub fn completion(analyzer: &Analyzer, uri: &Url, position: Position) -> Vec<CompletionItem> {
    let Some(document) = analyzer.get(uri) else {
        return Vec::new();
    };
    let Some(line_start) = document.lines.line_start(position.line as usize) else {
        return Vec::new();
    };
    let Some(offset) = document.offset_at(position) else {
        return Vec::new();
    };
    let prefix = &document.text()[line_start..offset];
    let inventory = analyzer.inventory();

    match context_of(prefix) {
        CompletionContext::Class => class_items(&inventory),
        CompletionContext::File => file_items(&inventory, document.path().as_deref()),
        CompletionContext::Variable => variable_items(analyzer, uri),
        CompletionContext::Statement => {
            let mut items: Vec<CompletionItem> = KEYWORDS
                .iter()
                .map(|keyword| CompletionItem {
                    label: keyword.to_string(),
                    kind: Some(CompletionItemKind::KEYWORD),
                    ..Default::default()
                })
                .collect();
            items.extend(variable_items(analyzer, uri));
            items
        }
        CompletionContext::None => Vec::new(),
    }
}

fn class_items(inventory: &ProjectInventory) -> Vec<CompletionItem> {
    inventory
        .class_names()
        .into_iter()
        .map(|name| CompletionItem {
            label: name.to_string(),
            kind: Some(CompletionItemKind::MODULE),
            ..Default::default()
        })
        .collect()
}

/// Include files, labelled relative to their layer.
fn file_items(inventory: &ProjectInventory, document: Option<&Path>) -> Vec<CompletionItem> {
    let dir = document.and_then(Path::parent);
    let mut labels = BTreeMap::new();
    for element in &inventory.includes {
        let path = element.path.to_path();
        let label = match dir.and_then(|d| path.strip_prefix(d).ok()) {
            Some(relative) => relative.to_string_lossy().to_string(),
            None => layer_relative(inventory, element),
        };
        labels.entry(label).or_insert_with(|| path.to_string_lossy().to_string());
    }
    labels
        .into_iter()
        .map(|(label, detail)| CompletionItem {
            label,
            kind: Some(CompletionItemKind::FILE),
            detail: Some(detail),
            ..Default::default()
        })
        .collect()
}

fn layer_relative(inventory: &ProjectInventory, element: &ElementInfo) -> String {
    let path = element.path.to_path();
    element
        .layer
        .as_deref()
        .and_then(|name| inventory.layers.iter().find(|l| l.name == name))
        .and_then(|layer| path.strip_prefix(&layer.path).ok())
        .map(|relative| relative.to_string_lossy().to_string())
        .unwrap_or_else(|| element.path.base.clone())
}

/// Variables declared in linked documents, then well-known and traced ones.
fn variable_items(analyzer: &Analyzer, uri: &Url) -> Vec<CompletionItem> {
    let mut items: BTreeMap<String, CompletionItem> = BTreeMap::new();
    for document in linked_documents(analyzer, uri) {
        for declaration in document.declarations.values() {
            if declaration.kind != DeclarationKind::Variable {
                continue;
            }
            items.entry(declaration.name.clone()).or_insert_with(|| CompletionItem {
                label: declaration.name.clone(),
                kind: Some(CompletionItemKind::VARIABLE),
                detail: declaration.value.clone(),
                ..Default::default()
            });
        }
    }
    for known in KNOWN_VARIABLES {
        items.entry(known.name.to_string()).or_insert_with(|| CompletionItem {
            label: known.name.to_string(),
            kind: Some(CompletionItemKind::VARIABLE),
            documentation: Some(Documentation::String(known.doc.to_string())),
            ..Default::default()
        });
    }
    if let Some(trace) = analyzer.trace() {
        for name in trace.variable_names() {
            items.entry(name.to_string()).or_insert_with(|| CompletionItem {
                label: name.to_string(),
                kind: Some(CompletionItemKind::VARIABLE),
                detail: trace.value(name).map(str::to_string),
                ..Default::default()
            });
        }
    }
    items.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::resolver::LayerInfo;
    use std::path::PathBuf;

    fn analyzer() -> Analyzer {
        let analyzer = Analyzer::new(Config {
            embedded: false,
            ..Config::default()
        });
        analyzer.set_inventory(ProjectInventory {
            layers: vec![LayerInfo {
                name: "meta".into(),
                path: PathBuf::from("/layers/meta"),
                priority: None,
            }],
            classes: vec![ElementInfo::from_path(Path::new("/layers/meta/classes/image.bbclass"), None)],
            includes: vec![
                ElementInfo::from_path(Path::new("/layers/meta/recipes/foo/foo.inc"), None),
                ElementInfo::from_path(
                    Path::new("/layers/meta/conf/distro/include/tune.inc"),
                    Some("meta".into()),
                ),
            ],
            ..Default::default()
        });
        analyzer
    }

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|i| i.label.as_str()).collect()
    }

    #[test]
    fn test_context_detection() {
        assert_eq!(context_of("inherit im"), CompletionContext::Class);
        assert_eq!(context_of("require "), CompletionContext::File);
        assert_eq!(context_of("FOO = \"${B"), CompletionContext::Variable);
        assert_eq!(context_of("FOO = \"${@d.g"), CompletionContext::None);
        assert_eq!(context_of("FOO = \"${BAR} x"), CompletionContext::None);
        assert_eq!(context_of("SRC_"), CompletionContext::Statement);
        assert_eq!(context_of(""), CompletionContext::Statement);
    }

    #[test]
    fn test_classes_after_inherit() {
        let analyzer = analyzer();
        let uri = Url::parse("file:///layers/meta/recipes/foo/foo_1.0.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "inherit \n");
        let items = completion(&analyzer, &uri, Position::new(0, 8));
        assert_eq!(labels(&items), vec!["image"]);
    }

    #[test]
    fn test_files_after_require() {
        let analyzer = analyzer();
        let uri = Url::parse("file:///layers/meta/recipes/foo/foo_1.0.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "require \n");
        let items = completion(&analyzer, &uri, Position::new(0, 8));
        assert_eq!(labels(&items), vec!["conf/distro/include/tune.inc", "foo.inc"]);
    }

    #[test]
    fn test_completion_reads_current_inventory() {
        let analyzer = analyzer();
        let uri = Url::parse("file:///layers/meta/recipes/foo/foo_1.0.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "inherit \nrequire \n");
        analyzer.set_inventory(ProjectInventory {
            classes: vec![ElementInfo::from_path(Path::new("/layers/meta/classes/kernel.bbclass"), None)],
            includes: vec![ElementInfo::from_path(Path::new("/layers/meta/recipes/foo/bar.inc"), None)],
            ..Default::default()
        });
        assert_eq!(labels(&completion(&analyzer, &uri, Position::new(0, 8))), vec!["kernel"]);
        assert_eq!(labels(&completion(&analyzer, &uri, Position::new(1, 8))), vec!["bar.inc"]);
    }

    #[test]
    fn test_variables_inside_expansion() {
        let analyzer = analyzer();
        let uri = Url::parse("file:///work/a.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "MY_VAR = \"1\"\nOTHER = \"${M\"\n");
        let items = completion(&analyzer, &uri, Position::new(1, 12));
        let found = labels(&items);
        assert!(found.contains(&"MY_VAR"));
        assert!(found.contains(&"WORKDIR"));
        assert!(!found.contains(&"inherit"));
    }

    #[test]
    fn test_keywords_at_statement_start() {
        let analyzer = analyzer();
        let uri = Url::parse("file:///work/a.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "in\n");
        let items = completion(&analyzer, &uri, Position::new(0, 2));
        assert!(labels(&items).contains(&"inherit"));
    }
}
