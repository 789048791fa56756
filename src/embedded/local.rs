//! In-process embedded-language service built on tree-sitter grammars.
//!
//! It understands only what a single shadow buffer contains: syntax errors,
//! functions defined in the buffer and identifiers that name them.

use std::ops::Range;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Diagnostic, DiagnosticSeverity, Hover, HoverContents,
    Location, MarkupContent, MarkupKind, TextEdit, Url,
};
use tree_sitter::StreamingIterator;

use crate::embedded::grammar::{EmbeddedGrammar, GrammarRegistry};
use crate::embedded::service::{EmbeddedLanguageService, ShadowRequest};
use crate::embedded::synthesizer::ShadowDocument;

#[derive(Debug, Clone, PartialEq, Eq)]
struct FunctionInfo {
    name: String,
    name_range: Range<usize>,
    range: Range<usize>,
}

struct ParsedShadow {
    tree: tree_sitter::Tree,
    grammar: Arc<dyn EmbeddedGrammar>,
}

pub struct TreeSitterService {
    registry: GrammarRegistry,
}

impl TreeSitterService {
    pub fn new() -> Self {
        Self {
            registry: GrammarRegistry::new(),
        }
    }

    fn parse(&self, document: &ShadowDocument) -> Option<ParsedShadow> {
        let grammar = self.registry.get(document.language)?;
        let mut parser = tree_sitter::Parser::new();
        if let Err(e) = parser.set_language(&grammar.language()) {
            tracing::warn!("cannot load {} grammar: {}", grammar.name(), e);
            return None;
        }
        let tree = parser.parse(document.content(), None)?;
        Some(ParsedShadow { tree, grammar })
    }

    fn functions(parsed: &ParsedShadow, source: &str) -> Vec<FunctionInfo> {
        let Some(query) = parsed.grammar.cached_functions_query() else {
            return Vec::new();
        };
        let mut functions = Vec::new();
        let mut cursor = tree_sitter::QueryCursor::new();
        let mut matches = cursor.matches(query, parsed.tree.root_node(), source.as_bytes());

        while let Some(m) = matches.next() {
            let mut name = None;
            let mut node = None;
            for capture in m.captures {
                match query.capture_names()[capture.index as usize] {
                    "name" => name = Some(capture.node),
                    "function" => node = Some(capture.node),
                    _ => {}
                }
            }
            if let (Some(name), Some(node)) = (name, node) {
                functions.push(FunctionInfo {
                    name: name.utf8_text(source.as_bytes()).unwrap_or("").to_string(),
                    name_range: name.byte_range(),
                    range: node.byte_range(),
                });
            }
        }
        functions
    }

    /// Identifier under (or just before) `offset`.
    fn word_at(parsed: &ParsedShadow, source: &str, offset: usize) -> Option<(String, Range<usize>)> {
        let kinds = parsed.grammar.identifier_kinds();
        let root = parsed.tree.root_node();
        [Some(offset), offset.checked_sub(1)]
            .into_iter()
            .flatten()
            .filter_map(|o| root.descendant_for_byte_range(o, o))
            .find(|n| kinds.contains(&n.kind()))
            .and_then(|n| Some((n.utf8_text(source.as_bytes()).ok()?.to_string(), n.byte_range())))
    }

    fn identifiers_named(parsed: &ParsedShadow, source: &str, name: &str) -> Vec<Range<usize>> {
        let kinds = parsed.grammar.identifier_kinds();
        let mut found = Vec::new();
        let mut cursor = parsed.tree.walk();
        let mut descend = true;
        loop {
            let node = cursor.node();
            if descend && kinds.contains(&node.kind()) && node.utf8_text(source.as_bytes()) == Ok(name) {
                found.push(node.byte_range());
            }
            if descend && cursor.goto_first_child() {
                continue;
            }
            if cursor.goto_next_sibling() {
                descend = true;
                continue;
            }
            if !cursor.goto_parent() {
                break;
            }
            descend = false;
        }
        found
    }

    /// Syntax errors of the whole shadow buffer, in shadow coordinates.
    pub fn syntax_diagnostics(&self, document: &ShadowDocument) -> Vec<Diagnostic> {
        let Some(parsed) = self.parse(document) else {
            return Vec::new();
        };
        let mut diagnostics = Vec::new();
        collect_syntax_errors(parsed.tree.root_node(), document, parsed.grammar.name(), &mut diagnostics);
        diagnostics
    }
}

impl Default for TreeSitterService {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_syntax_errors(
    node: tree_sitter::Node<'_>,
    document: &ShadowDocument,
    source_name: &str,
    out: &mut Vec<Diagnostic>,
) {
    let message = if node.is_error() {
        Some("syntax error".to_string())
    } else if node.is_missing() {
        Some(format!("missing `{}`", node.kind()))
    } else {
        None
    };
    if let Some(message) = message {
        out.push(Diagnostic {
            range: document.lines().range_of(node.byte_range()),
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some(source_name.to_string()),
            message,
            ..Default::default()
        });
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_syntax_errors(child, document, source_name, out);
    }
}

#[tower_lsp::async_trait]
impl EmbeddedLanguageService for TreeSitterService {
    async fn completion(&self, request: &ShadowRequest, cancel: &CancellationToken) -> Vec<CompletionItem> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        let Some(parsed) = self.parse(&request.document) else {
            return Vec::new();
        };
        let source = request.document.content();
        let mut items: Vec<CompletionItem> = Self::functions(&parsed, source)
            .into_iter()
            .map(|f| CompletionItem {
                label: f.name,
                kind: Some(CompletionItemKind::FUNCTION),
                ..Default::default()
            })
            .collect();
        items.extend(parsed.grammar.keywords().iter().map(|k| CompletionItem {
            label: k.to_string(),
            kind: Some(CompletionItemKind::KEYWORD),
            ..Default::default()
        }));
        items
    }

    async fn hover(&self, request: &ShadowRequest, cancel: &CancellationToken) -> Option<Hover> {
        if cancel.is_cancelled() {
            return None;
        }
        let parsed = self.parse(&request.document)?;
        let source = request.document.content();
        let offset = request.document.lines().offset_at(request.position)?;
        let (word, _) = Self::word_at(&parsed, source, offset)?;
        let function = Self::functions(&parsed, source)
            .into_iter()
            .find(|f| f.name == word)?;
        let signature = source[function.range.clone()].lines().next()?.trim_end();
        Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: format!("```{}\n{}\n```", parsed.grammar.name(), signature),
            }),
            range: None,
        })
    }

    async fn definition(&self, request: &ShadowRequest, cancel: &CancellationToken) -> Vec<Location> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        let Some(parsed) = self.parse(&request.document) else {
            return Vec::new();
        };
        let source = request.document.content();
        let Some(offset) = request.document.lines().offset_at(request.position) else {
            return Vec::new();
        };
        let Some((word, _)) = Self::word_at(&parsed, source, offset) else {
            return Vec::new();
        };
        Self::functions(&parsed, source)
            .into_iter()
            .filter(|f| f.name == word)
            .map(|f| location(&request.uri, &request.document, f.name_range))
            .collect()
    }

    async fn references(&self, request: &ShadowRequest, cancel: &CancellationToken) -> Vec<Location> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        let Some(parsed) = self.parse(&request.document) else {
            return Vec::new();
        };
        let source = request.document.content();
        let Some(offset) = request.document.lines().offset_at(request.position) else {
            return Vec::new();
        };
        let Some((word, _)) = Self::word_at(&parsed, source, offset) else {
            return Vec::new();
        };
        Self::identifiers_named(&parsed, source, &word)
            .into_iter()
            .map(|range| location(&request.uri, &request.document, range))
            .collect()
    }

    async fn rename(&self, request: &ShadowRequest, new_name: &str, cancel: &CancellationToken) -> Vec<TextEdit> {
        self.references(request, cancel)
            .await
            .into_iter()
            .map(|loc| TextEdit::new(loc.range, new_name.to_string()))
            .collect()
    }

    async fn diagnostics(
        &self,
        _uri: &Url,
        document: &Arc<ShadowDocument>,
        cancel: &CancellationToken,
    ) -> Vec<Diagnostic> {
        if cancel.is_cancelled() {
            return Vec::new();
        }
        self.syntax_diagnostics(document)
    }
}

fn location(uri: &Url, document: &ShadowDocument, range: Range<usize>) -> Location {
    Location::new(uri.clone(), document.lines().range_of(range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract_regions, index_declarations, SubLanguage};
    use crate::embedded::synthesizer::{synthesize, SynthesisInput, DYNAMIC_HEADER_LINES};
    use crate::syntax::{parse, LineIndex};
    use tower_lsp::lsp_types::Position;

    fn shadow(src: &str, language: SubLanguage) -> Arc<ShadowDocument> {
        let uri = Url::parse("file:///r.bb").unwrap();
        let tree = parse(src);
        let lines = LineIndex::new(src);
        let regions = extract_regions(&tree);
        let declarations = index_declarations(&tree, &lines, &uri);
        let input = SynthesisInput {
            uri: &uri,
            source: src,
            tree: &tree,
            regions: &regions,
            declarations: &declarations,
        };
        Arc::new(synthesize(&input, language).unwrap())
    }

    fn request(document: Arc<ShadowDocument>, position: Position) -> ShadowRequest {
        ShadowRequest {
            uri: Url::parse("file:///tmp/embedded-x.py").unwrap(),
            language: document.language,
            position,
            document,
        }
    }

    #[tokio::test]
    async fn test_valid_shadow_has_no_diagnostics() {
        let service = TreeSitterService::new();
        let doc = shadow("python do_a() {\n    x = 1\n}\n", SubLanguage::Dynamic);
        let cancel = CancellationToken::new();
        let diags = service.diagnostics(&Url::parse("file:///s.py").unwrap(), &doc, &cancel).await;
        assert!(diags.is_empty(), "{diags:?}\n{}", doc.content());
    }

    #[tokio::test]
    async fn test_syntax_error_reported_in_shadow_space() {
        let service = TreeSitterService::new();
        let doc = shadow("python do_a() {\n    x = (1\n}\n", SubLanguage::Dynamic);
        let cancel = CancellationToken::new();
        let diags = service.diagnostics(&Url::parse("file:///s.py").unwrap(), &doc, &cancel).await;
        assert!(!diags.is_empty());
        assert!(diags.iter().all(|d| d.range.start.line >= DYNAMIC_HEADER_LINES as u32));
    }

    #[tokio::test]
    async fn test_definition_of_local_function() {
        let service = TreeSitterService::new();
        let src = "def helper():\n    return 1\n\npython do_a() {\n    helper()\n}\n";
        let doc = shadow(src, SubLanguage::Dynamic);
        let row = DYNAMIC_HEADER_LINES as u32 + 4;
        let cancel = CancellationToken::new();
        let found = service.definition(&request(doc, Position::new(row, 6)), &cancel).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].range.start, Position::new(DYNAMIC_HEADER_LINES as u32, 4));
    }

    #[tokio::test]
    async fn test_completion_lists_functions_and_keywords() {
        let service = TreeSitterService::new();
        let doc = shadow("do_a() {\n    true\n}\n", SubLanguage::Shell);
        let cancel = CancellationToken::new();
        let items = service.completion(&request(doc, Position::new(3, 4)), &cancel).await;
        assert!(items.iter().any(|i| i.label == "do_a"));
        assert!(items.iter().any(|i| i.label == "if"));
    }

    #[tokio::test]
    async fn test_cancelled_request_is_empty() {
        let service = TreeSitterService::new();
        let doc = shadow("do_a() {\n    true\n}\n", SubLanguage::Shell);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(service.completion(&request(doc, Position::new(3, 4)), &cancel).await.is_empty());
    }

    #[tokio::test]
    async fn test_rename_edits_every_reference() {
        let service = TreeSitterService::new();
        let src = "def helper():\n    return 1\n\npython do_a() {\n    helper()\n    helper()\n}\n";
        let doc = shadow(src, SubLanguage::Dynamic);
        let row = DYNAMIC_HEADER_LINES as u32;
        let cancel = CancellationToken::new();
        let edits = service.rename(&request(doc, Position::new(row, 5)), "aid", &cancel).await;
        assert_eq!(edits.len(), 3);
    }
}
