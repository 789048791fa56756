//! Delegation of requests inside embedded code to an
//! [`EmbeddedLanguageService`], with results mapped back to the recipe.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionTextEdit, Diagnostic, Hover, Location, Position, TextEdit, Url,
};

use crate::analysis::SubLanguage;
use crate::analyzer::{AnalyzedDocument, Analyzer};
use crate::embedded::{cancellable, translate, EmbeddedLanguageService, ShadowRequest};

/// A request in shadow coordinates plus the original it came from.
pub struct EmbeddedRequest {
    pub shadow: ShadowRequest,
    pub original: Arc<AnalyzedDocument>,
}

/// `None` when `position` is not inside embedded code.
pub fn shadow_request(analyzer: &Analyzer, uri: &Url, position: Position) -> Option<EmbeddedRequest> {
    let original = analyzer.get(uri)?;
    let language = original.language_at(position)?;
    let info = analyzer.shadow(uri, language)?;
    let shadow_position = translate::to_shadow(&info.document, &original.lines, position)?;
    Some(EmbeddedRequest {
        shadow: ShadowRequest {
            uri: info.uri,
            language,
            position: shadow_position,
            document: info.document,
        },
        original,
    })
}

/// Maps a location in a shadow file back to its recipe. Locations outside
/// shadow files pass through.
pub fn location_to_original(analyzer: &Analyzer, location: Location) -> Option<Location> {
    let Some((uri, language)) = analyzer.original_of(&location.uri) else {
        return Some(location);
    };
    let original = analyzer.get(&uri)?;
    let shadow = analyzer.shadow(&uri, language)?;
    let range = translate::range_to_original(&shadow.document, &original.lines, location.range)?;
    Some(Location::new(uri, range))
}

fn locations_to_original(analyzer: &Analyzer, locations: Vec<Location>) -> Vec<Location> {
    locations
        .into_iter()
        .filter_map(|l| location_to_original(analyzer, l))
        .collect()
}

pub async fn completion(
    service: &dyn EmbeddedLanguageService,
    request: &EmbeddedRequest,
    cancel: &CancellationToken,
) -> Vec<CompletionItem> {
    let items = cancellable(cancel, service.completion(&request.shadow, cancel)).await;
    let shadow = &request.shadow.document;
    let lines = &request.original.lines;
    items
        .into_iter()
        .map(|mut item| {
            item.text_edit = match item.text_edit.take() {
                Some(CompletionTextEdit::Edit(edit)) => translate::range_to_original(shadow, lines, edit.range)
                    .map(|range| CompletionTextEdit::Edit(TextEdit::new(range, edit.new_text))),
                _ => None,
            };
            item
        })
        .collect()
}

pub async fn hover(
    service: &dyn EmbeddedLanguageService,
    request: &EmbeddedRequest,
    cancel: &CancellationToken,
) -> Option<Hover> {
    let mut hover = cancellable(cancel, service.hover(&request.shadow, cancel)).await?;
    hover.range = hover
        .range
        .and_then(|range| translate::range_to_original(&request.shadow.document, &request.original.lines, range));
    Some(hover)
}

pub async fn definition(
    analyzer: &Analyzer,
    service: &dyn EmbeddedLanguageService,
    request: &EmbeddedRequest,
    cancel: &CancellationToken,
) -> Vec<Location> {
    let locations = cancellable(cancel, service.definition(&request.shadow, cancel)).await;
    locations_to_original(analyzer, locations)
}

pub async fn references(
    analyzer: &Analyzer,
    service: &dyn EmbeddedLanguageService,
    request: &EmbeddedRequest,
    cancel: &CancellationToken,
) -> Vec<Location> {
    let locations = cancellable(cancel, service.references(&request.shadow, cancel)).await;
    locations_to_original(analyzer, locations)
}

/// Rename edits in recipe coordinates; edits touching generated text are
/// dropped.
pub async fn rename(
    service: &dyn EmbeddedLanguageService,
    request: &EmbeddedRequest,
    new_name: &str,
    cancel: &CancellationToken,
) -> HashMap<Url, Vec<TextEdit>> {
    let edits = cancellable(cancel, service.rename(&request.shadow, new_name, cancel)).await;
    let edits = translate::edits_to_original(&request.shadow.document, &request.original.lines, edits);
    if edits.is_empty() {
        return HashMap::new();
    }
    HashMap::from([(request.original.uri.clone(), edits)])
}

/// Diagnostics of every shadow of `uri`, mapped back to the recipe.
pub async fn diagnostics(
    analyzer: &Analyzer,
    service: &dyn EmbeddedLanguageService,
    uri: &Url,
    cancel: &CancellationToken,
) -> Vec<Diagnostic> {
    let Some(original) = analyzer.get(uri) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for language in SubLanguage::ALL {
        let Some(info) = analyzer.shadow(uri, language) else {
            continue;
        };
        let diagnostics = cancellable(cancel, service.diagnostics(&info.uri, &info.document, cancel)).await;
        found.extend(translate::diagnostics_to_original(&info.document, &original.lines, diagnostics));
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embedded::TreeSitterService;
    use tempfile::TempDir;

    fn setup(text: &str) -> (TempDir, Analyzer, Url) {
        let dir = TempDir::new().unwrap();
        let analyzer = Analyzer::new(Config {
            shadow_dir: Some(dir.path().join("shadows")),
            ..Config::default()
        });
        let uri = Url::from_file_path(dir.path().join("a.bb")).unwrap();
        analyzer.analyze(&uri, Some(1), text);
        (dir, analyzer, uri)
    }

    #[test]
    fn test_no_request_outside_embedded_code() {
        let (_dir, analyzer, uri) = setup("FOO = \"1\"\n");
        assert!(shadow_request(&analyzer, &uri, Position::new(0, 1)).is_none());
    }

    #[test]
    fn test_request_translates_position() {
        let (_dir, analyzer, uri) = setup("do_a() {\n\techo hi\n}\n");
        let request = shadow_request(&analyzer, &uri, Position::new(1, 2)).unwrap();
        assert_eq!(request.shadow.language, SubLanguage::Shell);
        assert_eq!(request.shadow.position, Position::new(3, 2));
    }

    #[tokio::test]
    async fn test_definition_maps_back_to_recipe() {
        let (_dir, analyzer, uri) = setup("python helper() {\n    pass\n}\n\npython do_a() {\n    helper()\n}\n");
        let service = TreeSitterService::new();
        let cancel = CancellationToken::new();
        let request = shadow_request(&analyzer, &uri, Position::new(5, 6)).unwrap();
        let found = definition(&analyzer, &service, &request, &cancel).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uri, uri);
        assert_eq!(found[0].range.start.line, 0);
    }

    #[tokio::test]
    async fn test_cancelled_request_is_empty() {
        let (_dir, analyzer, uri) = setup("python do_a() {\n    x = 1\n}\n");
        let service = TreeSitterService::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(diagnostics(&analyzer, &service, &uri, &cancel).await.is_empty());
    }

    #[tokio::test]
    async fn test_syntax_errors_map_to_recipe_lines() {
        let (_dir, analyzer, uri) = setup("FOO = \"1\"\npython do_a() {\n    x = (\n}\n");
        let service = TreeSitterService::new();
        let found = diagnostics(&analyzer, &service, &uri, &CancellationToken::new()).await;
        // nothing points into the generated header or the plain assignment
        assert!(found.iter().all(|d| d.range.start.line >= 1 && d.range.end.line <= 4));
    }
}
