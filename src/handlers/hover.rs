use std::fmt::Write as _;

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Url};

use crate::analysis::known_variables::lookup;
use crate::analysis::DeclarationKind;
use crate::analyzer::Analyzer;
use crate::resolver::{linked_documents, DocumentSource};

/// BitBake hover: directive targets, or what is known about a variable.
pub fn hover(analyzer: &Analyzer, uri: &Url, position: Position) -> Option<Hover> {
    let document = analyzer.get(uri)?;

    if let Some(directive) = document.directive_at(position) {
        let targets = analyzer.directive_targets_at(uri, position);
        let mut text = format!("**{}**\n", directive.argument);
        if targets.is_empty() {
            text.push_str("\nnot found");
        }
        for target in targets {
            let _ = write!(text, "\n- `{}`", target.display());
        }
        return Some(markdown(text, Some(directive.range)));
    }

    let occurrence = document.occurrence_at(position)?;
    let name = occurrence.name.as_str();
    let mut text = format!("**{}**", name);

    let declaration = linked_documents(analyzer, uri)
        .iter()
        .find_map(|doc| doc.declarations.get(name).cloned());
    if let Some(declaration) = &declaration {
        match declaration.kind {
            DeclarationKind::Function => text.push_str(" (function)"),
            DeclarationKind::Variable => {
                if let Some(value) = &declaration.value {
                    let operator = declaration.operator.as_deref().unwrap_or("=");
                    let _ = write!(text, "\n\n```\n{} {} \"{}\"\n```", name, operator, value);
                }
            }
        }
    }
    if let Some(trace) = analyzer.trace() {
        if let Some(value) = trace.value(name) {
            let _ = write!(text, "\n\nFinal value: `{}`", value);
        }
    }
    if let Some(known) = lookup(name) {
        let _ = write!(text, "\n\n{}", known.doc);
    }
    Some(markdown(text, Some(occurrence.range)))
}

fn markdown(value: String, range: Option<tower_lsp::lsp_types::Range>) -> Hover {
    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value,
        }),
        range,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::resolver::ScanTrace;

    fn value(hover: &Hover) -> &str {
        match &hover.contents {
            HoverContents::Markup(markup) => &markup.value,
            _ => "",
        }
    }

    fn analyzer() -> Analyzer {
        Analyzer::new(Config {
            embedded: false,
            ..Config::default()
        })
    }

    #[test]
    fn test_hover_on_variable() {
        let analyzer = analyzer();
        analyzer.set_trace(Some(ScanTrace::parse("WORKDIR=\"/build/work\"\n")));
        let uri = Url::parse("file:///work/a.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "WORKDIR ?= \"/tmp\"\nS = \"${WORKDIR}/src\"\n");

        let hover = hover(&analyzer, &uri, Position::new(1, 8)).unwrap();
        let text = value(&hover);
        assert!(text.starts_with("**WORKDIR**"));
        assert!(text.contains("WORKDIR ?= \"/tmp\""));
        assert!(text.contains("Final value: `/build/work`"));
    }

    #[test]
    fn test_hover_on_unresolved_directive() {
        let analyzer = analyzer();
        let uri = Url::parse("file:///work/a.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "inherit nothing\n");
        let hover = hover(&analyzer, &uri, Position::new(0, 10)).unwrap();
        assert!(value(&hover).contains("not found"));
    }

    #[test]
    fn test_no_hover_on_plain_text() {
        let analyzer = analyzer();
        let uri = Url::parse("file:///work/a.bb").unwrap();
        analyzer.analyze(&uri, Some(1), "# comment\n");
        assert!(hover(&analyzer, &uri, Position::new(0, 3)).is_none());
    }
}
