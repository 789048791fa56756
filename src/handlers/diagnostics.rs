use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Url};

use crate::analysis::DirectiveKind;
use crate::analyzer::Analyzer;
use crate::resolver::{expand, resolve, suggestions, DocumentSource, ResolveContext};

pub const SOURCE: &str = "bitbake-ls";

/// Parse errors and directives that resolve to nothing.
pub fn diagnostics(analyzer: &Analyzer, uri: &Url) -> Vec<Diagnostic> {
    let Some(document) = analyzer.get(uri) else {
        return Vec::new();
    };
    let mut diagnostics: Vec<Diagnostic> = document
        .tree
        .errors()
        .into_iter()
        .map(|node| {
            diagnostic(
                document.lines.range_of(node.byte_range()),
                DiagnosticSeverity::ERROR,
                "cannot parse statement".to_string(),
            )
        })
        .collect();

    let inventory = analyzer.inventory();
    if inventory.is_empty() {
        return diagnostics;
    }
    let trace = analyzer.trace();
    let path = document.path();
    let ctx = ResolveContext {
        document: path.as_deref(),
        declarations: &document.declarations,
        inventory: &inventory,
        trace: trace.as_deref(),
    };
    for directive in &document.directives {
        // a soft include may legitimately miss
        if matches!(directive.kind, DirectiveKind::Include | DirectiveKind::IncludeAll) {
            continue;
        }
        if expand(&directive.argument, &ctx).contains("${") || !resolve(directive, &ctx).is_empty() {
            continue;
        }
        let mut message = format!("cannot find `{}`", directive.argument);
        let close = suggestions(directive.kind, &directive.argument, &inventory, 3);
        if !close.is_empty() {
            message.push_str(&format!("; did you mean {}?", close.join(", ")));
        }
        diagnostics.push(diagnostic(directive.range, DiagnosticSeverity::WARNING, message));
    }
    diagnostics
}

fn diagnostic(range: tower_lsp::lsp_types::Range, severity: DiagnosticSeverity, message: String) -> Diagnostic {
    Diagnostic {
        range,
        severity: Some(severity),
        source: Some(SOURCE.to_string()),
        message,
        ..Default::default()
    }
}
