use tower_lsp::lsp_types::{DocumentSymbol, SymbolKind};

use crate::analyzer::AnalyzedDocument;
use crate::syntax::{Node, NodeKind};

/// Outline of the top-level statements: variables, functions and
/// directives.
pub fn document_symbols(document: &AnalyzedDocument) -> Vec<DocumentSymbol> {
    let source = document.text();
    document
        .tree
        .root()
        .children
        .iter()
        .filter_map(|node| {
            let (name, kind, anchor, detail) = match node.kind {
                NodeKind::VariableAssignment => {
                    let ident = node.child(NodeKind::Identifier)?;
                    let mut name = ident.text(source).to_string();
                    for o in node.children_of(NodeKind::Override) {
                        name.push(':');
                        name.push_str(o.text(source));
                    }
                    if let Some(flag) = node.child(NodeKind::Flag) {
                        name = format!("{}[{}]", name, flag.text(source));
                    }
                    let detail = node.child(NodeKind::Operator).map(|o| o.text(source).to_string());
                    (name, SymbolKind::VARIABLE, ident, detail)
                }
                NodeKind::ShellFunction | NodeKind::PythonFunction | NodeKind::DefFunction => {
                    let ident = node.child(NodeKind::Identifier)?;
                    let detail = match node.kind {
                        NodeKind::ShellFunction => "shell",
                        _ => "python",
                    };
                    (ident.text(source).to_string(), SymbolKind::FUNCTION, ident, Some(detail.to_string()))
                }
                NodeKind::AnonymousPythonFunction => {
                    let anchor = node.keyword(source, "python").unwrap_or(node);
                    (
                        crate::analysis::ANONYMOUS_FUNCTION.to_string(),
                        SymbolKind::FUNCTION,
                        anchor,
                        Some("python".to_string()),
                    )
                }
                NodeKind::InheritDirective | NodeKind::IncludeDirective | NodeKind::RequireDirective => {
                    let keyword = node.child(NodeKind::Keyword)?;
                    let arguments: Vec<&str> = node
                        .children_of(NodeKind::DirectiveArgument)
                        .map(|a| a.text(source))
                        .collect();
                    (
                        arguments.join(" "),
                        SymbolKind::MODULE,
                        keyword,
                        Some(keyword.text(source).to_string()),
                    )
                }
                _ => return None,
            };
            Some(symbol(document, node, anchor, name, kind, detail))
        })
        .collect()
}

#[allow(deprecated)]
fn symbol(
    document: &AnalyzedDocument,
    node: &Node,
    anchor: &Node,
    name: String,
    kind: SymbolKind,
    detail: Option<String>,
) -> DocumentSymbol {
    DocumentSymbol {
        name,
        detail,
        kind,
        tags: None,
        deprecated: None,
        range: document.lines.range_of(node.byte_range()),
        selection_range: document.lines.range_of(anchor.byte_range()),
        children: None,
    }
}
