use tower_lsp::lsp_types::{
    SemanticToken, SemanticTokenModifier, SemanticTokenType, SemanticTokens, SemanticTokensLegend,
};

use crate::analyzer::AnalyzedDocument;
use crate::syntax::{LineIndex, Node, NodeKind};

pub const TOKEN_TYPES: &[SemanticTokenType] = &[
    SemanticTokenType::KEYWORD,
    SemanticTokenType::VARIABLE,
    SemanticTokenType::FUNCTION,
    SemanticTokenType::COMMENT,
    SemanticTokenType::OPERATOR,
    SemanticTokenType::PROPERTY,
    SemanticTokenType::NAMESPACE,
];

pub const TOKEN_MODIFIERS: &[SemanticTokenModifier] = &[SemanticTokenModifier::DECLARATION];

const KEYWORD: u32 = 0;
const VARIABLE: u32 = 1;
const FUNCTION: u32 = 2;
const COMMENT: u32 = 3;
const OPERATOR: u32 = 4;
const PROPERTY: u32 = 5;
const NAMESPACE: u32 = 6;

const DECLARATION: u32 = 1;

pub fn legend() -> SemanticTokensLegend {
    SemanticTokensLegend {
        token_types: TOKEN_TYPES.to_vec(),
        token_modifiers: TOKEN_MODIFIERS.to_vec(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
    token_type: u32,
    modifiers: u32,
}

fn span(node: &Node, token_type: u32, modifiers: u32) -> Span {
    Span {
        start: node.start_byte,
        end: node.end_byte,
        token_type,
        modifiers,
    }
}

fn collect(document: &AnalyzedDocument) -> Vec<Span> {
    let mut spans = Vec::new();
    document.tree.visit(|node| match node.kind {
        NodeKind::Comment => {
            spans.push(span(node, COMMENT, 0));
            false
        }
        NodeKind::Keyword => {
            spans.push(span(node, KEYWORD, 0));
            false
        }
        NodeKind::Operator => {
            spans.push(span(node, OPERATOR, 0));
            false
        }
        NodeKind::Override | NodeKind::Flag | NodeKind::DirectiveArgument => {
            // expansions inside get their own tokens
            if node.children.is_empty() {
                let token_type = if node.kind == NodeKind::DirectiveArgument {
                    NAMESPACE
                } else {
                    PROPERTY
                };
                spans.push(span(node, token_type, 0));
            }
            true
        }
        NodeKind::VariableAssignment | NodeKind::Unset | NodeKind::Export => {
            if let Some(ident) = node.child(NodeKind::Identifier) {
                spans.push(span(ident, VARIABLE, DECLARATION));
            }
            true
        }
        NodeKind::ShellFunction
        | NodeKind::PythonFunction
        | NodeKind::AnonymousPythonFunction
        | NodeKind::DefFunction => {
            if let Some(ident) = node.child(NodeKind::Identifier) {
                spans.push(span(ident, FUNCTION, DECLARATION));
            }
            true
        }
        NodeKind::TaskStatement => {
            for ident in node.children_of(NodeKind::Identifier) {
                spans.push(span(ident, FUNCTION, 0));
            }
            true
        }
        NodeKind::VariableExpansion => {
            if let Some(ident) = node.child(NodeKind::Identifier) {
                spans.push(span(ident, VARIABLE, 0));
            }
            false
        }
        NodeKind::Identifier | NodeKind::Error | NodeKind::InlinePython | NodeKind::PythonExpression => false,
        NodeKind::Recipe
        | NodeKind::Value
        | NodeKind::Parameters
        | NodeKind::Block
        | NodeKind::InheritDirective
        | NodeKind::IncludeDirective
        | NodeKind::RequireDirective => true,
    });
    spans.sort_by_key(|s| (s.start, s.end));
    spans
}

/// Delta-encoded tokens for the whole document. Tokens spanning lines are
/// split per line.
pub fn semantic_tokens(document: &AnalyzedDocument) -> SemanticTokens {
    let lines = &document.lines;
    let mut data = Vec::new();
    let mut previous = (0u32, 0u32);

    for s in collect(document) {
        for (line, start_char, length) in line_segments(lines, s.start, s.end) {
            let delta_line = line - previous.0;
            let delta_start = if delta_line == 0 {
                start_char - previous.1
            } else {
                start_char
            };
            data.push(SemanticToken {
                delta_line,
                delta_start,
                length,
                token_type: s.token_type,
                token_modifiers_bitset: s.modifiers,
            });
            previous = (line, start_char);
        }
    }

    SemanticTokens {
        result_id: None,
        data,
    }
}

/// `(line, start character, length)` per line covered by `start..end`,
/// in UTF-16 units.
fn line_segments(lines: &LineIndex, start: usize, end: usize) -> Vec<(u32, u32, u32)> {
    let mut segments = Vec::new();
    let mut from = start;
    while from < end {
        let line = lines.line_of(from);
        let line_end = lines.line_end(line).unwrap_or(end).min(end);
        let a = lines.position_at(from);
        let b = lines.position_at(line_end);
        if b.character > a.character {
            segments.push((a.line, a.character, b.character - a.character));
        }
        match lines.line_start(line + 1) {
            Some(next) if next > from => from = next,
            _ => break,
        }
    }
    segments
}
