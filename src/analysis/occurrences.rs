use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types;

use crate::syntax::{LineIndex, Node, NodeKind, Tree};

/// Datastore accessors whose first argument names a variable.
static DATASTORE_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\bd\.(?:getVar|setVar|appendVar|prependVar|delVar|renameVar|getVarFlag|setVarFlag|getVarFlags|setVarFlags|delVarFlag|appendVarFlag|prependVarFlag)\(\s*["']([A-Za-z0-9_\-.+~:]+)["']"#,
    )
    .expect("valid datastore regex")
});

static EXPANSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z0-9_\-.+~:/]+)\}").expect("valid expansion regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OccurrenceKind {
    /// Left-hand side of an assignment, `unset` or `export`
    Assignment,
    /// Name of a shell, python or `def` function
    Function,
    /// `${VAR}`
    Expansion,
    /// `d.getVar("VAR")` and friends
    DatastoreCall,
    /// `addtask` / `deltask` / `EXPORT_FUNCTIONS` operand
    Task,
}

impl OccurrenceKind {
    pub fn is_write(&self) -> bool {
        matches!(self, OccurrenceKind::Assignment | OccurrenceKind::Function)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence {
    pub name: String,
    pub kind: OccurrenceKind,
    pub range: lsp_types::Range,
    pub byte_range: Range<usize>,
}

/// Every place a symbol name appears in a document, in document order.
pub fn collect_occurrences(tree: &Tree, lines: &LineIndex) -> Vec<Occurrence> {
    let mut collector = Collector {
        source: lines.text(),
        lines,
        out: Vec::new(),
    };
    tree.visit(|node| collector.visit(node));
    collector.out.sort_by_key(|o| o.byte_range.start);
    collector.out
}

/// The occurrence under `offset`, if any.
pub fn occurrence_at(occurrences: &[Occurrence], offset: usize) -> Option<&Occurrence> {
    occurrences
        .iter()
        .find(|o| o.byte_range.start <= offset && offset <= o.byte_range.end)
}

struct Collector<'a> {
    source: &'a str,
    lines: &'a LineIndex,
    out: Vec<Occurrence>,
}

impl Collector<'_> {
    fn push(&mut self, name: &str, kind: OccurrenceKind, span: Range<usize>) {
        self.out.push(Occurrence {
            name: name.to_string(),
            kind,
            range: self.lines.range_of(span.clone()),
            byte_range: span,
        });
    }

    fn push_node(&mut self, node: &Node, kind: OccurrenceKind) {
        self.push(node.text(self.source), kind, node.byte_range());
    }

    fn visit(&mut self, node: &Node) -> bool {
        match node.kind {
            NodeKind::VariableAssignment | NodeKind::Unset | NodeKind::Export => {
                if let Some(ident) = node.child(NodeKind::Identifier) {
                    self.push_node(ident, OccurrenceKind::Assignment);
                }
                true
            }
            NodeKind::ShellFunction => {
                if let Some(ident) = node.child(NodeKind::Identifier) {
                    self.push_node(ident, OccurrenceKind::Function);
                }
                true
            }
            NodeKind::PythonFunction | NodeKind::AnonymousPythonFunction | NodeKind::DefFunction => {
                if let Some(ident) = node.child(NodeKind::Identifier) {
                    self.push_node(ident, OccurrenceKind::Function);
                }
                let body_start = node
                    .child(NodeKind::Block)
                    .map(|b| b.start_byte)
                    .or_else(|| node.child(NodeKind::Parameters).map(|p| p.end_byte))
                    .unwrap_or(node.start_byte);
                self.scan_python(body_start..node.end_byte);
                false
            }
            NodeKind::InlinePython => {
                if let Some(expr) = node.child(NodeKind::PythonExpression) {
                    self.scan_python(expr.byte_range());
                }
                false
            }
            NodeKind::VariableExpansion => {
                if let Some(ident) = node.child(NodeKind::Identifier) {
                    self.push_node(ident, OccurrenceKind::Expansion);
                }
                false
            }
            NodeKind::TaskStatement => {
                for ident in node.children_of(NodeKind::Identifier) {
                    self.push_node(ident, OccurrenceKind::Task);
                }
                false
            }
            NodeKind::Error | NodeKind::Comment => false,
            NodeKind::Recipe
            | NodeKind::Identifier
            | NodeKind::Override
            | NodeKind::Flag
            | NodeKind::Operator
            | NodeKind::Value
            | NodeKind::PythonExpression
            | NodeKind::Parameters
            | NodeKind::Block
            | NodeKind::Keyword
            | NodeKind::InheritDirective
            | NodeKind::IncludeDirective
            | NodeKind::RequireDirective
            | NodeKind::DirectiveArgument => true,
        }
    }

    fn scan_python(&mut self, span: Range<usize>) {
        let Some(text) = self.source.get(span.clone()) else {
            return;
        };
        let mut found = Vec::new();
        for caps in DATASTORE_CALL.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                found.push((m.as_str().to_string(), OccurrenceKind::DatastoreCall, m.range()));
            }
        }
        for caps in EXPANSION.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                found.push((m.as_str().to_string(), OccurrenceKind::Expansion, m.range()));
            }
        }
        for (name, kind, range) in found {
            self.push(&name, kind, span.start + range.start..span.start + range.end);
        }
    }
}
