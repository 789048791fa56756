use std::collections::BTreeMap;

use serde::Serialize;
use tower_lsp::lsp_types::{Location, Url};

use crate::syntax::{LineIndex, Node, NodeKind, Tree};

/// Name recorded for `python () { ... }` blocks.
pub const ANONYMOUS_FUNCTION: &str = "__anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Variable,
    Function,
}

/// A global binding and the identifier that declares it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Declaration {
    pub name: String,
    pub kind: DeclarationKind,
    pub location: Location,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    pub exported: bool,
}

pub type DeclarationTable = BTreeMap<String, Declaration>;

/// Indexes the global declarations of one document. Later declarations of
/// the same name replace earlier ones.
pub fn index_declarations(tree: &Tree, lines: &LineIndex, uri: &Url) -> DeclarationTable {
    let mut indexer = DeclarationIndexer {
        source: lines.text(),
        lines,
        uri,
        table: DeclarationTable::new(),
    };
    tree.visit(|node| indexer.visit(node));
    indexer.table
}

struct DeclarationIndexer<'a> {
    source: &'a str,
    lines: &'a LineIndex,
    uri: &'a Url,
    table: DeclarationTable,
}

impl DeclarationIndexer<'_> {
    /// Returns whether to descend into the node.
    fn visit(&mut self, node: &Node) -> bool {
        match node.kind {
            NodeKind::Recipe => true,
            NodeKind::VariableAssignment => {
                self.variable(node);
                false
            }
            NodeKind::ShellFunction | NodeKind::PythonFunction | NodeKind::DefFunction => {
                if let Some(name) = node.child(NodeKind::Identifier) {
                    self.function(name.text(self.source).to_string(), name);
                }
                false
            }
            NodeKind::AnonymousPythonFunction => {
                let anchor = node
                    .child(NodeKind::Identifier)
                    .or_else(|| node.keyword(self.source, "python"))
                    .unwrap_or(node);
                self.function(ANONYMOUS_FUNCTION.to_string(), anchor);
                false
            }
            NodeKind::Error
            | NodeKind::Comment
            | NodeKind::Unset
            | NodeKind::Export
            | NodeKind::Identifier
            | NodeKind::Override
            | NodeKind::Flag
            | NodeKind::Operator
            | NodeKind::Value
            | NodeKind::VariableExpansion
            | NodeKind::InlinePython
            | NodeKind::PythonExpression
            | NodeKind::Parameters
            | NodeKind::Block
            | NodeKind::Keyword
            | NodeKind::InheritDirective
            | NodeKind::IncludeDirective
            | NodeKind::RequireDirective
            | NodeKind::DirectiveArgument
            | NodeKind::TaskStatement => false,
        }
    }

    fn location(&self, node: &Node) -> Location {
        Location::new(self.uri.clone(), self.lines.range_of(node.byte_range()))
    }

    fn variable(&mut self, node: &Node) {
        let Some(ident) = node.child(NodeKind::Identifier) else {
            return;
        };
        let name = ident.text(self.source).to_string();
        // `VAR[flag] = ...` only stands in until the variable itself is set
        let flag = node.child(NodeKind::Flag).map(|f| f.text(self.source).to_string());
        if flag.is_some() && self.table.contains_key(&name) {
            return;
        }
        let declaration = Declaration {
            location: self.location(ident),
            kind: DeclarationKind::Variable,
            overrides: node
                .children_of(NodeKind::Override)
                .map(|o| o.text(self.source).to_string())
                .collect(),
            operator: node
                .child(NodeKind::Operator)
                .map(|o| o.text(self.source).to_string()),
            value: node
                .child(NodeKind::Value)
                .map(|v| literal_value(v.text(self.source))),
            flag,
            exported: node.keyword(self.source, "export").is_some(),
            name: name.clone(),
        };
        self.table.insert(name, declaration);
    }

    fn function(&mut self, name: String, anchor: &Node) {
        let declaration = Declaration {
            location: self.location(anchor),
            kind: DeclarationKind::Function,
            overrides: Vec::new(),
            operator: None,
            value: None,
            flag: None,
            exported: false,
            name: name.clone(),
        };
        self.table.insert(name, declaration);
    }
}

/// Strips the surrounding quotes and joins backslash continuations.
pub fn literal_value(raw: &str) -> String {
    let trimmed = raw.trim();
    let inner = match trimmed.as_bytes().first() {
        Some(&q @ (b'"' | b'\'')) if trimmed.len() >= 2 && trimmed.as_bytes()[trimmed.len() - 1] == q => {
            &trimmed[1..trimmed.len() - 1]
        }
        _ => trimmed,
    };
    inner.replace("\\\r\n", "").replace("\\\n", "")
}

/// Whether `name` can be exported to a POSIX shell.
pub fn is_shell_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;
    use tower_lsp::lsp_types::{Position, Range};

    fn index(src: &str) -> DeclarationTable {
        let uri = Url::parse("file:///recipe.bb").unwrap();
        index_declarations(&parse(src), &LineIndex::new(src), &uri)
    }

    #[test]
    fn test_last_write_wins() {
        let table = index("FOO = \"1\"\nFOO = \"2\"\n");
        assert_eq!(table.len(), 1);
        let foo = &table["FOO"];
        assert_eq!(foo.location.range.start.line, 1);
        assert_eq!(foo.value.as_deref(), Some("2"));
        assert_eq!(
            foo.location.range,
            Range::new(Position::new(1, 0), Position::new(1, 3))
        );
    }

    #[test]
    fn test_functions_and_anonymous() {
        let table = index(
            "do_install() {\n}\npython do_py() {\n}\npython () {\n    pass\n}\ndef helper(d):\n    pass\n",
        );
        for name in ["do_install", "do_py", ANONYMOUS_FUNCTION, "helper"] {
            assert_eq!(table[name].kind, DeclarationKind::Function, "{name}");
        }
        assert_eq!(table[ANONYMOUS_FUNCTION].location.range.start.line, 4);
    }

    #[test]
    fn test_assignment_details() {
        let table = index("export PATH:prepend:class-native ?= \"/x:\"\n");
        let path = &table["PATH"];
        assert!(path.exported);
        assert_eq!(path.overrides, vec!["prepend", "class-native"]);
        assert_eq!(path.operator.as_deref(), Some("?="));
        assert_eq!(path.value.as_deref(), Some("/x:"));
    }

    #[test]
    fn test_flag_assignment_yields_to_variable() {
        let table = index("FOO = \"1\"\nFOO[doc] = \"about\"\nBAR[doc] = \"b\"\n");
        assert_eq!(table["FOO"].flag, None);
        assert_eq!(table["FOO"].location.range.start.line, 0);
        assert_eq!(table["BAR"].flag.as_deref(), Some("doc"));
    }

    #[test]
    fn test_error_nodes_are_skipped() {
        let table = index("not valid\nBAR = \"unterminated\n");
        assert!(table.is_empty());
    }

    #[test]
    fn test_literal_value_joins_continuations() {
        assert_eq!(literal_value("\"a \\\n b\""), "a  b");
        assert_eq!(literal_value("bare"), "bare");
    }

    #[test]
    fn test_is_shell_identifier() {
        assert!(is_shell_identifier("PN"));
        assert!(is_shell_identifier("_x1"));
        assert!(!is_shell_identifier("1x"));
        assert!(!is_shell_identifier("do-x"));
        assert!(!is_shell_identifier(""));
    }
}
