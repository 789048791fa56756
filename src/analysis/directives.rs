use serde::Serialize;
use tower_lsp::lsp_types::Range;

use crate::syntax::{LineIndex, Node, NodeKind, Tree};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    /// `inherit` / `inherit_defer`: classes
    Inherit,
    /// `include`: soft, a miss is not an error
    Include,
    /// `include_all`: every layer's copy of the file
    IncludeAll,
    /// `require`: hard
    Require,
}

impl DirectiveKind {
    fn from_node(node: &Node, source: &str) -> Option<Self> {
        let keyword = node.child(NodeKind::Keyword)?.text(source);
        match (node.kind, keyword) {
            (NodeKind::InheritDirective, _) => Some(DirectiveKind::Inherit),
            (NodeKind::IncludeDirective, "include_all") => Some(DirectiveKind::IncludeAll),
            (NodeKind::IncludeDirective, _) => Some(DirectiveKind::Include),
            (NodeKind::RequireDirective, _) => Some(DirectiveKind::Require),
            _ => None,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, DirectiveKind::Inherit)
    }
}

/// One directive argument; `inherit a b` yields two.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Directive {
    pub kind: DirectiveKind,
    pub argument: String,
    /// Range of the argument
    pub range: Range,
    #[serde(skip)]
    pub byte_range: std::ops::Range<usize>,
}

impl Directive {
    /// `${VAR}` names referenced by the argument.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.argument.as_str();
        while let Some(start) = rest.find("${") {
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    if !after[..end].starts_with('@') {
                        names.push(&after[..end]);
                    }
                    rest = &after[end + 1..];
                }
                None => break,
            }
        }
        names
    }
}

pub fn collect_directives(tree: &Tree, lines: &LineIndex) -> Vec<Directive> {
    let source = lines.text();
    let mut directives = Vec::new();
    for node in &tree.root().children {
        if !node.kind.is_directive() {
            continue;
        }
        let Some(kind) = DirectiveKind::from_node(node, source) else {
            continue;
        };
        for arg in node.children_of(NodeKind::DirectiveArgument) {
            directives.push(Directive {
                kind,
                argument: arg.text(source).to_string(),
                range: lines.range_of(arg.byte_range()),
                byte_range: arg.byte_range(),
            });
        }
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::parse;

    fn directives(src: &str) -> Vec<Directive> {
        collect_directives(&parse(src), &LineIndex::new(src))
    }

    #[test]
    fn test_collect_kinds() {
        let found = directives(
            "inherit image features_check\ninherit_defer native\ninclude a.inc\ninclude_all b.inc\nrequire c.inc\n",
        );
        let kinds: Vec<_> = found.iter().map(|d| (d.kind, d.argument.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (DirectiveKind::Inherit, "image"),
                (DirectiveKind::Inherit, "features_check"),
                (DirectiveKind::Inherit, "native"),
                (DirectiveKind::Include, "a.inc"),
                (DirectiveKind::IncludeAll, "b.inc"),
                (DirectiveKind::Require, "c.inc"),
            ]
        );
        assert_eq!(found[1].range.start.character, 14);
    }

    #[test]
    fn test_variables_skip_inline_python() {
        let found = directives("require ${BPN}-${PV}/${@'x'}.inc\n");
        assert_eq!(found[0].variables(), vec!["BPN", "PV"]);
    }
}
