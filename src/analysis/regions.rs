use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::syntax::{Node, NodeKind, Tree};

/// Embedded sub-language of a recipe region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubLanguage {
    /// POSIX shell / bash task bodies
    Shell,
    /// Python functions and inline `${@...}` expressions
    Dynamic,
}

impl SubLanguage {
    pub const ALL: [SubLanguage; 2] = [SubLanguage::Shell, SubLanguage::Dynamic];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubLanguage::Shell => "shell",
            SubLanguage::Dynamic => "python",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SubLanguage::Shell => "sh",
            SubLanguage::Dynamic => "py",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "sh" => Some(SubLanguage::Shell),
            "py" => Some(SubLanguage::Dynamic),
            _ => None,
        }
    }
}

impl std::fmt::Display for SubLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "shell" | "sh" | "bash" => Ok(SubLanguage::Shell),
            "python" | "py" | "dynamic" => Ok(SubLanguage::Dynamic),
            other => Err(format!("unknown sub-language: {other}")),
        }
    }
}

/// A contiguous byte span of the recipe written in one sub-language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub language: SubLanguage,
    pub range: Range<usize>,
    /// Node that produced the region
    pub kind: NodeKind,
}

impl Region {
    pub fn contains(&self, offset: usize) -> bool {
        self.range.start <= offset && offset < self.range.end
    }
}

/// Classifies embedded code spans, ordered by start offset.
pub fn extract_regions(tree: &Tree) -> Vec<Region> {
    let mut regions = Vec::new();
    for child in &tree.root().children {
        collect(child, &mut regions);
    }
    regions.sort_by_key(|r| (r.range.start, r.range.end));
    regions
}

fn collect(node: &Node, out: &mut Vec<Region>) {
    match node.kind {
        NodeKind::ShellFunction => {
            // a leading `fakeroot` is not shell
            let start = node
                .child(NodeKind::Identifier)
                .map(|n| n.start_byte)
                .unwrap_or(node.start_byte);
            out.push(Region {
                language: SubLanguage::Shell,
                range: start..node.end_byte,
                kind: node.kind,
            });
            for child in &node.children {
                collect(child, out);
            }
        }
        NodeKind::PythonFunction | NodeKind::AnonymousPythonFunction | NodeKind::DefFunction => {
            out.push(Region {
                language: SubLanguage::Dynamic,
                range: node.byte_range(),
                kind: node.kind,
            });
        }
        NodeKind::InlinePython => {
            if let Some(expr) = node.child(NodeKind::PythonExpression) {
                out.push(Region {
                    language: SubLanguage::Dynamic,
                    range: expr.byte_range(),
                    kind: node.kind,
                });
            }
        }
        NodeKind::Error | NodeKind::Comment => {}
        NodeKind::Recipe
        | NodeKind::VariableAssignment
        | NodeKind::Unset
        | NodeKind::Export
        | NodeKind::Identifier
        | NodeKind::Override
        | NodeKind::Flag
        | NodeKind::Operator
        | NodeKind::Value
        | NodeKind::VariableExpansion
        | NodeKind::PythonExpression
        | NodeKind::Parameters
        | NodeKind::Block
        | NodeKind::Keyword
        | NodeKind::InheritDirective
        | NodeKind::IncludeDirective
        | NodeKind::RequireDirective
        | NodeKind::DirectiveArgument
        | NodeKind::TaskStatement => {
            for child in &node.children {
                collect(child, out);
            }
        }
    }
}

/// Sub-language at `offset`; a Dynamic region nested in a Shell one wins.
pub fn language_at(regions: &[Region], offset: usize) -> Option<SubLanguage> {
    let mut found = None;
    for region in regions.iter().filter(|r| r.contains(offset)) {
        match region.language {
            SubLanguage::Dynamic => return Some(SubLanguage::Dynamic),
            SubLanguage::Shell => found = Some(SubLanguage::Shell),
        }
    }
    found
}

pub fn regions_of(regions: &[Region], language: SubLanguage) -> impl Iterator<Item = &Region> {
    regions.iter().filter(move |r| r.language == language)
}

pub fn has_language(regions: &[Region], language: SubLanguage) -> bool {
    regions_of(regions, language).next().is_some()
}
