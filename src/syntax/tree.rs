use std::ops::Range;

/// Row/column pair; the column is a byte offset within the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Point {
    pub row: usize,
    pub column: usize,
}

impl Point {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// Closed set of recipe syntax node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Recipe,
    Comment,
    /// `[export] NAME[:override...][[flag]] OP VALUE`
    VariableAssignment,
    /// `unset NAME` / `unset NAME[flag]`
    Unset,
    /// `export NAME` without a value
    Export,
    Identifier,
    Override,
    Flag,
    Operator,
    Value,
    /// `${NAME}`
    VariableExpansion,
    /// `${@expr}`; its single child is the `PythonExpression`
    InlinePython,
    PythonExpression,
    /// `[fakeroot] name() { ... }`
    ShellFunction,
    /// `[fakeroot] python name() { ... }`
    PythonFunction,
    /// `python () { ... }` / `python __anonymous () { ... }`
    AnonymousPythonFunction,
    /// Top-level `def name(args):` with an indented body
    DefFunction,
    Parameters,
    /// Braced body, including both braces
    Block,
    Keyword,
    InheritDirective,
    IncludeDirective,
    RequireDirective,
    DirectiveArgument,
    /// `addtask`, `deltask`, `addhandler`, `EXPORT_FUNCTIONS`
    TaskStatement,
    Error,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Recipe => "recipe",
            NodeKind::Comment => "comment",
            NodeKind::VariableAssignment => "variable_assignment",
            NodeKind::Unset => "unset_statement",
            NodeKind::Export => "export_statement",
            NodeKind::Identifier => "identifier",
            NodeKind::Override => "override",
            NodeKind::Flag => "flag",
            NodeKind::Operator => "operator",
            NodeKind::Value => "value",
            NodeKind::VariableExpansion => "variable_expansion",
            NodeKind::InlinePython => "inline_python",
            NodeKind::PythonExpression => "python_expression",
            NodeKind::ShellFunction => "function_definition",
            NodeKind::PythonFunction => "python_function_definition",
            NodeKind::AnonymousPythonFunction => "anonymous_python_function",
            NodeKind::DefFunction => "def_function_definition",
            NodeKind::Parameters => "parameters",
            NodeKind::Block => "block",
            NodeKind::Keyword => "keyword",
            NodeKind::InheritDirective => "inherit_directive",
            NodeKind::IncludeDirective => "include_directive",
            NodeKind::RequireDirective => "require_directive",
            NodeKind::DirectiveArgument => "directive_argument",
            NodeKind::TaskStatement => "task_statement",
            NodeKind::Error => "ERROR",
        }
    }

    pub fn is_directive(&self) -> bool {
        matches!(
            self,
            NodeKind::InheritDirective | NodeKind::IncludeDirective | NodeKind::RequireDirective
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub start_byte: usize,
    pub end_byte: usize,
    pub start: Point,
    pub end: Point,
    pub children: Vec<Node>,
}

impl Node {
    pub fn byte_range(&self) -> Range<usize> {
        self.start_byte..self.end_byte
    }

    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start_byte..self.end_byte).unwrap_or("")
    }

    pub fn is_error(&self) -> bool {
        self.kind == NodeKind::Error
    }

    pub fn contains_byte(&self, offset: usize) -> bool {
        self.start_byte <= offset && offset < self.end_byte
    }

    pub fn child(&self, kind: NodeKind) -> Option<&Node> {
        self.children.iter().find(|c| c.kind == kind)
    }

    pub fn children_of(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(move |c| c.kind == kind)
    }

    /// Keyword child with the given text, e.g. `python` or `export`.
    pub fn keyword<'n>(&'n self, source: &str, word: &str) -> Option<&'n Node> {
        self.children_of(NodeKind::Keyword)
            .find(|k| k.text(source) == word)
    }

    fn visit_inner<F>(&self, visitor: &mut F)
    where
        F: FnMut(&Node) -> bool,
    {
        if visitor(self) {
            for child in &self.children {
                child.visit_inner(visitor);
            }
        }
    }

    fn find_inner<'n, F>(&'n self, predicate: &mut F) -> Option<&'n Node>
    where
        F: FnMut(&Node) -> bool,
    {
        if predicate(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_inner(predicate))
    }

    fn descendant_at(&self, offset: usize) -> &Node {
        for child in &self.children {
            let inside = child.contains_byte(offset)
                || (child.start_byte == child.end_byte && child.start_byte == offset);
            if inside {
                return child.descendant_at(offset);
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    root: Node,
}

impl Tree {
    pub(crate) fn new(root: Node) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Depth-first pre-order walk. The visitor returns `true` to descend
    /// into the children of the node it was given.
    pub fn visit<F>(&self, mut visitor: F)
    where
        F: FnMut(&Node) -> bool,
    {
        self.root.visit_inner(&mut visitor);
    }

    /// Depth-first search that stops at the first node matching `predicate`.
    pub fn find<F>(&self, mut predicate: F) -> Option<&Node>
    where
        F: FnMut(&Node) -> bool,
    {
        self.root.find_inner(&mut predicate)
    }

    /// Deepest node containing the byte offset.
    pub fn node_at_byte(&self, offset: usize) -> Option<&Node> {
        if offset > self.root.end_byte {
            return None;
        }
        Some(self.root.descendant_at(offset))
    }

    /// Deepest node containing the point (`column` in bytes).
    pub fn node_at(&self, row: usize, column: usize) -> Option<&Node> {
        let target = Point::new(row, column);
        let mut node = &self.root;
        if target > node.end {
            return None;
        }
        'descend: loop {
            for child in &node.children {
                if child.start <= target && target < child.end {
                    node = child;
                    continue 'descend;
                }
            }
            return Some(node);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.find(|n| n.is_error()).is_some()
    }

    pub fn errors(&self) -> Vec<&Node> {
        let mut errors = Vec::new();
        collect_errors(&self.root, &mut errors);
        errors
    }
}

fn collect_errors<'n>(node: &'n Node, out: &mut Vec<&'n Node>) {
    if node.is_error() {
        out.push(node);
        return;
    }
    for child in &node.children {
        collect_errors(child, out);
    }
}
