//! Total parser for BitBake recipe syntax.
//!
//! The parser is line oriented, the same way BitBake reads recipes: every
//! top-level statement starts on a fresh line, backslash continuations join
//! physical lines, and braced function bodies run until a line whose only
//! content is `}`. Anything that cannot be classified becomes an `Error` node
//! spanning the offending logical line, after which parsing resumes on the
//! next line. Parsing never fails.

use super::line_index::LineIndex;
use super::tree::{Node, NodeKind, Point, Tree};

const OPERATORS: &[&str] = &["??=", "?=", ":=", "+=", "=+", ".=", "=.", "="];
const TASK_KEYWORDS: &[&str] = &["addtask", "deltask", "addhandler", "EXPORT_FUNCTIONS"];
const TASK_ORDERING: &[&str] = &["after", "before"];

pub fn parse(text: &str) -> Tree {
    RecipeParser::new(text).parse()
}

struct RecipeParser<'s> {
    src: &'s str,
    bytes: &'s [u8],
    index: LineIndex,
}

impl<'s> RecipeParser<'s> {
    fn new(src: &'s str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: LineIndex::new(src),
        }
    }

    fn parse(&self) -> Tree {
        let mut children = Vec::new();
        let mut pos = 0;
        while pos < self.bytes.len() {
            pos = self.skip_blank(pos);
            if pos >= self.bytes.len() {
                break;
            }
            let (node, next) = self.statement(pos);
            children.push(node);
            pos = next.max(pos + 1);
        }
        Tree::new(self.node(NodeKind::Recipe, 0, self.bytes.len(), children))
    }

    // ---- low level helpers ----

    fn point(&self, offset: usize) -> Point {
        let row = self.index.line_of(offset);
        let start = self.index.line_start(row).unwrap_or(0);
        Point::new(row, offset - start)
    }

    fn node(&self, kind: NodeKind, start: usize, end: usize, children: Vec<Node>) -> Node {
        Node {
            kind,
            start_byte: start,
            end_byte: end,
            start: self.point(start),
            end: self.point(end),
            children,
        }
    }

    fn leaf(&self, kind: NodeKind, start: usize, end: usize) -> Node {
        self.node(kind, start, end, Vec::new())
    }

    fn skip_blank(&self, mut pos: usize) -> usize {
        while pos < self.bytes.len() && self.bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        pos
    }

    fn skip_inline_ws(&self, mut pos: usize) -> usize {
        while pos < self.bytes.len() && matches!(self.bytes[pos], b' ' | b'\t') {
            pos += 1;
        }
        pos
    }

    /// Offset of the `\n` ending the physical line (or the text length).
    fn line_end(&self, pos: usize) -> usize {
        self.bytes[pos.min(self.bytes.len())..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i)
            .unwrap_or(self.bytes.len())
    }

    /// End of the logical line starting at `pos`, following `\` continuations.
    fn logical_end(&self, pos: usize) -> usize {
        let mut p = pos;
        loop {
            let end = self.line_end(p);
            let content_end = self.trim_cr(p, end);
            if content_end > p && self.bytes[content_end - 1] == b'\\' && end < self.bytes.len() {
                p = end + 1;
                continue;
            }
            return end;
        }
    }

    fn trim_cr(&self, start: usize, end: usize) -> usize {
        if end > start && self.bytes[end - 1] == b'\r' {
            end - 1
        } else {
            end
        }
    }

    fn next_line(&self, pos: usize) -> usize {
        (self.line_end(pos) + 1).min(self.bytes.len())
    }

    fn starts_with_word(&self, pos: usize, word: &str) -> bool {
        let end = pos + word.len();
        self.src.get(pos..end) == Some(word)
            && self
                .bytes
                .get(end)
                .is_some_and(|b| b.is_ascii_whitespace())
    }

    fn is_name_byte(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'+' | b'/' | b'~' | b':')
    }

    fn is_function_name_byte(b: u8) -> bool {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'+' | b':')
    }

    /// Scans a variable or function name, treating `${...}` as part of it.
    fn scan_name(&self, mut pos: usize, function: bool) -> usize {
        while pos < self.bytes.len() {
            let b = self.bytes[pos];
            if b == b'$' && self.bytes.get(pos + 1) == Some(&b'{') {
                match self.matching_brace(pos + 2, self.line_end(pos)) {
                    Some(close) => pos = close + 1,
                    None => break,
                }
            } else if (function && Self::is_function_name_byte(b)) || (!function && Self::is_name_byte(b)) {
                pos += 1;
            } else {
                break;
            }
        }
        pos
    }

    /// Finds the `}` closing a brace opened just before `from`, skipping
    /// nested braces and quoted strings.
    fn matching_brace(&self, from: usize, limit: usize) -> Option<usize> {
        let mut depth = 1usize;
        let mut i = from;
        while i < limit {
            match self.bytes[i] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                quote @ (b'\'' | b'"') => {
                    let mut j = i + 1;
                    while j < limit && self.bytes[j] != quote {
                        if self.bytes[j] == b'\\' {
                            j += 1;
                        }
                        j += 1;
                    }
                    i = j;
                }
                _ => {}
            }
            i += 1;
        }
        None
    }

    fn error_line(&self, start: usize) -> (Node, usize) {
        let end = self.logical_end(start);
        let end = self.trim_cr(start, end);
        (self.leaf(NodeKind::Error, start, end), self.next_line(end))
    }

    // ---- statements ----

    fn statement(&self, start: usize) -> (Node, usize) {
        match self.bytes[start] {
            b'#' => {
                let end = self.trim_cr(start, self.line_end(start));
                return (self.leaf(NodeKind::Comment, start, end), self.next_line(end));
            }
            b'}' => return self.error_line(start),
            _ => {}
        }

        if self.starts_with_word(start, "def") {
            return self.def_function(start);
        }
        for (word, kind) in [
            ("inherit_defer", NodeKind::InheritDirective),
            ("inherit", NodeKind::InheritDirective),
            ("include_all", NodeKind::IncludeDirective),
            ("include", NodeKind::IncludeDirective),
            ("require", NodeKind::RequireDirective),
        ] {
            if self.starts_with_word(start, word) {
                return self.directive(start, word.len(), kind);
            }
        }
        for word in TASK_KEYWORDS {
            if self.starts_with_word(start, word) {
                return self.task_statement(start, word.len());
            }
        }
        if self.starts_with_word(start, "unset") {
            return self.unset(start);
        }
        if self.starts_with_word(start, "export") {
            return self.export(start);
        }
        if self.is_python_keyword(start) || self.starts_with_word(start, "fakeroot") {
            return self.function(start, Vec::new());
        }
        self.assignment_or_function(start, Vec::new())
    }

    fn is_python_keyword(&self, pos: usize) -> bool {
        self.src.get(pos..pos + 6) == Some("python")
            && self
                .bytes
                .get(pos + 6)
                .is_some_and(|&b| b.is_ascii_whitespace() || b == b'(')
    }

    fn directive(&self, start: usize, keyword_len: usize, kind: NodeKind) -> (Node, usize) {
        let keyword = self.leaf(NodeKind::Keyword, start, start + keyword_len);
        let end = self.trim_cr(start, self.logical_end(start));
        let args_start = start + keyword_len;

        let mut arguments = Vec::new();
        if kind == NodeKind::InheritDirective {
            let mut pos = args_start;
            while pos < end {
                pos = self.skip_argument_separator(pos, end);
                if pos >= end || self.bytes[pos] == b'#' {
                    break;
                }
                let arg_end = self.scan_argument(pos, end);
                arguments.push(self.argument(pos, arg_end));
                pos = arg_end;
            }
        } else {
            let arg_start = self.skip_argument_separator(args_start, end);
            let mut arg_end = end;
            while arg_end > arg_start && self.bytes[arg_end - 1].is_ascii_whitespace() {
                arg_end -= 1;
            }
            if arg_end > arg_start {
                arguments.push(self.argument(arg_start, arg_end));
            }
        }

        if arguments.is_empty() {
            return (self.leaf(NodeKind::Error, start, end), self.next_line(end));
        }

        let mut children = vec![keyword];
        children.extend(arguments);
        (self.node(kind, start, end, children), self.next_line(end))
    }

    fn skip_argument_separator(&self, mut pos: usize, end: usize) -> usize {
        while pos < end {
            let b = self.bytes[pos];
            if b.is_ascii_whitespace() {
                pos += 1;
            } else if b == b'\\' && self.bytes.get(pos + 1).is_some_and(|&n| n == b'\n' || n == b'\r') {
                pos += 2;
            } else {
                break;
            }
        }
        pos
    }

    fn scan_argument(&self, mut pos: usize, end: usize) -> usize {
        while pos < end {
            let b = self.bytes[pos];
            if b == b'$' && self.bytes.get(pos + 1) == Some(&b'{') {
                match self.matching_brace(pos + 2, end) {
                    Some(close) => pos = close + 1,
                    None => return end,
                }
            } else if b.is_ascii_whitespace() || b == b'\\' {
                break;
            } else {
                pos += 1;
            }
        }
        pos
    }

    fn argument(&self, start: usize, end: usize) -> Node {
        let children = self.expansions(start, end);
        self.node(NodeKind::DirectiveArgument, start, end, children)
    }

    fn task_statement(&self, start: usize, keyword_len: usize) -> (Node, usize) {
        let end = self.trim_cr(start, self.logical_end(start));
        let mut children = vec![self.leaf(NodeKind::Keyword, start, start + keyword_len)];
        let mut pos = start + keyword_len;
        while pos < end {
            pos = self.skip_argument_separator(pos, end);
            if pos >= end || self.bytes[pos] == b'#' {
                break;
            }
            let word_end = self.scan_argument(pos, end);
            if word_end == pos {
                pos += 1;
                continue;
            }
            let word = &self.src[pos..word_end];
            let kind = if TASK_ORDERING.contains(&word) {
                NodeKind::Keyword
            } else {
                NodeKind::Identifier
            };
            children.push(self.leaf(kind, pos, word_end));
            pos = word_end;
        }
        (self.node(NodeKind::TaskStatement, start, end, children), self.next_line(end))
    }

    fn unset(&self, start: usize) -> (Node, usize) {
        let keyword = self.leaf(NodeKind::Keyword, start, start + 5);
        let name_start = self.skip_inline_ws(start + 5);
        let name_end = self.scan_name(name_start, false);
        if name_end == name_start {
            return self.error_line(start);
        }
        let mut children = vec![keyword];
        children.extend(self.name_parts(name_start, name_end));
        let mut end = name_end;
        if let Some(flag) = self.flag(name_end) {
            end = flag.end_byte + 1;
            children.push(flag);
        }
        (self.node(NodeKind::Unset, start, end, children), self.next_line(end))
    }

    fn export(&self, start: usize) -> (Node, usize) {
        let keyword = self.leaf(NodeKind::Keyword, start, start + 6);
        let name_start = self.skip_inline_ws(start + 6);
        let name_end = self.scan_name(name_start, false);
        if name_end == name_start {
            return self.error_line(start);
        }
        let after = self.skip_inline_ws(name_end);
        let line_done = after >= self.bytes.len()
            || matches!(self.bytes[after], b'\n' | b'\r' | b'#');
        if line_done {
            let children = vec![keyword, self.leaf(NodeKind::Identifier, name_start, name_end)];
            return (self.node(NodeKind::Export, start, name_end, children), self.next_line(name_end));
        }
        self.assignment_or_function_at(start, name_start, vec![keyword])
    }

    fn assignment_or_function(&self, start: usize, keywords: Vec<Node>) -> (Node, usize) {
        self.assignment_or_function_at(start, start, keywords)
    }

    fn assignment_or_function_at(
        &self,
        start: usize,
        name_start: usize,
        keywords: Vec<Node>,
    ) -> (Node, usize) {
        let function_end = self.scan_name(name_start, true);
        let after_function_name = self.skip_inline_ws(function_end);
        if function_end > name_start && self.bytes.get(after_function_name) == Some(&b'(') {
            return self.function_at(start, name_start, keywords, false);
        }
        self.assignment(start, name_start, keywords)
    }

    fn flag(&self, pos: usize) -> Option<Node> {
        if self.bytes.get(pos) != Some(&b'[') {
            return None;
        }
        let line_end = self.line_end(pos);
        let close = self.bytes[pos..line_end].iter().position(|&b| b == b']')? + pos;
        Some(self.leaf(NodeKind::Flag, pos + 1, close))
    }

    /// Splits `NAME:override:${PN}` into an identifier and override nodes.
    fn name_parts(&self, start: usize, end: usize) -> Vec<Node> {
        let mut parts = Vec::new();
        let mut segment_start = start;
        let mut i = start;
        while i <= end {
            let at_end = i == end;
            if !at_end && self.bytes[i] == b'$' && self.bytes.get(i + 1) == Some(&b'{') {
                if let Some(close) = self.matching_brace(i + 2, end) {
                    i = close + 1;
                    continue;
                }
            }
            if at_end || self.bytes[i] == b':' {
                if i > segment_start {
                    let kind = if parts.is_empty() {
                        NodeKind::Identifier
                    } else {
                        NodeKind::Override
                    };
                    let children = if kind == NodeKind::Override {
                        self.expansions(segment_start, i)
                    } else {
                        Vec::new()
                    };
                    parts.push(self.node(kind, segment_start, i, children));
                }
                segment_start = i + 1;
            }
            i += 1;
        }
        parts
    }

    fn assignment(&self, start: usize, name_start: usize, keywords: Vec<Node>) -> (Node, usize) {
        let mut name_end = self.scan_name(name_start, false);
        if name_end == name_start {
            return self.error_line(start);
        }
        // `FOO:= "x"`: the colon belongs to the operator
        if self.bytes[name_end - 1] == b':' && self.bytes.get(name_end) == Some(&b'=') {
            name_end -= 1;
        }

        let mut children = keywords;
        children.extend(self.name_parts(name_start, name_end));

        let mut pos = name_end;
        if let Some(flag) = self.flag(pos) {
            pos = flag.end_byte + 1;
            children.push(flag);
        }
        pos = self.skip_inline_ws(pos);

        let operator = OPERATORS
            .iter()
            .find(|op| self.src.get(pos..pos + op.len()) == Some(**op));
        let Some(operator) = operator else {
            return self.error_line(start);
        };
        children.push(self.leaf(NodeKind::Operator, pos, pos + operator.len()));
        pos = self.skip_inline_ws(pos + operator.len());

        let value = match self.bytes.get(pos) {
            Some(&quote @ (b'"' | b'\'')) => match self.quoted_end(pos, quote) {
                Some(end) => {
                    let inner = self.expansions(pos + 1, end - 1);
                    self.node(NodeKind::Value, pos, end, inner)
                }
                None => return self.error_line(start),
            },
            _ => {
                let end = self.trim_cr(pos, self.logical_end(pos));
                let mut end = end;
                while end > pos && self.bytes[end - 1].is_ascii_whitespace() {
                    end -= 1;
                }
                let inner = self.expansions(pos, end);
                self.node(NodeKind::Value, pos, end, inner)
            }
        };
        let end = value.end_byte;
        children.push(value);
        (
            self.node(NodeKind::VariableAssignment, start, end, children),
            self.next_line(end),
        )
    }

    /// Returns the offset just past the closing quote.
    fn quoted_end(&self, open: usize, quote: u8) -> Option<usize> {
        let mut i = open + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b'\n' => return None,
                b if b == quote => return Some(i + 1),
                _ => i += 1,
            }
        }
        None
    }

    /// `${VAR}` and `${@...}` nodes inside `[from, to)`.
    fn expansions(&self, from: usize, to: usize) -> Vec<Node> {
        let mut nodes = Vec::new();
        let mut i = from;
        while i + 1 < to {
            if self.bytes[i] != b'$' || self.bytes[i + 1] != b'{' {
                i += 1;
                continue;
            }
            if self.bytes.get(i + 2) == Some(&b'@') && i + 2 < to {
                match self.matching_brace(i + 3, to) {
                    Some(close) => {
                        let expr = self.leaf(NodeKind::PythonExpression, i + 3, close);
                        nodes.push(self.node(NodeKind::InlinePython, i, close + 1, vec![expr]));
                        i = close + 1;
                    }
                    None => {
                        nodes.push(self.leaf(NodeKind::Error, i, to));
                        i = to;
                    }
                }
                continue;
            }
            let mut j = i + 2;
            while j < to && Self::is_name_byte(self.bytes[j]) {
                j += 1;
            }
            if j < to && self.bytes[j] == b'}' && j > i + 2 {
                let name = self.leaf(NodeKind::Identifier, i + 2, j);
                nodes.push(self.node(NodeKind::VariableExpansion, i, j + 1, vec![name]));
                i = j + 1;
            } else {
                i += 2;
            }
        }
        nodes
    }

    // ---- functions ----

    fn function(&self, start: usize, mut keywords: Vec<Node>) -> (Node, usize) {
        let mut pos = start;
        let mut python = false;
        loop {
            if self.is_python_keyword(pos) {
                keywords.push(self.leaf(NodeKind::Keyword, pos, pos + 6));
                python = true;
                pos = self.skip_inline_ws(pos + 6);
            } else if self.starts_with_word(pos, "fakeroot") {
                keywords.push(self.leaf(NodeKind::Keyword, pos, pos + 8));
                pos = self.skip_inline_ws(pos + 8);
            } else {
                break;
            }
        }
        if !python {
            return self.assignment_or_function_at(start, pos, keywords);
        }
        self.function_at(start, pos, keywords, true)
    }

    fn function_at(
        &self,
        start: usize,
        name_start: usize,
        keywords: Vec<Node>,
        python: bool,
    ) -> (Node, usize) {
        let name_end = self.scan_name(name_start, true);
        let mut pos = self.skip_inline_ws(name_end);
        if self.bytes.get(pos) != Some(&b'(') {
            return self.error_line(start);
        }
        pos = self.skip_inline_ws(pos + 1);
        if self.bytes.get(pos) != Some(&b')') {
            return self.error_line(start);
        }
        pos = self.skip_inline_ws(pos + 1);
        if self.bytes.get(pos) != Some(&b'{') {
            return self.error_line(start);
        }
        let open = pos;
        let Some(close) = self.closing_brace(open) else {
            // unterminated body: flag the header and resume on the next line
            let end = self.trim_cr(start, self.line_end(start));
            return (self.leaf(NodeKind::Error, start, end), self.next_line(end));
        };

        let name = &self.src[name_start..name_end];
        let kind = match (python, name) {
            (true, "" | "__anonymous") => NodeKind::AnonymousPythonFunction,
            (true, _) => NodeKind::PythonFunction,
            (false, "") => return self.error_line(start),
            (false, _) => NodeKind::ShellFunction,
        };

        let block_children = if python {
            Vec::new()
        } else {
            self.expansions(open + 1, close)
        };
        let block = self.node(NodeKind::Block, open, close + 1, block_children);

        let mut children = keywords;
        if name_end > name_start {
            children.push(self.leaf(NodeKind::Identifier, name_start, name_end));
        }
        children.push(block);
        (self.node(kind, start, close + 1, children), self.next_line(close + 1))
    }

    /// Offset of the `}` closing the body opened at `open`.
    fn closing_brace(&self, open: usize) -> Option<usize> {
        let header_end = self.line_end(open);
        let rest = self.src[open + 1..header_end].trim();
        if rest == "}" {
            return self.src[open + 1..header_end].find('}').map(|i| open + 1 + i);
        }
        let mut line = header_end + 1;
        while line < self.bytes.len() {
            let end = self.line_end(line);
            let text = &self.src[line..end];
            if text.trim() == "}" {
                return text.find('}').map(|i| line + i);
            }
            line = end + 1;
        }
        None
    }

    fn def_function(&self, start: usize) -> (Node, usize) {
        let keyword = self.leaf(NodeKind::Keyword, start, start + 3);
        let name_start = self.skip_inline_ws(start + 3);
        let mut name_end = name_start;
        while name_end < self.bytes.len()
            && (self.bytes[name_end].is_ascii_alphanumeric() || self.bytes[name_end] == b'_')
        {
            name_end += 1;
        }
        let header_end = self.trim_cr(start, self.line_end(start));
        let paren = self.skip_inline_ws(name_end);
        if name_end == name_start || self.bytes.get(paren) != Some(&b'(') {
            return self.error_line(start);
        }
        let Some(close) = self.src[paren..header_end].find(')').map(|i| paren + i) else {
            return self.error_line(start);
        };
        if !self.src[close..header_end].contains(':') {
            return self.error_line(start);
        }

        // body: following lines that are blank or indented
        let mut end = header_end;
        let mut line = self.next_line(header_end);
        while line < self.bytes.len() {
            let line_end = self.line_end(line);
            let text = &self.src[line..line_end];
            if text.trim().is_empty() {
                line = line_end + 1;
                continue;
            }
            if !text.starts_with(&[' ', '\t'][..]) {
                break;
            }
            end = self.trim_cr(line, line_end);
            line = line_end + 1;
        }

        let children = vec![
            keyword,
            self.leaf(NodeKind::Identifier, name_start, name_end),
            self.leaf(NodeKind::Parameters, paren, close + 1),
        ];
        (self.node(NodeKind::DefFunction, start, end, children), self.next_line(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(tree: &Tree) -> Vec<NodeKind> {
        tree.root().children.iter().map(|n| n.kind).collect()
    }

    #[test]
    fn test_parse_empty() {
        let tree = parse("");
        assert_eq!(tree.root().kind, NodeKind::Recipe);
        assert!(tree.root().children.is_empty());
    }

    #[test]
    fn test_parse_assignments() {
        let src = "FOO = \"1\"\nBAR ?= 'x'\nexport BAZ := \"${FOO}\"\n";
        let tree = parse(src);
        assert_eq!(kinds(&tree), vec![NodeKind::VariableAssignment; 3]);

        let baz = &tree.root().children[2];
        assert!(baz.keyword(src, "export").is_some());
        assert_eq!(baz.child(NodeKind::Identifier).unwrap().text(src), "BAZ");
        assert_eq!(baz.child(NodeKind::Operator).unwrap().text(src), ":=");
        let value = baz.child(NodeKind::Value).unwrap();
        assert_eq!(value.children[0].kind, NodeKind::VariableExpansion);
    }

    #[test]
    fn test_parse_overrides_and_flags() {
        let src = "FILES:${PN}-dev:append = \" x\"\nFOO[doc] = \"d\"\n";
        let tree = parse(src);
        let files = &tree.root().children[0];
        assert_eq!(files.child(NodeKind::Identifier).unwrap().text(src), "FILES");
        let overrides: Vec<&str> = files
            .children_of(NodeKind::Override)
            .map(|o| o.text(src))
            .collect();
        assert_eq!(overrides, vec!["${PN}-dev", "append"]);

        let foo = &tree.root().children[1];
        assert_eq!(foo.child(NodeKind::Flag).unwrap().text(src), "doc");
    }

    #[test]
    fn test_colon_equals_without_space() {
        let src = "FOO:= \"x\"\n";
        let tree = parse(src);
        let node = &tree.root().children[0];
        assert_eq!(node.child(NodeKind::Identifier).unwrap().text(src), "FOO");
        assert_eq!(node.child(NodeKind::Operator).unwrap().text(src), ":=");
    }

    #[test]
    fn test_parse_continuation_value() {
        let src = "SRC_URI = \"file://a \\\n           file://b\"\nX = \"1\"\n";
        let tree = parse(src);
        assert_eq!(kinds(&tree), vec![NodeKind::VariableAssignment; 2]);
        assert_eq!(tree.root().children[0].end.row, 1);
    }

    #[test]
    fn test_parse_shell_function() {
        let src = "do_install() {\n    install -d ${D}${bindir}\n}\n";
        let tree = parse(src);
        let func = &tree.root().children[0];
        assert_eq!(func.kind, NodeKind::ShellFunction);
        assert_eq!(func.child(NodeKind::Identifier).unwrap().text(src), "do_install");
        let block = func.child(NodeKind::Block).unwrap();
        assert_eq!(block.children.len(), 2);
        assert_eq!(func.end, Point::new(2, 1));
    }

    #[test]
    fn test_parse_python_functions() {
        let src = "python do_foo() {\n    bb.note('x')\n}\npython () {\n    pass\n}\nfakeroot python do_bar () {\n}\n";
        let tree = parse(src);
        assert_eq!(
            kinds(&tree),
            vec![
                NodeKind::PythonFunction,
                NodeKind::AnonymousPythonFunction,
                NodeKind::PythonFunction
            ]
        );
        let bar = &tree.root().children[2];
        assert!(bar.keyword(src, "fakeroot").is_some());
        assert!(bar.keyword(src, "python").is_some());
    }

    #[test]
    fn test_parse_def_function() {
        let src = "def helper(d):\n    return d.getVar('PN')\n\nFOO = \"1\"\n";
        let tree = parse(src);
        assert_eq!(kinds(&tree), vec![NodeKind::DefFunction, NodeKind::VariableAssignment]);
        assert_eq!(tree.root().children[0].end.row, 1);
    }

    #[test]
    fn test_parse_directives() {
        let src = "inherit autotools pkgconfig\nrequire recipes/foo/foo.inc\ninclude ${BPN}.inc\n";
        let tree = parse(src);
        assert_eq!(
            kinds(&tree),
            vec![
                NodeKind::InheritDirective,
                NodeKind::RequireDirective,
                NodeKind::IncludeDirective
            ]
        );
        let args: Vec<&str> = tree.root().children[0]
            .children_of(NodeKind::DirectiveArgument)
            .map(|a| a.text(src))
            .collect();
        assert_eq!(args, vec!["autotools", "pkgconfig"]);
        let include_arg = tree.root().children[2].child(NodeKind::DirectiveArgument).unwrap();
        assert_eq!(include_arg.children[0].kind, NodeKind::VariableExpansion);
    }

    #[test]
    fn test_parse_inline_python() {
        let src = "FOO = \"${@d.getVar('X') or '}'}\"\n";
        let tree = parse(src);
        let value = tree.root().children[0].child(NodeKind::Value).unwrap();
        let inline = &value.children[0];
        assert_eq!(inline.kind, NodeKind::InlinePython);
        assert_eq!(inline.children[0].text(src), "d.getVar('X') or '}'");
    }

    #[test]
    fn test_parse_task_statement() {
        let src = "addtask do_deploy after do_compile before do_build\n";
        let tree = parse(src);
        let stmt = &tree.root().children[0];
        let names: Vec<&str> = stmt
            .children_of(NodeKind::Identifier)
            .map(|n| n.text(src))
            .collect();
        assert_eq!(names, vec!["do_deploy", "do_compile", "do_build"]);
    }

    #[test]
    fn test_malformed_input_yields_error_nodes() {
        let src = "this is not bitbake\nFOO = \"ok\"\nBAR = \"unterminated\n";
        let tree = parse(src);
        assert_eq!(
            kinds(&tree),
            vec![NodeKind::Error, NodeKind::VariableAssignment, NodeKind::Error]
        );
        assert!(tree.has_errors());
    }

    #[test]
    fn test_unterminated_function_resumes() {
        let src = "do_install() {\n    true\nFOO = \"1\"\n";
        let tree = parse(src);
        assert_eq!(tree.root().children[0].kind, NodeKind::Error);
        assert!(tree
            .root()
            .children
            .iter()
            .any(|n| n.kind == NodeKind::VariableAssignment));
    }

    #[test]
    fn test_node_at_finds_deepest() {
        let src = "FOO = \"${BAR}\"\n";
        let tree = parse(src);
        let node = tree.node_at(0, 9).unwrap();
        assert_eq!(node.kind, NodeKind::Identifier);
        assert_eq!(node.text(src), "BAR");
    }

    #[test]
    fn test_visit_controls_descent() {
        let src = "do_a() {\n    echo ${X}\n}\n";
        let tree = parse(src);
        let mut seen = Vec::new();
        tree.visit(|n| {
            seen.push(n.kind);
            n.kind != NodeKind::ShellFunction
        });
        assert_eq!(seen, vec![NodeKind::Recipe, NodeKind::ShellFunction]);
    }
}
