//! Builds one shadow document per embedded sub-language.
//!
//! The shadow body has exactly the original line structure: every byte
//! outside the selected regions becomes a space (line terminators are
//! kept), region text is copied verbatim, and a small set of rewrites
//! turns recipe-only syntax into code the sub-language accepts. Each
//! rewrite is recorded in the [`OffsetMap`] so positions can be
//! translated in both directions.

use std::ops::Range;
use std::sync::Arc;

use tower_lsp::lsp_types::Url;

use crate::analysis::declarations::is_shell_identifier;
use crate::analysis::{DeclarationKind, DeclarationTable, Region, SubLanguage, ANONYMOUS_FUNCTION};
use crate::embedded::offset_map::OffsetMap;
use crate::syntax::{LineIndex, Node, NodeKind, Tree};

pub const SHELL_HEADER_LINES: usize = 2;
pub const DYNAMIC_HEADER_LINES: usize = 5;

const DYNAMIC_HEADER: &str = "import bb\n\
import os\n\
from bb import data_smart\n\
d = data_smart.DataSmart(); e = bb.event.Event()\n\
_ = lambda *args: args\n";

pub fn header_line_count(language: SubLanguage) -> usize {
    match language {
        SubLanguage::Shell => SHELL_HEADER_LINES,
        SubLanguage::Dynamic => DYNAMIC_HEADER_LINES,
    }
}

/// A synthesized buffer for one sub-language of one document.
#[derive(Debug, Clone)]
pub struct ShadowDocument {
    pub original: Url,
    pub language: SubLanguage,
    content: String,
    header_len: usize,
    map: Arc<OffsetMap>,
    lines: LineIndex,
}

impl ShadowDocument {
    fn new(original: Url, language: SubLanguage, header: String, body: String, map: OffsetMap) -> Self {
        let header_len = header.len();
        let content = header + &body;
        let lines = LineIndex::new(&content);
        Self {
            original,
            language,
            content,
            header_len,
            map: Arc::new(map),
            lines,
        }
    }

    /// Header followed by the body.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn header(&self) -> &str {
        &self.content[..self.header_len]
    }

    pub fn body(&self) -> &str {
        &self.content[self.header_len..]
    }

    pub fn header_lines(&self) -> usize {
        header_line_count(self.language)
    }

    pub fn offset_map(&self) -> &Arc<OffsetMap> {
        &self.map
    }

    /// Line index over [`content`](Self::content).
    pub fn lines(&self) -> &LineIndex {
        &self.lines
    }

    /// Offset in `content` for an original offset.
    pub fn shadow_offset(&self, original: usize) -> Option<usize> {
        self.map.shadow_offset(original).map(|o| o + self.header_len)
    }

    /// Original offset for an offset in `content`; `None` in the header.
    pub fn original_offset(&self, shadow: usize) -> Option<usize> {
        let body = shadow.checked_sub(self.header_len)?;
        self.map.original_offset(body)
    }
}

/// Everything the synthesizer reads from an analyzed document.
pub struct SynthesisInput<'a> {
    pub uri: &'a Url,
    pub source: &'a str,
    pub tree: &'a Tree,
    pub regions: &'a [Region],
    pub declarations: &'a DeclarationTable,
}

/// Builds the shadow document for `language`, or `None` when the document
/// has no region in that language.
pub fn synthesize(input: &SynthesisInput<'_>, language: SubLanguage) -> Option<ShadowDocument> {
    let regions: Vec<&Region> = input
        .regions
        .iter()
        .filter(|r| r.language == language)
        .collect();
    if regions.is_empty() {
        return None;
    }

    let mut plan = Plan::new(input.source);
    for region in regions {
        let Some(node) = region_node(input.tree, region) else {
            continue;
        };
        match language {
            SubLanguage::Shell => plan.shell_region(node, region),
            SubLanguage::Dynamic => plan.dynamic_region(node, region),
        }
    }
    let (body, map) = plan.finish();

    let header = match language {
        SubLanguage::Shell => shell_header(input.declarations),
        SubLanguage::Dynamic => DYNAMIC_HEADER.to_string(),
    };
    Some(ShadowDocument::new(input.uri.clone(), language, header, body, map))
}

fn shell_header(declarations: &DeclarationTable) -> String {
    let names: Vec<&str> = declarations
        .values()
        .filter(|d| d.kind == DeclarationKind::Variable && is_shell_identifier(&d.name))
        .map(|d| d.name.as_str())
        .collect();
    if names.is_empty() {
        "#!/bin/sh\n:\n".to_string()
    } else {
        format!("#!/bin/sh\nexport {}\n", names.join(" "))
    }
}

fn region_node<'t>(tree: &'t Tree, region: &Region) -> Option<&'t Node> {
    tree.find(|n| {
        n.kind == region.kind && n.start_byte <= region.range.start && region.range.end <= n.end_byte
    })
}

/// Copy and rewrite plan for one pass over the original text.
struct Plan<'s> {
    source: &'s str,
    body: Vec<u8>,
    rewrites: Vec<(Range<usize>, String)>,
    /// End of the previous inline expression and the line it was on
    last_inline: Option<(usize, usize)>,
}

impl<'s> Plan<'s> {
    fn new(source: &'s str) -> Self {
        let body = source
            .bytes()
            .map(|b| if b == b'\n' || b == b'\r' { b } else { b' ' })
            .collect();
        Self {
            source,
            body,
            rewrites: Vec::new(),
            last_inline: None,
        }
    }

    fn copy(&mut self, range: Range<usize>) {
        self.body[range.clone()].copy_from_slice(&self.source.as_bytes()[range]);
    }

    fn rewrite(&mut self, range: Range<usize>, text: String) {
        self.rewrites.push((range, text));
    }

    fn shell_region(&mut self, node: &Node, region: &Region) {
        self.copy(region.range.clone());
        if let Some(block) = node.child(NodeKind::Block) {
            for inline in block.children_of(NodeKind::InlinePython) {
                let text = self.source[inline.byte_range()]
                    .bytes()
                    .map(|b| if b == b'\n' || b == b'\r' { b as char } else { '_' })
                    .collect();
                self.rewrite(inline.byte_range(), text);
            }
        }
    }

    fn dynamic_region(&mut self, node: &Node, region: &Region) {
        match node.kind {
            NodeKind::PythonFunction | NodeKind::AnonymousPythonFunction => {
                self.python_function(node, region)
            }
            NodeKind::InlinePython => self.inline_python(node, region),
            _ => self.copy(region.range.clone()),
        }
    }

    /// `[fakeroot] python name() {` → `def name():`, closing `}` → space.
    fn python_function(&mut self, node: &Node, region: &Region) {
        let Some(block) = node.child(NodeKind::Block) else {
            return;
        };
        let header = node.start_byte..block.start_byte + 1;
        if self.source[header.clone()].contains('\n') {
            tracing::debug!("skipping python function with a multi-line header");
            return;
        }
        self.copy(region.range.clone());

        let name = match node.child(NodeKind::Identifier) {
            Some(ident) => python_identifier(ident.text(self.source)),
            None => ANONYMOUS_FUNCTION.to_string(),
        };
        let inner = &self.source[block.start_byte + 1..block.end_byte - 1];
        let replacement = if inner.trim().is_empty() {
            format!("def {name}(): pass")
        } else {
            format!("def {name}():")
        };
        self.rewrite(header, replacement);
        self.rewrite(block.end_byte - 1..block.end_byte, " ".to_string());
    }

    /// `${@expr}` → `_  (expr)`, or `;_ (expr)` after another expression
    /// on the same line.
    fn inline_python(&mut self, node: &Node, region: &Region) {
        let expr = region.range.clone();
        let line_start = self.source[..expr.start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        self.copy(expr.clone());

        let (prefix_start, separator) = match self.last_inline {
            Some((end, line)) if line == line_start && end <= node.start_byte => (end, ";"),
            _ => (line_start, ""),
        };
        let width = expr.start - prefix_start;
        if width < separator.len() + 2 {
            return;
        }
        let pad = width - separator.len() - 2;
        let prefix = format!("{separator}_{}(", " ".repeat(pad));
        self.rewrite(prefix_start..expr.start, prefix);
        self.rewrite(expr.end..node.end_byte, ")".to_string());
        self.last_inline = Some((node.end_byte, line_start));
    }

    fn finish(self) -> (String, OffsetMap) {
        let mut map = OffsetMap::identity(self.source.len());
        let mut body = match String::from_utf8(self.body) {
            Ok(body) => body,
            Err(_) => {
                tracing::warn!("shadow body is not valid UTF-8; emitting a blank body");
                return (
                    self.source
                        .chars()
                        .map(|c| if c == '\n' || c == '\r' { c } else { ' ' })
                        .collect(),
                    map,
                );
            }
        };

        let mut rewrites = self.rewrites;
        rewrites.sort_by_key(|(range, _)| range.start);
        let mut last_end = 0;
        for (range, text) in rewrites {
            if range.start < last_end {
                continue;
            }
            let (Some(start), Some(end)) = (map.shadow_offset(range.start), map.shadow_offset(range.end))
            else {
                continue;
            };
            if !body.is_char_boundary(start) || !body.is_char_boundary(end) {
                continue;
            }
            body.replace_range(start..end, &text);
            map.apply_rewrite(range.start, range.end, text.len());
            last_end = range.end;
        }
        (body, map)
    }
}

/// Replaces every byte that cannot appear in a Python identifier with `_`.
fn python_identifier(name: &str) -> String {
    name.bytes()
        .enumerate()
        .map(|(i, b)| {
            let valid = b.is_ascii_alphabetic() || b == b'_' || (i > 0 && b.is_ascii_digit());
            if valid {
                b as char
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract_regions, index_declarations};
    use crate::syntax::parse;

    fn shadow(src: &str, language: SubLanguage) -> Option<ShadowDocument> {
        let uri = Url::parse("file:///r.bb").unwrap();
        let tree = parse(src);
        let lines = LineIndex::new(src);
        let regions = extract_regions(&tree);
        let declarations = index_declarations(&tree, &lines, &uri);
        let input = SynthesisInput {
            uri: &uri,
            source: src,
            tree: &tree,
            regions: &regions,
            declarations: &declarations,
        };
        synthesize(&input, language)
    }

    fn line_count(text: &str) -> usize {
        text.split('\n').count()
    }

    #[test]
    fn test_shell_function_kept_verbatim() {
        let src = "foo(){\nBAR=\"\"\n}";
        let doc = shadow(src, SubLanguage::Shell).unwrap();
        assert_eq!(doc.body(), src);
        assert_eq!(doc.header(), "#!/bin/sh\n:\n");
        assert_eq!(doc.header_lines(), 2);
    }

    #[test]
    fn test_shell_blanks_everything_else() {
        let src = "FOO = \"1\"\ndo_x() {\n    echo ${@d.getVar('FOO')}\n}\n";
        let doc = shadow(src, SubLanguage::Shell).unwrap();
        let lines: Vec<&str> = doc.body().split('\n').collect();
        assert_eq!(lines[0], "         ");
        assert_eq!(lines[1], "do_x() {");
        assert_eq!(lines[2], format!("    echo {}", "_".repeat(19)));
        assert_eq!(doc.header(), "#!/bin/sh\nexport FOO\n");
        assert_eq!(line_count(doc.body()), line_count(src));
    }

    #[test]
    fn test_python_header_rewrite_single_shift() {
        let src = "python foo() {\n  pass\n}";
        let doc = shadow(src, SubLanguage::Dynamic).unwrap();
        assert_eq!(doc.body(), "def foo():\n  pass\n ");
        let table = doc.offset_map().as_slice();
        assert_eq!(table[14], 10);
        assert_eq!(table[src.len()], doc.body().len());
        let deltas: std::collections::BTreeSet<isize> = (14..=src.len())
            .map(|i| table[i] as isize - i as isize)
            .collect();
        assert_eq!(deltas.len(), 1);
    }

    #[test]
    fn test_empty_python_body_gets_pass() {
        let src = "python do_nothing() {\n}\n";
        let doc = shadow(src, SubLanguage::Dynamic).unwrap();
        assert!(doc.body().starts_with("def do_nothing(): pass\n"));
    }

    #[test]
    fn test_anonymous_and_fakeroot_functions() {
        let src = "python () {\n    pass\n}\nfakeroot python do-odd() {\n    pass\n}\n";
        let doc = shadow(src, SubLanguage::Dynamic).unwrap();
        let lines: Vec<&str> = doc.body().split('\n').collect();
        assert_eq!(lines[0], "def __anonymous():");
        assert_eq!(lines[3], "def do_odd():");
    }

    #[test]
    fn test_inline_python_prefixes() {
        let src = "A = \"${@1}${@2}\"\n";
        let doc = shadow(src, SubLanguage::Dynamic).unwrap();
        let first = doc.body().split('\n').next().unwrap();
        assert_eq!(first, "_      (1);_(2) ");
        assert_eq!(first.len(), src.find('\n').unwrap());
    }

    #[test]
    fn test_def_function_verbatim_and_rows_preserved() {
        let src = "X = \"1\"\ndef helper(d):\n    return 1\n";
        let doc = shadow(src, SubLanguage::Dynamic).unwrap();
        assert_eq!(doc.body(), "       \ndef helper(d):\n    return 1\n");
        assert_eq!(line_count(doc.content()), line_count(src) + DYNAMIC_HEADER_LINES);
    }

    #[test]
    fn test_no_region_no_shadow() {
        assert!(shadow("FOO = \"1\"\n", SubLanguage::Shell).is_none());
        assert!(shadow("FOO = \"1\"\n", SubLanguage::Dynamic).is_none());
    }

    #[test]
    fn test_synthesis_is_idempotent() {
        let src = "python a() {\n    d.getVar('X')\n}\nb() {\n    echo\n}\n";
        for language in SubLanguage::ALL {
            let first = shadow(src, language).unwrap();
            let second = shadow(src, language).unwrap();
            assert_eq!(first.content(), second.content());
            assert_eq!(first.offset_map(), second.offset_map());
        }
    }

    #[test]
    fn test_header_offsets_have_no_original() {
        let src = "python a() {\n    pass\n}\n";
        let doc = shadow(src, SubLanguage::Dynamic).unwrap();
        assert_eq!(doc.original_offset(0), None);
        let pass = src.find("pass").unwrap();
        let shadow_pass = doc.shadow_offset(pass).unwrap();
        assert_eq!(&doc.content()[shadow_pass..shadow_pass + 4], "pass");
        assert_eq!(doc.original_offset(shadow_pass), Some(pass));
    }
}
