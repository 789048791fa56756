//! Position translation between an original document and its shadows.

use tower_lsp::lsp_types::{Diagnostic, Position, Range, TextEdit};

use crate::embedded::synthesizer::ShadowDocument;
use crate::syntax::LineIndex;

pub fn to_shadow(shadow: &ShadowDocument, original: &LineIndex, position: Position) -> Option<Position> {
    let offset = original.offset_at(position)?;
    let shadow_offset = shadow.shadow_offset(offset)?;
    Some(shadow.lines().position_at(shadow_offset))
}

/// `None` for positions in the header or in text inserted by a rewrite.
pub fn to_original(shadow: &ShadowDocument, original: &LineIndex, position: Position) -> Option<Position> {
    let shadow_offset = shadow.lines().offset_at(position)?;
    let offset = shadow.original_offset(shadow_offset)?;
    Some(original.position_at(offset))
}

pub fn range_to_shadow(shadow: &ShadowDocument, original: &LineIndex, range: Range) -> Option<Range> {
    Some(Range::new(
        to_shadow(shadow, original, range.start)?,
        to_shadow(shadow, original, range.end)?,
    ))
}

pub fn range_to_original(shadow: &ShadowDocument, original: &LineIndex, range: Range) -> Option<Range> {
    Some(Range::new(
        to_original(shadow, original, range.start)?,
        to_original(shadow, original, range.end)?,
    ))
}

/// Diagnostics whose range has no preimage are dropped.
pub fn diagnostics_to_original(
    shadow: &ShadowDocument,
    original: &LineIndex,
    diagnostics: Vec<Diagnostic>,
) -> Vec<Diagnostic> {
    diagnostics
        .into_iter()
        .filter_map(|mut diagnostic| {
            diagnostic.range = range_to_original(shadow, original, diagnostic.range)?;
            Some(diagnostic)
        })
        .collect()
}

pub fn edits_to_original(shadow: &ShadowDocument, original: &LineIndex, edits: Vec<TextEdit>) -> Vec<TextEdit> {
    edits
        .into_iter()
        .filter_map(|edit| {
            Some(TextEdit::new(
                range_to_original(shadow, original, edit.range)?,
                edit.new_text,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{extract_regions, index_declarations, SubLanguage};
    use crate::embedded::synthesizer::{synthesize, SynthesisInput, DYNAMIC_HEADER_LINES};
    use crate::syntax::parse;
    use proptest::prelude::*;
    use tower_lsp::lsp_types::Url;

    fn build(src: &str, language: SubLanguage) -> (ShadowDocument, LineIndex) {
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
        (synthesize(&input, language).unwrap(), lines)
    }

    #[test]
    fn test_rows_shift_by_header() {
        let src = "FOO = \"1\"\npython do_a() {\n    bb.note(d.getVar('FOO'))\n}\n";
        let (shadow, lines) = build(src, SubLanguage::Dynamic);
        let pos = Position::new(2, 8);
        let mapped = to_shadow(&shadow, &lines, pos).unwrap();
        assert_eq!(mapped, Position::new(2 + DYNAMIC_HEADER_LINES as u32, 8));
        assert_eq!(to_original(&shadow, &lines, mapped), Some(pos));
    }

    #[test]
    fn test_header_positions_have_no_original() {
        let src = "python do_a() {\n    pass\n}\n";
        let (shadow, lines) = build(src, SubLanguage::Dynamic);
        assert_eq!(to_original(&shadow, &lines, Position::new(0, 3)), None);
    }

    #[test]
    fn test_column_after_header_rewrite() {
        let src = "python do_a() {\n    pass\n}\n";
        let (shadow, lines) = build(src, SubLanguage::Dynamic);
        // inside the rewritten header, columns map one-to-one up to its new length
        let column = Position::new(DYNAMIC_HEADER_LINES as u32, 8);
        assert_eq!(to_original(&shadow, &lines, column), Some(Position::new(0, 8)));
    }

    #[test]
    fn test_diagnostics_outside_document_are_dropped() {
        let src = "do_a() {\n    true\n}\n";
        let (shadow, lines) = build(src, SubLanguage::Shell);
        let inside = Diagnostic::new_simple(Range::new(Position::new(3, 4), Position::new(3, 8)), "x".into());
        let header = Diagnostic::new_simple(Range::new(Position::new(0, 0), Position::new(0, 2)), "y".into());
        let mapped = diagnostics_to_original(&shadow, &lines, vec![inside, header]);
        assert_eq!(mapped.len(), 1);
        assert_eq!(mapped[0].range, Range::new(Position::new(1, 4), Position::new(1, 8)));
    }

    fn recipe() -> impl Strategy<Value = String> {
        let body_line = "[a-z_]{1,8}( [a-z0-9_]{1,6}){0,3}";
        let block = (
            prop_oneof![Just("python"), Just("")],
            "[a-z][a-z_]{0,7}",
            proptest::collection::vec(body_line, 1..4),
        )
            .prop_map(|(kw, name, body)| {
                let lines: Vec<String> = body.iter().map(|l| format!("    {l}")).collect();
                if kw.is_empty() {
                    format!("{name}() {{\n{}\n}}\n", lines.join("\n"))
                } else {
                    format!("python {name}() {{\n{}\n}}\n", lines.join("\n"))
                }
            });
        let assignment = ("[A-Z][A-Z_]{0,6}", "[a-z0-9 ]{0,10}")
            .prop_map(|(name, value)| format!("{name} = \"{value}\"\n"));
        proptest::collection::vec(prop_oneof![block, assignment], 1..6).prop_map(|parts| parts.concat())
    }

    proptest! {
        #[test]
        fn prop_body_rows_match_and_round_trip(src in recipe()) {
            let tree = parse(&src);
            let regions = extract_regions(&tree);
            for language in SubLanguage::ALL {
                if !regions.iter().any(|r| r.language == language) {
                    continue;
                }
                let (shadow, lines) = build(&src, language);
                prop_assert!(shadow.offset_map().is_monotonic());
                prop_assert_eq!(
                    shadow.body().split('\n').count(),
                    src.split('\n').count()
                );

                // every offset inside a function body is verbatim and round-trips
                for node in &tree.root().children {
                    let Some(block) = node.child(crate::syntax::NodeKind::Block) else { continue };
                    let lang = if node.kind == crate::syntax::NodeKind::ShellFunction {
                        SubLanguage::Shell
                    } else {
                        SubLanguage::Dynamic
                    };
                    if lang != language {
                        continue;
                    }
                    for offset in block.start_byte + 1..block.end_byte - 1 {
                        let pos = lines.position_at(offset);
                        let shadow_pos = to_shadow(&shadow, &lines, pos).unwrap();
                        prop_assert_eq!(to_original(&shadow, &lines, shadow_pos), Some(pos));
                    }
                }
            }
        }
    }
}
