use std::path::PathBuf;

use tower_lsp::lsp_types::{Position, Url};

use crate::analysis::{
    collect_directives, collect_occurrences, extract_regions, index_declarations, language_at, occurrence_at,
    DeclarationTable, Directive, Occurrence, Region, SubLanguage,
};
use crate::embedded::SynthesisInput;
use crate::syntax::{parse, LineIndex, Tree};

/// Everything derived from one version of a document's text.
#[derive(Debug)]
pub struct AnalyzedDocument {
    pub uri: Url,
    /// Editor version; `None` for documents loaded from disk
    pub version: Option<i32>,
    pub lines: LineIndex,
    pub tree: Tree,
    pub declarations: DeclarationTable,
    pub regions: Vec<Region>,
    pub directives: Vec<Directive>,
    pub occurrences: Vec<Occurrence>,
}

impl AnalyzedDocument {
    pub fn analyze(uri: Url, version: Option<i32>, text: &str) -> Self {
        let lines = LineIndex::new(text);
        let tree = parse(text);
        let declarations = index_declarations(&tree, &lines, &uri);
        let regions = extract_regions(&tree);
        let directives = collect_directives(&tree, &lines);
        let occurrences = collect_occurrences(&tree, &lines);
        tracing::debug!(
            "analyzed {}: {} declarations, {} regions, {} directives",
            uri,
            declarations.len(),
            regions.len(),
            directives.len()
        );
        Self {
            uri,
            version,
            lines,
            tree,
            declarations,
            regions,
            directives,
            occurrences,
        }
    }

    pub fn text(&self) -> &str {
        self.lines.text()
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.uri.to_file_path().ok()
    }

    pub fn offset_at(&self, position: Position) -> Option<usize> {
        self.lines.offset_at(position)
    }

    pub fn occurrence_at(&self, position: Position) -> Option<&Occurrence> {
        occurrence_at(&self.occurrences, self.offset_at(position)?)
    }

    /// The directive whose argument covers `position`; the end is inclusive.
    pub fn directive_at(&self, position: Position) -> Option<&Directive> {
        let offset = self.offset_at(position)?;
        self.directives
            .iter()
            .find(|d| d.byte_range.start <= offset && offset <= d.byte_range.end)
    }

    pub fn language_at(&self, position: Position) -> Option<SubLanguage> {
        language_at(&self.regions, self.offset_at(position)?)
    }

    pub fn synthesis_input(&self) -> SynthesisInput<'_> {
        SynthesisInput {
            uri: &self.uri,
            source: self.text(),
            tree: &self.tree,
            regions: &self.regions,
            declarations: &self.declarations,
        }
    }
}
