pub mod declarations;
pub mod directives;
pub mod known_variables;
pub mod occurrences;
pub mod regions;

pub use declarations::{
    index_declarations, Declaration, DeclarationKind, DeclarationTable, ANONYMOUS_FUNCTION,
};
pub use directives::{collect_directives, Directive, DirectiveKind};
pub use occurrences::{collect_occurrences, occurrence_at, Occurrence, OccurrenceKind};
pub use regions::{extract_regions, language_at, Region, SubLanguage};
