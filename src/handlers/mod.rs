//! Editor-facing request handlers. Each takes the [`crate::analyzer::Analyzer`]
//! plus a URI (and position) and returns `lsp_types` values.

pub mod completion;
pub mod diagnostics;
pub mod embedded;
pub mod hover;
pub mod navigation;
pub mod semantic_tokens;
pub mod symbols;

pub use completion::completion;
pub use diagnostics::diagnostics;
pub use embedded::{shadow_request, EmbeddedRequest};
pub use hover::hover;
pub use navigation::{definition, merge_edits, prepare_rename, references, rename};
pub use semantic_tokens::{legend, semantic_tokens};
pub use symbols::document_symbols;
