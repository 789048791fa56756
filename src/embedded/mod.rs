//! Embedded-language projection: shadow documents for the shell and Python
//! code inside recipes, the offset tables that tie them to the original
//! text, and the services that analyze them.

pub mod grammar;
pub mod local;
pub mod offset_map;
pub mod service;
pub mod store;
pub mod synthesizer;
pub mod translate;

pub use grammar::{EmbeddedGrammar, GrammarRegistry};
pub use local::TreeSitterService;
pub use offset_map::OffsetMap;
pub use service::{cancellable, EmbeddedLanguageService, NoopService, ShadowRequest};
pub use store::{ShadowDocumentInfo, ShadowStore};
pub use synthesizer::{header_line_count, synthesize, ShadowDocument, SynthesisInput};
