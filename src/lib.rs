pub mod analysis;
pub mod analyzer;
pub mod config;
pub mod embedded;
pub mod error;
pub mod handlers;
pub mod resolver;
pub mod syntax;

pub use analysis::{Declaration, DeclarationKind, DeclarationTable, Directive, DirectiveKind, SubLanguage};
pub use analyzer::{AnalyzedDocument, Analyzer, Debouncer, PendingSlot};
pub use config::Config;
pub use embedded::{
    synthesize, EmbeddedLanguageService, OffsetMap, ShadowDocument, ShadowStore, TreeSitterService,
};
pub use error::{BitbakeError, Result};
pub use resolver::{ProjectInventory, ScanTrace};
pub use syntax::{parse, LineIndex, Node, NodeKind, Tree};
