//! Directive-linked symbol resolution: the project inventory, the scan
//! trace, directive targets and the cross-document symbol graph.

pub mod directive;
pub mod graph;
pub mod inventory;
pub mod trace;
pub mod watcher;

pub use directive::{expand, resolve, resolve_argument, suggestions, ResolveContext};
pub use graph::{definitions, directive_targets, linked_documents, references, rename, DocumentSource};
pub use inventory::{scan, ElementInfo, LayerInfo, PathInfo, ProjectInventory};
pub use trace::{ScanTrace, TraceOrigin};
pub use watcher::{is_metadata, FileEvent, InventoryWatcher};
