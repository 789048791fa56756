//! Recipe syntax: a total line-oriented parser, the node tree it produces,
//! and offset/position conversion.

pub mod line_index;
pub mod parser;
pub mod tree;

pub use line_index::LineIndex;
pub use parser::parse;
pub use tree::{Node, NodeKind, Point, Tree};
