//! Organization Engine
//!
//! User-facing grouping gestures (merge, split, reorder) applied to the
//! item tree as atomic transactions, with an undo/redo history.

pub mod engine;
pub mod history;

pub use engine::*;
pub use history::*;
