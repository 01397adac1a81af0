//! Folder Naming
//!
//! Content-based category detection for desktop items and the voting rule
//! that turns a set of items into one suggested folder name.

pub mod classifier;
pub mod tables;

pub use classifier::*;
pub use tables::*;
