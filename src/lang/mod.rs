//! # Language model
//!
//! The node tree consumed by the compiler, the values a running program
//! works with, and the source positions both carry for diagnostics.

pub mod node;
pub mod operator;
pub mod pos;
pub mod value;
