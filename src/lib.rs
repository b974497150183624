//! minicc - compiler front-end and naive back-end for a single-function C subset
//!
//! Source text flows through five stages:
//! lexing, parsing, semantic analysis, lowering to three-address code and
//! assembly emission. [`pipeline::Pipeline`] drives them in order.

pub mod backend;
pub mod frontend;
pub mod middle;
pub mod pipeline;
pub mod report;
pub mod utils;

pub use pipeline::{Pipeline, SourceProvider, Stage, StringSource};
pub use utils::{Diagnostic, Error, Result};
