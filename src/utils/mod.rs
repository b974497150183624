//! Utility module

mod coords;
mod error;

pub use coords::Coordinates;
pub use error::{Diagnostic, Error, ErrorCategory, Result};
