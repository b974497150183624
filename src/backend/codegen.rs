//! Code Generation trait - Backend abstraction

use crate::middle::tac::TacProgram;
use crate::utils::Result;

/// Code generation backend trait
pub trait CodeGen {
    /// Generate assembly text from a lowered program
    fn generate(&mut self, program: &TacProgram) -> Result<String>;

    /// Get the target description (e.g., "i386")
    fn target(&self) -> &str;

    /// Get the backend name
    fn name(&self) -> &str;
}
