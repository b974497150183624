//! Assembly Backend - flat 32-bit x86-style text from TAC
//!
//! Temporaries live in four fixed registers; there is no spilling.

mod asm_codegen;

pub use asm_codegen::{AsmCodeGen, EXIT_LABEL, REGISTERS};
