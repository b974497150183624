//! Backend module - Code generation

pub mod codegen;

pub mod asm;

pub use asm::AsmCodeGen;
pub use codegen::CodeGen;
