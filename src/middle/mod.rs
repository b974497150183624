//! Middle-end module - three-address code

pub mod tac;
pub mod tac_gen;
pub mod tac_printer;

pub use tac::{Command, CommandKind, Operand, OperandKind, Quadruple, TacProgram};
pub use tac_gen::TacGenerator;
pub use tac_printer::{print_tac, TacPrinter};
