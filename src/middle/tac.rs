//! Three-address code definitions for minicc
//!
//! Each instruction is a quadruple `(op, src1, src2, dest)`. Jumps and
//! labels carry their target label in `dest`; `return` carries its value
//! there too.

use std::fmt;

use serde::Serialize;

use crate::frontend::ast::{BinaryOp, OpClass, UnaryOp};

/// Instruction family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandKind {
    Arithmetic,
    Relational,
    /// `&&` / `||`; the backend only partially supports these
    Logical,
    Unary,
    ConditionalJump,
    Label,
    UnconditionalJump,
    Copy,
    Return,
}

/// Operator of a quadruple
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    pub text: String,
    pub kind: CommandKind,
}

pub const IF_FALSE: &str = "IfFalse";
pub const IF_TRUE: &str = "If";

impl Command {
    pub fn new(text: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    pub fn binary(op: BinaryOp) -> Self {
        let kind = match op.class() {
            OpClass::Arithmetic => CommandKind::Arithmetic,
            OpClass::Relational => CommandKind::Relational,
            OpClass::Logical => CommandKind::Logical,
        };
        Self::new(op.symbol(), kind)
    }

    pub fn unary(op: UnaryOp) -> Self {
        Self::new(op.symbol(), CommandKind::Unary)
    }

    /// True for `If`, false for `IfFalse`
    pub fn jumps_when_true(&self) -> bool {
        self.kind == CommandKind::ConditionalJump && self.text == IF_TRUE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperandKind {
    Literal,
    /// Named stack variable
    Variable,
    Temporary,
    Label,
}

/// A quadruple operand: display name plus storage or literal text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operand {
    pub kind: OperandKind,
    pub name: String,
    pub text: String,
}

impl Operand {
    pub fn literal(value: i64) -> Self {
        Self {
            kind: OperandKind::Literal,
            name: value.to_string(),
            text: value.to_string(),
        }
    }

    /// A variable stored at `address` relative to the frame base
    pub fn variable(name: impl Into<String>, address: i32) -> Self {
        Self {
            kind: OperandKind::Variable,
            name: name.into(),
            text: format!("[ebp{:+}]", address),
        }
    }

    pub fn temporary(number: usize) -> Self {
        let name = format!("t{}", number);
        Self {
            kind: OperandKind::Temporary,
            text: name.clone(),
            name,
        }
    }

    pub fn label(number: usize) -> Self {
        let name = format!("L{}", number);
        Self {
            kind: OperandKind::Label,
            text: name.clone(),
            name,
        }
    }

    pub fn is_temporary(&self) -> bool {
        self.kind == OperandKind::Temporary
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// One TAC instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quadruple {
    pub op: Option<Command>,
    pub src1: Option<Operand>,
    pub src2: Option<Operand>,
    pub dest: Option<Operand>,
}

impl Quadruple {
    fn new(
        op: Command,
        src1: Option<Operand>,
        src2: Option<Operand>,
        dest: Option<Operand>,
    ) -> Self {
        Self {
            op: Some(op),
            src1,
            src2,
            dest,
        }
    }

    pub fn binary(op: BinaryOp, left: Operand, right: Operand, dest: Operand) -> Self {
        Self::new(Command::binary(op), Some(left), Some(right), Some(dest))
    }

    pub fn unary(op: UnaryOp, operand: Operand, dest: Operand) -> Self {
        Self::new(Command::unary(op), Some(operand), None, Some(dest))
    }

    pub fn copy(src: Operand, dest: Operand) -> Self {
        Self::new(Command::new("=", CommandKind::Copy), Some(src), None, Some(dest))
    }

    /// Jump to `label` when `condition` is false
    pub fn if_false(condition: Operand, label: Operand) -> Self {
        Self::new(
            Command::new(IF_FALSE, CommandKind::ConditionalJump),
            Some(condition),
            None,
            Some(label),
        )
    }

    /// Jump to `label` when `condition` is true
    pub fn if_true(condition: Operand, label: Operand) -> Self {
        Self::new(
            Command::new(IF_TRUE, CommandKind::ConditionalJump),
            Some(condition),
            None,
            Some(label),
        )
    }

    pub fn goto(label: Operand) -> Self {
        Self::new(
            Command::new("goto", CommandKind::UnconditionalJump),
            None,
            None,
            Some(label),
        )
    }

    pub fn label(label: Operand) -> Self {
        Self::new(Command::new("label", CommandKind::Label), None, None, Some(label))
    }

    pub fn ret(value: Operand) -> Self {
        Self::new(Command::new("return", CommandKind::Return), None, None, Some(value))
    }

    pub fn kind(&self) -> Option<CommandKind> {
        self.op.as_ref().map(|c| c.kind)
    }

    /// Whether this instruction computes a value into `dest`
    pub fn produces_value(&self) -> bool {
        matches!(
            self.kind(),
            Some(
                CommandKind::Arithmetic
                    | CommandKind::Relational
                    | CommandKind::Logical
                    | CommandKind::Unary
            )
        )
    }
}

/// Lowered program: instruction list and the stack frame it needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TacProgram {
    pub quads: Vec<Quadruple>,
    /// Bytes below the frame base used by variables
    pub frame_size: u32,
}

impl TacProgram {
    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }
}
