//! TAC Printer - one instruction per line
//!
//! Labels are flush left, everything else is indented.

use std::fmt::Write;

use crate::middle::tac::*;

/// Pretty printer for three-address code
pub struct TacPrinter {
    output: String,
}

impl TacPrinter {
    pub fn new() -> Self {
        Self {
            output: String::new(),
        }
    }

    /// Print a whole program to a string
    pub fn print_program(&mut self, program: &TacProgram) -> String {
        self.output.clear();
        for quad in &program.quads {
            let line = format_quad(quad);
            let _ = if quad.kind() == Some(CommandKind::Label) {
                writeln!(self.output, "{}", line)
            } else {
                writeln!(self.output, "    {}", line)
            };
        }
        std::mem::take(&mut self.output)
    }
}

impl Default for TacPrinter {
    fn default() -> Self {
        Self::new()
    }
}

fn name(operand: &Option<Operand>) -> &str {
    operand.as_ref().map(|o| o.name.as_str()).unwrap_or("?")
}

/// Render a single quadruple without indentation
pub fn format_quad(quad: &Quadruple) -> String {
    let Some(op) = &quad.op else {
        return "nop".to_string();
    };
    let (src1, src2, dest) = (name(&quad.src1), name(&quad.src2), name(&quad.dest));
    match op.kind {
        CommandKind::Arithmetic | CommandKind::Relational | CommandKind::Logical => {
            format!("{} = {} {} {}", dest, src1, op.text, src2)
        }
        CommandKind::Unary => format!("{} = {}{}", dest, op.text, src1),
        CommandKind::Copy => format!("{} = {}", dest, src1),
        CommandKind::ConditionalJump => format!("{} {} goto {}", op.text, src1, dest),
        CommandKind::UnconditionalJump => format!("goto {}", dest),
        CommandKind::Label => format!("{}:", dest),
        CommandKind::Return => format!("return {}", dest),
    }
}

/// Convenience wrapper around [`TacPrinter`]
pub fn print_tac(program: &TacProgram) -> String {
    TacPrinter::new().print_program(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::ast::{BinaryOp, UnaryOp};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_each_kind() {
        let a = Operand::variable("a", -4);
        let t1 = Operand::temporary(1);
        let l1 = Operand::label(1);

        assert_eq!(
            format_quad(&Quadruple::binary(BinaryOp::Mul, a.clone(), Operand::literal(2), t1.clone())),
            "t1 = a * 2"
        );
        assert_eq!(
            format_quad(&Quadruple::unary(UnaryOp::Minus, a.clone(), t1.clone())),
            "t1 = -a"
        );
        assert_eq!(format_quad(&Quadruple::copy(t1.clone(), a.clone())), "a = t1");
        assert_eq!(
            format_quad(&Quadruple::if_false(t1.clone(), l1.clone())),
            "IfFalse t1 goto L1"
        );
        assert_eq!(format_quad(&Quadruple::if_true(t1.clone(), l1.clone())), "If t1 goto L1");
        assert_eq!(format_quad(&Quadruple::goto(l1.clone())), "goto L1");
        assert_eq!(format_quad(&Quadruple::label(l1)), "L1:");
        assert_eq!(format_quad(&Quadruple::ret(t1)), "return t1");
    }

    #[test]
    fn test_print_program_layout() {
        let program = TacProgram {
            quads: vec![
                Quadruple::label(Operand::label(1)),
                Quadruple::ret(Operand::literal(0)),
            ],
            frame_size: 0,
        };
        assert_eq!(print_tac(&program), "L1:\n    return 0\n");
    }
}
