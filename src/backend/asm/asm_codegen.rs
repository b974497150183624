//! Assembly Code Generator
//!
//! Translates three-address code into flat pseudo-assembly with a single
//! `main` frame and one shared exit label.
//!
//! A relational instruction does not produce a value in a register. It is
//! emitted as `cmp` plus a conditional jump to the label of the branch that
//! consumes it. Comparisons and branches are paired by order: the Nth
//! relational instruction that feeds a branch takes the Nth branch whose
//! condition came from a relational instruction. Comparisons whose result only
//! feeds a logical operator are left as comments and never take a branch.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write;

use log::{info, warn};

use crate::backend::codegen::CodeGen;
use crate::middle::tac::*;
use crate::middle::tac_printer::format_quad;
use crate::pipeline::Stage;
use crate::utils::{Error, Result};

/// Registers backing temporaries `t1..t4`
pub const REGISTERS: [&str; 4] = ["eax", "ebx", "ecx", "edx"];

/// Single epilogue every `return` jumps to
pub const EXIT_LABEL: &str = "main_end";

const ACCUMULATOR: &str = "eax";
/// Working register for instructions whose destination is in memory
const SCRATCH: &str = "edi";

/// A branch waiting for its comparison
#[derive(Debug, Clone)]
struct PendingBranch {
    label: String,
    when_true: bool,
}

/// Assembly code generator
pub struct AsmCodeGen {
    output: String,
    pending: VecDeque<PendingBranch>,
    /// Indices of relational instructions read by a conditional jump
    feeding: HashSet<usize>,
    /// Instruction kind that last wrote each temporary
    producers: HashMap<String, CommandKind>,
}

impl AsmCodeGen {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            pending: VecDeque::new(),
            feeding: HashSet::new(),
            producers: HashMap::new(),
        }
    }

    /// Write indented line
    fn emit(&mut self, line: &str) {
        let _ = writeln!(self.output, "    {}", line);
    }

    fn emit_label(&mut self, label: &str) {
        let _ = writeln!(self.output, "{}:", label);
    }

    fn comment(&mut self, text: &str) {
        let _ = writeln!(self.output, "    ; {}", text);
    }

    // ==================== Operands ====================

    fn register(temp: &Operand) -> Result<&'static str> {
        temp.name
            .strip_prefix('t')
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| REGISTERS.get(i).copied())
            .ok_or_else(|| {
                Error::unsupported(
                    Stage::Assemble,
                    format!(
                        "temporary {} does not fit the {} available registers",
                        temp.name,
                        REGISTERS.len()
                    ),
                )
            })
    }

    /// Assembly spelling of an operand
    fn value(operand: &Operand) -> Result<String> {
        match operand.kind {
            OperandKind::Temporary => Self::register(operand).map(str::to_string),
            OperandKind::Literal | OperandKind::Variable => Ok(operand.text.clone()),
            OperandKind::Label => Ok(operand.name.clone()),
        }
    }

    fn required<'q>(operand: &'q Option<Operand>, what: &str, quad: &Quadruple) -> Result<&'q Operand> {
        operand.as_ref().ok_or_else(|| {
            Error::unsupported(
                Stage::Assemble,
                format!("missing {} in '{}'", what, format_quad(quad)),
            )
        })
    }

    /// Register to compute into, plus the memory slot to store it to afterwards
    fn working_location(dest: &Operand) -> Result<(String, Option<String>)> {
        match dest.kind {
            OperandKind::Temporary => Ok((Self::register(dest)?.to_string(), None)),
            OperandKind::Variable => Ok((SCRATCH.to_string(), Some(dest.text.clone()))),
            _ => Err(Error::unsupported(
                Stage::Assemble,
                format!("cannot write to {}", dest.name),
            )),
        }
    }

    // ==================== Branch correlation ====================

    /// Queue every branch whose condition was produced by a comparison and
    /// remember which comparison feeds it
    fn collect_branches(&mut self, program: &TacProgram) {
        let mut producers: HashMap<&str, (CommandKind, usize)> = HashMap::new();
        for (index, quad) in program.quads.iter().enumerate() {
            match quad.kind() {
                Some(kind) if quad.produces_value() => {
                    if let Some(dest) = quad.dest.as_ref().filter(|d| d.is_temporary()) {
                        producers.insert(dest.name.as_str(), (kind, index));
                    }
                }
                Some(CommandKind::ConditionalJump) => {
                    let comparison = quad
                        .src1
                        .as_ref()
                        .filter(|c| c.is_temporary())
                        .and_then(|c| producers.get(c.name.as_str()))
                        .filter(|(kind, _)| *kind == CommandKind::Relational)
                        .map(|(_, at)| *at);
                    if let (Some(at), Some(label)) = (comparison, &quad.dest) {
                        self.feeding.insert(at);
                        self.pending.push_back(PendingBranch {
                            label: label.name.clone(),
                            when_true: quad.op.as_ref().is_some_and(|c| c.jumps_when_true()),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    // ==================== Instructions ====================

    fn generate_quad(&mut self, index: usize, quad: &Quadruple) -> Result<()> {
        let Some(op) = &quad.op else {
            return Ok(());
        };

        match op.kind {
            CommandKind::Label => {
                let label = Self::required(&quad.dest, "label", quad)?;
                self.emit_label(&label.name);
            }
            CommandKind::UnconditionalJump => {
                let label = Self::required(&quad.dest, "label", quad)?;
                self.emit(&format!("jmp {}", label.name));
            }
            CommandKind::Return => {
                let value = Self::value(Self::required(&quad.dest, "return value", quad)?)?;
                if value != ACCUMULATOR {
                    self.emit(&format!("mov {}, {}", ACCUMULATOR, value));
                }
                self.emit(&format!("jmp {}", EXIT_LABEL));
            }
            CommandKind::Copy => {
                let src = Self::required(&quad.src1, "source", quad)?;
                let dest = Self::required(&quad.dest, "destination", quad)?;
                let value = Self::value(src)?;
                if dest.kind == OperandKind::Variable && src.kind == OperandKind::Variable {
                    self.emit(&format!("mov {}, {}", SCRATCH, value));
                    self.emit(&format!("mov {}, {}", dest.text, SCRATCH));
                } else {
                    self.emit(&format!("mov {}, {}", Self::value(dest)?, value));
                }
            }
            CommandKind::Unary => {
                let src = Self::value(Self::required(&quad.src1, "operand", quad)?)?;
                let dest = Self::required(&quad.dest, "destination", quad)?;
                let (reg, store) = Self::working_location(dest)?;
                if src != reg {
                    self.emit(&format!("mov {}, {}", reg, src));
                }
                if op.text == "-" {
                    self.emit(&format!("neg {}", reg));
                }
                self.store(&reg, store);
            }
            CommandKind::Arithmetic => self.generate_arithmetic(op, quad)?,
            CommandKind::Relational => self.generate_comparison(index, op, quad)?,
            CommandKind::Logical => {
                warn!("logical operator '{}' is not fully supported", op.text);
                self.comment(&format!(
                    "{}: logical operators are not fully supported",
                    format_quad(quad)
                ));
            }
            CommandKind::ConditionalJump => self.generate_branch(op, quad)?,
        }

        if quad.produces_value() {
            if let Some(dest) = quad.dest.as_ref().filter(|d| d.is_temporary()) {
                self.producers.insert(dest.name.clone(), op.kind);
            }
        }
        Ok(())
    }

    /// Move a right operand that lives in the working register out of the way
    /// before the left operand is loaded over it
    fn preserve_right(&mut self, reg: &str, left: &str, right: String) -> String {
        if right == reg && left != reg {
            self.emit(&format!("mov {}, {}", SCRATCH, right));
            SCRATCH.to_string()
        } else {
            right
        }
    }

    fn store(&mut self, reg: &str, store: Option<String>) {
        if let Some(slot) = store {
            self.emit(&format!("mov {}, {}", slot, reg));
        }
    }

    fn generate_arithmetic(&mut self, op: &Command, quad: &Quadruple) -> Result<()> {
        let left = Self::value(Self::required(&quad.src1, "left operand", quad)?)?;
        let right = Self::value(Self::required(&quad.src2, "right operand", quad)?)?;
        let dest = Self::required(&quad.dest, "destination", quad)?;
        let (reg, store) = Self::working_location(dest)?;

        let mnemonic = match op.text.as_str() {
            "+" => "add",
            "-" => "sub",
            "*" => "mul",
            "/" => "div",
            other => {
                return Err(Error::unsupported(
                    Stage::Assemble,
                    format!("arithmetic operator '{}'", other),
                ))
            }
        };

        let right = self.preserve_right(&reg, &left, right);
        if left != reg {
            self.emit(&format!("mov {}, {}", reg, left));
        }
        if matches!(mnemonic, "mul" | "div") && reg != ACCUMULATOR {
            self.comment(&format!(
                "{} only takes {} as its implicit operand",
                mnemonic, ACCUMULATOR
            ));
        }
        self.emit(&format!("{} {}, {}", mnemonic, reg, right));
        self.store(&reg, store);
        Ok(())
    }

    fn generate_comparison(&mut self, index: usize, op: &Command, quad: &Quadruple) -> Result<()> {
        let branch = if self.feeding.contains(&index) {
            self.pending.pop_front()
        } else {
            None
        };
        let Some(branch) = branch else {
            warn!("comparison without a consuming branch");
            self.comment(&format!(
                "{}: comparison has no branch to feed",
                format_quad(quad)
            ));
            return Ok(());
        };

        let left = Self::value(Self::required(&quad.src1, "left operand", quad)?)?;
        let right = Self::value(Self::required(&quad.src2, "right operand", quad)?)?;
        let dest = Self::required(&quad.dest, "destination", quad)?;
        let (reg, _) = Self::working_location(dest)?;

        let jump = jump_mnemonic(&op.text, branch.when_true).ok_or_else(|| {
            Error::unsupported(Stage::Assemble, format!("relational operator '{}'", op.text))
        })?;

        let right = self.preserve_right(&reg, &left, right);
        if left != reg {
            self.emit(&format!("mov {}, {}", reg, left));
        }
        self.emit(&format!("cmp {}, {}", reg, right));
        self.emit(&format!("{} {}", jump, branch.label));
        Ok(())
    }

    fn generate_branch(&mut self, op: &Command, quad: &Quadruple) -> Result<()> {
        let condition = Self::required(&quad.src1, "condition", quad)?;
        let label = Self::required(&quad.dest, "label", quad)?;

        let producer = if condition.is_temporary() {
            self.producers.get(&condition.name).copied()
        } else {
            None
        };

        match producer {
            // Already emitted together with its comparison
            Some(CommandKind::Relational) => {}
            Some(CommandKind::Logical) => {
                self.comment(&format!(
                    "{} on a logical result is not supported",
                    format_quad(quad)
                ));
            }
            _ => {
                let mut value = Self::value(condition)?;
                if condition.kind == OperandKind::Literal {
                    self.emit(&format!("mov {}, {}", SCRATCH, value));
                    value = SCRATCH.to_string();
                }
                let jump = if op.jumps_when_true() { "jne" } else { "je" };
                self.emit(&format!("cmp {}, 0", value));
                self.emit(&format!("{} {}", jump, label.name));
            }
        }
        Ok(())
    }
}

impl Default for AsmCodeGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Conditional jump for a comparison; `when_true` picks the direct jump,
/// otherwise the jump on the negated condition
fn jump_mnemonic(op: &str, when_true: bool) -> Option<&'static str> {
    let (direct, inverted) = match op {
        ">" => ("jg", "jle"),
        "<" => ("jl", "jge"),
        ">=" => ("jge", "jl"),
        "<=" => ("jle", "jg"),
        "==" => ("je", "jne"),
        "!=" => ("jne", "je"),
        _ => return None,
    };
    Some(if when_true { direct } else { inverted })
}

impl CodeGen for AsmCodeGen {
    fn generate(&mut self, program: &TacProgram) -> Result<String> {
        self.output.clear();
        self.pending.clear();
        self.feeding.clear();
        self.producers.clear();

        self.collect_branches(program);

        self.emit_label("main");
        self.emit("push ebp");
        self.emit("mov ebp, esp");
        if program.frame_size > 0 {
            self.emit(&format!("sub esp, {}", program.frame_size));
        }

        for (index, quad) in program.quads.iter().enumerate() {
            self.generate_quad(index, quad)?;
        }

        self.emit_label(EXIT_LABEL);
        self.emit("mov esp, ebp");
        self.emit("pop ebp");
        self.emit("ret");

        info!("assembled {} instructions", program.len());
        Ok(std::mem::take(&mut self.output))
    }

    fn target(&self) -> &str {
        "i386"
    }

    fn name(&self) -> &str {
        "asm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::frontend::semantic::SemanticAnalyzer;
    use crate::middle::tac_gen::TacGenerator;
    use pretty_assertions::assert_eq;

    fn assemble(body: &str) -> Result<String> {
        let source = format!("int main() {{ {} }}", body);
        let mut root = Parser::new(Lexer::new(&source).tokenize()).parse()?;
        SemanticAnalyzer::new().analyze(&mut root)?;
        let program = TacGenerator::new().generate(&root)?;
        AsmCodeGen::new().generate(&program)
    }

    fn jumps(asm: &str) -> Vec<String> {
        asm.lines()
            .map(str::trim)
            .filter(|l| l.starts_with('j') && !l.starts_with("jmp"))
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_if_else_program() {
        let asm = assemble("int a; int b; if (a > b) { return a; } else { return b; }").unwrap();
        assert_eq!(
            asm,
            "main:\n\
             \x20   push ebp\n\
             \x20   mov ebp, esp\n\
             \x20   sub esp, 8\n\
             \x20   mov eax, [ebp-4]\n\
             \x20   cmp eax, [ebp-8]\n\
             \x20   jle L2\n\
             \x20   mov eax, [ebp-4]\n\
             \x20   jmp main_end\n\
             \x20   jmp L1\n\
             L2:\n\
             \x20   mov eax, [ebp-8]\n\
             \x20   jmp main_end\n\
             L1:\n\
             main_end:\n\
             \x20   mov esp, ebp\n\
             \x20   pop ebp\n\
             \x20   ret\n"
        );
    }

    #[test]
    fn test_branch_inversion_for_every_operator() {
        let cases = [
            (">", "jle"),
            ("<", "jge"),
            (">=", "jl"),
            ("<=", "jg"),
            ("==", "jne"),
            ("!=", "je"),
        ];
        for (op, expected) in cases {
            let asm = assemble(&format!("int a; int b; if (a {} b) {{ a = 1; }}", op)).unwrap();
            assert_eq!(jumps(&asm), vec![format!("{} L2", expected)], "operator {}", op);
        }
    }

    #[test]
    fn test_while_uses_inverted_jump_and_do_while_direct_jump() {
        let asm = assemble("int i = 3; while (i > 0) { i -= 1; }").unwrap();
        assert_eq!(jumps(&asm), vec!["jle L2"]);

        let asm = assemble("int i = 0; do { i += 1; } while (i < 5);").unwrap();
        assert_eq!(jumps(&asm), vec!["jl L1"]);
    }

    #[test]
    fn test_single_exit_label() {
        let asm = assemble(
            "int a; if (a > 0) { if (a > 5) { return 5; } return a; } \
             else if (a < 0) { return 0; } return 1;",
        )
        .unwrap();
        assert_eq!(asm.matches("main_end:").count(), 1);
        assert_eq!(asm.matches("jmp main_end").count(), 4);
        assert_eq!(jumps(&asm), vec!["jle L2", "jle L4", "jge L5"]);
    }

    #[test]
    fn test_non_relational_condition() {
        let asm = assemble("int x = 2; while (x) { x -= 1; }").unwrap();
        assert!(asm.contains("    cmp [ebp-4], 0\n    je L2\n"));
    }

    #[test]
    fn test_arithmetic_and_memory_destinations() {
        let asm = assemble("int a = 1; int b = a; int c; c = a * b + 2;").unwrap();
        let body: Vec<&str> = asm.lines().skip(4).take(8).map(str::trim).collect();
        assert_eq!(
            body,
            vec![
                "mov [ebp-4], 1",
                "mov edi, [ebp-4]",
                "mov [ebp-8], edi",
                "mov eax, [ebp-4]",
                "mul eax, [ebp-8]",
                "mov edi, eax",
                "add edi, 2",
                "mov [ebp-12], edi",
            ]
        );
    }

    #[test]
    fn test_accumulator_note_for_non_eax_multiply() {
        let asm = assemble("int a; return (a + 1) + a * 3;").unwrap();
        assert!(asm.contains("; mul only takes eax as its implicit operand"));
        assert!(asm.contains("mul ebx, 3"));
    }

    #[test]
    fn test_logical_condition_is_degraded() {
        let asm = assemble("int a; int b; if (a > b && b > 0) { a = 1; }").unwrap();
        assert!(asm.contains("logical operators are not fully supported"));
        assert!(asm.contains("IfFalse t1 goto L2 on a logical result is not supported"));
        assert!(asm.contains("comparison has no branch to feed"));
    }

    #[test]
    fn test_right_operand_in_destination_register_is_preserved() {
        let asm = assemble("int a; return 2 - a * 3;").unwrap();
        let body: Vec<&str> = asm.lines().skip(4).take(6).map(str::trim).collect();
        assert_eq!(
            body,
            vec![
                "mov eax, [ebp-4]",
                "mul eax, 3",
                "mov edi, eax",
                "mov eax, 2",
                "sub eax, edi",
                "jmp main_end",
            ]
        );
    }

    #[test]
    fn test_comparison_against_computed_right_operand() {
        let asm = assemble("int a; if (2 < a * 3) { a = 1; }").unwrap();
        let body: Vec<&str> = asm.lines().skip(4).take(7).map(str::trim).collect();
        assert_eq!(
            body,
            vec![
                "mov eax, [ebp-4]",
                "mul eax, 3",
                "mov edi, eax",
                "mov eax, 2",
                "cmp eax, edi",
                "jge L2",
                "mov [ebp-4], 1",
            ]
        );
    }

    #[test]
    fn test_logical_condition_leaves_later_branches_alone() {
        let asm = assemble(
            "int a; int b; if (a > b && b > 0) { a = 1; } if (a == 5) { b = 2; }",
        )
        .unwrap();
        assert_eq!(jumps(&asm), vec!["jne L4"]);
        assert_eq!(asm.matches("comparison has no branch to feed").count(), 2);
        assert!(asm.contains("    mov eax, [ebp-4]\n    cmp eax, 5\n    jne L4\n    mov [ebp-8], 2\n"));
    }

    #[test]
    fn test_backend_identity() {
        let codegen = AsmCodeGen::new();
        assert_eq!(codegen.name(), "asm");
        assert_eq!(codegen.target(), "i386");
    }

    #[test]
    fn test_five_live_temporaries_are_unsupported() {
        let err = assemble("int a; int b; return a * b + (a * b + (a * b + (a * b + a * b)));")
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported { stage: Stage::Assemble, .. }));
    }

    #[test]
    fn test_jump_mnemonic_table() {
        assert_eq!(jump_mnemonic(">", true), Some("jg"));
        assert_eq!(jump_mnemonic(">", false), Some("jle"));
        assert_eq!(jump_mnemonic("&&", false), None);
    }
}
