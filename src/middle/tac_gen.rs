//! TAC Generator - annotated AST to three-address code
//!
//! Temporaries are handed out like a stack: an instruction's operands are
//! released before its destination is allocated, so `t1..tN` are reused as
//! soon as their value has been consumed.

use log::info;

use crate::frontend::ast::*;
use crate::middle::tac::*;
use crate::pipeline::Stage;
use crate::utils::{Error, Result};

/// TAC Generator
pub struct TacGenerator {
    quads: Vec<Quadruple>,
    /// Live temporaries
    temp_count: usize,
    /// Labels handed out so far
    label_count: usize,
}

impl TacGenerator {
    pub fn new() -> Self {
        Self {
            quads: Vec::new(),
            temp_count: 0,
            label_count: 0,
        }
    }

    /// Lower an analyzed program. Counters restart on every call.
    pub fn generate(&mut self, root: &Node) -> Result<TacProgram> {
        self.quads.clear();
        self.temp_count = 0;
        self.label_count = 0;

        self.lower_stmt(root)?;

        let program = TacProgram {
            quads: std::mem::take(&mut self.quads),
            frame_size: frame_size(root),
        };
        info!(
            "lowered {} instructions, {} labels, frame {} bytes",
            program.len(),
            self.label_count,
            program.frame_size
        );
        Ok(program)
    }

    // ==================== Counters ====================

    fn new_temp(&mut self) -> Operand {
        self.temp_count += 1;
        Operand::temporary(self.temp_count)
    }

    fn release(&mut self, operand: &Operand) {
        if operand.is_temporary() {
            self.temp_count = self.temp_count.saturating_sub(1);
        }
    }

    fn new_label(&mut self) -> Operand {
        self.label_count += 1;
        Operand::label(self.label_count)
    }

    fn emit(&mut self, quad: Quadruple) {
        self.quads.push(quad);
    }

    // ==================== Statements ====================

    fn lower_stmt(&mut self, node: &Node) -> Result<()> {
        match &node.kind {
            NodeKind::Compound { statements } | NodeKind::Block { statements } => {
                for statement in statements {
                    self.lower_stmt(statement)?;
                }
                Ok(())
            }
            NodeKind::Empty | NodeKind::Declaration { .. } => Ok(()),
            NodeKind::DeclarationAssignment {
                identifier, value, ..
            } => {
                let target = variable_operand(identifier)?;
                let value = self.lower_expr(value)?;
                self.assign(target, value);
                Ok(())
            }
            NodeKind::Assignment { target, op, value } => {
                let target = variable_operand(target)?;
                let value = self.lower_expr(value)?;
                let value = match op.arithmetic() {
                    Some(arith) => {
                        self.release(&value);
                        let dest = self.new_temp();
                        self.emit(Quadruple::binary(arith, target.clone(), value, dest.clone()));
                        dest
                    }
                    None => value,
                };
                self.assign(target, value);
                Ok(())
            }
            NodeKind::Return { value } => {
                let value = self.lower_expr(value)?;
                self.release(&value);
                self.emit(Quadruple::ret(value));
                Ok(())
            }
            NodeKind::IfChain { clauses, else_body } => {
                let end = self.new_label();
                for clause in clauses {
                    self.lower_clause(clause, &end)?;
                }
                if let Some(body) = else_body {
                    self.lower_stmt(body)?;
                }
                self.emit(Quadruple::label(end));
                Ok(())
            }
            NodeKind::While { condition, body } => {
                let start = self.new_label();
                let end = self.new_label();
                self.emit(Quadruple::label(start.clone()));
                let condition = self.lower_condition(condition)?;
                self.emit(Quadruple::if_false(condition, end.clone()));
                self.lower_stmt(body)?;
                self.emit(Quadruple::goto(start));
                self.emit(Quadruple::label(end));
                Ok(())
            }
            NodeKind::DoWhile { body, condition } => {
                let start = self.new_label();
                self.emit(Quadruple::label(start.clone()));
                self.lower_stmt(body)?;
                let condition = self.lower_condition(condition)?;
                self.emit(Quadruple::if_true(condition, start));
                Ok(())
            }
            NodeKind::IfClause { .. } => Err(Error::unsupported(
                Stage::Lower,
                format!("if clause #{} outside of an if chain", node.id),
            )),
            NodeKind::Integer { .. }
            | NodeKind::Identifier(_)
            | NodeKind::Unary { .. }
            | NodeKind::Binary { .. } => Err(Error::unsupported(
                Stage::Lower,
                format!("expression statement #{} ({})", node.id, node.tag()),
            )),
        }
    }

    /// One arm of an if chain; `end` is the chain's shared exit label
    fn lower_clause(&mut self, clause: &Node, end: &Operand) -> Result<()> {
        let NodeKind::IfClause {
            condition, body, ..
        } = &clause.kind
        else {
            return Err(Error::unsupported(
                Stage::Lower,
                format!("{} #{} inside an if chain", clause.tag(), clause.id),
            ));
        };

        let skip = self.new_label();
        let condition = self.lower_condition(condition)?;
        self.emit(Quadruple::if_false(condition, skip.clone()));
        self.lower_stmt(body)?;
        self.emit(Quadruple::goto(end.clone()));
        self.emit(Quadruple::label(skip));
        Ok(())
    }

    fn lower_condition(&mut self, condition: &Node) -> Result<Operand> {
        let operand = self.lower_expr(condition)?;
        self.release(&operand);
        Ok(operand)
    }

    /// Store `value` into `target`, folding a just-computed temporary into
    /// the instruction that produced it
    fn assign(&mut self, target: Operand, value: Operand) {
        if value.is_temporary() {
            if let Some(last) = self.quads.last_mut() {
                if last.produces_value() && last.dest.as_ref() == Some(&value) {
                    last.dest = Some(target);
                    self.release(&value);
                    return;
                }
            }
        }
        self.release(&value);
        self.emit(Quadruple::copy(value, target));
    }

    // ==================== Expressions ====================

    fn lower_expr(&mut self, node: &Node) -> Result<Operand> {
        match &node.kind {
            NodeKind::Integer { value, .. } => Ok(Operand::literal(*value)),
            NodeKind::Identifier(_) => variable_operand(node),
            NodeKind::Unary { op, operand } => {
                let operand = self.lower_expr(operand)?;
                self.release(&operand);
                let dest = self.new_temp();
                self.emit(Quadruple::unary(*op, operand, dest.clone()));
                Ok(dest)
            }
            NodeKind::Binary { op, left, right } => {
                let left = self.lower_expr(left)?;
                let right = self.lower_expr(right)?;
                self.release(&right);
                self.release(&left);
                let dest = self.new_temp();
                self.emit(Quadruple::binary(*op, left, right, dest.clone()));
                Ok(dest)
            }
            _ => Err(Error::unsupported(
                Stage::Lower,
                format!("{} #{} in expression position", node.tag(), node.id),
            )),
        }
    }
}

impl Default for TacGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn variable_operand(node: &Node) -> Result<Operand> {
    match &node.kind {
        NodeKind::Identifier(ident) => match ident.address {
            Some(address) => Ok(Operand::variable(&ident.name, address)),
            None => Err(Error::unsupported(
                Stage::Lower,
                format!("identifier '{}' has no resolved address", ident.name),
            )),
        },
        _ => Err(Error::unsupported(
            Stage::Lower,
            format!("{} #{} used as a variable", node.tag(), node.id),
        )),
    }
}

/// Bytes spanned by the lowest stamped identifier address
fn frame_size(root: &Node) -> u32 {
    let mut lowest = 0;
    root.walk(&mut |node, _| {
        if let NodeKind::Identifier(Identifier {
            address: Some(address),
            ..
        }) = &node.kind
        {
            lowest = lowest.min(*address);
        }
    });
    lowest.unsigned_abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::frontend::semantic::SemanticAnalyzer;
    use crate::middle::tac_printer::print_tac;
    use pretty_assertions::assert_eq;

    fn lower(body: &str) -> Result<TacProgram> {
        let source = format!("int main() {{ {} }}", body);
        let mut root = Parser::new(Lexer::new(&source).tokenize()).parse()?;
        SemanticAnalyzer::new().analyze(&mut root)?;
        TacGenerator::new().generate(&root)
    }

    fn tac(body: &str) -> String {
        print_tac(&lower(body).unwrap())
    }

    #[test]
    fn test_temporary_recycling() {
        let program = lower("int a = 1; int b = 2; int c; c = a * b;").unwrap();
        let arithmetic: Vec<&Quadruple> = program
            .quads
            .iter()
            .filter(|q| q.kind() == Some(CommandKind::Arithmetic))
            .collect();
        assert_eq!(arithmetic.len(), 1);
        assert_eq!(
            arithmetic[0].dest,
            Some(Operand::variable("c", -12))
        );
        assert!(program.quads.iter().all(|q| q.kind() != Some(CommandKind::Copy)
            || q.dest.as_ref().map(|d| d.name.as_str()) != Some("c")));
    }

    #[test]
    fn test_straight_line() {
        assert_eq!(
            tac("int a = 2; int b; b = a * 3 + (a - 1) * 4; return b;"),
            "    a = 2\n\
             \x20   t1 = a * 3\n\
             \x20   t2 = a - 1\n\
             \x20   t2 = t2 * 4\n\
             \x20   b = t1 + t2\n\
             \x20   return b\n"
        );
    }

    #[test]
    fn test_compound_assignment() {
        assert_eq!(
            tac("int x = 1; x += 2 * x; x -= 1;"),
            "    x = 1\n\
             \x20   t1 = 2 * x\n\
             \x20   x = x + t1\n\
             \x20   x = x - 1\n"
        );
    }

    #[test]
    fn test_if_chain_shares_end_label() {
        assert_eq!(
            tac("int a; int b; if (a > b) { return a; } else { return b; }"),
            "    t1 = a > b\n\
             \x20   IfFalse t1 goto L2\n\
             \x20   return a\n\
             \x20   goto L1\n\
             L2:\n\
             \x20   return b\n\
             L1:\n"
        );
    }

    #[test]
    fn test_else_if_chain() {
        let text = tac("int a; if (a < 0) { a = 0; } else if (a > 9) { a = 9; }");
        assert_eq!(text.matches("goto L1").count(), 2);
        assert_eq!(text.matches("L1:").count(), 1);
        assert!(text.ends_with("L3:\nL1:\n"));
    }

    #[test]
    fn test_while_loop() {
        assert_eq!(
            tac("int i = 3; while (i > 0) { i -= 1; }"),
            "    i = 3\n\
             L1:\n\
             \x20   t1 = i > 0\n\
             \x20   IfFalse t1 goto L2\n\
             \x20   i = i - 1\n\
             \x20   goto L1\n\
             L2:\n"
        );
    }

    #[test]
    fn test_do_while_jumps_back_on_true() {
        assert_eq!(
            tac("int i = 0; do { i += 1; } while (i < 5);"),
            "    i = 0\n\
             L1:\n\
             \x20   i = i + 1\n\
             \x20   t1 = i < 5\n\
             \x20   If t1 goto L1\n"
        );
    }

    #[test]
    fn test_copy_between_variables_and_unary() {
        assert_eq!(
            tac("int a = 1; int b = a; b = -b;"),
            "    a = 1\n\
             \x20   b = a\n\
             \x20   b = -b\n"
        );
    }

    #[test]
    fn test_frame_size_and_reset() {
        let mut generator = TacGenerator::new();
        let source = "int main() { int a; int b; if (a > b) { int c = 1; } }";
        let mut root = Parser::new(Lexer::new(source).tokenize()).parse().unwrap();
        SemanticAnalyzer::new().analyze(&mut root).unwrap();

        let first = generator.generate(&root).unwrap();
        let second = generator.generate(&root).unwrap();
        assert_eq!(first.frame_size, 12);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unanalyzed_tree_is_rejected() {
        let source = "int main() { int a; a = 1; }";
        let root = Parser::new(Lexer::new(source).tokenize()).parse().unwrap();
        assert!(matches!(
            TacGenerator::new().generate(&root),
            Err(Error::Unsupported { stage: Stage::Lower, .. })
        ));
    }
}
