//! Semantic Analysis for minicc
//!
//! Performs:
//! - Scope construction for every control-flow body and free block
//! - Declaration of variables with frame slot allocation
//! - Resolution of identifier uses, stamping their address and type

use log::{debug, info};

use crate::frontend::ast::*;
use crate::frontend::symbols::{Symbol, SymbolTable};
use crate::pipeline::Stage;
use crate::utils::{Coordinates, Error, Result};

/// Semantic analyzer
pub struct SemanticAnalyzer {
    table: SymbolTable,
}

impl SemanticAnalyzer {
    pub fn new() -> Self {
        Self {
            table: SymbolTable::new(),
        }
    }

    /// Analyze a program, annotating identifiers in place.
    ///
    /// Stops at the first undeclared identifier or redefinition; the scope
    /// table is unusable after a failure.
    pub fn analyze(&mut self, root: &mut Node) -> Result<()> {
        self.table = SymbolTable::new();
        self.visit(root)?;
        info!(
            "analysis complete: {} scopes, {} frame bytes",
            self.table.scopes().len(),
            self.table.frame_size()
        );
        Ok(())
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn into_table(self) -> SymbolTable {
        self.table
    }

    fn visit(&mut self, node: &mut Node) -> Result<()> {
        let (id, at) = (node.id, node.at);
        match &mut node.kind {
            NodeKind::Integer { .. } | NodeKind::Empty => Ok(()),
            NodeKind::Identifier(ident) => self.resolve(ident, at),
            NodeKind::Unary { operand, .. } => self.visit(operand),
            NodeKind::Binary { left, right, .. } => {
                self.visit(left)?;
                self.visit(right)
            }
            NodeKind::IfChain { clauses, else_body } => {
                for clause in clauses.iter_mut() {
                    self.visit(clause)?;
                }
                match else_body {
                    Some(body) => self.scoped(format!("else_{}", id), body),
                    None => Ok(()),
                }
            }
            NodeKind::IfClause {
                tag,
                condition,
                body,
            } => {
                self.visit(condition)?;
                let prefix = match tag {
                    ClauseTag::If => "if",
                    ClauseTag::ElseIf => "elseif",
                };
                self.scoped(format!("{}_{}", prefix, id), body)
            }
            NodeKind::While { condition, body } => {
                // The condition belongs to the scope containing the loop
                self.visit(condition)?;
                self.scoped(format!("while_{}", id), body)
            }
            NodeKind::DoWhile { body, condition } => {
                self.scoped(format!("dowhile_{}", id), body)?;
                // Body declarations are already out of scope here
                self.visit(condition)
            }
            NodeKind::Compound { statements } => {
                for statement in statements.iter_mut() {
                    self.visit(statement)?;
                }
                Ok(())
            }
            NodeKind::Block { statements } => {
                self.table.enter_scope(format!("block_{}", id));
                let result = statements.iter_mut().try_for_each(|s| self.visit(s));
                self.table.exit_scope();
                result
            }
            NodeKind::Declaration { identifier, ty } => self.declare(identifier, *ty),
            NodeKind::DeclarationAssignment {
                identifier,
                ty,
                value,
            } => {
                self.visit(value)?;
                self.declare(identifier, *ty)
            }
            NodeKind::Assignment { target, value, .. } => {
                self.visit(target)?;
                self.visit(value)
            }
            NodeKind::Return { value } => self.visit(value),
        }
    }

    /// Visit `body` inside a fresh scope named `name`
    fn scoped(&mut self, name: String, body: &mut Node) -> Result<()> {
        debug!("entering scope {}", name);
        self.table.enter_scope(name);
        let result = self.visit(body);
        self.table.exit_scope();
        result
    }

    fn declare(&mut self, node: &mut Node, ty: TypeTag) -> Result<()> {
        let (at, tag) = (node.at, node.tag());
        let NodeKind::Identifier(ident) = &mut node.kind else {
            return Err(Error::unsupported(
                Stage::Analyze,
                format!("declaration of a {} node", tag),
            ));
        };

        let type_name = match self.table.lookup(ty.name()) {
            Some(Symbol::Builtin { name }) => name.clone(),
            _ => {
                return Err(Error::UndeclaredIdentifier {
                    name: ty.name().to_string(),
                    at,
                })
            }
        };

        let offset = self.table.allocate_slot();
        self.table.define(
            Symbol::Variable {
                name: ident.name.clone(),
                offset,
                ty: type_name,
            },
            at,
        )?;
        debug!("declared {} at {}", ident.name, offset);

        ident.address = Some(offset);
        ident.ty = Some(ty);
        Ok(())
    }

    fn resolve(&mut self, ident: &mut Identifier, at: Coordinates) -> Result<()> {
        match self.table.lookup(&ident.name) {
            Some(Symbol::Variable { offset, ty, .. }) => {
                ident.address = Some(*offset);
                ident.ty = TypeTag::from_name(ty);
                Ok(())
            }
            _ => Err(Error::UndeclaredIdentifier {
                name: ident.name.clone(),
                at,
            }),
        }
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Node {
        Parser::new(Lexer::new(source).tokenize()).parse().unwrap()
    }

    fn analyze(source: &str) -> Result<(Node, SymbolTable)> {
        let mut root = parse(source);
        let mut analyzer = SemanticAnalyzer::new();
        analyzer.analyze(&mut root)?;
        Ok((root, analyzer.into_table()))
    }

    /// (name, address) of every identifier occurrence in source order
    fn addresses(root: &Node) -> Vec<(String, Option<i32>)> {
        let mut out = Vec::new();
        root.walk(&mut |node, _| {
            if let NodeKind::Identifier(ident) = &node.kind {
                out.push((ident.name.clone(), ident.address));
            }
        });
        out
    }

    #[test]
    fn test_addresses_are_stamped() {
        let (root, table) = analyze("int main() { int a = 1; int b; b = a + 2; return b; }").unwrap();
        assert_eq!(
            addresses(&root),
            vec![
                ("a".to_string(), Some(-4)),
                ("b".to_string(), Some(-8)),
                ("b".to_string(), Some(-8)),
                ("a".to_string(), Some(-4)),
                ("b".to_string(), Some(-8)),
            ]
        );
        assert_eq!(table.frame_size(), 8);
    }

    #[test]
    fn test_types_are_stamped() {
        let (root, _) = analyze("int main() { int a; a = 1; }").unwrap();
        root.walk(&mut |node, _| {
            if let NodeKind::Identifier(ident) = &node.kind {
                assert_eq!(ident.ty, Some(TypeTag::Int));
            }
        });
    }

    #[test]
    fn test_shadowing_in_nested_block() {
        let (root, table) = analyze("int main() { int x; { int x; x = 5; } x = 1; }").unwrap();
        let resolved: Vec<Option<i32>> = addresses(&root).into_iter().map(|(_, a)| a).collect();
        assert_eq!(resolved, vec![Some(-4), Some(-8), Some(-8), Some(-4)]);
        assert_eq!(table.scopes().len(), 2);
        assert!(table.scopes()[1].name.starts_with("block_"));
    }

    #[test]
    fn test_redefinition_in_same_scope() {
        let err = analyze("int main() {\n  int x;\n  int x;\n}").unwrap_err();
        assert_eq!(
            err,
            Error::Redefinition {
                name: "x".to_string(),
                at: Coordinates::new(3, 7),
            }
        );
    }

    #[test]
    fn test_undeclared_use() {
        let err = analyze("int main() {\n  y = 3;\n}").unwrap_err();
        assert_eq!(
            err,
            Error::UndeclaredIdentifier {
                name: "y".to_string(),
                at: Coordinates::new(2, 3),
            }
        );
    }

    #[test]
    fn test_do_while_condition_cannot_see_body() {
        let err = analyze("int main() { do { int y = 1; } while (y > 0); }").unwrap_err();
        assert!(matches!(err, Error::UndeclaredIdentifier { ref name, .. } if name == "y"));
    }

    #[test]
    fn test_while_condition_resolved_in_enclosing_scope() {
        let err = analyze("int main() { while (y > 0) { int y = 1; } }").unwrap_err();
        assert!(matches!(err, Error::UndeclaredIdentifier { ref name, .. } if name == "y"));

        assert!(analyze("int main() { int i = 3; while (i > 0) { i -= 1; } }").is_ok());
    }

    #[test]
    fn test_body_variable_out_of_scope_after_if() {
        let source = "int main() { int a; if (a > 0) { int b; } else { int c; } b = 1; }";
        assert!(matches!(
            analyze(source),
            Err(Error::UndeclaredIdentifier { ref name, .. }) if name == "b"
        ));
    }

    #[test]
    fn test_scope_tree() {
        let source = "int main() { int a; if (a > 0) { a = 1; } else if (a < 0) { a = 2; } \
                      else { a = 3; } while (a) { a = 0; } do { a = 1; } while (a < 1); }";
        let (_, table) = analyze(source).unwrap();
        let names: Vec<String> = table
            .scopes()
            .iter()
            .map(|s| s.name.split('_').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["global", "if", "elseif", "else", "while", "dowhile"]
        );
        assert!(table.scopes()[1..].iter().all(|s| s.level == 2));

        let markers = table.scopes()[0]
            .symbols()
            .iter()
            .filter(|s| s.kind_name() == "scope")
            .count();
        assert_eq!(markers, 5);
    }

    #[test]
    fn test_state_is_reset_between_runs() {
        let mut analyzer = SemanticAnalyzer::new();
        let mut first = parse("int main() { int a; int b; }");
        analyzer.analyze(&mut first).unwrap();

        let mut second = parse("int main() { int a; }");
        analyzer.analyze(&mut second).unwrap();
        assert_eq!(addresses(&second), vec![("a".to_string(), Some(-4))]);
        assert_eq!(analyzer.table().frame_size(), 4);
    }
}
