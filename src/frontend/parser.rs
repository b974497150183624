//! Parser for minicc
//!
//! Recursive descent with one function per precedence layer:
//!
//! ```text
//! program  := "int" "main" "(" ")" "{" stmts "}" EOF
//! stmts    := stmt stmt*                      (until "}" or EOF)
//! cond     := bool (("&&" | "||") bool)*
//! bool     := expr (RELOP expr)?
//! expr     := term (("+" | "-") term)*
//! term     := factor (("*" | "/") factor)*
//! factor   := ("+" | "-") factor | INT | IDENT | "(" (cond | expr) ")"
//! ```
//!
//! The first ill-formed construct aborts the parse; there is no recovery.

use log::debug;

use crate::frontend::ast::*;
use crate::frontend::lexer::TokenCursor;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Coordinates, Error, Result};

/// The parser
pub struct Parser {
    cursor: TokenCursor,
    next_id: usize,
    /// Set while inside an `if`/`while`/`do-while` condition, where
    /// parentheses may hold a nested condition
    in_condition: bool,
}

impl Parser {
    /// Create a parser from pre-tokenized input
    pub fn new(tokens: Vec<Token>) -> Self {
        Self::from_cursor(TokenCursor::new(tokens))
    }

    pub fn from_cursor(cursor: TokenCursor) -> Self {
        Self {
            cursor,
            next_id: 0,
            in_condition: false,
        }
    }

    // ==================== Helper Methods ====================

    fn make(&mut self, at: Coordinates, kind: NodeKind) -> Node {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        Node::new(id, at, kind)
    }

    fn here(&self) -> Coordinates {
        self.cursor.current().coordinates
    }

    fn current_kind(&self) -> TokenKind {
        self.cursor.current().kind
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        self.cursor.advance_past(kind)
    }

    // ==================== Parsing Methods ====================

    /// Parse a complete program and return its root compound statement
    pub fn parse(&mut self) -> Result<Node> {
        self.expect(TokenKind::Int)?;
        self.expect(TokenKind::Main)?;
        self.expect(TokenKind::LParen)?;
        self.expect(TokenKind::RParen)?;
        let root = self.parse_body()?;

        if !self.cursor.is_exhausted() {
            return Err(self.cursor.unexpected("end of input"));
        }

        debug!("parsed {} nodes", self.next_id);
        Ok(root)
    }

    /// `{ stmts }` as a compound statement
    fn parse_body(&mut self) -> Result<Node> {
        let at = self.here();
        self.expect(TokenKind::LBrace)?;
        let statements = self.parse_statements()?;
        self.expect(TokenKind::RBrace)?;
        Ok(self.make(at, NodeKind::Compound { statements }))
    }

    fn parse_statements(&mut self) -> Result<Vec<Node>> {
        let mut statements = vec![self.parse_stmt()?];
        while !self.cursor.check(TokenKind::RBrace) && !self.cursor.is_exhausted() {
            statements.push(self.parse_stmt()?);
        }
        Ok(statements)
    }

    fn parse_stmt(&mut self) -> Result<Node> {
        match self.current_kind() {
            TokenKind::If => self.parse_if_chain(),
            TokenKind::While => self.parse_while(),
            TokenKind::Do => self.parse_do_while(),
            TokenKind::Int => self.parse_declaration(),
            TokenKind::Identifier => self.parse_assignment(),
            TokenKind::Return => self.parse_return(),
            TokenKind::LBrace => {
                let at = self.here();
                self.expect(TokenKind::LBrace)?;
                let statements = self.parse_statements()?;
                self.expect(TokenKind::RBrace)?;
                Ok(self.make(at, NodeKind::Block { statements }))
            }
            TokenKind::Semicolon => {
                let at = self.here();
                self.cursor.advance();
                Ok(self.make(at, NodeKind::Empty))
            }
            // A terminator right away means an empty statement list
            TokenKind::RBrace | TokenKind::Eof => {
                let at = self.here();
                Ok(self.make(at, NodeKind::Empty))
            }
            _ => Err(self.cursor.unexpected("statement")),
        }
    }

    fn parse_if_chain(&mut self) -> Result<Node> {
        let at = self.here();
        let mut clauses = vec![self.parse_if_clause(ClauseTag::If)?];
        let mut else_body = None;

        while self.cursor.check(TokenKind::Else) {
            self.cursor.advance();
            if self.cursor.check(TokenKind::If) {
                clauses.push(self.parse_if_clause(ClauseTag::ElseIf)?);
            } else {
                else_body = Some(Box::new(self.parse_body()?));
                break;
            }
        }

        Ok(self.make(at, NodeKind::IfChain { clauses, else_body }))
    }

    fn parse_if_clause(&mut self, tag: ClauseTag) -> Result<Node> {
        let at = self.here();
        self.expect(TokenKind::If)?;
        let condition = self.parse_parenthesized_condition()?;
        let body = self.parse_body()?;
        Ok(self.if_clause(at, tag, body, condition))
    }

    /// Clause nodes are always assembled as (body, condition)
    fn if_clause(&mut self, at: Coordinates, tag: ClauseTag, body: Node, condition: Node) -> Node {
        self.make(
            at,
            NodeKind::IfClause {
                tag,
                condition: Box::new(condition),
                body: Box::new(body),
            },
        )
    }

    fn parse_while(&mut self) -> Result<Node> {
        let at = self.here();
        self.expect(TokenKind::While)?;
        let condition = self.parse_parenthesized_condition()?;
        let body = self.parse_body()?;
        Ok(self.make(
            at,
            NodeKind::While {
                condition: Box::new(condition),
                body: Box::new(body),
            },
        ))
    }

    fn parse_do_while(&mut self) -> Result<Node> {
        let at = self.here();
        self.expect(TokenKind::Do)?;
        let body = self.parse_body()?;
        self.expect(TokenKind::While)?;
        let condition = self.parse_parenthesized_condition()?;
        if self.cursor.check(TokenKind::Semicolon) {
            self.cursor.advance();
        }
        Ok(self.make(
            at,
            NodeKind::DoWhile {
                body: Box::new(body),
                condition: Box::new(condition),
            },
        ))
    }

    fn parse_declaration(&mut self) -> Result<Node> {
        let at = self.here();
        self.expect(TokenKind::Int)?;
        let mut identifier = self.parse_identifier()?;
        if let NodeKind::Identifier(ident) = &mut identifier.kind {
            ident.ty = Some(TypeTag::Int);
        }
        let identifier = Box::new(identifier);

        match self.current_kind() {
            TokenKind::Semicolon => {
                self.cursor.advance();
                Ok(self.make(
                    at,
                    NodeKind::Declaration {
                        identifier,
                        ty: TypeTag::Int,
                    },
                ))
            }
            TokenKind::Assign => {
                self.cursor.advance();
                let value = Box::new(self.parse_expr()?);
                self.expect(TokenKind::Semicolon)?;
                Ok(self.make(
                    at,
                    NodeKind::DeclarationAssignment {
                        identifier,
                        ty: TypeTag::Int,
                        value,
                    },
                ))
            }
            _ => Err(self.cursor.unexpected("';' or '='")),
        }
    }

    fn parse_assignment(&mut self) -> Result<Node> {
        let at = self.here();
        let target = Box::new(self.parse_identifier()?);

        let op = match self.current_kind() {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::AddAssign,
            TokenKind::MinusAssign => AssignOp::SubAssign,
            TokenKind::StarAssign => AssignOp::MulAssign,
            TokenKind::SlashAssign => AssignOp::DivAssign,
            _ => return Err(self.cursor.unexpected("assignment operator")),
        };
        self.cursor.advance();

        let value = Box::new(self.parse_expr()?);
        self.expect(TokenKind::Semicolon)?;
        Ok(self.make(at, NodeKind::Assignment { target, op, value }))
    }

    fn parse_return(&mut self) -> Result<Node> {
        let at = self.here();
        self.expect(TokenKind::Return)?;
        let value = Box::new(self.parse_expr()?);
        self.expect(TokenKind::Semicolon)?;
        Ok(self.make(at, NodeKind::Return { value }))
    }

    fn parse_identifier(&mut self) -> Result<Node> {
        let token = self.expect(TokenKind::Identifier)?;
        Ok(self.make(
            token.coordinates,
            NodeKind::Identifier(Identifier::new(token.lexeme)),
        ))
    }

    // ==================== Condition Parsing ====================

    fn parse_parenthesized_condition(&mut self) -> Result<Node> {
        self.expect(TokenKind::LParen)?;
        let condition = self.parse_condition()?;
        self.expect(TokenKind::RParen)?;
        Ok(condition)
    }

    fn parse_condition(&mut self) -> Result<Node> {
        let saved = std::mem::replace(&mut self.in_condition, true);
        let result = self.parse_logical();
        self.in_condition = saved;
        result
    }

    fn parse_logical(&mut self) -> Result<Node> {
        let mut left = self.parse_bool_expr()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::AndAnd => BinaryOp::And,
                TokenKind::OrOr => BinaryOp::Or,
                _ => return Ok(left),
            };
            let at = self.cursor.advance().coordinates;
            let right = self.parse_bool_expr()?;
            left = self.binary(at, op, left, right);
        }
    }

    fn parse_bool_expr(&mut self) -> Result<Node> {
        let left = self.parse_expr()?;
        let op = match self.current_kind() {
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::Ne => BinaryOp::Ne,
            _ => return Ok(left),
        };
        let at = self.cursor.advance().coordinates;
        let right = self.parse_expr()?;
        Ok(self.binary(at, op, left, right))
    }

    // ==================== Expression Parsing ====================

    fn parse_expr(&mut self) -> Result<Node> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            let at = self.cursor.advance().coordinates;
            let right = self.parse_term()?;
            left = self.binary(at, op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Node> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            let at = self.cursor.advance().coordinates;
            let right = self.parse_factor()?;
            left = self.binary(at, op, left, right);
        }
    }

    fn parse_factor(&mut self) -> Result<Node> {
        let at = self.here();
        match self.current_kind() {
            TokenKind::Plus | TokenKind::Minus => {
                let op = if self.cursor.advance().kind == TokenKind::Plus {
                    UnaryOp::Plus
                } else {
                    UnaryOp::Minus
                };
                let operand = Box::new(self.parse_factor()?);
                Ok(self.make(at, NodeKind::Unary { op, operand }))
            }
            TokenKind::IntLiteral => {
                let token = self.cursor.advance();
                let value = parse_int_literal(&token.lexeme).ok_or_else(|| {
                    Error::InvalidLiteral {
                        lexeme: token.lexeme.clone(),
                        at,
                    }
                })?;
                Ok(self.make(
                    at,
                    NodeKind::Integer {
                        value,
                        lexeme: token.lexeme,
                    },
                ))
            }
            TokenKind::Identifier => self.parse_identifier(),
            TokenKind::LParen => {
                self.cursor.advance();
                let inner = if self.in_condition {
                    self.parse_condition()?
                } else {
                    self.parse_expr()?
                };
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            _ => Err(self.cursor.unexpected("expression")),
        }
    }

    fn binary(&mut self, at: Coordinates, op: BinaryOp, left: Node, right: Node) -> Node {
        self.make(
            at,
            NodeKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }
}

/// Evaluate a decimal, hex or binary integer lexeme, ignoring digit
/// separators and integer suffixes
pub fn parse_int_literal(lexeme: &str) -> Option<i64> {
    let cleaned: String = lexeme.chars().filter(|&c| c != '\'').collect();
    let body = cleaned.trim_end_matches(|c| matches!(c, 'u' | 'U' | 'l' | 'L'));

    let (digits, radix) = if let Some(rest) = body
        .strip_prefix("0x")
        .or_else(|| body.strip_prefix("0X"))
    {
        (rest, 16)
    } else if let Some(rest) = body
        .strip_prefix("0b")
        .or_else(|| body.strip_prefix("0B"))
    {
        (rest, 2)
    } else {
        (body, 10)
    };

    if digits.is_empty() {
        return None;
    }
    i64::from_str_radix(digits, radix).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Result<Node> {
        let tokens = Lexer::new(source).tokenize();
        Parser::new(tokens).parse()
    }

    fn wrap_in_main(body: &str) -> String {
        format!("int main() {{ {} }}", body)
    }

    /// Shape of the expression in `return <expr>;`
    fn expr_shape(expr: &str) -> String {
        let root = parse(&wrap_in_main(&format!("return {};", expr))).unwrap();
        let NodeKind::Compound { statements } = &root.kind else {
            panic!("root is not a compound statement");
        };
        let NodeKind::Return { value } = &statements[0].kind else {
            panic!("expected a return statement");
        };
        value.shape()
    }

    fn condition_shape(cond: &str) -> String {
        let root = parse(&wrap_in_main(&format!("while ({}) {{ }}", cond))).unwrap();
        let NodeKind::Compound { statements } = &root.kind else {
            panic!();
        };
        let NodeKind::While { condition, .. } = &statements[0].kind else {
            panic!();
        };
        condition.shape()
    }

    #[test]
    fn test_precedence() {
        assert_eq!(expr_shape("2 + 3 * 4"), "Add(2, Mul(3, 4))");
        assert_eq!(expr_shape("2 * (3 + 4)"), "Mul(2, Add(3, 4))");
        assert_eq!(expr_shape("a / b - c * d"), "Sub(Div(a, b), Mul(c, d))");
    }

    #[test]
    fn test_left_associativity() {
        assert_eq!(expr_shape("10 - 4 - 3"), "Sub(Sub(10, 4), 3)");
        assert_eq!(expr_shape("8 / 4 / 2"), "Div(Div(8, 4), 2)");
    }

    #[test]
    fn test_unary() {
        assert_eq!(expr_shape("-(2 + 3)"), "Neg(Add(2, 3))");
        assert_eq!(expr_shape("- - x * +y"), "Mul(Neg(Neg(x)), Pos(y))");
    }

    #[test]
    fn test_integer_literal_forms() {
        assert_eq!(expr_shape("0x1F + 0b101 + 1'000u"), "Add(Add(31, 5), 1000)");
    }

    #[test]
    fn test_conditions() {
        assert_eq!(condition_shape("a > b"), "Gt(a, b)");
        assert_eq!(
            condition_shape("a + 1 <= b && c != 0 || d"),
            "Or(And(Le(Add(a, 1), b), Ne(c, 0)), d)"
        );
        assert_eq!(
            condition_shape("(a > b && b > c) || x == 1"),
            "Or(And(Gt(a, b), Gt(b, c)), Eq(x, 1))"
        );
    }

    #[test]
    fn test_condition_flag_restored_after_parens() {
        // Logical operators are only legal in parentheses inside a condition
        assert!(parse(&wrap_in_main("int x; while ((x > 1)) { x = (x + 1) * 2; }")).is_ok());
        assert!(parse(&wrap_in_main("int x; x = (x && 1);")).is_err());
    }

    #[test]
    fn test_if_chain() {
        let source = wrap_in_main(
            "int a; if (a > 1) { a = 1; } else if (a > 0) { a = 2; } else { a = 3; }",
        );
        let root = parse(&source).unwrap();
        let NodeKind::Compound { statements } = &root.kind else {
            panic!();
        };
        let NodeKind::IfChain { clauses, else_body } = &statements[1].kind else {
            panic!("expected an if chain");
        };
        let tags: Vec<ClauseTag> = clauses
            .iter()
            .map(|c| match &c.kind {
                NodeKind::IfClause { tag, .. } => *tag,
                _ => panic!("expected a clause"),
            })
            .collect();
        assert_eq!(tags, vec![ClauseTag::If, ClauseTag::ElseIf]);
        assert!(else_body.is_some());
    }

    #[test]
    fn test_loops_and_blocks() {
        let source = wrap_in_main(
            "int i = 0; while (i < 3) { i += 1; } do { i = i - 1; } while (i > 0); { int j; } ;",
        );
        let root = parse(&source).unwrap();
        let tags: Vec<&str> = root.children().iter().map(|n| n.tag()).collect();
        assert_eq!(
            tags,
            vec!["DeclarationAssignment", "While", "DoWhile", "Block", "Empty"]
        );
    }

    #[test]
    fn test_empty_body_holds_empty_statement() {
        let root = parse("int main() { }").unwrap();
        let tags: Vec<&str> = root.children().iter().map(|n| n.tag()).collect();
        assert_eq!(tags, vec!["Empty"]);

        let root = parse(&wrap_in_main("int x; if (x) { }")).unwrap();
        let mut empty = 0;
        root.walk(&mut |node, _| {
            if matches!(node.kind, NodeKind::Empty) {
                empty += 1;
            }
        });
        assert_eq!(empty, 1);
    }

    #[test]
    fn test_node_ids_are_unique() {
        let root = parse(&wrap_in_main("int a = 1; if (a > 0) { return a * 2; }")).unwrap();
        let mut ids = Vec::new();
        root.walk(&mut |node, _| ids.push(node.id));
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert_eq!(root.parent_map().len(), count - 1);
    }

    #[test]
    fn test_missing_semicolon_reports_coordinates() {
        let err = parse("int main() {\n  int x = 1\n  return x;\n}").unwrap_err();
        assert_eq!(
            err,
            Error::UnexpectedToken {
                expected: "Semicolon".to_string(),
                found: "return".to_string(),
                kind: TokenKind::Return,
                at: Coordinates::new(3, 3),
            }
        );
    }

    #[test]
    fn test_only_main_is_accepted() {
        assert!(matches!(
            parse("int foo() { return 0; }"),
            Err(Error::UnexpectedToken { kind: TokenKind::Identifier, .. })
        ));
        assert!(parse("main() { return 0; }").is_err());
        assert!(parse("int main() { return 0; } int").is_err());
    }

    #[test]
    fn test_float_and_unknown_tokens_are_rejected() {
        assert!(matches!(
            parse(&wrap_in_main("return 1.5;")),
            Err(Error::UnexpectedToken { kind: TokenKind::FloatLiteral, .. })
        ));
        assert!(matches!(
            parse(&wrap_in_main("int x @ 1;")),
            Err(Error::UnexpectedToken { kind: TokenKind::Unknown, .. })
        ));
    }

    #[test]
    fn test_overflowing_literal() {
        assert!(matches!(
            parse(&wrap_in_main("return 99999999999999999999;")),
            Err(Error::InvalidLiteral { .. })
        ));
    }

    #[test]
    fn test_parse_int_literal() {
        assert_eq!(parse_int_literal("42"), Some(42));
        assert_eq!(parse_int_literal("0xff"), Some(255));
        assert_eq!(parse_int_literal("0B11"), Some(3));
        assert_eq!(parse_int_literal("1'024UL"), Some(1024));
        assert_eq!(parse_int_literal("0x"), None);
    }
}
