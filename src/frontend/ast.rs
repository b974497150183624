//! Abstract Syntax Tree definitions for minicc
//!
//! The tree is strictly owned top-down. Parent links are never stored on
//! nodes; consumers that need them derive a side map with
//! [`Node::parent_map`].

use std::collections::HashMap;
use std::fmt::{self, Write};

use serde::Serialize;

use crate::utils::Coordinates;

/// Identity of a node, assigned by the parser in construction order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node of the tree
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub at: Coordinates,
    pub kind: NodeKind,
}

/// Node variants
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Integer {
        value: i64,
        lexeme: String,
    },
    Identifier(Identifier),
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    /// Arithmetic, relational and logical operations
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    /// One `if` / `else if` arm; only appears inside an `IfChain`
    IfClause {
        tag: ClauseTag,
        condition: Box<Node>,
        body: Box<Node>,
    },
    IfChain {
        clauses: Vec<Node>,
        else_body: Option<Box<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Box<Node>,
    },
    DoWhile {
        body: Box<Node>,
        condition: Box<Node>,
    },
    /// Statement list of a function or control-flow body
    Compound {
        statements: Vec<Node>,
    },
    /// Free-standing `{ ... }` block, opens its own scope
    Block {
        statements: Vec<Node>,
    },
    Declaration {
        identifier: Box<Node>,
        ty: TypeTag,
    },
    DeclarationAssignment {
        identifier: Box<Node>,
        ty: TypeTag,
        value: Box<Node>,
    },
    Assignment {
        target: Box<Node>,
        op: AssignOp,
        value: Box<Node>,
    },
    Return {
        value: Box<Node>,
    },
    Empty,
}

/// Identifier occurrence; `address` and `ty` are filled in by semantic analysis
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub address: Option<i32>,
    pub ty: Option<TypeTag>,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            ty: None,
        }
    }
}

/// Declared type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TypeTag {
    Int,
}

impl TypeTag {
    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Int => "int",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(TypeTag::Int),
            _ => None,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseTag {
    If,
    ElseIf,
}

impl fmt::Display for ClauseTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClauseTag::If => f.write_str("IF"),
            ClauseTag::ElseIf => f.write_str("ELSE_IF"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
        }
    }
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    // Relational
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    // Logical
    And,
    Or,
}

/// Operator family, used by lowering to pick an instruction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    Arithmetic,
    Relational,
    Logical,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    pub fn class(&self) -> OpClass {
        match self {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => OpClass::Arithmetic,
            BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Eq
            | BinaryOp::Ne => OpClass::Relational,
            BinaryOp::And | BinaryOp::Or => OpClass::Logical,
        }
    }
}

/// Assignment operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
        }
    }

    /// The arithmetic operator a compound assignment applies, if any
    pub fn arithmetic(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
        }
    }
}

// ==================== Read-only traversal ====================

impl Node {
    pub fn new(id: NodeId, at: Coordinates, kind: NodeKind) -> Self {
        Self { id, at, kind }
    }

    /// Variant tag, for display
    pub fn tag(&self) -> &'static str {
        match &self.kind {
            NodeKind::Integer { .. } => "Integer",
            NodeKind::Identifier(_) => "Identifier",
            NodeKind::Unary { .. } => "Unary",
            NodeKind::Binary { op, .. } => match op.class() {
                OpClass::Arithmetic => "BinaryOp",
                OpClass::Relational | OpClass::Logical => "Condition",
            },
            NodeKind::IfClause { .. } => "IfClause",
            NodeKind::IfChain { .. } => "IfChain",
            NodeKind::While { .. } => "While",
            NodeKind::DoWhile { .. } => "DoWhile",
            NodeKind::Compound { .. } => "Compound",
            NodeKind::Block { .. } => "Block",
            NodeKind::Declaration { .. } => "Declaration",
            NodeKind::DeclarationAssignment { .. } => "DeclarationAssignment",
            NodeKind::Assignment { .. } => "Assignment",
            NodeKind::Return { .. } => "Return",
            NodeKind::Empty => "Empty",
        }
    }

    /// Short human-readable description of the node's payload
    pub fn label(&self) -> String {
        match &self.kind {
            NodeKind::Integer { value, .. } => value.to_string(),
            NodeKind::Identifier(ident) => match ident.address {
                Some(address) => format!("{} @{}", ident.name, address),
                None => ident.name.clone(),
            },
            NodeKind::Unary { op, .. } => op.symbol().to_string(),
            NodeKind::Binary { op, .. } => op.symbol().to_string(),
            NodeKind::IfClause { tag, .. } => tag.to_string(),
            NodeKind::Declaration { ty, .. } | NodeKind::DeclarationAssignment { ty, .. } => {
                ty.to_string()
            }
            NodeKind::Assignment { op, .. } => op.symbol().to_string(),
            _ => String::new(),
        }
    }

    /// Children in source order
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Integer { .. } | NodeKind::Identifier(_) | NodeKind::Empty => Vec::new(),
            NodeKind::Unary { operand, .. } => vec![&**operand],
            NodeKind::Binary { left, right, .. } => vec![&**left, &**right],
            NodeKind::IfClause {
                condition, body, ..
            } => vec![&**condition, &**body],
            NodeKind::IfChain { clauses, else_body } => {
                let mut children: Vec<&Node> = clauses.iter().collect();
                if let Some(body) = else_body {
                    children.push(body);
                }
                children
            }
            NodeKind::While { condition, body } => vec![&**condition, &**body],
            NodeKind::DoWhile { body, condition } => vec![&**body, &**condition],
            NodeKind::Compound { statements } | NodeKind::Block { statements } => {
                statements.iter().collect()
            }
            NodeKind::Declaration { identifier, .. } => vec![&**identifier],
            NodeKind::DeclarationAssignment {
                identifier, value, ..
            } => vec![&**identifier, &**value],
            NodeKind::Assignment { target, value, .. } => vec![&**target, &**value],
            NodeKind::Return { value } => vec![&**value],
        }
    }

    /// Depth-first pre-order walk with the depth of each node
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a Node, usize)) {
        self.walk_at(0, f);
    }

    fn walk_at<'a>(&'a self, depth: usize, f: &mut impl FnMut(&'a Node, usize)) {
        f(self, depth);
        for child in self.children() {
            child.walk_at(depth + 1, f);
        }
    }

    /// Derived child -> parent map; the root has no entry
    pub fn parent_map(&self) -> HashMap<NodeId, NodeId> {
        let mut parents = HashMap::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            for child in node.children() {
                parents.insert(child.id, node.id);
                stack.push(child);
            }
        }
        parents
    }

    /// Compact rendering of an expression subtree, e.g. `Add(2, Mul(3, 4))`
    pub fn shape(&self) -> String {
        match &self.kind {
            NodeKind::Integer { value, .. } => value.to_string(),
            NodeKind::Identifier(ident) => ident.name.clone(),
            NodeKind::Unary { op, operand } => {
                let name = match op {
                    UnaryOp::Plus => "Pos",
                    UnaryOp::Minus => "Neg",
                };
                format!("{}({})", name, operand.shape())
            }
            NodeKind::Binary { op, left, right } => {
                format!("{:?}({}, {})", op, left.shape(), right.shape())
            }
            _ => self.tag().to_string(),
        }
    }
}

/// Render the tree as indented text, one node per line
pub fn print_tree(root: &Node) -> String {
    let mut out = String::new();
    root.walk(&mut |node, depth| {
        let label = node.label();
        let _ = if label.is_empty() {
            writeln!(out, "{}{} #{}", "  ".repeat(depth), node.tag(), node.id)
        } else {
            writeln!(
                out,
                "{}{} #{} [{}]",
                "  ".repeat(depth),
                node.tag(),
                node.id,
                label
            )
        };
    });
    out
}
