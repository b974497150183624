//! Scope chain for minicc
//!
//! Scopes live in an arena indexed by [`ScopeId`]; each scope holds the
//! index of its parent. The whole arena is rebuilt for every analysis pass.

use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use crate::utils::{Coordinates, Error, Result};

/// Bytes reserved per variable
pub const SLOT_WIDTH: i32 = 4;

pub const GLOBAL_SCOPE: &str = "global";

/// Index of a scope in the [`SymbolTable`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ScopeId(pub usize);

/// Symbol information
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    /// Built-in type name, seeded into every scope
    Builtin { name: String },
    /// A declared variable and its frame offset
    Variable {
        name: String,
        offset: i32,
        /// Name of the builtin type symbol
        ty: String,
    },
    /// Marks that a nested scope with this name exists
    Scope { name: String, scope: ScopeId },
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Builtin { name } | Symbol::Variable { name, .. } | Symbol::Scope { name, .. } => {
                name
            }
        }
    }

    pub fn offset(&self) -> Option<i32> {
        match self {
            Symbol::Variable { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            Symbol::Variable { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Symbol::Builtin { .. } => "builtin",
            Symbol::Variable { .. } => "variable",
            Symbol::Scope { .. } => "scope",
        }
    }
}

/// One lexical scope. Symbols keep their insertion order.
#[derive(Debug, Clone)]
pub struct Scope {
    pub name: String,
    /// Nesting level, 1 for the global scope
    pub level: usize,
    pub parent: Option<ScopeId>,
    symbols: Vec<Symbol>,
    index: HashMap<String, usize>,
}

impl Scope {
    fn new(name: String, level: usize, parent: Option<ScopeId>) -> Self {
        let mut scope = Self {
            name,
            level,
            parent,
            symbols: Vec::new(),
            index: HashMap::new(),
        };
        scope.insert(Symbol::Builtin {
            name: "int".to_string(),
        });
        scope
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.index.get(name).map(|&i| &self.symbols[i])
    }

    /// Insert a symbol; returns false if the name is already taken here
    fn insert(&mut self, symbol: Symbol) -> bool {
        if self.index.contains_key(symbol.name()) {
            return false;
        }
        self.index
            .insert(symbol.name().to_string(), self.symbols.len());
        self.symbols.push(symbol);
        true
    }
}

/// Symbol table with nested scopes
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: ScopeId,
    next_offset: i32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new(GLOBAL_SCOPE.to_string(), 1, None)],
            current: ScopeId(0),
            next_offset: 0,
        }
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Enter a new named scope nested in the current one
    pub fn enter_scope(&mut self, name: String) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        let level = self.scopes[self.current.0].level + 1;

        let marker = Symbol::Scope {
            name: name.clone(),
            scope: id,
        };
        if !self.scopes[self.current.0].insert(marker) {
            log::debug!("scope marker '{}' hidden by an existing symbol", name);
        }

        self.scopes.push(Scope::new(name, level, Some(self.current)));
        self.current = id;
        id
    }

    /// Exit the current scope
    pub fn exit_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current.0].parent {
            self.current = parent;
        }
    }

    /// Reserve the next frame slot
    pub fn allocate_slot(&mut self) -> i32 {
        self.next_offset -= SLOT_WIDTH;
        self.next_offset
    }

    /// Bytes spanned by every slot allocated so far
    pub fn frame_size(&self) -> u32 {
        self.next_offset.unsigned_abs()
    }

    /// Define a symbol in the current scope
    pub fn define(&mut self, symbol: Symbol, at: Coordinates) -> Result<()> {
        let name = symbol.name().to_string();
        if !self.scopes[self.current.0].insert(symbol) {
            return Err(Error::Redefinition { name, at });
        }
        Ok(())
    }

    /// Look up a symbol, searching from current scope upward
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut scope_id = Some(self.current);
        while let Some(id) = scope_id {
            if let Some(symbol) = self.scopes[id.0].get(name) {
                return Some(symbol);
            }
            scope_id = self.scopes[id.0].parent;
        }
        None
    }

    /// Look up a symbol only in the current scope
    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes[self.current.0].get(name)
    }

    pub fn scope(&self, id: ScopeId) -> Option<&Scope> {
        self.scopes.get(id.0)
    }

    /// All scopes in creation order, global first
    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn parent_name(&self, id: ScopeId) -> Option<&str> {
        let parent = self.scope(id)?.parent?;
        self.scope(parent).map(|s| s.name.as_str())
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Render every scope and its symbols as text
pub fn print_scopes(table: &SymbolTable) -> String {
    let mut out = String::new();
    for (i, scope) in table.scopes().iter().enumerate() {
        let _ = match table.parent_name(ScopeId(i)) {
            Some(parent) => writeln!(
                out,
                "{} (level {}, parent {})",
                scope.name, scope.level, parent
            ),
            None => writeln!(out, "{} (level {})", scope.name, scope.level),
        };
        for symbol in scope.symbols() {
            let _ = match symbol {
                Symbol::Variable { name, offset, ty } => {
                    writeln!(out, "  {:<12} variable  {:>5}  {}", name, offset, ty)
                }
                other => writeln!(out, "  {:<12} {}", other.name(), other.kind_name()),
            };
        }
    }
    out
}
