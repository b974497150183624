//! Structured exports of pipeline results
//!
//! Provides machine-readable output for external viewers:
//! - Flat AST node lists with derived parent links
//! - Scope tables with their symbols
//! - Error reports for failed stages

use serde::Serialize;

use crate::frontend::ast::{Node, NodeId};
use crate::frontend::symbols::{ScopeId, Symbol, SymbolTable};
use crate::pipeline::Stage;
use crate::utils::{Coordinates, Diagnostic, ErrorCategory};

// ==================== AST Export ====================

#[derive(Debug, Clone, Serialize)]
pub struct AstNodeExport {
    pub id: NodeId,
    pub tag: &'static str,
    pub label: String,
    pub parent: Option<NodeId>,
    pub depth: usize,
    pub at: Coordinates,
}

/// The tree as a pre-order node list
#[derive(Debug, Clone, Serialize)]
pub struct AstExport {
    pub root: NodeId,
    pub nodes: Vec<AstNodeExport>,
}

impl AstExport {
    pub fn from_tree(root: &Node) -> Self {
        let parents = root.parent_map();
        let mut nodes = Vec::new();
        root.walk(&mut |node, depth| {
            nodes.push(AstNodeExport {
                id: node.id,
                tag: node.tag(),
                label: node.label(),
                parent: parents.get(&node.id).copied(),
                depth,
                at: node.at,
            });
        });
        Self {
            root: root.id,
            nodes,
        }
    }

    /// Export to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ==================== Scope Export ====================

#[derive(Debug, Clone, Serialize)]
pub struct SymbolExport {
    pub name: String,
    pub kind: &'static str,
    pub offset: Option<i32>,
    #[serde(rename = "type")]
    pub ty: Option<String>,
}

impl From<&Symbol> for SymbolExport {
    fn from(symbol: &Symbol) -> Self {
        Self {
            name: symbol.name().to_string(),
            kind: symbol.kind_name(),
            offset: symbol.offset(),
            ty: symbol.type_name().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeEntry {
    pub name: String,
    pub level: usize,
    pub parent: Option<String>,
    pub symbols: Vec<SymbolExport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScopeExport {
    pub scopes: Vec<ScopeEntry>,
    pub frame_size: u32,
}

impl ScopeExport {
    pub fn from_table(table: &SymbolTable) -> Self {
        let scopes = table
            .scopes()
            .iter()
            .enumerate()
            .map(|(i, scope)| ScopeEntry {
                name: scope.name.clone(),
                level: scope.level,
                parent: table.parent_name(ScopeId(i)).map(str::to_string),
                symbols: scope.symbols().iter().map(SymbolExport::from).collect(),
            })
            .collect();
        Self {
            scopes,
            frame_size: table.frame_size(),
        }
    }

    /// Export to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

// ==================== Error Report ====================

/// A failed stage in machine-readable form
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub stage: Stage,
    pub category: ErrorCategory,
    pub message: String,
    pub location: Option<Coordinates>,
    pub line_text: Option<String>,
}

impl From<&Diagnostic> for ErrorReport {
    fn from(diagnostic: &Diagnostic) -> Self {
        Self {
            stage: diagnostic.stage,
            category: diagnostic.error.category(),
            message: diagnostic.error.to_string(),
            location: diagnostic.error.coordinates(),
            line_text: diagnostic.line_text.clone(),
        }
    }
}

impl ErrorReport {
    /// Export to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, StringSource};
    use pretty_assertions::assert_eq;

    fn analyzed(source: &str) -> Pipeline<StringSource> {
        let mut pipeline = Pipeline::new(StringSource::new(source));
        pipeline.run_through(Stage::Analyze).unwrap();
        pipeline
    }

    #[test]
    fn test_ast_export_parent_links() {
        let pipeline = analyzed("int main() { int a = 1; return a; }");
        let root = pipeline.ast().unwrap();
        let export = AstExport::from_tree(root);

        assert_eq!(export.nodes[0].id, export.root);
        assert_eq!(export.nodes[0].parent, None);
        assert!(export.nodes[1..].iter().all(|n| n.parent.is_some()));

        let tags: Vec<&str> = export.nodes.iter().map(|n| n.tag).collect();
        assert_eq!(
            tags,
            vec![
                "Compound",
                "DeclarationAssignment",
                "Identifier",
                "Integer",
                "Return",
                "Identifier",
            ]
        );
        assert_eq!(export.nodes[2].parent, Some(export.nodes[1].id));
        assert_eq!(export.nodes[5].label, "a @-4");
    }

    #[test]
    fn test_scope_export() {
        let pipeline = analyzed("int main() { int a; while (a < 3) { int b; a += 1; } }");
        let export = ScopeExport::from_table(pipeline.scopes().unwrap());

        assert_eq!(export.scopes.len(), 2);
        assert_eq!(export.scopes[1].parent.as_deref(), Some("global"));
        assert_eq!(export.scopes[1].level, 2);
        assert_eq!(export.frame_size, 8);

        let b = &export.scopes[1].symbols[1];
        assert_eq!(b.name, "b");
        assert_eq!(b.offset, Some(-8));
        assert_eq!(b.ty.as_deref(), Some("int"));

        let json: serde_json::Value = serde_json::from_str(&export.to_json()).unwrap();
        assert_eq!(json["scopes"][0]["symbols"][1]["type"], "int");
        assert_eq!(json["scopes"][0]["symbols"][2]["kind"], "scope");
    }

    #[test]
    fn test_error_report() {
        let mut pipeline = Pipeline::new(StringSource::new("int main() {\n  x = 1;\n}"));
        let diagnostic = pipeline.run_all().unwrap_err();
        let report = ErrorReport::from(&diagnostic);

        assert_eq!(report.stage, Stage::Analyze);
        assert_eq!(report.category, ErrorCategory::Semantic);
        assert_eq!(report.location, Some(Coordinates::new(2, 3)));

        let json: serde_json::Value = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(json["stage"], "Analyze");
        assert_eq!(json["location"]["line"], 2);
    }
}
