//! Stage orchestration for minicc
//!
//! Holds the output of every stage and enforces the
//! lex -> parse -> analyze -> lower -> assemble order. Re-running or resetting
//! a stage throws away everything downstream of it.

use std::fmt;

use log::{error, info};
use serde::Serialize;

use crate::backend::{AsmCodeGen, CodeGen};
use crate::frontend::ast::Node;
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::frontend::semantic::SemanticAnalyzer;
use crate::frontend::symbols::SymbolTable;
use crate::frontend::token::Token;
use crate::middle::tac::TacProgram;
use crate::middle::tac_gen::TacGenerator;
use crate::utils::{Diagnostic, Error};

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Stage {
    Lex,
    Parse,
    Analyze,
    Lower,
    Assemble,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Lex,
        Stage::Parse,
        Stage::Analyze,
        Stage::Lower,
        Stage::Assemble,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Analyze => "semantic",
            Stage::Lower => "lowering",
            Stage::Assemble => "assembly",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the pipeline gets its source text from
pub trait SourceProvider {
    /// Current source as an ordered list of lines
    fn lines(&self) -> Vec<String>;

    /// Text of a 1-based line, if it exists
    fn line_text(&self, line: usize) -> Option<String> {
        let index = line.checked_sub(1)?;
        self.lines().into_iter().nth(index)
    }
}

/// In-memory source text
#[derive(Debug, Clone, Default)]
pub struct StringSource {
    text: String,
}

impl StringSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }
}

impl SourceProvider for StringSource {
    fn lines(&self) -> Vec<String> {
        self.text.lines().map(str::to_string).collect()
    }
}

pub type StageResult = std::result::Result<(), Diagnostic>;

/// Compiler pipeline over a source provider
pub struct Pipeline<S: SourceProvider> {
    source: S,
    tokens: Option<Vec<Token>>,
    /// Parsed tree; annotated in place by analysis
    ast: Option<Node>,
    scopes: Option<SymbolTable>,
    tac: Option<TacProgram>,
    assembly: Option<String>,
}

impl<S: SourceProvider> Pipeline<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            tokens: None,
            ast: None,
            scopes: None,
            tac: None,
            assembly: None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the source; call [`Pipeline::source_changed`] after editing
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn tokens(&self) -> Option<&[Token]> {
        self.tokens.as_deref()
    }

    /// The tree, annotated once analysis has completed
    pub fn ast(&self) -> Option<&Node> {
        self.ast.as_ref()
    }

    pub fn scopes(&self) -> Option<&SymbolTable> {
        self.scopes.as_ref()
    }

    pub fn tac(&self) -> Option<&TacProgram> {
        self.tac.as_ref()
    }

    pub fn assembly(&self) -> Option<&str> {
        self.assembly.as_deref()
    }

    /// Whether `stage` has no current output
    pub fn needs_run(&self, stage: Stage) -> bool {
        match stage {
            Stage::Lex => self.tokens.is_none(),
            Stage::Parse => self.ast.is_none(),
            Stage::Analyze => self.scopes.is_none(),
            Stage::Lower => self.tac.is_none(),
            Stage::Assemble => self.assembly.is_none(),
        }
    }

    /// Drop the output of `stage` and of every later stage
    pub fn reset(&mut self, stage: Stage) {
        for later in Stage::ALL.iter().filter(|s| **s >= stage) {
            match later {
                Stage::Lex => self.tokens = None,
                Stage::Parse => self.ast = None,
                Stage::Analyze => self.scopes = None,
                Stage::Lower => self.tac = None,
                Stage::Assemble => self.assembly = None,
            }
        }
    }

    /// The source text changed: everything is stale
    pub fn source_changed(&mut self) {
        self.reset(Stage::Lex);
    }

    /// Run one stage from its upstream output
    pub fn run(&mut self, stage: Stage) -> StageResult {
        self.reset(stage);
        match self.execute(stage) {
            Ok(()) => {
                info!("{} stage complete", stage);
                Ok(())
            }
            Err(err) => {
                let line_text = err
                    .coordinates()
                    .and_then(|at| self.source.line_text(at.line));
                let diagnostic = Diagnostic::new(stage, err, line_text);
                error!("{}", diagnostic);
                Err(diagnostic)
            }
        }
    }

    /// Run every stage up to and including `stage` that has no current output
    pub fn run_through(&mut self, stage: Stage) -> StageResult {
        for step in Stage::ALL.into_iter().filter(|s| *s <= stage) {
            if self.needs_run(step) {
                self.run(step)?;
            }
        }
        Ok(())
    }

    pub fn run_all(&mut self) -> StageResult {
        self.run_through(Stage::Assemble)
    }

    fn execute(&mut self, stage: Stage) -> crate::utils::Result<()> {
        let missing = Error::NoInput { stage };
        match stage {
            Stage::Lex => {
                let lines = self.source.lines();
                let tokens = Lexer::from_lines(lines.as_slice()).tokenize();
                info!("lexed {} tokens", tokens.len());
                self.tokens = Some(tokens);
            }
            Stage::Parse => {
                let tokens = self.tokens.clone().ok_or(missing)?;
                self.ast = Some(Parser::new(tokens).parse()?);
            }
            Stage::Analyze => {
                let root = self.ast.as_mut().ok_or(missing)?;
                let mut analyzer = SemanticAnalyzer::new();
                analyzer.analyze(root)?;
                self.scopes = Some(analyzer.into_table());
            }
            Stage::Lower => {
                if self.scopes.is_none() {
                    return Err(missing);
                }
                let root = self.ast.as_ref().ok_or(missing)?;
                self.tac = Some(TacGenerator::new().generate(root)?);
            }
            Stage::Assemble => {
                let program = self.tac.as_ref().ok_or(missing)?;
                let mut codegen = AsmCodeGen::new();
                info!("assembling with {} backend for {}", codegen.name(), codegen.target());
                self.assembly = Some(codegen.generate(program)?);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PROGRAM: &str = "int main() {\n  int a = 2;\n  int b;\n  b = a * 3;\n  return b;\n}";

    fn pipeline(text: &str) -> Pipeline<StringSource> {
        Pipeline::new(StringSource::new(text))
    }

    #[test]
    fn test_run_all() {
        let mut p = pipeline(PROGRAM);
        p.run_all().unwrap();
        assert!(Stage::ALL.iter().all(|s| !p.needs_run(*s)));
        assert_eq!(p.scopes().map(|t| t.frame_size()), Some(8));
        let asm = p.assembly().unwrap_or_default();
        assert!(asm.starts_with("main:\n"));
        assert!(asm.contains("main_end:\n"));
    }

    #[test]
    fn test_downstream_refuses_without_input() {
        let mut p = pipeline(PROGRAM);
        let err = p.run(Stage::Parse).unwrap_err();
        assert_eq!(err.error, Error::NoInput { stage: Stage::Parse });
        assert_eq!(err.error.category(), crate::utils::ErrorCategory::Pipeline);

        p.run(Stage::Lex).unwrap();
        p.run(Stage::Parse).unwrap();
        assert_eq!(
            p.run(Stage::Lower).unwrap_err().error,
            Error::NoInput { stage: Stage::Lower }
        );
    }

    #[test]
    fn test_reset_invalidates_later_stages() {
        let mut p = pipeline(PROGRAM);
        p.run_all().unwrap();
        p.reset(Stage::Analyze);
        assert!(!p.needs_run(Stage::Parse));
        assert!(p.needs_run(Stage::Analyze));
        assert!(p.needs_run(Stage::Lower));
        assert!(p.needs_run(Stage::Assemble));

        p.run_through(Stage::Lower).unwrap();
        assert!(!p.needs_run(Stage::Lower));
        assert!(p.needs_run(Stage::Assemble));
    }

    #[test]
    fn test_rerun_is_repeatable() {
        let mut p = pipeline(PROGRAM);
        p.run_all().unwrap();
        let first = p.assembly().map(str::to_string);
        p.run(Stage::Analyze).unwrap();
        p.run_all().unwrap();
        assert_eq!(p.assembly().map(str::to_string), first);
    }

    #[test]
    fn test_source_changed() {
        let mut p = pipeline(PROGRAM);
        p.run_all().unwrap();
        p.source_mut().set_text("int main() { return 7; }");
        p.source_changed();
        assert!(Stage::ALL.iter().all(|s| p.needs_run(*s)));
        p.run_all().unwrap();
        assert!(p.assembly().unwrap_or_default().contains("mov eax, 7"));
    }

    #[test]
    fn test_failure_carries_source_line() {
        let mut p = pipeline("int main() {\n  int a;\n  c = a;\n}");
        let diagnostic = p.run_all().unwrap_err();
        assert_eq!(diagnostic.stage, Stage::Analyze);
        assert_eq!(diagnostic.line_text.as_deref(), Some("  c = a;"));
        assert_eq!(
            diagnostic.to_string(),
            "semantic error at 3:3: Undeclared identifier: c\n  |   c = a;\n  |   ^"
        );
        assert!(p.needs_run(Stage::Analyze));
        assert!(!p.needs_run(Stage::Parse));
    }

    #[test]
    fn test_parse_failure_stops_pipeline() {
        let mut p = pipeline("int main() { int a }");
        let diagnostic = p.run_all().unwrap_err();
        assert_eq!(diagnostic.stage, Stage::Parse);
        assert!(p.ast().is_none());
        assert!(p.assembly().is_none());
    }

    #[test]
    fn test_line_text_lookup() {
        let source = StringSource::new("first\nsecond");
        assert_eq!(source.line_text(2).as_deref(), Some("second"));
        assert_eq!(source.line_text(0), None);
        assert_eq!(source.line_text(3), None);
    }
}
