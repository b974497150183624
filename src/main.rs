//! minicc command-line driver
//!
//! Compiles a single-function C subset to flat pseudo-assembly, or dumps the
//! output of any intermediate stage.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use minicc::frontend::ast::print_tree;
use minicc::frontend::symbols::print_scopes;
use minicc::middle::print_tac;
use minicc::report::{AstExport, ErrorReport, ScopeExport};
use minicc::{Diagnostic, Pipeline, Stage, StringSource};

/// minicc compiler
#[derive(Parser, Debug)]
#[command(name = "minicc")]
#[command(version = "0.1.0")]
#[command(about = "minicc - compiles a single-function C subset to pseudo-assembly")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Input source file
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Stage output to print
    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compile a source file to assembly
    Build {
        /// Input source file
        input: PathBuf,

        /// Output file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check a source file for errors
    Check {
        /// Input source file
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    Tokens,
    Ast,
    Scopes,
    Tac,
    Asm,
}

impl Emit {
    /// Last stage that has to run to produce this output
    fn stage(self) -> Stage {
        match self {
            Emit::Tokens => Stage::Lex,
            Emit::Ast => Stage::Parse,
            Emit::Scopes => Stage::Analyze,
            Emit::Tac => Stage::Lower,
            Emit::Asm => Stage::Assemble,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the source itself failed to compile
fn run(cli: &Cli) -> Result<bool> {
    match &cli.command {
        Some(Commands::Build { input, output }) => build_file(input, output.clone(), cli.format),
        Some(Commands::Check { input }) => check_file(input, cli.format),
        None => {
            let Some(input) = &cli.input else {
                eprintln!("Error: No input file specified");
                eprintln!("Usage: minicc <FILE> or minicc build <FILE>");
                process::exit(2);
            };
            emit_file(input, cli.output.as_deref(), cli.emit, cli.format)
        }
    }
}

fn load(input: &Path) -> Result<Pipeline<StringSource>> {
    let source = fs::read_to_string(input)
        .with_context(|| format!("could not read {}", input.display()))?;
    Ok(Pipeline::new(StringSource::new(source)))
}

fn report_failure(diagnostic: &Diagnostic, format: Format) {
    match format {
        Format::Text => eprintln!("{}", diagnostic),
        Format::Json => eprintln!("{}", ErrorReport::from(diagnostic).to_json()),
    }
}

fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("could not write {}", path.display())),
        None => {
            print!("{}", text);
            Ok(())
        }
    }
}

/// Print one stage's output
fn emit_file(input: &Path, output: Option<&Path>, emit: Emit, format: Format) -> Result<bool> {
    let mut pipeline = load(input)?;
    if let Err(diagnostic) = pipeline.run_through(emit.stage()) {
        report_failure(&diagnostic, format);
        return Ok(false);
    }

    let text = render(&pipeline, emit, format)?;
    write_output(&text, output)?;
    Ok(true)
}

fn render(pipeline: &Pipeline<StringSource>, emit: Emit, format: Format) -> Result<String> {
    let missing = || anyhow::anyhow!("stage {} produced no output", emit.stage());
    let text: String = match (emit, format) {
        (Emit::Tokens, Format::Text) => pipeline
            .tokens()
            .ok_or_else(missing)?
            .iter()
            .map(|t| format!("{}\n", t))
            .collect(),
        (Emit::Tokens, Format::Json) => {
            serde_json::to_string_pretty(pipeline.tokens().ok_or_else(missing)?)?
        }
        (Emit::Ast, Format::Text) => print_tree(pipeline.ast().ok_or_else(missing)?),
        (Emit::Ast, Format::Json) => AstExport::from_tree(pipeline.ast().ok_or_else(missing)?).to_json(),
        (Emit::Scopes, Format::Text) => print_scopes(pipeline.scopes().ok_or_else(missing)?),
        (Emit::Scopes, Format::Json) => {
            ScopeExport::from_table(pipeline.scopes().ok_or_else(missing)?).to_json()
        }
        (Emit::Tac, Format::Text) => print_tac(pipeline.tac().ok_or_else(missing)?),
        (Emit::Tac, Format::Json) => serde_json::to_string_pretty(pipeline.tac().ok_or_else(missing)?)?,
        (Emit::Asm, Format::Text) => pipeline.assembly().ok_or_else(missing)?.to_string(),
        (Emit::Asm, Format::Json) => serde_json::to_string_pretty(&serde_json::json!({
            "assembly": pipeline.assembly().ok_or_else(missing)?,
        }))?,
    };
    Ok(text)
}

/// Compile a source file to an assembly file
fn build_file(input: &Path, output: Option<PathBuf>, format: Format) -> Result<bool> {
    println!("minicc v0.1.0");
    println!("Compiling: {}", input.display());

    let mut pipeline = load(input)?;
    for stage in Stage::ALL {
        if let Err(diagnostic) = pipeline.run(stage) {
            report_failure(&diagnostic, format);
            return Ok(false);
        }
        println!("  [ok] {}", stage);
    }

    let asm_path = output.unwrap_or_else(|| input.with_extension("asm"));
    write_output(pipeline.assembly().unwrap_or_default(), Some(&asm_path))?;
    println!("Output: {}", asm_path.display());
    Ok(true)
}

/// Check a source file for errors without generating code
fn check_file(input: &Path, format: Format) -> Result<bool> {
    println!("Checking: {}", input.display());

    let mut pipeline = load(input)?;
    if let Err(diagnostic) = pipeline.run_through(Stage::Analyze) {
        report_failure(&diagnostic, format);
        return Ok(false);
    }

    println!("No errors found");
    Ok(true)
}
