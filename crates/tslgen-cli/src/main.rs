//! tslgen CLI tool
//!
//! Commands:
//!   tslgen lsp                   - start the language server on stdio
//!   tslgen check <files>...      - report problems in data files
//!   tslgen outline <file>        - print the outline of a data file
//!   tslgen schema <schema-file>  - print a transformed generator schema as JSON
//!
//! `check` validates files below a generator project against that project's
//! schema. Files outside of a project only get syntax checks.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ariadne::{Color, Config, IndexType, Label, Report, ReportKind, Source};
use clap::{Parser, Subcommand};
use tracing::warn;
use tslgen_lsp::diagnostics::{Finding, Level, check};
use tslgen_lsp::project::{DataFileKind, ProjectRegistry, ProjectSpecs};
use tslgen_lsp::symbols::{OutlineSymbol, outline};
use tslgen_schema::{SchemaError, parse_schemata};
use tslgen_yaml::{Stream, parse_stream};

// ============================================================================
// Exit codes
// ============================================================================

const EXIT_SUCCESS: i32 = 0;
const EXIT_CHECK_FAILED: i32 = 1;
const EXIT_SCHEMA_ERROR: i32 = 2;
const EXIT_IO_ERROR: i32 = 3;

// ============================================================================
// CLI argument structures
// ============================================================================

/// Tooling for tslgen primitive and extension data files
#[derive(Parser, Debug)]
#[command(name = "tslgen", version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start language server (stdio)
    Lsp,

    /// Check data files and report problems
    Check {
        /// Data files to check
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the outline of a data file
    Outline {
        /// Data file
        file: PathBuf,
    },

    /// Print a generator schema after transformation, as JSON
    Schema {
        /// Generator schema file
        schema: PathBuf,
    },
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let args = Args::parse();

    let result = match args.command {
        Command::Lsp => run_lsp(),
        Command::Check { files } => {
            init_tracing();
            run_check(&files)
        }
        Command::Outline { file } => {
            init_tracing();
            run_outline(&file)
        }
        Command::Schema { schema } => {
            init_tracing();
            run_schema(&schema)
        }
    };

    match result {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// Warnings and errors of the library crates go to stderr.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(io::stderr)
        .init();
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("found {0} error(s)")]
    CheckFailed(usize),

    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("language server failed: {0:#}")]
    Lsp(eyre::Report),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::Io { .. } => EXIT_IO_ERROR,
            CliError::Schema { .. } => EXIT_SCHEMA_ERROR,
            CliError::CheckFailed(_) => EXIT_CHECK_FAILED,
            CliError::Runtime(_) => EXIT_IO_ERROR,
            CliError::Lsp(_) => EXIT_IO_ERROR,
        }
    }
}

fn read_file(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// Commands
// ============================================================================

fn run_lsp() -> Result<(), CliError> {
    let rt = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    rt.block_on(tslgen_lsp::run()).map_err(CliError::Lsp)
}

fn run_check(files: &[PathBuf]) -> Result<(), CliError> {
    let rt = tokio::runtime::Runtime::new().map_err(CliError::Runtime)?;
    let registry = ProjectRegistry::new();
    let config = ariadne_config();
    let mut errors = 0;

    for file in files {
        let source = read_file(file)?;
        let path = file.canonicalize().unwrap_or_else(|_| file.clone());
        let findings = rt.block_on(check_file(&registry, &path, &source));

        let filename = file.display().to_string();
        let mut stderr = io::stderr().lock();
        for finding in &findings {
            write_report(&filename, &source, finding, config, &mut stderr);
        }
        errors += findings
            .iter()
            .filter(|finding| finding.level == Level::Error)
            .count();
    }

    if errors > 0 {
        Err(CliError::CheckFailed(errors))
    } else {
        Ok(())
    }
}

/// Findings for one file, validated against its project's schema when the
/// file belongs to a generator project.
async fn check_file(registry: &ProjectRegistry, path: &Path, source: &str) -> Vec<Finding> {
    let stream = parse_stream(source);
    let kind = file_kind(path, &stream);
    let schema = match ProjectSpecs::discover(path) {
        Some(specs) => match registry.get_or_init(&specs).await {
            Ok(project) => Some(project.schema().await),
            Err(e) => {
                warn!(?path, error = %e, "Checking without a schema");
                None
            }
        },
        None => None,
    };
    check(&stream, kind, schema.as_ref().map(|schema| &schema.schemata))
}

fn file_kind(path: &Path, stream: &Stream) -> DataFileKind {
    match DataFileKind::from_location(path) {
        DataFileKind::Unknown => DataFileKind::from_content(stream),
        kind => kind,
    }
}

fn run_outline(file: &Path) -> Result<(), CliError> {
    let source = read_file(file)?;
    let stream = parse_stream(&source);
    let kind = file_kind(file, &stream);
    print!("{}", render_outline(&outline(&stream, kind)));
    Ok(())
}

fn render_outline(symbols: &[OutlineSymbol]) -> String {
    fn render(symbol: &OutlineSymbol, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&symbol.name);
        out.push('\n');
        for child in &symbol.children {
            render(child, depth + 1, out);
        }
    }

    let mut out = String::new();
    for symbol in symbols {
        render(symbol, 0, &mut out);
    }
    out
}

fn run_schema(file: &Path) -> Result<(), CliError> {
    let source = read_file(file)?;
    let schemata = parse_schemata(&source).map_err(|source| CliError::Schema {
        path: file.to_path_buf(),
        source,
    })?;
    let json = serde_json::to_string_pretty(&schemata.to_json()).map_err(|e| CliError::Io {
        path: file.to_path_buf(),
        source: io::Error::other(e),
    })?;
    println!("{json}");
    Ok(())
}

// ============================================================================
// Reports
// ============================================================================

/// Get ariadne config, respecting NO_COLOR env var.
fn ariadne_config() -> Config {
    let config = Config::default().with_index_type(IndexType::Byte);
    if std::env::var("NO_COLOR").is_ok() {
        config.with_color(false)
    } else {
        config
    }
}

fn write_report<W: Write>(
    filename: &str,
    source: &str,
    finding: &Finding,
    config: Config,
    writer: W,
) {
    let (kind, color) = match finding.level {
        Level::Error => (ReportKind::Error, Color::Red),
        Level::Warning => (ReportKind::Warning, Color::Yellow),
        Level::Information | Level::Hint => (ReportKind::Advice, Color::Blue),
    };
    let range = finding.span.start..finding.span.end;
    let _ = Report::build(kind, (filename, range.clone()))
        .with_code(finding.code)
        .with_message(&finding.message)
        .with_label(
            Label::new((filename, range))
                .with_message(&finding.message)
                .with_color(color),
        )
        .with_config(config)
        .finish()
        .write((filename, Source::from(source)), writer);
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "\
extension:
  required:
    extension_name:
      type: str
primitive_class:
  required:
    name:
      type: str
primitive:
  required:
    primitive_name:
      type: str
  optional:
    definitions:
      type: list
";

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let schema = dir
            .path()
            .join("generator/config/generator/tsl_generator_schema.yaml");
        std::fs::create_dir_all(schema.parent().unwrap()).unwrap();
        std::fs::write(schema, SCHEMA).unwrap();
        std::fs::create_dir_all(dir.path().join("primitive_data/extensions")).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_check_uses_project_schema() {
        let dir = project();
        let path = dir.path().join("primitive_data/extensions/avx2.yaml");
        let registry = ProjectRegistry::new();

        let findings = check_file(&registry, &path, "---\narch: x86\n...\n").await;

        assert_eq!(findings.len(), 1, "{findings:?}");
        assert_eq!(findings[0].level, Level::Error);
        assert_eq!(findings[0].code, "KEY_ERROR");
    }

    #[tokio::test]
    async fn test_check_outside_project_reports_syntax_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.yaml");
        let registry = ProjectRegistry::new();

        assert!(check_file(&registry, &path, "a: 1\n").await.is_empty());
        let findings = check_file(&registry, &path, "key: [1, 2\n").await;
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].level, Level::Error);
    }

    #[test]
    fn test_report_names_code_and_file() {
        let source = "---\narch: x86\n...\n";
        let finding = Finding {
            span: tslgen_yaml::Span::new(4, 8),
            level: Level::Warning,
            code: "KEY_WARNING",
            message: "Missing recommended field `arch`".to_string(),
        };
        let mut out = Vec::new();
        write_report("avx2.yaml", source, &finding, ariadne_config().with_color(false), &mut out);

        let report = String::from_utf8(out).unwrap();
        assert!(report.contains("KEY_WARNING"), "{report}");
        assert!(report.contains("avx2.yaml"), "{report}");
        assert!(report.contains("Missing recommended field `arch`"), "{report}");
    }

    #[test]
    fn test_outline_is_indented_by_depth() {
        let source = "\
name: calc
---
primitive_name: add
definitions:
  - target_extension: avx2
    ctype: int32_t
    lscpu_flags: [avx2]
";
        let stream = parse_stream(source);
        let rendered = render_outline(&outline(&stream, DataFileKind::Primitive));
        insta::assert_snapshot!(rendered, @r"
        add
          avx2
            int32_t (avx2)
        ");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::CheckFailed(2).exit_code(), EXIT_CHECK_FAILED);
        assert_eq!(
            CliError::Schema {
                path: PathBuf::from("schema.yaml"),
                source: SchemaError::Empty,
            }
            .exit_code(),
            EXIT_SCHEMA_ERROR
        );
    }
}
