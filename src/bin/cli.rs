use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sigilc::options::is_java_identifier;
use sigilc::{translate_to_java, Options, TranslateError};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sigilc", about = "Translate a sigil script into a Java class", version)]
struct Cli {
    /// Source file to translate
    input: PathBuf,

    /// Write the Java file here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Class name (default: the input file name, capitalised)
    #[arg(long = "class")]
    class_name: Option<String>,

    /// JSON options file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Omit the package line
    #[arg(long)]
    no_package: bool,

    /// Trace every token
    #[arg(long)]
    debug_lexer: bool,

    /// Log every reduced statement
    #[arg(long)]
    debug_parser: bool,

    /// Print diagnostics as a JSON array
    #[arg(long)]
    json: bool,
}

// ── Setup ────────────────────────────────────────────────────────

fn init_logging(verbose: bool) {
    let default = if verbose { "trace" } else { "warn" };
    let filter = EnvFilter::try_from_env("SIGILC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// `word_count.pl` becomes `Word_count`; anything that is not a Java
/// identifier falls back to the configured default.
fn class_from_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let mut chars = stem.chars();
    let first = chars.next()?;
    let name: String = first.to_uppercase().chain(chars).collect();
    is_java_identifier(&name).then_some(name)
}

fn build_options(cli: &Cli) -> Result<Options, TranslateError> {
    let mut options = match &cli.config {
        Some(path) => Options::load(path)?,
        None => Options::default(),
    };
    match &cli.class_name {
        Some(name) if is_java_identifier(name) => options.class_name = name.clone(),
        Some(name) => return Err(TranslateError::Options(format!("{name:?} is not a Java identifier"))),
        None if options.class_name == Options::default().class_name => {
            if let Some(name) = class_from_stem(&cli.input) {
                options.class_name = name;
            }
        }
        None => {}
    }
    if cli.no_package {
        options.emit_package = false;
    }
    options.lexer_debug |= cli.debug_lexer;
    options.parser_debug |= cli.debug_parser;
    Ok(options)
}

// ── Main ─────────────────────────────────────────────────────────

fn run(cli: &Cli) -> Result<bool, TranslateError> {
    let options = build_options(cli)?;
    let source = std::fs::read_to_string(&cli.input)?;
    let output = translate_to_java(&source, &options)?;

    match &cli.output {
        Some(path) => std::fs::write(path, &output.java)?,
        None => print!("{}", output.java),
    }

    if cli.json {
        eprintln!("{}", serde_json::to_string_pretty(&output.diagnostics).unwrap_or_default());
    } else {
        for diagnostic in &output.diagnostics {
            eprintln!("{}", diagnostic.format_with_source(&source));
        }
    }
    Ok(output.diagnostics.is_empty())
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug_lexer || cli.debug_parser);

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(2);
        }
    }
}
