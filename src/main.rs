use clap::Parser;
use log::{debug, info, warn};
use sift_lang::{diagnostics, lint, parse_program, Interpreter, Options, Program, Value};
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "sift")]
#[command(about = "Run a jq-style filter over a stream of JSON values", long_about = None)]
struct Cli {
    /// Filter program (an input file when --from-file is given)
    #[arg(value_name = "FILTER")]
    filter: Option<String>,

    /// JSON input files (defaults to stdin)
    #[arg(value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Run the filter once with `null` as input
    #[arg(short = 'n', long)]
    null_input: bool,

    /// Print each output on a single line
    #[arg(short = 'c', long)]
    compact_output: bool,

    /// Print string outputs without quotes
    #[arg(short = 'r', long)]
    raw_output: bool,

    /// Read the filter program from a file
    #[arg(short = 'f', long, value_name = "FILE")]
    from_file: Option<PathBuf>,

    /// Bind `$NAME` to the string VALUE
    #[arg(long, num_args = 2, value_names = ["NAME", "VALUE"])]
    arg: Vec<String>,

    /// Bind `$NAME` to the decoded JSON value
    #[arg(long, num_args = 2, value_names = ["NAME", "JSON"])]
    argjson: Vec<String>,

    /// Maximum number of nested non-tail calls
    #[arg(long, env = "SIFT_MAX_DEPTH", default_value_t = Options::default().max_depth)]
    max_depth: usize,

    /// Report parameters that hide functions in scope, then exit
    #[arg(long)]
    lint: bool,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to read {path}: {source}")]
    Read { path: String, source: io::Error },

    #[error("Failed to write output: {0}")]
    Write(#[from] io::Error),

    #[error("Invalid JSON in {path}: {source}")]
    Input {
        path: String,
        source: serde_json::Error,
    },

    #[error("Invalid JSON for --argjson {name}: {source}")]
    ArgJson {
        name: String,
        source: serde_json::Error,
    },

    #[error("No filter given")]
    MissingFilter,
}

const EXIT_USAGE: u8 = 2;
const EXIT_SYNTAX: u8 = 3;
const EXIT_RUNTIME: u8 = 5;

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("sift: {err}");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn run(mut cli: Cli) -> Result<ExitCode, CliError> {
    let (name, source) = load_filter(&mut cli)?;

    let program = match parse_program(&source) {
        Ok(program) => program,
        Err(errors) => {
            diagnostics::emit_syntax_errors(&name, &source, &errors);
            return Ok(ExitCode::from(EXIT_SYNTAX));
        }
    };
    debug!(
        "parsed {} with {} top-level definitions",
        name,
        program.top_level_defs().len()
    );

    let hazards = lint::shadowing_hazards(&program);
    for hazard in &hazards {
        warn!(
            "parameter `{}` of `{}` hides `{}/0`",
            hazard.param, hazard.function, hazard.param
        );
    }
    if cli.lint {
        diagnostics::emit_shadowing_hazards(&name, &source, &hazards);
        return Ok(ExitCode::SUCCESS);
    }

    let interpreter = build_interpreter(&cli)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = false;

    if cli.null_input {
        failed |= evaluate(&interpreter, &program, Value::Null, &cli, &mut out)?;
    } else if cli.files.is_empty() {
        let stdin = io::stdin();
        failed |= evaluate_stream(
            &interpreter,
            &program,
            "<stdin>",
            stdin.lock(),
            &cli,
            &mut out,
        )?;
    } else {
        for path in &cli.files {
            let display = path.display().to_string();
            info!("reading {}", display);
            let file = File::open(path).map_err(|source| CliError::Read {
                path: display.clone(),
                source,
            })?;
            failed |= evaluate_stream(
                &interpreter,
                &program,
                &display,
                BufReader::new(file),
                &cli,
                &mut out,
            )?;
        }
    }
    out.flush()?;

    Ok(if failed {
        ExitCode::from(EXIT_RUNTIME)
    } else {
        ExitCode::SUCCESS
    })
}

fn load_filter(cli: &mut Cli) -> Result<(String, String), CliError> {
    match cli.from_file.clone() {
        Some(path) => {
            // With -f every positional argument is an input file.
            if let Some(first) = cli.filter.take() {
                cli.files.insert(0, PathBuf::from(first));
            }
            let display = path.display().to_string();
            let source = fs::read_to_string(&path).map_err(|source| CliError::Read {
                path: display.clone(),
                source,
            })?;
            Ok((display, source))
        }
        None => {
            let source = cli.filter.clone().ok_or(CliError::MissingFilter)?;
            Ok(("<filter>".to_string(), source))
        }
    }
}

fn build_interpreter(cli: &Cli) -> Result<Interpreter, CliError> {
    let mut interpreter = Interpreter::new(Options {
        max_depth: cli.max_depth,
    });
    for pair in cli.arg.chunks(2) {
        if let [name, value] = pair {
            interpreter = interpreter.with_var(name.clone(), Value::string(value));
        }
    }
    for pair in cli.argjson.chunks(2) {
        if let [name, text] = pair {
            let value: serde_json::Value =
                serde_json::from_str(text).map_err(|source| CliError::ArgJson {
                    name: name.clone(),
                    source,
                })?;
            interpreter = interpreter.with_var(name.clone(), Value::from(value));
        }
    }
    Ok(interpreter)
}

/// Evaluates each JSON value of `reader` as soon as it has been decoded.
fn evaluate_stream(
    interpreter: &Interpreter,
    program: &Program,
    path: &str,
    reader: impl Read,
    cli: &Cli,
    out: &mut impl Write,
) -> Result<bool, CliError> {
    let mut failed = false;
    for input in serde_json::Deserializer::from_reader(reader).into_iter::<serde_json::Value>() {
        let input = input.map_err(|source| CliError::Input {
            path: path.to_string(),
            source,
        })?;
        failed |= evaluate(interpreter, program, Value::from(input), cli, out)?;
    }
    Ok(failed)
}

/// Prints every output for `input`. Returns whether evaluation stopped on an error.
fn evaluate(
    interpreter: &Interpreter,
    program: &Program,
    input: Value,
    cli: &Cli,
    out: &mut impl Write,
) -> Result<bool, CliError> {
    for output in interpreter.evaluate(program, input) {
        match output {
            Ok(value) => write_value(out, &value, cli)?,
            Err(err) => {
                diagnostics::report_runtime_error(&err);
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn write_value(out: &mut impl Write, value: &Value, cli: &Cli) -> io::Result<()> {
    match value {
        Value::String(text) if cli.raw_output => writeln!(out, "{}", text),
        _ if cli.compact_output => writeln!(out, "{}", value),
        _ => writeln!(out, "{}", value.to_pretty_string()),
    }
}
