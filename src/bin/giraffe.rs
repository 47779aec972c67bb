//! Interactive SQL shell over a `giraffedb` store. Grounded on the
//! `lsm` tool's argument parsing and `rustyline` REPL loop
//! (`fjall-rs-lsm-tree/src/tool.rs`), trimmed to this engine's single
//! statement-at-a-time execution model — there is no batch/transaction
//! subcommand set to flatten into the shell grammar here, just raw SQL
//! lines.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use giraffedb::value::Value;
use giraffedb::{ExecResult, Executor, StoreConfig};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// `giraffe` — a tiny SQL shell over a slotted-page heap store.
#[derive(Parser, Debug)]
#[command(name = "giraffe")]
#[command(about = "Interactive shell for a giraffedb store")]
struct Args {
    /// Directory the store's relation and index files live in (created
    /// if missing).
    store_dir: PathBuf,

    /// Suppress all log output except errors.
    #[arg(short, long)]
    quiet: bool,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(quiet: bool, verbose: u8) {
    let level = if quiet {
        log::LevelFilter::Error
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn print_rows(columns: &[String], rows: &[giraffedb::value::Row]) {
    println!("{}", columns.join(" "));
    let separator: String = columns.iter().map(|_| "+----------+").collect();
    println!("{separator}");
    for row in rows {
        let rendered: Vec<String> = columns
            .iter()
            .map(|c| match row.get(c) {
                Some(v) => format_value(v),
                None => "NULL".to_string(),
            })
            .collect();
        println!("{}", rendered.join(" "));
    }
    println!("{} row(s) returned", rows.len());
}

fn format_value(v: &Value) -> String {
    match v {
        Value::Int(n) => n.to_string(),
        Value::Text(s) => format!("\"{s}\""),
        Value::Bool(b) => b.to_string(),
    }
}

fn run_line(executor: &mut Executor, line: &str) {
    match giraffedb::ast::parse_line(line) {
        Ok(statement) => match executor.execute(statement) {
            Ok(ExecResult::Message(msg)) => println!("{msg}"),
            Ok(ExecResult::Rows { columns, rows }) => print_rows(&columns, &rows),
            Err(e) => eprintln!("error: {e}"),
        },
        Err(e) => eprintln!("error: {e}"),
    }
}

fn run_selftest() {
    match giraffedb::selftest::run() {
        Ok(report) => {
            for line in report {
                println!("{line}");
            }
        }
        Err(e) => eprintln!("self-test failed: {e}"),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.quiet, args.verbose);

    if let Err(e) = std::fs::create_dir_all(&args.store_dir) {
        eprintln!("cannot open store directory {}: {e}", args.store_dir.display());
        return ExitCode::FAILURE;
    }
    let store = StoreConfig::new(args.store_dir.clone());
    let mut executor = match Executor::open(&store) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("cannot open store at {}: {e}", args.store_dir.display());
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "{} ({} {}) ready at {}",
        "giraffe",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        args.store_dir.display()
    );

    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("cannot initialize line editor: {e}");
            return ExitCode::FAILURE;
        }
    };

    loop {
        match rl.readline("SQL> ") {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);
                if trimmed.eq_ignore_ascii_case("quit") {
                    break;
                }
                if trimmed.eq_ignore_ascii_case("test") {
                    run_selftest();
                    continue;
                }
                run_line(&mut executor, trimmed);
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(e) => {
                eprintln!("error reading input: {e}");
                break;
            }
        }
    }
    ExitCode::SUCCESS
}
