//! # RivetDB CLI Entry Point
//!
//! ```bash
//! # Interactive session against the default database file
//! rivetdb
//!
//! # Interactive session against a specific file
//! rivetdb --db ./my.db
//!
//! # Script mode: run one command and exit
//! rivetdb "insert 1 alice alice@example.com"
//! rivetdb .json
//! ```
//!
//! Exit code is 0 on normal termination and 1 when the database cannot be
//! opened (including an invalid magic number).

use std::env;
use std::path::PathBuf;

use eyre::{bail, Result, WrapErr};
use tracing_subscriber::{fmt, EnvFilter};

use rivetdb::cli::{CommandHandler, CommandResult, Repl};
use rivetdb::{BTree, Pager};

const DEFAULT_DB_PATH: &str = "rivet.db";

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_target(false).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut db_path = PathBuf::from(DEFAULT_DB_PATH);
    let mut script: Vec<String> = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("rivetdb {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--db" | "-d" => match args.next() {
                Some(path) => db_path = PathBuf::from(path),
                None => bail!("--db requires a path"),
            },
            other if other.starts_with('-') && script.is_empty() => {
                bail!("unknown option: {other}");
            }
            other => script.push(other.to_string()),
        }
    }

    let mut pager = Pager::open(&db_path)
        .wrap_err_with(|| format!("failed to open database {}", db_path.display()))?;

    {
        let mut tree = BTree::new(&mut pager)?;

        if script.is_empty() {
            let mut repl = Repl::new()?;
            repl.run(&mut tree)?;
        } else {
            match CommandHandler::execute(&script.join(" "), &mut tree) {
                CommandResult::Output(text) => println!("{text}"),
                CommandResult::Error(msg) => eprintln!("Error: {msg}"),
                CommandResult::Continue | CommandResult::Exit => {}
            }
        }
    }

    pager.close()?;
    Ok(())
}

fn print_usage() {
    println!("RivetDB - single-file ordered key-value engine");
    println!();
    println!("USAGE:");
    println!("    rivetdb [OPTIONS] [COMMAND...]");
    println!();
    println!("With no COMMAND an interactive session starts; otherwise the");
    println!("words are joined and executed as one command (script mode).");
    println!();
    println!("OPTIONS:");
    println!("    -d, --db <PATH>    Database file (default: {DEFAULT_DB_PATH})");
    println!("    -h, --help         Print help information");
    println!("    -v, --version      Print version information");
    println!();
    println!("EXAMPLES:");
    println!("    rivetdb                                   Interactive session");
    println!("    rivetdb \"insert 1 alice alice@example.com\"");
    println!("    rivetdb --db ./my.db .stats");
}
