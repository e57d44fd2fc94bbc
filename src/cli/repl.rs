//! # REPL
//!
//! The interactive loop: read a line with rustyline (history, line
//! editing), dispatch it through the command handler, print the result, and
//! loop. Engine errors are displayed and do not terminate the session; use
//! `exit` or Ctrl+D to leave.

use eyre::{Result, WrapErr};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::btree::BTree;
use crate::cli::commands::{CommandHandler, CommandResult};
use crate::cli::history::history_path;

const PROMPT: &str = "rivetdb> ";

pub struct Repl {
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self> {
        let mut editor = DefaultEditor::new().wrap_err("failed to initialize line editor")?;

        if let Some(history_file) = history_path() {
            let _ = editor.load_history(&history_file);
        }

        Ok(Self { editor })
    }

    pub fn run(&mut self, tree: &mut BTree<'_>) -> Result<()> {
        self.print_welcome();

        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    self.editor.add_history_entry(trimmed).ok();

                    match CommandHandler::execute(trimmed, tree) {
                        CommandResult::Output(text) => println!("{text}"),
                        CommandResult::Continue => {}
                        CommandResult::Error(msg) => eprintln!("Error: {msg}"),
                        CommandResult::Exit => break,
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                }
                Err(ReadlineError::Eof) => {
                    println!("Bye");
                    break;
                }
                Err(err) => {
                    eprintln!("Error reading input: {err}");
                    break;
                }
            }
        }

        self.save_history();
        Ok(())
    }

    fn print_welcome(&self) {
        println!("RivetDB {}", env!("CARGO_PKG_VERSION"));
        println!("Enter \".help\" for usage hints.");
    }

    fn save_history(&mut self) {
        if let Some(history_file) = history_path() {
            if let Err(e) = self.editor.save_history(&history_file) {
                eprintln!("Warning: could not save history: {e}");
            }
        }
    }
}
