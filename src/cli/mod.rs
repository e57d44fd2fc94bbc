//! # RivetDB CLI
//!
//! The interactive front end over the engine.
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │           Entry point (bin/rivetdb)          │
//! ├─────────────────────────────────────────────┤
//! │                 REPL loop                    │
//! │  rustyline input, history, result printing   │
//! ├───────────────────────┬─────────────────────┤
//! │   Command dispatcher  │   History file      │
//! │  statements + dot cmds│  ~/.rivetdb_history │
//! └───────────────────────┴─────────────────────┘
//! ```
//!
//! The dispatcher is also reachable without the REPL: passing a command as
//! process arguments executes it once and exits (script mode).
//!
//! ## Module Organization
//!
//! - `repl`: read-eval-print loop with rustyline integration
//! - `commands`: statement and dot-command parsing and execution
//! - `history`: history file path resolution

pub mod commands;
pub mod history;
pub mod repl;

pub use commands::{CommandHandler, CommandResult};
pub use repl::Repl;
