//! # Command Dispatcher
//!
//! Translates textual commands into core calls. Two command families:
//!
//! - Statements: `insert`, `delete`, `select`, `range`, `lookup`
//! - Dot commands for introspection: `.tree`, `.json`, `.stats`, `.pool`,
//!   `.freelist`, `.bloom [rebuild]`, `.free <n>`, `.help`
//!
//! Each command returns a [`CommandResult`]; the REPL (or script mode)
//! prints `Output` to stdout and `Error` to stderr and never retries.
//! Errors bubble up from the engine as messages; nothing here mutates state
//! on a failed parse.

use crate::btree::BTree;
use crate::row::Row;

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    Output(String),
    Continue,
    Exit,
    Error(String),
}

pub struct CommandHandler;

impl CommandHandler {
    pub fn execute(input: &str, tree: &mut BTree<'_>) -> CommandResult {
        let input = input.trim();
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            return CommandResult::Continue;
        };
        let args = &parts[1..];

        match command {
            "insert" => insert(tree, args),
            "delete" => delete(tree, args),
            "select" => select(tree),
            "range" => range(tree, args),
            "lookup" => lookup(tree, args),
            ".tree" => render(tree.render_tree()),
            ".json" => render(tree.render_json()),
            ".stats" => CommandResult::Output(tree.pager().format_stats()),
            ".pool" => CommandResult::Output(tree.pager().format_pool()),
            ".freelist" => render(tree.pager().format_freelist()),
            ".bloom" if args.first() == Some(&"rebuild") => match tree.rebuild_bloom() {
                Ok(()) => CommandResult::Output("Bloom filter rebuilt from the tree.".to_string()),
                Err(e) => CommandResult::Error(e.to_string()),
            },
            ".bloom" => bloom_stats(tree),
            ".free" => free(tree, args),
            ".help" | ".h" | ".?" => CommandResult::Output(help_text()),
            "exit" | ".exit" | ".quit" | ".q" => CommandResult::Exit,
            _ => CommandResult::Error(format!(
                "unrecognized command: {command}. Type .help for usage."
            )),
        }
    }
}

fn parse_id(arg: &str) -> Result<u32, CommandResult> {
    arg.parse::<u32>()
        .map_err(|_| CommandResult::Error(format!("invalid id: {arg}")))
}

fn insert(tree: &mut BTree<'_>, args: &[&str]) -> CommandResult {
    let [id, username, email] = args else {
        return CommandResult::Error("usage: insert <id> <username> <email>".to_string());
    };
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(result) => return result,
    };
    let row = match Row::new(id, *username, *email) {
        Ok(row) => row,
        Err(e) => return CommandResult::Error(e.to_string()),
    };
    match tree.insert(&row) {
        Ok(()) => CommandResult::Output("Executed.".to_string()),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

fn delete(tree: &mut BTree<'_>, args: &[&str]) -> CommandResult {
    let [id] = args else {
        return CommandResult::Error("usage: delete <id>".to_string());
    };
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(result) => return result,
    };
    match tree.remove(id) {
        Ok(true) => CommandResult::Output(format!("Deleted key {id}.")),
        Ok(false) => CommandResult::Error(format!("Key {id} not found")),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

fn select(tree: &mut BTree<'_>) -> CommandResult {
    match tree.select_all() {
        Ok(rows) => format_rows(rows),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

fn range(tree: &mut BTree<'_>, args: &[&str]) -> CommandResult {
    let [start, end] = args else {
        return CommandResult::Error("usage: range <start_id> <end_id>".to_string());
    };
    let (start, end) = match (parse_id(start), parse_id(end)) {
        (Ok(start), Ok(end)) => (start, end),
        (Err(result), _) | (_, Err(result)) => return result,
    };
    match tree.range_scan(start, end) {
        Ok(rows) => format_rows(rows),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

fn lookup(tree: &mut BTree<'_>, args: &[&str]) -> CommandResult {
    let [id] = args else {
        return CommandResult::Error("usage: lookup <id>".to_string());
    };
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(result) => return result,
    };
    match tree.find_row(id) {
        Ok(Some(row)) => CommandResult::Output(format!("Found: {row}")),
        Ok(None) => CommandResult::Output(format!("Key {id} not present.")),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

fn bloom_stats(tree: &mut BTree<'_>) -> CommandResult {
    match tree.bloom_stats() {
        Ok(stats) => CommandResult::Output(format!(
            "=== Bloom Filter ===\n\
             Size:     {} bytes ({} bits)\n\
             Bits Set: {} / {}\n\
             Fill:     {:.1}%\n\
             Est. FPR: ~{:.4}%",
            stats.size_bytes,
            stats.bit_count,
            stats.set_bits,
            stats.bit_count,
            stats.fill_percent(),
            stats.estimated_fpr_percent(),
        )),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

fn free(tree: &mut BTree<'_>, args: &[&str]) -> CommandResult {
    let [page] = args else {
        return CommandResult::Error("usage: .free <page_num>  (page must be > 1)".to_string());
    };
    let page = match parse_id(page) {
        Ok(page) => page,
        Err(result) => return result,
    };
    match tree.pager().free_page(page) {
        Ok(()) => CommandResult::Output(format!("Freed page {page}.")),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

fn format_rows(rows: Vec<Row>) -> CommandResult {
    if rows.is_empty() {
        return CommandResult::Continue;
    }
    let lines: Vec<String> = rows.iter().map(|row| format!("  {row}")).collect();
    CommandResult::Output(lines.join("\n"))
}

fn render(result: eyre::Result<String>) -> CommandResult {
    match result {
        Ok(text) => CommandResult::Output(text.trim_end().to_string()),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

fn help_text() -> String {
    r#"RivetDB commands:

  insert <id> <username> <email>   Insert a row (id is a u32 primary key)
  delete <id>                      Delete a row by id
  select                           List every row in key order
  range <start> <end>              List rows with start <= id <= end
  lookup <id>                      Point lookup through the bloom filter

  .tree                            Dump the tree structure
  .json                            Dump the tree structure as JSON
  .stats                           File header statistics
  .pool                            Buffer pool statistics
  .freelist                        Walk the free-page list
  .bloom                           Bloom filter statistics
  .bloom rebuild                   Rebuild the bloom filter from the tree
  .free <n>                        Push page n onto the free list (n > 1)
  .help                            Show this help
  exit                             Flush everything and quit"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Pager;

    fn with_tree(test: impl FnOnce(&mut BTree<'_>)) {
        let dir = tempfile::tempdir().unwrap();
        let mut pager = Pager::open(dir.path().join("cli.db")).unwrap();
        let mut tree = BTree::new(&mut pager).unwrap();
        test(&mut tree);
    }

    #[test]
    fn insert_reports_executed() {
        with_tree(|tree| {
            let result = CommandHandler::execute("insert 1 alice alice@example.com", tree);
            assert_eq!(result, CommandResult::Output("Executed.".to_string()));
        });
    }

    #[test]
    fn duplicate_insert_reports_error_line() {
        with_tree(|tree| {
            CommandHandler::execute("insert 1 alice a@x", tree);
            let result = CommandHandler::execute("insert 1 bob b@x", tree);
            assert_eq!(result, CommandResult::Error("Duplicate key 1".to_string()));
        });
    }

    #[test]
    fn select_lists_rows_in_key_order() {
        with_tree(|tree| {
            CommandHandler::execute("insert 2 bob b@x", tree);
            CommandHandler::execute("insert 1 alice a@x", tree);

            let result = CommandHandler::execute("select", tree);
            assert_eq!(
                result,
                CommandResult::Output("  (1, alice, a@x)\n  (2, bob, b@x)".to_string())
            );
        });
    }

    #[test]
    fn empty_select_prints_nothing() {
        with_tree(|tree| {
            assert_eq!(CommandHandler::execute("select", tree), CommandResult::Continue);
        });
    }

    #[test]
    fn delete_round_trips() {
        with_tree(|tree| {
            CommandHandler::execute("insert 7 u e@x", tree);
            assert_eq!(
                CommandHandler::execute("delete 7", tree),
                CommandResult::Output("Deleted key 7.".to_string())
            );
            assert_eq!(
                CommandHandler::execute("delete 7", tree),
                CommandResult::Error("Key 7 not found".to_string())
            );
        });
    }

    #[test]
    fn lookup_reports_presence_and_absence() {
        with_tree(|tree| {
            CommandHandler::execute("insert 5 eve eve@x", tree);
            assert_eq!(
                CommandHandler::execute("lookup 5", tree),
                CommandResult::Output("Found: (5, eve, eve@x)".to_string())
            );
            assert_eq!(
                CommandHandler::execute("lookup 6", tree),
                CommandResult::Output("Key 6 not present.".to_string())
            );
        });
    }

    #[test]
    fn free_refuses_reserved_pages() {
        with_tree(|tree| {
            let result = CommandHandler::execute(".free 1", tree);
            assert!(matches!(result, CommandResult::Error(msg) if msg.contains("reserved")));
            let result = CommandHandler::execute(".free 0", tree);
            assert!(matches!(result, CommandResult::Error(_)));
        });
    }

    #[test]
    fn exit_commands_exit() {
        with_tree(|tree| {
            for command in ["exit", ".exit", ".quit", ".q"] {
                assert_eq!(CommandHandler::execute(command, tree), CommandResult::Exit);
            }
        });
    }

    #[test]
    fn malformed_statements_report_usage() {
        with_tree(|tree| {
            assert!(matches!(
                CommandHandler::execute("insert 1 alice", tree),
                CommandResult::Error(msg) if msg.contains("usage")
            ));
            assert!(matches!(
                CommandHandler::execute("range 10", tree),
                CommandResult::Error(msg) if msg.contains("usage")
            ));
            assert!(matches!(
                CommandHandler::execute("delete abc", tree),
                CommandResult::Error(msg) if msg.contains("invalid id")
            ));
        });
    }

    #[test]
    fn unknown_command_reports_error() {
        with_tree(|tree| {
            let result = CommandHandler::execute("frobnicate", tree);
            assert!(matches!(result, CommandResult::Error(msg) if msg.contains("unrecognized")));
        });
    }

    #[test]
    fn dot_commands_produce_output() {
        with_tree(|tree| {
            CommandHandler::execute("insert 1 a a@x", tree);
            for command in [".tree", ".json", ".stats", ".pool", ".freelist", ".bloom"] {
                match CommandHandler::execute(command, tree) {
                    CommandResult::Output(text) => assert!(!text.is_empty(), "{command}"),
                    other => panic!("{command} returned {other:?}"),
                }
            }
        });
    }

    #[test]
    fn bloom_rebuild_confirms() {
        with_tree(|tree| {
            CommandHandler::execute("insert 1 a a@x", tree);
            assert_eq!(
                CommandHandler::execute(".bloom rebuild", tree),
                CommandResult::Output("Bloom filter rebuilt from the tree.".to_string())
            );
        });
    }
}
