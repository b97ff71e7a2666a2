//! Purpose: `tabula` CLI entry point: query and aggregate JSON table files.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Results are JSON on stdout (pretty on a terminal, compact otherwise).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
#![allow(clippy::result_large_err)]
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

mod command_dispatch;
mod table_paths;
mod where_expr;

use tabula::api::{Error, ErrorKind, to_exit_code};
use table_paths::default_data_dir;

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    init_tracing();
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::InvalidQuery)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `tabula --help`."));
            }
        },
    };

    let data_dir = cli.dir.unwrap_or_else(default_data_dir);
    command_dispatch::dispatch_command(cli.command, data_dir).map_err(add_table_hint)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Parser)]
#[command(
    name = "tabula",
    version,
    about = "Query, join, and aggregate JSON table files",
    long_about = None,
    after_help = r#"EXAMPLES
  $ tabula query users --where 'age>=21' --order-by name --limit 10
  $ tabula query posts --join users:user_id::author:inner --order-by author.name
  $ tabula agg orders --group-by status --agg count --agg sum:total --having 'count>1'

Tables are <DIR>/<table>.json files holding a JSON array of objects with an `id`."#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        env = "TABULA_DIR",
        help = "Directory holding <table>.json files (default: current directory)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Filter, sort, page, and join the rows of a table")]
    Query(QueryArgs),
    #[command(about = "Group a table's rows and compute aggregates")]
    Agg(AggArgs),
}

#[derive(Args)]
struct QueryArgs {
    #[arg(help = "Table name (reads <DIR>/<table>.json)")]
    table: String,
    #[arg(
        long = "where",
        value_name = "EXPR",
        help = "Condition: field<op>value with = != > >= < <=, field~pattern (like), field@[json] (in)"
    )]
    conditions: Vec<String>,
    #[arg(long = "order-by", value_name = "FIELD[:desc]", help = "Sort key; repeat for tie-breakers")]
    order_by: Vec<String>,
    #[arg(long, help = "Maximum rows to return")]
    limit: Option<usize>,
    #[arg(long, help = "Rows to skip before returning")]
    offset: Option<usize>,
    #[arg(
        long,
        requires = "per_page",
        conflicts_with_all = ["limit", "offset"],
        help = "1-based page number"
    )]
    page: Option<usize>,
    #[arg(long = "per-page", requires = "page", help = "Rows per page")]
    per_page: Option<usize>,
    #[arg(
        long = "join",
        value_name = "SPEC",
        help = "table:local_field[:foreign_field[:alias[:inner|left]]]"
    )]
    joins: Vec<String>,
    #[arg(long = "index", value_name = "FIELDS", help = "Index the base table on comma-separated fields")]
    indexes: Vec<String>,
    #[arg(long, help = "Print {\"count\": N} instead of rows")]
    count: bool,
}

#[derive(Args)]
struct AggArgs {
    #[arg(help = "Table name (reads <DIR>/<table>.json)")]
    table: String,
    #[arg(long = "where", value_name = "EXPR", help = "Condition applied before grouping")]
    conditions: Vec<String>,
    #[arg(long = "group-by", value_name = "FIELD", help = "Group key field; repeat for compound keys")]
    group_by: Vec<String>,
    #[arg(
        long = "agg",
        value_name = "SPEC",
        required = true,
        help = "count or <sum|avg|min|max>:<field>"
    )]
    aggs: Vec<String>,
    #[arg(long = "having", value_name = "EXPR", help = "Filter groups: <aggregate or group field><op>value")]
    having: Vec<String>,
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::RowNotFound => "row not found".to_string(),
        ErrorKind::NoResults => "query returned no rows".to_string(),
        ErrorKind::TableNotFound => "table not found".to_string(),
        ErrorKind::InvalidQuery => "invalid query".to_string(),
        ErrorKind::InvalidRow => "invalid row".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        _ => "internal error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(table) = err.table() {
        inner.insert("table".to_string(), json!(table));
    }
    if let Some(id) = err.id() {
        inner.insert("id".to_string(), id.to_value());
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(table) = err.table() {
        lines.push(format!("table: {table}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn add_table_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::TableNotFound || err.hint().is_some() {
        return err;
    }
    err.with_hint("Check --dir (or TABULA_DIR) points at the directory holding <table>.json.")
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, error_json};
    use clap::Parser;
    use serde_json::json;
    use tabula::api::{Error, ErrorKind};

    #[test]
    fn error_json_carries_kind_and_context() {
        let err = Error::new(ErrorKind::TableNotFound)
            .with_message("table file not found")
            .with_table("users");
        let value = error_json(&err);
        assert_eq!(value["error"]["kind"], json!("TableNotFound"));
        assert_eq!(value["error"]["table"], json!("users"));
        assert!(value["error"].get("causes").is_none());
    }

    #[test]
    fn page_requires_per_page() {
        assert!(Cli::try_parse_from(["tabula", "query", "t", "--page", "2"]).is_err());
        let cli = Cli::try_parse_from(["tabula", "query", "t", "--page", "2", "--per-page", "5"]).unwrap();
        let Command::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert_eq!((args.page, args.per_page), (Some(2), Some(5)));
    }
}
