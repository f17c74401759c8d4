use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

use catalog::Catalog;
use error::StoreError;
use query::ListQuery;
use types::ItemKey;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod cache;
mod catalog;
mod config;
mod data_path;
mod debug_log;
mod error;
mod mcp;
mod query;
mod storage;
mod types;

/// Exit status for validation and not-found failures
const EXIT_CLIENT_ERROR: i32 = 2;
/// Exit status for storage and data failures
const EXIT_SERVER_ERROR: i32 = 1;

#[derive(Parser)]
#[command(name = "catalog")]
#[command(version)]
#[command(disable_help_subcommand = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Items file to use, overriding CATALOG_DATA_PATH and the config file
    #[arg(long, global = true, value_name = "PATH")]
    data_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List items, optionally filtered and paginated
    List(ListArgs),
    /// Show a single item by id
    Get {
        /// Numeric id, or the string id of a created item
        id: String,
    },
    /// Create an item and write it to the data file
    Create(CreateArgs),
    /// Show item count and average of the configured field
    Stats {
        /// Pretty-print JSON instead of a single line
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    /// Manage configuration
    Config(ConfigArgs),
    /// Run as an MCP (Model Context Protocol) server
    Mcp,
}

#[derive(Args)]
struct ListArgs {
    /// Case-insensitive substring to match against item names
    #[arg(short, long)]
    query: Option<String>,

    /// Number of matching items to skip (negative or non-numeric values are ignored)
    #[arg(long, allow_hyphen_values = true)]
    offset: Option<String>,

    /// Maximum number of items to print (negative or non-numeric values are ignored)
    #[arg(long, allow_hyphen_values = true)]
    limit: Option<String>,

    /// Pretty-print JSON instead of a single line
    #[arg(long, default_value_t = false)]
    pretty: bool,
}

#[derive(Args)]
struct CreateArgs {
    /// Display name of the new item
    name: String,

    /// Extra field as key=value; value is parsed as JSON when possible (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    fields: Vec<String>,
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    subcommand: ConfigSubcommands,
}

#[derive(Subcommand)]
enum ConfigSubcommands {
    /// Create default configuration file
    Init {
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Show current configuration
    Show,
    /// Set configuration value
    Set {
        /// Configuration key (data-path, average-field)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    debug_log::init();

    let command = match cli.command {
        Commands::Config(config_args) => {
            handle_config_subcommand(config_args);
            return;
        }
        other => other,
    };

    let config = match config::Config::load() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Config error: {e:#}");
            std::process::exit(EXIT_SERVER_ERROR);
        }
    };
    let catalog = Catalog::from_config(&config, cli.data_file);

    let result = match command {
        Commands::List(args) => run_list(&catalog, args).await,
        Commands::Get { id } => run_get(&catalog, &id).await,
        Commands::Create(args) => run_create(&catalog, args).await,
        Commands::Stats { pretty } => run_stats(&catalog, pretty).await,
        Commands::Mcp => mcp::run_mcp_server(catalog).await,
        Commands::Config(_) => unreachable!("handled above"),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        let client_error = e
            .downcast_ref::<StoreError>()
            .is_some_and(StoreError::is_client_error);
        std::process::exit(if client_error {
            EXIT_CLIENT_ERROR
        } else {
            EXIT_SERVER_ERROR
        });
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{json}");
    Ok(())
}

async fn run_list(catalog: &Catalog, args: ListArgs) -> Result<()> {
    let query = ListQuery::from_raw(
        args.query.as_deref(),
        args.offset.as_deref(),
        args.limit.as_deref(),
    );
    let page = catalog.list(&query).await?;
    // Total goes out of band so stdout stays a plain JSON array.
    eprintln!("X-Total-Count: {}", page.total);
    print_json(&page.items, args.pretty)
}

async fn run_get(catalog: &Catalog, id: &str) -> Result<()> {
    let item = catalog.get(&ItemKey::parse(id)).await?;
    print_json(&item, true)
}

async fn run_create(catalog: &Catalog, args: CreateArgs) -> Result<()> {
    let mut payload = parse_fields(&args.fields)?;
    payload.insert("name".to_string(), Value::String(args.name));
    let item = catalog.create(payload).await?;
    print_json(&item, true)
}

async fn run_stats(catalog: &Catalog, pretty: bool) -> Result<()> {
    let stats = catalog.stats().await?;
    print_json(&stats, pretty)
}

/// Parse `key=value` pairs; values that are valid JSON keep their type.
fn parse_fields(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("Invalid field '{pair}', expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            anyhow::bail!("Invalid field '{pair}', key is empty");
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

fn handle_config_subcommand(config_args: ConfigArgs) {
    match config_args.subcommand {
        ConfigSubcommands::Init { overwrite } => {
            if let Err(e) = config::create_default_config(overwrite) {
                eprintln!("Error creating config: {e}");
                std::process::exit(EXIT_SERVER_ERROR);
            }
        }
        ConfigSubcommands::Show => {
            if let Err(e) = config::show_config() {
                eprintln!("Error showing config: {e}");
                std::process::exit(EXIT_SERVER_ERROR);
            }
        }
        ConfigSubcommands::Set { key, value } => {
            if let Err(e) = config::set_config_value(&key, &value) {
                eprintln!("Error setting config: {e}");
                std::process::exit(EXIT_SERVER_ERROR);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_fields_keeps_json_types() {
        let fields = parse_fields(&[
            "price=12.5".to_string(),
            "tags=[\"a\",\"b\"]".to_string(),
            "color=red".to_string(),
            "note=a=b".to_string(),
        ])
        .expect("fields");

        assert_eq!(fields.get("price"), Some(&json!(12.5)));
        assert_eq!(fields.get("tags"), Some(&json!(["a", "b"])));
        assert_eq!(fields.get("color"), Some(&json!("red")));
        assert_eq!(fields.get("note"), Some(&json!("a=b")));
    }

    #[test]
    fn parse_fields_rejects_bad_pairs() {
        assert!(parse_fields(&["novalue".to_string()]).is_err());
        assert!(parse_fields(&["=1".to_string()]).is_err());
    }

    #[test]
    fn store_errors_survive_anyhow_for_exit_codes() {
        let err: anyhow::Error = StoreError::NotFound("9".into()).into();
        assert!(
            err.downcast_ref::<StoreError>()
                .is_some_and(StoreError::is_client_error)
        );
    }
}
