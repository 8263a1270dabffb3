//! Fieldkit CLI
//!
//! Command-line front end for the fieldkit workspace:
//! - Querying lookup row files by text, key, parent, or browsing everything
//! - Running the full proposal resolution against a row file
//! - Normalizing data-object JSON into the deterministic wire form

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use fieldkit_assist::{
    ChooserContent, FetchConfig, ProposalResolutionController, Resolution, ResolutionPolicy,
    SearchParam, WildcardPolicy,
};
use fieldkit_dataobject::{from_json, to_json_string, DoEntity, DoValue};
use fieldkit_lookup::{
    ActiveFilter, LookupProvider, LookupQuery, LookupRow, StaticLookupProvider,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fieldkit")]
#[command(
    author,
    version,
    about = "Fieldkit: content-assist lookups and data-object tooling"
)]
struct Cli {
    /// Verbose logging
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query a lookup row file.
    ///
    /// Exactly one of --text / --key / --parent / --all selects the query
    /// mode, mirroring the four provider entry points.
    Lookup(LookupArgs),
    /// Resolve an input text the way a smart field would (auto-accept a
    /// unique match, list candidates, or veto).
    Resolve(ResolveArgs),
    /// Normalize a data-object JSON file and re-emit it in deterministic
    /// key order.
    Normalize(NormalizeArgs),
}

#[derive(Args)]
struct LookupArgs {
    /// JSON file containing the lookup rows
    rows: PathBuf,
    /// Wildcard text search (trailing * implied)
    #[arg(long, conflicts_with_all = ["key", "parent", "all"])]
    text: Option<String>,
    /// Exact key lookup
    #[arg(long, conflicts_with_all = ["parent", "all"])]
    key: Option<String>,
    /// Children of the given parent key
    #[arg(long, conflicts_with = "all")]
    parent: Option<String>,
    /// Browse all rows
    #[arg(long)]
    all: bool,
    /// Row active filter: active, inactive or both
    #[arg(long, default_value = "both")]
    active: String,
    /// Limit the number of returned rows (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_rows: usize,
}

#[derive(Args)]
struct ResolveArgs {
    /// JSON file containing the lookup rows
    rows: PathBuf,
    /// The text to resolve
    input: String,
    /// Accept free text when nothing matches
    #[arg(long)]
    free_text: bool,
    /// Chooser row limit
    #[arg(long, default_value_t = 100)]
    max_rows: usize,
}

#[derive(Args)]
struct NormalizeArgs {
    /// Data-object JSON file
    file: PathBuf,
    /// Treat every array as an unordered set (sorted on normalization)
    #[arg(long)]
    sets: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Lookup(args) => lookup(args).await,
        Commands::Resolve(args) => resolve(args).await,
        Commands::Normalize(args) => normalize(args),
    }
}

fn load_rows(path: &Path) -> Result<Vec<LookupRow<String>>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading rows from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing rows from {}", path.display()))
}

/// Normalizes --text input the same way the fetcher does: wildcard rules
/// applied, empty or `*` falling back to a browse of everything.
fn text_query(text: &str) -> LookupQuery<String> {
    match SearchParam::for_text(text, &WildcardPolicy::default()) {
        SearchParam::BrowseAll => LookupQuery::by_all(None),
        SearchParam::Text(pattern) => LookupQuery::by_text(pattern),
    }
}

fn parse_active(raw: &str) -> Result<ActiveFilter> {
    match raw {
        "active" => Ok(ActiveFilter::Active),
        "inactive" => Ok(ActiveFilter::Inactive),
        "both" => Ok(ActiveFilter::Both),
        other => Err(anyhow!(
            "unknown active filter {other:?} (expected active, inactive or both)"
        )),
    }
}

async fn lookup(args: LookupArgs) -> Result<()> {
    let provider = StaticLookupProvider::new(load_rows(&args.rows)?);
    let query = if let Some(key) = args.key {
        LookupQuery::by_key(key)
    } else if let Some(text) = args.text {
        text_query(&text)
    } else if let Some(parent) = args.parent {
        LookupQuery::by_parent(Some(parent))
    } else if args.all {
        LookupQuery::by_all(None)
    } else {
        return Err(anyhow!("select a query mode: --text, --key, --parent or --all"));
    };
    let query = query
        .with_active(parse_active(&args.active)?)
        .with_max_row_count(args.max_rows);

    let rows = provider.execute(&query).await?;
    if rows.is_empty() {
        println!("{}", "no rows".yellow());
        return Ok(());
    }
    for row in &rows {
        print_row(row, 0);
    }
    println!("{} row(s)", rows.len());
    Ok(())
}

fn print_row(row: &LookupRow<String>, indent: usize) {
    let key = row.key.as_deref().unwrap_or("-");
    let mut line = format!("{}{}  {}", "  ".repeat(indent), key.dimmed(), row.text.bold());
    if !row.active {
        line.push_str(&format!("  {}", "(inactive)".dimmed()));
    }
    if !row.enabled {
        line.push_str(&format!("  {}", "(disabled)".dimmed()));
    }
    println!("{line}");
}

async fn resolve(args: ResolveArgs) -> Result<()> {
    let provider = Arc::new(StaticLookupProvider::new(load_rows(&args.rows)?));
    let policy = if args.free_text {
        ResolutionPolicy::default().with_custom_text(|text| text.to_string())
    } else {
        ResolutionPolicy::default()
    };
    let config = FetchConfig {
        max_row_count: args.max_rows,
        ..FetchConfig::default()
    };
    let mut field = ProposalResolutionController::new(
        provider as Arc<dyn LookupProvider<String>>,
        config,
        policy,
    );

    match field.parse_text(&args.input).await {
        Ok(Resolution::Accepted(row)) => {
            println!(
                "{} {} (key {})",
                "accepted".green().bold(),
                row.text,
                row.key.as_deref().unwrap_or("-")
            );
        }
        Ok(Resolution::ChooserOpen { rows }) => {
            println!("{} {rows} candidate(s):", "choose".cyan().bold());
            match field.chooser() {
                Some(ChooserContent::Table(table)) => {
                    for row in table.rows() {
                        print_row(row, 1);
                    }
                    if table.overflow() {
                        println!("  {}", "… more rows than the limit".dimmed());
                    }
                }
                Some(ChooserContent::Tree(tree)) => {
                    for (row, depth) in tree.visible() {
                        print_row(row, depth + 1);
                    }
                }
                None => {}
            }
        }
        Ok(Resolution::Failed { message }) => {
            println!("{} {message}", "lookup failed".red().bold());
        }
        Ok(Resolution::Unchanged) => {
            println!("{}", "unchanged".dimmed());
        }
        Err(err) => {
            println!("{} {err}", "rejected".red().bold());
            std::process::exit(1);
        }
    }
    Ok(())
}

fn normalize(args: NormalizeArgs) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", args.file.display()))?;
    let mut entity = from_json(&value, None)?;
    if args.sets {
        retag_lists_as_sets(&mut entity);
    }
    entity.normalize();
    println!("{}", to_json_string(&entity, None)?);
    Ok(())
}

/// JSON arrays parse as lists; re-tag them as sets when the caller declares
/// the whole document order-insensitive.
fn retag_lists_as_sets(entity: &mut DoEntity) {
    for (_, value) in entity.attributes_mut() {
        retag_value(value);
    }
}

fn retag_value(value: &mut DoValue) {
    match value {
        DoValue::List(items) => {
            for item in items.iter_mut() {
                retag_value(item);
            }
            let items = std::mem::take(items);
            *value = DoValue::Set(items);
        }
        DoValue::Set(items) => {
            for item in items.iter_mut() {
                retag_value(item);
            }
        }
        DoValue::Entity(inner) => retag_lists_as_sets(inner),
        _ => {}
    }
}
