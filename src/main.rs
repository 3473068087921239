use anyhow::Context;
use clap::Parser;
use fedmerge::{FederatedMerger, MergeOptions, SchemaCatalog, ShardResponse, SortSpec, StrategyRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Merge the responses of federated search shards into one ranked page
#[derive(Parser, Debug)]
#[command(name = "fedmerge")]
#[command(about = "Merge federated search shard responses", long_about = None)]
struct Args {
    /// Aggregator schema (JSON)
    #[arg(short, long)]
    schema: PathBuf,

    /// Shard responses (JSON array)
    #[arg(short, long)]
    responses: PathBuf,

    /// Merge options (JSON); flags below override it
    #[arg(short, long)]
    options: Option<PathBuf>,

    /// Sort clause, e.g. "letter asc, score desc"
    #[arg(long)]
    sort: Option<String>,

    /// Page size
    #[arg(long)]
    rows: Option<usize>,

    /// Offset of the first document
    #[arg(long)]
    start: Option<usize>,

    /// Requested field list, e.g. "*,[shard],score"
    #[arg(long)]
    fl: Option<String>,

    /// Join fragments on this field instead of the unique key
    #[arg(long)]
    join_field: Option<String>,

    /// Include a per-shard summary
    #[arg(long)]
    shards_info: bool,

    /// Include the sort values of the last document
    #[arg(long)]
    cursor: bool,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries the merged JSON
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting fedmerge v{}", env!("CARGO_PKG_VERSION"));

    let catalog = SchemaCatalog::load(&args.schema, &StrategyRegistry::with_builtins())
        .with_context(|| format!("loading schema {}", args.schema.display()))?;
    info!("Schema '{}' loaded with {} fields", catalog.name(), catalog.len());

    let options = build_options(&args)?;

    let json = std::fs::read_to_string(&args.responses)
        .with_context(|| format!("reading {}", args.responses.display()))?;
    let responses: Vec<ShardResponse> = serde_json::from_str(&json)
        .with_context(|| format!("parsing shard responses {}", args.responses.display()))?;
    info!("Merging {} shard responses", responses.len());

    let merger = FederatedMerger::new(Arc::new(catalog));
    let result = merger.merge(&options, &responses)?;

    let output = if args.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);
    Ok(())
}

fn build_options(args: &Args) -> anyhow::Result<MergeOptions> {
    let mut options = match &args.options {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&json).with_context(|| format!("parsing options {}", path.display()))?
        }
        None => MergeOptions::default(),
    };

    if let Some(sort) = &args.sort {
        options.sort = SortSpec::parse(sort)?;
    }
    if let Some(rows) = args.rows {
        options.rows = rows;
    }
    if let Some(start) = args.start {
        options.start = start;
    }
    if let Some(fl) = &args.fl {
        options.fl = fl.clone();
    }
    if let Some(field) = &args.join_field {
        options.join_field = Some(field.clone());
    }
    options.shards_info |= args.shards_info;
    options.cursor |= args.cursor;

    Ok(options)
}
