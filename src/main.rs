//! corefviz: compare gold and system event mentions side by side
//!
//! Subcommands prepare visualization data (span payloads from a comparison
//! file, coreference clusters from brat annotation), query it (cluster
//! filtering and naming), and serve the viewer.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

use corefviz::config::Config;
use corefviz::filter;
use corefviz::output;
use corefviz::payload::{ClusterList, SurfaceForms};
use corefviz::store::AnnotationStore;

/// Side-by-side viewer for gold and system event mentions and coreference
#[derive(Parser, Debug)]
#[command(name = "corefviz")]
#[command(version)]
#[command(about = "Visualize gold vs. system event mentions and coreference clusters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build gold/system span payloads from an event comparison file
    PrepareDiff(PrepareDiffArgs),

    /// Extract coreference clusters and surface forms from brat annotation
    PrepareCoref(PrepareCorefArgs),

    /// Keep only the events of selected clusters in a span payload
    Filter(FilterArgs),

    /// Print one label per cluster, built from surface forms
    Names(NamesArgs),

    /// Start the viewer web server
    #[cfg(feature = "serve")]
    Serve(ServeArgs),
}

/// Options shared by every subcommand
#[derive(Args, Debug)]
struct CommonArgs {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(long)]
    verbose: bool,
}

/// Arguments for the prepare-diff subcommand
#[derive(Args, Debug)]
struct PrepareDiffArgs {
    /// Comparison output of the event scorer
    #[arg(short = 'd', long)]
    comparison: PathBuf,

    /// Directory of token tables
    #[arg(short = 't', long)]
    token_dir: PathBuf,

    /// Directory of source texts
    #[arg(short = 'x', long)]
    text_dir: PathBuf,

    /// Visualization directory (default from config)
    #[arg(short = 'v', long)]
    vis_dir: Option<PathBuf>,

    /// Token table columns of begin and end offsets, e.g. "2,3"
    #[arg(long)]
    offset_field: Option<String>,

    /// Token table extension
    #[arg(long)]
    token_ext: Option<String>,

    /// Source text extension
    #[arg(long)]
    source_ext: Option<String>,

    /// Serve the result once prepared
    #[cfg(feature = "serve")]
    #[arg(long)]
    serve: bool,

    /// Port for the web server (default from config)
    #[cfg(feature = "serve")]
    #[arg(long)]
    port: Option<u16>,

    #[command(flatten)]
    common: CommonArgs,
}

/// Arguments for the prepare-coref subcommand
#[derive(Args, Debug)]
struct PrepareCorefArgs {
    /// Directory of gold brat annotation
    #[arg(short = 'g', long)]
    gold_dir: PathBuf,

    /// Directory of system brat annotation
    #[arg(short = 's', long)]
    sys_dir: PathBuf,

    /// Visualization directory (default from config)
    #[arg(short = 'v', long)]
    vis_dir: Option<PathBuf>,

    /// Annotation file extension
    #[arg(long)]
    annotation_ext: Option<String>,

    #[command(flatten)]
    common: CommonArgs,
}

/// Arguments for the filter subcommand
#[derive(Args, Debug)]
struct FilterArgs {
    /// Span payload (JSON)
    #[arg(long)]
    payload: PathBuf,

    /// Cluster list (JSON)
    #[arg(long)]
    clusters: PathBuf,

    /// Comma-separated cluster indices
    #[arg(long, default_value = "")]
    select: String,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Use compact JSON (no pretty-printing)
    #[arg(long)]
    compact: bool,

    /// Compress output with gzip (.json.gz)
    #[arg(long, requires = "output")]
    gzip: bool,

    #[command(flatten)]
    common: CommonArgs,
}

/// Arguments for the names subcommand
#[derive(Args, Debug)]
struct NamesArgs {
    /// Cluster list (JSON)
    #[arg(long)]
    clusters: PathBuf,

    /// Surface form map (JSON)
    #[arg(long)]
    surface: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

/// Arguments for the serve subcommand
#[cfg(feature = "serve")]
#[derive(Args, Debug)]
struct ServeArgs {
    /// Visualization directory; replaces the configured corpora
    #[arg(short = 'v', long)]
    vis_dir: Option<PathBuf>,

    /// Port for the web server (default from config)
    #[arg(long)]
    port: Option<u16>,

    /// Do not open a browser tab
    #[arg(long)]
    no_browser: bool,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::PrepareDiff(args) => run_prepare_diff(args),
        Commands::PrepareCoref(args) => run_prepare_coref(args),
        Commands::Filter(args) => run_filter(args),
        Commands::Names(args) => run_names(args),
        #[cfg(feature = "serve")]
        Commands::Serve(args) => run_serve(args),
    }
}

/// Initialize logging and load the configuration
fn init(common: &CommonArgs) -> Result<Config> {
    let log_level = if common.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Some(path) = &common.config {
        info!("Loading configuration: {}", path.display());
    }
    Config::load_or_default(common.config.as_deref())
}

fn parse_offset_fields(value: &str) -> Result<[usize; 2]> {
    let fields = value
        .split(',')
        .map(|f| f.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid offset fields: {}", value))?;
    match fields.as_slice() {
        [begin, end] => Ok([*begin, *end]),
        _ => anyhow::bail!("Expected two offset fields, got '{}'", value),
    }
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Run the prepare-diff subcommand: comparison file → span payloads
fn run_prepare_diff(args: PrepareDiffArgs) -> Result<()> {
    let mut config = init(&args.common)?;
    info!("corefviz prepare-diff v{}", env!("CARGO_PKG_VERSION"));

    if let Some(dir) = &args.vis_dir {
        config.visualization_dir = dir.clone();
    }
    if let Some(fields) = &args.offset_field {
        config.prepare.token_offset_fields = parse_offset_fields(fields)?;
    }
    if let Some(ext) = &args.token_ext {
        config.prepare.token_ext = ext.clone();
    }
    if let Some(ext) = &args.source_ext {
        config.prepare.source_ext = ext.clone();
    }
    config.validate()?;

    let store = AnnotationStore::new(&config.visualization_dir, config.layout.clone());
    let inputs = corefviz::diff::DiffInputs {
        comparison: &args.comparison,
        token_dir: &args.token_dir,
        text_dir: &args.text_dir,
        options: &config.prepare,
        colors: &config.colors,
    };
    let summary = corefviz::diff::prepare_diff(&inputs, &store)?;
    info!(
        "Wrote {} documents to {}",
        summary.written.len(),
        store.json_dir().display()
    );

    #[cfg(feature = "serve")]
    if args.serve {
        if let Some(port) = args.port {
            config.port = port;
        }
        config.corpora.clear();
        return serve_config(&config);
    }

    Ok(())
}

/// Run the prepare-coref subcommand: brat annotation → clusters and surface forms
fn run_prepare_coref(args: PrepareCorefArgs) -> Result<()> {
    let mut config = init(&args.common)?;
    info!("corefviz prepare-coref v{}", env!("CARGO_PKG_VERSION"));

    if let Some(dir) = &args.vis_dir {
        config.visualization_dir = dir.clone();
    }
    if let Some(ext) = &args.annotation_ext {
        config.prepare.annotation_ext = ext.clone();
    }

    let store = AnnotationStore::new(&config.visualization_dir, config.layout.clone());
    let summary = corefviz::brat::prepare_coref(
        &args.gold_dir,
        &args.sys_dir,
        &store,
        &config.prepare.annotation_ext,
    )?;

    info!(
        "Wrote coreference data for {} documents to {}",
        summary.written.len(),
        store.json_dir().display()
    );
    if !summary.skipped.is_empty() {
        log::warn!(
            "{} documents had no system annotation: {}",
            summary.skipped.len(),
            summary.skipped.join(", ")
        );
    }
    Ok(())
}

/// Run the filter subcommand: payload + clusters + selection → filtered payload
fn run_filter(args: FilterArgs) -> Result<()> {
    init(&args.common)?;

    let payload: serde_json::Value = read_json_file(&args.payload)?;
    let clusters: ClusterList = read_json_file(&args.clusters)?;
    let selection = filter::parse_selection(&args.select)
        .with_context(|| format!("Invalid cluster selection: {}", args.select))?;

    let filtered = filter::filter_json(&payload, &clusters, &selection)
        .with_context(|| format!("Cannot filter {}", args.payload.display()))?;

    match &args.output {
        Some(path) if args.gzip => output::write_json_gzip(&filtered, path, args.compact)?,
        Some(path) => output::write_json(&filtered, path, !args.compact)?,
        None if args.compact => println!("{}", serde_json::to_string(&filtered)?),
        None => println!("{}", serde_json::to_string_pretty(&filtered)?),
    }
    if let Some(path) = &args.output {
        info!("Wrote filtered payload to {}", path.display());
    }
    Ok(())
}

/// Run the names subcommand: clusters + surface forms → labels
fn run_names(args: NamesArgs) -> Result<()> {
    init(&args.common)?;

    let clusters: ClusterList = read_json_file(&args.clusters)?;
    let surface: SurfaceForms = read_json_file(&args.surface)?;
    for label in filter::name_clusters(&clusters, &surface)? {
        println!("{}", label);
    }
    Ok(())
}

/// Run the serve subcommand
#[cfg(feature = "serve")]
fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = init(&args.common)?;
    info!("corefviz serve v{}", env!("CARGO_PKG_VERSION"));

    if let Some(dir) = &args.vis_dir {
        config.visualization_dir = dir.clone();
        config.corpora.clear();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.no_browser {
        config.open_browser = false;
    }
    config.validate()?;

    serve_config(&config)
}

#[cfg(feature = "serve")]
fn serve_config(config: &Config) -> Result<()> {
    use corefviz::serve::{self, ViewerSettings};
    use corefviz::state::{AppState, Corpus};

    let corpora: Vec<Corpus> = config
        .effective_corpora()
        .into_iter()
        .map(|(name, corpus)| Corpus {
            name,
            label: corpus.label,
            store: AnnotationStore::new(corpus.path, config.layout.clone()),
        })
        .collect();
    for corpus in &corpora {
        info!("Corpus '{}': {}", corpus.name, corpus.store.root().display());
    }

    let state = AppState::new(corpora).context("Cannot open visualization data")?;
    let settings = ViewerSettings {
        brat_location: config.brat_location.clone(),
    };
    serve::start_server(state, settings, config.port, config.open_browser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_offset_fields() {
        assert_eq!(parse_offset_fields("2,3").unwrap(), [2, 3]);
        assert_eq!(parse_offset_fields(" 4 , 5 ").unwrap(), [4, 5]);
        assert!(parse_offset_fields("2").is_err());
        assert!(parse_offset_fields("2,x").is_err());
    }

    #[test]
    fn test_cli_parses_filter() {
        let cli = Cli::try_parse_from([
            "corefviz", "filter", "--payload", "p.json", "--clusters", "c.json", "--select", "0,1",
        ])
        .unwrap();
        match cli.command {
            Commands::Filter(args) => {
                assert_eq!(args.select, "0,1");
                assert!(!args.common.verbose);
            }
            _ => panic!("expected filter"),
        }
    }

    #[test]
    fn test_gzip_requires_output() {
        assert!(Cli::try_parse_from([
            "corefviz", "filter", "--payload", "p.json", "--clusters", "c.json", "--gzip",
        ])
        .is_err());
    }
}
