// coordnet/src/main.rs
//
// coordnet — coordination-network detection over timestamped interaction
// streams.
//
// Scans a time-ordered stream of interaction events (who did what, when, to
// which target) with a genuine sliding window, linking actors whose targets
// match within the comparison horizon into a weighted co-activity graph.
// Snapshots are written as GraphML, one per completed window plus a FINAL.
//
// Subcommands:
//   detect     — run the sliding-window detector over a CSV or tweet stream
//   extract    — convert raw tweet JSONL into an interactions CSV for detect
//   filter     — drop low-weight edges (then orphaned nodes) from a GraphML
//   stats      — one-line CSV summary of a GraphML file
//   similarity — node-set Jaccard/overlap between two GraphML files
//
// Usage:
//   coordnet detect -i interactions.csv -o out/lcn -d1 15m -d2 60m
//   coordnet detect -i tweets.jsonl.gz --raw tweets --extract hashtags \
//       -o out/lcn -d1 10s --final-only --final-min-edge-weight 3
//   coordnet filter -i out/lcn-FINAL.graphml -m 5
//   coordnet stats --header out/lcn-FINAL.graphml

use std::collections::HashSet;
use std::io::BufRead;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod compare;
mod config;
mod engine;
mod events;
mod extract;
mod graphml;
mod loader;
mod state;
mod stats;

use compare::{Comparator, ComparisonStrategy};
use config::DetectorConfig;
use engine::detector::Detector;
use engine::snapshot::{filtered_path, SnapshotController};
use events::{ExtractKind, Interaction};
use extract::{CsvColumns, CsvExtractor, TweetExtractor};
use graphml::GraphDoc;

const PROGRESS_INTERVAL: u64 = 10_000;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "coordnet",
    about   = "Coordination-network detection over timestamped interaction streams",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, global = true, help = "Verbose logging")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a time-ordered interaction stream for coordinated activity
    Detect(DetectArgs),
    /// Convert raw tweet JSONL into an interactions CSV for `detect`
    Extract(ExtractArgs),
    /// Drop edges under a minimum weight, then orphaned nodes, from a GraphML file
    Filter(FilterArgs),
    /// One-line CSV summary of a GraphML file
    Stats(StatsArgs),
    /// Node-set similarity between two GraphML files
    Similarity(SimilarityArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum RawKind {
    /// One tweet JSON object per line
    Tweets,
}

#[derive(Args)]
struct DetectArgs {
    #[arg(short = 'i', long = "input", help = "A file of timestamped interactions (.gz accepted)")]
    input: PathBuf,

    #[arg(short = 'o', long = "out-filebase", help = "Filebase for the emitted GraphML snapshots")]
    out_filebase: String,

    #[arg(long = "d1", help = "Comparison horizon, value + unit (e.g. 10s, 15m, 2h, 1d, 1w)")]
    d1: String,

    #[arg(long = "d2", help = "Retention horizon (default: same as d1, i.e. adjacent windows)")]
    d2: Option<String>,

    #[arg(long = "raw", value_enum, help = "Expect raw JSON records instead of CSV")]
    raw: Option<RawKind>,

    #[arg(long = "extract", value_enum,
          help = "What to extract from raw records (default for tweets: hashtags)")]
    extract: Option<ExtractKind>,

    #[arg(long = "comparison-strategy", value_enum, default_value = "exact-match")]
    comparison_strategy: ComparisonStrategy,

    #[arg(long = "text-similarity-threshold", default_value_t = 0.9,
          help = "Jaccard threshold for a text match [0,1]")]
    text_similarity_threshold: f64,

    #[arg(long = "text-similarity-min-tokens", default_value_t = 5,
          help = "Minimum tokens to consider a text match")]
    text_similarity_min_tokens: usize,

    #[arg(long = "ts-col", default_value = "timestamp", help = "Name of the timestamp column")]
    ts_col: String,

    #[arg(long = "src-col", default_value = "source",
          help = "Name of the source column, i.e. the potentially coordinating account")]
    src_col: String,

    #[arg(long = "tgt-col", default_value = "target",
          help = "Name of the target column, i.e. the value binding coordinating accounts")]
    tgt_col: String,

    #[arg(long = "id-col", default_value = "t_id", help = "Name of the post id column")]
    id_col: String,

    #[arg(long = "exclude-targets", default_value = "",
          help = "Target values to ignore, separated by |")]
    exclude_targets: String,

    #[arg(long = "keep-history",
          help = "Keep per-edge lead/match history (uses a lot of memory)")]
    keep_history: bool,

    #[arg(long = "dry-run", help = "Do not write anything to disk")]
    dry_run: bool,

    #[arg(long = "final-only", help = "Write only the final combined network")]
    final_only: bool,

    #[arg(long = "final-min-edge-weight", default_value_t = -1.0, allow_negative_numbers = true,
          help = "Minimum edge weight kept in the final network (negative disables)")]
    final_min_edge_weight: f64,
}

#[derive(Args)]
struct ExtractArgs {
    #[arg(short = 'i', long = "input", help = "Raw tweet JSONL (.gz accepted)")]
    input: PathBuf,

    #[arg(short = 'o', long = "output", help = "Interactions CSV to write")]
    output: PathBuf,

    #[arg(long = "extract", value_enum, default_value = "hashtags")]
    extract: ExtractKind,

    #[arg(long = "exclude-targets", default_value = "",
          help = "Target values to ignore, separated by |")]
    exclude_targets: String,
}

#[derive(Args)]
struct FilterArgs {
    #[arg(short = 'i', long = "input", help = "A weighted network (GraphML)")]
    input: PathBuf,

    #[arg(short = 'o', long = "output",
          help = "The filtered network (default: input name with a -min<w> suffix)")]
    output: Option<PathBuf>,

    #[arg(short = 'm', long = "min-weight", help = "Minimum edge weight to retain")]
    min_weight: f64,

    #[arg(short = 'p', long = "weight-property", default_value = "weight")]
    weight_property: String,

    #[arg(long = "dry-run", help = "Do not write anything to disk")]
    dry_run: bool,
}

#[derive(Args)]
struct StatsArgs {
    #[arg(help = "A weighted network (GraphML)")]
    input: PathBuf,

    #[arg(long = "header", help = "Output the column header first")]
    header: bool,

    #[arg(short = 'p', long = "weight-property", default_value = "weight")]
    weight_property: String,
}

#[derive(Args)]
struct SimilarityArgs {
    #[arg(long = "g1", help = "A network (GraphML)")]
    g1: PathBuf,

    #[arg(long = "g2", help = "A network (GraphML)")]
    g2: PathBuf,

    #[arg(long = "header", help = "Output the column header first")]
    header: bool,
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let start = Instant::now();
    match cli.command {
        Command::Detect(args) => run_detect(args)?,
        Command::Extract(args) => run_extract(args)?,
        Command::Filter(args) => run_filter(args)?,
        Command::Stats(args) => run_stats(args)?,
        Command::Similarity(args) => run_similarity(args)?,
    }
    info!("done in {:.1}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let directive = if verbose { "coordnet=debug" } else { "coordnet=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .compact()
        .init();
    Ok(())
}

// ── detect ────────────────────────────────────────────────────────────────────

fn run_detect(args: DetectArgs) -> Result<()> {
    let d1 = config::parse_window_spec(&args.d1)?;
    let d2 = match &args.d2 {
        Some(spec) => config::parse_window_spec(spec)?,
        None => d1,
    };
    let cfg = DetectorConfig { d1, d2, keep_history: args.keep_history }.validated()?;
    if !(0.0..=1.0).contains(&args.text_similarity_threshold) {
        bail!("--text-similarity-threshold must be within [0,1]");
    }

    let comparator = Comparator::new(
        args.comparison_strategy,
        args.text_similarity_threshold,
        args.text_similarity_min_tokens,
    );
    let exclude = parse_excludes(&args.exclude_targets);

    // tweets without an explicit extraction kind default to hashtags
    let effective_kind = match args.raw {
        Some(RawKind::Tweets) => Some(args.extract.unwrap_or(ExtractKind::Hashtags)),
        None => args.extract,
    };

    let mut controller = SnapshotController::new(
        &args.out_filebase,
        effective_kind.map(|k| k.to_string()),
        args.dry_run,
        args.final_only,
        args.final_min_edge_weight,
        args.keep_history,
    );
    let mut detector = Detector::new(cfg, comparator);

    info!(d1, d2, strategy = %args.comparison_strategy, "starting detection run");
    let reader = loader::open_input(&args.input)?;

    match args.raw {
        Some(RawKind::Tweets) => {
            let extractor =
                TweetExtractor::new(effective_kind.unwrap_or(ExtractKind::Hashtags), exclude);
            let mut lines = 0u64;
            for line in reader.lines() {
                let line = line.context("reading input line")?;
                lines += 1;
                if lines % PROGRESS_INTERVAL == 0 {
                    info!(lines, queued = detector.queue_len(), "progress");
                }
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                step(&mut detector, &controller, &extractor.extract(line))?;
            }
        }
        None => {
            let cols = CsvColumns {
                id: args.id_col.clone(),
                ts: args.ts_col.clone(),
                src: args.src_col.clone(),
                tgt: args.tgt_col.clone(),
            };
            let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
            let headers = csv_reader.headers().context("reading CSV header")?.clone();
            let extractor = CsvExtractor::bind(&cols, &headers, exclude)?;

            let mut record = csv::StringRecord::new();
            let mut lines = 0u64;
            while csv_reader.read_record(&mut record).context("reading CSV record")? {
                lines += 1;
                if lines % PROGRESS_INTERVAL == 0 {
                    info!(lines, queued = detector.queue_len(), "progress");
                }
                if args.extract.is_none() {
                    if let Some(tag) = extractor.interaction_tag(&record) {
                        controller.adopt_tag(tag);
                    }
                }
                let Some(event) = extractor.extract(&record) else { continue };
                step(&mut detector, &controller, std::slice::from_ref(&event))?;
            }
        }
    }

    match detector.finish() {
        Some(request) => {
            controller.emit(&request, detector.graph())?;
        }
        None => info!("no events extracted; nothing to write"),
    }
    info!(
        nodes = detector.graph().node_count(),
        edges = detector.graph().edge_count(),
        "final co-activity graph"
    );
    Ok(())
}

fn step(
    detector: &mut Detector,
    controller: &SnapshotController,
    events: &[Interaction],
) -> Result<()> {
    if let Some(request) = detector.ingest(events)? {
        controller.emit(&request, detector.graph())?;
    }
    Ok(())
}

fn parse_excludes(raw: &str) -> Vec<String> {
    raw.split('|')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── extract ───────────────────────────────────────────────────────────────────

fn run_extract(args: ExtractArgs) -> Result<()> {
    let extractor = TweetExtractor::new(args.extract, parse_excludes(&args.exclude_targets));
    let reader = loader::open_input(&args.input)?;
    let mut writer = csv::Writer::from_path(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    writer.write_record(["timestamp", "source", "target", "t_id", "interaction"])?;

    let kind = args.extract.to_string();
    let mut lines = 0u64;
    let mut written = 0u64;
    for line in reader.lines() {
        let line = line.context("reading input line")?;
        lines += 1;
        if lines % PROGRESS_INTERVAL == 0 {
            info!(lines, written, "progress");
        }
        for event in extractor.extract(line.trim()) {
            let ts = event.ts.to_string();
            writer.write_record([
                ts.as_str(),
                event.actor.as_str(),
                event.target.as_str(),
                event.post_id.as_str(),
                kind.as_str(),
            ])?;
            written += 1;
        }
    }
    writer.flush()?;
    info!(lines, written, "wrote {}", args.output.display());
    Ok(())
}

// ── filter ────────────────────────────────────────────────────────────────────

fn run_filter(args: FilterArgs) -> Result<()> {
    let doc = graphml::read_file(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let out = args
        .output
        .clone()
        .unwrap_or_else(|| filtered_path(&args.input, args.min_weight));

    println!("Min weight: {}", args.min_weight);
    println!("In file:  {}", args.input.display());
    println!("Out file: {}", out.display());
    println!("In:  V={:>8} E={:>8}", doc.nodes.len(), doc.edges.len());

    let filtered = filter_doc(doc, args.min_weight, &args.weight_property)?;
    println!("Out: V={:>8} E={:>8}", filtered.nodes.len(), filtered.edges.len());

    if !args.dry_run {
        graphml::write_file(&filtered, &out)
            .with_context(|| format!("writing {}", out.display()))?;
    }
    Ok(())
}

/// Drop edges below the weight threshold, then any node left unconnected.
fn filter_doc(mut doc: GraphDoc, min_weight: f64, weight_attr: &str) -> Result<GraphDoc> {
    let edges = std::mem::take(&mut doc.edges);
    let mut kept = Vec::with_capacity(edges.len());
    for edge in edges {
        let w = doc.edge_weight(&edge, weight_attr).with_context(|| {
            format!("edge {}--{} has no '{}' attribute", edge.source, edge.target, weight_attr)
        })?;
        if w >= min_weight {
            kept.push(edge);
        }
    }

    let connected: HashSet<&str> = kept
        .iter()
        .flat_map(|e| [e.source.as_str(), e.target.as_str()])
        .collect();
    let connected: HashSet<String> = connected.into_iter().map(str::to_string).collect();
    doc.nodes.retain(|n| connected.contains(&n.id));
    doc.edges = kept;
    Ok(doc)
}

// ── stats / similarity ────────────────────────────────────────────────────────

fn run_stats(args: StatsArgs) -> Result<()> {
    let doc = graphml::read_file(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let computed = stats::compute(&doc, &args.weight_property)?;

    if args.header {
        println!("{}", stats::STATS_COLUMNS);
    }
    let filename = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());
    println!("{}", computed.csv_line(&filename));
    Ok(())
}

fn run_similarity(args: SimilarityArgs) -> Result<()> {
    let g1 = graphml::read_file(&args.g1)
        .with_context(|| format!("reading {}", args.g1.display()))?;
    let g2 = graphml::read_file(&args.g2)
        .with_context(|| format!("reading {}", args.g2.display()))?;

    if args.header {
        println!("{}", stats::SIMILARITY_COLUMNS);
    }
    let computed = stats::similarity(&g1, &g2);
    println!(
        "{}",
        computed.csv_line(&args.g1.display().to_string(), &args.g2.display().to_string())
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_lists_are_lowered_and_trimmed() {
        assert_eq!(parse_excludes("Foo| bar |"), vec!["foo", "bar"]);
        assert!(parse_excludes("").is_empty());
    }

    #[test]
    fn filter_doc_drops_light_edges_then_orphans() {
        let mut doc = GraphDoc::default();
        for n in ["a", "b", "c"] {
            doc.add_node(n, Default::default());
        }
        doc.add_edge("a", "b", [("weight".to_string(), "1".to_string())].into());
        doc.add_edge("b", "c", [("weight".to_string(), "5".to_string())].into());

        let filtered = filter_doc(doc, 2.0, "weight").unwrap();
        assert_eq!(filtered.edges.len(), 1);
        assert_eq!(filtered.nodes.len(), 2);
        assert!(filtered.nodes.iter().all(|n| n.id != "a"));
    }

    #[test]
    fn filter_doc_requires_the_weight_attribute() {
        let mut doc = GraphDoc::default();
        doc.add_node("a", Default::default());
        doc.add_node("b", Default::default());
        doc.add_edge("a", "b", Default::default());
        assert!(filter_doc(doc, 1.0, "weight").is_err());
    }
}
