use clap::{Parser, Subcommand};
use gridshard::types::{MANIFEST_FILE, Manifest};
use gridshard::{config, export, feed, logging, output, pipeline, scan};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "gridshard")]
#[command(about = "Turn grid battle maps into object-detection training data")]
#[command(long_about = "\
Turn grid battle maps into object-detection training data

Map files carry their grid size in the name:

  maps/
  ├── gridshard.toml                # Config (optional, see gen-config)
  ├── canal_street_rain.14x20.jpg   # 14 columns x 20 rows
  └── unmarked_mine.35x49.jpg       # 1715 cells: cut into shards

Stages:
  ingest   feed posts → map files in --source
  scan     --source → <temp-dir>/manifest.json
  process  probe, shard, bounding boxes → <temp-dir>/processed/manifest.json
  export   processed manifest → <temp-dir>/documents.jsonl

Set GRIDSHARD_LOG=debug for shard plan details.")]
#[command(version = version_string())]
struct Cli {
    /// Map directory
    #[arg(long, default_value = "maps", global = true)]
    source: PathBuf,

    /// Directory for intermediate files (manifests, documents)
    #[arg(long, default_value = ".gridshard-temp", global = true)]
    temp_dir: PathBuf,

    /// Config file (default: <source>/gridshard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Shared flags for commands that process images.
#[derive(clap::Args, Clone)]
struct ProcessArgs {
    /// Seed for reproducible shard plans (overrides shards.seed)
    #[arg(long)]
    seed: Option<u64>,
}

/// Shared flags for commands that export documents.
#[derive(clap::Args, Clone)]
struct ExportArgs {
    /// Storage location the map files are uploaded to; sets gcsURI
    #[arg(long)]
    storage_prefix: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Download feed posts into the map directory, then scan it
    Ingest {
        /// JSON array of posts ({title, body, id, url})
        #[arg(long)]
        posts: PathBuf,
        /// Local directory holding the posts' images by URL file name
        #[arg(long)]
        mirror: PathBuf,
    },
    /// Scan the map directory into a manifest
    Scan,
    /// Probe images, cut oversized maps into shards, compute bounding boxes
    Process(ProcessArgs),
    /// Write processed records as JSON-lines documents
    Export(ExportArgs),
    /// Convert batch predictions into training rows
    ConvertPredictions {
        /// JSON-lines batch prediction output
        #[arg(long)]
        input: PathBuf,
        /// Where to write JSON-lines training rows
        #[arg(long)]
        output: PathBuf,
        /// Drop boxes below this confidence
        #[arg(long, default_value_t = 0.5)]
        min_confidence: f64,
    },
    /// Run the full pipeline: scan → process → export
    Build {
        #[command(flatten)]
        process: ProcessArgs,
        #[command(flatten)]
        export: ExportArgs,
    },
    /// Print a stock gridshard.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();
    let cli = Cli::parse();

    let scan_manifest_path = cli.temp_dir.join(MANIFEST_FILE);
    let processed_manifest_path = cli.temp_dir.join("processed").join(MANIFEST_FILE);
    let documents_path = cli.temp_dir.join("documents.jsonl");

    match cli.command {
        Command::Ingest {
            ref posts,
            ref mirror,
        } => {
            let posts = feed::load_posts(posts)?;
            let previous = read_manifest_if_exists(&scan_manifest_path)?;
            let mut seen: HashSet<String> =
                previous.images.iter().map(|m| m.uid.clone()).collect();

            let stored = feed::ingest(
                &posts,
                &feed::MirrorFetcher::new(mirror),
                &cli.source,
                &mut seen,
            )?;
            output::print_ingest_output(&stored, posts.len() - stored.len());

            let mut known = previous.images;
            known.extend(stored);
            let manifest = scan::scan(&cli.source, load_config(&cli)?, &known)?;
            manifest.write(&scan_manifest_path)?;
            output::print_scan_output(&manifest);
        }
        Command::Scan => {
            let manifest = run_scan(&cli, &scan_manifest_path)?;
            output::print_scan_output(&manifest);
        }
        Command::Process(ref args) => {
            run_process(&scan_manifest_path, &processed_manifest_path, args, &cli)?;
        }
        Command::Export(ref args) => {
            let count = export::export(
                &processed_manifest_path,
                &documents_path,
                args.storage_prefix.as_deref(),
            )?;
            output::print_export_output(count, &documents_path);
        }
        Command::ConvertPredictions {
            ref input,
            output: ref rows_path,
            min_confidence,
        } => {
            let reader = std::io::BufReader::new(std::fs::File::open(input)?);
            let writer = std::io::BufWriter::new(std::fs::File::create(rows_path)?);
            let count = export::convert_predictions(reader, writer, min_confidence)?;
            println!("Converted {} predictions \u{2192} {}", count, rows_path.display());
        }
        Command::Build {
            process: ref process_args,
            export: ref export_args,
        } => {
            println!("==> Stage 1: Scanning {}", cli.source.display());
            let manifest = run_scan(&cli, &scan_manifest_path)?;
            output::print_scan_output(&manifest);

            println!("==> Stage 2: Processing maps");
            run_process(
                &scan_manifest_path,
                &processed_manifest_path,
                process_args,
                &cli,
            )?;

            println!("==> Stage 3: Exporting documents");
            let count = export::export(
                &processed_manifest_path,
                &documents_path,
                export_args.storage_prefix.as_deref(),
            )?;
            output::print_export_output(count, &documents_path);

            println!("==> Build complete: {}", cli.temp_dir.display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Config from `--config`, else from the source directory.
fn load_config(cli: &Cli) -> Result<config::GridConfig, config::ConfigError> {
    match &cli.config {
        Some(path) => config::load_config_file(path),
        None => config::load_config(&cli.source),
    }
}

fn read_manifest_if_exists(path: &Path) -> std::io::Result<Manifest> {
    if path.exists() {
        Manifest::read(path)
    } else {
        Ok(Manifest::default())
    }
}

/// Scan the source, keeping provenance from any earlier manifest.
fn run_scan(cli: &Cli, manifest_path: &Path) -> Result<Manifest, Box<dyn std::error::Error>> {
    let previous = read_manifest_if_exists(manifest_path)?;
    let manifest = scan::scan(&cli.source, load_config(cli)?, &previous.images)?;
    manifest.write(manifest_path)?;
    Ok(manifest)
}

fn run_process(
    scan_manifest_path: &Path,
    processed_manifest_path: &Path,
    args: &ProcessArgs,
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => config::load_config_file(path)?,
        None => Manifest::read(scan_manifest_path)?.config,
    };
    if args.seed.is_some() {
        config.shards.seed = args.seed;
    }
    init_thread_pool(&config.processing);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_process_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = pipeline::process(scan_manifest_path, Some(config), Some(tx))?;
    printer.join().ok();

    result.manifest.write(processed_manifest_path)?;
    output::print_run_summary(&result.summary);
    Ok(())
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
