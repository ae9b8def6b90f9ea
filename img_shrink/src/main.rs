use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use serde_json::json;
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::{
    load_capabilities, print_summary_report, BatchProgress, CapabilityTable, MagickEngine,
    Pipeline, RunConfig,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{warn, Level};

#[derive(Parser)]
#[command(name = "img_shrink")]
#[command(
    version,
    about = "Recursively downscale oversized images via ImageMagick",
    long_about = None
)]
struct Cli {
    /// Show per-file diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// ImageMagick binary to use instead of searching PATH
    #[arg(long, global = true, value_name = "PATH")]
    engine: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shrink every matching image under ROOT
    Run(RunArgs),

    /// List the formats the conversion engine can read and write
    Formats {
        #[arg(short, long, value_enum, default_value = "human")]
        output: OutputFormat,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,

    /// JSON run config; flags given here override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Longest allowed edge in pixels
    #[arg(short, long)]
    max_edge: Option<u32>,

    /// Extensions to process, e.g. `-e png,tga`
    #[arg(short, long = "ext", value_delimiter = ',')]
    extensions: Vec<String>,

    /// Convert every processed file to this format
    #[arg(short = 'f', long)]
    output_format: Option<String>,

    #[arg(long)]
    strip_metadata: bool,

    /// Strongest PNG compression when the output is PNG
    #[arg(long)]
    max_png_compression: bool,

    /// Skip files whose name contains the skip marker
    #[arg(long)]
    skip_marked: bool,

    #[arg(long)]
    skip_marker: Option<String>,

    /// Nearest-neighbor resampling
    #[arg(long)]
    pixel_art: bool,

    /// Log what would happen without touching any file
    #[arg(short = 'n', long)]
    dry_run: bool,

    #[arg(long)]
    no_backup: bool,

    #[arg(long)]
    no_log: bool,

    #[arg(long)]
    log_file_name: Option<String>,

    #[arg(short, long, value_enum, default_value = "human")]
    output: OutputFormat,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    #[default]
    Human,
    Json,
}

impl RunArgs {
    /// Config file (or defaults) with every given flag applied on top.
    fn into_config(self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => match &self.root {
                Some(root) => RunConfig::new(root),
                None => bail!("A ROOT directory or --config file is required"),
            },
        };

        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(max_edge) = self.max_edge {
            config.max_edge = max_edge;
        }
        if !self.extensions.is_empty() {
            config.extensions = self.extensions;
        }
        if self.output_format.is_some() {
            config.output_format = self.output_format;
        }
        if let Some(marker) = self.skip_marker {
            config.skip_marker = marker;
        }
        if let Some(name) = self.log_file_name {
            config.log_file_name = name;
        }
        config.strip_metadata |= self.strip_metadata;
        config.max_png_compression |= self.max_png_compression;
        config.skip_marked |= self.skip_marked;
        config.pixel_art |= self.pixel_art;
        config.dry_run |= self.dry_run;
        config.backup &= !self.no_backup;
        config.write_log &= !self.no_log;

        Ok(config.normalized())
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::INFO } else { Level::WARN };
    if let Err(e) = init_logging("img_shrink", LogConfig::default().with_level(level)) {
        eprintln!("⚠️  Logging unavailable: {:#}", e);
    }

    match cli.command {
        Commands::Run(args) => run(args, cli.engine),
        Commands::Formats { output } => formats(output, cli.engine),
    }
}

fn locate_engine(explicit: Option<PathBuf>) -> anyhow::Result<MagickEngine> {
    match explicit {
        Some(program) if program.is_file() => Ok(MagickEngine::with_program(program)),
        Some(program) => bail!("Engine binary not found: {}", program.display()),
        None => Ok(MagickEngine::locate()?),
    }
}

fn run(args: RunArgs, engine: Option<PathBuf>) -> anyhow::Result<()> {
    let output = args.output;
    let config = args.into_config().context("Invalid run configuration")?;

    let engine = locate_engine(engine)?;
    let capabilities = load_capabilities(&engine);
    let pipeline = Pipeline::new(config, &engine, &capabilities)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    if let Err(e) = ctrlc::set_handler(move || {
        if !handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\n⏹️  Stopping after the current file...");
        }
    }) {
        warn!(error = %e, "Ctrl-C handler unavailable, run cannot be cancelled");
    }
    let pipeline = pipeline.with_cancel_flag(cancel);

    if output == OutputFormat::Human {
        let root = &pipeline.config().root;
        println!("🖼️  Shrinking images under {}", style(root.display()).cyan());
        if pipeline.config().dry_run {
            println!("{}", style("🔍 Dry run: no file will be modified").yellow());
        }
    }

    let mut progress = BatchProgress::new(0, "Shrinking", output == OutputFormat::Json);
    let summary = pipeline
        .run(|p| progress.observe(p))
        .with_context(|| format!("Run aborted for {}", pipeline.config().root.display()))?;
    progress.finish();

    match output {
        OutputFormat::Human => print_summary_report(&summary, pipeline.config().dry_run),
        OutputFormat::Json => {
            let report = json!({
                "config": pipeline.config(),
                "summary": summary,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn formats(output: OutputFormat, engine: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = locate_engine(engine)?;
    let table = load_capabilities(&engine);
    if table.is_empty() {
        bail!(
            "{} returned no usable format table",
            engine.program().display()
        );
    }

    match output {
        OutputFormat::Human => print_format_table(&table),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&table)?),
    }
    Ok(())
}

fn print_format_table(table: &CapabilityTable) {
    println!("{:<10} {:<5} {}", "FORMAT", "MODE", "DESCRIPTION");
    for entry in &table.entries {
        let mode = format!(
            "{}{}{}",
            if entry.mode.read { 'r' } else { '-' },
            if entry.mode.write { 'w' } else { '-' },
            if entry.mode.multi_frame { '+' } else { '-' },
        );
        let mode = if entry.mode.write {
            style(mode).green()
        } else {
            style(mode).dim()
        };
        println!("{:<10} {:<5} {}", entry.token, mode, entry.description);
    }
    if table.rejected_rows > 0 {
        println!(
            "{}",
            style(format!("({} malformed rows ignored)", table.rejected_rows)).dim()
        );
    }
}
