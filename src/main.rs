use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use clap::{ArgAction, Parser};
use log::LevelFilter;
use smog_trace::config::{
    ConverterConfig, DEFAULT_PAGE_SIZE, get_config_path, validate_page_size,
};
use smog_trace::error::{UsageError, exit_code};
use smog_trace::path::{FramePathTemplate, format_path_for_display};
use smog_trace::pipeline::{Pipeline, PipelineOptions};
use smog_trace::sinks::{
    BitmapSink, HistogramSink, OutputKind, ParquetTableWriter, PngImageWriter, TableFactory,
    TableTarget, TableWriter, TabularSink,
};
use smog_trace::styling::{
    BOLD, ERROR, ERROR_EMOJI, HINT, PROGRESS, PROGRESS_EMOJI, SUCCESS, SUCCESS_EMOJI, WARNING,
    WARNING_EMOJI, eprint, eprintln, status_line,
};
use smog_trace::trace::{TraceFile, TraceFormat};
use smog_trace::utils::format_size;

#[derive(Parser)]
#[command(name = "smog-trace")]
#[command(about = "Convert SMOG page-state traces into tables, bitmaps and histograms", long_about = None)]
#[command(version)]
struct Cli {
    /// Trace file recorded by the SMOG tracer
    tracefile: PathBuf,

    /// Output path; for per-frame parquet a template containing `%s`
    #[arg(short, long, value_name = "PATH")]
    output: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, value_name = "KIND")]
    format: OutputKind,

    /// Parquet: write all frames into one file instead of one per frame
    #[arg(long)]
    single_table: bool,

    /// Only consider VMAs with this exact name
    #[arg(long, value_name = "NAME")]
    filter_vma: Option<String>,

    /// Page size for reports (e.g. 4096, 4KiB, 2MiB)
    #[arg(long, value_name = "SIZE", value_parser = smog_trace::utils::parse_size)]
    page_size: Option<u64>,

    /// Decode the legacy (page-count, unnamed) VMA layout
    #[arg(long)]
    legacy_format: bool,

    /// Worker threads (default: all cores)
    #[arg(short = 'j', long, value_name = "N")]
    threads: Option<NonZeroUsize>,

    /// Config file override
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Effective settings after merging flags over the config file.
#[derive(Debug)]
struct Settings {
    page_size: u64,
    threads: Option<usize>,
    single_table: bool,
    format: TraceFormat,
}

impl Settings {
    fn resolve(cli: &Cli, config: &ConverterConfig) -> anyhow::Result<Self> {
        let page_size = match cli.page_size {
            Some(bytes) => bytes,
            None => config.page_size()?.unwrap_or(DEFAULT_PAGE_SIZE),
        };
        let threads = match cli.threads {
            Some(n) => Some(n.get()),
            None => match config.threads {
                Some(0) => return Err(UsageError("config: threads must be at least 1".into()).into()),
                other => other,
            },
        };
        let legacy = cli.legacy_format || config.legacy_format.unwrap_or(false);

        Ok(Self {
            page_size: validate_page_size(page_size)?,
            threads,
            single_table: cli.single_table || config.single_table.unwrap_or(false),
            format: if legacy {
                TraceFormat::Legacy
            } else {
                TraceFormat::Named
            },
        })
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli) {
        eprintln!("{ERROR_EMOJI} {ERROR}{err:#}{ERROR:#}");
        process::exit(exit_code(&err));
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    // RUST_LOG, when set, refines the level chosen by -v
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match get_config_path(cli.config.as_deref()) {
        Some(path) => ConverterConfig::load(&path)?,
        None => ConverterConfig::default(),
    };
    let settings = Settings::resolve(&cli, &config)?;
    log::debug!("Settings: {settings:?}");

    // Validate the output template before spending time on the trace.
    let template = match (cli.format, settings.single_table) {
        (OutputKind::Parquet, false) => Some(FramePathTemplate::new(
            cli.output.to_string_lossy().into_owned(),
        )?),
        _ => None,
    };

    eprintln!("{BOLD}SMOG trace converter{BOLD:#}");
    eprintln!(
        "  Loading trace file:     {}",
        format_path_for_display(&cli.tracefile)
    );
    eprintln!(
        "  Output file:            {} ({})",
        format_path_for_display(&cli.output),
        cli.format
    );

    let trace = TraceFile::open(&cli.tracefile, settings.format)?;
    let stats = trace.stats();
    eprintln!(
        "{}",
        status_line(
            PROGRESS_EMOJI,
            PROGRESS,
            &format!(
                "Indexed {} frames ({} VMAs, {} pages, {})",
                stats.frames,
                stats.vmas,
                stats.pages,
                format_size(stats.pages.saturating_mul(settings.page_size))
            ),
        )
    );
    if stats.mismatches > 0 {
        eprintln!(
            "{}",
            status_line(
                WARNING_EMOJI,
                WARNING,
                &format!(
                    "Legacy VMA records with a mismatched page count: {}",
                    stats.mismatches
                ),
            )
        );
    }
    for (i, offset) in trace.index().offsets().iter().enumerate() {
        log::trace!("  #{i}: {offset:#x}");
    }

    let options = PipelineOptions {
        vma_filter: cli.filter_vma.clone(),
        threads: settings.threads,
    };
    let mut pipeline = Pipeline::new(&trace, options);
    if std::io::stderr().is_terminal() {
        pipeline = pipeline.observe(PercentProgress::default());
    }

    let message = match cli.format {
        OutputKind::Png => write_png(&pipeline, &cli.output)?,
        OutputKind::Parquet => write_parquet(&pipeline, &cli.output, template)?,
        OutputKind::Histogram => write_histogram(&pipeline, &cli.output, settings.page_size)?,
    };
    finish_progress();
    eprintln!("{}", status_line(SUCCESS_EMOJI, SUCCESS, &message));
    Ok(())
}

fn create(path: &Path) -> anyhow::Result<BufWriter<File>> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {}", format_path_for_display(path)))?;
    Ok(BufWriter::new(file))
}

fn write_png(pipeline: &Pipeline<'_>, output: &Path) -> anyhow::Result<String> {
    let image = PngImageWriter::new(create(output)?);
    let image = pipeline.run(BitmapSink::new(image))?;
    image
        .into_inner()
        .flush()
        .with_context(|| format!("Failed to write {}", format_path_for_display(output)))?;
    Ok(format!("Wrote {}", format_path_for_display(output)))
}

fn write_parquet(
    pipeline: &Pipeline<'_>,
    output: &Path,
    template: Option<FramePathTemplate>,
) -> anyhow::Result<String> {
    let target = match template {
        None => TableTarget::Shared(Box::new(ParquetTableWriter::new(create(output)?)?)),
        Some(template) => {
            let factory: TableFactory = Box::new(move |timestamp| {
                let path = template.render(timestamp);
                log::debug!("Writing frame table {}", format_path_for_display(&path));
                let writer = ParquetTableWriter::new(create(&path)?)?;
                Ok(Box::new(writer) as Box<dyn TableWriter>)
            });
            TableTarget::PerFrame(factory)
        }
    };

    let summary = pipeline.run(TabularSink::new(target))?;
    Ok(format!(
        "Wrote {} rows to {} parquet {}",
        summary.rows,
        summary.tables,
        if summary.tables == 1 { "file" } else { "files" }
    ))
}

fn write_histogram(pipeline: &Pipeline<'_>, output: &Path, page_size: u64) -> anyhow::Result<String> {
    let report = pipeline.run(HistogramSink::new())?;

    let summary = report.summary();
    eprintln!(
        "  found {} named VMAs with {} ranges and {} pages, sized {}",
        summary.regions,
        summary.ranges,
        summary.pages,
        format_size(summary.pages.saturating_mul(page_size))
    );
    for (name, region) in report.regions() {
        log::info!("{name}");
        for range in region.space().ranges() {
            log::info!(
                "  {range} :: {} pages, {}",
                range.size(),
                format_size(range.size().saturating_mul(page_size))
            );
        }
    }

    let mut out = create(output)?;
    report
        .write_report(page_size, &mut out)
        .with_context(|| format!("Failed to write {}", format_path_for_display(output)))?;
    Ok(format!("Wrote {}", format_path_for_display(output)))
}

/// Redraws a percentage on stderr whenever it grows.
#[derive(Default)]
struct PercentProgress {
    shown: AtomicUsize,
}

impl smog_trace::pipeline::ProgressObserver for PercentProgress {
    fn frames_completed(&self, done: usize, total: usize) {
        let percent = done * 100 / total.max(1);
        if self.shown.fetch_max(percent, Ordering::Relaxed) < percent {
            eprint!("\r{PROGRESS_EMOJI} {HINT}Converting frames: {percent:>3}%{HINT:#}");
        }
    }
}

fn finish_progress() {
    if std::io::stderr().is_terminal() {
        eprintln!();
    }
}
