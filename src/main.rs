use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use rowharvest::{
    run_job, write_table, write_table_file, FetchConfig, Format, HtmlSession, Job, Locator,
    RowLocator, Session,
};

#[derive(Parser)]
#[command(name = "rowharvest", version, about = "Extract the rows of listing pages into tables")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run job files and write their tables
    Run {
        /// Job files (JSON)
        #[arg(required = true)]
        jobs: Vec<PathBuf>,
        /// Output path, overriding the job's (single job only)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Output format: csv, tsv or json
        #[arg(short, long, value_parser = parse_format)]
        format: Option<Format>,
        /// Max rows per job
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Print every skipped row
        #[arg(long)]
        show_skipped: bool,
    },
    /// Print the text of the rows a locator finds on a page
    Inspect {
        url: String,
        /// Element bounding the search (css, or id:/class:/tag:/xpath: prefixed)
        #[arg(short, long, value_parser = parse_locator)]
        section: Option<Locator>,
        /// Row locator
        #[arg(short, long, default_value = "tr", value_parser = parse_locator)]
        rows: Locator,
        /// Max rows to print
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

fn parse_format(raw: &str) -> Result<Format, String> {
    match raw.to_ascii_lowercase().as_str() {
        "csv" => Ok(Format::Csv),
        "tsv" => Ok(Format::Tsv),
        "json" => Ok(Format::Json),
        other => Err(format!("unknown format {other:?} (csv, tsv, json)")),
    }
}

fn parse_locator(raw: &str) -> Result<Locator, String> {
    let locator = match raw.split_once(':') {
        Some(("id", v)) => Locator::id(v),
        Some(("class", v)) => Locator::class(v),
        Some(("tag", v)) => Locator::tag(v),
        Some(("xpath", v)) => Locator::xpath(v),
        _ if raw.starts_with('/') || raw.starts_with("./") => Locator::xpath(raw),
        _ => Locator::css(raw),
    };
    locator.validate()?;
    Ok(locator)
}

fn main() -> anyhow::Result<()> {
    // tables may go to stdout, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            jobs,
            out,
            format,
            limit,
            show_skipped,
        } => {
            if out.is_some() && jobs.len() > 1 {
                bail!("--out needs a single job file");
            }

            let mut failed = 0;
            for path in &jobs {
                if let Err(e) = run_one(path, out.clone(), format, limit, show_skipped) {
                    error!(job = %path.display(), "{e:#}");
                    failed += 1;
                }
            }

            eprintln!(
                "{} of {} jobs succeeded in {:.1}s",
                jobs.len() - failed,
                jobs.len(),
                t0.elapsed().as_secs_f64()
            );
            if failed > 0 {
                bail!("{failed} job(s) failed");
            }
            Ok(())
        }
        Commands::Inspect {
            url,
            section,
            rows,
            limit,
        } => inspect(&url, section.as_ref(), rows, limit),
    }
}

fn run_one(
    path: &Path,
    out: Option<PathBuf>,
    format: Option<Format>,
    limit: Option<usize>,
    show_skipped: bool,
) -> anyhow::Result<()> {
    let job = Job::load(path)?;
    let mut session = HtmlSession::http(&job.fetch);
    let result = run_job(&mut session, &job, limit)?;

    if !result.diagnostics.is_empty() {
        warn!(
            job = %job.label(),
            skipped = result.diagnostics.len(),
            "rows did not match the schema"
        );
    }
    if show_skipped {
        for diagnostic in &result.diagnostics {
            eprintln!("  {diagnostic}");
        }
    }

    let (target, configured) = match out {
        Some(path) => {
            let guessed = Format::from_path(&path);
            (Some(path), guessed)
        }
        None => (
            job.output.as_ref().map(|o| o.path.clone()),
            job.output.as_ref().map(|o| o.format()),
        ),
    };
    let format = format.or(configured).unwrap_or_default();

    match target {
        Some(target) => write_table_file(&target, &result.table, format)
            .with_context(|| format!("writing {}", target.display()))?,
        None => {
            let stdout = std::io::stdout();
            write_table(stdout.lock(), &result.table, format)?;
        }
    }

    eprintln!(
        "{}: {} records, {} skipped, {} enriched ({} defaulted)",
        job.label(),
        result.table.len(),
        result.diagnostics.len(),
        result.enriched,
        result.enrichment_failures
    );
    Ok(())
}

fn inspect(url: &str, section: Option<&Locator>, rows: Locator, limit: usize) -> anyhow::Result<()> {
    let mut session = HtmlSession::http(&FetchConfig::default());
    session.navigate(url)?;

    let scope = match section {
        Some(locator) => Some(
            session
                .locate_one(None, locator)?
                .with_context(|| format!("section not found: {locator}"))?,
        ),
        None => None,
    };
    let found = RowLocator::new(rows).locate(&session, scope.as_ref())?;

    let mut stdout = std::io::stdout().lock();
    for (i, row) in found.iter().take(limit).enumerate() {
        let text = session.read_text(row)?;
        writeln!(stdout, "--- row {i} ---")?;
        writeln!(stdout, "{text}")?;
    }
    writeln!(stdout, "\n{} rows located", found.len())?;
    Ok(())
}
