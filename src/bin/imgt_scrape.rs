use std::process::ExitCode;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use imgt_scrape::app::App;
use imgt_scrape::config::ConfigLoader;
use imgt_scrape::domain::RawRequest;
use imgt_scrape::error::ScrapeError;
use imgt_scrape::imgt::ImgtHttpClient;
use imgt_scrape::output::{HumanOutput, JsonOutput, OutputMode, TracingSink};

#[derive(Parser)]
#[command(name = "imgt-scrape")]
#[command(about = "Scrape IMGT for TCR and IG segment sequences of a given species.")]
#[command(version, author)]
struct Cli {
    /// Name of the species to scrape for (e.g. "Homo sapiens")
    #[arg(short = 'S', long)]
    species: String,

    /// TCR (T-cell receptor) or IG (Immunoglobulin)
    #[arg(short = 'T', long = "type")]
    sequence_type: String,

    /// Output directory where the segment files are saved
    #[arg(short = 'O', long)]
    output: Option<String>,

    /// ORF frame analysis: "all" (F+ORF+all P), "in-frame" (F+ORF+in-frame P)
    /// or "in-frame-gaps" (F+ORF+in-frame P with IMGT gaps)
    #[arg(short = 'f', long)]
    frame_selection: Option<String>,

    /// Concatenate the segment files into one library
    #[arg(long)]
    create_library: bool,

    /// Delete the segment files after processing
    #[arg(long)]
    cleanup: bool,

    /// Download again even if segment files or the library already exist
    #[arg(long)]
    force: bool,

    /// JSON settings file (defaults to ./imgt-scrape.json when present)
    #[arg(long)]
    config: Option<String>,

    /// Pause between IMGT requests, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<ScrapeError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &ScrapeError) -> u8 {
    if error.is_configuration() {
        return 2;
    }
    match error {
        ScrapeError::ListingUnavailable { .. }
        | ScrapeError::Http { .. }
        | ScrapeError::Status { .. } => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let cwd = std::env::current_dir()
        .map_err(|err| ScrapeError::Filesystem(err.to_string()))
        .and_then(|cwd| {
            Utf8PathBuf::from_path_buf(cwd)
                .map_err(|_| ScrapeError::Filesystem("non-utf8 working directory".to_string()))
        })?;

    let mut settings = ConfigLoader::resolve(cli.config.as_deref(), &cwd)?;
    if let Some(delay_ms) = cli.delay_ms {
        settings.request_delay = Duration::from_millis(delay_ms);
    }

    let raw = RawRequest {
        species: cli.species,
        sequence_type: cli.sequence_type,
        output: cli.output,
        frame_selection: cli.frame_selection,
        create_library: cli.create_library,
        cleanup: cli.cleanup,
        force: cli.force,
    };

    let client = ImgtHttpClient::new(&settings)?;
    let app = App::new(client, settings);
    let report = app.run(&raw, &cwd, &TracingSink)?;
    if report.has_warnings() {
        tracing::warn!("finished with warnings, see the summary below");
    }

    match output_mode {
        OutputMode::Json => JsonOutput::print_report(&report).into_diagnostic()?,
        OutputMode::Human => HumanOutput::print_report(&report).into_diagnostic()?,
    }
    Ok(())
}
