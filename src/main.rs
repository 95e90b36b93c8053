//! Label Fixture Studio - fixture builder for a label classifier
//!
//! Replays recorded sessions through reconciliation, correlation and review,
//! and exports them into a shareable fixture archive.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use label_fixture_studio::config::{self, AppConfig};
use label_fixture_studio::fixture::{self, open_archive, WriteOutcome};
use label_fixture_studio::session::SessionRecord;
use label_fixture_studio::storage;
use label_fixture_studio::vision::compare_image_data;
use label_fixture_studio::SessionController;

const PASS_TIMEOUT: Duration = Duration::from_secs(120);
const EXPORT_TIMEOUT: Duration = Duration::from_secs(600);

/// Label Fixture Studio - build regression fixtures for a label classifier
#[derive(Parser, Debug)]
#[command(name = "label-fixture-studio")]
#[command(about = "Reconcile, review and export label recognition fixtures")]
struct Args {
    /// Configuration file (defaults to config.toml in the config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare two images within a tolerance
    Compare {
        expected: PathBuf,
        observed: PathBuf,
        /// Percentage of pixels allowed to differ
        #[arg(short, long, default_value = "0")]
        tolerance: f32,
    },
    /// Replay a recorded session and append it to the fixture archive
    Export {
        record: PathBuf,
        /// Archive to append to
        #[arg(short, long)]
        archive: Option<PathBuf>,
    },
    /// List the entries of a fixture archive
    List {
        #[arg(short, long)]
        archive: Option<PathBuf>,
    },
    /// Replay a recorded session and print regions, observations and rows
    Inspect { record: PathBuf },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_or_create_config(args.config.as_deref());

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Compare {
            expected,
            observed,
            tolerance,
        } => run_compare(&expected, &observed, tolerance),
        Command::Export { record, archive } => run_export(config, &record, archive),
        Command::List { archive } => run_list(&config, archive),
        Command::Inspect { record } => run_inspect(config, &record),
    }
}

/// Load configuration from file or create default
fn load_or_create_config(path: Option<&Path>) -> AppConfig {
    let config_path = match path {
        Some(path) => Some(path.to_path_buf()),
        None => storage::get_config_dir().ok().map(|dir| dir.join("config.toml")),
    };
    if let Some(config_path) = config_path {
        if config_path.exists() {
            match config::load_config(&config_path) {
                Ok(config) => return config,
                Err(e) => eprintln!("Ignoring invalid configuration {:?}: {:#}", config_path, e),
            }
        }
    }
    AppConfig::default()
}

fn run_compare(expected: &Path, observed: &Path, tolerance: f32) -> Result<()> {
    let expected_data =
        std::fs::read(expected).with_context(|| format!("Failed to read {:?}", expected))?;
    let observed_data =
        std::fs::read(observed).with_context(|| format!("Failed to read {:?}", observed))?;

    let equal = compare_image_data(tolerance, &expected_data, &observed_data)?;
    println!("{}", if equal { "equal" } else { "different" });
    Ok(())
}

/// Run a recorded session through the controller and apply its review
fn replay(config: AppConfig, record: &SessionRecord) -> Result<SessionController> {
    let mut controller = SessionController::new(
        config,
        Arc::new(record.detector()),
        Arc::new(record.classifier()),
    );
    controller.pick_image(record.read_image()?, record.content_size)?;
    controller.wait_for_completion(PASS_TIMEOUT)?;

    {
        let state = controller.state();
        let mut state = state.write();
        record.apply_review(&mut state.session)?;
    }
    Ok(controller)
}

fn run_export(config: AppConfig, record_path: &Path, archive: Option<PathBuf>) -> Result<()> {
    let archive_path = match archive {
        Some(path) => path,
        None => storage::default_archive_path(&config)?,
    };
    let record = SessionRecord::load(record_path)?;
    let mut controller = replay(config, &record)?;

    controller.export_in_background(archive_path.clone())?;
    match controller.wait_for_export(EXPORT_TIMEOUT)? {
        WriteOutcome::Written { entry_id } => {
            println!("Added entry {} to {}", entry_id, archive_path.display())
        }
        WriteOutcome::Duplicate { existing_entry_id } => println!(
            "Image already present as entry {}; nothing added",
            existing_entry_id
        ),
    }
    Ok(())
}

fn run_list(config: &AppConfig, archive: Option<PathBuf>) -> Result<()> {
    let archive_path = match archive {
        Some(path) => path,
        None => storage::default_archive_path(config)?,
    };
    if !archive_path.exists() {
        println!("No archive at {}", archive_path.display());
        return Ok(());
    }

    let unpacked = open_archive(&archive_path)?;
    let entries = unpacked.corpus().read_entries()?;
    info!("Read {} entries from {}", entries.len(), archive_path.display());

    for stored in entries {
        let passes: Vec<_> = stored
            .entry
            .fragments_by_pass
            .iter()
            .map(|(pass, fragments)| format!("{}: {}", pass.display_name(), fragments.len()))
            .collect();
        println!(
            "{}  {} rows  [{}]",
            stored.id,
            stored.entry.rows.len(),
            passes.join(", ")
        );
    }
    Ok(())
}

fn run_inspect(config: AppConfig, record_path: &Path) -> Result<()> {
    let record = SessionRecord::load(record_path)?;
    let controller = replay(config, &record)?;
    let state = controller.state();
    let state = state.read();
    let session = &state.session;

    println!("Regions ({}):", session.regions().len());
    for region in session.regions().iter() {
        println!(
            "  {:<24} {:<24} {:<10} agreement {:.2}",
            region.title(),
            region.region_type(),
            region.status,
            region.variant_agreement()
        );
    }

    println!("Observations ({}):", session.observations().len());
    for observation in session.observations() {
        println!(
            "  {:<32} {:<20} {}",
            observation.attribute.description(),
            observation.value,
            observation.status
        );
    }

    println!("Expectations ({}):", session.expectations.len());
    for expectation in session.expectations.iter() {
        println!("  {}", expectation.description());
    }

    println!("Overall status: {}", session.overall_status());

    let entry = fixture::FixtureEntry::from_session(session)
        .context("Session has no image")?;
    let mut table = Vec::new();
    fixture::write_rows(&mut table, &entry.rows)?;
    println!("Rows:\n{}", String::from_utf8_lossy(&table));
    Ok(())
}
