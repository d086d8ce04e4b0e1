use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use svcmap_core::{decode_from_slice, Dump, Entity, ServiceMap, ToolConfig};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

const PAYLOAD_EXTENSION: &str = "bin";

#[derive(Parser, Debug)]
#[command(name = "svcmap")]
#[command(about = "Service map encoding and status tool", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write encoded sample instances of every entity
    Samples {
        /// Output directory (defaults to sample_dir from the config)
        #[arg(short, long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Decode and re-encode every stored payload under a directory
    Check {
        /// Corpus directory (defaults to sample_dir from the config)
        dir: Option<PathBuf>,
    },
    /// Print the structured dump of an encoded service map
    Dump { file: PathBuf },
    /// Print service summaries, task status and metadata counts
    Status { file: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match svcmap_core::config::load_config(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };
    debug!("Address format: {:?}", config.address_format);

    match args.command {
        Command::Samples { out } => {
            let dir = out.unwrap_or_else(|| config.sample_dir.clone());
            let written = write_samples(&dir, &config)?;
            info!("Wrote {} sample payloads to {}", written, dir.display());
        }
        Command::Check { dir } => {
            let dir = dir.unwrap_or_else(|| config.sample_dir.clone());
            let report = check_corpus(&dir, &config)?;
            info!("Checked {} payloads, {} failed", report.checked, report.failed);
            if report.failed > 0 {
                anyhow::bail!("{} payloads failed the round-trip check", report.failed);
            }
        }
        Command::Dump { file } => {
            let map = read_service_map(&file)?;
            println!("{}", serde_json::to_string_pretty(&map.dump())?);
        }
        Command::Status { file } => {
            let map = read_service_map(&file)?;
            print!("{}", render_status(&map, &config));
        }
    }

    Ok(())
}

/// Writes `<dir>/<Entity>/<n>.bin` for every sample instance.
fn write_samples(dir: &Path, config: &ToolConfig) -> Result<usize> {
    let mut written = 0;
    for entity in Entity::ALL {
        let entity_dir = dir.join(entity.name());
        std::fs::create_dir_all(&entity_dir)
            .with_context(|| format!("Failed to create {}", entity_dir.display()))?;

        for (n, bytes) in entity.encoded_samples(config.features()).iter().enumerate() {
            let path = entity_dir.join(format!("{n}.{PAYLOAD_EXTENSION}"));
            std::fs::write(&path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            debug!("Wrote {}", path.display());
            written += 1;
        }
    }
    Ok(written)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct CheckReport {
    checked: usize,
    failed: usize,
}

/// Walks `<dir>/<Entity>/*.bin`; the parent directory names the entity.
fn check_corpus(dir: &Path, config: &ToolConfig) -> Result<CheckReport> {
    if !dir.is_dir() {
        anyhow::bail!("Corpus directory does not exist: {}", dir.display());
    }

    let mut report = CheckReport::default();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(PAYLOAD_EXTENSION)
        {
            continue;
        }

        let Some(entity) = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .and_then(|n| n.parse::<Entity>().ok())
        else {
            warn!("Skipping payload outside an entity directory: {}", path.display());
            continue;
        };

        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        report.checked += 1;
        match entity.check(&bytes, config.features()) {
            Ok(()) => debug!("{} ok ({})", path.display(), entity),
            Err(e) => {
                error!("{}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

fn read_service_map(path: &Path) -> Result<ServiceMap> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    decode_from_slice(&bytes).with_context(|| format!("Failed to decode {}", path.display()))
}

fn render_status(map: &ServiceMap, config: &ToolConfig) -> String {
    let mut out = format!("epoch {} (modified {})\n", map.epoch, map.modified);
    for (name, service) in &map.services {
        out.push_str(&format!("  {}: {}\n", name, service.get_summary()));
    }

    // Task ids are qualified by service name so equal daemon names in
    // different services stay distinct.
    let tasks: String = map
        .services
        .iter()
        .filter(|(_, service)| service.has_running_tasks())
        .map(|(name, service)| service.get_task_summary(name))
        .collect();
    if !tasks.is_empty() {
        out.push_str("\n  task status:");
        out.push_str(&tasks);
        out.push('\n');
    }

    let counts = map.count_metadata(&config.count_field);
    if !counts.is_empty() {
        out.push_str(&format!("\n  {}:\n", config.count_field));
        for (value, count) in &counts {
            out.push_str(&format!("    {}: {}\n", value, count));
        }
    }
    out
}
