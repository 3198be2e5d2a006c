mod commands;
mod dates;
mod logging;
mod progress;
mod prompt;

use std::path::Path;
use std::process;

use anyhow::{bail, Context};
use archivist_core::archive::{add_destination_path, ArchiveRouter};
use archivist_core::config::load_configuration;
use archivist_core::storage::{Database, StorageRecord};
use archivist_core::{
    attach_volumes, AppConfig, ConfiguredVolumes, DuplicateQueryEngine, ScanEngine,
    VolumeScanOutcome,
};
use chrono::DateTime;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{AddPatternArgs, ArchiveCommands, Cli, Commands};
use dotenv::dotenv;
use progress::CliReporter;
use prompt::{prompt_confirm, resolve_groups, Resolution};
use tracing::{error, info};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn main() {
    dotenv().ok();

    let _guard = logging::init_logger();

    let mut config = match load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let Some(command) = args.command else {
        let _ = Cli::command().print_long_help();
        return;
    };
    let reporter = CliReporter::new(args.json);
    if let Err(err) = run(command, &config, &reporter) {
        error!("Error: {:#}", err);
        process::exit(1);
    }
}

fn run(command: Commands, config: &AppConfig, reporter: &CliReporter) -> anyhow::Result<()> {
    if let Commands::PrintConfig = command {
        println!("Configuration: {:?}", config);
        return Ok(());
    }

    let db = Database::open(&config.database_path)
        .with_context(|| format!("cannot open database {}", config.database_path))?;
    let supplier = ConfiguredVolumes::new(config.volumes.clone());

    match command {
        Commands::Volumes { show_disabled } => {
            attach_volumes(&db, &supplier)?;
            print_volumes(&db, show_disabled)?;
        }
        Commands::SetScan { volume, enabled } => {
            if !db.set_volume_should_scan(volume, enabled)? {
                bail!("no volume #{}", volume);
            }
            info!(
                "Volume #{} {}",
                volume,
                if enabled { "will be scanned" } else { "excluded from scanning" }
            );
        }
        Commands::Scan { volume } => run_scan(&db, &supplier, volume, reporter)?,
        Commands::List {
            volume,
            selected_volume_only,
            min_instance_count,
            max_instance_count,
        } => {
            let groups = DuplicateQueryEngine::new(&db).list_files(
                volume,
                selected_volume_only,
                min_instance_count,
                max_instance_count,
            )?;
            print_groups(&groups);
        }
        Commands::Search { file_name } => {
            print_groups(&DuplicateQueryEngine::new(&db).search(&file_name)?);
        }
        Commands::Multi {
            volume,
            subdir,
            delete,
        } => {
            let groups =
                DuplicateQueryEngine::new(&db).duplicates_on_volume(volume, subdir.as_deref())?;
            if delete {
                run_interactive_delete(&db, &supplier, volume, groups, reporter)?;
            } else {
                print_groups(&groups);
            }
        }
        Commands::Exclusive { volume } => {
            print_groups(&DuplicateQueryEngine::new(&db).exclusive_to_volume(volume)?);
        }
        Commands::Archive(archive_command) => {
            run_archive_command(&db, &supplier, archive_command, reporter)?
        }
        Commands::PrintConfig => {}
    }
    Ok(())
}

fn run_scan(
    db: &Database,
    supplier: &ConfiguredVolumes,
    volume: Option<i64>,
    reporter: &CliReporter,
) -> anyhow::Result<()> {
    let results = ScanEngine::new(db).scan(supplier, volume, reporter)?;
    if results.is_empty() {
        info!("No matching volume is attached");
    }
    for result in results {
        let label = result.volume.label.bold();
        let elapsed = format!("{:.2}s", result.duration.as_secs_f64());
        match result.outcome {
            VolumeScanOutcome::Scanned(stats) => info!(
                "[{}] {} files in {}: {} unchanged, {} updated, {} skipped, {} discarded",
                label,
                stats.files_checked,
                elapsed.green(),
                stats.unchanged,
                format!("{}", stats.updated).cyan(),
                format!("{}", stats.skipped).yellow(),
                format!("{}", stats.discarded).red(),
            ),
            VolumeScanOutcome::Disabled => info!("[{}] scanning disabled", label),
            VolumeScanOutcome::Failed(reason) => error!("[{}] {}", label, reason.red()),
        }
    }
    Ok(())
}

fn run_interactive_delete(
    db: &Database,
    supplier: &ConfiguredVolumes,
    volume_id: i64,
    groups: Vec<Vec<StorageRecord>>,
    reporter: &CliReporter,
) -> anyhow::Result<()> {
    let attached = attach_volumes(db, supplier)?;
    let Some(volume) = attached.iter().find(|a| a.volume.id == volume_id) else {
        bail!("volume #{} is not attached", volume_id);
    };
    if groups.is_empty() {
        info!("No duplicates on {}", volume.volume.label);
        return Ok(());
    }
    let prompt = format!(
        "{} groups of duplicates on {}. Files you do not keep will be DELETED. Continue?",
        groups.len(),
        volume.volume.label
    );
    if !prompt_confirm(&prompt, Some(false))? {
        return Ok(());
    }
    if let Resolution::Quit = resolve_groups(db, &volume.descriptor.root, groups, reporter)? {
        info!("Stopped by operator");
    }
    Ok(())
}

fn run_archive_command(
    db: &Database,
    supplier: &ConfiguredVolumes,
    command: ArchiveCommands,
    reporter: &CliReporter,
) -> anyhow::Result<()> {
    match command {
        ArchiveCommands::New => {
            let id = db.create_archive()?;
            println!("Created archive #{}", id);
        }
        ArchiveCommands::AddPath { archive, path } => {
            let path = absolute(&path)?;
            add_destination_path(db, supplier, archive, &path)?;
            println!("Archive #{}: added destination {}", archive, path.display());
        }
        ArchiveCommands::AddPattern(AddPatternArgs {
            archive,
            pattern,
            begin,
            end,
        }) => {
            let (begin, end) = dates::day_window(&begin, &end)?;
            db.add_archive_pattern(archive, &pattern, begin, end)?;
            println!(
                "Archive #{}: added pattern {} from {} to {}",
                archive,
                pattern,
                format_timestamp(begin),
                format_timestamp(end)
            );
        }
        ArchiveCommands::List => {
            let volumes = db.list_volumes()?;
            for archive in db.load_archives()? {
                println!("{}", format!("Archive #{}", archive.id).bold());
                for destination in &archive.destinations {
                    let label = volumes
                        .iter()
                        .find(|v| v.id == destination.volume_id)
                        .map_or("?", |v| v.label.as_str());
                    println!("  -> [{}] {}", label, destination.path);
                }
                for pattern in &archive.patterns {
                    println!(
                        "  {} {} .. {}",
                        pattern.pattern.as_str().cyan(),
                        format_timestamp(pattern.begin),
                        format_timestamp(pattern.end)
                    );
                }
            }
        }
        ArchiveCommands::Scan { path } => {
            let path = absolute(&path)?;
            let stats = ArchiveRouter::new(db, reporter).route_path(supplier, &path)?;
            info!(
                "{} files: {} archived, {} kept, {} unmatched, {} ambiguous, {} skipped",
                stats.files,
                format!("{}", stats.archived).green(),
                stats.kept,
                stats.unmatched,
                format!("{}", stats.ambiguous).red(),
                format!("{}", stats.skipped).yellow(),
            );
        }
    }
    Ok(())
}

fn absolute(path: &Path) -> anyhow::Result<std::path::PathBuf> {
    path.canonicalize()
        .with_context(|| format!("cannot resolve {}", path.display()))
}

fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn print_volumes(db: &Database, show_disabled: bool) -> anyhow::Result<()> {
    for volume in db.list_volumes()? {
        if !volume.should_scan && !show_disabled {
            continue;
        }
        let mut flags = Vec::new();
        if volume.dirty {
            flags.push("dirty".red().to_string());
        }
        if !volume.should_scan {
            flags.push("disabled".yellow().to_string());
        }
        println!(
            "#{:<4} {:<24} {:>9.2} / {:>9.2} GiB free  last scan: {}  {}",
            volume.id,
            volume.label.bold(),
            volume.free_space as f64 / GIB,
            volume.total_space as f64 / GIB,
            volume.last_scan.map_or("never".to_string(), format_timestamp),
            flags.join(" ")
        );
    }
    Ok(())
}

fn print_groups(groups: &[Vec<StorageRecord>]) {
    for group in groups {
        if let Some(first) = group.first() {
            println!(
                "{} ({} bytes, {} instances)",
                first.hash.to_hex().dimmed(),
                first.size,
                group.len()
            );
        }
        for record in group {
            println!("  [volume #{}] {}", record.volume_id, record.relative_path());
        }
    }
    info!("{} groups", groups.len());
}
