use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

use trackrs::config::AppConfig;
use trackrs::database::{ActivityStore, Database};
use trackrs::export::{self, text::summary_card, ExportFormat};
use trackrs::formatters;
use trackrs::import::{replay::ReplayProvider, ImportManager};
use trackrs::logging::{init_logging, LogLevel};
use trackrs::session::ManualClock;
use trackrs::tracker::{ActivityTracker, TrackerEvent};
use trackrs::{Activity, StoredActivity, TrackRsError};

/// TrackRS - GPS Activity Tracking CLI
///
/// Records activities by replaying GPX or CSV tracks through a live session,
/// keeps them in a local SQLite history and renders share cards.
#[derive(Parser)]
#[command(name = "trackrs")]
#[command(author = "TrackRS Contributors")]
#[command(version)]
#[command(about = "GPS Activity Tracking CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record an activity by replaying a GPX or CSV track
    Replay {
        /// Track file (GPX, CSV)
        file: PathBuf,

        /// Playback speed relative to the recording
        #[arg(short, long, default_value = "60")]
        speed: f64,
    },

    /// Save an activity kept in a file after a failed save
    Restore {
        /// Unsaved activity file (JSON)
        file: PathBuf,
    },

    /// List recorded activities, most recent first
    History {
        /// Number of activities to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show the share card of a recorded activity
    Show {
        /// Activity id
        id: String,
    },

    /// Export a recorded activity
    Export {
        /// Activity id
        id: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (json, text, csv); taken from the extension if omitted
        #[arg(short = 'f', long)]
        format: Option<String>,
    },

    /// Configure application settings
    Config {
        /// List all configuration options
        #[arg(short, long)]
        list: bool,

        /// Set a configuration value (key=value)
        #[arg(short, long)]
        set: Option<String>,

        /// Get a configuration value
        #[arg(short, long)]
        get: Option<String>,
    },
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Date")]
    date: String,
    #[tabled(rename = "Distance")]
    distance: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Pace /km")]
    pace: String,
    #[tabled(rename = "Calories")]
    calories: String,
    #[tabled(rename = "Avg HR")]
    heart_rate: String,
}

impl From<&StoredActivity> for HistoryRow {
    fn from(stored: &StoredActivity) -> Self {
        let activity = &stored.activity;
        Self {
            id: stored.id.chars().take(8).collect(),
            date: format_date(activity.start_time),
            distance: formatters::format_distance(activity.distance_meters),
            duration: formatters::format_duration(activity.duration_ms),
            pace: activity.pace_string.clone(),
            calories: formatters::format_calories(f64::from(activity.calories_kcal)),
            heart_rate: formatters::format_heart_rate(activity.average_heart_rate_bpm),
        }
    }
}

fn format_date(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(cli.config.as_deref());
    if cli.verbose > 0 {
        config.logging.level = LogLevel::from_verbosity(cli.verbose);
    }
    init_logging(&config.logging)?;

    match cli.command {
        Commands::Replay { file, speed } => replay(&config, &file, speed).await,
        Commands::Restore { file } => restore(&config, &file),
        Commands::History { limit } => history(&config, limit),
        Commands::Show { id } => show(&config, &id),
        Commands::Export { id, output, format } => {
            export_activity(&config, &id, &output, format.as_deref())
        }
        Commands::Config { list, set, get } => {
            let path = cli.config.unwrap_or_else(AppConfig::default_config_path);
            configure(&mut config, &path, list, set, get)
        }
    }
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let path = config.database_path();
    Database::new(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Timer period shortened by the playback speed
fn scaled_interval(interval_ms: u64, speed: f64) -> u64 {
    (interval_ms as f64 / speed).round().max(1.0) as u64
}

async fn replay(config: &AppConfig, file: &Path, speed: f64) -> Result<()> {
    if !(speed.is_finite() && speed > 0.0) {
        anyhow::bail!("Playback speed must be a positive number, got {}", speed);
    }

    let track = ImportManager::new()
        .import_track(file)
        .map_err(TrackRsError::from)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let clock = ManualClock::new(Utc::now().timestamp_millis());
    let provider = ReplayProvider::new(track, speed).with_clock(clock.clone());
    if let Some(start) = provider.start_time() {
        clock.set(start);
    }

    println!("{}", "Replaying track...".green().bold());
    println!("  File: {}", file.display());
    println!("  Points: {}", provider.len());
    println!("  Speed: {}x", speed);

    let mut session_config = config.clone();
    session_config.tracking.tick_interval_ms =
        scaled_interval(config.tracking.tick_interval_ms, speed);
    session_config.tracking.heart_rate_interval_ms =
        scaled_interval(config.tracking.heart_rate_interval_ms, speed);

    let db = open_database(config)?;
    let mut tracker = ActivityTracker::new(provider, db, Arc::new(clock), &session_config);
    tracker
        .start()
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let mut admitted = 0usize;
    let mut rejected = 0usize;
    let mut kilometers = 0u64;
    while let Some(event) = tracker.next_event().await {
        match event {
            TrackerEvent::Sample { outcome, .. } => {
                if outcome.is_admitted() {
                    admitted += 1;
                } else {
                    rejected += 1;
                }
            }
            TrackerEvent::Tick(metrics) => {
                let km = (metrics.distance_meters / 1000.0).floor() as u64;
                if km > kilometers {
                    kilometers = km;
                    println!(
                        "  {} {}  {}  pace {}",
                        "▸".cyan(),
                        formatters::format_distance(metrics.distance_meters),
                        formatters::format_duration(metrics.elapsed_ms),
                        formatters::format_optional_pace(metrics.current_pace_sec_per_km),
                    );
                }
            }
            TrackerEvent::HeartRate(_) => {}
            TrackerEvent::LocationClosed => break,
        }
    }

    println!(
        "  Samples: {} admitted, {} filtered",
        admitted.to_string().green(),
        rejected.to_string().yellow()
    );

    let finished = match tracker.stop() {
        Ok(finished) => finished,
        Err(err @ TrackRsError::Persistence(_)) => {
            eprintln!("{} {}", "⚠".yellow(), err.user_message());
            match tracker.retry_save() {
                Ok(ids) => {
                    for id in ids {
                        println!("{} Saved activity {}", "✓".green(), id);
                    }
                    return Ok(());
                }
                Err(retry_err) => {
                    for path in write_unsaved(config, tracker.pending_activities())? {
                        println!(
                            "{} Activity kept in {}, save it later with `trackrs restore`",
                            "⚠".yellow(),
                            path.display()
                        );
                    }
                    anyhow::bail!("Activity not saved: {}", retry_err);
                }
            }
        }
        Err(err) => return Err(err.into()),
    };

    println!();
    print!("{}", summary_card(&finished.activity));
    match finished.id {
        Some(id) => println!("{} Saved activity {}", "✓".green(), id.bold()),
        None => println!("{}", "No usable GPS points, activity not saved".yellow()),
    }
    Ok(())
}

/// Write activities that could not be saved next to the database
fn write_unsaved(config: &AppConfig, activities: &[Activity]) -> Result<Vec<PathBuf>> {
    let dir = &config.settings.data_dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create data directory {}", dir.display()))?;

    let mut paths = Vec::with_capacity(activities.len());
    for activity in activities {
        let path = dir.join(format!("unsaved-{}.json", activity.start_time));
        export::json::export_json(activity, &path)?;
        paths.push(path);
    }
    Ok(paths)
}

/// Save an activity previously written by [`write_unsaved`] and remove the file
fn restore(config: &AppConfig, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let activity: Activity = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a saved activity", file.display()))?;

    let mut db = open_database(config)?;
    let id = db
        .save_activity(&activity)
        .map_err(|e| anyhow::anyhow!(TrackRsError::from(e).user_message()))?;
    std::fs::remove_file(file)
        .with_context(|| format!("Saved as {} but failed to remove {}", id, file.display()))?;

    println!("{} Saved activity {}", "✓".green(), id.bold());
    Ok(())
}

fn history(config: &AppConfig, limit: usize) -> Result<()> {
    let db = open_database(config)?;
    let activities = db.list_activities(Some(limit))?;

    if activities.is_empty() {
        println!("{}", "No activities recorded yet".yellow());
        return Ok(());
    }

    let rows: Vec<HistoryRow> = activities.iter().map(HistoryRow::from).collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    let stats = db.get_stats()?;
    println!(
        "{} activities, {} in {}",
        stats.activity_count.to_string().bold(),
        formatters::format_distance(stats.total_distance_meters),
        formatters::format_duration(stats.total_duration_ms)
    );
    Ok(())
}

/// Find an activity by full id or unique id prefix
fn find_activity(db: &Database, id: &str) -> Result<StoredActivity> {
    if let Some(stored) = db.get_activity(id)? {
        return Ok(stored);
    }

    let mut matches: Vec<StoredActivity> = db
        .list_activities(None)?
        .into_iter()
        .filter(|a| a.id.starts_with(id))
        .collect();
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(TrackRsError::from(trackrs::DatabaseError::NotFound(id.to_string())).into()),
        n => anyhow::bail!("Id prefix {} matches {} activities", id, n),
    }
}

fn show(config: &AppConfig, id: &str) -> Result<()> {
    let db = open_database(config)?;
    let stored = find_activity(&db, id)?;
    println!("{} {}", "Activity".bold(), stored.id);
    print!("{}", summary_card(&stored.activity));
    Ok(())
}

fn export_activity(config: &AppConfig, id: &str, output: &Path, format: Option<&str>) -> Result<()> {
    let format = match format {
        Some(name) => name.parse::<ExportFormat>()?,
        None => ExportFormat::from_path(output)?,
    };

    let db = open_database(config)?;
    let stored = find_activity(&db, id)?;
    export::export_activity(&stored, format, output)?;

    println!(
        "{} Exported {} as {:?} to {}",
        "✓".green(),
        stored.id,
        format,
        output.display()
    );
    Ok(())
}

fn configure(
    config: &mut AppConfig,
    path: &Path,
    list: bool,
    set: Option<String>,
    get: Option<String>,
) -> Result<()> {
    if list {
        println!("{}", format!("Configuration ({})", path.display()).blue().bold());
        for (key, value) in config.list()? {
            println!("  {} = {}", key.cyan(), value);
        }
    }

    if let Some(key) = get {
        println!("{}", config.get(&key)?);
    }

    if let Some(assignment) = set {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Expected key=value, got {}", assignment))?;
        config.set(key.trim(), value.trim())?;
        config.save_to_file(path)?;
        println!("{} {} = {}", "✓".green(), key.trim(), value.trim());
    }

    Ok(())
}
