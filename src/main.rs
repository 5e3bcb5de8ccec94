use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use smartscreen::*;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "smartscreen-settings.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the saved settings and schedules
    Show,
    /// Change settings and commit them
    Save {
        /// Let schedules drive the brightness
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        /// Stop schedules from driving the brightness
        #[arg(long)]
        disable: bool,
        /// Seconds between periodic refreshes
        #[arg(short, long)]
        interval: Option<u64>,
        /// Change based on time of day
        #[arg(long)]
        time_of_day: Option<bool>,
        /// Replace the schedules (HH:MM-HH:MM=PERCENT, repeatable, at most 5)
        #[arg(long = "schedule", value_parser = parse_schedule)]
        schedules: Vec<Schedule>,
        /// Remove all schedules
        #[arg(long, conflicts_with = "schedules")]
        clear: bool,
    },
    /// Set brightness now
    Set {
        /// Brightness level (0-100)
        #[arg(short, long, default_value_t = 100)]
        level: u8,
    },
    /// Run a session until interrupted
    Run,
    /// Print a generated identifier
    Uuid,
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("smartscreen=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let store = SettingsStore::new(FileStore::open(&cli.store));
    let executor = Arc::new(LocalExecutor::new());
    let mut controller = ScheduleSyncController::new(store, executor.clone());

    match cli.command.unwrap_or(Commands::Show) {
        Commands::Show => show(&controller),
        Commands::Save {
            enable,
            disable,
            interval,
            time_of_day,
            schedules,
            clear,
        } => {
            if enable {
                controller.set_schedule_enabled(true);
            }
            if disable {
                controller.set_schedule_enabled(false);
            }
            if let Some(interval) = interval {
                controller.set_refresh_interval(interval);
            }
            if let Some(time_of_day) = time_of_day {
                controller.set_change_based_on_time_of_day(time_of_day);
            }
            if clear || !schedules.is_empty() {
                controller.clear_schedules();
            }
            for schedule in schedules {
                let index = controller.add_schedule()?;
                controller.set_schedule_brightness(index, schedule.brightness)?;
                if let Err(e) = controller.edit_schedule(index, schedule.from, schedule.to) {
                    warn!("{}", e);
                }
            }

            if let Err(e) = controller.save_all_settings().await {
                error!("Settings not saved: {}", e);
                return Err(e).wrap_err("Could not save settings");
            }
            info!("All settings have been successfully saved");
            show(&controller);
        }
        Commands::Set { level } => {
            let message = executor
                .set_brightness(level)
                .await?
                .into_result()
                .wrap_err("Could not set brightness")?;
            info!("{}", message);
        }
        Commands::Run => run(&mut controller, &executor).await?,
        Commands::Uuid => println!("{}", controller.uuid().await?),
    }

    Ok(())
}

/// Parse `HH:MM-HH:MM=PERCENT` into a schedule for today (UTC)
fn parse_schedule(s: &str) -> std::result::Result<Schedule, String> {
    let (range, brightness) = s
        .split_once('=')
        .ok_or_else(|| format!("expected HH:MM-HH:MM=PERCENT, got '{}'", s))?;
    let (from, to) = range
        .split_once('-')
        .ok_or_else(|| format!("expected a time range, got '{}'", range))?;
    let brightness: u8 = brightness
        .trim()
        .parse()
        .map_err(|e| format!("invalid brightness '{}': {}", brightness, e))?;
    if brightness > 100 {
        return Err("brightness must be between 0 and 100".to_owned());
    }

    let today = Utc::now().date_naive();
    let time = |t: &str| {
        NaiveTime::parse_from_str(t.trim(), "%H:%M")
            .map(|time| today.and_time(time).and_utc())
            .map_err(|e| format!("invalid time '{}': {}", t, e))
    };
    Ok(Schedule::new(time(from)?, time(to)?, brightness))
}

fn show(controller: &ScheduleSyncController) {
    let config = controller.config();
    println!(
        "scheduling: {}",
        if config.schedule_enabled { "enabled" } else { "disabled" }
    );
    println!("refresh interval: {}s", config.refresh_interval);
    println!("change based on time of day: {}", config.change_based_on_time_of_day);
    if controller.schedules().is_empty() {
        println!("no schedules");
    }
    for (index, schedule) in controller.schedules().iter().enumerate() {
        let fmt = |ts: Option<chrono::DateTime<Utc>>| {
            ts.map(|ts| ts.format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_owned())
        };
        println!(
            "  [{}] {} - {}  {}%",
            index,
            fmt(schedule.from),
            fmt(schedule.to),
            schedule.brightness
        );
    }
}

/// Start a session and log brightness changes until Ctrl-C or close
#[instrument(skip_all)]
async fn run(controller: &mut ScheduleSyncController, executor: &LocalExecutor) -> Result<()> {
    let mut live = controller.live_brightness();
    controller.start_session().await;
    info!(
        "Session started (slider {})",
        if controller.slider_locked() { "locked" } else { "free" }
    );

    loop {
        tokio::select! {
            changed = live.changed() => {
                if changed.is_err() {
                    break;
                }
                info!("Brightness is {}%", *live.borrow_and_update());
            }
            _ = executor.closed() => {
                info!("Close requested");
                break;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| eyre!("Could not listen for Ctrl-C: {}", e))?;
                info!("Interrupted");
                break;
            }
        }
    }

    controller.shutdown();
    Ok(())
}
