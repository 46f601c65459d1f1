//! rf-draw - Lucky Draw Reveal
//!
//! Usage:
//!   rf-draw run  [--config show.yaml] [--pool 1,2,3] [--seed 42]   - Draw and reveal
//!   rf-draw plan [--config show.yaml] [--seed 42]                  - Print the digit schedule

mod render;
mod show;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rf_odometer::{
    CascadeController, CascadeDriver, CuePreferences, CueSubscriber, Direction, TimingProfile,
    digits,
};

use crate::render::{OutputMode, Renderer, TerminalCues};
use crate::show::{ShowConfig, draw_target};

/// Slack on top of the run's ceiling before giving up on completion
const COMPLETION_SLACK: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "rf-draw", about = "Lucky draw with a digit-cascade reveal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Draw a winner and reveal it
    Run {
        #[command(flatten)]
        show: ShowArgs,

        /// Reveal this number instead of drawing one
        #[arg(long, conflicts_with = "pool")]
        target: Option<u64>,

        /// Ticket numbers to draw from
        #[arg(long, value_delimiter = ',')]
        pool: Vec<u64>,

        /// Number shown before the reveal starts
        #[arg(long, default_value_t = 0)]
        start: u64,

        /// Print JSON lines instead of redrawing frames
        #[arg(long)]
        json: bool,

        /// Disable sound cues
        #[arg(long)]
        mute: bool,
    },
    /// Print the per-digit schedule without running it
    Plan {
        #[command(flatten)]
        show: ShowArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Show settings; flags override the config file
#[derive(Args)]
struct ShowArgs {
    /// Show config (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Display width
    #[arg(long)]
    digits: Option<usize>,

    /// How many digits animate
    #[arg(long)]
    animate: Option<usize>,

    #[arg(long, value_enum)]
    direction: Option<DirectionArg>,

    #[arg(long, value_enum)]
    profile: Option<ProfileArg>,

    /// Seed for the draw and the animation
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Msb,
    Lsb,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProfileArg {
    Normal,
    Turbo,
    Studio,
}

impl ShowArgs {
    fn resolve(&self) -> Result<ShowConfig> {
        let mut show = match &self.config {
            Some(path) => ShowConfig::load(path)?,
            None => ShowConfig::default(),
        };
        if let Some(digits) = self.digits {
            show.digits = digits;
        }
        if let Some(active) = self.animate {
            show.animate_digits = Some(active);
        }
        if let Some(direction) = self.direction {
            show.direction = match direction {
                DirectionArg::Msb => Direction::MsbFirst,
                DirectionArg::Lsb => Direction::LsbFirst,
            };
        }
        if let Some(profile) = self.profile {
            show.profile = match profile {
                ProfileArg::Normal => TimingProfile::Normal,
                ProfileArg::Turbo => TimingProfile::Turbo,
                ProfileArg::Studio => TimingProfile::Studio,
            };
        }
        Ok(show)
    }

    fn seed(&self) -> u64 {
        self.seed.unwrap_or_else(rand::random)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            show,
            target,
            pool,
            start,
            json,
            mute,
        } => run(&show, target, &pool, start, json, mute),
        Commands::Plan { show, json } => plan(&show, json),
    }
}

fn run(
    args: &ShowArgs,
    target: Option<u64>,
    pool: &[u64],
    start: u64,
    json: bool,
    mute: bool,
) -> Result<()> {
    let show = args.resolve()?;
    let seed = args.seed();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let target = match target {
        Some(target) => target,
        None => draw_target(pool, show.digits, &mut rng)?,
    };
    log::info!(
        "Drawing {} ({} digits, seed {})",
        digits::pad(target, show.digits),
        show.digits,
        seed
    );

    let mode = if json {
        OutputMode::JsonLines
    } else {
        OutputMode::Frames
    };
    let prefs = if mute {
        CuePreferences::muted()
    } else {
        show.sound
    };

    let driver = CascadeDriver::spawn(CascadeController::new(show.timing()))
        .context("Failed to spawn cascade driver")?;

    let subscriber = CueSubscriber::new(
        Renderer::new(io::stdout(), mode, show.digits),
        TerminalCues::new(mode),
        prefs,
    );
    let handle = driver
        .start(show.request(start, target, Some(seed)), Box::new(subscriber))
        .context("Cascade rejected")?;

    let budget = Duration::from_millis(handle.deadline_ms() - handle.started_at_ms());
    if !driver.wait_idle(budget + COMPLETION_SLACK) {
        driver.cancel(handle);
        bail!("{} did not complete within {:?}", handle.run_id(), budget);
    }

    let stats = driver.stats();
    if stats.subscriber_faults > 0 {
        log::warn!("{} output callbacks failed", stats.subscriber_faults);
    }
    driver.shutdown();
    Ok(())
}

fn plan(args: &ShowArgs, json: bool) -> Result<()> {
    let show = args.resolve()?;
    let seed = args.seed();
    let controller = CascadeController::new(show.timing());

    // Values don't affect pacing; any representable pair will do
    let request = show.request(0, 1, Some(seed));
    let schedule = controller.plan(&request).context("Invalid show settings")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&schedule).context("Failed to serialize schedule")?
        );
        return Ok(());
    }

    println!("Schedule (seed {}, {:?}, {:?})", seed, show.profile, show.direction);
    println!("  pos  rank  start(ms)  overshoot  spin(ms)  lock(ms)");
    for digit in &schedule.digits {
        println!(
            "  {:>3}  {:>4}  {:>9}  {:>9}  {:>8}  {:>8}",
            digit.position,
            digit.cascade_index,
            digit.start_offset_ms,
            digit.overshoot,
            digit.spin_duration_ms,
            digit.lock_at_ms()
        );
    }
    println!("  last lock: {}ms", schedule.completion_ms());
    println!("  ceiling:   {}ms", schedule.ceiling_ms);
    Ok(())
}
