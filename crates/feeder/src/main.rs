use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use indicatif::ProgressBar;
use log::{info, warn, LevelFilter};
use tokio::sync::oneshot;
use wbb_geom::NormalizedPoint;
use wbb_plotter::{
    sim::{SimulatedBattery, SimulatedMotor},
    Battery, Config, JogSource, MotorDriver, PathReport, Plotter, PositionMonitor, ScriptedJogs,
};

use crate::{ev3::Ev3Motor, keys::KeyboardJogs};

mod ev3;
mod illustrate;
mod keys;
mod script;
mod telemetry;

const TICK: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Motors {
    /// Simulated motors, nothing moves.
    Sim,
    /// Tacho motors on an EV3 brick running ev3dev.
    Ev3,
}

/// Draws on a whiteboard with a two-string bot.
#[derive(Parser)]
struct Args {
    /// The drawing: a JSON array of {"x": .., "y": ..} points, or one "x,y" pair per line.
    path: Option<PathBuf>,

    /// A JSON file with the bot's physical parameters.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Motors::Sim)]
    motors: Motors,

    #[arg(long, default_value = "outA")]
    left_port: String,

    #[arg(long, default_value = "outD")]
    right_port: String,

    /// Make simulated motors take as long as real ones would.
    #[arg(long)]
    realtime: bool,

    /// Calibrate from a jog script like "llcrrc" instead of the keyboard.
    #[arg(long)]
    jogs: Option<String>,

    /// Draw the moves of a simulated run into this SVG file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Write telemetry to this file as JSON lines, instead of logging it.
    #[arg(long)]
    telemetry_out: Option<PathBuf>,

    /// Scale the drawing to fit the board.
    #[arg(long)]
    fit: bool,

    /// Stop at every point instead of following the path.
    #[arg(long)]
    point_to_point: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("couldn't read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("bad config in {}", path.display()))
}

struct Session<D> {
    report: PathReport,
    monitor: PositionMonitor<D>,
}

/// Calibrates, draws and shuts down, while a background task reports where the head is.
async fn run<D: MotorDriver + 'static>(
    left: D,
    right: D,
    battery: Arc<dyn Battery>,
    args: &Args,
    config: Config,
    points: Vec<NormalizedPoint>,
) -> anyhow::Result<Session<D>> {
    let mut jogs: Box<dyn JogSource + Send> = match &args.jogs {
        Some(script) => Box::new(ScriptedJogs::parse(script)?),
        None => Box::new(KeyboardJogs::new()?),
    };

    let (monitor_tx, monitor_rx) = oneshot::channel::<PositionMonitor<D>>();
    let sink = telemetry::sink(args.telemetry_out.as_deref())?;
    let period = config.telemetry_interval();
    let telemetry = tokio::spawn(async move {
        if let Ok(monitor) = monitor_rx.await {
            telemetry::run(monitor, sink, period).await;
        }
    });

    let point_to_point = args.point_to_point;
    let drawing = tokio::task::spawn_blocking(move || -> anyhow::Result<Session<D>> {
        let mut plotter = Plotter::start(left, right, jogs.as_mut(), &config)?;
        // Leaves raw mode, if the jogs came from the keyboard.
        drop(jogs);

        let monitor = plotter.monitor(battery);
        let _ = monitor_tx.send(monitor.clone());

        let bar = ProgressBar::new_spinner()
            .with_message(format!("Drawing {} points...", points.len()));
        bar.enable_steady_tick(TICK);
        let report = if point_to_point {
            plotter.draw_points(&points)?
        } else {
            plotter.follow_path(&points)?
        };
        bar.finish_with_message("done!");

        plotter.close();
        Ok(Session { report, monitor })
    });

    let result = drawing.await;
    telemetry.abort();
    result?
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    let points = match &args.path {
        Some(path) => script::load(path, args.fit)?,
        None => Vec::new(),
    };
    info!("loaded {} points", points.len());

    let report = match args.motors {
        Motors::Sim => {
            let motor = |name| {
                let m = SimulatedMotor::new(name);
                if args.realtime {
                    m.realtime()
                } else {
                    m
                }
            };
            let (left, right) = (motor("left"), motor("right"));
            let battery = Arc::new(SimulatedBattery(7.5));
            let session = run(left.clone(), right.clone(), battery, &args, config, points).await?;
            if let Some(path) = &args.svg {
                illustrate::write(path, &left, &right, &session.monitor)?;
            }
            session.report
        }
        Motors::Ev3 => {
            if args.svg.is_some() {
                warn!("--svg only works with simulated motors");
            }
            let left = Ev3Motor::find(&args.left_port)?;
            let right = Ev3Motor::find(&args.right_port)?;
            let battery = Arc::new(ev3::Ev3Battery::default());
            run(left, right, battery, &args, config, points).await?.report
        }
    };

    eprintln!("{} points drawn, {} skipped", report.reached, report.skipped);
    Ok(())
}
