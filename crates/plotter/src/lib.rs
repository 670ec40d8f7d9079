//! Calibration and motion control for a two-string whiteboard bot.
//!
//! The bot is driven through a pair of [`MotorDriver`]s, one per spool. Starting a
//! [`Plotter`] runs the manual calibration (see [`Calibrator`]); after that it can be moved
//! around in normalized coordinates, and it releases its motors when it goes away.
//!
//! Everything here is blocking and meant to run on one control thread. The only thing that
//! may be shared with another thread is a [`PositionMonitor`], which can read positions but
//! not command anything.

use std::collections::VecDeque;

use wbb_protocol::{Jog, Snapshot, UnknownJog};

mod calibrator;
mod config;
mod driver;
mod error;
mod monitor;
mod motion;
mod plotter;
pub mod sim;
mod spool;

pub use calibrator::Calibrator;
pub use config::{Config, ConfigBuilder};
pub use driver::MotorDriver;
pub use error::{MotorFault, PlotterError};
pub use monitor::{report, PositionMonitor};
pub use motion::{synchronized_speeds, FollowOptions, MotionController, MoveOutcome, PathReport};
pub use plotter::Plotter;
pub use spool::{Command, Spool, SpoolCalibration};

/// Where calibration jogs come from: a keyboard, a button box, a script.
pub trait JogSource {
    /// Blocks until the next jog is available.
    fn next_jog(&mut self) -> anyhow::Result<Jog>;
}

/// Somewhere to send position reports.
pub trait TelemetrySink {
    fn publish(&mut self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

pub trait Battery: Send + Sync {
    /// The current battery voltage, in volts.
    fn voltage(&self) -> f64;
}

/// Plays back a fixed list of jogs, and fails once it runs out.
#[derive(Clone, Debug, Default)]
pub struct ScriptedJogs {
    jogs: VecDeque<Jog>,
}

impl ScriptedJogs {
    /// See [`Jog::parse_script`] for the format.
    pub fn parse(script: &str) -> Result<Self, UnknownJog> {
        Ok(Jog::parse_script(script)?.into())
    }

    pub fn remaining(&self) -> usize {
        self.jogs.len()
    }
}

impl From<Vec<Jog>> for ScriptedJogs {
    fn from(jogs: Vec<Jog>) -> Self {
        ScriptedJogs { jogs: jogs.into() }
    }
}

impl JogSource for ScriptedJogs {
    fn next_jog(&mut self) -> anyhow::Result<Jog> {
        self.jogs
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("the jog script ended before calibration finished"))
    }
}
