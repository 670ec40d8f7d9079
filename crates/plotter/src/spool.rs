use std::{
    ops::RangeInclusive,
    sync::Arc,
    time::{Duration, Instant},
};

use log::{error, info, warn};
use wbb_geom::Len;

use crate::{Config, MotorDriver, MotorFault, PlotterError};

const DEGREES_PER_TURN: f64 = 360.0;

/// What a spool knows once calibration has pinned it down.
#[derive(Clone, Debug, PartialEq)]
pub struct SpoolCalibration {
    /// The string length when the encoder reads zero.
    pub length_at_zero: Len,
    /// Encoder counts the spool may be sent to, already widened by the rounding buffer.
    pub safe_counts: RangeInclusive<i32>,
}

/// The result of asking a spool to change its string length.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Issued { count: i32 },
    Rejected {
        count: i32,
        safe_counts: RangeInclusive<i32>,
    },
}

/// A motor with string wound around it.
///
/// A spool starts out unset: it can be jogged around but it has no idea how long its string
/// is. `calibrate` fixes the reference length (once), after which lengths can be read and
/// commanded.
pub struct Spool<D> {
    driver: Arc<D>,
    circumference: Len,
    max_speed: u32,
    speed: u32,
    buffer_counts: i32,
    calibration: Option<SpoolCalibration>,
}

impl<D: MotorDriver> Spool<D> {
    pub fn new(driver: D, config: &Config) -> Self {
        let max_speed = driver.max_speed().min(config.max_safe_speed).max(1);
        Spool {
            driver: Arc::new(driver),
            circumference: config.axle_circumference(),
            max_speed,
            speed: config.move_speed().min(max_speed),
            buffer_counts: config.safe_buffer_rotations.max(0) * DEGREES_PER_TURN as i32,
            calibration: None,
        }
    }

    pub fn name(&self) -> &str {
        self.driver.name()
    }

    pub(crate) fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    pub fn circumference(&self) -> Len {
        self.circumference
    }

    pub fn max_speed(&self) -> u32 {
        self.max_speed
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    /// Sets the speed for subsequent moves, capped to the spool's safe maximum.
    pub fn set_speed(&mut self, speed: u32) {
        self.speed = speed.clamp(1, self.max_speed);
    }

    pub fn encoder_count(&self) -> Result<i32, MotorFault> {
        self.driver.encoder_count()
    }

    pub fn is_moving(&self) -> Result<bool, MotorFault> {
        self.driver.is_moving()
    }

    pub fn calibration(&self) -> Option<&SpoolCalibration> {
        self.calibration.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Turns by `degrees` relative to wherever the spool is now, ignoring the safe range.
    ///
    /// Only meant for manual positioning before calibration.
    pub fn jog(&self, degrees: i32) -> Result<(), MotorFault> {
        let here = self.driver.encoder_count()?;
        self.driver
            .rotate_to(here.saturating_add(degrees), self.speed, false)
    }

    pub fn reset_encoder(&self) -> Result<(), MotorFault> {
        self.driver.reset_encoder()
    }

    /// Zeroes the encoder here and declares that the string is `length_at_zero` long.
    ///
    /// `safe_counts` are the encoder counts that the spool may be sent to; they get widened
    /// by a few turns to tolerate rounding drift.
    pub fn calibrate(
        &mut self,
        length_at_zero: Len,
        safe_counts: RangeInclusive<i32>,
    ) -> Result<(), PlotterError> {
        if self.calibration.is_some() {
            return Err(PlotterError::AlreadyCalibrated);
        }
        self.driver.reset_encoder()?;
        let safe_counts = safe_counts.start().saturating_sub(self.buffer_counts)
            ..=safe_counts.end().saturating_add(self.buffer_counts);
        info!(
            "spool {} calibrated: {:.2}cm at zero, safe counts {:?}",
            self.name(),
            length_at_zero.get(),
            safe_counts
        );
        self.calibration = Some(SpoolCalibration {
            length_at_zero,
            safe_counts,
        });
        Ok(())
    }

    fn calibrated(&self) -> Result<&SpoolCalibration, PlotterError> {
        self.calibration
            .as_ref()
            .ok_or_else(|| PlotterError::Uncalibrated {
                spool: self.name().to_owned(),
            })
    }

    pub fn length(&self) -> Result<Len, PlotterError> {
        let calib = self.calibrated()?;
        let count = self.driver.encoder_count()?;
        Ok(count_to_length(count, calib.length_at_zero, self.circumference))
    }

    /// The encoder count at which the string would be `length` long.
    pub fn target_count(&self, length: Len) -> Result<i32, PlotterError> {
        let calib = self.calibrated()?;
        let turns = ((length - calib.length_at_zero) / self.circumference).get();
        Ok((turns * DEGREES_PER_TURN).round() as i32)
    }

    pub fn is_safe_count(&self, count: i32) -> Result<bool, PlotterError> {
        Ok(self.calibrated()?.safe_counts.contains(&count))
    }

    /// Starts winding towards `length` at the current speed, without waiting.
    ///
    /// Targets outside the safe range are not an error: they get logged and skipped, so that
    /// one bad hop doesn't end a whole drawing.
    ///
    /// This moves one spool on its own. `MotionController` checks both spools' targets first
    /// and then starts them together, so it goes through `target_count` instead.
    pub fn set_length(&self, length: Len) -> Result<Command, PlotterError> {
        let count = self.target_count(length)?;
        self.rotate_to_count(count)
    }

    pub(crate) fn rotate_to_count(&self, count: i32) -> Result<Command, PlotterError> {
        let safe_counts = self.calibrated()?.safe_counts.clone();
        if !safe_counts.contains(&count) {
            warn!(
                "spool {}: rejecting unsafe target count {count}, safe range is {}..={}",
                self.name(),
                safe_counts.start(),
                safe_counts.end()
            );
            return Ok(Command::Rejected { count, safe_counts });
        }
        self.driver.rotate_to(count, self.speed, false)?;
        Ok(Command::Issued { count })
    }

    /// How long it would take to reach `length` at full speed, ignoring acceleration.
    ///
    /// An estimate for callers planning single-spool moves. Paired moves get their speeds
    /// from `synchronized_speeds` instead, which only needs the ratio of the two distances.
    pub fn min_time_to_reach(&self, length: Len) -> Result<Duration, PlotterError> {
        let target = self.target_count(length)?;
        let here = self.driver.encoder_count()?;
        let degrees = (i64::from(target) - i64::from(here)).unsigned_abs() as f64;
        Ok(Duration::from_secs_f64(degrees / self.max_speed as f64))
    }

    pub fn stop(&self) -> Result<(), MotorFault> {
        self.driver.stop()
    }

    pub fn release(&self) -> Result<(), MotorFault> {
        self.driver.release()
    }
}

pub(crate) fn count_to_length(count: i32, length_at_zero: Len, circumference: Len) -> Len {
    length_at_zero + circumference * (f64::from(count) / DEGREES_PER_TURN)
}

/// Blocks until neither spool is moving, checking every `poll`.
pub(crate) fn wait_settled<D: MotorDriver>(
    spools: [&Spool<D>; 2],
    poll: Duration,
    timeout: Duration,
) -> Result<(), PlotterError> {
    let start = Instant::now();
    loop {
        let mut moving = false;
        for spool in spools {
            moving |= spool.is_moving()?;
        }
        if !moving {
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(PlotterError::SettleTimeout {
                waited_ms: start.elapsed().as_millis(),
            });
        }
        std::thread::sleep(poll);
    }
}

/// Stops both spools and then lets them spin freely.
///
/// Errors are logged and otherwise ignored: one broken motor must not keep the other one
/// under power.
pub(crate) fn shut_down<D: MotorDriver>(spools: [&Spool<D>; 2]) {
    for spool in spools {
        if let Err(e) = spool.stop() {
            error!("error stopping motor: {e}");
        }
    }
    release_all(spools);
}

pub(crate) fn release_all<D: MotorDriver>(spools: [&Spool<D>; 2]) {
    for spool in spools {
        if let Err(e) = spool.release() {
            error!("error releasing motor: {e}");
        }
    }
}
