use std::time::Duration;

use log::{debug, info, warn};
use wbb_geom::Len;
use wbb_protocol::{Calibration, CalibrationStatus, Corner, Jog};

use crate::{
    spool::{release_all, wait_settled},
    Config, JogSource, MotorDriver, PlotterError, Spool,
};

/// Finds the two top corners with the help of a human holding the jog buttons.
///
/// The operator first drives the head to the upper-left spool and confirms, then to the
/// upper-right spool and confirms again. The left spool's encoder travel between the two
/// confirmations is the length of the top edge, which fixes the scale of everything else.
pub struct Calibrator {
    state: CalibrationStatus,
    jog_degrees: i32,
    max_length_fraction: f64,
    poll: Duration,
    settle_timeout: Duration,
    aborted: bool,
}

/// How each direction turns the (left, right) spools. Negative winds string in.
fn jog_direction(jog: Jog) -> Option<(i32, i32)> {
    match jog {
        Jog::Up => Some((-1, -1)),
        Jog::Down => Some((1, 1)),
        Jog::Left => Some((-1, 1)),
        Jog::Right => Some((1, -1)),
        Jog::Confirm | Jog::Cancel => None,
    }
}

impl Calibrator {
    pub fn new(config: &Config) -> Self {
        Calibrator {
            state: CalibrationStatus::Uncalibrated,
            jog_degrees: config.jog_degrees,
            max_length_fraction: config.length_limit(),
            poll: config.poll_interval(),
            settle_timeout: config.settle_timeout(),
            aborted: false,
        }
    }

    pub fn state(&self) -> CalibrationStatus {
        self.state
    }

    /// Feeds one jog into the calibration.
    ///
    /// Returns the calibration once the second corner has been confirmed. `Cancel` releases
    /// both motors and fails with `CalibrationAborted`, and so does every later call.
    pub fn handle<D: MotorDriver>(
        &mut self,
        jog: Jog,
        left: &mut Spool<D>,
        right: &mut Spool<D>,
    ) -> Result<Option<Calibration>, PlotterError> {
        if self.aborted {
            return Err(PlotterError::CalibrationAborted);
        }
        let corner = match self.state {
            CalibrationStatus::Calibrated(_) => return Err(PlotterError::AlreadyCalibrated),
            CalibrationStatus::Uncalibrated => {
                info!("calibration: drive the head to the upper-left spool and confirm");
                self.state = CalibrationStatus::AwaitingCorner(Corner::UpperLeft);
                Corner::UpperLeft
            }
            CalibrationStatus::AwaitingCorner(c) => c,
        };

        if let Some((l, r)) = jog_direction(jog) {
            debug!("jog {jog:?}");
            left.jog(l * self.jog_degrees)?;
            right.jog(r * self.jog_degrees)?;
            return Ok(None);
        }

        if jog == Jog::Cancel {
            warn!("calibration cancelled, releasing motors");
            self.aborted = true;
            release_all([&*left, &*right]);
            return Err(PlotterError::CalibrationAborted);
        }

        wait_settled([&*left, &*right], self.poll, self.settle_timeout)?;
        match corner {
            Corner::UpperLeft => {
                left.reset_encoder()?;
                info!("upper-left corner confirmed, now drive to the upper-right spool");
                self.state = CalibrationStatus::AwaitingCorner(Corner::UpperRight);
                Ok(None)
            }
            Corner::UpperRight => {
                let edge = left.encoder_count()?;
                if edge <= 0 {
                    self.aborted = true;
                    release_all([&*left, &*right]);
                    return Err(PlotterError::InvalidCalibration {
                        edge_encoder_count: edge,
                    });
                }
                let calibration = self.finish(edge, left, right)?;
                self.state = CalibrationStatus::Calibrated(calibration);
                Ok(Some(calibration))
            }
        }
    }

    // Both spools are re-zeroed here at the upper-right corner, where the left string is as
    // long as the top edge and the right string has no length at all.
    fn finish<D: MotorDriver>(
        &self,
        edge: i32,
        left: &mut Spool<D>,
        right: &mut Spool<D>,
    ) -> Result<Calibration, PlotterError> {
        let edge_len = left.circumference() * (f64::from(edge) / 360.0);
        let longest = (self.max_length_fraction * f64::from(edge)).round() as i32;

        left.calibrate(edge_len, -edge..=longest - edge)?;
        right.calibrate(Len::new(0.0), 0..=longest)?;

        let calibration = Calibration {
            edge_encoder_count: edge,
            scale_cm: edge_len.get(),
        };
        info!(
            "calibrated: top edge is {edge} degrees, {:.1}cm",
            calibration.scale_cm
        );
        Ok(calibration)
    }

    /// Reads jogs from `source` until calibration is done.
    pub fn run<D: MotorDriver>(
        &mut self,
        source: &mut dyn JogSource,
        left: &mut Spool<D>,
        right: &mut Spool<D>,
    ) -> Result<Calibration, PlotterError> {
        loop {
            let jog = source.next_jog().map_err(PlotterError::Input)?;
            if let Some(calibration) = self.handle(jog, left, right)? {
                return Ok(calibration);
            }
        }
    }
}
