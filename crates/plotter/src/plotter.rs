use std::sync::Arc;

use log::{error, info, warn};
use wbb_geom::{LeftRight, Len, NormalizedPoint};
use wbb_protocol::Calibration;

use crate::{
    motion::{FollowOptions, MotionController, MoveOutcome, PathReport},
    monitor::PositionMonitor,
    spool::shut_down,
    Battery, Calibrator, Config, JogSource, MotorDriver, PlotterError, Spool,
};

const BOUNDARY: [NormalizedPoint; 5] = [
    NormalizedPoint::UPPER_LEFT,
    NormalizedPoint::UPPER_RIGHT,
    NormalizedPoint::LOWER_RIGHT,
    NormalizedPoint::LOWER_LEFT,
    NormalizedPoint::UPPER_LEFT,
];

/// A calibrated whiteboard bot, ready to draw.
///
/// The motors are stopped and released when the plotter is closed or dropped, whichever
/// comes first.
pub struct Plotter<D: MotorDriver> {
    motion: MotionController<D>,
    calibration: Calibration,
    follow: FollowOptions,
    closed: bool,
}

impl<D: MotorDriver> Plotter<D> {
    /// Calibrates a bot from scratch, using `jogs` to let the operator find the corners.
    ///
    /// If anything goes wrong on the way the motors end up released.
    pub fn start(
        left: D,
        right: D,
        jogs: &mut dyn JogSource,
        config: &Config,
    ) -> Result<Self, PlotterError> {
        let mut left = Spool::new(left, config);
        let mut right = Spool::new(right, config);

        let calibration = match Calibrator::new(config).run(jogs, &mut left, &mut right) {
            Ok(c) => c,
            // The calibrator has already let go of the motors.
            Err(e @ (PlotterError::CalibrationAborted | PlotterError::InvalidCalibration { .. })) => {
                return Err(e)
            }
            Err(e) => {
                error!("calibration failed: {e}");
                shut_down([&left, &right]);
                return Err(e);
            }
        };

        let motion = MotionController::new(LeftRight::new(left, right), &calibration, config)?;
        let mut plotter = Plotter {
            motion,
            calibration,
            follow: FollowOptions::from(config),
            closed: false,
        };
        if config.trace_boundary {
            plotter.trace_boundary()?;
        }
        info!("plotter ready");
        Ok(plotter)
    }

    /// Visits the four corners, so the operator can check that the calibration makes sense.
    pub fn trace_boundary(&mut self) -> Result<(), PlotterError> {
        info!("tracing the drawing area");
        for corner in &BOUNDARY {
            self.motion.move_to(corner)?;
        }
        Ok(())
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn location(&self) -> Result<NormalizedPoint, PlotterError> {
        self.motion.location()
    }

    /// Moves to `target` and waits until the head gets there.
    pub fn set_location(&mut self, target: &NormalizedPoint) -> Result<MoveOutcome, PlotterError> {
        self.motion.move_to(target)
    }

    /// Draws through `points` with short look-ahead hops. This is the fast way to draw.
    pub fn follow_path(&mut self, points: &[NormalizedPoint]) -> Result<PathReport, PlotterError> {
        self.motion.follow_path(points, self.follow)
    }

    /// Visits each point in turn, waiting for the motors to settle at every one.
    pub fn draw_points(&mut self, points: &[NormalizedPoint]) -> Result<PathReport, PlotterError> {
        let mut report = PathReport::default();
        for (i, p) in points.iter().enumerate() {
            if i % 100 == 0 {
                info!("point {i}/{}", points.len());
            }
            match self.motion.move_to(p)? {
                MoveOutcome::Moved { .. } => {
                    report.reached += 1;
                    report.hops += 1;
                }
                MoveOutcome::Rejected { .. } => report.skipped += 1,
            }
        }
        info!(
            "drew {} points, skipped {}",
            report.reached, report.skipped
        );
        Ok(report)
    }

    /// A read-only position source for telemetry.
    pub fn monitor(&self, battery: Arc<dyn Battery>) -> PositionMonitor<D> {
        let spools = self.motion.spools();
        let zero = |s: &Spool<D>| {
            s.calibration()
                .map_or(Len::new(0.0), |c| c.length_at_zero)
        };
        PositionMonitor::new(
            LeftRight::new(spools.left.driver().clone(), spools.right.driver().clone()),
            LeftRight::new(zero(&spools.left), zero(&spools.right)),
            spools.left.circumference(),
            self.motion.scale(),
            self.motion.kinematics(),
            battery,
        )
    }

    /// Stops both motors and lets them spin freely. Errors are logged, never returned.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        info!("shutting down");
        let spools = self.motion.spools();
        shut_down([&spools.left, &spools.right]);
    }
}

impl<D: MotorDriver> Drop for Plotter<D> {
    fn drop(&mut self) {
        if !self.closed {
            warn!("plotter dropped without being closed");
            self.close();
        }
    }
}
