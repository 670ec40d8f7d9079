use std::{
    ops::RangeInclusive,
    time::{Duration, Instant},
};

use log::{debug, info, warn};
use wbb_geom::{GeomError, Kinematics, LeftRight, Len, LenExt as _, NormalizedPoint, StringLengths};
use wbb_protocol::Calibration;

use crate::{
    driver::synchronized,
    spool::wait_settled,
    Config, MotorDriver, PlotterError, Spool,
};

/// What happened to a requested move.
#[derive(Clone, Debug, PartialEq)]
pub enum MoveOutcome {
    /// Both spools were started towards these encoder counts, at these speeds.
    Moved {
        counts: LeftRight<i32>,
        speeds: LeftRight<u32>,
    },
    /// The move would have taken `spool` outside of its safe range, so nothing was sent to
    /// either motor.
    Rejected {
        spool: String,
        count: i32,
        safe_counts: RangeInclusive<i32>,
    },
}

impl MoveOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, MoveOutcome::Rejected { .. })
    }
}

/// Tuning for [`MotionController::follow_path`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FollowOptions {
    /// A point counts as reached once the head is closer than this.
    pub close_enough: f64,
    /// The longest hop commanded at once, as a fraction of the top edge.
    pub max_hop_fraction: f64,
}

impl Default for FollowOptions {
    fn default() -> Self {
        FollowOptions {
            close_enough: 0.005,
            max_hop_fraction: 0.1,
        }
    }
}

impl From<&Config> for FollowOptions {
    fn from(config: &Config) -> Self {
        FollowOptions {
            close_enough: config.close_enough,
            max_hop_fraction: config.max_hop_fraction,
        }
    }
}

/// How a path (or a list of points) went.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PathReport {
    pub reached: usize,
    pub skipped: usize,
    /// The number of moves that were actually sent to the motors.
    pub hops: usize,
}

/// The speeds (degrees per second) that make two spools finish their moves at the same time.
///
/// The spool with further to go runs at `max`, the other one proportionally slower. A spool
/// with nothing to do still gets a speed of at least 1, which real motors need to accept a
/// command.
pub fn synchronized_speeds(delta_left: f64, delta_right: f64, max: u32) -> LeftRight<u32> {
    let (dl, dr) = (delta_left.abs(), delta_right.abs());
    let larger = dl.max(dr);
    if larger.is_nan() || larger <= 0.0 {
        return LeftRight::new(max, max);
    }
    let scaled = |d: f64| ((f64::from(max) * d / larger).round() as u32).clamp(1, max.max(1));
    LeftRight::new(scaled(dl), scaled(dr))
}

/// Moves the head around with both spools.
///
/// Only exists once calibration is done: it needs the scale of the board to turn normalized
/// string lengths into centimeters of string.
pub struct MotionController<D> {
    spools: LeftRight<Spool<D>>,
    kinematics: Kinematics,
    scale: Len,
    max_speed: u32,
    poll: Duration,
    settle_timeout: Duration,
    max_polls_per_point: u32,
}

impl<D: MotorDriver> MotionController<D> {
    pub fn new(
        spools: LeftRight<Spool<D>>,
        calibration: &Calibration,
        config: &Config,
    ) -> Result<Self, PlotterError> {
        for spool in [&spools.left, &spools.right] {
            if !spool.is_calibrated() {
                return Err(PlotterError::Uncalibrated {
                    spool: spool.name().to_owned(),
                });
            }
        }
        let max_speed = config
            .move_speed()
            .min(spools.left.max_speed())
            .min(spools.right.max_speed());
        Ok(MotionController {
            spools,
            kinematics: config.kinematics(),
            scale: calibration.scale_cm.cm(),
            max_speed,
            poll: config.poll_interval(),
            settle_timeout: config.settle_timeout(),
            max_polls_per_point: config.max_polls_per_point,
        })
    }

    pub fn spools(&self) -> &LeftRight<Spool<D>> {
        &self.spools
    }

    fn pair(&self) -> [&Spool<D>; 2] {
        [&self.spools.left, &self.spools.right]
    }

    pub fn kinematics(&self) -> Kinematics {
        self.kinematics
    }

    /// The length of the top edge.
    pub fn scale(&self) -> Len {
        self.scale
    }

    pub fn max_speed(&self) -> u32 {
        self.max_speed
    }

    /// The current string lengths, as read from the encoders.
    pub fn string_lengths(&self) -> Result<StringLengths, PlotterError> {
        let left = (self.spools.left.length()? / self.scale).get();
        let right = (self.spools.right.length()? / self.scale).get();
        Ok(StringLengths::new(left, right)?)
    }

    /// Where the head is, according to the encoders.
    pub fn location(&self) -> Result<NormalizedPoint, PlotterError> {
        Ok(self.kinematics.to_point(&self.string_lengths()?)?)
    }

    pub fn is_moving(&self) -> Result<bool, PlotterError> {
        Ok(self.spools.left.is_moving()? || self.spools.right.is_moving()?)
    }

    pub fn wait_settled(&self) -> Result<(), PlotterError> {
        wait_settled(self.pair(), self.poll, self.settle_timeout)
    }

    /// Starts both spools towards `target` so that they arrive together, without waiting.
    fn issue_move(&mut self, target: &NormalizedPoint) -> Result<MoveOutcome, PlotterError> {
        let from = self.string_lengths()?;
        let to = self.kinematics.to_string_lengths(target)?;

        let counts = LeftRight::new(
            self.spools.left.target_count(self.scale * to.left())?,
            self.spools.right.target_count(self.scale * to.right())?,
        );
        let checks = [
            (&self.spools.left, counts.left),
            (&self.spools.right, counts.right),
        ];
        for (spool, count) in checks {
            if !spool.is_safe_count(count)? {
                let safe_counts = spool
                    .calibration()
                    .map(|c| c.safe_counts.clone())
                    .unwrap_or(0..=0);
                warn!(
                    "skipping move to {target}: spool {} would go to {count}, safe range is {}..={}",
                    spool.name(),
                    safe_counts.start(),
                    safe_counts.end()
                );
                return Ok(MoveOutcome::Rejected {
                    spool: spool.name().to_owned(),
                    count,
                    safe_counts,
                });
            }
        }

        let speeds = synchronized_speeds(
            to.left() - from.left(),
            to.right() - from.right(),
            self.max_speed,
        );
        self.spools.left.set_speed(speeds.left);
        self.spools.right.set_speed(speeds.right);

        let LeftRight { left, right } = &self.spools;
        synchronized(left.driver().as_ref(), right.driver().as_ref(), || {
            left.rotate_to_count(counts.left)?;
            right.rotate_to_count(counts.right)?;
            Ok::<_, PlotterError>(())
        })?;

        Ok(MoveOutcome::Moved {
            counts,
            speeds: LeftRight::new(left.speed(), right.speed()),
        })
    }

    /// Moves to `target` and waits for both spools to stop.
    ///
    /// Targets outside of the unit square are an error. Targets that are inside but would
    /// overrun a spool are logged and skipped, which is reported as `MoveOutcome::Rejected`.
    pub fn move_to(&mut self, target: &NormalizedPoint) -> Result<MoveOutcome, PlotterError> {
        check_in_bounds(target)?;
        let outcome = self.issue_move(target)?;
        if !outcome.is_rejected() {
            self.wait_settled()?;
        }
        Ok(outcome)
    }

    /// Follows a path by hopping towards each point in short steps.
    ///
    /// Every poll tick the head is sent at most `max_hop_fraction` towards the current point,
    /// without waiting for the motors to settle, until it is within `close_enough`. Long
    /// straight moves come out bowed when sent in one go, because the motors don't ramp up
    /// identically; short hops keep the line straight.
    ///
    /// Points whose hops get rejected, or that aren't reached within the configured number
    /// of polls, are skipped.
    pub fn follow_path(
        &mut self,
        points: &[NormalizedPoint],
        opts: FollowOptions,
    ) -> Result<PathReport, PlotterError> {
        for p in points {
            check_in_bounds(p)?;
        }

        let mut report = PathReport::default();
        let mut last_log = Instant::now();
        for (i, target) in points.iter().enumerate() {
            let mut polls = 0;
            loop {
                let here = self.location()?;
                if here.distance_to(target) < opts.close_enough {
                    report.reached += 1;
                    break;
                }
                if polls >= self.max_polls_per_point {
                    warn!("giving up on {target} after {polls} polls, still at {here}");
                    report.skipped += 1;
                    break;
                }

                match self.hop(&here, target, opts.max_hop_fraction) {
                    Ok(MoveOutcome::Moved { .. }) => report.hops += 1,
                    Ok(MoveOutcome::Rejected { .. }) => {
                        report.skipped += 1;
                        break;
                    }
                    Err(PlotterError::Geom(e)) => {
                        warn!("skipping {target}: {e}");
                        report.skipped += 1;
                        break;
                    }
                    Err(e) => return Err(e),
                }

                if last_log.elapsed() >= Duration::from_secs(3) {
                    debug!(
                        "path point {}/{}: at {here}, heading for {target}",
                        i + 1,
                        points.len()
                    );
                    last_log = Instant::now();
                }
                polls += 1;
                std::thread::sleep(self.poll);
            }
        }

        self.wait_settled()?;
        info!(
            "path done: {} points reached, {} skipped, {} hops",
            report.reached, report.skipped, report.hops
        );
        Ok(report)
    }

    fn hop(
        &mut self,
        here: &NormalizedPoint,
        target: &NormalizedPoint,
        max_hop: f64,
    ) -> Result<MoveOutcome, PlotterError> {
        // `here` is measured, so it may be a little outside of the board.
        let step = here.scaled_towards(target, max_hop)?.clamp_to_unit_square();
        self.issue_move(&step)
    }
}

fn check_in_bounds(p: &NormalizedPoint) -> Result<(), GeomError> {
    if p.is_in_unit_square() {
        Ok(())
    } else {
        Err(GeomError::OutOfRange { x: p.x(), y: p.y() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{MotorCommand, SimulatedMotor};
    use crate::{Calibrator, ConfigBuilder, ScriptedJogs};
    use proptest::prelude::*;

    struct Rig {
        motors: LeftRight<SimulatedMotor>,
        motion: MotionController<SimulatedMotor>,
    }

    fn config() -> Config {
        ConfigBuilder::default()
            .with_jog_degrees(3600)
            .with_poll_interval(Duration::from_millis(0))
            .with_max_polls_per_point(200)
            .build()
    }

    // Calibrates with a 7200 degree (200cm) top edge, leaving the head at the upper-right.
    fn rig() -> Rig {
        let config = config();
        let motors = LeftRight::new(SimulatedMotor::new("left"), SimulatedMotor::new("right"));
        let mut left = Spool::new(motors.left.clone(), &config);
        let mut right = Spool::new(motors.right.clone(), &config);
        let mut jogs = ScriptedJogs::parse("llcrrc").unwrap();
        let calibration = Calibrator::new(&config)
            .run(&mut jogs, &mut left, &mut right)
            .unwrap();
        let motion =
            MotionController::new(LeftRight::new(left, right), &calibration, &config).unwrap();
        Rig { motors, motion }
    }

    fn pt(x: f64, y: f64) -> NormalizedPoint {
        NormalizedPoint::new(x, y).unwrap()
    }

    fn last_rotation(m: &SimulatedMotor) -> Option<(i32, u32)> {
        m.commands().iter().rev().find_map(|c| match c {
            MotorCommand::RotateTo { count, speed, .. } => Some((*count, *speed)),
            _ => None,
        })
    }

    #[test]
    fn speeds_are_proportional() {
        assert_eq!(synchronized_speeds(0.25, 0.5, 180), LeftRight::new(90, 180));
        assert_eq!(synchronized_speeds(-0.5, 0.25, 180), LeftRight::new(180, 90));
        assert_eq!(synchronized_speeds(0.0, 0.3, 180), LeftRight::new(1, 180));
        assert_eq!(synchronized_speeds(0.0, 0.0, 180), LeftRight::new(180, 180));
        assert_eq!(synchronized_speeds(1e-9, 1.0, 180), LeftRight::new(1, 180));
    }

    #[test]
    fn starts_at_upper_right() {
        let rig = rig();
        let here = rig.motion.location().unwrap();
        assert!(here.distance_to(&NormalizedPoint::UPPER_RIGHT) < 1e-9);
        assert_eq!(rig.motion.scale(), 200.0.cm());
    }

    #[test]
    fn move_arrives_together() {
        let mut rig = rig();
        let target = pt(0.5, 0.5);
        let outcome = rig.motion.move_to(&target).unwrap();
        let MoveOutcome::Moved { counts, speeds } = outcome else {
            panic!("move was rejected");
        };

        assert_eq!(rig.motors.left.encoder_count().unwrap(), counts.left);
        assert_eq!(rig.motors.right.encoder_count().unwrap(), counts.right);
        assert!(rig.motion.location().unwrap().distance_to(&target) < 1e-3);

        // From (1, 0) the left string shrinks from 1 to 0.707 and the right one grows from 0
        // to 0.707, so the left spool has less to do.
        assert!(speeds.left < speeds.right);
        assert_eq!(speeds.right, 180);
        let ratio = (1.0 - 0.5f64.sqrt()) / 0.5f64.sqrt();
        assert_eq!(speeds.left, (180.0 * ratio).round() as u32);

        assert_eq!(last_rotation(&rig.motors.left), Some((counts.left, speeds.left)));
    }

    #[test]
    fn speed_ratio_follows_the_deltas() {
        let mut rig = rig();
        // From (0, 0) to (0, 0.75): left goes 0 -> 0.75, right goes 1 -> 1.25.
        rig.motion.move_to(&pt(0.0, 0.0)).unwrap();
        let from = rig.motion.string_lengths().unwrap();
        let target = pt(0.0, 0.75);
        let to = rig.motion.kinematics().to_string_lengths(&target).unwrap();
        let expected = synchronized_speeds(
            to.left() - from.left(),
            to.right() - from.right(),
            180,
        );
        let MoveOutcome::Moved { speeds, .. } = rig.motion.move_to(&target).unwrap() else {
            panic!("move was rejected");
        };
        assert_eq!(speeds, expected);
        assert_eq!(speeds.left, 180);
        assert_eq!(speeds.right, 60);
    }

    #[test]
    fn outside_the_board_is_an_error() {
        let mut rig = rig();
        let before = rig.motors.left.rotate_count();
        let res = rig.motion.move_to(&pt(1.05, 0.5));
        assert!(matches!(res, Err(PlotterError::Geom(GeomError::OutOfRange { .. }))));
        assert_eq!(rig.motors.left.rotate_count(), before);
    }

    #[test]
    fn unsafe_moves_send_nothing() {
        let config = ConfigBuilder::default()
            .with_jog_degrees(3600)
            .with_safe_buffer_rotations(0)
            .build();
        let motors = LeftRight::new(SimulatedMotor::new("left"), SimulatedMotor::new("right"));
        let mut left = Spool::new(motors.left.clone(), &config);
        let mut right = Spool::new(motors.right.clone(), &config);
        let cal = Calibrator::new(&config)
            .run(&mut ScriptedJogs::parse("llcrrc").unwrap(), &mut left, &mut right)
            .unwrap();
        // Squeeze the right spool's range so that the bottom of the board is out of reach.
        let mut right = Spool::new(motors.right.clone(), &config);
        right.calibrate(0.0.cm(), 0..=7200).unwrap();
        let mut motion = MotionController::new(LeftRight::new(left, right), &cal, &config).unwrap();

        let before = (motors.left.rotate_count(), motors.right.rotate_count());
        let outcome = motion.move_to(&pt(0.0, 1.0)).unwrap();
        assert!(matches!(
            outcome,
            MoveOutcome::Rejected { ref spool, .. } if spool == "right"
        ));
        assert_eq!(
            (motors.left.rotate_count(), motors.right.rotate_count()),
            before
        );
    }

    #[test]
    fn long_segments_are_broken_into_hops() {
        let mut rig = rig();
        let points = [pt(0.5, 0.2), pt(0.5, 0.8), pt(0.55, 0.8)];
        rig.motion.move_to(&points[0]).unwrap();
        let before = rig.motors.left.synchronized_targets().len();

        let report = rig.motion.follow_path(&points, FollowOptions::default()).unwrap();

        assert_eq!(report.reached, 3);
        assert_eq!(report.skipped, 0);
        // 0.6 at 0.1 per hop, then one more for the last point.
        assert!(report.hops >= 7, "{report:?}");
        let issued = rig.motors.left.synchronized_targets().len() - before;
        assert_eq!(issued, report.hops);
        assert!(rig.motion.location().unwrap().distance_to(&points[2]) < 0.005);
    }

    #[test]
    fn hops_do_not_wait_for_the_motors() {
        let config = ConfigBuilder::default()
            .with_jog_degrees(1440)
            .with_max_speed(1440)
            .with_poll_interval(Duration::from_millis(5))
            .build();
        let motors = LeftRight::new(
            SimulatedMotor::new("left").realtime().with_max_speed(1440),
            SimulatedMotor::new("right").realtime().with_max_speed(1440),
        );
        let mut left = Spool::new(motors.left.clone(), &config);
        let mut right = Spool::new(motors.right.clone(), &config);
        let calibration = Calibrator::new(&config)
            .run(&mut ScriptedJogs::parse("c r c").unwrap(), &mut left, &mut right)
            .unwrap();
        let mut motion =
            MotionController::new(LeftRight::new(left, right), &calibration, &config).unwrap();

        let points = [pt(0.5, 0.2), pt(0.5, 0.8), pt(0.55, 0.8)];
        let report = motion.follow_path(&points, FollowOptions::default()).unwrap();

        assert_eq!(report.reached, 3);
        assert_eq!(report.skipped, 0);
        // Hops are sent every tick, while the motors are still turning towards the last one.
        let overtaken = motors.left.overtaken_moves() + motors.right.overtaken_moves();
        assert!(overtaken > 0, "{report:?}");
        assert!(!motion.is_moving().unwrap());
        assert!(motion.location().unwrap().distance_to(&points[2]) < 0.01);
    }

    #[test]
    fn follow_path_checks_every_point_first() {
        let mut rig = rig();
        let before = rig.motors.left.rotate_count();
        let res = rig
            .motion
            .follow_path(&[pt(0.5, 0.5), pt(0.5, -0.05)], FollowOptions::default());
        assert!(res.is_err());
        assert_eq!(rig.motors.left.rotate_count(), before);
    }

    #[test]
    fn rejected_hops_skip_the_point() {
        let config = ConfigBuilder::default()
            .with_safe_buffer_rotations(0)
            .with_poll_interval(Duration::from_millis(0))
            .build();
        let motors = LeftRight::new(SimulatedMotor::new("left"), SimulatedMotor::new("right"));
        let mut left = Spool::new(motors.left.clone(), &config);
        let mut right = Spool::new(motors.right.clone(), &config);
        // The right spool may not let out any string at all.
        left.calibrate(200.0.cm(), -7200..=3600).unwrap();
        right.calibrate(0.0.cm(), 0..=0).unwrap();
        let cal = Calibration {
            edge_encoder_count: 7200,
            scale_cm: 200.0,
        };
        let mut motion =
            MotionController::new(LeftRight::new(left, right), &cal, &config).unwrap();

        let report = motion
            .follow_path(&[pt(0.1, 0.9), pt(1.0, 0.0)], FollowOptions::default())
            .unwrap();
        assert_eq!(
            report,
            PathReport {
                reached: 1,
                skipped: 1,
                hops: 0
            }
        );
        assert_eq!(motors.right.rotate_count(), 0);
    }

    #[test]
    fn uncalibrated_spools_are_refused() {
        let config = config();
        let spools = LeftRight::new(
            Spool::new(SimulatedMotor::new("left"), &config),
            Spool::new(SimulatedMotor::new("right"), &config),
        );
        let cal = Calibration {
            edge_encoder_count: 7200,
            scale_cm: 200.0,
        };
        assert!(matches!(
            MotionController::new(spools, &cal, &config),
            Err(PlotterError::Uncalibrated { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn slower_spool_has_less_to_do(dl in -1.0..1.0f64, dr in -1.0..1.0f64, max in 1u32..1440) {
            let s = synchronized_speeds(dl, dr, max);
            prop_assert!(s.left >= 1 && s.left <= max);
            prop_assert!(s.right >= 1 && s.right <= max);
            if dl.abs() < dr.abs() {
                prop_assert_eq!(s.right, max);
                prop_assert!(s.left <= s.right);
                let exact = f64::from(max) * dl.abs() / dr.abs();
                prop_assert!((f64::from(s.left) - exact).abs() <= 1.0);
            }
        }

        #[test]
        fn moves_land_within_a_tick(x in 0.0..1.0f64, y in 0.1..1.0f64) {
            let mut rig = rig();
            let target = pt(x, y);
            if let MoveOutcome::Moved { counts, .. } = rig.motion.move_to(&target).unwrap() {
                let l = rig.motors.left.encoder_count().unwrap();
                let r = rig.motors.right.encoder_count().unwrap();
                prop_assert!((l - counts.left).abs() <= 1);
                prop_assert!((r - counts.right).abs() <= 1);
                prop_assert!(rig.motion.location().unwrap().distance_to(&target) < 2e-3);
            }
        }
    }
}
