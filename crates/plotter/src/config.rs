use std::time::Duration;

use serde::{Deserialize, Serialize};
use wbb_geom::{Kinematics, Len, LenExt as _, MAX_LENGTH};

/// Physical and tuning parameters of a whiteboard bot.
///
/// Usually deserialized from JSON, where every field is optional:
///
/// ```json
/// { "axle_circumference_cm": 9.4, "max_speed": 150 }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How much string one full turn of a spool winds up, in centimeters.
    pub axle_circumference_cm: f64,
    /// The speed (degrees per second) that moves run at. Above 180 the motors get loud.
    pub max_speed: u32,
    /// Never turn faster than this, whatever the motor claims it can do.
    pub max_safe_speed: u32,
    /// How far one jog press turns the spools during calibration, in degrees.
    pub jog_degrees: i32,
    /// Slack allowed in the triangle test for string lengths, in normalized units.
    pub feasibility_tolerance: f64,
    /// Extra full turns allowed on each side of a spool's safe range, to absorb rounding.
    pub safe_buffer_rotations: i32,
    /// The longest a string may get, as a multiple of the top edge. Capped at
    /// [`wbb_geom::MAX_LENGTH`], the longest string the geometry accepts.
    pub max_length_fraction: f64,
    /// How close (in normalized units) path following needs to get to each point.
    pub close_enough: f64,
    /// The longest single hop path following will command, in normalized units.
    pub max_hop_fraction: f64,
    pub poll_interval_ms: u64,
    pub settle_timeout_ms: u64,
    /// Give up on a path point after this many polls without arriving.
    pub max_polls_per_point: u32,
    /// Draw the outline of the drawing area right after calibration.
    pub trace_boundary: bool,
    pub telemetry_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

impl Config {
    pub fn kinematics(&self) -> Kinematics {
        Kinematics::with_tolerance(self.feasibility_tolerance)
    }

    pub fn axle_circumference(&self) -> Len {
        self.axle_circumference_cm.cm()
    }

    /// The speed that moves actually run at, after applying the safety cap.
    pub fn move_speed(&self) -> u32 {
        self.max_speed.min(self.max_safe_speed).max(1)
    }

    /// The longest string allowed, as a multiple of the top edge, after applying the cap.
    pub fn length_limit(&self) -> f64 {
        self.max_length_fraction.clamp(0.0, MAX_LENGTH)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_secs(self.telemetry_interval_secs)
    }
}

pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            config: Config {
                axle_circumference_cm: 10.0,
                max_speed: 180,
                max_safe_speed: 360 * 4,
                jog_degrees: 360,
                feasibility_tolerance: wbb_geom::DEFAULT_TOLERANCE,
                safe_buffer_rotations: 2,
                max_length_fraction: 1.5,
                close_enough: 0.005,
                max_hop_fraction: 0.1,
                poll_interval_ms: 50,
                settle_timeout_ms: 60_000,
                max_polls_per_point: 2_400,
                trace_boundary: true,
                telemetry_interval_secs: 30,
            },
        }
    }
}

impl ConfigBuilder {
    pub fn build(&self) -> Config {
        self.config.clone()
    }

    pub fn with_axle_circumference(&mut self, circumference: Len) -> &mut Self {
        self.config.axle_circumference_cm = circumference.get();
        self
    }

    pub fn with_max_speed(&mut self, speed: u32) -> &mut Self {
        self.config.max_speed = speed;
        self
    }

    pub fn with_jog_degrees(&mut self, degrees: i32) -> &mut Self {
        self.config.jog_degrees = degrees;
        self
    }

    pub fn with_feasibility_tolerance(&mut self, tolerance: f64) -> &mut Self {
        self.config.feasibility_tolerance = tolerance;
        self
    }

    pub fn with_safe_buffer_rotations(&mut self, rotations: i32) -> &mut Self {
        self.config.safe_buffer_rotations = rotations;
        self
    }

    pub fn with_max_length_fraction(&mut self, fraction: f64) -> &mut Self {
        self.config.max_length_fraction = fraction;
        self
    }

    pub fn with_close_enough(&mut self, close_enough: f64) -> &mut Self {
        self.config.close_enough = close_enough;
        self
    }

    pub fn with_max_hop_fraction(&mut self, fraction: f64) -> &mut Self {
        self.config.max_hop_fraction = fraction;
        self
    }

    pub fn with_poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.config.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_settle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.config.settle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_polls_per_point(&mut self, polls: u32) -> &mut Self {
        self.config.max_polls_per_point = polls;
        self
    }

    pub fn with_trace_boundary(&mut self, trace: bool) -> &mut Self {
        self.config.trace_boundary = trace;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: Config =
            serde_json::from_str(r#"{"max_speed": 120, "feasibility_tolerance": 0.1}"#).unwrap();
        assert_eq!(cfg.max_speed, 120);
        assert_eq!(cfg.kinematics().tolerance, 0.1);
        assert_eq!(cfg.jog_degrees, 360);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn move_speed_is_capped() {
        let mut cfg = ConfigBuilder::default().with_max_speed(5000).build();
        assert_eq!(cfg.move_speed(), 1440);
        cfg.max_speed = 0;
        assert_eq!(cfg.move_speed(), 1);
    }

    #[test]
    fn length_limit_is_capped() {
        let mut cfg = ConfigBuilder::default().with_max_length_fraction(3.0).build();
        assert_eq!(cfg.length_limit(), MAX_LENGTH);
        cfg.max_length_fraction = 1.2;
        assert_eq!(cfg.length_limit(), 1.2);
    }
}
