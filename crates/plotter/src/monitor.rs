use std::sync::Arc;

use log::{debug, warn};
use wbb_geom::{Kinematics, LeftRight, Len, NormalizedPoint, StringLengths};
use wbb_protocol::Snapshot;

use crate::{spool::count_to_length, Battery, MotorDriver, PlotterError, TelemetrySink};

/// A read-only view of where the head is.
///
/// It shares the motor drivers with the plotter but can only read their encoders, so it can
/// be handed to a background task without any risk of it moving anything.
pub struct PositionMonitor<D> {
    drivers: LeftRight<Arc<D>>,
    lengths_at_zero: LeftRight<Len>,
    circumference: Len,
    scale: Len,
    kinematics: Kinematics,
    battery: Arc<dyn Battery>,
}

impl<D> Clone for PositionMonitor<D> {
    fn clone(&self) -> Self {
        PositionMonitor {
            drivers: LeftRight::new(self.drivers.left.clone(), self.drivers.right.clone()),
            lengths_at_zero: self.lengths_at_zero,
            circumference: self.circumference,
            scale: self.scale,
            kinematics: self.kinematics,
            battery: self.battery.clone(),
        }
    }
}

impl<D: MotorDriver> PositionMonitor<D> {
    pub(crate) fn new(
        drivers: LeftRight<Arc<D>>,
        lengths_at_zero: LeftRight<Len>,
        circumference: Len,
        scale: Len,
        kinematics: Kinematics,
        battery: Arc<dyn Battery>,
    ) -> Self {
        PositionMonitor {
            drivers,
            lengths_at_zero,
            circumference,
            scale,
            kinematics,
            battery,
        }
    }

    /// The physical string lengths at the given encoder counts.
    pub fn lengths_at_counts(&self, counts: LeftRight<i32>) -> LeftRight<Len> {
        LeftRight::new(
            count_to_length(counts.left, self.lengths_at_zero.left, self.circumference),
            count_to_length(counts.right, self.lengths_at_zero.right, self.circumference),
        )
    }

    /// Where the head would be with the spools at the given encoder counts.
    pub fn point_at_counts(&self, counts: LeftRight<i32>) -> Result<NormalizedPoint, PlotterError> {
        let lengths = self.lengths_at_counts(counts);
        let normalized = StringLengths::new(
            (lengths.left / self.scale).get(),
            (lengths.right / self.scale).get(),
        )?;
        Ok(self.kinematics.to_point(&normalized)?)
    }

    pub fn snapshot(&self) -> Result<Snapshot, PlotterError> {
        let counts = LeftRight::new(
            self.drivers.left.encoder_count()?,
            self.drivers.right.encoder_count()?,
        );
        let lengths = self.lengths_at_counts(counts);
        let here = self.point_at_counts(counts)?;
        Ok(Snapshot {
            voltage: self.battery.voltage(),
            x: here.x(),
            y: here.y(),
            spool0_length: lengths.left.get(),
            spool1_length: lengths.right.get(),
        })
    }
}

/// Takes one snapshot and publishes it. Failures are logged and otherwise ignored.
pub fn report<D: MotorDriver>(monitor: &PositionMonitor<D>, sink: &mut dyn TelemetrySink) {
    let snapshot = match monitor.snapshot() {
        Ok(s) => s,
        Err(e) => {
            warn!("couldn't read the position for telemetry: {e}");
            return;
        }
    };
    debug!("telemetry: {snapshot:?}");
    if let Err(e) = sink.publish(&snapshot) {
        warn!("couldn't publish telemetry: {e:#}");
    }
}
