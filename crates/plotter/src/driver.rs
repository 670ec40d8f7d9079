use log::warn;

use crate::MotorFault;

/// A regulated motor with a rotation encoder, as seen from the host.
///
/// Positions are encoder degrees and speeds are degrees per second. Every method takes
/// `&self`: the position readers (see `PositionMonitor`) share the driver with the spool
/// that commands it, so implementations are expected to do their own locking.
pub trait MotorDriver: Send + Sync {
    /// A short name for logs, like "left" or "outA".
    fn name(&self) -> &str;

    /// The fastest this motor can turn right now, in degrees per second.
    fn max_speed(&self) -> u32;

    /// Declares the current position to be encoder count zero.
    fn reset_encoder(&self) -> Result<(), MotorFault>;

    fn encoder_count(&self) -> Result<i32, MotorFault>;

    fn is_moving(&self) -> Result<bool, MotorFault>;

    /// Turns to an absolute encoder count. If `blocking` is false this returns as soon as the
    /// command is accepted.
    fn rotate_to(&self, count: i32, speed: u32, blocking: bool) -> Result<(), MotorFault>;

    /// Stops and holds the current position.
    fn stop(&self) -> Result<(), MotorFault>;

    /// Cuts power so the motor spins freely.
    fn release(&self) -> Result<(), MotorFault>;

    /// Starts collecting commands instead of running them.
    fn begin_sync(&self) -> Result<(), MotorFault>;

    /// Runs the commands collected since `begin_sync` if `start` is true, drops them otherwise.
    fn end_sync(&self, start: bool) -> Result<(), MotorFault>;
}

/// Issues the commands in `f` to both motors as one unit: neither motor starts moving until
/// both have received their commands.
pub(crate) fn synchronized<D, T, E>(
    left: &D,
    right: &D,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, E>
where
    D: MotorDriver + ?Sized,
    E: From<MotorFault>,
{
    left.begin_sync()?;
    if let Err(e) = right.begin_sync() {
        if let Err(fault) = left.end_sync(false) {
            warn!("couldn't cancel the synchronized move: {fault}");
        }
        return Err(e.into());
    }

    match f() {
        Ok(t) => {
            // Both brackets get closed, even if the first one fails.
            let l = left.end_sync(true);
            let r = right.end_sync(true);
            l?;
            r?;
            Ok(t)
        }
        Err(e) => {
            // Neither motor may start alone.
            for motor in [left, right] {
                if let Err(fault) = motor.end_sync(false) {
                    warn!("couldn't cancel the synchronized move: {fault}");
                }
            }
            Err(e)
        }
    }
}
