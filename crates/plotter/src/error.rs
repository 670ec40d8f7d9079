use thiserror::Error;
use wbb_geom::GeomError;

/// The motor driver (or the firmware behind it) reported a problem.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("motor {motor}: {reason}")]
pub struct MotorFault {
    pub motor: String,
    pub reason: String,
}

impl MotorFault {
    pub fn new(motor: impl Into<String>, reason: impl Into<String>) -> Self {
        MotorFault {
            motor: motor.into(),
            reason: reason.into(),
        }
    }
}

/// All errors emitted by the plotter.
///
/// Rejected targets (ones that would run a spool out of its safe range) are not errors: they
/// are logged and reported as `MoveOutcome::Rejected`, and drawing carries on.
#[derive(Error, Debug)]
pub enum PlotterError {
    #[error(transparent)]
    Geom(#[from] GeomError),

    #[error(transparent)]
    Motor(#[from] MotorFault),

    #[error("calibration was cancelled by the operator")]
    CalibrationAborted,

    #[error("calibration measured {edge_encoder_count} degrees along the top edge, expected a positive count")]
    InvalidCalibration { edge_encoder_count: i32 },

    #[error("the plotter is already calibrated")]
    AlreadyCalibrated,

    #[error("spool {spool} was used before it was calibrated")]
    Uncalibrated { spool: String },

    #[error("motors were still moving after {waited_ms} ms")]
    SettleTimeout { waited_ms: u128 },

    #[error("jog input failed: {0:#}")]
    Input(anyhow::Error),
}
