//! Values exchanged between the plotter core and the things around it: the manual jog
//! buttons, whoever asks about calibration, and the telemetry sink.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One press of the manual control used during calibration.
///
/// The four directions move the head towards that side of the board by turning both spools
/// at once; `Confirm` accepts the current corner and `Cancel` bails out of calibration.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Jog {
    Up,
    Down,
    Left,
    Right,
    Confirm,
    Cancel,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown jog symbol {0:?}, expected one of u, d, l, r, c (confirm), x (cancel)")]
pub struct UnknownJog(pub char);

impl Jog {
    /// Parses the single-letter spelling used for scripted calibrations.
    pub fn from_char(c: char) -> Result<Jog, UnknownJog> {
        match c.to_ascii_lowercase() {
            'u' => Ok(Jog::Up),
            'd' => Ok(Jog::Down),
            'l' => Ok(Jog::Left),
            'r' => Ok(Jog::Right),
            'c' => Ok(Jog::Confirm),
            'x' => Ok(Jog::Cancel),
            _ => Err(UnknownJog(c)),
        }
    }

    /// Parses a whole script like `"llcrrc"`, ignoring whitespace and commas.
    pub fn parse_script(s: &str) -> Result<Vec<Jog>, UnknownJog> {
        s.chars()
            .filter(|c| !c.is_whitespace() && *c != ',')
            .map(Jog::from_char)
            .collect()
    }
}

/// Which corner the calibration is currently asking for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Corner {
    UpperLeft,
    UpperRight,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CalibrationStatus {
    Uncalibrated,
    AwaitingCorner(Corner),
    Calibrated(Calibration),
}

/// What calibration found out about the board.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// How many encoder degrees the left spool turned between the two top corners.
    pub edge_encoder_count: i32,
    /// The same distance as string, in centimeters.
    pub scale_cm: f64,
}

/// A periodic report of where the head is, for whoever is watching.
///
/// Serializes to a flat object of numbers:
/// `{"voltage":7.9,"x":0.5,"y":0.5,"spool0Length":70.7,"spool1Length":70.7}`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub voltage: f64,
    pub x: f64,
    pub y: f64,
    pub spool0_length: f64,
    pub spool1_length: f64,
}

impl Snapshot {
    /// The same values as key/value pairs, with the same keys as the serialized form.
    pub fn entries(&self) -> [(&'static str, f64); 5] {
        [
            ("voltage", self.voltage),
            ("x", self.x),
            ("y", self.y),
            ("spool0Length", self.spool0_length),
            ("spool1Length", self.spool1_length),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jog_script() {
        use Jog::*;
        assert_eq!(
            Jog::parse_script("LL c, rr C").unwrap(),
            vec![Left, Left, Confirm, Right, Right, Confirm]
        );
        assert_eq!(Jog::parse_script("lq"), Err(UnknownJog('q')));
    }

    #[test]
    fn snapshot_keys_match_entries() {
        let snap = Snapshot {
            voltage: 7.5,
            x: 0.25,
            y: 0.5,
            spool0_length: 10.0,
            spool1_length: 20.0,
        };
        let json = serde_json::to_value(snap).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 5);
        for (k, v) in snap.entries() {
            assert_eq!(obj[k].as_f64(), Some(v));
        }
    }
}
