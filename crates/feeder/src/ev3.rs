//! Motors and battery of an EV3 brick running ev3dev, through its sysfs attribute files.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, warn};
use wbb_plotter::{Battery, MotorDriver, MotorFault};

const TACHO_MOTORS: &str = "/sys/class/tacho-motor";
const BATTERY_VOLTAGE: &str = "/sys/class/power_supply/lego-ev3-battery/voltage_now";

#[derive(Default)]
struct SyncState {
    syncing: bool,
    pending: bool,
}

/// A tacho motor, like the EV3 large motor.
///
/// Inside a synchronized bracket the set-points are written straight away but the run command
/// is held back until `end_sync`, so two motors can be started back to back.
pub struct Ev3Motor {
    name: String,
    dir: PathBuf,
    max_speed: u32,
    sync: Mutex<SyncState>,
}

impl Ev3Motor {
    /// Finds the motor plugged into `port` (like "outA" or "ev3-ports:outA").
    pub fn find(port: &str) -> anyhow::Result<Self> {
        Self::find_in(Path::new(TACHO_MOTORS), port)
    }

    fn find_in(class_dir: &Path, port: &str) -> anyhow::Result<Self> {
        for entry in fs::read_dir(class_dir)? {
            let dir = entry?.path();
            let Ok(address) = fs::read_to_string(dir.join("address")) else {
                continue;
            };
            let address = address.trim();
            if address == port || address.ends_with(&format!(":{port}")) {
                return Ok(Self::open(dir, port)?);
            }
        }
        anyhow::bail!("no tacho motor on port {port} in {}", class_dir.display())
    }

    fn open(dir: PathBuf, port: &str) -> Result<Self, MotorFault> {
        let mut motor = Ev3Motor {
            name: port.to_owned(),
            dir,
            max_speed: 0,
            sync: Mutex::new(SyncState::default()),
        };
        motor.max_speed = motor.read_attr("max_speed")?.parse().map_err(|e| {
            MotorFault::new(port, format!("bad max_speed: {e}"))
        })?;
        debug!("found {port} at {}", motor.dir.display());
        Ok(motor)
    }

    fn fault(&self, what: impl std::fmt::Display) -> MotorFault {
        MotorFault::new(&self.name, what.to_string())
    }

    fn read_attr(&self, attr: &str) -> Result<String, MotorFault> {
        fs::read_to_string(self.dir.join(attr))
            .map(|s| s.trim().to_owned())
            .map_err(|e| self.fault(format_args!("reading {attr}: {e}")))
    }

    fn write_attr(&self, attr: &str, value: impl std::fmt::Display) -> Result<(), MotorFault> {
        fs::write(self.dir.join(attr), value.to_string())
            .map_err(|e| self.fault(format_args!("writing {attr}: {e}")))
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.sync.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn wait_until_stopped(&self) -> Result<(), MotorFault> {
        while self.is_moving()? {
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }
}

impl MotorDriver for Ev3Motor {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_speed(&self) -> u32 {
        self.max_speed
    }

    fn reset_encoder(&self) -> Result<(), MotorFault> {
        self.write_attr("position", 0)
    }

    fn encoder_count(&self) -> Result<i32, MotorFault> {
        let position = self.read_attr("position")?;
        position
            .parse()
            .map_err(|e| self.fault(format_args!("bad position {position:?}: {e}")))
    }

    fn is_moving(&self) -> Result<bool, MotorFault> {
        let state = self.read_attr("state")?;
        Ok(state.split_whitespace().any(|s| s == "running"))
    }

    fn rotate_to(&self, count: i32, speed: u32, blocking: bool) -> Result<(), MotorFault> {
        self.write_attr("stop_action", "hold")?;
        self.write_attr("speed_sp", speed.min(self.max_speed))?;
        self.write_attr("position_sp", count)?;
        {
            let mut sync = self.lock();
            if sync.syncing {
                sync.pending = true;
                return Ok(());
            }
        }
        self.write_attr("command", "run-to-abs-pos")?;
        if blocking {
            self.wait_until_stopped()?;
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), MotorFault> {
        self.write_attr("stop_action", "hold")?;
        self.write_attr("command", "stop")
    }

    fn release(&self) -> Result<(), MotorFault> {
        self.write_attr("stop_action", "coast")?;
        self.write_attr("command", "stop")
    }

    fn begin_sync(&self) -> Result<(), MotorFault> {
        *self.lock() = SyncState {
            syncing: true,
            pending: false,
        };
        Ok(())
    }

    fn end_sync(&self, start: bool) -> Result<(), MotorFault> {
        let pending = std::mem::take(&mut *self.lock()).pending;
        if start && pending {
            self.write_attr("command", "run-to-abs-pos")?;
        }
        Ok(())
    }
}

/// The brick's battery. Reads as NaN if the voltage can't be read.
pub struct Ev3Battery {
    path: PathBuf,
}

impl Default for Ev3Battery {
    fn default() -> Self {
        Ev3Battery {
            path: PathBuf::from(BATTERY_VOLTAGE),
        }
    }
}

impl Battery for Ev3Battery {
    fn voltage(&self) -> f64 {
        // Reported in microvolts.
        match fs::read_to_string(&self.path).map(|s| s.trim().parse::<f64>()) {
            Ok(Ok(uv)) => uv / 1e6,
            Ok(Err(e)) => {
                warn!("bad battery voltage: {e}");
                f64::NAN
            }
            Err(e) => {
                warn!("couldn't read the battery voltage: {e}");
                f64::NAN
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A fake sysfs tree with a single motor on outB.
    struct FakeSysfs {
        root: PathBuf,
    }

    impl FakeSysfs {
        fn new(test: &str) -> Self {
            let root = std::env::temp_dir().join(format!("wbb-ev3-{}-{test}", std::process::id()));
            let motor = root.join("motor3");
            fs::create_dir_all(&motor).unwrap();
            for (attr, value) in [
                ("address", "ev3-ports:outB\n"),
                ("max_speed", "1050\n"),
                ("position", "-15\n"),
                ("state", "running ramping\n"),
                ("command", ""),
                ("stop_action", "coast\n"),
                ("speed_sp", "0\n"),
                ("position_sp", "0\n"),
            ] {
                fs::write(motor.join(attr), value).unwrap();
            }
            FakeSysfs { root }
        }

        fn attr(&self, attr: &str) -> String {
            fs::read_to_string(self.root.join("motor3").join(attr)).unwrap()
        }
    }

    impl Drop for FakeSysfs {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    #[test]
    fn finds_and_reads() {
        let sys = FakeSysfs::new("reads");
        assert!(Ev3Motor::find_in(&sys.root, "outA").is_err());
        let m = Ev3Motor::find_in(&sys.root, "outB").unwrap();
        assert_eq!(m.max_speed(), 1050);
        assert_eq!(m.encoder_count().unwrap(), -15);
        assert!(m.is_moving().unwrap());

        m.reset_encoder().unwrap();
        assert_eq!(m.encoder_count().unwrap(), 0);
    }

    #[test]
    fn commands_wait_for_the_bracket() {
        let sys = FakeSysfs::new("sync");
        let m = Ev3Motor::find_in(&sys.root, "ev3-ports:outB").unwrap();

        m.begin_sync().unwrap();
        m.rotate_to(720, 5000, false).unwrap();
        assert_eq!(sys.attr("position_sp"), "720");
        assert_eq!(sys.attr("speed_sp"), "1050");
        assert_eq!(sys.attr("command"), "");
        m.end_sync(true).unwrap();
        assert_eq!(sys.attr("command"), "run-to-abs-pos");

        m.release().unwrap();
        assert_eq!(sys.attr("stop_action"), "coast");
        assert_eq!(sys.attr("command"), "stop");

        m.begin_sync().unwrap();
        m.rotate_to(0, 100, false).unwrap();
        m.end_sync(false).unwrap();
        assert_eq!(sys.attr("command"), "stop");
    }

    #[test]
    fn battery_in_volts() {
        let sys = FakeSysfs::new("battery");
        let path = sys.root.join("voltage_now");
        fs::write(&path, "7512000\n").unwrap();
        let battery = Ev3Battery { path };
        assert!((battery.voltage() - 7.512).abs() < 1e-9);

        let missing = Ev3Battery {
            path: sys.root.join("nope"),
        };
        assert!(missing.voltage().is_nan());
    }
}
