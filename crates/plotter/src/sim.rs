//! A motor that only exists in memory.
//!
//! It keeps a log of every command it receives, which is what the tests (and the feeder's
//! SVG output) look at. By default moves finish the instant they start; `realtime` motors
//! instead turn at their commanded speed against the wall clock.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
    time::Instant,
};

use crate::{Battery, MotorDriver, MotorFault};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MotorCommand {
    ResetEncoder,
    RotateTo { count: i32, speed: u32, blocking: bool },
    Stop,
    Release,
    BeginSync,
    EndSync { start: bool },
}

/// Operations that can be made to fail, see [`SimulatedMotor::fail_on`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MotorOp {
    ResetEncoder,
    RotateTo,
    Stop,
    Release,
    EndSync,
}

#[derive(Clone, Copy, Debug)]
struct Sweep {
    from: f64,
    to: f64,
    speed: f64,
    started: Instant,
}

impl Sweep {
    fn position(&self, now: Instant) -> f64 {
        let travelled = self.speed * now.saturating_duration_since(self.started).as_secs_f64();
        let dist = self.to - self.from;
        if travelled >= dist.abs() {
            self.to
        } else {
            self.from + travelled.copysign(dist)
        }
    }

    fn is_done(&self, now: Instant) -> bool {
        self.position(now) == self.to
    }
}

#[derive(Debug)]
struct MotorState {
    // Absolute shaft angle, in degrees.
    angle: f64,
    zero: f64,
    sweep: Option<Sweep>,
    syncing: bool,
    pending: Option<(i32, u32)>,
    released: bool,
    log: Vec<MotorCommand>,
    synced_targets: Vec<i32>,
    // Moves that started while the previous one was still under way.
    overtaken: usize,
    faults: HashSet<MotorOp>,
}

impl MotorState {
    fn settle(&mut self, now: Instant) {
        if let Some(sweep) = self.sweep {
            self.angle = sweep.position(now);
            if sweep.is_done(now) {
                self.sweep = None;
            }
        }
    }

    fn start(&mut self, count: i32, speed: u32, realtime: bool) {
        let now = Instant::now();
        self.settle(now);
        if self.sweep.is_some() {
            self.overtaken += 1;
        }
        self.released = false;
        let to = self.zero + f64::from(count);
        if realtime && speed > 0 {
            self.sweep = Some(Sweep {
                from: self.angle,
                to,
                speed: f64::from(speed),
                started: now,
            });
        } else {
            self.sweep = None;
            self.angle = to;
        }
    }
}

/// A simulated regulated motor. Clones share the same motor, so a test can keep a handle
/// while the plotter owns another.
#[derive(Clone, Debug)]
pub struct SimulatedMotor {
    name: Arc<str>,
    max_speed: u32,
    realtime: bool,
    state: Arc<Mutex<MotorState>>,
}

impl SimulatedMotor {
    pub fn new(name: &str) -> Self {
        SimulatedMotor {
            name: name.into(),
            max_speed: 900,
            realtime: false,
            state: Arc::new(Mutex::new(MotorState {
                angle: 0.0,
                zero: 0.0,
                sweep: None,
                syncing: false,
                pending: None,
                released: false,
                log: Vec::new(),
                synced_targets: Vec::new(),
                overtaken: 0,
                faults: HashSet::new(),
            })),
        }
    }

    /// Moves take as long as they would on a real motor.
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    pub fn with_max_speed(mut self, max_speed: u32) -> Self {
        self.max_speed = max_speed;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MotorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes every future `op` fail with a `MotorFault`.
    pub fn fail_on(&self, op: MotorOp) {
        self.lock().faults.insert(op);
    }

    fn check(&self, state: &MotorState, op: MotorOp) -> Result<(), MotorFault> {
        if state.faults.contains(&op) {
            Err(MotorFault::new(&*self.name, format!("simulated {op:?} failure")))
        } else {
            Ok(())
        }
    }

    pub fn commands(&self) -> Vec<MotorCommand> {
        self.lock().log.clone()
    }

    /// How many rotate commands this motor has received.
    pub fn rotate_count(&self) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|c| matches!(c, MotorCommand::RotateTo { .. }))
            .count()
    }

    /// The targets of every rotation that was started as part of a synchronized pair, in order.
    pub fn synchronized_targets(&self) -> Vec<i32> {
        self.lock().synced_targets.clone()
    }

    /// How many moves were started before the previous move had finished.
    pub fn overtaken_moves(&self) -> usize {
        self.lock().overtaken
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }
}

impl MotorDriver for SimulatedMotor {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_speed(&self) -> u32 {
        self.max_speed
    }

    fn reset_encoder(&self) -> Result<(), MotorFault> {
        let mut state = self.lock();
        self.check(&state, MotorOp::ResetEncoder)?;
        state.log.push(MotorCommand::ResetEncoder);
        state.settle(Instant::now());
        state.zero = state.angle;
        Ok(())
    }

    fn encoder_count(&self) -> Result<i32, MotorFault> {
        let mut state = self.lock();
        state.settle(Instant::now());
        Ok((state.angle - state.zero).round() as i32)
    }

    fn is_moving(&self) -> Result<bool, MotorFault> {
        let mut state = self.lock();
        state.settle(Instant::now());
        Ok(state.sweep.is_some())
    }

    fn rotate_to(&self, count: i32, speed: u32, blocking: bool) -> Result<(), MotorFault> {
        let sweep = {
            let mut state = self.lock();
            self.check(&state, MotorOp::RotateTo)?;
            state.log.push(MotorCommand::RotateTo {
                count,
                speed,
                blocking,
            });
            if state.syncing {
                state.pending = Some((count, speed));
                return Ok(());
            }
            state.start(count, speed, self.realtime);
            state.sweep
        };

        if let (true, Some(sweep)) = (blocking, sweep) {
            let remaining = (sweep.to - sweep.from).abs() / sweep.speed;
            std::thread::sleep(std::time::Duration::from_secs_f64(remaining));
            self.lock().settle(Instant::now());
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), MotorFault> {
        let mut state = self.lock();
        self.check(&state, MotorOp::Stop)?;
        state.log.push(MotorCommand::Stop);
        state.settle(Instant::now());
        state.sweep = None;
        Ok(())
    }

    fn release(&self) -> Result<(), MotorFault> {
        let mut state = self.lock();
        self.check(&state, MotorOp::Release)?;
        state.log.push(MotorCommand::Release);
        state.settle(Instant::now());
        state.sweep = None;
        state.released = true;
        Ok(())
    }

    fn begin_sync(&self) -> Result<(), MotorFault> {
        let mut state = self.lock();
        state.log.push(MotorCommand::BeginSync);
        state.syncing = true;
        state.pending = None;
        Ok(())
    }

    fn end_sync(&self, start: bool) -> Result<(), MotorFault> {
        let mut state = self.lock();
        self.check(&state, MotorOp::EndSync)?;
        state.log.push(MotorCommand::EndSync { start });
        state.syncing = false;
        if let (true, Some((count, speed))) = (start, state.pending.take()) {
            state.synced_targets.push(count);
            state.start(count, speed, self.realtime);
        }
        Ok(())
    }
}

/// A battery that always reads the same voltage.
#[derive(Clone, Copy, Debug)]
pub struct SimulatedBattery(pub f64);

impl Battery for SimulatedBattery {
    fn voltage(&self) -> f64 {
        self.0
    }
}
