// src/hardware/simulated.rs - Software stand-in for the step timer, pins and carriage
//!
//! `SimulatedHardware` implements both collaborator traits and keeps a model of
//! the carriage: every timer overflow moves each pulsing axis one pulse in its
//! programmed direction. Position 0 on an axis is the home switch; the carriage
//! cannot travel past it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};

use super::{Axis, DigitalIo, PulseTimer};
use crate::motion::stepper::StepperDriver;

const SWITCH_FOLLOWS_CARRIAGE: u8 = 0;
const SWITCH_FORCED_OPEN: u8 = 1;
const SWITCH_FORCED_CLOSED: u8 = 2;

#[derive(Debug, Default)]
pub struct SimulatedHardware {
    running: AtomicBool,
    period_us: AtomicU32,
    period_writes: AtomicU32,
    timer_stops: AtomicU32,
    pulses: [AtomicBool; 2],
    negative: [AtomicBool; 2],
    carriage: [AtomicI64; 2],
    switch_mode: [AtomicU8; 2],
    magnet: AtomicBool,
}

impl SimulatedHardware {
    /// Carriage parked against both switches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Carriage `x`/`y` pulses away from the switches.
    pub fn with_carriage_at(x: i64, y: i64) -> Self {
        let hw = Self::default();
        hw.carriage[Axis::X.index()].store(x.max(0), Ordering::SeqCst);
        hw.carriage[Axis::Y.index()].store(y.max(0), Ordering::SeqCst);
        hw
    }

    /// One timer overflow: emit a pulse on every enabled axis, then run the
    /// driver's tick handler. Returns false while the timer is stopped.
    pub fn tick(&self, driver: &StepperDriver) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        for axis in Axis::ALL {
            let i = axis.index();
            if !self.pulses[i].load(Ordering::SeqCst) {
                continue;
            }
            let delta = if self.negative[i].load(Ordering::SeqCst) { -1 } else { 1 };
            let _ = self.carriage[i].fetch_update(Ordering::SeqCst, Ordering::SeqCst, |pos| {
                Some((pos + delta).max(0))
            });
        }
        driver.on_tick();
        true
    }

    /// Ticks until the timer stops or `max_ticks` elapse. Returns the ticks run.
    pub fn run_until_idle(&self, driver: &StepperDriver, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while ticks < max_ticks && self.tick(driver) {
            ticks += 1;
        }
        ticks
    }

    /// Drives the tick handler from a background thread until the returned
    /// `Ticker` is dropped.
    pub fn spawn_ticker(self: &Arc<Self>, driver: Arc<StepperDriver>) -> Ticker {
        let stop = Arc::new(AtomicBool::new(false));
        let hw = Arc::clone(self);
        let flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                if !hw.tick(&driver) {
                    thread::yield_now();
                }
            }
        });
        Ticker {
            stop,
            handle: Some(handle),
        }
    }

    pub fn carriage(&self, axis: Axis) -> i64 {
        self.carriage[axis.index()].load(Ordering::SeqCst)
    }

    /// `Some(state)` pins the switch reading, `None` returns it to the
    /// carriage model.
    pub fn force_limit_switch(&self, axis: Axis, state: Option<bool>) {
        let mode = match state {
            None => SWITCH_FOLLOWS_CARRIAGE,
            Some(false) => SWITCH_FORCED_OPEN,
            Some(true) => SWITCH_FORCED_CLOSED,
        };
        self.switch_mode[axis.index()].store(mode, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn period_micros(&self) -> u32 {
        self.period_us.load(Ordering::SeqCst)
    }

    pub fn period_writes(&self) -> u32 {
        self.period_writes.load(Ordering::SeqCst)
    }

    pub fn timer_stops(&self) -> u32 {
        self.timer_stops.load(Ordering::SeqCst)
    }

    pub fn pulses_enabled(&self, axis: Axis) -> bool {
        self.pulses[axis.index()].load(Ordering::SeqCst)
    }

    pub fn direction_negative(&self, axis: Axis) -> bool {
        self.negative[axis.index()].load(Ordering::SeqCst)
    }

    pub fn magnet_engaged(&self) -> bool {
        self.magnet.load(Ordering::SeqCst)
    }
}

impl PulseTimer for SimulatedHardware {
    fn set_period(&self, micros: u32) {
        self.period_us.store(micros, Ordering::SeqCst);
        self.period_writes.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.timer_stops.fetch_add(1, Ordering::SeqCst);
    }

    fn start_axis_pulses(&self, axis: Axis) {
        self.pulses[axis.index()].store(true, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop_axis_pulses(&self, axis: Axis) {
        self.pulses[axis.index()].store(false, Ordering::SeqCst);
    }
}

impl DigitalIo for SimulatedHardware {
    fn set_direction(&self, axis: Axis, negative: bool) {
        self.negative[axis.index()].store(negative, Ordering::SeqCst);
    }

    fn read_limit_switch(&self, axis: Axis) -> bool {
        match self.switch_mode[axis.index()].load(Ordering::SeqCst) {
            SWITCH_FORCED_OPEN => false,
            SWITCH_FORCED_CLOSED => true,
            _ => self.carriage(axis) == 0,
        }
    }

    fn set_magnet(&self, engaged: bool) {
        self.magnet.store(engaged, Ordering::SeqCst);
    }
}

/// Background tick source; stops and joins its thread on drop.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("simulated ticker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::stepper::DriverSettings;

    #[test]
    fn test_carriage_follows_pulses() {
        let hw = Arc::new(SimulatedHardware::with_carriage_at(100, 100));
        let driver = StepperDriver::new(hw.clone(), hw.clone(), DriverSettings::default()).unwrap();
        driver.move_axis(Axis::X, 30);
        driver.move_axis(Axis::Y, -40);
        let ticks = hw.run_until_idle(&driver, 1_000);
        assert_eq!(ticks, 40);
        assert_eq!(hw.carriage(Axis::X), 130);
        assert_eq!(hw.carriage(Axis::Y), 60);
    }

    #[test]
    fn test_switch_closes_at_zero() {
        let hw = Arc::new(SimulatedHardware::with_carriage_at(2, 5));
        let driver = StepperDriver::new(hw.clone(), hw.clone(), DriverSettings::default()).unwrap();
        assert!(!hw.read_limit_switch(Axis::X));
        driver.move_axis(Axis::X, -10);
        hw.run_until_idle(&driver, 100);
        assert_eq!(hw.carriage(Axis::X), 0);
        assert!(hw.read_limit_switch(Axis::X));

        hw.force_limit_switch(Axis::Y, Some(true));
        assert!(hw.read_limit_switch(Axis::Y));
        hw.force_limit_switch(Axis::Y, None);
        assert!(!hw.read_limit_switch(Axis::Y));
    }

    #[test]
    fn test_ticker_drains_driver() {
        let hw = Arc::new(SimulatedHardware::with_carriage_at(500, 500));
        let driver = Arc::new(
            StepperDriver::new(hw.clone(), hw.clone(), DriverSettings::default()).unwrap(),
        );
        let ticker = hw.spawn_ticker(driver.clone());
        driver.move_axis(Axis::X, 250);
        while driver.is_moving_any() {
            std::thread::yield_now();
        }
        drop(ticker);
        assert_eq!(hw.carriage(Axis::X), 750);
    }
}
