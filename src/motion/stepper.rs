// src/motion/stepper.rs - Interrupt-driven step counting for the two gantry axes
//!
//! Each axis keeps a signed count of pulses still to emit. The main loop adds to
//! the count when it issues a move, and the timer's tick handler walks it back
//! toward zero, one pulse per overflow. The counters are the only state shared
//! between the two contexts.
//!
//! Every sequence that changes a counter *and* reprograms the pulse timer runs
//! inside a critical section. The tick handler never waits for it: a tick that
//! lands while the section is held is deferred and replayed on the next tick,
//! the same way a masked interrupt fires once the mask is lifted.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::hardware::{Axis, DigitalIo, PulseTimer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("speed must be greater than zero steps per second")]
    InvalidSpeed,
    #[error("microstep factor must be greater than zero")]
    InvalidMicrosteps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// Logical steps per second.
    pub speed: u32,
    pub microsteps: u32,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            speed: 100,
            microsteps: 1,
        }
    }
}

/// Timer period in microseconds for `speed` logical steps per second.
pub fn step_period_micros(speed: u32, microsteps: u32) -> Result<u32, DriverError> {
    if speed == 0 {
        return Err(DriverError::InvalidSpeed);
    }
    if microsteps == 0 || i32::try_from(microsteps).is_err() {
        return Err(DriverError::InvalidMicrosteps);
    }
    Ok(1_000_000 / speed / microsteps)
}

pub struct StepperDriver {
    remaining: [AtomicI32; 2],
    speed: AtomicU32,
    microsteps: AtomicU32,
    period_us: AtomicU32,
    section: Mutex<()>,
    deferred_ticks: AtomicU32,
    timer: Arc<dyn PulseTimer>,
    io: Arc<dyn DigitalIo>,
}

impl StepperDriver {
    pub fn new(
        timer: Arc<dyn PulseTimer>,
        io: Arc<dyn DigitalIo>,
        settings: DriverSettings,
    ) -> Result<Self, DriverError> {
        let period = step_period_micros(settings.speed, settings.microsteps)?;
        timer.stop();
        for axis in Axis::ALL {
            timer.stop_axis_pulses(axis);
            io.set_direction(axis, false);
        }
        Ok(Self {
            remaining: [AtomicI32::new(0), AtomicI32::new(0)],
            speed: AtomicU32::new(settings.speed),
            microsteps: AtomicU32::new(settings.microsteps),
            period_us: AtomicU32::new(period),
            section: Mutex::new(()),
            deferred_ticks: AtomicU32::new(0),
            timer,
            io,
        })
    }

    pub fn speed(&self) -> u32 {
        self.speed.load(Ordering::Relaxed)
    }

    pub fn microsteps(&self) -> u32 {
        self.microsteps.load(Ordering::Relaxed)
    }

    pub fn step_period(&self) -> u32 {
        self.period_us.load(Ordering::Relaxed)
    }

    /// Changes the step rate. A running move keeps its remaining count; only
    /// the timer period is reprogrammed.
    pub fn set_speed(&self, speed: u32) -> Result<(), DriverError> {
        if speed == self.speed() {
            return Ok(());
        }
        let period = step_period_micros(speed, self.microsteps())?;
        self.critical(|| {
            self.speed.store(speed, Ordering::Relaxed);
            self.period_us.store(period, Ordering::Relaxed);
            if self.is_moving_any() {
                self.timer.set_period(period);
            }
        });
        tracing::debug!(speed, period, "stepper speed changed");
        Ok(())
    }

    pub fn set_microsteps(&self, microsteps: u32) -> Result<(), DriverError> {
        if microsteps == self.microsteps() {
            return Ok(());
        }
        let period = step_period_micros(self.speed(), microsteps)?;
        self.critical(|| {
            self.microsteps.store(microsteps, Ordering::Relaxed);
            self.period_us.store(period, Ordering::Relaxed);
            if self.is_moving_any() {
                self.timer.set_period(period);
            }
        });
        Ok(())
    }

    /// Adds `steps` logical steps to `axis`. Counts accumulate: a move issued
    /// while the axis is still running is netted against what is left.
    pub fn move_axis(&self, axis: Axis, steps: i32) {
        if steps == 0 {
            return;
        }
        // bounded by step_period_micros when the factor was stored
        let factor = i32::try_from(self.microsteps()).unwrap_or(i32::MAX);
        let pulses = steps.saturating_mul(factor);
        self.critical(|| {
            let driver_was_moving = self.is_moving_any();
            let counter = &self.remaining[axis.index()];
            let before = counter.load(Ordering::SeqCst);
            let after = before.saturating_add(pulses);
            counter.store(after, Ordering::SeqCst);

            if after == 0 {
                self.disable_axis_locked(axis);
                return;
            }
            self.io.set_direction(axis, after < 0);
            if before == 0 {
                // Only the first axis programs the period; the second one
                // joins the running timer without touching its phase.
                if !driver_was_moving {
                    self.timer.set_period(self.step_period());
                }
                self.timer.start_axis_pulses(axis);
            }
        });
    }

    /// Timer overflow handler. Never blocks and never allocates.
    pub fn on_tick(&self) {
        {
            let Some(_guard) = self.section.try_lock() else {
                self.deferred_ticks.fetch_add(1, Ordering::AcqRel);
                return;
            };
            let ticks = 1 + self.deferred_ticks.swap(0, Ordering::AcqRel);
            self.apply_ticks_locked(ticks);
        }
        self.flush_deferred();
    }

    // Caller holds the critical section.
    fn apply_ticks_locked(&self, ticks: u32) {
        for _ in 0..ticks {
            for axis in Axis::ALL {
                let counter = &self.remaining[axis.index()];
                let left = counter.load(Ordering::SeqCst);
                if left == 0 {
                    continue;
                }
                let next = left - left.signum();
                counter.store(next, Ordering::SeqCst);
                if next == 0 {
                    self.disable_axis_locked(axis);
                }
            }
        }
    }

    /// With `force == false` this is a no-op on an idle axis.
    pub fn stop_axis(&self, axis: Axis, force: bool) {
        self.critical(|| {
            if !force && !self.is_moving(axis) {
                return;
            }
            self.disable_axis_locked(axis);
        });
    }

    pub fn stop_all(&self, force: bool) {
        self.critical(|| {
            if !force && !self.is_moving_any() {
                return;
            }
            for axis in Axis::ALL {
                self.remaining[axis.index()].store(0, Ordering::SeqCst);
                self.timer.stop_axis_pulses(axis);
            }
            self.timer.stop();
        });
    }

    pub fn is_moving(&self, axis: Axis) -> bool {
        self.left(axis) != 0
    }

    pub fn is_moving_any(&self) -> bool {
        Axis::ALL.iter().any(|&axis| self.is_moving(axis))
    }

    /// Signed pulses still to emit on `axis`; negative means travel toward the
    /// home switch.
    pub fn left(&self, axis: Axis) -> i32 {
        self.remaining[axis.index()].load(Ordering::SeqCst)
    }

    /// Runs `f` with the tick handler masked. Ticks deferred before the
    /// section starts are applied to the state they fired against; ticks
    /// deferred during it fire as soon as it ends.
    fn critical<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = {
            let _guard = self.section.lock();
            self.apply_ticks_locked(self.deferred_ticks.swap(0, Ordering::AcqRel));
            f()
        };
        self.flush_deferred();
        result
    }

    fn flush_deferred(&self) {
        while self.deferred_ticks.load(Ordering::Acquire) > 0 {
            // whoever holds the section picks the ticks up when it releases
            let Some(_guard) = self.section.try_lock() else {
                return;
            };
            self.apply_ticks_locked(self.deferred_ticks.swap(0, Ordering::AcqRel));
        }
    }

    // Caller holds the critical section.
    fn disable_axis_locked(&self, axis: Axis) {
        self.remaining[axis.index()].store(0, Ordering::SeqCst);
        self.timer.stop_axis_pulses(axis);
        if !self.is_moving_any() {
            self.timer.stop();
        }
    }
}

impl std::fmt::Debug for StepperDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepperDriver")
            .field("left_x", &self.left(Axis::X))
            .field("left_y", &self.left(Axis::Y))
            .field("speed", &self.speed())
            .field("microsteps", &self.microsteps())
            .finish()
    }
}
