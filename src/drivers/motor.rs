//! Four-channel peristaltic pump motor driver (2× TB6612FNG H-bridge).
//!
//! Full-speed digital drive: dosing precision comes from runtime, so the
//! PWM inputs are switched as plain outputs. Both bridge ICs share one
//! standby line, energised lazily before the first start and dropped on
//! emergency stop.
//!
//! The driver is a process-wide shared resource. All pin and state access
//! goes through one internal mutex; `emergency_stop_all` is legal from any
//! task. An emergency stop also bumps a generation counter and wakes every
//! waiter in [`sleep_interruptible`], which is how an in-flight dispense
//! notices the preemption instead of sleeping to completion.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::adapters::time::SystemClock;
use crate::config::NUM_HEADS;
use crate::drivers::hw_init;
use crate::error::ActuatorError;
use crate::pins;
use log::{info, warn};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorDirection {
    Forward,
    Reverse,
}

/// H-bridge input states for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinDrive {
    /// IN1=H IN2=L PWM=H
    Forward,
    /// IN1=L IN2=H PWM=H
    Reverse,
    /// All low — coast.
    Coast,
    /// IN1=H IN2=H PWM=H — short brake.
    Brake,
}

/// Bookkeeping for one motor channel.
#[derive(Debug, Clone, Copy)]
pub struct MotorState {
    pub running: bool,
    pub direction: Option<MotorDirection>,
    /// Monotonic ms when the current run started.
    pub started_at_ms: u64,
    /// Duration of the last completed run.
    pub last_run_ms: u64,
}

impl MotorState {
    const fn stopped() -> Self {
        Self {
            running: false,
            direction: None,
            started_at_ms: 0,
            last_run_ms: 0,
        }
    }
}

struct Bank {
    initialized: bool,
    standby_on: bool,
    states: [MotorState; NUM_HEADS],
}

pub struct MotorDriver {
    clock: Arc<SystemClock>,
    bank: Mutex<Bank>,
    /// Emergency-stop generation; bumped on every `emergency_stop_all`.
    estop_gen: Mutex<u64>,
    estop_cv: Condvar,
}

impl MotorDriver {
    pub fn new(clock: Arc<SystemClock>) -> Self {
        Self {
            clock,
            bank: Mutex::new(Bank {
                initialized: false,
                standby_on: false,
                states: [MotorState::stopped(); NUM_HEADS],
            }),
            estop_gen: Mutex::new(0),
            estop_cv: Condvar::new(),
        }
    }

    /// Drive every channel to coast and the standby line low.
    pub fn begin(&self) {
        let mut bank = self.lock_bank();
        for head in 0..NUM_HEADS {
            Self::drive(head, PinDrive::Coast);
        }
        hw_init::gpio_write(pins::MOTOR_STBY_PIN, false);
        bank.standby_on = false;
        bank.initialized = true;
        info!("MotorDriver: {} channels ready (standby low)", NUM_HEADS);
    }

    /// Start a motor at full speed in the given direction.
    pub fn start(&self, head: usize, direction: MotorDirection) -> Result<(), ActuatorError> {
        let mut bank = self.checked_bank(head)?;

        if !bank.standby_on {
            hw_init::gpio_write(pins::MOTOR_STBY_PIN, true);
            bank.standby_on = true;
        }

        let drive = match direction {
            MotorDirection::Forward => PinDrive::Forward,
            MotorDirection::Reverse => PinDrive::Reverse,
        };
        Self::drive(head, drive);

        let state = &mut bank.states[head];
        state.running = true;
        state.direction = Some(direction);
        state.started_at_ms = self.clock.monotonic_ms();
        Ok(())
    }

    /// Stop a motor (coast).
    pub fn stop(&self, head: usize) -> Result<(), ActuatorError> {
        let mut bank = self.checked_bank(head)?;
        Self::drive(head, PinDrive::Coast);
        self.mark_stopped(&mut bank, head);
        bank.states[head].direction = None;
        Ok(())
    }

    /// Short-brake a motor (both bridge inputs high).
    pub fn brake(&self, head: usize) -> Result<(), ActuatorError> {
        let mut bank = self.checked_bank(head)?;
        Self::drive(head, PinDrive::Brake);
        self.mark_stopped(&mut bank, head);
        bank.states[head].direction = None;
        Ok(())
    }

    /// Brake every channel, drop the standby line, and wake all
    /// interruptible sleepers so in-flight dispenses return promptly.
    pub fn emergency_stop_all(&self) {
        warn!("MotorDriver: EMERGENCY STOP");
        {
            let mut bank = self.lock_bank();
            for head in 0..NUM_HEADS {
                Self::drive(head, PinDrive::Brake);
                self.mark_stopped(&mut bank, head);
                bank.states[head].direction = None;
            }
            hw_init::gpio_write(pins::MOTOR_STBY_PIN, false);
            bank.standby_on = false;
        }

        let mut gen = self.lock_gen();
        *gen = gen.wrapping_add(1);
        self.estop_cv.notify_all();
    }

    pub fn is_running(&self, head: usize) -> bool {
        if head >= NUM_HEADS {
            return false;
        }
        self.lock_bank().states[head].running
    }

    /// Runtime of the current run, or duration of the last completed one.
    pub fn runtime_ms(&self, head: usize) -> u64 {
        if head >= NUM_HEADS {
            return 0;
        }
        let bank = self.lock_bank();
        let state = &bank.states[head];
        if state.running {
            self.clock.monotonic_ms().wrapping_sub(state.started_at_ms)
        } else {
            state.last_run_ms
        }
    }

    pub fn state(&self, head: usize) -> Option<MotorState> {
        if head >= NUM_HEADS {
            return None;
        }
        Some(self.lock_bank().states[head])
    }

    /// Suspend the calling task for `duration_ms`, waking early if an
    /// emergency stop fires. Returns `true` when the full duration elapsed,
    /// `false` when interrupted.
    pub fn sleep_interruptible(&self, duration_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(duration_ms);
        let mut gen = self.lock_gen();
        let start_gen = *gen;

        loop {
            if *gen != start_gen {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (guard, _timeout) = self
                .estop_cv
                .wait_timeout(gen, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            gen = guard;
        }
    }

    // ── Internals ─────────────────────────────────────────────

    fn lock_bank(&self) -> MutexGuard<'_, Bank> {
        self.bank.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_gen(&self) -> MutexGuard<'_, u64> {
        self.estop_gen.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn checked_bank(&self, head: usize) -> Result<MutexGuard<'_, Bank>, ActuatorError> {
        if head >= NUM_HEADS {
            return Err(ActuatorError::InvalidHead);
        }
        let bank = self.lock_bank();
        if !bank.initialized {
            return Err(ActuatorError::NotInitialized);
        }
        Ok(bank)
    }

    fn mark_stopped(&self, bank: &mut Bank, head: usize) {
        let now = self.clock.monotonic_ms();
        let state = &mut bank.states[head];
        if state.running {
            state.last_run_ms = now.wrapping_sub(state.started_at_ms);
            state.running = false;
        }
    }

    fn drive(head: usize, drive: PinDrive) {
        let mp = &pins::MOTOR_PINS[head];
        let (in1, in2, pwm) = match drive {
            PinDrive::Forward => (true, false, true),
            PinDrive::Reverse => (false, true, true),
            PinDrive::Coast => (false, false, false),
            PinDrive::Brake => (true, true, true),
        };
        hw_init::gpio_write(mp.in1, in1);
        hw_init::gpio_write(mp.in2, in2);
        hw_init::gpio_write(mp.pwm, pwm);
    }
}
