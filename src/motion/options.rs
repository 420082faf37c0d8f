//! Options controlling how the motion controller sequences operations.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crate::config::AxisConfig;

/// A flag for cancelling a wait for an axis to become idle.
///
/// Clones share the same flag, so a clone can be handed to another thread
/// and cancelled from there.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Cancel any current and future waits.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Allow waits again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether the token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the start velocity of a temporarily overridden velocity table slot is chosen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartVelocity {
    /// A fraction of the new maximum velocity.
    FractionOfMax(f64),
    /// A fixed number of pulses per second.
    Fixed(i64),
    /// The axis' configured `start_velocity_pulse`.
    AxisDefault,
}

impl StartVelocity {
    /// The start velocity, in pulses per second, for a slot whose maximum
    /// velocity is `max_pulse`.
    ///
    /// The result never exceeds `max_pulse` and is never negative.
    pub fn start_pulse(&self, max_pulse: i64, axis: &AxisConfig) -> i64 {
        let pulse = match *self {
            StartVelocity::FractionOfMax(fraction) => (max_pulse as f64 * fraction).trunc() as i64,
            StartVelocity::Fixed(pulse) => pulse,
            StartVelocity::AxisDefault => axis.start_velocity_pulse.trunc() as i64,
        };
        pulse.clamp(0, max_pulse.max(0))
    }
}

impl Default for StartVelocity {
    fn default() -> Self {
        StartVelocity::FractionOfMax(0.8)
    }
}

/// Options for a [`Controller`](super::Controller).
///
/// The idle timeout has no default: every wait for an axis to become idle is
/// bounded by it.
///
/// ## Example
///
/// ```rust
/// # use kzproto::motion::{MotionOptions, StartVelocity};
/// # use std::time::Duration;
/// let mut options = MotionOptions::new(Duration::from_secs(30));
/// options
///     .poll_interval(Duration::from_millis(50))
///     .target_vel_no(2)
///     .start_velocity(StartVelocity::AxisDefault);
/// ```
#[derive(Debug, Clone)]
pub struct MotionOptions {
    /// The longest time to wait for an axis to become idle.
    idle_timeout: Duration,
    /// The delay between status polls.
    poll_interval: Duration,
    /// The largest number of status polls per wait, if limited.
    max_polls: Option<u32>,
    /// Cancels waits.
    cancel: CancelToken,
    /// The slot used when no target slot is set.
    default_vel_no: i64,
    /// The slot overridden for moves without an explicit slot.
    target_vel_no: Option<i64>,
    /// Whether overridden slots are restored after the move.
    restore_vel_table: bool,
    /// How the start velocity of an overridden slot is chosen.
    start_velocity: StartVelocity,
    /// Added to every completion estimate.
    settle_buffer: Duration,
    /// The estimated duration of a homing run.
    home_estimate: Duration,
    /// Whether to sleep for the completion estimate before polling.
    sleep_for_estimate: bool,
}

impl MotionOptions {
    /// The default delay between status polls: 100 ms.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

    /// Create options with the given idle timeout.
    ///
    /// Status is polled every 100 ms without a poll limit, velocity table
    /// slot 0 (no override) is used, overridden slots are restored, and the
    /// start velocity of an overridden slot is 80% of its maximum.
    pub fn new(idle_timeout: Duration) -> Self {
        MotionOptions {
            idle_timeout,
            poll_interval: MotionOptions::DEFAULT_POLL_INTERVAL,
            max_polls: None,
            cancel: CancelToken::new(),
            default_vel_no: 0,
            target_vel_no: None,
            restore_vel_table: true,
            start_velocity: StartVelocity::default(),
            settle_buffer: Duration::from_millis(100),
            home_estimate: Duration::from_secs(1),
            sleep_for_estimate: true,
        }
    }

    /// Set the longest time to wait for an axis to become idle.
    pub fn idle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the delay between status polls.
    pub fn poll_interval(&mut self, interval: Duration) -> &mut Self {
        self.poll_interval = interval;
        self
    }

    /// Limit the number of status polls per wait.
    pub fn max_polls(&mut self, max_polls: Option<u32>) -> &mut Self {
        self.max_polls = max_polls;
        self
    }

    /// Use the given token to cancel waits.
    pub fn cancel_token(&mut self, token: CancelToken) -> &mut Self {
        self.cancel = token;
        self
    }

    /// Set the slot used when no target slot is set. `0` means no override.
    pub fn default_vel_no(&mut self, vel_no: i64) -> &mut Self {
        self.default_vel_no = vel_no;
        self
    }

    /// Set the slot overridden for moves without an explicit slot.
    pub fn target_vel_no(&mut self, vel_no: i64) -> &mut Self {
        self.target_vel_no = Some(vel_no);
        self
    }

    /// Set whether overridden slots are restored after the move.
    pub fn restore_vel_table(&mut self, restore: bool) -> &mut Self {
        self.restore_vel_table = restore;
        self
    }

    /// Set how the start velocity of an overridden slot is chosen.
    pub fn start_velocity(&mut self, policy: StartVelocity) -> &mut Self {
        self.start_velocity = policy;
        self
    }

    /// Set the time added to every completion estimate.
    pub fn settle_buffer(&mut self, buffer: Duration) -> &mut Self {
        self.settle_buffer = buffer;
        self
    }

    /// Set the estimated duration of a homing run.
    pub fn home_estimate(&mut self, estimate: Duration) -> &mut Self {
        self.home_estimate = estimate;
        self
    }

    /// Set whether to sleep for the completion estimate before polling.
    ///
    /// When `false`, the controller starts polling the axis status right
    /// after issuing the motion command.
    pub fn sleep_for_estimate(&mut self, sleep: bool) -> &mut Self {
        self.sleep_for_estimate = sleep;
        self
    }

    /// The token that cancels waits.
    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// The slot used for moves without an explicit slot.
    pub fn effective_target_vel_no(&self) -> i64 {
        self.target_vel_no.unwrap_or(self.default_vel_no)
    }

    pub(crate) fn idle_timeout_value(&self) -> Duration {
        self.idle_timeout
    }

    pub(crate) fn poll_interval_value(&self) -> Duration {
        self.poll_interval
    }

    pub(crate) fn max_polls_value(&self) -> Option<u32> {
        self.max_polls
    }

    pub(crate) fn restores(&self) -> bool {
        self.restore_vel_table
    }

    pub(crate) fn start_velocity_policy(&self) -> StartVelocity {
        self.start_velocity
    }

    /// The estimated time for a move of `distance_pulse` at `velocity_pulse`.
    pub fn move_estimate(&self, distance_pulse: i64, velocity_pulse: i64) -> Duration {
        let travel = if velocity_pulse > 0 {
            Duration::from_secs_f64(distance_pulse.unsigned_abs() as f64 / velocity_pulse as f64)
        } else {
            Duration::ZERO
        };
        travel.saturating_add(self.settle_buffer)
    }

    /// The estimated time for a homing run.
    pub fn home_estimate_value(&self) -> Duration {
        self.home_estimate.saturating_add(self.settle_buffer)
    }

    pub(crate) fn sleeps(&self) -> bool {
        self.sleep_for_estimate
    }
}
