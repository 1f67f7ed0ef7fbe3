//! Trickle controller (spec.md §4.4).
//!
//! One [`TrickleController`] runs per parametrization. It tracks only the
//! algorithm's own state (`i_current`, the interval bounds, `c`, and the
//! inconsistency flag); arming the one-shot timer and reading the clock are
//! left to the caller through the [`crate::collaborators::Clock`] and
//! [`crate::collaborators::OneShotTimer`] traits; see [`crate::forwarder`]
//! for the periodic pass this controller's ticks drive. Grounded on
//! `reset_trickle_timer`/`handle_timer`/`double_interval`/`random_interval`
//! in the upstream draft implementation.

use crate::collaborators::{OneShotTimer, RandomSource, TimerCallback};
use crate::config::{Ticks, TrickleParams};
use crate::seed::Parametrization;

/// Per-parametrization Trickle timer state (`struct trickle_param`).
#[derive(Clone, Copy, Debug, Default)]
pub struct TrickleController {
	/// Number of interval doublings so far, capped at `Imax`.
	i_current: u8,
	t_start: Ticks,
	t_end: Ticks,
	/// Number of consistent transmissions observed this interval.
	c: u16,
	inconsistency: bool,
}

impl TrickleController {
	pub const fn new() -> Self {
		Self {
			i_current: 0,
			t_start: 0,
			t_end: 0,
			c: 0,
			inconsistency: false,
		}
	}

	pub const fn i_current(&self) -> u8 {
		self.i_current
	}

	pub const fn consistency_count(&self) -> u16 {
		self.c
	}

	/// Start of the current interval, needed by the periodic pass to split
	/// packet ageing into `diff_start`/`diff_last` (spec.md §4.6).
	pub const fn t_start(&self) -> Ticks {
		self.t_start
	}

	pub const fn t_end(&self) -> Ticks {
		self.t_end
	}

	/// Marks the controller inconsistent. Consulted once by
	/// [`TrickleController::conclude_control_message`] at the end of
	/// processing one inbound control message; does not by itself trigger
	/// a reset (spec.md §4.5's admission paths call
	/// [`TrickleController::reset`] directly and immediately instead).
	pub fn flag_inconsistency(&mut self) {
		self.inconsistency = true;
	}

	/// Resets the controller to a fresh, un-doubled interval starting
	/// `now` and arms the tick timer at a random point within it
	/// (`reset_trickle_timer`). Called immediately wherever an
	/// inconsistency is detected — admission of a new/duplicate-free
	/// packet (spec.md §4.7/§4.8) or the tail of control-message
	/// processing (spec.md §4.5) — never deferred to the next periodic
	/// pass.
	pub fn reset(&mut self, m: Parametrization, params: &TrickleParams, now: Ticks, rng: &mut impl RandomSource, timer: &mut impl OneShotTimer) {
		self.i_current = 0;
		self.c = 0;
		self.inconsistency = false;
		self.t_start = now;
		self.t_end = now.saturating_add(params.i_min());
		let delay = random_interval(params.i_min(), 0, rng);
		timer.arm(m, delay, TimerCallback::HandleTick);
	}

	/// Concludes processing of one inbound control message: resets if any
	/// admitted record flagged an inconsistency, otherwise counts one more
	/// consistent transmission (the `drop:` tail of `roll_trickle_icmp_input`).
	pub fn conclude_control_message(&mut self, m: Parametrization, params: &TrickleParams, now: Ticks, rng: &mut impl RandomSource, timer: &mut impl OneShotTimer) {
		if self.inconsistency {
			self.reset(m, params, now, rng, timer);
		} else {
			self.c = self.c.saturating_add(1);
		}
	}

	/// Called when the per-interval tick timer fires (`handle_timer`'s
	/// tail, after [`crate::forwarder::run_pass`] and any control-message
	/// emission have run): clears the interval's bookkeeping and arms the
	/// end-of-interval timer for [`TrickleController::double_interval`].
	pub fn handle_tick(&mut self, m: Parametrization, now: Ticks, timer: &mut impl OneShotTimer) {
		self.inconsistency = false;
		self.c = 0;
		let delay = self.t_end.saturating_sub(now);
		timer.arm(m, delay, TimerCallback::DoubleInterval);
	}

	/// Doubles the interval (up to `Imax`) and arms the next tick at a
	/// random point within it (`double_interval`).
	pub fn double_interval(&mut self, m: Parametrization, params: &TrickleParams, now: Ticks, rng: &mut impl RandomSource, timer: &mut impl OneShotTimer) {
		let offset = now.saturating_sub(self.t_end);
		if self.i_current < params.i_max() {
			self.i_current += 1;
		}
		self.t_start = self.t_end;
		self.t_end = self.t_start.saturating_add(params.interval(self.i_current));

		let interval = random_interval(params.i_min(), self.i_current, rng);
		let delay = interval.saturating_sub(offset);
		timer.arm(m, delay, TimerCallback::HandleTick);
	}
}

/// A uniformly random delay in `[I/2, I)` ticks for doubling count `d`,
/// where `I = i_min << d` (`random_interval`).
fn random_interval(i_min: Ticks, d: u8, rng: &mut impl RandomSource) -> Ticks {
	let interval = i_min << d;
	let half = interval / 2;
	let span = interval - half;
	if span <= 1 {
		return half;
	}
	half + (Ticks::from(rng.next_u32()) % (span - 1))
}
