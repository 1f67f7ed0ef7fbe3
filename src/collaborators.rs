//! Traits for the external collaborators spec.md §1/§6 lists as out of
//! scope: the IPv6 stack, the link-layer transmit path, the random-number
//! source, the monotonic clock and one-shot timer facility, and the
//! watchdog. The engine is generic over these so a host can back them with
//! whatever stack it has (the teacher kernel uses `smoltcp` and its own
//! `arch::processor` clock; a Contiki-style host would use `clock_time()`
//! and `ctimer`).

use smoltcp::wire::Ipv6Address;

use crate::config::Ticks;
use crate::seed::Parametrization;

/// A monotonic tick source. `now()` must never go backwards.
pub trait Clock {
	fn now(&self) -> Ticks;
}

/// Which of the two one-shot callbacks a timer fire corresponds to
/// (spec.md §4.4's `handle_tick` and `double_interval`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TimerCallback {
	/// Fire `handle_tick(M)`.
	HandleTick,
	/// Fire `double_interval(M)`.
	DoubleInterval,
}

/// A per-parametrization one-shot timer slot (spec.md §5: "each
/// controller owns one one-shot timer slot").
///
/// `arm` implicitly cancels any previously armed callback for the same
/// `m`, matching `ctimer_set`'s semantics in the upstream draft
/// implementation. The host is expected to call
/// [`crate::engine::Engine::on_timer_fire`] with the same `m` and
/// `callback` once `delay` ticks have elapsed.
pub trait OneShotTimer {
	fn arm(&mut self, m: Parametrization, delay: Ticks, callback: TimerCallback);
}

/// The pseudo-random source consumed by `rand_in` (spec.md §4.4).
///
/// Mirrors `rand_core::RngCore::next_u32`, the same interface the teacher
/// kernel's own `entropy` module wraps around `ChaCha20Rng`, without
/// requiring a dependency on `rand_core` itself.
pub trait RandomSource {
	fn next_u32(&mut self) -> u32;
}

/// The link-layer transmit path: hand a complete IPv6 datagram to the
/// interface for output.
pub trait LinkLayer {
	fn transmit(&mut self, datagram: &[u8]);
}

/// Pets the watchdog during forwarding bursts (spec.md §4.6).
pub trait Watchdog {
	fn pet(&mut self);
}

/// The IPv6 stack operations the engine cannot perform itself because
/// they require routing/interface state it does not hold: selecting a
/// source address, checksumming, and classifying addresses against the
/// node's own interface configuration.
pub trait Ipv6Stack {
	/// The node's preferred link-local address, or `None` if the stack
	/// is not yet ready to send (DAD in progress, no prefix yet).
	fn link_local_preferred_source(&self) -> Option<Ipv6Address>;

	/// Selects a source address for a datagram bound for `destination`.
	fn select_source(&self, destination: Ipv6Address) -> Ipv6Address;

	/// True if `addr` is a multicast address this engine may forward to
	/// (i.e. not interface-local or otherwise non-routable scope).
	fn is_routable_multicast(&self, addr: Ipv6Address) -> bool;

	/// True if `addr` is a link-local unicast address.
	fn is_link_local(&self, addr: Ipv6Address) -> bool;

	/// Computes the ICMPv6 checksum over `icmp_and_payload`, given the
	/// IPv6 pseudo-header implied by `src`/`dst`.
	fn icmpv6_checksum(&self, src: Ipv6Address, dst: Ipv6Address, icmp_and_payload: &[u8]) -> u16;
}
