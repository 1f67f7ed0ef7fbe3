//! Statistics counters.
//!
//! The upstream draft implementation keeps these behind a build-time
//! `UIP_MCAST6_STATS` switch (`struct roll_trickle_stats` in the C source).
//! This crate always compiles them in: they are a handful of `u32`s with no
//! allocation, and a host that does not care can simply not read them.

/// Counters for drops, admissions, and traffic generated by the engine.
///
/// Field names match the upstream draft implementation's
/// `struct roll_trickle_stats` and spec.md §7/§8 where they are named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
	/// Malformed ingress datagram: bad destination, bad source, bad
	/// next-header, or bad Trickle option.
	pub mcast_bad: u32,
	/// Out-of-range or duplicate sequence value, or allocation/reclaim
	/// failure on ingress.
	pub mcast_dropped: u32,
	/// Every inbound multicast datagram that reached the classifier,
	/// admitted or not.
	pub mcast_in_all: u32,
	/// Inbound multicast datagrams admitted as new (not drops).
	pub mcast_in_unique: u32,
	/// Datagrams successfully originated locally via [`crate::egress`].
	pub mcast_out: u32,
	/// Datagrams re-transmitted by the forwarder pass.
	pub mcast_fwd: u32,
	/// Malformed control message: bad source, destination, code, hop
	/// limit, reserved bits, or seed-length mismatch.
	pub icmp_bad: u32,
	/// Control messages accepted for consistency-checking.
	pub icmp_in: u32,
	/// Control messages emitted by the forwarder pass.
	pub icmp_out: u32,
}

impl Stats {
	/// A zeroed counter set.
	pub const fn new() -> Self {
		Self {
			mcast_bad: 0,
			mcast_dropped: 0,
			mcast_in_all: 0,
			mcast_in_unique: 0,
			mcast_out: 0,
			mcast_fwd: 0,
			icmp_bad: 0,
			icmp_in: 0,
			icmp_out: 0,
		}
	}
}
