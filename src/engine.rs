//! Top-level wiring (spec.md §6's exposed interfaces: `init`, `accept`,
//! `icmp_input`, `out`).
//!
//! [`Engine`] owns the two preallocated tables, the two Trickle
//! controllers, and the running statistics, and dispatches host up-calls
//! (inbound datagrams, inbound control messages, locally originated
//! datagrams, timer fires) to the modules that implement them. `W`/`B`/`D`
//! are the window-table capacity, packet-table capacity, and maximum
//! stored datagram size, chosen by the host at the call site the way the
//! teacher kernel picks its own buffer sizes as const generics.

use smoltcp::wire::{IpProtocol, Ipv6Address, Ipv6Packet};

use crate::buffer::PacketTable;
use crate::collaborators::{Clock, Ipv6Stack, LinkLayer, OneShotTimer, RandomSource, TimerCallback, Watchdog};
use crate::config::{ControlDestination, EngineConfig, Ticks};
use crate::consistency;
use crate::egress;
use crate::forwarder;
use crate::ingress::{self, Direction};
use crate::seed::Parametrization;
use crate::serial::SeqVal;
use crate::stats::Stats;
use crate::trickle::TrickleController;
use crate::window::WindowTable;

const IPV6_HDR_LEN: usize = 40;
const ICMP_HDR_LEN: usize = 4;

/// The forwarding engine. Generic over the window-table capacity `W`, the
/// packet-table capacity `B`, and the maximum stored datagram size `D`.
pub struct Engine<const W: usize, const B: usize, const D: usize> {
	config: EngineConfig,
	windows: WindowTable<W>,
	packets: PacketTable<B, D>,
	controllers: [TrickleController; 2],
	/// `t_last_trigger` per parametrization (spec.md §3).
	last_trigger: [Ticks; 2],
	/// The process-global sequence counter consumed by [`crate::egress`].
	last_seq: SeqVal,
	stats: Stats,
}

impl<const W: usize, const B: usize, const D: usize> Engine<W, B, D> {
	/// Builds an engine with empty tables and un-started controllers. Call
	/// [`Engine::init`] before feeding it any traffic.
	pub const fn new(config: EngineConfig) -> Self {
		Self {
			config,
			windows: WindowTable::new(),
			packets: PacketTable::new(),
			controllers: [TrickleController::new(), TrickleController::new()],
			last_trigger: [0, 0],
			last_seq: SeqVal::new(0),
			stats: Stats::new(),
		}
	}

	pub const fn stats(&self) -> &Stats {
		&self.stats
	}

	/// Starts both Trickle controllers (`init()`, spec.md §6).
	pub fn init(&mut self, now: Ticks, rng: &mut impl RandomSource, timer: &mut impl OneShotTimer) {
		for m in Parametrization::ALL {
			self.controllers[m.index()].reset(m, self.config.params(m), now, rng, timer);
			self.last_trigger[m.index()] = now;
		}
	}

	/// Admits an inbound multicast datagram (`accept(in=true)`).
	#[allow(clippy::too_many_arguments)]
	pub fn accept(&mut self, datagram: &[u8], stack: &impl Ipv6Stack, now: Ticks, rng: &mut impl RandomSource, timer: &mut impl OneShotTimer) -> bool {
		ingress::accept(
			Direction::In,
			datagram,
			&self.config,
			stack,
			&mut self.windows,
			&mut self.packets,
			&mut self.controllers,
			now,
			rng,
			timer,
			&mut self.stats,
		)
	}

	/// Tags, admits, and transmits a locally originated datagram
	/// (`out()`).
	#[allow(clippy::too_many_arguments)]
	pub fn out(
		&mut self,
		original_next_header: IpProtocol,
		payload: &[u8],
		stack: &impl Ipv6Stack,
		now: Ticks,
		rng: &mut impl RandomSource,
		timer: &mut impl OneShotTimer,
		link: &mut impl LinkLayer,
		scratch: &mut [u8],
		#[cfg(feature = "short-seed")] local_seed: crate::seed::SeedId,
	) -> bool {
		let destination = match self.config.destination {
			ControlDestination::AllNodes => Ipv6Address::LINK_LOCAL_ALL_NODES,
			ControlDestination::AllRouters => Ipv6Address::LINK_LOCAL_ALL_ROUTERS,
		};
		egress::out(
			original_next_header,
			payload,
			destination,
			&self.config,
			stack,
			&mut self.windows,
			&mut self.packets,
			&mut self.controllers,
			&mut self.last_seq,
			now,
			rng,
			timer,
			link,
			&mut self.stats,
			scratch,
			#[cfg(feature = "short-seed")]
			local_seed,
		)
	}

	/// Validates and processes an inbound ICMPv6 control message
	/// (`icmp_input()`, spec.md §4.5). `datagram` is the full IPv6 packet,
	/// ICMPv6 header and sequence-list payload included.
	pub fn icmp_input(&mut self, datagram: &[u8], stack: &impl Ipv6Stack, now: Ticks, rng: &mut impl RandomSource, timer: &mut impl OneShotTimer) -> bool {
		if datagram.len() < IPV6_HDR_LEN + ICMP_HDR_LEN {
			self.stats.icmp_bad += 1;
			return false;
		}
		let ip = Ipv6Packet::new_unchecked(datagram);
		if !stack.is_link_local(ip.src_addr()) {
			self.stats.icmp_bad += 1;
			return false;
		}
		let expected_dest = match self.config.destination {
			ControlDestination::AllNodes => Ipv6Address::LINK_LOCAL_ALL_NODES,
			ControlDestination::AllRouters => Ipv6Address::LINK_LOCAL_ALL_ROUTERS,
		};
		if ip.dst_addr() != expected_dest {
			self.stats.icmp_bad += 1;
			return false;
		}
		if ip.hop_limit() != self.config.hop_limit {
			self.stats.icmp_bad += 1;
			return false;
		}
		if ip.next_header() != IpProtocol::Icmpv6 {
			self.stats.icmp_bad += 1;
			return false;
		}

		let icmp_type = datagram[IPV6_HDR_LEN];
		let icmp_code = datagram[IPV6_HDR_LEN + 1];
		if icmp_type != self.config.icmp_type || icmp_code != self.config.icmp_code {
			self.stats.icmp_bad += 1;
			return false;
		}

		self.stats.icmp_in += 1;
		let payload = &datagram[IPV6_HDR_LEN + ICMP_HDR_LEN..];
		consistency::process(payload, &self.config, &mut self.windows, &mut self.packets, &mut self.controllers, now, rng, timer);
		true
	}

	/// Dispatches a fired [`TimerCallback`] for parametrization `m`
	/// (`handle_tick`/`double_interval`, spec.md §4.4).
	#[allow(clippy::too_many_arguments)]
	pub fn on_timer_fire(
		&mut self,
		callback: TimerCallback,
		m: Parametrization,
		stack: &impl Ipv6Stack,
		link: &mut impl LinkLayer,
		watchdog: &mut impl Watchdog,
		now: Ticks,
		rng: &mut impl RandomSource,
		timer: &mut impl OneShotTimer,
		scratch: &mut [u8],
	) {
		match callback {
			TimerCallback::HandleTick => self.handle_tick(m, stack, link, watchdog, now, rng, timer, scratch),
			TimerCallback::DoubleInterval => {
				let params = self.config.params(m);
				self.controllers[m.index()].double_interval(m, params, now, rng, timer);
			}
		}
	}

	#[allow(clippy::too_many_arguments)]
	fn handle_tick(&mut self, m: Parametrization, stack: &impl Ipv6Stack, link: &mut impl LinkLayer, watchdog: &mut impl Watchdog, now: Ticks, rng: &mut impl RandomSource, timer: &mut impl OneShotTimer, scratch: &mut [u8]) {
		let idx = m.index();
		if stack.link_local_preferred_source().is_none() {
			let params = self.config.params(m);
			self.controllers[idx].reset(m, params, now, rng, timer);
			return;
		}

		let params = self.config.params(m);
		let diff_start = now.saturating_sub(self.controllers[idx].t_start());
		let diff_last = now.saturating_sub(self.last_trigger[idx]);
		self.last_trigger[idx] = now;

		forwarder::run_pass(m, params, &mut self.windows, &mut self.packets, diff_start, diff_last, link, watchdog, &mut self.stats);

		if forwarder::should_emit_control_message(params, self.controllers[idx].consistency_count()) {
			forwarder::emit_control_message(&self.windows, &self.packets, &self.config, stack, link, &mut self.stats, scratch);
		}

		self.controllers[idx].handle_tick(m, now, timer);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::TrickleParams;

	struct FixedRng(u32);
	impl RandomSource for FixedRng {
		fn next_u32(&mut self) -> u32 {
			self.0
		}
	}
	struct NullTimer;
	impl OneShotTimer for NullTimer {
		fn arm(&mut self, _m: Parametrization, _delay: Ticks, _callback: TimerCallback) {}
	}
	struct RecordingLink {
		sent: heapless::Vec<heapless::Vec<u8, 128>, 8>,
	}
	impl LinkLayer for RecordingLink {
		fn transmit(&mut self, datagram: &[u8]) {
			let mut v = heapless::Vec::new();
			let _ = v.extend_from_slice(datagram);
			let _ = self.sent.push(v);
		}
	}
	struct NullWatchdog;
	impl Watchdog for NullWatchdog {
		fn pet(&mut self) {}
	}
	struct FixedStack;
	impl Ipv6Stack for FixedStack {
		fn link_local_preferred_source(&self) -> Option<Ipv6Address> {
			Some(Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1))
		}
		fn select_source(&self, _destination: Ipv6Address) -> Ipv6Address {
			Ipv6Address::new(0xfe80, 0, 0, 0, 0, 0, 0, 1)
		}
		fn is_routable_multicast(&self, _addr: Ipv6Address) -> bool {
			true
		}
		fn is_link_local(&self, _addr: Ipv6Address) -> bool {
			true
		}
		fn icmpv6_checksum(&self, _src: Ipv6Address, _dst: Ipv6Address, _data: &[u8]) -> u16 {
			0
		}
	}

	fn sample_config() -> EngineConfig {
		let params = TrickleParams::new(64, 4, Some(1), 3, 6).unwrap();
		EngineConfig::new(params, params, 64, 0, 200, ControlDestination::AllNodes)
	}

	fn sample_datagram(seq_msb: u8, seq_lsb: u8) -> [u8; 40 + crate::wire::HBHO_TOTAL_LEN] {
		let mut buf = [0u8; 40 + crate::wire::HBHO_TOTAL_LEN];
		buf[0] = 0x60;
		buf[6] = 0;
		buf[7] = 64;
		buf[8..24].copy_from_slice(&[0xfe, 0x80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
		buf[24..40].copy_from_slice(&[0xff, 0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
		buf[40] = 58;
		buf[41] = 0;
		buf[42] = 0x0c;
		#[cfg(feature = "short-seed")]
		{
			buf[43] = 4;
			buf[44] = 0;
			buf[45] = 1;
			buf[46] = seq_msb & 0x7F;
			buf[47] = seq_lsb;
		}
		#[cfg(not(feature = "short-seed"))]
		{
			buf[43] = 2;
			buf[44] = seq_msb & 0x7F;
			buf[45] = seq_lsb;
			buf[46] = 1;
			buf[47] = 0;
		}
		buf
	}

	#[test]
	fn cold_start_admit_resets_controller() {
		let mut engine: Engine<2, 2, 64> = Engine::new(sample_config());
		let stack = FixedStack;
		let mut rng = FixedRng(3);
		let mut timer = NullTimer;
		engine.init(0, &mut rng, &mut timer);

		let datagram = sample_datagram(0, 5);
		let accepted = engine.accept(&datagram, &stack, 1, &mut rng, &mut timer);
		assert!(accepted);
		assert_eq!(engine.stats().mcast_in_unique, 1);
		assert_eq!(engine.controllers[0].i_current(), 0);
	}

	#[test]
	fn duplicate_datagram_is_dropped() {
		let mut engine: Engine<2, 2, 64> = Engine::new(sample_config());
		let stack = FixedStack;
		let mut rng = FixedRng(3);
		let mut timer = NullTimer;
		engine.init(0, &mut rng, &mut timer);

		let datagram = sample_datagram(0, 5);
		assert!(engine.accept(&datagram, &stack, 1, &mut rng, &mut timer));
		assert!(!engine.accept(&datagram, &stack, 2, &mut rng, &mut timer));
		assert_eq!(engine.stats().mcast_dropped, 1);
	}

	#[test]
	fn handle_tick_defers_when_stack_not_ready() {
		struct NotReadyStack;
		impl Ipv6Stack for NotReadyStack {
			fn link_local_preferred_source(&self) -> Option<Ipv6Address> {
				None
			}
			fn select_source(&self, d: Ipv6Address) -> Ipv6Address {
				d
			}
			fn is_routable_multicast(&self, _addr: Ipv6Address) -> bool {
				true
			}
			fn is_link_local(&self, _addr: Ipv6Address) -> bool {
				true
			}
			fn icmpv6_checksum(&self, _src: Ipv6Address, _dst: Ipv6Address, _data: &[u8]) -> u16 {
				0
			}
		}
		let mut engine: Engine<2, 2, 64> = Engine::new(sample_config());
		let stack = NotReadyStack;
		let mut rng = FixedRng(3);
		let mut timer = NullTimer;
		let mut link = RecordingLink { sent: heapless::Vec::new() };
		let mut watchdog = NullWatchdog;
		let mut scratch = [0u8; 128];
		engine.init(0, &mut rng, &mut timer);

		engine.on_timer_fire(TimerCallback::HandleTick, Parametrization::M0, &stack, &mut link, &mut watchdog, 1000, &mut rng, &mut timer, &mut scratch);
		assert!(link.sent.is_empty());
	}

	#[test]
	fn handle_tick_forwards_must_send_packet() {
		let mut engine: Engine<2, 2, 64> = Engine::new(sample_config());
		let stack = FixedStack;
		let mut rng = FixedRng(3);
		let mut timer = NullTimer;
		let mut link = RecordingLink { sent: heapless::Vec::new() };
		let mut watchdog = NullWatchdog;
		let mut scratch = [0u8; 128];
		engine.init(0, &mut rng, &mut timer);

		let datagram = sample_datagram(0, 5);
		assert!(engine.accept(&datagram, &stack, 1, &mut rng, &mut timer));

		engine.on_timer_fire(TimerCallback::HandleTick, Parametrization::M0, &stack, &mut link, &mut watchdog, 2, &mut rng, &mut timer, &mut scratch);
		assert_eq!(engine.stats().mcast_fwd, 1);
		assert!(!link.sent.is_empty());
	}
}
