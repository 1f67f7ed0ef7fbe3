//! Forwarder (spec.md §4.6): the periodic pass driven by each Trickle
//! controller's tick. Ages buffered packets, evicts dwell-expired ones,
//! retransmits eligible ones, and emits a control message when suppression
//! calls for it. Grounded on `handle_timer`'s packet loop and `icmp_output`
//! in the upstream draft implementation.

use smoltcp::wire::{IpProtocol, Ipv6Address, Ipv6Packet};

use crate::buffer::PacketTable;
use crate::collaborators::{Ipv6Stack, LinkLayer, Watchdog};
use crate::config::{EngineConfig, Ticks, TrickleParams};
use crate::seed::Parametrization;
use crate::stats::Stats;
use crate::window::WindowTable;
use crate::wire as trickle_wire;

/// Runs one forwarder pass for parametrization `m`: ages and retransmits
/// or evicts every packet owned by a window of that parametrization, then
/// recomputes window lower bounds. `diff_start` is the time since the
/// current interval began; `diff_last` is the time since the previous
/// forwarder pass. A packet whose `active` counter is still zero ages by
/// `diff_start` rather than `diff_last`: it was admitted during the
/// interval that just ended and caused the reset, so its age should be
/// measured from the interval's start, not from this controller's
/// previous (pre-reset) pass (spec.md §4.6, `handle_timer`'s comment on
/// the `active == 0` case).
pub fn run_pass<const W: usize, const B: usize, const D: usize>(
	m: Parametrization,
	params: &TrickleParams,
	windows: &mut WindowTable<W>,
	packets: &mut PacketTable<B, D>,
	diff_start: Ticks,
	diff_last: Ticks,
	link: &mut impl LinkLayer,
	watchdog: &mut impl Watchdog,
	stats: &mut Stats,
) {
	let suppression_enabled = params.suppression_enabled();

	// Indices to evict are collected rather than freed in place: `free`
	// would need a second `&mut packets` while `iter_used_mut`'s borrow is
	// still live for the rest of the loop.
	let mut to_evict: heapless::Vec<usize, B> = heapless::Vec::new();

	for (index, packet) in packets.iter_used_mut() {
		let window = windows.get(packet.window());
		if window.parametrization() != m {
			continue;
		}

		let diff = if packet.active() == 0 { diff_start } else { diff_last };
		packet.age(diff);

		if packet.dwell() > params.tdwell_ticks() {
			trace!("trickle: packet dwell {} exceeds Tdwell {}, evicting", packet.dwell(), params.tdwell_ticks());
			let _ = to_evict.push(index);
			continue;
		}

		let ttl_remaining = Ipv6Packet::new_unchecked(packet.datagram()).hop_limit() > 0;
		if !ttl_remaining {
			continue;
		}

		let should_send = (suppression_enabled && packet.must_send()) || (!suppression_enabled && packet.active() < params.tactive_ticks());
		if should_send {
			link.transmit(packet.datagram());
			stats.mcast_fwd += 1;
			packet.clear_must_send();
			watchdog.pet();
		}
	}

	for index in to_evict {
		let window = packets.get(index).window();
		windows.release_one(window);
		packets.free(index);
	}

	windows.recompute_lower_bounds(packets.iter_used().map(|(_, p)| (p.window(), p.seq_val())));
}

/// Whether this pass should emit a control message: suppression enabled
/// and fewer than `k` consistent transmissions were heard this interval
/// (`param->c < param->k` in the upstream draft implementation).
pub fn should_emit_control_message(params: &TrickleParams, consistency_count: u16) -> bool {
	match params.k() {
		Some(k) => consistency_count < u16::from(k),
		None => false,
	}
}

/// Writes the control message's ICMPv6 payload (concatenated sequence-list
/// records for every window with at least one buffered packet) into `out`.
/// Returns the number of bytes written, or `None` if `out` is too small
/// (`icmp_output` checking against `UIP_BUFSIZE`).
pub fn build_control_payload<const W: usize, const B: usize, const D: usize>(windows: &WindowTable<W>, packets: &PacketTable<B, D>, out: &mut [u8]) -> Option<usize> {
	let mut pos = 0usize;
	for (window_index, window) in windows.iter_used() {
		if window.count() == 0 {
			continue;
		}
		let header_len = trickle_wire::record_header_len();
		if pos + header_len > out.len() {
			return None;
		}
		trickle_wire::write_record_header(&mut out[pos..pos + header_len], window.parametrization(), window.count(), window.seed_id());
		pos += header_len;

		for (_, packet) in packets.iter_used() {
			if packet.window() != window_index {
				continue;
			}
			if pos + 2 > out.len() {
				return None;
			}
			trickle_wire::write_seq_value(&mut out[pos..pos + 2], packet.seq_val());
			pos += 2;
		}
	}
	Some(pos)
}

/// Assembles and transmits a complete control-message datagram (fixed
/// IPv6 header, ICMPv6 header, sequence-list payload) into `scratch`,
/// mirroring `icmp_output`. Returns `true` if the message was sent.
pub fn emit_control_message<const W: usize, const B: usize, const D: usize>(windows: &WindowTable<W>, packets: &PacketTable<B, D>, config: &EngineConfig, stack: &impl Ipv6Stack, link: &mut impl LinkLayer, stats: &mut Stats, scratch: &mut [u8]) -> bool {
	const IPV6_HDR_LEN: usize = 40;
	const ICMP_HDR_LEN: usize = 4;
	if scratch.len() < IPV6_HDR_LEN + ICMP_HDR_LEN {
		return false;
	}

	let dest = match config.destination {
		crate::config::ControlDestination::AllNodes => Ipv6Address::LINK_LOCAL_ALL_NODES,
		crate::config::ControlDestination::AllRouters => Ipv6Address::LINK_LOCAL_ALL_ROUTERS,
	};
	let src = stack.select_source(dest);

	let Some(payload_len) = build_control_payload(windows, packets, &mut scratch[IPV6_HDR_LEN + ICMP_HDR_LEN..]) else {
		return false;
	};

	{
		let mut ip_packet = Ipv6Packet::new_unchecked(&mut scratch[..IPV6_HDR_LEN]);
		ip_packet.set_version(6);
		ip_packet.set_traffic_class(0);
		ip_packet.set_flow_label(0);
		ip_packet.set_payload_len((ICMP_HDR_LEN + payload_len) as u16);
		ip_packet.set_next_header(IpProtocol::Icmpv6);
		ip_packet.set_hop_limit(config.hop_limit);
		ip_packet.set_src_addr(src);
		ip_packet.set_dst_addr(dest);
	}

	scratch[IPV6_HDR_LEN] = config.icmp_type;
	scratch[IPV6_HDR_LEN + 1] = config.icmp_code;
	scratch[IPV6_HDR_LEN + 2] = 0;
	scratch[IPV6_HDR_LEN + 3] = 0;

	let total = IPV6_HDR_LEN + ICMP_HDR_LEN + payload_len;
	let checksum = stack.icmpv6_checksum(src, dest, &scratch[IPV6_HDR_LEN..total]);
	scratch[IPV6_HDR_LEN + 2..IPV6_HDR_LEN + 4].copy_from_slice(&checksum.to_be_bytes());

	link.transmit(&scratch[..total]);
	stats.icmp_out += 1;
	true
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::seed::SeedId;
	use crate::serial::SeqVal;

	struct RecordingLink {
		sent: heapless::Vec<heapless::Vec<u8, 64>, 8>,
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

	fn ipv6_datagram(hop_limit: u8) -> [u8; 48] {
		let mut buf = [0u8; 48];
		buf[7] = hop_limit;
		buf
	}

	/// spec.md §8 scenario 6: a packet whose dwell exceeds `Tdwell` is
	/// freed by the forwarder pass, and its window is freed along with it
	/// when it was the window's sole entry.
	#[test]
	fn dwell_expiration_evicts_packet_and_frees_window() {
		let params = TrickleParams::new(64, 4, Some(1), 3, 1).unwrap();
		let mut windows: WindowTable<2> = WindowTable::new();
		let mut packets: PacketTable<2, 48> = PacketTable::new();
		let seed = SeedId::from_bytes([1, 1]);
		let w = windows.admit(None, seed, Parametrization::M0, SeqVal::new(1)).unwrap();
		let idx = packets.allocate().unwrap();
		packets.store(idx, w, SeqVal::new(1), &ipv6_datagram(64));

		let mut link = RecordingLink { sent: heapless::Vec::new() };
		let mut watchdog = NullWatchdog;
		let mut stats = Stats::new();

		run_pass(Parametrization::M0, &params, &mut windows, &mut packets, params.tdwell_ticks() + 1, 0, &mut link, &mut watchdog, &mut stats);

		assert!(packets.allocate().is_some());
		assert_eq!(windows.lookup(seed, Parametrization::M0), None);
	}

	#[test]
	fn active_packet_is_retransmitted_when_due() {
		let params = TrickleParams::new(64, 4, Some(1), 3, 6).unwrap();
		let mut windows: WindowTable<2> = WindowTable::new();
		let mut packets: PacketTable<2, 48> = PacketTable::new();
		let seed = SeedId::from_bytes([2, 2]);
		let w = windows.admit(None, seed, Parametrization::M0, SeqVal::new(1)).unwrap();
		let idx = packets.allocate().unwrap();
		packets.store(idx, w, SeqVal::new(1), &ipv6_datagram(64));
		packets.get_mut(idx).set_must_send();

		let mut link = RecordingLink { sent: heapless::Vec::new() };
		let mut watchdog = NullWatchdog;
		let mut stats = Stats::new();

		run_pass(Parametrization::M0, &params, &mut windows, &mut packets, 1, 1, &mut link, &mut watchdog, &mut stats);

		assert_eq!(stats.mcast_fwd, 1);
		assert_eq!(link.sent.len(), 1);
		assert!(!packets.get(idx).must_send());
	}

	#[test]
	fn emits_only_below_k() {
		let params = TrickleParams::new(64, 4, Some(3), 3, 6).unwrap();
		assert!(should_emit_control_message(&params, 0));
		assert!(should_emit_control_message(&params, 2));
		assert!(!should_emit_control_message(&params, 3));
	}

	#[test]
	fn suppression_disabled_never_emits() {
		let params = TrickleParams::new(64, 4, None, 3, 6).unwrap();
		assert!(!should_emit_control_message(&params, 0));
	}

	#[test]
	fn control_payload_lists_every_nonempty_window() {
		use crate::seed::SeedId;
		use crate::serial::SeqVal;

		let mut windows: WindowTable<2> = WindowTable::new();
		let mut packets: PacketTable<4, 8> = PacketTable::new();
		let seed = SeedId::from_bytes([1, 2]);
		let w = windows.admit(None, seed, Parametrization::M0, SeqVal::new(3)).unwrap();
		let idx = packets.allocate().unwrap();
		packets.store(idx, w, SeqVal::new(3), &[0u8; 8]);

		let mut out = [0u8; 64];
		let len = build_control_payload(&windows, &packets, &mut out).unwrap();
		assert_eq!(len, trickle_wire::record_header_len() + 2);
	}
}
