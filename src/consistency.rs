//! Consistency checker (spec.md §4.5).
//!
//! Parses the sequence-list records of an inbound control message and
//! compares them against the local window/packet state, flagging either
//! Trickle controller inconsistent when a mismatch is found. Operates
//! purely on the control message's ICMPv6 payload; the IPv6/ICMPv6 header
//! validation (source, destination, code, hop limit) that gates whether
//! this runs at all lives in [`crate::engine`], since it needs the
//! [`crate::collaborators::Ipv6Stack`] collaborator. Grounded on
//! `roll_trickle_icmp_input` in the upstream draft implementation.

use crate::buffer::PacketTable;
use crate::collaborators::{OneShotTimer, RandomSource};
use crate::config::{EngineConfig, Ticks};
use crate::seed::Parametrization;
use crate::trickle::TrickleController;
use crate::wire::{self, record_matches_local_mode};
use crate::window::WindowTable;

/// Processes one inbound control message's payload: updates window/packet
/// "listed" state, flags either [`TrickleController`] inconsistent as
/// needed, then concludes both controllers (spec.md §4.5's `drop:` tail,
/// which unconditionally resets-or-counts both parametrizations once per
/// message regardless of which one(s) the message concerned). Malformed
/// records stop processing of the remainder of the message but do not
/// themselves abort the conclusion step.
pub fn process<const W: usize, const B: usize, const D: usize>(
	payload: &[u8],
	config: &EngineConfig,
	windows: &mut WindowTable<W>,
	packets: &mut PacketTable<B, D>,
	controllers: &mut [TrickleController; 2],
	now: Ticks,
	rng: &mut impl RandomSource,
	timer: &mut impl OneShotTimer,
) {
	windows.clear_all_listed();
	packets.clear_all_listed();

	let mut cursor = payload;
	while let Some(header) = wire::parse_record_header(cursor) {
		if !record_matches_local_mode(&header) {
			break;
		}
		let body_offset = wire::record_header_len();
		let body_len = usize::from(header.seq_len) * 2;
		if cursor.len() < body_offset + body_len {
			break;
		}
		let body = &cursor[body_offset..body_offset + body_len];

		match windows.lookup(header.seed_id, header.m) {
			Some(window_index) => {
				check_known_window(window_index, header.seq_len, body, windows, packets, controllers);
			}
			None => {
				// An unknown window in an advertised list is not explicitly
				// called an inconsistency in the draft; we treat it as one
				// anyway, matching the upstream draft implementation's own
				// deliberate divergence.
				trace!("trickle: control message listed an unknown seed, flagging inconsistency");
				controllers[header.m.index()].flag_inconsistency();
			}
		}

		cursor = &cursor[body_offset + body_len..];
	}

	check_unlisted_local_packets(windows, packets, controllers);

	for m in Parametrization::ALL {
		controllers[m.index()].conclude_control_message(m, config.params(m), now, rng, timer);
	}
}

fn check_known_window<const W: usize, const B: usize, const D: usize>(
	window_index: usize,
	seq_len: u8,
	body: &[u8],
	windows: &mut WindowTable<W>,
	packets: &mut PacketTable<B, D>,
	controllers: &mut [TrickleController; 2],
) {
	let window = windows.get_mut(window_index);
	window.set_listed();
	window.reset_min_listed();
	let m_index = window.parametrization().index();

	for i in 0..usize::from(seq_len) {
		let val = wire::read_seq_value(body, i);
		let window = windows.get(window_index);
		let (lower, upper) = (window.lower_bound(), window.upper_bound());

		if upper.is_some_and(|u| val.gt(u)) {
			controllers[m_index].flag_inconsistency();
		}

		let within_bounds = upper.is_some_and(|u| val.le(u)) && lower.is_some_and(|l| val.ge(l));
		if within_bounds {
			let matched = packets.iter_used_mut().find(|(_, p)| p.window() == window_index && p.seq_val().eq(val));
			match matched {
				Some((_, packet)) => {
					packet.set_listed();
					windows.get_mut(window_index).note_listed(val);
				}
				None => controllers[m_index].flag_inconsistency(),
			}
		}
	}
}

fn check_unlisted_local_packets<const W: usize, const B: usize, const D: usize>(
	windows: &WindowTable<W>,
	packets: &mut PacketTable<B, D>,
	controllers: &mut [TrickleController; 2],
) {
	for (_, packet) in packets.iter_used_mut() {
		let window = windows.get(packet.window());
		let m_index = window.parametrization().index();
		if !window.is_listed() {
			controllers[m_index].flag_inconsistency();
			packet.set_must_send();
			continue;
		}
		if !packet.is_listed() {
			if let Some(min_listed) = window.min_listed() {
				if packet.seq_val().gt(min_listed) {
					controllers[m_index].flag_inconsistency();
					packet.set_must_send();
				}
			}
		}
	}
}
