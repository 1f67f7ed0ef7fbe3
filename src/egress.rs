//! Egress tagging (spec.md §4.8).
//!
//! Inserts the hop-by-hop Trickle option into a locally originated
//! datagram, assigns it the next sequence value, and feeds it back through
//! [`crate::ingress::accept`] so it is remembered and advertised in future
//! control messages. Grounded on `roll_trickle_out` in the upstream draft
//! implementation.

use smoltcp::wire::{IpProtocol, Ipv6Packet};

use crate::buffer::PacketTable;
use crate::collaborators::{Ipv6Stack, LinkLayer, OneShotTimer, RandomSource};
use crate::config::{EngineConfig, Ticks};
use crate::ingress::{self, Direction};
use crate::serial::SeqVal;
use crate::stats::Stats;
use crate::trickle::TrickleController;
use crate::window::WindowTable;
use crate::wire::{self as trickle_wire, HBHO_TOTAL_LEN};

const IPV6_HDR_LEN: usize = 40;

/// Tags a locally originated datagram with the Trickle hop-by-hop option,
/// admits it through [`crate::ingress::accept`], and transmits it if
/// admission succeeds.
///
/// `payload` is the datagram's original next-header and upper-layer bytes
/// (the fixed IPv6 header, filled in here, is not included). `scratch`
/// must be at least `40 + 8 + payload.len()` bytes; the written prefix is
/// what gets buffered and transmitted. `seed` identifies this node in
/// short-seed mode and is ignored in long-seed mode, where the source
/// address itself carries the seed.
#[allow(clippy::too_many_arguments)]
pub fn out<const W: usize, const B: usize, const D: usize>(
	original_next_header: IpProtocol,
	payload: &[u8],
	destination: smoltcp::wire::Ipv6Address,
	config: &EngineConfig,
	stack: &impl Ipv6Stack,
	windows: &mut WindowTable<W>,
	packets: &mut PacketTable<B, D>,
	controllers: &mut [TrickleController; 2],
	last_seq: &mut SeqVal,
	now: Ticks,
	rng: &mut impl RandomSource,
	timer: &mut impl OneShotTimer,
	link: &mut impl LinkLayer,
	stats: &mut Stats,
	scratch: &mut [u8],
	#[cfg(feature = "short-seed")] local_seed: crate::seed::SeedId,
) -> bool {
	let total_len = IPV6_HDR_LEN + HBHO_TOTAL_LEN + payload.len();
	if scratch.len() < total_len {
		return false;
	}

	let Some(src) = stack.link_local_preferred_source() else {
		return false;
	};

	*last_seq = last_seq.add(1);
	let m = crate::seed::Parametrization::from_bit(config.set_m_bit_on_egress);

	{
		let mut region = [0u8; HBHO_TOTAL_LEN];
		#[cfg(feature = "short-seed")]
		trickle_wire::encode(&mut region, original_next_header.into(), config.option_type, m, *last_seq, local_seed);
		#[cfg(not(feature = "short-seed"))]
		trickle_wire::encode(&mut region, original_next_header.into(), config.option_type, m, *last_seq);
		scratch[IPV6_HDR_LEN..IPV6_HDR_LEN + HBHO_TOTAL_LEN].copy_from_slice(&region);
	}
	scratch[IPV6_HDR_LEN + HBHO_TOTAL_LEN..total_len].copy_from_slice(payload);

	{
		let mut ip = Ipv6Packet::new_unchecked(&mut scratch[..IPV6_HDR_LEN]);
		ip.set_version(6);
		ip.set_traffic_class(0);
		ip.set_flow_label(0);
		ip.set_payload_len((HBHO_TOTAL_LEN + payload.len()) as u16);
		ip.set_next_header(IpProtocol::HopByHop);
		ip.set_hop_limit(config.hop_limit);
		ip.set_src_addr(src);
		ip.set_dst_addr(destination);
	}

	let datagram = &scratch[..total_len];
	let accepted = ingress::accept(
		Direction::Out,
		datagram,
		config,
		stack,
		windows,
		packets,
		controllers,
		now,
		rng,
		timer,
		stats,
	);
	if accepted {
		link.transmit(datagram);
		stats.mcast_out += 1;
	}
	accepted
}
