//! On-wire layouts from spec.md §6: the hop-by-hop Trickle option and the
//! ICMPv6 control-message sequence-list records.
//!
//! These are hand-rolled byte-level encoders/decoders rather than built on
//! `smoltcp`'s generic `Ipv6Option` machinery: the Trickle option's type tag
//! is vendor-specific and its short-seed layout has no well-known-option
//! analogue, so there is nothing generic to reuse there. The fixed IPv6
//! header itself (`next_header`, `hop_limit`, addresses) is read through
//! `smoltcp::wire::Ipv6Packet` in [`crate::ingress`], [`crate::egress`],
//! and [`crate::forwarder`].

use bit_field::BitField;

use crate::seed::{Parametrization, SeedId, SEED_LEN};
use crate::serial::SeqVal;

/// Length of the 2-byte hop-by-hop extension header prefix (next-header,
/// header-extension-length) that precedes the Trickle option itself.
pub const EXT_HDR_PREFIX_LEN: usize = 2;

/// Total on-wire size of the hop-by-hop Trickle option, extension header
/// prefix included. Fixed at 8 bytes in both seed modes (spec.md §6, §9:
/// "The hop-by-hop option is fixed at 8 bytes including padN").
pub const HBHO_TOTAL_LEN: usize = 8;

/// `len` field value for a short-seed Trickle option.
pub const OPTION_LEN_SHORT_SEED: u8 = 4;
/// `len` field value for a long-seed Trickle option.
pub const OPTION_LEN_LONG_SEED: u8 = 2;

/// The standard IPv6 PadN option type, used to pad the long-seed option
/// out to 8 bytes.
pub const PADN_OPTION_TYPE: u8 = 0x01;

/// A decoded Trickle hop-by-hop option.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TrickleOption {
	pub m: Parametrization,
	pub seq: SeqVal,
}

/// Splits a 15-bit sequence value into the 7-bit MSB (packed with `m`
/// into the flags byte) and the 8-bit LSB, per spec.md §6.
fn pack_flags(m: Parametrization, seq: SeqVal) -> (u8, u8) {
	let raw = seq.get();
	let mut flags = 0u8;
	flags.set_bits(0..7, ((raw >> 8) & 0x7F) as u8);
	flags.set_bit(7, m.as_bit());
	(flags, (raw & 0xFF) as u8)
}

fn unpack_seq(flags: u8, lsb: u8) -> (Parametrization, SeqVal) {
	let msb = u16::from(flags.get_bits(0..7));
	let seq = SeqVal::new((msb << 8) | u16::from(lsb));
	(Parametrization::from_bit(flags.get_bit(7)), seq)
}

/// Encodes a Trickle option (short-seed build) into an 8-byte buffer,
/// including the 2-byte extension header prefix.
#[cfg(feature = "short-seed")]
pub fn encode(buf: &mut [u8; HBHO_TOTAL_LEN], next_header: u8, option_type: u8, m: Parametrization, seq: SeqVal, seed: SeedId) {
	buf[0] = next_header;
	buf[1] = 0; // hdr ext len: (8 / 8) - 1
	buf[2] = option_type;
	buf[3] = OPTION_LEN_SHORT_SEED;
	buf[4] = seed.as_bytes()[0];
	buf[5] = seed.as_bytes()[1];
	let (flags, lsb) = pack_flags(m, seq);
	buf[6] = flags;
	buf[7] = lsb;
}

/// Encodes a Trickle option (long-seed build) into an 8-byte buffer,
/// including the 2-byte extension header prefix. The seed id itself is
/// carried by the IPv6 source address, not the option.
#[cfg(not(feature = "short-seed"))]
pub fn encode(buf: &mut [u8; HBHO_TOTAL_LEN], next_header: u8, option_type: u8, m: Parametrization, seq: SeqVal) {
	buf[0] = next_header;
	buf[1] = 0;
	buf[2] = option_type;
	buf[3] = OPTION_LEN_LONG_SEED;
	let (flags, lsb) = pack_flags(m, seq);
	buf[4] = flags;
	buf[5] = lsb;
	buf[6] = PADN_OPTION_TYPE;
	buf[7] = 0;
}

/// Decodes the Trickle option out of its 8-byte on-wire region (extension
/// header prefix included). Returns `None` if the option type or length
/// does not match the active seed mode (spec.md §4.7).
#[cfg(feature = "short-seed")]
pub fn decode(region: &[u8; HBHO_TOTAL_LEN], option_type: u8) -> Option<(TrickleOption, SeedId)> {
	if region[2] != option_type || region[3] != OPTION_LEN_SHORT_SEED {
		return None;
	}
	let seed = SeedId::from_bytes([region[4], region[5]]);
	let (m, seq) = unpack_seq(region[6], region[7]);
	Some((TrickleOption { m, seq }, seed))
}

/// Decodes the Trickle option out of its 8-byte on-wire region (extension
/// header prefix included). Returns `None` if the option type or length
/// does not match the active seed mode (spec.md §4.7).
#[cfg(not(feature = "short-seed"))]
pub fn decode(region: &[u8; HBHO_TOTAL_LEN], option_type: u8) -> Option<TrickleOption> {
	if region[2] != option_type || region[3] != OPTION_LEN_LONG_SEED {
		return None;
	}
	let (m, seq) = unpack_seq(region[4], region[5]);
	Some(TrickleOption { m, seq })
}

/// Header of one sequence-list record inside a control-message payload
/// (spec.md §6).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RecordHeader {
	/// `true` if this record uses the long (128-bit) seed form.
	pub long_seed: bool,
	pub m: Parametrization,
	pub seq_len: u8,
	pub seed_id: SeedId,
}

const RECORD_S_BIT: u8 = 0x80;
const RECORD_M_BIT: u8 = 0x40;
const RECORD_RESERVED_MASK: u8 = 0x3F;

/// Fixed header length of a sequence-list record, seed id included.
pub const fn record_header_len() -> usize {
	2 + SEED_LEN
}

/// Parses one record header from the front of `bytes`. Returns `None` if
/// reserved bits are set or `bytes` is too short — both cases mean "drop
/// the remainder of the message" per spec.md §4.5.
pub fn parse_record_header(bytes: &[u8]) -> Option<RecordHeader> {
	if bytes.len() < record_header_len() {
		return None;
	}
	let flags = bytes[0];
	if flags & RECORD_RESERVED_MASK != 0 {
		return None;
	}
	let mut seed_bytes = [0u8; SEED_LEN];
	seed_bytes.copy_from_slice(&bytes[2..2 + SEED_LEN]);
	Some(RecordHeader {
		long_seed: flags & RECORD_S_BIT != 0,
		m: Parametrization::from_bit(flags & RECORD_M_BIT != 0),
		seq_len: bytes[1],
		seed_id: SeedId::from_bytes(seed_bytes),
	})
}

/// Whether a record's seed-id length agrees with the locally compiled
/// seed mode (spec.md §4.5: "`S` that disagrees with local mode ⇒ drop
/// remainder").
#[cfg(feature = "short-seed")]
pub const fn record_matches_local_mode(header: &RecordHeader) -> bool {
	!header.long_seed
}
#[cfg(not(feature = "short-seed"))]
pub const fn record_matches_local_mode(header: &RecordHeader) -> bool {
	header.long_seed
}

/// Reads the `index`-th big-endian sequence value following a record
/// header at `bytes` (the header itself excluded from `bytes`).
pub fn read_seq_value(bytes: &[u8], index: usize) -> SeqVal {
	let offset = index * 2;
	SeqVal::new(u16::from_be_bytes([bytes[offset], bytes[offset + 1]]))
}

/// Writes one sequence value in big-endian order into `out`.
pub fn write_seq_value(out: &mut [u8], value: SeqVal) {
	out[0..2].copy_from_slice(&value.get().to_be_bytes());
}

/// Writes a record header (flags + seq_len + seed id) into `out`.
pub fn write_record_header(out: &mut [u8], m: Parametrization, seq_len: u8, seed_id: SeedId) {
	let mut flags = 0u8;
	#[cfg(feature = "short-seed")]
	{
		// S=0 marks a short-seed record, per spec.md §6's table.
	}
	#[cfg(not(feature = "short-seed"))]
	{
		flags |= RECORD_S_BIT;
	}
	if m.as_bit() {
		flags |= RECORD_M_BIT;
	}
	out[0] = flags;
	out[1] = seq_len;
	out[2..2 + SEED_LEN].copy_from_slice(seed_id.as_bytes());
}
