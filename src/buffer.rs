//! Packet buffer (spec.md §4.3).
//!
//! A fixed-capacity table of buffered datagrams, each linked back to its
//! owning window by table index. `D` is the maximum stored datagram size;
//! `B` is the table's fixed packet capacity. Mirrors `struct mcast_packet`
//! and `buffer_allocate`/`buffer_reclaim` in the upstream draft
//! implementation.

use bitflags::bitflags;

use crate::serial::SeqVal;
use crate::window::WindowTable;

bitflags! {
	#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
	struct Flags: u8 {
		/// Slot holds a live packet.
		const USED = 0x80;
		/// Forwarder must retransmit this packet on its next pass
		/// (suppression-enabled case) or it is still within `Tactive`
		/// (suppression-disabled case).
		const MUST_SEND = 0x20;
		/// The current inbound control message listed this exact
		/// sequence value.
		const LISTED = 0x10;
	}
}

/// One buffered datagram (`struct mcast_packet`).
#[derive(Clone, Copy)]
pub struct Packet<const D: usize> {
	flags: Flags,
	window: usize,
	seq_val: SeqVal,
	len: usize,
	datagram: [u8; D],
	/// Ticks since admission, reset at admission.
	active: u64,
	/// Ticks since admission, never reset (drives dwell-time eviction).
	dwell: u64,
}

impl<const D: usize> Packet<D> {
	const fn empty() -> Self {
		Self {
			flags: Flags::empty(),
			window: 0,
			seq_val: SeqVal::new(0),
			len: 0,
			datagram: [0u8; D],
			active: 0,
			dwell: 0,
		}
	}

	pub const fn window(&self) -> usize {
		self.window
	}

	pub const fn seq_val(&self) -> SeqVal {
		self.seq_val
	}

	pub fn datagram(&self) -> &[u8] {
		&self.datagram[..self.len]
	}

	pub fn datagram_mut(&mut self) -> &mut [u8] {
		&mut self.datagram[..self.len]
	}

	pub const fn active(&self) -> u64 {
		self.active
	}

	pub const fn dwell(&self) -> u64 {
		self.dwell
	}

	pub const fn must_send(&self) -> bool {
		self.flags.contains(Flags::MUST_SEND)
	}

	pub fn set_must_send(&mut self) {
		self.flags.insert(Flags::MUST_SEND);
	}

	pub fn clear_must_send(&mut self) {
		self.flags.remove(Flags::MUST_SEND);
	}

	pub const fn is_listed(&self) -> bool {
		self.flags.contains(Flags::LISTED)
	}

	pub fn set_listed(&mut self) {
		self.flags.insert(Flags::LISTED);
	}

	pub fn clear_listed(&mut self) {
		self.flags.remove(Flags::LISTED);
	}

	/// Advances the age counters by `diff`, per spec.md §4.6: packets
	/// admitted during the interval that just ended age from their
	/// admission point (`diff_start`), everything else ages by the time
	/// since the forwarder's last pass (`diff_last`). The caller picks
	/// which `diff` to pass.
	pub fn age(&mut self, diff: u64) {
		self.active = self.active.saturating_add(diff);
		self.dwell = self.dwell.saturating_add(diff);
	}
}

/// A preallocated table of buffered datagrams.
pub struct PacketTable<const B: usize, const D: usize> {
	slots: [Packet<D>; B],
}

impl<const B: usize, const D: usize> PacketTable<B, D> {
	pub const fn new() -> Self {
		Self {
			slots: [Packet::empty(); B],
		}
	}

	fn is_used(slot: &Packet<D>) -> bool {
		slot.flags.contains(Flags::USED)
	}

	pub fn get(&self, index: usize) -> &Packet<D> {
		&self.slots[index]
	}

	pub fn get_mut(&mut self, index: usize) -> &mut Packet<D> {
		&mut self.slots[index]
	}

	/// Whether `window` has at least one packet referencing it, and if
	/// so, at which index (used to find the packet to reclaim first).
	pub fn find_lowest_for_window(&self, window: usize, lower_bound: SeqVal) -> Option<usize> {
		self.slots
			.iter()
			.position(|p| Self::is_used(p) && p.window == window && p.seq_val.eq(lower_bound))
	}

	/// Finds a free slot. Returns `None` if the table is full
	/// (`buffer_allocate` returning `NULL`).
	pub fn allocate(&mut self) -> Option<usize> {
		self.slots.iter().position(|p| !Self::is_used(p))
	}

	/// Frees the buffer slot at `index` without touching its window.
	pub fn free(&mut self, index: usize) {
		self.slots[index] = Packet::empty();
	}

	/// Stores a freshly admitted datagram into slot `index`. `datagram`
	/// must fit within `D` bytes.
	pub fn store(&mut self, index: usize, window: usize, seq_val: SeqVal, datagram: &[u8]) {
		let slot = &mut self.slots[index];
		*slot = Packet::empty();
		slot.flags.insert(Flags::USED);
		slot.window = window;
		slot.seq_val = seq_val;
		slot.len = datagram.len();
		slot.datagram[..datagram.len()].copy_from_slice(datagram);
	}

	/// Reclaims a packet from the window with the largest occupancy,
	/// freeing its lowest-bound packet. Mirrors `buffer_reclaim`: refuses
	/// to reclaim from a window whose count is already `1`, since that
	/// would silently drop the window's last message instead of genuinely
	/// making room. Returns the freed slot's index.
	pub fn reclaim<const W: usize>(&mut self, windows: &mut WindowTable<W>) -> Option<usize> {
		let largest = windows.largest()?;
		let window = windows.get(largest);
		if window.count() <= 1 {
			return None;
		}
		let lower_bound = window.lower_bound()?;
		let index = self.find_lowest_for_window(largest, lower_bound)?;
		self.free(index);
		windows.release_one(largest);
		windows.recompute_lower_bounds(self.iter_used().map(|(_, p)| (p.window(), p.seq_val())));
		Some(index)
	}

	/// Iterates over every live packet's table index, owning window
	/// index, and sequence value.
	pub fn iter_used(&self) -> impl Iterator<Item = (usize, &Packet<D>)> {
		self.slots.iter().enumerate().filter(|(_, p)| Self::is_used(p))
	}

	pub fn iter_used_mut(&mut self) -> impl Iterator<Item = (usize, &mut Packet<D>)> {
		self.slots.iter_mut().enumerate().filter(|(_, p)| Self::is_used(p))
	}

	/// Clears the "listed" bit on every buffered packet (start of
	/// control-message processing, spec.md §4.5).
	pub fn clear_all_listed(&mut self) {
		for slot in &mut self.slots {
			slot.clear_listed();
		}
	}
}

impl<const B: usize, const D: usize> Default for PacketTable<B, D> {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::seed::{Parametrization, SeedId};

	#[test]
	fn allocate_store_and_free_roundtrip() {
		let mut packets: PacketTable<2, 16> = PacketTable::new();
		let idx = packets.allocate().unwrap();
		packets.store(idx, 0, SeqVal::new(1), &[1, 2, 3]);
		assert_eq!(packets.get(idx).datagram(), &[1, 2, 3]);
		assert_eq!(packets.get(idx).seq_val(), SeqVal::new(1));
		packets.free(idx);
		assert!(packets.allocate().is_some());
	}

	#[test]
	fn allocate_fails_when_full() {
		let mut packets: PacketTable<1, 8> = PacketTable::new();
		let idx = packets.allocate().unwrap();
		packets.store(idx, 0, SeqVal::new(1), &[0]);
		assert!(packets.allocate().is_none());
	}

	#[test]
	fn reclaim_refuses_last_packet_in_largest_window() {
		let mut windows: WindowTable<2> = WindowTable::new();
		let mut packets: PacketTable<2, 8> = PacketTable::new();
		let seed = SeedId::from_bytes([1, 1]);
		let w = windows.admit(None, seed, Parametrization::M0, SeqVal::new(5)).unwrap();
		let idx = packets.allocate().unwrap();
		packets.store(idx, w, SeqVal::new(5), &[0]);
		assert!(packets.reclaim(&mut windows).is_none());
	}

	#[test]
	fn reclaim_frees_lowest_bound_packet() {
		let mut windows: WindowTable<2> = WindowTable::new();
		let mut packets: PacketTable<4, 8> = PacketTable::new();
		let seed = SeedId::from_bytes([2, 2]);
		let w = windows.admit(None, seed, Parametrization::M0, SeqVal::new(10)).unwrap();
		windows.admit(Some(w), seed, Parametrization::M0, SeqVal::new(11));
		let idx_low = packets.allocate().unwrap();
		packets.store(idx_low, w, SeqVal::new(10), &[0]);
		let idx_high = packets.allocate().unwrap();
		packets.store(idx_high, w, SeqVal::new(11), &[1]);

		let freed = packets.reclaim(&mut windows).unwrap();
		assert_eq!(freed, idx_low);
		assert_eq!(windows.get(w).count(), 1);
		assert_eq!(windows.get(w).lower_bound(), Some(SeqVal::new(11)));
	}

	/// spec.md §8 scenario 3: admitting 5, 6, 3 leaves lower=3/upper=6; a
	/// reclaim evicting the lower-bound packet (seq=3) must leave the
	/// window's lower bound at the next-lowest surviving value (5), not
	/// stuck at the just-freed one.
	#[test]
	fn reclaim_recomputes_lower_bound_from_survivors() {
		let mut windows: WindowTable<2> = WindowTable::new();
		let mut packets: PacketTable<3, 8> = PacketTable::new();
		let seed = SeedId::from_bytes([3, 3]);

		let w = windows.admit(None, seed, Parametrization::M0, SeqVal::new(5)).unwrap();
		let idx5 = packets.allocate().unwrap();
		packets.store(idx5, w, SeqVal::new(5), &[0]);

		windows.admit(Some(w), seed, Parametrization::M0, SeqVal::new(6));
		let idx6 = packets.allocate().unwrap();
		packets.store(idx6, w, SeqVal::new(6), &[0]);

		windows.admit(Some(w), seed, Parametrization::M0, SeqVal::new(3));
		let idx3 = packets.allocate().unwrap();
		packets.store(idx3, w, SeqVal::new(3), &[0]);

		assert_eq!(windows.get(w).lower_bound(), Some(SeqVal::new(3)));
		assert_eq!(windows.get(w).upper_bound(), Some(SeqVal::new(6)));
		assert_eq!(windows.get(w).count(), 3);

		let freed = packets.reclaim(&mut windows).unwrap();
		assert_eq!(freed, idx3);
		assert_eq!(windows.get(w).lower_bound(), Some(SeqVal::new(5)));
		assert_eq!(windows.get(w).upper_bound(), Some(SeqVal::new(6)));

		windows.admit(Some(w), seed, Parametrization::M0, SeqVal::new(100));
		assert_eq!(windows.get(w).lower_bound(), Some(SeqVal::new(5)));
		assert_eq!(windows.get(w).upper_bound(), Some(SeqVal::new(100)));
	}
}
