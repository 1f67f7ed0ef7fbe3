//! Sliding-window table (spec.md §4.2).
//!
//! One window tracks the admitted sequence range for a single (seed id,
//! parametrization) pair. Tables are fixed-capacity and preallocated; there
//! is no allocation after [`WindowTable::new`]. Bounds and "is listed" state
//! are cleared to `None`/`false` rather than carrying C's `-1` sentinels.

use bitflags::bitflags;

use crate::seed::{Parametrization, SeedId};
use crate::serial::SeqVal;

bitflags! {
	#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
	struct Flags: u8 {
		/// Slot holds a live window.
		const USED = 0x80;
		/// `true` selects parametrization M1.
		const M = 0x40;
		/// The current inbound control message listed this window's seed.
		const LISTED = 0x20;
	}
}

/// A single sliding window slot (`struct sliding_window` in the upstream
/// draft implementation).
#[derive(Clone, Copy, Debug)]
pub struct Window {
	seed_id: SeedId,
	flags: Flags,
	lower_bound: Option<SeqVal>,
	upper_bound: Option<SeqVal>,
	/// Lowest sequence value the peer's current control message listed for
	/// this window, reset at the start of each control message (spec.md
	/// §4.5).
	min_listed: Option<SeqVal>,
	/// Number of packets currently buffered against this window.
	count: u8,
}

impl Window {
	const fn empty() -> Self {
		Self {
			seed_id: SeedId::NULL,
			flags: Flags::empty(),
			lower_bound: None,
			upper_bound: None,
			min_listed: None,
			count: 0,
		}
	}

	pub const fn seed_id(&self) -> SeedId {
		self.seed_id
	}

	pub const fn parametrization(&self) -> Parametrization {
		Parametrization::from_bit(self.flags.contains(Flags::M))
	}

	pub const fn lower_bound(&self) -> Option<SeqVal> {
		self.lower_bound
	}

	pub const fn upper_bound(&self) -> Option<SeqVal> {
		self.upper_bound
	}

	pub const fn min_listed(&self) -> Option<SeqVal> {
		self.min_listed
	}

	pub const fn count(&self) -> u8 {
		self.count
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

	pub fn reset_min_listed(&mut self) {
		self.min_listed = None;
	}

	/// Folds one advertised sequence value into `min_listed` (spec.md
	/// §4.5: "track the lowest listed value to detect gaps").
	pub fn note_listed(&mut self, val: SeqVal) {
		self.min_listed = Some(match self.min_listed {
			Some(current) if !val.lt(current) => current,
			_ => val,
		});
	}

	/// Admits `val` into this window, widening bounds and incrementing the
	/// occupancy count (`roll_trickle_accept`'s "we have not seen this
	/// message before" path).
	fn admit(&mut self, val: SeqVal) {
		if self.count == 0 {
			self.lower_bound = Some(val);
			self.upper_bound = Some(val);
		} else if self.upper_bound.is_none_or(|u| val.gt(u)) {
			self.upper_bound = Some(val);
		}
		self.count += 1;
	}
}

/// A preallocated table of sliding windows, one per known (seed id,
/// parametrization) pair. `W` is the table's fixed capacity.
pub struct WindowTable<const W: usize> {
	slots: [Window; W],
}

impl<const W: usize> WindowTable<W> {
	/// Builds an empty table. All slots start unused with cleared bounds.
	pub const fn new() -> Self {
		Self {
			slots: [Window::empty(); W],
		}
	}

	fn is_used(slot: &Window) -> bool {
		slot.flags.contains(Flags::USED)
	}

	/// Finds the window for `(seed, m)`, if one exists.
	pub fn lookup(&self, seed: SeedId, m: Parametrization) -> Option<usize> {
		self.slots
			.iter()
			.position(|w| Self::is_used(w) && w.seed_id == seed && w.parametrization() == m)
	}

	pub fn get(&self, index: usize) -> &Window {
		&self.slots[index]
	}

	pub fn get_mut(&mut self, index: usize) -> &mut Window {
		&mut self.slots[index]
	}

	/// Allocates a fresh window for `(seed, m)`, or returns the existing
	/// one if already present, admitting `val` either way. Mirrors
	/// `roll_trickle_accept`'s window setup once admission has been
	/// decided by the caller.
	pub fn admit(&mut self, index: Option<usize>, seed: SeedId, m: Parametrization, val: SeqVal) -> Option<usize> {
		let index = match index {
			Some(i) => i,
			None => self.allocate()?,
		};
		let slot = self.get_mut(index);
		slot.seed_id = seed;
		slot.flags.set(Flags::M, m.as_bit());
		slot.flags.insert(Flags::USED);
		slot.admit(val);
		Some(index)
	}

	/// Finds a free slot and marks it used with cleared bounds. Returns
	/// `None` if the table is full (`window_allocate` returning `NULL`).
	fn allocate(&mut self) -> Option<usize> {
		let index = self.slots.iter().position(|w| !Self::is_used(w))?;
		self.slots[index] = Window::empty();
		self.slots[index].flags.insert(Flags::USED);
		Some(index)
	}

	/// Releases a window back to the free pool (`window_free`).
	pub fn free(&mut self, index: usize) {
		self.slots[index] = Window::empty();
	}

	/// Decrements a window's occupancy count, freeing the window itself if
	/// it reaches zero. Returns `true` if the window was freed.
	pub fn release_one(&mut self, index: usize) -> bool {
		let slot = self.get_mut(index);
		slot.count = slot.count.saturating_sub(1);
		if slot.count == 0 {
			self.free(index);
			true
		} else {
			false
		}
	}

	/// Recomputes every window's lower bound from scratch given the
	/// buffered `(window_index, seq_val)` pairs still in the packet table.
	/// Upper bounds are not touched here: they only ever grow on admission
	/// (`window_update_bounds` in the upstream draft implementation only
	/// recomputes `lower_bound`; `upper_bound` is maintained incrementally).
	pub fn recompute_lower_bounds(&mut self, live_packets: impl Iterator<Item = (usize, SeqVal)>) {
		for slot in &mut self.slots {
			if Self::is_used(slot) {
				slot.lower_bound = None;
			}
		}
		for (index, val) in live_packets {
			let slot = &mut self.slots[index];
			slot.lower_bound = Some(match slot.lower_bound {
				Some(current) if !val.lt(current) => current,
				_ => val,
			});
		}
	}

	/// Iterates over all currently used windows together with their table
	/// index.
	pub fn iter_used(&self) -> impl Iterator<Item = (usize, &Window)> {
		self.slots.iter().enumerate().filter(|(_, w)| Self::is_used(w))
	}

	/// Clears the "listed" bit on every window (start of control-message
	/// processing, spec.md §4.5).
	pub fn clear_all_listed(&mut self) {
		for slot in &mut self.slots {
			slot.clear_listed();
			slot.reset_min_listed();
		}
	}

	/// The window with the highest occupancy count, used by the packet
	/// table's reclaim path (`buffer_reclaim`). Returns `None` if the
	/// table holds no windows at all.
	pub fn largest(&self) -> Option<usize> {
		self.slots
			.iter()
			.enumerate()
			.filter(|(_, w)| Self::is_used(w))
			.max_by_key(|(_, w)| w.count)
			.map(|(i, _)| i)
	}
}

impl<const W: usize> Default for WindowTable<W> {
	fn default() -> Self {
		Self::new()
	}
}
