//! Seed identifiers and the Trickle parametrization bit.
//!
//! The seed mode is a compile-time choice (the `short-seed` feature),
//! matching `ROLL_TRICKLE_SHORT_SEEDS` in the upstream draft implementation.
//! Both modes share all other engine logic.

use core::fmt;

/// Length in bytes of the on-wire seed identifier for the active mode.
#[cfg(feature = "short-seed")]
pub const SEED_LEN: usize = 2;
/// Length in bytes of the on-wire seed identifier for the active mode.
#[cfg(not(feature = "short-seed"))]
pub const SEED_LEN: usize = 16;

/// A seed identifier: the originating node's identity, qualifying a
/// sequence-number space.
///
/// In short-seed mode this is a 16-bit value carried inside the Trickle
/// option. In long-seed mode it is the full IPv6 source address, elided
/// from the option and recovered from the datagram's source address field.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeedId([u8; SEED_LEN]);

impl SeedId {
	/// The all-zeros seed, used as a "no seed" placeholder in unused table
	/// slots.
	pub const NULL: Self = Self([0u8; SEED_LEN]);

	/// Builds a seed identifier from its wire-format bytes.
	pub const fn from_bytes(bytes: [u8; SEED_LEN]) -> Self {
		Self(bytes)
	}

	/// The wire-format bytes.
	pub const fn as_bytes(&self) -> &[u8; SEED_LEN] {
		&self.0
	}

	/// True for the all-zeros seed.
	pub fn is_null(&self) -> bool {
		*self == Self::NULL
	}
}

impl Default for SeedId {
	fn default() -> Self {
		Self::NULL
	}
}

impl fmt::Debug for SeedId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SeedId(0x")?;
		for byte in self.0 {
			write!(f, "{byte:02x}")?;
		}
		write!(f, ")")
	}
}

/// The one-bit Trickle parametrization selector.
///
/// Two independent Trickle controllers exist, indexed by this bit, because
/// the draft partitions multicast groups into two parametrizations (see
/// spec.md §9 Design Notes).
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Parametrization {
	M0,
	M1,
}

impl Parametrization {
	/// Both parametrizations, in index order.
	pub const ALL: [Self; 2] = [Self::M0, Self::M1];

	/// The parametrization's table index, `0` or `1`.
	pub const fn index(self) -> usize {
		match self {
			Self::M0 => 0,
			Self::M1 => 1,
		}
	}

	/// Decodes the parametrization from a single wire bit.
	pub const fn from_bit(bit: bool) -> Self {
		if bit { Self::M1 } else { Self::M0 }
	}

	/// Encodes the parametrization back to a single wire bit.
	pub const fn as_bit(self) -> bool {
		matches!(self, Self::M1)
	}
}
