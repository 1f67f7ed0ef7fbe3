//! Compile-time parameters and their runtime configuration surface.
//!
//! spec.md treats `Imin`, `Imax`, `k`, `Tactive`, `Tdwell`, the HBH option
//! type, and the ICMPv6 type/code/hop-limit/destination as "build-time
//! parameters". This crate exposes them as a runtime-constructed
//! [`EngineConfig`] instead of baking them into `const fn`s, following
//! the teacher's `src/config.rs` (a small constant-holding module) but
//! generalized: `Imin`/`k`/etc. are genuinely per-deployment values for a
//! general-purpose crate, not per-build constants for a single kernel.

use thiserror::Error;

/// A monotonic tick count, wide enough that `Imax_ticks * t_active` cannot
/// silently overflow on any host word size (spec.md §9 Design Notes).
pub type Ticks = u64;

/// The HBH option type tag used by the upstream draft implementation.
pub const DEFAULT_OPTION_TYPE: u8 = 0x0C;

/// Where outgoing control messages are sent.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ControlDestination {
	/// `ff02::1`, the link-local all-nodes multicast address.
	AllNodes,
	/// `ff02::2`, the link-local all-routers multicast address.
	AllRouters,
}

/// Errors rejected at configuration time rather than risking silently
/// wrong behavior at run time.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ConfigError {
	#[error("i_min must be non-zero")]
	ZeroImin,
	#[error("i_max doublings overflow the tick accumulator")]
	IntervalOverflow,
	#[error("t_active * Imax_ticks overflows the tick accumulator")]
	ActiveLifetimeOverflow,
	#[error("t_dwell * Imax_ticks overflows the tick accumulator")]
	DwellLifetimeOverflow,
}

/// Per-parametrization Trickle configuration (spec.md §3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TrickleParams {
	i_min: Ticks,
	i_max: u8,
	/// Redundancy constant. `None` is the `k = ∞` sentinel from spec.md
	/// §4.4: suppression is disabled, no control messages are emitted,
	/// and `c`/`k` comparisons are skipped, but packets are still
	/// forwarded.
	k: Option<u8>,
	t_active: u8,
	t_dwell: u8,
	imax_ticks: Ticks,
	tactive_ticks: Ticks,
	tdwell_ticks: Ticks,
}

impl TrickleParams {
	/// Builds and validates a parametrization's configuration.
	///
	/// `i_max` is the maximum number of interval doublings; `t_active`
	/// and `t_dwell` are in units of `Imax` (spec.md §3).
	pub fn new(
		i_min: Ticks,
		i_max: u8,
		k: Option<u8>,
		t_active: u8,
		t_dwell: u8,
	) -> Result<Self, ConfigError> {
		if i_min == 0 {
			return Err(ConfigError::ZeroImin);
		}
		let imax_ticks = i_min
			.checked_shl(u32::from(i_max))
			.filter(|v| *v != 0)
			.ok_or(ConfigError::IntervalOverflow)?;
		let tactive_ticks = imax_ticks
			.checked_mul(Ticks::from(t_active))
			.ok_or(ConfigError::ActiveLifetimeOverflow)?;
		let tdwell_ticks = imax_ticks
			.checked_mul(Ticks::from(t_dwell))
			.ok_or(ConfigError::DwellLifetimeOverflow)?;
		Ok(Self {
			i_min,
			i_max,
			k,
			t_active,
			t_dwell,
			imax_ticks,
			tactive_ticks,
			tdwell_ticks,
		})
	}

	/// `Imin`, in ticks.
	pub const fn i_min(&self) -> Ticks {
		self.i_min
	}

	/// Maximum number of interval doublings.
	pub const fn i_max(&self) -> u8 {
		self.i_max
	}

	/// The redundancy constant, or `None` for `k = ∞` (suppression
	/// disabled).
	pub const fn k(&self) -> Option<u8> {
		self.k
	}

	/// `Imin << doublings`, the current interval length for a given
	/// doubling count.
	pub fn interval(&self, doublings: u8) -> Ticks {
		self.i_min << doublings
	}

	/// `Imax` expressed in ticks: `i_min << i_max`.
	pub const fn imax_ticks(&self) -> Ticks {
		self.imax_ticks
	}

	/// `Tactive`, in ticks.
	pub const fn tactive_ticks(&self) -> Ticks {
		self.tactive_ticks
	}

	/// `Tdwell`, in ticks.
	pub const fn tdwell_ticks(&self) -> Ticks {
		self.tdwell_ticks
	}

	/// Whether suppression is enabled for this parametrization
	/// (`k != ∞`, spec.md §4.4).
	pub const fn suppression_enabled(&self) -> bool {
		self.k.is_some()
	}
}

/// Protocol-wide configuration: the two parametrizations plus the
/// control-message and egress constants from spec.md §6.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
	pub(crate) params: [TrickleParams; 2],
	/// ICMPv6 hop limit expected on inbound control messages and set on
	/// outbound ones.
	pub hop_limit: u8,
	/// ICMPv6 code expected on inbound control messages and set on
	/// outbound ones.
	pub icmp_code: u8,
	/// ICMPv6 type used for outbound control messages and expected on
	/// inbound ones (the "Trickle-multicast type" of spec.md §6).
	pub icmp_type: u8,
	/// HBH option type tag (`HBHO_OPT_TYPE_TRICKLE` in the upstream
	/// draft implementation).
	pub option_type: u8,
	/// Destination for outgoing control messages.
	pub destination: ControlDestination,
	/// Whether locally originated datagrams get the `M` bit set in their
	/// Trickle option (spec.md §4.8, `ROLL_TRICKLE_SET_M_BIT` in the
	/// upstream draft implementation).
	pub set_m_bit_on_egress: bool,
}

impl EngineConfig {
	/// Builds a configuration from per-parametrization Trickle settings
	/// and the protocol-wide constants.
	pub fn new(
		m0: TrickleParams,
		m1: TrickleParams,
		hop_limit: u8,
		icmp_code: u8,
		icmp_type: u8,
		destination: ControlDestination,
	) -> Self {
		Self {
			params: [m0, m1],
			hop_limit,
			icmp_code,
			icmp_type,
			option_type: DEFAULT_OPTION_TYPE,
			destination,
			set_m_bit_on_egress: false,
		}
	}

	/// The configuration for parametrization `m`.
	pub fn params(&self, m: crate::seed::Parametrization) -> &TrickleParams {
		&self.params[m.index()]
	}
}
