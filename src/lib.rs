//! An IPv6 multicast forwarding engine built around the Trickle algorithm
//! for Routing Over Low-power and Lossy networks (ROLL).
//!
//! The crate implements the algorithmic core only: serial-number
//! arithmetic, the sliding-window and packet tables, the two
//! parametrized Trickle controllers, the consistency checker, the
//! periodic forwarder pass, and the ingress/egress admission paths. The
//! IPv6 stack, link layer, clock, timer, random source, and watchdog are
//! consumed as collaborator traits (see [`collaborators`]) so a host can
//! wire the engine into whatever stack it runs; [`engine::Engine`] is the
//! crate's entry point.
#![warn(rust_2018_idioms)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod buffer;
pub mod collaborators;
pub mod config;
pub mod consistency;
pub mod egress;
pub mod engine;
pub mod forwarder;
pub mod ingress;
pub mod seed;
pub mod serial;
pub mod stats;
pub mod trickle;
pub mod wire;
pub mod window;

pub use config::{ConfigError, ControlDestination, EngineConfig, Ticks, TrickleParams};
pub use engine::Engine;
pub use seed::{Parametrization, SeedId};
pub use serial::SeqVal;
pub use stats::Stats;
