//! This crate contains generic utilities the other fh154 crates depend upon
//! but that are not directly related to IEEE 802.15.4 frequency hopping.
//!
//! - [`log`]: logging macros that work with `log`, `defmt` or no backend.
//! - [`sync`]: the interrupt-safe context cell shared between task and
//!   interrupt context.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod sync;

pub mod log;

#[cfg(any(feature = "defmt", feature = "log"))]
pub use log::*;

/// A generic error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error;

/// A type alias for `Result<T, fh154_util::Error>`.
pub type Result<T> = core::result::Result<T, Error>;
