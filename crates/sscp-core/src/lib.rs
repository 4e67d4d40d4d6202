//! Shark Slave Communications Protocol (SSCP) encoding and codecs in pure Rust.
//!
//! `sscp-core` provides zero-copy, `no_std`-compatible encoding and decoding
//! of SSCP request/reply frames. With the `std` feature (default) it also
//! carries the typed process-variable codec and the two binary schedule
//! codecs used by Domat PLCs.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod encoding;
pub mod error;
pub mod frame;
#[cfg(feature = "std")]
pub mod ieee754;
pub mod pdu;
#[cfg(feature = "std")]
pub mod schedule;
#[cfg(feature = "std")]
pub mod variable;

pub use error::{DecodeError, EncodeError};
#[cfg(feature = "std")]
pub use error::{CodecError, ScheduleError};
pub use pdu::VariableAddress;
