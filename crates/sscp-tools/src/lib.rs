//! Shared helpers for the SSCP command-line tools.

pub mod common;
