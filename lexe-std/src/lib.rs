//! # `lexe-std`
//!
//! This crate contains "std extensions" which other Lexe crates can use without
//! having to pull in any dependencies.
//!
//! Traits, macros, copies of unstable `std` APIs, a small number of types, are
//! all fair game so long as they do NOT depend on anything outside of [`std`].
