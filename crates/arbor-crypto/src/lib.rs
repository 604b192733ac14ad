//! Content hashing for arbor.
//!
//! Provides domain-separated BLAKE3 hashing. Every stored value kind hashes
//! under its own domain tag, so equal bytes of different kinds never share a
//! store key.

pub mod hasher;

pub use hasher::ContentHasher;
