//! Bundled languages
//!
//! Grammars shipped with the crate, compiled on first use and shared
//! afterwards.
//!
//! - [`tessera`] - the Tessera programming language

pub mod tessera;
