//! Test-only adapters that live inside the domain crate for convenience.
//!
//! These record every port call in a shared journal so pipeline ordering can
//! be asserted without docker, a network or a database. Real adapters live in
//! separate crates under `adapters/`.

pub mod scripted;
