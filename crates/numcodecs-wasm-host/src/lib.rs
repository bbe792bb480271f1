//! [![CI Status]][workflow] [![MSRV]][repo] [![Latest Version]][crates.io] [![Rust Doc Crate]][docs.rs] [![Rust Doc Main]][docs]
//!
//! [CI Status]: https://img.shields.io/github/actions/workflow/status/juntyr/numcodecs-rs/ci.yml?branch=main
//! [workflow]: https://github.com/juntyr/numcodecs-rs/actions/workflows/ci.yml?query=branch%3Amain
//!
//! [MSRV]: https://img.shields.io/badge/MSRV-1.85.0-blue
//! [repo]: https://github.com/juntyr/numcodecs-rs
//!
//! [Latest Version]: https://img.shields.io/crates/v/numcodecs-wasm-host
//! [crates.io]: https://crates.io/crates/numcodecs-wasm-host
//!
//! [Rust Doc Crate]: https://img.shields.io/docsrs/numcodecs-wasm-host
//! [docs.rs]: https://docs.rs/numcodecs-wasm-host/
//!
//! [Rust Doc Main]: https://img.shields.io/badge/docs-main-blue
//! [docs]: https://juntyr.github.io/numcodecs-rs/numcodecs_wasm_host
//!
//! Runtime bridge that executes `numcodecs:abc/codec` WebAssembly components
//! for the [`numcodecs_wasm`] codec classes.

#![allow(clippy::multiple_crate_versions)] // FIXME

#[macro_use]
extern crate log;

mod buffer;
mod component;
mod engine;
mod logging;
mod wit;

pub use component::{WasmComponentBridge, WasmComponentHandle};
pub use engine::{default_engine, Engine, EngineConfig};
pub use wit::NumcodecsWitInterfaces;

#[cfg(test)]
use ::simple_logger as _;
