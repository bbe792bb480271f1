//! [![CI Status]][workflow] [![MSRV]][repo] [![Latest Version]][crates.io] [![Rust Doc Crate]][docs.rs] [![Rust Doc Main]][docs]
//!
//! [CI Status]: https://img.shields.io/github/actions/workflow/status/juntyr/numcodecs-rs/ci.yml?branch=main
//! [workflow]: https://github.com/juntyr/numcodecs-rs/actions/workflows/ci.yml?query=branch%3Amain
//!
//! [MSRV]: https://img.shields.io/badge/MSRV-1.85.0-blue
//! [repo]: https://github.com/juntyr/numcodecs-rs
//!
//! [Latest Version]: https://img.shields.io/crates/v/numcodecs-wasm
//! [crates.io]: https://crates.io/crates/numcodecs-wasm
//!
//! [Rust Doc Crate]: https://img.shields.io/docsrs/numcodecs-wasm
//! [docs.rs]: https://docs.rs/numcodecs-wasm/
//!
//! [Rust Doc Main]: https://img.shields.io/badge/docs-main-blue
//! [docs]: https://juntyr.github.io/numcodecs-rs/numcodecs_wasm
//!
//! Codec classes synthesized from binary WebAssembly components that export
//! the `numcodecs:abc/codec` interface.
//!
//! A codec class is created from a component with
//! [`create_codec_class`] or, for a declared class shape, with
//! [`synthesize_codec_class`]. The class is registered in a
//! [`CodecNamespace`], from which codecs can be instantiated by their
//! configuration. All calls into a component go through a
//! [`RuntimeBridge`], which owns the WebAssembly runtime.
//!
//! The [`InstructionCounterObserver`] measures the number of instructions
//! that each codec instance executes to encode and decode.

#[macro_use]
extern crate log;

mod bridge;
mod class;
mod codec;
mod error;
mod identity;
mod instance;
mod namespace;
mod observer;
mod synthesize;

pub use bridge::{BinaryComponent, ComponentSource, RuntimeBridge};
pub use class::WasmCodecClass;
pub use codec::{
    codec_from_config_with_id, serialize_codec_config_with_id, Codec, DynCodec, DynCodecType,
};
pub use error::{
    BridgeError, ContractViolation, GuestError, InstrumentationError, RuntimeError,
    WasmCodecClassError, WasmCodecError,
};
pub use identity::IdentityKey;
pub use instance::WasmCodec;
pub use namespace::CodecNamespace;
pub use observer::{
    CodecDirection, InstructionCounterObserver, InstructionMeasurements, ObservationHook,
    ObservedCodec,
};
pub use synthesize::{
    create_codec_class, synthesize_codec_class, CodecClassRequest, MODULE_ATTRIBUTE,
    QUALNAME_ATTRIBUTE,
};

#[cfg(test)]
use ::simple_logger as _;
