use std::sync::{Arc, OnceLock};

use numcodecs_wasm::GuestError;
use semver::Version;
use wasm_component_layer::{InterfaceIdentifier, PackageIdentifier, PackageName, Value};

/// WebAssembly Interface Type (WIT) interfaces for `numcodecs`
#[non_exhaustive]
pub struct NumcodecsWitInterfaces {
    /// The `numcodecs:abc/codec` interface
    pub codec: InterfaceIdentifier,
    /// The `numcodecs:wasm/perf` interface
    pub perf: InterfaceIdentifier,
    /// The name of the instruction counter function in the `perf` interface
    pub instruction_counter: String,
}

impl NumcodecsWitInterfaces {
    /// Get the once-computed interfaces
    #[must_use]
    pub fn get() -> &'static Self {
        static NUMCODECS_WIT_INTERFACES: OnceLock<NumcodecsWitInterfaces> = OnceLock::new();

        NUMCODECS_WIT_INTERFACES.get_or_init(|| Self {
            codec: InterfaceIdentifier::new(
                PackageIdentifier::new(
                    PackageName::new("numcodecs", "abc"),
                    Some(Version::new(0, 1, 1)),
                ),
                "codec",
            ),
            perf: InterfaceIdentifier::new(
                PackageIdentifier::new(
                    PackageName::new("numcodecs", "wasm"),
                    Some(Version::new(0, 1, 0)),
                ),
                "perf",
            ),
            instruction_counter: String::from("instruction-counter"),
        })
    }
}

pub fn guest_error_from_wasm(err: Option<&Value>) -> Result<GuestError, anyhow::Error> {
    let Some(Value::Record(record)) = err else {
        anyhow::bail!("unexpected err value {err:?}");
    };

    let Some(Value::String(message)) = record.field("message") else {
        anyhow::bail!("numcodecs:abc/codec::error is missing the `message` field");
    };

    let Some(Value::List(chain)) = record.field("chain") else {
        anyhow::bail!("numcodecs:abc/codec::error is missing the `chain` field");
    };

    let Ok(chain) = chain
        .iter()
        .map(|msg| match msg {
            Value::String(msg) => Ok(msg),
            _ => Err(()),
        })
        .collect::<Result<Vec<Arc<str>>, _>>()
    else {
        anyhow::bail!(
            "numcodecs:abc/codec::error chain contains unexpected non-string values: {chain:?}"
        );
    };

    Ok(GuestError::new(message, chain))
}
