use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
/// Opaque error raised by the WebAssembly runtime, e.g. when a component
/// traps, exceeds a limit, or does not have the expected shape.
pub struct RuntimeError(#[from] anyhow::Error);

impl RuntimeError {
    /// Create a new runtime error from a `message`.
    #[must_use]
    pub fn msg(message: impl std::fmt::Display + std::fmt::Debug + Send + Sync + 'static) -> Self {
        Self(anyhow::Error::msg(message))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{msg}")]
/// Error reported by the codec implementation inside the WebAssembly
/// component, consisting of a message and the chain of its causes.
pub struct GuestError {
    msg: Arc<str>,
    source: Option<Box<GuestError>>,
}

impl GuestError {
    /// Create a new guest error from its `message` and the messages of its
    /// `chain` of causes, outermost first.
    #[must_use]
    pub fn new(message: impl Into<Arc<str>>, chain: impl IntoIterator<Item = Arc<str>>) -> Self {
        let mut root = Self {
            msg: message.into(),
            source: None,
        };

        let mut err = &mut root;

        for msg in chain {
            err = &mut *err.source.insert(Box::new(Self { msg, source: None }));
        }

        root
    }

    /// The message of this error, without its causes.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.msg
    }
}

#[derive(Debug, thiserror::Error)]
/// Errors that a [`RuntimeBridge`][crate::RuntimeBridge] may raise.
pub enum BridgeError {
    /// The binary component is malformed or lacks a required export
    #[error("the WebAssembly component is invalid")]
    InvalidComponent {
        /// The reason why the component is invalid
        source: RuntimeError,
    },
    /// The component does not export an optional capability
    #[error("the WebAssembly component does not support {capability}")]
    Unsupported {
        /// The name of the missing capability
        capability: &'static str,
    },
    /// The WebAssembly runtime raised an error
    #[error("the WebAssembly runtime raised an error")]
    Runtime {
        /// The runtime error
        source: RuntimeError,
    },
    /// The codec implementation inside the component raised an error
    #[error("the WebAssembly codec implementation raised an error")]
    Codec {
        /// The codec error
        source: GuestError,
    },
}

impl BridgeError {
    /// Wrap an engine-level error as a [`BridgeError::Runtime`] error.
    #[must_use]
    pub fn runtime(err: impl Into<anyhow::Error>) -> Self {
        Self::Runtime {
            source: RuntimeError::from(err.into()),
        }
    }

    /// Wrap an engine-level error as a [`BridgeError::InvalidComponent`]
    /// error.
    #[must_use]
    pub fn invalid_component(err: impl Into<anyhow::Error>) -> Self {
        Self::InvalidComponent {
            source: RuntimeError::from(err.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
/// Errors that can occur when using a [`WasmCodec`][crate::WasmCodec]
pub enum WasmCodecError {
    /// The codec's lock was poisoned
    #[error("{codec_id} codec's lock was poisoned")]
    Poisoned {
        /// The codec's id
        codec_id: Arc<str>,
    },
    /// The codec's component instance has already been released
    #[error("{codec_id} codec's component instance has already been released")]
    Released {
        /// The codec's id
        codec_id: Arc<str>,
    },
    /// The codec's component instance reports a different codec id than its
    /// class
    #[error("{codec_id} codec's component instance reports the codec id {found:?}")]
    CodecIdMismatch {
        /// The codec's id
        codec_id: Arc<str>,
        /// The codec id reported by the component instance
        found: String,
    },
    /// The codec's runtime bridge raised an error
    #[error("{codec_id} codec's runtime bridge raised an error")]
    Bridge {
        /// The codec's id
        codec_id: Arc<str>,
        /// The bridge error
        source: BridgeError,
    },
}

#[derive(Debug, thiserror::Error)]
/// Violations of the codec class creation contract.
pub enum ContractViolation {
    /// Codec classes cannot have base classes
    #[error("codec classes must not have any bases, found {bases:?}")]
    UnexpectedBases {
        /// The bases that were requested
        bases: Vec<String>,
    },
    /// A required attribute is missing
    #[error("codec class attribute `{attribute}` is missing")]
    MissingAttribute {
        /// The name of the missing attribute
        attribute: &'static str,
    },
    /// An attribute outside of the exact attribute set was requested
    #[error("codec class attribute `{attribute}` is not allowed")]
    UnexpectedAttribute {
        /// The name of the unexpected attribute
        attribute: String,
    },
    /// An attribute has a non-string value
    #[error("codec class attribute `{attribute}` must be a string, found {value}")]
    NonStringAttribute {
        /// The name of the attribute
        attribute: &'static str,
        /// The value of the attribute
        value: serde_json::Value,
    },
    /// The `module` attribute does not name the target namespace
    #[error("codec class module `{module}` does not match the target namespace `{namespace}`")]
    NamespaceMismatch {
        /// The requested module
        module: String,
        /// The name of the target namespace
        namespace: String,
    },
}

#[derive(Debug, thiserror::Error)]
/// Errors that can occur when creating a
/// [`WasmCodecClass`][crate::WasmCodecClass]
pub enum WasmCodecClassError {
    /// The class creation request is malformed
    #[error("the codec class creation request is malformed")]
    ContractViolation {
        /// The violated part of the contract
        #[from]
        source: ContractViolation,
    },
    /// The WebAssembly component failed to load or validate
    #[error("{codec_id} WebAssembly component is invalid")]
    InvalidComponent {
        /// The codec's id, if already known
        codec_id: Arc<str>,
        /// The reason why the component is invalid
        source: BridgeError,
    },
    /// The synthesized class does not have the declared name
    #[error(
        "the synthesized codec class {found_qualname} (named {found_name}) does not match the \
         declared class {declared_qualname} (named {declared_name})"
    )]
    IdentityMismatch {
        /// The declared class name
        declared_name: String,
        /// The declared qualified class name
        declared_qualname: String,
        /// The synthesized class name
        found_name: String,
        /// The synthesized qualified class name
        found_qualname: String,
    },
}

#[derive(Debug, thiserror::Error)]
/// Errors that can occur while measuring a codec's executed instructions.
pub enum InstrumentationError {
    /// The instruction counter decreased during a call
    #[error("the instruction counter regressed from {before} to {after}")]
    CounterRegression {
        /// The counter before the call
        before: u64,
        /// The counter after the call
        after: u64,
    },
    /// The instruction counter disappeared during a call
    #[error("the instruction counter is no longer available")]
    CounterVanished,
    /// Reading the instruction counter failed
    #[error("reading the instruction counter failed")]
    Counter {
        /// The codec's error
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
