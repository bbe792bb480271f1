use std::{
    fmt,
    hash::{BuildHasher, Hash, Hasher},
    path::{Path, PathBuf},
    sync::Arc,
};

use schemars::Schema;
use serde_json::{Map, Value};

use crate::error::BridgeError;

#[derive(Clone)]
/// Immutable bytes of a binary WebAssembly component.
///
/// Two components are equal iff their bytes are equal. Cloning a component
/// is cheap and shares the bytes.
///
/// The bytes are digested once when the component is created, so that
/// hashing a component does not read all of its bytes again.
pub struct BinaryComponent {
    bytes: Arc<[u8]>,
    digest: u64,
}

impl BinaryComponent {
    /// Wrap the `bytes` of a binary WebAssembly component.
    #[must_use]
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        let digest = std::hash::BuildHasherDefault::<std::hash::DefaultHasher>::default()
            .hash_one(&*bytes);

        Self { bytes, digest }
    }

    /// Read a binary WebAssembly component from the file at `path`.
    ///
    /// # Errors
    ///
    /// Errors if reading the file fails.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        std::fs::read(path).map(Self::new)
    }

    /// The bytes of the component.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for BinaryComponent {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
            || (self.digest == other.digest && self.bytes == other.bytes)
    }
}

impl Eq for BinaryComponent {}

impl Hash for BinaryComponent {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.digest.hash(state);
    }
}

impl fmt::Debug for BinaryComponent {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("BinaryComponent")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
/// Where the bytes of a binary WebAssembly component come from.
pub enum ComponentSource {
    /// The component's bytes are already in memory
    Bytes(BinaryComponent),
    /// The component is read from a file, but only once it is needed
    Path(PathBuf),
}

impl ComponentSource {
    /// Load the component, reading it from its path if necessary.
    ///
    /// # Errors
    ///
    /// Errors with [`BridgeError::InvalidComponent`] if reading the
    /// component's file fails.
    pub fn load(self) -> Result<BinaryComponent, BridgeError> {
        match self {
            Self::Bytes(component) => Ok(component),
            Self::Path(path) => BinaryComponent::read(&path).map_err(|err| {
                BridgeError::invalid_component(
                    anyhow::Error::new(err)
                        .context(format!("failed to read the component at {}", path.display())),
                )
            }),
        }
    }
}

impl From<BinaryComponent> for ComponentSource {
    fn from(component: BinaryComponent) -> Self {
        Self::Bytes(component)
    }
}

impl From<Vec<u8>> for ComponentSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(BinaryComponent::new(bytes))
    }
}

impl From<PathBuf> for ComponentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

/// Execution engine that instantiates binary WebAssembly codec components
/// and calls into their exports.
///
/// Every [`Self::Handle`] represents one sandboxed component instantiation.
/// All calls take the handle by mutable reference, so a handle is never
/// entered by two callers at the same time.
pub trait RuntimeBridge: 'static + Send + Sync {
    /// One component instantiation, which may hold a codec.
    type Handle: Send;

    /// Instantiate the `component` without constructing a codec, e.g. to
    /// query its [`Self::codec_id`].
    ///
    /// # Errors
    ///
    /// Errors with [`BridgeError::InvalidComponent`] if the component is
    /// malformed or lacks the required codec exports.
    fn instantiate(&self, component: &BinaryComponent) -> Result<Self::Handle, BridgeError>;

    /// Instantiate the `component` and construct a codec inside it from its
    /// `config`uration.
    ///
    /// # Errors
    ///
    /// Errors if instantiating the component or constructing the codec
    /// fails.
    fn from_config(
        &self,
        component: &BinaryComponent,
        config: &Map<String, Value>,
    ) -> Result<Self::Handle, BridgeError>;

    /// The codec id declared by the component.
    ///
    /// # Errors
    ///
    /// Errors if calling into the component fails.
    fn codec_id(&self, handle: &mut Self::Handle) -> Result<String, BridgeError>;

    /// The JSON schema of the codec configuration declared by the component.
    ///
    /// # Errors
    ///
    /// Errors if calling into the component fails.
    fn codec_config_schema(&self, handle: &mut Self::Handle) -> Result<Schema, BridgeError>;

    /// Encode the `data` with the handle's codec.
    ///
    /// # Errors
    ///
    /// Errors if the handle holds no codec or if encoding fails.
    fn encode(&self, handle: &mut Self::Handle, data: &[u8]) -> Result<Vec<u8>, BridgeError>;

    /// Decode the `encoded` data with the handle's codec.
    ///
    /// # Errors
    ///
    /// Errors if the handle holds no codec or if decoding fails.
    fn decode(&self, handle: &mut Self::Handle, encoded: &[u8]) -> Result<Vec<u8>, BridgeError>;

    /// Decode the `encoded` data with the handle's codec into the `decoded`
    /// output.
    ///
    /// # Errors
    ///
    /// Errors if the handle holds no codec, if decoding fails, or if the
    /// decoded data does not fit the output.
    fn decode_into(
        &self,
        handle: &mut Self::Handle,
        encoded: &[u8],
        decoded: &mut [u8],
    ) -> Result<(), BridgeError>;

    /// The configuration of the handle's codec.
    ///
    /// # Errors
    ///
    /// Errors if the handle holds no codec or if reading its configuration
    /// fails.
    fn get_config(&self, handle: &mut Self::Handle) -> Result<Map<String, Value>, BridgeError>;

    /// Read the cumulative number of instructions executed inside the
    /// handle's component instantiation.
    ///
    /// # Errors
    ///
    /// Errors with [`BridgeError::Unsupported`] if the component does not
    /// export an instruction counter, or if reading the counter fails.
    fn read_instruction_counter(&self, handle: &mut Self::Handle) -> Result<u64, BridgeError>;

    /// Release the handle's codec and component instantiation.
    ///
    /// # Errors
    ///
    /// Errors if tearing down the codec or its instantiation fails. The
    /// handle is consumed either way.
    fn release(&self, handle: Self::Handle) -> Result<(), BridgeError>;
}
