use std::sync::{Mutex, PoisonError};

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::{
    bridge::RuntimeBridge,
    class::WasmCodecClass,
    codec::{Codec, DynCodec, DynCodecType},
    error::{BridgeError, WasmCodecError},
};

/// Codec instantiated inside a WebAssembly component.
///
/// Each codec owns its own component instantiation such that two codecs
/// cannot interfere. Calls into the instantiation are serialized by a
/// per-codec lock.
pub struct WasmCodec<B: RuntimeBridge> {
    handle: Mutex<Option<B::Handle>>,
    class: WasmCodecClass<B>,
}

impl<B: RuntimeBridge> WasmCodec<B> {
    pub(crate) fn new(handle: B::Handle, class: WasmCodecClass<B>) -> Self {
        Self {
            handle: Mutex::new(Some(handle)),
            class,
        }
    }

    /// The class of this codec.
    #[must_use]
    pub const fn class(&self) -> &WasmCodecClass<B> {
        &self.class
    }

    /// Try cloning the codec by recreating it from its configuration.
    ///
    /// The clone owns a fresh component instantiation.
    ///
    /// # Errors
    ///
    /// Errors if serializing the codec configuration, constructing the new
    /// codec, or interacting with the component fails.
    pub fn try_clone(&self) -> Result<Self, serde_json::Error> {
        let mut config = self.get_config(serde_json::value::Serializer)?;

        if let Some(config) = config.as_object_mut() {
            config.remove("id");
        }

        self.class.codec_from_config(config)
    }

    /// Try dropping the codec, releasing its component instantiation.
    ///
    /// `WasmCodec` implements [`Drop`] by also releasing the instantiation
    /// but ignoring any errors.
    ///
    /// # Errors
    ///
    /// Errors if releasing the codec's component instantiation fails.
    pub fn try_drop(mut self) -> Result<(), WasmCodecError> {
        // keep in sync with drop
        let Some(handle) = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return Ok(());
        };

        self.class
            .bridge()
            .release(handle)
            .map_err(|source| WasmCodecError::Bridge {
                codec_id: self.class.codec_id_arc(),
                source,
            })
    }

    pub(crate) fn with_handle<O>(
        &self,
        with: impl FnOnce(&B, &mut B::Handle) -> Result<O, BridgeError>,
    ) -> Result<O, WasmCodecError> {
        let mut handle = self.handle.lock().map_err(|_| WasmCodecError::Poisoned {
            codec_id: self.class.codec_id_arc(),
        })?;

        let Some(handle) = handle.as_mut() else {
            return Err(WasmCodecError::Released {
                codec_id: self.class.codec_id_arc(),
            });
        };

        with(self.class.bridge(), handle).map_err(|source| WasmCodecError::Bridge {
            codec_id: self.class.codec_id_arc(),
            source,
        })
    }
}

impl<B: RuntimeBridge> Drop for WasmCodec<B> {
    fn drop(&mut self) {
        // keep in sync with try_drop
        let Some(handle) = self
            .handle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        if let Err(err) = self.class.bridge().release(handle) {
            warn!(
                "releasing the {} codec's component instantiation failed: {err}",
                self.class.codec_id()
            );
        }
    }
}

impl<B: RuntimeBridge> Codec for WasmCodec<B> {
    type Error = WasmCodecError;

    fn encode(&self, data: &[u8]) -> Result<Vec<u8>, Self::Error> {
        self.with_handle(|bridge, handle| bridge.encode(handle, data))
    }

    fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>, Self::Error> {
        self.with_handle(|bridge, handle| bridge.decode(handle, encoded))
    }

    fn decode_into(&self, encoded: &[u8], decoded: &mut [u8]) -> Result<(), Self::Error> {
        self.with_handle(|bridge, handle| bridge.decode_into(handle, encoded, decoded))
    }

    fn get_config<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut config = self
            .with_handle(|bridge, handle| bridge.get_config(handle))
            .map_err(serde::ser::Error::custom)?;

        let codec_id = self.class.codec_id();

        match config.get("id") {
            None => {
                config.insert(String::from("id"), Value::String(String::from(codec_id)));
            },
            Some(Value::String(id)) if id == codec_id => (),
            Some(id) => {
                return Err(serde::ser::Error::custom(format!(
                    "expected codec id {codec_id:?} in the config but found {id}"
                )));
            },
        }

        config.serialize(serializer)
    }

    /// Reads the instruction counter of the codec's component instantiation.
    ///
    /// Returns `Ok(None)` if the component does not export an instruction
    /// counter.
    fn instruction_counter(&self) -> Result<Option<u64>, Self::Error> {
        self.with_handle(|bridge, handle| match bridge.read_instruction_counter(handle) {
            Ok(counter) => Ok(Some(counter)),
            Err(BridgeError::Unsupported { .. }) => Ok(None),
            Err(err) => Err(err),
        })
    }
}

impl<B: RuntimeBridge> DynCodec for WasmCodec<B> {
    type Type = WasmCodecClass<B>;

    fn ty(&self) -> Self::Type {
        self.class.clone()
    }
}

impl<B: RuntimeBridge> std::fmt::Debug for WasmCodec<B> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("WasmCodec")
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}
