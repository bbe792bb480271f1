use std::{fmt, sync::Arc};

use schemars::Schema;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::{
    bridge::{BinaryComponent, RuntimeBridge},
    codec::DynCodecType,
    error::{BridgeError, WasmCodecClassError, WasmCodecError},
    instance::WasmCodec,
};

const UNKNOWN_CODEC_ID: &str = "<unknown>";

/// Codec class synthesized from a binary WebAssembly component.
///
/// Cloning the class is cheap and yields the same class, not a new one.
pub struct WasmCodecClass<B: RuntimeBridge> {
    inner: Arc<WasmCodecClassInner<B>>,
}

struct WasmCodecClassInner<B: RuntimeBridge> {
    name: String,
    module: String,
    codec_id: Arc<str>,
    codec_config_schema: Arc<Schema>,
    component: BinaryComponent,
    bridge: Arc<B>,
}

impl<B: RuntimeBridge> WasmCodecClass<B> {
    /// Load and validate the `component` through the `bridge` and build a
    /// codec class for it inside the `module`.
    ///
    /// The class is named after its codec id.
    pub(crate) fn load(
        bridge: Arc<B>,
        module: String,
        component: BinaryComponent,
    ) -> Result<Self, WasmCodecClassError> {
        let mut handle =
            bridge
                .instantiate(&component)
                .map_err(|source| WasmCodecClassError::InvalidComponent {
                    codec_id: Arc::from(UNKNOWN_CODEC_ID),
                    source,
                })?;

        let inspected = inspect_component(&*bridge, &mut handle);
        let released = bridge.release(handle);

        let (codec_id, codec_config_schema) =
            inspected.map_err(|source| WasmCodecClassError::InvalidComponent {
                codec_id: Arc::from(UNKNOWN_CODEC_ID),
                source,
            })?;
        let codec_id = Arc::<str>::from(codec_id);

        released.map_err(|source| WasmCodecClassError::InvalidComponent {
            codec_id: codec_id.clone(),
            source,
        })?;

        let name = codec_class_name(&codec_id);

        debug!("loaded the {codec_id} codec component as {module}.{name}");

        Ok(Self {
            inner: Arc::new(WasmCodecClassInner {
                name,
                module,
                codec_id,
                codec_config_schema: Arc::new(codec_config_schema),
                component,
                bridge,
            }),
        })
    }

    /// The name of the class.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The qualified name of the class inside its module.
    ///
    /// Synthesized classes are always top-level, so their qualified name is
    /// their name.
    #[must_use]
    pub fn qualname(&self) -> &str {
        &self.inner.name
    }

    /// The name of the module, i.e. the namespace, the class was created in.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// The stable path `module.qualname` under which the class is
    /// registered.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}.{}", self.module(), self.qualname())
    }

    /// The binary WebAssembly component that the class wraps.
    #[must_use]
    pub fn component(&self) -> &BinaryComponent {
        &self.inner.component
    }

    pub(crate) fn bridge(&self) -> &B {
        &self.inner.bridge
    }

    pub(crate) fn codec_id_arc(&self) -> Arc<str> {
        self.inner.codec_id.clone()
    }
}

impl<B: RuntimeBridge> Clone for WasmCodecClass<B> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<B: RuntimeBridge> fmt::Debug for WasmCodecClass<B> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("WasmCodecClass")
            .field("path", &self.path())
            .field("codec_id", &self.inner.codec_id)
            .finish_non_exhaustive()
    }
}

impl<B: RuntimeBridge> DynCodecType for WasmCodecClass<B> {
    type Codec = WasmCodec<B>;

    fn codec_id(&self) -> &str {
        &self.inner.codec_id
    }

    fn codec_config_schema(&self) -> Schema {
        (*self.inner.codec_config_schema).clone()
    }

    fn codec_from_config<'de, D: Deserializer<'de>>(
        &self,
        config: D,
    ) -> Result<Self::Codec, D::Error> {
        let config = Map::<String, Value>::deserialize(config)?;

        let handle = self
            .bridge()
            .from_config(&self.inner.component, &config)
            .map_err(|source| WasmCodecError::Bridge {
                codec_id: self.codec_id_arc(),
                source,
            })
            .map_err(serde::de::Error::custom)?;

        // the codec releases its handle when dropped on any error path below
        let codec = WasmCodec::new(handle, self.clone());

        let found = codec
            .with_handle(|bridge, handle| bridge.codec_id(handle))
            .map_err(serde::de::Error::custom)?;

        if found != *self.inner.codec_id {
            return Err(serde::de::Error::custom(WasmCodecError::CodecIdMismatch {
                codec_id: self.codec_id_arc(),
                found,
            }));
        }

        trace!("instantiated a {} codec", self.path());

        Ok(codec)
    }
}

fn inspect_component<B: RuntimeBridge>(
    bridge: &B,
    handle: &mut B::Handle,
) -> Result<(String, Schema), BridgeError> {
    let codec_id = bridge.codec_id(handle)?;
    let codec_config_schema = bridge.codec_config_schema(handle)?;

    Ok((codec_id, codec_config_schema))
}

/// Derive the class name from a `codec_id`, e.g. `fixed-offset-scale.rs`
/// becomes `FixedOffsetScale`.
pub(crate) fn codec_class_name(codec_id: &str) -> String {
    let stem = codec_id.split_once('.').map_or(codec_id, |(stem, _)| stem);

    convert_case::Casing::to_case(&stem, convert_case::Case::Pascal)
}

#[cfg(test)]
mod tests {
    use super::codec_class_name;

    #[test]
    fn class_names() {
        assert_eq!(codec_class_name("identity.v1"), "Identity");
        assert_eq!(codec_class_name("identity"), "Identity");
        assert_eq!(codec_class_name("fixed-offset-scale.rs"), "FixedOffsetScale");
        assert_eq!(codec_class_name("bit_round.rs"), "BitRound");
    }
}
