use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    bridge::RuntimeBridge,
    class::WasmCodecClass,
    codec::{codec_from_config_with_id, DynCodecType},
    instance::WasmCodec,
};

/// Named namespace, i.e. module, into which codec classes are registered.
///
/// A class is registered under its qualified name and, for
/// [`CodecNamespace::get_codec`], under its codec id. Registering a class
/// replaces any class previously registered under the same qualified name
/// or codec id.
pub struct CodecNamespace<B: RuntimeBridge> {
    name: String,
    registry: RwLock<Registry<B>>,
}

struct Registry<B: RuntimeBridge> {
    classes: BTreeMap<String, WasmCodecClass<B>>,
    codec_ids: BTreeMap<String, String>,
}

impl<B: RuntimeBridge> CodecNamespace<B> {
    /// Create a new empty namespace with the given `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: RwLock::new(Registry {
                classes: BTreeMap::new(),
                codec_ids: BTreeMap::new(),
            }),
        }
    }

    /// The name of the namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the class registered under the qualified name `qualname`.
    #[must_use]
    pub fn get(&self, qualname: &str) -> Option<WasmCodecClass<B>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);

        registry.classes.get(qualname).cloned()
    }

    /// Get the class registered for the `codec_id`.
    #[must_use]
    pub fn get_by_codec_id(&self, codec_id: &str) -> Option<WasmCodecClass<B>> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);

        registry
            .codec_ids
            .get(codec_id)
            .and_then(|qualname| registry.classes.get(qualname))
            .cloned()
    }

    /// The qualified names of all registered classes, in sorted order.
    #[must_use]
    pub fn qualnames(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);

        registry.classes.keys().cloned().collect()
    }

    /// Instantiate a codec from a configuration.
    ///
    /// The config *must* include the `id` field with the codec id of a class
    /// that is registered in this namespace.
    ///
    /// # Errors
    ///
    /// Errors if the config has no `id` field, if no class with a matching
    /// codec id has been registered, or if constructing the codec fails.
    pub fn get_codec<'de, D: Deserializer<'de>>(
        &self,
        config: D,
    ) -> Result<WasmCodec<B>, D::Error> {
        let config = Value::deserialize(config)?;

        let Some(Value::String(codec_id)) = config.get("id") else {
            return Err(serde::de::Error::custom(format!(
                "codec config {config} is missing the string `id` field"
            )));
        };

        let Some(class) = self.get_by_codec_id(codec_id) else {
            return Err(serde::de::Error::custom(format!(
                "no codec with id {codec_id:?} is registered in {}",
                self.name
            )));
        };

        codec_from_config_with_id(&class, config).map_err(serde::de::Error::custom)
    }

    pub(crate) fn register(&self, class: WasmCodecClass<B>) {
        let mut registry = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let qualname = String::from(class.qualname());

        if let Some(previous) = registry
            .codec_ids
            .insert(String::from(class.codec_id()), qualname.clone())
        {
            if previous != qualname {
                registry.classes.remove(&previous);
            }
        }

        if let Some(previous) = registry.classes.insert(qualname, class.clone()) {
            if previous.codec_id() != class.codec_id() {
                registry.codec_ids.remove(previous.codec_id());
            }

            debug!("replaced the codec class {}", previous.path());
        }

        debug!("registered the codec class {}", class.path());
    }
}

impl<B: RuntimeBridge> std::fmt::Debug for CodecNamespace<B> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("CodecNamespace")
            .field("name", &self.name)
            .field("classes", &self.qualnames())
            .finish()
    }
}
