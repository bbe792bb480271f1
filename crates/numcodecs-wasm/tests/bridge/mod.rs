#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use numcodecs_wasm::{BinaryComponent, BridgeError, GuestError, RuntimeBridge};
use schemars::Schema;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// In-memory bridge whose "components" are JSON documents describing an
/// xor codec.
#[derive(Default)]
pub struct XorBridge {
    live: AtomicUsize,
    released: AtomicUsize,
}

impl XorBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of handles that have not been released yet
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Number of handles that have been released
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct XorComponent {
    codec_id: String,
    #[serde(default)]
    instruction_counter: bool,
    #[serde(default = "default_exports")]
    exports: bool,
    /// Codec id reported by instances, if it differs from the component's
    #[serde(default)]
    instance_codec_id: Option<String>,
}

const fn default_exports() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct XorConfig {
    #[serde(default)]
    key: u8,
}

pub struct XorHandle {
    component: XorComponent,
    codec: Option<XorConfig>,
    instructions: u64,
}

impl XorHandle {
    fn codec(&mut self) -> Result<u8, BridgeError> {
        match &self.codec {
            Some(config) => Ok(config.key),
            None => Err(BridgeError::runtime(anyhow::anyhow!(
                "the instantiation holds no codec"
            ))),
        }
    }

    fn process(&mut self, data: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let key = self.codec()?;
        self.instructions += 1 + data.len() as u64;
        Ok(data.iter().map(|byte| byte ^ key).collect())
    }
}

/// A JSON component for the xor codec with the `codec_id`
pub fn component(codec_id: &str, instruction_counter: bool) -> BinaryComponent {
    BinaryComponent::new(
        json!({
            "codec_id": codec_id,
            "instruction_counter": instruction_counter,
        })
        .to_string()
        .into_bytes(),
    )
}

/// A JSON component that does not export the codec interface
pub fn component_without_exports(codec_id: &str) -> BinaryComponent {
    BinaryComponent::new(
        json!({ "codec_id": codec_id, "exports": false })
            .to_string()
            .into_bytes(),
    )
}

/// A JSON component whose instances report another codec id
pub fn component_with_instance_codec_id(
    codec_id: &str,
    instance_codec_id: &str,
) -> BinaryComponent {
    BinaryComponent::new(
        json!({ "codec_id": codec_id, "instance_codec_id": instance_codec_id })
            .to_string()
            .into_bytes(),
    )
}

impl RuntimeBridge for XorBridge {
    type Handle = XorHandle;

    fn instantiate(&self, component: &BinaryComponent) -> Result<Self::Handle, BridgeError> {
        let component: XorComponent =
            serde_json::from_slice(component.bytes()).map_err(BridgeError::invalid_component)?;

        if !component.exports {
            return Err(BridgeError::invalid_component(anyhow::anyhow!(
                "the component does not export numcodecs:abc/codec"
            )));
        }

        self.live.fetch_add(1, Ordering::SeqCst);

        Ok(XorHandle {
            component,
            codec: None,
            instructions: 0,
        })
    }

    fn from_config(
        &self,
        component: &BinaryComponent,
        config: &Map<String, Value>,
    ) -> Result<Self::Handle, BridgeError> {
        let mut handle = self.instantiate(component)?;

        match XorConfig::deserialize(Value::Object(config.clone())) {
            Ok(config) => {
                handle.codec = Some(config);
                Ok(handle)
            },
            Err(err) => {
                self.release(handle)?;
                Err(BridgeError::Codec {
                    source: GuestError::new(
                        "invalid xor codec config",
                        [Arc::<str>::from(err.to_string())],
                    ),
                })
            },
        }
    }

    fn codec_id(&self, handle: &mut Self::Handle) -> Result<String, BridgeError> {
        match (&handle.codec, &handle.component.instance_codec_id) {
            (Some(_), Some(instance_codec_id)) => Ok(instance_codec_id.clone()),
            _ => Ok(handle.component.codec_id.clone()),
        }
    }

    fn codec_config_schema(&self, _handle: &mut Self::Handle) -> Result<Schema, BridgeError> {
        Ok(schemars::json_schema!({
            "type": "object",
            "properties": {
                "key": { "type": "integer", "minimum": 0, "maximum": 255 }
            },
            "additionalProperties": false
        }))
    }

    fn encode(&self, handle: &mut Self::Handle, data: &[u8]) -> Result<Vec<u8>, BridgeError> {
        handle.process(data)
    }

    fn decode(&self, handle: &mut Self::Handle, encoded: &[u8]) -> Result<Vec<u8>, BridgeError> {
        handle.process(encoded)
    }

    fn decode_into(
        &self,
        handle: &mut Self::Handle,
        encoded: &[u8],
        decoded: &mut [u8],
    ) -> Result<(), BridgeError> {
        if encoded.len() != decoded.len() {
            return Err(BridgeError::Codec {
                source: GuestError::new("mismatching decode-into output length", Vec::new()),
            });
        }

        let processed = handle.process(encoded)?;
        decoded.copy_from_slice(&processed);

        Ok(())
    }

    fn get_config(&self, handle: &mut Self::Handle) -> Result<Map<String, Value>, BridgeError> {
        let key = handle.codec()?;

        let mut config = Map::new();
        config.insert(String::from("key"), Value::from(key));

        Ok(config)
    }

    fn read_instruction_counter(&self, handle: &mut Self::Handle) -> Result<u64, BridgeError> {
        if handle.component.instruction_counter {
            Ok(handle.instructions)
        } else {
            Err(BridgeError::Unsupported {
                capability: "instruction counting",
            })
        }
    }

    fn release(&self, handle: Self::Handle) -> Result<(), BridgeError> {
        std::mem::drop(handle);

        self.live.fetch_sub(1, Ordering::SeqCst);
        self.released.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }
}
