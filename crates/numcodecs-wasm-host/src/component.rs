use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use numcodecs_wasm::{BinaryComponent, BridgeError, RuntimeBridge};
use schemars::Schema;
use serde_json::{Map, Value as JsonValue};
use wasm_component_layer::{
    Component, ComponentList, ExportInstance, Func, Instance, Linker, ResourceOwn, Store,
    TypedFunc, Value,
};
use wasm_runtime_layer::{backend::WasmEngine, Engine};

use crate::{
    buffer::{bytes_from_wasm_record, bytes_into_wasm, bytes_prototype_into_wasm},
    logging,
    wit::{guest_error_from_wasm, NumcodecsWitInterfaces},
};

/// [`RuntimeBridge`] that executes binary WebAssembly components, which
/// export the `numcodecs:abc/codec` interface, on top of the
/// [`wasm_component_layer`] and a core WebAssembly engine.
///
/// Compiled components are cached by their bytes, so that synthesizing a
/// class and instantiating its codecs only compile the component once. The
/// cache can be emptied with [`Self::clear_cache`].
pub struct WasmComponentBridge<E: WasmEngine> {
    engine: Engine<E>,
    components: Mutex<HashMap<BinaryComponent, Component>>,
}

/// One instantiation of a codec component, optionally holding a codec.
pub struct WasmComponentHandle<E: WasmEngine> {
    store: Store<(), E>,
    instance: Instance,
    funcs: CodecFuncs,
    instruction_counter: Option<TypedFunc<(), u64>>,
    codec: Option<ResourceOwn>,
}

struct CodecFuncs {
    codec_id: TypedFunc<(), String>,
    codec_config_schema: TypedFunc<(), String>,
    // FIXME: make typed once the resource types can be named
    from_config: Func,
    encode: Func,
    decode: Func,
    decode_into: Func,
    get_config: Func,
}

impl<E: WasmEngine> WasmComponentBridge<E> {
    /// Create a new bridge that executes components in the core WebAssembly
    /// `engine`.
    #[must_use]
    pub fn new(engine: E) -> Self {
        Self {
            engine: Engine::new(engine),
            components: Mutex::new(HashMap::new()),
        }
    }

    /// The number of compiled components in the cache.
    #[must_use]
    pub fn cached_components(&self) -> usize {
        self.components
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Forget all compiled components.
    ///
    /// Components that are instantiated again are recompiled. Existing
    /// instantiations are not affected.
    pub fn clear_cache(&self) {
        self.components
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn compile(&self, component: &BinaryComponent) -> Result<Component, BridgeError> {
        let cached = self
            .components
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(component)
            .cloned();

        if let Some(compiled) = cached {
            return Ok(compiled);
        }

        // compile without holding the lock so that other components can be
        //  compiled concurrently
        let compiled = Component::new(&self.engine, component.bytes())
            .map_err(BridgeError::invalid_component)?;

        debug!(
            "compiled a WebAssembly component of {} bytes",
            component.bytes().len()
        );

        // a concurrent compilation of the same component may have won
        let compiled = self
            .components
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(component.clone())
            .or_insert(compiled)
            .clone();

        Ok(compiled)
    }
}

impl<E: WasmEngine> RuntimeBridge for WasmComponentBridge<E>
where
    E: 'static + Send + Sync,
    Store<(), E>: Send,
{
    type Handle = WasmComponentHandle<E>;

    fn instantiate(&self, component: &BinaryComponent) -> Result<Self::Handle, BridgeError> {
        let component = self.compile(component)?;

        let mut store = Store::new(&self.engine, ());

        let mut linker = Linker::default();
        logging::add_to_linker(&mut linker, &mut store).map_err(BridgeError::runtime)?;

        let instance = linker
            .instantiate(&mut store, &component)
            .map_err(BridgeError::invalid_component)?;

        let (funcs, instruction_counter) = match load_funcs(&instance) {
            Ok(funcs) => funcs,
            Err(err) => {
                if let Err(err) = try_drop_instance(&mut store, &instance) {
                    warn!("dropping the invalid component instance failed: {err}");
                }
                return Err(BridgeError::invalid_component(err));
            },
        };

        Ok(WasmComponentHandle {
            store,
            instance,
            funcs,
            instruction_counter,
            codec: None,
        })
    }

    fn from_config(
        &self,
        component: &BinaryComponent,
        config: &Map<String, JsonValue>,
    ) -> Result<Self::Handle, BridgeError> {
        let mut handle = self.instantiate(component)?;

        match handle.codec_from_config(config) {
            Ok(codec) => {
                handle.codec = Some(codec);
                Ok(handle)
            },
            Err(err) => {
                if let Err(err) = self.release(handle) {
                    warn!("releasing the component instance failed: {err}");
                }
                Err(err)
            },
        }
    }

    fn codec_id(&self, handle: &mut Self::Handle) -> Result<String, BridgeError> {
        handle
            .funcs
            .codec_id
            .call(&mut handle.store, ())
            .map_err(BridgeError::runtime)
    }

    fn codec_config_schema(&self, handle: &mut Self::Handle) -> Result<Schema, BridgeError> {
        let schema = handle
            .funcs
            .codec_config_schema
            .call(&mut handle.store, ())
            .map_err(BridgeError::runtime)?;

        serde_json::from_str(&schema).map_err(BridgeError::invalid_component)
    }

    fn encode(&self, handle: &mut Self::Handle, data: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let func = handle.funcs.encode.clone();
        handle.process(&func, data, None)
    }

    fn decode(&self, handle: &mut Self::Handle, encoded: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let func = handle.funcs.decode.clone();
        handle.process(&func, encoded, None)
    }

    fn decode_into(
        &self,
        handle: &mut Self::Handle,
        encoded: &[u8],
        decoded: &mut [u8],
    ) -> Result<(), BridgeError> {
        let func = handle.funcs.decode_into.clone();
        let decoded_in = handle.process(&func, encoded, Some(decoded.len()))?;

        if decoded_in.len() != decoded.len() {
            return Err(BridgeError::runtime(anyhow::anyhow!(
                "decoded {} bytes into an output of {} bytes",
                decoded_in.len(),
                decoded.len()
            )));
        }

        decoded.copy_from_slice(&decoded_in);

        Ok(())
    }

    fn get_config(&self, handle: &mut Self::Handle) -> Result<Map<String, JsonValue>, BridgeError> {
        let resource = handle.borrow_codec()?;

        let arg = Value::Borrow(resource);
        let mut result = Value::U8(0);

        handle
            .funcs
            .get_config
            .call(
                &mut handle.store,
                std::slice::from_ref(&arg),
                std::slice::from_mut(&mut result),
            )
            .map_err(BridgeError::runtime)?;

        let config = match result {
            Value::Result(result) => match &*result {
                Ok(Some(Value::String(config))) => config.clone(),
                Err(err) => return Err(codec_error_from_wasm(err.as_ref())),
                result => {
                    return Err(BridgeError::runtime(anyhow::anyhow!(
                        "unexpected get-config result value {result:?}"
                    )))
                },
            },
            value => {
                return Err(BridgeError::runtime(anyhow::anyhow!(
                    "unexpected get-config result value {value:?}"
                )))
            },
        };

        serde_json::from_str(&config).map_err(BridgeError::runtime)
    }

    fn read_instruction_counter(&self, handle: &mut Self::Handle) -> Result<u64, BridgeError> {
        let Some(instruction_counter) = &handle.instruction_counter else {
            return Err(BridgeError::Unsupported {
                capability: "instruction counting",
            });
        };

        instruction_counter
            .call(&mut handle.store, ())
            .map_err(BridgeError::runtime)
    }

    fn release(&self, handle: Self::Handle) -> Result<(), BridgeError> {
        let WasmComponentHandle {
            mut store,
            instance,
            codec,
            ..
        } = handle;

        // the codec resource must be dropped before its instance
        let result = match codec {
            Some(codec) => codec.drop(&mut store).map_err(BridgeError::runtime),
            None => Ok(()),
        };

        result.and(try_drop_instance(&mut store, &instance).map_err(BridgeError::runtime))
    }
}

impl<E: WasmEngine> WasmComponentHandle<E> {
    fn codec_from_config(
        &mut self,
        config: &Map<String, JsonValue>,
    ) -> Result<ResourceOwn, BridgeError> {
        let config = serde_json::to_string(config).map_err(BridgeError::runtime)?;

        let args = Value::String(config.into());
        let mut result = Value::U8(0);

        self.funcs
            .from_config
            .call(
                &mut self.store,
                std::slice::from_ref(&args),
                std::slice::from_mut(&mut result),
            )
            .map_err(BridgeError::runtime)?;

        match result {
            Value::Result(result) => match &*result {
                Ok(Some(Value::Own(resource))) => Ok(resource.clone()),
                Err(err) => Err(codec_error_from_wasm(err.as_ref())),
                result => Err(BridgeError::runtime(anyhow::anyhow!(
                    "unexpected from-config result value {result:?}"
                ))),
            },
            value => Err(BridgeError::runtime(anyhow::anyhow!(
                "unexpected from-config result value {value:?}"
            ))),
        }
    }

    fn borrow_codec(&mut self) -> Result<wasm_component_layer::ResourceBorrow, BridgeError> {
        let Some(codec) = &self.codec else {
            return Err(BridgeError::runtime(anyhow::anyhow!(
                "the component instance holds no codec"
            )));
        };

        codec.borrow(&mut self.store).map_err(BridgeError::runtime)
    }

    fn process(
        &mut self,
        func: &Func,
        data: &[u8],
        output_len: Option<usize>,
    ) -> Result<Vec<u8>, BridgeError> {
        let resource = self.borrow_codec()?;

        let array = bytes_into_wasm(data).map_err(BridgeError::runtime)?;

        let mut arguments = vec![Value::Borrow(resource), Value::Record(array)];
        if let Some(output_len) = output_len {
            let prototype = bytes_prototype_into_wasm(output_len).map_err(BridgeError::runtime)?;
            arguments.push(Value::Record(prototype));
        }

        let mut result = Value::U8(0);

        func.call(
            &mut self.store,
            &arguments,
            std::slice::from_mut(&mut result),
        )
        .map_err(BridgeError::runtime)?;

        match result {
            Value::Result(result) => match &*result {
                Ok(Some(Value::Record(record))) => {
                    bytes_from_wasm_record(record).map_err(BridgeError::runtime)
                },
                Err(err) => Err(codec_error_from_wasm(err.as_ref())),
                result => Err(BridgeError::runtime(anyhow::anyhow!(
                    "unexpected process result value {result:?}"
                ))),
            },
            value => Err(BridgeError::runtime(anyhow::anyhow!(
                "unexpected process result value {value:?}"
            ))),
        }
    }
}

fn codec_error_from_wasm(err: Option<&Value>) -> BridgeError {
    match guest_error_from_wasm(err) {
        Ok(source) => BridgeError::Codec { source },
        Err(err) => BridgeError::runtime(err),
    }
}

fn load_funcs(
    instance: &Instance,
) -> Result<(CodecFuncs, Option<TypedFunc<(), u64>>), anyhow::Error> {
    fn load_func(interface: &ExportInstance, name: &str) -> Result<Func, anyhow::Error> {
        let Some(func) = interface.func(name) else {
            anyhow::bail!("WASM component interface does not contain a function named `{name}`");
        };

        Ok(func)
    }

    fn load_typed_func<P: ComponentList, R: ComponentList>(
        interface: &ExportInstance,
        name: &str,
    ) -> Result<TypedFunc<P, R>, anyhow::Error> {
        load_func(interface, name)?.typed()
    }

    let interfaces = NumcodecsWitInterfaces::get();

    let Some(codec_interface) = instance.exports().instance(&interfaces.codec) else {
        anyhow::bail!(
            "WASM component does not contain an interface named `{}`",
            interfaces.codec
        );
    };

    let funcs = CodecFuncs {
        codec_id: load_typed_func(codec_interface, "codec-id")?,
        codec_config_schema: load_typed_func(codec_interface, "codec-config-schema")?,
        from_config: load_func(codec_interface, "[static]codec.from-config")?,
        encode: load_func(codec_interface, "[method]codec.encode")?,
        decode: load_func(codec_interface, "[method]codec.decode")?,
        decode_into: load_func(codec_interface, "[method]codec.decode-into")?,
        get_config: load_func(codec_interface, "[method]codec.get-config")?,
    };

    // the instruction counter is optional
    let instruction_counter = match instance.exports().instance(&interfaces.perf) {
        None => None,
        Some(perf_interface) => Some(
            load_typed_func(perf_interface, &interfaces.instruction_counter).map_err(|err| {
                err.context("WASM component instruction counter function is invalid")
            })?,
        ),
    };

    Ok((funcs, instruction_counter))
}

fn try_drop_instance<E: WasmEngine>(
    store: &mut Store<(), E>,
    instance: &Instance,
) -> Result<(), anyhow::Error> {
    let mut errors = instance.drop(store)?;

    let Some(mut err) = errors.pop() else {
        return Ok(());
    };

    if !errors.is_empty() {
        err = err.context(format!("showing one of {} errors", errors.len() + 1));
    }

    Err(err.context("dropping instance and all of its resources failed"))
}
