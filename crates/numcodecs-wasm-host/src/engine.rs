use serde::Deserialize;

/// The WebAssembly engine that [`default_engine`] creates
pub type Engine = wasmtime_runtime_layer::Engine;

// codecs don't need to preallocate the full 4GB wasm32 memory space, but
//  still give them a reasonable static allocation for better codegen
const WASM_PAGE_SIZE: u64 = 0x10000 /* 64kiB */;
const DEFAULT_MEMORY_RESERVATION: u64 = WASM_PAGE_SIZE * 16 * 64 /* 64MiB */;
const DEFAULT_MEMORY_GUARD_SIZE: u64 = WASM_PAGE_SIZE * 16 * 64 /* 64MiB */;
const DEFAULT_MEMORY_RESERVATION_FOR_GROWTH: u64 = WASM_PAGE_SIZE * 16 * 64 /* 64MiB */;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// Configuration of the [`default_engine`].
pub struct EngineConfig {
    /// Bytes of virtual memory reserved for each linear memory
    pub memory_reservation: u64,
    /// Bytes of guard pages after each linear memory
    pub memory_guard_size: u64,
    /// Extra bytes reserved for each linear memory to grow into without
    /// moving
    pub memory_reservation_for_growth: u64,
    /// Whether compiled components are cached on disk, using the default
    /// wasmtime cache configuration
    pub cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_reservation: DEFAULT_MEMORY_RESERVATION,
            memory_guard_size: DEFAULT_MEMORY_GUARD_SIZE,
            memory_reservation_for_growth: DEFAULT_MEMORY_RESERVATION_FOR_GROWTH,
            cache: true,
        }
    }
}

/// Create a wasmtime-based WebAssembly engine with the `config`.
///
/// The engine only enables the WebAssembly features that codec components
/// are compiled with, and canonicalises NaNs for reproducible results.
///
/// # Errors
///
/// Errors if the wasmtime cache or engine cannot be created.
pub fn default_engine(config: &EngineConfig) -> Result<Engine, anyhow::Error> {
    let mut wasmtime_config = wasmtime::Config::new();
    wasmtime_config
        .cranelift_nan_canonicalization(true)
        .cranelift_opt_level(wasmtime::OptLevel::Speed)
        .memory_reservation(config.memory_reservation)
        .memory_guard_size(config.memory_guard_size)
        .memory_reservation_for_growth(config.memory_reservation_for_growth)
        .wasm_backtrace_details(wasmtime::WasmBacktraceDetails::Enable)
        .wasm_bulk_memory(true)
        // wasmtime is compiled without the `component-model` feature
        // .wasm_component_model(false) and friends
        .wasm_custom_page_sizes(false)
        .wasm_extended_const(false)
        .wasm_function_references(false)
        .wasm_gc(false)
        .wasm_memory64(false)
        .wasm_multi_memory(true)
        .wasm_multi_value(true)
        .wasm_reference_types(true)
        .wasm_relaxed_simd(false)
        .relaxed_simd_deterministic(true)
        .wasm_simd(true)
        .wasm_tail_call(false)
        // wasmtime is compiled without the `threads` feature
        // .wasm_threads(false)
        .wasm_wide_arithmetic(true);

    if config.cache {
        let cache = wasmtime::Cache::from_file(None)?;
        wasmtime_config.cache(Some(cache));
    }

    let engine = wasmtime::Engine::new(&wasmtime_config)?;

    debug!("created a wasmtime engine with {config:?}");

    Ok(Engine::new(engine))
}
