use std::sync::OnceLock;

use log::Level;
use wasm_component_layer::{
    AsContextMut, EnumType, Func, FuncType, InterfaceIdentifier, Linker, PackageIdentifier,
    PackageName, TypeIdentifier, Value, ValueType,
};

/// `wasi:logging/logging#level` cases, in order, and the levels they are
/// forwarded with
const LEVELS: [(&str, Level); 6] = [
    ("trace", Level::Trace),
    ("debug", Level::Debug),
    ("info", Level::Info),
    ("warn", Level::Warn),
    ("error", Level::Error),
    ("critical", Level::Error),
];

/// Define the `wasi:logging/logging` interface in the `linker`, forwarding
/// all guest log records to the [`log`] facade with the guest's context as
/// their target.
pub fn add_to_linker(linker: &mut Linker, ctx: impl AsContextMut) -> Result<(), anyhow::Error> {
    let WasiLoggingInterface { logging } = WasiLoggingInterface::get();

    let instance = linker.define_instance(logging.clone())?;

    let level_ty = EnumType::new(
        Some(TypeIdentifier::new("level", Some(logging.clone()))),
        LEVELS.map(|(case, _)| case),
    )?;

    let log = Func::new(
        ctx,
        FuncType::new(
            [
                ValueType::Enum(level_ty.clone()),
                ValueType::String,
                ValueType::String,
            ],
            [],
        ),
        move |_ctx, args, _results| {
            let [Value::Enum(level), Value::String(context), Value::String(message)] = args else {
                anyhow::bail!("invalid wasi:logging/logging#log arguments");
            };

            anyhow::ensure!(
                level.ty() == level_ty,
                "invalid wasi:logging/logging#log level type"
            );

            let Some((_, level)) = LEVELS.get(level.discriminant()) else {
                anyhow::bail!("invalid wasi:logging/logging#log level kind");
            };

            log!(target: &**context, *level, "{message}");

            Ok(())
        },
    );

    instance.define_func("log", log)?;

    Ok(())
}

struct WasiLoggingInterface {
    logging: InterfaceIdentifier,
}

impl WasiLoggingInterface {
    fn get() -> &'static Self {
        static WASI_LOGGING_INTERFACE: OnceLock<WasiLoggingInterface> = OnceLock::new();

        WASI_LOGGING_INTERFACE.get_or_init(|| Self {
            logging: InterfaceIdentifier::new(
                PackageIdentifier::new(PackageName::new("wasi", "logging"), None),
                "logging",
            ),
        })
    }
}
