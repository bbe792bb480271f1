#![allow(dead_code)]

//! Builds a small identity codec component, which exports the
//! `numcodecs:abc/codec` and `numcodecs:wasm/perf` interfaces.
//!
//! The identity codec returns its input array unchanged. Its instruction
//! counter grows by one plus the number of elements per encode / decode.
//! It has no parameters and rejects any non-empty config.

use wasm_encoder::{
    BlockType, CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection,
    Function, FunctionSection, GlobalSection, GlobalType, ImportSection, Instruction, MemArg,
    MemorySection, MemoryType, Module, TypeSection, ValType,
};

pub const CODEC_ID: &str = "identity.rs";
pub const CONFIG_SCHEMA: &str =
    r#"{"type":"object","properties":{},"additionalProperties":false}"#;
pub const ERROR_MESSAGE: &str = "the identity codec does not take any parameters";

const CODEC_INTERFACE: &str = "numcodecs:abc/codec@0.1.1";
const PERF_INTERFACE: &str = "numcodecs:wasm/perf@0.1.0";

const CODEC_WIT: &str = r"
package numcodecs:abc@0.1.1;

interface codec {
    type json = string;
    type json-schema = string;

    record error {
        message: string,
        chain: list<string>,
    }

    variant any-array-data {
        %u8(list<u8>),
        %u16(list<u16>),
        %u32(list<u32>),
        %u64(list<u64>),
        %i8(list<s8>),
        %i16(list<s16>),
        %i32(list<s32>),
        %i64(list<s64>),
        %f32(list<f32>),
        %f64(list<f64>),
    }

    record any-array {
        data: any-array-data,
        shape: list<u32>,
    }

    enum any-array-dtype {
        %u8,
        %u16,
        %u32,
        %u64,
        %i8,
        %i16,
        %i32,
        %i64,
        %f32,
        %f64,
    }

    record any-array-prototype {
        dtype: any-array-dtype,
        shape: list<u32>,
    }

    resource codec {
        from-config: static func(config: json) -> result<codec, error>;
        encode: func(data: any-array) -> result<any-array, error>;
        decode: func(encoded: any-array) -> result<any-array, error>;
        decode-into: func(encoded: any-array, decoded: any-array-prototype) -> result<any-array, error>;
        get-config: func() -> result<json, error>;
    }

    codec-id: func() -> string;
    codec-config-schema: func() -> json-schema;
}
";

const PERF_WIT: &str = r"
package numcodecs:wasm@0.1.0;

interface perf {
    instruction-counter: func() -> u64;
}
";

const WORLD_WIT: &str = r"
package numcodecs:identity;

world identity {
    export numcodecs:abc/codec@0.1.1;
    export numcodecs:wasm/perf@0.1.0;
}
";

// static linear memory layout
const CODEC_ID_PTR: u32 = 0x100;
const CONFIG_SCHEMA_PTR: u32 = 0x200;
const CONFIG_PTR: u32 = 0x300;
const ERROR_MESSAGE_PTR: u32 = 0x400;
const CODEC_ID_RESULT: u32 = 0x800;
const CONFIG_SCHEMA_RESULT: u32 = 0x808;
const GET_CONFIG_RESULT: u32 = 0x810;
const FROM_CONFIG_ERROR_RESULT: u32 = 0x820;
const RETURN_AREA: u32 = 0x840;
const STATIC_DATA_LEN: u32 = 0x860;
const HEAP_BASE: u32 = 0x1000;

// function indices, the imported resource constructor comes first
const RESOURCE_NEW: u32 = 0;
const CODEC_ID_FN: u32 = 1;
const CONFIG_SCHEMA_FN: u32 = 2;
const FROM_CONFIG_FN: u32 = 3;
const ENCODE_FN: u32 = 4;
const DECODE_FN: u32 = 5;
const DECODE_INTO_FN: u32 = 6;
const GET_CONFIG_FN: u32 = 7;
const REALLOC_FN: u32 = 8;
const INSTRUCTION_COUNTER_FN: u32 = 9;

// global indices
const HEAP_GLOBAL: u32 = 0;
const INSTRUCTIONS_GLOBAL: u32 = 1;

/// Build the binary identity codec component.
pub fn identity_component() -> Vec<u8> {
    let mut resolve = wit_parser::Resolve::new();
    resolve.push_str("codec.wit", CODEC_WIT).unwrap();
    resolve.push_str("perf.wit", PERF_WIT).unwrap();
    let package = resolve.push_str("identity.wit", WORLD_WIT).unwrap();

    let world = *resolve.packages[package].worlds.get("identity").unwrap();

    let mut module = identity_module();

    wit_component::embed_component_metadata(
        &mut module,
        &resolve,
        world,
        wit_component::StringEncoding::UTF8,
    )
    .unwrap();

    let mut encoder = wit_component::ComponentEncoder::default()
        .module(&module)
        .unwrap();

    encoder.encode().unwrap()
}

fn identity_module() -> Vec<u8> {
    let mut module = Module::new();

    let mut types = TypeSection::new();
    let returns_ptr = types.len();
    types.ty().function([], [ValType::I32]);
    let string_to_ptr = types.len();
    types.ty().function([ValType::I32; 2], [ValType::I32]);
    let array_to_ptr = types.len();
    types.ty().function([ValType::I32; 6], [ValType::I32]);
    let array_prototype_to_ptr = types.len();
    types.ty().function([ValType::I32; 9], [ValType::I32]);
    let i32_to_i32 = types.len();
    types.ty().function([ValType::I32], [ValType::I32]);
    let realloc = types.len();
    types.ty().function([ValType::I32; 4], [ValType::I32]);
    let returns_u64 = types.len();
    types.ty().function([], [ValType::I64]);
    module.section(&types);

    let mut imports = ImportSection::new();
    imports.import(
        &format!("[export]{CODEC_INTERFACE}"),
        "[resource-new]codec",
        EntityType::Function(i32_to_i32),
    );
    module.section(&imports);

    let mut functions = FunctionSection::new();
    for ty in [
        returns_ptr,            // CODEC_ID_FN
        returns_ptr,            // CONFIG_SCHEMA_FN
        string_to_ptr,          // FROM_CONFIG_FN
        array_to_ptr,           // ENCODE_FN
        array_to_ptr,           // DECODE_FN
        array_prototype_to_ptr, // DECODE_INTO_FN
        i32_to_i32,             // GET_CONFIG_FN
        realloc,                // REALLOC_FN
        returns_u64,            // INSTRUCTION_COUNTER_FN
    ] {
        functions.function(ty);
    }
    module.section(&functions);

    let mut memories = MemorySection::new();
    memories.memory(MemoryType {
        minimum: 16,
        maximum: None,
        memory64: false,
        shared: false,
        page_size_log2: None,
    });
    module.section(&memories);

    let mut globals = GlobalSection::new();
    globals.global(
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i32_const(addr(HEAP_BASE)),
    );
    globals.global(
        GlobalType {
            val_type: ValType::I64,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i64_const(0),
    );
    module.section(&globals);

    let mut exports = ExportSection::new();
    exports.export("memory", ExportKind::Memory, 0);
    exports.export("cabi_realloc", ExportKind::Func, REALLOC_FN);
    for (name, func) in [
        ("codec-id", CODEC_ID_FN),
        ("codec-config-schema", CONFIG_SCHEMA_FN),
        ("[static]codec.from-config", FROM_CONFIG_FN),
        ("[method]codec.encode", ENCODE_FN),
        ("[method]codec.decode", DECODE_FN),
        ("[method]codec.decode-into", DECODE_INTO_FN),
        ("[method]codec.get-config", GET_CONFIG_FN),
    ] {
        exports.export(&format!("{CODEC_INTERFACE}#{name}"), ExportKind::Func, func);
    }
    exports.export(
        &format!("{PERF_INTERFACE}#instruction-counter"),
        ExportKind::Func,
        INSTRUCTION_COUNTER_FN,
    );
    module.section(&exports);

    let mut codes = CodeSection::new();
    codes.function(&return_const(CODEC_ID_RESULT));
    codes.function(&return_const(CONFIG_SCHEMA_RESULT));
    codes.function(&from_config());
    codes.function(&return_array());
    codes.function(&return_array());
    codes.function(&return_array());
    codes.function(&return_const(GET_CONFIG_RESULT));
    codes.function(&cabi_realloc());
    codes.function(&instruction_counter());
    module.section(&codes);

    let mut data = DataSection::new();
    let static_data = static_data();
    data.active(0, &ConstExpr::i32_const(0), static_data.iter().copied());
    module.section(&data);

    module.finish()
}

fn static_data() -> Vec<u8> {
    fn write(data: &mut [u8], at: u32, bytes: &[u8]) {
        let at = at as usize;
        data[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn write_u32(data: &mut [u8], at: u32, value: u32) {
        write(data, at, &value.to_le_bytes());
    }

    let mut data = vec![0_u8; STATIC_DATA_LEN as usize];

    write(&mut data, CODEC_ID_PTR, CODEC_ID.as_bytes());
    write(&mut data, CONFIG_SCHEMA_PTR, CONFIG_SCHEMA.as_bytes());
    write(&mut data, CONFIG_PTR, b"{}");
    write(&mut data, ERROR_MESSAGE_PTR, ERROR_MESSAGE.as_bytes());

    // string
    write_u32(&mut data, CODEC_ID_RESULT, CODEC_ID_PTR);
    write_u32(&mut data, CODEC_ID_RESULT + 4, len(CODEC_ID));

    // string
    write_u32(&mut data, CONFIG_SCHEMA_RESULT, CONFIG_SCHEMA_PTR);
    write_u32(&mut data, CONFIG_SCHEMA_RESULT + 4, len(CONFIG_SCHEMA));

    // result<string, error>::ok
    write_u32(&mut data, GET_CONFIG_RESULT, 0);
    write_u32(&mut data, GET_CONFIG_RESULT + 4, CONFIG_PTR);
    write_u32(&mut data, GET_CONFIG_RESULT + 8, 2);

    // result<codec, error>::err with an empty cause chain
    write_u32(&mut data, FROM_CONFIG_ERROR_RESULT, 1);
    write_u32(&mut data, FROM_CONFIG_ERROR_RESULT + 4, ERROR_MESSAGE_PTR);
    write_u32(&mut data, FROM_CONFIG_ERROR_RESULT + 8, len(ERROR_MESSAGE));
    write_u32(&mut data, FROM_CONFIG_ERROR_RESULT + 12, 0);
    write_u32(&mut data, FROM_CONFIG_ERROR_RESULT + 16, 0);

    data
}

fn return_const(ptr: u32) -> Function {
    let mut func = Function::new([]);
    func.instruction(&Instruction::I32Const(addr(ptr)));
    func.instruction(&Instruction::End);
    func
}

fn from_config() -> Function {
    let mut func = Function::new([]);

    // only the empty `{}` config is accepted
    func.instruction(&Instruction::LocalGet(1));
    func.instruction(&Instruction::I32Const(2));
    func.instruction(&Instruction::I32Ne);
    func.instruction(&Instruction::If(BlockType::Empty));
    func.instruction(&Instruction::I32Const(addr(FROM_CONFIG_ERROR_RESULT)));
    func.instruction(&Instruction::Return);
    func.instruction(&Instruction::End);

    // result<codec, error>::ok
    func.instruction(&Instruction::I32Const(addr(RETURN_AREA)));
    func.instruction(&Instruction::I32Const(0));
    func.instruction(&Instruction::I32Store8(mem_arg(0, 0)));

    func.instruction(&Instruction::I32Const(addr(RETURN_AREA)));
    func.instruction(&Instruction::I32Const(1)); // codec resource rep
    func.instruction(&Instruction::Call(RESOURCE_NEW));
    func.instruction(&Instruction::I32Store(mem_arg(4, 2)));

    func.instruction(&Instruction::I32Const(addr(RETURN_AREA)));
    func.instruction(&Instruction::End);
    func
}

/// Returns the any-array parameter as result<any-array, error>::ok.
///
/// Parameters: codec rep, data discriminant, data pointer, data length,
/// shape pointer, shape length (and the ignored prototype for decode-into)
fn return_array() -> Function {
    let mut func = Function::new([]);

    // instructions += 1 + len
    func.instruction(&Instruction::GlobalGet(INSTRUCTIONS_GLOBAL));
    func.instruction(&Instruction::LocalGet(3));
    func.instruction(&Instruction::I64ExtendI32U);
    func.instruction(&Instruction::I64Const(1));
    func.instruction(&Instruction::I64Add);
    func.instruction(&Instruction::I64Add);
    func.instruction(&Instruction::GlobalSet(INSTRUCTIONS_GLOBAL));

    func.instruction(&Instruction::I32Const(addr(RETURN_AREA)));
    func.instruction(&Instruction::I32Const(0));
    func.instruction(&Instruction::I32Store8(mem_arg(0, 0)));

    func.instruction(&Instruction::I32Const(addr(RETURN_AREA)));
    func.instruction(&Instruction::LocalGet(1));
    func.instruction(&Instruction::I32Store8(mem_arg(4, 0)));

    for (local, offset) in [(2, 8), (3, 12), (4, 16), (5, 20)] {
        func.instruction(&Instruction::I32Const(addr(RETURN_AREA)));
        func.instruction(&Instruction::LocalGet(local));
        func.instruction(&Instruction::I32Store(mem_arg(offset, 2)));
    }

    func.instruction(&Instruction::I32Const(addr(RETURN_AREA)));
    func.instruction(&Instruction::End);
    func
}

/// Bump allocator that never frees.
///
/// Parameters: old pointer, old size, alignment, new size
fn cabi_realloc() -> Function {
    let mut func = Function::new([(1, ValType::I32)]);

    // ptr = (heap + align - 1) & -align
    func.instruction(&Instruction::GlobalGet(HEAP_GLOBAL));
    func.instruction(&Instruction::LocalGet(2));
    func.instruction(&Instruction::I32Add);
    func.instruction(&Instruction::I32Const(1));
    func.instruction(&Instruction::I32Sub);
    func.instruction(&Instruction::I32Const(0));
    func.instruction(&Instruction::LocalGet(2));
    func.instruction(&Instruction::I32Sub);
    func.instruction(&Instruction::I32And);
    func.instruction(&Instruction::LocalTee(4));

    // heap = ptr + new_size
    func.instruction(&Instruction::LocalGet(3));
    func.instruction(&Instruction::I32Add);
    func.instruction(&Instruction::GlobalSet(HEAP_GLOBAL));

    func.instruction(&Instruction::LocalGet(4));
    func.instruction(&Instruction::End);
    func
}

fn instruction_counter() -> Function {
    let mut func = Function::new([]);
    func.instruction(&Instruction::GlobalGet(INSTRUCTIONS_GLOBAL));
    func.instruction(&Instruction::End);
    func
}

const fn mem_arg(offset: u64, align: u32) -> MemArg {
    MemArg {
        offset,
        align,
        memory_index: 0,
    }
}

fn addr(ptr: u32) -> i32 {
    i32::try_from(ptr).unwrap()
}

fn len(string: &str) -> u32 {
    u32::try_from(string.len()).unwrap()
}
