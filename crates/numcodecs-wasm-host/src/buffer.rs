//! Conversion of byte buffers to and from the `numcodecs:abc/codec`
//! any-array types.
//!
//! Buffers are passed into a component as one-dimensional `u8` arrays. The
//! arrays that a component returns may have any numeric dtype and shape, and
//! are flattened into their little-endian bytes.

use std::sync::OnceLock;

use wasm_component_layer::{
    Enum, EnumType, List, ListType, Record, RecordType, Value, ValueType, Variant, VariantCase,
    VariantType,
};

const U8_DISCRIMINANT: usize = 0;

fn any_array_data_ty() -> &'static VariantType {
    static ANY_ARRAY_DATA_TY: OnceLock<VariantType> = OnceLock::new();

    #[expect(clippy::expect_used)]
    ANY_ARRAY_DATA_TY.get_or_init(|| {
        VariantType::new(
            None,
            [
                VariantCase::new("u8", Some(ValueType::List(ListType::new(ValueType::U8)))),
                VariantCase::new("u16", Some(ValueType::List(ListType::new(ValueType::U16)))),
                VariantCase::new("u32", Some(ValueType::List(ListType::new(ValueType::U32)))),
                VariantCase::new("u64", Some(ValueType::List(ListType::new(ValueType::U64)))),
                VariantCase::new("i8", Some(ValueType::List(ListType::new(ValueType::S8)))),
                VariantCase::new("i16", Some(ValueType::List(ListType::new(ValueType::S16)))),
                VariantCase::new("i32", Some(ValueType::List(ListType::new(ValueType::S32)))),
                VariantCase::new("i64", Some(ValueType::List(ListType::new(ValueType::S64)))),
                VariantCase::new("f32", Some(ValueType::List(ListType::new(ValueType::F32)))),
                VariantCase::new("f64", Some(ValueType::List(ListType::new(ValueType::F64)))),
            ],
        )
        .expect("constructing the any-array-data variant type must not fail")
    })
}

fn any_array_ty() -> &'static RecordType {
    static ANY_ARRAY_TY: OnceLock<RecordType> = OnceLock::new();

    #[expect(clippy::expect_used)]
    ANY_ARRAY_TY.get_or_init(|| {
        RecordType::new(
            None,
            [
                ("data", ValueType::Variant(any_array_data_ty().clone())),
                ("shape", ValueType::List(ListType::new(ValueType::U32))),
            ],
        )
        .expect("constructing the any-array record type must not fail")
    })
}

fn any_array_dtype_ty() -> &'static EnumType {
    static ANY_ARRAY_DTYPE_TY: OnceLock<EnumType> = OnceLock::new();

    #[expect(clippy::expect_used)]
    ANY_ARRAY_DTYPE_TY.get_or_init(|| {
        EnumType::new(
            None,
            [
                "u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64", "f32", "f64",
            ],
        )
        .expect("constructing the any-array-dtype enum type must not fail")
    })
}

fn any_array_prototype_ty() -> &'static RecordType {
    static ANY_ARRAY_PROTOTYPE_TY: OnceLock<RecordType> = OnceLock::new();

    #[expect(clippy::expect_used)]
    ANY_ARRAY_PROTOTYPE_TY.get_or_init(|| {
        RecordType::new(
            None,
            [
                ("dtype", ValueType::Enum(any_array_dtype_ty().clone())),
                ("shape", ValueType::List(ListType::new(ValueType::U32))),
            ],
        )
        .expect("constructing the any-array-prototype record type must not fail")
    })
}

fn shape_into_wasm(len: usize) -> Result<List, anyhow::Error> {
    let len = u32::try_from(len)
        .map_err(|_| anyhow::anyhow!("buffer of {len} bytes exceeds the 32bit size limit"))?;

    Ok(List::from(&[len][..]))
}

/// Convert the `bytes` into a one-dimensional `u8` any-array record.
pub fn bytes_into_wasm(bytes: &[u8]) -> Result<Record, anyhow::Error> {
    let data = Variant::new(
        any_array_data_ty().clone(),
        U8_DISCRIMINANT,
        Some(Value::List(List::from(bytes))),
    )?;

    Record::new(
        any_array_ty().clone(),
        [
            ("data", Value::Variant(data)),
            ("shape", Value::List(shape_into_wasm(bytes.len())?)),
        ],
    )
}

/// Convert an output buffer of `len` bytes into a one-dimensional `u8`
/// any-array prototype record.
pub fn bytes_prototype_into_wasm(len: usize) -> Result<Record, anyhow::Error> {
    let dtype = Enum::new(any_array_dtype_ty().clone(), U8_DISCRIMINANT)?;

    Record::new(
        any_array_prototype_ty().clone(),
        [
            ("dtype", Value::Enum(dtype)),
            ("shape", Value::List(shape_into_wasm(len)?)),
        ],
    )
}

/// Flatten an any-array `record` into the little-endian bytes of its
/// elements.
pub fn bytes_from_wasm_record(record: &Record) -> Result<Vec<u8>, anyhow::Error> {
    fn flatten<T: Copy, const N: usize>(
        values: &[T],
        to_le_bytes: impl Fn(T) -> [u8; N],
    ) -> (usize, Vec<u8>) {
        let bytes = values.iter().copied().flat_map(to_le_bytes).collect();
        (values.len(), bytes)
    }

    let Some(Value::List(shape)) = record.field("shape") else {
        anyhow::bail!("any-array record {record:?} is missing the shape field");
    };
    let Some(len) = shape
        .typed::<u32>()?
        .iter()
        .try_fold(1_usize, |len, s| len.checked_mul(usize::try_from(*s).ok()?))
    else {
        anyhow::bail!("any-array shape {shape:?} overflows the address space");
    };

    let Some(Value::Variant(data)) = record.field("data") else {
        anyhow::bail!("any-array record {record:?} is missing the data field");
    };
    let Some(Value::List(values)) = data.value() else {
        anyhow::bail!(
            "any-array data has an invalid variant type {:?}",
            data.value().map(|v| v.ty())
        );
    };

    let (num_values, bytes) = match data.discriminant() {
        0 => {
            let values = values.typed::<u8>()?;
            (values.len(), values.to_vec())
        },
        1 => flatten(values.typed::<u16>()?, u16::to_le_bytes),
        2 => flatten(values.typed::<u32>()?, u32::to_le_bytes),
        3 => flatten(values.typed::<u64>()?, u64::to_le_bytes),
        4 => flatten(values.typed::<i8>()?, i8::to_le_bytes),
        5 => flatten(values.typed::<i16>()?, i16::to_le_bytes),
        6 => flatten(values.typed::<i32>()?, i32::to_le_bytes),
        7 => flatten(values.typed::<i64>()?, i64::to_le_bytes),
        8 => flatten(values.typed::<f32>()?, f32::to_le_bytes),
        9 => flatten(values.typed::<f64>()?, f64::to_le_bytes),
        discriminant => anyhow::bail!(
            "any-array data has an invalid variant [{discriminant}]:{:?}",
            data.value().map(|v| v.ty())
        ),
    };

    anyhow::ensure!(
        num_values == len,
        "any-array data has {num_values} elements but its shape {shape:?} requires {len}"
    );

    Ok(bytes)
}
