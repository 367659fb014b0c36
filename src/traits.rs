//! Host element types that can back a kernel array argument.

use half::{bf16, f16};

use crate::types::DType;

/// Maps a Rust element type to the element type tag of an array argument.
///
/// Only types whose tag the code generator understands implement this, so a
/// typed [`ArrayRef`](crate::types::ArrayRef) can never carry an unsupported
/// element type.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;
}

macro_rules! impl_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                const DTYPE: DType = DType::$dtype;
            }
        )*
    };
}

impl_element! {
    f32 => F32,
    f64 => F64,
    f16 => F16,
    bf16 => BF16,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    bool => Bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_types_map_to_16_bit_tags() {
        assert_eq!(<f16 as Element>::DTYPE.tag().unwrap(), "fp16");
        assert_eq!(<bf16 as Element>::DTYPE.tag().unwrap(), "bf16");
    }

    #[test]
    fn test_every_element_has_a_tag() {
        let dtypes = [
            <f32 as Element>::DTYPE,
            <f64 as Element>::DTYPE,
            <i8 as Element>::DTYPE,
            <i16 as Element>::DTYPE,
            <i32 as Element>::DTYPE,
            <i64 as Element>::DTYPE,
            <u8 as Element>::DTYPE,
            <u16 as Element>::DTYPE,
            <u32 as Element>::DTYPE,
            <u64 as Element>::DTYPE,
            <bool as Element>::DTYPE,
        ];
        for dtype in dtypes {
            assert!(dtype.tag().is_ok(), "{dtype:?} has no tag");
        }
    }
}
