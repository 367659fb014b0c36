//! Property-based tests for argument packing and signature derivation.
//!
//! Invariants checked for all inputs:
//! - Packed values read back byte-identical through the launch pointers
//! - Every packed value sits at its natural alignment
//! - Signatures depend on alignment class, not on concrete addresses
//! - Specialized integers equal to one are hinted but never packed
//! - Constexpr values are rendered verbatim and never packed

use proptest::prelude::*;

use kernel_jit::signature::specialization_hint;
use kernel_jit::{
    ArgKind, ArrayRef, DType, KernelArg, ParameterBuffer, SignatureBuilder, StaticSignature,
};

// ═══════════════════════════════════════════════════════════════════════
// 1. ParameterBuffer round-trip at every alignment boundary
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
enum Packed {
    U8(u8),
    I16(i16),
    U32(u32),
    F32(u32),
    I64(i64),
    F64(u64),
    U128(u128),
}

fn arb_packed() -> impl Strategy<Value = Packed> {
    prop_oneof![
        any::<u8>().prop_map(Packed::U8),
        any::<i16>().prop_map(Packed::I16),
        any::<u32>().prop_map(Packed::U32),
        any::<f32>().prop_map(|v| Packed::F32(v.to_bits())),
        any::<i64>().prop_map(Packed::I64),
        any::<f64>().prop_map(|v| Packed::F64(v.to_bits())),
        any::<u128>().prop_map(Packed::U128),
    ]
}

fn push(buffer: &mut ParameterBuffer, value: Packed) {
    match value {
        Packed::U8(v) => buffer.push(v),
        Packed::I16(v) => buffer.push(v),
        Packed::U32(v) => buffer.push(v),
        Packed::F32(bits) => buffer.push(f32::from_bits(bits)),
        Packed::I64(v) => buffer.push(v),
        Packed::F64(bits) => buffer.push(f64::from_bits(bits)),
        Packed::U128(v) => buffer.push(v),
    }
}

fn align_of(value: Packed) -> usize {
    match value {
        Packed::U8(_) => std::mem::align_of::<u8>(),
        Packed::I16(_) => std::mem::align_of::<i16>(),
        Packed::U32(_) | Packed::F32(_) => std::mem::align_of::<u32>(),
        Packed::I64(_) | Packed::F64(_) => std::mem::align_of::<u64>(),
        Packed::U128(_) => std::mem::align_of::<u128>(),
    }
}

/// Read back through a launch pointer.
unsafe fn read_back(ptr: *const u8, like: Packed) -> Packed {
    match like {
        Packed::U8(_) => Packed::U8(*ptr),
        Packed::I16(_) => Packed::I16(*(ptr as *const i16)),
        Packed::U32(_) => Packed::U32(*(ptr as *const u32)),
        Packed::F32(_) => Packed::F32((*(ptr as *const f32)).to_bits()),
        Packed::I64(_) => Packed::I64(*(ptr as *const i64)),
        Packed::F64(_) => Packed::F64((*(ptr as *const f64)).to_bits()),
        Packed::U128(_) => Packed::U128(*(ptr as *const u128)),
    }
}

proptest! {
    #[test]
    fn prop_pack_round_trip(values in prop::collection::vec(arb_packed(), 0..48)) {
        let mut buffer = ParameterBuffer::new();
        for &v in &values {
            push(&mut buffer, v);
        }
        prop_assert_eq!(buffer.size(), values.len());

        for (offset, &v) in buffer.offsets().iter().zip(&values) {
            prop_assert_eq!(offset % align_of(v), 0);
        }

        let ptrs = buffer.get_ptrs();
        prop_assert_eq!(ptrs.len(), values.len());
        for (&p, &v) in ptrs.as_slice().iter().zip(&values) {
            prop_assert_eq!(p as usize % align_of(v), 0);
            let got = unsafe { read_back(p as *const u8, v) };
            prop_assert_eq!(got, v);
        }
    }

    #[test]
    fn prop_offsets_increase(values in prop::collection::vec(arb_packed(), 1..32)) {
        let mut buffer = ParameterBuffer::new();
        for &v in &values {
            push(&mut buffer, v);
        }
        for pair in buffer.offsets().windows(2) {
            prop_assert!(pair[0] < pair[1]);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 2. Signatures depend on alignment class only
// ═══════════════════════════════════════════════════════════════════════

fn arb_runtime_kind() -> impl Strategy<Value = ArgKind> {
    prop_oneof![Just(ArgKind::NonConstexpr), Just(ArgKind::Specialized)]
}

/// Two addresses in the same alignment class: both multiples of 16, or both
/// off by the same non-zero residue.
fn arb_address_pair() -> impl Strategy<Value = (u64, u64)> {
    (1u64..1 << 36, 1u64..1 << 36, 0u64..16)
        .prop_map(|(a, b, residue)| (a * 16 + residue, b * 16 + residue))
}

fn signature_of(kinds: &[ArgKind], args: &[KernelArg]) -> (String, usize) {
    let ssig = StaticSignature::new(kinds.to_vec());
    let mut builder = SignatureBuilder::new(&ssig);
    builder.handle_args(args).unwrap();
    let (buffer, sig) = builder.finish().unwrap();
    (sig, buffer.size())
}

proptest! {
    #[test]
    fn prop_same_alignment_class_same_signature(
        entries in prop::collection::vec((arb_runtime_kind(), arb_address_pair()), 1..8)
    ) {
        let kinds: Vec<ArgKind> = entries.iter().map(|(k, _)| *k).collect();
        let first: Vec<KernelArg> = entries
            .iter()
            .map(|(_, (a, _))| KernelArg::from(unsafe { ArrayRef::from_raw(*a, DType::F16, 32) }))
            .collect();
        let second: Vec<KernelArg> = entries
            .iter()
            .map(|(_, (_, b))| KernelArg::from(unsafe { ArrayRef::from_raw(*b, DType::F16, 32) }))
            .collect();

        let (sig_a, n_a) = signature_of(&kinds, &first);
        let (sig_b, n_b) = signature_of(&kinds, &second);
        prop_assert_eq!(sig_a, sig_b);
        prop_assert_eq!(n_a, entries.len());
        prop_assert_eq!(n_b, entries.len());
    }

    #[test]
    fn prop_hint_classes(v in any::<i64>()) {
        let hint = specialization_hint(v as i128);
        if v % 16 == 0 {
            prop_assert_eq!(hint, ":16");
        } else if v == 1 {
            prop_assert_eq!(hint, ":1");
        } else {
            prop_assert_eq!(hint, "");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// 3. Which values reach the launch buffer
// ═══════════════════════════════════════════════════════════════════════

fn arb_kind() -> impl Strategy<Value = ArgKind> {
    prop_oneof![
        Just(ArgKind::NonConstexpr),
        Just(ArgKind::Specialized),
        Just(ArgKind::Constexpr),
    ]
}

fn arb_int() -> impl Strategy<Value = i64> {
    prop_oneof![Just(1i64), Just(16), Just(0), any::<i64>()]
}

proptest! {
    #[test]
    fn prop_packed_count_matches_kinds(
        entries in prop::collection::vec((arb_kind(), arb_int()), 0..12)
    ) {
        let kinds: Vec<ArgKind> = entries.iter().map(|(k, _)| *k).collect();
        let args: Vec<KernelArg> = entries.iter().map(|(_, v)| KernelArg::from(*v)).collect();

        let ssig = StaticSignature::new(kinds);
        let mut builder = SignatureBuilder::new(&ssig);
        builder.handle_args(&args).unwrap();
        let (buffer, sig) = builder.finish().unwrap();
        let tags: Vec<&str> = if sig.is_empty() { Vec::new() } else { sig.split(',').collect() };
        prop_assert_eq!(tags.len(), entries.len());

        let mut expected = Vec::new();
        for ((kind, v), tag) in entries.iter().zip(&tags) {
            match kind {
                ArgKind::Constexpr => prop_assert_eq!(*tag, v.to_string()),
                ArgKind::Specialized if *v == 1 => prop_assert_eq!(*tag, "i64:1"),
                ArgKind::Specialized => {
                    prop_assert!(tag.starts_with("i64"));
                    expected.push(*v);
                }
                ArgKind::NonConstexpr => {
                    prop_assert_eq!(*tag, "i64");
                    expected.push(*v);
                }
            }
        }

        prop_assert_eq!(buffer.size(), expected.len());
        for (i, v) in expected.iter().enumerate() {
            prop_assert_eq!(buffer.read::<i64>(i), Some(*v));
        }
    }

    #[test]
    fn prop_constexpr_array_never_packs(
        prefix in prop::collection::vec(any::<i32>(), 0..4),
        addr in any::<u64>(),
    ) {
        let mut kinds = vec![ArgKind::NonConstexpr; prefix.len()];
        kinds.push(ArgKind::Constexpr);
        kinds.push(ArgKind::NonConstexpr);
        let mut args: Vec<KernelArg> = prefix.iter().map(|&v| KernelArg::from(v)).collect();
        args.push(KernelArg::from(unsafe { ArrayRef::from_raw(addr, DType::F32, 1) }));
        args.push(KernelArg::from(7i32));

        let ssig = StaticSignature::new(kinds);
        let mut builder = SignatureBuilder::new(&ssig);
        let result = builder.handle_args(&args);
        prop_assert!(result.is_err());
        prop_assert_eq!(builder.buffer().size(), prefix.len());
    }
}
