//! Property-based tests for the encoder and the code generator
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. LEB128 encodings decode back to the value written
//! 2. Interned strings are deduplicated and never overlap
//! 3. Compiling the same tree twice yields the same bytes
//! 4. Printed integers and reals match Rust's own formatting

mod common;

use asrwasm::compiler::slots::SlotAllocator;
use asrwasm::compiler::wasm::leb128::{self, Reader};
use asrwasm::{Asr, AsrBuilder};
use common::{compile_ok, run_module};
use proptest::prelude::*;

// =============================================================================
// STRATEGY GENERATORS
// =============================================================================

/// Short byte strings, with repeats likely
fn literal() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        Just(b" ".to_vec()),
        Just(b"\n".to_vec()),
        Just(b"(".to_vec()),
        prop::collection::vec(any::<u8>(), 0..12),
    ]
}

/// `print v1, v2, ...` over integer literals
fn print_program(values: &[i64]) -> Asr {
    let mut asr = Asr::new();
    let mut b = AsrBuilder::new(&mut asr);
    let (main, _) = b.program("main");
    let exprs = values.iter().map(|v| b.i64(*v)).collect();
    let print = b.print(exprs);
    b.set_body(main, vec![print]);
    asr
}

// =============================================================================
// ENCODING
// =============================================================================

proptest! {
    #[test]
    fn leb128_unsigned_decodes(value in any::<u32>()) {
        let mut out = Vec::new();
        leb128::write_u32(&mut out, value);
        prop_assert!(out.len() <= 5);
        let mut reader = Reader::new(&out);
        prop_assert_eq!(reader.u32().unwrap(), value);
        prop_assert!(reader.is_empty());
    }

    #[test]
    fn leb128_signed_decodes(value in any::<i64>()) {
        let mut out = Vec::new();
        leb128::write_i64(&mut out, value);
        prop_assert!(out.len() <= 10);
        let mut reader = Reader::new(&out);
        prop_assert_eq!(reader.i64().unwrap(), value);
        prop_assert!(reader.is_empty());
    }

    #[test]
    fn interning_deduplicates(literals in prop::collection::vec(literal(), 1..20)) {
        let mut slots = SlotAllocator::new();
        let mut seen: Vec<(Vec<u8>, u32)> = Vec::new();
        for bytes in &literals {
            let offset = slots.intern_string(bytes);
            prop_assert_eq!(offset % 4, 0);
            match seen.iter().find(|(b, _)| b == bytes) {
                Some((_, first)) => prop_assert_eq!(offset, *first),
                None => {
                    prop_assert!(seen.iter().all(|(_, o)| *o != offset));
                    seen.push((bytes.clone(), offset));
                }
            }
        }
        prop_assert!(slots.memory_end() >= 8);
    }
}

// =============================================================================
// CODE GENERATION
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn compilation_is_deterministic(values in prop::collection::vec(any::<i64>(), 0..8)) {
        let first = compile_ok(&mut print_program(&values)).bytes.unwrap();
        let second = compile_ok(&mut print_program(&values)).bytes.unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn printed_integers_match(values in prop::collection::vec(-1_000_000_000_000i64..1_000_000_000_000, 1..5)) {
        let bytes = compile_ok(&mut print_program(&values)).bytes.unwrap();
        let state = run_module(&bytes).unwrap();
        let expected: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        prop_assert_eq!(state.stdout_str(), format!("{}\n", expected.join(" ")));
    }

    #[test]
    fn printed_reals_have_eight_digits(whole in -100_000i32..100_000, eighths in 0u32..8) {
        // Multiples of 1/8 are exact in binary and in eight decimal digits
        let magnitude = whole.unsigned_abs() as f64 + eighths as f64 / 8.0;
        let value = if whole < 0 { -magnitude } else { magnitude };

        let mut asr = Asr::new();
        let mut b = AsrBuilder::new(&mut asr);
        let (main, _) = b.program("main");
        let literal = b.f64(value);
        let print = b.print(vec![literal]);
        b.set_body(main, vec![print]);

        let bytes = compile_ok(&mut asr).bytes.unwrap();
        let state = run_module(&bytes).unwrap();
        prop_assert_eq!(state.stdout_str(), format!("{:.8}\n", value));
    }
}
