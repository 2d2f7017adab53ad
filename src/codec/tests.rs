//! Generated round-trip checks for field values and tables.

use bytes::Bytes;
use proptest::{
    collection::{btree_map, vec},
    num,
    prelude::{Just, Strategy, any, prop_oneof},
    prop_assert_eq,
    strategy::BoxedStrategy,
    test_runner::{Config as ProptestConfig, RngAlgorithm, TestCaseError, TestRng, TestRunner},
};
use rstest::rstest;

use super::*;

fn deterministic_runner(cases: u32) -> TestRunner {
    let config = ProptestConfig {
        cases,
        ..ProptestConfig::default()
    };
    let rng = TestRng::deterministic_rng(RngAlgorithm::ChaCha);
    TestRunner::new_with_rng(config, rng)
}

fn leaf_value() -> BoxedStrategy<FieldValue> {
    prop_oneof![
        any::<bool>().prop_map(FieldValue::Bool),
        any::<i8>().prop_map(FieldValue::I8),
        any::<i16>().prop_map(FieldValue::I16),
        any::<i32>().prop_map(FieldValue::I32),
        any::<i64>().prop_map(FieldValue::I64),
        num::f32::NORMAL.prop_map(FieldValue::F32),
        num::f64::NORMAL.prop_map(FieldValue::F64),
        (any::<u8>(), any::<i32>())
            .prop_map(|(scale, v)| FieldValue::Decimal(Decimal::new(scale, i64::from(v)))),
        vec(any::<u8>(), 0..32).prop_map(|b| FieldValue::LongString(Bytes::from(b))),
        any::<i64>().prop_map(|s| FieldValue::Timestamp(Timestamp(s))),
        vec(any::<u8>(), 0..32).prop_map(|b| FieldValue::Bytes(Bytes::from(b))),
        Just(FieldValue::Void),
    ]
    .boxed()
}

fn table_key() -> impl Strategy<Value = String> { "[a-zA-Z0-9_.-]{1,24}" }

fn field_value() -> BoxedStrategy<FieldValue> {
    leaf_value()
        .prop_recursive(3, 48, 6, |inner| {
            prop_oneof![
                btree_map(table_key(), inner.clone(), 0..6)
                    .prop_map(|m| FieldValue::Table(m.into_iter().collect())),
                vec(inner, 0..6).prop_map(FieldValue::Array),
            ]
        })
        .boxed()
}

fn field_table() -> impl Strategy<Value = FieldTable> {
    btree_map(table_key(), field_value(), 0..12).prop_map(|m| m.into_iter().collect())
}

#[rstest]
#[case(64)]
#[case(256)]
fn generated_tables_round_trip(#[case] cases: u32) {
    let mut runner = deterministic_runner(cases);
    runner
        .run(&field_table(), |table| {
            let mut writer = ArgWriter::new();
            writer
                .write_table(&table)
                .map_err(|err| TestCaseError::fail(format!("encode failed: {err}")))?;
            let mut reader = ArgReader::new(writer.finish());
            let decoded = reader
                .read_table()
                .map_err(|err| TestCaseError::fail(format!("decode failed: {err}")))?;
            prop_assert_eq!(decoded, table);
            prop_assert_eq!(reader.remaining(), 0);
            Ok(())
        })
        .expect("generated field tables should round-trip");
}

#[test]
fn primitives_round_trip_in_argument_order() {
    let mut writer = ArgWriter::new();
    writer.write_octet(7);
    writer.write_short(513);
    writer.write_bit(true);
    writer.write_bit(false);
    writer.write_long(70_000);
    writer.write_longlong(u64::MAX);
    writer.write_shortstr("amq.direct").expect("shortstr");
    writer.write_longstr(b"\x00binary\xff").expect("longstr");
    writer.write_timestamp(Timestamp(42));

    let mut reader = ArgReader::new(writer.finish());
    assert_eq!(reader.read_octet().expect("octet"), 7);
    assert_eq!(reader.read_short().expect("short"), 513);
    assert!(reader.read_bit().expect("bit"));
    assert!(!reader.read_bit().expect("bit"));
    assert_eq!(reader.read_long().expect("long"), 70_000);
    assert_eq!(reader.read_longlong().expect("longlong"), u64::MAX);
    assert_eq!(reader.read_shortstr().expect("shortstr"), "amq.direct");
    assert_eq!(
        reader.read_longstr().expect("longstr").as_ref(),
        b"\x00binary\xff"
    );
    assert_eq!(reader.read_timestamp().expect("timestamp"), Timestamp(42));
    reader.finish().expect("no trailing bytes");
}
