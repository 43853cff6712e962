//! Fuzz target for the delta compressor.
//!
//! Two arbitrary state trees are diffed and the delta applied back onto the first; the
//! result must equal the second and match the delta's checksum.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use serde_json::{Map, Value};
use turnsync::{apply_delta, DeltaCompressor};

/// A JSON tree shaped by the fuzzer instead of parsed from text.
#[derive(Debug, Arbitrary)]
enum Tree {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Tree>),
    Object(Vec<(String, Tree)>),
}

impl Tree {
    fn into_value(self) -> Value {
        match self {
            Tree::Null => Value::Null,
            Tree::Bool(b) => Value::Bool(b),
            Tree::Int(i) => Value::from(i),
            Tree::Text(s) => Value::String(s),
            Tree::List(items) => Value::Array(items.into_iter().map(Tree::into_value).collect()),
            Tree::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

fuzz_target!(|input: (Tree, Tree)| {
    let before = input.0.into_value();
    let after = input.1.into_value();

    let mut compressor = DeltaCompressor::new();
    let _ = compressor.calculate_delta(&before);
    match compressor.calculate_delta(&after) {
        Some(delta) => {
            let rebuilt = apply_delta(&before, &delta);
            assert!(delta.verify(&rebuilt));
            assert_eq!(rebuilt, after);
        },
        None => assert_eq!(before, after),
    }
});
