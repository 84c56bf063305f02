// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proptest strategies shared with other crates' tests.

use proptest::prelude::*;
use serde_json::{json, Map, Value};

/// Arbitrary scalar or shallow nested JSON value.
pub fn arb_leaf() -> impl Strategy<Value = Value> {
    let scalar = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z0-9-]{0,12}".prop_map(Value::String),
    ];
    scalar.prop_recursive(2, 12, 4, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-zA-Z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// A Kubernetes-shaped object that may carry server-populated fields.
pub fn arb_manifest() -> impl Strategy<Value = Value> {
    (
        "[A-Z][a-zA-Z]{2,12}",
        "[a-z][a-z0-9-]{0,20}",
        proptest::option::of(arb_leaf()),
        proptest::option::of("[0-9TZ:-]{10,20}"),
        proptest::collection::btree_map("[a-z]{1,8}", arb_leaf(), 0..4),
    )
        .prop_map(|(kind, name, status, created, spec)| {
            let mut metadata = json!({ "name": name });
            if let Some(ts) = created {
                metadata["creationTimestamp"] = Value::String(ts);
            }
            let mut obj = json!({
                "apiVersion": "example.com/v1",
                "kind": kind,
                "metadata": metadata,
                "spec": spec.into_iter().collect::<Map<_, _>>(),
            });
            if let Some(status) = status {
                obj["status"] = status;
            }
            obj
        })
}
