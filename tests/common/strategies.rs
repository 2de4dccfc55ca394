use pipeline_conformance::expectation::{apply, Operation, Snapshot, UpdateMode};
use pipeline_conformance::models::ResourceSchema;
use proptest::prelude::*;
use serde_json::json;

/// IDs accepted by the service's ID-format rule
pub fn valid_id_strategy() -> impl Strategy<Value = String> {
    "[a-z]([a-z0-9-]{0,30}[a-z0-9])?"
}

/// IDs breaking exactly one part of the ID-format rule
pub fn invalid_id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Z][a-z0-9]{0,10}",
        "[0-9][a-z0-9]{0,10}",
        "[a-z][a-z0-9]{0,10}-",
        "[a-z][a-z0-9]{0,5}[A-Z_.][a-z0-9]{0,5}",
        "[a-z]{64,70}",
    ]
}

/// Short lowercase search terms
pub fn search_term_strategy() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,3}"
}

/// Pipeline descriptions drawn from a small alphabet so terms collide often
pub fn description_strategy() -> impl Strategy<Value = String> {
    "[a-d ]{0,12}"
}

/// A pipeline snapshot with 0-20 resources and distinct IDs
pub fn pipeline_snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    prop::collection::btree_map(valid_id_strategy(), description_strategy(), 0..20).prop_map(|entries| {
        let schema = ResourceSchema::pipeline();
        entries.into_iter().fold(Snapshot::new(), |snapshot, (id, description)| {
            let create = Operation::Create {
                payload: json!({ "id": id, "description": description }),
            };
            apply(&snapshot, &create, &schema).snapshot
        })
    })
}

/// Create, update and delete operations over a small shared ID space
pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    let id = prop::sample::select(vec!["alpha", "bravo", "charlie", "delta"]).prop_map(str::to_string);
    prop_oneof![
        (id.clone(), description_strategy()).prop_map(|(id, description)| Operation::Create {
            payload: json!({ "id": id, "description": description }),
        }),
        (id.clone(), description_strategy(), any::<bool>()).prop_map(|(id, description, merge)| {
            Operation::Update {
                id,
                patch: json!({ "description": description }),
                mode: if merge { UpdateMode::Merge } else { UpdateMode::Replace },
            }
        }),
        id.prop_map(|id| Operation::Delete { id }),
    ]
}
