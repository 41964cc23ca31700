//! Structural diff between two versions of a JSON mapping.
//!
//! [`diff`] walks the union of keys and emits one [`PatchOp`] per changed
//! path:
//!
//! | old \ new        | absent    | mapping        | anything else            |
//! |------------------|-----------|----------------|--------------------------|
//! | absent           | –         | `set` subtree  | `set`                    |
//! | mapping          | `remove`  | recurse        | `set` (type change)      |
//! | anything else    | `remove`  | `set` subtree  | `set` unless equal       |
//!
//! Sequences are compared whole: any difference replaces the full sequence.
//! An explicit `null` is a value, so it produces `set`, never `remove`.
//!
//! [`apply`] is the inverse: it folds a patch into a mapping.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use matchcast_core::{Change, PatchOp};

/// Patch that turns `old` into `new`, with every path prefixed by `prefix`
/// (pass `""` for paths relative to the mapping itself).
pub fn diff(prefix: &str, old: &Map<String, Value>, new: &Map<String, Value>) -> Vec<PatchOp> {
    let mut ops = Vec::new();
    diff_into(prefix, old, new, &mut ops);
    ops
}

fn diff_into(prefix: &str, old: &Map<String, Value>, new: &Map<String, Value>, ops: &mut Vec<PatchOp>) {
    let keys: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for key in keys {
        let path = join_path(prefix, key);
        match (old.get(key), new.get(key)) {
            (_, None) => ops.push(PatchOp::remove(path)),
            (Some(Value::Object(before)), Some(Value::Object(after))) => {
                diff_into(&path, before, after, ops);
            }
            (Some(before), Some(after)) if before == after => {}
            (_, Some(after)) => ops.push(PatchOp::set(path, after.clone())),
        }
    }
}

/// `prefix.key`, or just `key` at the root.
pub fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Fold `ops` into `target`.
///
/// `set` creates missing intermediate mappings (and overwrites non-mapping
/// intermediates); `remove` of a path that does not exist is ignored.
pub fn apply(target: &mut Map<String, Value>, ops: &[PatchOp]) {
    for op in ops {
        let segments: Vec<&str> = op.path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };
        match &op.change {
            Change::Set { value } => {
                if let Some(parent) = ensure_parent(target, parents) {
                    parent.insert((*last).to_string(), value.clone());
                }
            }
            Change::Remove => {
                let mut cursor = Some(&mut *target);
                for segment in parents {
                    cursor = cursor.and_then(|map| map.get_mut(*segment)).and_then(Value::as_object_mut);
                }
                if let Some(parent) = cursor {
                    parent.remove(*last);
                }
            }
        }
    }
}

fn ensure_parent<'a>(
    root: &'a mut Map<String, Value>,
    parents: &[&str],
) -> Option<&'a mut Map<String, Value>> {
    let mut map = root;
    for segment in parents {
        let slot = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        map = slot.as_object_mut()?;
    }
    Some(map)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn unchanged_mappings_produce_no_ops() {
        let a = obj(json!({"score": {"home": 1, "away": 0}, "period": 2, "tags": ["x"]}));
        assert!(diff("matchData", &a, &a.clone()).is_empty());
    }

    #[test]
    fn nested_change_is_addressed_by_full_path() {
        let old = obj(json!({"score": {"home": 1, "away": 0}}));
        let new = obj(json!({"score": {"home": 2, "away": 0}}));
        assert_eq!(
            diff("matchData", &old, &new),
            vec![PatchOp::set("matchData.score.home", json!(2))]
        );
    }

    #[test]
    fn missing_key_becomes_tombstone() {
        let old = obj(json!({"clock": "12:00", "period": 1}));
        let new = obj(json!({"period": 1}));
        assert_eq!(diff("", &old, &new), vec![PatchOp::remove("clock")]);
    }

    #[test]
    fn explicit_null_is_a_replace_not_a_tombstone() {
        let old = obj(json!({"clock": "12:00"}));
        let new = obj(json!({"clock": null}));
        assert_eq!(diff("", &old, &new), vec![PatchOp::set("clock", Value::Null)]);
    }

    #[test]
    fn changed_sequence_is_replaced_whole() {
        let old = obj(json!({"cards": [1, 2, 3]}));
        let new = obj(json!({"cards": [1, 9, 3]}));
        assert_eq!(diff("", &old, &new), vec![PatchOp::set("cards", json!([1, 9, 3]))]);

        let longer = obj(json!({"cards": [1, 2, 3, 4]}));
        assert_eq!(diff("", &old, &longer), vec![PatchOp::set("cards", json!([1, 2, 3, 4]))]);
    }

    #[test]
    fn sequences_compare_structurally() {
        let old = obj(json!({"events": [{"t": 1, "who": "a"}]}));
        let new = obj(json!({"events": [{"who": "a", "t": 1}]}));
        assert!(diff("", &old, &new).is_empty());
    }

    #[test]
    fn type_change_replaces_whole_subtree() {
        let old = obj(json!({"score": {"home": 1}}));
        let new = obj(json!({"score": "abandoned"}));
        assert_eq!(diff("", &old, &new), vec![PatchOp::set("score", json!("abandoned"))]);

        let back = diff("", &new, &old);
        assert_eq!(back, vec![PatchOp::set("score", json!({"home": 1}))]);
    }

    #[test]
    fn apply_reconstructs_new_from_old() {
        let cases = [
            (json!({}), json!({"a": {"b": {"c": 1}}})),
            (json!({"a": {"b": 1, "c": 2}}), json!({"a": {"c": 3}})),
            (json!({"a": 1, "b": [1, 2]}), json!({"a": {"nested": true}, "b": [2]})),
            (json!({"a": {"x": null}}), json!({"a": {"x": 0}, "z": null})),
            (json!({"keep": "same", "drop": {"deep": 1}}), json!({"keep": "same"})),
        ];
        for (before, after) in cases {
            let before = obj(before);
            let after = obj(after);
            let ops = diff("", &before, &after);
            let mut rebuilt = before.clone();
            apply(&mut rebuilt, &ops);
            assert_eq!(rebuilt, after, "ops: {ops:?}");
        }
    }

    #[test]
    fn patch_never_touches_agreeing_paths() {
        let old = obj(json!({"same": {"x": 1}, "changed": {"y": 1, "z": 2}}));
        let new = obj(json!({"same": {"x": 1}, "changed": {"y": 1, "z": 3}}));
        let ops = diff("", &old, &new);
        assert!(ops.iter().all(|op| op.path == "changed.z"), "ops: {ops:?}");
    }

    #[test]
    fn apply_ignores_removal_of_missing_path() {
        let mut target = obj(json!({"a": 1}));
        apply(&mut target, &[PatchOp::remove("b.c"), PatchOp::remove("a.b")]);
        assert_eq!(Value::Object(target), json!({"a": 1}));
    }
}
