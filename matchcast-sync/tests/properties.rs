//! Property tests for the differ, the sequence detector and score extraction.

use matchcast_core::{Document, WagonAppend};
use matchcast_sync::{diff, score, sequence, ScorePath, SequenceDelta};
use proptest::prelude::*;
use serde_json::{Map, Value};

fn key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["home", "away", "score", "sets", "clock"]).prop_map(String::from)
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-3i64..3).prop_map(Value::from),
        "[a-c]{0,2}".prop_map(Value::from),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            prop::collection::btree_map(key(), inner, 0..4)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

fn mapping() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(key(), value(), 0..5).prop_map(|entries| entries.into_iter().collect())
}

/// `matchData` whose `score` is absent, a mapping, or a scalar.
fn match_data() -> impl Strategy<Value = Map<String, Value>> {
    let score = prop::option::of(prop_oneof![
        3 => mapping().prop_map(Value::Object),
        1 => leaf(),
    ]);
    (mapping(), score).prop_map(|(mut map, score)| {
        map.remove("score");
        if let Some(score) = score {
            map.insert("score".into(), score);
        }
        map
    })
}

fn lookup<'a>(map: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = map.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn document(match_data: Map<String, Value>) -> Document {
    Document {
        match_data,
        ..Document::default()
    }
}

proptest! {
    #[test]
    fn apply_of_diff_rebuilds_the_new_mapping(old in mapping(), new in mapping()) {
        let ops = diff::diff("", &old, &new);
        let mut rebuilt = old.clone();
        diff::apply(&mut rebuilt, &ops);
        prop_assert_eq!(rebuilt, new);
    }

    #[test]
    fn ops_only_touch_paths_that_differ(old in mapping(), new in mapping()) {
        for op in diff::diff("", &old, &new) {
            prop_assert_ne!(lookup(&old, &op.path), lookup(&new, &op.path), "op {:?}", op);
        }
        prop_assert!(diff::diff("", &new, &new.clone()).is_empty());
    }

    #[test]
    fn extended_sequence_is_an_append(
        old in prop::collection::vec(value(), 0..5),
        tail in prop::collection::vec(value(), 0..4),
    ) {
        let mut new = old.clone();
        new.extend(tail.iter().cloned());
        let expected = if tail.is_empty() {
            SequenceDelta::Unchanged
        } else {
            SequenceDelta::Append(WagonAppend { items: tail, start_index: old.len() })
        };
        prop_assert_eq!(sequence::detect(&old, &new), expected);
    }

    #[test]
    fn score_split_and_expand_rebuild_the_document(old in match_data(), new in match_data()) {
        let path = ScorePath::new("matchData.score");
        let (old, new) = (document(old), document(new));
        let ops = diff::diff("matchData", &old.match_data, &new.match_data);

        let (rest, update) = score::split(ops, &path, &old, &new);
        if update.is_some() {
            prop_assert!(rest.iter().all(|op| !path.covers(&op.path)), "rest {:?}", rest);
        }

        let mut root = Map::new();
        root.insert("matchData".into(), Value::Object(old.match_data.clone()));
        if let Some(update) = &update {
            diff::apply(&mut root, &score::expand(&path, update));
        }
        diff::apply(&mut root, &rest);
        prop_assert_eq!(&root["matchData"], &Value::Object(new.match_data));
    }
}
