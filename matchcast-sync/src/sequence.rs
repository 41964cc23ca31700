//! Append detection for the wagon sequence.

use serde_json::Value;

use matchcast_core::{Update, WagonAppend};

/// Classification of a change from an old to a new sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceDelta {
    /// Same length, same elements.
    Unchanged,
    /// Old sequence is a prefix of the new one; only the tail is new.
    Append(WagonAppend),
    /// Anything else: an element was removed, reordered or modified.
    Replace(Vec<Value>),
}

impl SequenceDelta {
    /// The update to queue, if any.
    pub fn into_update(self) -> Option<Update> {
        match self {
            SequenceDelta::Unchanged => None,
            SequenceDelta::Append(append) => Some(Update::WagonAppend(append)),
            SequenceDelta::Replace(items) => Some(Update::WagonUpdate(items)),
        }
    }
}

/// Compare `old` and `new` element-by-element (structural equality).
pub fn detect(old: &[Value], new: &[Value]) -> SequenceDelta {
    let is_prefix = new.len() >= old.len() && old.iter().zip(new).all(|(a, b)| a == b);
    if !is_prefix {
        return SequenceDelta::Replace(new.to_vec());
    }
    if new.len() == old.len() {
        return SequenceDelta::Unchanged;
    }
    SequenceDelta::Append(WagonAppend {
        items: new[old.len()..].to_vec(),
        start_index: old.len(),
    })
}
