// Delta engine seam for the state stream
//
// Mutation entries carry structural diffs rather than full states. The diff
// engine itself is external (RFC 6902 JSON Patch via the `json-patch`
// crate); this module is the only place that talks to it. The engine
// contract the rest of the crate relies on is
// `apply(before, build(before, after)) == after`.

use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::state::StateData;

/// A structural diff between two document states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delta(Patch);

impl Delta {
    /// Build the delta that transforms `before` into `after`
    pub fn build(before: &StateData, after: &StateData) -> Self {
        Self(json_patch::diff(&before.to_value(), &after.to_value()))
    }

    /// Apply this delta to a state, returning the resulting state
    ///
    /// The input state is not modified; application works on a deep copy.
    pub fn apply(&self, state: &StateData) -> Result<StateData> {
        let mut document = state.to_value();
        json_patch::patch(&mut document, &self.0)
            .map_err(|err| Error::Delta(format!("failed to apply delta: {}", err)))?;
        StateData::from_value(document)
    }

    /// Parse a delta from its JSON representation
    pub fn from_value(value: Value) -> Result<Self> {
        let patch: Patch = serde_json::from_value(value)
            .map_err(|err| Error::Delta(format!("failed to parse delta: {}", err)))?;
        Ok(Self(patch))
    }

    /// Whether the delta contains no operations
    pub fn is_empty(&self) -> bool {
        self.0 .0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_apply_round_trip() -> Result<()> {
        let before = StateData::from_json(r#"{"test": 1, "keep": "same"}"#)?;
        let after = StateData::from_json(r#"{"test": 3, "keep": "same", "test2": 4}"#)?;
        let delta = Delta::build(&before, &after);
        assert_eq!(delta.apply(&before)?, after);
        Ok(())
    }

    #[test]
    fn test_inverse_delta_rewinds() -> Result<()> {
        let before = StateData::from_json(r#"{"test": ["before"]}"#)?;
        let after = StateData::from_json(r#"{"test": ["after"]}"#)?;
        let forward = Delta::build(&before, &after);
        let inverse = Delta::build(&after, &before);
        let advanced = forward.apply(&before)?;
        assert_eq!(inverse.apply(&advanced)?, before);
        Ok(())
    }

    #[test]
    fn test_equal_states_build_empty_delta() -> Result<()> {
        let state = StateData::from_json(r#"{"a": {"b": [1, 2]}}"#)?;
        let delta = Delta::build(&state, &state.clone());
        assert!(delta.is_empty());
        assert_eq!(delta.apply(&state)?, state);
        Ok(())
    }

    #[test]
    fn test_apply_failure_surfaces_as_delta_error() -> Result<()> {
        // A replace on a path that does not exist fails inside the engine.
        let delta = Delta::from_value(json!([
            {"op": "replace", "path": "/missing/deep", "value": 1}
        ]))?;
        let state = StateData::new();
        match delta.apply(&state) {
            Err(Error::Delta(_)) => Ok(()),
            other => panic!("expected a delta failure, got {:?}", other),
        }
    }

    #[test]
    fn test_array_index_delta() -> Result<()> {
        let state = StateData::from_json(r#"{"test": ["before"]}"#)?;
        let delta = Delta::from_value(json!([
            {"op": "replace", "path": "/test/0", "value": "after"}
        ]))?;
        let next = delta.apply(&state)?;
        assert_eq!(next.get("test"), Some(&json!(["after"])));
        Ok(())
    }
}
