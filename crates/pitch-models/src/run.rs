//! Run identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifies one pipeline run in logs, metrics and the result JSON.
///
/// Generated ids are UUIDv4 strings; callers may supply their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for compact log lines and file names.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map_or(self.0.len(), |(i, _)| i);
        &self.0[..end]
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for RunId {
    type Err = String;

    /// Accepts any non-blank id without whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(format!("invalid run id: {:?}", s));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique_uuids() {
        let a = RunId::new();
        assert_ne!(a, RunId::new());
        assert!(Uuid::parse_str(a.as_str()).is_ok());
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_parse_and_serialize() {
        let id: RunId = " match-42 ".parse().unwrap();
        assert_eq!(id.as_str(), "match-42");
        assert_eq!(id.short(), "match-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"match-42\"");

        assert!("".parse::<RunId>().is_err());
        assert!("two words".parse::<RunId>().is_err());
    }
}
