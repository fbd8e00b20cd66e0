use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Unique identifier for an applied mutation (UUID v7 for time-ordering).
///
/// Serialized as the hyphenated UUID string so persisted history stays
/// readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationId(uuid::Uuid);

impl MutationId {
    /// Generate a new time-ordered mutation ID (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }

    /// Short representation (first 8 characters of UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for MutationId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| TypeError::InvalidMutationId(format!("{s}: {e}")))
    }
}

impl fmt::Debug for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MutationId({})", self.short_id())
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a document, e.g. `Actor.k2j4h5` or `Scene.a.Token.b`.
///
/// Links between stack entries hold these rather than document handles;
/// they are resolved lazily when a revert walks its links.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocumentUuid(String);

impl DocumentUuid {
    /// Parse a document uuid. Empty strings and embedded whitespace are rejected.
    pub fn parse(raw: impl Into<String>) -> Result<Self, TypeError> {
        let raw = raw.into();
        if raw.is_empty() || raw.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidDocumentUuid(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DocumentUuid {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<DocumentUuid> for String {
    fn from(value: DocumentUuid) -> Self {
        value.0
    }
}

impl FromStr for DocumentUuid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for DocumentUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag naming the mutation variant that produced a stack entry.
///
/// Reverts look the tag up in a kind registry to rebuild the mutation with
/// the variant's own revert hooks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MutationKind(String);

impl MutationKind {
    /// The tag used when a mutation does not name a variant.
    pub const DEFAULT: &'static str = "mutation";

    pub fn new(tag: impl Into<String>) -> Result<Self, TypeError> {
        let tag = tag.into();
        if tag.trim().is_empty() {
            return Err(TypeError::InvalidKind(tag));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Default for MutationKind {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl TryFrom<String> for MutationKind {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MutationKind> for String {
    fn from(value: MutationKind) -> Self {
        value.0
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutation_ids_are_unique() {
        let a = MutationId::new();
        let b = MutationId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn mutation_id_parses_display_form() {
        let id = MutationId::new();
        let parsed: MutationId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(id.short_id().len(), 8);
    }

    #[test]
    fn mutation_id_rejects_garbage() {
        let err = "not-a-uuid".parse::<MutationId>().unwrap_err();
        assert!(matches!(err, TypeError::InvalidMutationId(_)));
    }

    #[test]
    fn mutation_id_serializes_as_string() {
        let id = MutationId::new();
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::Value::String(id.to_string()));
    }

    #[test]
    fn document_uuid_validation() {
        assert!(DocumentUuid::parse("Actor.abc123").is_ok());
        assert!(DocumentUuid::parse("").is_err());
        assert!(DocumentUuid::parse("Actor. abc").is_err());
    }

    #[test]
    fn document_uuid_deserialize_validates() {
        let ok: DocumentUuid = serde_json::from_str("\"Scene.x.Token.y\"").unwrap();
        assert_eq!(ok.as_str(), "Scene.x.Token.y");
        assert!(serde_json::from_str::<DocumentUuid>("\"\"").is_err());
    }

    #[test]
    fn default_kind() {
        let kind = MutationKind::default();
        assert!(kind.is_default());
        assert_eq!(kind.to_string(), "mutation");
        assert!(MutationKind::new("  ").is_err());
        assert!(!MutationKind::new("spawn").unwrap().is_default());
    }
}
