//! Domain model: channel identity and memory fragments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngramaError;

/// Kind of remembered content.
///
/// The engine treats this as an opaque filter label; consumers use it to
/// separate durable knowledge (`factual`, `preference`, `episodic`) from
/// conversational log (`session`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// Stable facts about the user or the world
    Factual,
    /// User preferences
    Preference,
    /// Notable events
    Episodic,
    /// Conversation messages, tied to a session
    Session,
}

impl MemoryType {
    /// Wire name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Preference => "preference",
            Self::Episodic => "episodic",
            Self::Session => "session",
        }
    }

    /// Parse a wire name; unknown names are a `bad_request`.
    ///
    /// # Errors
    ///
    /// Returns [`EngramaError::BadRequest`] for anything but the four
    /// known type names.
    pub fn parse(s: &str) -> Result<Self, EngramaError> {
        match s {
            "factual" => Ok(Self::Factual),
            "preference" => Ok(Self::Preference),
            "episodic" => Ok(Self::Episodic),
            "session" => Ok(Self::Session),
            other => Err(EngramaError::BadRequest(format!(
                "unknown memory_type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Speaker of a session message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user
    User,
    /// Model output
    Assistant,
    /// System prompt material
    System,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    /// Parse a wire name.
    ///
    /// # Errors
    ///
    /// Returns [`EngramaError::BadRequest`] for unknown role names.
    pub fn parse(s: &str) -> Result<Self, EngramaError> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(EngramaError::BadRequest(format!("unknown role: {other}"))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root of the ownership hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique identifier
    pub id: String,
    /// Unique display name
    pub name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a tenant with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A project under a tenant; `(tenant_id, name)` is unique
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Name, unique within the tenant
    pub name: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Create a project with a fresh id.
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            tenant_id: tenant_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persisted API-key record.
///
/// Holds only the hash of the secret; the secret itself is shown exactly
/// once at minting (see [`MintedApiKey`]) and never stored.
#[derive(Debug, Clone)]
pub struct ApiKey {
    /// Short public handle (prefix of the original secret)
    pub key_id: String,
    /// Hex SHA-256 of the secret; sole authentication lookup index
    pub key_hash: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Owning project
    pub project_id: String,
    /// Present on user-scoped keys; absent on project-scoped keys
    pub user_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Inactive keys never authenticate
    pub is_active: bool,
}

/// The one-time minting result: the only place the secret ever appears.
#[derive(Debug, Clone, Serialize)]
pub struct MintedApiKey {
    /// The full secret. Shown once, never retrievable afterward.
    pub key: String,
    /// Public handle for administration
    pub key_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Owning project
    pub project_id: String,
    /// End-user binding, if any
    pub user_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Key listing entry — scope and handle only, never secret or hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyListing {
    /// Public handle
    pub key_id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Owning project
    pub project_id: String,
    /// End-user binding, if any
    pub user_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Whether the key still authenticates
    pub is_active: bool,
}

/// One unit of remembered text with its metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryFragment {
    /// Unique identifier (UUID v4, simple format)
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Owning project
    pub project_id: String,
    /// Owning end user
    pub user_id: String,
    /// Filter label
    pub memory_type: MemoryType,
    /// The remembered text
    pub content: String,
    /// Speaker, set on session messages
    pub role: Option<Role>,
    /// Conversation grouping, set on session messages
    pub session_id: Option<String>,
    /// Free-form labels
    #[serde(default)]
    pub tags: Vec<String>,
    /// Caller-assigned weight in `[0, 1]`
    pub importance: f64,
    /// Times this fragment has been returned by search; monotone
    pub hit_count: u64,
    /// Arbitrary structured payload
    pub metadata: Option<Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Advanced on every mutation; `updated_at >= created_at`
    pub updated_at: DateTime<Utc>,
}

impl MemoryFragment {
    /// Scope triple of this fragment.
    #[must_use]
    pub fn scope(&self) -> crate::scope::MemoryScope {
        crate::scope::MemoryScope::new(
            self.tenant_id.clone(),
            self.project_id.clone(),
            self.user_id.clone(),
        )
    }
}

/// Generate a unique id (UUID v4 without hyphens)
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_round_trips() {
        for t in [
            MemoryType::Factual,
            MemoryType::Preference,
            MemoryType::Episodic,
            MemoryType::Session,
        ] {
            assert_eq!(MemoryType::parse(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn unknown_memory_type_is_bad_request() {
        let err = MemoryType::parse("procedural").unwrap_err();
        assert_eq!(err.kind(), "bad_request");
    }

    #[test]
    fn memory_type_serde_is_lowercase() {
        let json = serde_json::to_string(&MemoryType::Preference).unwrap();
        assert_eq!(json, "\"preference\"");
        let back: MemoryType = serde_json::from_str("\"session\"").unwrap();
        assert_eq!(back, MemoryType::Session);
    }

    #[test]
    fn generated_ids_are_unique_and_hyphen_free() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(!a.contains('-'));
    }

    #[test]
    fn fragment_serializes_timestamps_as_rfc3339() {
        let fragment = MemoryFragment {
            id: generate_id(),
            tenant_id: "t1".into(),
            project_id: "p1".into(),
            user_id: "u1".into(),
            memory_type: MemoryType::Factual,
            content: "likes tea".into(),
            role: None,
            session_id: None,
            tags: vec![],
            importance: 0.5,
            hit_count: 0,
            metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let value = serde_json::to_value(&fragment).unwrap();
        assert!(value["created_at"].as_str().unwrap().contains('T'));
        assert_eq!(value["memory_type"], "factual");
    }
}
