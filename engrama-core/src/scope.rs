//! Scope triple and the key/request identity fusion rule
//!
//! An API key may or may not encode a user; a request may or may not carry
//! one. [`resolve_user_id`] fuses the two once per request; everything
//! downstream sees only the resolved [`MemoryScope`].

use serde::{Deserialize, Serialize};

use crate::error::EngramaError;

/// The `(tenant_id, project_id, user_id)` triple every memory operation is
/// bound to. No operation may cross it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryScope {
    /// Owning tenant
    pub tenant_id: String,
    /// Owning project
    pub project_id: String,
    /// Effective end user
    pub user_id: String,
}

impl MemoryScope {
    /// Build a scope triple.
    #[must_use]
    pub fn new(
        tenant_id: impl Into<String>,
        project_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            project_id: project_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.project_id, self.user_id)
    }
}

/// Resolve the effective user for a request.
///
/// Rules:
/// - a user-scoped key (with `bound`) forces its binding: a request passing
///   a different user is `forbidden`, passing the same user or nothing uses
///   the binding;
/// - a project-scoped key (no `bound`) requires the request to pass a
///   non-empty user, else `bad_request`.
///
/// Empty strings count as absent.
///
/// # Errors
///
/// [`EngramaError::Forbidden`] when a user-scoped key is applied to another
/// user; [`EngramaError::BadRequest`] when a project-scoped key omits the
/// user.
pub fn resolve_user_id(
    bound: Option<&str>,
    passed: Option<&str>,
) -> Result<String, EngramaError> {
    let bound = bound.filter(|s| !s.is_empty());
    let passed = passed.filter(|s| !s.is_empty());

    match (bound, passed) {
        (Some(bound), Some(passed)) if bound != passed => Err(EngramaError::Forbidden(format!(
            "API key is bound to user '{bound}' and cannot act on other users"
        ))),
        (Some(bound), _) => Ok(bound.to_string()),
        (None, Some(passed)) => Ok(passed.to_string()),
        (None, None) => Err(EngramaError::BadRequest(
            "user_id is required for a project-scoped API key".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_key_without_passed_uses_binding() {
        assert_eq!(resolve_user_id(Some("alice"), None).unwrap(), "alice");
    }

    #[test]
    fn bound_key_with_matching_passed_uses_binding() {
        assert_eq!(
            resolve_user_id(Some("alice"), Some("alice")).unwrap(),
            "alice"
        );
    }

    #[test]
    fn bound_key_with_other_user_is_forbidden() {
        let err = resolve_user_id(Some("alice"), Some("bob")).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn project_key_requires_passed_user() {
        let err = resolve_user_id(None, None).unwrap_err();
        assert_eq!(err.kind(), "bad_request");
        assert_eq!(resolve_user_id(None, Some("bob")).unwrap(), "bob");
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let err = resolve_user_id(None, Some("")).unwrap_err();
        assert_eq!(err.kind(), "bad_request");
        assert_eq!(resolve_user_id(Some("alice"), Some("")).unwrap(), "alice");
    }
}
