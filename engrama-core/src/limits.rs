//! Input bounds enforced at the request surface

/// Maximum characters in a fragment's content
pub const MAX_CONTENT_LENGTH: usize = 10_000;

/// Maximum characters in a tenant or project name
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum number of tags on a fragment
pub const MAX_TAGS_COUNT: usize = 20;

/// Default and maximum result counts for semantic search
pub const DEFAULT_SEARCH_LIMIT: usize = 10;
/// Upper clamp for search limits
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Default and maximum result counts for list/history
pub const DEFAULT_LIST_LIMIT: usize = 100;
/// Upper clamp for list/history limits
pub const MAX_LIST_LIMIT: usize = 1000;
