//! Cache key schema
//!
//! Key format: v{VERSION}:{entity}:{identifier}

/// Cache schema version - increment when changing key formats
pub const CACHE_VERSION: u32 = 1;

/// Cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Resource instance snapshot
    /// Format: v1:resource:{resource_id}
    pub fn resource(resource_id: &str) -> String {
        format!("v{}:resource:{}", CACHE_VERSION, resource_id)
    }

    /// Active membership count
    /// Format: v1:active_count:{resource_id}
    pub fn active_count(resource_id: &str) -> String {
        format!("v{}:active_count:{}", CACHE_VERSION, resource_id)
    }

    /// Ranked leaderboard
    /// Format: v1:leaderboard:{resource_id}
    pub fn leaderboard(resource_id: &str) -> String {
        format!("v{}:leaderboard:{}", CACHE_VERSION, resource_id)
    }

    /// Extract entity type from key
    pub fn entity_type(key: &str) -> Option<&str> {
        // Format: v{N}:{entity}:...
        let mut parts = key.split(':');
        match (parts.next(), parts.next()) {
            (Some(_), Some(entity)) => Some(entity),
            _ => None,
        }
    }
}
