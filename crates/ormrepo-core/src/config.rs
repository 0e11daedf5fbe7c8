//! Repository configuration.

/// Paging and caching settings for repositories and sessions.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Page size used when a caller does not supply one.
    pub default_page_size: u32,

    /// Largest page size a caller may request.
    pub max_page_size: u32,

    /// Maximum number of resolved query descriptors kept in the cache.
    pub descriptor_cache_capacity: usize,

    /// Stamp created/modified columns on audited entities.
    pub auditing: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 2000,
            descriptor_cache_capacity: 1024,
            auditing: true,
        }
    }
}

impl RepositoryConfig {
    /// Set the default page size.
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size;
        self
    }

    /// Set the maximum page size.
    pub fn with_max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size;
        self
    }

    /// Set the descriptor cache capacity.
    pub fn with_descriptor_cache_capacity(mut self, capacity: usize) -> Self {
        self.descriptor_cache_capacity = capacity;
        self
    }

    /// Enable or disable auditing.
    pub fn with_auditing(mut self, enabled: bool) -> Self {
        self.auditing = enabled;
        self
    }
}
