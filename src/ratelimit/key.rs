//! Client key generation and handling.

/// A key that uniquely identifies an independent rate limit counter.
///
/// The key is composed of a policy category and a best-effort client
/// address, so different endpoint classes never share quota.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    /// The policy category this counter belongs to (e.g. "auth")
    pub category: String,
    /// The client address portion of the key
    pub client: String,
}

impl ClientKey {
    /// Create a new client key from a category and client address.
    pub fn new(category: &str, client: &str) -> Self {
        Self {
            category: category.to_string(),
            client: client.to_string(),
        }
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.category, self.client)
    }
}
