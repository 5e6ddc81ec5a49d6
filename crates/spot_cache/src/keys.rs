//! Cache key namespace: `<provider>:<category>:<region>[:<identifier>]`.
//!
//! Keeping the provider first is what lets a refresh drop a provider's whole
//! namespace with one `delete_prefix`.

use std::fmt;

pub const SPOT: &str = "spot";
pub const SPECS: &str = "specs";
pub const PRICE_HISTORY: &str = "price_history";
pub const ZONES: &str = "zones";

/// Region placeholder for data that is not regional.
pub const GLOBAL: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    provider: String,
    category: String,
    region: String,
    id: Option<String>,
}

impl CacheKey {
    pub fn new(provider: &str, category: &str, region: &str) -> Self {
        Self {
            provider: provider.to_string(),
            category: category.to_string(),
            region: region.to_string(),
            id: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.provider, self.category, self.region)?;
        if let Some(id) = &self.id {
            write!(f, ":{id}")?;
        }
        Ok(())
    }
}

/// Prefix covering every key a provider owns.
pub fn provider_prefix(provider: &str) -> String {
    format!("{provider}:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let key = CacheKey::new("aws", PRICE_HISTORY, "us-east-1").with_id("m5.large:7d");
        assert_eq!(key.to_string(), "aws:price_history:us-east-1:m5.large:7d");
        assert_eq!(CacheKey::new("gcp", SPECS, GLOBAL).to_string(), "gcp:specs:global");
    }

    #[test]
    fn test_prefixes_match_keys() {
        let key = CacheKey::new("azure", SPOT, "eastus").with_id("Linux").to_string();
        assert!(key.starts_with(&provider_prefix("azure")));
        assert!(!key.starts_with(&provider_prefix("aws")));
    }
}
