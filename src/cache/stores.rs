//! Named stores partitioning the cache database.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Database name the cache opens.
pub const DB_NAME: &str = "dashboard_cache";

/// Schema version. Bump whenever a store is added to [`StoreName::ALL`].
pub const SCHEMA_VERSION: u32 = 1;

/// Closed set of cache namespaces shared with the dashboard hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreName {
    Coaching,
    Mentorship,
    Analytics,
    Notifications,
}

impl StoreName {
    pub const ALL: [StoreName; 4] = [
        StoreName::Coaching,
        StoreName::Mentorship,
        StoreName::Analytics,
        StoreName::Notifications,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreName::Coaching => "coaching",
            StoreName::Mentorship => "mentorship",
            StoreName::Analytics => "analytics",
            StoreName::Notifications => "notifications",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreName::ALL
            .into_iter()
            .find(|store| store.as_str() == s)
            .ok_or_else(|| format!("Unknown store: {}", s))
    }
}
