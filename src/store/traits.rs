//! Target resolution capability and the record behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TargetError;

/// A named forwarding destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Maps a logical target name to a destination address.
///
/// Looked up fresh for every message; implementations must not assume caching.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<String, TargetError>;
}
