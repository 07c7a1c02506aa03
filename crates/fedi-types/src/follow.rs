use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::hash::Hash;
use crate::wire::WireItem;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// Reference metadata shared by activity-backed entities.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityMetadata {
    /// Identifier of the activity.
    pub id: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FollowRequest {
    pub hash: Hash,
    pub submitted_by: Option<Box<Account>>,
    pub object: Option<Box<Account>>,
    pub status: FollowStatus,
    pub reason: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: ActivityMetadata,
    #[serde(skip)]
    pub wire: Option<Arc<WireItem>>,
}

impl FollowRequest {
    pub fn is_pending(&self) -> bool {
        self.status == FollowStatus::Pending
    }
}

impl PartialEq for FollowRequest {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}
