use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One certificate counted against one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceCountEntry {
    pub bucket: String,
    pub observed_at: DateTime<Utc>,
}

/// One new order counted against one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCountEntry {
    pub account_id: i64,
    pub observed_at: DateTime<Utc>,
}
