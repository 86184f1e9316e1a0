use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tag from the shared vocabulary. `text` is unique across all contacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactTag {
    pub id: i64,
    pub contact_id: i64,
    pub tag_id: i64,
    pub created_at: DateTime<Utc>,
}
