use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record as stored in the backing file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(rename = "password")]
    pub password_hash: String, // Argon2 PHC string, never the plaintext
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Keys this service does not model, written back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    /// Builds a fresh record with a random id and both timestamps set to now.
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
            extra: Map::new(),
        }
    }
}
