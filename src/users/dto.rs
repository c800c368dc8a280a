use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::repo_types::User;

/// Request body for `POST /api/users`.
///
/// Wire names are Portuguese: `nome` -> name, `senha` -> password. Fields are
/// optional here so that a missing one is a validation failure rather than a
/// body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct CreateUserRequest {
    #[serde(rename = "nome")]
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "senha")]
    pub password: Option<String>,
}

impl CreateUserRequest {
    /// Builds the request from a JSON object. Taking a `Map` keeps the
    /// sequence form of a derived struct (`["Ana", ..]`) from being accepted.
    pub fn from_object(object: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(object))
    }
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// 201 body.
#[derive(Debug, Serialize)]
pub struct CreatedUserResponse {
    pub mensagem: String,
    pub usuario: PublicUser,
}
