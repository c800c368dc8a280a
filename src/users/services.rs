use tracing::{info, instrument, warn};

use crate::users::{
    dto::CreateUserRequest,
    password::{hash_password_blocking, PasswordError},
    repo::{StoreError, UserStore},
    repo_types::User,
};

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("name, email and password are required")]
    MissingFields,
    #[error("email already registered")]
    EmailTaken,
    #[error("user store failure: {0}")]
    Store(#[source] StoreError),
    #[error("password hashing failure: {0}")]
    Hashing(#[from] PasswordError),
}

impl From<StoreError> for RegisterError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => RegisterError::EmailTaken,
            other => RegisterError::Store(other),
        }
    }
}

/// Validated registration input.
#[derive(Debug)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl TryFrom<CreateUserRequest> for NewUser {
    type Error = RegisterError;

    fn try_from(req: CreateUserRequest) -> Result<Self, Self::Error> {
        fn present(v: Option<String>) -> Option<String> {
            v.filter(|s| !s.is_empty())
        }
        match (present(req.name), present(req.email), present(req.password)) {
            (Some(name), Some(email), Some(password)) => Ok(Self {
                name,
                email,
                password,
            }),
            _ => Err(RegisterError::MissingFields),
        }
    }
}

/// Registers a user: uniqueness pre-check, hash, then guarded append.
///
/// Nothing is written unless every earlier step succeeded. The pre-check
/// avoids paying for a hash when the email is obviously taken; the store
/// re-checks under its write guard.
#[instrument(skip(store, input), fields(email = %input.email))]
pub async fn register_user(store: &UserStore, input: NewUser) -> Result<User, RegisterError> {
    if store.find_by_email(&input.email).await?.is_some() {
        warn!("email already registered");
        return Err(RegisterError::EmailTaken);
    }

    let password_hash = hash_password_blocking(input.password).await?;
    let user = store
        .insert(User::new(input.name, input.email, password_hash))
        .await?;

    info!(user_id = %user.id, "user registered");
    Ok(user)
}
