use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{Map, Value};
use tracing::{instrument, warn};

use crate::{
    error::{AppError, MSG_INVALID_BODY},
    state::AppState,
    users::{
        dto::{CreateUserRequest, CreatedUserResponse},
        services::{register_user, NewUser},
    },
};

pub const MSG_CREATED: &str = "Usuário cadastrado com sucesso!";

pub fn users_routes() -> Router<AppState> {
    Router::new().route("/users", post(create_user))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<Map<String, Value>>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedUserResponse>), AppError> {
    let Json(object) = payload.map_err(|e| {
        warn!(error = %e, "unreadable create user body");
        AppError::Validation(MSG_INVALID_BODY.into())
    })?;
    let payload = CreateUserRequest::from_object(object).map_err(|e| {
        warn!(error = %e, "create user body has wrongly typed fields");
        AppError::Validation(MSG_INVALID_BODY.into())
    })?;

    let input = NewUser::try_from(payload).inspect_err(|_| warn!("missing required fields"))?;
    let user = register_user(&state.users, input).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedUserResponse {
            mensagem: MSG_CREATED.into(),
            usuario: user.into(),
        }),
    ))
}
