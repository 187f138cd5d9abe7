use crate::AppState;
use crate::commands::PlayRequest;
use crate::error::AppError;
use crate::session;

use axum::{Json, extract::State, response::IntoResponse};
use axum_extra::TypedHeader;
use axum_macros::debug_handler;
use headers::Authorization;
use headers::authorization::Bearer;
use std::sync::Arc;

/// Run one command set for the player named by the bearer identity.
#[debug_handler]
pub(crate) async fn play(
    State(state): State<Arc<AppState>>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    Json(payload): Json<PlayRequest>,
) -> Result<impl IntoResponse, AppError> {
    let identity = auth.as_ref().map(|TypedHeader(auth)| auth.token());

    let output = session::play(Arc::clone(&state.game), identity, payload).await?;

    Ok(Json(output))
}
