//! Token issuance

use std::sync::Arc;

use axum::extract::State;
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::state::AppState;
use crate::error::PipelineError;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// POST /auth/token
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Form(form): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, PipelineError> {
    if !state.auth.verify_credentials(&form.username, &form.password) {
        return Err(PipelineError::InvalidCredentials);
    }
    let access_token = state.auth.issue_token(&form.username)?;
    info!("Issued token for {}", form.username);
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}
