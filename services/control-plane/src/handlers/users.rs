use axum::{body::Bytes, extract::State, http::StatusCode, Extension, Json};
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::db::{SessionFilter, StoreError};
use crate::error::ApiError;
use crate::middleware::WalletContext;
use crate::models::api::{MeResponse, RegisterUserRequest};
use crate::models::User;
use crate::orchestrator::reputation;
use crate::AppState;

/// GET /me
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(wallet): Extension<WalletContext>,
) -> Result<Json<MeResponse>, ApiError> {
    match state.store.find_user_by_wallet(&wallet.wallet_address).await? {
        Some(user) => Ok(Json(registered_view(&state, user).await?)),
        None => Ok(Json(MeResponse::unregistered(&wallet.wallet_address))),
    }
}

/// POST /me
///
/// Registers the calling wallet. Registering an existing wallet returns the
/// stored user unchanged.
pub async fn register_me(
    State(state): State<Arc<AppState>>,
    Extension(wallet): Extension<WalletContext>,
    body: Bytes,
) -> Result<(StatusCode, Json<MeResponse>), ApiError> {
    let req: RegisterUserRequest = if body.iter().all(u8::is_ascii_whitespace) {
        RegisterUserRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request("invalid_request", e.to_string()))?
    };
    if let Err(errors) = req.validate() {
        return Err(ApiError::bad_request("invalid_request", errors.to_string()));
    }

    if let Some(existing) = state.store.find_user_by_wallet(&wallet.wallet_address).await? {
        return Ok((StatusCode::OK, Json(registered_view(&state, existing).await?)));
    }

    let user = User::new(&wallet.wallet_address, req.safe_address);
    match state.store.put_user(&user).await {
        Ok(()) => {
            info!(user_id = %user.id, "registered wallet");
            Ok((StatusCode::CREATED, Json(registered_view(&state, user).await?)))
        }
        // Registered concurrently
        Err(StoreError::Duplicate(_)) => {
            let existing = state
                .store
                .find_user_by_wallet(&wallet.wallet_address)
                .await?
                .ok_or_else(|| ApiError::internal("user vanished after duplicate insert"))?;
            Ok((StatusCode::OK, Json(registered_view(&state, existing).await?)))
        }
        Err(e) => Err(e.into()),
    }
}

async fn registered_view(state: &AppState, user: User) -> Result<MeResponse, ApiError> {
    let sessions = state
        .store
        .scan_sessions(SessionFilter::User(user.id.clone()))
        .await?;
    Ok(MeResponse::registered(user, reputation(&sessions)))
}
