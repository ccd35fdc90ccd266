//! Wallet identification middleware
//!
//! Owners identify themselves with the `x-wallet-address` header. Signature
//! verification happens upstream; this layer only requires the header and
//! attaches a [`WalletContext`] to the request extensions.

use axum::{
    body::Body,
    extract::Request,
    http::HeaderName,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::ApiError;

pub const WALLET_HEADER: HeaderName = HeaderName::from_static("x-wallet-address");

/// Calling wallet extracted from the request headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletContext {
    pub wallet_address: String,
}

pub async fn wallet_middleware(mut request: Request<Body>, next: Next) -> Response {
    let wallet = request
        .headers()
        .get(&WALLET_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let Some(wallet_address) = wallet else {
        return ApiError::bad_request(
            "missing_wallet_address",
            "x-wallet-address header is required",
        )
        .into_response();
    };

    request
        .extensions_mut()
        .insert(WalletContext { wallet_address });

    next.run(request).await
}
