//! Caller wallet identity.
//!
//! An upstream authentication layer may insert a [`WalletIdentity`] request
//! extension; otherwise the `x-wallet-address` header is used.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::core::types::WalletAddress;

use super::errors::ApiError;

/// Header carrying the caller's wallet address.
pub const WALLET_ADDRESS_HEADER: &str = "x-wallet-address";

/// The authenticated wallet making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletIdentity(pub WalletAddress);

impl<S: Send + Sync> FromRequestParts<S> for WalletIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(identity) = parts.extensions.get::<WalletIdentity>() {
            return Ok(identity.clone());
        }

        parts
            .headers
            .get(WALLET_ADDRESS_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| WalletAddress::new(value).ok())
            .map(WalletIdentity)
            .ok_or_else(|| ApiError::BadRequest("No wallet address provided".to_string()))
    }
}
