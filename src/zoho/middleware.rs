//! reqwest middleware that authorizes inventory calls
//!
//! Attaches `Authorization: Zoho-oauthtoken <token>` to every request. When
//! the upstream answers 401 the token is force-refreshed and the request is
//! replayed exactly once; a second 401 is reported as an authentication
//! failure rather than retried again.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Extensions, HeaderValue, StatusCode, header::AUTHORIZATION};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;

use crate::error::InventoryError;

use super::token::TokenManager;

/// Authorization scheme Zoho expects in place of `Bearer`
pub const AUTH_SCHEME: &str = "Zoho-oauthtoken";

/// Original attempt plus one replay after a forced refresh
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Clone)]
pub struct OAuthMiddleware {
    tokens: Arc<TokenManager>,
}

impl OAuthMiddleware {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }

    fn authorize(request: &mut Request, token: &str) -> Result<(), InventoryError> {
        let value = HeaderValue::from_str(&format!("{} {}", AUTH_SCHEME, token)).map_err(|_| {
            InventoryError::AuthFatal("access token is not a valid header value".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

#[async_trait]
impl rqm::Middleware for OAuthMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let mut token = self.tokens.get_valid_token().await?;
        let mut request = req;
        let mut attempt = 1;

        loop {
            let spare = request.try_clone();
            Self::authorize(&mut request, &token)?;

            let response = next.clone().run(request, extensions).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            let body = response.text().await.unwrap_or_default();
            if attempt >= MAX_ATTEMPTS {
                tracing::error!(attempt, "Access token rejected after refresh");
                return Err(InventoryError::AuthFatal(format!(
                    "access token rejected after refresh: {}",
                    body
                ))
                .into());
            }

            tracing::debug!(attempt, "Upstream rejected access token, forcing refresh");
            token = self.tokens.force_refresh(Some(&token)).await?;
            request = spare.ok_or_else(|| {
                InventoryError::Transport("request body is not cloneable, cannot replay".to_string())
            })?;
            attempt += 1;
        }
    }
}
