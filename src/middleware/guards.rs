use std::{marker::PhantomData, sync::Arc};

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    auth::{AccessClaims, RequiredRole},
    edge::cookies::{ACCESS_COOKIE, bearer_token, read_cookie},
    error::AppError,
    state::AppState,
};

// Claims placed by the session guard win; otherwise the bearer header, then
// the access cookie, is verified.
impl FromRequestParts<Arc<AppState>> for AccessClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(claims) = parts.extensions.get::<AccessClaims>().cloned() {
            return Ok(claims);
        }

        let token = bearer_token(&parts.headers)
            .or_else(|| read_cookie(&parts.headers, ACCESS_COOKIE))
            .ok_or_else(|| AppError::unauthorized("Missing access token"))?;
        let claims = state.tokens.verify_access(&token)?;

        parts.extensions.insert(claims.clone());
        Ok(claims)
    }
}

pub type AuthGuard = AccessClaims;

pub struct AuthRoleGuard<R: RequiredRole> {
    pub claims: AccessClaims,
    _marker: PhantomData<R>,
}

impl<R> FromRequestParts<Arc<AppState>> for AuthRoleGuard<R>
where
    R: RequiredRole,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let claims = AccessClaims::from_request_parts(parts, state).await?;

        if !claims.role.allows(R::required()) {
            return Err(AppError::forbidden("Missing required role"));
        }

        Ok(Self {
            claims,
            _marker: PhantomData,
        })
    }
}
