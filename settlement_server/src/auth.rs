//! Access tokens.
//!
//! Clients authenticate with an HS256 JWT in the `Authorization: Bearer <token>` header. The token carries the user id
//! (`sub`), the user's roles and, for sellers, the shops they operate. Tokens are issued by the marketplace's identity
//! service using the shared `MKT_JWT_SECRET`; this server only verifies them. [`TokenIssuer`] exists so that tooling
//! and tests can mint tokens with the same secret.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, FromRequest, HttpMessage, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode,
    encode,
    errors::ErrorKind as JwtErrorKind,
    Algorithm,
    DecodingKey,
    EncodingKey,
    Header,
    Validation,
};
use log::*;
use serde::{Deserialize, Serialize};
use settlement_engine::checkout_objects::Requester;

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Customer,
    Seller,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The user id
    pub sub: String,
    pub roles: Vec<Role>,
    /// The shops a seller operates. Empty for everyone else.
    #[serde(default)]
    pub shop_ids: Vec<i64>,
    /// Expiry, as a unix timestamp
    pub exp: i64,
}

impl JwtClaims {
    pub fn new<S: Into<String>>(sub: S, roles: Vec<Role>, shop_ids: Vec<i64>, valid_for: Duration) -> Self {
        let exp = (Utc::now() + valid_for).timestamp();
        Self { sub: sub.into(), roles, shop_ids, exp }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn operates_shop(&self, shop_id: i64) -> bool {
        self.has_role(Role::Seller) && self.shop_ids.contains(&shop_id)
    }

    /// The identity the settlement engine authorizes against. The most privileged role wins.
    pub fn requester(&self) -> Requester {
        if self.has_role(Role::Admin) {
            Requester::admin(self.sub.as_str())
        } else if self.has_role(Role::Seller) {
            Requester::seller(self.sub.as_str(), self.shop_ids.clone())
        } else {
            Requester::customer(self.sub.as_str())
        }
    }
}

/// Claims are placed in the request extensions by [`crate::middleware::JwtAuthMiddlewareFactory`]. Handlers that take
/// a `JwtClaims` argument reject unauthenticated requests.
impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = req.extensions().get::<JwtClaims>().cloned();
        ready(claims.ok_or(ServerError::AuthenticationError(AuthError::MissingToken)))
    }
}

pub fn validate_token(token: &str, config: &AuthConfig) -> Result<JwtClaims, AuthError> {
    let key = DecodingKey::from_secret(config.jwt_secret.reveal().as_bytes());
    let data = decode::<JwtClaims>(token, &key, &Validation::new(Algorithm::HS256)).map_err(|e| match e.kind() {
        JwtErrorKind::InvalidToken | JwtErrorKind::Base64(_) | JwtErrorKind::Json(_) | JwtErrorKind::Utf8(_) => {
            AuthError::PoorlyFormattedToken(e.to_string())
        },
        _ => AuthError::ValidationError(e.to_string()),
    })?;
    trace!("🔐️ Access token validated for {}", data.claims.sub);
    Ok(data.claims)
}

#[derive(Clone)]
pub struct TokenIssuer {
    key: EncodingKey,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self { key: EncodingKey::from_secret(config.jwt_secret.reveal().as_bytes()) }
    }

    pub fn issue_token(&self, claims: &JwtClaims) -> Result<String, AuthError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.key)
            .map_err(|e| AuthError::CouldNotIssueToken(e.to_string()))
    }
}
