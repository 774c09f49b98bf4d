//! Bearer token authentication.
//!
//! Wrap the application in this middleware to authenticate requests. If an `Authorization: Bearer <token>` header is
//! present, the token is validated and its claims are placed in the request extensions, where the ACL middleware and
//! the [`JwtClaims`] extractor find them. Requests without the header are passed through untouched, since some routes
//! (the health check, gateway webhooks) are public. A header carrying an invalid token is rejected outright.
use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error,
    HttpMessage,
};
use futures::future::LocalBoxFuture;
use log::*;

use crate::{
    auth::{validate_token, JwtClaims},
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

pub struct JwtAuthMiddlewareFactory {
    config: AuthConfig,
}

impl JwtAuthMiddlewareFactory {
    pub fn new(config: AuthConfig) -> Self {
        JwtAuthMiddlewareFactory { config }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = JwtAuthMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService { config: self.config.clone(), service: Rc::new(service) }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    config: AuthConfig,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let claims = match req.headers().get(AUTHORIZATION) {
            None => None,
            Some(header) => match bearer_claims(header.to_str().ok(), &self.config) {
                Ok(claims) => Some(claims),
                Err(e) => {
                    debug!("🔐️ Rejecting request to {}. {e}", req.path());
                    return Box::pin(async move { Err(ServerError::AuthenticationError(e).into()) });
                },
            },
        };
        Box::pin(async move {
            if let Some(claims) = claims {
                trace!("🔐️ Authenticated {} for {}", claims.sub, req.path());
                req.extensions_mut().insert(claims);
            }
            service.call(req).await
        })
    }
}

fn bearer_claims(header: Option<&str>, config: &AuthConfig) -> Result<JwtClaims, AuthError> {
    let token = header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::PoorlyFormattedToken("Expected 'Bearer <token>'".to_string()))?;
    validate_token(token, config)
}
