//! Access control list middleware for the settlement server.
//! This middleware can be placed on any route or service.
//!
//! It checks the claims that [`super::JwtAuthMiddlewareFactory`] placed in the request against the roles allowed on
//! the route. A request is let through if its token holds at least one of them. Unauthenticated requests get a 401
//! response, and authenticated ones without a permitted role a 403.

use std::{future::Future, pin::Pin, rc::Rc};

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
    HttpMessage,
};
use futures::future::{ok, Ready};
use log::*;

use crate::{
    auth::{JwtClaims, Role},
    errors::{AuthError, ServerError},
};

pub struct AclMiddlewareFactory {
    allowed_roles: Vec<Role>,
}

impl AclMiddlewareFactory {
    pub fn new(allowed_roles: &[Role]) -> Self {
        AclMiddlewareFactory { allowed_roles: allowed_roles.to_vec() }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AclMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = AclMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AclMiddlewareService { allowed_roles: self.allowed_roles.clone(), service: Rc::new(service) })
    }
}

pub struct AclMiddlewareService<S> {
    allowed_roles: Vec<Role>,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AclMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let allowed_roles = self.allowed_roles.clone();
        Box::pin(async move {
            let jwt_claims = req
                .extensions()
                .get::<JwtClaims>()
                .ok_or_else(|| {
                    debug!("🔐️ No access token on request to {}", req.path());
                    ServerError::AuthenticationError(AuthError::MissingToken)
                })?
                .clone();
            if allowed_roles.iter().any(|role| jwt_claims.has_role(*role)) {
                service.call(req).await
            } else {
                debug!("🔐️ {} lacks the roles for {}", jwt_claims.sub, req.path());
                Err(ServerError::AuthenticationError(AuthError::InsufficientPermissions(format!(
                    "One of {allowed_roles:?} is required"
                )))
                .into())
            }
        })
    }
}
