/// Access token authentication middleware
///
/// Reads the access token from `Authorization: Bearer …`, falling back to the
/// `_atk` cookie, and injects an `AuthenticatedUser` into request extensions.
/// Handlers behind it take `web::ReqData<AuthenticatedUser>`.

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::AUTHORIZATION,
    Error, HttpMessage, HttpRequest,
};
use futures::future::LocalBoxFuture;
use std::rc::Rc;
use uuid::Uuid;

use crate::auth::{TokenAuthority, TokenKind};
use crate::cookies::{read_cookie, ACCESS_COOKIE};
use crate::error::{AppError, AuthError};

/// Identity of the caller, established from a valid access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub uid: Uuid,
}

/// Bearer header first, `_atk` cookie second
pub fn access_token_from(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .or_else(|| read_cookie(req, ACCESS_COOKIE))
}

pub struct JwtMiddleware {
    authority: TokenAuthority,
}

impl JwtMiddleware {
    pub fn new(authority: TokenAuthority) -> Self {
        Self { authority }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(JwtMiddlewareService {
            service: Rc::new(service),
            authority: self.authority.clone(),
        }))
    }
}

pub struct JwtMiddlewareService<S> {
    service: Rc<S>,
    authority: TokenAuthority,
}

impl<S, B> Service<ServiceRequest> for JwtMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let Some(token) = access_token_from(req.request()) else {
            tracing::debug!(path = %req.path(), "Request without access token");
            return Box::pin(async { Err(AppError::from(AuthError::MissingToken).into()) });
        };

        match self.authority.decode(&token, TokenKind::Access) {
            Ok(uid) => {
                req.extensions_mut().insert(AuthenticatedUser { uid });
                tracing::debug!(user_id = %uid, "Access token accepted");

                let service = self.service.clone();
                Box::pin(async move { service.call(req).await })
            }
            Err(e) => {
                tracing::info!(path = %req.path(), error = %e, "Access token rejected");
                Box::pin(async move { Err(AppError::from(e).into()) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::cookie::Cookie;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_header_wins_over_cookie() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Bearer from-header"))
            .cookie(Cookie::new(ACCESS_COOKIE, "from-cookie"))
            .to_http_request();

        assert_eq!(access_token_from(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_cookie_fallback() {
        let req = TestRequest::default()
            .cookie(Cookie::new(ACCESS_COOKIE, "from-cookie"))
            .to_http_request();

        assert_eq!(access_token_from(&req).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_non_bearer_scheme_is_ignored() {
        let req = TestRequest::default()
            .insert_header((AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_http_request();

        assert_eq!(access_token_from(&req), None);
    }
}
