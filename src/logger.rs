use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use log::{info, warn};
use std::rc::Rc;
use std::time::Instant;

/// Paths whose query string can carry a secret
const REDACTED_QUERY_PATHS: [&str; 2] = ["/confirm", "/token"];

fn loggable_query(path: &str, query: &str) -> Option<String> {
    if query.is_empty() {
        None
    } else if REDACTED_QUERY_PATHS.contains(&path) {
        Some("[redacted]".to_string())
    } else {
        Some(query.to_string())
    }
}

/// One line when a request arrives and one when it leaves
///
/// Written through `log`; the tracing subscriber picks these up via its
/// `log` bridge.
pub struct LoggerMiddleware;

impl<S, B> Transform<S, ServiceRequest> for LoggerMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = LoggerMiddlewareService<S>;
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(LoggerMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct LoggerMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for LoggerMiddlewareService<S>
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
        let started = Instant::now();
        let line = RequestLine {
            method: req.method().to_string(),
            target: match loggable_query(req.path(), req.query_string()) {
                Some(query) => format!("{}?{}", req.path(), query),
                None => req.path().to_string(),
            },
            peer: req
                .connection_info()
                .realip_remote_addr()
                .unwrap_or("-")
                .to_string(),
        };
        info!("--> {} {} peer={}", line.method, line.target, line.peer);

        let service = self.service.clone();
        Box::pin(async move {
            let outcome = service.call(req).await;
            let millis = started.elapsed().as_millis();

            match &outcome {
                Ok(res) if res.status().is_server_error() => {
                    warn!("<-- {} {} {} {}ms", line.method, line.target, res.status().as_u16(), millis)
                }
                Ok(res) => {
                    info!("<-- {} {} {} {}ms", line.method, line.target, res.status().as_u16(), millis)
                }
                Err(e) => warn!(
                    "<-- {} {} {} {}ms (handler error)",
                    line.method,
                    line.target,
                    e.as_response_error().status_code().as_u16(),
                    millis
                ),
            }
            outcome
        })
    }
}

struct RequestLine {
    method: String,
    target: String,
    peer: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_query_is_redacted() {
        assert_eq!(
            loggable_query("/confirm", "token=abc"),
            Some("[redacted]".to_string())
        );
    }

    #[test]
    fn test_ordinary_query_is_kept() {
        assert_eq!(
            loggable_query("/users", "page=2"),
            Some("page=2".to_string())
        );
        assert_eq!(loggable_query("/users", ""), None);
    }
}
