// Routing system for HTTP requests

use crate::error::ApiError;
use crate::http::{HttpRequest, HttpResponse};
use http::Method;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A route handler function type
pub type HandlerFn = Arc<
    dyn Fn(HttpRequest) -> Pin<Box<dyn Future<Output = Result<HttpResponse, ApiError>> + Send>>
        + Send
        + Sync,
>;

/// Route definition with handler. `method: None` matches every method.
#[derive(Clone)]
pub struct Route {
    pub method: Option<Method>,
    pub path: String,
    pub handler: HandlerFn,
}

/// Router for managing routes and dispatching requests
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route. Path segments starting with `:` capture a parameter.
    pub fn add<F, Fut>(&mut self, method: Option<Method>, path: &str, handler: F)
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, ApiError>> + Send + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            handler: Arc::new(move |request| Box::pin(handler(request))),
        });
    }

    pub fn get<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, ApiError>> + Send + 'static,
    {
        self.add(Some(Method::GET), path, handler);
        self
    }

    pub fn post<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, ApiError>> + Send + 'static,
    {
        self.add(Some(Method::POST), path, handler);
        self
    }

    pub fn put<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, ApiError>> + Send + 'static,
    {
        self.add(Some(Method::PUT), path, handler);
        self
    }

    pub fn patch<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, ApiError>> + Send + 'static,
    {
        self.add(Some(Method::PATCH), path, handler);
        self
    }

    pub fn delete<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, ApiError>> + Send + 'static,
    {
        self.add(Some(Method::DELETE), path, handler);
        self
    }

    pub fn any<F, Fut>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, ApiError>> + Send + 'static,
    {
        self.add(None, path, handler);
        self
    }

    /// Dispatch to the first matching route.
    ///
    /// A path that matches only under other methods answers 405.
    pub async fn route(&self, mut request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut path_matched = false;

        for route in &self.routes {
            let Some(params) = match_path(&route.path, &request.path) else {
                continue;
            };
            if route.method.as_ref().is_some_and(|m| *m != request.method) {
                path_matched = true;
                continue;
            }

            request.path_params = params;
            return (route.handler)(request).await;
        }

        if path_matched {
            Err(ApiError::new(
                http::StatusCode::METHOD_NOT_ALLOWED,
                format!("Method {} not allowed on {}", request.method, request.path),
            ))
        } else {
            Err(ApiError::not_found(format!("No route for {}", request.path)))
        }
    }
}

/// Match a route path pattern against a request path.
/// Captured segments are percent-decoded.
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();

    for (pattern_part, path_part) in pattern_parts.iter().zip(path_parts.iter()) {
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            let value = urlencoding::decode(path_part).ok()?;
            params.insert(param_name.to_string(), value.into_owned());
        } else if pattern_part != path_part {
            return None;
        }
    }

    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_handler(_req: HttpRequest) -> impl Future<Output = Result<HttpResponse, ApiError>> {
        async { Ok(HttpResponse::ok()) }
    }

    #[test]
    fn test_match_path_with_param() {
        let params = match_path("/v1/clients/:name", "/v1/clients/acme").unwrap();
        assert_eq!(params.get("name"), Some(&"acme".to_string()));
    }

    #[test]
    fn test_match_path_multiple_params() {
        let params = match_path("/v1/hooks/:client/:identifier", "/v1/hooks/acme/orders").unwrap();
        assert_eq!(params.get("client"), Some(&"acme".to_string()));
        assert_eq!(params.get("identifier"), Some(&"orders".to_string()));
    }

    #[test]
    fn test_match_path_no_match() {
        assert!(match_path("/v1/clients/:name", "/v1/hooks/acme").is_none());
        assert!(match_path("/v1/hooks", "/v1/hooks/acme").is_none());
    }

    #[test]
    fn test_match_path_decodes_params() {
        let params = match_path(
            "/v1/hookByUUID/:reference",
            "/v1/hookByUUID/http%3A%2F%2Flocalhost%3A12840%2Fh%2Fabc",
        )
        .unwrap();
        assert_eq!(
            params.get("reference"),
            Some(&"http://localhost:12840/h/abc".to_string())
        );
    }

    #[tokio::test]
    async fn test_route_dispatch() {
        let router = Router::new()
            .get("/v1/clients", ok_handler)
            .any("/h/:uuid", |req: HttpRequest| async move {
                Ok(HttpResponse::ok().with_text(req.param("uuid").unwrap_or_default().to_string()))
            });

        let response = router
            .route(HttpRequest::new(Method::PATCH, "/h/abc"))
            .await
            .unwrap();
        assert_eq!(response.body.as_ref(), b"abc");

        let response = router
            .route(HttpRequest::new(Method::GET, "/v1/clients"))
            .await
            .unwrap();
        assert_eq!(response.status, http::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_route_not_found_and_method_not_allowed() {
        let router = Router::new().get("/v1/clients", ok_handler);

        let err = router
            .route(HttpRequest::new(Method::GET, "/nope"))
            .await
            .unwrap_err();
        assert_eq!(err.status, http::StatusCode::NOT_FOUND);

        let err = router
            .route(HttpRequest::new(Method::DELETE, "/v1/clients"))
            .await
            .unwrap_err();
        assert_eq!(err.status, http::StatusCode::METHOD_NOT_ALLOWED);
    }
}
