//! HTTP route and error-handler tables plus the dispatch algorithm that
//! consults them.
//!
//! Handlers are plain functions registered at setup and never mutated
//! afterward, so the tables are just `HashMap`s behind no lock at all once
//! construction is done — callers build a [`HandlerTable`] with
//! `route`/`on_error` and then hand it to the server, which only ever
//! reads it.

use std::collections::HashMap;

use crate::error::DispatchError;
use crate::http::{HttpRequest, HttpResponse, Method};

/// What a registered HTTP handler gets to act on instead of capturing the
/// whole server.
pub struct HandlerContext<'a> {
    pub peer_ip: &'a str,
    pub peer_service: &'a str,
}

/// A handler returns the response to send, or a status code signaling the
/// dispatcher should consult the error table instead.
pub type HandlerResult = Result<HttpResponse, u16>;
pub type Handler = Arc<dyn Fn(&HttpRequest, &HandlerContext<'_>) -> HandlerResult + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&HttpRequest, u16) -> HttpResponse + Send + Sync>;

use std::sync::Arc;

/// `method -> path -> handler` mapping plus the error-code fallback table.
#[derive(Default, Clone)]
pub struct HandlerTable {
    routes: HashMap<(Method, String), Handler>,
    errors: HashMap<u16, ErrorHandler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(
        &mut self,
        method: Method,
        path: impl Into<String>,
        handler: impl Fn(&HttpRequest, &HandlerContext<'_>) -> HandlerResult + Send + Sync + 'static,
    ) {
        self.routes.insert((method, path.into()), Arc::new(handler));
    }

    pub fn on_error(
        &mut self,
        code: u16,
        handler: impl Fn(&HttpRequest, u16) -> HttpResponse + Send + Sync + 'static,
    ) {
        self.errors.insert(code, Arc::new(handler));
    }

    fn canned_or_table(&self, req: &HttpRequest, code: u16) -> HttpResponse {
        match self.errors.get(&code) {
            Some(handler) => handler(req, code),
            None => HttpResponse::canned(code),
        }
    }

    /// Looks up the route, invokes it, and falls through to the error
    /// table on a miss or a raised status code.
    pub fn dispatch(&self, req: &HttpRequest, ctx: &HandlerContext<'_>) -> HttpResponse {
        let Some(handler) = self.routes.get(&(req.method, req.url.clone())) else {
            return self.canned_or_table(req, 404);
        };
        match handler(req, ctx) {
            Ok(response) => response,
            Err(code) => self.canned_or_table(req, code),
        }
    }
}

/// Set of paths eligible for WebSocket upgrade.
#[derive(Debug, Default, Clone)]
pub struct AllowedUpgradePaths {
    paths: std::collections::HashSet<String>,
}

impl AllowedUpgradePaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&mut self, path: impl Into<String>) {
        self.paths.insert(path.into());
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }
}

/// Maps a dispatch status code to the matching typed [`DispatchError`], for
/// callers that need the typed error form rather than the pre-rendered
/// response.
pub fn dispatch_error_for(code: u16) -> DispatchError {
    if code == 404 {
        DispatchError::RouteNotFound
    } else {
        DispatchError::HandlerRaised(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    #[test]
    fn routed_request_dispatches_to_its_handler() {
        let mut table = HandlerTable::new();
        table.route(Method::Get, "/hello", |_req, _ctx| {
            Ok(HttpResponse::new(StatusCode::Ok).with_body(b"hi".to_vec()))
        });
        let req = HttpRequest::new(Method::Get, "/hello");
        let ctx = HandlerContext {
            peer_ip: "127.0.0.1",
            peer_service: "5555",
        };
        let res = table.dispatch(&req, &ctx);
        assert_eq!(res.status, 200);
        assert_eq!(res.body, b"hi");
    }

    #[test]
    fn missing_route_is_canned_404() {
        let table = HandlerTable::new();
        let req = HttpRequest::new(Method::Post, "/x").with_body(b"abc".to_vec());
        let ctx = HandlerContext {
            peer_ip: "127.0.0.1",
            peer_service: "5555",
        };
        let res = table.dispatch(&req, &ctx);
        assert_eq!(res.status, 404);
        assert_eq!(res.body, Vec::<u8>::new());
    }

    #[test]
    fn raised_code_is_looked_up_in_error_table() {
        let mut table = HandlerTable::new();
        table.route(Method::Get, "/denied", |_req, _ctx| Err(403));
        table.on_error(403, |_req, code| {
            HttpResponse::with_code(code).with_body(b"nope".to_vec())
        });
        let req = HttpRequest::new(Method::Get, "/denied");
        let ctx = HandlerContext {
            peer_ip: "127.0.0.1",
            peer_service: "5555",
        };
        let res = table.dispatch(&req, &ctx);
        assert_eq!(res.status, 403);
        assert_eq!(res.body, b"nope");
    }

    #[test]
    fn allowed_upgrade_paths_tracks_membership() {
        let mut paths = AllowedUpgradePaths::new();
        paths.allow("/ws");
        assert!(paths.contains("/ws"));
        assert!(!paths.contains("/other"));
    }
}
