//! Application builder: routes, fault handlers, and the axum router

use axum::http::Uri;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::WebResult;
use crate::framework::MimeTypes;
use crate::response::{Res, ResponseProto};
use crate::server::{ServerEvents, ServerHandle};

/// Request handler attached to a route
pub type Controller = Arc<dyn Fn(&Req, &mut Res) -> anyhow::Result<()> + Send + Sync>;

/// Fault handler; either handles the fault or forwards it down the chain
pub type ErrorHandler = Arc<dyn Fn(anyhow::Error, &Req, &mut Res) -> Flow + Send + Sync>;

pub enum Flow {
    Handled,
    Next(anyhow::Error),
}

pub fn controller<F>(f: F) -> Controller
where
    F: Fn(&Req, &mut Res) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn error_handler<F>(f: F) -> ErrorHandler
where
    F: Fn(anyhow::Error, &Req, &mut Res) -> Flow + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Forward faults once headers are out, otherwise answer 500 with the
/// fault's text as the body.
pub fn catch_all() -> ErrorHandler {
    error_handler(|fault, _req, res| {
        if res.headers_sent() {
            return Flow::Next(fault);
        }
        let text = fault.to_string();
        match res.status(500) {
            Ok(res) => res.end(text),
            Err(e) => return Flow::Next(e.context(text)),
        }
        Flow::Handled
    })
}

/// Incoming request as seen by controllers
#[derive(Debug, Clone)]
pub struct Req {
    pub path: String,
}

impl Req {
    pub fn from_uri(uri: &Uri) -> Self {
        Self {
            path: uri.path().to_string(),
        }
    }
}

/// An application instance bound to one framework's response table
#[derive(Clone)]
pub struct App {
    response: ResponseProto,
    mime: Arc<MimeTypes>,
    routes: Vec<(String, Controller)>,
    error_handlers: Vec<ErrorHandler>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let paths: Vec<&str> = self.routes.iter().map(|(p, _)| p.as_str()).collect();
        f.debug_struct("App")
            .field("routes", &paths)
            .field("error_handlers", &self.error_handlers.len())
            .finish()
    }
}

impl App {
    pub fn new(response: ResponseProto, mime: Arc<MimeTypes>) -> Self {
        Self {
            response,
            mime,
            routes: Vec::new(),
            error_handlers: Vec::new(),
        }
    }

    pub fn response(&self) -> &ResponseProto {
        &self.response
    }

    /// Register a GET route
    pub fn get(&mut self, path: &str, controller: Controller) -> &mut Self {
        self.routes.push((path.to_string(), controller));
        self
    }

    /// Append a fault handler to the chain
    pub fn use_error(&mut self, handler: ErrorHandler) -> &mut Self {
        self.error_handlers.push(handler);
        self
    }

    pub fn into_router(self) -> Router {
        let dispatch = Arc::new(Dispatch {
            response: self.response,
            mime: self.mime,
            error_handlers: self.error_handlers,
        });

        let mut router = Router::new();
        let mut seen = HashSet::new();
        for (path, controller) in self.routes {
            if !path.starts_with('/') {
                warn!("Ignoring route without leading slash: {}", path);
                continue;
            }
            // First registration wins, later ones are unreachable
            if !seen.insert(path.clone()) {
                warn!("Ignoring duplicate route: {}", path);
                continue;
            }

            let dispatch = dispatch.clone();
            router = router.route(
                &path,
                get(move |uri: Uri| {
                    let dispatch = dispatch.clone();
                    let controller = controller.clone();
                    async move { dispatch.run(&controller, Req::from_uri(&uri)) }
                }),
            );
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Serve on `127.0.0.1:<port>`; port 0 picks an ephemeral port
    pub async fn listen(self, port: u16) -> WebResult<ServerHandle> {
        ServerHandle::bind(self.into_router(), port, None).await
    }

    /// Like [`App::listen`], recording open/close events
    pub async fn listen_tracked(self, port: u16, events: ServerEvents) -> WebResult<ServerHandle> {
        ServerHandle::bind(self.into_router(), port, Some(events)).await
    }
}

struct Dispatch {
    response: ResponseProto,
    mime: Arc<MimeTypes>,
    error_handlers: Vec<ErrorHandler>,
}

impl Dispatch {
    fn run(&self, controller: &Controller, req: Req) -> Response {
        let mut res = Res::new(self.response.clone(), self.mime.clone());
        if let Err(fault) = controller(&req, &mut res) {
            self.fault(fault, &req, &mut res);
        }
        res.into_response()
    }

    fn fault(&self, fault: anyhow::Error, req: &Req, res: &mut Res) {
        let mut fault = fault;
        for handler in &self.error_handlers {
            fault = match handler(fault, req, &mut *res) {
                Flow::Handled => return,
                Flow::Next(fault) => fault,
            };
        }

        if res.headers_sent() {
            // Nothing left to repair; the client gets what was written
            error!("Unhandled fault after headers were sent on {}: {:#}", req.path, fault);
            return;
        }

        error!("Unhandled fault on {}: {:#}", req.path, fault);
        if let Ok(res) = res.status(500) {
            res.end("Internal Server Error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn call(app: App, path: &str) -> (StatusCode, String) {
        let response = app
            .into_router()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn app() -> App {
        App::new(ResponseProto::new(), Arc::new(MimeTypes::default()))
    }

    #[tokio::test]
    async fn test_route_dispatch() {
        let mut app = app();
        app.get("/test", controller(|req, res| res.send(format!("path={}", req.path))));

        let (status, body) = call(app, "/test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "path=/test");
    }

    #[tokio::test]
    async fn test_catch_all_writes_fault_text() {
        let mut app = app();
        app.get("/test", controller(|_, _| anyhow::bail!("boom")));
        app.use_error(catch_all());

        let (status, body) = call(app, "/test").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "boom");
    }

    #[tokio::test]
    async fn test_catch_all_forwards_after_headers_sent() {
        let mut app = app();
        app.get(
            "/test",
            controller(|_, res| {
                res.write("partial");
                anyhow::bail!("late failure")
            }),
        );
        app.use_error(catch_all());

        let (status, body) = call(app, "/test").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "partial");
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        let mut app = app();
        app.get("/test", controller(|_, _| anyhow::bail!("first")));
        app.use_error(error_handler(|fault, _, _| Flow::Next(fault.context("wrapped"))));
        app.use_error(catch_all());

        let (status, body) = call(app, "/test").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "wrapped");
    }

    #[tokio::test]
    async fn test_unhandled_fault_defaults_to_500() {
        let mut app = app();
        app.get("/test", controller(|_, _| anyhow::bail!("secret detail")));

        let (status, body) = call(app, "/test").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Internal Server Error");
    }

    #[tokio::test]
    async fn test_duplicate_route_keeps_first() {
        let mut app = app();
        app.get("/test", controller(|_, res| res.send("first")));
        app.get("/test", controller(|_, res| res.send("second")));

        let (_, body) = call(app, "/test").await;
        assert_eq!(body, "first");
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let mut app = app();
        app.get("/test", controller(|_, res| res.send("ok")));

        let (status, _) = call(app, "/other").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
