//! Response objects and the shared response capability table

use anyhow::{anyhow, bail};
use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::framework::MimeTypes;
use crate::integration::RENDER_SLOT;
use crate::template::Template;

/// A capability installed on every response of a framework
pub type RenderFn = Arc<dyn Fn(&mut Res, &Template, &Value) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`RenderFn`]
pub fn render_fn<F>(f: F) -> RenderFn
where
    F: Fn(&mut Res, &Template, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Capability table shared by all responses created from one framework
/// instance. Clones share the same table.
#[derive(Clone, Default)]
pub struct ResponseProto {
    slots: Arc<RwLock<HashMap<String, RenderFn>>>,
}

impl std::fmt::Debug for ResponseProto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseProto")
            .field("slots", &self.names())
            .finish()
    }
}

impl ResponseProto {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<RenderFn> {
        self.slots.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.read().contains_key(name)
    }

    /// Install `make()` under `name` unless the slot is already taken.
    /// Returns whether a new function was installed.
    pub fn install_if_absent(&self, name: &str, make: impl FnOnce() -> RenderFn) -> bool {
        let mut slots = self.slots.write();
        if slots.contains_key(name) {
            return false;
        }
        slots.insert(name.to_string(), make());
        true
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.slots.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether two tables are the same shared instance
    pub fn same_table(&self, other: &ResponseProto) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots)
    }
}

/// A response under construction
pub struct Res {
    proto: ResponseProto,
    mime: Arc<MimeTypes>,
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    headers_sent: bool,
    finished: bool,
}

impl Res {
    pub fn new(proto: ResponseProto, mime: Arc<MimeTypes>) -> Self {
        Self {
            proto,
            mime,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            headers_sent: false,
            finished: false,
        }
    }

    pub fn status(&mut self, code: u16) -> anyhow::Result<&mut Self> {
        if self.headers_sent {
            bail!("Cannot set status after headers are sent");
        }
        self.status = StatusCode::from_u16(code)?;
        Ok(self)
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> anyhow::Result<&mut Self> {
        if self.headers_sent {
            bail!("Cannot set headers after they are sent");
        }
        let name = HeaderName::from_bytes(name.as_bytes())?;
        self.headers.insert(name, HeaderValue::from_str(value)?);
        Ok(self)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set the content type from a file extension (`html`, `json`, ...)
    pub fn set_type(&mut self, ext: &str) -> anyhow::Result<&mut Self> {
        let content_type = self.mime.lookup(ext);
        self.set_header(CONTENT_TYPE.as_str(), content_type)
    }

    /// Stream a chunk of the body; headers count as sent afterwards
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) {
        self.headers_sent = true;
        self.body.extend_from_slice(chunk.as_ref());
    }

    pub fn end(&mut self, chunk: impl AsRef<[u8]>) {
        self.write(chunk);
        self.finished = true;
    }

    /// End the response with an HTML body
    pub fn send(&mut self, body: impl AsRef<[u8]>) -> anyhow::Result<()> {
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.set_type("html")?;
        }
        self.end(body);
        Ok(())
    }

    /// Invoke an installed capability
    pub fn call(&mut self, slot: &str, template: &Template, data: &Value) -> anyhow::Result<()> {
        let f = self
            .proto
            .get(slot)
            .ok_or_else(|| anyhow!("res.{} is not a function", slot))?;
        f(self, template, data)
    }

    /// Render a template through the installed render capability
    pub fn render(&mut self, template: &Template, data: &Value) -> anyhow::Result<()> {
        self.call(RENDER_SLOT, template, data)
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
