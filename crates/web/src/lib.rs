//! Autotest Web
//!
//! The web-framework side of the harness: a framework module whose response
//! objects carry a shared capability table, an `App` builder on top of axum,
//! a handlebars-backed template loader, and the integration entry point that
//! installs template rendering onto the framework's responses.

pub mod app;
pub mod error;
pub mod framework;
pub mod integration;
pub mod response;
pub mod server;
pub mod template;

pub use app::{catch_all, controller, error_handler, App, Controller, ErrorHandler, Flow, Req};
pub use error::{WebError, WebResult};
pub use framework::{require_framework, Framework, FrameworkModule, MimeTypes};
pub use integration::{
    install_on, resolver_fn, CacheResolver, FrameworkResolver, Integration, OverridableResolver,
    OverrideGuard, RENDER_SLOT,
};
pub use response::{render_fn, RenderFn, Res, ResponseProto};
pub use server::{ServerEvent, ServerEvents, ServerHandle};
pub use template::{LoadOptions, Template};
