//! Error types for the web layer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Template parse error in {name}: {reason}")]
    TemplateParse { name: String, reason: String },

    #[error("Failed to render template '{name}': {reason}")]
    Render { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Module(#[from] autotest_common::Error),
}

pub type WebResult<T> = Result<T, WebError>;
