//! Template expansion for configuration documents
//!
//! Documents are rendered through Tera before parsing, with every process
//! environment variable exposed as a template variable. This lets a document
//! say `subnet: "{{ BAKE_SUBNET }}"` and be filled in per environment.

use crate::error::{ConfigError, Result};
use std::path::Path;
use tera::{Context, Tera};

/// Load and render a templated document
pub fn render_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut context = Context::new();
    for (key, value) in std::env::vars() {
        context.insert(key, &value);
    }

    Tera::one_off(&raw, &context, false).map_err(|e| ConfigError::Template {
        path: path.to_path_buf(),
        message: describe(&e),
    })
}

/// Flatten a Tera error chain into one message; the inner parse errors
/// carry the line and column information
fn describe(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
