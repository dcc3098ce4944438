//! Landing page served at `/`.

use crate::error::ProxyResult;
use tera::{Context, Tera};

const HELP_TEMPLATE: &str = include_str!("../static/help.html");

/// Renders the documentation page for a deployment domain.
pub trait StaticDocProvider: Send + Sync {
    fn render(&self, domain: &str) -> ProxyResult<String>;
}

/// The page compiled into the binary; `{{ host }}` becomes the domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedDocs;

impl StaticDocProvider for EmbeddedDocs {
    fn render(&self, domain: &str) -> ProxyResult<String> {
        let mut context = Context::new();
        context.insert("host", domain);
        Ok(Tera::one_off(HELP_TEMPLATE, &context, true)?)
    }
}
