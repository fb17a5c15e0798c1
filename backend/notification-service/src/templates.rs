//! Email body templates
//!
//! One handlebars template per [`TemplateKind`]. A template file on disk
//! overrides the embedded default; either way the source is screened before
//! it is compiled, and every `{{value}}` is HTML-escaped at render time.

use std::path::Path;

use handlebars::Handlebars;
use message_queue::TemplateKind;
use serde::Serialize;
use tracing::info;

use crate::config::TemplatePaths;
use crate::error::TemplateError;

pub const MAX_TEMPLATE_BYTES: usize = 10 * 1024;

const INITIAL: &str = "initial";
const REMINDER: &str = "reminder";

const EMBEDDED_INITIAL: &str = include_str!("../templates/email_template.html");
const EMBEDDED_REMINDER: &str = include_str!("../templates/reminder_email_template.html");

/// Matched case-insensitively
const FORBIDDEN: [&str; 6] = ["<script", "javascript:", "{{>", "{{~>", "{{{", "../"];

/// Values available to both templates
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmailContext {
    pub subject: String,
    pub sender_name: String,
    pub recipient_name: String,
    pub content: String,
    pub url: String,
    pub additional_info: String,
    pub site_url: String,
}

pub struct EmailTemplates {
    registry: Handlebars<'static>,
}

impl EmailTemplates {
    /// Embedded templates only
    pub fn embedded() -> Result<Self, TemplateError> {
        Self::from_sources(EMBEDDED_INITIAL, EMBEDDED_REMINDER)
    }

    pub fn load(paths: &TemplatePaths) -> Result<Self, TemplateError> {
        let initial = read_or_default(INITIAL, &paths.initial, EMBEDDED_INITIAL)?;
        let reminder = read_or_default(REMINDER, &paths.reminder, EMBEDDED_REMINDER)?;
        Self::from_sources(&initial, &reminder)
    }

    pub fn from_sources(initial: &str, reminder: &str) -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        for (name, source) in [(INITIAL, initial), (REMINDER, reminder)] {
            validate_template(name, source)?;
            registry
                .register_template_string(name, source)
                .map_err(|source| TemplateError::Compile {
                    name: name.to_string(),
                    source: Box::new(source),
                })?;
        }

        Ok(Self { registry })
    }

    pub fn render(&self, kind: TemplateKind, context: &EmailContext) -> Result<String, TemplateError> {
        let name = match kind {
            TemplateKind::Initial => INITIAL,
            TemplateKind::Reminder => REMINDER,
        };
        Ok(self.registry.render(name, context)?)
    }
}

fn read_or_default(name: &str, path: &Path, fallback: &str) -> Result<String, TemplateError> {
    if !path.exists() {
        return Ok(fallback.to_string());
    }
    let source = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
        name: name.to_string(),
        source,
    })?;
    info!(template = name, path = %path.display(), "Loaded email template from disk");
    Ok(source)
}

pub fn validate_template(name: &str, source: &str) -> Result<(), TemplateError> {
    if source.len() > MAX_TEMPLATE_BYTES {
        return Err(TemplateError::TooLarge {
            name: name.to_string(),
            size: source.len(),
            limit: MAX_TEMPLATE_BYTES,
        });
    }

    let lowered = source.to_ascii_lowercase().replace('\\', "/");
    if let Some(pattern) = FORBIDDEN.iter().find(|p| lowered.contains(*p)) {
        return Err(TemplateError::Forbidden {
            name: name.to_string(),
            pattern,
        });
    }

    Ok(())
}
