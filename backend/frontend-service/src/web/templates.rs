//! Embedded handlebars pages

use handlebars::{Handlebars, RenderError, TemplateError};
use serde::Serialize;

pub const HOME: &str = "home";
pub const ABOUT: &str = "about";
pub const CONFIRMATION: &str = "confirmation";
pub const DECRYPTION: &str = "decryption";
pub const NOT_FOUND: &str = "404";

const SOURCES: [(&str, &str); 7] = [
    ("header", include_str!("../../templates/partials/header.hbs")),
    ("footer", include_str!("../../templates/partials/footer.hbs")),
    (HOME, include_str!("../../templates/home.hbs")),
    (ABOUT, include_str!("../../templates/about.hbs")),
    (CONFIRMATION, include_str!("../../templates/confirmation.hbs")),
    (DECRYPTION, include_str!("../../templates/decryption.hbs")),
    (NOT_FOUND, include_str!("../../templates/404.hbs")),
];

pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        for (name, source) in SOURCES {
            registry.register_template_string(name, source)?;
        }
        Ok(Self { registry })
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String, RenderError> {
        self.registry.render(name, data)
    }
}
