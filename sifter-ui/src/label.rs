//! Control label rendering via a single Tera template.

use serde::Serialize;
use tera::{Context, Tera};

use sifter_core::Sifter;

use crate::error::ProjectError;

const LABEL_TEMPLATE: &str = "label";
const DEFAULT_TEMPLATE: &str = "{{ name }}";

/// Values visible to the label template.
#[derive(Debug, Serialize)]
struct LabelCtx<'a> {
    id: u64,
    name: &'a str,
    synced: String,
}

/// Compiled label template. Syntax errors surface at construction, not at
/// projection time.
pub struct LabelTemplate {
    tera: Tera,
}

impl LabelTemplate {
    pub fn new(template: &str) -> Result<Self, ProjectError> {
        let mut tera = Tera::default();
        tera.add_raw_template(LABEL_TEMPLATE, template)?;
        Ok(Self { tera })
    }

    pub fn render(&self, sifter: &Sifter) -> Result<String, ProjectError> {
        let ctx = LabelCtx {
            id: sifter.id.0,
            name: &sifter.name.0,
            synced: sifter.synced.to_string(),
        };
        let context = Context::from_serialize(&ctx)?;
        let rendered = self.tera.render(LABEL_TEMPLATE, &context)?;
        Ok(rendered.trim().to_string())
    }
}

impl Default for LabelTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE).expect("a bare variable reference always parses")
    }
}
