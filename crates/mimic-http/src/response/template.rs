//! `text/template` response bodies rendered with minijinja.
//!
//! The rendering context exposes every request parameter by name. A parameter
//! that arrived once renders as a string, a repeated one as a list. The full
//! multi-valued map is also available as `params`.

use crate::request::Parameters;
use minijinja::{Environment, Value};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("template rendering failed: {0}")]
pub struct TemplateError(#[from] minijinja::Error);

pub type TemplateResult = Result<String, TemplateError>;

pub fn render(source: &str, parameters: &Parameters) -> TemplateResult {
    let env = Environment::new();

    let mut context: BTreeMap<String, Value> = BTreeMap::new();
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, values) in parameters {
        let value = match values.as_slice() {
            [single] => Value::from(single.clone()),
            many => Value::from(many.to_vec()),
        };
        context.insert(name.clone(), value);
        params.insert(name.clone(), values.clone());
    }
    context.insert("params".to_string(), Value::from_serialize(&params));

    Ok(env.render_str(source, context)?)
}
