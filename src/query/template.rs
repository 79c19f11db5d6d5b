use handlebars::Handlebars;
use log::{debug, trace};

use crate::ghgql_error::GhQueryError;
use crate::github::json::payload::Variables;
use crate::nested;

const QUERY_TEMPLATE_NAME: &str = "query";

/// A query whose text is a Handlebars template, ie: to repeat a block once per repository.
pub struct QueryTemplate {
    name: String,
    template: String,
}

impl QueryTemplate {
    /// Initializes a [`QueryTemplate`] with the raw template text; `name` only shows up in errors.
    pub fn from(name: &str, template: &str) -> Self {
        QueryTemplate {
            name: name.to_string(),
            template: template.to_string(),
        }
    }

    /// Renders the query text. Unknown placeholders are an error, and nothing is HTML-escaped (quotes are
    /// meaningful in GraphQL).
    pub fn render(&self, data: &Variables) -> Result<String, GhQueryError> {
        debug!("Rendering query template [{}]...", self.name);

        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);

        handlebars.register_template_string(QUERY_TEMPLATE_NAME, &self.template).map_err(|e| {
            trace!("Error = {:?}", e);
            GhQueryError::TemplateRenderError {
                msg: format!("Error parsing query template [{}].", self.name),
                nested: nested!(e),
            }
        })?;

        handlebars.render(QUERY_TEMPLATE_NAME, data).map_err(|e| {
            trace!("Error = {:?}", e);
            GhQueryError::TemplateRenderError {
                msg: format!("Error rendering query template [{}].", self.name),
                nested: nested!(e),
            }
        })
    }
}
