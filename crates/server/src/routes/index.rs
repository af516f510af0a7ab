// crates/server/src/routes/index.rs
//! Landing page.
//!
//! - GET / — HTML page with a button that starts an upload and lists its phases

use std::sync::Arc;

use axum::response::Html;
use axum::routing::get;
use axum::Router;
use minijinja::{context, Environment};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const INDEX_TEMPLATE: &str = include_str!("../../templates/index.html");

/// Values shown on the landing page.
#[derive(Debug, Clone)]
pub struct IndexPage {
    pub title: String,
    pub message: String,
}

impl Default for IndexPage {
    fn default() -> Self {
        Self {
            title: "Batch Upload".to_string(),
            message: "Hello, world!".to_string(),
        }
    }
}

impl IndexPage {
    /// Render the page. Values are HTML-escaped.
    pub fn render(&self) -> Result<String, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("index.html", INDEX_TEMPLATE)?;
        env.get_template("index.html")?.render(context! {
            title => self.title,
            message => self.message,
        })
    }
}

/// GET / — Render the landing page.
async fn index() -> ApiResult<Html<String>> {
    IndexPage::default()
        .render()
        .map(Html)
        .map_err(|e| ApiError::Internal(format!("failed to render index page: {e}")))
}

/// Build the index router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(index))
}
