use crate::config::Config;
use crate::markdown::{markdown_to_ansi, markdown_to_html};

/// The usage page served at `/`.
const USAGE: &str = include_str!("../assets/index.md");

/// Usage page rendered once at startup for both browsers and terminals.
#[derive(Debug, Clone)]
pub struct LandingPage {
    pub html: String,
    pub text: String,
}

impl LandingPage {
    pub fn render(config: &Config) -> anyhow::Result<Self> {
        let source = fill_in(USAGE, config);
        let body = markdown_to_html(&source)?;

        Ok(LandingPage {
            html: format!(
                "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>tempbin</title></head>\
                 <body>{body}</body></html>\n"
            ),
            text: markdown_to_ansi(&source)?,
        })
    }
}

fn fill_in(source: &str, config: &Config) -> String {
    let url = config
        .server
        .url_prefix
        .clone()
        .unwrap_or_else(|| format!("http://localhost:{}/", config.server.port));
    let mimes = if config.pastes.allowed_mimes.is_empty() {
        "nothing else".to_owned()
    } else {
        config
            .pastes
            .allowed_mimes
            .iter()
            .map(|mime| format!("`{mime}`"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    let max_expires = config
        .pastes
        .max_expires
        .map(|max| format!(", at most {max}"))
        .unwrap_or_default();

    source
        .replace("{{url}}", &url)
        .replace("{{mimes}}", &mimes)
        .replace("{{default_expires}}", &config.pastes.default_expires.to_string())
        .replace("{{max_expires}}", &max_expires)
}
