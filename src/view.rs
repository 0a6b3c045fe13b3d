use chrono::{TimeZone, Utc};

use crate::error::ApiError;
use crate::models::Paste;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn from_query(theme: Option<&str>) -> Self {
        match theme {
            Some("light") => Theme::Light,
            _ => Theme::Dark,
        }
    }

    fn colors(self) -> (&'static str, &'static str) {
        match self {
            Theme::Dark => ("#1e1e1e", "#d4d4d4"),
            Theme::Light => ("#ffffff", "#1e1e1e"),
        }
    }
}

/// Render a paste as a standalone HTML page. ANSI colors in the content are
/// kept; everything else is escaped.
pub fn render_page(paste: &Paste, theme: Theme) -> crate::ApiResult<String> {
    let name = escape(&paste.name)?;
    let mime = escape(&paste.mime)?;
    let content = escape(&paste.content)?;
    let (background, foreground) = theme.colors();
    let expires = match paste.expires.and_then(|secs| Utc.timestamp_opt(secs, 0).single()) {
        Some(at) => format!("expires {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => "never expires".to_owned(),
    };

    Ok(format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{name}</title>
<style>
body {{ margin: 0; background: {background}; color: {foreground}; font-family: monospace; }}
header {{ padding: 0.5em 1em; opacity: 0.7; }}
header a {{ color: inherit; }}
pre {{ margin: 0; padding: 1em; white-space: pre-wrap; word-wrap: break-word; }}
</style>
</head>
<body>
<header>{name} &middot; {mime} &middot; {expires} &middot; <a href="/{name}/raw">raw</a> &middot; <a href="/{name}/meta">meta</a></header>
<pre>{content}</pre>
</body>
</html>
"#
    ))
}

fn escape(text: &str) -> crate::ApiResult<String> {
    ansi_to_html::convert_escaped(text)
        // drop stray escape characters the converter could not make sense of
        .or_else(|_| ansi_to_html::convert_escaped(&text.replace('\x1b', "")))
        .map_err(|e| ApiError::Internal(format!("failed to render paste: {e:?}")))
}
