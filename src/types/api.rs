use serde::{Deserialize, Serialize};

use crate::models::{NewPaste, Paste};

/// Query string of an upload.
#[derive(Debug, Default, Deserialize)]
pub struct CreateParams {
    pub expires: Option<String>,
    /// Present (with any value) when the client wants plain text back.
    #[serde(rename = "textOnly")]
    pub text_only: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewParams {
    pub theme: Option<String>,
}

/// Body of a successful upload. The only place a delete token is ever sent.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPaste {
    pub name: String,
    pub url: Option<String>,
    pub expires: Option<i64>,
    #[serde(rename = "type")]
    pub mime: String,
    pub delete_token: String,
}

impl CreatedPaste {
    pub fn new(paste: NewPaste, url: Option<String>) -> Self {
        CreatedPaste {
            name: paste.name,
            url,
            expires: paste.expires,
            mime: paste.mime,
            delete_token: paste.delete_token,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PasteMeta {
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub mime: String,
    pub expires: Option<i64>,
}

impl From<Paste> for PasteMeta {
    fn from(paste: Paste) -> Self {
        PasteMeta {
            name: paste.name,
            content: paste.content,
            mime: paste.mime,
            expires: paste.expires,
        }
    }
}
