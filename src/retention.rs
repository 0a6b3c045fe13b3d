//! Lifecycle decisions made before a paste touches the database: which uploads
//! are admitted, how long they live, and how they are named.

use anyhow::bail;
use rand::distributions::{Distribution, Uniform};
use rand::thread_rng;

use crate::config;
use crate::error::{ApiError, ApiResult};

/// Alphabet for delete tokens (URL-safe base64 characters).
const TOKEN_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct Retention {
    id_alphabet: Vec<char>,
    id_length: usize,
    token_alphabet: Vec<char>,
    default_expires: u64,
    max_expires: Option<u64>,
    allowed_mimes: Vec<String>,
}

impl Retention {
    pub fn new(config: &config::Pastes) -> anyhow::Result<Self> {
        let id_alphabet: Vec<char> = config.id_alphabet.chars().collect();
        if id_alphabet.is_empty() {
            bail!("paste id alphabet must not be empty");
        }
        if config.id_length == 0 {
            bail!("paste id length must be greater than zero");
        }

        Ok(Retention {
            id_alphabet,
            id_length: config.id_length,
            token_alphabet: TOKEN_ALPHABET.chars().collect(),
            default_expires: config.default_expires,
            max_expires: config.max_expires,
            allowed_mimes: config
                .allowed_mimes
                .iter()
                .map(|mime| mime.trim().to_ascii_lowercase())
                .collect(),
        })
    }

    /// Generate a fresh paste name.
    pub fn generate_name(&self) -> String {
        random_string(&self.id_alphabet, self.id_length)
    }

    /// Generate a delete token, unrelated to any name.
    pub fn generate_delete_token(&self) -> String {
        random_string(&self.token_alphabet, TOKEN_LENGTH)
    }

    /// Types advertised to clients whose upload was refused.
    pub fn supported_mimes(&self) -> Vec<String> {
        std::iter::once("text/*".to_owned())
            .chain(self.allowed_mimes.iter().cloned())
            .collect()
    }

    /// Check the declared content type of an upload.
    pub fn admit(&self, content_type: Option<&str>) -> ApiResult<()> {
        let admitted = content_type.map_or(false, |content_type| {
            let essence = media_type(content_type);
            essence.starts_with("text/") || self.allowed_mimes.iter().any(|m| *m == essence)
        });

        if admitted {
            Ok(())
        } else {
            Err(ApiError::InvalidContentType {
                supported: self.supported_mimes(),
            })
        }
    }

    /// Absolute expiry for a paste created at `now`, given the lifetime the
    /// client asked for. `None` means the paste never expires.
    pub fn expires_at(&self, requested: Option<u64>, now: i64) -> Option<i64> {
        let duration = match requested {
            None => self.default_expires,
            Some(0) => return None,
            Some(secs) => match self.max_expires {
                Some(max) if secs > max => max,
                _ => secs,
            },
        };

        if duration == 0 {
            return None;
        }

        let duration = i64::try_from(duration).unwrap_or(i64::MAX);
        Some(now.saturating_add(duration))
    }
}

/// Parse the `expires` query parameter.
pub fn parse_expires(raw: Option<&str>) -> ApiResult<Option<u64>> {
    raw.map(|raw| raw.trim().parse::<u64>().map_err(|_| ApiError::InvalidExpires))
        .transpose()
}

/// Whether a stored type can be served from the JSON view.
pub fn is_json_mime(mime: &str) -> bool {
    let essence = media_type(mime);
    essence == "application/json" || essence.ends_with("+json")
}

/// Turn an upload body into storable content, rejecting bodies that do not
/// match their declared type.
pub fn validate_payload(mime: &str, body: Vec<u8>) -> ApiResult<String> {
    let content = String::from_utf8(body).map_err(|e| ApiError::MalformedPayload {
        message: format!("Paste body is not valid UTF-8: {e}"),
    })?;

    if is_json_mime(mime) {
        if let Err(e) = serde_json::from_str::<serde::de::IgnoredAny>(&content) {
            return Err(ApiError::MalformedPayload {
                message: format!("Paste body is not valid JSON: {e}"),
            });
        }
    }

    Ok(content)
}

/// The `type/subtype` part of a content type, lowercased and without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn random_string(alphabet: &[char], length: usize) -> String {
    let mut rng = thread_rng();
    let index = Uniform::from(0..alphabet.len());
    (0..length).map(|_| alphabet[index.sample(&mut rng)]).collect()
}
