use axum::body::Bytes;
use chrono::Utc;
use tracing::{info, warn};

use crate::db::{Database, DeleteOutcome};
use crate::error::ApiError;
use crate::models::{NewPaste, Paste};
use crate::retention::validate_payload;
use crate::App;

/// Name/token pairs tried before an upload is given up on.
pub const MAX_CREATE_ATTEMPTS: usize = 5;

/// An upload as received from a client.
pub struct Upload<'a> {
    pub content_type: Option<&'a str>,
    /// Requested lifetime in seconds; `Some(0)` asks for no expiry.
    pub expires: Option<u64>,
    pub body: Bytes,
}

pub async fn create(app: &App, upload: Upload<'_>) -> crate::ApiResult<NewPaste> {
    app.retention.admit(upload.content_type)?;
    let mime = upload.content_type.unwrap_or_default().to_owned();
    let content = validate_payload(&mime, upload.body.to_vec())?;
    let expires = app
        .retention
        .expires_at(upload.expires, Utc::now().timestamp());

    let mut paste = NewPaste {
        name: String::new(),
        content,
        mime,
        expires,
        delete_token: String::new(),
    };

    for attempt in 1..=MAX_CREATE_ATTEMPTS {
        paste.name = app.retention.generate_name();
        paste.delete_token = app.retention.generate_delete_token();

        match app.database.insert_paste(&paste).await {
            Ok(()) => {
                info!(
                    "new paste: name='{}', type='{}', size={}, expires={:?}",
                    paste.name,
                    paste.mime,
                    paste.content.len(),
                    paste.expires
                );
                return Ok(paste);
            }
            Err(ApiError::DuplicateIdentifier) => {
                warn!("paste name collision (attempt {attempt}/{MAX_CREATE_ATTEMPTS})");
            }
            Err(e) => return Err(e),
        }
    }

    Err(ApiError::Internal(format!(
        "could not generate a unique paste name in {MAX_CREATE_ATTEMPTS} attempts"
    )))
}

pub async fn fetch(app: &App, name: &str) -> crate::ApiResult<Paste> {
    app.database.get_paste(name, Utc::now().timestamp()).await
}

pub async fn delete(app: &App, name: &str, token: Option<&str>) -> crate::ApiResult<()> {
    let token = token
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::DeleteTokenMissing)?;

    match app
        .database
        .delete_paste(name, token, Utc::now().timestamp())
        .await?
    {
        DeleteOutcome::Deleted => {
            info!("paste deleted: name='{name}'");
            Ok(())
        }
        DeleteOutcome::TokenMismatch => Err(ApiError::DeleteTokenInvalid),
        DeleteOutcome::NotFound => Err(ApiError::NotFound),
    }
}

pub async fn purge_expired(database: &Database) -> crate::ApiResult<u64> {
    let count = database.purge_expired(Utc::now().timestamp()).await?;

    if count > 0 {
        info!("purged {count} expired pastes");
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_app, test_app_with};

    fn upload(content_type: &'static str, expires: Option<u64>, body: &'static str) -> Upload<'static> {
        Upload {
            content_type: Some(content_type),
            expires,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn created_paste_can_be_fetched() {
        let (app, _dir) = test_app().await;
        let created = create(&app, upload("text/plain", None, "hello world"))
            .await
            .unwrap();

        let before = Utc::now().timestamp();
        let fetched = fetch(&app, &created.name).await.unwrap();
        assert_eq!(fetched.content, "hello world");
        assert_eq!(fetched.mime, "text/plain");

        let expires = fetched.expires.unwrap();
        assert!((expires - (before + 86400)).abs() <= 2, "{expires}");
    }

    #[tokio::test]
    async fn zero_expiry_is_stored_as_null() {
        let (app, _dir) = test_app().await;
        let created = create(&app, upload("text/plain", Some(0), "forever"))
            .await
            .unwrap();
        assert_eq!(fetch(&app, &created.name).await.unwrap().expires, None);
    }

    #[tokio::test]
    async fn excessive_expiry_is_clamped() {
        let (app, _dir) = test_app_with(|c| c.pastes.max_expires = Some(86400)).await;
        let before = Utc::now().timestamp();
        let created = create(&app, upload("text/plain", Some(10_000_000), "x"))
            .await
            .unwrap();

        let expires = fetch(&app, &created.name).await.unwrap().expires.unwrap();
        assert!((expires - (before + 86400)).abs() <= 2, "{expires}");
    }

    #[tokio::test]
    async fn refused_upload_creates_nothing() {
        let (app, _dir) = test_app().await;
        let result = create(&app, upload("application/octet-stream", None, "\u{1}\u{2}")).await;
        assert!(matches!(result, Err(ApiError::InvalidContentType { .. })));
        assert_eq!(app.database.count_rows().await, 0);
    }

    #[tokio::test]
    async fn invalid_json_creates_nothing() {
        let (app, _dir) = test_app().await;
        let result = create(&app, upload("application/json", None, "{oops")).await;
        assert!(matches!(result, Err(ApiError::MalformedPayload { .. })));
        assert_eq!(app.database.count_rows().await, 0);
    }

    #[tokio::test]
    async fn exhausted_name_space_is_an_internal_error() {
        let (app, _dir) = test_app_with(|c| {
            c.pastes.id_alphabet = "x".to_owned();
            c.pastes.id_length = 1;
        })
        .await;

        let first = create(&app, upload("text/plain", None, "one")).await.unwrap();
        assert_eq!(first.name, "x");

        let second = create(&app, upload("text/plain", None, "two")).await;
        assert!(matches!(second, Err(ApiError::Internal(_))));
        assert_eq!(fetch(&app, "x").await.unwrap().content, "one");
    }

    #[tokio::test]
    async fn delete_requires_matching_token() {
        let (app, _dir) = test_app().await;
        let created = create(&app, upload("text/plain", None, "bye")).await.unwrap();

        assert!(matches!(
            delete(&app, &created.name, None).await,
            Err(ApiError::DeleteTokenMissing)
        ));
        assert!(matches!(
            delete(&app, &created.name, Some("")).await,
            Err(ApiError::DeleteTokenMissing)
        ));
        assert!(matches!(
            delete(&app, &created.name, Some("nope")).await,
            Err(ApiError::DeleteTokenInvalid)
        ));
        assert!(fetch(&app, &created.name).await.is_ok());

        delete(&app, &created.name, Some(&created.delete_token))
            .await
            .unwrap();
        assert!(matches!(
            delete(&app, &created.name, Some(&created.delete_token)).await,
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            fetch(&app, &created.name).await,
            Err(ApiError::NotFound)
        ));
    }

    #[tokio::test]
    async fn purge_counts_removed_pastes() {
        let (app, _dir) = test_app().await;
        app.database
            .insert_paste(&NewPaste {
                name: "stale".to_owned(),
                content: "old".to_owned(),
                mime: "text/plain".to_owned(),
                expires: Some(Utc::now().timestamp() - 1),
                delete_token: "t".to_owned(),
            })
            .await
            .unwrap();

        assert_eq!(purge_expired(&app.database).await.unwrap(), 1);
        assert_eq!(purge_expired(&app.database).await.unwrap(), 0);
    }
}
