use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{self, header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, ServiceExt};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::NormalizePath;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use urlencoding::encode;

use crate::config::{Config, Mode};
use crate::controllers::paste::{self, Upload};
use crate::error::{ApiError, InternalDetail};
use crate::landing::LandingPage;
use crate::purge::PurgeTask;
use crate::retention::{is_json_mime, parse_expires};
use crate::types::api::{CreateParams, CreatedPaste, PasteMeta, ViewParams};
use crate::view::{render_page, Theme};
use crate::App;


const PASTE_EXPIRES: &str = "paste_expires";
const PASTE_MIME: &str = "paste_mime";
const PASTE_DELETE_TOKEN: &str = "paste_delete_token";

pub async fn run(app: App) -> anyhow::Result<()> {
    let addr = SocketAddr::from((app.config.server.bind, app.config.server.port));
    let database = app.database.clone();
    let purge = PurgeTask::start(database.clone(), &app.config.purge);

    let server = axum::Server::try_bind(&addr)
        .with_context(|| format!("failed to bind {addr}"))?
        .serve(ServiceExt::<Request<Body>>::into_make_service(service(app)));
    info!("listening on http://{addr}");

    let result = server.with_graceful_shutdown(shutdown_signal()).await;

    if let Some(purge) = purge {
        purge.shutdown().await;
    }
    database.close().await;

    result.context("server error")
}

/// The router wrapped in the middleware that has to see requests before routing.
pub fn service(app: App) -> NormalizePath<Router> {
    NormalizePath::trim_trailing_slash(router(app))
}

pub fn router(app: App) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(PASTE_EXPIRES),
            HeaderName::from_static(PASTE_MIME),
            HeaderName::from_static(PASTE_DELETE_TOKEN),
        ]);

    Router::new()
        .route("/", get(index))
        .route("/paste", get(view_paste_named_paste).post(create_paste))
        .route("/:id", get(view_paste).delete(delete_paste_without_token))
        .route("/:id/:view", get(view_paste_as).delete(delete_paste))
        .layer(middleware::from_fn_with_state(
            app.clone(),
            expose_internal_errors,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            app.config.server.max_upload_size,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}

async fn index(State(landing): State<Arc<LandingPage>>, headers: HeaderMap) -> Response {
    let wants_html = headers
        .get(header::ACCEPT)
        .and_then(|accept| accept.to_str().ok())
        .map_or(false, |accept| accept.contains("text/html"));

    if wants_html {
        Html(landing.html.clone()).into_response()
    } else {
        landing.text.clone().into_response()
    }
}

async fn create_paste(
    State(app): State<App>,
    Query(params): Query<CreateParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let text_only = params.text_only.is_some();
    match create_paste_inner(&app, params, &headers, body).await {
        Ok(response) => response,
        Err(e) if text_only => e.into_text_response(),
        Err(e) => e.into_response(),
    }
}

async fn create_paste_inner(
    app: &App,
    params: CreateParams,
    headers: &HeaderMap,
    body: Bytes,
) -> crate::ApiResult<Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let upload = Upload {
        content_type,
        expires: parse_expires(params.expires.as_deref())?,
        body,
    };

    let paste = paste::create(app, upload).await?;

    let encoded_name = encode(&paste.name);
    let url = app
        .config
        .server
        .url_prefix
        .as_ref()
        .map(|prefix| format!("{prefix}{encoded_name}"));

    let mut response_headers = paste_headers(paste.expires, &paste.mime)?;
    response_headers.insert(
        HeaderName::from_static(PASTE_DELETE_TOKEN),
        header_value(&paste.delete_token)?,
    );
    response_headers.insert(header::LOCATION, header_value(&format!("/{encoded_name}"))?);

    if params.text_only.is_some() {
        let mut lines = format!("{}\n{}", paste.name, paste.delete_token);
        if let Some(url) = &url {
            lines.push('\n');
            lines.push_str(url);
        }
        Ok((StatusCode::CREATED, response_headers, lines).into_response())
    } else {
        Ok((
            StatusCode::CREATED,
            response_headers,
            Json(CreatedPaste::new(paste, url)),
        )
            .into_response())
    }
}

async fn delete_paste_without_token(
    State(app): State<App>,
    Path(name): Path<String>,
) -> crate::ApiResult<StatusCode> {
    paste::delete(&app, &name, None).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_paste(
    State(app): State<App>,
    Path((name, token)): Path<(String, String)>,
) -> crate::ApiResult<StatusCode> {
    paste::delete(&app, &name, Some(&token)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Representation of a paste selected by the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Html,
    Raw,
    Json,
    Meta,
}

impl View {
    /// Split `NAME.ext` into the paste name and the view its extension selects.
    fn from_file_name(segment: &str) -> (&str, View) {
        // longest suffix first so `.meta.json` is not taken for `.json`
        const SUFFIXES: [(&str, View); 4] = [
            (".meta.json", View::Meta),
            (".json", View::Json),
            (".txt", View::Raw),
            (".html", View::Html),
        ];

        SUFFIXES
            .iter()
            .find_map(|(suffix, view)| {
                segment
                    .strip_suffix(suffix)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name, *view))
            })
            .unwrap_or((segment, View::Html))
    }

    /// The view named by a `NAME/view` sub-path.
    fn from_sub_path(view: &str) -> Option<View> {
        match view {
            "raw" => Some(View::Raw),
            "json" => Some(View::Json),
            "meta" => Some(View::Meta),
            _ => None,
        }
    }
}

async fn view_paste(
    State(app): State<App>,
    Path(segment): Path<String>,
    Query(params): Query<ViewParams>,
) -> crate::ApiResult<Response> {
    let (name, view) = View::from_file_name(&segment);
    render(&app, name, view, &params).await
}

/// `/paste` is taken by uploads, so a paste with that name is viewed here.
async fn view_paste_named_paste(
    State(app): State<App>,
    Query(params): Query<ViewParams>,
) -> crate::ApiResult<Response> {
    render(&app, "paste", View::Html, &params).await
}

async fn view_paste_as(
    State(app): State<App>,
    Path((name, view)): Path<(String, String)>,
    Query(params): Query<ViewParams>,
) -> crate::ApiResult<Response> {
    let view = View::from_sub_path(&view).ok_or(ApiError::NotFound)?;
    render(&app, &name, view, &params).await
}

async fn render(
    app: &App,
    name: &str,
    view: View,
    params: &ViewParams,
) -> crate::ApiResult<Response> {
    let paste = paste::fetch(app, name).await?;
    let headers = paste_headers(paste.expires, &paste.mime)?;

    let response = match view {
        View::Html => {
            let theme = Theme::from_query(params.theme.as_deref());
            (headers, Html(render_page(&paste, theme)?)).into_response()
        }
        View::Raw => {
            let disposition = format!("inline; filename=\"{name}.txt\"");
            (
                headers,
                [
                    (header::CONTENT_TYPE, header_value("text/plain")?),
                    (header::CONTENT_DISPOSITION, header_value(&disposition)?),
                ],
                paste.content,
            )
                .into_response()
        }
        View::Json if is_json_mime(&paste.mime) => (
            headers,
            [(header::CONTENT_TYPE, header_value("application/json")?)],
            paste.content,
        )
            .into_response(),
        View::Json => return Err(ApiError::NotJson),
        View::Meta => (headers, Json(PasteMeta::from(paste))).into_response(),
    };

    Ok(response)
}

/// Headers describing a paste, sent with every view of it.
fn paste_headers(expires: Option<i64>, mime: &str) -> crate::ApiResult<HeaderMap> {
    let expires = expires.map(|secs| secs.to_string()).unwrap_or_default();

    let mut headers = HeaderMap::new();
    headers.insert(HeaderName::from_static(PASTE_EXPIRES), header_value(&expires)?);
    headers.insert(HeaderName::from_static(PASTE_MIME), header_value(mime)?);
    Ok(headers)
}

fn header_value(value: &str) -> crate::ApiResult<HeaderValue> {
    Ok(HeaderValue::from_str(value).map_err(http::Error::from)?)
}

/// In development mode, replace the generic message of 500 responses with the
/// underlying error.
async fn expose_internal_errors<B>(
    State(config): State<Arc<Config>>,
    request: Request<B>,
    next: Next<B>,
) -> Response {
    let response = next.run(request).await;
    if config.server.mode != Mode::Development {
        return response;
    }

    let Some(InternalDetail(detail)) = response.extensions().get::<InternalDetail>().cloned() else {
        return response;
    };

    let status = response.status();
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map_or(false, |value| value.as_bytes().starts_with(b"application/json"));

    if is_json {
        let body = json!({
            "error": "INTERNAL_SERVER_ERROR",
            "message": detail,
        });
        (status, Json(body)).into_response()
    } else {
        (status, format!("INTERNAL_SERVER_ERROR\n{detail}")).into_response()
    }
}
