use axum::{
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{atomic::Ordering, Arc};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{services::ServeDir, trace::TraceLayer};

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod generator;
pub mod inflight;
pub mod listing;
pub mod metrics;
pub mod transform;
pub mod upload;

use crate::cache::{compute_validator, is_fresh, Cache, CachePolicy, DiskCache};
use crate::config::{AlbumConfig, MAX_THUMB_WIDTH, MIN_THUMB_WIDTH, PLACEHOLDER_CONCURRENCY};
use crate::fingerprint::{millis_since_epoch, SourceFile};
use crate::generator::Generator;
use crate::listing::{Page, SortKey, SortOrder};
use crate::metrics::METRICS;
use crate::transform::{ImageBackend, ImageTransformer, TransformSpec};

#[derive(Error, Debug)]
pub enum AlbumError {
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("Transformation error: {0}")]
    Transform(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Internal server error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AlbumError>;

impl AlbumError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AlbumError::InvalidPath(_) | AlbumError::NotFound(_) => StatusCode::NOT_FOUND,
            AlbumError::BadRequest(_) | AlbumError::UnsupportedMediaType(_) => {
                StatusCode::BAD_REQUEST
            }
            AlbumError::Transform(_) | AlbumError::Io(_) | AlbumError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AlbumError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {:?}", self);
            METRICS.errors.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::debug!("Request rejected ({}): {}", status, self);
        }
        (
            status,
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Shared state behind every handler.
pub struct AppState {
    pub config: AlbumConfig,
    pub generator: Generator,
}

/// Query for `GET /photo-album`. Values arrive as strings and are validated
/// in [`ListQuery::parse`] so that bad input yields a JSON 400.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<String>,
    pub page: Option<String>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub page: u32,
    pub limit: u32,
    pub sort_key: SortKey,
    pub order: SortOrder,
}

impl ListQuery {
    pub fn parse(&self, config: &AlbumConfig) -> Result<ListParams> {
        let page = parse_positive("page", self.page.as_deref(), 1)?;
        let limit = parse_positive("limit", self.limit.as_deref(), config.default_page_limit)?
            .min(config.max_page_limit);
        let sort_key = match non_empty(self.sort_by.as_deref()) {
            Some(s) => s.parse()?,
            None => SortKey::Name,
        };
        let order = match non_empty(self.sort.as_deref()) {
            Some(s) => s.parse()?,
            None => SortOrder::Desc,
        };
        Ok(ListParams {
            page,
            limit,
            sort_key,
            order,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ThumbQuery {
    pub name: Option<String>,
    pub w: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub name: String,
    /// Inline blur-up preview; `null` when it could not be generated.
    pub placeholder: Option<String>,
    pub thumb_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub filename: String,
    pub thumb_url: String,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_positive(field: &str, value: Option<&str>, default: u32) -> Result<u32> {
    match non_empty(value) {
        None => Ok(default),
        Some(v) => match v.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(n),
            _ => Err(AlbumError::BadRequest(format!(
                "{} must be a positive integer",
                field
            ))),
        },
    }
}

fn require_name(name: Option<String>) -> Result<String> {
    match name {
        Some(n) if !n.is_empty() => Ok(n),
        _ => Err(AlbumError::BadRequest("Missing name parameter".into())),
    }
}

/// Requested thumbnail width, clamped to the supported range.
pub fn parse_width(value: Option<&str>, default: u32) -> Result<u32> {
    match non_empty(value) {
        None => Ok(default),
        Some(v) => v
            .parse::<i64>()
            .map(|w| w.clamp(MIN_THUMB_WIDTH as i64, MAX_THUMB_WIDTH as i64) as u32)
            .map_err(|_| AlbumError::BadRequest(format!("Invalid width: {}", v))),
    }
}

/// Relative URL of the thumbnail endpoint for `name`.
pub fn thumb_url(name: &str, width: u32) -> String {
    let w = width.to_string();
    let query =
        serde_urlencoded::to_string(&[("name", name), ("w", w.as_str())][..]).unwrap_or_default();
    format!("/thumb?{}", query)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| AlbumError::Internal(e.to_string()))
}

fn if_none_match(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
}

/// 304 response: empty body, validator only.
fn not_modified(etag: &str) -> Result<Response> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ETAG, header_value(etag)?);
    Ok((StatusCode::NOT_MODIFIED, headers).into_response())
}

async fn list_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<ListItem>>> {
    let params = query.parse(&state.config)?;
    tracing::debug!("Listing request: {:?}", params);

    let page = listing::list_page(
        &state.config.image_dir,
        params.sort_key,
        params.order,
        params.page,
        params.limit,
    )
    .await?;

    // A failed placeholder degrades to null instead of failing the listing.
    let placeholders = state
        .generator
        .placeholders(&page.items, PLACEHOLDER_CONCURRENCY)
        .await;

    let width = state.config.default_thumb_width;
    let items = page
        .items
        .iter()
        .zip(placeholders)
        .map(|(name, placeholder)| ListItem {
            name: name.clone(),
            placeholder,
            thumb_url: thumb_url(name, width),
        })
        .collect();

    Ok(Json(page.with_items(items)))
}

async fn thumb_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ThumbQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let name = require_name(query.name)?;
    let width = parse_width(query.w.as_deref(), state.config.default_thumb_width)?;
    tracing::debug!("Thumbnail request: name={}, w={}", name, width);

    // Revalidation only needs the entry's validator, not its bytes.
    if let Some(candidate) = if_none_match(&headers) {
        let spec = TransformSpec::thumbnail(width);
        if let Some(etag) = state.generator.cached_etag(&name, spec).await? {
            if is_fresh(Some(candidate), &etag) {
                METRICS.cache_hits.fetch_add(1, Ordering::Relaxed);
                return not_modified(&etag);
            }
        }
    }

    let img = state.generator.get_thumbnail(&name, width).await?;
    if is_fresh(if_none_match(&headers), &img.etag) {
        return not_modified(&img.etag);
    }

    let policy = CachePolicy::for_derived(state.config.derived_max_age);
    let mut out = HeaderMap::new();
    out.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(img.content_type),
    );
    out.insert(header::ETAG, header_value(&img.etag)?);
    out.insert(
        header::CACHE_CONTROL,
        header_value(&policy.cache_control_value())?,
    );
    Ok((out, Body::from(img.bytes)).into_response())
}

async fn image_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ImageQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let name = require_name(query.name)?;
    let source = SourceFile::stat(&state.config.image_dir, &name).await?;

    let file = match tokio::fs::File::open(&source.path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AlbumError::NotFound(name))
        }
        Err(e) => return Err(e.into()),
    };
    // Validator and length come from the open handle so they describe
    // exactly the bytes we are about to stream.
    let meta = file.metadata().await?;
    let etag = compute_validator(meta.len(), millis_since_epoch(meta.modified()?));
    if is_fresh(if_none_match(&headers), &etag) {
        return not_modified(&etag);
    }

    let content_type = mime_guess::from_path(&name).first_or_octet_stream();
    let policy = CachePolicy::for_originals(state.config.original_max_age);
    let mut out = HeaderMap::new();
    out.insert(header::CONTENT_TYPE, header_value(content_type.as_ref())?);
    out.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.len()));
    out.insert(header::ETAG, header_value(&etag)?);
    out.insert(
        header::CACHE_CONTROL,
        header_value(&policy.cache_control_value())?,
    );
    Ok((out, Body::from_stream(ReaderStream::new(file))).into_response())
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AlbumError::BadRequest(format!("Invalid multipart: {}", e)))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("").to_string();
        upload::check_media_type(field.content_type(), &original_name)?;

        let bytes = upload::read_limited(field, state.config.max_upload_size).await?;
        upload::validate_image_bytes(&bytes)?;

        let filename =
            upload::store_upload(&state.config.image_dir, &original_name, &bytes).await?;
        METRICS.uploads.fetch_add(1, Ordering::Relaxed);
        tracing::info!("Stored upload {} ({} bytes)", filename, bytes.len());

        return Ok(Json(UploadResponse {
            message: "File uploaded successfully".into(),
            thumb_url: thumb_url(&filename, state.config.default_thumb_width),
            filename,
        }));
    }
    Err(AlbumError::BadRequest("No image file provided".into()))
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "albumkit"
    }))
}

/// Cache statistics endpoint
async fn cache_stats_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let stats = state.generator.cache().stats().await?;
    let hits = METRICS.cache_hits.load(Ordering::Relaxed);
    let misses = METRICS.cache_misses.load(Ordering::Relaxed);

    Ok(Json(serde_json::json!({
        "cache": {
            "total_size_bytes": stats.total_size_bytes,
            "total_size_mb": stats.total_size_bytes as f64 / 1024.0 / 1024.0,
            "entry_count": stats.entry_count,
        },
        "requests": {
            "cache_hits": hits,
            "cache_misses": misses,
            "total": hits + misses,
            "hit_rate_percent": METRICS.hit_rate_percent(),
        },
        "transforms": {
            "total": METRICS.transforms.load(Ordering::Relaxed),
            "errors": METRICS.errors.load(Ordering::Relaxed),
        }
    })))
}

/// Metrics endpoint (Prometheus-compatible plain text)
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.render_prometheus(),
    )
}

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Builds the album router with the `image`-crate transformer.
pub fn router(config: AlbumConfig) -> Router {
    router_with(config, Arc::new(ImageBackend))
}

/// Builds the album router around a custom transformer.
pub fn router_with(config: AlbumConfig, transformer: Arc<dyn ImageTransformer>) -> Router {
    let cache: Arc<dyn Cache> = Arc::new(DiskCache::new(config.cache_dir.clone()));
    let generator = Generator::new(config.image_dir.clone(), cache, transformer);
    let body_limit = config.max_upload_size + MULTIPART_OVERHEAD;
    let rate_limit = config.rate_limit;
    let static_dir = config.static_dir.clone();
    let state = Arc::new(AppState { config, generator });

    // Observability endpoints - NO rate limiting
    let observability_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/stats/cache", get(cache_stats_handler))
        .route("/metrics", get(metrics_handler));

    let mut image_routes = Router::new()
        .route("/thumb", get(thumb_handler))
        .route("/image", get(image_handler))
        .route(
            "/upload",
            post(upload_handler).layer(DefaultBodyLimit::max(body_limit)),
        );

    if let Some(rl) = rate_limit {
        let governor_conf = GovernorConfigBuilder::default()
            .per_millisecond(rl.replenish_interval_ms)
            .burst_size(rl.burst_size)
            .finish();
        match governor_conf {
            Some(conf) => {
                tracing::info!(
                    "Router configured with rate limiting: one request per {}ms, burst {}",
                    rl.replenish_interval_ms,
                    rl.burst_size
                );
                image_routes = image_routes.layer(GovernorLayer {
                    config: Box::leak(Box::new(conf)),
                });
            }
            None => tracing::warn!("Invalid rate limit settings, rate limiting disabled"),
        }
    } else {
        tracing::info!("Rate limiting disabled");
    }

    let mut app = Router::new()
        .route("/photo-album", get(list_handler))
        .merge(observability_routes)
        .merge(image_routes)
        .with_state(state);

    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(TraceLayer::new_for_http())
}
