use albumkit::{config::AlbumConfig, router};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Photo album server entry point.
///
/// Initializes tracing, builds and validates configuration, prepares the
/// image and cache directories, then serves the album API.
///
/// # Configuration
/// Environment variables:
/// - `ALBUM_IMAGE_DIR`: directory of source images (default: `./photos`)
/// - `ALBUM_CACHE_DIR`: directory for generated thumbnails (default: `./cache`)
/// - `ALBUM_MAX_UPLOAD_BYTES`: upload size ceiling (default: 10MB)
/// - `ALBUM_STATIC_DIR`: optional frontend directory served for other paths
/// - `DISABLE_RATE_LIMIT`: set to turn off per-IP rate limiting
/// - `PORT`: HTTP listen port (default: 8080)
/// - `RUST_LOG`: Logging verbosity (default: "albumkit=debug,tower_http=debug")
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "albumkit=debug,tower_http=debug".into()),
        )
        .init();

    tracing::info!("Starting album server");

    let defaults = AlbumConfig::default();
    let cfg = AlbumConfig {
        image_dir: std::env::var("ALBUM_IMAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.image_dir),
        cache_dir: std::env::var("ALBUM_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir),
        max_upload_size: std::env::var("ALBUM_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_upload_size),
        static_dir: std::env::var("ALBUM_STATIC_DIR").ok().map(PathBuf::from),
        rate_limit: if std::env::var("DISABLE_RATE_LIMIT").is_ok() {
            None
        } else {
            defaults.rate_limit
        },
        ..defaults
    };
    cfg.validate()?;

    tokio::fs::create_dir_all(&cfg.image_dir).await?;
    tokio::fs::create_dir_all(&cfg.cache_dir).await?;
    tracing::info!(
        "Serving images from {:?}, cache in {:?}",
        cfg.image_dir,
        cfg.cache_dir
    );

    let app = router(cfg);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8080".to_string())
        .parse::<u16>()
        .unwrap_or(8080);

    // Bind to 0.0.0.0 for external access (required for containerized deployment)
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Server listening on {}", addr);

    // Peer addresses feed the per-IP rate limiter.
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
