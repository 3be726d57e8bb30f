use goose::prelude::*;
use rand::Rng;

/// Load testing suite for the photo album service.
///
/// Simulates a gallery frontend:
/// - Listing pages (placeholder generation on first view, cached after)
/// - Thumbnails at the default width (cache hit path)
/// - Thumbnails at random widths (cache miss and transform path)
/// - Conditional requests that should resolve to 304
/// - Health monitoring endpoint
///
/// Expects a directory of sample images named in `SAMPLE_IMAGES`.
///
/// # Usage
/// ```bash
/// cd loadtest
/// cargo run --release -- --host http://localhost:8080 --users 10 --hatch-rate 2 --run-time 60s
/// ```
///
/// # Performance Targets
/// - Listing (warm): <50ms p95 latency
/// - Cached thumbnails: <20ms p95 latency
/// - Uncached thumbnails: <300ms p95 latency
/// - Error rate: <1%

const SAMPLE_IMAGES: &[&str] = &["sample1.jpg", "sample2.jpg", "sample3.jpg"];

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    GooseAttack::initialize()?
        .register_scenario(
            scenario!("Browsing")
                .register_transaction(transaction!(list_album).set_weight(5)?)
                .register_transaction(transaction!(cached_thumb).set_weight(10)?)
                .register_transaction(transaction!(health_check).set_weight(1)?)
        )
        .register_scenario(
            scenario!("CachePerformance")
                // Repeated identical requests measure the hit path
                .register_transaction(transaction!(conditional_thumb).set_weight(15)?)
                // Random widths force generation
                .register_transaction(transaction!(uncached_thumb).set_weight(5)?)
        )
        .execute()
        .await?;

    Ok(())
}

fn random_image() -> &'static str {
    let mut rng = rand::thread_rng();
    SAMPLE_IMAGES[rng.gen_range(0..SAMPLE_IMAGES.len())]
}

/// Fetches a random listing page with a random sort.
async fn list_album(user: &mut GooseUser) -> TransactionResult {
    // Generate random parameters before await to satisfy Send bounds
    let url = {
        let mut rng = rand::thread_rng();
        let sort_by = ["name", "mtime"][rng.gen_range(0..2)];
        let sort = ["asc", "desc"][rng.gen_range(0..2)];
        format!("/photo-album?page={}&limit=20&sortBy={}&sort={}", rng.gen_range(1..4), sort_by, sort)
    };

    let _goose = user.get(&url).await?;
    Ok(())
}

/// Default-width thumbnail, the URL listings hand out.
async fn cached_thumb(user: &mut GooseUser) -> TransactionResult {
    let url = format!("/thumb?name={}&w=400", random_image());
    let _goose = user.get(&url).await?;
    Ok(())
}

/// Revalidates a thumbnail with its ETag, as a browser would.
async fn conditional_thumb(user: &mut GooseUser) -> TransactionResult {
    let url = format!("/thumb?name={}&w=400", random_image());
    let goose = user.get(&url).await?;

    let etag = goose
        .response
        .as_ref()
        .ok()
        .and_then(|r| r.headers().get("etag"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(etag) = etag {
        let request_builder = user
            .get_request_builder(&GooseMethod::Get, &url)?
            .header("If-None-Match", etag);
        let goose_request = GooseRequest::builder()
            .set_request_builder(request_builder)
            .expect_status_code(304)
            .build();
        let _goose = user.request(goose_request).await?;
    }
    Ok(())
}

/// Random widths guarantee a fresh key per request (until the space fills).
async fn uncached_thumb(user: &mut GooseUser) -> TransactionResult {
    let url = {
        let mut rng = rand::thread_rng();
        format!("/thumb?name={}&w={}", random_image(), rng.gen_range(16..2000))
    };
    let _goose = user.get(&url).await?;
    Ok(())
}

/// Monitors service availability via health check endpoint.
async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get("/health").await?;
    Ok(())
}
