//! Runs a slow handler behind the cache and shows coalescing, hits and expiry.
//!
//! ```text
//! RUST_LOG=rttp_cache=debug cargo run --example cached_hello
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rttp_cache::cache::{CacheConfig, CacheMiddleware, ResponseCache};
use rttp_cache::{Context, Pipeline, Request, Response, StatusCode};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rttp_cache=debug")),
        )
        .init();

    let cache = ResponseCache::new(
        CacheConfig::new()
            .ttl(Duration::from_millis(200))
            .skip(|req| req.headers().contains("authorization")),
    );

    let runs = Arc::new(AtomicUsize::new(0));
    let pipeline = {
        let runs = Arc::clone(&runs);
        Arc::new(
            Pipeline::new(move |ctx: Context| {
                let runs = Arc::clone(&runs);
                async move {
                    let run = runs.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Response::new(StatusCode::Ok)
                        .json(&json!({ "hello": ctx.request().path(), "run": run }))
                        .unwrap_or_else(|_| Response::new(StatusCode::InternalServerError))
                }
            })
            .layer(CacheMiddleware::from_cache(cache.clone())),
        )
    };

    // Five concurrent requests share one handler run.
    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.dispatch(Request::get("/hello")).await })
        })
        .collect();
    for task in tasks {
        let response = task.await?;
        println!("concurrent: {}", String::from_utf8_lossy(response.body_ref()));
    }

    let hit = pipeline.dispatch(Request::get("/hello")).await;
    println!("cached:     {}", String::from_utf8_lossy(hit.body_ref()));

    let private = Request::get("/hello").with_header("Authorization", "Bearer demo");
    let bypassed = pipeline.dispatch(private).await;
    println!("bypassed:   {}", String::from_utf8_lossy(bypassed.body_ref()));

    tokio::time::sleep(Duration::from_millis(250)).await;
    let expired = pipeline.dispatch(Request::get("/hello")).await;
    println!("expired:    {}", String::from_utf8_lossy(expired.body_ref()));

    println!("handler runs: {}", runs.load(Ordering::SeqCst));
    println!("stats: {}", serde_json::to_string(&cache.stats())?);
    Ok(())
}
