//! URL prober against a local HTTP upstream

use axum::{
    Router,
    extract::Path,
    http::{HeaderMap, Method, StatusCode, header::RANGE},
    response::{IntoResponse, Redirect, Response},
    routing::{any, get},
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use iptv_arbiter::config::ProberConfig;
use iptv_arbiter::models::ProviderType;
use iptv_arbiter::services::{ProbeFailure, Prober, UrlProber};

const BIG_BODY: usize = 4 * 1024 * 1024;

/// Ignores `Range` and streams the whole body
async fn big_body() -> Vec<u8> {
    vec![b'x'; BIG_BODY]
}

/// Serves `bytes=0-N` as a 206 partial response
async fn ranged_body(headers: HeaderMap) -> Response {
    let body = vec![b'x'; 64 * 1024];
    let end = headers
        .get(RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("bytes=0-"))
        .and_then(|value| value.parse::<usize>().ok());
    match end {
        Some(end) => {
            let end = end.min(body.len() - 1);
            (StatusCode::PARTIAL_CONTENT, body[..=end].to_vec()).into_response()
        }
        None => (StatusCode::OK, body).into_response(),
    }
}

async fn head_only(method: Method) -> StatusCode {
    if method == Method::HEAD {
        StatusCode::OK
    } else {
        StatusCode::METHOD_NOT_ALLOWED
    }
}

async fn redirect_chain(Path(hops): Path<u32>) -> Response {
    if hops == 0 {
        (StatusCode::OK, "stream").into_response()
    } else {
        Redirect::temporary(&format!("/redirect/{}", hops - 1)).into_response()
    }
}

async fn bad_gateway() -> StatusCode {
    StatusCode::BAD_GATEWAY
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(30)).await;
    "late"
}

async fn upstream() -> SocketAddr {
    let app = Router::new()
        .route("/big.ts", get(big_body))
        .route("/ranged.ts", get(ranged_body))
        .route("/to-slow", get(|| async { Redirect::temporary("/slow.ts") }))
        .route("/agtv/live.m3u8", any(head_only))
        .route("/redirect/{hops}", get(redirect_chain))
        .route("/bad.ts", get(bad_gateway))
        .route("/slow.ts", get(slow));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn prober() -> UrlProber {
    UrlProber::new(&ProberConfig {
        timeout: Duration::from_millis(500),
        ..ProberConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn ranged_get_receives_exactly_the_byte_cap() {
    let addr = upstream().await;
    let prober = prober();

    let result = prober
        .probe(&format!("http://{addr}/ranged.ts"), ProviderType::Xtream, &CancellationToken::new())
        .await;
    assert!(result.is_valid);
    assert_eq!(result.status_code, Some(206));
    assert_eq!(result.bytes_read, 100);
    assert_eq!(prober.stats().snapshot().max_body_bytes, 100);
}

#[tokio::test]
async fn get_stops_reading_when_range_is_ignored() {
    let addr = upstream().await;
    let prober = prober();

    let result = prober
        .probe(&format!("http://{addr}/big.ts"), ProviderType::Xtream, &CancellationToken::new())
        .await;
    assert!(result.is_valid);
    assert_eq!(result.status_code, Some(200));
    // counts what actually arrived: at least the cap, far short of the body
    assert!(result.bytes_read >= 100, "read {}", result.bytes_read);
    assert!(result.bytes_read < BIG_BODY, "read {}", result.bytes_read);
    assert_eq!(prober.stats().snapshot().max_body_bytes, result.bytes_read);
}

#[tokio::test]
async fn agtv_is_probed_with_head() {
    let addr = upstream().await;
    let prober = prober();
    let url = format!("http://{addr}/agtv/live.m3u8");
    let token = CancellationToken::new();

    let agtv = prober.probe(&url, ProviderType::Agtv, &token).await;
    assert!(agtv.is_valid);
    assert_eq!(agtv.bytes_read, 0);

    // the same endpoint refuses GET
    let xtream = prober.probe(&url, ProviderType::Xtream, &token).await;
    assert_eq!(xtream.status_code, Some(405));
    assert!(!xtream.is_valid);
}

#[tokio::test]
async fn follows_up_to_three_redirects() {
    let addr = upstream().await;
    let prober = prober();
    let token = CancellationToken::new();

    let ok = prober
        .probe(&format!("http://{addr}/redirect/3"), ProviderType::Xtream, &token)
        .await;
    assert!(ok.is_valid);
    assert_eq!(ok.redirects, 3);

    let too_many = prober
        .probe(&format!("http://{addr}/redirect/4"), ProviderType::Xtream, &token)
        .await;
    assert!(!too_many.is_valid);
    assert_eq!(too_many.failure, Some(ProbeFailure::TooManyRedirects));
}

#[tokio::test]
async fn bad_gateway_and_refused_connections_count_against_health() {
    let addr = upstream().await;
    let prober = prober();
    let token = CancellationToken::new();

    let bad = prober
        .probe(&format!("http://{addr}/bad.ts"), ProviderType::Xtream, &token)
        .await;
    assert_eq!(bad.status_code, Some(502));
    assert!(bad.counts_as_bad_gateway());

    let closed = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let refused = prober
        .probe(&format!("http://{closed}/stream.ts"), ProviderType::Xtream, &token)
        .await;
    assert_eq!(refused.failure, Some(ProbeFailure::Network));
    assert!(refused.counts_as_bad_gateway());
}

#[tokio::test]
async fn slow_upstream_times_out_and_cancellation_wins() {
    let addr = upstream().await;
    let prober = prober();
    let url = format!("http://{addr}/slow.ts");

    let timed_out = prober.probe(&url, ProviderType::Xtream, &CancellationToken::new()).await;
    assert_eq!(timed_out.failure, Some(ProbeFailure::Timeout));
    assert_eq!(timed_out.redirects, 0);
    assert!(timed_out.response_time < Duration::from_secs(2));

    // hops followed before the timeout are still reported
    let redirected = prober
        .probe(&format!("http://{addr}/to-slow"), ProviderType::Xtream, &CancellationToken::new())
        .await;
    assert_eq!(redirected.failure, Some(ProbeFailure::Timeout));
    assert_eq!(redirected.redirects, 1);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });
    let cancelled = prober.probe(&url, ProviderType::Xtream, &token).await;
    assert_eq!(cancelled.failure, Some(ProbeFailure::Cancelled));
    assert_eq!(prober.stats().snapshot().cancelled, 1);
}
