//! End-to-end tests: a mock upstream serving WebP bytes, the pixfeed router
//! in front of it, and a real HTTP client on the outside.

use std::net::SocketAddr;

use axum::{
    http::{header, StatusCode},
    routing::get,
    Router,
};
use gif::{ColorOutput, DecodeOptions, Repeat};
use tokio::net::TcpListener;

use pixfeed_core::{FeedConfig, FrameBuffer, NormalizerKind};
use pixfeed_render::testing::{animated_webp, still_webp, AnimFrame};
use pixfeed_server::{router, AppState, FeedService};

const RED: [u8; 4] = [255, 0, 0, 255];
const HALF_BLUE: [u8; 4] = [0, 0, 255, 128];

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Upstream answering every `GET /next` with `status` and `body`.
async fn mock_upstream(status: StatusCode, body: Vec<u8>) -> String {
    let app = Router::new().route(
        "/next",
        get(move || {
            let body = body.clone();
            async move { (status, [(header::CONTENT_TYPE, "image/webp")], body) }
        }),
    );
    format!("http://{}/next", spawn(app).await)
}

fn config_for(upstream: String) -> FeedConfig {
    let mut config = FeedConfig::default();
    config.upstream.url = upstream;
    config
}

async fn spawn_feed(config: FeedConfig) -> String {
    let app = router(AppState::new(FeedService::new(config)));
    format!("http://{}", spawn(app).await)
}

struct GifFrame {
    width: u16,
    height: u16,
    delay: u16,
    rgba: Vec<u8>,
}

fn decode_gif(bytes: &[u8]) -> (Vec<GifFrame>, Repeat) {
    let mut options = DecodeOptions::new();
    options.set_color_output(ColorOutput::RGBA);
    let mut decoder = options.read_info(bytes).unwrap();
    let mut frames = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        frames.push(GifFrame {
            width: frame.width,
            height: frame.height,
            delay: frame.delay,
            rgba: frame.buffer.to_vec(),
        });
    }
    (frames, decoder.repeat())
}

fn pixel(frame: &GifFrame, x: usize, y: usize) -> [u8; 4] {
    let i = (y * frame.width as usize + x) * 4;
    [
        frame.rgba[i],
        frame.rgba[i + 1],
        frame.rgba[i + 2],
        frame.rgba[i + 3],
    ]
}

/// 16x8 red canvas, then a half-transparent blue square over the right half.
fn red_then_blue() -> Vec<u8> {
    animated_webp(
        16,
        8,
        &[
            AnimFrame::full(FrameBuffer::solid(16, 8, RED), 100),
            AnimFrame::at(FrameBuffer::solid(8, 8, HALF_BLUE), 8, 0, 200),
        ],
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_animated_webp_becomes_looping_gif() {
    let upstream = mock_upstream(StatusCode::OK, red_then_blue()).await;
    let base = spawn_feed(config_for(upstream)).await;

    let res = reqwest::get(format!("{}/feed", base)).await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/gif");
    assert_eq!(res.headers()[header::CACHE_CONTROL], "no-store");
    let body = res.bytes().await.unwrap();

    let (frames, repeat) = decode_gif(&body);
    assert_eq!(repeat, Repeat::Infinite);
    assert_eq!(frames.len(), 2);
    assert_eq!(
        frames.iter().map(|f| f.delay).collect::<Vec<_>>(),
        vec![10, 20]
    );
    for frame in &frames {
        assert_eq!((frame.width, frame.height), (64, 32));
        assert!(frame.rgba.chunks_exact(4).all(|px| px[3] == 255));
    }

    // The first frame is pure red everywhere.
    assert!(frames[0].rgba.chunks_exact(4).all(|px| px == RED));

    // Left half stays red; right half is blue blended over red.
    assert_eq!(pixel(&frames[1], 8, 16), RED);
    let [r, g, b, _] = pixel(&frames[1], 56, 16);
    assert!(
        (124..=130).contains(&r) && g < 4 && (125..=131).contains(&b),
        "right pixel {:?}",
        (r, g, b)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_zero_durations_use_default() {
    let webp = animated_webp(
        4,
        4,
        &[
            AnimFrame::full(FrameBuffer::solid(4, 4, RED), 0),
            AnimFrame::full(FrameBuffer::solid(4, 4, [0, 255, 0, 255]), 0),
        ],
    );
    let upstream = mock_upstream(StatusCode::OK, webp).await;
    let base = spawn_feed(config_for(upstream)).await;

    let body = reqwest::get(format!("{}/feed", base))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let (frames, _) = decode_gif(&body);
    assert!(frames.iter().all(|f| f.delay == 35));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_still_webp_becomes_opaque_png() {
    let webp = still_webp(&FrameBuffer::solid(16, 8, [0, 200, 0, 100]));
    let upstream = mock_upstream(StatusCode::OK, webp).await;
    let base = spawn_feed(config_for(upstream)).await;

    let res = reqwest::get(format!("{}/feed", base)).await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
    let body = res.bytes().await.unwrap();

    let img = image::load_from_memory_with_format(&body, image::ImageFormat::Png).unwrap();
    assert_eq!((img.width(), img.height()), (64, 32));
    assert_eq!(img.color(), image::ColorType::Rgb8);
    // Alpha is dropped, not blended.
    let px = img.to_rgb8().get_pixel(32, 16).0;
    assert!(px[1] > 180 && px[0] < 20 && px[2] < 20, "{:?}", px);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_etag_is_stable_for_identical_output() {
    let upstream = mock_upstream(StatusCode::OK, red_then_blue()).await;
    let base = spawn_feed(config_for(upstream)).await;

    let first = reqwest::get(format!("{}/feed", base)).await.unwrap();
    let second = reqwest::get(format!("{}/feed", base)).await.unwrap();
    let etag = first.headers()[header::ETAG].clone();
    assert!(etag.to_str().unwrap().starts_with('"'));
    assert_eq!(etag, second.headers()[header::ETAG]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_garbage_upstream_is_500() {
    let upstream = mock_upstream(StatusCode::OK, b"<html>not an image</html>".to_vec()).await;
    let base = spawn_feed(config_for(upstream)).await;

    let res = reqwest::get(format!("{}/feed", base)).await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let text = res.text().await.unwrap();
    assert!(text.contains("decode error"), "{text}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upstream_status_is_reported() {
    let upstream = mock_upstream(StatusCode::NOT_FOUND, b"no such device".to_vec()).await;
    let base = spawn_feed(config_for(upstream)).await;

    let res = reqwest::get(format!("{}/feed", base)).await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let text = res.text().await.unwrap();
    assert!(text.contains("upstream fetch failed"), "{text}");
    assert!(text.contains("404"), "{text}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_upstream_is_500() {
    // Grab a free port, then close it.
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let base = spawn_feed(config_for(format!("http://{}/next", closed))).await;

    let res = reqwest::get(format!("{}/feed", base)).await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
    let text = res.text().await.unwrap();
    assert!(text.contains("upstream fetch failed"), "{text}");
    assert!(text.contains(&closed.to_string()), "{text}");
}

// Temp-file cleanup when ImageMagick fails is covered next to the normalizer
// in pixfeed-encode (`magick::tests::unix::test_failing_program_cleans_up`).

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_healthz_reports_config() {
    let mut config = config_for("http://127.0.0.1:9/next".to_string());
    config.normalizer.kind = NormalizerKind::None;
    let base = spawn_feed(config).await;

    let res = reqwest::get(format!("{}/healthz", base)).await.unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_slice(&res.bytes().await.unwrap()).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["target"]["width"], 64);
    assert_eq!(body["target"]["height"], 32);
    assert_eq!(body["normalizer"], "none");
    assert_eq!(body["upstream"], "http://127.0.0.1:9/next");
}
