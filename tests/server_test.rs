//! Tests against a bound server over real sockets.

use web_pipeline::PipelineConfig;

mod common;

#[tokio::test]
async fn serves_status_over_tcp() {
    let (addr, shutdown) = common::start_server(PipelineConfig::default()).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let res = client
        .get(format!("http://{}/status?mediaType=xml", addr))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()["content-type"],
        "application/xml;charset=UTF-8"
    );
    assert!(res.headers().contains_key("x-request-id"));

    shutdown.trigger();
}

#[tokio::test]
async fn loopback_peer_is_trusted_proxy() {
    let (addr, shutdown) = common::start_server(PipelineConfig::default()).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let body: serde_json::Value = client
        .get(format!("http://{}/echo", addr))
        .header("x-forwarded-for", "203.0.113.50")
        .send()
        .await
        .expect("server unreachable")
        .json()
        .await
        .unwrap();

    assert_eq!(body["client_ip"], "203.0.113.50");
    assert_eq!(body["peer_ip"], "127.0.0.1");

    shutdown.trigger();
}

#[tokio::test]
async fn unknown_path_is_404() {
    let (addr, shutdown) = common::start_server(PipelineConfig::default()).await;

    let res = reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap()
        .get(format!("http://{}/echo.json", addr))
        .send()
        .await
        .expect("server unreachable");

    assert_eq!(res.status(), 404);
    shutdown.trigger();
}
