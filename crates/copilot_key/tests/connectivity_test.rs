//! HttpProbe against real sockets.

use std::sync::Arc;
use std::time::Duration;

use copilot_key::{build_http_client, HttpProbe, Probe};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn probe_for(url: &str) -> HttpProbe {
    let client = Arc::new(build_http_client().expect("client"));
    HttpProbe::new(client, url, Duration::from_secs(3))
}

#[tokio::test]
async fn any_status_counts_as_reachable() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    assert!(probe_for(&server.uri()).probe().await.is_ok());
}

#[tokio::test]
async fn refused_connection_is_unreachable() {
    assert!(probe_for("http://127.0.0.1:9").probe().await.is_err());
}

#[tokio::test]
async fn slow_endpoint_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let client = Arc::new(build_http_client().expect("client"));
    let probe = HttpProbe::new(client, server.uri(), Duration::from_millis(200));
    assert!(probe.probe().await.is_err());
}
