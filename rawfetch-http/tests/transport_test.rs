use rawfetch_http::{
    HttpConfig, HttpMethod, HttpRequest, ReqwestTransport, Timeouts, Transport, TransportError,
};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn timeouts() -> Timeouts {
    Timeouts::new(Duration::from_secs(2), Duration::from_secs(5))
}

#[tokio::test]
async fn test_query_spaces_reach_server_as_percent_20() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let transport = ReqwestTransport::new();
    let request = HttpRequest::get(format!("{}/search", mock_server.uri()))
        .with_query("q", "big red box")
        .with_query("op", "a+b");
    let response = transport.send(&request, &timeouts()).await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "ok");

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received[0].url.query(), Some("q=big%20red%20box&op=a%2Bb"));
}

#[tokio::test]
async fn test_redirect_history_is_exposed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved here"))
        .mount(&mock_server)
        .await;

    let transport = ReqwestTransport::new();
    let request = HttpRequest::get(format!("{}/old", mock_server.uri()));
    let response = transport.send(&request, &timeouts()).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.history.len(), 1);
    assert_eq!(response.history[0].status, 302);
    assert!(response.history[0].request.url.ends_with("/old"));
    assert!(response.request.url.ends_with("/new"));
    assert_eq!(response.version, "1.1");
}

#[tokio::test]
async fn test_head_does_not_follow_redirects() {
    let mock_server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("Location", "/new"))
        .mount(&mock_server)
        .await;

    let transport = ReqwestTransport::new();
    let request = HttpRequest::new(HttpMethod::Head, format!("{}/old", mock_server.uri()));
    let response = transport.send(&request, &timeouts()).await.unwrap();

    assert_eq!(response.status, 301);
    assert!(response.history.is_empty());
}

#[tokio::test]
async fn test_redirect_loop_is_cut_off() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/loop"))
        .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
        .mount(&mock_server)
        .await;

    let transport = ReqwestTransport::with_config(HttpConfig {
        max_redirects: 2,
        ..HttpConfig::default()
    });
    let request = HttpRequest::get(format!("{}/loop", mock_server.uri()));
    let result = transport.send(&request, &timeouts()).await;

    assert!(matches!(result, Err(TransportError::TooManyRedirects { max: 2 })));
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_error_statuses_are_responses() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/jobs"))
        .respond_with(ResponseTemplate::new(503).insert_header("Retry-After", "1"))
        .mount(&mock_server)
        .await;

    let transport = ReqwestTransport::new();
    let request = HttpRequest::post(format!("{}/jobs", mock_server.uri())).with_body("{}");
    let response = transport.send(&request, &timeouts()).await.unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(response.reason, "Service Unavailable");
    assert_eq!(response.header("retry-after"), Some("1"));
}

#[tokio::test]
async fn test_invalid_header_is_rejected_before_sending() {
    let transport = ReqwestTransport::new();
    let request = HttpRequest::get("http://127.0.0.1:9/").with_header("bad header", "x");
    let result = transport.send(&request, &timeouts()).await;
    assert!(matches!(result, Err(TransportError::InvalidHeader(name)) if name == "bad header"));
}

#[tokio::test]
async fn test_connection_refused_is_a_network_error() {
    let transport = ReqwestTransport::new();
    let request = HttpRequest::get("http://127.0.0.1:1/");
    let err = transport.send(&request, &timeouts()).await.unwrap_err();
    assert!(matches!(err, TransportError::Network(_)));
}

#[tokio::test]
async fn test_user_agent_is_sent_and_kept_on_the_request() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .and(header("user-agent", "inventory-sync/2.1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let transport = ReqwestTransport::with_config(HttpConfig {
        user_agent: "inventory-sync/2.1".to_string(),
        ..HttpConfig::default()
    });
    let request = HttpRequest::get(format!("{}/whoami", mock_server.uri()));
    let response = transport.send(&request, &timeouts()).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.request.header("user-agent"), Some("inventory-sync/2.1"));
}
