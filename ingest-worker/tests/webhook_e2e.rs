use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use sigfox_ingest::config::DownlinkSourceKind;
use sigfox_ingest::message::FixedClock;
use sigfox_ingest::{
    build_router, AppState, Config, DeviceShadow, InMemoryShadow, MemoryTransport, Pipeline,
    RoutingMode,
};

const BASE_STATION_TIME_MS: i64 = 1_511_714_827_000;

fn sample_body() -> Value {
    json!({
        "device": "1A2345",
        "data": "b0513801a421f0019405a500",
        "time": "1511714827",
        "duplicate": "false",
        "snr": "18.86",
        "station": "1D44",
        "avgSnr": "15.54",
        "lat": "1",
        "lng": "104",
        "rssi": "-123.00",
        "seqNumber": "1492",
        "ack": "false",
        "longPolling": "false"
    })
}

struct Harness {
    app: Router,
    transport: MemoryTransport,
    shadow: InMemoryShadow,
}

fn harness(mode: RoutingMode, downlink_data: &str, now_ms: i64) -> Harness {
    let config = Config {
        routing_mode: mode,
        downlink_data: downlink_data.to_string(),
        downlink_source: DownlinkSourceKind::Shadow,
        ..Config::default()
    };
    let transport = MemoryTransport::new();
    let shadow = InMemoryShadow::new();

    let pipeline = Pipeline::from_config(
        &config,
        Arc::new(transport.clone()),
        Arc::new(shadow.clone()),
        Arc::new(FixedClock(now_ms)),
    );

    Harness {
        app: build_router(AppState::new(pipeline)),
        transport,
        shadow,
    }
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body")
        .to_vec()
}

async fn read_json(response: axum::response::Response) -> Value {
    serde_json::from_slice(&read_bytes(response).await).expect("json")
}

#[tokio::test]
async fn ack_false_answers_no_data() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS + 60_000);

    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox", &sample_body()))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/json"
    );
    assert_eq!(read_json(response).await, json!({"1A2345": {"noData": true}}));

    let mut addresses: Vec<String> =
        h.transport.published().await.into_iter().map(|p| p.address).collect();
    addresses.sort();
    assert_eq!(addresses, vec!["sigfox.devices.1A2345", "sigfox.devices.all"]);
}

#[tokio::test]
async fn ack_absent_answers_downlink_data() {
    let h = harness(RoutingMode::FanOut, "0123456789ABCDEF", BASE_STATION_TIME_MS + 60_000);
    let mut body = sample_body();
    body.as_object_mut().unwrap().remove("ack");

    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox", &body))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        read_json(response).await,
        json!({"1A2345": {"downlinkData": "0123456789abcdef"}})
    );
}

#[tokio::test]
async fn stale_message_fails_before_publishing() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS);
    let mut body = sample_body();
    body["time"] = json!("1000000000");

    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox", &body))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(read_bytes(response).await).unwrap();
    assert!(text.starts_with("stale message"), "unexpected body: {text}");
    assert!(h.transport.attempts().await.is_empty());
}

#[tokio::test]
async fn failing_target_does_not_fail_the_webhook() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS + 1_000);
    h.transport.fail_address("sigfox.types.gps").await;

    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox?type=gps", &sample_body()))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let mut attempts = h.transport.attempts().await;
    attempts.sort();
    assert_eq!(
        attempts,
        vec!["sigfox.devices.1A2345", "sigfox.devices.all", "sigfox.types.gps"]
    );
    assert_eq!(h.transport.published().await.len(), 2);
}

#[tokio::test]
async fn published_envelope_carries_trace_and_normalized_body() {
    let h = harness(RoutingMode::Single, "0123456789abcdef", BASE_STATION_TIME_MS + 1_000);

    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox?type=gps", &sample_body()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let published = h.transport.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].address, "sigfox.received");

    let envelope: Value = serde_json::from_slice(&published[0].message.body).unwrap();
    assert_eq!(envelope["device"], "1A2345");
    assert_eq!(envelope["type"], "gps");
    assert_eq!(envelope["query"]["type"], "gps");
    assert_eq!(envelope["rootTraceId"], published[0].message.message_id.as_str());
    assert_eq!(envelope["body"]["baseStationTime"], 1511714827);
    assert_eq!(envelope["body"]["timestamp"], "1511714827000");
    assert_eq!(envelope["body"]["ack"], false);
    assert_eq!(envelope["body"]["seqNumber"], 1492);
    assert_eq!(envelope["body"]["rssi"], -123.0);
    assert!(envelope["body"].get("time").is_none());
}

#[tokio::test]
async fn device_falls_back_to_query_and_sentinel() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS);

    let response = h
        .app
        .clone()
        .oneshot(json_request("POST", "/sigfox?device=ab12", &json!({"ack": "false"})))
        .await
        .expect("response");
    assert_eq!(read_json(response).await, json!({"AB12": {"noData": true}}));

    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox", &json!({"ack": false})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        read_json(response).await,
        json!({"missing_device": {"noData": true}})
    );
}

#[tokio::test]
async fn default_config_without_device_answers_fallback_downlink() {
    let config = Config::default();
    let transport = MemoryTransport::new();
    let pipeline = Pipeline::from_config(
        &config,
        Arc::new(transport.clone()),
        Arc::new(InMemoryShadow::new()),
        Arc::new(FixedClock(BASE_STATION_TIME_MS + 60_000)),
    );
    let app = build_router(AppState::new(pipeline));

    let response = app
        .oneshot(json_request(
            "POST",
            "/sigfox",
            &json!({"time": "1511714827", "data": "00"}),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        read_json(response).await,
        json!({"missing_device": {"downlinkData": "0102030405060708"}})
    );

    let published = transport.published().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].address, "sigfox.devices.all");
}

#[tokio::test]
async fn raw_keys_do_not_override_computed_timestamps() {
    let h = harness(RoutingMode::Single, "0123456789abcdef", BASE_STATION_TIME_MS + 1_000);

    let response = h
        .app
        .oneshot(json_request(
            "POST",
            "/sigfox",
            &json!({
                "device": "1A2345",
                "time": "1511714827",
                "timestamp": "bogus",
                "ack": "false"
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let published = h.transport.published().await;
    let envelope: Value = serde_json::from_slice(&published[0].message.body).unwrap();
    assert_eq!(envelope["body"]["timestamp"], "1511714827000");
    assert_eq!(envelope["body"]["baseStationTime"], 1511714827);
}

#[tokio::test]
async fn shadow_payload_is_used_for_downlink() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS);
    let mut state = serde_json::Map::new();
    state.insert("downlinkData".into(), json!("FFEEDDCCBBAA9988"));
    h.shadow.set_state("1a2345", state).await.unwrap();

    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox", &json!({"device": "1A2345"})))
        .await
        .expect("response");

    assert_eq!(
        read_json(response).await,
        json!({"1A2345": {"downlinkData": "ffeeddccbbaa9988"}})
    );
}

#[tokio::test]
async fn invalid_downlink_payload_is_500() {
    let h = harness(RoutingMode::FanOut, "not-a-payload", BASE_STATION_TIME_MS);

    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox", &json!({"device": "1A2345"})))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(read_bytes(response).await).unwrap();
    assert!(text.starts_with("invalid downlink payload"), "unexpected body: {text}");
}

#[tokio::test]
async fn unreachable_endpoint_is_500_and_recovers() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS + 1_000);
    h.transport.set_unreachable(true).await;

    let response = h
        .app
        .clone()
        .oneshot(json_request("POST", "/sigfox", &sample_body()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.transport.attempts().await.is_empty());

    h.transport.set_unreachable(false).await;
    let response = h
        .app
        .oneshot(json_request("POST", "/sigfox", &sample_body()))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn malformed_body_is_500() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS);

    let request = Request::builder()
        .method("POST")
        .uri("/sigfox")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let response = h.app.oneshot(request).await.expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(h.transport.attempts().await.is_empty());
}

#[tokio::test]
async fn direct_invocation_uses_json_status_codes() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS + 1_000);

    let ok = h
        .app
        .clone()
        .oneshot(json_request(
            "POST",
            "/invoke",
            &json!({"body": sample_body(), "query": {"type": "gps"}}),
        ))
        .await
        .expect("response");
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(read_json(ok).await, json!({"1A2345": {"noData": true}}));

    let mut stale = sample_body();
    stale["time"] = json!("1000000000");
    let failed = h
        .app
        .oneshot(json_request("POST", "/invoke", &json!({"body": stale})))
        .await
        .expect("response");
    assert_eq!(failed.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(failed).await;
    assert!(body["error"].as_str().unwrap().starts_with("stale message"));
}

#[tokio::test]
async fn health_is_ok() {
    let h = harness(RoutingMode::FanOut, "0123456789abcdef", BASE_STATION_TIME_MS);
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("request");

    let response = h.app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"status": "ok"}));
}
