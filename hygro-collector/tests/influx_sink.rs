use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use hygro_collector::{
    fetcher::Fetcher,
    scheduler::{ScheduleConfig, Scheduler},
    sink::{InfluxConfig, InfluxError, InfluxSink, Sink},
};
use hygro_core::{Credentials, DeviceProfile, Endpoint, Sample};
use serde_json::{Value, json};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Write {
    query: HashMap<String, String>,
    authorization: Option<String>,
    body: String,
}

type Writes = Arc<Mutex<Vec<Write>>>;

async fn accept_write(
    State(writes): State<Writes>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    writes.lock().unwrap().push(Write {
        query,
        authorization,
        body,
    });
    StatusCode::NO_CONTENT
}

async fn reject_write() -> (StatusCode, &'static str) {
    (StatusCode::UNAUTHORIZED, r#"{"code":"unauthorized"}"#)
}

async fn meter_status() -> Json<Value> {
    Json(json!({
        "statusCode": 100,
        "body": {"deviceId": "D1", "deviceType": "MeterPro", "temperature": 21.5, "humidity": 40, "CO2": 800}
    }))
}

async fn spawn_server() -> (SocketAddr, Writes) {
    let writes = Writes::default();
    let app = Router::new()
        .route("/api/v2/write", post(accept_write))
        .route("/rejecting/api/v2/write", post(reject_write))
        .route("/v1.1/devices/meter/status", get(meter_status))
        .with_state(writes.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, writes)
}

fn influx(url: String) -> InfluxSink {
    InfluxSink::new(
        InfluxConfig {
            url,
            org: "home".into(),
            bucket: "sensors".into(),
            token: "influx-token".into(),
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

fn sample() -> Sample {
    Sample {
        device_id: "D2".into(),
        device_type: "WoIOSensor".into(),
        hub_device_id: "H1".into(),
        version: "V1.0".into(),
        temperature: Some(19.0),
        humidity: Some(55),
        battery: Some(87),
        co2: None,
        observed_at: jiff::Timestamp::from_second(1_700_000_000).unwrap(),
    }
}

#[tokio::test]
async fn writes_one_line_protocol_point() -> Result<(), InfluxError> {
    let (addr, writes) = spawn_server().await;
    let sink = influx(format!("http://{addr}/"));

    sink.write(&sample()).await?;

    let writes = writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    let write = &writes[0];
    assert_eq!(
        write.body,
        "sensor_data,device_id=D2 temperature=19,humidity=55i,battery=87i 1700000000000000000"
    );
    assert_eq!(write.authorization.as_deref(), Some("Token influx-token"));
    assert_eq!(write.query.get("org").map(String::as_str), Some("home"));
    assert_eq!(write.query.get("bucket").map(String::as_str), Some("sensors"));
    assert_eq!(write.query.get("precision").map(String::as_str), Some("ns"));
    Ok(())
}

#[tokio::test]
async fn rejected_write_reports_status() {
    let (addr, _) = spawn_server().await;
    let sink = influx(format!("http://{addr}/rejecting"));

    let err = sink.write(&sample()).await.unwrap_err();
    assert!(matches!(err, InfluxError::Rejected { status: 401, .. }));
}

#[tokio::test]
async fn sample_without_measurements_is_not_sent() {
    let (addr, writes) = spawn_server().await;
    let sink = influx(format!("http://{addr}"));

    let bare = Sample {
        temperature: None,
        humidity: None,
        battery: None,
        ..sample()
    };
    let err = sink.write(&bare).await.unwrap_err();

    assert!(matches!(err, InfluxError::NoFields(ref id) if &**id == "D2"));
    assert!(writes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tick_lands_in_influx() {
    let (addr, writes) = spawn_server().await;
    let scheduler = Scheduler::new(
        ScheduleConfig::default(),
        vec![Endpoint::new(
            format!("http://{addr}/v1.1/devices/meter/status"),
            DeviceProfile::MeterPro,
        )],
        Fetcher::new(
            Arc::new(Credentials::new("tok", "sec")),
            Duration::from_secs(5),
        )
        .unwrap(),
        influx(format!("http://{addr}")),
    );

    let report = scheduler.tick_once().await;
    assert_eq!(report.written(), 1);

    let sample = report.outcomes[0].result.as_ref().unwrap();
    let writes = writes.lock().unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(
        writes[0].body,
        format!(
            "sensor_data,device_id=D1 temperature=21.5,humidity=40i,co2=800i {}",
            sample.observed_at.as_nanosecond()
        )
    );
}
