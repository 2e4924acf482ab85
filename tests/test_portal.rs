use std::io::Cursor;
use std::time::Duration;

use chrono::NaiveDate;
use lib::kiosk::doctor_source::{fetch_snapshot, DoctorSource, PortalClient};
use lib::kiosk::errors::FetchError;
use lib::kiosk::events::{PushEvent, PushListener};
use lib::kiosk::models::doctor_model::Snapshot;
use serde_json::json;
use tokio::sync::mpsc;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn portal(server: &MockServer) -> PortalClient {
    PortalClient::new(&server.uri(), Duration::from_secs(5)).unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::RgbImage::new(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

async fn mount_portal(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/doctors"))
        .and(header("cache-control", "no-store"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "specialty_order": ["Cardiology", "Neurology"],
            "doctors": [
                {"id": 1, "name": "Dr. Asha Menon", "specialty": "Cardiology", "room": "12", "start_time": "08:00"},
                {"id": 2, "name": "Dr. Farid Haddad", "specialty": "Neurology", "room": 4}
            ],
            "today": "2026-10-19"
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/day"))
        .and(query_param("date", "2026-10-19"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "specialty_order": null,
            "doctors": [{"id": "2", "start_time": "15:30", "breaks": ["17:00-17:15"], "status": "AVAILABLE"}],
            "date": "2026-10-19"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn fetches_doctors_and_day() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let client = portal(&server);

    let doctors = client.get_doctors().await.unwrap();
    assert_eq!(doctors.doctors.len(), 2);
    assert_eq!(doctors.doctors[1].room.as_deref(), Some("4"));
    assert_eq!(doctors.today.as_deref(), Some("2026-10-19"));

    let day = client
        .get_day(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap())
        .await
        .unwrap();
    assert!(day.specialty_order.is_empty());
    assert_eq!(day.doctors[0].id, "2");
}

#[tokio::test]
async fn fetch_snapshot_merges_for_server_date() {
    let server = MockServer::start().await;
    mount_portal(&server).await;
    let client = portal(&server);

    let fetched = fetch_snapshot(&client, &Snapshot::default(), Some("2020-01-01"))
        .await
        .unwrap();
    assert_eq!(fetched.date, NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
    assert_eq!(
        fetched.snapshot.specialty_order,
        vec!["Cardiology", "Neurology"]
    );

    let asha = &fetched.snapshot.doctors[0];
    assert!(!asha.has_schedule_today);
    assert_eq!(asha.room, None);
    assert_eq!(asha.start_time, None);

    let farid = &fetched.snapshot.doctors[1];
    assert!(farid.has_schedule_today);
    assert_eq!(farid.room.as_deref(), Some("4"));
    assert_eq!(farid.start_time.as_deref(), Some("15:30"));
}

#[tokio::test]
async fn server_errors_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/doctors"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let client = portal(&server);

    match client.get_doctors().await {
        Err(FetchError::InvalidStatusCode(url, status)) => {
            assert!(url.ends_with("/api/doctors"));
            assert_eq!(status.as_u16(), 503);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(fetch_snapshot(&client, &Snapshot::default(), None)
        .await
        .is_err());
}

#[tokio::test]
async fn malformed_json_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    assert!(matches!(
        portal(&server).get_doctors().await,
        Err(FetchError::Decode(_, _))
    ));
}

#[tokio::test]
async fn poster_size_is_read_from_the_image() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doctor-promo/7"))
        .and(query_param("v", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png(30, 50)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/doctor-promo/8"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not an image"))
        .mount(&server)
        .await;
    let client = portal(&server);

    assert_eq!(client.get_poster_size("7", "2").await.unwrap(), (30, 50));
    assert!(matches!(
        client.get_poster_size("8", "1").await,
        Err(FetchError::Image(_, _))
    ));
}

#[tokio::test]
async fn push_listener_forwards_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(header("accept", "text/event-stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(
                    ": connected\n\nevent: doctor_update\ndata: {\"id\": 2}\n\nevent: ignored\ndata: x\n\nevent: patient_display_settings\ndata: {\"rotate_ms\": 5000}\n\n",
                ),
        )
        .mount(&server)
        .await;

    let listener = PushListener::new(
        reqwest::Client::new(),
        format!("{}/events", server.uri()),
        Duration::from_millis(10),
        Duration::from_millis(50),
        3,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(listener.run(tx));

    assert_eq!(rx.recv().await, Some(PushEvent::DoctorUpdate));
    match rx.recv().await {
        Some(PushEvent::DisplaySettings(patch)) => assert_eq!(patch.rotate_ms, Some(5000)),
        other => panic!("unexpected {:?}", other),
    }

    /* the stream ends after each body, so the listener reconnects and sees the same events */
    assert_eq!(rx.recv().await, Some(PushEvent::DoctorUpdate));
    drop(rx);
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn push_listener_gives_up_after_max_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let listener = PushListener::new(
        reqwest::Client::new(),
        format!("{}/events", server.uri()),
        Duration::from_millis(5),
        Duration::from_millis(20),
        3,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::time::timeout(Duration::from_secs(5), listener.run(tx))
        .await
        .unwrap();

    assert_eq!(rx.recv().await, None);
    assert_eq!(server.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn push_listener_reconnects_on_overlong_line() {
    let server = MockServer::start().await;
    let body = format!(
        "data: {}\n\nevent: doctor_update\ndata: {{}}\n\n",
        "x".repeat(70 * 1024)
    );
    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let listener = PushListener::new(
        reqwest::Client::new(),
        format!("{}/events", server.uri()),
        Duration::from_millis(10),
        Duration::from_millis(50),
        3,
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(listener.run(tx));

    /* every connection breaks before the event after the long line */
    assert!(tokio::time::timeout(Duration::from_millis(500), rx.recv())
        .await
        .is_err());
    assert!(server.received_requests().await.unwrap().len() >= 2);
    handle.abort();
}
