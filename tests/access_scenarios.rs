//! End-to-end access and presence scenarios
//!
//! Runs the full component wiring in memory against a fake remote device
//! that records every command it receives.

use axum::{extract::State, http::Uri, routing::get, Json, Router};
use roomgate::access_engine::{ReasonCode, Verdict};
use roomgate::credential_store::EnrollRequest;
use roomgate::detector::{DetectedPerson, DetectionReport, DetectorError, ScriptedDetector};
use roomgate::presence_aggregator::PresenceUpdate;
use roomgate::room_state::UNKNOWN_LABEL;
use roomgate::{AppConfig, AppState};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Commands = Arc<Mutex<Vec<String>>>;

async fn record_command(State(commands): State<Commands>, uri: Uri) -> &'static str {
    commands.lock().unwrap().push(uri.to_string());
    "ok"
}

/// Fake microcontroller on an ephemeral port
async fn spawn_device() -> (String, Commands) {
    let commands: Commands = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/status", get(|| async { Json(json!({"wifi": "ok"})) }))
        .fallback(record_command)
        .with_state(commands.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), commands)
}

async fn setup(
    detector: ScriptedDetector,
) -> (AppState, Arc<ScriptedDetector>, Commands) {
    let (device_url, commands) = spawn_device().await;
    let config = AppConfig {
        device_base_url: device_url,
        device_timeout: Duration::from_secs(1),
        ..AppConfig::default()
    };

    let state = AppState::assemble(config, None).unwrap();
    state
        .credentials
        .enroll(EnrollRequest {
            name: "Israel".to_string(),
            rfid: "6C3ACB33".to_string(),
        })
        .await
        .unwrap();

    let detector = Arc::new(detector);
    state.detector.init(detector.clone()).await;
    (state, detector, commands)
}

fn sent(commands: &Commands) -> Vec<String> {
    commands.lock().unwrap().clone()
}

#[tokio::test]
async fn scenario_a_confirmed_identity_is_granted() {
    let (state, _, commands) = setup(ScriptedDetector::always(Ok(DetectionReport::new(vec![
        DetectedPerson::recognized("Israel", 40.0),
    ]))))
    .await;

    let decision = state.access.evaluate("6C3ACB33").await.unwrap();

    assert_eq!(decision.verdict, Verdict::Granted);
    assert_eq!(decision.reason, ReasonCode::IdentityConfirmed);
    assert!(decision.device.is_delivered());

    let room = state.room.read().await.unwrap();
    assert!(room.light_accent);
    assert!(!room.light_denied);
    assert_eq!(room.last_rfid, "6C3ACB33");

    assert_eq!(sent(&commands), vec!["/rfid_result?resultado=permitido_Israel"]);
}

#[tokio::test]
async fn scenario_b_vision_unavailable_is_denied() {
    let (state, _, commands) = setup(ScriptedDetector::always(Err(DetectorError::Camera(
        "device busy".to_string(),
    ))))
    .await;

    let decision = state.access.evaluate("6C3ACB33").await.unwrap();

    assert_eq!(decision.verdict, Verdict::Denied);
    assert_eq!(decision.reason, ReasonCode::VisionUnavailable);

    let room = state.room.read().await.unwrap();
    assert!(room.light_denied);
    assert!(!room.light_accent);

    assert_eq!(sent(&commands), vec!["/rfid_result?resultado=negado"]);
}

#[tokio::test]
async fn scenario_c_unknown_token_never_reaches_detector() {
    let (state, detector, commands) = setup(ScriptedDetector::always(Ok(DetectionReport::new(
        vec![DetectedPerson::recognized("Israel", 10.0)],
    ))))
    .await;

    let decision = state.access.evaluate("DEADBEEF").await.unwrap();

    assert_eq!(decision.verdict, Verdict::Denied);
    assert_eq!(decision.reason, ReasonCode::CredentialRejected);
    assert_eq!(detector.calls(), 0);
    assert_eq!(sent(&commands), vec!["/rfid_result?resultado=negado"]);
}

#[tokio::test]
async fn scenario_d_unmatched_persons_count_as_unknown() {
    let (state, _, commands) = setup(ScriptedDetector::always(Ok(DetectionReport::new(vec![
        DetectedPerson::recognized("Israel", 95.0),
        DetectedPerson::unrecognized(),
    ]))))
    .await;

    let update = state.presence.tick(None).await.unwrap();
    assert!(matches!(update, PresenceUpdate::Updated { .. }));

    let room = update.state();
    assert_eq!(room.people_count(), 2);
    assert!(room.has_presence());
    assert_eq!(room.detected_people().occurrences(UNKNOWN_LABEL), 2);

    assert_eq!(sent(&commands), vec!["/presenca?tem_presenca=yes"]);
}

#[tokio::test]
async fn denied_checks_leave_presence_alone() {
    let (state, detector, _) = setup(ScriptedDetector::new(
        vec![Ok(DetectionReport::new(vec![DetectedPerson::recognized("Israel", 20.0)]))],
        Ok(DetectionReport::empty()),
    ))
    .await;

    state.presence.tick(None).await.unwrap();
    for _ in 0..3 {
        let decision = state.access.evaluate("6C3ACB33").await.unwrap();
        assert_eq!(decision.reason, ReasonCode::IdentityNotConfirmed);
    }

    let room = state.room.read().await.unwrap();
    assert_eq!(room.people_count(), 1);
    assert!(room.detected_people().contains("Israel"));
    assert_eq!(detector.calls(), 4);
}

#[tokio::test]
async fn concurrent_checks_share_the_camera() {
    let (state, detector, _) = setup(
        ScriptedDetector::always(Ok(DetectionReport::new(vec![DetectedPerson::recognized(
            "Israel", 30.0,
        )])))
        .with_delay(Duration::from_millis(50)),
    )
    .await;

    let checks: Vec<_> = (0..5)
        .map(|_| {
            let access = state.access.clone();
            tokio::spawn(async move { access.evaluate("6C3ACB33").await })
        })
        .collect();
    let presence = state.presence.clone();
    let tick = tokio::spawn(async move { presence.tick(None).await });

    for check in checks {
        let decision = check.await.unwrap().unwrap();
        assert_eq!(decision.verdict, Verdict::Granted);
    }
    assert!(matches!(tick.await.unwrap().unwrap(), PresenceUpdate::Updated { .. }));

    assert_eq!(detector.max_concurrent(), 1);
    assert_eq!(detector.calls(), 6);
    assert!(state.room.read().await.unwrap().invariant_holds());
}
