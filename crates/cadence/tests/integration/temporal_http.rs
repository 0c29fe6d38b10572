/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Contract tests for the Temporal HTTP client against a mock server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cadence::scheduler::{
    IntervalSpec, OverlapPolicy, Schedule, ScheduleAction, ScheduleSpec,
};
use cadence::{
    DeleteOutcome, GatewayError, ReconcilerConfig, ScheduleHandle, SchedulerClient, SchedulerError,
    SchedulerGateway, TemporalHttpClient, TemporalHttpConfig, UpsertOutcome,
};

const SCHEDULE_PATH: &str = "/api/v1/namespaces/reminders/schedules/reminder-1";

fn client(server: &MockServer) -> TemporalHttpClient {
    TemporalHttpClient::new(TemporalHttpConfig {
        base_url: server.uri(),
        api_key: Some("secret".into()),
        request_timeout: Duration::from_secs(2),
        ..TemporalHttpConfig::default()
    })
    .unwrap()
}

fn hourly() -> Schedule {
    let mut spec = ScheduleSpec::in_zone("UTC");
    spec.intervals
        .push(IntervalSpec::every(Duration::from_secs(3600)));
    Schedule {
        spec,
        action: ScheduleAction {
            workflow_type: "reminder_fire".into(),
            args: vec![json!({"entity": {"kind": "reminder", "id": 1}, "delete_after": false})],
        },
        overlap: OverlapPolicy::Skip,
    }
}

#[tokio::test]
async fn create_posts_the_schedule_with_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCHEDULE_PATH))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "schedule": {"action": {"startWorkflow": {"workflowType": {"name": "reminder_fire"}}}}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .create_schedule(&ScheduleHandle::reminder(1), &hourly())
        .await
        .unwrap();
}

#[tokio::test]
async fn conflict_and_missing_map_to_race_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCHEDULE_PATH))
        .respond_with(
            ResponseTemplate::new(409)
                .set_body_json(json!({"code": 6, "message": "schedule already exists"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(SCHEDULE_PATH))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"code": 5, "message": "not found"})),
        )
        .mount(&server)
        .await;

    let client = client(&server);
    let handle = ScheduleHandle::reminder(1);
    let err = client.create_schedule(&handle, &hourly()).await.unwrap_err();
    assert!(matches!(err, SchedulerError::AlreadyExists(_)), "{err:?}");
    let err = client.delete_schedule(&handle).await.unwrap_err();
    assert!(matches!(err, SchedulerError::NotFound(_)), "{err:?}");
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SCHEDULE_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let err = client(&server)
        .describe_schedule(&ScheduleHandle::reminder(1))
        .await
        .unwrap_err();
    assert!(err.is_transient(), "{err:?}");
}

#[tokio::test]
async fn gateway_converges_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(SCHEDULE_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"code": 6})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/update", SCHEDULE_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(SCHEDULE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "schedule": {"state": {"paused": false}},
            "info": {"futureActionTimes": ["2030-01-01T10:00:00Z", "2030-01-01T11:00:00Z"]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(SCHEDULE_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"code": 5})))
        .mount(&server)
        .await;

    let config = ReconcilerConfig::builder()
        .visibility_retry(1, Duration::from_millis(1))
        .build()
        .unwrap();
    let gateway = SchedulerGateway::new(Arc::new(client(&server)), &config);
    let handle = ScheduleHandle::reminder(1);

    let outcome = gateway.upsert(&handle, &hourly()).await.unwrap();
    assert_eq!(outcome, UpsertOutcome::Updated);
    assert_eq!(
        gateway.next_fire_time(&handle).await.unwrap(),
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap())
    );
    assert_eq!(
        gateway.delete(&handle).await.unwrap(),
        DeleteOutcome::AlreadyGone
    );
}

#[tokio::test]
async fn gateway_describe_returns_server_errors_after_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(SCHEDULE_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(1)
        .mount(&server)
        .await;

    let config = ReconcilerConfig::builder()
        .visibility_retry(5, Duration::from_millis(1))
        .build()
        .unwrap();
    let gateway = SchedulerGateway::new(Arc::new(client(&server)), &config);

    let err = gateway
        .next_fire_time(&ScheduleHandle::reminder(1))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Describe { .. }), "{err:?}");
    assert!(err.scheduler_error().is_transient());
}
