use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use metrics::{counter, histogram};
use tracing::{error, info, warn};
use uuid::Uuid;

use bookrack_core::normalizer::{EventFailureClass, RegistrationNormalizer};
use bookrack_storage::{NewRegistrationEvent, NewUser};

use crate::problem::ProblemResponse;
use crate::router::AppState;

const HEADER_MESSAGE_ID: &str = "X-Message-Id";

/// Message-delivery boundary for user registration events.
///
/// Delivery is at least once: the raw payload is recorded keyed by the
/// transport message id, and a redelivered id is acknowledged without
/// reprocessing. Normalizer and saga failures are logged and counted but
/// never surface as a processing crash that would stall the inbound stream.
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    let start = Instant::now();
    let message_id = get_required_header(&headers, HEADER_MESSAGE_ID)?;

    counter!("registration_ingress_total").increment(1);

    let body_string = String::from_utf8(body.to_vec()).map_err(|_| {
        histogram!("ingest_ack_latency_seconds").record(start.elapsed().as_secs_f64());
        ProblemResponse::new(
            StatusCode::BAD_REQUEST,
            "invalid_payload",
            "request body must be valid UTF-8",
        )
    })?;

    let record = NewRegistrationEvent {
        id: Uuid::new_v4(),
        msg_id: message_id,
        payload_json: &body_string,
        received_at: state.now(),
    };
    let outcome = state
        .storage()
        .registration_events()
        .insert(&record)
        .await
        .map_err(|err| {
            error!(stage = "ingress", %message_id, error = %err, "failed to record registration payload");
            histogram!("ingest_ack_latency_seconds").record(start.elapsed().as_secs_f64());
            ProblemResponse::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                "failed to record registration payload",
            )
        })?;

    if outcome.is_duplicate() {
        info!(stage = "ingress", %message_id, "duplicate registration message skipped");
        counter!("registration_duplicate_total").increment(1);
    } else {
        process_pipeline(&state, message_id, body_string.as_bytes()).await;
    }

    histogram!("ingest_ack_latency_seconds").record(start.elapsed().as_secs_f64());
    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(axum::body::Body::empty())
        .unwrap())
}

/// Runs the normalization, user creation, and provisioning steps for one
/// message.
async fn process_pipeline(state: &AppState, message_id: &str, payload: &[u8]) {
    let user = match RegistrationNormalizer::normalize(payload) {
        Ok(user) => user,
        Err(err) => {
            match err.class() {
                EventFailureClass::Malformed => {
                    error!(stage = "normalizer", %message_id, error = %err, "dropped malformed registration event");
                }
                EventFailureClass::Incomplete => {
                    warn!(stage = "normalizer", %message_id, error = %err, "dropped incomplete registration event");
                }
            }
            counter!("registration_dropped_total", "reason" => err.class().as_str()).increment(1);
            return;
        }
    };

    let user_id = user.id;
    if let Err(err) = state
        .storage()
        .users()
        .create(&NewUser::from_domain(&user, state.now()))
        .await
    {
        error!(stage = "registration", %message_id, %user_id, error = %err, "failed to persist user");
        counter!("registration_dropped_total", "reason" => "storage").increment(1);
        return;
    }
    counter!("registrations_total").increment(1);

    match state.provisioner().provision_defaults(user_id).await {
        Ok(report) => {
            info!(
                stage = "provisioning",
                %message_id,
                %user_id,
                created = report.created.len(),
                failed = report.failures.len(),
                "default reading lists provisioned"
            );
        }
        Err(err) => {
            error!(stage = "provisioning", %message_id, %user_id, error = %err, "provisioning saga aborted");
        }
    }
}

fn get_required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ProblemResponse> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ProblemResponse::new(
                StatusCode::BAD_REQUEST,
                "missing_header",
                format!("missing header {name}"),
            )
        })
}
