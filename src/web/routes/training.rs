//! Start/stop/status handlers for the background training job.

use std::convert::Infallible;

use hyper::{Body, Request, Response, StatusCode};
use serde::Serialize;

use crate::config;
use crate::trainer::hyperparams::parse_form_overrides;
use crate::web::request_parsing::parse_form_body;
use crate::web::response_helpers::{json_error, json_raw, json_response};
use crate::web::worker::{SharedSupervisor, StopOutcome};
use crate::{log_error, log_info};

#[derive(Serialize)]
struct StatusResponse {
    is_training: bool,
}

/// `POST /start_training`: validate the form and launch the trainer process.
pub async fn handle_start(
    req: Request<Body>,
    supervisor: SharedSupervisor,
) -> Result<Response<Body>, Infallible> {
    let form = match parse_form_body(req.into_body()).await {
        Ok(form) => form,
        Err(error_response) => return Ok(error_response),
    };

    let environment = form
        .get("environment")
        .cloned()
        .unwrap_or_else(|| "cartpole".to_string());

    if config::lookup_env(&environment).is_none() {
        log_info!("[TRAINING] Rejected unknown environment {:?}", environment);
        return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid environment"));
    }

    let num_timestamps = form
        .get("num_timestamps")
        .map(String::as_str)
        .unwrap_or("1000000");
    let total_timesteps: u64 = match num_timestamps.trim().parse() {
        Ok(n) => n,
        Err(_) => {
            return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid timestep count"));
        }
    };

    let mut args = vec!["--total-timesteps".to_string(), total_timesteps.to_string()];

    // The toggle selects the trainer's built-in defaults; otherwise every
    // form value is coerced against the metadata table and forwarded
    let use_default_hyperparameters = form
        .get("hyperparameterToggle")
        .map(|v| v == "on")
        .unwrap_or(false);

    if !use_default_hyperparameters {
        let overrides = match parse_form_overrides(&form) {
            Ok(overrides) => overrides,
            Err(e) => {
                log_error!("[TRAINING] Bad hyperparameter: {}", e);
                return Ok(json_error(StatusCode::BAD_REQUEST, &e.to_string()));
            }
        };
        for o in overrides {
            args.push(format!("--{}", o.name.replace('_', "-")));
            args.push(o.value.to_string());
        }
    }

    match supervisor.start(&environment, &args) {
        Ok(()) => Ok(json_raw(
            StatusCode::OK,
            r#"{"status":"started"}"#.to_string(),
        )),
        Err(e) => {
            log_error!("[TRAINING] Failed to start training: {}", e);
            Ok(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Failed to start training: {e}"),
            ))
        }
    }
}

/// `POST /stop_training`: terminate the job, escalating if needed.
pub async fn handle_stop(supervisor: SharedSupervisor) -> Result<Response<Body>, Infallible> {
    match supervisor.stop() {
        Ok(StopOutcome::Stopped) => Ok(json_raw(
            StatusCode::OK,
            r#"{"status":"stopped"}"#.to_string(),
        )),
        Ok(StopOutcome::NotRunning) => Ok(json_raw(
            StatusCode::OK,
            r#"{"status":"not_running"}"#.to_string(),
        )),
        Err(e) => {
            log_error!("[TRAINING] Error stopping training: {}", e);
            Ok(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("Error stopping training: {e}"),
            ))
        }
    }
}

/// `GET /training_status`: liveness flag polled by the frontend.
pub async fn handle_status(supervisor: SharedSupervisor) -> Result<Response<Body>, Infallible> {
    Ok(json_response(
        StatusCode::OK,
        &StatusResponse {
            is_training: supervisor.is_running(),
        },
    ))
}
