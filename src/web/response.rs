use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::delay::DeadlineExceeded;
use crate::params::{BenchmarkDelay, SimulationParameters};
use crate::simulation::SimulationOutcome;

/// Map one finished trial to a status code and JSON body.
///
/// `elapsed` is the measured wall time of the handler; only the benchmark
/// reports it, every other capability reports the simulated values.
pub fn compose(
    params: &SimulationParameters,
    outcome: &SimulationOutcome,
    elapsed: Duration,
    method: &Method,
) -> (StatusCode, Value) {
    let method = method.as_str();
    match *params {
        SimulationParameters::Availability { success_rate } => {
            if outcome.succeeded.unwrap_or(false) {
                (
                    StatusCode::OK,
                    json!({ "status": "available", "success_rate": success_rate, "method": method }),
                )
            } else {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    json!({ "status": "unavailable", "success_rate": success_rate, "method": method }),
                )
            }
        }
        SimulationParameters::ErrorRate { error_rate } => {
            if outcome.succeeded.unwrap_or(true) {
                (
                    StatusCode::OK,
                    json!({ "status": "success", "error_rate": error_rate, "method": method }),
                )
            } else {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "simulated_error", "error_rate": error_rate, "method": method }),
                )
            }
        }
        SimulationParameters::Performance { max_delay_ms } => (
            StatusCode::OK,
            json!({
                "latency_ms": millis(outcome.induced_delay.unwrap_or_default()),
                "max_delay": max_delay_ms,
                "method": method,
            }),
        ),
        SimulationParameters::Benchmark(delay) => {
            let delay_ms = match delay {
                BenchmarkDelay::Fixed(ms) => ms,
                _ => millis(outcome.induced_delay.unwrap_or_default()),
            };
            (
                StatusCode::OK,
                json!({ "latency_ms": millis(elapsed), "delay_ms": delay_ms, "method": method }),
            )
        }
    }
}

/// Body for a request whose deadline fired during the simulated delay
pub fn deadline_exceeded(err: &DeadlineExceeded, method: &Method) -> (StatusCode, Value) {
    (
        StatusCode::GATEWAY_TIMEOUT,
        json!({
            "error": "deadline_exceeded",
            "elapsed_ms": millis(err.elapsed),
            "method": method.as_str(),
        }),
    )
}

pub fn health(version: &str) -> Value {
    json!({ "status": "ok", "version": version })
}

fn millis(d: Duration) -> u64 {
    d.as_millis() as u64
}
