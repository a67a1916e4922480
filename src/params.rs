use std::collections::HashMap;
use std::fmt;

use axum::http::Method;
use serde_json::{Map, Value};

use crate::config::SimulationConfig;

/// One simulated KPI dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Availability,
    Performance,
    ErrorRate,
    Benchmark,
}

impl Capability {
    pub fn name(&self) -> &'static str {
        match self {
            Capability::Availability => "availability",
            Capability::Performance => "performance",
            Capability::ErrorRate => "error_rate",
            Capability::Benchmark => "benchmark",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the delay of a benchmark trial comes from. Exactly one source wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkDelay {
    /// Explicit `delay`, used as-is
    Fixed(u64),
    /// Random draw below the caller's `max_delay`
    Bounded(u64),
    /// Random draw below the configured default bound
    DefaultBound(u64),
}

/// Validated, defaulted inputs of one simulation trial
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationParameters {
    Availability { success_rate: f64 },
    Performance { max_delay_ms: u64 },
    ErrorRate { error_rate: f64 },
    Benchmark(BenchmarkDelay),
}

/// The request data parameters are read from. GET reads the query string,
/// every other method reads the JSON body and ignores the query string.
#[derive(Debug)]
pub enum ParamInput<'a> {
    Query(&'a HashMap<String, String>),
    Body(Option<Map<String, Value>>),
}

impl<'a> ParamInput<'a> {
    pub fn select(method: &Method, query: &'a HashMap<String, String>, body: &[u8]) -> Self {
        if *method == Method::GET {
            return ParamInput::Query(query);
        }
        // Anything but a JSON object means "no overrides"
        let fields = match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        };
        ParamInput::Body(fields)
    }

    fn float(&self, key: &str) -> Option<f64> {
        match self {
            ParamInput::Query(q) => q.get(key)?.parse().ok(),
            ParamInput::Body(fields) => match fields.as_ref()?.get(key)? {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            },
        }
    }

    fn int(&self, key: &str) -> Option<i64> {
        match self {
            ParamInput::Query(q) => q.get(key)?.parse().ok(),
            ParamInput::Body(fields) => match fields.as_ref()?.get(key)? {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse().ok(),
                _ => None,
            },
        }
    }

    /// A percentage in [0, 100]; anything else is discarded
    fn rate(&self, key: &str) -> Option<f64> {
        self.float(key).filter(|r| (0.0..=100.0).contains(r))
    }

    /// A strictly positive millisecond count; anything else is discarded
    fn millis(&self, key: &str) -> Option<u64> {
        self.int(key).filter(|&ms| ms > 0).map(|ms| ms as u64)
    }
}

impl SimulationParameters {
    /// Resolve the parameters of one trial. Never fails: missing, unparseable
    /// and out-of-range values all fall back to `defaults`.
    pub fn resolve(capability: Capability, input: &ParamInput<'_>, defaults: &SimulationConfig) -> Self {
        match capability {
            Capability::Availability => SimulationParameters::Availability {
                success_rate: input.rate("success_rate").unwrap_or(defaults.success_rate),
            },
            Capability::Performance => SimulationParameters::Performance {
                max_delay_ms: input.millis("max_delay").unwrap_or(defaults.max_delay_ms),
            },
            Capability::ErrorRate => SimulationParameters::ErrorRate {
                error_rate: input.rate("error_rate").unwrap_or(defaults.error_rate),
            },
            Capability::Benchmark => {
                let delay = if let Some(ms) = input.millis("delay") {
                    BenchmarkDelay::Fixed(ms)
                } else if let Some(ms) = input.millis("max_delay") {
                    BenchmarkDelay::Bounded(ms)
                } else {
                    BenchmarkDelay::DefaultBound(defaults.max_delay_ms)
                };
                SimulationParameters::Benchmark(delay)
            }
        }
    }

    /// Convenience over [`ParamInput::select`] + [`SimulationParameters::resolve`]
    pub fn from_request(
        capability: Capability,
        method: &Method,
        query: &HashMap<String, String>,
        body: &[u8],
        defaults: &SimulationConfig,
    ) -> Self {
        let input = ParamInput::select(method, query, body);
        Self::resolve(capability, &input, defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn resolve(capability: Capability, method: Method, q: &[(&str, &str)], body: &str) -> SimulationParameters {
        SimulationParameters::from_request(capability, &method, &query(q), body.as_bytes(), &SimulationConfig::default())
    }

    #[test]
    fn test_defaults_when_nothing_supplied() {
        assert_eq!(
            resolve(Capability::Availability, Method::GET, &[], ""),
            SimulationParameters::Availability { success_rate: 99.9 }
        );
        assert_eq!(
            resolve(Capability::Performance, Method::GET, &[], ""),
            SimulationParameters::Performance { max_delay_ms: 500 }
        );
        assert_eq!(
            resolve(Capability::ErrorRate, Method::POST, &[], ""),
            SimulationParameters::ErrorRate { error_rate: 5.0 }
        );
        assert_eq!(
            resolve(Capability::Benchmark, Method::GET, &[], ""),
            SimulationParameters::Benchmark(BenchmarkDelay::DefaultBound(500))
        );
    }

    #[test]
    fn test_out_of_range_rate_uses_default_not_clamp() {
        assert_eq!(
            resolve(Capability::Availability, Method::GET, &[("success_rate", "150")], ""),
            SimulationParameters::Availability { success_rate: 99.9 }
        );
        assert_eq!(
            resolve(Capability::ErrorRate, Method::GET, &[("error_rate", "-0.5")], ""),
            SimulationParameters::ErrorRate { error_rate: 5.0 }
        );
        assert_eq!(
            resolve(Capability::ErrorRate, Method::GET, &[("error_rate", "NaN")], ""),
            SimulationParameters::ErrorRate { error_rate: 5.0 }
        );
    }

    #[test]
    fn test_rate_bounds_are_inclusive() {
        assert_eq!(
            resolve(Capability::Availability, Method::GET, &[("success_rate", "0")], ""),
            SimulationParameters::Availability { success_rate: 0.0 }
        );
        assert_eq!(
            resolve(Capability::Availability, Method::GET, &[("success_rate", "100")], ""),
            SimulationParameters::Availability { success_rate: 100.0 }
        );
    }

    #[test]
    fn test_unparseable_query_uses_default() {
        assert_eq!(
            resolve(Capability::ErrorRate, Method::GET, &[("error_rate", "abc")], ""),
            SimulationParameters::ErrorRate { error_rate: 5.0 }
        );
        assert_eq!(
            resolve(Capability::Performance, Method::GET, &[("max_delay", "1.5")], ""),
            SimulationParameters::Performance { max_delay_ms: 500 }
        );
        assert_eq!(
            resolve(Capability::Performance, Method::GET, &[("max_delay", "0")], ""),
            SimulationParameters::Performance { max_delay_ms: 500 }
        );
    }

    #[test]
    fn test_get_ignores_body() {
        assert_eq!(
            resolve(Capability::Availability, Method::GET, &[], r#"{"success_rate": 10}"#),
            SimulationParameters::Availability { success_rate: 99.9 }
        );
    }

    #[test]
    fn test_mutating_methods_ignore_query() {
        for method in [Method::POST, Method::PUT, Method::PATCH] {
            assert_eq!(
                resolve(Capability::Availability, method.clone(), &[("success_rate", "10")], ""),
                SimulationParameters::Availability { success_rate: 99.9 },
                "{method} must not read the query string"
            );
            assert_eq!(
                resolve(Capability::Availability, method, &[("success_rate", "10")], r#"{"success_rate": 42.5}"#),
                SimulationParameters::Availability { success_rate: 42.5 }
            );
        }
    }

    #[test]
    fn test_malformed_body_degrades_to_defaults() {
        for body in ["{not json", "[1,2,3]", "\"string\"", "null"] {
            assert_eq!(
                resolve(Capability::Performance, Method::POST, &[], body),
                SimulationParameters::Performance { max_delay_ms: 500 },
                "body {body:?}"
            );
        }
    }

    #[test]
    fn test_body_accepts_numeric_strings_and_rejects_other_types() {
        assert_eq!(
            resolve(Capability::Performance, Method::PUT, &[], r#"{"max_delay": "250"}"#),
            SimulationParameters::Performance { max_delay_ms: 250 }
        );
        assert_eq!(
            resolve(Capability::Performance, Method::PUT, &[], r#"{"max_delay": true}"#),
            SimulationParameters::Performance { max_delay_ms: 500 }
        );
        assert_eq!(
            resolve(Capability::Performance, Method::PUT, &[], r#"{"max_delay": 2.5}"#),
            SimulationParameters::Performance { max_delay_ms: 500 }
        );
    }

    #[test]
    fn test_benchmark_precedence() {
        // fixed delay beats max_delay
        assert_eq!(
            resolve(Capability::Benchmark, Method::GET, &[("delay", "100"), ("max_delay", "50")], ""),
            SimulationParameters::Benchmark(BenchmarkDelay::Fixed(100))
        );
        assert_eq!(
            resolve(Capability::Benchmark, Method::GET, &[("delay", "-3"), ("max_delay", "50")], ""),
            SimulationParameters::Benchmark(BenchmarkDelay::Bounded(50))
        );
        // non-positive values count as absent
        assert_eq!(
            resolve(Capability::Benchmark, Method::POST, &[], r#"{"delay": 0, "max_delay": 0}"#),
            SimulationParameters::Benchmark(BenchmarkDelay::DefaultBound(500))
        );
    }

    #[test]
    fn test_configured_defaults_are_used() {
        let defaults = SimulationConfig {
            success_rate: 50.0,
            max_delay_ms: 20,
            error_rate: 1.0,
        };
        let input = ParamInput::Body(None);
        assert_eq!(
            SimulationParameters::resolve(Capability::Availability, &input, &defaults),
            SimulationParameters::Availability { success_rate: 50.0 }
        );
        assert_eq!(
            SimulationParameters::resolve(Capability::Benchmark, &input, &defaults),
            SimulationParameters::Benchmark(BenchmarkDelay::DefaultBound(20))
        );
    }
}
