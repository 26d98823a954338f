use reqwest::header::HeaderMap;
use serde::Serialize;

pub const UNITS_HEADER: &str = "x-dl-units";
pub const UNITS_LEFT_HEADER: &str = "x-dl-units-left";
pub const UNITS_RESET_HEADER: &str = "x-dl-units-reset";

/// Quota figures reported by one response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuotaReading {
    pub units: Option<f64>,
    pub units_left: Option<f64>,
    pub reset: Option<String>,
}

impl QuotaReading {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        };
        let number = |name: &str| text(name).and_then(|s| s.parse::<f64>().ok());

        Self {
            units: number(UNITS_HEADER),
            units_left: number(UNITS_LEFT_HEADER),
            reset: text(UNITS_RESET_HEADER),
        }
    }
}

/// Running quota consumption for the session. Surfaces numbers only; nothing
/// here blocks or throttles calls.
#[derive(Debug, Default)]
pub struct UsageMeter {
    calls: usize,
    last_call_units: f64,
    total_units: f64,
    units_remaining: Option<f64>,
    reset: Option<String>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, reading: QuotaReading) {
        self.calls += 1;
        self.last_call_units = reading.units.unwrap_or(0.0);
        self.total_units += self.last_call_units;

        // Keep the last known figures when a response omits them
        if reading.units_left.is_some() {
            self.units_remaining = reading.units_left;
        }
        if reading.reset.is_some() {
            self.reset = reading.reset;
        }
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            calls: self.calls,
            last_call_units: self.last_call_units,
            total_units: self.total_units,
            units_remaining: self.units_remaining,
            reset: self.reset.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSnapshot {
    pub calls: usize,
    pub last_call_units: f64,
    pub total_units: f64,
    pub units_remaining: Option<f64>,
    pub reset: Option<String>,
}
