//! Prometheus counters for the validation endpoints
use once_cell::sync::Lazy;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    /// Validation calls, by mode (`argument` or `chain`)
    pub validations: IntCounterVec,
    /// Diagnostics produced, by severity
    pub diagnostics: IntCounterVec,
    /// Calls whose outcome asked the caller to skip, by mode
    pub skipped: IntCounterVec,
    pub duration: HistogramVec,
}

impl Metrics {
    fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("chainval".to_string()), None)?;
        let validations = IntCounterVec::new(
            Opts::new("validations_total", "Validation calls handled"),
            &["mode"],
        )?;
        let diagnostics = IntCounterVec::new(
            Opts::new("diagnostics_total", "Diagnostics produced"),
            &["severity"],
        )?;
        let skipped = IntCounterVec::new(
            Opts::new("skipped_calls_total", "Validation calls that asked for a skip"),
            &["mode"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new("validation_seconds", "Time spent validating one call"),
            &["mode"],
        )?;
        registry.register(Box::new(validations.clone()))?;
        registry.register(Box::new(diagnostics.clone()))?;
        registry.register(Box::new(skipped.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        Ok(Self {
            registry,
            validations,
            diagnostics,
            skipped,
            duration,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

static METRICS: Lazy<Metrics> =
    Lazy::new(|| Metrics::new().expect("metric names and labels are static and valid"));

/// Process-wide metrics
pub fn metrics() -> &'static Metrics {
    &METRICS
}

pub fn encode(registry: &Registry) -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).to_string())
}
