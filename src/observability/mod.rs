use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter, MeterProvider},
};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use std::time::Duration;
use tracing::debug;

/// Metrics instruments for the job engine and the source selector
///
/// Instruments live on a process-local meter provider; exporting them is
/// left to whoever embeds the crate.
#[derive(Clone)]
pub struct AppObservability {
    pub meter: Meter,
    // keeps the pipeline alive for as long as the instruments are in use
    _provider: SdkMeterProvider,

    pub job_executions: Counter<u64>,
    pub job_duration: Histogram<f64>,
    pub job_ticks_skipped: Counter<u64>,
    pub probe_outcomes: Counter<u64>,
}

impl AppObservability {
    pub fn new() -> Self {
        let provider = SdkMeterProvider::builder().build();
        let meter = provider.meter("iptv-arbiter");
        debug!("Observability configured: local metrics only");
        Self::build_with_instruments(provider, meter)
    }

    fn build_with_instruments(provider: SdkMeterProvider, meter: Meter) -> Self {
        let job_executions = meter
            .u64_counter("job_executions_total")
            .with_description("Job executions by terminal status")
            .build();
        let job_duration = meter
            .f64_histogram("job_duration_seconds")
            .with_description("Wall time of job executions")
            .build();
        let job_ticks_skipped = meter
            .u64_counter("job_ticks_skipped_total")
            .with_description("Timer ticks skipped because the job was running or blocked")
            .build();
        let probe_outcomes = meter
            .u64_counter("probe_outcomes_total")
            .with_description("URL probe outcomes by provider and status")
            .build();

        Self {
            meter,
            _provider: provider,
            job_executions,
            job_duration,
            job_ticks_skipped,
            probe_outcomes,
        }
    }

    pub fn record_job_execution(&self, name: &str, status: &str, elapsed: Duration) {
        self.job_executions.add(
            1,
            &[
                KeyValue::new("name", name.to_string()),
                KeyValue::new("status", status.to_string()),
            ],
        );
        self.job_duration
            .record(elapsed.as_secs_f64(), &[KeyValue::new("name", name.to_string())]);
    }

    pub fn record_tick_skipped(&self, name: &str) {
        self.job_ticks_skipped
            .add(1, &[KeyValue::new("name", name.to_string())]);
    }

    /// `status` is the HTTP status, or a label such as `network_error`
    pub fn record_probe_outcome(&self, provider_id: &str, status: &str) {
        self.probe_outcomes.add(
            1,
            &[
                KeyValue::new("provider", provider_id.to_string()),
                KeyValue::new("status", status.to_string()),
            ],
        );
    }
}

impl Default for AppObservability {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppObservability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppObservability").finish_non_exhaustive()
    }
}
