//! Domain counters, exported through the process-wide Prometheus recorder.

use metrics::counter;

pub fn record_upload(outcome: &'static str) {
    counter!("uploads_total", "outcome" => outcome).increment(1);
}

pub fn record_analysis(outcome: &'static str) {
    counter!("analysis_runs_total", "outcome" => outcome).increment(1);
}

pub fn record_payment_verification(outcome: &'static str) {
    counter!("payment_verifications_total", "outcome" => outcome).increment(1);
}

pub fn record_plan_activation(plan: &'static str) {
    counter!("plan_activations_total", "plan" => plan).increment(1);
}
