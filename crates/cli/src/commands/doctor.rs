use cils_core::config::{AppConfig, LoadOptions};
use cils_core::domain::request::RequestDraft;
use cils_core::fulfillment::FULL_PROGRESS;
use cils_core::lifecycle::{FulfillmentSettings, LifecycleManager};
use serde::Serialize;

use crate::commands::escape_json;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_fulfillment_timing(&config));
            checks.push(check_lifecycle_dry_run(&config));
            checks.push(check_async_runtime());
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in ["fulfillment_timing", "lifecycle_dry_run", "async_runtime"] {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_fulfillment_timing(config: &AppConfig) -> DoctorCheck {
    let settings = FulfillmentSettings::from(&config.fulfillment);
    let progress_ticks = settings.ticks_to_complete();
    let ready_ticks = settings.ticks_to_ready();
    let ready_ms = ready_ticks.saturating_mul(config.fulfillment.tick_interval_ms);

    DoctorCheck {
        name: "fulfillment_timing",
        status: CheckStatus::Pass,
        details: format!(
            "{} policy: progress reaches 100% after {progress_ticks} ticks, request ready after \
             {ready_ticks} ticks (~{ready_ms}ms)",
            settings.completion_policy.as_str()
        ),
    }
}

fn check_lifecycle_dry_run(config: &AppConfig) -> DoctorCheck {
    let result = LifecycleManager::new(FulfillmentSettings::from(&config.fulfillment))
        .map_err(|error| error.to_string())
        .and_then(|mut manager| {
            let id = manager.submit(&RequestDraft::default()).map_err(|error| error.to_string())?;
            manager.run_until_idle();
            let request = manager.request(id).map_err(|error| error.to_string())?;

            if !request.is_ready() || request.progress != FULL_PROGRESS {
                return Err(format!("request stopped at {}% without credentials", request.progress));
            }
            if manager.active_timers() != 0 {
                return Err(format!("{} timers left armed after Ready", manager.active_timers()));
            }
            Ok(manager.now())
        });

    match result {
        Ok(tick) => DoctorCheck {
            name: "lifecycle_dry_run",
            status: CheckStatus::Pass,
            details: format!("default request reached Ready at logical tick {tick}"),
        },
        Err(details) => {
            DoctorCheck { name: "lifecycle_dry_run", status: CheckStatus::Fail, details }
        }
    }
}

fn check_async_runtime() -> DoctorCheck {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(_runtime) => DoctorCheck {
            name: "async_runtime",
            status: CheckStatus::Pass,
            details: "tokio runtime with timers is available".to_string(),
        },
        Err(error) => DoctorCheck {
            name: "async_runtime",
            status: CheckStatus::Fail,
            details: format!("failed to initialize async runtime: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
