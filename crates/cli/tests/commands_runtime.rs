use std::env;
use std::sync::{Mutex, OnceLock};

use cils_cli::commands::submit::SubmitArgs;
use cils_cli::commands::{catalog, config, doctor, smoke, submit};
use cils_core::lifecycle::LifecycleEvent;
use serde_json::Value;

#[test]
fn catalog_lists_options_and_form_defaults() {
    let result = catalog::run();
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "catalog");
    assert_eq!(payload["catalog"]["request_types"][0], "Virtual Machine (VM)");
    assert_eq!(payload["catalog"]["ram"].as_array().map(Vec::len), Some(3));
    assert_eq!(payload["catalog"]["cpu"].as_array().map(Vec::len), Some(10));
    assert_eq!(payload["catalog"]["defaults"]["storage"], 100);
    assert_eq!(payload["catalog"]["defaults"]["validity_unit"], "days");
}

#[test]
fn submit_requires_an_email() {
    with_env(&[], || {
        let result = submit::run(&SubmitArgs::default(), |_| {});
        assert_eq!(result.exit_code, 4, "expected unauthenticated exit code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "submit");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "unauthenticated");
    });
}

#[test]
fn submit_rejects_non_positive_validity_period() {
    with_env(&[("CILS_FULFILLMENT_TICK_INTERVAL_MS", "1")], || {
        let args = SubmitArgs {
            email: "ops@example.com".to_string(),
            validity_period: Some(0.0),
            ..SubmitArgs::default()
        };
        let mut events = Vec::new();
        let result = submit::run(&args, |event| events.push(event.clone()));
        assert_eq!(result.exit_code, 3, "expected bad input exit code");
        assert!(events.is_empty(), "rejected draft must not emit lifecycle events");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "bad_request");
        assert_eq!(payload["message"], "Please enter a positive validity period.");
    });
}

#[test]
fn submit_streams_progress_until_ready() {
    with_env(&[("CILS_FULFILLMENT_TICK_INTERVAL_MS", "1")], || {
        let args = SubmitArgs {
            email: "ops@example.com".to_string(),
            request_type: Some("Session".to_string()),
            operating_system: Some("Ubuntu 20.04".to_string()),
            cpu: Some(2),
            gpu: Some(1),
            ram: Some("16GB".to_string()),
            validity_period: Some(3.0),
            reveal_credentials: true,
            ..SubmitArgs::default()
        };

        let mut progress = Vec::new();
        let result = submit::run(&args, |event| {
            if let LifecycleEvent::ProgressAdvanced { progress: value, .. } = event {
                progress.push(*value);
            }
        });
        assert_eq!(result.exit_code, 0, "expected successful submit: {}", result.output);
        assert_eq!(progress, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["operator"], "ops@example.com");
        assert_eq!(payload["request"]["id"], 1);
        assert_eq!(payload["request"]["status"], "ready");
        assert_eq!(payload["request"]["accessDetails"]["password"], "<redacted>");
        assert_eq!(payload["credentials"]["os_username"], "user1");
        assert_eq!(payload["credentials"]["password"], "pass1");
        assert_eq!(payload["credentials"]["ssh_access"], "ssh@1");
    });
}

#[test]
fn submit_returns_config_failure_for_invalid_env() {
    with_env(&[("CILS_FULFILLMENT_PROGRESS_STEP", "0")], || {
        let args = SubmitArgs { email: "ops@example.com".to_string(), ..SubmitArgs::default() };
        let result = submit::run(&args, |_| {});
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"]
            .as_str()
            .is_some_and(|message| message.contains("fulfillment.progress_step")));
    });
}

#[test]
fn smoke_returns_success_report_with_default_env() {
    with_env(&[], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected smoke success: {}", result.output);

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "pass");
        assert_eq!(payload["checks"].as_array().map(Vec::len), Some(5));
    });
}

#[test]
fn smoke_returns_failure_when_config_invalid() {
    with_env(&[("CILS_FULFILLMENT_TICK_INTERVAL_MS", "0")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure exit code");

        let payload = parse_payload(last_line(&result.output));
        assert_eq!(payload["command"], "smoke");
        assert_eq!(payload["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
    });
}

#[test]
fn config_attributes_env_sources() {
    with_env(&[("CILS_LOG_LEVEL", "debug")], || {
        let result = config::run();
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("- logging.level = debug (source: env (CILS_LOG_LEVEL))"));
        assert!(result.output.contains("- fulfillment.progress_step = 10 (source: default)"));
        assert!(result.output.contains("- fulfillment.completion_policy = decoupled"));
    });
}

#[test]
fn doctor_json_reports_lifecycle_readiness() {
    with_env(&[("CILS_FULFILLMENT_COMPLETION_POLICY", "linked")], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "pass");

        let checks = payload["checks"].as_array().cloned().unwrap_or_default();
        let names: Vec<&str> = checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert_eq!(
            names,
            vec!["config_validation", "fulfillment_timing", "lifecycle_dry_run", "async_runtime"]
        );
        assert!(checks[1]["details"].as_str().is_some_and(|details| details.starts_with("linked")));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CILS_FULFILLMENT_TICK_INTERVAL_MS",
        "CILS_FULFILLMENT_PROGRESS_STEP",
        "CILS_FULFILLMENT_CREDENTIAL_DELAY_TICKS",
        "CILS_FULFILLMENT_COMPLETION_POLICY",
        "CILS_LOGGING_LEVEL",
        "CILS_LOGGING_FORMAT",
        "CILS_LOG_LEVEL",
        "CILS_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
