use std::time::Duration;

use anyhow::Context;
use clap::Args;
use cils_core::auth::authenticate;
use cils_core::config::{AppConfig, LoadOptions};
use cils_core::domain::request::{ProvisioningRequest, RequestDraft, RequestId};
use cils_core::errors::{ApplicationError, InterfaceError};
use cils_core::lifecycle::{FulfillmentSettings, LifecycleEvent};
use cils_core::service::ProvisioningService;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;
use uuid::Uuid;

use crate::commands::{
    CommandResult, EXIT_BAD_INPUT, EXIT_CONFIG, EXIT_RUNTIME, EXIT_UNAUTHENTICATED,
};

const COMMAND: &str = "submit";

#[derive(Debug, Clone, Default, Args)]
pub struct SubmitArgs {
    #[arg(long, default_value = "", help = "Operator email; any non-empty value signs in")]
    pub email: String,
    #[arg(long = "request-type", help = "Virtual Machine (VM), Session or Container")]
    pub request_type: Option<String>,
    #[arg(long = "os", help = "Ubuntu 18.04 or Ubuntu 20.04")]
    pub operating_system: Option<String>,
    #[arg(long, allow_negative_numbers = true, help = "CPU count, 1 to 10")]
    pub cpu: Option<i64>,
    #[arg(long, allow_negative_numbers = true, help = "GPU count, 1 to 10")]
    pub gpu: Option<i64>,
    #[arg(long, help = "8GB, 16GB or 32GB")]
    pub ram: Option<String>,
    #[arg(long, allow_negative_numbers = true, help = "Storage in GB")]
    pub storage: Option<i64>,
    #[arg(long = "validity-period", allow_negative_numbers = true)]
    pub validity_period: Option<f64>,
    #[arg(long = "validity-unit", help = "days or hours")]
    pub validity_unit: Option<String>,
    #[arg(long = "reveal-credentials", help = "Print the generated password in clear text")]
    pub reveal_credentials: bool,
}

impl SubmitArgs {
    /// Form values the operator left out fall back to the form defaults.
    pub fn draft(&self) -> RequestDraft {
        let defaults = RequestDraft::default();
        RequestDraft {
            request_type: self.request_type.clone().unwrap_or(defaults.request_type),
            operating_system: self.operating_system.clone().unwrap_or(defaults.operating_system),
            cpu: self.cpu.unwrap_or(defaults.cpu),
            gpu: self.gpu.unwrap_or(defaults.gpu),
            ram: self.ram.clone().unwrap_or(defaults.ram),
            storage: self.storage.unwrap_or(defaults.storage),
            validity_period: self.validity_period.unwrap_or(defaults.validity_period),
            validity_unit: self.validity_unit.clone().unwrap_or(defaults.validity_unit),
        }
    }
}

#[derive(Debug, Serialize)]
struct SubmitReport {
    command: &'static str,
    status: &'static str,
    operator: String,
    correlation_id: String,
    request: ProvisioningRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials: Option<RevealedCredentials>,
}

#[derive(Debug, Serialize)]
struct RevealedCredentials {
    os_username: String,
    password: String,
    ssh_access: String,
}

/// Signs in, submits the draft to a live provisioning service and blocks until the request is
/// ready. Every lifecycle event of the request is handed to `on_event` as it happens.
pub fn run(args: &SubmitArgs, mut on_event: impl FnMut(&LifecycleEvent)) -> CommandResult {
    let operator = match authenticate(&args.email) {
        Ok(operator) => operator,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "unauthenticated",
                error.to_string(),
                EXIT_UNAUTHENTICATED,
            );
        }
    };

    let correlation_id = Uuid::new_v4().to_string();
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return interface_failure(ApplicationError::from(error).into_interface(correlation_id));
        }
    };

    let runtime = match build_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(COMMAND, "runtime", format!("{error:#}"), EXIT_RUNTIME);
        }
    };

    let draft = args.draft();
    let request = match runtime.block_on(provision(&config, &draft, &mut on_event)) {
        Ok(request) => request,
        Err(error) => return interface_failure(error.into_interface(correlation_id.as_str())),
    };

    let credentials = request.access_details.as_ref().filter(|_| args.reveal_credentials).map(
        |details| RevealedCredentials {
            os_username: details.os_username.clone(),
            password: details.password().to_string(),
            ssh_access: details.ssh_access.clone(),
        },
    );

    let human = format!(
        "submit: request {} is {} at {}% for {}",
        request.id,
        request.status.as_str(),
        request.progress,
        operator.email
    );
    let report = CommandResult::report(&SubmitReport {
        command: COMMAND,
        status: "ok",
        operator: operator.email,
        correlation_id,
        request,
        credentials,
    });

    CommandResult { exit_code: 0, output: format!("{human}\n{}", report.output) }
}

async fn provision(
    config: &AppConfig,
    draft: &RequestDraft,
    on_event: &mut impl FnMut(&LifecycleEvent),
) -> Result<ProvisioningRequest, ApplicationError> {
    let service = ProvisioningService::from_config(config)?;
    let mut events = service.subscribe();
    let id = service.submit(draft).await?;

    let budget = ready_budget(config);
    let streamed = tokio::select! {
        streamed = tokio::time::timeout(
            budget,
            stream_until_ready(&service, &mut events, id, on_event),
        ) => streamed,
        _ = tokio::signal::ctrl_c() => {
            return Err(ApplicationError::Runtime(format!(
                "interrupted while request {id} was in flight"
            )));
        }
    };
    match streamed {
        Ok(Ok(())) => {}
        Ok(Err(message)) => return Err(ApplicationError::Runtime(message)),
        Err(_) => {
            return Err(ApplicationError::Runtime(format!(
                "request {id} was not ready within {}ms",
                budget.as_millis()
            )));
        }
    }

    let request = service.request(id).await?;
    service.shutdown().await;
    Ok(request)
}

async fn stream_until_ready(
    service: &ProvisioningService,
    events: &mut broadcast::Receiver<LifecycleEvent>,
    id: RequestId,
    on_event: &mut impl FnMut(&LifecycleEvent),
) -> Result<(), String> {
    loop {
        match events.recv().await {
            Ok(event) if event.request_id() == id => {
                on_event(&event);
                if matches!(event, LifecycleEvent::Ready { .. }) {
                    return Ok(());
                }
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(
                    event_name = "cli.submit.events_lagged",
                    request_id = id.0,
                    skipped,
                    "progress stream fell behind"
                );
                let ready = service.request(id).await.map_err(|error| error.to_string())?;
                if ready.is_ready() {
                    return Ok(());
                }
            }
            Err(RecvError::Closed) => {
                return Err("event stream closed before the request became ready".to_string());
            }
        }
    }
}

/// Real time the configured fulfillment should take, plus two ticks of slack.
fn ready_budget(config: &AppConfig) -> Duration {
    let units = FulfillmentSettings::from(&config.fulfillment).ticks_to_ready();
    let tick_ms = config.fulfillment.tick_interval_ms;
    Duration::from_millis(tick_ms.saturating_mul(units.saturating_add(2)))
}

fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")
}

fn interface_failure(error: InterfaceError) -> CommandResult {
    warn!(
        event_name = "cli.submit.failed",
        correlation_id = error.correlation_id(),
        error = %error,
        "submit command failed"
    );

    let (error_class, exit_code, message) = match &error {
        InterfaceError::BadRequest { user_message, .. } => {
            ("bad_request", EXIT_BAD_INPUT, user_message.clone())
        }
        InterfaceError::Misconfigured { message, .. } => {
            ("config_validation", EXIT_CONFIG, message.clone())
        }
        InterfaceError::NotFound { .. } | InterfaceError::Internal { .. } => {
            ("runtime", EXIT_RUNTIME, error.user_message().to_string())
        }
    };
    CommandResult::failure(COMMAND, error_class, message, exit_code)
}
