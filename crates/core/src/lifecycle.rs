//! Provisioning request lifecycle.
//!
//! [`LifecycleManager`] is the only owner of submitted requests. It validates drafts, assigns
//! ids, keeps the append-only history and drives every request's fulfillment from its own
//! logical-time [`Scheduler`]. Nothing happens between calls: timers fire only inside
//! [`LifecycleManager::advance_to`] and friends.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use crate::clock::{Clock, SystemClock};
use crate::config::FulfillmentConfig;
use crate::credentials::{CredentialIssuer, DeterministicCredentialIssuer};
use crate::domain::request::{
    AccessDetails, ProvisioningRequest, RequestDraft, RequestId, RequestStatus, ValidatedDraft,
};
use crate::fulfillment::{CompletionPolicy, FulfillmentError, FulfillmentProcess, FULL_PROGRESS};
use crate::identity::IdentityAllocator;
use crate::scheduler::{DeadlineOverflow, FiredTimer, Scheduler, Tick, TimerId, TimerKind};
use crate::validation::{validate, ValidationError};

const AUDIT_ACTOR: &str = "lifecycle-manager";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FulfillmentSettings {
    pub progress_step: u8,
    pub progress_interval: u64,
    pub credential_delay: u64,
    pub completion_policy: CompletionPolicy,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            progress_step: 10,
            progress_interval: 1,
            credential_delay: 10,
            completion_policy: CompletionPolicy::Decoupled,
        }
    }
}

impl FulfillmentSettings {
    /// Logical ticks from submission until progress reads 100.
    pub fn ticks_to_complete(&self) -> u64 {
        let steps = FULL_PROGRESS.div_ceil(self.progress_step.max(1));
        u64::from(steps).saturating_mul(self.progress_interval.max(1))
    }

    /// Logical ticks from submission until the request is Ready.
    pub fn ticks_to_ready(&self) -> u64 {
        match self.completion_policy {
            CompletionPolicy::Decoupled => self.credential_delay,
            CompletionPolicy::Linked => self.ticks_to_complete(),
        }
    }

    /// Latest deadline any timer of a fresh request can reach.
    fn horizon(&self) -> u64 {
        match self.completion_policy {
            CompletionPolicy::Decoupled => self.ticks_to_complete().max(self.credential_delay),
            CompletionPolicy::Linked => self.ticks_to_complete(),
        }
    }
}

impl From<&FulfillmentConfig> for FulfillmentSettings {
    fn from(config: &FulfillmentConfig) -> Self {
        Self {
            progress_step: config.progress_step,
            progress_interval: 1,
            credential_delay: config.credential_delay_ticks,
            completion_policy: config.completion_policy,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Submitted { request_id: RequestId, tick: Tick },
    ProgressAdvanced { request_id: RequestId, progress: u8, tick: Tick },
    CredentialsIssued { request_id: RequestId, tick: Tick },
    Ready { request_id: RequestId, tick: Tick },
}

impl LifecycleEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::Submitted { request_id, .. }
            | Self::ProgressAdvanced { request_id, .. }
            | Self::CredentialsIssued { request_id, .. }
            | Self::Ready { request_id, .. } => *request_id,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unknown request id {0}")]
    UnknownRequest(RequestId),
    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),
    #[error("logical clock cannot fit another request: {0}")]
    ClockExhausted(#[from] DeadlineOverflow),
}

#[derive(Debug)]
struct RequestEntry {
    id: RequestId,
    spec: ValidatedDraft,
    created_at: DateTime<Utc>,
    submitted_at_tick: Tick,
    process: FulfillmentProcess,
    progress_timer: Option<TimerId>,
    credential_timer: Option<TimerId>,
}

impl RequestEntry {
    fn snapshot(&self) -> ProvisioningRequest {
        ProvisioningRequest {
            id: self.id,
            spec: self.spec.clone(),
            created_at: self.created_at,
            submitted_at_tick: self.submitted_at_tick,
            status: self.process.status(),
            progress: self.process.progress(),
            access_details: self.process.access_details().cloned(),
        }
    }
}

pub struct LifecycleManager<C = DeterministicCredentialIssuer> {
    settings: FulfillmentSettings,
    issuer: C,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    identities: IdentityAllocator,
    scheduler: Scheduler,
    // Ids are dense and start at 1, so request `n` lives at index `n - 1`.
    requests: Vec<RequestEntry>,
}

impl LifecycleManager {
    pub fn new(settings: FulfillmentSettings) -> Result<Self, LifecycleError> {
        Self::with_issuer(settings, DeterministicCredentialIssuer)
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::build(FulfillmentSettings::default(), DeterministicCredentialIssuer)
    }
}

impl<C> LifecycleManager<C>
where
    C: CredentialIssuer,
{
    pub fn with_issuer(settings: FulfillmentSettings, issuer: C) -> Result<Self, LifecycleError> {
        FulfillmentProcess::new(settings.progress_step)?;
        Ok(Self::build(settings, issuer))
    }

    fn build(settings: FulfillmentSettings, issuer: C) -> Self {
        Self {
            settings,
            issuer,
            clock: Arc::new(SystemClock),
            audit: Arc::new(NoopAuditSink),
            identities: IdentityAllocator::new(),
            scheduler: Scheduler::new(),
            requests: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &FulfillmentSettings {
        &self.settings
    }

    /// Validates and accepts a draft. A rejected draft changes nothing: no id is consumed,
    /// no history entry is written and no timer is armed. Drafts are also rejected once the
    /// logical clock is too close to its end to hold every deadline of a new request.
    pub fn submit(&mut self, draft: &RequestDraft) -> Result<RequestId, LifecycleError> {
        let spec = match validate(draft) {
            Ok(spec) => spec,
            Err(error) => {
                warn!(
                    event_name = "lifecycle.request.rejected",
                    field = error.field(),
                    error = %error,
                    "provisioning request rejected"
                );
                self.audit.emit(
                    AuditEvent::new(
                        None,
                        "lifecycle.request_rejected",
                        AuditCategory::Validation,
                        AUDIT_ACTOR,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("field", error.field())
                    .with_metadata("error", error.to_string()),
                );
                return Err(error.into());
            }
        };

        let process = FulfillmentProcess::new(self.settings.progress_step)?;
        if let Err(overflow) = self.scheduler.deadline_after(self.settings.horizon()) {
            warn!(
                event_name = "lifecycle.request.clock_exhausted",
                tick = overflow.now,
                horizon = overflow.delay,
                "provisioning request rejected; logical clock exhausted"
            );
            self.audit.emit(
                AuditEvent::new(
                    None,
                    "lifecycle.request_rejected",
                    AuditCategory::Fulfillment,
                    AUDIT_ACTOR,
                    AuditOutcome::Rejected,
                )
                .with_metadata("tick", overflow.now.to_string())
                .with_metadata("horizon", overflow.delay.to_string()),
            );
            return Err(overflow.into());
        }

        let id = self.identities.allocate();
        let tick = self.scheduler.now();

        // Both deadlines sit within the horizon checked above.
        let progress_timer = self.scheduler.schedule_every(
            id,
            TimerKind::ProgressTick,
            self.settings.progress_interval,
        )?;
        let credential_timer = match self.settings.completion_policy {
            CompletionPolicy::Decoupled => Some(self.scheduler.schedule_once(
                id,
                TimerKind::CredentialIssue,
                self.settings.credential_delay,
            )?),
            CompletionPolicy::Linked => None,
        };

        info!(
            event_name = "lifecycle.request.submitted",
            request_id = id.0,
            request_type = spec.request_type.as_str(),
            operating_system = spec.operating_system.as_str(),
            tick,
            "provisioning request accepted"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(id),
                "lifecycle.request_submitted",
                AuditCategory::Ingress,
                AUDIT_ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("request_type", spec.request_type.as_str())
            .with_metadata("completion_policy", self.settings.completion_policy.as_str())
            .with_metadata("tick", tick.to_string()),
        );

        self.requests.push(RequestEntry {
            id,
            spec,
            created_at: self.clock.now(),
            submitted_at_tick: tick,
            process,
            progress_timer: Some(progress_timer),
            credential_timer,
        });

        Ok(id)
    }

    pub fn progress_of(&self, id: RequestId) -> Result<u8, LifecycleError> {
        self.entry(id).map(|entry| entry.process.progress())
    }

    pub fn status_of(&self, id: RequestId) -> Result<RequestStatus, LifecycleError> {
        self.entry(id).map(|entry| entry.process.status())
    }

    pub fn access_details_of(
        &self,
        id: RequestId,
    ) -> Result<Option<AccessDetails>, LifecycleError> {
        self.entry(id).map(|entry| entry.process.access_details().cloned())
    }

    pub fn request(&self, id: RequestId) -> Result<ProvisioningRequest, LifecycleError> {
        self.entry(id).map(RequestEntry::snapshot)
    }

    /// Every accepted request in submission order, in-flight and completed alike.
    pub fn history(&self) -> Vec<ProvisioningRequest> {
        self.requests.iter().map(RequestEntry::snapshot).collect()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn now(&self) -> Tick {
        self.scheduler.now()
    }

    pub fn next_deadline(&self) -> Option<Tick> {
        self.scheduler.next_deadline()
    }

    pub fn active_timers(&self) -> usize {
        self.scheduler.active_timers()
    }

    pub fn active_timers_for(&self, id: RequestId) -> Result<usize, LifecycleError> {
        self.entry(id).map(|entry| self.scheduler.active_timers_for(entry.id))
    }

    pub fn advance_by(&mut self, units: u64) -> Vec<LifecycleEvent> {
        self.advance_to(self.scheduler.now().saturating_add(units))
    }

    /// Fires every timer due up to and including `target`, then parks the clock at `target`.
    pub fn advance_to(&mut self, target: Tick) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Some(fired) = self.scheduler.pop_due(target) {
            self.fire(fired, &mut events);
        }
        self.scheduler.settle_at(target);
        events
    }

    /// Advances deadline by deadline until no timer is left.
    pub fn run_until_idle(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Some(deadline) = self.scheduler.next_deadline() {
            events.extend(self.advance_to(deadline));
        }
        events
    }

    fn entry(&self, id: RequestId) -> Result<&RequestEntry, LifecycleError> {
        usize::try_from(id.0)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|index| self.requests.get(index))
            .ok_or(LifecycleError::UnknownRequest(id))
    }

    fn index_of(&self, id: RequestId) -> Option<usize> {
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        (index < self.requests.len()).then_some(index)
    }

    fn fire(&mut self, fired: FiredTimer, events: &mut Vec<LifecycleEvent>) {
        let Some(index) = self.index_of(fired.request_id) else {
            self.scheduler.cancel(fired.id);
            return;
        };

        match fired.kind {
            TimerKind::ProgressTick => self.on_progress_tick(index, fired, events),
            TimerKind::CredentialIssue => {
                self.requests[index].credential_timer = None;
                self.issue_credentials(index, fired.due, events);
            }
        }
    }

    fn on_progress_tick(
        &mut self,
        index: usize,
        fired: FiredTimer,
        events: &mut Vec<LifecycleEvent>,
    ) {
        let entry = &mut self.requests[index];
        let transition = match entry.process.advance() {
            Ok(transition) => transition,
            Err(error) => {
                warn!(
                    event_name = "lifecycle.progress.stale_timer",
                    request_id = entry.id.0,
                    error = %error,
                    "progress timer fired for a finished ticker; releasing it"
                );
                entry.progress_timer = None;
                self.scheduler.cancel(fired.id);
                return;
            }
        };

        debug!(
            event_name = "lifecycle.progress.advanced",
            request_id = entry.id.0,
            progress = transition.progress_after,
            tick = fired.due,
            "fulfillment progress advanced"
        );
        events.push(LifecycleEvent::ProgressAdvanced {
            request_id: entry.id,
            progress: transition.progress_after,
            tick: fired.due,
        });

        if transition.progress_after < FULL_PROGRESS {
            return;
        }

        if let Some(timer) = entry.progress_timer.take() {
            self.scheduler.cancel(timer);
        }
        if self.settings.completion_policy == CompletionPolicy::Linked {
            self.issue_credentials(index, fired.due, events);
        }
    }

    fn issue_credentials(&mut self, index: usize, tick: Tick, events: &mut Vec<LifecycleEvent>) {
        let details = self.issuer.issue(self.requests[index].id);
        let entry = &mut self.requests[index];

        let transition = match entry.process.complete(details) {
            Ok(transition) => transition,
            Err(error) => {
                warn!(
                    event_name = "lifecycle.credentials.rejected",
                    request_id = entry.id.0,
                    error = %error,
                    "credential issue ignored"
                );
                return;
            }
        };

        let timers = [entry.progress_timer.take(), entry.credential_timer.take()];
        for timer in timers.into_iter().flatten() {
            self.scheduler.cancel(timer);
        }

        if transition.progress_before < FULL_PROGRESS {
            events.push(LifecycleEvent::ProgressAdvanced {
                request_id: entry.id,
                progress: transition.progress_after,
                tick,
            });
        }
        events.push(LifecycleEvent::CredentialsIssued { request_id: entry.id, tick });
        events.push(LifecycleEvent::Ready { request_id: entry.id, tick });

        info!(
            event_name = "lifecycle.request.ready",
            request_id = entry.id.0,
            tick,
            elapsed_ticks = tick.saturating_sub(entry.submitted_at_tick),
            "provisioning request ready; access details issued"
        );
        self.audit.emit(
            AuditEvent::new(
                Some(entry.id),
                "lifecycle.request_ready",
                AuditCategory::Credentials,
                AUDIT_ACTOR,
                AuditOutcome::Success,
            )
            .with_metadata("tick", tick.to_string())
            .with_metadata("progress_before", transition.progress_before.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use crate::clock::FixedClock;
    use crate::credentials::CredentialIssuer;
    use crate::domain::request::{AccessDetails, RequestDraft, RequestId, RequestStatus};
    use crate::fulfillment::{CompletionPolicy, FulfillmentError};
    use crate::scheduler::DeadlineOverflow;
    use crate::validation::ValidationError;

    use super::{FulfillmentSettings, LifecycleError, LifecycleEvent, LifecycleManager};

    fn session_draft() -> RequestDraft {
        RequestDraft {
            request_type: "Session".to_string(),
            operating_system: "Ubuntu 20.04".to_string(),
            cpu: 2,
            gpu: 1,
            ram: "16GB".to_string(),
            storage: 100,
            validity_period: 3.0,
            validity_unit: "days".to_string(),
        }
    }

    fn invalid_period_draft() -> RequestDraft {
        RequestDraft { validity_period: 0.0, ..session_draft() }
    }

    #[test]
    fn ids_increase_by_one_per_accepted_submission() {
        let mut manager = LifecycleManager::default();
        let ids: Vec<RequestId> = (0..3)
            .map(|_| manager.submit(&session_draft()).expect("submission should succeed"))
            .collect();

        assert_eq!(ids, vec![RequestId(1), RequestId(2), RequestId(3)]);
    }

    #[test]
    fn rejected_submission_consumes_nothing() {
        let mut manager = LifecycleManager::default();

        let error = manager.submit(&invalid_period_draft()).expect_err("should be rejected");
        assert!(matches!(
            error,
            LifecycleError::Validation(ValidationError::InvalidValidityPeriod { .. })
        ));
        assert!(manager.history().is_empty());
        assert_eq!(manager.active_timers(), 0);

        assert_eq!(manager.submit(&session_draft()), Ok(RequestId(1)));
    }

    #[test]
    fn new_request_is_pending_without_credentials() {
        let mut manager = LifecycleManager::default();
        let id = manager.submit(&session_draft()).expect("submit");

        assert_eq!(manager.progress_of(id), Ok(0));
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Pending));
        assert_eq!(manager.access_details_of(id), Ok(None));
        assert_eq!(manager.active_timers_for(id), Ok(2));
    }

    #[test]
    fn progress_trace_runs_zero_to_one_hundred_in_ten_ticks() {
        let mut manager = LifecycleManager::default();
        let id = manager.submit(&session_draft()).expect("submit");

        let mut trace = vec![manager.progress_of(id).expect("known id")];
        for _ in 0..10 {
            manager.advance_by(1);
            trace.push(manager.progress_of(id).expect("known id"));
        }

        assert_eq!(trace, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Ready));
        assert_eq!(
            manager.access_details_of(id),
            Ok(Some(AccessDetails::new("user1", "pass1", "ssh@1")))
        );
    }

    #[test]
    fn credentials_stay_absent_until_the_delay_elapses() {
        let mut manager = LifecycleManager::default();
        let id = manager.submit(&session_draft()).expect("submit");

        manager.advance_by(9);
        assert_eq!(manager.progress_of(id), Ok(90));
        assert_eq!(manager.access_details_of(id), Ok(None));

        let events = manager.advance_by(1);
        assert_eq!(
            events,
            vec![
                LifecycleEvent::ProgressAdvanced { request_id: id, progress: 100, tick: 10 },
                LifecycleEvent::CredentialsIssued { request_id: id, tick: 10 },
                LifecycleEvent::Ready { request_id: id, tick: 10 },
            ]
        );
    }

    #[test]
    fn ready_request_releases_its_timers() {
        let mut manager = LifecycleManager::default();
        let id = manager.submit(&session_draft()).expect("submit");

        manager.advance_by(10);
        assert_eq!(manager.active_timers_for(id), Ok(0));
        assert_eq!(manager.next_deadline(), None);

        assert!(manager.advance_by(50).is_empty());
        assert_eq!(manager.progress_of(id), Ok(100));
    }

    #[test]
    fn unknown_ids_are_rejected_by_every_query() {
        let mut manager = LifecycleManager::default();
        manager.submit(&session_draft()).expect("submit");

        for id in [RequestId(0), RequestId(2), RequestId(u64::MAX)] {
            assert_eq!(manager.progress_of(id), Err(LifecycleError::UnknownRequest(id)));
            assert_eq!(manager.access_details_of(id), Err(LifecycleError::UnknownRequest(id)));
            assert!(manager.request(id).is_err());
        }
    }

    #[test]
    fn history_keeps_submission_order_and_live_state() {
        let mut manager = LifecycleManager::default();
        manager.submit(&session_draft()).expect("first");
        manager.advance_by(5);
        manager.submit(&RequestDraft::default()).expect("second");
        manager.submit(&invalid_period_draft()).expect_err("rejected");

        let history = manager.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, RequestId(1));
        assert_eq!(history[0].progress, 50);
        assert_eq!(history[0].status, RequestStatus::Provisioning);
        assert_eq!(history[1].id, RequestId(2));
        assert_eq!(history[1].submitted_at_tick, 5);
        assert_eq!(history[1].progress, 0);
    }

    #[test]
    fn requests_progress_independently() {
        let mut manager = LifecycleManager::default();
        let first = manager.submit(&session_draft()).expect("first");
        manager.advance_by(4);
        let second = manager.submit(&session_draft()).expect("second");

        manager.advance_by(6);
        assert_eq!(manager.status_of(first), Ok(RequestStatus::Ready));
        assert_eq!(manager.progress_of(second), Ok(60));
        assert_eq!(manager.access_details_of(second), Ok(None));

        manager.advance_by(4);
        assert_eq!(
            manager.access_details_of(second),
            Ok(Some(AccessDetails::new("user2", "pass2", "ssh@2")))
        );
    }

    #[test]
    fn linked_policy_issues_credentials_on_full_progress() {
        let settings = FulfillmentSettings {
            progress_step: 25,
            credential_delay: 1_000,
            completion_policy: CompletionPolicy::Linked,
            ..FulfillmentSettings::default()
        };
        let mut manager = LifecycleManager::new(settings).expect("valid settings");
        let id = manager.submit(&session_draft()).expect("submit");
        assert_eq!(manager.active_timers_for(id), Ok(1));

        manager.advance_by(3);
        assert_eq!(manager.access_details_of(id), Ok(None));

        manager.advance_by(1);
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Ready));
        assert!(manager.access_details_of(id).expect("known id").is_some());
        assert_eq!(manager.active_timers(), 0);
    }

    #[test]
    fn decoupled_credentials_can_finish_before_the_ticker() {
        let settings =
            FulfillmentSettings { credential_delay: 3, ..FulfillmentSettings::default() };
        let mut manager = LifecycleManager::new(settings).expect("valid settings");
        let id = manager.submit(&session_draft()).expect("submit");

        let events = manager.advance_by(3);
        assert!(events.contains(&LifecycleEvent::ProgressAdvanced {
            request_id: id,
            progress: 100,
            tick: 3
        }));
        assert_eq!(manager.progress_of(id), Ok(100));
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Ready));
        assert_eq!(manager.active_timers(), 0);
    }

    #[test]
    fn decoupled_ticker_can_finish_before_credentials() {
        let settings =
            FulfillmentSettings { progress_step: 50, ..FulfillmentSettings::default() };
        let mut manager = LifecycleManager::new(settings).expect("valid settings");
        let id = manager.submit(&session_draft()).expect("submit");

        manager.advance_by(2);
        assert_eq!(manager.progress_of(id), Ok(100));
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Provisioning));
        assert_eq!(manager.access_details_of(id), Ok(None));
        assert_eq!(manager.active_timers_for(id), Ok(1));

        manager.advance_by(8);
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Ready));
    }

    #[test]
    fn run_until_idle_finishes_everything() {
        let mut manager = LifecycleManager::default();
        manager.submit(&session_draft()).expect("first");
        manager.advance_by(3);
        manager.submit(&session_draft()).expect("second");

        let events = manager.run_until_idle();
        let ready = events
            .iter()
            .filter(|event| matches!(event, LifecycleEvent::Ready { .. }))
            .count();
        assert_eq!(ready, 2);
        assert_eq!(manager.now(), 13);
        assert!(manager.history().iter().all(|request| request.is_ready()));
    }

    #[test]
    fn rejects_invalid_progress_step() {
        let settings = FulfillmentSettings { progress_step: 0, ..FulfillmentSettings::default() };
        assert!(matches!(
            LifecycleManager::new(settings),
            Err(LifecycleError::Fulfillment(FulfillmentError::InvalidStep(0)))
        ));
    }

    #[test]
    fn snapshots_carry_clock_time_and_audit_trail() {
        let created_at = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).single().expect("valid time");
        let sink = InMemoryAuditSink::default();
        let mut manager = LifecycleManager::default()
            .with_clock(Arc::new(FixedClock::new(created_at)))
            .with_audit_sink(Arc::new(sink.clone()));

        manager.submit(&invalid_period_draft()).expect_err("rejected");
        let id = manager.submit(&session_draft()).expect("accepted");
        manager.run_until_idle();

        let snapshot = manager.request(id).expect("known id");
        assert_eq!(snapshot.created_at, created_at);

        let events = sink.events();
        let types: Vec<&str> = events.iter().map(|event| event.event_type.as_str()).collect();
        assert_eq!(
            types,
            vec![
                "lifecycle.request_rejected",
                "lifecycle.request_submitted",
                "lifecycle.request_ready"
            ]
        );
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
        assert_eq!(events[0].metadata.get("field").map(String::as_str), Some("validity_period"));
    }

    #[test]
    fn tick_counts_follow_step_interval_and_policy() {
        let defaults = FulfillmentSettings::default();
        assert_eq!(defaults.ticks_to_complete(), 10);
        assert_eq!(defaults.ticks_to_ready(), 10);

        let slow = FulfillmentSettings {
            progress_step: 30,
            progress_interval: 2,
            credential_delay: 3,
            ..FulfillmentSettings::default()
        };
        assert_eq!(slow.ticks_to_complete(), 8);
        assert_eq!(slow.ticks_to_ready(), 3);

        let linked = FulfillmentSettings { completion_policy: CompletionPolicy::Linked, ..slow };
        assert_eq!(linked.ticks_to_ready(), 8);
    }

    #[test]
    fn linked_request_is_ready_after_ticks_to_ready() {
        let settings = FulfillmentSettings {
            progress_step: 30,
            completion_policy: CompletionPolicy::Linked,
            ..FulfillmentSettings::default()
        };
        let mut manager = LifecycleManager::new(settings).expect("valid settings");
        let id = manager.submit(&session_draft()).expect("submit");

        manager.advance_by(settings.ticks_to_ready() - 1);
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Provisioning));
        manager.advance_by(1);
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Ready));
    }

    #[test]
    fn submission_is_refused_when_the_clock_has_run_out() {
        let sink = InMemoryAuditSink::default();
        let mut manager = LifecycleManager::default().with_audit_sink(Arc::new(sink.clone()));
        manager.advance_by(u64::MAX);

        let error = manager.submit(&session_draft()).expect_err("no room for deadlines");
        assert_eq!(
            error,
            LifecycleError::ClockExhausted(DeadlineOverflow { now: u64::MAX, delay: 10 })
        );
        assert!(manager.history().is_empty());
        assert_eq!(manager.active_timers(), 0);
        assert!(manager.advance_by(5).is_empty());

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, AuditCategory::Fulfillment);
        assert_eq!(events[0].outcome, AuditOutcome::Rejected);
    }

    #[test]
    fn request_submitted_near_the_end_of_the_clock_still_takes_ten_ticks() {
        let mut manager = LifecycleManager::default();
        manager.advance_to(u64::MAX - 10);
        let id = manager.submit(&session_draft()).expect("deadlines still fit");

        manager.advance_by(5);
        assert_eq!(manager.progress_of(id), Ok(50));
        assert_eq!(manager.access_details_of(id), Ok(None));

        manager.advance_by(5);
        assert_eq!(manager.status_of(id), Ok(RequestStatus::Ready));
        assert_eq!(manager.now(), u64::MAX);
        assert_eq!(manager.active_timers(), 0);
    }

    struct PrefixIssuer;

    impl CredentialIssuer for PrefixIssuer {
        fn issue(&self, request_id: RequestId) -> AccessDetails {
            AccessDetails::new(format!("ops{request_id}"), "static", format!("ops@{request_id}"))
        }
    }

    #[test]
    fn custom_issuer_is_used_for_credentials() {
        let mut manager =
            LifecycleManager::with_issuer(FulfillmentSettings::default(), PrefixIssuer)
                .expect("valid settings");
        let id = manager.submit(&session_draft()).expect("submit");
        manager.run_until_idle();

        let details = manager.access_details_of(id).expect("known id").expect("ready");
        assert_eq!(details.os_username, "ops1");
        assert_eq!(details.password(), "static");
    }
}
