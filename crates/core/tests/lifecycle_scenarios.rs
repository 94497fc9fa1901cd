use cils_core::{
    AccessDetails, FulfillmentSettings, LifecycleError, LifecycleEvent, LifecycleManager,
    RequestDraft, RequestId, RequestStatus, ValidationError,
};

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

#[test]
fn session_request_runs_from_submission_to_credentials() {
    let mut manager = LifecycleManager::new(FulfillmentSettings::default()).expect("manager");

    let id = manager.submit(&session_draft()).expect("valid draft");
    assert_eq!(id, RequestId(1));
    assert_eq!(manager.status_of(id), Ok(RequestStatus::Pending));

    let mut trace = vec![manager.progress_of(id).expect("progress")];
    for _ in 0..10 {
        manager.advance_by(1);
        trace.push(manager.progress_of(id).expect("progress"));
    }

    assert_eq!(trace, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    assert_eq!(
        manager.access_details_of(id).expect("known id"),
        Some(AccessDetails::new("user1", "pass1", "ssh@1"))
    );

    let history = manager.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, RequestStatus::Ready);
    assert_eq!(history[0].spec.storage_gb, 100);
    assert_eq!(manager.active_timers(), 0);
}

#[test]
fn zero_validity_period_is_rejected_without_consuming_an_id() {
    let mut manager = LifecycleManager::new(FulfillmentSettings::default()).expect("manager");

    let rejected = RequestDraft { validity_period: 0.0, ..session_draft() };
    let error = manager.submit(&rejected).expect_err("zero period must be rejected");
    assert!(matches!(
        error,
        LifecycleError::Validation(ValidationError::InvalidValidityPeriod { .. })
    ));
    assert!(manager.history().is_empty());
    assert_eq!(manager.active_timers(), 0);

    assert_eq!(manager.submit(&session_draft()), Ok(RequestId(1)));
}

#[test]
fn overlapping_requests_finish_in_submission_order() {
    let mut manager = LifecycleManager::new(FulfillmentSettings::default()).expect("manager");

    let first = manager.submit(&session_draft()).expect("first");
    manager.advance_by(4);
    let second = manager.submit(&RequestDraft::default()).expect("second");

    let ready: Vec<(RequestId, u64)> = manager
        .run_until_idle()
        .into_iter()
        .filter_map(|event| match event {
            LifecycleEvent::Ready { request_id, tick } => Some((request_id, tick)),
            _ => None,
        })
        .collect();

    assert_eq!(ready, vec![(first, 10), (second, 14)]);
    let order: Vec<RequestId> = manager.history().iter().map(|request| request.id).collect();
    assert_eq!(order, vec![first, second]);
}
