//! Real-time driver for the lifecycle manager.
//!
//! One logical unit passes per `tick_interval`. Missed intervals are delayed rather than burst,
//! so a stalled runtime slows fulfillment down instead of replaying it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::credentials::{CredentialIssuer, DeterministicCredentialIssuer};
use crate::domain::request::{AccessDetails, ProvisioningRequest, RequestDraft, RequestId};
use crate::lifecycle::{FulfillmentSettings, LifecycleError, LifecycleEvent, LifecycleManager};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("provisioning service stopped before request {0} became ready")]
    Stopped(RequestId),
}

pub struct ProvisioningService<C = DeterministicCredentialIssuer> {
    manager: Arc<Mutex<LifecycleManager<C>>>,
    events: broadcast::Sender<LifecycleEvent>,
    driver: Option<JoinHandle<()>>,
}

impl ProvisioningService {
    pub fn from_config(config: &AppConfig) -> Result<Self, LifecycleError> {
        let manager = LifecycleManager::new(FulfillmentSettings::from(&config.fulfillment))?;
        Ok(Self::start(manager, Duration::from_millis(config.fulfillment.tick_interval_ms)))
    }
}

impl<C> ProvisioningService<C>
where
    C: CredentialIssuer + 'static,
{
    /// Spawns the driver task. Must be called from within a tokio runtime.
    pub fn start(manager: LifecycleManager<C>, tick_interval: Duration) -> Self {
        let manager = Arc::new(Mutex::new(manager));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let tick_interval = tick_interval.max(Duration::from_millis(1));

        let driver = tokio::spawn(drive(manager.clone(), events.clone(), tick_interval));
        info!(
            event_name = "service.driver.started",
            tick_interval_ms = tick_interval.as_millis() as u64,
            "provisioning driver started"
        );

        Self { manager, events, driver: Some(driver) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub async fn submit(&self, draft: &RequestDraft) -> Result<RequestId, LifecycleError> {
        let mut manager = self.manager.lock().await;
        let request_id = manager.submit(draft)?;
        // Sent under the guard so the driver cannot publish a tick for this request first.
        let _ = self.events.send(LifecycleEvent::Submitted { request_id, tick: manager.now() });
        Ok(request_id)
    }

    pub async fn progress_of(&self, id: RequestId) -> Result<u8, LifecycleError> {
        self.manager.lock().await.progress_of(id)
    }

    pub async fn access_details_of(
        &self,
        id: RequestId,
    ) -> Result<Option<AccessDetails>, LifecycleError> {
        self.manager.lock().await.access_details_of(id)
    }

    pub async fn request(&self, id: RequestId) -> Result<ProvisioningRequest, LifecycleError> {
        self.manager.lock().await.request(id)
    }

    pub async fn history(&self) -> Vec<ProvisioningRequest> {
        self.manager.lock().await.history()
    }

    /// Resolves with the final snapshot once `id` is Ready.
    pub async fn wait_until_ready(
        &self,
        id: RequestId,
    ) -> Result<ProvisioningRequest, ServiceError> {
        // Subscribe before the status check so a Ready event cannot slip between the two.
        let mut receiver = self.events.subscribe();

        loop {
            let snapshot = self.request(id).await?;
            if snapshot.is_ready() {
                return Ok(snapshot);
            }

            loop {
                match receiver.recv().await {
                    Ok(LifecycleEvent::Ready { request_id, .. }) if request_id == id => break,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(
                            event_name = "service.events.lagged",
                            request_id = id.0,
                            skipped,
                            "ready waiter fell behind; rechecking status"
                        );
                        break;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(ServiceError::Stopped(id));
                    }
                }
            }
        }
    }

    /// Stops the driver. Requests still in flight are abandoned where they stand.
    pub async fn shutdown(mut self) -> Vec<ProvisioningRequest> {
        if let Some(driver) = self.driver.take() {
            driver.abort();
            let _ = driver.await;
        }
        info!(event_name = "service.driver.stopped", "provisioning driver stopped");
        self.manager.lock().await.history()
    }
}

impl<C> Drop for ProvisioningService<C> {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

async fn drive<C>(
    manager: Arc<Mutex<LifecycleManager<C>>>,
    events: broadcast::Sender<LifecycleEvent>,
    tick_interval: Duration,
) where
    C: CredentialIssuer,
{
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; logical unit 1 is one full interval away.
    interval.tick().await;

    loop {
        interval.tick().await;
        let fired = manager.lock().await.advance_by(1);
        for event in fired {
            let _ = events.send(event);
        }
    }
}
