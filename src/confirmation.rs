//! Booking confirmations, sent off the booking path.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::ports::{ProviderDirectory, ServiceCatalog};

const FALLBACK_PROVIDER_NAME: &str = "Barbero";
const FALLBACK_SERVICE_NAME: &str = "Servicio";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Everything a confirmation message needs, already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub appointment_id: Ulid,
    pub customer_name: String,
    pub customer_email: String,
    pub start: Ms,
    pub provider_name: String,
    pub service_name: String,
    /// Self-service cancellation link carrying the token.
    pub cancellation_link: String,
}

/// Outbound delivery (email, SMS, ...).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_confirmation(&self, confirmation: &Confirmation) -> Result<(), NotifyError>;
}

/// Writes confirmations to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation(&self, confirmation: &Confirmation) -> Result<(), NotifyError> {
        info!(
            appointment_id = %confirmation.appointment_id,
            to = %confirmation.customer_email,
            provider = %confirmation.provider_name,
            service = %confirmation.service_name,
            start = confirmation.start,
            "confirmation"
        );
        Ok(())
    }
}

/// Queues confirmations for a background worker. `dispatch` never blocks and
/// never fails the caller; delivery problems are logged and counted.
#[derive(Clone)]
pub struct ConfirmationDispatcher {
    tx: mpsc::UnboundedSender<Appointment>,
}

impl ConfirmationDispatcher {
    /// Start the worker on the current tokio runtime. It runs until every
    /// dispatcher clone is dropped.
    pub fn spawn(
        providers: Arc<dyn ProviderDirectory>,
        services: Arc<dyn ServiceCatalog>,
        notifier: Arc<dyn Notifier>,
        cancellation_url: String,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            providers,
            services,
            notifier,
            cancellation_url,
        };
        let handle = tokio::spawn(worker.run(rx));
        (Self { tx }, handle)
    }

    pub fn dispatch(&self, appointment: &Appointment) {
        if self.tx.send(appointment.clone()).is_err() {
            warn!(appointment_id = %appointment.id, "confirmation worker gone; confirmation dropped");
            metrics::counter!(observability::NOTIFICATIONS_TOTAL, "status" => "dropped").increment(1);
        }
    }
}

struct Worker {
    providers: Arc<dyn ProviderDirectory>,
    services: Arc<dyn ServiceCatalog>,
    notifier: Arc<dyn Notifier>,
    cancellation_url: String,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Appointment>) {
        while let Some(appointment) = rx.recv().await {
            let confirmation = self.resolve(&appointment);
            match self.notifier.send_confirmation(&confirmation).await {
                Ok(()) => {
                    metrics::counter!(observability::NOTIFICATIONS_TOTAL, "status" => "sent").increment(1);
                    debug!(appointment_id = %appointment.id, "confirmation sent");
                }
                Err(e) => {
                    metrics::counter!(observability::NOTIFICATIONS_TOTAL, "status" => "failed").increment(1);
                    warn!(appointment_id = %appointment.id, error = %e, "confirmation failed");
                }
            }
        }
        debug!("confirmation worker stopped");
    }

    /// Lookup failures degrade to generic names; the message still goes out.
    fn resolve(&self, appointment: &Appointment) -> Confirmation {
        let provider_name = match self.providers.find(appointment.provider_id) {
            Ok(Some(p)) => p.name,
            Ok(None) => FALLBACK_PROVIDER_NAME.to_owned(),
            Err(e) => {
                warn!(provider_id = %appointment.provider_id, error = %e, "provider lookup failed");
                FALLBACK_PROVIDER_NAME.to_owned()
            }
        };
        let service_name = match self.services.get(appointment.service_id) {
            Ok(Some(s)) => s.name,
            Ok(None) => FALLBACK_SERVICE_NAME.to_owned(),
            Err(e) => {
                warn!(service_id = %appointment.service_id, error = %e, "service lookup failed");
                FALLBACK_SERVICE_NAME.to_owned()
            }
        };
        Confirmation {
            appointment_id: appointment.id,
            customer_name: appointment.customer.name.clone(),
            customer_email: appointment.customer.email.clone(),
            start: appointment.span.start,
            provider_name,
            service_name,
            cancellation_link: format!(
                "{}?token={}",
                self.cancellation_url,
                appointment.cancellation_token.as_str()
            ),
        }
    }
}
