use crate::domain::notification::{Email, Notification};
use crate::domain::ports::NotificationDispatcher;
use crate::error::{OrderError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Writes notifications and emails to the log instead of delivering them.
#[derive(Default, Clone, Copy)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            order_id = %notification.order_id,
            recipient = %notification.recipient,
            kind = ?notification.kind,
            title = %notification.title,
            "notification"
        );
        Ok(())
    }

    async fn email(&self, email: Email) -> Result<()> {
        info!(to = %email.address, subject = %email.subject, "email");
        Ok(())
    }
}

#[derive(Default)]
struct Outbox {
    notifications: Vec<Notification>,
    emails: Vec<Email>,
}

/// Keeps everything it is asked to deliver. Can be switched to fail.
#[derive(Default, Clone)]
pub struct RecordingDispatcher {
    outbox: Arc<Mutex<Outbox>>,
    failing: Arc<AtomicBool>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .notifications
            .clone()
    }

    pub fn emails(&self) -> Vec<Email> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emails
            .clone()
    }

    fn ensure_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(OrderError::Internal(Box::new(std::io::Error::other(
                "notification channel unavailable",
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.ensure_available()?;
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .notifications
            .push(notification);
        Ok(())
    }

    async fn email(&self, email: Email) -> Result<()> {
        self.ensure_available()?;
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .emails
            .push(email);
        Ok(())
    }
}
