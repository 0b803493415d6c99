//! User-visible notification channel.
//!
//! Recoverable failures (network errors, short history, push channels that
//! fail to open) are sent here as [`Notice`]s. The UI shell drains the
//! receiving end; nothing is retried.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

/// Sending half of the notification channel. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: Sender<Notice>,
}

/// Create a connected notifier / receiver pair.
pub fn channel() -> (Notifier, Receiver<Notice>) {
    let (tx, rx) = mpsc::channel();
    (Notifier { tx }, rx)
}

impl Notifier {
    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            NoticeLevel::Info => tracing::info!(%message, "notice"),
            NoticeLevel::Warning => tracing::warn!(%message, "notice"),
            NoticeLevel::Error => tracing::error!(%message, "notice"),
        }
        // a dropped receiver just means nobody is listening
        let _ = self.tx.send(Notice { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Error, message);
    }
}
