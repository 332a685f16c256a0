//! Notifications that the data manager broadcasts to every listening view

use std::fmt::{Display, Error, Formatter};

use crate::manager::migration::MigrationReport;

/// How many notifications a slow listener may lag behind before it misses some
const NOTIFICATION_CAPACITY: usize = 64;

/// Something that listening views may want to react to
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// The remote store has been confirmed ready, and is now the source of truth
    BackendOnline,
    /// The remote store refused access to a collection.
    /// Sent once, until a remote read succeeds again
    PermissionDenied { collection: String },
    /// The content of a collection changed, views showing it should refresh
    CollectionChanged { collection: String },
    /// A write has been rejected
    WriteFailed { collection: String, reason: String },
    /// The one-time migration sweep is over
    MigrationFinished(MigrationReport),
}

impl Display for Notification {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            Notification::BackendOnline => write!(f, "Remote store is online"),
            Notification::PermissionDenied{collection} => write!(f, "Permission denied for {}", collection),
            Notification::CollectionChanged{collection} => write!(f, "{} changed", collection),
            Notification::WriteFailed{collection, reason} => write!(f, "Unable to save to {}: {}", collection, reason),
            Notification::MigrationFinished(report) => write!(f, "Migration finished: {}", report),
        }
    }
}


/// See [`notification_channel`]
pub type NotificationSender = tokio::sync::broadcast::Sender<Notification>;
/// See [`notification_channel`]
pub type NotificationReceiver = tokio::sync::broadcast::Receiver<Notification>;

/// Create a notification channel. Every receiver gets every notification sent after it subscribed
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    tokio::sync::broadcast::channel(NOTIFICATION_CAPACITY)
}

/// Send a notification to the listeners (if any).
pub(crate) fn notify(sender: &NotificationSender, notification: Notification) {
    log::debug!("Notification: {}", notification);
    // Having no listener is fine
    let _ = sender.send(notification);
}
