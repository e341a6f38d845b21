use protocol::Notification;

/// Receives the notifications addressed to one session.
///
/// Handlers run on the connection's dispatch thread, or on the thread
/// installing the session while buffered notifications are replayed. Calls
/// for one session never overlap.
pub trait NotificationHandler: Send + Sync {
    /// Applies one notification.
    fn handle(&self, notification: Notification);
}
