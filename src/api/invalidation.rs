// src/api/invalidation.rs

use std::fmt;

use tokio::sync::broadcast;

/// Remote collections a mutation can invalidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Subjects,
    Quizzes,
    Questions,
    Options,
    Users,
    Results,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Subjects => "subjects",
            Collection::Quizzes => "quizzes",
            Collection::Questions => "questions",
            Collection::Options => "options",
            Collection::Users => "users",
            Collection::Results => "results",
        };
        f.write_str(name)
    }
}

/// Fan-out of "collection changed" notifications.
///
/// Every successful mutation publishes the collection it touched; list
/// controllers hold a `Subscription` filtered to their own collection.
#[derive(Debug, Clone)]
pub struct InvalidationBus {
    sender: broadcast::Sender<Collection>,
}

impl Default for InvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InvalidationBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn publish(&self, collection: Collection) {
        // No receivers is fine: nothing is listing that collection right now.
        let receivers = self.sender.send(collection).unwrap_or(0);
        tracing::debug!("Invalidated {} ({} subscribers)", collection, receivers);
    }

    pub fn subscribe(&self, collection: Collection) -> Subscription {
        Subscription {
            collection,
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiver side bound to a single collection.
#[derive(Debug)]
pub struct Subscription {
    collection: Collection,
    receiver: broadcast::Receiver<Collection>,
}

impl Subscription {
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Drains pending notifications and reports whether any concerned this
    /// subscription's collection. A lagged receiver counts as stale.
    pub fn take_stale(&mut self) -> bool {
        let mut stale = false;
        loop {
            match self.receiver.try_recv() {
                Ok(c) if c == self.collection => stale = true,
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(_)) => stale = true,
                Err(_) => break,
            }
        }
        stale
    }

    /// Waits for the next invalidation of this collection.
    /// Returns `false` once the bus is gone.
    pub async fn changed(&mut self) -> bool {
        loop {
            match self.receiver.recv().await {
                Ok(c) if c == self.collection => return true,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => return true,
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_only_sees_own_collection() {
        let bus = InvalidationBus::new();
        let mut subjects = bus.subscribe(Collection::Subjects);
        let mut quizzes = bus.subscribe(Collection::Quizzes);

        bus.publish(Collection::Subjects);

        assert!(subjects.take_stale());
        assert!(!quizzes.take_stale());
        assert!(!subjects.take_stale());
    }

    #[tokio::test]
    async fn test_changed_skips_other_collections() {
        let bus = InvalidationBus::new();
        let mut users = bus.subscribe(Collection::Users);
        bus.publish(Collection::Results);
        bus.publish(Collection::Users);
        assert!(users.changed().await);
    }

    #[test]
    fn test_publish_without_subscribers() {
        InvalidationBus::new().publish(Collection::Options);
    }
}
