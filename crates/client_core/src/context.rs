use shared::domain::ContextKey;
use tokio::sync::watch;

/// Publishes the project or workspace the board is scoped to.
pub struct ContextSelector {
    tx: watch::Sender<ContextKey>,
}

impl ContextSelector {
    pub fn new(initial: ContextKey) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Switches context. Returns false (and wakes nobody) if `key` is already current.
    pub fn select(&self, key: ContextKey) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == key {
                return false;
            }
            *current = key;
            true
        })
    }

    pub fn current(&self) -> ContextKey {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ContextKey> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reselecting_the_same_key_does_not_wake_subscribers() {
        let selector = ContextSelector::new(ContextKey::from("project-1"));
        let mut rx = selector.subscribe();

        assert!(!selector.select(ContextKey::from("project-1")));
        assert!(!rx.has_changed().expect("sender alive"));

        assert!(selector.select(ContextKey::from("project-2")));
        rx.changed().await.expect("changed");
        assert_eq!(*rx.borrow_and_update(), ContextKey::from("project-2"));
        assert_eq!(selector.current(), ContextKey::from("project-2"));
    }
}
