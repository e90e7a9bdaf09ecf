use std::sync::Arc;

use shared::domain::ContextKey;

pub mod board;
pub mod config;
pub mod context;
pub mod notify;
pub mod store;

pub use board::{BoardError, BoardEvent, BoardReconciler, MoveOutcome, MoveRequest};
pub use config::{load_settings, Settings};
pub use context::ContextSelector;
pub use notify::{
    MissingNotifier, Notification, NotificationKind, NotificationLevel, NotificationSink,
};
pub use store::{HttpItemStore, ItemStore, MissingItemStore, StoreError};

/// A reconciler wired to the HTTP backend named in `settings`, plus the
/// selector that scopes it.
pub fn connect(
    settings: &Settings,
    notifier: Arc<dyn NotificationSink>,
) -> Result<(Arc<BoardReconciler>, ContextSelector), StoreError> {
    let store = HttpItemStore::from_settings(settings)?;
    let selector = ContextSelector::new(settings.context.clone());
    let board = BoardReconciler::new(Arc::new(store), notifier, selector.subscribe());
    Ok((board, selector))
}

/// A reconciler with no backend. Every remote call fails.
pub fn disconnected(context: ContextKey) -> (Arc<BoardReconciler>, ContextSelector) {
    let selector = ContextSelector::new(context);
    let board = BoardReconciler::new(
        Arc::new(MissingItemStore),
        Arc::new(MissingNotifier),
        selector.subscribe(),
    );
    (board, selector)
}
