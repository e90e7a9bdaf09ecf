use std::sync::Arc;

use shared::{
    domain::{ContextKey, Item, ItemId, Lane},
    protocol::{ItemPatch, NewItem},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, watch, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    notify::{Notification, NotificationKind, NotificationSink},
    store::{ItemStore, StoreError},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    pub item_id: ItemId,
    pub source_lane: Lane,
    pub dest_lane: Lane,
    pub source_index: usize,
    pub dest_index: usize,
}

impl MoveRequest {
    pub fn new(
        item_id: impl Into<String>,
        (source_lane, source_index): (Lane, usize),
        (dest_lane, dest_index): (Lane, usize),
    ) -> Self {
        Self {
            item_id: ItemId::new(item_id),
            source_lane,
            dest_lane,
            source_index,
            dest_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The item was not at the given source position; nothing happened.
    Ignored,
    /// Source and destination are the same slot; nothing happened.
    Unchanged,
    Committed,
    /// The store refused the move. Local state was restored and a reload was forced.
    RolledBack(StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoardEvent {
    Changed,
    Reloaded { context: ContextKey, items: usize },
    Notification(Notification),
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("failed to load board for context '{context}': {source}")]
    Load {
        context: ContextKey,
        #[source]
        source: StoreError,
    },
    #[error("failed to {action} item: {source}")]
    Store {
        action: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("board context changed from '{requested}' to '{current}' while loading")]
    StaleContext {
        requested: ContextKey,
        current: ContextKey,
    },
}

#[derive(Debug, PartialEq, Eq)]
enum MoveSkip {
    NotFound,
    Unchanged,
}

/// Everything an optimistic move overwrote.
#[derive(Debug, Clone)]
struct MoveSnapshot {
    item: Item,
    displaced: Vec<(ItemId, Lane, i64)>,
    dest_index: usize,
}

/// Collection indices of `lane`, ordered by rank. The sort is stable, so equal
/// ranks keep collection order.
fn lane_positions(items: &[Item], lane: Lane) -> Vec<usize> {
    let mut positions: Vec<usize> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.lane == lane)
        .map(|(pos, _)| pos)
        .collect();
    positions.sort_by_key(|&pos| items[pos].rank);
    positions
}

fn renumber(
    items: &mut [Item],
    order: &[usize],
    displaced: &mut Vec<(ItemId, Lane, i64)>,
    moved: usize,
) {
    for (rank, &pos) in order.iter().enumerate() {
        let rank = rank as i64;
        let item = &mut items[pos];
        if pos != moved && item.rank != rank {
            displaced.push((item.id.clone(), item.lane, item.rank));
        }
        item.rank = rank;
    }
}

fn apply_move(items: &mut [Item], request: &MoveRequest) -> Result<MoveSnapshot, MoveSkip> {
    let source = lane_positions(items, request.source_lane);
    let moved = match source.get(request.source_index) {
        Some(&pos) if items[pos].id == request.item_id => pos,
        _ => return Err(MoveSkip::NotFound),
    };

    if request.source_lane == request.dest_lane && request.source_index == request.dest_index {
        return Err(MoveSkip::Unchanged);
    }

    let snapshot_item = items[moved].clone();
    let source_rest: Vec<usize> = source.into_iter().filter(|&pos| pos != moved).collect();
    let mut dest_order = if request.source_lane == request.dest_lane {
        source_rest.clone()
    } else {
        lane_positions(items, request.dest_lane)
    };
    let dest_index = request.dest_index.min(dest_order.len());
    if request.source_lane == request.dest_lane && dest_index == request.source_index {
        return Err(MoveSkip::Unchanged);
    }
    dest_order.insert(dest_index, moved);

    let mut displaced = Vec::new();
    items[moved].lane = request.dest_lane;
    if request.source_lane != request.dest_lane {
        renumber(items, &source_rest, &mut displaced, moved);
    }
    renumber(items, &dest_order, &mut displaced, moved);

    Ok(MoveSnapshot {
        item: snapshot_item,
        displaced,
        dest_index,
    })
}

fn restore(items: &mut [Item], snapshot: &MoveSnapshot) {
    match items.iter_mut().find(|item| item.id == snapshot.item.id) {
        Some(item) => *item = snapshot.item.clone(),
        None => debug!(item_id = %snapshot.item.id, "rolled back item no longer on board"),
    }

    for (id, lane, rank) in &snapshot.displaced {
        if let Some(item) = items
            .iter_mut()
            .find(|item| &item.id == id && item.lane == *lane)
        {
            item.rank = *rank;
        }
    }
}

struct BoardState {
    items: Vec<Item>,
    loaded_context: Option<ContextKey>,
}

/// Local mirror of the board with optimistic moves.
///
/// The collection is only reachable through the projections below, which
/// return clones. The lock is never held across a store call.
pub struct BoardReconciler {
    store: Arc<dyn ItemStore>,
    notifier: Arc<dyn NotificationSink>,
    context: watch::Receiver<ContextKey>,
    inner: Mutex<BoardState>,
    events: broadcast::Sender<BoardEvent>,
}

impl BoardReconciler {
    pub fn new(
        store: Arc<dyn ItemStore>,
        notifier: Arc<dyn NotificationSink>,
        context: watch::Receiver<ContextKey>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            store,
            notifier,
            context,
            inner: Mutex::new(BoardState {
                items: Vec::new(),
                loaded_context: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    pub fn context(&self) -> ContextKey {
        self.context.borrow().clone()
    }

    pub async fn loaded_context(&self) -> Option<ContextKey> {
        self.inner.lock().await.loaded_context.clone()
    }

    fn emit(&self, event: BoardEvent) {
        let _ = self.events.send(event);
    }

    fn surface(&self, notification: Notification) {
        self.emit(BoardEvent::Notification(notification.clone()));
        self.notifier.notify(notification);
    }

    /// Replaces the local collection with the store's view of the current context.
    ///
    /// On failure the previous collection stays visible and a load error is surfaced.
    pub async fn load_all(&self) -> Result<Vec<Item>, BoardError> {
        let context = self.context();
        debug!(%context, "loading board");

        let fetched = match self.store.list(&context).await {
            Ok(items) => items,
            Err(source) => {
                warn!(%context, error = %source, "board load failed; keeping previous items");
                self.surface(Notification::error(
                    NotificationKind::LoadError,
                    format!("Could not load board: {source}"),
                ));
                return Err(BoardError::Load { context, source });
            }
        };

        let current = self.context();
        if current != context {
            debug!(requested = %context, %current, "discarding board load for previous context");
            return Err(BoardError::StaleContext {
                requested: context,
                current,
            });
        }

        let items: Vec<Item> = fetched.into_iter().filter(|item| !item.archived).collect();
        {
            let mut guard = self.inner.lock().await;
            guard.items = items.clone();
            guard.loaded_context = Some(context.clone());
        }
        info!(%context, count = items.len(), "board loaded");
        self.emit(BoardEvent::Reloaded {
            context,
            items: items.len(),
        });
        Ok(items)
    }

    /// Moves an item optimistically, then commits the new position.
    ///
    /// A rejected commit restores the pre-move records and reloads the whole
    /// board; the failure is reported through notifications only.
    pub async fn move_item(&self, request: MoveRequest) -> MoveOutcome {
        let snapshot = {
            let mut guard = self.inner.lock().await;
            match apply_move(&mut guard.items, &request) {
                Ok(snapshot) => snapshot,
                Err(MoveSkip::Unchanged) => return MoveOutcome::Unchanged,
                Err(MoveSkip::NotFound) => {
                    debug!(
                        item_id = %request.item_id,
                        lane = %request.source_lane,
                        index = request.source_index,
                        "ignoring move for item not at source position"
                    );
                    return MoveOutcome::Ignored;
                }
            }
        };
        self.emit(BoardEvent::Changed);

        match self
            .store
            .update_position(&request.item_id, request.dest_lane, snapshot.dest_index)
            .await
        {
            Ok(()) => {
                info!(
                    item_id = %request.item_id,
                    from = %request.source_lane,
                    to = %request.dest_lane,
                    index = snapshot.dest_index,
                    "move committed"
                );
                self.surface(Notification::success(
                    NotificationKind::Moved,
                    format!("Moved '{}' to {}", snapshot.item.title, request.dest_lane),
                ));
                MoveOutcome::Committed
            }
            Err(err) => {
                warn!(item_id = %request.item_id, error = %err, "move rejected; rolling back");
                {
                    let mut guard = self.inner.lock().await;
                    restore(&mut guard.items, &snapshot);
                }
                self.emit(BoardEvent::Changed);
                self.surface(Notification::error(
                    NotificationKind::MoveCommitError,
                    format!("Could not move '{}': {err}", snapshot.item.title),
                ));
                if let Err(reload_err) = self.load_all().await {
                    warn!(error = %reload_err, "resync after rejected move failed");
                }
                MoveOutcome::RolledBack(err)
            }
        }
    }

    /// Items of `lane` sorted by rank.
    pub async fn lane(&self, lane: Lane) -> Vec<Item> {
        let guard = self.inner.lock().await;
        lane_positions(&guard.items, lane)
            .into_iter()
            .map(|pos| guard.items[pos].clone())
            .collect()
    }

    /// Every lane in column order.
    pub async fn board(&self) -> Vec<(Lane, Vec<Item>)> {
        let guard = self.inner.lock().await;
        Lane::ALL
            .into_iter()
            .map(|lane| {
                let items = lane_positions(&guard.items, lane)
                    .into_iter()
                    .map(|pos| guard.items[pos].clone())
                    .collect();
                (lane, items)
            })
            .collect()
    }

    pub async fn items(&self) -> Vec<Item> {
        self.inner.lock().await.items.clone()
    }

    pub async fn item(&self, item_id: &ItemId) -> Option<Item> {
        self.inner
            .lock()
            .await
            .items
            .iter()
            .find(|item| &item.id == item_id)
            .cloned()
    }

    fn edit_failed(&self, action: &'static str, source: StoreError) -> BoardError {
        warn!(action, error = %source, "item edit rejected");
        self.surface(Notification::error(
            NotificationKind::EditError,
            format!("Could not {action} item: {source}"),
        ));
        BoardError::Store { action, source }
    }

    /// Whether `requested` is still the selected context once an edit resolves.
    /// Edits confirmed for a previous context are not mirrored locally.
    fn still_selected(&self, requested: &ContextKey) -> bool {
        let current = self.context();
        if &current != requested {
            debug!(%requested, %current, "edit resolved after context switch; not mirroring");
            return false;
        }
        true
    }

    pub async fn create_item(&self, new_item: NewItem) -> Result<Item, BoardError> {
        let context = self.context();
        let created = self
            .store
            .create(&context, &new_item)
            .await
            .map_err(|source| self.edit_failed("create", source))?;

        if !created.archived && self.still_selected(&context) {
            self.inner.lock().await.items.push(created.clone());
            self.emit(BoardEvent::Changed);
        }
        info!(item_id = %created.id, lane = %created.lane, "item created");
        self.surface(Notification::success(
            NotificationKind::Created,
            format!("Created '{}'", created.title),
        ));
        Ok(created)
    }

    pub async fn update_item(
        &self,
        item_id: &ItemId,
        patch: ItemPatch,
    ) -> Result<Item, BoardError> {
        let context = self.context();
        let updated = self
            .store
            .update(item_id, &patch)
            .await
            .map_err(|source| self.edit_failed("update", source))?;
        if self.still_selected(&context) {
            self.replace_local(item_id, &updated).await;
        }
        self.surface(Notification::success(
            NotificationKind::Updated,
            format!("Updated '{}'", updated.title),
        ));
        Ok(updated)
    }

    pub async fn archive_item(&self, item_id: &ItemId) -> Result<Item, BoardError> {
        let context = self.context();
        let archived = self
            .store
            .update(item_id, &ItemPatch::archive())
            .await
            .map_err(|source| self.edit_failed("archive", source))?;
        if self.still_selected(&context) {
            self.remove_local(item_id).await;
        }
        info!(%item_id, "item archived");
        self.surface(Notification::success(
            NotificationKind::Archived,
            format!("Archived '{}'", archived.title),
        ));
        Ok(archived)
    }

    pub async fn delete_item(&self, item_id: &ItemId) -> Result<(), BoardError> {
        let context = self.context();
        self.store
            .delete(item_id)
            .await
            .map_err(|source| self.edit_failed("delete", source))?;
        let removed = if self.still_selected(&context) {
            self.remove_local(item_id).await
        } else {
            None
        };
        info!(%item_id, "item deleted");
        let title = removed
            .map(|item| item.title)
            .unwrap_or_else(|| item_id.to_string());
        self.surface(Notification::success(
            NotificationKind::Deleted,
            format!("Deleted '{title}'"),
        ));
        Ok(())
    }

    async fn replace_local(&self, item_id: &ItemId, updated: &Item) {
        if updated.archived {
            self.remove_local(item_id).await;
            return;
        }
        let mut guard = self.inner.lock().await;
        if let Some(item) = guard.items.iter_mut().find(|item| &item.id == item_id) {
            *item = updated.clone();
            drop(guard);
            self.emit(BoardEvent::Changed);
        }
    }

    async fn remove_local(&self, item_id: &ItemId) -> Option<Item> {
        let removed = {
            let mut guard = self.inner.lock().await;
            let pos = guard.items.iter().position(|item| &item.id == item_id)?;
            guard.items.remove(pos)
        };
        self.emit(BoardEvent::Changed);
        Some(removed)
    }

    /// Reloads the board every time the context selector publishes a new key.
    pub fn spawn_context_follower(self: &Arc<Self>) -> JoinHandle<()> {
        let mut context = self.context.clone();
        let board = Arc::clone(self);
        tokio::spawn(async move {
            while context.changed().await.is_ok() {
                let key = context.borrow_and_update().clone();
                info!(context = %key, "board context changed");
                if let Err(err) = board.load_all().await {
                    debug!(error = %err, "reload after context change failed");
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "tests/board_tests.rs"]
mod tests;
