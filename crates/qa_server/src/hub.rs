//! Fan-out of server events to the viewers of each session.
//!
//! A viewer is one websocket connection. It owns a bounded outbox drained by
//! its writer task and may sit in any number of session rooms. A viewer whose
//! outbox is full is evicted; dropping its sender ends the writer task, which
//! closes the connection.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use shared::protocol::ServerEvent;
use tokio::sync::{
    mpsc::{self, error::TrySendError, Receiver, Sender},
    Mutex, RwLock,
};
use tracing::{debug, warn};

pub(crate) type ViewerId = u64;

const OUTBOX_CAPACITY: usize = 256;

#[derive(Clone)]
pub(crate) struct SessionHub {
    inner: Arc<RwLock<HubInner>>,
    turns: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    next_viewer: Arc<AtomicU64>,
    outbox_capacity: usize,
}

#[derive(Default)]
struct HubInner {
    viewers: HashMap<ViewerId, Viewer>,
    rooms: HashMap<String, HashSet<ViewerId>>,
}

struct Viewer {
    outbox: Sender<ServerEvent>,
    rooms: HashSet<String>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::with_outbox_capacity(OUTBOX_CAPACITY)
    }
}

impl SessionHub {
    pub(crate) fn with_outbox_capacity(outbox_capacity: usize) -> Self {
        Self {
            inner: Default::default(),
            turns: Default::default(),
            next_viewer: Default::default(),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    pub(crate) async fn register(&self) -> (ViewerId, Receiver<ServerEvent>) {
        let viewer_id = self.next_viewer.fetch_add(1, Ordering::Relaxed) + 1;
        let (outbox, inbox) = mpsc::channel(self.outbox_capacity);
        self.inner.write().await.viewers.insert(
            viewer_id,
            Viewer {
                outbox,
                rooms: HashSet::new(),
            },
        );
        (viewer_id, inbox)
    }

    /// Runs `work` while holding the turn of `slug`, so the store change and
    /// the publish of one request never interleave with another request on
    /// the same session.
    pub(crate) async fn in_turn<T>(&self, slug: &str, work: impl Future<Output = T>) -> T {
        let turn = self
            .turns
            .lock()
            .await
            .entry(slug.to_string())
            .or_default()
            .clone();

        let output = {
            let _held = turn.lock().await;
            work.await
        };

        let mut turns = self.turns.lock().await;
        // the map and this call hold the only references
        if Arc::strong_count(&turn) == 2 {
            turns.remove(slug);
        }
        output
    }

    /// Adds the viewer to the room of `slug`. Unknown viewers are ignored.
    pub(crate) async fn join(&self, viewer_id: ViewerId, slug: &str) {
        let mut inner = self.inner.write().await;
        let Some(viewer) = inner.viewers.get_mut(&viewer_id) else {
            return;
        };
        viewer.rooms.insert(slug.to_string());
        inner
            .rooms
            .entry(slug.to_string())
            .or_default()
            .insert(viewer_id);
        debug!(viewer_id, %slug, "viewer joined session");
    }

    /// Sends `event` to every viewer in the room and returns how many
    /// outboxes accepted it.
    pub(crate) async fn publish(&self, slug: &str, event: &ServerEvent) -> usize {
        let mut delivered = 0;
        let mut lagging = Vec::new();
        {
            let inner = self.inner.read().await;
            let Some(members) = inner.rooms.get(slug) else {
                return 0;
            };
            for viewer_id in members {
                let Some(viewer) = inner.viewers.get(viewer_id) else {
                    continue;
                };
                match viewer.outbox.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => lagging.push(*viewer_id),
                    Err(TrySendError::Closed(_)) => {}
                }
            }
        }
        for viewer_id in lagging {
            warn!(viewer_id, %slug, "viewer outbox full, disconnecting");
            self.disconnect(viewer_id).await;
        }
        delivered
    }

    pub(crate) async fn send_to(&self, viewer_id: ViewerId, event: ServerEvent) -> bool {
        let outcome = {
            let inner = self.inner.read().await;
            match inner.viewers.get(&viewer_id) {
                Some(viewer) => viewer.outbox.try_send(event),
                None => return false,
            }
        };
        match outcome {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(viewer_id, "viewer outbox full, disconnecting");
                self.disconnect(viewer_id).await;
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub(crate) async fn disconnect(&self, viewer_id: ViewerId) {
        let mut inner = self.inner.write().await;
        let Some(viewer) = inner.viewers.remove(&viewer_id) else {
            return;
        };
        for slug in viewer.rooms {
            if let Some(members) = inner.rooms.get_mut(&slug) {
                members.remove(&viewer_id);
                if members.is_empty() {
                    inner.rooms.remove(&slug);
                }
            }
        }
        debug!(viewer_id, "viewer disconnected");
    }

    /// Forgets the room of an expired session. Its viewers stay connected.
    pub(crate) async fn close_room(&self, slug: &str) {
        let mut inner = self.inner.write().await;
        let Some(members) = inner.rooms.remove(slug) else {
            return;
        };
        for viewer_id in members {
            if let Some(viewer) = inner.viewers.get_mut(&viewer_id) {
                viewer.rooms.remove(slug);
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn viewer_count(&self, slug: &str) -> usize {
        self.inner
            .read()
            .await
            .rooms
            .get(slug)
            .map_or(0, HashSet::len)
    }
}
