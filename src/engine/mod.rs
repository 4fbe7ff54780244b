mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{
    AllocationCheck, available_bed_labels, can_allocate, can_allocate_beds, fully_booked_ranges,
    merge_adjacent, occupied_count, unheld_bed_labels,
};
pub use error::EngineError;
pub use mutations::{NewGuest, NewRoom};
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::info;

use crate::journal::Journal;
use crate::model::*;
use crate::tax::TaxEngine;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Per-property engine settings, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// States that hold a bed. Shared by interactive booking and import.
    pub active: ActiveSet,
    pub tax: Arc<TaxEngine>,
}

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the journal. Appends that queue up while one fsync is in flight
/// are written together and share the next fsync.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut journal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut journal, other);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn commit_batch(journal: &mut Journal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let (events, responders): (Vec<Event>, Vec<_>) = batch.drain(..).unzip();
    // Failed batches are rolled back whole; every caller gets the same outcome
    let result = journal.commit(&events);

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for tx in responders {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// One property's bookings: rooms, guests, stays and the journal behind them.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) journal_tx: mpsc::Sender<JournalCommand>,
    pub(super) config: EngineConfig,
    /// Serialises registry writes so name checks and inserts can't interleave.
    /// Lock order: registry, then room locks, then the journal.
    pub(super) registry: Mutex<()>,
}

impl Engine {
    /// Replay the journal at `journal_path` and start its writer task.
    /// Must be called inside a Tokio runtime.
    pub fn new(journal_path: PathBuf, config: EngineConfig) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            journal_tx,
            config,
            registry: Mutex::new(()),
        };

        // Sole owner of every room lock here, so try_write never contends.
        // Never blocking_write: this may run inside an async context.
        for event in &events {
            match event {
                Event::RoomCreated { room } => engine.store.insert_room(room.clone()),
                Event::GuestCreated { guest } => engine.store.insert_guest(guest.clone()),
                other => {
                    if let Some(room_id) = store::event_room_id(other)
                        && let Some(rs) = engine.store.get_room_state(&room_id)
                    {
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        engine.store.apply_event(&mut guard, other);
                    }
                }
            }
        }

        info!(
            journal = %journal_path.display(),
            events = events.len(),
            rooms = engine.store.room_count(),
            stays = engine.store.stay_count(),
            "engine replayed"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn active_set(&self) -> &ActiveSet {
        &self.config.active
    }

    /// Send an event to the journal writer and wait until it is durable.
    async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Journal("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Journal(e.to_string()))
    }

    /// Journal then apply. Caller holds the room's write lock.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        self.store.apply_event(rs, event);
        Ok(())
    }

    /// Journal then apply a registry event. Caller holds `registry`.
    pub(super) async fn persist_registry(&self, event: Event) -> Result<(), EngineError> {
        self.journal_append(&event).await?;
        match event {
            Event::RoomCreated { room } => self.store.insert_room(room),
            Event::GuestCreated { guest } => self.store.insert_guest(guest),
            _ => {}
        }
        Ok(())
    }

    /// Rewrite the journal as the minimal event list for the current state.
    ///
    /// Takes the registry lock and every room's write lock (in id order) so no
    /// event can be acknowledged between the snapshot and the swap.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _registry = self.registry.lock().await;
        let mut room_ids: Vec<_> = self.store.rooms().into_iter().map(|r| r.id).collect();
        room_ids.sort();
        let mut guards = Vec::with_capacity(room_ids.len());
        for id in &room_ids {
            if let Some(rs) = self.store.get_room_state(id) {
                guards.push(rs.write_owned().await);
            }
        }

        let events = self.store.snapshot_events();
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Journal("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Journal(e.to_string()))?;

        metrics::counter!(crate::observability::JOURNAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = count, "journal compacted");
        Ok(())
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
