mod bookings;
mod directory;
mod error;
mod ledger;
mod overlap;
mod payments;
mod pricing;
mod queries;
mod store;
#[cfg(test)]
mod tests;

pub use error::{EngineError, EntityKind, ErrorClass};
pub use payments::{
    AuthorizationDecision, AuthorizationRequest, PaymentAuthorizer, SimulatedGateway,
};
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Source of "today" and timestamps. Injected so booking validation and
/// payment timestamps are deterministic under test.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
    fn now(&self) -> DateTime<Utc>;
}

/// UTC wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
    result: &io::Result<()>,
) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Extract the room id from a room-scoped event. Directory events return None.
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomUpdated { id, .. } | Event::RoomAvailabilitySet { id, .. } => Some(*id),
        Event::BookingCreated { room_id, .. }
        | Event::BookingCancelled { room_id, .. }
        | Event::BookingStatusSet { room_id, .. }
        | Event::PaymentRecorded { room_id, .. }
        | Event::PaymentRefunded { room_id, .. } => Some(*room_id),
        Event::UserRegistered { .. }
        | Event::HostelAdded { .. }
        | Event::HostelApprovalSet { .. }
        | Event::RoomAdded { .. }
        | Event::RoomDeleted { .. } => None,
    }
}

/// One tenant's booking engine: the in-memory store, its WAL writer, the
/// notify hub, and the injected clock + payment authorizer.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) authorizer: Arc<dyn PaymentAuthorizer>,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
        authorizer: Arc<dyn PaymentAuthorizer>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            notify,
            clock,
            authorizer,
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context (e.g. lazy tenant creation).
        for event in &events {
            match event {
                Event::UserRegistered { .. }
                | Event::HostelAdded { .. }
                | Event::HostelApprovalSet { .. }
                | Event::RoomAdded { .. } => engine.store.apply_directory_event(event),
                Event::RoomDeleted { id } => {
                    if let Some(room) = engine.store.get_room(id) {
                        let guard = room.try_read().expect("replay: uncontended read");
                        engine.store.forget_room(&guard);
                    }
                }
                other => {
                    if let Some(room_id) = event_room_id(other)
                        && let Some(room) = engine.store.get_room(&room_id)
                    {
                        let mut guard = room.try_write().expect("replay: uncontended write");
                        engine.store.apply_room_event(&mut guard, other);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append + apply + notify in one call — the per-room atomic unit.
    /// If the append fails nothing is applied, so state never runs ahead
    /// of the log.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_room_event(rs, event);
        self.notify.send(room_id, event);
        Ok(())
    }

    /// WAL-append + apply for map-level events. Directory changes are not
    /// fanned out to LISTEN subscribers.
    pub(super) async fn persist_directory(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_directory_event(event);
        Ok(())
    }

    pub(super) fn not_found(entity: EntityKind, id: Ulid) -> EngineError {
        EngineError::NotFound { entity, id }
    }

    /// Get a room and acquire its write lock.
    pub(super) async fn resolve_room_write(
        &self,
        room_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let room = self
            .store
            .get_room(room_id)
            .ok_or(Self::not_found(EntityKind::Room, *room_id))?;
        Ok(room.write_owned().await)
    }

    /// Lookup booking → room, acquire the room's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .store
            .room_for_booking(booking_id)
            .ok_or(Self::not_found(EntityKind::Booking, *booking_id))?;
        let guard = self.resolve_room_write(&room_id).await?;
        Ok((room_id, guard))
    }

    /// Lookup payment → booking → room, acquire the room's write lock.
    pub(super) async fn resolve_payment_write(
        &self,
        payment_id: &Ulid,
    ) -> Result<(Ulid, Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let booking_id = self
            .store
            .booking_for_payment(payment_id)
            .ok_or(Self::not_found(EntityKind::Payment, *payment_id))?;
        let (room_id, guard) = self.resolve_booking_write(&booking_id).await?;
        Ok((room_id, booking_id, guard))
    }

    /// Rewrite the WAL as the minimal event sequence for current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let events = self.store.snapshot_events().await;
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Records appended since the last compaction — the compactor's trigger.
    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
