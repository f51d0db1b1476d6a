//! Registry of rooms and the transition pipeline.
//!
//! Every state change goes load -> apply on a copy -> conditional commit ->
//! log -> notify. The commit only succeeds against the version that was
//! loaded, so two requests racing on one room cannot both win: the loser
//! gets a `Conflict` and the stored record is untouched.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use time::OffsetDateTime;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

use crate::config::GameSettings;
use crate::game::actions::{self, Action};
use crate::game::cards::{Card, create_deck};
use crate::game::guard;
use crate::game::log::{ActionLog, LogDraft, LogEntry};
use crate::game::state::{Phase, PlayerId, Room, RoomId, RoomRecord};
use crate::game::view::{GameStateView, RoomView, project_for};
use crate::game::GameError;
use crate::store::{GameStore, MemoryStore, Versioned};
use crate::util::id::{new_join_code, new_room_id};

const EVENT_BUFFER: usize = 64;
const CREATE_ATTEMPTS: usize = 5;
const TIMER_ATTEMPTS: usize = 3;

/// Pushed to every subscriber of a room. Subscribers re-project the state
/// for their own player; events never carry hand contents.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    StateChanged { version: u64 },
    ActionAppended(LogEntry),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionReceipt {
    pub drawn_card: Option<Card>,
    pub version: u64,
}

#[derive(Debug)]
enum TimerFired {
    Memorize { room_id: RoomId },
    Turn { room_id: RoomId, turn_number: u64 },
}

struct Committed<T> {
    value: T,
    version: u64,
    record: RoomRecord,
}

#[derive(Clone)]
pub struct RoomManager {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn GameStore>,
    settings: GameSettings,
    channels: DashMap<RoomId, broadcast::Sender<RoomEvent>>,
    feeds: DashMap<RoomId, Arc<Mutex<Feed>>>,
    timers: mpsc::UnboundedSender<TimerFired>,
}

/// Per-room log plus the publication cursor. Commits may reach
/// `after_commit` out of order; events leave in the order the store
/// accepted them.
struct Feed {
    log: ActionLog,
    /// Last version whose events went out.
    published: u64,
    /// Finished commits keyed by the version they replaced.
    waiting: BTreeMap<u64, (u64, Vec<LogEntry>)>,
}

impl Feed {
    fn new(limit: usize, published: u64) -> Self {
        Self { log: ActionLog::new(limit), published, waiting: BTreeMap::new() }
    }

    /// Queues one commit and returns every event that is now in order.
    fn accept(&mut self, expected: u64, version: u64, entries: Vec<LogEntry>) -> Vec<RoomEvent> {
        for entry in &entries {
            self.log.append(entry.clone());
        }
        self.waiting.insert(expected, (version, entries));

        let mut ready = Vec::new();
        while let Some(next) = self.waiting.first_entry() {
            if *next.key() > self.published {
                break;
            }
            let (version, entries) = next.remove();
            ready.push(RoomEvent::StateChanged { version });
            ready.extend(entries.into_iter().map(RoomEvent::ActionAppended));
            self.published = self.published.max(version);
        }
        ready
    }
}

impl RoomManager {
    /// Spawns the timer worker, so this must run inside a tokio runtime.
    pub fn new(store: Arc<dyn GameStore>, settings: GameSettings) -> Self {
        let (timers, rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            store,
            settings,
            channels: DashMap::new(),
            feeds: DashMap::new(),
            timers,
        });
        tokio::spawn(run_timers(Arc::downgrade(&inner), rx));
        Self { inner }
    }

    pub fn in_memory(settings: GameSettings) -> Self {
        Self::new(Arc::new(MemoryStore::new()), settings)
    }

    pub fn subscribe(&self, room_id: &str) -> broadcast::Receiver<RoomEvent> {
        self.inner
            .channels
            .entry(room_id.to_string())
            .or_insert_with(|| broadcast::channel(EVENT_BUFFER).0)
            .subscribe()
    }

    pub async fn create_room(&self, host: PlayerId, host_name: &str, max_players: usize) -> Result<RoomView, GameError> {
        for _ in 0..CREATE_ATTEMPTS {
            let code = new_join_code(&mut rand::thread_rng());
            let room = Room::new(new_room_id(), code, host, host_name.to_string(), max_players, OffsetDateTime::now_utc())?;
            match self.inner.store.insert(RoomRecord::new(room)).await {
                Ok(stored) => {
                    let feed = Feed::new(self.inner.settings.action_log_limit, stored.version);
                    self.inner.feeds.insert(stored.value.room.id.clone(), Arc::new(Mutex::new(feed)));
                    info!(room_id = %stored.value.room.id, %host, max_players, "room created");
                    return Ok(RoomView::of(&stored.value.room, stored.version));
                }
                Err(GameError::Conflict(detail)) => debug!(%detail, "room allocation collided, retrying"),
                Err(err) => return Err(err),
            }
        }
        Err(GameError::internal("could not allocate a unique join code"))
    }

    /// Joins by code. Joining a room you are already in is a no-op.
    pub async fn join_room(&self, code: &str, player: PlayerId, name: &str) -> Result<RoomView, GameError> {
        let current = self.inner.store.find_by_code(code).await?;
        if current.value.room.is_member(player) {
            return Ok(RoomView::of(&current.value.room, current.version));
        }
        let name = name.to_string();
        let c = self
            .transition_from(current, move |record, _now| {
                record.room.add_member(player, name)?;
                Ok(((), Vec::new()))
            })
            .await?;
        info!(room_id = %c.record.room.id, %player, players = c.record.room.members.len(), "player joined");
        Ok(RoomView::of(&c.record.room, c.version))
    }

    pub async fn room(&self, room_id: &str, viewer: PlayerId) -> Result<RoomView, GameError> {
        let current = self.inner.store.load(room_id).await?;
        guard::require_member(&current.value.room, viewer)?;
        Ok(RoomView::of(&current.value.room, current.version))
    }

    /// Host only. Deals and opens the memorizing window.
    pub async fn start_game(&self, room_id: &str, player: PlayerId) -> Result<RoomView, GameError> {
        let c = self
            .transition(room_id, move |record, now| {
                guard::require_host(&record.room, player)?;
                let deck = create_deck(&mut rand::thread_rng());
                Ok(((), actions::start_game(record, deck, now)?))
            })
            .await?;
        info!(room_id, players = c.record.room.members.len(), version = c.version, "game started");
        Ok(RoomView::of(&c.record.room, c.version))
    }

    /// Host only. Ends memorizing before the timer does.
    pub async fn end_memorizing(&self, room_id: &str, player: PlayerId) -> Result<u64, GameError> {
        let c = self
            .transition(room_id, move |record, now| {
                guard::require_host(&record.room, player)?;
                Ok(((), actions::end_memorizing(record, now)?))
            })
            .await?;
        info!(room_id, version = c.version, "memorizing ended by host");
        Ok(c.version)
    }

    /// The action submission entry point. `player` must come from a
    /// verified identity.
    pub async fn submit(&self, room_id: &str, player: PlayerId, action: Action) -> Result<ActionReceipt, GameError> {
        let result = self
            .transition(room_id, move |record, now| {
                let outcome = actions::apply(record, player, action, now)?;
                Ok((outcome.drawn_card, outcome.log))
            })
            .await;
        match result {
            Ok(c) => {
                info!(room_id, %player, ?action, version = c.version, "action applied");
                Ok(ActionReceipt { drawn_card: c.value, version: c.version })
            }
            Err(err) => {
                debug!(room_id, %player, ?action, %err, "action rejected");
                Err(err)
            }
        }
    }

    /// Plays out a turn that ran past its deadline. Returns `false` if that
    /// turn already ended.
    pub async fn expire_turn(&self, room_id: &str, turn_number: u64) -> Result<bool, GameError> {
        let current = self.inner.store.load(room_id).await?;
        if !actions::turn_is_live(&current.value, turn_number) {
            return Ok(false);
        }
        let c = self
            .transition_from(current, move |record, now| {
                let outcome = actions::expire_turn(record, turn_number, now)?
                    .ok_or_else(|| GameError::conflict("the turn already ended"))?;
                Ok(((), outcome.log))
            })
            .await?;
        info!(room_id, turn_number, version = c.version, "turn timed out");
        Ok(true)
    }

    async fn memorize_elapsed(&self, room_id: &str) -> Result<(), GameError> {
        let current = self.inner.store.load(room_id).await?;
        if current.value.game.as_ref().map(|g| g.phase) != Some(Phase::Memorizing) {
            return Ok(());
        }
        let c = self
            .transition_from(current, |record, now| Ok(((), actions::end_memorizing(record, now)?)))
            .await?;
        info!(room_id, version = c.version, "memorizing time is up");
        Ok(())
    }

    /// The redacted state for one member.
    pub async fn state_for(&self, room_id: &str, viewer: PlayerId) -> Result<GameStateView, GameError> {
        let current = self.inner.store.load(room_id).await?;
        guard::require_member(&current.value.room, viewer)?;
        let game = current.value.game()?;
        Ok(project_for(viewer, &current.value.room, game, current.version))
    }

    /// Recent log entries, oldest first.
    pub async fn action_log(&self, room_id: &str, viewer: PlayerId) -> Result<Vec<LogEntry>, GameError> {
        let current = self.inner.store.load(room_id).await?;
        guard::require_member(&current.value.room, viewer)?;
        Ok(self.inner.feeds.get(room_id).map(|feed| feed.lock().log.recent()).unwrap_or_default())
    }

    /// Host only. Drops the room, its game, log and subscribers.
    pub async fn delete_room(&self, room_id: &str, player: PlayerId) -> Result<(), GameError> {
        let current = self.inner.store.load(room_id).await?;
        guard::require_host(&current.value.room, player)?;
        self.inner.store.remove(room_id).await?;
        self.inner.feeds.remove(room_id);
        self.inner.channels.remove(room_id);
        info!(room_id, "room deleted");
        Ok(())
    }

    async fn transition<T, F>(&self, room_id: &str, f: F) -> Result<Committed<T>, GameError>
    where
        T: Send,
        F: FnOnce(&mut RoomRecord, OffsetDateTime) -> Result<(T, Vec<LogDraft>), GameError> + Send,
    {
        let current = self.inner.store.load(room_id).await?;
        self.transition_from(current, f).await
    }

    async fn transition_from<T, F>(&self, current: Versioned<RoomRecord>, f: F) -> Result<Committed<T>, GameError>
    where
        T: Send,
        F: FnOnce(&mut RoomRecord, OffsetDateTime) -> Result<(T, Vec<LogDraft>), GameError> + Send,
    {
        let Versioned { version: expected, value: before } = current;
        let mut record = before.clone();
        let now = OffsetDateTime::now_utc();
        let (value, drafts) = f(&mut record, now)?;

        let room_id = record.room.id.clone();
        let version = match self.inner.store.commit(&room_id, expected, record.clone()).await {
            Ok(v) => v,
            Err(err) => {
                if err.is_internal() {
                    error!(room_id, expected, ?err, "commit failed");
                }
                return Err(err);
            }
        };
        self.after_commit(&before, &record, expected, version, drafts, now);
        Ok(Committed { value, version, record })
    }

    fn after_commit(
        &self,
        before: &RoomRecord,
        after: &RoomRecord,
        expected: u64,
        version: u64,
        drafts: Vec<LogDraft>,
        now: OffsetDateTime,
    ) {
        let room_id = after.room.id.as_str();
        let entries: Vec<LogEntry> = drafts.into_iter().map(|d| d.stamp(version, now)).collect();
        let feed = self
            .inner
            .feeds
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Feed::new(self.inner.settings.action_log_limit, expected))))
            .clone();
        // publish under the lock so a later commit cannot overtake
        let mut feed = feed.lock();
        for event in feed.accept(expected, version, entries) {
            self.publish(room_id, event);
        }
        drop(feed);
        self.arm_timers(before, after);
    }

    fn publish(&self, room_id: &str, event: RoomEvent) {
        if let Some(tx) = self.inner.channels.get(room_id) {
            // no receivers is fine
            let _ = tx.send(event);
        }
    }

    fn arm_timers(&self, before: &RoomRecord, after: &RoomRecord) {
        let phase_before = before.game.as_ref().map(|g| g.phase);
        let phase_after = after.game.as_ref().map(|g| g.phase);
        let room_id = after.room.id.clone();

        if phase_after == Some(Phase::Memorizing) && phase_before != Some(Phase::Memorizing) {
            self.schedule(self.inner.settings.memorize_duration, TimerFired::Memorize { room_id: room_id.clone() });
        }
        let turn_number = after.room.turn_number;
        if turn_number != before.room.turn_number && actions::turn_is_live(after, turn_number) {
            self.schedule(self.inner.settings.turn_timeout, TimerFired::Turn { room_id, turn_number });
        }
    }

    fn schedule(&self, delay: Duration, fired: TimerFired) {
        let tx = self.inner.timers.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(fired);
        });
    }
}

/// Applies fired timers one at a time. Holds the manager weakly so dropping
/// the last handle shuts it down.
async fn run_timers(weak: Weak<Inner>, mut rx: mpsc::UnboundedReceiver<TimerFired>) {
    while let Some(fired) = rx.recv().await {
        let Some(inner) = weak.upgrade() else { break };
        let manager = RoomManager { inner };
        for attempt in 1..=TIMER_ATTEMPTS {
            let result = match &fired {
                TimerFired::Memorize { room_id } => manager.memorize_elapsed(room_id).await,
                TimerFired::Turn { room_id, turn_number } => manager.expire_turn(room_id, *turn_number).await.map(|_| ()),
            };
            match result {
                Ok(()) => break,
                Err(GameError::Conflict(_)) if attempt < TIMER_ATTEMPTS => continue,
                Err(err) if err.is_internal() => {
                    error!(?fired, ?err, "timer failed");
                    break;
                }
                Err(err) => {
                    debug!(?fired, %err, "timer skipped");
                    break;
                }
            }
        }
    }
}
