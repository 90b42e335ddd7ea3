//! Callback registry.
//!
//! Every button that is rendered gets an entry here. The entry remembers which
//! action the button triggers, the payload it carries and, once the message
//! has been sent, the chat it was sent to. When the button is pressed the
//! inbound id is resolved back to that entry.
//!
//! # Identifiers
//!
//! Inline buttons get a random [`CallbackId::Random`]. Reply-keyboard buttons
//! and switch-inline queries have to carry their id inside visible text, so
//! they draw a short [`CallbackId::Counter`] from a wrapping counter instead.
//! After wraparound a counter id is reissued and the new entry replaces the
//! stale one.
//!
//! # Chat binding
//!
//! An entry is unbound until [`bind_chat`](CallbackRegistry::bind_chat) records
//! the chat its message landed in. [`lookup_chat_bound`](CallbackRegistry::lookup_chat_bound)
//! refuses unbound entries and entries owned by another chat, so a token
//! copied from one chat never reveals a payload in another.
//!
//! # Capacity
//!
//! The registry holds at most `capacity` entries. Inserting beyond that evicts
//! the least recently used entry; lookups count as use.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use chatflow_core::{ActionId, COUNTER_CEILING, CallbackId, ChatId};

use crate::action::Payload;
use crate::error::RegistryError;

/// Default number of entries kept before eviction starts.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Registry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Maximum number of live entries.
    pub capacity: usize,
    /// Value the next counter id is drawn from. Lets an embedder restore the
    /// counter saved with [`CallbackRegistry::counter`] across restarts.
    pub counter_start: u32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            counter_start: 0,
        }
    }
}

/// A stored callback.
pub struct CallbackEntry {
    id: CallbackId,
    action: ActionId,
    payload: Option<Payload>,
    chat: OnceLock<ChatId>,
    single_use: bool,
    stamp: AtomicU64,
}

impl CallbackEntry {
    /// The issued id.
    pub fn id(&self) -> CallbackId {
        self.id
    }

    /// The action this callback triggers.
    pub fn action(&self) -> &ActionId {
        &self.action
    }

    /// The payload attached at creation.
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// The owning chat, once bound.
    pub fn chat(&self) -> Option<ChatId> {
        self.chat.get().copied()
    }

    /// Whether the entry is dropped after its first chat-bound lookup.
    pub fn is_single_use(&self) -> bool {
        self.single_use
    }
}

impl std::fmt::Debug for CallbackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackEntry")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("payload", &self.payload)
            .field("chat", &self.chat())
            .field("single_use", &self.single_use)
            .finish()
    }
}

/// Stores the association between issued callback ids and their actions.
///
/// Shared by reference (`Arc<CallbackRegistry>`) between the dispatcher and
/// everything that renders buttons. All operations take `&self`.
pub struct CallbackRegistry {
    entries: DashMap<CallbackId, Arc<CallbackEntry>>,
    /// `(id, stamp)` pairs in touch order. A pair is stale once the entry's
    /// stamp has moved on.
    recency: Mutex<VecDeque<(CallbackId, u64)>>,
    clock: AtomicU64,
    counter: AtomicU32,
    capacity: usize,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            entries: DashMap::new(),
            recency: Mutex::new(VecDeque::new()),
            clock: AtomicU64::new(0),
            counter: AtomicU32::new(config.counter_start.min(COUNTER_CEILING)),
            capacity: config.capacity.max(1),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The value the next counter id will take.
    pub fn counter(&self) -> u32 {
        self.counter.load(Ordering::Acquire)
    }

    /// Draws the next counter id, wrapping from the ceiling back to 0.
    pub fn next_counter_id(&self) -> u32 {
        let mut current = self.counter.load(Ordering::Acquire);
        loop {
            let next = if current >= COUNTER_CEILING {
                0
            } else {
                current + 1
            };
            match self.counter.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return current,
                Err(actual) => current = actual,
            }
        }
    }

    /// Stores a new callback for `action`.
    ///
    /// `random_id` selects a random id (inline callback data) over a counter
    /// id (ids hidden in visible text).
    pub fn create(
        &self,
        action: &ActionId,
        payload: Option<Payload>,
        random_id: bool,
    ) -> Arc<CallbackEntry> {
        self.insert(action, payload, random_id, false)
    }

    /// Like [`create`](Self::create), but the entry is removed after its first
    /// successful chat-bound lookup.
    pub fn create_single_use(
        &self,
        action: &ActionId,
        payload: Option<Payload>,
        random_id: bool,
    ) -> Arc<CallbackEntry> {
        self.insert(action, payload, random_id, true)
    }

    fn insert(
        &self,
        action: &ActionId,
        payload: Option<Payload>,
        random_id: bool,
        single_use: bool,
    ) -> Arc<CallbackEntry> {
        let id = if random_id {
            CallbackId::random()
        } else {
            CallbackId::Counter(self.next_counter_id())
        };

        let entry = Arc::new(CallbackEntry {
            id,
            action: action.clone(),
            payload,
            chat: OnceLock::new(),
            single_use,
            stamp: AtomicU64::new(0),
        });

        if let Some(stale) = self.entries.insert(id, Arc::clone(&entry)) {
            debug!(callback = %id, stale_action = %stale.action, "Counter id reused, replacing stale callback");
        }
        trace!(callback = %id, action = %action, single_use, "Callback created");

        self.touch(&entry);
        self.evict();
        entry
    }

    /// Records the chat the callback's message was delivered to.
    ///
    /// Must be called exactly once per entry.
    pub fn bind_chat(&self, id: CallbackId, chat: ChatId) -> Result<(), RegistryError> {
        let entry = self.get(id)?;
        entry.chat.set(chat).map_err(|_| RegistryError::AlreadyBound {
            id,
            chat: entry.chat().unwrap_or(chat),
        })?;
        trace!(callback = %id, chat, "Callback bound to chat");
        Ok(())
    }

    /// Resolves a callback on behalf of `chat`.
    ///
    /// Fails with [`RegistryError::UnboundCallback`] before the message was
    /// sent and with [`RegistryError::ChatMismatch`] when another chat owns
    /// the entry.
    pub fn lookup_chat_bound(
        &self,
        chat: ChatId,
        id: CallbackId,
    ) -> Result<Option<Payload>, RegistryError> {
        let entry = self.get(id)?;
        match entry.chat() {
            None => return Err(RegistryError::UnboundCallback(id)),
            Some(owner) if owner != chat => {
                debug!(callback = %id, owner, requested = chat, "Rejected cross-chat callback");
                return Err(RegistryError::ChatMismatch { id, requested: chat });
            }
            Some(_) => {}
        }

        if entry.single_use {
            self.entries
                .remove_if(&id, |_, current| Arc::ptr_eq(current, &entry));
        } else {
            self.touch(&entry);
        }
        Ok(entry.payload.clone())
    }

    /// Resolves a callback without checking its chat.
    ///
    /// Used for chosen inline results, which arrive without a chat.
    pub fn lookup(&self, id: CallbackId) -> Result<Arc<CallbackEntry>, RegistryError> {
        let entry = self.get(id)?;
        self.touch(&entry);
        Ok(entry)
    }

    /// Returns the action of a callback without touching it.
    pub fn peek_action(&self, id: CallbackId) -> Result<ActionId, RegistryError> {
        self.entries
            .get(&id)
            .map(|entry| entry.action.clone())
            .ok_or(RegistryError::NotFound(id))
    }

    /// Drops a callback, e.g. after its message failed to send.
    pub fn remove(&self, id: CallbackId) -> bool {
        self.entries.remove(&id).is_some()
    }

    fn get(&self, id: CallbackId) -> Result<Arc<CallbackEntry>, RegistryError> {
        self.entries
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(RegistryError::NotFound(id))
    }

    fn touch(&self, entry: &CallbackEntry) {
        let stamp = self.clock.fetch_add(1, Ordering::Relaxed);
        entry.stamp.store(stamp, Ordering::Relaxed);
        let mut recency = self.recency.lock();
        recency.push_back((entry.id, stamp));
        self.compact(&mut recency);
    }

    fn evict(&self) {
        let mut recency = self.recency.lock();

        while self.entries.len() > self.capacity {
            let Some((id, stamp)) = recency.pop_front() else {
                break;
            };
            let removed = self
                .entries
                .remove_if(&id, |_, entry| entry.stamp.load(Ordering::Relaxed) == stamp);
            if let Some((id, entry)) = removed {
                debug!(callback = %id, action = %entry.action, "Evicted least recently used callback");
            }
        }

        self.compact(&mut recency);
    }

    /// Every touch leaves the entry's previous pair behind as a stale one.
    /// Rebuilds the queue from the live stamps once stale pairs dominate.
    fn compact(&self, recency: &mut VecDeque<(CallbackId, u64)>) {
        if recency.len() <= self.capacity.saturating_mul(2).max(64) {
            return;
        }
        let mut live: Vec<(CallbackId, u64)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.stamp.load(Ordering::Relaxed)))
            .collect();
        live.sort_unstable_by_key(|(_, stamp)| *stamp);
        *recency = live.into();
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("entries", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("counter", &self.counter())
            .finish()
    }
}
