//! Lifecycle events with buffered, deferred delivery.
//!
//! Events are recorded while the manager steps and delivered in one batch
//! after the step (see [`crate::manager::Manager::evaluate`]). Subscribers
//! therefore never run in the middle of a step, and they see a fixed copy of
//! the batch: subscribing or unsubscribing while a batch is delivered cannot
//! make another subscriber miss an event or see one twice.
//!
//! # Subscriber Types
//!
//! - **Passive listeners**: read-only, used for UI updates and analytics.
//! - **Reactive handlers**: return [`EventMutation`]s. Scheduler mutations are
//!   applied at the start of the next step; unsubscriptions right after the
//!   current batch.

use crate::id::{ActionId, ProducerId};
use crate::time::Ticks;
use std::collections::VecDeque;
use tracing::debug;

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A scheduler event. All events carry the tick during which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Producers --
    ProducerCreated {
        producer: ProducerId,
        paused: bool,
        tick: Ticks,
    },
    ProducerPaused {
        producer: ProducerId,
        tick: Ticks,
    },
    ProducerUnpaused {
        producer: ProducerId,
        tick: Ticks,
    },
    ProducerRemoved {
        producer: ProducerId,
        tick: Ticks,
    },

    // -- Actions --
    ActionStarted {
        producer: ProducerId,
        action: ActionId,
        tick: Ticks,
    },
    ActionFinished {
        producer: ProducerId,
        action: ActionId,
        tick: Ticks,
    },
    ActionCancelled {
        producer: ProducerId,
        action: ActionId,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for subscription and suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ProducerCreated,
    ProducerPaused,
    ProducerUnpaused,
    ProducerRemoved,
    ActionStarted,
    ActionFinished,
    ActionCancelled,
}

const EVENT_KIND_COUNT: usize = 7;

impl EventKind {
    pub const ALL: [EventKind; EVENT_KIND_COUNT] = [
        EventKind::ProducerCreated,
        EventKind::ProducerPaused,
        EventKind::ProducerUnpaused,
        EventKind::ProducerRemoved,
        EventKind::ActionStarted,
        EventKind::ActionFinished,
        EventKind::ActionCancelled,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::ProducerCreated { .. } => EventKind::ProducerCreated,
            Event::ProducerPaused { .. } => EventKind::ProducerPaused,
            Event::ProducerUnpaused { .. } => EventKind::ProducerUnpaused,
            Event::ProducerRemoved { .. } => EventKind::ProducerRemoved,
            Event::ActionStarted { .. } => EventKind::ActionStarted,
            Event::ActionFinished { .. } => EventKind::ActionFinished,
            Event::ActionCancelled { .. } => EventKind::ActionCancelled,
        }
    }

    /// The producer the event concerns.
    pub fn producer(&self) -> ProducerId {
        match self {
            Event::ProducerCreated { producer, .. }
            | Event::ProducerPaused { producer, .. }
            | Event::ProducerUnpaused { producer, .. }
            | Event::ProducerRemoved { producer, .. }
            | Event::ActionStarted { producer, .. }
            | Event::ActionFinished { producer, .. }
            | Event::ActionCancelled { producer, .. } => *producer,
        }
    }

    /// The action the event concerns, if it is an action event.
    pub fn action(&self) -> Option<ActionId> {
        match self {
            Event::ActionStarted { action, .. }
            | Event::ActionFinished { action, .. }
            | Event::ActionCancelled { action, .. } => Some(*action),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Mutations (returned by reactive handlers)
// ---------------------------------------------------------------------------

/// Identifies a subscription so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// A change a reactive handler asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventMutation {
    /// Cancel a queued action (next step).
    CancelAction {
        producer: ProducerId,
        action: ActionId,
    },
    /// Remove a producer and cancel its queue (next step).
    RemoveProducer { producer: ProducerId },
    /// Pause a producer (next step).
    Pause { producer: ProducerId },
    /// Unpause a producer (next step).
    Resume { producer: ProducerId },
    /// Drop a subscription once the current batch has been delivered.
    Unsubscribe { subscription: SubscriptionId },
}

// ---------------------------------------------------------------------------
// EventBuffer
// ---------------------------------------------------------------------------

/// FIFO outbox of events for one kind, emptied by every delivery. It starts
/// with room for `capacity` events and grows past that; nothing is dropped.
/// Each entry carries a bus-wide sequence number so batches from different
/// kinds can be merged back into emission order.
#[derive(Debug)]
pub struct EventBuffer {
    entries: VecDeque<(u64, Event)>,
    capacity: usize,
    total_written: u64,
}

impl EventBuffer {
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            total_written: 0,
        }
    }

    fn push(&mut self, seq: u64, event: Event) {
        if self.entries.len() == self.capacity {
            debug!(
                kind = ?event.kind(),
                capacity = self.capacity,
                "event outbox grew past its reserved capacity"
            );
        }
        self.entries.push_back((seq, event));
        self.total_written += 1;
    }

    /// Events reserved for up front. The buffer grows past this.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total events written since creation, including delivered ones.
    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &Event> {
        self.entries.iter().map(|(_, event)| event)
    }

    fn take(&mut self) -> VecDeque<(u64, Event)> {
        std::mem::take(&mut self.entries)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

pub type PassiveListener = Box<dyn FnMut(&Event)>;

pub type ReactiveHandler = Box<dyn FnMut(&Event) -> Vec<EventMutation>>;

/// Optional predicate that filters events for a subscriber.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

/// Priority level for event subscribers. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubscriberPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

enum Subscriber {
    Passive(PassiveListener),
    Reactive(ReactiveHandler),
}

struct SubscriberEntry {
    id: SubscriptionId,
    subscriber: Subscriber,
    priority: SubscriberPriority,
    filter: Option<EventFilter>,
}

impl std::fmt::Debug for SubscriberEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.subscriber {
            Subscriber::Passive(_) => "Passive(<fn>)",
            Subscriber::Reactive(_) => "Reactive(<fn>)",
        };
        f.debug_struct("SubscriberEntry")
            .field("id", &self.id)
            .field("subscriber", &kind)
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    subscribers: [Vec<SubscriberEntry>; EVENT_KIND_COUNT],
    /// Scheduler mutations from reactive handlers, applied next step.
    pending_mutations: Vec<EventMutation>,
    default_capacity: usize,
    next_seq: u64,
    next_subscription: u64,
    delivered_total: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("pending_mutations", &self.pending_mutations)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a bus reserving `default_capacity` events per kind.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            subscribers: Default::default(),
            pending_mutations: Vec::new(),
            default_capacity,
            next_seq: 0,
            next_subscription: 0,
            delivered_total: 0,
        }
    }

    /// Suppressed kinds are never buffered or delivered.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn unsuppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = false;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Buffer an event for the next delivery.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(seq, event);
    }

    pub fn on_passive(&mut self, kind: EventKind, listener: PassiveListener) -> SubscriptionId {
        self.subscribe(kind, SubscriberPriority::Normal, None, Subscriber::Passive(listener))
    }

    pub fn on_reactive(&mut self, kind: EventKind, handler: ReactiveHandler) -> SubscriptionId {
        self.subscribe(kind, SubscriberPriority::Normal, None, Subscriber::Reactive(handler))
    }

    /// Register a passive listener with explicit priority and optional filter.
    pub fn on_passive_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        listener: PassiveListener,
    ) -> SubscriptionId {
        self.subscribe(kind, priority, filter, Subscriber::Passive(listener))
    }

    /// Register a reactive handler with explicit priority and optional filter.
    pub fn on_reactive_filtered(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        handler: ReactiveHandler,
    ) -> SubscriptionId {
        self.subscribe(kind, priority, filter, Subscriber::Reactive(handler))
    }

    fn subscribe(
        &mut self,
        kind: EventKind,
        priority: SubscriberPriority,
        filter: Option<EventFilter>,
        subscriber: Subscriber,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        let list = &mut self.subscribers[kind.index()];
        list.push(SubscriberEntry {
            id,
            subscriber,
            priority,
            filter,
        });
        // Stable: equal priorities keep registration order.
        list.sort_by_key(|entry| entry.priority);
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for list in &mut self.subscribers {
            if let Some(pos) = list.iter().position(|entry| entry.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers[kind.index()].len()
    }

    /// Deliver every buffered event, oldest first across all kinds.
    ///
    /// The buffers are emptied before the first subscriber runs, and
    /// unsubscriptions requested by reactive handlers are applied only after
    /// the whole batch. Returns the number of events delivered.
    pub fn deliver(&mut self) -> usize {
        let mut batch: Vec<(u64, Event)> = Vec::new();
        for buffer in self.buffers.iter_mut().flatten() {
            batch.extend(buffer.take());
        }
        batch.sort_by_key(|(seq, _)| *seq);

        let mut unsubscribes = Vec::new();
        for (_, event) in &batch {
            for entry in &mut self.subscribers[event.kind().index()] {
                if let Some(filter) = &entry.filter
                    && !filter(event)
                {
                    continue;
                }
                match &mut entry.subscriber {
                    Subscriber::Passive(listener) => listener(event),
                    Subscriber::Reactive(handler) => {
                        for mutation in handler(event) {
                            match mutation {
                                EventMutation::Unsubscribe { subscription } => {
                                    unsubscribes.push(subscription)
                                }
                                other => self.pending_mutations.push(other),
                            }
                        }
                    }
                }
            }
        }

        for id in unsubscribes {
            self.unsubscribe(id);
        }
        self.delivered_total += batch.len() as u64;
        batch.len()
    }

    /// Take the scheduler mutations collected from reactive handlers.
    pub fn drain_mutations(&mut self) -> Vec<EventMutation> {
        std::mem::take(&mut self.pending_mutations)
    }

    pub fn pending_mutation_count(&self) -> usize {
        self.pending_mutations.len()
    }

    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(EventBuffer::len)
            .unwrap_or(0)
    }

    /// Events delivered since creation.
    pub fn delivered_total(&self) -> u64 {
        self.delivered_total
    }

    /// Clear all buffers and pending mutations. Subscribers stay.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
        self.pending_mutations.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_BUFFER_CAPACITY)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
