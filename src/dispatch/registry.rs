//! # Subscriber registry and per-topic selection state.
//!
//! The registry owns every [`Subscription`] grouped by topic, together with the
//! counters and cursors that drive competing and round-robin selection.
//!
//! ## Architecture
//! ```text
//! topics: HashMap<topic, TopicGroup>
//!            └─► TopicGroup
//!                  ├─ broadcast:   [sub, sub, ...]               → all matching
//!                  ├─ competing:   [(sub, deliveries), ...] + cursor → fewest deliveries, ties round-robin
//!                  └─ round_robin: members + cycle snapshot + cursor → next matching in registration order
//! ```
//!
//! ## Rules
//! - The registry lives behind a single lock in the [`Dispatcher`](super::Dispatcher);
//!   `resolve` both selects targets and advances counters, so concurrent workers
//!   never double-deliver or skew the rotation.
//! - Round-robin membership changes apply from the next full cycle. A removed
//!   subscriber is skipped immediately (it is deactivated).
//! - A competing subscriber joins with the current minimum delivery count of its
//!   group, so it does not absorb every event until it catches up.

use std::collections::HashMap;
use std::sync::Arc;

use super::subscription::{PropagationMode, Subscription, SubscriptionId};
use crate::events::Event;

struct CompetingSlot {
    sub: Arc<Subscription>,
    deliveries: u64,
}

#[derive(Default)]
struct CompetingGroup {
    slots: Vec<CompetingSlot>,
    cursor: usize,
}

impl CompetingGroup {
    fn join(&mut self, sub: Arc<Subscription>) {
        let floor = self.slots.iter().map(|s| s.deliveries).min().unwrap_or(0);
        self.slots.push(CompetingSlot {
            sub,
            deliveries: floor,
        });
    }

    fn leave(&mut self, id: SubscriptionId) -> bool {
        let Some(pos) = self.slots.iter().position(|s| s.sub.id() == id) else {
            return false;
        };
        self.slots.remove(pos);
        if pos < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.slots.len() {
            self.cursor = 0;
        }
        true
    }

    fn select(&mut self, event: &Event) -> Option<Arc<Subscription>> {
        let n = self.slots.len();
        let accepted: Vec<bool> = self.slots.iter().map(|s| s.sub.accepts(event)).collect();
        let min = self
            .slots
            .iter()
            .zip(&accepted)
            .filter(|(_, ok)| **ok)
            .map(|(s, _)| s.deliveries)
            .min()?;

        let chosen = (0..n)
            .map(|k| (self.cursor + k) % n)
            .find(|&i| accepted[i] && self.slots[i].deliveries == min)?;

        self.slots[chosen].deliveries += 1;
        self.cursor = (chosen + 1) % n;
        Some(Arc::clone(&self.slots[chosen].sub))
    }
}

#[derive(Default)]
struct RoundRobinGroup {
    /// Live membership in registration order.
    members: Vec<Arc<Subscription>>,
    /// Membership snapshot for the cycle in progress.
    cycle: Vec<Arc<Subscription>>,
    cursor: usize,
}

impl RoundRobinGroup {
    fn join(&mut self, sub: Arc<Subscription>) {
        self.members.push(sub);
    }

    fn leave(&mut self, id: SubscriptionId) -> bool {
        let before = self.members.len();
        self.members.retain(|s| s.id() != id);
        before != self.members.len()
    }

    fn restart_cycle(&mut self) {
        self.cycle = self.members.clone();
        self.cursor = 0;
    }

    fn scan(&mut self, event: &Event) -> Option<Arc<Subscription>> {
        let pos = self.cycle[self.cursor..]
            .iter()
            .position(|s| s.accepts(event))?;
        let idx = self.cursor + pos;
        self.cursor = idx + 1;
        Some(Arc::clone(&self.cycle[idx]))
    }

    fn select(&mut self, event: &Event) -> Option<Arc<Subscription>> {
        if self.cursor >= self.cycle.len() {
            self.restart_cycle();
        }
        if let Some(sub) = self.scan(event) {
            return Some(sub);
        }
        // Nothing left in this cycle accepts the event: wrap around.
        self.restart_cycle();
        self.scan(event)
    }
}

#[derive(Default)]
struct TopicGroup {
    broadcast: Vec<Arc<Subscription>>,
    competing: CompetingGroup,
    round_robin: RoundRobinGroup,
}

impl TopicGroup {
    fn is_empty(&self) -> bool {
        self.broadcast.is_empty()
            && self.competing.slots.is_empty()
            && self.round_robin.members.is_empty()
    }
}

/// Subscriptions indexed by topic plus the selection state of each topic.
#[derive(Default)]
pub(crate) struct SubscriberRegistry {
    topics: HashMap<Arc<str>, TopicGroup>,
    index: HashMap<SubscriptionId, Arc<Subscription>>,
    next_id: u64,
}

impl SubscriberRegistry {
    pub(crate) fn next_id(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId::new(self.next_id)
    }

    pub(crate) fn insert(&mut self, sub: Arc<Subscription>) {
        let topic: Arc<str> = Arc::from(sub.topic());
        let group = self.topics.entry(topic).or_default();
        match sub.mode() {
            PropagationMode::Broadcast => group.broadcast.push(Arc::clone(&sub)),
            PropagationMode::Competing => group.competing.join(Arc::clone(&sub)),
            PropagationMode::RoundRobin => group.round_robin.join(Arc::clone(&sub)),
        }
        self.index.insert(sub.id(), sub);
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let sub = self.index.remove(&id)?;
        sub.deactivate();

        if let Some(group) = self.topics.get_mut(sub.topic()) {
            match sub.mode() {
                PropagationMode::Broadcast => group.broadcast.retain(|s| s.id() != id),
                PropagationMode::Competing => {
                    group.competing.leave(id);
                }
                PropagationMode::RoundRobin => {
                    group.round_robin.leave(id);
                }
            }
            if group.is_empty() {
                self.topics.remove(sub.topic());
            }
        }
        Some(sub)
    }

    /// Removes every subscription; returns how many were removed.
    pub(crate) fn clear(&mut self) -> usize {
        let count = self.index.len();
        for sub in self.index.values() {
            sub.deactivate();
        }
        self.index.clear();
        self.topics.clear();
        count
    }

    /// Selects the subscriptions that receive `event`, advancing selection state.
    ///
    /// Broadcast targets come first (registration order), followed by the
    /// competing pick and the round-robin pick.
    pub(crate) fn resolve(&mut self, event: &Event) -> Vec<Arc<Subscription>> {
        let Some(group) = self.topics.get_mut(&*event.kind) else {
            return Vec::new();
        };

        let mut targets: Vec<Arc<Subscription>> = group
            .broadcast
            .iter()
            .filter(|s| s.accepts(event))
            .cloned()
            .collect();
        targets.extend(group.competing.select(event));
        targets.extend(group.round_robin.select(event));
        targets
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Subscriptions of `topic` in registration order.
    pub(crate) fn subscriptions(&self, topic: &str) -> Vec<Arc<Subscription>> {
        let mut subs: Vec<Arc<Subscription>> = self
            .index
            .values()
            .filter(|s| s.topic() == topic)
            .cloned()
            .collect();
        subs.sort_unstable_by_key(|s| s.id());
        subs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::HandlerFn;
    use crate::dispatch::subscription::EventFilter;

    fn add(
        reg: &mut SubscriberRegistry,
        topic: &str,
        mode: PropagationMode,
        filter: Option<EventFilter>,
    ) -> SubscriptionId {
        let id = reg.next_id();
        let handler = HandlerFn::arc("noop", |_ev: Arc<Event>| async {
            Ok::<(), crate::error::HandlerError>(())
        });
        reg.insert(Arc::new(Subscription::new(
            id,
            Arc::from(topic),
            handler,
            mode,
            filter,
        )));
        id
    }

    fn pick(reg: &mut SubscriberRegistry, event: &Event) -> Vec<SubscriptionId> {
        reg.resolve(event).iter().map(|s| s.id()).collect()
    }

    #[test]
    fn test_round_robin_cycles_in_registration_order() {
        let mut reg = SubscriberRegistry::default();
        let ids: Vec<_> = (0..3)
            .map(|_| add(&mut reg, "t", PropagationMode::RoundRobin, None))
            .collect();

        let ev = Event::new("t");
        let order: Vec<_> = (0..6).flat_map(|_| pick(&mut reg, &ev)).collect();
        assert_eq!(
            order,
            vec![ids[0], ids[1], ids[2], ids[0], ids[1], ids[2]]
        );
    }

    #[test]
    fn test_round_robin_join_applies_next_cycle() {
        let mut reg = SubscriberRegistry::default();
        let a = add(&mut reg, "t", PropagationMode::RoundRobin, None);
        let b = add(&mut reg, "t", PropagationMode::RoundRobin, None);
        let ev = Event::new("t");

        assert_eq!(pick(&mut reg, &ev), vec![a]);
        let c = add(&mut reg, "t", PropagationMode::RoundRobin, None);
        assert_eq!(pick(&mut reg, &ev), vec![b]);
        assert_eq!(pick(&mut reg, &ev), vec![a]);
        assert_eq!(pick(&mut reg, &ev), vec![b]);
        assert_eq!(pick(&mut reg, &ev), vec![c]);
    }

    #[test]
    fn test_round_robin_removed_member_is_skipped() {
        let mut reg = SubscriberRegistry::default();
        let a = add(&mut reg, "t", PropagationMode::RoundRobin, None);
        let b = add(&mut reg, "t", PropagationMode::RoundRobin, None);
        let c = add(&mut reg, "t", PropagationMode::RoundRobin, None);
        let ev = Event::new("t");

        assert_eq!(pick(&mut reg, &ev), vec![a]);
        assert!(reg.remove(b).is_some());
        assert_eq!(pick(&mut reg, &ev), vec![c]);
        assert_eq!(pick(&mut reg, &ev), vec![a]);
        assert_eq!(pick(&mut reg, &ev), vec![c]);
    }

    #[test]
    fn test_competing_balances_with_filters() {
        let mut reg = SubscriberRegistry::default();
        let only_urgent: EventFilter = Arc::new(|ev: &Event| ev.data.contains_key("urgent"));
        let a = add(&mut reg, "t", PropagationMode::Competing, None);
        let b = add(&mut reg, "t", PropagationMode::Competing, Some(only_urgent));

        let plain = Event::new("t");
        let urgent = Event::new("t").with_data("urgent", true);

        assert_eq!(pick(&mut reg, &plain), vec![a]);
        assert_eq!(pick(&mut reg, &plain), vec![a]);
        // b has fewest deliveries and accepts the urgent event.
        assert_eq!(pick(&mut reg, &urgent), vec![b]);
        assert_eq!(pick(&mut reg, &urgent), vec![b]);
        assert_eq!(pick(&mut reg, &urgent), vec![a]);
    }

    #[test]
    fn test_panicking_filter_leaves_event_to_others() {
        let mut reg = SubscriberRegistry::default();
        let broken: EventFilter = Arc::new(|_ev: &Event| panic!("bad filter"));
        add(&mut reg, "t", PropagationMode::Competing, Some(broken));
        let b = add(&mut reg, "t", PropagationMode::Competing, None);

        let ev = Event::new("t");
        for _ in 0..3 {
            assert_eq!(pick(&mut reg, &ev), vec![b]);
        }
    }

    #[test]
    fn test_competing_newcomer_starts_at_floor() {
        let mut reg = SubscriberRegistry::default();
        let a = add(&mut reg, "t", PropagationMode::Competing, None);
        let ev = Event::new("t");
        for _ in 0..5 {
            assert_eq!(pick(&mut reg, &ev), vec![a]);
        }

        let b = add(&mut reg, "t", PropagationMode::Competing, None);
        let next: Vec<_> = (0..4).flat_map(|_| pick(&mut reg, &ev)).collect();
        assert_eq!(next.iter().filter(|id| **id == a).count(), 2);
        assert_eq!(next.iter().filter(|id| **id == b).count(), 2);
    }

    #[test]
    fn test_mixed_modes_resolve_independently() {
        let mut reg = SubscriberRegistry::default();
        let b1 = add(&mut reg, "t", PropagationMode::Broadcast, None);
        let b2 = add(&mut reg, "t", PropagationMode::Broadcast, None);
        let c1 = add(&mut reg, "t", PropagationMode::Competing, None);
        let r1 = add(&mut reg, "t", PropagationMode::RoundRobin, None);
        add(&mut reg, "other", PropagationMode::Broadcast, None);

        assert_eq!(pick(&mut reg, &Event::new("t")), vec![b1, b2, c1, r1]);
        assert_eq!(reg.topic_count(), 2);
        assert_eq!(reg.subscriptions("t").len(), 4);
    }

    #[test]
    fn test_remove_last_drops_topic() {
        let mut reg = SubscriberRegistry::default();
        let id = add(&mut reg, "t", PropagationMode::Competing, None);
        assert!(reg.remove(id).is_some());
        assert!(reg.remove(id).is_none());
        assert_eq!(reg.topic_count(), 0);
        assert!(pick(&mut reg, &Event::new("t")).is_empty());
    }
}
