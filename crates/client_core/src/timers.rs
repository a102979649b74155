use std::{collections::HashMap, hash::Hash, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};

struct Slot<V> {
    generation: u64,
    value: V,
    task: JoinHandle<()>,
}

/// At most one pending delayed task per key.
///
/// Re-arming a key aborts its pending task. A firing that raced with an abort is
/// recognised by its generation and rejected by [`TimerSlots::take_if_current`].
pub(crate) struct TimerSlots<K, V> {
    slots: HashMap<K, Slot<V>>,
    next_generation: u64,
}

impl<K, V> Default for TimerSlots<K, V> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            next_generation: 0,
        }
    }
}

impl<K, V> TimerSlots<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Returns true when the key had no pending task.
    pub(crate) fn arm<T, F>(
        &mut self,
        key: K,
        value: V,
        delay: Duration,
        tx: &mpsc::UnboundedSender<T>,
        on_fire: F,
    ) -> bool
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.next_generation += 1;
        let generation = self.next_generation;
        let tx = tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(on_fire(generation));
        });

        match self.slots.insert(
            key,
            Slot {
                generation,
                value,
                task,
            },
        ) {
            Some(previous) => {
                previous.task.abort();
                false
            }
            None => true,
        }
    }

    pub(crate) fn cancel(&mut self, key: &K) -> Option<V> {
        self.slots.remove(key).map(|slot| {
            slot.task.abort();
            slot.value
        })
    }

    pub(crate) fn take_if_current(&mut self, key: &K, generation: u64) -> Option<V> {
        match self.slots.get(key) {
            Some(slot) if slot.generation == generation => {
                self.slots.remove(key).map(|slot| slot.value)
            }
            _ => None,
        }
    }

    pub(crate) fn is_armed(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub(crate) fn drain(&mut self) -> Vec<(K, V)> {
        self.slots
            .drain()
            .map(|(key, slot)| {
                slot.task.abort();
                (key, slot.value)
            })
            .collect()
    }
}
