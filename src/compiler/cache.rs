//! Compile-once cache.
//!
//! Maps a key to a lazily built, shared value. The first caller for a key
//! builds it; concurrent callers for the same key block until that build
//! finishes and then observe the same outcome. Hits never take the write
//! lock. A failed build leaves no entry, so the next call retries.
//!
//! ```text
//! get_or_try_insert_with(k)
//!   ├─ Ready(v)    → v
//!   ├─ Pending(p)  → wait on p
//!   └─ vacant      → insert Pending, build, publish Ready / remove
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};

use crate::error::{JitError, JitResult};

enum Slot<V> {
    Ready(Arc<V>),
    Pending(Arc<Pending<V>>),
}

struct Pending<V> {
    outcome: Mutex<Option<JitResult<Arc<V>>>>,
    done: Condvar,
}

impl<V> Pending<V> {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn complete(&self, outcome: JitResult<Arc<V>>) {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(outcome);
        self.done.notify_all();
    }

    fn wait(&self) -> JitResult<Arc<V>> {
        let mut slot = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = self.done.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

enum Role<V> {
    Waiter(Arc<Pending<V>>),
    Builder(Arc<Pending<V>>),
}

pub struct CompileCache<K, V> {
    slots: RwLock<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for CompileCache<K, V> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> CompileCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The finished value for `key`, if any. Does not wait on a build.
    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        match slots.get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Number of finished entries.
    pub fn len(&self) -> usize {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|s| matches!(s, Slot::Ready(_))).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the value for `key`, building it with `build` if absent.
    ///
    /// `build` runs at most once per key at a time and outside of the map
    /// lock. Its error is returned to the builder and to every waiter.
    pub fn get_or_try_insert_with<F>(&self, key: &K, build: F) -> JitResult<Arc<V>>
    where
        F: FnOnce() -> JitResult<V>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let role = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            match slots.get(key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Pending(pending)) => Role::Waiter(pending.clone()),
                None => {
                    let pending = Arc::new(Pending::new());
                    slots.insert(key.clone(), Slot::Pending(pending.clone()));
                    Role::Builder(pending)
                }
            }
        };

        match role {
            Role::Waiter(pending) => pending.wait(),
            Role::Builder(pending) => {
                let mut guard = BuildGuard {
                    cache: self,
                    key,
                    pending: &pending,
                    armed: true,
                };
                let built = build().map(Arc::new);
                guard.armed = false;
                self.publish(key, &pending, built)
            }
        }
    }

    fn publish(
        &self,
        key: &K,
        pending: &Arc<Pending<V>>,
        built: JitResult<Arc<V>>,
    ) -> JitResult<Arc<V>> {
        let outcome = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            let owned = matches!(slots.get(key), Some(Slot::Pending(p)) if Arc::ptr_eq(p, pending));
            if !owned {
                Err(JitError::CacheInsertionRace(format!("{key:?}")))
            } else {
                match &built {
                    Ok(value) => {
                        slots.insert(key.clone(), Slot::Ready(value.clone()));
                    }
                    Err(_) => {
                        slots.remove(key);
                    }
                }
                built
            }
        };
        pending.complete(outcome.clone());
        outcome
    }
}

/// Fails the pending slot if the builder unwinds, so waiters are released.
struct BuildGuard<'a, K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    cache: &'a CompileCache<K, V>,
    key: &'a K,
    pending: &'a Arc<Pending<V>>,
    armed: bool,
}

impl<K, V> Drop for BuildGuard<'_, K, V>
where
    K: Eq + Hash + Clone + Debug,
{
    fn drop(&mut self) {
        if self.armed {
            log::error!("build of {:?} panicked, releasing waiters", self.key);
            let _ = self.cache.publish(
                self.key,
                self.pending,
                Err(JitError::BuildPanicked(format!("{:?}", self.key))),
            );
        }
    }
}
