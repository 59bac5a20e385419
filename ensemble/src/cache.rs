/// A size bounded LRU (Least Recently Used) cache with single flight loading.
///
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use futures::{
    channel::oneshot::{channel, Sender},
    future::BoxFuture,
};
use parking_lot::Mutex;

use crate::errors::{Error, Result};

/// A trait for objects that can be cached
///
/// Cacheable objects must be able to self report their size via the ``size`` method.
///
pub trait Cacheable: Sized {
    /// Return the number of bytes in the serialized representation
    fn size(&self) -> u64;
}

/// An LRU cache for immutable, content addressed objects.
///
/// The ``limit`` is the most bytes, as self reported by ``Cacheable::size``, the cache will hold.
/// Inserting an object that pushes the total over the limit evicts least recently used objects
/// until the total is back under it. An object bigger than the limit is handed back to the caller
/// but not retained.
///
/// When several tasks ask for the same missing key at once, only the first one runs its ``load``
/// function. The others wait for that load and receive the same object, or ``Error::Load`` if it
/// failed.
///
/// Keys are content ids and values never change, so there is no invalidation.
///
pub struct Cache<K, V>
where
    K: Eq + Hash + Copy + Debug,
    V: Cacheable,
{
    recent: Mutex<Entries<K, V>>,

    /// Tasks waiting on a key that is being loaded. Presence of a key means a load is underway.
    loading: Mutex<HashMap<K, Vec<Sender<Result<Arc<V>>>>>>,
}

struct Entries<K, V> {
    limit: u64,
    size: u64,

    /// Monotonic use counter. Larger ticks were used more recently.
    clock: u64,

    map: HashMap<K, Entry<V>>,

    /// Use order, oldest first
    order: BTreeMap<u64, K>,
}

struct Entry<V> {
    object: Arc<V>,
    size: u64,
    tick: u64,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Copy + Debug,
    V: Cacheable,
{
    /// Instantiate an empty cache with given size limit.
    ///
    pub fn new(limit: u64) -> Self {
        Self {
            recent: Mutex::new(Entries {
                limit,
                size: 0,
                clock: 0,
                map: HashMap::new(),
                order: BTreeMap::new(),
            }),
            loading: Mutex::new(HashMap::new()),
        }
    }

    /// Get an object by key, calling ``load`` on a cache miss.
    ///
    pub async fn get<L>(&self, key: &K, load: L) -> Result<Arc<V>>
    where
        L: FnOnce(K) -> BoxFuture<'static, Result<V>>,
    {
        if let Some(object) = self.recent.lock().touch(key) {
            return Ok(object);
        }

        let waiting = {
            let mut loading = self.loading.lock();
            match loading.get_mut(key) {
                Some(waiters) => {
                    let (send, receive) = channel();
                    waiters.push(send);
                    Some(receive)
                }
                None => {
                    loading.insert(*key, vec![]);
                    None
                }
            }
        };

        match waiting {
            Some(receive) => receive.await.unwrap_or(Err(Error::Load)),
            None => {
                let result = load(*key).await.map(Arc::new);
                if let Ok(object) = &result {
                    self.recent.lock().insert(*key, object);
                }

                let waiters = self.loading.lock().remove(key).unwrap_or_default();
                for waiter in waiters {
                    let shared = match &result {
                        Ok(object) => Ok(Arc::clone(object)),
                        Err(_) => Err(Error::Load),
                    };

                    // A waiter that has gone away doesn't need the object anymore
                    let _ = waiter.send(shared);
                }

                result
            }
        }
    }

    /// Total size of objects currently held
    pub fn size(&self) -> u64 {
        self.recent.lock().size
    }

    pub fn len(&self) -> usize {
        self.recent.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Entries<K, V>
where
    K: Eq + Hash + Copy + Debug,
    V: Cacheable,
{
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Look up an object and mark it most recently used.
    fn touch(&mut self, key: &K) -> Option<Arc<V>> {
        let tick = self.tick();
        let entry = self.map.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, *key);

        Some(Arc::clone(&entry.object))
    }

    fn insert(&mut self, key: K, object: &Arc<V>) {
        let tick = self.tick();
        let size = object.size();
        if let Some(old) = self.map.insert(
            key,
            Entry {
                object: Arc::clone(object),
                size,
                tick,
            },
        ) {
            self.order.remove(&old.tick);
            self.size -= old.size;
        }
        self.order.insert(tick, key);
        self.size += size;

        while self.size > self.limit {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(evicted) = self.map.remove(&oldest) {
                self.size -= evicted.size;
            }
        }
    }

    #[cfg(test)]
    fn keys_by_recency(&self) -> Vec<K> {
        self.order.values().rev().copied().collect()
    }
}
