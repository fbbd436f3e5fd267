use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// A bijection between identifier strings and dense indices `[0, N)`,
/// assigned in order of first observation.
#[derive(Debug, Default)]
pub struct IdMap {
    by_key: HashMap<String, usize>,
    keys: Vec<String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The index of `key`, inserting it at the next dense index if absent.
    pub fn get_or_insert(&mut self, key: &str) -> usize {
        if let Some(&index) = self.by_key.get(key) {
            return index;
        }
        let index = self.keys.len();
        self.by_key.insert(key.to_string(), index);
        self.keys.push(key.to_string());
        index
    }

    /// Lookup without insertion, for use after scans have completed.
    pub fn get(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    pub fn key_of(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    /// Decompose into the forward and reverse maps handed to callers.
    pub fn into_maps(self) -> (HashMap<String, usize>, Vec<String>) {
        (self.by_key, self.keys)
    }

    pub fn clone_maps(&self) -> (HashMap<String, usize>, Vec<String>) {
        (self.by_key.clone(), self.keys.clone())
    }
}

pub type SharedIdMap = Arc<Mutex<IdMap>>;

/// Per-collection identifier maps shared across scan workers.
///
/// The outer lock is held only long enough to clone the per-collection handle;
/// the per-collection mutex is held only for the slot operation. Indices are
/// deterministic for collections whose ids are interned from the serialized
/// shard-order merge; ids first observed by concurrent edge workers get
/// indices that depend on the realized interleaving, which is documented
/// behavior for collections not scanned up front.
#[derive(Default)]
pub struct InternerSet {
    collections: RwLock<HashMap<String, SharedIdMap>>,
}

impl InternerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared map for `collection`, creating it if absent.
    pub fn collection(&self, name: &str) -> SharedIdMap {
        if let Some(map) = self.collections.read().unwrap().get(name) {
            return map.clone();
        }
        let mut collections = self.collections.write().unwrap();
        collections.entry(name.to_string()).or_default().clone()
    }

    pub fn get_or_insert(&self, collection: &str, key: &str) -> usize {
        let map = self.collection(collection);
        let mut map = map.lock().unwrap();
        map.get_or_insert(key)
    }

    pub fn get(&self, collection: &str, key: &str) -> Option<usize> {
        let map = self.collections.read().unwrap().get(collection)?.clone();
        let map = map.lock().unwrap();
        map.get(key)
    }

    pub fn len_of(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap()
            .get(collection)
            .map(|map| map.lock().unwrap().len())
            .unwrap_or(0)
    }

    /// Snapshot every collection into `(key_to_ind, ind_to_key)` maps.
    pub fn snapshot(
        &self,
    ) -> (
        HashMap<String, HashMap<String, usize>>,
        HashMap<String, Vec<String>>,
    ) {
        let collections = self.collections.read().unwrap();
        let mut key_to_ind = HashMap::with_capacity(collections.len());
        let mut ind_to_key = HashMap::with_capacity(collections.len());

        for (name, map) in collections.iter() {
            let (forward, reverse) = map.lock().unwrap().clone_maps();
            key_to_ind.insert(name.clone(), forward);
            ind_to_key.insert(name.clone(), reverse);
        }
        (key_to_ind, ind_to_key)
    }
}
