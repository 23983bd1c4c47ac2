use std::collections::HashMap;
use std::hash::Hash;

/// A stack of hash maps. Lookups search from the innermost frame outwards, inserts go to the
/// innermost frame. The outermost frame is never popped.
#[derive(Clone, Debug)]
pub struct ScopedMap<K, V> {
    frames: Vec<HashMap<K, V>>,
}

impl<K: Eq + Hash, V> Default for ScopedMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash, V> ScopedMap<K, V> {
    pub fn new() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.frames.last_mut() {
            Some(frame) => frame.insert(key, value),
            None => None,
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.frames.iter().rev().find_map(|frame| frame.get(key))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Every visible key, innermost frame first. Shadowed keys are reported once per frame.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.frames.iter().rev().flat_map(|frame| frame.keys())
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}
