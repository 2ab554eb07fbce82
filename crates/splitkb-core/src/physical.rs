use crate::types::PKeyId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Source of raw switch samples. Implemented by the matrix/pin driver.
pub trait KeySampler {
    fn is_pressed(&mut self, key: PKeyId) -> bool;
}

impl KeySampler for HashSet<PKeyId> {
    fn is_pressed(&mut self, key: PKeyId) -> bool {
        self.contains(&key)
    }
}

impl KeySampler for BTreeSet<PKeyId> {
    fn is_pressed(&mut self, key: PKeyId) -> bool {
        self.contains(&key)
    }
}

/// Sampler whose state is published by another thread (driver or test harness).
#[derive(Debug, Clone, Default)]
pub struct SharedSampler {
    pressed: Arc<Mutex<HashSet<PKeyId>>>,
}

impl SharedSampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: PKeyId, pressed: bool) {
        let mut set = self.pressed.lock();
        if pressed {
            set.insert(key);
        } else {
            set.remove(&key);
        }
    }

    pub fn press(&self, key: PKeyId) {
        self.set(key, true);
    }

    pub fn release(&self, key: PKeyId) {
        self.set(key, false);
    }
}

impl KeySampler for SharedSampler {
    fn is_pressed(&mut self, key: PKeyId) -> bool {
        self.pressed.lock().contains(&key)
    }
}

#[derive(Debug, Clone)]
pub struct PhysicalKey {
    pub id: PKeyId,
    pub pressed_since: Option<Instant>,
}

impl PhysicalKey {
    pub fn new(id: PKeyId) -> Self {
        Self {
            id,
            pressed_since: None,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed_since.is_some()
    }

    fn sample(&mut self, now: Instant, pressed: bool) {
        match (pressed, self.pressed_since) {
            (true, None) => self.pressed_since = Some(now),
            (false, Some(_)) => self.pressed_since = None,
            _ => {}
        }
    }
}

/// All switches scanned by one half.
#[derive(Debug, Clone, Default)]
pub struct PhysicalKeys {
    keys: Vec<PhysicalKey>,
}

impl PhysicalKeys {
    pub fn new(ids: impl IntoIterator<Item = PKeyId>) -> Self {
        let ids: BTreeSet<PKeyId> = ids.into_iter().collect();
        Self {
            keys: ids.into_iter().map(PhysicalKey::new).collect(),
        }
    }

    /// Samples every switch and returns the set currently pressed.
    pub fn refresh<S: KeySampler + ?Sized>(
        &mut self,
        now: Instant,
        sampler: &mut S,
    ) -> BTreeSet<PKeyId> {
        let mut pressed = BTreeSet::new();
        for key in self.keys.iter_mut() {
            let down = sampler.is_pressed(key.id);
            key.sample(now, down);
            if down {
                pressed.insert(key.id);
            }
        }
        pressed
    }

    pub fn get(&self, id: PKeyId) -> Option<&PhysicalKey> {
        self.keys
            .binary_search_by_key(&id, |k| k.id)
            .ok()
            .map(|i| &self.keys[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhysicalKey> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
