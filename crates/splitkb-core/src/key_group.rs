use crate::config::Profile;
use crate::error::{KeymapError, KeymapResult};
use crate::types::{PKeyId, VKeyId, VKeyPressEvent};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A logical key mapped to one or more physical keys of the same group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualKey {
    pub id: VKeyId,
    pub pkeys: BTreeSet<PKeyId>,
    /// True if another virtual key of the group uses a strict superset of `pkeys`.
    pub is_subset_of_bigger: bool,
}

/// Mutable part of a group, carried from one tick to the next.
#[derive(Debug, Clone, Default)]
pub struct GroupState {
    pub prev_pressed: BTreeSet<PKeyId>,
    /// Physical keys claimed by a resolved virtual key.
    pub bound: BTreeSet<PKeyId>,
    /// Resolved virtual keys, in commit order.
    pub pressed_vkeys: Vec<VKeyId>,
    pub undecided: Option<VKeyId>,
    pub deadline: Option<Instant>,
}

/// Chord resolver for a set of physical keys.
///
/// Every physical key belongs to exactly one group, and a group resolves its
/// pressed keys into at most one pending virtual key at a time.
#[derive(Debug, Clone)]
pub struct KeyGroup {
    pub id: usize,
    combo_term: Duration,
    vkeys: BTreeMap<VKeyId, VirtualKey>,
    by_pkeys: HashMap<BTreeSet<PKeyId>, VKeyId>,
    universe: BTreeSet<PKeyId>,
    pub state: GroupState,
}

impl KeyGroup {
    pub fn new(
        id: usize,
        profile: &Profile,
        chords: impl IntoIterator<Item = (VKeyId, Vec<PKeyId>)>,
    ) -> KeymapResult<Self> {
        let mut vkeys = BTreeMap::new();
        let mut by_pkeys = HashMap::new();

        for (vkey, pkeys) in chords {
            if !vkey.is_valid() {
                return Err(KeymapError::InvalidVKey(vkey.0 as u16));
            }
            let pkeys: BTreeSet<PKeyId> = pkeys.into_iter().collect();
            if pkeys.is_empty() {
                return Err(KeymapError::EmptyChord {
                    group: id,
                    vkey: vkey.0,
                });
            }
            if let Some(first) = by_pkeys.insert(pkeys.clone(), vkey) {
                return Err(KeymapError::DuplicateChord {
                    group: id,
                    first: first.0,
                    second: vkey.0,
                });
            }
            let key = VirtualKey {
                id: vkey,
                pkeys,
                is_subset_of_bigger: false,
            };
            if vkeys.insert(vkey, key).is_some() {
                return Err(KeymapError::DuplicateVKey(vkey.0));
            }
        }

        let sets: Vec<BTreeSet<PKeyId>> = vkeys.values().map(|v| v.pkeys.clone()).collect();
        for key in vkeys.values_mut() {
            key.is_subset_of_bigger = sets
                .iter()
                .any(|s| s.len() > key.pkeys.len() && key.pkeys.is_subset(s));
        }

        let universe = vkeys
            .values()
            .flat_map(|v| v.pkeys.iter().copied())
            .collect();

        Ok(Self {
            id,
            combo_term: profile.combo_term(),
            vkeys,
            by_pkeys,
            universe,
            state: GroupState::default(),
        })
    }

    pub fn universe(&self) -> &BTreeSet<PKeyId> {
        &self.universe
    }

    pub fn virtual_keys(&self) -> impl Iterator<Item = &VirtualKey> {
        self.vkeys.values()
    }

    pub fn virtual_key(&self, id: VKeyId) -> Option<&VirtualKey> {
        self.vkeys.get(&id)
    }

    /// Size of the largest chord in the group.
    pub fn max_chord_len(&self) -> usize {
        self.vkeys.values().map(|v| v.pkeys.len()).max().unwrap_or(0)
    }

    pub fn is_bound(&self, pkey: PKeyId) -> bool {
        self.state.bound.contains(&pkey)
    }

    pub fn undecided(&self) -> Option<VKeyId> {
        self.state.undecided
    }

    pub fn pressed_vkeys(&self) -> &[VKeyId] {
        &self.state.pressed_vkeys
    }

    /// Feeds one tick of samples. `all_pressed` may contain keys of other
    /// groups; they are ignored.
    pub fn update(&mut self, now: Instant, all_pressed: &BTreeSet<PKeyId>) -> Vec<VKeyPressEvent> {
        let cur: BTreeSet<PKeyId> = all_pressed.intersection(&self.universe).copied().collect();

        let mut output = Vec::new();
        self.flush_expired(now, &mut output);

        if cur == self.state.prev_pressed {
            return output;
        }

        let released: BTreeSet<PKeyId> = self
            .state
            .prev_pressed
            .difference(&cur)
            .copied()
            .collect();
        let added = !cur.is_subset(&self.state.prev_pressed);

        // Mixed ticks are handled release-first.
        if !released.is_empty() {
            self.on_release(now, &released, &mut output);
        }
        if added {
            self.on_press(now, &cur, &mut output);
        }

        self.state.prev_pressed = cur;
        output
    }

    /// Commits the undecided virtual key once its deadline has passed.
    pub fn update_by_time(&mut self, now: Instant) -> Vec<VKeyPressEvent> {
        let mut output = Vec::new();
        self.flush_expired(now, &mut output);
        output
    }

    fn flush_expired(&mut self, now: Instant, output: &mut Vec<VKeyPressEvent>) {
        let Some(deadline) = self.state.deadline else {
            return;
        };

        match self.state.undecided {
            Some(vkey) => {
                if now >= deadline {
                    debug!(group = self.id, %vkey, "combo term elapsed, committing");
                    self.clear_undecided();
                    self.commit(now, vkey, output);
                }
            }
            None => {
                warn!(
                    group = self.id,
                    "decision deadline recorded without an undecided key; resetting"
                );
                self.state.deadline = None;
            }
        }
    }

    fn on_press(&mut self, now: Instant, cur: &BTreeSet<PKeyId>, output: &mut Vec<VKeyPressEvent>) {
        let unbound: BTreeSet<PKeyId> = cur.difference(&self.state.bound).copied().collect();

        match self.by_pkeys.get(&unbound).copied() {
            Some(vkey) => {
                let is_subset = self
                    .vkeys
                    .get(&vkey)
                    .is_some_and(|v| v.is_subset_of_bigger);
                if is_subset {
                    debug!(group = self.id, %vkey, "waiting for a bigger chord");
                    self.state.undecided = Some(vkey);
                    self.state.deadline = Some(now + self.combo_term);
                } else {
                    self.clear_undecided();
                    self.commit(now, vkey, output);
                }
            }
            None => {
                if let Some(vkey) = self.state.undecided {
                    debug!(group = self.id, %vkey, "ambiguous chord, dropping undecided key");
                }
                self.clear_undecided();
            }
        }
    }

    fn on_release(
        &mut self,
        now: Instant,
        released: &BTreeSet<PKeyId>,
        output: &mut Vec<VKeyPressEvent>,
    ) {
        let mut ending: Vec<(VKeyId, usize)> = self
            .state
            .pressed_vkeys
            .iter()
            .filter_map(|v| self.vkeys.get(v))
            .filter(|v| !v.pkeys.is_disjoint(released))
            .map(|v| (v.id, v.pkeys.len()))
            .collect();
        // Bigger chords first; stable sort keeps commit order among equals.
        ending.sort_by_key(|(_, len)| Reverse(*len));

        for (vkey, _) in ending {
            if let Some(key) = self.vkeys.get(&vkey) {
                for p in &key.pkeys {
                    self.state.bound.remove(p);
                }
            }
            self.state.pressed_vkeys.retain(|v| *v != vkey);
            output.push(VKeyPressEvent::release(now, vkey));
        }

        if let Some(vkey) = self.state.undecided {
            let hit = self
                .vkeys
                .get(&vkey)
                .is_some_and(|v| !v.pkeys.is_disjoint(released));
            if hit {
                debug!(group = self.id, %vkey, "released inside combo term, tapping");
                self.clear_undecided();
                output.push(VKeyPressEvent::press(now, vkey));
                output.push(VKeyPressEvent::release(now, vkey));
            }
        }
    }

    fn commit(&mut self, now: Instant, vkey: VKeyId, output: &mut Vec<VKeyPressEvent>) {
        if let Some(key) = self.vkeys.get(&vkey) {
            self.state.bound.extend(key.pkeys.iter().copied());
        }
        self.state.pressed_vkeys.push(vkey);
        debug!(group = self.id, %vkey, "resolved");
        output.push(VKeyPressEvent::press(now, vkey));
    }

    fn clear_undecided(&mut self) {
        self.state.undecided = None;
        self.state.deadline = None;
    }
}
