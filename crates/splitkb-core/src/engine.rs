use crate::config::Profile;
use crate::layer::{ActiveLayer, LayerTable};
use crate::tap_hold::{ChangedKey, DecideCtx, Decision, TapHoldKey, Transition};
use crate::types::{KeyCmd, LayerId, VKeyId, VKeyPressEvent, VirtualKeyRole};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Progress of a plain key's current press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SimpleState {
    Idle,
    /// Down, with its press still in the pending queue.
    Queued,
    /// Press sent using the reaction of `layer`.
    Sent { layer: LayerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    /// Plain key press, `released` once the key came back up.
    Press { released: bool },
    /// Tap-hold key that resolved to a tap.
    Tap,
}

/// Output held back while an older tap-hold key is undecided.
#[derive(Debug, Clone, Copy)]
struct Pending {
    vkey: VKeyId,
    pressed_at: Instant,
    kind: PendingKind,
}

#[derive(Debug, Clone, Copy)]
struct HoldTransition {
    since: Option<Instant>,
    vkey: VKeyId,
    role: VirtualKeyRole,
    transition: Transition,
}

/// Turns the merged stream of virtual key events into host commands.
pub struct Engine {
    profile: Profile,
    layers: LayerTable,
    active: ActiveLayer,
    pressed_at: BTreeMap<VKeyId, Instant>,
    tap_holds: BTreeMap<VKeyId, TapHoldKey>,
    simple: BTreeMap<VKeyId, SimpleState>,
    /// Plain presses and taps not sent yet, ordered by press time.
    pending: Vec<Pending>,
    /// Press time of the oldest undecided tap-hold key.
    defer_after: Option<Instant>,
}

impl Engine {
    pub fn new(
        profile: &Profile,
        layers: LayerTable,
        roles: impl IntoIterator<Item = (VKeyId, VirtualKeyRole)>,
    ) -> Self {
        let mut tap_holds = BTreeMap::new();
        let mut simple = BTreeMap::new();
        for (vkey, role) in roles {
            if role.is_tap_hold() {
                tap_holds.insert(vkey, TapHoldKey::new(vkey, role));
            } else {
                simple.insert(vkey, SimpleState::Idle);
            }
        }

        Self {
            profile: profile.clone(),
            layers,
            active: ActiveLayer::default(),
            pressed_at: BTreeMap::new(),
            tap_holds,
            simple,
            pending: Vec::new(),
            defer_after: None,
        }
    }

    pub fn active_layer(&self) -> LayerId {
        self.active.current()
    }

    pub fn knows(&self, vkey: VKeyId) -> bool {
        self.simple.contains_key(&vkey) || self.tap_holds.contains_key(&vkey)
    }

    pub fn is_pressed(&self, vkey: VKeyId) -> bool {
        self.pressed_at.contains_key(&vkey)
    }

    pub fn decision(&self, vkey: VKeyId) -> Option<Decision> {
        self.tap_holds.get(&vkey).map(|t| t.state)
    }

    /// True while output of `vkey` is held back behind an undecided tap-hold key.
    pub fn is_deferred(&self, vkey: VKeyId) -> bool {
        self.pending.iter().any(|p| p.vkey == vkey)
    }

    /// Runs one tick over the events collected for it, in arrival order.
    ///
    /// A release followed by a new press of the same key starts a new pass
    /// so that both presses are seen.
    pub fn tick(&mut self, now: Instant, events: &[VKeyPressEvent]) -> Vec<KeyCmd> {
        let mut output = Vec::new();
        let mut start = 0;
        let mut released: Vec<VKeyId> = Vec::new();

        for (i, ev) in events.iter().enumerate() {
            if ev.pressed && released.contains(&ev.vkey) {
                self.step(now, &events[start..i], &mut output);
                start = i;
                released.clear();
            }
            if !ev.pressed {
                released.push(ev.vkey);
            }
        }
        self.step(now, &events[start..], &mut output);

        output
    }

    fn step(&mut self, now: Instant, events: &[VKeyPressEvent], output: &mut Vec<KeyCmd>) {
        let (changed, releases) = self.apply_events(events);
        let transitions = self.update_tap_holds(now, &changed);
        self.update_deferral();
        self.update_layer(&transitions);

        self.emit_modifiers(&transitions, output);
        self.queue_taps(now, &transitions);
        self.emit_pending(output);
        self.emit_releases(releases, output);
    }

    /// Returns the keys that changed and the sent plain keys that came up.
    fn apply_events(
        &mut self,
        events: &[VKeyPressEvent],
    ) -> (Vec<ChangedKey>, Vec<(VKeyId, LayerId)>) {
        let mut changed = Vec::new();
        let mut releases = Vec::new();

        for ev in events {
            if !self.knows(ev.vkey) {
                warn!(vkey = %ev.vkey, "event for unknown virtual key dropped");
                continue;
            }

            if ev.pressed {
                if self.pressed_at.contains_key(&ev.vkey) {
                    debug!(vkey = %ev.vkey, "duplicate press ignored");
                    continue;
                }
                self.pressed_at.insert(ev.vkey, ev.t);
                changed.push(ChangedKey {
                    vkey: ev.vkey,
                    pressed_at: ev.t,
                    released: false,
                });

                if let Some(th) = self.tap_holds.get_mut(&ev.vkey) {
                    th.on_press(ev.t);
                } else if let Some(state) = self.simple.get_mut(&ev.vkey) {
                    *state = SimpleState::Queued;
                    self.enqueue(Pending {
                        vkey: ev.vkey,
                        pressed_at: ev.t,
                        kind: PendingKind::Press { released: false },
                    });
                }
            } else {
                let Some(pressed_at) = self.pressed_at.remove(&ev.vkey) else {
                    debug!(vkey = %ev.vkey, "release without press ignored");
                    continue;
                };
                changed.push(ChangedKey {
                    vkey: ev.vkey,
                    pressed_at,
                    released: true,
                });

                if let Some(th) = self.tap_holds.get_mut(&ev.vkey) {
                    th.on_release();
                } else if let Some(state) = self.simple.get_mut(&ev.vkey) {
                    match *state {
                        SimpleState::Queued => {
                            *state = SimpleState::Idle;
                            let held = PendingKind::Press { released: false };
                            if let Some(p) = self
                                .pending
                                .iter_mut()
                                .rev()
                                .find(|p| p.vkey == ev.vkey && p.kind == held)
                            {
                                p.kind = PendingKind::Press { released: true };
                            }
                        }
                        SimpleState::Sent { layer } => {
                            *state = SimpleState::Idle;
                            releases.push((ev.vkey, layer));
                        }
                        SimpleState::Idle => {}
                    }
                }
            }
        }

        (changed, releases)
    }

    /// Inserts by press time. A tap goes ahead of plain presses made at the
    /// same instant; plain presses keep arrival order.
    fn enqueue(&mut self, entry: Pending) {
        let pos = match entry.kind {
            PendingKind::Tap => self
                .pending
                .partition_point(|p| p.pressed_at < entry.pressed_at),
            PendingKind::Press { .. } => self
                .pending
                .partition_point(|p| p.pressed_at <= entry.pressed_at),
        };
        self.pending.insert(pos, entry);
    }

    fn update_tap_holds(&mut self, now: Instant, changed: &[ChangedKey]) -> Vec<HoldTransition> {
        let ctx = DecideCtx {
            now,
            term: self.profile.tap_hold_term(),
            permissive: self.profile.permissive_hold,
            changed,
        };

        let mut transitions = Vec::new();
        for th in self.tap_holds.values_mut() {
            let since = th.pressed_at;
            if let Some(transition) = th.update(&ctx) {
                debug!(vkey = %th.vkey, ?transition, "tap-hold decided");
                transitions.push(HoldTransition {
                    since,
                    vkey: th.vkey,
                    role: th.role,
                    transition,
                });
            }
        }
        transitions.sort_by_key(|t| (t.since, t.vkey));
        transitions
    }

    fn update_deferral(&mut self) {
        let oldest = self
            .tap_holds
            .values()
            .filter(|t| t.is_undecided())
            .filter_map(|t| t.pressed_at)
            .min();
        if oldest != self.defer_after {
            debug!(deferring = oldest.is_some(), "deferral point changed");
        }
        self.defer_after = oldest;
    }

    fn update_layer(&mut self, transitions: &[HoldTransition]) {
        for t in transitions {
            if let VirtualKeyRole::LayerTap(layer) = t.role {
                match t.transition {
                    Transition::HoldBegin => self.active.shift(layer, t.vkey),
                    Transition::HoldEnd => {
                        self.active.restore(t.vkey);
                    }
                    Transition::Tap => {}
                }
            }
        }
    }

    fn emit_modifiers(&self, transitions: &[HoldTransition], output: &mut Vec<KeyCmd>) {
        for t in transitions {
            if let VirtualKeyRole::ModTap(code) = t.role {
                match t.transition {
                    Transition::HoldBegin => output.push(KeyCmd::Press(code)),
                    Transition::HoldEnd => output.push(KeyCmd::Release(code)),
                    Transition::Tap => {}
                }
            }
        }
    }

    fn queue_taps(&mut self, now: Instant, transitions: &[HoldTransition]) {
        for t in transitions {
            if t.transition == Transition::Tap {
                self.enqueue(Pending {
                    vkey: t.vkey,
                    pressed_at: t.since.unwrap_or(now),
                    kind: PendingKind::Tap,
                });
            }
        }
    }

    /// Sends every queued entry not pressed after the oldest undecided
    /// tap-hold key, in press order.
    fn emit_pending(&mut self, output: &mut Vec<KeyCmd>) {
        let ready = match self.defer_after {
            Some(oldest) => self.pending.partition_point(|p| p.pressed_at <= oldest),
            None => self.pending.len(),
        };
        let layer = self.active.current();

        for entry in self.pending.drain(..ready) {
            let reaction = self.layers.reaction(entry.vkey, layer);
            if reaction.is_none() {
                debug!(vkey = %entry.vkey, ?layer, "no reaction");
            }
            match entry.kind {
                PendingKind::Tap | PendingKind::Press { released: true } => {
                    if let Some(r) = reaction {
                        output.extend_from_slice(&r.on_press);
                        output.extend_from_slice(&r.on_release);
                    }
                }
                PendingKind::Press { released: false } => {
                    if let Some(r) = reaction {
                        output.extend_from_slice(&r.on_press);
                    }
                    self.simple.insert(entry.vkey, SimpleState::Sent { layer });
                }
            }
        }
    }

    fn emit_releases(&self, releases: Vec<(VKeyId, LayerId)>, output: &mut Vec<KeyCmd>) {
        for (vkey, layer) in releases {
            if let Some(reaction) = self.layers.reaction(vkey, layer) {
                output.extend_from_slice(&reaction.on_release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Layer;
    use crate::types::{KeyCode, KeyReaction};
    use std::time::Duration;

    const LCTRL: KeyCode = KeyCode(0xE0);
    const KC_A: KeyCode = KeyCode(0x04);
    const KC_B: KeyCode = KeyCode(0x05);
    const KC_C: KeyCode = KeyCode(0x06);
    const KC_1: KeyCode = KeyCode(0x1E);

    // v1: mod-tap (LCTRL / a), v2: plain b, v3: plain c (1 on nav),
    // v4: layer-tap (nav / space), v5: layer-tap (num / enter)
    const MT: VKeyId = VKeyId(1);
    const B: VKeyId = VKeyId(2);
    const C: VKeyId = VKeyId(3);
    const LT: VKeyId = VKeyId(4);
    const LT2: VKeyId = VKeyId(5);

    fn make_engine(profile: Profile) -> Engine {
        let mut layers = LayerTable::new(
            Layer::new("base")
                .with(MT, KeyReaction::tap(KC_A))
                .with(B, KeyReaction::tap(KC_B))
                .with(C, KeyReaction::tap(KC_C))
                .with(LT, KeyReaction::tap(KeyCode(0x2C)))
                .with(LT2, KeyReaction::tap(KeyCode(0x28))),
        );
        let nav = layers.push(Layer::new("nav").with(C, KeyReaction::tap(KC_1)));
        let num = layers.push(Layer::new("num"));
        Engine::new(
            &profile,
            layers,
            [
                (MT, VirtualKeyRole::ModTap(LCTRL)),
                (B, VirtualKeyRole::Simple),
                (C, VirtualKeyRole::Simple),
                (LT, VirtualKeyRole::LayerTap(nav)),
                (LT2, VirtualKeyRole::LayerTap(num)),
            ],
        )
    }

    fn ms(t0: Instant, n: u64) -> Instant {
        t0 + Duration::from_millis(n)
    }

    fn press(e: &mut Engine, t: Instant, v: VKeyId) -> Vec<KeyCmd> {
        e.tick(t, &[VKeyPressEvent::press(t, v)])
    }

    fn release(e: &mut Engine, t: Instant, v: VKeyId) -> Vec<KeyCmd> {
        e.tick(t, &[VKeyPressEvent::release(t, v)])
    }

    fn tap(code: KeyCode) -> Vec<KeyCmd> {
        vec![KeyCmd::Press(code), KeyCmd::Release(code)]
    }

    #[test]
    fn test_quick_tap_hold_release_emits_tap_only() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        assert!(press(&mut e, t0, MT).is_empty());
        assert!(e.tick(ms(t0, 100), &[]).is_empty());
        assert_eq!(release(&mut e, ms(t0, 150), MT), tap(KC_A));
        assert_eq!(e.decision(MT), Some(Decision::Inactive));
    }

    #[test]
    fn test_hold_orders_around_later_key() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        press(&mut e, t0, MT);
        assert!(press(&mut e, ms(t0, 100), B).is_empty());
        assert!(e.is_deferred(B));

        assert_eq!(
            e.tick(ms(t0, 200), &[]),
            vec![KeyCmd::Press(LCTRL), KeyCmd::Press(KC_B)]
        );
        assert!(!e.is_deferred(B));
        assert_eq!(release(&mut e, ms(t0, 250), B), vec![KeyCmd::Release(KC_B)]);
        assert_eq!(
            release(&mut e, ms(t0, 300), MT),
            vec![KeyCmd::Release(LCTRL)]
        );
    }

    #[test]
    fn test_permissive_hold_precedes_nested_tap() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        press(&mut e, t0, MT);
        assert!(press(&mut e, ms(t0, 50), B).is_empty());
        assert_eq!(
            release(&mut e, ms(t0, 80), B),
            vec![
                KeyCmd::Press(LCTRL),
                KeyCmd::Press(KC_B),
                KeyCmd::Release(KC_B)
            ]
        );
        assert_eq!(
            release(&mut e, ms(t0, 120), MT),
            vec![KeyCmd::Release(LCTRL)]
        );
    }

    #[test]
    fn test_without_permissive_hold_a_nested_tap_waits() {
        let profile = Profile {
            permissive_hold: false,
            ..Profile::default()
        };
        let mut e = make_engine(profile);
        let t0 = Instant::now();

        press(&mut e, t0, MT);
        press(&mut e, ms(t0, 50), B);
        assert!(release(&mut e, ms(t0, 80), B).is_empty());

        let mut expected = tap(KC_A);
        expected.extend(tap(KC_B));
        assert_eq!(release(&mut e, ms(t0, 120), MT), expected);
    }

    #[test]
    fn test_repeated_taps_behind_undecided_key_are_kept() {
        let profile = Profile {
            permissive_hold: false,
            ..Profile::default()
        };
        let mut e = make_engine(profile);
        let t0 = Instant::now();

        assert!(press(&mut e, t0, MT).is_empty());
        assert!(press(&mut e, ms(t0, 20), B).is_empty());
        assert!(release(&mut e, ms(t0, 40), B).is_empty());
        assert!(press(&mut e, ms(t0, 60), B).is_empty());
        assert!(release(&mut e, ms(t0, 80), B).is_empty());
        assert!(e.is_deferred(B));

        let mut expected = tap(KC_A);
        expected.extend(tap(KC_B));
        expected.extend(tap(KC_B));
        assert_eq!(release(&mut e, ms(t0, 100), MT), expected);
        assert!(!e.is_deferred(B));
    }

    #[test]
    fn test_later_tap_hold_tap_waits_for_older_key() {
        let profile = Profile {
            permissive_hold: false,
            ..Profile::default()
        };
        let mut e = make_engine(profile);
        let t0 = Instant::now();

        press(&mut e, t0, MT);
        assert!(press(&mut e, ms(t0, 10), LT).is_empty());
        assert!(release(&mut e, ms(t0, 20), LT).is_empty());
        assert!(e.is_deferred(LT));

        assert_eq!(
            e.tick(ms(t0, 200), &[]),
            vec![
                KeyCmd::Press(LCTRL),
                KeyCmd::Press(KeyCode(0x2C)),
                KeyCmd::Release(KeyCode(0x2C)),
            ]
        );
        assert_eq!(release(&mut e, ms(t0, 250), MT), vec![KeyCmd::Release(LCTRL)]);
    }

    #[test]
    fn test_tap_releases_deferred_key_in_order() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        press(&mut e, t0, MT);
        assert!(press(&mut e, ms(t0, 50), B).is_empty());

        let mut expected = tap(KC_A);
        expected.push(KeyCmd::Press(KC_B));
        assert_eq!(release(&mut e, ms(t0, 100), MT), expected);
        assert_eq!(release(&mut e, ms(t0, 130), B), vec![KeyCmd::Release(KC_B)]);
    }

    #[test]
    fn test_key_pressed_before_tap_hold_is_not_deferred() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        assert_eq!(press(&mut e, t0, B), vec![KeyCmd::Press(KC_B)]);
        assert!(press(&mut e, ms(t0, 10), MT).is_empty());
        // B started before MT, so its release does not force a hold.
        assert_eq!(release(&mut e, ms(t0, 20), B), vec![KeyCmd::Release(KC_B)]);
        assert_eq!(e.decision(MT), Some(Decision::Undecided));
        assert_eq!(release(&mut e, ms(t0, 50), MT), tap(KC_A));
    }

    #[test]
    fn test_layer_tap_hold_switches_reactions() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        press(&mut e, t0, LT);
        assert!(e.tick(ms(t0, 200), &[]).is_empty());
        assert_eq!(e.active_layer(), LayerId(1));

        assert_eq!(press(&mut e, ms(t0, 210), C), vec![KeyCmd::Press(KC_1)]);
        assert!(release(&mut e, ms(t0, 220), LT).is_empty());
        assert_eq!(e.active_layer(), LayerId::DEFAULT);
        // Released with the reaction it was pressed with.
        assert_eq!(release(&mut e, ms(t0, 230), C), vec![KeyCmd::Release(KC_1)]);
        assert_eq!(press(&mut e, ms(t0, 240), C), vec![KeyCmd::Press(KC_C)]);
    }

    #[test]
    fn test_permissive_layer_hold_applies_to_nested_tap() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        press(&mut e, t0, LT);
        press(&mut e, ms(t0, 20), C);
        assert_eq!(release(&mut e, ms(t0, 40), C), tap(KC_1));
        assert_eq!(e.active_layer(), LayerId(1));
        assert!(release(&mut e, ms(t0, 60), LT).is_empty());
        assert_eq!(e.active_layer(), LayerId::DEFAULT);
    }

    #[test]
    fn test_racing_layer_shifts_keep_latest_owner() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        press(&mut e, t0, LT);
        e.tick(ms(t0, 200), &[]);
        press(&mut e, ms(t0, 210), LT2);
        e.tick(ms(t0, 410), &[]);
        assert_eq!(e.active_layer(), LayerId(2));

        release(&mut e, ms(t0, 420), LT);
        assert_eq!(e.active_layer(), LayerId(2));
        release(&mut e, ms(t0, 430), LT2);
        assert_eq!(e.active_layer(), LayerId::DEFAULT);
    }

    #[test]
    fn test_release_and_repress_in_one_tick() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        press(&mut e, t0, B);
        let t = ms(t0, 10);
        let res = e.tick(
            t,
            &[VKeyPressEvent::release(t, B), VKeyPressEvent::press(t, B)],
        );
        assert_eq!(res, vec![KeyCmd::Release(KC_B), KeyCmd::Press(KC_B)]);
        assert!(e.is_pressed(B));
    }

    #[test]
    fn test_unknown_and_stray_events_are_absorbed() {
        let mut e = make_engine(Profile::default());
        let t0 = Instant::now();

        assert!(press(&mut e, t0, VKeyId(99)).is_empty());
        assert!(release(&mut e, t0, B).is_empty());
        assert_eq!(press(&mut e, t0, B), vec![KeyCmd::Press(KC_B)]);
        assert!(press(&mut e, t0, B).is_empty());
    }
}
