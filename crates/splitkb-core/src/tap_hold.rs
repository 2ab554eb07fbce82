use crate::types::{VKeyId, VirtualKeyRole};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decision {
    #[default]
    Inactive,
    Undecided,
    Hold,
}

/// Change of decision that the engine has to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Undecided -> Inactive: emit the tap reaction.
    Tap,
    /// Into Hold: press the modifier or shift the layer.
    HoldBegin,
    /// Hold -> Inactive: release the modifier or restore the layer.
    HoldEnd,
}

/// A virtual key whose press or release state changed during the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedKey {
    pub vkey: VKeyId,
    pub pressed_at: Instant,
    pub released: bool,
}

/// Input of one decision step.
#[derive(Debug, Clone, Copy)]
pub struct DecideCtx<'a> {
    pub now: Instant,
    pub term: Duration,
    pub permissive: bool,
    pub changed: &'a [ChangedKey],
}

/// Pure decision rule.
///
/// `pressed_at` is `Some` while the key is physically held.
pub fn decide(
    me: VKeyId,
    prev: Decision,
    pressed_at: Option<Instant>,
    ctx: &DecideCtx<'_>,
) -> Decision {
    let Some(since) = pressed_at else {
        return Decision::Inactive;
    };
    if prev == Decision::Hold {
        return Decision::Hold;
    }
    if ctx.now.saturating_duration_since(since) >= ctx.term {
        return Decision::Hold;
    }
    if ctx.permissive
        && ctx
            .changed
            .iter()
            .any(|c| c.vkey != me && c.released && c.pressed_at > since)
    {
        return Decision::Hold;
    }
    Decision::Undecided
}

#[derive(Debug, Clone)]
pub struct TapHoldKey {
    pub vkey: VKeyId,
    /// `ModTap` or `LayerTap`; decides what a hold does.
    pub role: VirtualKeyRole,
    pub state: Decision,
    /// Start of the current (or just ended) press.
    pub pressed_at: Option<Instant>,
    pressed: bool,
}

impl TapHoldKey {
    pub fn new(vkey: VKeyId, role: VirtualKeyRole) -> Self {
        Self {
            vkey,
            role,
            state: Decision::Inactive,
            pressed_at: None,
            pressed: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn is_undecided(&self) -> bool {
        self.state == Decision::Undecided
    }

    pub fn on_press(&mut self, t: Instant) {
        self.pressed = true;
        self.pressed_at = Some(t);
        self.state = Decision::Undecided;
    }

    /// Only records the release; the state changes in [`TapHoldKey::update`].
    pub fn on_release(&mut self) {
        self.pressed = false;
    }

    pub fn update(&mut self, ctx: &DecideCtx<'_>) -> Option<Transition> {
        let held_since = if self.pressed { self.pressed_at } else { None };
        let next = decide(self.vkey, self.state, held_since, ctx);
        let prev = std::mem::replace(&mut self.state, next);
        if next == Decision::Inactive {
            self.pressed_at = None;
        }

        match (prev, next) {
            (Decision::Undecided, Decision::Inactive) => Some(Transition::Tap),
            (Decision::Undecided | Decision::Inactive, Decision::Hold) => {
                Some(Transition::HoldBegin)
            }
            (Decision::Hold, Decision::Inactive) => Some(Transition::HoldEnd),
            _ => None,
        }
    }
}
