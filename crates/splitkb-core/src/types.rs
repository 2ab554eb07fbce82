use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Serial of a physical switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PKeyId(pub u16);

/// Serial of a virtual key.
///
/// Serials travel over the split link as one signed byte, so the valid range
/// is `1..=127`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VKeyId(pub u8);

impl VKeyId {
    pub const MAX: u8 = 127;

    pub const fn is_valid(self) -> bool {
        self.0 >= 1 && self.0 <= Self::MAX
    }
}

impl fmt::Display for VKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Index into the layer table. Layer 0 is the default layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub usize);

impl LayerId {
    pub const DEFAULT: LayerId = LayerId(0);
}

/// HID keyboard usage id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyCode(pub u8);

/// Host-facing command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCmd {
    Press(KeyCode),
    Release(KeyCode),
}

impl KeyCmd {
    pub fn code(self) -> KeyCode {
        match self {
            KeyCmd::Press(code) | KeyCmd::Release(code) => code,
        }
    }
}

/// Commands sent when a virtual key goes down and when it comes back up.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyReaction {
    pub on_press: Vec<KeyCmd>,
    pub on_release: Vec<KeyCmd>,
}

impl KeyReaction {
    pub fn tap(code: KeyCode) -> Self {
        Self::chord(&[code])
    }

    /// Presses `codes` in order and releases them in reverse.
    pub fn chord(codes: &[KeyCode]) -> Self {
        Self {
            on_press: codes.iter().map(|c| KeyCmd::Press(*c)).collect(),
            on_release: codes.iter().rev().map(|c| KeyCmd::Release(*c)).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.on_press.is_empty() && self.on_release.is_empty()
    }
}

/// A virtual key went down or came up. The only message passed between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VKeyPressEvent {
    pub t: Instant,
    pub vkey: VKeyId,
    pub pressed: bool,
}

impl VKeyPressEvent {
    pub fn press(t: Instant, vkey: VKeyId) -> Self {
        Self {
            t,
            vkey,
            pressed: true,
        }
    }

    pub fn release(t: Instant, vkey: VKeyId) -> Self {
        Self {
            t,
            vkey,
            pressed: false,
        }
    }
}

/// How a virtual key behaves beyond its layer reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualKeyRole {
    /// Reaction comes straight from the active layer.
    Simple,
    /// Tap emits the layer reaction, hold keeps a modifier down.
    ModTap(KeyCode),
    /// Tap emits the layer reaction, hold switches to another layer.
    LayerTap(LayerId),
}

impl VirtualKeyRole {
    pub fn is_tap_hold(self) -> bool {
        !matches!(self, VirtualKeyRole::Simple)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chord_reaction_releases_in_reverse() {
        let shift = KeyCode(0xE1);
        let one = KeyCode(0x1E);
        let r = KeyReaction::chord(&[shift, one]);
        assert_eq!(r.on_press, vec![KeyCmd::Press(shift), KeyCmd::Press(one)]);
        assert_eq!(
            r.on_release,
            vec![KeyCmd::Release(one), KeyCmd::Release(shift)]
        );
    }

    #[test]
    fn test_vkey_serial_range() {
        assert!(!VKeyId(0).is_valid());
        assert!(VKeyId(1).is_valid());
        assert!(VKeyId(127).is_valid());
        assert!(!VKeyId(128).is_valid());
    }
}
