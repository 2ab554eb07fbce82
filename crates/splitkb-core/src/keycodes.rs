use crate::types::KeyCode;

/// Key names accepted in keymap reaction cells, with their HID usage ids.
pub const KEY_NAMES: &[(&str, KeyCode)] = &[
    // Letters
    ("A", KeyCode(0x04)),
    ("B", KeyCode(0x05)),
    ("C", KeyCode(0x06)),
    ("D", KeyCode(0x07)),
    ("E", KeyCode(0x08)),
    ("F", KeyCode(0x09)),
    ("G", KeyCode(0x0A)),
    ("H", KeyCode(0x0B)),
    ("I", KeyCode(0x0C)),
    ("J", KeyCode(0x0D)),
    ("K", KeyCode(0x0E)),
    ("L", KeyCode(0x0F)),
    ("M", KeyCode(0x10)),
    ("N", KeyCode(0x11)),
    ("O", KeyCode(0x12)),
    ("P", KeyCode(0x13)),
    ("Q", KeyCode(0x14)),
    ("R", KeyCode(0x15)),
    ("S", KeyCode(0x16)),
    ("T", KeyCode(0x17)),
    ("U", KeyCode(0x18)),
    ("V", KeyCode(0x19)),
    ("W", KeyCode(0x1A)),
    ("X", KeyCode(0x1B)),
    ("Y", KeyCode(0x1C)),
    ("Z", KeyCode(0x1D)),
    // Number row
    ("1", KeyCode(0x1E)),
    ("2", KeyCode(0x1F)),
    ("3", KeyCode(0x20)),
    ("4", KeyCode(0x21)),
    ("5", KeyCode(0x22)),
    ("6", KeyCode(0x23)),
    ("7", KeyCode(0x24)),
    ("8", KeyCode(0x25)),
    ("9", KeyCode(0x26)),
    ("0", KeyCode(0x27)),
    // Editing and whitespace
    ("ENTER", KeyCode(0x28)),
    ("ESC", KeyCode(0x29)),
    ("BSPC", KeyCode(0x2A)),
    ("TAB", KeyCode(0x2B)),
    ("SPACE", KeyCode(0x2C)),
    ("MINUS", KeyCode(0x2D)),
    ("EQUAL", KeyCode(0x2E)),
    ("LBRC", KeyCode(0x2F)),
    ("RBRC", KeyCode(0x30)),
    ("BSLS", KeyCode(0x31)),
    ("SCLN", KeyCode(0x33)),
    ("QUOT", KeyCode(0x34)),
    ("GRAVE", KeyCode(0x35)),
    ("COMMA", KeyCode(0x36)),
    ("DOT", KeyCode(0x37)),
    ("SLASH", KeyCode(0x38)),
    ("CAPS", KeyCode(0x39)),
    // Function row
    ("F1", KeyCode(0x3A)),
    ("F2", KeyCode(0x3B)),
    ("F3", KeyCode(0x3C)),
    ("F4", KeyCode(0x3D)),
    ("F5", KeyCode(0x3E)),
    ("F6", KeyCode(0x3F)),
    ("F7", KeyCode(0x40)),
    ("F8", KeyCode(0x41)),
    ("F9", KeyCode(0x42)),
    ("F10", KeyCode(0x43)),
    ("F11", KeyCode(0x44)),
    ("F12", KeyCode(0x45)),
    // Navigation
    ("INSERT", KeyCode(0x49)),
    ("HOME", KeyCode(0x4A)),
    ("PGUP", KeyCode(0x4B)),
    ("DELETE", KeyCode(0x4C)),
    ("END", KeyCode(0x4D)),
    ("PGDN", KeyCode(0x4E)),
    ("RIGHT", KeyCode(0x4F)),
    ("LEFT", KeyCode(0x50)),
    ("DOWN", KeyCode(0x51)),
    ("UP", KeyCode(0x52)),
    // Media
    ("MUTE", KeyCode(0x7F)),
    ("VOLU", KeyCode(0x80)),
    ("VOLD", KeyCode(0x81)),
    // Modifiers
    ("LCTRL", KeyCode(0xE0)),
    ("LSHIFT", KeyCode(0xE1)),
    ("LALT", KeyCode(0xE2)),
    ("LGUI", KeyCode(0xE3)),
    ("RCTRL", KeyCode(0xE4)),
    ("RSHIFT", KeyCode(0xE5)),
    ("RALT", KeyCode(0xE6)),
    ("RGUI", KeyCode(0xE7)),
];

/// Case-insensitive lookup of a key name.
pub fn key_name_to_code(name: &str) -> Option<KeyCode> {
    KEY_NAMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

pub fn code_to_key_name(code: KeyCode) -> Option<&'static str> {
    KEY_NAMES.iter().find(|(_, c)| *c == code).map(|(n, _)| *n)
}

impl KeyCode {
    pub fn is_modifier(self) -> bool {
        (0xE0..=0xE7).contains(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_name_lookup() {
        assert_eq!(key_name_to_code("a"), Some(KeyCode(0x04)));
        assert_eq!(key_name_to_code("LShift"), Some(KeyCode(0xE1)));
        assert_eq!(key_name_to_code("nope"), None);
        assert_eq!(code_to_key_name(KeyCode(0x2C)), Some("SPACE"));
    }

    #[test]
    fn test_modifier_range() {
        assert!(KeyCode(0xE0).is_modifier());
        assert!(KeyCode(0xE7).is_modifier());
        assert!(!KeyCode(0x04).is_modifier());
    }
}
