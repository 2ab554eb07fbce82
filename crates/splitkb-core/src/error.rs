use thiserror::Error;

/// Problems found while turning a keymap description into runtime tables.
///
/// These only occur at start-up. The polling loop never fails.
#[derive(Error, Debug)]
pub enum KeymapError {
    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("virtual key label {0:?} is not a number")]
    BadVKeyLabel(String),

    #[error("virtual key serial {0} is outside 1..=127")]
    InvalidVKey(u16),

    #[error("virtual key {0} is defined more than once")]
    DuplicateVKey(u8),

    #[error("virtual key {0} is not mapped to any physical keys")]
    UnmappedVKey(u8),

    #[error("group {group}: virtual key {vkey} has no physical keys")]
    EmptyChord { group: usize, vkey: u8 },

    #[error("group {group}: virtual keys {first} and {second} use the same physical keys")]
    DuplicateChord { group: usize, first: u8, second: u8 },

    #[error("group id {0} is used more than once")]
    DuplicateGroup(usize),

    #[error("physical key {pkey} belongs to groups {first} and {second}")]
    SharedPhysicalKey { pkey: u16, first: usize, second: usize },

    #[error("unknown key name {0:?}")]
    UnknownKeyName(String),

    #[error("unknown layer {0:?}")]
    UnknownLayer(String),

    #[error("layer {layer:?} has {cells} cells but the key order grid has {expected}")]
    GridMismatch {
        layer: String,
        cells: usize,
        expected: usize,
    },

    #[error("tap-hold key {0} must name exactly one of `modifier` or `layer`")]
    InvalidTapHold(u8),

    #[error("keymap defines no layers")]
    NoLayers,
}

pub type KeymapResult<T> = Result<T, KeymapError>;
