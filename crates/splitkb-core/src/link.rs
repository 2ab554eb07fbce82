//! Byte framing for the serial link between the two halves.
//!
//! Every frame starts with a one-byte discriminator followed by a fixed-size
//! payload:
//!
//! | discriminator      | payload              |
//! |--------------------|----------------------|
//! | `START_MARKER`     | none                 |
//! | `MOUSE_MARKER`     | `dx: i8`, `dy: i8`   |
//! | `KEY_EVENT_MARKER` | `i8`: +serial press, -serial release |
//!
//! Unknown discriminators are dropped one byte at a time until a known one
//! shows up again.

use crate::types::{VKeyId, VKeyPressEvent};
use crossbeam_channel::{Receiver, Sender};
use tracing::{trace, warn};

pub const START_MARKER: u8 = 0xA5;
pub const MOUSE_MARKER: u8 = b'M';
pub const KEY_EVENT_MARKER: u8 = b'K';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Start,
    Mouse { dx: i8, dy: i8 },
    Key { vkey: VKeyId, pressed: bool },
}

impl Frame {
    pub fn key_event(ev: &VKeyPressEvent) -> Self {
        Frame::Key {
            vkey: ev.vkey,
            pressed: ev.pressed,
        }
    }

    pub fn encode(&self, buf: &mut Vec<u8>) {
        match *self {
            Frame::Start => buf.push(START_MARKER),
            Frame::Mouse { dx, dy } => {
                buf.extend_from_slice(&[MOUSE_MARKER, dx as u8, dy as u8]);
            }
            Frame::Key { vkey, pressed } => {
                buf.extend_from_slice(&encode_key(vkey, pressed));
            }
        }
    }
}

/// Encodes a key event as `[KEY_EVENT_MARKER, ±serial]`.
///
/// Serials are masked to 7 bits; the keymap loader rejects anything larger.
pub fn encode_key(vkey: VKeyId, pressed: bool) -> [u8; 2] {
    let serial = (vkey.0 & 0x7F) as i8;
    let value = if pressed { serial } else { -serial };
    [KEY_EVENT_MARKER, value as u8]
}

pub fn encode_mouse(dx: i8, dy: i8) -> [u8; 3] {
    [MOUSE_MARKER, dx as u8, dy as u8]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum DecodeState {
    #[default]
    Idle,
    Mouse,
    MouseDx(i8),
    Key,
}

/// Incremental frame reader.
///
/// Bytes may arrive split across polls; a frame whose payload is still in
/// flight is completed on a later call.
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    state: DecodeState,
    dropped: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes discarded while resynchronizing.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecodeState::Idle => match byte {
                START_MARKER => {
                    trace!("start marker");
                    Some(Frame::Start)
                }
                MOUSE_MARKER => {
                    self.state = DecodeState::Mouse;
                    None
                }
                KEY_EVENT_MARKER => {
                    self.state = DecodeState::Key;
                    None
                }
                other => {
                    self.dropped += 1;
                    warn!(byte = other, "unknown discriminator dropped");
                    None
                }
            },
            DecodeState::Mouse => {
                self.state = DecodeState::MouseDx(byte as i8);
                None
            }
            DecodeState::MouseDx(dx) => {
                self.state = DecodeState::Idle;
                let dy = byte as i8;
                trace!(dx, dy, "mouse frame");
                Some(Frame::Mouse { dx, dy })
            }
            DecodeState::Key => {
                self.state = DecodeState::Idle;
                let value = byte as i8;
                let serial = value.unsigned_abs();
                if serial == 0 || serial > VKeyId::MAX {
                    self.dropped += 2;
                    warn!(value, "key frame with invalid serial dropped");
                    return None;
                }
                trace!(serial, pressed = value > 0, "key frame");
                Some(Frame::Key {
                    vkey: VKeyId(serial),
                    pressed: value > 0,
                })
            }
        }
    }

    pub fn decode(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|b| self.push(*b)).collect()
    }

    /// Drains whatever the link has buffered right now.
    pub fn poll<L: SerialLink + ?Sized>(&mut self, link: &mut L) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(byte) = link.read_byte() {
            if let Some(frame) = self.push(byte) {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Point-to-point byte link. Reads never block.
pub trait SerialLink {
    /// Next received byte, or `None` if nothing is waiting.
    fn read_byte(&mut self) -> Option<u8>;
    fn write(&mut self, bytes: &[u8]);
}

/// In-process link endpoint, used for simulation and tests.
#[derive(Debug, Clone)]
pub struct ChannelLink {
    tx: Sender<u8>,
    rx: Receiver<u8>,
}

/// Two connected endpoints: bytes written on one are read on the other.
pub fn loopback() -> (ChannelLink, ChannelLink) {
    let (a_tx, b_rx) = crossbeam_channel::unbounded();
    let (b_tx, a_rx) = crossbeam_channel::unbounded();
    (
        ChannelLink { tx: a_tx, rx: a_rx },
        ChannelLink { tx: b_tx, rx: b_rx },
    )
}

impl SerialLink for ChannelLink {
    fn read_byte(&mut self) -> Option<u8> {
        self.rx.try_recv().ok()
    }

    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if self.tx.send(b).is_err() {
                warn!("link peer disconnected, dropping outgoing bytes");
                return;
            }
        }
    }
}
