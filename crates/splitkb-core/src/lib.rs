pub mod config;
pub mod engine;
pub mod error;
pub mod key_group;
pub mod keyboard;
pub mod keycodes;
pub mod keymap;
pub mod layer;
pub mod link;
pub mod mouse;
pub mod physical;
pub mod split;
pub mod tap_hold;
pub mod types;

pub use config::Profile;
pub use engine::Engine;
pub use error::{KeymapError, KeymapResult};
pub use keyboard::VirtualKeyboard;
pub use keymap::{load_keymap, parse_keymap_content, Keymap, Side};
pub use split::{PrimaryHalf, SecondaryHalf, TickOutput};
pub use types::{KeyCmd, KeyCode, KeyReaction, LayerId, PKeyId, VKeyId, VKeyPressEvent};
