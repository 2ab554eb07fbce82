use splitkb_core::keycodes::code_to_key_name;
use splitkb_core::types::VirtualKeyRole;
use splitkb_core::{load_keymap, LayerId, Side};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../keymaps/split_demo.json")
        });
    println!("Loading {:?}", path);

    let keymap = load_keymap(&path)?;
    println!("Loaded keymap successfully.");

    for side in [Side::Primary, Side::Secondary] {
        let kb = keymap.build_keyboard(side);
        println!("{:?} half:", side);
        for group in kb.groups() {
            println!("  Group {} ({} keys):", group.id, group.virtual_keys().count());
            for vkey in group.virtual_keys() {
                let pkeys: Vec<u16> = vkey.pkeys.iter().map(|p| p.0).collect();
                let subset = if vkey.is_subset_of_bigger { " (waits for chord)" } else { "" };
                println!("    {} <- {:?}{}", vkey.id, pkeys, subset);
            }
        }
    }

    println!("Tap-hold keys:");
    for (vkey, role) in keymap.roles().filter(|(_, r)| r.is_tap_hold()) {
        match role {
            VirtualKeyRole::Simple => {}
            VirtualKeyRole::ModTap(code) => {
                println!("  {} hold: {}", vkey, code_to_key_name(code).unwrap_or("?"));
            }
            VirtualKeyRole::LayerTap(layer) => {
                let name = keymap.layers().get(layer).map_or("?", |l| l.name.as_str());
                println!("  {} hold: layer {}", vkey, name);
            }
        }
    }

    for i in 0..keymap.layers().len() {
        let id = LayerId(i);
        if let Some(layer) = keymap.layers().get(id) {
            println!("Layer [{}]: {} reactions", layer.name, layer.len());
        }
    }

    Ok(())
}
