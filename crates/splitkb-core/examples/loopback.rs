use splitkb_core::keycodes::code_to_key_name;
use splitkb_core::link::loopback;
use splitkb_core::mouse::NoSensor;
use splitkb_core::physical::SharedSampler;
use splitkb_core::{load_keymap, KeyCmd, PKeyId};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Runs both halves on threads connected by an in-memory link and types a
/// short sequence through them.
fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../keymaps/split_demo.json");
    let keymap = load_keymap(&path)?;

    let (a, b) = loopback();
    let mut secondary = keymap.secondary(a);
    let mut primary = keymap.primary(b);

    let left = SharedSampler::new();
    let right = SharedSampler::new();
    let stop = Arc::new(AtomicBool::new(false));

    let secondary_thread = {
        let mut right = right.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            secondary.run(&mut right, &mut NoSensor, || stop.load(Ordering::Relaxed));
        })
    };

    let driver = {
        let left = left.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            let hold = |ms| thread::sleep(Duration::from_millis(ms));

            // Ctrl held past the tap-hold term, then H on the other half.
            left.press(PKeyId(1));
            hold(300);
            right.press(PKeyId(21));
            hold(30);
            right.release(PKeyId(21));
            hold(30);
            left.release(PKeyId(1));
            hold(30);

            // Two-key chord.
            left.press(PKeyId(7));
            left.press(PKeyId(8));
            hold(30);
            left.release(PKeyId(7));
            left.release(PKeyId(8));
            hold(30);

            stop.store(true, Ordering::Relaxed);
        })
    };

    let mut host: Vec<KeyCmd> = Vec::new();
    let mut pointer: Vec<(i8, i8)> = Vec::new();
    let mut left = left;
    primary.run(&mut left, &mut NoSensor, &mut host, &mut pointer, || {
        stop.load(Ordering::Relaxed)
    });

    let _ = driver.join();
    let _ = secondary_thread.join();

    for cmd in &host {
        let name = code_to_key_name(cmd.code()).unwrap_or("?");
        match cmd {
            KeyCmd::Press(_) => println!("press   {}", name),
            KeyCmd::Release(_) => println!("release {}", name),
        }
    }
    Ok(())
}
