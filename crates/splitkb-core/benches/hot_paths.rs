use criterion::{black_box, criterion_group, criterion_main, Criterion};
use splitkb_core::link::{encode_key, FrameDecoder};
use splitkb_core::physical::SharedSampler;
use splitkb_core::{parse_keymap_content, Engine, PKeyId, VKeyId, VKeyPressEvent, VirtualKeyboard};
use std::time::{Duration, Instant};

const BENCH_KEYMAP: &str = r#"
{
    "groups": [
        { "id": 0, "keys": { "1": [1], "2": [2], "3": [3] } },
        { "id": 1, "keys": { "4": [4], "5": [5], "6": [4, 5] } }
    ],
    "vkey_order": [1, 2, 3, 4, 5, 6],
    "layers": [
        { "name": "base", "cells": ["A", "B", "C", "D", "E", "ESC"] },
        { "name": "nav",  "cells": ["_", "LEFT", "RIGHT", "", "", ""] }
    ],
    "tap_hold": { "1": { "modifier": "LCTRL" }, "3": { "layer": "nav" } }
}
"#;

fn setup() -> (VirtualKeyboard, Engine) {
    let keymap = parse_keymap_content(BENCH_KEYMAP).expect("failed to parse benchmark keymap");
    (
        keymap.build_keyboard(splitkb_core::Side::Primary),
        keymap.build_engine(),
    )
}

fn bench_idle_scan(c: &mut Criterion) {
    let (mut keyboard, mut engine) = setup();
    let mut sampler = SharedSampler::new();
    let t0 = Instant::now();
    c.bench_function("keyboard/idle_tick", |b| {
        b.iter(|| {
            let events = keyboard.scan(t0, &mut sampler);
            black_box(engine.tick(t0, &events));
        });
    });
}

fn bench_two_key_chord(c: &mut Criterion) {
    let (mut keyboard, mut engine) = setup();
    let mut sampler = SharedSampler::new();
    let t0 = Instant::now();
    let t1 = t0 + Duration::from_millis(10);
    let t2 = t0 + Duration::from_millis(20);
    c.bench_function("keyboard/two_key_chord", |b| {
        b.iter(|| {
            sampler.press(PKeyId(4));
            let ev = keyboard.scan(t0, &mut sampler);
            black_box(engine.tick(t0, &ev));
            sampler.press(PKeyId(5));
            let ev = keyboard.scan(t1, &mut sampler);
            black_box(engine.tick(t1, &ev));
            sampler.release(PKeyId(4));
            sampler.release(PKeyId(5));
            let ev = keyboard.scan(t2, &mut sampler);
            black_box(engine.tick(t2, &ev));
        });
    });
}

fn bench_tap_hold_tap(c: &mut Criterion) {
    let (_, mut engine) = setup();
    let t0 = Instant::now();
    let t1 = t0 + Duration::from_millis(80);
    let down = [VKeyPressEvent::press(t0, VKeyId(1))];
    let up = [VKeyPressEvent::release(t1, VKeyId(1))];
    c.bench_function("engine/tap_hold_tap", |b| {
        b.iter(|| {
            black_box(engine.tick(t0, &down));
            black_box(engine.tick(t1, &up));
        });
    });
}

fn bench_permissive_hold(c: &mut Criterion) {
    let (_, mut engine) = setup();
    let t0 = Instant::now();
    let ms = |n| t0 + Duration::from_millis(n);
    c.bench_function("engine/permissive_hold_nested_tap", |b| {
        b.iter(|| {
            black_box(engine.tick(ms(0), &[VKeyPressEvent::press(ms(0), VKeyId(1))]));
            black_box(engine.tick(ms(10), &[VKeyPressEvent::press(ms(10), VKeyId(2))]));
            black_box(engine.tick(ms(20), &[VKeyPressEvent::release(ms(20), VKeyId(2))]));
            black_box(engine.tick(ms(30), &[VKeyPressEvent::release(ms(30), VKeyId(1))]));
        });
    });
}

fn bench_frame_decode(c: &mut Criterion) {
    let mut bytes = Vec::new();
    for serial in 1..=64u8 {
        bytes.extend_from_slice(&encode_key(VKeyId(serial), serial % 2 == 0));
    }
    let mut decoder = FrameDecoder::new();
    c.bench_function("link/decode_64_key_frames", |b| {
        b.iter(|| black_box(decoder.decode(black_box(&bytes))));
    });
}

criterion_group!(
    benches,
    bench_idle_scan,
    bench_two_key_chord,
    bench_tap_hold_tap,
    bench_permissive_hold,
    bench_frame_decode
);
criterion_main!(benches);
