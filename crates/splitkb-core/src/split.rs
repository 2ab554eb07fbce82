//! Polling loops of the two halves.
//!
//! The secondary half resolves its own key groups and ships the resulting
//! events over the link. The primary half merges those with its local events
//! and runs the [`Engine`]. Received events are re-stamped with the primary's
//! clock; the secondary's timing is never trusted.

use crate::config::Profile;
use crate::engine::Engine;
use crate::keyboard::VirtualKeyboard;
use crate::link::{Frame, FrameDecoder, SerialLink};
use crate::mouse::{MotionAccumulator, MotionSensor};
use crate::physical::KeySampler;
use crate::types::{KeyCmd, KeyCode, VKeyPressEvent};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Host-facing key transport.
pub trait HostSink {
    fn press(&mut self, code: KeyCode);
    fn release(&mut self, code: KeyCode);
}

impl HostSink for Vec<KeyCmd> {
    fn press(&mut self, code: KeyCode) {
        self.push(KeyCmd::Press(code));
    }

    fn release(&mut self, code: KeyCode) {
        self.push(KeyCmd::Release(code));
    }
}

pub fn send_commands<H: HostSink + ?Sized>(host: &mut H, commands: &[KeyCmd]) {
    for cmd in commands {
        match *cmd {
            KeyCmd::Press(code) => host.press(code),
            KeyCmd::Release(code) => host.release(code),
        }
    }
}

/// Host-facing pointer transport.
pub trait PointerSink {
    fn move_by(&mut self, dx: i8, dy: i8);
}

impl PointerSink for Vec<(i8, i8)> {
    fn move_by(&mut self, dx: i8, dy: i8) {
        self.push((dx, dy));
    }
}

pub struct SecondaryHalf<L> {
    keyboard: VirtualKeyboard,
    link: L,
    motion: MotionAccumulator,
    poll_interval: Duration,
    started: bool,
    buf: Vec<u8>,
}

impl<L: SerialLink> SecondaryHalf<L> {
    pub fn new(profile: &Profile, keyboard: VirtualKeyboard, link: L) -> Self {
        Self {
            keyboard,
            link,
            motion: MotionAccumulator::default(),
            poll_interval: profile.poll_interval(),
            started: false,
            buf: Vec::new(),
        }
    }

    pub fn keyboard(&self) -> &VirtualKeyboard {
        &self.keyboard
    }

    pub fn add_motion(&mut self, dx: i32, dy: i32) {
        self.motion.add(dx, dy);
    }

    /// Scans the switches and writes this tick's frames. The first call also
    /// writes the START marker.
    pub fn tick<S: KeySampler + ?Sized>(
        &mut self,
        now: Instant,
        sampler: &mut S,
    ) -> Vec<VKeyPressEvent> {
        self.buf.clear();
        if !self.started {
            Frame::Start.encode(&mut self.buf);
            self.started = true;
        }

        let events = self.keyboard.scan(now, sampler);
        for ev in &events {
            trace!(vkey = %ev.vkey, pressed = ev.pressed, "sending key event");
            Frame::key_event(ev).encode(&mut self.buf);
        }
        if let Some((dx, dy)) = self.motion.take() {
            Frame::Mouse { dx, dy }.encode(&mut self.buf);
        }

        if !self.buf.is_empty() {
            self.link.write(&self.buf);
        }
        events
    }

    /// Runs until `stop` returns true.
    pub fn run<S, M, F>(&mut self, sampler: &mut S, sensor: &mut M, mut stop: F)
    where
        S: KeySampler + ?Sized,
        M: MotionSensor + ?Sized,
        F: FnMut() -> bool,
    {
        info!(vkeys = self.keyboard.vkeys().count(), "secondary half started");
        while !stop() {
            let (dx, dy) = sensor.read_delta();
            self.add_motion(dx, dy);
            self.tick(Instant::now(), sampler);
            thread::sleep(self.poll_interval);
        }
        info!("secondary half stopped");
    }
}

/// Everything the primary produced in one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutput {
    pub commands: Vec<KeyCmd>,
    pub motion: Option<(i8, i8)>,
}

pub struct PrimaryHalf<L> {
    keyboard: VirtualKeyboard,
    engine: Engine,
    link: L,
    decoder: FrameDecoder,
    motion: MotionAccumulator,
    poll_interval: Duration,
}

impl<L: SerialLink> PrimaryHalf<L> {
    pub fn new(profile: &Profile, keyboard: VirtualKeyboard, engine: Engine, link: L) -> Self {
        Self {
            keyboard,
            engine,
            link,
            decoder: FrameDecoder::new(),
            motion: MotionAccumulator::default(),
            poll_interval: profile.poll_interval(),
        }
    }

    pub fn keyboard(&self) -> &VirtualKeyboard {
        &self.keyboard
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub fn add_motion(&mut self, dx: i32, dy: i32) {
        self.motion.add(dx, dy);
    }

    /// One tick: received events first, in arrival order, then the local scan.
    pub fn tick<S: KeySampler + ?Sized>(&mut self, now: Instant, sampler: &mut S) -> TickOutput {
        let mut events = Vec::new();
        for frame in self.decoder.poll(&mut self.link) {
            match frame {
                Frame::Start => debug!("secondary half announced itself"),
                Frame::Mouse { dx, dy } => self.motion.add(i32::from(dx), i32::from(dy)),
                Frame::Key { vkey, pressed } => events.push(VKeyPressEvent {
                    t: now,
                    vkey,
                    pressed,
                }),
            }
        }
        events.extend(self.keyboard.scan(now, sampler));

        TickOutput {
            commands: self.engine.tick(now, &events),
            motion: self.motion.take(),
        }
    }

    /// Runs until `stop` returns true, handing output to the host sinks.
    pub fn run<S, M, H, P, F>(
        &mut self,
        sampler: &mut S,
        sensor: &mut M,
        host: &mut H,
        pointer: &mut P,
        mut stop: F,
    ) where
        S: KeySampler + ?Sized,
        M: MotionSensor + ?Sized,
        H: HostSink + ?Sized,
        P: PointerSink + ?Sized,
        F: FnMut() -> bool,
    {
        info!(vkeys = self.keyboard.vkeys().count(), "primary half started");
        while !stop() {
            let (dx, dy) = sensor.read_delta();
            self.add_motion(dx, dy);

            let out = self.tick(Instant::now(), sampler);
            send_commands(host, &out.commands);
            if let Some((dx, dy)) = out.motion {
                pointer.move_by(dx, dy);
            }
            thread::sleep(self.poll_interval);
        }
        info!(dropped_bytes = self.decoder.dropped(), "primary half stopped");
    }
}
