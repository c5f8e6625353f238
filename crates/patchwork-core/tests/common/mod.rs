//! Minimal nodes shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use patchwork_core::{
    DelayLine, MidiMessage, Node, PortCount, PortList, PortType, RenderContext,
};

pub const SAMPLE_RATE: f64 = 48000.0;
pub const BLOCK_SIZE: usize = 256;

fn audio_ports(ins: usize, outs: usize) -> PortList {
    PortCount::new().with(PortType::Audio, ins, outs).to_port_list()
}

/// Writes a constant to each of its audio outputs.
pub struct Dc {
    ports: PortList,
    value: f32,
}

impl Dc {
    pub fn new(channels: usize, value: f32) -> Box<Self> {
        Box::new(Self {
            ports: audio_ports(0, channels),
            value,
        })
    }
}

impl Node for Dc {
    fn name(&self) -> &str {
        "DC"
    }
    fn ports(&self) -> &PortList {
        &self.ports
    }
    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        for ch in 0..self.ports.count(PortType::Audio, false) {
            ctx.audio.channel_mut(ch).fill(self.value);
        }
    }
}

/// Emits a single 1.0 sample at the very start of the stream.
pub struct Impulse {
    ports: PortList,
    fired: bool,
}

impl Impulse {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            ports: audio_ports(0, 1),
            fired: false,
        })
    }
}

impl Node for Impulse {
    fn name(&self) -> &str {
        "Impulse"
    }
    fn ports(&self) -> &PortList {
        &self.ports
    }
    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let out = ctx.audio.channel_mut(0);
        out.fill(0.0);
        if !self.fired {
            out[0] = 1.0;
            self.fired = true;
        }
    }
}

/// Audio in to audio out, untouched.
pub struct Through {
    ports: PortList,
}

impl Through {
    pub fn new(channels: usize) -> Box<Self> {
        Box::new(Self {
            ports: audio_ports(channels, channels),
        })
    }
}

impl Node for Through {
    fn name(&self) -> &str {
        "Through"
    }
    fn ports(&self) -> &PortList {
        &self.ports
    }
    fn render(&mut self, _ctx: &mut RenderContext<'_>) {}
}

/// Mono delay that reports its delay as latency.
pub struct Latent {
    ports: PortList,
    delay: DelayLine,
}

impl Latent {
    pub fn new(samples: usize) -> Box<Self> {
        Box::new(Self {
            ports: audio_ports(1, 1),
            delay: DelayLine::new(samples),
        })
    }
}

impl Node for Latent {
    fn name(&self) -> &str {
        "Latent"
    }
    fn ports(&self) -> &PortList {
        &self.ports
    }
    fn latency_samples(&self) -> usize {
        self.delay.delay()
    }
    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        self.delay.process_inplace(ctx.audio.channel_mut(0));
    }
}

/// Shared copy of the last block a [`Capture`] saw.
pub type Captured = Arc<Mutex<Vec<Vec<f32>>>>;

/// Audio sink recording its inputs.
pub struct Capture {
    ports: PortList,
    captured: Captured,
}

impl Capture {
    pub fn new(channels: usize) -> (Box<Self>, Captured) {
        let captured: Captured = Arc::new(Mutex::new(vec![Vec::new(); channels]));
        let node = Box::new(Self {
            ports: audio_ports(channels, 0),
            captured: Arc::clone(&captured),
        });
        (node, captured)
    }
}

impl Node for Capture {
    fn name(&self) -> &str {
        "Capture"
    }
    fn ports(&self) -> &PortList {
        &self.ports
    }
    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let mut captured = self.captured.lock();
        for (ch, dst) in captured.iter_mut().enumerate() {
            dst.clear();
            dst.extend_from_slice(&ctx.audio.channel(ch)[..ctx.num_samples]);
        }
    }
}

pub fn peak(captured: &Captured, ch: usize) -> f32 {
    captured.lock()[ch].iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

/// Sends a note on at frame 0 and a note off at frame 10 every block.
pub struct MidiSource {
    ports: PortList,
}

impl MidiSource {
    pub fn new() -> Box<Self> {
        Box::new(Self {
            ports: PortCount::new().with(PortType::Midi, 0, 1).to_port_list(),
        })
    }
}

impl Node for MidiSource {
    fn name(&self) -> &str {
        "MIDI Source"
    }
    fn ports(&self) -> &PortList {
        &self.ports
    }
    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        ctx.midi[0].add(MidiMessage::note_on(1, 60, 100), 0);
        ctx.midi[0].add(MidiMessage::note_off(1, 60, 0), 10);
    }
}

/// Counts the MIDI events reaching its input in the last block.
pub struct MidiCounter {
    ports: PortList,
    count: Arc<AtomicUsize>,
}

impl MidiCounter {
    pub fn new() -> (Box<Self>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let node = Box::new(Self {
            ports: PortCount::new().with(PortType::Midi, 1, 0).to_port_list(),
            count: Arc::clone(&count),
        });
        (node, count)
    }
}

impl Node for MidiCounter {
    fn name(&self) -> &str {
        "MIDI Counter"
    }
    fn ports(&self) -> &PortList {
        &self.ports
    }
    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        self.count.store(ctx.midi[0].len(), Ordering::Relaxed);
    }
}

pub fn count(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::Relaxed)
}
