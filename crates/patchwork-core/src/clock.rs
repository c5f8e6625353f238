//! MIDI clock generation and following.
//!
//! [`MidiClockMaster`] emits 24 clock messages per quarter note into a block,
//! carrying the fractional position of the next tick across blocks.
//!
//! [`MidiClockFollower`] estimates tempo from incoming clock timestamps with a
//! second-order [`DelayLockedLoop`]. The loop starts wide so it acquires a
//! new tempo quickly, then narrows after one beat to reject jitter.

use core::f64::consts::{PI, SQRT_2};

use crate::midi::{MidiBuffer, MidiMessage};
use crate::transport::{MAX_TEMPO, MIN_TEMPO};

/// MIDI clock pulses per quarter note.
pub const CLOCKS_PER_QUARTER: f64 = 24.0;

/// Updates after which the loop counts as locked.
pub const DLL_LOCK_UPDATES: u32 = 24;

const BANDWIDTH_UNLOCKED: f64 = 2.0;
const BANDWIDTH_LOCKED: f64 = 0.1;

/// Longest gap between clocks before the follower treats the signal as lost.
/// Twice the tick period at [`MIN_TEMPO`].
const MAX_TICK_GAP: f64 = 2.0 * 60.0 / (MIN_TEMPO as f64 * CLOCKS_PER_QUARTER);

fn period_to_bpm(period: f64) -> f64 {
    60.0 / (period * CLOCKS_PER_QUARTER)
}

/// Generates MIDI clock at the transport tempo.
#[derive(Debug, Clone)]
pub struct MidiClockMaster {
    sample_rate: f64,
    tempo: f64,
    next_tick: f64,
}

impl Default for MidiClockMaster {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            tempo: 120.0,
            next_tick: 0.0,
        }
    }
}

impl MidiClockMaster {
    /// Creates a master at 44.1 kHz and 120 BPM.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sample rate in Hz.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate > 0.0 {
            self.sample_rate = sample_rate;
        }
    }

    /// Sets the tempo in BPM, clamped to the transport range.
    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo = bpm.clamp(f64::from(MIN_TEMPO), f64::from(MAX_TEMPO));
    }

    /// Tempo in BPM.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Samples between two clock messages.
    pub fn samples_per_tick(&self) -> f64 {
        self.sample_rate * 60.0 / (self.tempo * CLOCKS_PER_QUARTER)
    }

    /// Places the next tick at the start of the next block.
    pub fn reset(&mut self) {
        self.next_tick = 0.0;
    }

    /// Adds the clock messages falling inside the next `num_samples` samples.
    pub fn render(&mut self, midi: &mut MidiBuffer, num_samples: usize) {
        let period = self.samples_per_tick();
        let end = num_samples as f64;
        // A tempo increase can leave the pending tick further out than a full period.
        let mut pos = self.next_tick.min(period);
        while pos < end {
            midi.add(MidiMessage::clock(), pos as u32);
            pos += period;
        }
        self.next_tick = pos - end;
    }
}

/// Second-order delay-locked loop tracking a periodic event stream.
#[derive(Debug, Clone, Default)]
pub struct DelayLockedLoop {
    b: f64,
    c: f64,
    e2: f64,
    t0: f64,
    t1: f64,
    rate: f64,
    updates: u32,
}

impl DelayLockedLoop {
    /// Creates an unlocked loop. Call [`reset`](Self::reset) before updating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts the loop at time `now` with an initial `period` estimate.
    /// `rate` is the nominal number of events per second-scale unit used to
    /// normalize the loop bandwidth.
    pub fn reset(&mut self, now: f64, period: f64, rate: f64) {
        self.rate = rate;
        self.e2 = period;
        self.t0 = now;
        self.t1 = now + period;
        self.updates = 0;
        self.set_bandwidth(BANDWIDTH_UNLOCKED);
    }

    fn set_bandwidth(&mut self, bandwidth: f64) {
        let omega = 2.0 * PI * bandwidth / self.rate;
        self.b = SQRT_2 * omega;
        self.c = omega * omega;
    }

    /// Feeds the timestamp of the next event.
    pub fn update(&mut self, time: f64) {
        let error = time - self.t1;
        self.t0 = self.t1;
        self.t1 += self.b * error + self.e2;
        self.e2 += self.c * error;
        self.updates = self.updates.saturating_add(1);
        if self.updates == DLL_LOCK_UPDATES {
            self.set_bandwidth(BANDWIDTH_LOCKED);
        }
    }

    /// Filtered period between events.
    pub fn time_diff(&self) -> f64 {
        self.t1 - self.t0
    }

    /// Current period estimate of the loop integrator.
    pub fn period(&self) -> f64 {
        self.e2
    }

    /// Predicted time of the next event.
    pub fn next_time(&self) -> f64 {
        self.t1
    }

    /// True once [`DLL_LOCK_UPDATES`] updates have been fed since the last reset.
    pub fn is_locked(&self) -> bool {
        self.updates >= DLL_LOCK_UPDATES
    }
}

/// Derives tempo from incoming MIDI clock messages.
#[derive(Debug, Clone, Default)]
pub struct MidiClockFollower {
    dll: DelayLockedLoop,
    last_tick: Option<f64>,
    running: bool,
    tempo: Option<f32>,
}

impl MidiClockFollower {
    /// Creates a follower waiting for its first clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the tracked signal.
    pub fn reset(&mut self) {
        self.last_tick = None;
        self.running = false;
        self.tempo = None;
    }

    /// True while the loop is locked onto a clock signal.
    pub fn is_locked(&self) -> bool {
        self.running && self.dll.is_locked()
    }

    /// Last tempo reported, in BPM.
    pub fn tempo(&self) -> Option<f32> {
        self.tempo
    }

    /// Processes one clock message received at `time` seconds.
    ///
    /// Returns the new tempo when the locked estimate moves by at least
    /// 0.01 BPM from the last reported value.
    pub fn process_clock(&mut self, time: f64) -> Option<f32> {
        let last = self.last_tick.replace(time)?;
        let gap = time - last;
        if gap <= 0.0 || gap > MAX_TICK_GAP {
            #[cfg(feature = "tracing")]
            tracing::debug!("midi_clock: signal lost after {gap:.3}s gap");
            self.running = false;
            return None;
        }
        if !self.running {
            self.dll.reset(time, gap, CLOCKS_PER_QUARTER);
            self.running = true;
            return None;
        }

        self.dll.update(time);
        if !self.dll.is_locked() {
            return None;
        }
        let bpm = period_to_bpm(self.dll.time_diff());
        let bpm = ((bpm * 100.0).round() / 100.0) as f32;
        let bpm = bpm.clamp(MIN_TEMPO, MAX_TEMPO);
        match self.tempo {
            Some(previous) if (previous - bpm).abs() < 0.01 => None,
            _ => {
                self.tempo = Some(bpm);
                Some(bpm)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bpm_to_period(bpm: f64) -> f64 {
        60.0 / (bpm * 24.0)
    }

    fn locked_at(bpm: f64, ticks: usize) -> (DelayLockedLoop, f64) {
        let period = bpm_to_period(bpm);
        let mut dll = DelayLockedLoop::new();
        dll.reset(0.0, period, 24.0);
        let mut time = period;
        for _ in 0..ticks {
            dll.update(time);
            time += period;
        }
        (dll, time)
    }

    fn count_clocks(midi: &MidiBuffer) -> usize {
        midi.iter().filter(|e| e.message.is_clock()).count()
    }

    #[test]
    fn test_dll_reset_and_lock() {
        let mut dll = DelayLockedLoop::new();
        assert!(!dll.is_locked());
        dll.reset(0.0, 0.02, 24.0);
        assert!(!dll.is_locked());
        assert!(dll.period() > 0.0);

        let (dll, _) = locked_at(120.0, 24);
        assert!(dll.is_locked());
    }

    #[test]
    fn test_dll_converges() {
        let (dll, _) = locked_at(120.0, 48);
        assert!((dll.time_diff() - bpm_to_period(120.0)).abs() < 0.001);
    }

    #[test]
    fn test_dll_tracks_tempo_change() {
        let (mut dll, mut time) = locked_at(120.0, 48);
        assert!((period_to_bpm(dll.time_diff()) - 120.0).abs() < 1.0);

        let period = bpm_to_period(140.0);
        let mut ticks = 0;
        for _ in 0..96 {
            dll.update(time);
            time += period;
            ticks += 1;
            if (period_to_bpm(dll.time_diff()) - 140.0).abs() < 2.0 {
                break;
            }
        }
        assert!(ticks <= 48, "took {ticks} ticks");
    }

    #[test]
    fn test_dll_large_swing() {
        let (mut dll, mut time) = locked_at(20.0, 48);
        assert!((period_to_bpm(dll.time_diff()) - 20.0).abs() < 1.0);

        let period = bpm_to_period(120.0);
        let mut ticks = 0;
        for _ in 0..192 {
            dll.update(time);
            time += period;
            ticks += 1;
            if (period_to_bpm(dll.time_diff()) - 120.0).abs() < 5.0 {
                break;
            }
        }
        assert!(ticks <= 96, "took {ticks} ticks");
    }

    #[test]
    fn test_dll_locked_change_settles() {
        let mut dll = DelayLockedLoop::new();
        dll.reset(0.0, bpm_to_period(120.0), 24.0);
        let mut time = 0.0;
        for _ in 0..24 {
            time += bpm_to_period(120.0);
            dll.update(time);
        }
        assert!(dll.is_locked());
        for _ in 0..8 * 24 {
            time += bpm_to_period(140.0);
            dll.update(time);
        }
        assert!((period_to_bpm(dll.time_diff()) - 140.0).abs() < 2.0);
    }

    #[test]
    fn test_dll_steady_tempos() {
        for bpm in [40.0, 60.0, 80.0, 100.0, 120.0, 140.0, 160.0, 180.0, 200.0, 240.0] {
            let (dll, _) = locked_at(bpm, 72);
            let error = (period_to_bpm(dll.time_diff()) - bpm).abs();
            assert!(error < 0.5, "{bpm} BPM measured with error {error}");
        }
    }

    #[test]
    fn test_dll_rejects_jitter() {
        let period = bpm_to_period(120.0);
        let mut dll = DelayLockedLoop::new();
        dll.reset(0.0, period, 24.0);
        let mut time = period;
        for i in 0..96 {
            let jitter = if i % 2 == 0 { 0.0005 } else { -0.0005 };
            dll.update(time + jitter);
            time += period;
        }
        assert!((period_to_bpm(dll.time_diff()) - 120.0).abs() < 1.0);
    }

    #[test]
    fn test_master_rate() {
        let mut master = MidiClockMaster::new();
        master.set_sample_rate(44100.0);
        master.set_tempo(120.0);
        let mut midi = MidiBuffer::new();
        let mut total = 0;
        for _ in 0..(44100 / 512) {
            midi.clear();
            master.render(&mut midi, 512);
            total += count_clocks(&midi);
        }
        assert!((46..=50).contains(&total), "got {total}");
    }

    #[test]
    fn test_master_follows_tempo_changes() {
        let mut master = MidiClockMaster::new();
        master.set_sample_rate(44100.0);
        master.set_tempo(120.0);
        let mut midi = MidiBuffer::new();
        for _ in 0..10 {
            midi.clear();
            master.render(&mut midi, 512);
        }

        let half_second = 44100 / 512 / 2;
        master.set_tempo(240.0);
        let mut fast = 0;
        for _ in 0..half_second {
            midi.clear();
            master.render(&mut midi, 512);
            fast += count_clocks(&midi);
        }
        assert!((44..=52).contains(&fast), "got {fast}");

        master.set_tempo(60.0);
        let mut slow = 0;
        for _ in 0..half_second {
            midi.clear();
            master.render(&mut midi, 512);
            slow += count_clocks(&midi);
        }
        assert!((10..=14).contains(&slow), "got {slow}");
    }

    #[test]
    fn test_master_frames_inside_block() {
        let mut master = MidiClockMaster::new();
        master.set_sample_rate(96000.0);
        master.set_tempo(300.0);
        let mut midi = MidiBuffer::new();
        master.render(&mut midi, 512);
        assert!(midi.iter().all(|e| e.frame < 512));
        assert_eq!(midi.iter().next().map(|e| e.frame), Some(0));
    }

    #[test]
    fn test_follower_reports_tempo() {
        let mut follower = MidiClockFollower::new();
        let period = bpm_to_period(128.0);
        let mut reported = None;
        for i in 0..96 {
            if let Some(bpm) = follower.process_clock(f64::from(i) * period) {
                reported = Some(bpm);
            }
        }
        assert!(follower.is_locked());
        let bpm = reported.expect("tempo reported");
        assert!((bpm - 128.0).abs() < 0.5, "reported {bpm}");
    }

    #[test]
    fn test_follower_drops_lost_signal() {
        let mut follower = MidiClockFollower::new();
        let period = bpm_to_period(120.0);
        for i in 0..48 {
            follower.process_clock(f64::from(i) * period);
        }
        assert!(follower.is_locked());
        assert_eq!(follower.process_clock(10.0), None);
        assert!(!follower.is_locked());
    }
}
