//! Playback transport: play state, position, tempo and meter.
//!
//! The audio thread owns a [`Transport`]. Other threads talk to it through a
//! shared [`TransportRequests`], whose pending values are applied at the start
//! of each block by [`Transport::pre_process`]. Nodes see the result as a
//! copyable [`TransportSnapshot`] in their render context.

use core::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU32, Ordering};
use std::sync::Arc;

use crate::controls::AtomicF32;

/// Lowest accepted tempo in BPM.
pub const MIN_TEMPO: f32 = 20.0;
/// Highest accepted tempo in BPM.
pub const MAX_TEMPO: f32 = 999.0;

/// Transport state visible to nodes for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    /// True while playing.
    pub playing: bool,
    /// True while recording.
    pub recording: bool,
    /// Position of the first sample of the block, in frames.
    pub frame: i64,
    /// Tempo in BPM.
    pub tempo: f32,
    /// Beats per bar.
    pub beats_per_bar: u8,
    /// Note value of one beat (4 = quarter).
    pub beat_divisor: u8,
    /// Sample rate in Hz.
    pub sample_rate: f64,
}

impl Default for TransportSnapshot {
    fn default() -> Self {
        Self {
            playing: false,
            recording: false,
            frame: 0,
            tempo: 120.0,
            beats_per_bar: 4,
            beat_divisor: 4,
            sample_rate: 44100.0,
        }
    }
}

impl TransportSnapshot {
    /// Position in quarter-note beats.
    pub fn beat_position(&self) -> f64 {
        if self.sample_rate <= 0.0 {
            return 0.0;
        }
        self.frame as f64 / self.sample_rate * f64::from(self.tempo) / 60.0
    }

    /// Position in bars.
    pub fn bar_position(&self) -> f64 {
        self.beat_position() / f64::from(self.beats_per_bar.max(1))
    }
}

const NO_REQUEST: u8 = 0;
const REQUEST_OFF: u8 = 1;
const REQUEST_ON: u8 = 2;

/// Thread-safe pending changes for a [`Transport`].
///
/// Each setter overwrites the previous pending value; the transport consumes
/// them once per block.
#[derive(Debug)]
pub struct TransportRequests {
    play: AtomicU8,
    record: AtomicU8,
    seek: AtomicI64,
    seek_pending: AtomicBool,
    tempo: AtomicF32,
    tempo_pending: AtomicBool,
    meter: AtomicU32,
    meter_pending: AtomicBool,
}

impl Default for TransportRequests {
    fn default() -> Self {
        Self {
            play: AtomicU8::new(NO_REQUEST),
            record: AtomicU8::new(NO_REQUEST),
            seek: AtomicI64::new(0),
            seek_pending: AtomicBool::new(false),
            tempo: AtomicF32::new(120.0),
            tempo_pending: AtomicBool::new(false),
            meter: AtomicU32::new(0),
            meter_pending: AtomicBool::new(false),
        }
    }
}

impl TransportRequests {
    /// Requests play or stop.
    pub fn request_play_state(&self, playing: bool) {
        self.play
            .store(if playing { REQUEST_ON } else { REQUEST_OFF }, Ordering::Release);
    }

    /// Requests recording on or off.
    pub fn request_record_state(&self, recording: bool) {
        self.record
            .store(if recording { REQUEST_ON } else { REQUEST_OFF }, Ordering::Release);
    }

    /// Requests a jump to `frame`.
    pub fn seek(&self, frame: i64) {
        self.seek.store(frame, Ordering::Release);
        self.seek_pending.store(true, Ordering::Release);
    }

    /// Requests a tempo change.
    pub fn request_tempo(&self, bpm: f32) {
        self.tempo.set(bpm.clamp(MIN_TEMPO, MAX_TEMPO));
        self.tempo_pending.store(true, Ordering::Release);
    }

    /// Requests a meter change.
    pub fn request_meter(&self, beats_per_bar: u8, beat_divisor: u8) {
        let packed = (u32::from(beats_per_bar.max(1)) << 8) | u32::from(beat_divisor.max(1));
        self.meter.store(packed, Ordering::Release);
        self.meter_pending.store(true, Ordering::Release);
    }

    fn take_flag(state: &AtomicU8) -> Option<bool> {
        match state.swap(NO_REQUEST, Ordering::AcqRel) {
            REQUEST_ON => Some(true),
            REQUEST_OFF => Some(false),
            _ => None,
        }
    }
}

/// Audio-thread transport state.
#[derive(Debug)]
pub struct Transport {
    playing: bool,
    recording: bool,
    frame: i64,
    tempo: f32,
    beats_per_bar: u8,
    beat_divisor: u8,
    sample_rate: f64,
    requests: Arc<TransportRequests>,
    snapshot: TransportSnapshot,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(44100.0, 120.0)
    }
}

impl Transport {
    /// Creates a stopped transport at frame 0.
    pub fn new(sample_rate: f64, tempo: f32) -> Self {
        let tempo = tempo.clamp(MIN_TEMPO, MAX_TEMPO);
        let mut transport = Self {
            playing: false,
            recording: false,
            frame: 0,
            tempo,
            beats_per_bar: 4,
            beat_divisor: 4,
            sample_rate,
            requests: Arc::new(TransportRequests::default()),
            snapshot: TransportSnapshot::default(),
        };
        transport.update_snapshot();
        transport
    }

    /// Shared request handle for other threads.
    pub fn requests(&self) -> Arc<TransportRequests> {
        Arc::clone(&self.requests)
    }

    /// Changes the sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_snapshot();
    }

    /// Applies pending requests. Call at the start of each block.
    pub fn pre_process(&mut self, _num_samples: usize) {
        let req = &self.requests;
        if let Some(playing) = TransportRequests::take_flag(&req.play) {
            self.playing = playing;
        }
        if let Some(recording) = TransportRequests::take_flag(&req.record) {
            self.recording = recording;
        }
        if req.seek_pending.swap(false, Ordering::AcqRel) {
            self.frame = req.seek.load(Ordering::Acquire);
        }
        if req.tempo_pending.swap(false, Ordering::AcqRel) {
            self.tempo = req.tempo.get();
        }
        if req.meter_pending.swap(false, Ordering::AcqRel) {
            let packed = req.meter.load(Ordering::Acquire);
            self.beats_per_bar = (packed >> 8) as u8;
            self.beat_divisor = (packed & 0xff) as u8;
        }
        self.update_snapshot();
    }

    /// Moves the position forward. Call after rendering while playing.
    pub fn advance(&mut self, num_samples: usize) {
        self.frame += num_samples as i64;
    }

    /// Publishes the end-of-block state. Call after [`advance`](Self::advance).
    pub fn post_process(&mut self, _num_samples: usize) {
        self.update_snapshot();
    }

    fn update_snapshot(&mut self) {
        self.snapshot = TransportSnapshot {
            playing: self.playing,
            recording: self.recording,
            frame: self.frame,
            tempo: self.tempo,
            beats_per_bar: self.beats_per_bar,
            beat_divisor: self.beat_divisor,
            sample_rate: self.sample_rate,
        };
    }

    /// Current state.
    pub fn snapshot(&self) -> TransportSnapshot {
        self.snapshot
    }

    /// True while playing.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// True while recording.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Position in frames.
    pub fn position_frames(&self) -> i64 {
        self.frame
    }

    /// Tempo in BPM.
    pub fn tempo(&self) -> f32 {
        self.tempo
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_apply_in_pre_process() {
        let mut t = Transport::new(48000.0, 120.0);
        let req = t.requests();
        req.request_play_state(true);
        req.request_tempo(140.0);
        req.request_meter(3, 4);
        assert!(!t.is_playing());

        t.pre_process(256);
        assert!(t.is_playing());
        assert_eq!(t.tempo(), 140.0);
        assert_eq!(t.snapshot().beats_per_bar, 3);

        // consumed
        req.request_play_state(false);
        t.pre_process(256);
        t.pre_process(256);
        assert!(!t.is_playing());
    }

    #[test]
    fn test_advance_and_seek() {
        let mut t = Transport::new(48000.0, 120.0);
        t.advance(480);
        assert_eq!(t.position_frames(), 480);
        t.requests().seek(0);
        t.pre_process(64);
        assert_eq!(t.position_frames(), 0);
    }

    #[test]
    fn test_beat_position() {
        let snap = TransportSnapshot {
            frame: 48000,
            sample_rate: 48000.0,
            tempo: 120.0,
            ..TransportSnapshot::default()
        };
        assert!((snap.beat_position() - 2.0).abs() < 1e-9);
        assert!((snap.bar_position() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_request_clamped() {
        let mut t = Transport::default();
        t.requests().request_tempo(5000.0);
        t.pre_process(1);
        assert_eq!(t.tempo(), MAX_TEMPO);
    }
}
