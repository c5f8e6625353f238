//! The node-running render op.
//!
//! [`ProcessBufferOp`] gathers a node's bound pool buffers into private
//! scratch, applies the per-node controls around the node's render call, and
//! writes the node's outputs back to the pool.
//!
//! Order per block:
//! 1. disabled → silence outputs beyond the inputs and stop
//! 2. input gain / input mute ramp, input RMS
//! 3. MIDI key range, channel and program filter, transpose
//! 4. oversample up (audio, CV, MIDI frames)
//! 5. render, bypassed render, or the endpoint transfer for I/O roles
//! 6. oversample down
//! 7. output gain / mute ramp, output RMS

use core::fmt;

use crate::atom::AtomBuffer;
use crate::buffer::AudioBuffer;
use crate::controls::{MAX_METER_CHANNELS, NodeControls};
use crate::midi::MidiBuffer;
use crate::node::{NodeId, NodeRole, RenderContext};
use crate::ops::{OpContext, Pools, slot_of_mut};
use crate::oversample::Oversampler;
use crate::port::{PortCount, PortType};
use crate::slot::GraphIo;

/// Pool bindings for one node, indexed by channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelBindings {
    /// Audio pool index per audio channel.
    pub audio: Vec<usize>,
    /// Audio pool index per CV channel.
    pub cv: Vec<usize>,
    /// MIDI pool index per MIDI channel.
    pub midi: Vec<usize>,
    /// Atom pool index per atom channel.
    pub atom: Vec<usize>,
}

impl ChannelBindings {
    /// Bindings sized for `counts`, every channel on the empty buffer.
    pub(crate) fn for_counts(counts: &PortCount) -> Self {
        let width = |t: PortType| counts.get(t, true).max(counts.get(t, false)).max(1);
        Self {
            audio: vec![0; width(PortType::Audio)],
            cv: vec![0; width(PortType::Cv)],
            midi: vec![0; width(PortType::Midi)],
            atom: vec![0; width(PortType::Atom)],
        }
    }

    pub(crate) fn slot_mut(&mut self, port_type: PortType) -> Option<&mut Vec<usize>> {
        match port_type {
            PortType::Audio => Some(&mut self.audio),
            PortType::Cv => Some(&mut self.cv),
            PortType::Midi => Some(&mut self.midi),
            PortType::Atom => Some(&mut self.atom),
            PortType::Control => None,
        }
    }
}

/// Runs one node against its bound buffers.
pub struct ProcessBufferOp {
    id: NodeId,
    slot: usize,
    role: NodeRole,
    counts: PortCount,
    bindings: ChannelBindings,
    audio: AudioBuffer,
    cv: AudioBuffer,
    midi: Vec<MidiBuffer>,
    atom: Vec<AtomBuffer>,
    audio_os: Option<Oversampler>,
    cv_os: Option<Oversampler>,
    last_input_gain: f32,
    last_gain: f32,
    last_mute: bool,
}

impl ProcessBufferOp {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: NodeId,
        slot: usize,
        role: NodeRole,
        counts: PortCount,
        bindings: ChannelBindings,
        oversampling: usize,
        block_size: usize,
        controls: &NodeControls,
    ) -> Self {
        let audio_os = Oversampler::new(oversampling, bindings.audio.len(), block_size);
        let cv_os = audio_os
            .as_ref()
            .and_then(|os| Oversampler::new(os.factor(), bindings.cv.len(), block_size));
        Self {
            id,
            slot,
            role,
            counts,
            audio: AudioBuffer::new(bindings.audio.len(), block_size),
            cv: AudioBuffer::new(bindings.cv.len(), block_size),
            midi: (0..bindings.midi.len()).map(|_| MidiBuffer::new()).collect(),
            atom: (0..bindings.atom.len()).map(|_| AtomBuffer::new()).collect(),
            bindings,
            audio_os,
            cv_os,
            last_input_gain: controls.input_gain(),
            last_gain: controls.gain(),
            last_mute: controls.is_muted(),
        }
    }

    /// Node this op runs.
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Pool bindings per channel.
    pub fn bindings(&self) -> &ChannelBindings {
        &self.bindings
    }

    /// Oversampling factor in use, 1 when not oversampling.
    pub fn oversampling_factor(&self) -> usize {
        self.audio_os.as_ref().map_or(1, Oversampler::factor)
    }

    /// Delay added by the decimation filter, in base-rate samples.
    pub fn oversampling_latency(&self) -> usize {
        self.audio_os.as_ref().map_or(0, Oversampler::latency_samples)
    }

    fn count(&self, port_type: PortType, is_input: bool) -> usize {
        self.counts.get(port_type, is_input)
    }

    fn gather(&mut self, pools: &Pools, n: usize) {
        let audio_ins = self.count(PortType::Audio, true);
        self.audio.set_num_samples(n);
        for (ch, &buf) in self.bindings.audio.iter().enumerate() {
            if ch < audio_ins {
                self.audio.copy_from_slice(ch, pools.audio.channel(buf));
            } else {
                self.audio.clear_channel(ch);
            }
        }
        let cv_ins = self.count(PortType::Cv, true);
        self.cv.set_num_samples(n);
        for (ch, &buf) in self.bindings.cv.iter().enumerate() {
            if ch < cv_ins {
                self.cv.copy_from_slice(ch, pools.audio.channel(buf));
            } else {
                self.cv.clear_channel(ch);
            }
        }
        let midi_ins = self.count(PortType::Midi, true);
        for (ch, &buf) in self.bindings.midi.iter().enumerate() {
            if ch < midi_ins {
                self.midi[ch].copy_from(&pools.midi[buf]);
            } else {
                self.midi[ch].clear();
            }
        }
        let atom_ins = self.count(PortType::Atom, true);
        for (ch, &buf) in self.bindings.atom.iter().enumerate() {
            if ch < atom_ins {
                self.atom[ch].copy_from(&pools.atom[buf]);
            } else {
                self.atom[ch].clear();
            }
        }
    }

    fn scatter(&self, pools: &mut Pools) {
        let outs = self.count(PortType::Audio, false);
        for (ch, &buf) in self.bindings.audio.iter().enumerate().take(outs) {
            if buf != 0 {
                pools.audio.copy_from_slice(buf, self.audio.channel(ch));
            }
        }
        let outs = self.count(PortType::Cv, false);
        for (ch, &buf) in self.bindings.cv.iter().enumerate().take(outs) {
            if buf != 0 {
                pools.audio.copy_from_slice(buf, self.cv.channel(ch));
            }
        }
        let outs = self.count(PortType::Midi, false);
        for (ch, &buf) in self.bindings.midi.iter().enumerate().take(outs) {
            if buf != 0 {
                pools.midi[buf].copy_from(&self.midi[ch]);
            }
        }
        let outs = self.count(PortType::Atom, false);
        for (ch, &buf) in self.bindings.atom.iter().enumerate().take(outs) {
            if buf != 0 {
                pools.atom[buf].copy_from(&self.atom[ch]);
            }
        }
    }

    fn silence_outputs(&mut self) {
        let audio_ins = self.count(PortType::Audio, true);
        let audio_outs = self.count(PortType::Audio, false).min(self.audio.num_channels());
        for ch in audio_ins..audio_outs {
            self.audio.clear_channel(ch);
        }
        let cv_ins = self.count(PortType::Cv, true);
        let cv_outs = self.count(PortType::Cv, false).min(self.cv.num_channels());
        for ch in cv_ins..cv_outs {
            self.cv.clear_channel(ch);
        }
    }

    fn silence_all_outputs(&mut self) {
        let audio_outs = self.count(PortType::Audio, false).min(self.audio.num_channels());
        for ch in 0..audio_outs {
            self.audio.clear_channel(ch);
        }
        let cv_outs = self.count(PortType::Cv, false).min(self.cv.num_channels());
        for ch in 0..cv_outs {
            self.cv.clear_channel(ch);
        }
        for buf in &mut self.midi {
            buf.clear();
        }
        for buf in &mut self.atom {
            buf.clear();
        }
    }

    fn apply_input_gain(&mut self, controls: &NodeControls, muted: bool) {
        let ins = self.count(PortType::Audio, true);
        if ins == 0 {
            return;
        }
        let gain = controls.input_gain();
        let mutes_inputs = controls.mutes_inputs();
        if muted && mutes_inputs {
            if self.last_mute {
                self.audio.apply_gain(0..ins, 0.0);
            } else {
                self.audio.apply_gain_ramp(0..ins, self.last_input_gain, 0.0);
            }
        } else if self.last_mute && mutes_inputs {
            self.audio.apply_gain_ramp(0..ins, 0.0, gain);
        } else if gain != self.last_input_gain {
            self.audio.apply_gain_ramp(0..ins, self.last_input_gain, gain);
        } else {
            self.audio.apply_gain(0..ins, gain);
        }
        self.last_input_gain = gain;

        for ch in 0..ins.min(MAX_METER_CHANNELS) {
            controls.store_input_rms(ch, self.audio.rms(ch));
        }
    }

    fn apply_output_gain(&mut self, controls: &NodeControls, muted: bool) {
        let outs = self.count(PortType::Audio, false);
        let gain = controls.gain();
        if outs > 0 {
            if muted {
                if self.last_mute {
                    self.audio.apply_gain(0..outs, 0.0);
                } else {
                    self.audio.apply_gain_ramp(0..outs, self.last_gain, 0.0);
                }
            } else if self.last_mute {
                self.audio.apply_gain_ramp(0..outs, 0.0, gain);
            } else if gain != self.last_gain {
                self.audio.apply_gain_ramp(0..outs, self.last_gain, gain);
            } else {
                self.audio.apply_gain(0..outs, gain);
            }
            for ch in 0..outs.min(MAX_METER_CHANNELS) {
                controls.store_output_rms(ch, self.audio.rms(ch));
            }
        }
        self.last_gain = gain;
        self.last_mute = muted;
    }

    /// Applies key range, channel filter, program changes and transposition
    /// to the first MIDI input. Returns a program change to forward.
    fn filter_midi(&mut self, controls: &NodeControls) -> Option<u8> {
        if self.count(PortType::Midi, true) == 0 {
            return None;
        }
        let range = controls.key_range();
        let channels = controls.midi_channels();
        let programs = controls.midi_programs_enabled();
        let transpose = controls.transpose();
        let buffer = &mut self.midi[0];

        if !(range.is_active() || !channels.is_omni() || programs) {
            transpose.process_buffer(buffer);
            return None;
        }

        let mut program = None;
        buffer.retain(|ev| {
            let msg = &mut ev.message;
            if msg.is_note_on_or_off() && !range.contains(msg.note_number()) {
                return false;
            }
            if msg.channel() > 0 && channels.is_off(msg.channel()) {
                return false;
            }
            if programs && msg.is_program_change() {
                program = Some(msg.program_number());
                return false;
            }
            transpose.process(msg);
            true
        });
        program
    }

    fn transfer_io(&mut self, io: &mut GraphIo) {
        match self.role {
            NodeRole::AudioInput => {
                let outs = self.count(PortType::Audio, false).min(self.audio.num_channels());
                for ch in 0..outs {
                    if ch < io.audio_in.num_channels() {
                        self.audio.copy_from_slice(ch, io.audio_in.channel(ch));
                    } else {
                        self.audio.clear_channel(ch);
                    }
                }
            }
            NodeRole::AudioOutput => {
                let ins = self
                    .count(PortType::Audio, true)
                    .min(io.audio_out.num_channels());
                for ch in 0..ins {
                    io.audio_out.add_from_slice(ch, self.audio.channel(ch));
                }
            }
            NodeRole::MidiInput => {
                if self.count(PortType::Midi, false) > 0 {
                    self.midi[0].copy_from(&io.midi_in);
                }
            }
            NodeRole::MidiOutput => {
                if self.count(PortType::Midi, true) > 0 {
                    io.midi_out.merge_from(&self.midi[0]);
                    self.midi[0].clear();
                }
            }
            NodeRole::Ordinary => {}
        }
    }

    pub(crate) fn perform(&mut self, pools: &mut Pools, ctx: &mut OpContext<'_>) {
        let n = ctx.num_samples;
        self.gather(pools, n);

        let Some(slot) = slot_of_mut(ctx.nodes, self.slot, self.id) else {
            self.silence_all_outputs();
            self.scatter(pools);
            return;
        };
        let controls = slot.controls.clone();

        if !controls.is_enabled() {
            self.silence_outputs();
            self.scatter(pools);
            return;
        }

        let muted = controls.is_muted();
        self.apply_input_gain(&controls, muted);

        if let Some(program) = self.filter_midi(&controls) {
            controls.set_midi_program(program);
            slot.node.set_midi_program(program);
        }

        if self.role.is_io() {
            self.transfer_io(ctx.io);
        } else if !slot.is_prepared() {
            let outs = self.count(PortType::Audio, false).min(self.audio.num_channels());
            for ch in 0..outs {
                self.audio.clear_channel(ch);
            }
        } else if let (Some(audio_os), Some(cv_os)) = (self.audio_os.as_mut(), self.cv_os.as_mut()) {
            let factor = audio_os.factor();
            audio_os.upsample(&self.audio, n);
            cv_os.upsample(&self.cv, n);
            for buf in &mut self.midi {
                buf.scale_frames_up(factor as u32);
            }
            {
                let mut rc = RenderContext {
                    audio: audio_os.buffer_mut(),
                    cv: cv_os.buffer_mut(),
                    midi: &mut self.midi,
                    atom: &mut self.atom,
                    num_samples: n * factor,
                    transport: ctx.transport,
                };
                if controls.is_suspended() {
                    slot.node.render_bypassed(&mut rc);
                } else {
                    slot.node.render(&mut rc);
                }
            }
            let audio_outs = self.counts.get(PortType::Audio, false);
            audio_os.downsample(&mut self.audio, audio_outs, n);
            let cv_outs = self.counts.get(PortType::Cv, false);
            cv_os.downsample(&mut self.cv, cv_outs, n);
            for buf in &mut self.midi {
                buf.scale_frames_down(factor as u32);
            }
        } else {
            let mut rc = RenderContext {
                audio: &mut self.audio,
                cv: &mut self.cv,
                midi: &mut self.midi,
                atom: &mut self.atom,
                num_samples: n,
                transport: ctx.transport,
            };
            if controls.is_suspended() {
                slot.node.render_bypassed(&mut rc);
            } else {
                slot.node.render(&mut rc);
            }
        }

        self.apply_output_gain(&controls, muted);
        self.scatter(pools);
    }
}

impl fmt::Display for ProcessBufferOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessBuffer node[{}] audio{:?}", self.id, self.bindings.audio)?;
        if self.count(PortType::Cv, true) + self.count(PortType::Cv, false) > 0 {
            write!(f, " cv{:?}", self.bindings.cv)?;
        }
        if self.count(PortType::Midi, true) + self.count(PortType::Midi, false) > 0 {
            write!(f, " midi{:?}", self.bindings.midi)?;
        }
        if self.count(PortType::Atom, true) + self.count(PortType::Atom, false) > 0 {
            write!(f, " atom{:?}", self.bindings.atom)?;
        }
        if let Some(os) = &self.audio_os {
            write!(f, " ×{}", os.factor())?;
        }
        Ok(())
    }
}
