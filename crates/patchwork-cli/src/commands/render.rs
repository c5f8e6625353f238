//! Offline session rendering command.

use std::path::{Path, PathBuf};

use clap::Args;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use indicatif::{ProgressBar, ProgressStyle};
use patchwork_core::{AudioBuffer, MidiBuffer};
use patchwork_nodes::NodeRegistry;

use super::common::{check_graph_index, linear_to_db, load_session};

#[derive(Args)]
pub struct RenderArgs {
    /// Session file or name
    #[arg(value_name = "SESSION")]
    session: String,

    /// Output WAV file
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Duration in seconds (defaults to the input length, or 5 s)
    #[arg(short, long)]
    seconds: Option<f64>,

    /// WAV file fed to the engine's audio inputs
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Graph to make current before rendering
    #[arg(short, long)]
    graph: Option<usize>,
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    let session = load_session(&args.session)?;
    check_graph_index(&session, args.graph)?;

    let registry = NodeRegistry::new();
    let mut engine = session.build(&registry)?;
    if let Some(index) = args.graph {
        engine.graphs_mut().set_current(index)?;
    }

    let settings = engine.settings().clone();
    let sample_rate = session.engine.sample_rate;
    let input = match &args.input {
        Some(path) => Some(read_input(path, sample_rate, settings.inputs)?),
        None => None,
    };

    let total_frames = match (args.seconds, &input) {
        (Some(seconds), _) if seconds >= 0.0 => (seconds * f64::from(sample_rate)).round() as usize,
        (Some(seconds), _) => anyhow::bail!("Duration must not be negative, got {seconds}"),
        (None, Some(channels)) => channels.first().map_or(0, Vec::len),
        (None, None) => 5 * sample_rate as usize,
    };

    println!(
        "Rendering '{}': {} graph(s), {} Hz, block {}, latency {} samples",
        session.name,
        engine.graphs().len(),
        sample_rate,
        settings.block_size,
        engine.latency_samples()
    );

    let spec = WavSpec {
        channels: settings.outputs as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(&args.output, spec)?;

    let pb = ProgressBar::new(total_frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let mut audio = AudioBuffer::new(settings.channels(), settings.block_size);
    let mut midi = MidiBuffer::new();
    let mut peaks = vec![0.0f32; settings.outputs];
    let mut position = 0;

    while position < total_frames {
        let n = (total_frames - position).min(settings.block_size);
        audio.set_num_samples(n);
        audio.clear();
        midi.clear();
        if let Some(channels) = &input {
            for (ch, samples) in channels.iter().enumerate() {
                let end = (position + n).min(samples.len());
                if position < end {
                    audio.channel_mut(ch)[..end - position].copy_from_slice(&samples[position..end]);
                }
            }
        }

        engine.process(&mut audio, &mut midi);

        for frame in 0..n {
            for ch in 0..settings.outputs {
                writer.write_sample(audio.channel(ch)[frame])?;
            }
        }
        for (ch, peak) in peaks.iter_mut().enumerate() {
            *peak = peak.max(audio.peak(ch));
        }

        position += n;
        pb.set_position(position as u64);
    }

    pb.finish_with_message("done");
    writer.finalize()?;

    println!("\nPeaks:");
    for (ch, peak) in peaks.iter().enumerate() {
        println!("  ch{}: {:.1} dB", ch, linear_to_db(*peak));
    }
    println!("\nWrote {} frames to {}", total_frames, args.output.display());
    Ok(())
}

/// Reads `path` into `channels` planar channels.
///
/// Mono files feed every input; extra file channels are dropped.
fn read_input(path: &Path, sample_rate: u32, channels: usize) -> anyhow::Result<Vec<Vec<f32>>> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    if spec.sample_rate != sample_rate {
        tracing::warn!(
            file = spec.sample_rate,
            session = sample_rate,
            "input sample rate differs from the session; no resampling is done"
        );
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let file_channels = usize::from(spec.channels.max(1));
    let frames = interleaved.len() / file_channels;
    let planar = (0..channels)
        .map(|ch| {
            let source = if file_channels == 1 { 0 } else { ch };
            if source >= file_channels {
                return vec![0.0; frames];
            }
            interleaved
                .chunks_exact(file_channels)
                .map(|frame| frame[source])
                .collect()
        })
        .collect();

    tracing::info!(
        path = %path.display(),
        frames,
        channels = file_channels,
        "read input"
    );
    Ok(planar)
}
