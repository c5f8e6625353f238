//! Control sources and CV sinks.

use patchwork_core::{Node, PortCount, PortList, PortType, RenderContext};
use serde::{Deserialize, Serialize};

use crate::params::{NodeParams, ParamError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ValueState {
    value: f32,
}

/// A single Control output holding a settable value.
///
/// Connected to a Control input the value is handed over once per block;
/// connected to a CV input it becomes a smoothed audio-rate signal.
#[derive(Debug, Clone)]
pub struct ControlValue {
    ports: PortList,
    value: f32,
    min: f32,
    max: f32,
}

impl ControlValue {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &["value", "min", "max"];

    /// Creates a value clamped to `min..=max`.
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            ports: PortCount::new().with(PortType::Control, 0, 1).to_port_list(),
            value: value.clamp(min, max),
            min,
            max,
        }
    }

    /// Builds from named parameters.
    pub fn from_params(params: &NodeParams) -> Result<Self, ParamError> {
        let min = params.float("min", 0.0, -1.0e6..=1.0e6)?;
        let max = params.float("max", 1.0, -1.0e6..=1.0e6)?;
        let value = params.float("value", min, f64::from(min.min(max))..=f64::from(min.max(max)))?;
        Ok(Self::new(value, min, max))
    }

    /// Current value.
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Sets the value, clamped to the node's range.
    pub fn set_value(&mut self, value: f32) {
        self.value = value.clamp(self.min, self.max);
    }
}

impl Node for ControlValue {
    fn name(&self) -> &str {
        "Value"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn render(&mut self, _ctx: &mut RenderContext<'_>) {}

    fn parameter(&self, port: usize) -> Option<f32> {
        (port == 0).then_some(self.value)
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&ValueState { value: self.value }).unwrap_or_default()
    }

    fn set_state(&mut self, data: &[u8]) {
        if let Ok(state) = serde_json::from_slice::<ValueState>(data) {
            self.set_value(state.value);
        }
    }
}

/// What a [`CvCapture`] has seen, as reported through [`Node::state`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CvReport {
    /// Last sample of the last block.
    pub last: f32,
    /// Smallest sample seen.
    pub min: f32,
    /// Largest sample seen.
    pub max: f32,
}

impl CvReport {
    /// Parses a CV capture node's state blob.
    pub fn from_state(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

/// CV sink recording the range of its input.
#[derive(Debug, Clone)]
pub struct CvCapture {
    ports: PortList,
    report: Option<CvReport>,
}

impl CvCapture {
    /// Parameter names accepted by [`from_params`](Self::from_params).
    pub const PARAMS: &'static [&'static str] = &[];

    /// Creates a CV sink.
    pub fn new() -> Self {
        Self {
            ports: PortCount::new().with(PortType::Cv, 1, 0).to_port_list(),
            report: None,
        }
    }

    /// Builds from named parameters.
    pub fn from_params(_params: &NodeParams) -> Result<Self, ParamError> {
        Ok(Self::new())
    }

    /// Measurements so far, if any block was rendered.
    pub fn report(&self) -> Option<CvReport> {
        self.report
    }
}

impl Default for CvCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl Node for CvCapture {
    fn name(&self) -> &str {
        "CV Capture"
    }

    fn ports(&self) -> &PortList {
        &self.ports
    }

    fn release(&mut self) {
        self.report = None;
    }

    fn render(&mut self, ctx: &mut RenderContext<'_>) {
        let samples = ctx.cv.channel(0);
        let Some(&last) = samples.last() else {
            return;
        };
        let mut report = self.report.unwrap_or(CvReport {
            last,
            min: last,
            max: last,
        });
        for &s in samples {
            report.min = report.min.min(s);
            report.max = report.max.max(s);
        }
        report.last = last;
        self.report = Some(report);
    }

    fn state(&self) -> Vec<u8> {
        serde_json::to_vec(&self.report.unwrap_or_default()).unwrap_or_default()
    }
}
