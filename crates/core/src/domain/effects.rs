//! Effect catalogue and descriptors
//!
//! Every effect kind the rig can host, its parameters with their slider
//! bounds, and the factory turning a parameter set into a DSP processor.

use crate::domain::audio::{AudioError, Result};
use crate::domain::dsp::{
    params, Compressor, Distortion, Effect, Equalizer, FeedbackDelay, Phaser, PitchShift, Reverb,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// EFFECT TYPES
// ============================================================================

/// Effect kinds available in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectType {
    Delay,
    Reverb,
    Distortion,
    Eq,
    PitchShifter,
    Compressor,
    Phaser,
    Flanger,
    Fuzz,
    Overdrive,
}

impl EffectType {
    pub const ALL: [EffectType; 10] = [
        EffectType::Delay,
        EffectType::Reverb,
        EffectType::Distortion,
        EffectType::Eq,
        EffectType::PitchShifter,
        EffectType::Compressor,
        EffectType::Phaser,
        EffectType::Flanger,
        EffectType::Fuzz,
        EffectType::Overdrive,
    ];

    /// Wire name, also the prefix of generated effect ids
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectType::Delay => "delay",
            EffectType::Reverb => "reverb",
            EffectType::Distortion => "distortion",
            EffectType::Eq => "eq",
            EffectType::PitchShifter => "pitchShifter",
            EffectType::Compressor => "compressor",
            EffectType::Phaser => "phaser",
            EffectType::Flanger => "flanger",
            EffectType::Fuzz => "fuzz",
            EffectType::Overdrive => "overdrive",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            EffectType::Delay => "Delay",
            EffectType::Reverb => "Reverb",
            EffectType::Distortion => "Distortion",
            EffectType::Eq => "EQ",
            EffectType::PitchShifter => "Pitch Shifter",
            EffectType::Compressor => "Compressor",
            EffectType::Phaser => "Phaser",
            EffectType::Flanger => "Flanger",
            EffectType::Fuzz => "Fuzz",
            EffectType::Overdrive => "Overdrive",
        }
    }

    /// Parameters at their factory defaults, in panel order
    pub fn default_parameters(&self) -> Vec<Parameter> {
        use Parameter as P;

        let wet = |value| P::slider("wet", "Mix", 0.0, 1.0, 0.01, value);
        match self {
            EffectType::Delay => vec![
                P::slider("delayTime", "Time", params::DELAY_MIN, params::DELAY_MAX, 0.01, 0.25),
                P::slider("feedback", "Feedback", 0.0, params::FEEDBACK_MAX, 0.01, 0.5),
                wet(1.0),
            ],
            EffectType::Reverb => vec![
                P::slider("decay", "Decay", params::DECAY_MIN, params::DECAY_MAX, 0.1, 3.0),
                wet(0.5),
            ],
            EffectType::Distortion => vec![
                P::slider("distortion", "Drive", 0.0, 1.0, 0.01, 0.8),
                wet(1.0),
            ],
            EffectType::Eq => vec![
                P::slider("low", "Low", params::EQ_GAIN_MIN, params::EQ_GAIN_MAX, 0.5, 0.0),
                P::slider("mid", "Mid", params::EQ_GAIN_MIN, params::EQ_GAIN_MAX, 0.5, 0.0),
                P::slider("high", "High", params::EQ_GAIN_MIN, params::EQ_GAIN_MAX, 0.5, 0.0),
            ],
            EffectType::PitchShifter => vec![
                P::slider("pitch", "Pitch", params::PITCH_MIN, params::PITCH_MAX, 1.0, 0.0),
                P::slider("windowSize", "Window", params::WINDOW_MIN, params::WINDOW_MAX, 0.01, 0.1),
                wet(1.0),
            ],
            EffectType::Compressor => vec![
                P::slider("threshold", "Threshold", params::THRESHOLD_MIN, params::THRESHOLD_MAX, 1.0, -24.0),
                P::slider("ratio", "Ratio", params::RATIO_MIN, params::RATIO_MAX, 0.5, 12.0),
                P::slider("attack", "Attack", params::ATTACK_MIN, params::ATTACK_MAX, 0.001, 0.003),
                P::slider("release", "Release", params::RELEASE_MIN, params::RELEASE_MAX, 0.01, 0.25),
            ],
            EffectType::Phaser => vec![
                P::slider("frequency", "Rate", params::LFO_MIN, params::LFO_MAX, 0.1, 0.5),
                P::slider("octaves", "Octaves", params::OCTAVES_MIN, params::OCTAVES_MAX, 1.0, 3.0),
                P::slider("baseFrequency", "Base", params::BASE_FREQ_MIN, params::BASE_FREQ_MAX, 10.0, 350.0),
                wet(1.0),
            ],
            EffectType::Flanger => vec![
                P::slider("delayTime", "Time", params::FLANGER_DELAY_MIN, params::FLANGER_DELAY_MAX, 0.001, 0.005),
                P::slider("feedback", "Feedback", 0.0, params::FEEDBACK_MAX, 0.01, 0.5),
                wet(1.0),
            ],
            EffectType::Fuzz => vec![
                P::slider("distortion", "Fuzz", 0.0, 10.0, 0.1, 2.0),
                wet(1.0),
            ],
            EffectType::Overdrive => vec![
                P::slider("distortion", "Drive", 0.0, 2.0, 0.01, 0.4),
                wet(1.0),
            ],
        }
    }

    /// Construct the processor for this kind from a parameter set.
    ///
    /// Missing parameters fall back to the catalogue defaults.
    pub fn build(&self, sample_rate: u32, parameters: &[Parameter]) -> Box<dyn Effect> {
        let defaults = self.default_parameters();
        let value = |id: &str| -> f32 {
            parameters
                .iter()
                .chain(defaults.iter())
                .find(|p| p.id == id)
                .and_then(|p| p.value.as_f32())
                .unwrap_or(0.0)
        };

        match self {
            EffectType::Delay => Box::new(FeedbackDelay::echo(
                sample_rate,
                value("delayTime"),
                value("feedback"),
                value("wet"),
            )),
            EffectType::Flanger => Box::new(FeedbackDelay::flanger(
                sample_rate,
                value("delayTime"),
                value("feedback"),
                value("wet"),
            )),
            EffectType::Reverb => Box::new(Reverb::new(sample_rate, value("decay"), value("wet"))),
            EffectType::Distortion => Box::new(Distortion::new(
                "Distortion",
                value("distortion"),
                1.0,
                value("wet"),
            )),
            EffectType::Fuzz => Box::new(Distortion::new("Fuzz", value("distortion"), 10.0, value("wet"))),
            EffectType::Overdrive => Box::new(Distortion::new(
                "Overdrive",
                value("distortion"),
                2.0,
                value("wet"),
            )),
            EffectType::Eq => Box::new(Equalizer::new(
                sample_rate,
                value("low"),
                value("mid"),
                value("high"),
            )),
            EffectType::PitchShifter => Box::new(PitchShift::new(
                sample_rate,
                value("pitch"),
                value("windowSize"),
                value("wet"),
            )),
            EffectType::Compressor => {
                let mut compressor = Compressor::new(sample_rate);
                compressor.set_threshold(value("threshold"));
                compressor.set_ratio(value("ratio"));
                compressor.set_attack(value("attack"));
                compressor.set_release(value("release"));
                Box::new(compressor)
            }
            EffectType::Phaser => Box::new(Phaser::new(
                sample_rate,
                value("frequency"),
                value("octaves"),
                value("baseFrequency"),
                value("wet"),
            )),
        }
    }
}

impl FromStr for EffectType {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        EffectType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AudioError::UnsupportedEffectType(s.to_string()))
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// Control kind of a parameter, with its bounds or options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ParamKind {
    Slider { min: f64, max: f64, step: f64 },
    Toggle,
    Select { options: Vec<String> },
}

/// A parameter value as set from the UI or a preset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view used by the DSP layer (toggles map to 0/1)
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            ParamValue::Number(v) => Some(*v as f32),
            ParamValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ParamValue::Text(_) => None,
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Number(v) => write!(f, "{}", v),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

/// Widen a DSP bound to f64 keeping its shortest decimal form (0.99, not 0.9900000095)
fn widen(value: f32) -> f64 {
    value.to_string().parse().unwrap_or(value as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub id: String,
    pub display_name: String,
    #[serde(flatten)]
    pub kind: ParamKind,
    pub value: ParamValue,
}

impl Parameter {
    pub fn slider(id: &str, display_name: &str, min: f32, max: f32, step: f64, value: f64) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind: ParamKind::Slider {
                min: widen(min),
                max: widen(max),
                step,
            },
            value: ParamValue::Number(value),
        }
    }

    pub fn toggle(id: &str, display_name: &str, value: bool) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind: ParamKind::Toggle,
            value: ParamValue::Bool(value),
        }
    }

    pub fn select(id: &str, display_name: &str, options: &[&str], value: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            kind: ParamKind::Select {
                options: options.iter().map(|o| o.to_string()).collect(),
            },
            value: ParamValue::Text(value.to_string()),
        }
    }

    /// Normalize `value` against this parameter's kind.
    ///
    /// Sliders clamp and snap to their step, toggles take booleans and
    /// selects take listed options. Anything else yields `None`.
    pub fn coerce(&self, value: &ParamValue) -> Option<ParamValue> {
        match (&self.kind, value) {
            (ParamKind::Slider { min, max, step }, ParamValue::Number(v)) if v.is_finite() => {
                let clamped = v.clamp(*min, *max);
                let snapped = if *step > 0.0 {
                    (min + ((clamped - min) / step).round() * step).clamp(*min, *max)
                } else {
                    clamped
                };
                Some(ParamValue::Number(snapped))
            }
            (ParamKind::Toggle, ParamValue::Bool(b)) => Some(ParamValue::Bool(*b)),
            (ParamKind::Select { options }, ParamValue::Text(choice))
                if options.iter().any(|o| o == choice) =>
            {
                Some(ParamValue::Text(choice.clone()))
            }
            _ => None,
        }
    }

    /// Store a coerced value, returning it when accepted
    pub fn assign(&mut self, value: &ParamValue) -> Option<ParamValue> {
        let accepted = self.coerce(value)?;
        self.value = accepted.clone();
        Some(accepted)
    }
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

/// Identifier of an effect instance, `"<type>_<counter>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(String);

impl EffectId {
    pub fn new(effect_type: EffectType, counter: u64) -> Self {
        Self(format!("{}_{}", effect_type.as_str(), counter))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EffectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// UI-facing state of one effect in the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectDescriptor {
    pub id: EffectId,
    #[serde(rename = "type")]
    pub effect_type: EffectType,
    pub display_name: String,
    pub is_panel_open: bool,
    pub parameters: Vec<Parameter>,
}

impl EffectDescriptor {
    pub fn new(id: EffectId, effect_type: EffectType) -> Self {
        Self {
            id,
            effect_type,
            display_name: effect_type.display_name().to_string(),
            is_panel_open: true,
            parameters: effect_type
                .default_parameters()
                .into_iter()
                .map(|mut param| {
                    // Keep stored values on the slider grid
                    if let Some(value) = param.coerce(&param.value) {
                        param.value = value;
                    }
                    param
                })
                .collect(),
        }
    }

    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    pub fn parameter_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }
}
