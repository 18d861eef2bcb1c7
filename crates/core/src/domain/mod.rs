//! Domain entities and business rules

pub mod audio;
pub mod chain;
pub mod config;
pub mod context;
pub mod devices;
pub mod dsp;
pub mod effects;
pub mod graph;
pub mod metronome;
pub mod nodes;
pub mod pitch;
pub mod preset;
pub mod source;
pub mod tuner;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{AudioDevice, AudioEnumerator, AudioError, DeviceId, DeviceKind, StreamConfig};
pub use chain::{ChainStage, SignalChainManager};
pub use config::{
    AppConfig, AudioDeviceConfig, ConfigError, ConfigManager, PlectrumConfig, PresetManager,
};
pub use context::{AudioContext, ContextHandle, ContextState};
pub use devices::AudioDeviceRegistry;
pub use dsp::Effect;
pub use effects::{EffectDescriptor, EffectId, EffectType, ParamKind, ParamValue, Parameter};
pub use graph::{AudioGraph, AudioNode, Link, NodeId, ProcessContext};
pub use metronome::{AudioClock, ClickEvent, ClickSink, MetronomeConfig, MetronomeScheduler};
pub use nodes::AnalysisTap;
pub use pitch::{PitchClass, PitchDetector, TuningState};
pub use preset::{EffectSnapshot, ParamSnapshot, Preset};
pub use source::{
    ClipSource, InputConstraints, InputProvider, InputRequest, InputSource, StaticInputProvider,
    ToneSource,
};
pub use tuner::{TunerConfig, TunerSession};
