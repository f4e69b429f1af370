#![cfg_attr(not(feature = "std"), no_std)]
//! # Skein: Modular Synthesizer Audio Engine
//!
//! > *"A skein is a coil of interleaved strands—in audio, our strands are
//! > signals and the coil is the patch that binds them."*
//!
//! `skein` is the runtime half of a modular synthesizer: a stateful directed
//! graph of signal-processing nodes driven one sample at a time by an audio
//! callback. Patches are authored elsewhere (a visual editor) and arrive
//! pre-compiled as a [`CompiledUnit`](protocol::CompiledUnit): an instruction
//! stream over a flat register file plus the per-node state records the
//! instructions operate on. The engine executes that program at a fixed
//! 44.1 kHz, routes live control changes into running nodes without
//! disturbing their DSP state, and streams telemetry (scope captures,
//! sequencer positions, clock pulses) back to the host.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Engine                                 │  Sample clock + node table
//! │  - gen_sample(): one stereo frame       │  "The audio callback's view"
//! │  - handle(): control ingress            │
//! ├─────────────────────────────────────────┤
//! │  Program                                │  Compiled evaluation order
//! │  - register-machine instruction list    │  "What the editor compiled"
//! │  - validated once, run every sample     │
//! ├─────────────────────────────────────────┤
//! │  Nodes                                  │  Per-kind DSP state machines
//! │  - oscillators, ADSR, filter, delay     │  "Where the sound happens"
//! │  - sequencers, scope, MIDI input        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use skein::prelude::*;
//!
//! // A single 440 Hz sine voice on both channels.
//! let mut nodes = StdMap::new();
//! nodes.insert(
//!     0,
//!     NodeState::new("Sine")
//!         .with_param("minVal", -1.0)
//!         .with_param("maxVal", 1.0),
//! );
//!
//! let program = Program::new(
//!     3,
//!     vec![
//!         Instr::Const { value: 440.0, dst: 0 },
//!         Instr::Const { value: 0.0, dst: 1 },
//!         Instr::Update { node: 0, args: vec![0, 1], dsts: vec![2] },
//!     ],
//!     2,
//!     2,
//! );
//!
//! let mut engine = Engine::new(44_100.0, Box::new(|_event| {})).unwrap();
//! engine.new_unit(CompiledUnit { nodes, src: program });
//!
//! // Call once per output frame from the audio callback.
//! let (left, right) = engine.gen_sample();
//! # let _ = (left, right);
//! ```
//!
//! ## Module Documentation
//!
//! - [`engine`] - Evaluation driver and control-message dispatch
//! - [`program`] - The compiled instruction stream and its interpreter
//! - [`node`] - Node kinds and their per-sample update contracts
//! - [`seq`] - Sequencer family: step clock, MonoSeq, GateSeq
//! - [`dsp`] - DSP primitives: envelope, filter, delay line, waveshapers
//! - [`music`] - Note numbering, scales, clock constants
//! - [`protocol`] - Host-facing message types
//! - [`host`] - Thread-safe queues bridging the control and audio threads

extern crate alloc;

pub mod dsp;
pub mod engine;
#[cfg(feature = "std")]
pub mod host;
pub mod music;
pub mod node;
pub mod program;
pub mod protocol;
pub mod rng;
pub mod seq;

/// Ordered map used for host-facing key/value data.
pub type StdMap<K, V> = alloc::collections::BTreeMap<K, V>;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dsp::{AdsrEnv, DelayLine, TwoPoleFilter, MAX_DELAY_SECONDS};
    pub use crate::engine::{Engine, EngineError, EventSink};
    #[cfg(feature = "std")]
    pub use crate::host::MessageQueue;
    pub use crate::music::{gen_scale, note_freq, Note, CLOCK_PPQ, CLOCK_PPS, SAMPLE_RATE};
    pub use crate::node::{Node, NodeId, NodeKind};
    pub use crate::program::{Instr, Program, Reg};
    pub use crate::protocol::{CompiledUnit, ControlMsg, EngineEvent, NodeState, Pattern};
    pub use crate::seq::GateState;
    pub use crate::StdMap;
}

pub use prelude::*;
