//! Evaluation Driver
//!
//! The [`Engine`] owns everything the audio callback touches: the play
//! position, the node table, the installed program and its register file,
//! and the outbound event sink. One call to [`Engine::gen_sample`] is one
//! output frame; control messages are applied between samples via
//! [`Engine::handle`].
//!
//! The engine is deliberately single-threaded: whoever owns it must
//! serialize `handle` against `gen_sample` (see [`crate::host`] for the
//! bundled queue pair that does exactly that).

use crate::music::SAMPLE_RATE;
use crate::node::{Node, NodeId};
use crate::protocol::{CompiledUnit, ControlMsg, EngineEvent};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

/// Outbound event callback. Invoked from inside the sample loop, so it
/// must never block; dropping an event is acceptable, waiting is not.
pub type EventSink = Box<dyn FnMut(EngineEvent) + Send>;

/// Construction errors.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The engine only runs at 44.1 kHz.
    UnsupportedSampleRate(f64),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnsupportedSampleRate(rate) => {
                write!(
                    f,
                    "unsupported sample rate {} Hz (engine runs at {} Hz)",
                    rate, SAMPLE_RATE
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EngineError {}

/// The audio graph runtime.
pub struct Engine {
    sample_rate: f64,
    play_pos: f64,
    nodes: Vec<Option<Node>>,
    program: Option<crate::program::Program>,
    regs: Vec<f64>,
    sink: EventSink,
}

impl Engine {
    /// Create an engine. Only 44 100 Hz is accepted.
    pub fn new(sample_rate: f64, sink: EventSink) -> Result<Self, EngineError> {
        if sample_rate != SAMPLE_RATE {
            return Err(EngineError::UnsupportedSampleRate(sample_rate));
        }
        Ok(Self {
            sample_rate,
            play_pos: 0.0,
            nodes: Vec::new(),
            program: None,
            regs: Vec::new(),
            sink,
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Current play position in seconds.
    pub fn play_pos(&self) -> f64 {
        self.play_pos
    }

    /// Generate one stereo frame.
    ///
    /// With no program installed this is silence and the play position does
    /// not advance. Output is not clamped; the program contract keeps it in
    /// [-1, 1].
    pub fn gen_sample(&mut self) -> (f64, f64) {
        let program = match &self.program {
            Some(program) => program,
            None => return (0.0, 0.0),
        };

        self.play_pos += 1.0 / self.sample_rate;
        program.run(
            self.play_pos,
            &mut self.nodes,
            &mut self.regs,
            &mut *self.sink,
        )
    }

    /// Install a freshly compiled unit.
    ///
    /// Existing nodes are re-stated in place (their DSP state survives;
    /// a kind change is a protocol violation). New ids are instantiated.
    /// Nodes absent from the new unit are retained untouched — the editor
    /// may reconnect them later, and their buffers must still be warm.
    pub fn new_unit(&mut self, unit: CompiledUnit) {
        for (id, state) in unit.nodes {
            let idx = id as usize;
            if idx >= self.nodes.len() {
                self.nodes.resize_with(idx + 1, || None);
            }
            match &mut self.nodes[idx] {
                Some(node) => node.set_state(state),
                slot => *slot = Some(Node::new(id, state, self.sample_rate)),
            }
        }

        let program = unit.src;
        program.validate(&self.nodes);
        self.regs.clear();
        self.regs.resize(program.reg_count(), 0.0);
        self.program = Some(program);
    }

    /// Apply one control message. Call between samples, never during one.
    pub fn handle(&mut self, msg: ControlMsg) {
        match msg {
            ControlMsg::NewUnit { unit } => self.new_unit(unit),
            ControlMsg::SetParam {
                node_id,
                param_name,
                value,
            } => self.node_mut(node_id).set_param(&param_name, value),
            ControlMsg::SetState { node_id, state } => self.node_mut(node_id).set_state(state),
            ControlMsg::SetCell {
                node_id,
                pat_idx,
                step_idx,
                row_idx,
                value,
            } => self
                .node_mut(node_id)
                .set_cell(pat_idx, step_idx, row_idx, value),
            ControlMsg::QueuePattern {
                node_id,
                pat_idx,
                pat_data,
            } => self.node_mut(node_id).queue_pattern(pat_idx, pat_data),
            ControlMsg::NoteOn {
                node_id,
                note_no,
                velocity,
            } => self.node_mut(node_id).note_on(note_no, velocity),
        }
    }

    /// Look up a live node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id as usize).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes
            .get_mut(id as usize)
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("message addressed unknown node {}", id))
    }
}
