//! Host-Facing Protocol
//!
//! The message types crossing the engine boundary in both directions, plus
//! the data records they carry. Inbound messages mutate live nodes between
//! samples; outbound events are fire-and-forget telemetry.
//!
//! Wire encoding is JSON with SCREAMING_SNAKE_CASE tags and camelCase
//! fields, which is what the patch editor speaks. Rust-side names stay
//! snake_case through serde renames.

use crate::node::NodeId;
use crate::program::Program;
use crate::StdMap;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// A sequencer pattern: a grid of cells, outer index = step, inner = row.
/// Cell value 0 is silent; anything else triggers the row.
pub type Pattern = Vec<Vec<f64>>;

/// Per-node state record produced by the patch compiler.
///
/// The runtime does not interpret `params` beyond the keys each node kind
/// reads in its update; unrecognized keys ride along untouched. Kind-specific
/// extensions (patterns, scale, scope sizing) all have serde defaults so
/// simple nodes serialize compactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    /// Node kind identifier. Unknown identifiers degrade to a passive node.
    #[serde(rename = "type")]
    pub kind: String,

    /// Named runtime parameters, read fresh every sample.
    #[serde(default)]
    pub params: StdMap<String, f64>,

    /// Sequencers: the pattern bank, indexed by pattern index.
    #[serde(default)]
    pub patterns: Vec<Pattern>,

    /// Sequencers: index of the current pattern.
    #[serde(default)]
    pub cur_pattern: usize,

    /// MonoSeq: root MIDI note of the materialized scale.
    #[serde(default = "default_scale_root")]
    pub scale_root: u32,

    /// MonoSeq: scale name, one of the tables in [`crate::music`].
    #[serde(default = "default_scale_name")]
    pub scale_name: String,

    /// MonoSeq: how many octaves to materialize.
    #[serde(default = "default_num_octaves")]
    pub num_octaves: u32,

    /// GateSeq: number of rows in the gate grid.
    #[serde(default = "default_num_rows")]
    pub num_rows: usize,

    /// Scope: samples per capture buffer.
    #[serde(default = "default_send_size")]
    pub send_size: usize,

    /// Scope: capture buffers emitted per second, in Hz.
    #[serde(default = "default_send_rate")]
    pub send_rate: f64,
}

fn default_scale_root() -> u32 {
    48
}

fn default_scale_name() -> String {
    String::from("major")
}

fn default_num_octaves() -> u32 {
    1
}

fn default_num_rows() -> usize {
    4
}

fn default_send_size() -> usize {
    441
}

fn default_send_rate() -> f64 {
    20.0
}

impl NodeState {
    /// Create a state record for the given kind with everything defaulted.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: StdMap::new(),
            patterns: Vec::new(),
            cur_pattern: 0,
            scale_root: default_scale_root(),
            scale_name: default_scale_name(),
            num_octaves: default_num_octaves(),
            num_rows: default_num_rows(),
            send_size: default_send_size(),
            send_rate: default_send_rate(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn with_patterns(mut self, patterns: Vec<Pattern>) -> Self {
        self.patterns = patterns;
        self
    }

    /// Read a parameter, falling back to `default` when absent.
    pub fn param(&self, name: &str, default: f64) -> f64 {
        self.params.get(name).copied().unwrap_or(default)
    }
}

/// A compiled evaluation unit: the node state table plus the program that
/// drives it. The engine never reparses or optimizes `src`; it only keys
/// node instances by id and runs the program once per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub nodes: StdMap<NodeId, NodeState>,
    pub src: Program,
}

/// Control messages from the host into the engine.
///
/// Tags unknown to this enum fail at deserialization, which is the loud
/// failure the protocol demands: an unrecognized message means the editor
/// and engine disagree about the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMsg {
    /// Install a freshly compiled unit, re-stating surviving nodes in place.
    NewUnit { unit: CompiledUnit },

    /// Tweak one named parameter on a live node.
    #[serde(rename_all = "camelCase")]
    SetParam {
        node_id: NodeId,
        param_name: String,
        value: f64,
    },

    /// Replace a node's whole state record (DSP state survives).
    #[serde(rename_all = "camelCase")]
    SetState { node_id: NodeId, state: NodeState },

    /// Edit one sequencer cell in place.
    #[serde(rename_all = "camelCase")]
    SetCell {
        node_id: NodeId,
        pat_idx: usize,
        step_idx: usize,
        row_idx: usize,
        value: f64,
    },

    /// Replace a pattern's contents and arm it to take over at the next
    /// pattern wrap.
    #[serde(rename_all = "camelCase")]
    QueuePattern {
        node_id: NodeId,
        pat_idx: usize,
        pat_data: Pattern,
    },

    /// Decoded MIDI note event for a MidiIn node. Velocity 0 is note-off.
    #[serde(rename_all = "camelCase")]
    NoteOn {
        node_id: NodeId,
        note_no: u8,
        velocity: u8,
    },
}

/// Asynchronous feedback from the engine to the host.
///
/// Fire-and-forget: the engine never awaits a response, and the sink is
/// allowed to drop events it cannot accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineEvent {
    /// A ClockOut node saw a rising edge.
    #[serde(rename_all = "camelCase")]
    ClockPulse { node_id: NodeId, time: f64 },

    /// A Scope node filled its capture buffer.
    #[serde(rename_all = "camelCase")]
    SendSamples { node_id: NodeId, samples: Vec<f64> },

    /// A sequencer advanced to a new step.
    #[serde(rename_all = "camelCase")]
    SetCurStep { node_id: NodeId, step_idx: usize },

    /// A sequencer swapped to its queued pattern at the wrap.
    #[serde(rename_all = "camelCase")]
    SetPattern { node_id: NodeId, pat_idx: usize },
}

#[cfg(feature = "alloc")]
impl ControlMsg {
    /// Parse a JSON control message.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize to the wire encoding.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(feature = "alloc")]
impl EngineEvent {
    /// Serialize to the wire encoding.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_set_param_wire_shape() {
        let msg = ControlMsg::SetParam {
            node_id: 3,
            param_name: String::from("minVal"),
            value: -1.0,
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"type\":\"SET_PARAM\""));
        assert!(json.contains("\"nodeId\":3"));
        assert!(json.contains("\"paramName\":\"minVal\""));
        assert_eq!(ControlMsg::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_note_on_round_trip() {
        let msg = ControlMsg::NoteOn {
            node_id: 1,
            note_no: 60,
            velocity: 100,
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("NOTE_ON"));
        assert_eq!(ControlMsg::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn test_unknown_tag_fails_loudly() {
        let result = ControlMsg::from_json(r#"{"type":"REWIND","nodeId":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_node_state_defaults_from_sparse_json() {
        let state: NodeState = serde_json::from_str(r#"{"type":"Sine"}"#).unwrap();
        assert_eq!(state.kind, "Sine");
        assert!(state.params.is_empty());
        assert!(state.patterns.is_empty());
        assert_eq!(state.scale_name, "major");
        assert_eq!(state.send_size, 441);
    }

    #[test]
    fn test_queue_pattern_wire_shape() {
        let msg = ControlMsg::QueuePattern {
            node_id: 7,
            pat_idx: 1,
            pat_data: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        };
        let json = msg.to_json().unwrap();
        assert!(json.contains("QUEUE_PATTERN"));
        assert!(json.contains("\"patIdx\":1"));
        assert!(json.contains("\"patData\""));
    }

    #[test]
    fn test_event_tags() {
        let ev = EngineEvent::SetCurStep {
            node_id: 2,
            step_idx: 5,
        };
        let json = ev.to_json().unwrap();
        assert!(json.contains("SET_CUR_STEP"));
        assert!(json.contains("\"stepIdx\":5"));

        let ev = EngineEvent::ClockPulse {
            node_id: 4,
            time: 0.25,
        };
        assert!(ev.to_json().unwrap().contains("CLOCK_PULSE"));
    }
}
