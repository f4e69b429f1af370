//! Node Instances
//!
//! One stateful instance per graph node, keyed by the compiler-assigned
//! dense id. Each kind wraps its DSP state and exposes the update contract
//! the compiled program invokes with positional arguments; state that must
//! survive reconfiguration (phase accumulators, filter integrators, delay
//! buffers, sequencer positions) lives here and is never rebuilt when a new
//! unit re-states an existing node.
//!
//! Kinds are a closed tagged sum rather than trait objects: the per-sample
//! dispatch is one match on the tag, state sits inline, and the hot loop
//! stays branch-predictable.

use crate::dsp::{self, AdsrEnv, DelayLine, TwoPoleFilter};
use crate::music::{note_freq, CLOCK_PPQ};
use crate::program::Reg;
use crate::protocol::{EngineEvent, NodeState, Pattern};
use crate::rng::Rng;
use crate::seq;
use crate::seq::GateState;
use alloc::string::String;
use alloc::vec::Vec;
use core::f64::consts::TAU;
use core::mem;
use libm::Libm;

/// Dense node identifier assigned by the patch compiler.
pub type NodeId = u32;

/// Which entry point of a node an instruction invokes.
///
/// Most kinds only have `Update`; Delay and Hold split into a writer and a
/// reader so the compiler can place them as separate graph members sharing
/// one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOp {
    Update,
    Write,
    Read,
}

/// The closed set of node kinds.
///
/// Wire identifiers outside this set degrade to [`NodeKind::Passive`]: a
/// node that holds state (so `Param` reads and live tweaks still work) but
/// has no update semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Adsr,
    Clock,
    ClockDiv,
    ClockOut,
    Delay,
    Distort,
    Filter,
    Fold,
    GateSeq,
    Hold,
    MidiIn,
    MonoSeq,
    Noise,
    Pulse,
    Saw,
    Scope,
    Sine,
    Slide,
    Tri,
    Passive,
}

impl NodeKind {
    /// Map a wire identifier to a kind.
    pub fn from_name(name: &str) -> Self {
        match name {
            "ADSR" => NodeKind::Adsr,
            "Clock" => NodeKind::Clock,
            "ClockDiv" => NodeKind::ClockDiv,
            "ClockOut" => NodeKind::ClockOut,
            "Delay" => NodeKind::Delay,
            "Distort" => NodeKind::Distort,
            "Filter" => NodeKind::Filter,
            "Fold" => NodeKind::Fold,
            "GateSeq" => NodeKind::GateSeq,
            "Hold" => NodeKind::Hold,
            "MidiIn" => NodeKind::MidiIn,
            "MonoSeq" => NodeKind::MonoSeq,
            "Noise" => NodeKind::Noise,
            "Pulse" => NodeKind::Pulse,
            "Saw" => NodeKind::Saw,
            "Scope" => NodeKind::Scope,
            "Sine" => NodeKind::Sine,
            "Slide" => NodeKind::Slide,
            "Tri" => NodeKind::Tri,
            _ => NodeKind::Passive,
        }
    }
}

/// Scope capture state: a decimating sampler feeding a fixed-size buffer.
#[derive(Debug)]
struct ScopeState {
    buffer: Vec<f64>,
    send_size: usize,
    sample_interv: u32,
    countdown: u32,
}

impl ScopeState {
    fn new(sample_rate: f64, state: &NodeState) -> Self {
        let (send_size, sample_interv) = Self::derive(sample_rate, state);
        Self {
            buffer: Vec::with_capacity(send_size),
            send_size,
            sample_interv,
            countdown: 0,
        }
    }

    fn derive(sample_rate: f64, state: &NodeState) -> (usize, u32) {
        let interv = sample_rate / (state.send_size as f64 * state.send_rate);
        assert!(
            interv.is_finite() && interv >= 1.0 && interv == Libm::<f64>::floor(interv),
            "scope send size {} x send rate {} does not divide the sample rate",
            state.send_size,
            state.send_rate
        );
        (state.send_size, interv as u32)
    }

    fn reconfigure(&mut self, sample_rate: f64, state: &NodeState) {
        let (send_size, sample_interv) = Self::derive(sample_rate, state);
        self.send_size = send_size;
        self.sample_interv = sample_interv;
        self.buffer.truncate(send_size.saturating_sub(1));
        self.countdown = self.countdown.min(sample_interv);
    }

    fn update(&mut self, input: f64, node_id: NodeId, sink: &mut dyn FnMut(EngineEvent)) {
        if self.countdown == 0 {
            self.buffer.push(input);
            if self.buffer.len() >= self.send_size {
                let samples = mem::replace(&mut self.buffer, Vec::with_capacity(self.send_size));
                sink(EngineEvent::SendSamples { node_id, samples });
            }
            self.countdown = self.sample_interv;
        }
        self.countdown -= 1;
    }
}

/// Kind-specific runtime state.
#[derive(Debug)]
enum Dsp {
    Sine { phase: f64, sync_sgn: bool },
    Saw { phase: f64 },
    Tri { phase: f64 },
    Pulse { phase: f64 },
    Noise { rng: Rng },
    Clock { phase: f64 },
    ClockDiv { in_sgn: bool, out_sgn: bool, cnt: u32 },
    ClockOut { in_sgn: bool },
    Adsr { env: AdsrEnv },
    Distort,
    Fold,
    Filter { filter: TwoPoleFilter },
    Slide { value: f64 },
    Hold { value: f64, trig_sgn: bool },
    Delay { line: DelayLine },
    Scope { scope: ScopeState },
    MidiIn { note_no: u8, freq: f64, gate: GateState },
    MonoSeq(seq::MonoSeq),
    GateSeq(seq::GateSeq),
    Passive,
}

/// A live graph node: its state record plus kind-specific runtime state.
///
/// The state record is the single home of parameters and patterns; updates
/// read it fresh every sample, so a `SET_PARAM` landing between two samples
/// is audible on the next one.
pub struct Node {
    id: NodeId,
    kind: NodeKind,
    state: NodeState,
    sample_rate: f64,
    dsp: Dsp,
}

impl Node {
    /// Instantiate a node from its compiled state record.
    pub fn new(id: NodeId, state: NodeState, sample_rate: f64) -> Self {
        let kind = NodeKind::from_name(&state.kind);
        let dsp = match kind {
            NodeKind::Sine => Dsp::Sine {
                phase: 0.0,
                sync_sgn: false,
            },
            NodeKind::Saw => Dsp::Saw { phase: 0.0 },
            NodeKind::Tri => Dsp::Tri { phase: 0.0 },
            NodeKind::Pulse => Dsp::Pulse { phase: 0.0 },
            NodeKind::Noise => Dsp::Noise { rng: noise_rng(id) },
            NodeKind::Clock => Dsp::Clock { phase: 0.0 },
            // Starts high, mirroring Clock, so chained dividers settle the
            // same way on the very first sample.
            NodeKind::ClockDiv => Dsp::ClockDiv {
                in_sgn: false,
                out_sgn: true,
                cnt: 0,
            },
            NodeKind::ClockOut => Dsp::ClockOut { in_sgn: false },
            NodeKind::Adsr => Dsp::Adsr {
                env: AdsrEnv::new(),
            },
            NodeKind::Distort => Dsp::Distort,
            NodeKind::Fold => Dsp::Fold,
            NodeKind::Filter => Dsp::Filter {
                filter: TwoPoleFilter::new(),
            },
            NodeKind::Slide => Dsp::Slide { value: 0.0 },
            NodeKind::Hold => Dsp::Hold {
                value: 0.0,
                trig_sgn: false,
            },
            NodeKind::Delay => Dsp::Delay {
                line: DelayLine::new(sample_rate),
            },
            NodeKind::Scope => Dsp::Scope {
                scope: ScopeState::new(sample_rate, &state),
            },
            NodeKind::MidiIn => Dsp::MidiIn {
                note_no: 0,
                freq: 0.0,
                gate: GateState::Off,
            },
            NodeKind::MonoSeq => Dsp::MonoSeq(seq::MonoSeq::new(&state)),
            NodeKind::GateSeq => Dsp::GateSeq(seq::GateSeq::new(&state)),
            NodeKind::Passive => Dsp::Passive,
        };

        Self {
            id,
            kind,
            state,
            sample_rate,
            dsp,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Replace the node's state record, keeping its DSP state.
    ///
    /// A node keeps its identity across recompiles; the compiler may only
    /// re-state it with the same kind.
    pub fn set_state(&mut self, state: NodeState) {
        let new_kind = NodeKind::from_name(&state.kind);
        assert_eq!(
            self.kind, new_kind,
            "node {} changed kind from {:?} to {:?}",
            self.id, self.kind, new_kind
        );

        match &mut self.dsp {
            Dsp::MonoSeq(seq) => seq.restate(&state),
            Dsp::GateSeq(seq) => seq.restate(&state),
            Dsp::Scope { scope } => scope.reconfigure(self.sample_rate, &state),
            _ => {}
        }

        self.state = state;
    }

    /// Tweak one named parameter. The parameter must already exist.
    pub fn set_param(&mut self, name: &str, value: f64) {
        assert!(
            self.state.params.contains_key(name),
            "node {} has no parameter {:?}",
            self.id,
            name
        );
        self.state.params.insert(String::from(name), value);
    }

    /// Edit one sequencer cell in place. MonoSeq keeps at most one active
    /// row per step, so a non-zero write clears the rest of the step first.
    pub fn set_cell(&mut self, pat_idx: usize, step_idx: usize, row_idx: usize, value: f64) {
        assert!(
            matches!(self.kind, NodeKind::MonoSeq | NodeKind::GateSeq),
            "node {} is not a sequencer",
            self.id
        );

        let grid = &mut self.state.patterns[pat_idx];
        if self.kind == NodeKind::MonoSeq && value != 0.0 {
            for cell in grid[step_idx].iter_mut() {
                *cell = 0.0;
            }
        }
        grid[step_idx][row_idx] = value;
    }

    /// Replace a pattern's contents and arm it to take over at the next
    /// pattern wrap. An index one past the end appends.
    pub fn queue_pattern(&mut self, pat_idx: usize, data: Pattern) {
        assert!(
            pat_idx <= self.state.patterns.len(),
            "node {} has no pattern slot {}",
            self.id,
            pat_idx
        );

        match &mut self.dsp {
            Dsp::MonoSeq(seq) => seq.queue(pat_idx),
            Dsp::GateSeq(seq) => seq.queue(pat_idx),
            _ => panic!("node {} is not a sequencer", self.id),
        }

        if pat_idx == self.state.patterns.len() {
            self.state.patterns.push(data);
        } else {
            self.state.patterns[pat_idx] = data;
        }
    }

    /// Decoded MIDI note event. Velocity 0 releases the matching note.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        match &mut self.dsp {
            Dsp::MidiIn {
                note_no,
                freq,
                gate,
            } => {
                if velocity > 0 {
                    *note_no = note;
                    *freq = note_freq(note as u32, 0.0);
                    *gate = GateState::Pretrig;
                } else if note == *note_no {
                    *gate = GateState::Off;
                }
            }
            _ => panic!("node {} is not a MIDI input", self.id),
        }
    }

    /// Installation-time arity check for one program instruction.
    pub(crate) fn validate_op(&self, op: NodeOp, n_args: usize, n_dsts: usize) {
        use NodeKind::*;

        let (exp_args, exp_dsts) = match (self.kind, op) {
            (Sine, NodeOp::Update) => (2, 1),
            (Saw, NodeOp::Update) => (1, 1),
            (Tri, NodeOp::Update) => (1, 1),
            (Pulse, NodeOp::Update) => (2, 1),
            (Noise, NodeOp::Update) => (0, 1),
            (Clock, NodeOp::Update) => (0, 1),
            (ClockDiv, NodeOp::Update) => (1, 1),
            (ClockOut, NodeOp::Update) => (2, 0),
            (Adsr, NodeOp::Update) => (6, 1),
            (Distort, NodeOp::Update) => (2, 1),
            (Fold, NodeOp::Update) => (2, 1),
            (Filter, NodeOp::Update) => (3, 1),
            (Slide, NodeOp::Update) => (2, 1),
            (Scope, NodeOp::Update) => (1, 0),
            (MidiIn, NodeOp::Update) => (0, 2),
            (MonoSeq, NodeOp::Update) => (3, 2),
            (GateSeq, NodeOp::Update) => (2, self.state.num_rows),
            (Hold, NodeOp::Write) => (2, 0),
            (Hold, NodeOp::Read) => (0, 1),
            (Delay, NodeOp::Write) => (2, 0),
            (Delay, NodeOp::Read) => (0, 1),
            (kind, op) => panic!("node {} ({:?}) does not support {:?}", self.id, kind, op),
        };

        assert_eq!(
            n_args, exp_args,
            "node {} {:?} expects {} args, got {}",
            self.id, op, exp_args, n_args
        );
        assert_eq!(
            n_dsts, exp_dsts,
            "node {} {:?} expects {} outputs, got {}",
            self.id, op, exp_dsts, n_dsts
        );
    }

    /// One per-sample invocation from the compiled program.
    ///
    /// `args` are the gathered input registers; outputs land directly in
    /// `regs` at the positions named by `dsts`. Arities were checked at
    /// installation.
    pub fn eval(
        &mut self,
        op: NodeOp,
        args: &[f64],
        dsts: &[Reg],
        regs: &mut [f64],
        sink: &mut dyn FnMut(EngineEvent),
    ) {
        let sample_time = 1.0 / self.sample_rate;
        let id = self.id;
        let state = &self.state;

        match (&mut self.dsp, op) {
            (Dsp::Sine { phase, sync_sgn }, NodeOp::Update) => {
                let (freq, sync) = (args[0], args[1]);
                // Pre-increment: a sync reset is audible this very sample.
                if sync > 0.0 && !*sync_sgn {
                    *phase = 0.0;
                }
                *sync_sgn = sync > 0.0;

                let cycle_pos = *phase;
                *phase = wrap01(*phase + sample_time * freq);

                let normal = 0.5 + 0.5 * Libm::<f64>::sin(cycle_pos * TAU);
                set1(regs, dsts, scaled(state, normal));
            }

            (Dsp::Saw { phase }, NodeOp::Update) => {
                *phase = wrap01(*phase + sample_time * args[0]);
                set1(regs, dsts, scaled(state, *phase));
            }

            (Dsp::Tri { phase }, NodeOp::Update) => {
                *phase = wrap01(*phase + sample_time * args[0]);
                let normal = if *phase < 0.5 {
                    2.0 * *phase
                } else {
                    2.0 - 2.0 * *phase
                };
                set1(regs, dsts, scaled(state, normal));
            }

            (Dsp::Pulse { phase }, NodeOp::Update) => {
                let (freq, duty) = (args[0], args[1]);
                *phase = wrap01(*phase + sample_time * freq);
                let normal = if *phase < duty { 1.0 } else { 0.0 };
                set1(regs, dsts, scaled(state, normal));
            }

            (Dsp::Noise { rng }, NodeOp::Update) => {
                set1(regs, dsts, scaled(state, rng.next_f64()));
            }

            (Dsp::Clock { phase }, NodeOp::Update) => {
                let bpm = state.param("value", 120.0);
                let freq = bpm * CLOCK_PPQ as f64 / 60.0;
                *phase = wrap01(*phase + sample_time * freq);
                // Starts high: downstream edge detectors fire at t = 0.
                set1(regs, dsts, if *phase < 0.5 { 1.0 } else { -1.0 });
            }

            (
                Dsp::ClockDiv {
                    in_sgn,
                    out_sgn,
                    cnt,
                },
                NodeOp::Update,
            ) => {
                let factor = state.param("factor", 2.0).max(1.0) as u32;
                let sgn = args[0] > 0.0;
                // Both edge directions count toward the division.
                if sgn != *in_sgn {
                    *in_sgn = sgn;
                    *cnt += 1;
                    if *cnt >= factor {
                        *cnt = 0;
                        *out_sgn = !*out_sgn;
                    }
                }
                set1(regs, dsts, if *out_sgn { 1.0 } else { -1.0 });
            }

            (Dsp::ClockOut { in_sgn }, NodeOp::Update) => {
                let (pulse_time, clock) = (args[0], args[1]);
                let sgn = clock > 0.0;
                if sgn && !*in_sgn {
                    sink(EngineEvent::ClockPulse {
                        node_id: id,
                        time: pulse_time,
                    });
                }
                *in_sgn = sgn;
            }

            (Dsp::Adsr { env }, NodeOp::Update) => {
                let value = env.eval(args[0], args[1], args[2], args[3], args[4], args[5]);
                set1(regs, dsts, value);
            }

            (Dsp::Distort, NodeOp::Update) => {
                set1(regs, dsts, dsp::distort(args[0], args[1]));
            }

            (Dsp::Fold, NodeOp::Update) => {
                set1(regs, dsts, dsp::fold(args[0], args[1]));
            }

            (Dsp::Filter { filter }, NodeOp::Update) => {
                set1(regs, dsts, filter.apply(args[0], args[1], args[2]));
            }

            (Dsp::Slide { value }, NodeOp::Update) => {
                let (input, rate) = (args[0], args[1]);
                *value += (1.0 / (rate * 1000.0).max(1.0)) * (input - *value);
                set1(regs, dsts, *value);
            }

            (Dsp::Hold { value, trig_sgn }, NodeOp::Write) => {
                let (input, trig) = (args[0], args[1]);
                if trig > 0.0 && !*trig_sgn {
                    *value = input;
                }
                *trig_sgn = trig > 0.0;
            }

            (Dsp::Hold { value, .. }, NodeOp::Read) => {
                set1(regs, dsts, *value);
            }

            (Dsp::Delay { line }, NodeOp::Write) => {
                line.write(args[0], args[1]);
            }

            (Dsp::Delay { line }, NodeOp::Read) => {
                set1(regs, dsts, line.read());
            }

            (Dsp::Scope { scope }, NodeOp::Update) => {
                scope.update(args[0], id, sink);
            }

            (
                Dsp::MidiIn {
                    freq,
                    gate,
                    ..
                },
                NodeOp::Update,
            ) => match gate {
                GateState::Pretrig => {
                    // One forced zero-gate sample so downstream envelopes
                    // see a fresh rising edge even mid-note.
                    *gate = GateState::On;
                    set2(regs, dsts, 0.0, 0.0);
                }
                GateState::On => set2(regs, dsts, *freq, 1.0),
                GateState::Off => set2(regs, dsts, *freq, 0.0),
            },

            (Dsp::MonoSeq(seq), NodeOp::Update) => {
                let (pulse_time, clock, gate_time) = (args[0], args[1], args[2]);
                let (freq, gate) = seq.update(id, pulse_time, clock, gate_time, state, sink);
                set2(regs, dsts, freq, gate);
            }

            (Dsp::GateSeq(seq), NodeOp::Update) => {
                let (pulse_time, clock) = (args[0], args[1]);
                let gates = seq.update(id, pulse_time, clock, state, sink);
                assert_eq!(gates.len(), dsts.len(), "gate row count drifted");
                for (gate, dst) in gates.iter().zip(dsts.iter()) {
                    regs[*dst as usize] = *gate;
                }
            }

            (dsp, op) => panic!("node {} ({:?}) does not support {:?}", id, kind_of(dsp), op),
        }
    }
}

fn kind_of(dsp: &Dsp) -> &'static str {
    match dsp {
        Dsp::Sine { .. } => "Sine",
        Dsp::Saw { .. } => "Saw",
        Dsp::Tri { .. } => "Tri",
        Dsp::Pulse { .. } => "Pulse",
        Dsp::Noise { .. } => "Noise",
        Dsp::Clock { .. } => "Clock",
        Dsp::ClockDiv { .. } => "ClockDiv",
        Dsp::ClockOut { .. } => "ClockOut",
        Dsp::Adsr { .. } => "ADSR",
        Dsp::Distort => "Distort",
        Dsp::Fold => "Fold",
        Dsp::Filter { .. } => "Filter",
        Dsp::Slide { .. } => "Slide",
        Dsp::Hold { .. } => "Hold",
        Dsp::Delay { .. } => "Delay",
        Dsp::Scope { .. } => "Scope",
        Dsp::MidiIn { .. } => "MidiIn",
        Dsp::MonoSeq(_) => "MonoSeq",
        Dsp::GateSeq(_) => "GateSeq",
        Dsp::Passive => "Passive",
    }
}

fn noise_rng(id: NodeId) -> Rng {
    #[cfg(feature = "std")]
    {
        let _ = id;
        Rng::from_entropy()
    }
    #[cfg(not(feature = "std"))]
    {
        Rng::from_seed(0x736b65696e_u64 ^ (id as u64))
    }
}

#[inline]
fn wrap01(x: f64) -> f64 {
    x - Libm::<f64>::floor(x)
}

/// Map a normalized [0, 1] value into the node's `minVal`..`maxVal` range.
#[inline]
fn scaled(state: &NodeState, normal: f64) -> f64 {
    let min = state.param("minVal", -1.0);
    let max = state.param("maxVal", 1.0);
    min + normal * (max - min)
}

#[inline]
fn set1(regs: &mut [f64], dsts: &[Reg], value: f64) {
    regs[dsts[0] as usize] = value;
}

#[inline]
fn set2(regs: &mut [f64], dsts: &[Reg], a: f64, b: f64) {
    regs[dsts[0] as usize] = a;
    regs[dsts[1] as usize] = b;
}
