//! Sequencer Family
//!
//! Step sequencing driven by a shared clock signal. A [`StepClock`] turns
//! raw clock samples into step firings (one step per [`CLOCK_PPS`] rising
//! edges) and handles queued pattern swaps at the pattern wrap; [`MonoSeq`]
//! plays one scale note at a time, [`GateSeq`] runs an independent gate
//! machine per row.
//!
//! Patterns themselves live in the node's state record; only the running
//! position and the gate machines live here, which is what lets a graph
//! recompile re-state a sequencer without rewinding it.

use crate::music::{gen_scale, Note, CLOCK_PPS};
use crate::node::NodeId;
use crate::protocol::{EngineEvent, NodeState, Pattern};
use alloc::vec;
use alloc::vec::Vec;

/// Gate state machine shared by everything that emits gates.
///
/// `Pretrig` is the one-sample synthetic zero-gate state: it forces
/// downstream envelopes to see a fresh rising edge even when a note is
/// already sustaining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GateState {
    #[default]
    Off,
    Pretrig,
    On,
}

/// Clock-edge step progression shared by the sequencer kinds.
///
/// `clock_cnt` counts down between step firings: a rising edge with the
/// counter at zero fires a step and refills it to [`CLOCK_PPS`], and every
/// rising edge decrements it afterwards, so steps land exactly
/// `CLOCK_PPS` edges apart.
#[derive(Debug, Clone)]
pub(crate) struct StepClock {
    clock_sgn: bool,
    clock_cnt: u32,
    next_step: usize,
    pat_idx: usize,
    next_pat: Option<usize>,
}

impl StepClock {
    fn new(cur_pattern: usize) -> Self {
        Self {
            clock_sgn: false,
            clock_cnt: 0,
            next_step: 0,
            pat_idx: cur_pattern,
            next_pat: None,
        }
    }

    /// Feed one clock sample; fires at most one step.
    ///
    /// On a step: emits `SET_CUR_STEP`, calls `trig` for every active row,
    /// and at the last step of the pattern wraps back to step zero —
    /// swapping in the queued pattern, if any, at exactly that moment.
    fn on_clock(
        &mut self,
        node_id: NodeId,
        clock: f64,
        patterns: &[Pattern],
        sink: &mut dyn FnMut(EngineEvent),
        mut trig: impl FnMut(usize),
    ) {
        let sgn = clock > 0.0;
        let rising = sgn && !self.clock_sgn;
        self.clock_sgn = sgn;
        if !rising {
            return;
        }

        if self.clock_cnt == 0 {
            let grid = &patterns[self.pat_idx];
            assert!(!grid.is_empty(), "sequencer pattern {} is empty", self.pat_idx);

            let step_idx = self.next_step % grid.len();
            self.clock_cnt = CLOCK_PPS;
            self.next_step += 1;

            sink(EngineEvent::SetCurStep { node_id, step_idx });

            for (row_idx, cell) in grid[step_idx].iter().enumerate() {
                if *cell != 0.0 {
                    trig(row_idx);
                }
            }

            if step_idx == grid.len() - 1 {
                self.next_step = 0;
                if let Some(pat_idx) = self.next_pat.take() {
                    sink(EngineEvent::SetPattern { node_id, pat_idx });
                    self.pat_idx = pat_idx;
                }
            }
        }

        self.clock_cnt -= 1;
    }

    /// Refresh from a new state record. The running position survives:
    /// a recompile is not a rewind.
    fn restate(&mut self, state: &NodeState) {
        self.pat_idx = state.cur_pattern;
        if let Some(pat_idx) = self.next_pat {
            if pat_idx >= state.patterns.len() {
                self.next_pat = None;
            }
        }
    }

    fn queue(&mut self, pat_idx: usize) {
        self.next_pat = Some(pat_idx);
    }
}

/// Monophonic scale sequencer.
///
/// Plays at most one note per step out of a scale materialized from the
/// state record's root, scale name and octave count. Output is the
/// `(freq, gate)` pair a downstream oscillator/envelope pair expects.
#[derive(Debug, Clone)]
pub struct MonoSeq {
    clock: StepClock,
    scale: Vec<Note>,
    gate: GateState,
    trig_time: f64,
    freq: f64,
}

impl MonoSeq {
    pub fn new(state: &NodeState) -> Self {
        Self {
            clock: StepClock::new(state.cur_pattern),
            scale: gen_scale(state.scale_root, &state.scale_name, state.num_octaves),
            gate: GateState::Off,
            trig_time: 0.0,
            freq: 0.0,
        }
    }

    /// One sample: advance on the clock, then run the gate machine.
    ///
    /// `gate_time` is how long a triggered note holds its gate, supplied by
    /// the caller each sample.
    pub fn update(
        &mut self,
        node_id: NodeId,
        time: f64,
        clock: f64,
        gate_time: f64,
        state: &NodeState,
        sink: &mut dyn FnMut(EngineEvent),
    ) -> (f64, f64) {
        let MonoSeq {
            clock: step_clock,
            scale,
            gate,
            trig_time,
            freq,
        } = self;

        step_clock.on_clock(node_id, clock, &state.patterns, sink, |row_idx| {
            *gate = GateState::Pretrig;
            *trig_time = time;
            *freq = scale[row_idx].freq(0.0);
        });

        assert!(!self.freq.is_nan(), "sequencer produced NaN frequency");

        match self.gate {
            GateState::Pretrig => {
                self.gate = GateState::On;
                (0.0, 0.0)
            }
            GateState::On => {
                if time - self.trig_time > gate_time {
                    self.gate = GateState::Off;
                    (self.freq, 0.0)
                } else {
                    (self.freq, 1.0)
                }
            }
            GateState::Off => (self.freq, 0.0),
        }
    }

    pub(crate) fn restate(&mut self, state: &NodeState) {
        self.clock.restate(state);
        self.scale = gen_scale(state.scale_root, &state.scale_name, state.num_octaves);
    }

    pub(crate) fn queue(&mut self, pat_idx: usize) {
        self.clock.queue(pat_idx);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RowGate {
    state: GateState,
    trig_time: f64,
}

/// Polyphonic gate sequencer.
///
/// One independent gate machine per row; each sample emits the whole gate
/// array, reversed so row 0 lands at the bottom of the output.
#[derive(Debug, Clone)]
pub struct GateSeq {
    clock: StepClock,
    rows: Vec<RowGate>,
    gates: Vec<f64>,
}

impl GateSeq {
    pub fn new(state: &NodeState) -> Self {
        Self {
            clock: StepClock::new(state.cur_pattern),
            rows: vec![RowGate::default(); state.num_rows],
            gates: vec![0.0; state.num_rows],
        }
    }

    /// One sample: advance on the clock, then every row's gate machine.
    pub fn update(
        &mut self,
        node_id: NodeId,
        time: f64,
        clock: f64,
        state: &NodeState,
        sink: &mut dyn FnMut(EngineEvent),
    ) -> &[f64] {
        let gate_time = state.param("gateTime", 0.1);
        let GateSeq {
            clock: step_clock,
            rows,
            gates,
        } = self;

        step_clock.on_clock(node_id, clock, &state.patterns, sink, |row_idx| {
            rows[row_idx].state = GateState::Pretrig;
            rows[row_idx].trig_time = time;
        });

        let num_rows = rows.len();
        for (row_idx, row) in rows.iter_mut().enumerate() {
            let gate = match row.state {
                GateState::Pretrig => {
                    row.state = GateState::On;
                    0.0
                }
                GateState::On => {
                    if time - row.trig_time > gate_time {
                        row.state = GateState::Off;
                        0.0
                    } else {
                        1.0
                    }
                }
                GateState::Off => 0.0,
            };
            gates[num_rows - 1 - row_idx] = gate;
        }

        gates
    }

    pub(crate) fn restate(&mut self, state: &NodeState) {
        self.clock.restate(state);
        self.rows.resize(state.num_rows, RowGate::default());
        self.gates.resize(state.num_rows, 0.0);
    }

    pub(crate) fn queue(&mut self, pat_idx: usize) {
        self.clock.queue(pat_idx);
    }
}
