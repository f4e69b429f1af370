//! Engine Tick Benchmarks
//!
//! The engine must produce one stereo frame every 1/44100 s ≈ 22.7 µs, with
//! headroom left for the host's own mixing and I/O. These benchmarks time
//! `gen_sample` over representative compiled units in 64-frame blocks, the
//! smallest buffer size a host is likely to run.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use skein::prelude::*;

const BLOCK: usize = 64;

/// One sine voice: the smallest useful unit.
fn sine_engine() -> Engine {
    let mut nodes = StdMap::new();
    nodes.insert(
        0,
        NodeState::new("Sine")
            .with_param("minVal", -1.0)
            .with_param("maxVal", 1.0),
    );
    let program = Program::new(
        3,
        vec![
            Instr::Const { value: 440.0, dst: 0 },
            Instr::Const { value: 0.0, dst: 1 },
            Instr::Update {
                node: 0,
                args: vec![0, 1],
                dsts: vec![2],
            },
        ],
        2,
        2,
    );

    let mut engine = Engine::new(SAMPLE_RATE, Box::new(|_| {})).unwrap();
    engine.new_unit(CompiledUnit { nodes, src: program });
    engine
}

/// A small subtractive voice: clock-driven sequencer, ADSR, saw through the
/// filter, delay on top. Touches every hot code path at once.
fn voice_engine() -> Engine {
    let mut nodes = StdMap::new();
    nodes.insert(0, NodeState::new("Clock").with_param("value", 120.0));
    nodes.insert(
        1,
        NodeState::new("MonoSeq").with_patterns(vec![vec![
            vec![1.0],
            vec![0.0],
            vec![1.0],
            vec![1.0],
        ]]),
    );
    nodes.insert(2, NodeState::new("ADSR"));
    nodes.insert(
        3,
        NodeState::new("Saw")
            .with_param("minVal", -1.0)
            .with_param("maxVal", 1.0),
    );
    nodes.insert(4, NodeState::new("Filter"));
    nodes.insert(5, NodeState::new("Delay"));

    let program = Program::new(
        16,
        vec![
            Instr::Time { dst: 0 },
            // Clock -> sequencer.
            Instr::Update {
                node: 0,
                args: vec![],
                dsts: vec![1],
            },
            Instr::Const { value: 0.1, dst: 2 },
            Instr::Update {
                node: 1,
                args: vec![0, 1, 2],
                dsts: vec![3, 4],
            },
            // Envelope over the sequencer gate.
            Instr::Const { value: 0.01, dst: 5 },
            Instr::Const { value: 0.05, dst: 6 },
            Instr::Const { value: 0.6, dst: 7 },
            Instr::Const { value: 0.1, dst: 8 },
            Instr::Update {
                node: 2,
                args: vec![0, 4, 5, 6, 7, 8],
                dsts: vec![9],
            },
            // Saw at the sequenced pitch, filtered, enveloped.
            Instr::Update {
                node: 3,
                args: vec![3],
                dsts: vec![10],
            },
            Instr::Const { value: 0.4, dst: 11 },
            Instr::Const { value: 0.2, dst: 12 },
            Instr::Update {
                node: 4,
                args: vec![10, 11, 12],
                dsts: vec![13],
            },
            Instr::Mul {
                a: 13,
                b: 9,
                dst: 14,
            },
            // Short delay as a second tap.
            Instr::Const {
                value: 0.25,
                dst: 15,
            },
            Instr::Write {
                node: 5,
                args: vec![14, 15],
            },
            Instr::Read { node: 5, dst: 15 },
        ],
        14,
        15,
    );

    let mut engine = Engine::new(SAMPLE_RATE, Box::new(|_| {})).unwrap();
    engine.new_unit(CompiledUnit { nodes, src: program });
    engine
}

fn bench_gen_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("gen_sample");
    group.throughput(Throughput::Elements(BLOCK as u64));

    group.bench_function("sine_voice", |b| {
        let mut engine = sine_engine();
        b.iter(|| {
            for _ in 0..BLOCK {
                black_box(engine.gen_sample());
            }
        });
    });

    group.bench_function("sequenced_voice", |b| {
        let mut engine = voice_engine();
        b.iter(|| {
            for _ in 0..BLOCK {
                black_box(engine.gen_sample());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_gen_sample);
criterion_main!(benches);
