//! Compiled Program
//!
//! The evaluation program the patch compiler ships inside a
//! [`CompiledUnit`](crate::protocol::CompiledUnit): a flat instruction list
//! over an f64 register file. The engine validates it once at installation
//! and then walks it every sample with no allocation and no name lookups on
//! the arithmetic path — node parameters are the only string-keyed reads,
//! and those are how live knob tweaks reach a running patch without a
//! recompile.
//!
//! Passive graph members (knobs, constants, mixers the compiler folded
//! away) never receive `Update`; they exist only as parameter stores read
//! through `Param` and as inline `Add`/`Mul`/… arithmetic.

use crate::node::{Node, NodeId, NodeOp};
use crate::protocol::EngineEvent;
use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

/// Index into the program's register file.
pub type Reg = u16;

/// Upper bound on per-instruction argument count (ADSR's six is the widest
/// real contract; the headroom keeps the gather buffer a stack array).
pub const MAX_ARGS: usize = 8;

/// One program instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Instr {
    /// Load an immediate.
    Const { value: f64, dst: Reg },

    /// Load the current play position in seconds.
    Time { dst: Reg },

    /// Live read of a named node parameter.
    Param {
        node: NodeId,
        name: String,
        dst: Reg,
    },

    Copy { src: Reg, dst: Reg },

    Add { a: Reg, b: Reg, dst: Reg },
    Sub { a: Reg, b: Reg, dst: Reg },
    Mul { a: Reg, b: Reg, dst: Reg },
    Div { a: Reg, b: Reg, dst: Reg },

    /// Invoke a node's update entry point. Argument and destination counts
    /// are fixed per node kind and checked at installation.
    Update {
        node: NodeId,
        args: Vec<Reg>,
        dsts: Vec<Reg>,
    },

    /// Writer half of a split node (Delay, Hold).
    Write { node: NodeId, args: Vec<Reg> },

    /// Reader half of a split node (Delay, Hold).
    Read { node: NodeId, dst: Reg },
}

/// A validated, executable program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    regs: u16,
    instrs: Vec<Instr>,
    left: Reg,
    right: Reg,
}

impl Program {
    /// Assemble a program from raw parts. `left` and `right` name the
    /// registers holding the stereo pair after the last instruction.
    pub fn new(regs: u16, instrs: Vec<Instr>, left: Reg, right: Reg) -> Self {
        Self {
            regs,
            instrs,
            left,
            right,
        }
    }

    /// Size of the register file this program needs.
    pub fn reg_count(&self) -> usize {
        self.regs as usize
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Check the program against the node table it will run over.
    ///
    /// Register bounds, node references, and per-kind arities are all
    /// installation-time protocol errors; catching them here keeps the
    /// per-sample loop free of checks that can only fail if the compiler
    /// is broken.
    pub(crate) fn validate(&self, nodes: &[Option<Node>]) {
        let reg_ok = |r: Reg| {
            assert!(
                r < self.regs,
                "program register {} out of range (file size {})",
                r,
                self.regs
            );
        };

        reg_ok(self.left);
        reg_ok(self.right);

        for instr in &self.instrs {
            match instr {
                Instr::Const { dst, .. } | Instr::Time { dst } => reg_ok(*dst),
                Instr::Param { node, dst, .. } => {
                    node_at(nodes, *node);
                    reg_ok(*dst);
                }
                Instr::Copy { src, dst } => {
                    reg_ok(*src);
                    reg_ok(*dst);
                }
                Instr::Add { a, b, dst }
                | Instr::Sub { a, b, dst }
                | Instr::Mul { a, b, dst }
                | Instr::Div { a, b, dst } => {
                    reg_ok(*a);
                    reg_ok(*b);
                    reg_ok(*dst);
                }
                Instr::Update { node, args, dsts } => {
                    assert!(
                        args.len() <= MAX_ARGS,
                        "update of node {} carries {} args (max {})",
                        node,
                        args.len(),
                        MAX_ARGS
                    );
                    args.iter().chain(dsts.iter()).copied().for_each(reg_ok);
                    node_at(nodes, *node).validate_op(NodeOp::Update, args.len(), dsts.len());
                }
                Instr::Write { node, args } => {
                    assert!(args.len() <= MAX_ARGS, "write of node {} too wide", node);
                    args.iter().copied().for_each(reg_ok);
                    node_at(nodes, *node).validate_op(NodeOp::Write, args.len(), 0);
                }
                Instr::Read { node, dst } => {
                    reg_ok(*dst);
                    node_at(nodes, *node).validate_op(NodeOp::Read, 0, 1);
                }
            }
        }
    }

    /// Execute one sample tick and return the stereo pair.
    pub(crate) fn run(
        &self,
        time: f64,
        nodes: &mut [Option<Node>],
        regs: &mut [f64],
        sink: &mut dyn FnMut(EngineEvent),
    ) -> (f64, f64) {
        for instr in &self.instrs {
            match instr {
                Instr::Const { value, dst } => regs[*dst as usize] = *value,
                Instr::Time { dst } => regs[*dst as usize] = time,
                Instr::Param { node, name, dst } => {
                    regs[*dst as usize] = node_mut(nodes, *node).state().param(name, 0.0);
                }
                Instr::Copy { src, dst } => regs[*dst as usize] = regs[*src as usize],
                Instr::Add { a, b, dst } => {
                    regs[*dst as usize] = regs[*a as usize] + regs[*b as usize]
                }
                Instr::Sub { a, b, dst } => {
                    regs[*dst as usize] = regs[*a as usize] - regs[*b as usize]
                }
                Instr::Mul { a, b, dst } => {
                    regs[*dst as usize] = regs[*a as usize] * regs[*b as usize]
                }
                Instr::Div { a, b, dst } => {
                    regs[*dst as usize] = regs[*a as usize] / regs[*b as usize]
                }
                Instr::Update { node, args, dsts } => {
                    let mut argv = [0.0; MAX_ARGS];
                    for (slot, reg) in argv.iter_mut().zip(args.iter()) {
                        *slot = regs[*reg as usize];
                    }
                    node_mut(nodes, *node).eval(NodeOp::Update, &argv[..args.len()], dsts, regs, sink);
                }
                Instr::Write { node, args } => {
                    let mut argv = [0.0; MAX_ARGS];
                    for (slot, reg) in argv.iter_mut().zip(args.iter()) {
                        *slot = regs[*reg as usize];
                    }
                    node_mut(nodes, *node).eval(NodeOp::Write, &argv[..args.len()], &[], regs, sink);
                }
                Instr::Read { node, dst } => {
                    node_mut(nodes, *node).eval(NodeOp::Read, &[], core::slice::from_ref(dst), regs, sink);
                }
            }
        }

        (regs[self.left as usize], regs[self.right as usize])
    }
}

fn node_at(nodes: &[Option<Node>], id: NodeId) -> &Node {
    nodes
        .get(id as usize)
        .and_then(Option::as_ref)
        .unwrap_or_else(|| panic!("program references unknown node {}", id))
}

fn node_mut(nodes: &mut [Option<Node>], id: NodeId) -> &mut Node {
    nodes
        .get_mut(id as usize)
        .and_then(Option::as_mut)
        .unwrap_or_else(|| panic!("program references unknown node {}", id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn no_sink() -> impl FnMut(EngineEvent) {
        |_| {}
    }

    #[test]
    fn test_arithmetic_instructions() {
        let program = Program::new(
            4,
            vec![
                Instr::Const { value: 6.0, dst: 0 },
                Instr::Const { value: 2.0, dst: 1 },
                Instr::Mul { a: 0, b: 1, dst: 2 },
                Instr::Sub { a: 2, b: 1, dst: 3 },
            ],
            2,
            3,
        );
        let mut regs = vec![0.0; program.reg_count()];
        let mut sink = no_sink();
        let (left, right) = program.run(0.0, &mut [], &mut regs, &mut sink);
        assert_eq!(left, 12.0);
        assert_eq!(right, 10.0);
    }

    #[test]
    fn test_time_and_copy() {
        let program = Program::new(
            2,
            vec![Instr::Time { dst: 0 }, Instr::Copy { src: 0, dst: 1 }],
            0,
            1,
        );
        let mut regs = vec![0.0; 2];
        let mut sink = no_sink();
        let (left, right) = program.run(0.5, &mut [], &mut regs, &mut sink);
        assert_eq!(left, 0.5);
        assert_eq!(right, 0.5);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_validate_rejects_bad_register() {
        let program = Program::new(1, vec![Instr::Const { value: 0.0, dst: 3 }], 0, 0);
        program.validate(&[]);
    }

    #[test]
    #[should_panic(expected = "unknown node")]
    fn test_validate_rejects_missing_node() {
        let program = Program::new(
            1,
            vec![Instr::Update {
                node: 9,
                args: vec![],
                dsts: vec![0],
            }],
            0,
            0,
        );
        program.validate(&[]);
    }

    #[test]
    fn test_instruction_serde_round_trip() {
        let program = Program::new(
            3,
            vec![
                Instr::Param {
                    node: 0,
                    name: String::from("value"),
                    dst: 0,
                },
                Instr::Update {
                    node: 1,
                    args: vec![0],
                    dsts: vec![1],
                },
            ],
            1,
            1,
        );
        let json = serde_json::to_string(&program).unwrap();
        assert!(json.contains("\"op\":\"param\""));
        let back: Program = serde_json::from_str(&json).unwrap();
        assert_eq!(back, program);
    }
}
