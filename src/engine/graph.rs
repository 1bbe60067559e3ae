//! Declarative signal-graph description
//!
//! The graph compiler produces a tree of [`Node`]s per output channel; a
//! renderer turns it into running DSP. Nodes are immutable and shared through
//! `Arc`, so a rebuilt graph can be handed off without copying.

use std::sync::Arc;

use serde::Serialize;

use crate::engine::effects::BiquadCoeffs;

/// Shared handle to a node
pub type NodeRef = Arc<Node>;

/// One step of a sample sequence: `value` takes effect at `time` seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeqEvent {
    pub value: f64,
    pub time: f64,
}

impl SeqEvent {
    /// Start reading the sample from its beginning at `time`
    pub fn trigger(time: f64) -> Self {
        Self { value: 1.0, time }
    }

    /// Stop playback at `time`
    pub fn stop(time: f64) -> Self {
        Self { value: 0.0, time }
    }
}

/// Signal-graph node
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Constant signal
    Const { value: f64 },
    /// Renderer clock in seconds
    Time,
    /// Elementwise sum
    Add { inputs: Vec<NodeRef> },
    /// Elementwise product
    Mul { inputs: Vec<NodeRef> },
    /// `lhs - rhs`
    Sub { lhs: NodeRef, rhs: NodeRef },
    /// `1` when `lhs >= rhs`, else `0`
    Ge { lhs: NodeRef, rhs: NodeRef },
    /// Sample sequencer: while the latest event at or before `time` has value
    /// 1, outputs the sample at `time - event.time` into the buffer at `path`.
    /// `duration` is the full source length in seconds.
    SampleSeq {
        path: String,
        duration: f64,
        events: Vec<SeqEvent>,
        time: NodeRef,
    },
    /// One-pole smoothing of `input` with the given time constant in seconds.
    /// Renderers carry the smoothed value across rebuilds under `key`.
    Smooth {
        key: String,
        time_constant: f64,
        input: NodeRef,
    },
    /// Biquad filter; its history is carried across rebuilds under `key`
    Biquad {
        key: String,
        coeffs: BiquadCoeffs,
        input: NodeRef,
    },
    /// Level tap: reports min/max of `input` under `name`, passes it through
    Meter { name: String, input: NodeRef },
}

impl Node {
    /// True for a constant zero
    pub fn is_silence(&self) -> bool {
        matches!(self, Node::Const { value } if *value == 0.0)
    }

    /// Direct children of this node
    pub fn children(&self) -> Vec<&NodeRef> {
        match self {
            Node::Const { .. } | Node::Time => Vec::new(),
            Node::Add { inputs } | Node::Mul { inputs } => inputs.iter().collect(),
            Node::Sub { lhs, rhs } | Node::Ge { lhs, rhs } => vec![lhs, rhs],
            Node::SampleSeq { time, .. } => vec![time],
            Node::Smooth { input, .. } | Node::Biquad { input, .. } | Node::Meter { input, .. } => {
                vec![input]
            }
        }
    }

    /// Number of nodes in this tree (shared subtrees counted per use)
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .into_iter()
            .map(|child| child.node_count())
            .sum::<usize>()
    }

    /// Names of every meter tap in this tree, depth-first
    pub fn meter_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_meters(&mut names);
        names
    }

    fn collect_meters(&self, names: &mut Vec<String>) {
        if let Node::Meter { name, .. } = self {
            names.push(name.clone());
        }
        for child in self.children() {
            child.collect_meters(names);
        }
    }

    /// Keys of every stateful node (smoothers and filters) in this tree
    pub fn state_keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_state_keys(&mut keys);
        keys
    }

    fn collect_state_keys<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            Node::Smooth { key, .. } | Node::Biquad { key, .. } => keys.push(key),
            _ => {}
        }
        for child in self.children() {
            child.collect_state_keys(keys);
        }
    }

    /// Number of `Add` nodes in this tree
    pub fn add_count(&self) -> usize {
        let own = usize::from(matches!(self, Node::Add { .. }));
        own + self
            .children()
            .into_iter()
            .map(|child| child.add_count())
            .sum::<usize>()
    }
}

/// Left and right output graphs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StereoGraph {
    pub left: NodeRef,
    pub right: NodeRef,
}

impl StereoGraph {
    /// Hard silence on both channels
    pub fn silence() -> Self {
        Self {
            left: silence(),
            right: silence(),
        }
    }

    pub fn is_silence(&self) -> bool {
        self.left.is_silence() && self.right.is_silence()
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn constant(value: f64) -> NodeRef {
    Arc::new(Node::Const { value })
}

pub fn silence() -> NodeRef {
    constant(0.0)
}

pub fn time() -> NodeRef {
    Arc::new(Node::Time)
}

pub fn mul(inputs: Vec<NodeRef>) -> NodeRef {
    Arc::new(Node::Mul { inputs })
}

pub fn sub(lhs: NodeRef, rhs: NodeRef) -> NodeRef {
    Arc::new(Node::Sub { lhs, rhs })
}

pub fn ge(lhs: NodeRef, rhs: NodeRef) -> NodeRef {
    Arc::new(Node::Ge { lhs, rhs })
}

/// Sum of `signals` without building nodes that do nothing
///
/// No inputs gives silence, one input passes through, and only two or more
/// produce an `Add`.
pub fn sum(mut signals: Vec<NodeRef>) -> NodeRef {
    match signals.len() {
        0 => silence(),
        1 => signals.remove(0),
        _ => Arc::new(Node::Add { inputs: signals }),
    }
}

pub fn sample_seq(
    path: impl Into<String>,
    duration: f64,
    events: Vec<SeqEvent>,
    time: NodeRef,
) -> NodeRef {
    Arc::new(Node::SampleSeq {
        path: path.into(),
        duration,
        events,
        time,
    })
}

pub fn smooth(key: impl Into<String>, time_constant: f64, input: NodeRef) -> NodeRef {
    Arc::new(Node::Smooth {
        key: key.into(),
        time_constant,
        input,
    })
}

pub fn biquad(key: impl Into<String>, coeffs: BiquadCoeffs, input: NodeRef) -> NodeRef {
    Arc::new(Node::Biquad {
        key: key.into(),
        coeffs,
        input,
    })
}

pub fn meter(name: impl Into<String>, input: NodeRef) -> NodeRef {
    Arc::new(Node::Meter {
        name: name.into(),
        input,
    })
}
