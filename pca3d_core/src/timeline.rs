//! The "TIMELINE" Compiler - composing scenes into a time -> state function.
//!
//! Compilation has two phases:
//!
//! 1. **Compose**: a [`TimelineBuilder`] keeps an explicit stack of open
//!    segments. Pushing opens a child, popping closes it into its parent
//!    (after the parent's content, or concurrently with the most recent part).
//! 2. **Flatten**: [`TimelineBuilder::build`] walks the finished tree once and
//!    produces a list of spans, each carrying the composed map from absolute
//!    time to its local time.
//!
//! Evaluation ([`Timeline::state_at`]) is pure: every span that has started
//! is applied to a copy of the initial state in tree order, finished spans
//! at their final fraction. Rendering frames in any order or in parallel
//! therefore gives identical results.

use std::sync::Arc;
use tracing::debug;

use crate::easing::Easing;
use crate::error::{Result, VisError};
use crate::scenes::{Scene, SceneKind};
use crate::state::RenderState;

/// Unit of an exact segment duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Milliseconds,
    Seconds,
    Minutes,
}

impl TimeUnit {
    pub fn to_seconds(self, value: f64) -> f64 {
        match self {
            TimeUnit::Milliseconds => value / 1000.0,
            TimeUnit::Seconds => value,
            TimeUnit::Minutes => value * 60.0,
        }
    }
}

/// Where a closed segment goes in its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PopMode {
    /// After everything the parent already holds
    #[default]
    Sequential,
    /// Concurrently with the parent's most recent content
    Join,
}

// ============================================================================
// COMPOSITION TREE
// ============================================================================

#[derive(Debug, Clone)]
struct Entry {
    scene: Arc<dyn Scene>,
    kind: SceneKind,
}

#[derive(Debug, Clone)]
enum Node {
    /// Concurrent entries sharing unit local time
    Scenes(Vec<Entry>),
    /// Children one after another
    Sequence(Vec<Node>),
    /// Children side by side, each stretched to the longest
    Parallel(Vec<Node>),
    /// Time warp over the inner node
    Warp { easing: Easing, inner: Box<Node> },
    /// Inner node stretched to an exact duration (seconds)
    Scaled { duration: f64, inner: Box<Node> },
}

impl Node {
    fn duration(&self) -> f64 {
        match self {
            Node::Scenes(_) => 1.0,
            Node::Sequence(children) => children.iter().map(Node::duration).sum(),
            Node::Parallel(children) => children.iter().map(Node::duration).fold(0.0, f64::max),
            Node::Warp { inner, .. } => inner.duration(),
            Node::Scaled { duration, .. } => *duration,
        }
    }

    /// Adds a concurrent entry, sharing this node's time and warps.
    fn join_entry(self, entry: Entry) -> Node {
        match self {
            Node::Scenes(mut entries) => {
                entries.push(entry);
                Node::Scenes(entries)
            }
            Node::Warp { easing, inner } => Node::Warp {
                easing,
                inner: Box::new(inner.join_entry(entry)),
            },
            Node::Scaled { duration, inner } => Node::Scaled {
                duration,
                inner: Box::new(inner.join_entry(entry)),
            },
            Node::Parallel(mut children) => {
                children.push(Node::Scenes(vec![entry]));
                Node::Parallel(children)
            }
            sequence @ Node::Sequence(_) => Node::Parallel(vec![sequence, Node::Scenes(vec![entry])]),
        }
    }

    fn then(self, child: Node) -> Node {
        match self {
            Node::Sequence(mut children) => {
                children.push(child);
                Node::Sequence(children)
            }
            other => Node::Sequence(vec![other, child]),
        }
    }

    fn alongside_last(self, child: Node) -> Node {
        match self {
            Node::Sequence(mut children) => {
                let joined = match children.pop() {
                    Some(last) => last.alongside(child),
                    None => child,
                };
                children.push(joined);
                Node::Sequence(children)
            }
            other => other.alongside(child),
        }
    }

    fn alongside(self, child: Node) -> Node {
        match self {
            Node::Parallel(mut children) => {
                children.push(child);
                Node::Parallel(children)
            }
            other => Node::Parallel(vec![other, child]),
        }
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Stack-based timeline composer.
///
/// Methods chain on `&mut Self`. Misuse (popping the root, non-positive
/// durations, a join flag that contradicts the scene) is recorded and
/// reported by [`TimelineBuilder::build`].
#[derive(Debug)]
pub struct TimelineBuilder {
    stack: Vec<Node>,
    errors: Vec<String>,
}

impl TimelineBuilder {
    /// Starts a timeline whose root segment holds `scene`.
    pub fn new(scene: impl Scene + 'static) -> Self {
        Self {
            stack: vec![Node::Scenes(vec![entry(scene)])],
            errors: Vec::new(),
        }
    }

    /// Opens a child segment with `scene` as its sole entry.
    pub fn push(&mut self, scene: impl Scene + 'static) -> &mut Self {
        self.stack.push(Node::Scenes(vec![entry(scene)]));
        self
    }

    /// Adds `scene` to the current segment. `is_durative` declares whether
    /// the scene is applied over the segment or entered once.
    pub fn join(&mut self, scene: impl Scene + 'static, is_durative: bool) -> &mut Self {
        let entry = entry(scene);
        if (entry.kind == SceneKind::Durative) != is_durative {
            self.errors.push(format!(
                "join: {:?} is {:?} but was joined with is_durative = {}",
                entry.scene, entry.kind, is_durative
            ));
        }
        self.map_top(|node| node.join_entry(entry));
        self
    }

    /// Warps the current segment's local time.
    pub fn dilate(&mut self, easing: Easing) -> &mut Self {
        self.map_top(|inner| Node::Warp {
            easing,
            inner: Box::new(inner),
        });
        self
    }

    /// Fixes the current segment's duration.
    pub fn time_rescale_exact(&mut self, duration: f64, unit: TimeUnit) -> &mut Self {
        let seconds = unit.to_seconds(duration);
        if !(seconds > 0.0 && seconds.is_finite()) {
            self.errors.push(format!("time_rescale_exact: invalid duration {}", duration));
            return self;
        }
        self.map_top(|inner| Node::Scaled {
            duration: seconds,
            inner: Box::new(inner),
        });
        self
    }

    /// Speeds the current segment up by `factor`.
    pub fn time_rescale(&mut self, factor: f64) -> &mut Self {
        if !(factor > 0.0 && factor.is_finite()) {
            self.errors.push(format!("time_rescale: invalid factor {}", factor));
            return self;
        }
        self.map_top(|inner| Node::Scaled {
            duration: inner.duration() / factor,
            inner: Box::new(inner),
        });
        self
    }

    /// Closes the current segment into its parent.
    pub fn pop(&mut self, mode: PopMode) -> &mut Self {
        if self.stack.len() < 2 {
            self.errors.push("pop: cannot close the root segment".to_string());
            return self;
        }
        if let Some(child) = self.stack.pop() {
            self.map_top(|parent| match mode {
                PopMode::Sequential => parent.then(child),
                PopMode::Join => parent.alongside_last(child),
            });
        }
        self
    }

    /// Number of open segments, the root included.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Duration of the current segment in seconds.
    pub fn current_duration(&self) -> f64 {
        self.stack.last().map_or(0.0, Node::duration)
    }

    /// Validates the builder and flattens the tree into a timeline.
    pub fn build(&self) -> Result<Timeline> {
        if let Some(err) = self.errors.first() {
            return Err(VisError::timeline(err.clone()));
        }
        if self.stack.len() != 1 {
            return Err(VisError::timeline(format!(
                "unbalanced segments: {} still open",
                self.stack.len() - 1
            )));
        }

        let root = &self.stack[0];
        let mut spans = Vec::new();
        flatten(root, &mut Vec::new(), &mut spans);

        let timeline = Timeline {
            duration: root.duration(),
            spans,
        };
        debug!(
            "Built timeline: {:.3}s, {} spans",
            timeline.duration,
            timeline.spans.len()
        );
        Ok(timeline)
    }

    fn map_top(&mut self, f: impl FnOnce(Node) -> Node) {
        if let Some(top) = self.stack.pop() {
            self.stack.push(f(top));
        }
    }
}

fn entry(scene: impl Scene + 'static) -> Entry {
    let kind = scene.kind();
    Entry {
        scene: Arc::new(scene),
        kind,
    }
}

// ============================================================================
// FLATTENING
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TimeOp {
    Offset(f64),
    Scale(f64),
    Ease(Easing),
}

fn flatten(node: &Node, ops: &mut Vec<TimeOp>, spans: &mut Vec<Span>) {
    match node {
        Node::Scenes(entries) => spans.push(Span {
            ops: ops.clone(),
            entries: entries.clone(),
        }),
        Node::Sequence(children) => {
            let mut start = 0.0;
            for child in children {
                ops.push(TimeOp::Offset(start));
                flatten(child, ops, spans);
                ops.pop();
                start += child.duration();
            }
        }
        Node::Parallel(children) => {
            let longest = node.duration();
            for child in children {
                ops.push(TimeOp::Scale(longest / child.duration()));
                flatten(child, ops, spans);
                ops.pop();
            }
        }
        Node::Warp { easing, inner } => {
            let d = inner.duration();
            ops.extend([TimeOp::Scale(d), TimeOp::Ease(*easing), TimeOp::Scale(1.0 / d)]);
            flatten(inner, ops, spans);
            ops.truncate(ops.len() - 3);
        }
        Node::Scaled { duration, inner } => {
            ops.push(TimeOp::Scale(duration / inner.duration()));
            flatten(inner, ops, spans);
            ops.pop();
        }
    }
}

/// A group of concurrent entries with the map from absolute time to their
/// local time.
#[derive(Debug, Clone)]
struct Span {
    ops: Vec<TimeOp>,
    entries: Vec<Entry>,
}

impl Span {
    /// Local time at absolute time `t`. Negative before the span starts and
    /// above 1 after it ends; easing only warps the in-range part.
    fn local_time(&self, t: f64) -> f64 {
        self.ops.iter().fold(t, |x, op| match *op {
            TimeOp::Offset(start) => x - start,
            TimeOp::Scale(factor) => x / factor,
            TimeOp::Ease(easing) => {
                if (0.0..=1.0).contains(&x) {
                    easing.apply(x)
                } else {
                    x
                }
            }
        })
    }
}

// ============================================================================
// TIMELINE
// ============================================================================

/// A flattened, immutable timeline.
#[derive(Debug, Clone)]
pub struct Timeline {
    duration: f64,
    spans: Vec<Span>,
}

impl Timeline {
    /// Total duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn num_spans(&self) -> usize {
        self.spans.len()
    }

    /// Number of frames at `fps` frames per second.
    pub fn num_frames(&self, fps: u32) -> usize {
        (self.duration * fps as f64).round() as usize
    }

    /// State at absolute time `t` (seconds), starting from a copy of `initial`.
    pub fn state_at(&self, initial: &RenderState, t: f64) -> RenderState {
        let mut state = initial.clone();
        for span in &self.spans {
            let local = span.local_time(t);
            if local < 0.0 {
                continue;
            }
            let fraction = local.min(1.0);

            for e in span.entries.iter().filter(|e| e.kind == SceneKind::Instant) {
                e.scene.enter(&mut state);
            }
            for e in span.entries.iter().filter(|e| e.kind == SceneKind::Durative) {
                e.scene.apply(&mut state, fraction);
            }
        }
        state
    }
}
