//! Leveled, tree-structured diagnostic traces.
//!
//! Every request carries a trace; the server appends its own entries and the
//! combined tree travels back in the response. A trace is created with an
//! immutable level cap: entries above the cap are discarded at the call site,
//! which keeps tracing cheap on the hot path. [`Trace::should_trace`] exposes
//! the cap check separately so callers can skip building expensive trace
//! arguments entirely.
//!
//! # Wire format
//!
//! A trace serializes as `{"level": C, "root": node}` where each node is
//! `{"timestamp": millis, "payload": value, "children": [node, ...]}` with
//! `payload` and `children` omitted when absent or empty. Byte-array payloads
//! are rendered as `0x`-prefixed lowercase hex strings. A payload of an
//! unknown wire type (an object or array) degrades to a childless node with
//! no payload rather than failing the whole parse.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::clock::{ClockSource, SystemClock};

/// Scalar or byte-array payload attached to a trace node.
#[derive(Debug, Clone, PartialEq)]
pub enum TracePayload {
    /// An explicitly null payload, distinct from no payload at all.
    Null,
    /// Free-form text.
    Text(String),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Boolean.
    Bool(bool),
    /// Raw bytes, rendered on the wire as `0x`-prefixed hex.
    Bytes(Vec<u8>),
}

impl From<&str> for TracePayload {
    fn from(text: &str) -> Self {
        TracePayload::Text(text.to_string())
    }
}

impl From<String> for TracePayload {
    fn from(text: String) -> Self {
        TracePayload::Text(text)
    }
}

/// Errors raised when a serialized trace cannot be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    /// A required field was absent.
    #[error("trace is missing field '{0}'")]
    MissingField(&'static str),
    /// A field was present with an unusable value.
    #[error("trace field '{0}' has an invalid value")]
    InvalidField(&'static str),
}

/// One node in a trace tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TraceNode {
    /// Clock reading when the node was recorded.
    pub timestamp: u64,
    /// Optional payload.
    pub payload: Option<TracePayload>,
    /// Ordered child nodes.
    pub children: Vec<TraceNode>,
}

impl TraceNode {
    /// Creates a childless node.
    #[must_use]
    pub fn new(timestamp: u64, payload: Option<TracePayload>) -> Self {
        Self {
            timestamp,
            payload,
            children: Vec::new(),
        }
    }

    /// Appends a child node.
    pub fn add_child(&mut self, child: TraceNode) {
        self.children.push(child);
    }

    /// Number of nodes in this subtree, excluding `self`.
    #[must_use]
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }

    /// Structural equality: equal timestamps and the same multiset of
    /// children at each level, matched by timestamp, recursively. Child order
    /// and payloads are ignored, which lets tests compare trees assembled in
    /// different orders.
    #[must_use]
    pub fn structural_eq(&self, other: &TraceNode) -> bool {
        if self.timestamp != other.timestamp || self.children.len() != other.children.len() {
            return false;
        }
        let mut used = vec![false; other.children.len()];
        for child in &self.children {
            let Some(slot) = other
                .children
                .iter()
                .enumerate()
                .position(|(i, candidate)| !used[i] && child.structural_eq(candidate))
            else {
                return false;
            };
            used[slot] = true;
        }
        true
    }

    fn to_wire(&self) -> Value {
        let mut node = Map::new();
        node.insert("timestamp".to_string(), json!(self.timestamp));
        if let Some(payload) = &self.payload {
            node.insert("payload".to_string(), payload_to_wire(payload));
        }
        if !self.children.is_empty() {
            node.insert(
                "children".to_string(),
                Value::Array(self.children.iter().map(TraceNode::to_wire).collect()),
            );
        }
        Value::Object(node)
    }

    fn from_wire(value: &Value) -> Result<TraceNode, TraceError> {
        let Value::Object(fields) = value else {
            return Err(TraceError::InvalidField("node"));
        };
        let timestamp = fields
            .get("timestamp")
            .ok_or(TraceError::MissingField("timestamp"))?
            .as_u64()
            .ok_or(TraceError::InvalidField("timestamp"))?;

        let payload = match fields.get("payload") {
            None => None,
            Some(wire) => match payload_from_wire(wire) {
                Some(payload) => Some(payload),
                // Unknown payload type: degrade to a childless, payload-less
                // node instead of failing the parse.
                None => return Ok(TraceNode::new(timestamp, None)),
            },
        };

        let mut node = TraceNode::new(timestamp, payload);
        match fields.get("children") {
            None => {}
            Some(Value::Array(children)) => {
                for child in children {
                    node.add_child(TraceNode::from_wire(child)?);
                }
            }
            Some(_) => return Err(TraceError::InvalidField("children")),
        }
        Ok(node)
    }
}

fn payload_to_wire(payload: &TracePayload) -> Value {
    match payload {
        TracePayload::Null => Value::Null,
        TracePayload::Text(s) => json!(s),
        TracePayload::Int(i) => json!(i),
        TracePayload::Float(f) => json!(f),
        TracePayload::Bool(b) => json!(b),
        TracePayload::Bytes(bytes) => json!(format!("0x{}", hex::encode(bytes))),
    }
}

/// Maps a wire value back to a payload. `None` marks an unknown type.
fn payload_from_wire(value: &Value) -> Option<TracePayload> {
    match value {
        Value::Null => Some(TracePayload::Null),
        Value::Bool(b) => Some(TracePayload::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(TracePayload::Int(i)),
            None => n.as_f64().map(TracePayload::Float),
        },
        Value::String(s) => Some(payload_from_text(s)),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Strings of the form `0x` followed by one or more hex digit pairs decode
/// back to bytes; anything else stays text.
fn payload_from_text(text: &str) -> TracePayload {
    if let Some(body) = text.strip_prefix("0x") {
        if !body.is_empty() && body.len() % 2 == 0 {
            if let Ok(bytes) = hex::decode(body) {
                return TracePayload::Bytes(bytes);
            }
        }
    }
    TracePayload::Text(text.to_string())
}

/// A trace tree with an immutable level cap.
#[derive(Clone)]
pub struct Trace {
    level_cap: u32,
    root: TraceNode,
    clock: Arc<dyn ClockSource>,
}

impl Trace {
    /// Creates an empty trace recording entries at levels `<= level_cap`,
    /// stamped by the system clock.
    #[must_use]
    pub fn new(level_cap: u32) -> Self {
        Self::with_clock(level_cap, Arc::new(SystemClock))
    }

    /// Creates an empty trace with an injected clock.
    #[must_use]
    pub fn with_clock(level_cap: u32, clock: Arc<dyn ClockSource>) -> Self {
        let root = TraceNode::new(clock.now(), None);
        Self {
            level_cap,
            root,
            clock,
        }
    }

    /// The immutable level cap set at creation.
    #[must_use]
    pub fn level_cap(&self) -> u32 {
        self.level_cap
    }

    /// Cheap pre-check for whether an entry at `level` would be recorded.
    #[must_use]
    pub fn should_trace(&self, level: u32) -> bool {
        level <= self.level_cap
    }

    /// Appends a payload node under the root iff `level` is within the cap.
    /// Returns whether the entry was recorded.
    pub fn trace(&mut self, level: u32, payload: impl Into<TracePayload>) -> bool {
        if !self.should_trace(level) {
            return false;
        }
        let node = TraceNode::new(self.clock.now(), Some(payload.into()));
        self.root.add_child(node);
        true
    }

    /// The root node. The root itself carries no payload; recorded entries
    /// are its descendants.
    #[must_use]
    pub fn root(&self) -> &TraceNode {
        &self.root
    }

    /// Mutable access to the root, for assembling nested subtrees.
    pub fn root_mut(&mut self) -> &mut TraceNode {
        &mut self.root
    }

    /// Number of recorded nodes, excluding the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.root.descendant_count()
    }

    /// True when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Serializes the full tree to its wire value.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        json!({
            "level": self.level_cap,
            "root": self.root.to_wire(),
        })
    }

    /// Reads a trace back from its wire value. The restored trace stamps any
    /// further entries with the system clock.
    ///
    /// # Errors
    ///
    /// Fails when the level or a node is missing or malformed.
    pub fn from_wire(value: &Value) -> Result<Trace, TraceError> {
        let level_cap = value
            .get("level")
            .ok_or(TraceError::MissingField("level"))?
            .as_u64()
            .and_then(|level| u32::try_from(level).ok())
            .ok_or(TraceError::InvalidField("level"))?;
        let root = value
            .get("root")
            .map(TraceNode::from_wire)
            .transpose()?
            .unwrap_or_default();
        Ok(Trace {
            level_cap,
            root,
            clock: Arc::new(SystemClock),
        })
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("level_cap", &self.level_cap)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn render(node: &TraceNode, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for child in &node.children {
                write!(f, "{:indent$}[{}] ", "", child.timestamp, indent = depth * 2)?;
                match &child.payload {
                    None => writeln!(f, "-")?,
                    Some(TracePayload::Null) => writeln!(f, "null")?,
                    Some(TracePayload::Text(s)) => writeln!(f, "{s}")?,
                    Some(TracePayload::Int(i)) => writeln!(f, "{i}")?,
                    Some(TracePayload::Float(x)) => writeln!(f, "{x}")?,
                    Some(TracePayload::Bool(b)) => writeln!(f, "{b}")?,
                    Some(TracePayload::Bytes(bytes)) => writeln!(f, "0x{}", hex::encode(bytes))?,
                }
                render(child, depth + 1, f)?;
            }
            Ok(())
        }
        render(&self.root, 0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manual_trace(level_cap: u32) -> (Trace, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1000));
        (Trace::with_clock(level_cap, clock.clone()), clock)
    }

    // ---- level gating ----

    #[test]
    fn should_trace_iff_level_within_cap() {
        let (trace, _clock) = manual_trace(3);
        assert!(trace.should_trace(0));
        assert!(trace.should_trace(3));
        assert!(!trace.should_trace(4));
    }

    #[test]
    fn entries_above_cap_are_dropped() {
        let (mut trace, clock) = manual_trace(3);
        assert!(trace.trace(3, "kept"));
        clock.advance(1);
        assert!(!trace.trace(4, "dropped"));

        assert_eq!(trace.node_count(), 1);
        let rendered = trace.to_string();
        assert!(rendered.contains("kept"));
        assert!(!rendered.contains("dropped"));

        let wire = serde_json::to_string(&trace.to_wire()).unwrap();
        assert!(!wire.contains("dropped"));
    }

    // ---- wire round-trip ----

    #[test]
    fn round_trip_preserves_structure_and_payloads() {
        let (mut trace, clock) = manual_trace(9);
        trace.trace(1, "hello");
        clock.advance(1);
        trace.trace(2, TracePayload::Int(-7));
        clock.advance(1);
        trace.trace(2, TracePayload::Float(2.5));
        clock.advance(1);
        trace.trace(3, TracePayload::Bool(true));
        clock.advance(1);
        trace.trace(3, TracePayload::Null);
        clock.advance(1);
        trace.trace(3, TracePayload::Bytes(vec![0xde, 0xad, 0x00]));

        let mut nested = TraceNode::new(clock.now() + 1, Some(TracePayload::Text("child".into())));
        nested.add_child(TraceNode::new(clock.now() + 2, None));
        trace.root_mut().add_child(nested);

        let wire = trace.to_wire();
        let restored = Trace::from_wire(&wire).unwrap();

        assert_eq!(restored.level_cap(), 9);
        assert_eq!(restored.node_count(), trace.node_count());
        assert_eq!(restored.root(), trace.root());
        assert!(restored.root().structural_eq(trace.root()));
    }

    #[test]
    fn byte_payloads_render_as_hex() {
        let (mut trace, _clock) = manual_trace(1);
        trace.trace(1, TracePayload::Bytes(vec![0xab, 0x01]));
        let wire = trace.to_wire();
        assert_eq!(wire["root"]["children"][0]["payload"], "0xab01");
    }

    #[test]
    fn null_payload_differs_from_no_payload() {
        let with_null = TraceNode::new(1, Some(TracePayload::Null));
        let without = TraceNode::new(1, None);

        let wire_null = with_null.to_wire();
        let wire_none = without.to_wire();
        assert!(wire_null.get("payload").is_some());
        assert!(wire_none.get("payload").is_none());

        assert_eq!(TraceNode::from_wire(&wire_null).unwrap(), with_null);
        assert_eq!(TraceNode::from_wire(&wire_none).unwrap(), without);
    }

    #[test]
    fn unknown_payload_type_degrades_to_bare_node() {
        let wire = serde_json::json!({
            "timestamp": 42,
            "payload": {"unexpected": "object"},
            "children": [{"timestamp": 43}],
        });
        let node = TraceNode::from_wire(&wire).unwrap();
        assert_eq!(node.timestamp, 42);
        assert!(node.payload.is_none());
        assert!(node.children.is_empty());
    }

    #[test]
    fn malformed_nodes_are_errors() {
        assert_eq!(
            TraceNode::from_wire(&serde_json::json!({"payload": "x"})),
            Err(TraceError::MissingField("timestamp"))
        );
        assert_eq!(
            TraceNode::from_wire(&serde_json::json!({"timestamp": -1})),
            Err(TraceError::InvalidField("timestamp"))
        );
        assert_eq!(
            TraceNode::from_wire(&serde_json::json!({"timestamp": 1, "children": 3})),
            Err(TraceError::InvalidField("children"))
        );
        assert_eq!(
            Trace::from_wire(&serde_json::json!({"root": {"timestamp": 1}})).unwrap_err(),
            TraceError::MissingField("level")
        );
    }

    #[test]
    fn hex_text_that_is_not_hex_stays_text() {
        assert_eq!(
            payload_from_text("0xzz"),
            TracePayload::Text("0xzz".to_string())
        );
        assert_eq!(
            payload_from_text("0xabc"),
            TracePayload::Text("0xabc".to_string())
        );
        assert_eq!(payload_from_text("0x"), TracePayload::Text("0x".to_string()));
        assert_eq!(payload_from_text("0xab"), TracePayload::Bytes(vec![0xab]));
    }

    // ---- structural equality ----

    #[test]
    fn structural_eq_ignores_child_order() {
        let mut left = TraceNode::new(1, None);
        left.add_child(TraceNode::new(2, Some(TracePayload::Text("a".into()))));
        left.add_child(TraceNode::new(3, None));

        let mut right = TraceNode::new(1, None);
        right.add_child(TraceNode::new(3, None));
        right.add_child(TraceNode::new(2, None));

        assert!(left.structural_eq(&right));
        assert_ne!(left, right);
    }

    #[test]
    fn structural_eq_detects_shape_differences() {
        let mut left = TraceNode::new(1, None);
        left.add_child(TraceNode::new(2, None));

        let mut right = TraceNode::new(1, None);
        right.add_child(TraceNode::new(9, None));
        assert!(!left.structural_eq(&right));

        let mut deeper = TraceNode::new(1, None);
        let mut child = TraceNode::new(2, None);
        child.add_child(TraceNode::new(5, None));
        deeper.add_child(child);
        assert!(!left.structural_eq(&deeper));
    }

    #[test]
    fn structural_eq_handles_duplicate_timestamps() {
        let mut left = TraceNode::new(1, None);
        left.add_child(TraceNode::new(2, None));
        left.add_child(TraceNode::new(2, None));

        let mut right = TraceNode::new(1, None);
        right.add_child(TraceNode::new(2, None));
        right.add_child(TraceNode::new(2, None));
        assert!(left.structural_eq(&right));

        right.add_child(TraceNode::new(2, None));
        assert!(!left.structural_eq(&right));
    }
}
