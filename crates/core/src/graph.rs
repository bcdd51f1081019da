//! In-memory model of an API-format workflow graph.
//!
//! The wire format is an object keyed by node id:
//!
//! ```json
//! {
//!   "4": {
//!     "class_type": "KSampler",
//!     "inputs": { "steps": 20, "model": ["1", 0] }
//!   }
//! }
//! ```
//!
//! An input whose value is a two-element array `[producer_id, slot]` is a
//! [`NodeRef`]; everything else is a literal.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::operation::OperationType;
use crate::path::{self, ParamPath, PathError, Segment};

const CLASS_TYPE_KEY: &str = "class_type";
const INPUTS_KEY: &str = "inputs";

// ---------------------------------------------------------------------------
// Identifiers and references
// ---------------------------------------------------------------------------

/// Node identifier, unique within a graph.
///
/// Ordered numerically when both ids are integers, lexically otherwise,
/// with integer ids sorting first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the id, if it is a plain non-negative integer.
    pub fn as_number(&self) -> Option<u64> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self::new(id.to_string())
    }
}

/// An edge: output `slot` of node `producer`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub producer: NodeId,
    pub slot: u32,
}

impl NodeRef {
    pub fn new(producer: impl Into<NodeId>, slot: u32) -> Self {
        Self {
            producer: producer.into(),
            slot,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        let arr = value.as_array()?;
        if arr.len() != 2 {
            return None;
        }
        let producer = match &arr[0] {
            Value::String(s) => NodeId::new(s.clone()),
            Value::Number(n) => NodeId::from(n.as_u64()?),
            _ => return None,
        };
        let slot = u32::try_from(arr[1].as_u64()?).ok()?;
        Some(Self { producer, slot })
    }

    fn to_json(&self) -> Value {
        Value::Array(vec![
            Value::String(self.producer.to_string()),
            Value::from(self.slot),
        ])
    }
}

/// The value bound to a node input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Literal(Value),
    Reference(NodeRef),
}

impl InputValue {
    pub fn from_json(value: Value) -> Self {
        match NodeRef::from_json(&value) {
            Some(r) => Self::Reference(r),
            None => Self::Literal(value),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Reference(r) => r.to_json(),
        }
    }

    pub fn as_reference(&self) -> Option<&NodeRef> {
        match self {
            Self::Reference(r) => Some(r),
            Self::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal(v) => Some(v),
            Self::Reference(_) => None,
        }
    }
}

impl From<NodeRef> for InputValue {
    fn from(r: NodeRef) -> Self {
        Self::Reference(r)
    }
}

impl From<Value> for InputValue {
    fn from(v: Value) -> Self {
        Self::Literal(v)
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Result of [`Node::get_path`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Value(&'a Value),
    Reference(&'a NodeRef),
    NotFound,
}

/// One computation step.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub operation: OperationType,
    pub inputs: BTreeMap<String, InputValue>,
    /// Any other top-level keys the template carried (`_meta`, ...).
    pub extra: Map<String, Value>,
}

impl Node {
    pub fn new(operation: OperationType) -> Self {
        Self {
            operation,
            inputs: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// Builder-style input setter.
    pub fn with_input(mut self, name: &str, value: impl Into<InputValue>) -> Self {
        self.inputs.insert(name.to_string(), value.into());
        self
    }

    pub fn input(&self, name: &str) -> Option<&InputValue> {
        self.inputs.get(name)
    }

    /// `_meta.title`, when the template set one.
    pub fn title(&self) -> Option<&str> {
        self.extra.get("_meta")?.get("title")?.as_str()
    }

    /// All `(input name, reference)` edges leaving this node.
    pub fn references(&self) -> impl Iterator<Item = (&str, &NodeRef)> {
        self.inputs
            .iter()
            .filter_map(|(name, v)| v.as_reference().map(|r| (name.as_str(), r)))
    }

    /// Read the value at `path`. `inputs.<name>` addresses an input; any
    /// other root addresses the extra fields.
    pub fn get_path(&self, path: &ParamPath) -> Lookup<'_> {
        match path.segments() {
            [Segment::Key(root), Segment::Key(name), rest @ ..] if root == INPUTS_KEY => {
                match self.inputs.get(name) {
                    None => Lookup::NotFound,
                    Some(InputValue::Reference(r)) if rest.is_empty() => Lookup::Reference(r),
                    Some(InputValue::Reference(_)) => Lookup::NotFound,
                    Some(InputValue::Literal(v)) => {
                        path::get(v, rest).map_or(Lookup::NotFound, Lookup::Value)
                    }
                }
            }
            [Segment::Key(root), rest @ ..] if root != INPUTS_KEY && root != CLASS_TYPE_KEY => self
                .extra
                .get(root)
                .and_then(|v| path::get(v, rest))
                .map_or(Lookup::NotFound, Lookup::Value),
            _ => Lookup::NotFound,
        }
    }

    /// Write a literal at `path`.
    ///
    /// Fails when the path would overwrite or descend into a reference,
    /// touch `class_type`, or pass through a non-container literal.
    pub fn set_path(&mut self, path: &ParamPath, value: Value) -> Result<(), PathError> {
        match path.segments() {
            [Segment::Key(root), Segment::Key(name), rest @ ..] if root == INPUTS_KEY => {
                let slot = self
                    .inputs
                    .entry(name.clone())
                    .or_insert(InputValue::Literal(Value::Null));
                match slot {
                    InputValue::Reference(_) => Err(PathError::ReferenceInput(name.clone())),
                    InputValue::Literal(v) => path::set(v, rest, value),
                }
            }
            [Segment::Key(root), ..] if root == INPUTS_KEY => Err(PathError::NotAContainer {
                segment: INPUTS_KEY.to_string(),
                found: "an input map",
            }),
            [Segment::Key(root), ..] if root == CLASS_TYPE_KEY => {
                Err(PathError::Reserved(CLASS_TYPE_KEY.to_string()))
            }
            [Segment::Key(root), rest @ ..] => {
                let slot = self.extra.entry(root.clone()).or_insert(Value::Null);
                path::set(slot, rest, value)
            }
            [Segment::Index(_), ..] => Err(PathError::NotAContainer {
                segment: path.to_string(),
                found: "a node",
            }),
            [] => Err(PathError::Empty),
        }
    }

    fn from_json(id: &NodeId, value: &Value) -> Result<Self, CoreError> {
        let malformed = |reason: &str| CoreError::MalformedNode {
            node: id.clone(),
            reason: reason.to_string(),
        };
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("node must be an object"))?;
        let class_type = obj
            .get(CLASS_TYPE_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing required 'class_type' field"))?;

        let inputs = match obj.get(INPUTS_KEY) {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), InputValue::from_json(v.clone())))
                .collect(),
            Some(_) => return Err(malformed("'inputs' must be an object")),
        };

        let extra = obj
            .iter()
            .filter(|(k, _)| *k != CLASS_TYPE_KEY && *k != INPUTS_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            operation: OperationType::from_class_type(class_type),
            inputs,
            extra,
        })
    }

    fn to_json(&self) -> Value {
        let mut obj = self.extra.clone();
        obj.insert(
            CLASS_TYPE_KEY.to_string(),
            Value::String(self.operation.class_type().to_string()),
        );
        let inputs: Map<String, Value> = self
            .inputs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        obj.insert(INPUTS_KEY.to_string(), Value::Object(inputs));
        Value::Object(obj)
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A workflow: node id to node, iterated in node-id order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Graph {
    nodes: BTreeMap<NodeId, Node>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an API-format workflow.
    ///
    /// Dangling references are accepted (repair handles them); cycles are
    /// not.
    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        let obj = json.as_object().ok_or_else(|| {
            CoreError::InvalidWorkflow("Workflow JSON must be an object".to_string())
        })?;
        if obj.is_empty() {
            return Err(CoreError::InvalidWorkflow(
                "Workflow JSON must contain at least one node".to_string(),
            ));
        }

        let mut nodes = BTreeMap::new();
        for (id, value) in obj {
            let id = NodeId::new(id.clone());
            let node = Node::from_json(&id, value)?;
            nodes.insert(id, node);
        }

        let graph = Self { nodes };
        if let Some(id) = graph.find_cycle() {
            return Err(CoreError::Cycle(id));
        }
        Ok(graph)
    }

    /// Parse from raw JSON text.
    pub fn from_str_json(raw: &str) -> Result<Self, CoreError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| CoreError::InvalidWorkflow(format!("Malformed workflow JSON: {e}")))?;
        Self::from_json(&value)
    }

    /// Submission payload.
    pub fn to_json(&self) -> Value {
        let obj: Map<String, Value> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.to_string(), node.to_json()))
            .collect();
        Value::Object(obj)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn insert(&mut self, id: NodeId, node: Node) -> Option<Node> {
        self.nodes.insert(id, node)
    }

    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        self.nodes.remove(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Nodes whose operation matches `op`, in node-id order.
    pub fn nodes_of<'a>(
        &'a self,
        op: &'a OperationType,
    ) -> impl Iterator<Item = (&'a NodeId, &'a Node)> + 'a {
        self.nodes.iter().filter(move |(_, n)| &n.operation == op)
    }

    /// Every `(consumer, input name)` whose value references `target`.
    pub fn consumers_of(&self, target: &NodeRef) -> Vec<(NodeId, String)> {
        self.nodes
            .iter()
            .flat_map(|(id, node)| {
                node.references()
                    .filter(|(_, r)| *r == target)
                    .map(|(name, _)| (id.clone(), name.to_string()))
            })
            .collect()
    }

    /// Allocate `count` fresh ids above the highest numeric id in use.
    /// When that id is already `u64::MAX`, the lowest free ids are used.
    pub fn allocate_ids(&self, count: usize) -> Vec<NodeId> {
        let start = self
            .nodes
            .keys()
            .filter_map(NodeId::as_number)
            .max()
            .and_then(|max| max.checked_add(1))
            .unwrap_or(1);
        (start..=u64::MAX)
            .chain(1..start)
            .map(NodeId::from)
            .filter(|id| !self.nodes.contains_key(id))
            .take(count)
            .collect()
    }

    /// Whether `from` reaches `to` by following references (or is `to`).
    pub fn depends_on(&self, from: &NodeId, to: &NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.references().map(|(_, r)| &r.producer));
            }
        }
        false
    }

    /// Every reference whose producer is missing from the graph.
    pub fn dangling_references(&self) -> Vec<(NodeId, String, NodeRef)> {
        self.nodes
            .iter()
            .flat_map(|(id, node)| {
                node.references()
                    .filter(|(_, r)| !self.nodes.contains_key(&r.producer))
                    .map(|(name, r)| (id.clone(), name.to_string(), r.clone()))
            })
            .collect()
    }

    /// Return a node that lies on a reference cycle, if any.
    pub fn find_cycle(&self) -> Option<NodeId> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let mut marks: BTreeMap<&NodeId, Mark> = BTreeMap::new();
        for start in self.nodes.keys() {
            if marks.contains_key(start) {
                continue;
            }
            // Iterative DFS: (node, producers still to explore).
            let mut stack: Vec<(&NodeId, Vec<&NodeId>)> = Vec::new();
            marks.insert(start, Mark::Visiting);
            stack.push((start, self.producers_of(start)));
            while let Some(top) = stack.last_mut() {
                let id = top.0;
                match top.1.pop() {
                    Some(next) => match marks.get(next).copied() {
                        Some(Mark::Visiting) => return Some(next.clone()),
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(next, Mark::Visiting);
                            stack.push((next, self.producers_of(next)));
                        }
                    },
                    None => {
                        marks.insert(id, Mark::Done);
                        stack.pop();
                    }
                }
            }
        }
        None
    }

    /// Producers referenced by `id` that exist in the graph.
    fn producers_of(&self, id: &NodeId) -> Vec<&NodeId> {
        self.nodes
            .get(id)
            .map(|node| {
                node.references()
                    .filter_map(|(_, r)| self.nodes.get_key_value(&r.producer).map(|(k, _)| k))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl FromIterator<(NodeId, Node)> for Graph {
    fn from_iter<I: IntoIterator<Item = (NodeId, Node)>>(iter: I) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}
