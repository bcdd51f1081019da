//! Non-fatal findings reported alongside a compiled graph.
//!
//! A graph that produced diagnostics is degraded but usable; callers log
//! or display them instead of treating them as failures.

use std::fmt;

use serde::Serialize;

use crate::graph::{Graph, NodeId};

/// A rewritten copy of a graph plus what happened along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewritten {
    pub graph: Graph,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No registry entry exists for a supplied parameter.
    UnknownParameter { parameter: String },

    /// The template has no node the parameter can be written to.
    NoMatchingNode { parameter: String, targets: Vec<String> },

    /// Neither the primary nor the fallback path could be written.
    BindFailed {
        parameter: String,
        node: NodeId,
        reason: String,
    },

    /// The supplied value could not be converted to the target literal type.
    CoercionFailed {
        parameter: String,
        expected: String,
        value: String,
    },

    /// Adapters were requested but cannot be spliced into this graph.
    AdaptersUnsupported { reason: String },

    /// One adapter was left out of the splice.
    AdapterSkipped { file: String, reason: String },

    /// The stacking node holds fewer slots than adapters were supplied.
    AdaptersTruncated { supplied: usize, capacity: usize },

    /// More than one node could serve as a base producer.
    AmbiguousProducer {
        pathway: String,
        chosen: NodeId,
        candidates: usize,
    },

    /// A dangling reference was pointed at a surviving node.
    ReferenceRelinked {
        node: NodeId,
        input: String,
        missing: NodeId,
        replacement: NodeId,
    },

    /// A dangling reference had no suitable replacement and was dropped.
    ReferenceRemoved {
        node: NodeId,
        input: String,
        missing: NodeId,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownParameter { parameter } => {
                write!(f, "parameter '{parameter}' is not registered for this template")
            }
            Self::NoMatchingNode { parameter, targets } => write!(
                f,
                "parameter '{parameter}' skipped: no {} node in template",
                targets.join("/")
            ),
            Self::BindFailed {
                parameter,
                node,
                reason,
            } => write!(f, "parameter '{parameter}' not written to node {node}: {reason}"),
            Self::CoercionFailed {
                parameter,
                expected,
                value,
            } => write!(f, "parameter '{parameter}' expects {expected}, got {value}"),
            Self::AdaptersUnsupported { reason } => {
                write!(f, "adapters unsupported by target: {reason}")
            }
            Self::AdapterSkipped { file, reason } => {
                write!(f, "adapter '{file}' skipped: {reason}")
            }
            Self::AdaptersTruncated { supplied, capacity } => write!(
                f,
                "{supplied} adapters supplied but the stack holds {capacity}; the rest were dropped"
            ),
            Self::AmbiguousProducer {
                pathway,
                chosen,
                candidates,
            } => write!(
                f,
                "{candidates} candidate {pathway} producers; using node {chosen}"
            ),
            Self::ReferenceRelinked {
                node,
                input,
                missing,
                replacement,
            } => write!(
                f,
                "node {node} input '{input}' referenced missing node {missing}; \
                 relinked to {replacement}"
            ),
            Self::ReferenceRemoved {
                node,
                input,
                missing,
            } => write!(
                f,
                "node {node} input '{input}' referenced missing node {missing}; input removed"
            ),
        }
    }
}

/// Log a diagnostic at `warn` and append it.
pub(crate) fn report(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    tracing::warn!(diagnostic = %diagnostic, "Workflow compile diagnostic");
    diagnostics.push(diagnostic);
}
