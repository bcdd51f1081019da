use crate::graph::NodeId;

/// Fatal compiler errors.
///
/// Recoverable conditions (missing target nodes, unsupported adapters,
/// dangling references) never surface here; they are reported as
/// [`Diagnostic`](crate::diagnostics::Diagnostic)s alongside the graph.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    #[error("Node '{node}' is malformed: {reason}")]
    MalformedNode { node: NodeId, reason: String },

    #[error("Workflow contains a reference cycle through node '{0}'")]
    Cycle(NodeId),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
