/// Workflow definition layer
///
/// Type definitions for workflows, nodes and edges, plus the structured
/// filter criteria compiled from `filter` node rules.

// Core workflow type definitions
pub mod types;

// "Label: v1, v2" rule parsing and evaluation
pub mod filter;

// Re-export commonly used types
pub use filter::{FilterCriteria, FilterParseError};
pub use types::{
    Edge, Node, NodeSpec, NormalizeConfig, NotifyConfig, ScheduleTag, SourceConfig, ValidationError,
    Workflow, WorkflowStatus,
};
