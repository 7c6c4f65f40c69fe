//! Built-in tools: filesystem effects, shared-memory access, and retrieval.

mod fs;
mod memory;
mod retrieval;

pub use fs::{ApplyPatchTool, DeletePathTool, ReadFileTool, RenamePathTool, WriteFileTool};
pub use memory::{MemoryGetTool, MemorySetTool};
pub use retrieval::{RetrieveContextTool, RetrievedChunk, Retriever};

use std::sync::Arc;

use super::Tool;

/// The filesystem tool set, bound to whatever workspace the execution
/// context carries.
pub fn filesystem_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ReadFileTool),
        Arc::new(WriteFileTool),
        Arc::new(DeletePathTool),
        Arc::new(RenamePathTool),
        Arc::new(ApplyPatchTool),
    ]
}

/// The shared-memory tool set.
pub fn memory_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(MemoryGetTool), Arc::new(MemorySetTool)]
}

/// The retrieval tool set over a caller-supplied retriever.
pub fn retrieval_tools(retriever: Arc<dyn Retriever>) -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(RetrieveContextTool::new(retriever))]
}
