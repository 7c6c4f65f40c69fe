//! Retrieval tool over a caller-supplied retriever port.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::events::{AgentEvent, AgentEventKind};
use crate::tools::{caps, parse_args, Tool, ToolExecutionContext};

const DEFAULT_TOP_K: usize = 8;

/// One retrieved context chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Port to whatever index the caller brings; the core never builds one.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// `retrieve_context` — query the retriever for relevant chunks.
pub struct RetrieveContextTool {
    retriever: Arc<dyn Retriever>,
}

impl RetrieveContextTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveArgs {
    query: String,
    top_k: Option<usize>,
}

#[async_trait]
impl Tool for RetrieveContextTool {
    fn name(&self) -> &str {
        "retrieve_context"
    }

    fn description(&self) -> &str {
        "Retrieve context chunks relevant to a query from the configured index."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "topK": {"type": "integer", "minimum": 1}
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn capabilities(&self) -> &[&str] {
        &[caps::RETRIEVAL_READ]
    }

    async fn execute(&self, args: Value, ctx: &ToolExecutionContext) -> Result<Value> {
        let args: RetrieveArgs = parse_args(args)?;
        let top_k = args.top_k.unwrap_or(DEFAULT_TOP_K);

        ctx.events
            .emit(AgentEvent::new(AgentEventKind::RetrievalQuery {
                query: args.query.clone(),
                top_k,
            }));

        let chunks = self.retriever.retrieve(&args.query, top_k).await?;

        ctx.events
            .emit(AgentEvent::new(AgentEventKind::RetrievalResults {
                query: args.query,
                top_k,
                count: chunks.len(),
            }));

        Ok(serde_json::to_value(chunks)?)
    }
}
