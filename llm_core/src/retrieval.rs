use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LlmError;

/// One ranked snippet returned by the retrieval service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextSnippet {
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    question: &'a str,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    context: Vec<ContextSnippet>,
}

/// Client for the retrieval (context augmentation) service.
#[derive(Debug, Clone)]
pub struct RetrievalClient {
    client: Client,
    base_url: String,
}

impl RetrievalClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Ask for the snippets most relevant to `question`.
    pub async fn query(&self, question: &str) -> Result<Vec<ContextSnippet>, LlmError> {
        let url = format!("{}/query", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&QueryRequest { question })
            .send()
            .await
            .map_err(|e| LlmError::UpstreamUnavailable(format!("retrieval service unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| LlmError::UpstreamUnavailable(format!("retrieval service error: {e}")))?;

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| LlmError::UpstreamUnavailable(format!("invalid retrieval response: {e}")))?;

        debug!("Retrieved {} context snippet(s)", body.context.len());
        Ok(body.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_response_without_context_is_empty() {
        let body: QueryResponse = serde_json::from_str(r#"{"question":"why?"}"#).unwrap();
        assert!(body.context.is_empty());
    }

    #[test]
    fn test_snippet_metadata_is_optional() {
        let body: QueryResponse =
            serde_json::from_str(r#"{"context":[{"text":"a"},{"text":"b","metadata":{"page":2}}]}"#)
                .unwrap();
        assert_eq!(body.context.len(), 2);
        assert!(body.context[0].metadata.is_null());
        assert_eq!(body.context[1].metadata["page"], 2);
    }
}
