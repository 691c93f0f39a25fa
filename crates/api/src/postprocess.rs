//! Output post-processing after a successful generation.
//!
//! The provider reports output artifact references as a JSON array of
//! URLs. Before a variation is marked `COMPLETED`, those references are
//! validated and normalized. Post-processing failure is not generation
//! failure: the caller falls back to storing the raw provider outputs
//! with the `degraded` flag set.

use async_trait::async_trait;

use pixelforge_core::types::DbId;

/// Why post-processing of a variation's outputs did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum PostProcessError {
    #[error("Malformed outputs: {0}")]
    Malformed(String),

    #[error("Artifact fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Artifact not retrievable: {url} returned {status}")]
    Unretrievable { url: String, status: u16 },
}

/// Validates and normalizes provider outputs before completion.
#[async_trait]
pub trait PostProcessor: Send + Sync {
    /// Return the outputs value to store for the variation, or an error
    /// that the caller should treat as a degraded (not failed) result.
    async fn process(
        &self,
        variation_id: DbId,
        outputs: &serde_json::Value,
    ) -> Result<serde_json::Value, PostProcessError>;
}

/// Production post-processor: checks each artifact URL is well-formed and
/// currently retrievable from the provider's CDN.
pub struct HttpPostProcessor {
    client: reqwest::Client,
}

impl HttpPostProcessor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn urls(outputs: &serde_json::Value) -> Result<Vec<String>, PostProcessError> {
        let arr = outputs
            .as_array()
            .ok_or_else(|| PostProcessError::Malformed("expected an array of URLs".into()))?;
        if arr.is_empty() {
            return Err(PostProcessError::Malformed("empty output array".into()));
        }
        arr.iter()
            .map(|v| {
                v.as_str()
                    .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
                    .map(str::to_string)
                    .ok_or_else(|| {
                        PostProcessError::Malformed(format!("not an artifact URL: {v}"))
                    })
            })
            .collect()
    }
}

#[async_trait]
impl PostProcessor for HttpPostProcessor {
    async fn process(
        &self,
        variation_id: DbId,
        outputs: &serde_json::Value,
    ) -> Result<serde_json::Value, PostProcessError> {
        let urls = Self::urls(outputs)?;

        for url in &urls {
            let response = self.client.head(url).send().await?;
            if !response.status().is_success() {
                return Err(PostProcessError::Unretrievable {
                    url: url.clone(),
                    status: response.status().as_u16(),
                });
            }
        }

        tracing::debug!(variation_id, artifacts = urls.len(), "Validated output artifacts");
        Ok(serde_json::Value::from(urls))
    }
}

/// Pass-through post-processor for tests and local development.
pub struct NoopPostProcessor;

#[async_trait]
impl PostProcessor for NoopPostProcessor {
    async fn process(
        &self,
        _variation_id: DbId,
        outputs: &serde_json::Value,
    ) -> Result<serde_json::Value, PostProcessError> {
        Ok(outputs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_extraction_accepts_http_arrays() {
        let urls = HttpPostProcessor::urls(&json!([
            "https://cdn.example/a.png",
            "http://cdn.example/b.png"
        ]))
        .unwrap();
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn rejects_non_array_and_empty_outputs() {
        assert!(HttpPostProcessor::urls(&json!({"image": "x"})).is_err());
        assert!(HttpPostProcessor::urls(&json!([])).is_err());
    }

    #[test]
    fn rejects_non_url_entries() {
        assert!(HttpPostProcessor::urls(&json!(["not a url"])).is_err());
        assert!(HttpPostProcessor::urls(&json!([42])).is_err());
    }
}
