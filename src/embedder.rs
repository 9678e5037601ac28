//! Embedder capability (§6.4): the text → vector provider the core consumes
//! but does not implement. Expressed as an async trait object supplied at
//! construction, mirroring the trait-object capability pattern the teacher
//! uses for pluggable config providers.

use async_trait::async_trait;

use crate::error::RouxError;

/// Maps text to fixed-dimension, unit-norm embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RouxError>;

    /// Embed a batch of texts; empty input yields empty output.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RouxError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// The fixed dimension this embedder produces.
    fn dimensions(&self) -> usize;

    /// A stable identifier for the embedding model in use.
    fn model_id(&self) -> String;

    /// Called once when the embedder is registered with a coordinator.
    fn on_register(&self) {}

    /// Called once when the embedder is unregistered.
    fn on_unregister(&self) {}
}
