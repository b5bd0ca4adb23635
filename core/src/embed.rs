//! Face-embedding providers.
//!
//! The core never runs a face model itself; it hands single cells to a
//! [`FaceEmbedder`] and treats "no face" as a normal `Ok(None)` answer.
//!
//! # Example
//!
//! ```ignore
//! use spritevault_core::embed::{EmbedderConfig, HttpFaceEmbedder, FaceEmbedder};
//!
//! let embedder = HttpFaceEmbedder::new(EmbedderConfig::default())?;
//! if let Some(embedding) = embedder.embed_face(&cell)? {
//!     println!("dimension: {}", embedding.len());
//! }
//! ```

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::Embedding;

/// Capability that turns a face-sized image into an embedding.
///
/// Implementations must be deterministic for identical input; descriptor
/// averaging relies on it.
pub trait FaceEmbedder: Send + Sync {
    /// Provider kind, for logs.
    fn kind(&self) -> &str;

    /// Embed the most prominent face, or `Ok(None)` when none is found.
    fn embed_face(&self, image: &RgbImage) -> Result<Option<Embedding>>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Settings for the remote embedding service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    /// Endpoint accepting `{"image": "<data URL>"}` and answering
    /// `{"descriptor": [...]}` (404 when no face is detected).
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        let endpoint = std::env::var("SPRITEVAULT_EMBED_URL")
            .unwrap_or_else(|_| "http://localhost:3000/descriptor".to_string());
        Self {
            endpoint,
            timeout_secs: 30,
        }
    }
}

impl EmbedderConfig {
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

// ============================================================================
// HTTP provider (feature-gated)
// ============================================================================

#[cfg(feature = "api_embed")]
pub use http::HttpFaceEmbedder;

#[cfg(feature = "api_embed")]
mod http {
    use std::time::Duration;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use image::RgbImage;
    use reqwest::StatusCode;
    use reqwest::blocking::Client;
    use serde::{Deserialize, Serialize};

    use super::{EmbedderConfig, FaceEmbedder};
    use crate::compositor::ImageCompositor;
    use crate::error::{Result, SpriteError};
    use crate::types::Embedding;

    #[derive(Serialize)]
    struct DescriptorRequest<'a> {
        image: &'a str,
    }

    #[derive(Deserialize)]
    struct DescriptorResponse {
        descriptor: Option<Vec<f32>>,
    }

    /// Posts each image as a JPEG data URL to a face-descriptor service.
    pub struct HttpFaceEmbedder {
        config: EmbedderConfig,
        client: Client,
        compositor: ImageCompositor,
    }

    impl HttpFaceEmbedder {
        pub fn new(config: EmbedderConfig) -> Result<Self> {
            let client = Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs.max(1)))
                .build()
                .map_err(|e| SpriteError::EmbeddingFailed {
                    reason: format!("failed to build HTTP client: {e}").into_boxed_str(),
                })?;
            Ok(Self {
                config,
                client,
                compositor: ImageCompositor::default(),
            })
        }

        fn data_url(&self, image: &RgbImage) -> Result<String> {
            let jpeg = self.compositor.encode_jpeg(image)?;
            Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(jpeg)))
        }
    }

    impl FaceEmbedder for HttpFaceEmbedder {
        fn kind(&self) -> &str {
            "http"
        }

        fn embed_face(&self, image: &RgbImage) -> Result<Option<Embedding>> {
            let url = self.data_url(image)?;
            let response = self
                .client
                .post(&self.config.endpoint)
                .json(&DescriptorRequest { image: &url })
                .send()
                .map_err(|e| SpriteError::EmbeddingFailed {
                    reason: format!("request to {} failed: {e}", self.config.endpoint)
                        .into_boxed_str(),
                })?;

            match response.status() {
                StatusCode::NOT_FOUND => Ok(None),
                status if status.is_success() => {
                    let body: DescriptorResponse =
                        response.json().map_err(|e| SpriteError::EmbeddingFailed {
                            reason: format!("invalid descriptor response: {e}").into_boxed_str(),
                        })?;
                    Ok(body.descriptor.filter(|d| !d.is_empty()))
                }
                status => Err(SpriteError::EmbeddingFailed {
                    reason: format!("descriptor service answered {status}").into_boxed_str(),
                }),
            }
        }
    }
}
