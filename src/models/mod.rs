//! Data models module
//!
//! Defines request, response and usage data structures of the image relay

use serde::{Deserialize, Serialize};

pub mod image;

pub use image::{ImageData, ImageRequest, ImageResponse, RelayRequest};

/// Usage statistics
///
/// Token counts reported by the upstream; zero means "not reported".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt token count (`input_tokens` in image API responses)
    #[serde(default, alias = "input_tokens")]
    pub prompt_tokens: u32,
    /// Completion token count (`output_tokens` in image API responses)
    #[serde(default, alias = "output_tokens")]
    pub completion_tokens: u32,
    /// Total token count
    #[serde(default)]
    pub total_tokens: u32,
}
