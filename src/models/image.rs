//! Image API data models
//!
//! OpenAI-compatible image generation request and response structures

use super::Usage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parsed inbound request handed to the relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayRequest {
    /// Image generation or image edit request
    Image(ImageRequest),
    /// Any other JSON request, identified by endpoint
    Json { endpoint: String, body: Value },
}

impl RelayRequest {
    /// Borrow the image request, if this is one
    pub fn as_image(&self) -> Option<&ImageRequest> {
        match self {
            RelayRequest::Image(request) => Some(request),
            RelayRequest::Json { .. } => None,
        }
    }

    /// Short name of the request shape, for error messages
    pub fn kind(&self) -> &str {
        match self {
            RelayRequest::Image(_) => "image",
            RelayRequest::Json { endpoint, .. } => endpoint,
        }
    }
}

/// Image generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Model name
    pub model: String,
    /// Prompt text
    #[serde(default)]
    pub prompt: String,
    /// Number of images to generate
    #[serde(default = "default_n")]
    pub n: u32,
    /// Requested size, e.g. "1024x1024"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
    /// Quality tier
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub quality: String,
    /// "url" or "b64_json"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Provider specific fields, forwarded untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_n() -> u32 {
    1
}

impl Default for ImageRequest {
    fn default() -> Self {
        Self {
            model: String::new(),
            prompt: String::new(),
            n: default_n(),
            size: String::new(),
            quality: String::new(),
            response_format: None,
            style: None,
            user: None,
            extra: Map::new(),
        }
    }
}

impl ImageRequest {
    /// Produce a copy sharing nothing with `self`
    ///
    /// The copy goes through the serialized form so that it is exactly what
    /// the adapter will later see.
    pub fn isolated_copy(&self) -> serde_json::Result<Self> {
        let value = serde_json::to_value(self)?;
        serde_json::from_value(value)
    }

    /// Build a request from the text fields of a multipart image edit form
    pub fn from_form_fields<'a, I>(fields: I) -> serde_json::Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut object = Map::new();
        for (name, value) in fields {
            let value = match name {
                "n" => value
                    .trim()
                    .parse::<u32>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::String(value.to_string())),
                _ => Value::String(value.to_string()),
            };
            object.insert(name.to_string(), value);
        }
        serde_json::from_value(Value::Object(object))
    }
}

/// Image generation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub data: Vec<ImageData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Single generated image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}
