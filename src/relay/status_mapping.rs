//! Status code remapping
//!
//! Channel-configured translation of upstream HTTP statuses into the status
//! the client sees. Only upstream-caused errors are remapped.

use crate::utils::error::RelayError;
use anyhow::{Context, Result};
use axum::http::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Parsed `statusCodeMapping` of a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusCodeMapping {
    map: HashMap<u16, StatusCode>,
}

impl StatusCodeMapping {
    /// Parse a JSON object string such as `{"429": "503", "500": 502}`
    ///
    /// An empty string and `{}` produce an empty mapping.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "{}" {
            return Ok(Self::default());
        }

        let entries: HashMap<String, Value> =
            serde_json::from_str(raw).context("Status code mapping must be a JSON object")?;

        let mut map = HashMap::with_capacity(entries.len());
        for (from, to) in entries {
            let from: u16 = from
                .trim()
                .parse()
                .with_context(|| format!("Invalid source status code '{}'", from))?;
            let to = match &to {
                Value::String(s) => s.trim().parse::<u16>().ok(),
                Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
                _ => None,
            }
            .and_then(|code| StatusCode::from_u16(code).ok())
            .with_context(|| format!("Invalid target status code {} for {}", to, from))?;
            map.insert(from, to);
        }

        Ok(Self { map })
    }

    /// Parse, falling back to an empty mapping on invalid input
    pub fn parse_lenient(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|e| {
            warn!("Ignoring invalid status code mapping: {:#}", e);
            Self::default()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Set the client-facing status of an upstream error
    ///
    /// The target is looked up from the originally detected status, so
    /// applying the mapping twice yields the same result. The error kind is
    /// never touched and a 200 is never remapped.
    pub fn remap(&self, error: &mut RelayError) {
        if self.map.is_empty() || error.status == StatusCode::OK {
            return;
        }

        if let Some(target) = self.map.get(&error.status.as_u16()) {
            debug!("Remapping status {} -> {}", error.status, target);
            error.remapped_status = Some(*target);
        }
    }
}
