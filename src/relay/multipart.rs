//! Multipart image form
//!
//! Materialized view of an image edit upload: text fields plus file parts,
//! and the image count/size metadata derived from it for billing logs.

use anyhow::{Context, Result};
use axum::body::Bytes;
use std::collections::BTreeMap;
use std::convert::Infallible;

/// One uploaded file part
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            content_type: None,
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Decoded multipart form
///
/// Fields are kept in name order so that scans over them are deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageForm {
    fields: BTreeMap<String, String>,
    files: BTreeMap<String, Vec<FilePart>>,
}

/// Uploaded image statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    /// Number of matched image parts
    pub count: usize,
    /// Total bytes across matched parts
    pub total_bytes: u64,
    /// Formatted total size, empty when nothing was uploaded
    pub size_info: String,
}

impl ImageMetadata {
    fn from_parts<'a>(parts: impl IntoIterator<Item = &'a FilePart>) -> Self {
        let (count, total_bytes) = parts
            .into_iter()
            .fold((0usize, 0u64), |(count, total), part| (count + 1, total + part.size()));

        Self {
            count,
            total_bytes,
            size_info: format_size(total_bytes),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl ImageForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn insert_file(&mut self, name: impl Into<String>, part: FilePart) {
        self.files.entry(name.into()).or_default().push(part);
    }

    /// Text fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// File fields in name order
    pub fn files(&self) -> impl Iterator<Item = (&str, &[FilePart])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn non_empty_files(&self, name: &str) -> Option<&[FilePart]> {
        self.files
            .get(name)
            .map(Vec::as_slice)
            .filter(|parts| !parts.is_empty())
    }

    /// Decode a buffered multipart body
    pub async fn parse(body: Bytes, content_type: &str) -> Result<Self> {
        let boundary = multer::parse_boundary(content_type)
            .context("Missing or invalid multipart boundary")?;
        let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut form = Self::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .context("Failed to parse multipart field")?
        {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field.content_type().map(|m| m.to_string());
                    let data = field
                        .bytes()
                        .await
                        .with_context(|| format!("Failed to read file field '{}'", name))?;
                    form.insert_file(
                        name,
                        FilePart {
                            file_name: Some(file_name),
                            content_type,
                            data,
                        },
                    );
                }
                None => {
                    let value = field
                        .text()
                        .await
                        .with_context(|| format!("Failed to read field '{}'", name))?;
                    form.insert_field(name, value);
                }
            }
        }

        Ok(form)
    }

    /// Count and size of uploaded images
    ///
    /// First match wins: an `image` field, then `image[]`, then the union of
    /// every `image[...]` field. A form mixing `image[]` with indexed fields
    /// therefore only reports `image[]`.
    pub fn image_metadata(&self) -> ImageMetadata {
        if let Some(parts) = self.non_empty_files("image") {
            return ImageMetadata::from_parts(parts);
        }
        if let Some(parts) = self.non_empty_files("image[]") {
            return ImageMetadata::from_parts(parts);
        }

        ImageMetadata::from_parts(
            self.files
                .iter()
                .filter(|(name, _)| name.starts_with("image["))
                .flat_map(|(_, parts)| parts.iter()),
        )
    }
}

impl ImageForm {
    /// Encode the form as a `multipart/form-data` body with `boundary`
    ///
    /// Text fields come first, then file parts, both in name order.
    pub fn encode(&self, boundary: &str) -> Bytes {
        let mut body = Vec::with_capacity(
            self.files.values().flatten().map(|part| part.data.len() + 256).sum::<usize>() + 1024,
        );

        for (name, value) in &self.fields {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", escape_quoted(name)).as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }

        for (name, parts) in &self.files {
            for part in parts {
                body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        escape_quoted(name),
                        escape_quoted(part.file_name.as_deref().unwrap_or("image"))
                    )
                    .as_bytes(),
                );
                let content_type = part.content_type.as_deref().unwrap_or("application/octet-stream");
                body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
                body.extend_from_slice(&part.data);
                body.extend_from_slice(b"\r\n");
            }
        }

        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        Bytes::from(body)
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Whether a content type names a multipart form, ignoring case and parameters
pub fn is_multipart_form(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|media_type| media_type.trim().eq_ignore_ascii_case("multipart/form-data"))
        .unwrap_or(false)
}

/// Format a byte count for billing logs
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    match bytes {
        0 => String::new(),
        b if b < KB => format!("{} B", b),
        b if b < MB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{:.1} MB", b as f64 / MB as f64),
    }
}
