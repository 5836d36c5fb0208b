//! Output normalization, data URLs, and saving outputs to disk.
//!
//! Providers return outputs in several shapes. Each shape has one adapter
//! into [`RawOutput`], and [`normalize`] turns any `RawOutput` into the
//! ordered list of URLs the rest of the pipeline works with.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use serde_json::Value;

use crate::error::TatttyError;
use crate::params::format_extension;
use crate::ports::image_generator::{OutputItem, RawOutput};

/// Interpret a prediction's JSON `output` field.
///
/// # Errors
///
/// Returns [`TatttyError::NoOutput`] for shapes that carry no URL.
pub fn raw_output_from_json(output: &Value) -> Result<RawOutput, TatttyError> {
    match output {
        Value::Null => Ok(RawOutput::Empty),
        Value::Array(items) => {
            items.iter().map(output_item_from_json).collect::<Result<_, _>>().map(RawOutput::Many)
        }
        other => output_item_from_json(other).map(RawOutput::Single),
    }
}

fn output_item_from_json(value: &Value) -> Result<OutputItem, TatttyError> {
    match value {
        Value::String(url) => Ok(OutputItem::Url(url.clone())),
        Value::Object(map) => match map.get("url").and_then(Value::as_str) {
            Some(url) => Ok(OutputItem::File { url: url.to_string() }),
            None => Err(TatttyError::NoOutput("Output object has no url.".into())),
        },
        other => Err(TatttyError::NoOutput(format!("Unrecognized output type: {other}"))),
    }
}

/// Flatten any output shape into an ordered list of URLs. Inline bytes
/// become base64 data URLs.
///
/// # Errors
///
/// Returns [`TatttyError::NoOutput`] if nothing usable remains.
pub fn normalize(output: RawOutput) -> Result<Vec<String>, TatttyError> {
    let items = match output {
        RawOutput::Single(item) => vec![item],
        RawOutput::Many(items) => items,
        RawOutput::Empty => Vec::new(),
    };

    let urls: Vec<String> = items
        .into_iter()
        .map(|item| match item {
            OutputItem::Url(url) | OutputItem::File { url } => url,
            OutputItem::Inline { data, mime_type } => data_url(&data, mime_type.as_deref()),
        })
        .filter(|url| !url.trim().is_empty())
        .collect();

    if urls.is_empty() {
        return Err(TatttyError::NoOutput("The provider returned no usable output.".into()));
    }
    Ok(urls)
}

/// Encode bytes as a data URL. The MIME type is sniffed from the bytes when
/// the provider gave none or gave a generic one.
#[must_use]
pub fn data_url(data: &[u8], mime_type: Option<&str>) -> String {
    let mime = match mime_type {
        Some(m) if m.starts_with("image/") => m.to_string(),
        _ => sniff_mime(data).to_string(),
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(data);
    format!("data:{mime};base64,{encoded}")
}

fn sniff_mime(data: &[u8]) -> &'static str {
    match image::guess_format(data) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::Gif) => "image/gif",
        // Replicate's default output format.
        _ => "image/webp",
    }
}

/// Decode a `data:` URL into its bytes and MIME type.
#[must_use]
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    let data = base64::engine::general_purpose::STANDARD.decode(payload).ok()?;
    Some((mime.to_string(), data))
}

/// Generate an output filename from a prompt and format.
///
/// Sanitizes the first 50 characters of the prompt to kebab-case,
/// appends a unix timestamp and index, and adds the file extension.
#[must_use]
pub fn auto_filename(prompt: &str, format: &str, index: usize) -> String {
    let sanitized = sanitize_for_filename(prompt, 50);
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let ext = format_extension(format);
    format!("{sanitized}-{timestamp}-{}.{ext}", index + 1)
}

/// Sanitize a string for use in a filename.
///
/// Converts to lowercase, replaces non-alphanumeric chars with hyphens,
/// collapses consecutive hyphens, and trims to max length.
#[must_use]
pub fn sanitize_for_filename(input: &str, max_len: usize) -> String {
    let mut result = String::with_capacity(max_len);
    let mut last_was_hyphen = true;

    for ch in input.chars() {
        if result.len() >= max_len {
            break;
        }
        if ch.is_ascii_alphanumeric() {
            result.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            result.push('-');
            last_was_hyphen = true;
        }
    }

    while result.ends_with('-') {
        result.pop();
    }

    if result.is_empty() {
        "tattoo".to_string()
    } else {
        result
    }
}

/// Save every output into `dir`, fetching remote URLs and decoding data URLs.
///
/// # Errors
///
/// Returns an error if a download or a write fails.
pub async fn save_outputs(
    client: &reqwest::Client,
    urls: &[String],
    prompt: &str,
    format: &str,
    dir: &Path,
) -> Result<Vec<PathBuf>, TatttyError> {
    tokio::fs::create_dir_all(dir).await?;
    let mut saved = Vec::with_capacity(urls.len());
    for (i, url) in urls.iter().enumerate() {
        let bytes = match decode_data_url(url) {
            Some((_, data)) => data,
            None => {
                let response = client.get(url).send().await?;
                let status = response.status();
                if !status.is_success() {
                    return Err(TatttyError::Api {
                        status: status.as_u16(),
                        message: format!("Failed to download {url}"),
                    });
                }
                response.bytes().await?.to_vec()
            }
        };
        let path = dir.join(auto_filename(prompt, format, i));
        tokio::fs::write(&path, bytes).await?;
        saved.push(path);
    }
    Ok(saved)
}
