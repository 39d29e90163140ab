//! Compression engine: threshold-based payload compression with
//! tenant/api-key profile overlays.

use crate::error::{Error, Result};
use crate::frame::Frame;
use base64::Engine;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionProfile {
    #[serde(default = "default_true")]
    pub ws_permessage_deflate: bool,
    #[serde(default = "default_true")]
    pub payload_compression: bool,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default = "default_threshold")]
    pub threshold_bytes: usize,
    #[serde(default = "default_max_payload")]
    pub max_payload_bytes: usize,
}

fn default_true() -> bool {
    true
}
fn default_level() -> u32 {
    6
}
fn default_threshold() -> usize {
    1024
}
fn default_max_payload() -> usize {
    10 * 1024 * 1024
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self {
            ws_permessage_deflate: default_true(),
            payload_compression: default_true(),
            level: default_level(),
            threshold_bytes: default_threshold(),
            max_payload_bytes: default_max_payload(),
        }
    }
}

/// Resolves the effective [`CompressionProfile`] for a tenant/api-key pair.
/// Precedence: api-key overlay > tenant overlay > default.
#[derive(Debug, Clone, Default)]
pub struct ProfileResolver {
    default: CompressionProfile,
    tenant_overlays: HashMap<String, CompressionProfile>,
    api_key_overlays: HashMap<String, CompressionProfile>,
}

impl ProfileResolver {
    pub fn new(default: CompressionProfile) -> Self {
        Self {
            default,
            tenant_overlays: HashMap::new(),
            api_key_overlays: HashMap::new(),
        }
    }

    pub fn set_tenant_overlay(&mut self, tenant: impl Into<String>, profile: CompressionProfile) {
        self.tenant_overlays.insert(tenant.into(), profile);
    }

    pub fn set_api_key_overlay(&mut self, api_key: impl Into<String>, profile: CompressionProfile) {
        self.api_key_overlays.insert(api_key.into(), profile);
    }

    pub fn resolve(&self, tenant: Option<&str>, api_key: Option<&str>) -> CompressionProfile {
        if let Some(key) = api_key
            && let Some(p) = self.api_key_overlays.get(key)
        {
            return p.clone();
        }
        if let Some(tenant) = tenant
            && let Some(p) = self.tenant_overlays.get(tenant)
        {
            return p.clone();
        }
        self.default.clone()
    }
}

/// Estimates the serialized size of a frame's payload.
fn estimated_payload_size(frame: &Frame) -> Option<usize> {
    frame
        .payload
        .as_ref()
        .map(|p| serde_json::to_vec(p).map(|v| v.len()).unwrap_or(0))
}

pub fn should_compress(frame: &Frame, profile: &CompressionProfile) -> bool {
    if !profile.payload_compression {
        return false;
    }
    match estimated_payload_size(frame) {
        Some(size) => size >= profile.threshold_bytes && size <= profile.max_payload_bytes,
        None => false,
    }
}

/// Compresses `frame.payload` in place if applicable, otherwise returns the
/// frame unchanged. Other headers are preserved.
pub fn compress(frame: &Frame, profile: &CompressionProfile) -> Result<Frame> {
    if !should_compress(frame, profile) {
        return Ok(frame.clone());
    }
    let mut out = frame.clone();
    let payload = out.payload.take().expect("should_compress guarantees payload");
    let json_bytes = serde_json::to_vec(&payload).map_err(Error::Serialization)?;
    let original_size = json_bytes.len();

    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(profile.level));
    encoder
        .write_all(&json_bytes)
        .map_err(|e| Error::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| Error::Compression(e.to_string()))?;
    let compressed_size = compressed.len();

    let b64 = base64::engine::general_purpose::STANDARD.encode(&compressed);
    out.binary_ref = Some(b64);
    out.set_header("x-compression", "gzip");
    out.set_header("x-original-size", original_size.to_string());
    out.set_header("x-compressed-size", compressed_size.to_string());
    Ok(out)
}

/// Decompresses `frame.binary_ref` back into `frame.payload` if the frame
/// was gzip-compressed; otherwise returns the frame unchanged.
pub fn decompress(frame: &Frame) -> Result<Frame> {
    let is_gzip = frame.header("x-compression") == Some("gzip");
    if !is_gzip {
        return Ok(frame.clone());
    }
    let mut out = frame.clone();
    let b64 = out
        .binary_ref
        .take()
        .ok_or_else(|| Error::Decompression("missing binary_ref on compressed frame".into()))?;
    let compressed = base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| Error::Decompression(e.to_string()))?;

    let mut decoder = GzDecoder::new(&compressed[..]);
    let mut json_bytes = Vec::new();
    decoder
        .read_to_end(&mut json_bytes)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    let payload: serde_json::Value =
        serde_json::from_slice(&json_bytes).map_err(Error::Serialization)?;

    out.payload = Some(payload);
    if let Some(headers) = out.headers.as_mut() {
        headers.remove("x-compression");
        headers.remove("x-original-size");
        headers.remove("x-compressed-size");
    }
    Ok(out)
}

/// Transport extension tokens advertised on connect, derived from a
/// compression profile.
pub fn transport_extensions(profile: &CompressionProfile) -> Vec<String> {
    let mut exts = Vec::new();
    if profile.ws_permessage_deflate {
        exts.push("permessage-deflate; server_no_context_takeover; client_no_context_takeover".to_string());
    }
    exts
}
