//! Image command handlers: generate an image for review, then pin a chosen
//! image so it can be minted with `submit_mint`.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use molt_pipeline::Stage;
use molt_types::time::iso_datetime;
use serde_json::Value;
use tracing::{info, warn};

use super::agents::Caller;
use super::{optional_str, pipeline_error, required_str};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Largest decoded image `upload_image` accepts.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Accepts raw base64 or a `data:<mime>;base64,` URL.
fn decode_image(encoded: &str) -> std::result::Result<Vec<u8>, RpcError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    // Reject oversized payloads before decoding.
    if payload.len() / 4 * 3 > MAX_UPLOAD_BYTES + 3 {
        return Err(too_large());
    }
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| RpcError::invalid_params(&format!("imageBase64 is not valid base64: {e}")))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(too_large());
    }
    Ok(bytes)
}

fn too_large() -> RpcError {
    RpcError::invalid_params(&format!("image exceeds {MAX_UPLOAD_BYTES} bytes"))
}

/// Generate an image without pinning or minting it.
pub async fn generate_image(state: &Arc<DaemonState>, caller: &Caller, params: &Value) -> Result {
    let mood = required_str(params, "mood")?;
    let image = state
        .orchestrator
        .generate_image(
            &caller.agent_id,
            mood,
            optional_str(params, "context"),
            optional_str(params, "style"),
        )
        .await
        .map_err(|e| {
            warn!(agent = %caller.handle, error = %e, "image generation failed");
            pipeline_error(&e, Stage::Checked)
        })?;

    info!(agent = %caller.handle, provider = %image.provider, "image generated for review");
    Ok(serde_json::json!({
        "image": {
            "base64": STANDARD.encode(&image.bytes),
            "mimeType": image.mime_type,
        },
        "provider": image.provider,
        "prompt": image.prompt,
        "mood": mood,
        "generatedAt": iso_datetime(state.clock.now()),
    }))
}

/// Pin an image and its metadata document.
pub async fn upload_image(state: &Arc<DaemonState>, caller: &Caller, params: &Value) -> Result {
    let bytes = decode_image(required_str(params, "imageBase64")?)?;
    let published = state
        .orchestrator
        .publish_artifacts(
            &caller.agent_id,
            &bytes,
            optional_str(params, "mood"),
            optional_str(params, "prompt"),
        )
        .await
        .map_err(|e| {
            warn!(agent = %caller.handle, error = %e, "image upload failed");
            pipeline_error(&e, Stage::Generated)
        })?;

    let gateway = &state.config.content.gateway;
    info!(agent = %caller.handle, metadata = %published.metadata_cid, "image pinned");
    Ok(serde_json::json!({
        "imageUri": published.image_cid.uri(),
        "imageGateway": published.image_cid.gateway_url(gateway),
        "metadataUri": published.metadata_cid.uri(),
        "metadataGateway": published.metadata_cid.gateway_url(gateway),
        "ipfsHashes": {
            "image": published.image_cid.as_str(),
            "metadata": published.metadata_cid.as_str(),
        },
    }))
}
