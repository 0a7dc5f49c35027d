// src/probe.rs
use log::debug;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::server::{EndpointDescriptor, ServerStatus};
use crate::utils::display_map_name;

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a probe fell back to the offline status.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("failed to read body: {0}")]
    Body(#[source] reqwest::Error),
    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotObject,
}

/// Body of a server's `/info` endpoint. Only the fields we display are kept.
#[derive(Debug, Deserialize)]
struct InfoPayload {
    #[serde(default)]
    clients: u32,
    #[serde(default)]
    maxclients: u32,
    #[serde(default)]
    track: Option<String>,
}

/// Fetches one endpoint's status. Every failure collapses to the offline
/// status; this never returns an error.
pub async fn probe(
    descriptor: Arc<EndpointDescriptor>,
    client: &Client,
    timeout: Duration,
) -> ServerStatus {
    match try_probe(&descriptor, client, timeout).await {
        Ok(info) => ServerStatus::online(
            descriptor,
            display_map_name(info.track.as_deref()),
            info.clients,
            info.maxclients,
        ),
        Err(e) => {
            debug!(
                "Probe of {} ({}:{}) failed: {}",
                descriptor.name, descriptor.address, descriptor.port, e
            );
            ServerStatus::offline(descriptor)
        }
    }
}

async fn try_probe(
    descriptor: &EndpointDescriptor,
    client: &Client,
    timeout: Duration,
) -> Result<InfoPayload, ProbeError> {
    let fetch = async {
        let response = client
            .get(descriptor.info_url())
            .send()
            .await
            .map_err(ProbeError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status));
        }

        response.bytes().await.map_err(ProbeError::Body)
    };

    let body = tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| ProbeError::Timeout(timeout))??;

    // Derived structs also accept sequences, so the shape is checked first.
    let value: serde_json::Value = serde_json::from_slice(&body)?;
    if !value.is_object() {
        return Err(ProbeError::NotObject);
    }
    Ok(serde_json::from_value(value)?)
}
