//! Params of the notifications that are not tied to a single feature.

use serde::{Deserialize, Serialize};

use crate::meta::Meta;
use crate::protocol::{ProgressToken, RequestId};

/// Params of `notifications/cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledParams {
    /// Notification metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// Id of the request being cancelled.
    pub request_id: RequestId,
    /// Optional human-readable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CancelledParams {
    /// Create params cancelling `request_id`.
    #[must_use]
    pub fn new(request_id: RequestId, reason: Option<String>) -> Self {
        Self {
            meta: Meta::default(),
            request_id,
            reason,
        }
    }
}

/// Params of `notifications/progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressParams {
    /// Notification metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
    /// Token taken from the originating request's `_meta`.
    pub progress_token: ProgressToken,
    /// Progress so far.
    pub progress: f64,
    /// Total amount of work, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
}

impl ProgressParams {
    /// Create progress params.
    #[must_use]
    pub fn new(progress_token: ProgressToken, progress: f64, total: Option<f64>) -> Self {
        Self {
            meta: Meta::default(),
            progress_token,
            progress,
            total,
        }
    }
}

/// Params of every `notifications/*/list_changed` notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListChangedParams {
    /// Notification metadata.
    #[serde(rename = "_meta", default, skip_serializing_if = "Meta::is_empty")]
    pub meta: Meta,
}
