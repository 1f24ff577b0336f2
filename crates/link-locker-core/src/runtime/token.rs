// crates/link-locker-core/src/runtime/token.rs
// ============================================================================
// Module: Link Locker Webhook Tokens
// Description: Opaque per-publisher webhook tokens.
// Purpose: Encode (task, publisher) into the webhook URL path.
// Dependencies: base64
// ============================================================================

//! ## Overview
//! A token is the unpadded URL-safe base64 of `"{task_id}:{publisher_id}"`.
//! Tokens identify; they do not authenticate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use thiserror::Error;

use crate::core::PublisherId;
use crate::core::TaskId;

// ============================================================================
// SECTION: Tokens
// ============================================================================

/// Separator between the task and publisher identifiers.
const TOKEN_SEPARATOR: char = ':';

/// Webhook token errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// Token is not unpadded URL-safe base64.
    #[error("webhook token is not valid base64")]
    Encoding,
    /// Decoded token is not UTF-8.
    #[error("webhook token is not utf-8")]
    Utf8,
    /// Decoded token lacks a task or publisher.
    #[error("webhook token is malformed")]
    Malformed,
}

/// Decoded webhook token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookToken {
    /// Converted task.
    pub task_id: TaskId,
    /// Credited publisher.
    pub publisher_id: PublisherId,
}

impl WebhookToken {
    /// Builds a token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Malformed`] when either identifier is empty or
    /// the task identifier contains `:`.
    pub fn new(task_id: TaskId, publisher_id: PublisherId) -> Result<Self, TokenError> {
        if task_id.as_str().is_empty()
            || publisher_id.as_str().is_empty()
            || task_id.as_str().contains(TOKEN_SEPARATOR)
        {
            return Err(TokenError::Malformed);
        }
        Ok(Self {
            task_id,
            publisher_id,
        })
    }

    /// Encodes the token.
    #[must_use]
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}{TOKEN_SEPARATOR}{}", self.task_id, self.publisher_id))
    }

    /// Returns the webhook path for this token.
    #[must_use]
    pub fn path(&self) -> String {
        format!("/tasks/webhooks/{}", self.encode())
    }

    /// Decodes a token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when the token cannot be decoded.
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        let bytes = URL_SAFE_NO_PAD.decode(token.trim()).map_err(|_| TokenError::Encoding)?;
        let text = String::from_utf8(bytes).map_err(|_| TokenError::Utf8)?;
        let (task, publisher) = text.split_once(TOKEN_SEPARATOR).ok_or(TokenError::Malformed)?;
        Self::new(TaskId::new(task), PublisherId::new(publisher))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
