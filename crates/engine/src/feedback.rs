//! Feedback links and the return context they carry.
//!
//! A form with `feedback.url` set links every page to a feedback form.
//! The link carries the form title, page title and current URL, encoded
//! as base64 JSON in the `f_t` query parameter, so the feedback form can
//! show which form the feedback is about.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Query parameter holding the encoded return context.
pub const FEEDBACK_PARAMETER: &str = "f_t";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackContext {
    pub form_title: String,
    pub page_title: String,
    pub return_url: String,
}

impl FeedbackContext {
    pub fn encode(&self) -> String {
        // Serializing a struct of strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode a context; anything malformed yields `None`.
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded.trim()).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Append this context to a feedback URL.
    pub fn link(&self, feedback_url: &str) -> String {
        let separator = if feedback_url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}{}={}",
            feedback_url,
            separator,
            FEEDBACK_PARAMETER,
            urlencoding::encode(&self.encode())
        )
    }
}
