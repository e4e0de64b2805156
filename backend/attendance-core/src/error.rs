// src/error.rs

use thiserror::Error;

// --- Sheet Error Type ---
// Clone is required: one failed in-flight request is handed to every caller
// that joined it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SheetError {
    #[error("Sheet API endpoint is not configured (set SHEET_API_URL)")]
    NotConfigured,

    #[error("Sheet API returned HTTP {status} for {url}")]
    Http { status: u16, url: String },

    // Most of these come from a wrong deployment URL or a deployment that
    // does not allow anonymous access
    #[error(
        "Network request failed: {message}. Check that SHEET_API_URL is the deployed web-app URL \
         (ending in /exec), that the deployment is accessible to anyone, and reload the environment \
         after changing it (URL: {url})"
    )]
    Network { url: String, message: String },

    // The remote answered, but its payload reported a failure
    #[error("{0}")]
    Application(String),

    #[error("Failed to decode {context}: {message}")]
    Decode { context: String, message: String },

    #[error("Session storage error ({context}): {message}")]
    Storage { context: String, message: String },
}

impl SheetError {
    pub fn application<S: Into<String>>(message: Option<S>) -> Self {
        match message.map(Into::into) {
            Some(msg) if !msg.trim().is_empty() => SheetError::Application(msg),
            _ => SheetError::Application(GENERIC_REMOTE_FAILURE.to_string()),
        }
    }

    pub fn decode<C: Into<String>>(context: C, source: impl std::fmt::Display) -> Self {
        SheetError::Decode {
            context: context.into(),
            message: source.to_string(),
        }
    }

    pub fn storage<C: Into<String>>(context: C, source: impl std::fmt::Display) -> Self {
        SheetError::Storage {
            context: context.into(),
            message: source.to_string(),
        }
    }
}

pub const GENERIC_REMOTE_FAILURE: &str = "Sheet API reported a failure without a message";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_error_falls_back_to_generic_message() {
        assert_eq!(
            SheetError::application(None::<String>),
            SheetError::Application(GENERIC_REMOTE_FAILURE.to_string())
        );
        assert_eq!(
            SheetError::application(Some("  ")),
            SheetError::Application(GENERIC_REMOTE_FAILURE.to_string())
        );
        assert_eq!(
            SheetError::application(Some("找不到倉別")).to_string(),
            "找不到倉別"
        );
    }

    #[test]
    fn network_error_mentions_url_and_hint() {
        let err = SheetError::Network {
            url: "https://script.example.com/exec?action=sheets".to_string(),
            message: "connection refused".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("connection refused"));
        assert!(text.contains("https://script.example.com/exec?action=sheets"));
        assert!(text.contains("/exec"));
    }
}
