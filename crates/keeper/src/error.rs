// ABOUTME: Error types for the archiver including the ErrorCode enum and ArchiveError struct.
// ABOUTME: Carries the pipeline stage, request URL, a user-facing suggestion and an HTTP status hint.

use std::fmt;

/// Error codes for the failures the pipeline surfaces to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidUrl,
    Network,
    UnsupportedPlatform,
    Parse,
    Format,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Network => "network error",
            ErrorCode::UnsupportedPlatform => "unsupported platform",
            ErrorCode::Parse => "parse error",
            ErrorCode::Format => "format error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for archive operations.
#[derive(Debug, thiserror::Error)]
pub struct ArchiveError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    /// Host that failed to resolve to a platform.
    pub domain: Option<String>,
    /// Display names of every registered platform, set for `UnsupportedPlatform`.
    pub supported_platforms: Vec<String>,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blogkeeper: {} {}: {}", self.op, self.url, self.code)?;
        if let Some(ref domain) = self.domain {
            write!(f, " {}", domain)?;
            if !self.supported_platforms.is_empty() {
                write!(f, " (supported: {})", self.supported_platforms.join(", "))?;
            }
        }
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl ArchiveError {
    fn with_code(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            domain: None,
            supported_platforms: Vec::new(),
            source,
        }
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Network error.
    pub fn network(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Network, url, op, source)
    }

    /// Create an UnsupportedPlatform error naming the host and the platforms that are registered.
    pub fn unsupported_platform(
        url: impl Into<String>,
        domain: impl Into<String>,
        supported_platforms: Vec<String>,
    ) -> Self {
        Self {
            code: ErrorCode::UnsupportedPlatform,
            url: url.into(),
            op: "Resolve".to_string(),
            domain: Some(domain.into()),
            supported_platforms,
            source: None,
        }
    }

    /// Create a Parse error.
    pub fn parse(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Parse, url, op, source)
    }

    /// Create a Format error.
    pub fn format(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::with_code(ErrorCode::Format, url, op, source)
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    /// Returns true if this is a Network error.
    pub fn is_network(&self) -> bool {
        self.code == ErrorCode::Network
    }

    /// Returns true if this is an UnsupportedPlatform error.
    pub fn is_unsupported_platform(&self) -> bool {
        self.code == ErrorCode::UnsupportedPlatform
    }

    /// Returns true if this is a Parse error.
    pub fn is_parse(&self) -> bool {
        self.code == ErrorCode::Parse
    }

    /// Returns true if this is a Format error.
    pub fn is_format(&self) -> bool {
        self.code == ErrorCode::Format
    }

    /// Human-readable hint for the person who submitted the URL.
    pub fn suggestion(&self) -> String {
        match self.code {
            ErrorCode::InvalidUrl => "Check that the link is a complete http(s) address.".to_string(),
            ErrorCode::Network => {
                "Check the network connection or try again later.".to_string()
            }
            ErrorCode::UnsupportedPlatform => {
                if self.supported_platforms.is_empty() {
                    "This site is not supported.".to_string()
                } else {
                    format!(
                        "This site is not supported. Supported platforms: {}",
                        self.supported_platforms.join(", ")
                    )
                }
            }
            ErrorCode::Parse => {
                "Check whether the link requires login or access permission.".to_string()
            }
            ErrorCode::Format => "Supported formats: HTML, Markdown, PDF, MHTML.".to_string(),
        }
    }

    /// HTTP status a serving layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self.code {
            ErrorCode::InvalidUrl | ErrorCode::UnsupportedPlatform => 400,
            ErrorCode::Network => 503,
            ErrorCode::Parse | ErrorCode::Format => 422,
        }
    }
}
