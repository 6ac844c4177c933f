// ABOUTME: Configuration options for the archiver and the ArchiverBuilder fluent API.
// ABOUTME: Covers HTTP settings, platform registry and config store, stylesheets, PDF rendering and image workers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::archiver::Archiver;
use crate::config::ConfigStore;
use crate::formats::PdfSettings;
use crate::platform::registry::PlatformRegistry;

/// Default cap on concurrent image downloads per article.
pub const DEFAULT_IMAGE_WORKERS: usize = 32;

/// Configuration options for the archiver.
#[derive(Debug, Clone)]
pub struct Options {
    /// Default timeout of the HTTP client; platform requests use the config store's timeout.
    pub timeout: Duration,
    pub user_agent: String,
    pub http_client: Option<reqwest::Client>,
    /// Headers added to every platform request, overriding all other sources.
    pub headers: HashMap<String, String>,
    pub registry: Option<PlatformRegistry>,
    pub config: ConfigStore,
    /// Directory with `base.css` and `<flag>.css` overrides.
    pub stylesheet_dir: Option<PathBuf>,
    pub pdf: PdfSettings,
    pub image_workers: usize,
    /// Download `<link rel="stylesheet">` targets into the article stylesheet.
    pub fetch_stylesheets: bool,
    /// Fill `inline_content` in the manifest for text formats.
    pub inline_content: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "Mozilla/5.0 (compatible; blogkeeper/0.1)".to_string(),
            http_client: None,
            headers: HashMap::new(),
            registry: None,
            config: ConfigStore::default(),
            stylesheet_dir: None,
            pdf: PdfSettings::default(),
            image_workers: DEFAULT_IMAGE_WORKERS,
            fetch_stylesheets: true,
            inline_content: true,
        }
    }
}

/// Builder for constructing Archiver instances with custom configuration.
#[derive(Debug, Clone)]
pub struct ArchiverBuilder {
    opts: Options,
}

impl ArchiverBuilder {
    /// Create a new ArchiverBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
        }
    }

    /// Set the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent used when the config store lists none.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Add a custom header to all platform requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Use a custom platform registry instead of the built-in table.
    pub fn registry(mut self, registry: PlatformRegistry) -> Self {
        self.opts.registry = Some(registry);
        self
    }

    /// Set the platform configuration store.
    pub fn config(mut self, config: ConfigStore) -> Self {
        self.opts.config = config;
        self
    }

    pub fn stylesheet_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.stylesheet_dir = Some(dir.into());
        self
    }

    /// Use this renderer binary for PDF output.
    pub fn pdf_renderer(mut self, path: impl Into<PathBuf>) -> Self {
        self.opts.pdf.renderer = Some(path.into());
        self
    }

    /// Milliseconds the PDF renderer waits for page scripts.
    pub fn pdf_delay(mut self, delay: Duration) -> Self {
        self.opts.pdf.javascript_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Cap concurrent image downloads (at least one).
    pub fn image_workers(mut self, workers: usize) -> Self {
        self.opts.image_workers = workers.max(1);
        self
    }

    pub fn fetch_stylesheets(mut self, fetch: bool) -> Self {
        self.opts.fetch_stylesheets = fetch;
        self
    }

    pub fn inline_content(mut self, inline: bool) -> Self {
        self.opts.inline_content = inline;
        self
    }

    /// Build the Archiver with the configured options.
    pub fn build(self) -> Archiver {
        Archiver::new(self.opts)
    }
}

impl Default for ArchiverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
