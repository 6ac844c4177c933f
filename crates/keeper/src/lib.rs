// ABOUTME: Main library entry point for blogkeeper, a blog article archiver.
// ABOUTME: Re-exports the public API: Archiver, ArchiverBuilder, Options, Format, Manifest, ArchiveError.

//! blogkeeper - archive blog articles from supported platforms into local files.
//!
//! A URL is routed to a platform strategy by its host, the page (or the
//! platform's JSON API) is fetched, title/author/date/content are pulled out
//! with the platform's selector table, and the article is written as HTML,
//! Markdown, PDF and/or MHTML. Every run returns a [`Manifest`] describing the
//! files it wrote.
//!
//! # Example
//!
//! ```no_run
//! use blogkeeper::{ArchiveError, Archiver, Format};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ArchiveError> {
//!     let archiver = Archiver::builder().build();
//!     let manifest = archiver
//!         .archive(
//!             "https://blog.csdn.net/someone/article/details/1",
//!             "blog",
//!             &[Format::Html, Format::Markdown],
//!         )
//!         .await?;
//!     for artifact in manifest.iter() {
//!         println!("{} {}", artifact.format, artifact.download_path);
//!     }
//!     Ok(())
//! }
//! ```

pub mod archiver;
pub mod article;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod images;
pub mod options;
pub mod platform;

pub use crate::archiver::{output_key, Archiver, Stage};
pub use crate::article::Article;
pub use crate::config::ConfigStore;
pub use crate::error::{ArchiveError, ErrorCode};
pub use crate::formats::{parse_formats, FileArtifact, Format, Manifest};
pub use crate::options::{ArchiverBuilder, Options};
pub use crate::platform::loader::load_builtin_registry;
pub use crate::platform::registry::PlatformRegistry;
pub use crate::platform::{PlatformSpec, PlatformStrategy, SelectorRule, SelectorTable};

/// Result alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
