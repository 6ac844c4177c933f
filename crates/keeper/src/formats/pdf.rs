// ABOUTME: PDF serializer driving an external wkhtmltopdf renderer.
// ABOUTME: Renders from a temp file first, then retries once from stdin before giving up.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{anyhow, Context};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ArchiveError;
use crate::formats::{render_html, FileArtifact, Format, SaveContext};

const RENDERER_NAME: &str = "wkhtmltopdf";

/// Renderer location and settle delay.
#[derive(Debug, Clone)]
pub struct PdfSettings {
    /// Explicit renderer binary; when set it must exist.
    pub renderer: Option<PathBuf>,
    /// Milliseconds the renderer waits for page scripts.
    pub javascript_delay_ms: u64,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self {
            renderer: None,
            javascript_delay_ms: 1000,
        }
    }
}

/// Locate the renderer binary.
pub fn find_renderer(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }

    let mut candidates = Vec::new();
    if cfg!(windows) {
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join("tools").join("wkhtmltopdf").join("bin").join("wkhtmltopdf.exe"));
        }
    } else {
        candidates.push(PathBuf::from("/usr/local/bin").join(RENDERER_NAME));
        candidates.push(PathBuf::from("/usr/bin").join(RENDERER_NAME));
    }
    if let Some(paths) = std::env::var_os("PATH") {
        let exe = if cfg!(windows) {
            format!("{}.exe", RENDERER_NAME)
        } else {
            RENDERER_NAME.to_string()
        };
        candidates.extend(std::env::split_paths(&paths).map(|dir| dir.join(&exe)));
    }
    candidates.into_iter().find(|p| p.is_file())
}

fn base_args(delay_ms: u64) -> Vec<String> {
    vec![
        "--enable-local-file-access".to_string(),
        "--encoding".to_string(),
        "utf-8".to_string(),
        "--javascript-delay".to_string(),
        delay_ms.to_string(),
        "--no-stop-slow-scripts".to_string(),
        "--enable-javascript".to_string(),
    ]
}

async fn render_from_file(
    renderer: &Path,
    delay_ms: u64,
    input: &Path,
    output: &Path,
) -> anyhow::Result<()> {
    let out = Command::new(renderer)
        .args(base_args(delay_ms))
        .arg(input)
        .arg(output)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("spawn {}", renderer.display()))?;
    if !out.status.success() {
        return Err(anyhow!(
            "renderer exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(())
}

async fn render_from_stdin(
    renderer: &Path,
    delay_ms: u64,
    html: &str,
    output: &Path,
) -> anyhow::Result<()> {
    let mut child = Command::new(renderer)
        .args(base_args(delay_ms))
        .arg("-")
        .arg(output)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {}", renderer.display()))?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(html.as_bytes()).await.context("write renderer stdin")?;
    }
    let out = child.wait_with_output().await.context("wait for renderer")?;
    if !out.status.success() {
        return Err(anyhow!(
            "renderer exited with {}: {}",
            out.status,
            String::from_utf8_lossy(&out.stderr).trim()
        ));
    }
    Ok(())
}

pub async fn save(ctx: &SaveContext<'_>) -> Result<FileArtifact, ArchiveError> {
    let renderer = find_renderer(ctx.pdf.renderer.as_deref()).ok_or_else(|| {
        ctx.error(Format::Pdf, anyhow!("{} not found", RENDERER_NAME))
    })?;

    let content = ctx.localized_content().await;
    let html = render_html(ctx.article, &content);
    let output = ctx.path_for(Format::Pdf);
    let temp = ctx.folder.join(format!("{}_temp.html", ctx.stem));
    let delay = ctx.pdf.javascript_delay_ms;

    let first = match tokio::fs::write(&temp, html.as_bytes()).await {
        Ok(()) => render_from_file(&renderer, delay, &temp, &output).await,
        Err(e) => Err(anyhow!("write {}: {}", temp.display(), e)),
    };
    let rendered = match first {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!(error = %e, "PDF render from file failed, retrying from memory");
            render_from_stdin(&renderer, delay, &html, &output).await
        }
    };
    if let Err(e) = tokio::fs::remove_file(&temp).await {
        tracing::debug!(path = %temp.display(), error = %e, "Temp file not removed");
    }

    if let Err(e) = rendered {
        if tokio::fs::try_exists(&output).await.unwrap_or(false) {
            if let Err(rm) = tokio::fs::remove_file(&output).await {
                tracing::warn!(path = %output.display(), error = %rm, "Partial PDF not removed");
            }
        }
        return Err(ctx.error(Format::Pdf, e));
    }
    ctx.artifact(Format::Pdf, &output, None).await
}
