// ABOUTME: MHTML serializer building a multipart/related archive by hand.
// ABOUTME: One quoted-printable HTML part plus one base64 part per downloaded original image.

use std::fmt::Write as _;

use base64::Engine;
use chrono::Local;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::ArchiveError;
use crate::formats::{render_html, FileArtifact, Format, SaveContext};
use crate::images::RewriteMode;

const LINE_LIMIT: usize = 76;
const CRLF: &str = "\r\n";
const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// A downloaded image to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub location: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// `----=_NextPart_` followed by 16 random alphanumerics.
pub fn new_boundary() -> String {
    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("----=_NextPart_{}", token)
}

/// Quoted-printable encoding with CRLF line breaks and soft breaks at 76 columns.
pub fn encode_quoted_printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let normalized = text.replace("\r\n", "\n");
    let mut lines = normalized.split('\n').peekable();

    while let Some(line) = lines.next() {
        let bytes = line.as_bytes();
        let mut width = 0;
        for (i, &b) in bytes.iter().enumerate() {
            let last = i + 1 == bytes.len();
            let literal = match b {
                b'=' => false,
                b' ' | b'\t' => !last,
                33..=126 => true,
                _ => false,
            };
            let token_len = if literal { 1 } else { 3 };
            if width + token_len > LINE_LIMIT - 1 {
                out.push('=');
                out.push_str(CRLF);
                width = 0;
            }
            if literal {
                out.push(b as char);
            } else {
                let _ = write!(out, "={:02X}", b);
            }
            width += token_len;
        }
        if lines.peek().is_some() {
            out.push_str(CRLF);
        }
    }
    out
}

/// Base64 body wrapped at 76 columns.
pub fn encode_base64_lines(bytes: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    encoded
        .as_bytes()
        .chunks(LINE_LIMIT)
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect::<Vec<_>>()
        .join(CRLF)
}

/// Assemble the full multipart/related document.
pub fn build_mhtml(
    subject: &str,
    base_url: &str,
    html: &str,
    images: &[ImagePart],
    boundary: &str,
) -> String {
    let mut out = String::new();
    let _ = write!(out, "From: <Saved by blogkeeper>{CRLF}");
    let _ = write!(out, "Subject: {}{CRLF}", subject.replace(['\r', '\n'], " "));
    let _ = write!(out, "Date: {}{CRLF}", Local::now().to_rfc2822());
    let _ = write!(out, "MIME-Version: 1.0{CRLF}");
    let _ = write!(out, "Content-Type: multipart/related;{CRLF}\ttype=\"text/html\";{CRLF}\tboundary=\"{boundary}\"{CRLF}{CRLF}");

    let _ = write!(out, "--{boundary}{CRLF}");
    let _ = write!(out, "Content-Type: text/html; charset=\"utf-8\"{CRLF}");
    let _ = write!(out, "Content-Transfer-Encoding: quoted-printable{CRLF}");
    let _ = write!(out, "Content-Location: {base_url}{CRLF}{CRLF}");
    out.push_str(&encode_quoted_printable(html));
    out.push_str(CRLF);
    out.push_str(CRLF);

    for image in images {
        let _ = write!(out, "--{boundary}{CRLF}");
        let _ = write!(out, "Content-Type: {}{CRLF}", image.content_type);
        let _ = write!(out, "Content-Transfer-Encoding: base64{CRLF}");
        let _ = write!(out, "Content-Location: {}{CRLF}{CRLF}", image.location);
        out.push_str(&encode_base64_lines(&image.bytes));
        out.push_str(CRLF);
        out.push_str(CRLF);
    }

    let _ = write!(out, "--{boundary}--{CRLF}");
    out
}

pub async fn save(ctx: &SaveContext<'_>) -> Result<FileArtifact, ArchiveError> {
    let outcome = ctx
        .rewriter()
        .rewrite(
            &ctx.article.content_html,
            &ctx.article.base_url,
            &ctx.folder,
            RewriteMode::ResolveOnly,
        )
        .await;
    let html = render_html(ctx.article, &outcome.html);

    let mut images: Vec<ImagePart> = Vec::new();
    for location in &outcome.sources {
        if images.iter().any(|p| &p.location == location) {
            continue;
        }
        match ctx.fetcher.fetch_resource(location, &ctx.article.base_url).await {
            Ok(result) => images.push(ImagePart {
                location: location.clone(),
                content_type: result
                    .content_type
                    .filter(|ct| ct.starts_with("image/"))
                    .unwrap_or_else(|| DEFAULT_IMAGE_TYPE.to_string()),
                bytes: result.body.to_vec(),
            }),
            Err(e) => tracing::warn!(url = %location, error = %e, "Skipping MHTML image"),
        }
    }
    tracing::debug!(images = images.len(), "Packaging MHTML");

    let document = build_mhtml(
        &ctx.article.title,
        &ctx.article.base_url,
        &html,
        &images,
        &new_boundary(),
    );
    ctx.write_artifact(Format::Mhtml, document.as_bytes(), None)
        .await
}
