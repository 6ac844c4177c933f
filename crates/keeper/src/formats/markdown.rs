// ABOUTME: Markdown serializer: localized content converted with htmd under a level-one title heading.
// ABOUTME: Inline content is the full Markdown text.

use crate::error::ArchiveError;
use crate::formats::{html_to_markdown, FileArtifact, Format, SaveContext};

/// `# <title>` followed by the converted body.
pub fn render_markdown(title: &str, content_html: &str) -> String {
    format!("# {}\n\n{}", title, html_to_markdown(content_html).trim())
}

pub async fn save(ctx: &SaveContext<'_>) -> Result<FileArtifact, ArchiveError> {
    let content = ctx.localized_content().await;
    let md = render_markdown(&ctx.article.title, &content);
    ctx.write_artifact(Format::Markdown, md.as_bytes(), Some(md.clone()))
        .await
}
