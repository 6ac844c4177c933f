// ABOUTME: Standalone HTML serializer: localized images wrapped in the article page template.
// ABOUTME: Inline content is the full rendered page.

use crate::error::ArchiveError;
use crate::formats::{render_html, FileArtifact, Format, SaveContext};

pub async fn save(ctx: &SaveContext<'_>) -> Result<FileArtifact, ArchiveError> {
    let content = ctx.localized_content().await;
    let page = render_html(ctx.article, &content);
    ctx.write_artifact(Format::Html, page.as_bytes(), Some(page.clone()))
        .await
}
