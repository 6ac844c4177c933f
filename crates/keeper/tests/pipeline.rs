// ABOUTME: End-to-end archive tests against a local mock server.
// ABOUTME: Routes 127.0.0.1 to built-in platforms and checks manifests and files on disk.

use std::fs;
use std::io::Cursor;
use std::path::Path;

use blogkeeper::{load_builtin_registry, Archiver, ConfigStore, Format};
use httpmock::prelude::*;
use image::{DynamicImage, ImageFormat};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const ARTICLE_PATH: &str = "/x/article/details/1";

fn csdn_page(content: &str) -> String {
    format!(
        r#"<!DOCTYPE html><html><head>
        <meta charset="utf-8">
        <link rel="stylesheet" href="/static/site.css">
        <style>.hljs{{visibility: hidden}}</style>
        </head><body>
        <div class="article-title-box"><h1 class="title-article" id="articleContentId">Rust 异步编程</h1></div>
        <div class="bar-content"><a class="follow-nickName" href="/u">李四</a><span class="time">2023-09-10 20:15:00</span></div>
        {}
        </body></html>"#,
        content
    )
}

fn png_bytes() -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::new_rgb8(3, 3)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

fn archiver_for(flag: &str) -> Archiver {
    let mut registry = load_builtin_registry();
    assert!(registry.alias("127.0.0.1", flag), "{} is a built-in platform", flag);
    let config = ConfigStore::from_json_str(r#"{"common": {"retry_times": 2, "retry_delay_ms": 1}}"#)
        .unwrap();
    Archiver::builder()
        .registry(registry)
        .config(config)
        .pdf_renderer("/nonexistent/bin/wkhtmltopdf")
        .build()
}

fn files_under(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|e| {
                    if e.path().is_dir() {
                        files_under(&e.path())
                    } else {
                        1
                    }
                })
                .sum()
        })
        .unwrap_or(0)
}

#[tokio::test]
async fn csdn_article_saves_html() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path(ARTICLE_PATH);
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(csdn_page(r#"<div id="article_content"><p>异步运行时。</p></div>"#));
    });
    let css = server.mock(|when, then| {
        when.method(GET).path("/static/site.css");
        then.status(200)
            .header("content-type", "text/css")
            .body("body{color:#333}");
    });

    let out = TempDir::new().unwrap();
    let manifest = archiver_for("CSDN")
        .archive(&server.url(ARTICLE_PATH), out.path(), &[Format::Html])
        .await
        .expect("archive should succeed");
    page.assert();
    css.assert();

    assert_eq!(manifest.len(), 1);
    let artifact = &manifest.artifacts()[0];
    assert_eq!(artifact.format, "html");
    assert_eq!(artifact.title, "Rust异步编程-李四-CSDN-2023-09-10");
    let expected = out
        .path()
        .join("CSDN-李四")
        .join("Rust异步编程-李四-CSDN-2023-09-10.html");
    assert_eq!(Path::new(&artifact.download_path), expected);
    assert!(artifact.size_bytes > 0);
    assert_eq!(fs::metadata(&expected).unwrap().len(), artifact.size_bytes);

    let html = fs::read_to_string(&expected).unwrap();
    assert!(html.contains("<p>异步运行时。</p>"), "got: {}", html);
    assert!(html.contains(".hljs{visibility: visible}"), "got: {}", html);
    assert!(html.contains("body{color:#333}"), "got: {}", html);
    assert_eq!(artifact.inline_content, html);
}

#[tokio::test]
async fn unknown_domain_is_unsupported() {
    let out = TempDir::new().unwrap();
    let err = Archiver::builder()
        .build()
        .archive("https://unknown.example.com/post/1", out.path(), &[Format::Html])
        .await
        .unwrap_err();
    assert!(err.is_unsupported_platform());
    assert_eq!(err.domain.as_deref(), Some("unknown.example.com"));
    assert!(err.supported_platforms.iter().any(|n| n == "CSDN"));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn missing_content_fails_without_writing_files() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(ARTICLE_PATH);
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(csdn_page(r#"<div class="comments">no article body here</div>"#));
    });

    let out = TempDir::new().unwrap();
    let err = archiver_for("CSDN")
        .archive(&server.url(ARTICLE_PATH), out.path(), &[Format::Html, Format::Markdown])
        .await
        .unwrap_err();
    assert!(err.is_parse(), "expected parse error, got: {}", err);
    assert_eq!(files_under(out.path()), 0);
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn missing_pdf_renderer_keeps_other_formats() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(ARTICLE_PATH);
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(csdn_page(r#"<div id="article_content"><p>正文</p></div>"#));
    });
    server.mock(|when, then| {
        when.method(GET).path("/static/site.css");
        then.status(404);
    });

    let out = TempDir::new().unwrap();
    let manifest = archiver_for("CSDN")
        .archive(&server.url(ARTICLE_PATH), out.path(), &[Format::Html, Format::Pdf])
        .await
        .expect("html alone is enough");
    let labels: Vec<&str> = manifest.iter().map(|a| a.format.as_str()).collect();
    assert_eq!(labels, vec!["html"]);
}

#[tokio::test]
async fn every_format_with_images() {
    let server = MockServer::start();
    let png = png_bytes();
    let webp_body = png.clone();
    // The decoder sniffs content, so PNG bytes behind a .webp name still transcode.
    let webp = server.mock(move |when, then| {
        when.method(GET).path("/img/cover.webp");
        then.status(200).header("content-type", "image/webp").body(webp_body);
    });
    let jpeg = server.mock(move |when, then| {
        when.method(GET).path("/img/photo.jpg");
        then.status(200).header("content-type", "image/jpeg").body(png);
    });
    server.mock(|when, then| {
        when.method(GET).path("/static/site.css");
        then.status(200).body("p{margin:0}");
    });
    let content = r#"<div id="article_content">
        <p>图片如下</p>
        <img data-src="/img/cover.webp" alt="cover">
        <img src="/img/photo.jpg" alt="photo">
    </div>"#;
    server.mock(|when, then| {
        when.method(GET).path(ARTICLE_PATH);
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(csdn_page(content));
    });

    let out = TempDir::new().unwrap();
    let manifest = archiver_for("CSDN")
        .archive(
            &server.url(ARTICLE_PATH),
            out.path(),
            &[Format::Html, Format::Markdown, Format::Mhtml],
        )
        .await
        .unwrap();
    assert_eq!(manifest.len(), 3);

    let folder = out.path().join("CSDN-李四");
    let images: Vec<_> = fs::read_dir(folder.join("images"))
        .unwrap()
        .filter_map(Result::ok)
        .collect();
    assert!(!images.is_empty());
    assert!(images
        .iter()
        .all(|e| e.file_name().to_string_lossy().starts_with("img_")));

    let md = &manifest.get("md").unwrap().inline_content;
    assert!(md.starts_with("# Rust 异步编程\n\n"), "got: {}", md);
    assert!(md.contains("](images/img_"), "got: {}", md);
    assert!(md.contains(&server.url("/img/photo.jpg")), "got: {}", md);

    let mhtml_path = &manifest.get("mhtml").unwrap().download_path;
    let mhtml = fs::read_to_string(mhtml_path).unwrap();
    assert!(mhtml.contains(&format!("Content-Location: {}\r\n", server.url("/img/cover.webp"))));
    assert!(mhtml.contains(&format!("Content-Location: {}\r\n", server.url("/img/photo.jpg"))));
    assert!(mhtml.trim_end().ends_with("--"));
    assert!(webp.hits() >= 2, "html/md localize and mhtml re-fetch");
    jpeg.assert_hits(1);
}

#[tokio::test]
async fn failing_fetch_is_a_network_error_after_retries() {
    let server = MockServer::start();
    let page = server.mock(|when, then| {
        when.method(GET).path(ARTICLE_PATH);
        then.status(502);
    });

    let out = TempDir::new().unwrap();
    let err = archiver_for("CSDN")
        .archive(&server.url(ARTICLE_PATH), out.path(), &[Format::Html])
        .await
        .unwrap_err();
    assert!(err.is_network());
    page.assert_hits(2);
    assert_eq!(fs::read_dir(out.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn api_platform_archives_from_json() {
    let server = MockServer::start();
    let api = server.mock(|when, then| {
        when.method(GET).path("/api/articles/42");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({
                "title": "知乎专栏文章",
                "author": {"name": "王五"},
                "content": "<p>来自接口的正文</p>",
                "created": 1_700_000_000_000i64
            }));
    });

    let mut registry = load_builtin_registry();
    assert!(registry.alias("127.0.0.1", "zhihu"));
    let config = ConfigStore::from_json_str(&format!(
        r#"{{"zhihu": {{"endpoints": {{"web_api": "{}"}}}}}}"#,
        server.url("/api/articles/{article_id}")
    ))
    .unwrap();
    let archiver = Archiver::builder().registry(registry).config(config).build();

    let out = TempDir::new().unwrap();
    let manifest = archiver
        .archive(&server.url("/p/42"), out.path(), &[Format::Markdown])
        .await
        .unwrap();
    api.assert();
    let md = &manifest.get("md").unwrap();
    assert!(md.inline_content.starts_with("# 知乎专栏文章\n\n"), "got: {}", md.inline_content);
    assert!(md.inline_content.contains("来自接口的正文"));
    assert!(md.download_path.contains("知乎-王五"), "got: {}", md.download_path);
}

#[tokio::test]
async fn inline_content_can_be_disabled() {
    let out = TempDir::new().unwrap();
    let manifest = Archiver::builder()
        .inline_content(false)
        .fetch_stylesheets(false)
        .build()
        .archive_html(
            &csdn_page(r#"<div id="article_content"><p>x</p></div>"#),
            "https://blog.csdn.net/x/article/details/1",
            out.path(),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(manifest.len(), 1);
    assert_eq!(manifest.artifacts()[0].format, "html");
    assert_eq!(manifest.artifacts()[0].inline_content, "");
}
