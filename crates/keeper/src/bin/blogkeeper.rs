// ABOUTME: CLI binary for the blogkeeper article archiver.
// ABOUTME: Archives one article URL into the requested formats and prints the resulting manifest.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use blogkeeper::{Archiver, ConfigStore, Format, Manifest};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "blogkeeper")]
#[command(about = "Archive a blog article as HTML, Markdown, PDF or MHTML")]
struct Args {
    /// Article URL
    url: String,

    /// Save as HTML (the default when no format is given)
    #[arg(long)]
    html: bool,

    /// Save as PDF (needs wkhtmltopdf)
    #[arg(long)]
    pdf: bool,

    /// Save as Markdown
    #[arg(long = "md", visible_alias = "markdown")]
    markdown: bool,

    /// Save as MHTML
    #[arg(long)]
    mhtml: bool,

    /// Output directory
    #[arg(short = 'o', long = "output", default_value = "blog")]
    output: PathBuf,

    /// Platform configuration file (headers, cookies, endpoints, retries)
    #[arg(long, env = "BLOGKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Print the manifest as JSON
    #[arg(long)]
    json: bool,

    /// Path to the wkhtmltopdf binary
    #[arg(long = "pdf-renderer")]
    pdf_renderer: Option<PathBuf>,
}

impl Args {
    fn formats(&self) -> Vec<Format> {
        [
            (self.html, Format::Html),
            (self.markdown, Format::Markdown),
            (self.pdf, Format::Pdf),
            (self.mhtml, Format::Mhtml),
        ]
        .into_iter()
        .filter_map(|(on, format)| on.then_some(format))
        .collect()
    }
}

fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "blogkeeper=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_manifest(manifest: &Manifest, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", manifest.to_json()?);
    } else {
        for artifact in manifest.iter() {
            println!(
                "{}\t{} bytes\t{}",
                artifact.format, artifact.size_bytes, artifact.download_path
            );
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match ConfigStore::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("error: {:#}", e);
                return ExitCode::from(1);
            }
        },
        None => ConfigStore::default(),
    };

    let mut builder = Archiver::builder().config(config).inline_content(false);
    if let Some(renderer) = &args.pdf_renderer {
        builder = builder.pdf_renderer(renderer);
    }
    let archiver = builder.build();

    let start = Instant::now();
    match archiver.archive(&args.url, &args.output, &args.formats()).await {
        Ok(manifest) => {
            tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "Archive finished");
            if let Err(e) = print_manifest(&manifest, args.json) {
                eprintln!("error: {}", e);
                return ExitCode::from(1);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            eprintln!("suggestion: {}", e.suggestion());
            ExitCode::from(1)
        }
    }
}
