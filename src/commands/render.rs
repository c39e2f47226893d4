//! # Render Command Implementation
//!
//! Renders overlay directories from the local disk and prints the result as a
//! multi-document YAML stream.
//!
//! Sources come from positional paths, from a render file given with
//! `--config`, or both (file sources first). Flags given on the command line
//! override the settings of the render file.
//!
//! ```bash
//! overlay-render render overlays/prod --set replicas=3 --source-annotations
//! overlay-render render --config render.yaml --warnings fail --output out.yaml
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use log::info;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use overlay_render::builder::LoadRestrictions;
use overlay_render::config::{self, WarningPolicy};
use overlay_render::{Document, RenderContext, Renderer, RendererOptions, Source};

/// Load restriction modes accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LoadRestrictionsArg {
    RootOnly,
    None,
}

impl From<LoadRestrictionsArg> for LoadRestrictions {
    fn from(arg: LoadRestrictionsArg) -> Self {
        match arg {
            LoadRestrictionsArg::RootOnly => LoadRestrictions::RootOnly,
            LoadRestrictionsArg::None => LoadRestrictions::Unrestricted,
        }
    }
}

/// Render overlays to a YAML stream
#[derive(Args, Debug, Default)]
pub struct RenderArgs {
    /// Overlay directories to render, in order
    #[arg(value_name = "PATH")]
    pub paths: Vec<PathBuf>,

    /// Render file listing sources and options
    #[arg(short, long, value_name = "FILE", env = "OVERLAY_RENDER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Value published to every overlay through values.yaml (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_set)]
    pub set: Vec<(String, String)>,

    /// Annotate each document with the source type, path and file
    #[arg(long)]
    pub source_annotations: bool,

    /// How to treat deprecation warnings (ignore, log, fail)
    #[arg(long, value_name = "POLICY")]
    pub warnings: Option<WarningPolicy>,

    /// Where overlays may load files from
    #[arg(long, value_name = "MODE", value_enum)]
    pub load_restrictions: Option<LoadRestrictionsArg>,

    /// Write the stream to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Execute the `render` command.
pub fn execute(args: RenderArgs) -> Result<()> {
    let (sources, options) = build_inputs(&args)?;
    let count = sources.len();
    let renderer = Renderer::new(sources, options)?;

    // Later --set flags win.
    let ctx = RenderContext::new().with_values(args.set.iter().cloned().collect());
    let documents = renderer.process(&ctx)?;
    let stream = render_stream(&documents)?;

    match &args.output {
        Some(path) => {
            fs::write(path, &stream)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(
                "wrote {} documents from {} sources to {}",
                documents.len(),
                count,
                path.display()
            );
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(stream.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Collect sources and options from the render file and the flags.
fn build_inputs(args: &RenderArgs) -> Result<(Vec<Source>, RendererOptions)> {
    let (mut sources, mut options) = match &args.config {
        Some(path) => {
            let parsed = config::from_file(path)
                .with_context(|| format!("failed to load render file {}", path.display()))?;
            parsed.into_parts(path.parent().unwrap_or_else(|| Path::new(".")))
        }
        None => (Vec::new(), RendererOptions::new()),
    };

    sources.extend(args.paths.iter().map(Source::new));
    if sources.is_empty() {
        bail!("no overlays to render: pass one or more PATH arguments or --config");
    }

    if args.source_annotations {
        options = options.with_source_annotations(true);
    }
    if let Some(policy) = args.warnings {
        options = options.with_warning_handler(policy.handler());
    }
    if let Some(restrictions) = args.load_restrictions {
        options = options.with_load_restrictions(restrictions.into());
    }
    Ok((sources, options))
}

/// Join documents into one YAML stream separated by `---`.
fn render_stream(documents: &[Document]) -> Result<String> {
    let mut stream = String::new();
    for (index, document) in documents.iter().enumerate() {
        if index > 0 {
            stream.push_str("---\n");
        }
        stream.push_str(&document.to_yaml()?);
    }
    Ok(stream)
}

fn parse_set(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {:?}", raw)),
    }
}
