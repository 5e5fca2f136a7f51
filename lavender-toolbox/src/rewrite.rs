use std::{
    fs::File,
    io::{self, BufWriter, Read, Write},
    path::PathBuf,
};

use anyhow::Context;
use lavender_config::CONFIG;
use lavender_rewrite::{CssProcessor, HtmlProcessor, ProcessorWriter, RewriteEngine};
use url::Url;

/// Streams `input` (or stdin) through the HTML or CSS processor to stdout.
pub fn rewrite(
    base: String,
    index: Option<PathBuf>,
    nodes: Option<PathBuf>,
    context_path: Option<String>,
    css: bool,
    input: Option<PathBuf>,
) -> anyhow::Result<()> {
    let base = Url::parse(&base).with_context(|| format!("Invalid base URL {base}"))?;
    let index = index.unwrap_or_else(|| CONFIG.index_file.clone());
    let nodes = nodes.unwrap_or_else(|| CONFIG.nodes_file.clone());
    let context_path = context_path.unwrap_or_else(|| CONFIG.context_path.clone());

    let engine = RewriteEngine::load(&index, &nodes, CONFIG.replicas)?;
    let rewriter = engine.bind(&base, &context_path);

    let mut reader: Box<dyn Read> = match &input {
        Some(path) => Box::new(File::open(path).with_context(|| format!("Failed to open {}", path.display()))?),
        None => Box::new(io::stdin().lock()),
    };
    let stdout = BufWriter::new(io::stdout().lock());

    let mut out = if css {
        let mut writer = ProcessorWriter::new(CssProcessor::new(&rewriter, stdout));
        io::copy(&mut reader, &mut writer)?;
        writer.finish()?.into_inner()
    } else {
        let mut writer = ProcessorWriter::new(HtmlProcessor::new(&rewriter, stdout));
        io::copy(&mut reader, &mut writer)?;
        writer.finish()?.into_inner()
    };
    out.flush()?;
    Ok(())
}
