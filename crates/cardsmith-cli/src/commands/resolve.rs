use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use cardsmith_core::resolver::{ContentResolver, HighlightSpan, TextSnapshot};
use clap::Args;

use super::bootstrap::BootstrapOptions;

/// Where the text comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Inline document text
    pub text: Option<String>,

    /// Read the document text from a file
    #[arg(short, long, conflicts_with = "text")]
    pub file: Option<PathBuf>,

    /// Text the user selected; wins over highlights and the full document
    #[arg(short, long)]
    pub selection: Option<String>,

    /// Highlighted span as OFFSET:TEXT (repeatable)
    #[arg(long = "highlight", value_name = "OFFSET:TEXT")]
    pub highlights: Vec<String>,
}

impl SourceArgs {
    /// Builds the editor view the resolver reads from.
    pub fn to_view(&self) -> Result<TextSnapshot> {
        let document = match (&self.file, &self.text) {
            (Some(path), _) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
            (None, Some(text)) => text.clone(),
            (None, None) => String::new(),
        };

        let mut view = TextSnapshot::new(document);
        if let Some(selection) = &self.selection {
            view = view.with_selection(selection.clone());
        }
        for raw in &self.highlights {
            view = view.with_highlight(parse_highlight(raw)?);
        }
        Ok(view)
    }
}

/// Parses `OFFSET:TEXT`; the text may itself contain colons.
pub fn parse_highlight(raw: &str) -> Result<HighlightSpan> {
    let Some((offset, text)) = raw.split_once(':') else {
        bail!("Highlight '{}' must look like OFFSET:TEXT", raw);
    };
    let start = offset
        .trim()
        .parse::<usize>()
        .with_context(|| format!("Invalid highlight offset '{}'", offset))?;
    Ok(HighlightSpan::new(start, text))
}

pub fn run(options: &BootstrapOptions, args: &SourceArgs) -> Result<()> {
    let config = options.load_config()?;
    let resolver = ContentResolver::new(config.generation.highlight_separator);
    let resolved = resolver.resolve(&args.to_view()?);
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}
