use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use color_swatch::batch::{self, OutputFormat, SourceImage};
use color_swatch::config::{parse_hex_color, SwatchConfig};
use color_swatch::{Color, Diagnostic, DiagnosticKind, Position, QuantizeMethod};

#[derive(Parser)]
#[command(name = "color-swatch")]
#[command(about = "Render extracted color palettes as swatches along image edges")]
struct Cli {
    /// Input images
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory receiving the rendered images
    #[arg(short, long)]
    out_dir: PathBuf,

    /// JSON configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Comma-separated edges to render (top, bottom, left, right)
    #[arg(short, long, value_delimiter = ',')]
    positions: Option<Vec<Position>>,

    /// Number of palette colors (2-12)
    #[arg(short = 'n', long)]
    colors: Option<u8>,

    /// Quantization method: median-cut, max-coverage or fast-octree
    #[arg(short, long)]
    method: Option<QuantizeMethod>,

    /// Swatch strip size in percent of the image dimension (5-50)
    #[arg(long)]
    swatch_size: Option<u32>,

    /// Image border thickness in pixels (0-1000)
    #[arg(long)]
    image_border: Option<u32>,

    /// Swatch outline thickness in pixels (0-1000)
    #[arg(long)]
    swatch_border: Option<u32>,

    /// Image border color as #RRGGBB
    #[arg(long, value_parser = parse_hex_color)]
    image_border_color: Option<Color>,

    /// Swatch outline color as #RRGGBB
    #[arg(long, value_parser = parse_hex_color)]
    swatch_border_color: Option<Color>,

    /// Skip the swatch outline along the image seam when there is no image border
    #[arg(long)]
    remove_adjacent_border: bool,

    /// Output scale in percent (10-200)
    #[arg(short, long)]
    scale: Option<u32>,

    /// Output format: jpeg, png or bmp
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Write the effective configuration to this JSON file
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, config: &mut SwatchConfig) {
        if let Some(positions) = &self.positions {
            config.positions = positions.clone();
        }
        if let Some(colors) = self.colors {
            config.extract.num_colors = colors;
        }
        if let Some(method) = self.method {
            config.extract.method = method;
        }
        if let Some(size) = self.swatch_size {
            config.layout.swatch_size_percent = size;
        }
        if let Some(border) = self.image_border {
            config.layout.image_border_px = border;
        }
        if let Some(border) = self.swatch_border {
            config.layout.swatch_border_px = border;
        }
        if let Some(color) = self.image_border_color {
            config.layout.image_border_color = color;
        }
        if let Some(color) = self.swatch_border_color {
            config.layout.swatch_border_color = color;
        }
        if self.remove_adjacent_border {
            config.layout.remove_adjacent_border = true;
        }
        if let Some(scale) = self.scale {
            config.output.scale_percent = scale;
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => SwatchConfig::from_json_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => SwatchConfig::default(),
    };
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    if let Some(path) = &cli.write_config {
        config
            .to_json_file(path)
            .with_context(|| format!("failed to write configuration to {}", path.display()))?;
        info!(path = %path.display(), "configuration written");
    }

    let mut diagnostics = Vec::new();
    let mut sources = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match std::fs::read(path) {
            Ok(bytes) => sources.push(SourceImage { name, bytes }),
            Err(error) => {
                let diagnostic = Diagnostic::new(
                    name,
                    DiagnosticKind::Skipped {
                        reason: error.to_string(),
                    },
                );
                warn!("{}", diagnostic);
                diagnostics.push(diagnostic);
            }
        }
    }

    let report = batch::process_batch(&sources, &config);
    diagnostics.extend(report.diagnostics);

    std::fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("failed to create {}", cli.out_dir.display()))?;
    let mut written = 0;
    for rendered in &report.outputs {
        let path = cli.out_dir.join(&rendered.file_name);
        match std::fs::write(&path, &rendered.bytes) {
            Ok(()) => written += 1,
            Err(error) => {
                let diagnostic = Diagnostic::new(
                    rendered.source.clone(),
                    DiagnosticKind::OutputFailed {
                        position: rendered.position,
                        reason: format!("{}: {}", path.display(), error),
                    },
                );
                warn!("{}", diagnostic);
                diagnostics.push(diagnostic);
            }
        }
    }

    info!(
        written,
        diagnostics = diagnostics.len(),
        inputs = cli.inputs.len(),
        out_dir = %cli.out_dir.display(),
        "done"
    );

    if written == 0 {
        bail!("no output was produced");
    }
    Ok(())
}
