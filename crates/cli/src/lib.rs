//! Command line front end for rsmerge
//!
//! Maps CLI flags onto a [`MergeConfig`], runs the batch and writes the zip
//! archive. A `--config` JSON file provides the base configuration; flags
//! given on the command line override it.

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use merge::{
    list_fields, Align, BatchRenderer, Color, DocumentConfig, DocumentOutput, FieldMapping,
    ImageTemplate, MergeConfig, OutputBundle, OverlayFont, PdfiumRasterizer, PlacementConfig,
    RecordSet, RenderMode, Template, DEFAULT_DPI, DEFAULT_JPEG_QUALITY,
};
use std::path::{Path, PathBuf};
use tracing::info;

const AFTER_HELP: &str = r#"EXAMPLES:
  # One invitation per guest, name centered halfway down the card
  rsmerge invite --template card.png --csv guests.csv

  # Right aligned, red, near the bottom, names from a specific column
  rsmerge invite -t card.png -c guests.csv --key "Full Name" \
      --align right --color '#cc0000' --y-percent 85

  # Try the placement on a single name first
  rsmerge preview -t card.png --text "Sample Name" -o preview.jpg

  # List the fields of a PDF form
  rsmerge fields -t form.pdf --json

  # Fill a form per row, flattened
  rsmerge fill -t form.pdf -c people.csv --map name=Name --map city=City --flatten

  # Same, rendered to one JPEG per page at 150 DPI
  rsmerge fill -t form.pdf -c people.csv --map-file mapping.json --jpeg --dpi 150

ENVIRONMENT VARIABLES:
  RUST_LOG         Log filter (overrides -v)
  PDFIUM_LIB_PATH  Directory or file of the pdfium library used by --jpeg
"#;

/// Bulk personalisation of image and PDF form templates from CSV records.
#[derive(Parser, Debug)]
#[command(
    name = "rsmerge",
    version,
    about = "Bulk personalisation of image and PDF form templates from CSV records",
    arg_required_else_help = true,
    after_long_help = AFTER_HELP
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Job configuration JSON; command line flags override its values.
    #[arg(long, global = true, env = "RSMERGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Exit with an error when any record failed (the archive is still written).
    #[arg(long, global = true, env = "RSMERGE_STRICT")]
    pub strict: bool,

    /// More log output (-v info, -vv debug).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Draw one name per record onto an image template.
    Invite(InviteArgs),
    /// Fill a PDF form once per record.
    Fill(FillArgs),
    /// List the fillable fields of a PDF form.
    Fields(FieldsArgs),
    /// Render a single sample text with the image placement.
    Preview(PreviewArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignArg {
    Left,
    Center,
    Right,
}

impl From<AlignArg> for Align {
    fn from(v: AlignArg) -> Self {
        match v {
            AlignArg::Left => Align::Left,
            AlignArg::Center => Align::Center,
            AlignArg::Right => Align::Right,
        }
    }
}

/// Text placement flags shared by `invite` and `preview`
#[derive(Args, Debug, Clone, Default)]
pub struct PlacementArgs {
    /// Font size in pixels (10-100).
    #[arg(long, value_parser = clap::value_parser!(u32).range(10..=100))]
    pub font_size: Option<u32>,

    /// Text color as #RRGGBB.
    #[arg(long)]
    pub color: Option<String>,

    /// Vertical position of the text top, percent of the template height.
    #[arg(long)]
    pub y_percent: Option<f32>,

    /// Horizontal alignment.
    #[arg(long, value_enum)]
    pub align: Option<AlignArg>,

    /// Edge distance in pixels for left and right alignment.
    #[arg(long)]
    pub margin: Option<u32>,

    /// JPEG quality (1-100).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// TrueType font to draw with instead of the bundled DejaVu Sans.
    #[arg(long)]
    pub font: Option<PathBuf>,
}

impl PlacementArgs {
    /// Overlay the given flags onto `placement`
    pub fn apply(&self, placement: &mut PlacementConfig) -> Result<()> {
        if let Some(size) = self.font_size {
            placement.font_size = size;
        }
        if let Some(color) = &self.color {
            placement.color = Color::from_hex(color)?;
        }
        if let Some(y) = self.y_percent {
            placement.y_percent = y;
        }
        if let Some(align) = self.align {
            placement.align = align.into();
        }
        if let Some(margin) = self.margin {
            placement.margin = margin;
        }
        if let Some(quality) = self.quality {
            placement.jpeg_quality = quality;
        }
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct InviteArgs {
    /// PNG or JPEG template.
    #[arg(short, long)]
    pub template: PathBuf,

    /// CSV file with a header row.
    #[arg(short, long)]
    pub csv: PathBuf,

    /// Column naming each output file (default: first column).
    #[arg(long)]
    pub key: Option<String>,

    /// Column with the text to draw (default: the key column).
    #[arg(long)]
    pub text_column: Option<String>,

    #[command(flatten)]
    pub placement: PlacementArgs,

    /// Output archive.
    #[arg(short, long, default_value = "invitations.zip")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct FillArgs {
    /// PDF form template.
    #[arg(short, long)]
    pub template: PathBuf,

    /// CSV file with a header row.
    #[arg(short, long)]
    pub csv: PathBuf,

    /// Column naming each output file (default: first column).
    #[arg(long)]
    pub key: Option<String>,

    /// Map a form field to a column, as FIELD=COLUMN. Repeatable.
    #[arg(short, long = "map", value_name = "FIELD=COLUMN")]
    pub map: Vec<String>,

    /// JSON object of field -> column, applied before --map.
    #[arg(long)]
    pub map_file: Option<PathBuf>,

    /// Make the filled fields static page content.
    #[arg(long)]
    pub flatten: bool,

    /// Rasterize every page of the filled form to JPEG.
    #[arg(long)]
    pub jpeg: bool,

    /// Rasterization resolution (36-600).
    #[arg(long, requires = "jpeg", value_parser = clap::value_parser!(u32).range(36..=600))]
    pub dpi: Option<u32>,

    /// JPEG quality (1-100).
    #[arg(long, requires = "jpeg", value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// TrueType font for generated field appearances.
    #[arg(long)]
    pub font: Option<PathBuf>,

    /// pdfium library file (default: $PDFIUM_LIB_PATH, ./, system).
    #[arg(long)]
    pub pdfium_lib: Option<PathBuf>,

    /// Output archive (default: filled_pdfs.zip or filled_jpegs.zip).
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct FieldsArgs {
    /// PDF form template.
    #[arg(short, long)]
    pub template: PathBuf,

    /// Print JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
    /// PNG or JPEG template.
    #[arg(short, long)]
    pub template: PathBuf,

    /// Sample text.
    #[arg(long, default_value = "Sample Name")]
    pub text: String,

    #[command(flatten)]
    pub placement: PlacementArgs,

    /// Output JPEG.
    #[arg(short, long, default_value = "preview.jpg")]
    pub output: PathBuf,
}

/// Run a parsed command line
pub fn run(cli: Cli) -> Result<()> {
    let base = load_config(cli.config.as_deref())?;
    match &cli.command {
        Command::Invite(args) => {
            let bundle = invite(args, base)?;
            finish_batch(&args.output, bundle, cli.strict)
        }
        Command::Fill(args) => {
            let (output, bundle) = fill(args, base)?;
            finish_batch(&output, bundle, cli.strict)
        }
        Command::Fields(args) => fields(args),
        Command::Preview(args) => preview(args, base),
    }
}

/// Read and validate a `--config` file
pub fn load_config(path: Option<&Path>) -> Result<Option<MergeConfig>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = MergeConfig::from_json(&json)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(Some(config))
}

/// Image-mode configuration from the base config and `invite` flags
pub fn image_config(args: &InviteArgs, base: Option<MergeConfig>) -> Result<MergeConfig> {
    let mut config = base.unwrap_or_else(|| MergeConfig::image(PlacementConfig::default()));
    let RenderMode::Image(placement) = &mut config.mode else {
        bail!("`invite` needs an image-mode config, the config file is in document mode");
    };
    args.placement.apply(placement)?;
    if let Some(column) = &args.text_column {
        placement.text_column = Some(column.clone());
    }
    if let Some(key) = &args.key {
        config.key_column = Some(key.clone());
    }
    config.validate()?;
    Ok(config)
}

/// Document-mode configuration from the base config and `fill` flags
pub fn document_config(args: &FillArgs, base: Option<MergeConfig>) -> Result<MergeConfig> {
    let mut config = base.unwrap_or_else(|| MergeConfig::document(DocumentConfig::default()));
    let RenderMode::Document(document) = &mut config.mode else {
        bail!("`fill` needs a document-mode config, the config file is in image mode");
    };

    if let Some(path) = &args.map_file {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mapping {}", path.display()))?;
        let mapping: FieldMapping = serde_json::from_str(&json)
            .with_context(|| format!("Invalid mapping {}", path.display()))?;
        for (field, column) in mapping.iter() {
            document.mapping.insert(field, column);
        }
    }
    for pair in &args.map {
        let (field, column) = FieldMapping::parse_pair(pair)?;
        document.mapping.insert(field, column);
    }

    document.flatten |= args.flatten;
    if args.jpeg {
        let (dpi, quality) = match document.output {
            DocumentOutput::Jpeg { dpi, quality } => (dpi, quality),
            DocumentOutput::Pdf => (DEFAULT_DPI, DEFAULT_JPEG_QUALITY),
        };
        document.output = DocumentOutput::Jpeg {
            dpi: args.dpi.unwrap_or(dpi),
            quality: args.quality.unwrap_or(quality),
        };
    }

    if let Some(key) = &args.key {
        config.key_column = Some(key.clone());
    }
    config.validate()?;
    Ok(config)
}

fn read_font(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read font {}", path.display()))
}

fn load_inputs(template: &Path, csv: &Path) -> Result<(Template, RecordSet)> {
    let template = Template::from_path(template)
        .with_context(|| format!("Failed to load template {}", template.display()))?;
    let records = RecordSet::from_path(csv)
        .with_context(|| format!("Failed to load records {}", csv.display()))?;
    info!(records = records.len(), columns = records.headers().len(), "inputs loaded");
    Ok((template, records))
}

fn invite(args: &InviteArgs, base: Option<MergeConfig>) -> Result<OutputBundle> {
    let config = image_config(args, base)?;
    let (template, records) = load_inputs(&args.template, &args.csv)?;

    let mut renderer = BatchRenderer::new(&template, &config, &records)?;
    if let Some(font) = &args.placement.font {
        renderer = renderer.with_font_bytes(read_font(font)?)?;
    }
    Ok(renderer.generate(&records)?)
}

fn fill(args: &FillArgs, base: Option<MergeConfig>) -> Result<(PathBuf, OutputBundle)> {
    let config = document_config(args, base)?;
    let (template, records) = load_inputs(&args.template, &args.csv)?;

    let jpeg = matches!(
        config.mode,
        RenderMode::Document(DocumentConfig {
            output: DocumentOutput::Jpeg { .. },
            ..
        })
    );
    let rasterizer = if jpeg {
        Some(match &args.pdfium_lib {
            Some(path) => PdfiumRasterizer::from_library(path)?,
            None => PdfiumRasterizer::new()?,
        })
    } else {
        None
    };

    let mut renderer = BatchRenderer::new(&template, &config, &records)?;
    if let Some(rasterizer) = &rasterizer {
        renderer = renderer.with_rasterizer(rasterizer);
    }
    if let Some(font) = &args.font {
        renderer = renderer.with_font_bytes(read_font(font)?)?;
    }
    let bundle = renderer.generate(&records)?;

    let output = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(if jpeg {
            "filled_jpegs.zip"
        } else {
            "filled_pdfs.zip"
        })
    });
    Ok((output, bundle))
}

fn finish_batch(output: &Path, bundle: OutputBundle, strict: bool) -> Result<()> {
    std::fs::write(output, &bundle.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let report = bundle.report;
    eprintln!(
        "Wrote {}: {} of {} records rendered ({} skipped, {} failed)",
        output.display(),
        report.rendered,
        report.total,
        report.skipped.len(),
        report.failed.len()
    );
    for error in report.skipped.iter().chain(&report.failed) {
        eprintln!("  {error}");
    }

    if strict {
        report.into_result()?;
    }
    Ok(())
}

fn fields(args: &FieldsArgs) -> Result<()> {
    let template = Template::from_path(&args.template)
        .with_context(|| format!("Failed to load template {}", args.template.display()))?;
    if let Template::Image(_) = template {
        bail!("{} is an image; only PDF forms have fields", args.template.display());
    }

    let fields = list_fields(&template);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&fields)?);
    } else {
        for field in &fields {
            if field.options.is_empty() {
                println!("{}\t{}", field.name, field.kind);
            } else {
                println!("{}\t{}\t[{}]", field.name, field.kind, field.options.join(", "));
            }
        }
    }
    Ok(())
}

fn preview(args: &PreviewArgs, base: Option<MergeConfig>) -> Result<()> {
    let mut placement = match base.map(|c| c.mode) {
        Some(RenderMode::Image(placement)) => placement,
        Some(RenderMode::Document(_)) => {
            bail!("`preview` needs an image-mode config, the config file is in document mode")
        }
        None => PlacementConfig::default(),
    };
    args.placement.apply(&mut placement)?;

    let template = ImageTemplate::from_path(&args.template)
        .with_context(|| format!("Failed to load template {}", args.template.display()))?;
    let font = match &args.placement.font {
        Some(path) => OverlayFont::from_bytes(read_font(path)?)?,
        None => OverlayFont::bundled()?,
    };

    let jpeg = merge::preview(&template, &args.text, &placement, &font)?;
    std::fs::write(&args.output, jpeg)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    eprintln!("Wrote {}", args.output.display());
    Ok(())
}
