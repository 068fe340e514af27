//! figextract CLI binary.
//!
//! Locates figures and tables in a document given its text layer as JSON
//! and a directory of page renders.
//!
//! Inputs:
//!   - a text dump `{ "dpi": 100.0, "pages": [TextPage, ...] }`
//!   - `page-NNN.png` renders (1-based, zero padded), plus optional
//!     `page-NNN-graphics.png` renders with the text layer suppressed

// Pixel boxes are small non-negative values
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use anyhow::{Context, Result};
use clap::Parser;
use figextract::export::{records, write_json};
use figextract::{
    BBox, FigextractError, Figure, PageImageSource, PageImages, PipelineConfig,
    TextPage,
};
use image::{imageops, DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use log::{info, warn};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// Stroke width of boxes drawn by `--save-final`
const STROKE: i32 = 4;
/// Padding of the caption-plus-image outline drawn by `--save-final`
const OUTLINE_PAD: f64 = 7.0;

#[derive(Parser, Debug)]
#[command(
    name = "figextract",
    about = "Locate captioned figures and tables in rendered document pages",
    version
)]
struct Args {
    /// Text layer dump (JSON)
    #[arg(value_name = "TEXT_JSON")]
    text: PathBuf,

    /// Directory holding page-NNN.png renders
    #[arg(value_name = "RENDER_DIR")]
    renders: PathBuf,

    /// Write the figure JSON here instead of stdout
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Only process this page (1-based)
    #[arg(short, long, value_name = "PAGE")]
    page: Option<usize>,

    /// Emit pages in reverse order
    #[arg(short, long)]
    reverse: bool,

    /// Include captions whose image region was not found
    #[arg(short = 'm', long)]
    save_mistakes: bool,

    /// Parse documents whose body text is drawn as images
    #[arg(short = 'i', long)]
    text_as_image: bool,

    /// Save figure crops to <PREFIX>-<Type>-<Number>.png
    #[arg(long, value_name = "PREFIX")]
    save_figures: Option<String>,

    /// Save pages with captions and figures outlined to <PREFIX>-<page>.png
    #[arg(long, value_name = "PREFIX")]
    save_final: Option<String>,

    /// Pipeline configuration (JSON, missing fields use defaults)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Worker threads (default: one per core)
    #[arg(short = 'j', long, value_name = "N")]
    threads: Option<usize>,

    /// Show detailed processing information
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct TextDump {
    #[serde(default)]
    dpi: Option<f64>,
    pages: Vec<TextPage>,
}

/// Page renders read from `page-NNN.png` files
#[derive(Debug, Clone)]
struct RenderDirectory {
    dir: PathBuf,
}

impl RenderDirectory {
    fn path(&self, page: usize, suffix: &str) -> PathBuf {
        self.dir.join(format!("page-{:03}{suffix}.png", page + 1))
    }

    fn load(path: &Path) -> figextract::Result<GrayImage> {
        Ok(image::open(path)?.to_luma8())
    }
}

impl PageImageSource for RenderDirectory {
    fn page_images(&self, page: usize) -> figextract::Result<PageImages> {
        let render_path = self.path(page, "");
        if !render_path.exists() {
            return Err(FigextractError::PageError {
                page,
                reason: format!("{} not found", render_path.display()),
            });
        }
        let render = Self::load(&render_path)?;
        let graphics_path = self.path(page, "-graphics");
        let graphics = if graphics_path.exists() {
            Some(Self::load(&graphics_path)?)
        } else {
            None
        };
        Ok(PageImages { render, graphics })
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Some(n) = args.threads {
        if n > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build_global()
                .ok(); // Ignore error if pool already built
        }
    }

    let mut config = match &args.config {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str::<PipelineConfig>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        }
        None => PipelineConfig::default(),
    };

    let content = fs::read_to_string(&args.text)
        .with_context(|| format!("Failed to read text dump: {}", args.text.display()))?;
    let dump: TextDump = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse text dump: {}", args.text.display()))?;
    if let Some(dpi) = dump.dpi {
        config.dpi = dpi;
    }
    config.text_as_image |= args.text_as_image;
    info!("Scanned {} pages", dump.pages.len());

    let only_page = match args.page {
        Some(0) => anyhow::bail!("--page is 1-based"),
        other => other.map(|p| p - 1),
    };
    let images = RenderDirectory {
        dir: args.renders.clone(),
    };

    config.validate()?;
    let pipeline = figextract::FigurePipeline::new(&config).with_only_page(only_page);
    let result = match pipeline.process(&dump.pages, &images) {
        Ok(result) => result,
        Err(FigextractError::GraphicalBodyText) => {
            eprintln!(
                "Body text appears to be encoded as graphics, skipping (use -i to parse these kinds of documents)"
            );
            write_output(args.output.as_deref(), &[])?;
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    if result.found() == 0 && result.errors.is_empty() {
        info!("No captions found");
    }

    let mut figures: Vec<&Figure> = result.all(args.save_mistakes);
    if args.reverse {
        figures.reverse();
    }

    if let Some(prefix) = &args.save_figures {
        save_figure_crops(&images, &figures, prefix)?;
    }
    if let Some(prefix) = &args.save_final {
        save_final_pages(&images, &figures, prefix)?;
    }

    let output = records(figures.iter().copied(), &dump.pages, config.dpi);
    write_output(args.output.as_deref(), &output)?;
    if let Some(path) = &args.output {
        info!("Saved {} figures to {}", output.len(), path.display());
    }
    Ok(())
}

fn write_output(path: Option<&Path>, output: &[figextract::FigureRecord]) -> Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_json(BufWriter::new(file), output)?;
        }
        None => write_json(io::stdout().lock(), output)?,
    }
    Ok(())
}

/// Pixel rectangle of `bbox` inside an image of the given size
fn pixel_rect(bbox: &BBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let clamped = bbox.clamp_to(f64::from(width), f64::from(height));
    let (x, y) = (clamped.l.floor() as u32, clamped.t.floor() as u32);
    let (x2, y2) = (clamped.r.ceil() as u32, clamped.b.ceil() as u32);
    (x2 > x && y2 > y).then_some((x, y, x2 - x, y2 - y))
}

fn save_figure_crops(images: &RenderDirectory, figures: &[&Figure], prefix: &str) -> Result<()> {
    for figure in figures {
        let Some(image_bbox) = figure.image_bbox else {
            continue;
        };
        let render = match images.page_images(figure.page) {
            Ok(page) => page.render,
            Err(err) => {
                warn!("Cannot crop {} {}: {err}", figure.figure_type, figure.number);
                continue;
            }
        };
        let Some((x, y, w, h)) = pixel_rect(&image_bbox, render.width(), render.height()) else {
            continue;
        };
        let name = format!("{prefix}-{}-{}.png", figure.figure_type, figure.number);
        imageops::crop_imm(&render, x, y, w, h)
            .to_image()
            .save(&name)
            .with_context(|| format!("Failed to save {name}"))?;
    }
    Ok(())
}

fn draw_box(canvas: &mut RgbImage, bbox: &BBox, color: Rgb<u8>) {
    let Some((x, y, w, h)) = pixel_rect(bbox, canvas.width(), canvas.height()) else {
        return;
    };
    for i in 0..STROKE {
        let grow = (2 * i) as u32;
        let rect = Rect::at(x as i32 - i, y as i32 - i).of_size(w + grow, h + grow);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

fn save_final_pages(images: &RenderDirectory, figures: &[&Figure], prefix: &str) -> Result<()> {
    let mut pages: Vec<usize> = figures.iter().map(|f| f.page).collect();
    pages.dedup();
    for page in pages {
        let render = match images.page_images(page) {
            Ok(images) => images.render,
            Err(err) => {
                warn!("Cannot draw page {page}: {err}");
                continue;
            }
        };
        let mut canvas = DynamicImage::ImageLuma8(render).to_rgb8();
        for figure in figures.iter().filter(|f| f.page == page) {
            draw_box(&mut canvas, &figure.caption_bbox, Rgb([0, 0, 255]));
            if let Some(image_bbox) = figure.image_bbox {
                draw_box(&mut canvas, &image_bbox, Rgb([0, 255, 0]));
                let outline = image_bbox.union(&figure.caption_bbox).pad(OUTLINE_PAD);
                draw_box(&mut canvas, &outline, Rgb([255, 0, 0]));
            }
        }
        let name = format!("{prefix}-{page}.png");
        canvas
            .save(&name)
            .with_context(|| format!("Failed to save {name}"))?;
    }
    Ok(())
}
