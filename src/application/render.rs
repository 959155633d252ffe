//! Frame planning and raster composition for previews and exports.
//!
//! Rendering happens in two stages. `plan_frames` turns a user's item sets
//! into per-index frame plans: frame `i` carries the `i`-th item of every
//! set that has one, styled with that set's placement attributes. A
//! [`FrameRenderer`] then composites one plan over the background image,
//! and the free encoder functions serialize the result into the requested
//! output format.

use std::collections::HashMap;

use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use printpdf::{
    ColorBits, ColorSpace, Image as PdfImage, ImageTransform, ImageXObject, Mm, PdfDocument, Px,
};
use thiserror::Error;

use crate::domain::entities::ItemSetRecord;
use crate::domain::types::{ExportFormat, RgbaColor};
use crate::infra::assets::{FontLibrary, MissingFont};

// US letter, the fixed page size for PDF output.
const LETTER_WIDTH_MM: f32 = 215.9;
const LETTER_HEIGHT_MM: f32 = 279.4;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    MissingFont(#[from] MissingFont),
    #[error("background image could not be decoded")]
    BadBackground(#[source] image::ImageError),
    #[error("encoding frame as {format} failed")]
    Encode {
        format: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// One piece of text and where and how to draw it.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPlacement {
    pub text: String,
    pub position_x: i32,
    pub position_y: i32,
    pub font_name: String,
    pub font_size: i32,
    pub color: RgbaColor,
}

impl TextPlacement {
    fn for_item(set: &ItemSetRecord, text: &str) -> Self {
        Self {
            text: text.to_string(),
            position_x: set.position_x,
            position_y: set.position_y,
            font_name: set.font_name.clone(),
            font_size: set.font_size,
            color: set.color,
        }
    }
}

/// Everything needed to composite frame `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct FramePlan {
    pub index: usize,
    pub placements: Vec<TextPlacement>,
}

/// Group items by index across sets: the number of frames is the longest
/// set's item count, and shorter sets simply stop contributing past their
/// end. Sets with no items never contribute.
pub fn plan_frames(item_sets: &[ItemSetRecord]) -> Vec<FramePlan> {
    let frame_count = item_sets
        .iter()
        .map(|set| set.items.len())
        .max()
        .unwrap_or(0);

    (0..frame_count)
        .map(|index| FramePlan {
            index,
            placements: item_sets
                .iter()
                .filter_map(|set| {
                    set.items
                        .get(index)
                        .map(|text| TextPlacement::for_item(set, text))
                })
                .collect(),
        })
        .collect()
}

/// Composites one frame plan over a background. The seam exists so that
/// export orchestration can be exercised without real font assets.
pub trait FrameRenderer: Send + Sync {
    fn render(&self, background: &[u8], plan: &FramePlan) -> Result<RgbaImage, RenderError>;
}

/// Production renderer: decodes the background and draws each placement
/// with its named bundled font.
pub struct TextCompositor {
    fonts: FontLibrary,
}

impl TextCompositor {
    pub fn new(fonts: FontLibrary) -> Self {
        Self { fonts }
    }
}

impl FrameRenderer for TextCompositor {
    fn render(&self, background: &[u8], plan: &FramePlan) -> Result<RgbaImage, RenderError> {
        let mut canvas = image::load_from_memory(background)
            .map_err(RenderError::BadBackground)?
            .to_rgba8();

        // Placements within one frame frequently share a font.
        let mut loaded: HashMap<&str, FontVec> = HashMap::new();
        for placement in &plan.placements {
            if !loaded.contains_key(placement.font_name.as_str()) {
                let font = self.fonts.load(&placement.font_name)?;
                loaded.insert(placement.font_name.as_str(), font);
            }
            let font = &loaded[placement.font_name.as_str()];

            let (r, g, b) = placement.color.rgb();
            draw_text_mut(
                &mut canvas,
                Rgba([r, g, b, placement.color.a]),
                placement.position_x,
                placement.position_y,
                PxScale::from(placement.font_size.max(1) as f32),
                font,
                &placement.text,
            );
        }
        Ok(canvas)
    }
}

/// Serialize a composited frame into the requested output format.
pub fn encode_frame(frame: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>, RenderError> {
    match format {
        ExportFormat::Png => encode_png(frame),
        ExportFormat::Jpeg => encode_jpeg(frame),
        ExportFormat::Pdf => encode_pdf(frame),
    }
}

fn encode_png(frame: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            frame.as_raw(),
            frame.width(),
            frame.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| RenderError::Encode {
            format: "png",
            source: Box::new(e),
        })?;
    Ok(out)
}

fn encode_jpeg(frame: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    // JPEG has no alpha channel; flatten first.
    let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new(&mut out)
        .write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(|e| RenderError::Encode {
            format: "jpeg",
            source: Box::new(e),
        })?;
    Ok(out)
}

/// Embed the frame at native resolution on a single US-letter page,
/// anchored at the page origin. Frames larger than the page are clipped by
/// the page bounds rather than scaled down.
fn encode_pdf(frame: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
    let (width, height) = (rgb.width(), rgb.height());

    let (doc, page, layer) = PdfDocument::new(
        "export",
        Mm(LETTER_WIDTH_MM),
        Mm(LETTER_HEIGHT_MM),
        "frame",
    );
    let xobject = ImageXObject {
        width: Px(width as usize),
        height: Px(height as usize),
        color_space: ColorSpace::Rgb,
        bits_per_component: ColorBits::Bit8,
        interpolate: false,
        image_data: rgb.into_raw(),
        image_filter: None,
        clipping_bbox: None,
    };
    // dpi 72 keeps one pixel equal to one PDF point.
    let transform = ImageTransform {
        dpi: Some(72.0),
        ..ImageTransform::default()
    };
    PdfImage::from(xobject).add_to_layer(doc.get_page(page).get_layer(layer), transform);

    doc.save_to_bytes().map_err(|e| RenderError::Encode {
        format: "pdf",
        source: Box::new(e),
    })
}
