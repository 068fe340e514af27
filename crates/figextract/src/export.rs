//! JSON export of detected figures
//!
//! One [`FigureRecord`] per figure, with field names and a 1-based `Page`
//! as consumers of the figure JSON expect.

// Page sizes are whole pixels
#![allow(clippy::cast_possible_truncation)]

use crate::error::Result;
use crate::pipeline::types::{Figure, FigureType};
use crate::text::TextPage;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// A word inside a figure's image region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageWord {
    #[serde(rename = "Rotation")]
    pub rotation: u8,
    #[serde(rename = "TextBB")]
    pub text_bb: [f64; 4],
    #[serde(rename = "Text")]
    pub text: String,
}

/// Wire shape of one detected figure or table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureRecord {
    #[serde(rename = "Type")]
    pub figure_type: FigureType,
    #[serde(rename = "Number")]
    pub number: u32,
    /// 1-based page number
    #[serde(rename = "Page")]
    pub page: usize,
    #[serde(rename = "DPI")]
    pub dpi: f64,
    /// Render width in pixels, -1 when unknown
    #[serde(rename = "Width")]
    pub width: i64,
    #[serde(rename = "Height")]
    pub height: i64,
    #[serde(rename = "CaptionBB")]
    pub caption_bb: Option<[f64; 4]>,
    #[serde(rename = "Caption")]
    pub caption: Option<String>,
    #[serde(rename = "ImageBB")]
    pub image_bb: Option<[f64; 4]>,
    #[serde(rename = "ImageText")]
    pub image_text: Option<Vec<ImageWord>>,
}

impl FigureRecord {
    /// Build the record for `figure`, collecting the words of `page` that
    /// lie inside its image region
    #[must_use = "returns the figure record"]
    pub fn new(figure: &Figure, page: Option<&TextPage>, dpi: f64) -> Self {
        let (width, height) =
            page.map_or((-1, -1), |p| (p.width.round() as i64, p.height.round() as i64));
        let image_text = figure.image_bbox.map(|image| {
            page.into_iter()
                .flat_map(TextPage::lines)
                .flat_map(|line| line.words.iter())
                .filter(|word| !word.text.is_empty() && image.contains(&word.rounded_bbox()))
                .map(|word| ImageWord {
                    rotation: word.rotation,
                    text_bb: word.bbox.to_array(),
                    text: word.text.clone(),
                })
                .collect()
        });
        Self {
            figure_type: figure.figure_type,
            number: figure.number,
            page: figure.page + 1,
            dpi,
            width,
            height,
            caption_bb: Some(figure.caption_bbox.to_array()),
            caption: Some(figure.caption.clone()),
            image_bb: figure.image_bbox.map(|b| b.to_array()),
            image_text,
        }
    }
}

/// Records for `figures`, looking pages up by index
#[must_use = "returns the figure records"]
pub fn records<'a>(
    figures: impl IntoIterator<Item = &'a Figure>,
    pages: &[TextPage],
    dpi: f64,
) -> Vec<FigureRecord> {
    figures
        .into_iter()
        .map(|figure| {
            let page = pages.iter().find(|p| p.index == figure.page);
            FigureRecord::new(figure, page, dpi)
        })
        .collect()
}

/// Write records as a pretty-printed JSON array (`[]` when empty)
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_json<W: Write>(mut writer: W, records: &[FigureRecord]) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::BBox;
    use crate::text::{TextBlock, TextLine, Word};

    fn make_figure(image_bbox: Option<BBox>) -> Figure {
        Figure {
            figure_type: FigureType::Table,
            number: 3,
            page: 1,
            caption_bbox: BBox::new(10.0, 200.0, 190.0, 212.0),
            caption: "Table 3: Results".to_string(),
            image_bbox,
        }
    }

    fn make_page() -> TextPage {
        let word = |text: &str, l: f64, t: f64| Word {
            text: text.to_string(),
            bbox: BBox::new(l, t, l + 20.0, t + 9.6),
            font_size: 10.0,
            font_name: None,
            bold: false,
            italic: false,
            rotation: 0,
        };
        TextPage {
            index: 1,
            width: 612.4,
            height: 792.0,
            blocks: vec![TextBlock {
                lines: vec![
                    TextLine {
                        words: vec![word("inside", 20.0, 50.0), word("", 50.0, 50.0)],
                    },
                    TextLine {
                        words: vec![word("outside", 20.0, 300.0)],
                    },
                ],
            }],
            ..TextPage::default()
        }
    }

    #[test]
    fn test_record_fields_and_image_text() {
        let page = make_page();
        let figure = make_figure(Some(BBox::new(10.0, 40.0, 200.0, 190.0)));
        let record = FigureRecord::new(&figure, Some(&page), 100.0);
        assert_eq!(record.page, 2);
        assert_eq!((record.width, record.height), (612, 792));
        let text = record.image_text.unwrap();
        assert_eq!(text.len(), 1);
        assert_eq!(text[0].text, "inside");

        let value =
            serde_json::to_value(FigureRecord::new(&make_figure(None), None, 72.0)).unwrap();
        assert_eq!(value["Type"], "Table");
        assert_eq!(value["Page"], 2);
        assert_eq!(value["Width"], -1);
        assert!(value["ImageBB"].is_null());
        assert!(value["ImageText"].is_null());
        assert_eq!(value["CaptionBB"][2], 190.0);
    }

    #[test]
    fn test_empty_output_is_array() {
        let mut out = Vec::new();
        write_json(&mut out, &[]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().trim(), "[]");
    }
}
