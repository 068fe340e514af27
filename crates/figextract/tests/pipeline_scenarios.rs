//! End-to-end detection on synthetic pages

mod common;

use common::*;
use figextract::pipeline::Stage02CaptionCandidates;
use figextract::{
    analyze_document, BBox, FigextractError, FigurePipeline, FigureType, PageImages,
    PipelineConfig, TextLine,
};
use image::ImageBuffer;
use rstest::rstest;
use std::collections::BTreeMap;

#[test]
fn test_figure_above_caption() {
    let (pages, images) = figure_above_caption(true);
    let result = analyze_document(&pages, &images, &PipelineConfig::default()).unwrap();

    assert!(result.errors.is_empty());
    assert_eq!(result.found(), 1);
    let figure = &result.figures[&0][0];
    assert_eq!(figure.figure_type, FigureType::Figure);
    assert_eq!(figure.number, 1);
    assert_eq!(figure.page, 0);
    assert_eq!(figure.caption, "Figure 1: A plot");
    assert_eq!(figure.caption_bbox, BBox::new(18.5, 348.5, 121.5, 361.5));
    assert_eq!(figure.image_bbox, Some(BBox::new(98.0, 198.0, 302.0, 332.0)));
}

#[rstest]
#[case::blank_page(false, true)]
#[case::missing_render(true, false)]
fn test_caption_without_region_is_reported(#[case] with_plot: bool, #[case] keep_render: bool) {
    let (pages, mut images) = figure_above_caption(with_plot);
    if !keep_render {
        images.clear();
    }
    let result = analyze_document(&pages, &images, &PipelineConfig::default()).unwrap();

    assert!(result.figures.is_empty());
    assert_eq!(result.errors.len(), 1);
    let error = &result.errors[0];
    assert!(error.is_partial_failure());
    assert_eq!(error.number, 1);
    assert_eq!(error.image_bbox, None);
    assert_eq!(result.all(true).len(), 1);
    assert!(result.all(false).is_empty());
}

#[test]
fn test_mismatched_render_size_is_page_failure() {
    let (pages, mut images) = figure_above_caption(true);
    images.insert(
        0,
        PageImages {
            render: ImageBuffer::from_pixel(200, 250, image::Luma([255])),
            graphics: None,
        },
    );
    let result = analyze_document(&pages, &images, &PipelineConfig::default()).unwrap();
    assert_eq!(result.found(), 0);
    assert_eq!(result.errors.len(), 1);
}

#[test]
fn test_stacked_figures_split_shared_region() {
    let (pages, images) = stacked_figures();
    let result = analyze_document(&pages, &images, &PipelineConfig::default()).unwrap();

    assert!(result.errors.is_empty());
    let figures = &result.figures[&0];
    assert_eq!(figures.len(), 2);
    let image = |number: u32| {
        figures
            .iter()
            .find(|f| f.number == number)
            .and_then(|f| f.image_bbox)
            .unwrap()
    };
    assert_eq!(image(1), BBox::new(98.0, 68.0, 302.0, 202.0));
    assert_eq!(image(2), BBox::new(98.0, 228.0, 302.0, 362.0));
    assert!(!image(1).intersects(&image(2)));
}

#[test]
fn test_bold_anchor_wins_disambiguation() {
    let mut bold_anchor = word("Figure", 20.0, 100.0, 60.0, 110.0);
    bold_anchor.bold = true;
    let caption = TextLine {
        words: vec![
            bold_anchor,
            word("1", 64.0, 100.0, 70.0, 110.0),
            word("Results", 74.0, 100.0, 120.0, 110.0),
        ],
    };
    let reference = |t: f64| TextLine {
        words: words_at(
            &[("see", 20.0), ("Figure", 40.0), ("1", 6.0), ("here", 30.0)],
            20.0,
            t,
            10.0,
        ),
    };
    let page = page(0, vec![vec![reference(40.0)], vec![caption], vec![reference(300.0)]]);

    let candidates = Stage02CaptionCandidates::new().page_candidates(&page);
    assert_eq!(candidates.len(), 3);
    let bold_rank = candidates.iter().find(|c| c.bold).unwrap().word_rank;

    let (_, starts) = FigurePipeline::default().caption_starts(&[page]).unwrap();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[&0].len(), 1);
    assert_eq!(starts[&0][0].number, 1);
    assert_eq!(starts[&0][0].word_rank, bold_rank);
}

#[rstest]
#[case::single(figure_above_caption(true))]
#[case::blank(figure_above_caption(false))]
#[case::stacked(stacked_figures())]
fn test_every_caption_is_accounted_for(
    #[case] input: (Vec<figextract::TextPage>, BTreeMap<usize, PageImages>),
) {
    let (pages, images) = input;
    let pipeline = FigurePipeline::default();
    let (_, starts) = pipeline.caption_starts(&pages).unwrap();
    let accepted: usize = starts.values().map(Vec::len).sum();

    let result = pipeline.process(&pages, &images).unwrap();
    assert_eq!(result.found() + result.errors.len(), accepted);

    let again = pipeline.process(&pages, &images).unwrap();
    assert_eq!(result, again);
}

#[test]
fn test_duplicate_page_index_is_refused() {
    let (mut pages, images) = figure_above_caption(true);
    let stray = TextLine {
        words: vec![word("stray", 20.0, 40.0, 60.0, 50.0)],
    };
    pages.push(page(0, vec![vec![stray]]));
    let err = analyze_document(&pages, &images, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, FigextractError::DuplicatePage { page: 0 }));
}

#[test]
fn test_stale_anchor_rank_still_accounted_for() {
    let (pages, images) = figure_above_caption(true);
    let pipeline = FigurePipeline::default();
    let (stats, starts) = pipeline.caption_starts(&pages).unwrap();
    let mut page_starts = starts[&0].clone();
    page_starts[0].word_rank = 10_000;

    let result = pipeline.process_page(&pages[0], &stats, &page_starts, &images);
    assert_eq!(result.figures.len() + result.errors.len(), page_starts.len());
    let figure = result.figures.iter().chain(&result.errors).next().unwrap();
    assert_eq!(figure.caption, "Figure 1");
}

#[test]
fn test_only_page_skips_other_pages() {
    let (pages, images) = figure_above_caption(true);
    let result = FigurePipeline::default()
        .with_only_page(Some(1))
        .process(&pages, &images)
        .unwrap();
    assert_eq!(result.found(), 0);
    assert!(result.errors.is_empty());
}

#[test]
fn test_image_body_text_is_refused() {
    let (mut pages, images) = figure_above_caption(true);
    pages[0].embedded_images.push(figextract::text::ImageExtent {
        width: 288.0,
        height: 360.0,
    });
    let err = analyze_document(&pages, &images, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, FigextractError::GraphicalBodyText));

    let config = PipelineConfig {
        text_as_image: true,
        ..PipelineConfig::default()
    };
    assert!(analyze_document(&pages, &images, &config).is_ok());
}
