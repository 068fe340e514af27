use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use figextract::pipeline::{Stage06FigureAssigner, Stage06Config};
use figextract::raster::Bitmap;
use figextract::{BBox, Caption, FigureType, PageRegions};

const WIDTH: u32 = 850;
const HEIGHT: u32 = 1100;

// A grid of captioned plots, `count` per column, two columns
fn generate_page(count: usize) -> (Bitmap, PageRegions) {
    let mut ink = Vec::new();
    let mut regions = PageRegions::default();
    let row_height = (f64::from(HEIGHT) - 100.0) / count as f64;
    for column in 0..2 {
        let left = 60.0 + 400.0 * column as f64;
        for row in 0..count {
            let top = 50.0 + row_height * row as f64;
            let plot = BBox::new(left, top, left + 330.0, top + row_height * 0.6);
            let caption = BBox::new(left, plot.b + 8.0, left + 200.0, plot.b + 20.0);
            ink.push(plot);
            ink.push(caption);
            regions.graphics.push(plot);
            regions.captions.push(Caption {
                page: 0,
                number: (column * count + row + 1) as u32,
                figure_type: if row % 3 == 2 { FigureType::Table } else { FigureType::Figure },
                bbox: caption,
                text: format!("Figure {}", column * count + row + 1),
            });
        }
    }
    (Bitmap::from_boxes(WIDTH, HEIGHT, &ink), regions)
}

// Benchmark the capped configuration search as captions per page grow
fn benchmark_captions_per_page(c: &mut Criterion) {
    let mut group = c.benchmark_group("captions_per_page");
    let assigner = Stage06FigureAssigner::new();

    for count in [1, 2, 4, 6] {
        let (render, regions) = generate_page(count);
        group.bench_with_input(BenchmarkId::from_parameter(count * 2), &count, |b, _| {
            b.iter(|| assigner.process(black_box(&render), black_box(&regions), true));
        });
    }

    group.finish();
}

// Benchmark a tight configuration cap against the default
fn benchmark_configuration_cap(c: &mut Criterion) {
    let mut group = c.benchmark_group("configuration_cap");
    let (render, regions) = generate_page(6);

    for cap in [100, 10_000] {
        let assigner = Stage06FigureAssigner::with_config(Stage06Config {
            max_configurations: cap,
            ..Stage06Config::default()
        });
        group.bench_with_input(BenchmarkId::from_parameter(cap), &cap, |b, _| {
            b.iter(|| assigner.process(black_box(&render), black_box(&regions), true));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_captions_per_page, benchmark_configuration_cap);
criterion_main!(benches);
