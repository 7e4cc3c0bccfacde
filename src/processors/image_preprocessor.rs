use std::io::Cursor;
use std::time::Instant;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb};
use imageproc::contours::find_contours;
use imageproc::contrast::{adaptive_threshold, equalize_histogram};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, warp, Interpolation, Projection};
use imageproc::morphology::{close, open};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{ConfigError, ProcessorError};
use crate::observability::messages::processor::SubStepCompleted;
use crate::observability::messages::StructuredLog;
use crate::payload::{DocumentPayload, Propagation, StepResult};
use crate::traits::Processor;

pub const NAME: &str = "image_preprocessor";

const KNOWN_OPS: &[&str] = &[
    "deskew",
    "denoise",
    "to_grayscale",
    "binarize",
    "enhance_contrast",
    "opening",
    "closing",
    "canny",
    "correct_perspective",
];

#[derive(Debug, Clone, Deserialize)]
struct PreprocessorConfig {
    steps: Vec<SubStepConfig>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubStepConfig {
    name: String,
    #[serde(default)]
    params: Map<String, Value>,
}

/// Instrumentation record for one image sub-step.
#[derive(Debug, Clone, Serialize)]
struct SubStepRecord {
    step_name: String,
    input_image: String,
    output_image: String,
    metadata: SubStepMetadata,
}

#[derive(Debug, Clone, Serialize)]
struct SubStepMetadata {
    execution_time_ms: u64,
    parameters: Map<String, Value>,
    input_hash: String,
    output_hash: String,
}

/// Applies an ordered sub-pipeline of named image operations.
///
/// Every sub-step is instrumented independently: input/output md5, params,
/// duration, and base64 snapshots land in the structured results. The final
/// image propagates 1:1 to the next pipeline step.
pub struct ImagePreprocessingProcessor {
    config: PreprocessorConfig,
}

impl ImagePreprocessingProcessor {
    pub fn new(params: &Map<String, Value>) -> Result<Self, ConfigError> {
        let config: PreprocessorConfig = serde_json::from_value(Value::Object(params.clone()))
            .map_err(|e| ConfigError::InvalidParams {
                processor: NAME,
                message: format!("'steps' must be a list of named operations: {e}"),
            })?;
        Ok(Self { config })
    }
}

#[async_trait]
impl Processor for ImagePreprocessingProcessor {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn execute(&self, payload: &DocumentPayload) -> Result<StepResult, ProcessorError> {
        if payload.file_content.is_empty() {
            return Ok(StepResult::failure(
                NAME,
                "image data is required for preprocessing",
            ));
        }

        let steps = self.config.steps.clone();
        let bytes = payload.file_content.clone();
        // Pixel work is CPU-bound; keep it off the cooperative scheduler.
        let (final_image, records) =
            tokio::task::spawn_blocking(move || run_sub_pipeline(&bytes, &steps)).await??;

        let structured = json!({
            "final_image": STANDARD.encode(&final_image),
            "steps": serde_json::to_value(&records).expect("sub-step records serialize"),
        });

        Ok(StepResult::success(NAME)
            .with_output(format!("Applied {} preprocessing step(s).", records.len()))
            .with_structured(structured)
            .with_propagation(Propagation::Continue { image: final_image }))
    }
}

fn run_sub_pipeline(
    bytes: &[u8],
    steps: &[SubStepConfig],
) -> Result<(Vec<u8>, Vec<SubStepRecord>), ProcessorError> {
    let mut img = image::load_from_memory(bytes)?;
    let mut records = Vec::with_capacity(steps.len());

    for step in steps {
        if !KNOWN_OPS.contains(&step.name.as_str()) {
            tracing::warn!(step = %step.name, "unknown preprocessing step, skipping");
            continue;
        }

        let input_png = encode_png(&img)?;
        let input_hash = format!("{:x}", md5::compute(&input_png));

        let started = Instant::now();
        let output = apply_op(&step.name, &img, &step.params)?;
        let duration_ms = started.elapsed().as_millis() as u64;

        let output_png = encode_png(&output)?;
        let output_hash = format!("{:x}", md5::compute(&output_png));

        SubStepCompleted {
            op: &step.name,
            duration_ms,
            input_hash: &input_hash,
            output_hash: &output_hash,
        }
        .log();

        records.push(SubStepRecord {
            step_name: step.name.clone(),
            input_image: STANDARD.encode(&input_png),
            output_image: STANDARD.encode(&output_png),
            metadata: SubStepMetadata {
                execution_time_ms: duration_ms,
                parameters: step.params.clone(),
                input_hash,
                output_hash,
            },
        });

        img = output;
    }

    Ok((encode_png(&img)?, records))
}

fn apply_op(
    name: &str,
    img: &DynamicImage,
    params: &Map<String, Value>,
) -> Result<DynamicImage, ProcessorError> {
    let result = match name {
        "to_grayscale" => DynamicImage::ImageLuma8(img.to_luma8()),
        "binarize" => {
            let gray = img.to_luma8();
            let binarized = if param_bool(params, "adaptive", false) {
                adaptive_threshold(&gray, param_u32(params, "block_radius", 5))
            } else {
                let level = param_u32(params, "threshold", 127).min(255) as u8;
                binarize_gray(&gray, level, false)
            };
            DynamicImage::ImageLuma8(binarized)
        }
        "enhance_contrast" => DynamicImage::ImageLuma8(equalize_histogram(&img.to_luma8())),
        "denoise" => {
            let radius = param_u32(params, "radius", 1);
            match img {
                DynamicImage::ImageLuma8(gray) => {
                    DynamicImage::ImageLuma8(median_filter(gray, radius, radius))
                }
                other => DynamicImage::ImageRgb8(median_filter(&other.to_rgb8(), radius, radius)),
            }
        }
        "opening" | "closing" => {
            let kernel_size = param_u32(params, "kernel_size", 3);
            let radius = (kernel_size / 2).max(1).min(255) as u8;
            let gray = img.to_luma8();
            let morphed = if name == "opening" {
                open(&gray, Norm::LInf, radius)
            } else {
                close(&gray, Norm::LInf, radius)
            };
            DynamicImage::ImageLuma8(morphed)
        }
        "canny" => {
            let low = param_f32(params, "threshold1", 100.0);
            let high = param_f32(params, "threshold2", 200.0);
            DynamicImage::ImageLuma8(canny(&img.to_luma8(), low, high))
        }
        "deskew" => deskew(img),
        "correct_perspective" => correct_perspective(img),
        _ => unreachable!("op name checked against KNOWN_OPS"),
    };
    Ok(result)
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, ProcessorError> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(buffer)
}

fn param_u32(params: &Map<String, Value>, key: &str, default: u32) -> u32 {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(default)
}

fn param_f32(params: &Map<String, Value>, key: &str, default: f32) -> f32 {
    params
        .get(key)
        .and_then(Value::as_f64)
        .map(|v| v as f32)
        .unwrap_or(default)
}

fn param_bool(params: &Map<String, Value>, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Fixed-level binary threshold; `inverted` maps dark pixels to white,
/// which is what contour detection wants for dark-on-light documents.
fn binarize_gray(gray: &GrayImage, level: u8, inverted: bool) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let above = gray.get_pixel(x, y)[0] > level;
        if above != inverted {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Estimate page skew by scoring horizontal projection profiles over a range
/// of candidate angles; the angle whose profile is most peaked wins.
fn estimate_skew_degrees(gray: &GrayImage) -> f32 {
    let (width, height) = gray.dimensions();
    if width < 8 || height < 8 {
        return 0.0;
    }

    let dark: Vec<(f32, f32)> = gray
        .enumerate_pixels()
        .filter(|(_, _, p)| p[0] < 128)
        .map(|(x, y, _)| (x as f32, y as f32))
        .collect();
    if dark.len() < 16 {
        return 0.0;
    }

    let offset = width as f32;
    let buckets = (2 * width + height + 2) as usize;
    let mut best_angle = 0.0f32;
    let mut best_score = -1.0f64;

    let mut angle = -10.0f32;
    while angle <= 10.0 {
        let (sin, cos) = angle.to_radians().sin_cos();
        let mut counts = vec![0u32; buckets];
        for &(x, y) in &dark {
            let projected = y * cos - x * sin + offset;
            if projected >= 0.0 && (projected as usize) < buckets {
                counts[projected as usize] += 1;
            }
        }
        let score: f64 = counts.iter().map(|&c| (c as f64) * (c as f64)).sum();
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
        angle += 0.5;
    }

    best_angle
}

fn deskew(img: &DynamicImage) -> DynamicImage {
    let angle = estimate_skew_degrees(&img.to_luma8());
    if angle.abs() < 0.25 {
        return img.clone();
    }
    let theta = -angle.to_radians();
    match img {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(rotate_about_center(
            gray,
            theta,
            Interpolation::Bilinear,
            Luma([255u8]),
        )),
        other => DynamicImage::ImageRgb8(rotate_about_center(
            &other.to_rgb8(),
            theta,
            Interpolation::Bilinear,
            Rgb([255u8, 255u8, 255u8]),
        )),
    }
}

fn bounds(points: &[Point<i32>]) -> (i32, i32, i32, i32) {
    let mut min_x = i32::MAX;
    let mut min_y = i32::MAX;
    let mut max_x = i32::MIN;
    let mut max_y = i32::MIN;
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    if points.is_empty() {
        (0, 0, 0, 0)
    } else {
        (min_x, min_y, max_x, max_y)
    }
}

/// Warp the largest detected quadrilateral region onto an axis-aligned
/// rectangle. Falls back to the unmodified image when no usable contour is
/// found.
fn correct_perspective(img: &DynamicImage) -> DynamicImage {
    let gray = img.to_luma8();
    let mask = binarize_gray(&gray, 127, true);
    let contours = find_contours::<i32>(&mask);

    let largest = contours.iter().max_by_key(|c| {
        let (min_x, min_y, max_x, max_y) = bounds(&c.points);
        ((max_x - min_x) as i64) * ((max_y - min_y) as i64)
    });
    let Some(contour) = largest else {
        tracing::warn!("no contour found for perspective correction, returning original image");
        return img.clone();
    };
    if contour.points.len() < 4 {
        tracing::warn!("contour too small for perspective correction, returning original image");
        return img.clone();
    }

    // Corner points by coordinate sums and differences: top-left minimizes
    // x+y, bottom-right maximizes it; top-right maximizes x-y, bottom-left
    // minimizes it.
    let corner = |f: &dyn Fn(&Point<i32>) -> i32, max: bool| -> (f32, f32) {
        let p = if max {
            contour.points.iter().max_by_key(|p| f(p)).unwrap()
        } else {
            contour.points.iter().min_by_key(|p| f(p)).unwrap()
        };
        (p.x as f32, p.y as f32)
    };
    let tl = corner(&|p| p.x + p.y, false);
    let br = corner(&|p| p.x + p.y, true);
    let tr = corner(&|p| p.x - p.y, true);
    let bl = corner(&|p| p.x - p.y, false);

    let dist = |a: (f32, f32), b: (f32, f32)| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
    let target_w = dist(br, bl).max(dist(tr, tl)).round() as u32;
    let target_h = dist(tr, br).max(dist(tl, bl)).round() as u32;
    if target_w < 2 || target_h < 2 {
        tracing::warn!("degenerate quadrilateral for perspective correction, returning original image");
        return img.clone();
    }

    let to = [
        (0.0, 0.0),
        (target_w as f32 - 1.0, 0.0),
        (target_w as f32 - 1.0, target_h as f32 - 1.0),
        (0.0, target_h as f32 - 1.0),
    ];
    let Some(projection) = Projection::from_control_points([tl, tr, br, bl], to) else {
        tracing::warn!("could not solve projection for perspective correction, returning original image");
        return img.clone();
    };

    let crop_w = target_w.min(img.width());
    let crop_h = target_h.min(img.height());
    match img {
        DynamicImage::ImageLuma8(g) => {
            let warped = warp(g, &projection, Interpolation::Bilinear, Luma([255u8]));
            DynamicImage::ImageLuma8(
                image::imageops::crop_imm(&warped, 0, 0, crop_w, crop_h).to_image(),
            )
        }
        other => {
            let warped = warp(
                &other.to_rgb8(),
                &projection,
                Interpolation::Bilinear,
                Rgb([255u8, 255u8, 255u8]),
            );
            DynamicImage::ImageRgb8(
                image::imageops::crop_imm(&warped, 0, 0, crop_w, crop_h).to_image(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white_png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255u8])));
        encode_png(&img).unwrap()
    }

    fn processor(steps: Value) -> ImagePreprocessingProcessor {
        let params = match json!({ "steps": steps }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        ImagePreprocessingProcessor::new(&params).unwrap()
    }

    fn payload(bytes: Vec<u8>) -> DocumentPayload {
        DocumentPayload::root("job-1", "scan.png", bytes, "doc-hash")
    }

    #[test]
    fn missing_steps_key_is_a_config_error() {
        assert!(ImagePreprocessingProcessor::new(&Map::new()).is_err());
    }

    #[tokio::test]
    async fn grayscale_then_binarize_produces_image_and_records() {
        let processor = processor(json!([
            { "name": "to_grayscale" },
            { "name": "binarize", "params": { "threshold": 100 } }
        ]));

        let result = processor.execute(&payload(white_png(4, 4))).await.unwrap();
        assert!(result.is_success());

        let image = match &result.propagation {
            Propagation::Continue { image } => image,
            other => panic!("expected 1:1 propagation, got {other:?}"),
        };
        assert!(image::load_from_memory(image).is_ok());

        let structured = result.structured_results.unwrap();
        let steps = structured["steps"].as_array().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0]["step_name"], "to_grayscale");
        assert_eq!(steps[1]["step_name"], "binarize");
        assert_eq!(steps[1]["metadata"]["parameters"]["threshold"], 100);
        for step in steps {
            assert_eq!(step["metadata"]["input_hash"].as_str().unwrap().len(), 32);
            assert_eq!(step["metadata"]["output_hash"].as_str().unwrap().len(), 32);
            assert!(step["metadata"]["execution_time_ms"].is_u64());
        }
    }

    #[tokio::test]
    async fn unknown_step_is_skipped() {
        let processor = processor(json!([
            { "name": "sharpen_extreme" },
            { "name": "to_grayscale" }
        ]));

        let result = processor.execute(&payload(white_png(4, 4))).await.unwrap();
        let structured = result.structured_results.unwrap();
        assert_eq!(structured["steps"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn full_op_catalog_runs_on_small_image() {
        let steps: Vec<Value> = KNOWN_OPS.iter().map(|op| json!({ "name": op })).collect();
        let processor = processor(Value::Array(steps));

        let result = processor
            .execute(&payload(white_png(16, 16)))
            .await
            .unwrap();
        assert!(result.is_success());
        let structured = result.structured_results.unwrap();
        assert_eq!(
            structured["steps"].as_array().unwrap().len(),
            KNOWN_OPS.len()
        );
    }

    #[tokio::test]
    async fn invalid_image_bytes_are_a_processor_error() {
        let processor = processor(json!([{ "name": "to_grayscale" }]));
        let err = processor
            .execute(&payload(b"not an image".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::Image(_)));
    }

    #[test]
    fn skew_estimate_is_zero_for_blank_images() {
        let blank = GrayImage::from_pixel(32, 32, Luma([255u8]));
        assert_eq!(estimate_skew_degrees(&blank), 0.0);
    }
}
