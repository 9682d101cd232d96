//! Integration tests for the style transfer pipeline, using in-memory models.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ndarray::{ArrayD, Axis};

use petra::model::{FeatureInput, FeatureValue, InferenceResult, ModelDescription, SlotDescription};
use petra::{Bitmap, Config, Error, FailureKind, ModelLoader, PixelFormat, StyleModel, Stylizer};

/// Inverts every channel value (0..255 range) and optionally waits first.
struct InvertModel {
    description: ModelDescription,
    delay: Duration,
}

impl InvertModel {
    fn new(name: &str, size: i64) -> Self {
        Self {
            description: ModelDescription {
                name: name.to_string(),
                inputs: vec![SlotDescription::float32("image", vec![1, 3, size, size])],
                outputs: vec![SlotDescription::float32("stylizedImage", vec![1, 3, size, size])],
            },
            delay: Duration::ZERO,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl StyleModel for InvertModel {
    fn description(&self) -> &ModelDescription {
        &self.description
    }

    fn predict(&mut self, input: &FeatureInput) -> petra::Result<InferenceResult> {
        std::thread::sleep(self.delay);
        let image = input.get("image").ok_or_else(|| Error::InferenceRejected {
            reason: "missing image input".to_string(),
        })?;

        let mut result = InferenceResult::new();
        let inverted = image.mapv(|v| 255.0 - v);
        result.insert("stylizedImage", FeatureValue::Tensor(inverted));
        Ok(result)
    }
}

/// Fills its output with one value per channel, ignoring the input pixels.
struct FlatColorModel {
    description: ModelDescription,
    color: [f32; 3],
    output: (usize, usize),
}

impl FlatColorModel {
    fn new(color: [u8; 3], input: i64, output: (usize, usize)) -> Self {
        Self {
            description: ModelDescription {
                name: format!("flat-{color:?}"),
                inputs: vec![SlotDescription::float32("image", vec![1, 3, input, input])],
                outputs: vec![SlotDescription::float32(
                    "stylizedImage",
                    vec![1, 3, output.1 as i64, output.0 as i64],
                )],
            },
            color: color.map(f32::from),
            output,
        }
    }
}

impl StyleModel for FlatColorModel {
    fn description(&self) -> &ModelDescription {
        &self.description
    }

    fn predict(&mut self, _input: &FeatureInput) -> petra::Result<InferenceResult> {
        let (width, height) = self.output;
        let mut tensor = ArrayD::<f32>::zeros(vec![1, 3, height, width]);
        for (channel, mut plane) in tensor.axis_iter_mut(Axis(1)).enumerate() {
            plane.fill(self.color[channel]);
        }

        let mut result = InferenceResult::new();
        result.insert("stylizedImage", FeatureValue::Tensor(tensor));
        Ok(result)
    }
}

/// A model whose only input is not called "image".
struct WrongInputModel {
    description: ModelDescription,
    predictions: Arc<AtomicUsize>,
}

impl StyleModel for WrongInputModel {
    fn description(&self) -> &ModelDescription {
        &self.description
    }

    fn predict(&mut self, _input: &FeatureInput) -> petra::Result<InferenceResult> {
        self.predictions.fetch_add(1, Ordering::SeqCst);
        Ok(InferenceResult::new())
    }
}

struct PanickingModel(ModelDescription);

impl StyleModel for PanickingModel {
    fn description(&self) -> &ModelDescription {
        &self.0
    }

    fn predict(&mut self, _input: &FeatureInput) -> petra::Result<InferenceResult> {
        panic!("model crashed");
    }
}

/// Serves in-memory models by file name; unknown names fail like a missing file.
struct MemoryLoader {
    styles: HashMap<PathBuf, [u8; 3]>,
    loads: AtomicUsize,
}

impl MemoryLoader {
    fn new(styles: &[(&str, [u8; 3])]) -> Self {
        Self {
            styles: styles
                .iter()
                .map(|(name, color)| (PathBuf::from(name), *color))
                .collect(),
            loads: AtomicUsize::new(0),
        }
    }
}

impl ModelLoader for MemoryLoader {
    type Model = FlatColorModel;

    fn load(&self, location: &Path) -> petra::Result<FlatColorModel> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let color = self.styles.get(location).ok_or_else(|| Error::ModelCompile {
            path: location.to_path_buf(),
            reason: "no model artifact at this location".to_string(),
        })?;
        Ok(FlatColorModel::new(*color, 16, (16, 16)))
    }
}

fn gradient(width: u32, height: u32) -> Bitmap {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            pixels.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 128]);
        }
    }
    Bitmap::new(width, height, PixelFormat::Rgb8, pixels).unwrap()
}

fn stylizer() -> Stylizer<MemoryLoader> {
    let loader = MemoryLoader::new(&[("candy.onnx", [200, 40, 90]), ("udnie.onnx", [10, 20, 30])]);
    Stylizer::with_loader(Config::default(), loader).unwrap()
}

fn is_flat(bitmap: &Bitmap, color: [u8; 3]) -> bool {
    bitmap
        .pixels()
        .is_some_and(|pixels| pixels.chunks_exact(3).all(|px| px == color))
}

#[tokio::test]
async fn test_stylize_delivers_model_output() {
    let stylized = stylizer()
        .stylize("candy.onnx", gradient(400, 300), None)
        .await
        .unwrap();

    assert_eq!(stylized.dimensions(), (16, 16));
    assert_eq!(stylized.format(), PixelFormat::Rgb8);
    assert!(is_flat(&stylized, [200, 40, 90]));
}

#[tokio::test]
async fn test_output_dimensions_follow_model_not_input() {
    let stylizer = stylizer();
    let model = FlatColorModel::new([1, 2, 3], 64, (96, 48));

    let stylized = stylizer
        .submit_loaded(model, gradient(400, 300), None)
        .await
        .unwrap();

    assert_eq!(stylized.dimensions(), (96, 48));
}

#[tokio::test]
async fn test_style_image_does_not_change_result() {
    let stylizer = stylizer();
    let style = gradient(100, 100);

    let with_style = stylizer
        .stylize("udnie.onnx", gradient(64, 64), Some(style))
        .await
        .unwrap();
    let without_style = stylizer
        .stylize("udnie.onnx", gradient(64, 64), None)
        .await
        .unwrap();

    assert_eq!(with_style, without_style);
}

#[tokio::test]
async fn test_unknown_location_reports_compile_failure() {
    let stylizer = stylizer();
    let err = stylizer
        .stylize("missing.onnx", gradient(8, 8), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::ModelCompile);
    assert_eq!(stylizer.loader().loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_each_request_loads_its_own_model() {
    let stylizer = stylizer();
    for _ in 0..3 {
        stylizer
            .stylize("candy.onnx", gradient(8, 8), None)
            .await
            .unwrap();
    }

    assert_eq!(stylizer.loader().loads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_inference_is_idempotent() {
    let stylizer = stylizer();
    let content = gradient(400, 300);

    let first = stylizer
        .submit_loaded(InvertModel::new("invert", 256), content.clone(), None)
        .await
        .unwrap();
    let second = stylizer
        .submit_loaded(InvertModel::new("invert", 256), content, None)
        .await
        .unwrap();

    assert_eq!(first.dimensions(), (256, 256));
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_invert_matches_center_crop() {
    // 300x256 content into a 256x256 input needs no scaling: columns [22, 278) are kept
    let stylized = stylizer()
        .submit_loaded(InvertModel::new("invert", 256), gradient(300, 256), None)
        .await
        .unwrap();

    let pixels = stylized.pixels().unwrap();
    // Top-left output pixel comes from source column 22, row 0
    assert_eq!(&pixels[..3], &[255 - 22, 255, 127]);
    // Last pixel of the first row comes from source column 277
    let last = 255 * 3;
    assert_eq!(&pixels[last..last + 3], &[255 - 21, 255, 127]);
}

#[tokio::test]
async fn test_missing_image_input_fails_without_running_model() {
    let predictions = Arc::new(AtomicUsize::new(0));
    let model = WrongInputModel {
        description: ModelDescription {
            name: "wrong".to_string(),
            inputs: vec![SlotDescription::float32("input1", vec![1, 3, 8, 8])],
            outputs: vec![SlotDescription::float32("stylizedImage", vec![1, 3, 8, 8])],
        },
        predictions: Arc::clone(&predictions),
    };

    let err = stylizer()
        .submit_loaded(model, gradient(8, 8), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::MissingInputConstraint);
    assert_eq!(predictions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unbacked_content_gets_no_placeholder() {
    let content = Bitmap::unbacked(400, 300, PixelFormat::Rgba8);
    let result = stylizer()
        .submit("candy.onnx".into(), content, None)
        .into_option()
        .await;

    assert!(result.is_none());
}

#[tokio::test]
async fn test_unbacked_content_error_kind() {
    let content = Bitmap::unbacked(400, 300, PixelFormat::Rgba8);
    let err = stylizer()
        .stylize("candy.onnx", content, None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::UndecodableImage);
}

#[tokio::test]
async fn test_missing_output_slot_is_malformed() {
    let config = Config {
        output_slot: "output1".to_string(),
        ..Config::default()
    };
    let loader = MemoryLoader::new(&[("candy.onnx", [0, 0, 0])]);
    let stylizer = Stylizer::with_loader(config, loader).unwrap();

    let err = stylizer
        .stylize("candy.onnx", gradient(8, 8), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::MalformedOutput);
}

#[tokio::test]
async fn test_panicking_model_reports_worker_lost() {
    let model = PanickingModel(ModelDescription {
        name: "crash".to_string(),
        inputs: vec![SlotDescription::float32("image", vec![1, 3, 4, 4])],
        outputs: vec![SlotDescription::float32("stylizedImage", vec![1, 3, 4, 4])],
    });

    let err = stylizer()
        .submit_loaded(model, gradient(4, 4), None)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::WorkerLost);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_requests_are_independent() {
    let stylizer = stylizer();

    // The slower request is submitted first so the two overlap
    let slow = stylizer.submit_loaded(
        InvertModel::new("slow-invert", 32).with_delay(Duration::from_millis(100)),
        gradient(32, 32),
        None,
    );
    let fast = stylizer.submit_loaded(
        FlatColorModel::new([9, 8, 7], 32, (32, 32)),
        gradient(32, 32),
        None,
    );

    let (slow, fast) = tokio::join!(slow, fast);
    let (slow, fast) = (slow.unwrap(), fast.unwrap());

    assert!(is_flat(&fast, [9, 8, 7]));
    let pixels = slow.pixels().unwrap();
    assert_eq!(&pixels[..3], &[255, 255, 127]);
    assert!(!is_flat(&slow, [9, 8, 7]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_styles_via_loader() {
    let stylizer = stylizer();

    let candy = stylizer.submit("candy.onnx".into(), gradient(50, 40), None);
    let udnie = stylizer.submit("udnie.onnx".into(), gradient(40, 50), None);
    let (candy, udnie) = tokio::join!(candy, udnie);

    assert!(is_flat(&candy.unwrap(), [200, 40, 90]));
    assert!(is_flat(&udnie.unwrap(), [10, 20, 30]));
}

#[test]
fn test_run_blocking_without_runtime() {
    let stylized = stylizer()
        .run_blocking(Path::new("udnie.onnx"), &gradient(20, 10), None)
        .unwrap();

    assert!(is_flat(&stylized, [10, 20, 30]));
}
