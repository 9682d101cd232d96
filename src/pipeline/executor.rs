//! Single forward pass of a style model over a content image.

use ndarray::Ix4;

use crate::error::{Error, Result};
use crate::image::{center_crop_and_scale, image_to_tensor, tensor_to_bitmap, Bitmap, ImageTensor};
use crate::model::{
    FeatureInput, FeatureValue, ImageConstraint, InferenceResult, ModelDescription, StyleModel,
};

use super::Config;

/// Progress of one stylization, from request to delivery.
///
/// Stages only move forward. `Delivered` is terminal whether the result is an
/// image or an error; a new request starts again at `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Idle,
    Loading,
    Adapting,
    AssemblingInput,
    RunningInference,
    DecodingOutput,
    Delivered,
}

/// Runs a loaded model over a content image and decodes the stylized result.
#[derive(Debug, Clone)]
pub struct Executor {
    config: Config,
}

impl Executor {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Image constraint of the configured input slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the model has no such input, or it is not image-shaped.
    pub fn input_constraint(&self, description: &ModelDescription) -> Result<ImageConstraint> {
        let slot_name = &self.config.input_slot;
        let slot = description.input(slot_name).ok_or_else(|| {
            let inputs: Vec<&str> = description.inputs.iter().map(|s| s.name.as_str()).collect();
            Error::MissingInputConstraint {
                slot: slot_name.clone(),
                reason: format!("model {} has inputs {inputs:?}", description.name),
            }
        })?;

        ImageConstraint::from_slot(
            slot,
            self.config.channel_order,
            self.config.value_range,
            self.config.fallback_size,
        )
    }

    /// Stylize `content` with `model`.
    ///
    /// The model is consumed: it serves exactly this one call. `style` is
    /// accepted for interface symmetry but never fed to the model, whose
    /// weights already encode its style.
    ///
    /// # Errors
    ///
    /// Returns an error from the first stage that fails; later stages do not run.
    pub fn infer<M: StyleModel>(
        &self,
        mut model: M,
        content: &Bitmap,
        style: Option<&Bitmap>,
    ) -> Result<Bitmap> {
        if let Some(style) = style {
            tracing::debug!(
                "Style reference {}x{} is not a model input; using the style baked into {}",
                style.width(),
                style.height(),
                model.description().name
            );
        }

        tracing::debug!(
            stage = ?Stage::Adapting,
            "Adapting {}x{} content image",
            content.width(),
            content.height()
        );
        let constraint = self.input_constraint(model.description())?;
        let tensor = adapt(&constraint, content)?;

        tracing::debug!(
            stage = ?Stage::AssemblingInput,
            "Assembling input {:?}",
            self.config.input_slot
        );
        let input = self.assemble(&constraint, tensor)?;

        tracing::debug!(stage = ?Stage::RunningInference, "Running forward pass");
        let result = model.predict(&input)?;

        tracing::debug!(
            stage = ?Stage::DecodingOutput,
            "Decoding output {:?}",
            self.config.output_slot
        );
        self.decode(result)
    }

    fn assemble(&self, constraint: &ImageConstraint, tensor: ImageTensor) -> Result<FeatureInput> {
        let expected = constraint.tensor_shape();
        if tensor.shape() != &expected[..] {
            return Err(Error::ShapeMismatch {
                expected: format!("{expected:?}"),
                actual: format!("{:?}", tensor.shape()),
            });
        }

        let mut input = FeatureInput::new();
        input.insert(self.config.input_slot.clone(), tensor.into_dyn())?;
        Ok(input)
    }

    fn decode(&self, mut result: InferenceResult) -> Result<Bitmap> {
        let slot = &self.config.output_slot;
        let malformed = |reason: String| Error::MalformedOutput {
            slot: slot.clone(),
            reason,
        };

        let Some(value) = result.take(slot) else {
            return Err(malformed(format!(
                "absent, model produced {:?}",
                result.names().collect::<Vec<_>>()
            )));
        };

        let tensor = match value {
            FeatureValue::Tensor(tensor) => tensor,
            FeatureValue::Opaque { element } => {
                return Err(malformed(format!("{element} value is not an image buffer")));
            }
        };

        let shape = tensor.shape().to_vec();
        let tensor = tensor
            .into_dimensionality::<Ix4>()
            .map_err(|_| malformed(format!("expected shape [1, C, H, W], got {shape:?}")))?;

        tensor_to_bitmap(&tensor, self.config.channel_order, self.config.value_range)
            .map_err(|err| malformed(err.to_string()))
    }
}

/// Bring the content image to the constraint's size and layout.
fn adapt(constraint: &ImageConstraint, content: &Bitmap) -> Result<ImageTensor> {
    let image = content.to_dynamic()?;
    let (cropped, _) = center_crop_and_scale(&image, constraint.width, constraint.height)?;
    Ok(image_to_tensor(&cropped, constraint.format, constraint.value_range))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::image::{PixelFormat, TensorFormat, ValueRange};
    use crate::model::SlotDescription;
    use ndarray::{Array4, ArrayD};

    /// Echoes its input tensor back under a configurable output name.
    struct Echo {
        description: ModelDescription,
        output_slot: String,
    }

    impl Echo {
        fn new(input_shape: Vec<i64>, output_slot: &str) -> Self {
            Self {
                description: ModelDescription {
                    name: "echo".to_string(),
                    inputs: vec![SlotDescription::float32("image", input_shape.clone())],
                    outputs: vec![SlotDescription::float32(output_slot, input_shape)],
                },
                output_slot: output_slot.to_string(),
            }
        }
    }

    impl StyleModel for Echo {
        fn description(&self) -> &ModelDescription {
            &self.description
        }

        fn predict(&mut self, input: &FeatureInput) -> Result<InferenceResult> {
            let mut result = InferenceResult::new();
            let tensor = input
                .get("image")
                .cloned()
                .unwrap_or_else(|| ArrayD::zeros(vec![0]));
            result.insert(self.output_slot.clone(), FeatureValue::Tensor(tensor));
            Ok(result)
        }
    }

    fn content(width: u32, height: u32) -> Bitmap {
        let pixels = (0..width * height)
            .flat_map(|i| {
                let v = (i % 256) as u8;
                [v, 255 - v, 7]
            })
            .collect();
        Bitmap::new(width, height, PixelFormat::Rgb8, pixels).unwrap()
    }

    #[test]
    fn test_echo_returns_center_crop() {
        let executor = Executor::new(Config::default());
        let bitmap = executor
            .infer(
                Echo::new(vec![1, 3, 4, 4], "stylizedImage"),
                &content(4, 4),
                None,
            )
            .unwrap();

        assert_eq!(bitmap, content(4, 4));
    }

    #[test]
    fn test_output_takes_model_dimensions() {
        let executor = Executor::new(Config::default());
        let bitmap = executor
            .infer(
                Echo::new(vec![1, 3, 32, 48], "stylizedImage"),
                &content(400, 300),
                None,
            )
            .unwrap();

        assert_eq!(bitmap.dimensions(), (48, 32));
    }

    #[test]
    fn test_missing_input_slot() {
        let config = Config {
            input_slot: "input1".to_string(),
            ..Config::default()
        };
        let err = Executor::new(config)
            .infer(
                Echo::new(vec![1, 3, 4, 4], "stylizedImage"),
                &content(4, 4),
                None,
            )
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::MissingInputConstraint);
    }

    #[test]
    fn test_unbacked_content_is_rejected() {
        let err = Executor::new(Config::default())
            .infer(
                Echo::new(vec![1, 3, 4, 4], "stylizedImage"),
                &Bitmap::unbacked(4, 4, PixelFormat::Rgb8),
                None,
            )
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::UndecodableImage);
    }

    #[test]
    fn test_missing_output_slot() {
        let err = Executor::new(Config::default())
            .infer(Echo::new(vec![1, 3, 4, 4], "output1"), &content(4, 4), None)
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::MalformedOutput);
    }

    #[test]
    fn test_assemble_rejects_wrong_shape() {
        let executor = Executor::new(Config::default());
        let constraint = ImageConstraint {
            width: 8,
            height: 8,
            format: TensorFormat::Rgb,
            value_range: ValueRange::ZeroTo255,
        };

        let err = executor
            .assemble(&constraint, Array4::zeros((1, 3, 4, 8)))
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::InputTensorConstruction);

        let input = executor
            .assemble(&constraint, Array4::zeros((1, 3, 8, 8)))
            .unwrap();
        let shape = input.get("image").map(|t| t.shape().to_vec());
        assert_eq!(shape, Some(vec![1, 3, 8, 8]));
    }

    #[test]
    fn test_decode_rejects_non_buffer_output() {
        let executor = Executor::new(Config::default());

        let mut result = InferenceResult::new();
        result.insert(
            "stylizedImage",
            FeatureValue::Opaque {
                element: "Int64".to_string(),
            },
        );
        let err = executor.decode(result).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedOutput);

        let mut result = InferenceResult::new();
        let flat = ArrayD::zeros(vec![3, 8, 8]);
        result.insert("stylizedImage", FeatureValue::Tensor(flat));
        let err = executor.decode(result).unwrap_err();
        assert_eq!(err.kind(), FailureKind::MalformedOutput);
    }
}
