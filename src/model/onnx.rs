//! ONNX Runtime backed style model.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};

use ort::session::{Session, SessionInputValue};
use ort::tensor::TensorElementType;
use ort::value::{Tensor, ValueType};

use crate::error::{Error, Result};

use super::{
    CompiledArtifact, ElementType, FeatureInput, FeatureValue, InferenceResult, ModelDescription,
    SlotDescription, StyleModel,
};

/// A style model running in an ONNX Runtime session.
pub struct OnnxStyleModel {
    session: Session,
    description: ModelDescription,
    artifact: PathBuf,
}

impl OnnxStyleModel {
    pub(crate) fn new(artifact: &CompiledArtifact, session: Session) -> Self {
        let description = ModelDescription {
            name: artifact.name.clone(),
            inputs: session
                .inputs
                .iter()
                .map(|input| describe_slot(&input.name, &input.input_type))
                .collect(),
            outputs: session
                .outputs
                .iter()
                .map(|output| describe_slot(&output.name, &output.output_type))
                .collect(),
        };

        Self {
            session,
            description,
            artifact: artifact.path.clone(),
        }
    }

    /// Path of the compiled artifact this session was created from.
    #[must_use]
    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }
}

impl fmt::Debug for OnnxStyleModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnnxStyleModel")
            .field("description", &self.description)
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}

impl StyleModel for OnnxStyleModel {
    fn description(&self) -> &ModelDescription {
        &self.description
    }

    fn predict(&mut self, input: &FeatureInput) -> Result<InferenceResult> {
        let mut values: Vec<(Cow<'_, str>, SessionInputValue<'_>)> =
            Vec::with_capacity(input.len());
        for (name, tensor) in input.iter() {
            if self.description.input(name).is_none() {
                return Err(Error::InferenceRejected {
                    reason: format!("model {} has no input {name:?}", self.description.name),
                });
            }
            let value =
                Tensor::from_array(tensor.clone()).map_err(|source| Error::Inference { source })?;
            values.push((Cow::Borrowed(name), SessionInputValue::from(value)));
        }

        let outputs = self
            .session
            .run(values)
            .map_err(|source| Error::Inference { source })?;

        let mut result = InferenceResult::new();
        for slot in &self.description.outputs {
            let Some(value) = outputs.get(slot.name.as_str()) else {
                continue;
            };
            let feature = match value.try_extract_array::<f32>() {
                Ok(array) => FeatureValue::Tensor(array.to_owned()),
                Err(_) => FeatureValue::Opaque {
                    element: format!("{:?}", slot.element),
                },
            };
            result.insert(slot.name.clone(), feature);
        }

        Ok(result)
    }
}

fn describe_slot(name: &str, value_type: &ValueType) -> SlotDescription {
    match value_type {
        ValueType::Tensor { ty, shape, .. } => SlotDescription {
            name: name.to_string(),
            element: if matches!(ty, TensorElementType::Float32) {
                ElementType::Float32
            } else {
                ElementType::Other(format!("{ty:?}"))
            },
            shape: shape.iter().copied().collect(),
        },
        other => SlotDescription {
            name: name.to_string(),
            element: ElementType::Other(format!("{other:?}")),
            shape: Vec::new(),
        },
    }
}
