//! Style models: loading, description, and the inputs and outputs of a forward pass.
//!
//! One model encodes one style. Choosing a different style means loading a
//! different model; see [`StyleCatalog`].

mod catalog;
mod loader;
mod onnx;

pub use catalog::{StyleCatalog, StyleEntry};
pub use loader::{CompiledArtifact, ModelLoader, OnnxLoader};
pub use onnx::OnnxStyleModel;

use std::collections::BTreeMap;

use ndarray::ArrayD;

use crate::error::{Error, Result};
use crate::image::{ChannelOrder, TensorFormat, ValueRange};

/// Element type of a model input or output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementType {
    Float32,
    /// Any other element type, by runtime name.
    Other(String),
}

/// Name, element type and shape of one model input or output.
///
/// Dynamic dimensions are recorded as `-1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotDescription {
    pub name: String,
    pub element: ElementType,
    pub shape: Vec<i64>,
}

impl SlotDescription {
    /// A `f32` tensor slot.
    #[must_use]
    pub fn float32(name: impl Into<String>, shape: impl Into<Vec<i64>>) -> Self {
        Self {
            name: name.into(),
            element: ElementType::Float32,
            shape: shape.into(),
        }
    }
}

/// Inputs and outputs of a loaded model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDescription {
    pub name: String,
    pub inputs: Vec<SlotDescription>,
    pub outputs: Vec<SlotDescription>,
}

impl ModelDescription {
    #[must_use]
    pub fn input(&self, name: &str) -> Option<&SlotDescription> {
        self.inputs.iter().find(|slot| slot.name == name)
    }

    #[must_use]
    pub fn output(&self, name: &str) -> Option<&SlotDescription> {
        self.outputs.iter().find(|slot| slot.name == name)
    }
}

/// What an image input slot requires: size, channel layout and value range.
///
/// Crop and scale policy is always center-crop-and-scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageConstraint {
    pub width: u32,
    pub height: u32,
    pub format: TensorFormat,
    pub value_range: ValueRange,
}

impl ImageConstraint {
    /// Derive the constraint for an image slot shaped `[1, C, H, W]`.
    ///
    /// Channel order and value range are not recorded in ONNX metadata, so they
    /// come from configuration. Dynamic batch is accepted; dynamic height or
    /// width falls back to `fallback_size`.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot is not a `f32` tensor of that shape.
    pub fn from_slot(
        slot: &SlotDescription,
        order: ChannelOrder,
        value_range: ValueRange,
        fallback_size: u32,
    ) -> Result<Self> {
        let missing = |reason: String| Error::MissingInputConstraint {
            slot: slot.name.clone(),
            reason,
        };

        if slot.element != ElementType::Float32 {
            return Err(missing(format!("element type is {:?}, not f32", slot.element)));
        }

        let &[batch, channels, height, width] = slot.shape.as_slice() else {
            return Err(missing(format!("expected shape [1, C, H, W], got {:?}", slot.shape)));
        };

        if batch != 1 && batch >= 0 {
            return Err(missing(format!("batch size is {batch}, not 1")));
        }

        let format = usize::try_from(channels)
            .ok()
            .and_then(|c| TensorFormat::for_channels(c, order))
            .ok_or_else(|| missing(format!("{channels} channels, expected 1 or 3")))?;

        let dimension = |value: i64| -> Result<u32> {
            if value < 0 {
                return Ok(fallback_size);
            }
            u32::try_from(value)
                .ok()
                .filter(|&v| v > 0)
                .ok_or_else(|| missing(format!("unusable spatial dimension {value}")))
        };

        Ok(Self {
            width: dimension(width)?,
            height: dimension(height)?,
            format,
            value_range,
        })
    }

    /// Tensor shape `[1, C, H, W]` an adapted image has under this constraint.
    #[must_use]
    pub const fn tensor_shape(&self) -> [usize; 4] {
        [
            1,
            self.format.channels(),
            self.height as usize,
            self.width as usize,
        ]
    }
}

/// Named model inputs, built fresh for each forward pass.
#[derive(Debug, Clone, Default)]
pub struct FeatureInput {
    values: BTreeMap<String, ArrayD<f32>>,
}

impl FeatureInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a tensor to an input slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot already has a value.
    pub fn insert(&mut self, slot: impl Into<String>, tensor: ArrayD<f32>) -> Result<()> {
        let slot = slot.into();
        if self.values.contains_key(&slot) {
            return Err(Error::DuplicateSlot { slot });
        }
        self.values.insert(slot, tensor);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, slot: &str) -> Option<&ArrayD<f32>> {
        self.values.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.values
            .iter()
            .map(|(name, tensor)| (name.as_str(), tensor))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One output value of a forward pass.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Tensor(ArrayD<f32>),
    /// An output that is not a `f32` tensor (sequences, maps, integer tensors).
    Opaque { element: String },
}

/// Named outputs of one forward pass.
#[derive(Debug, Clone, Default)]
pub struct InferenceResult {
    values: BTreeMap<String, FeatureValue>,
}

impl InferenceResult {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: impl Into<String>, value: FeatureValue) {
        self.values.insert(slot.into(), value);
    }

    #[must_use]
    pub fn get(&self, slot: &str) -> Option<&FeatureValue> {
        self.values.get(slot)
    }

    /// Remove and return an output slot's value.
    pub fn take(&mut self, slot: &str) -> Option<FeatureValue> {
        self.values.remove(slot)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// A loaded, ready-to-run style model.
///
/// A model is moved into exactly one inference call.
pub trait StyleModel: Send {
    fn description(&self) -> &ModelDescription;

    /// Run one forward pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the input or fails internally.
    fn predict(&mut self, input: &FeatureInput) -> Result<InferenceResult>;
}

impl<M: StyleModel + ?Sized> StyleModel for Box<M> {
    fn description(&self) -> &ModelDescription {
        (**self).description()
    }

    fn predict(&mut self, input: &FeatureInput) -> Result<InferenceResult> {
        (**self).predict(input)
    }
}
