//! # Petra
//!
//! Neural style transfer for photos, running ONNX style models on-device.
//!
//! A style model encodes exactly one style. Applying a style loads its model
//! (compiling the ONNX graph first), center-crops and scales the content photo
//! to the model's input, runs one forward pass, and decodes the stylized
//! output. The work runs on a background thread and the result is delivered
//! through a future that resolves exactly once.
//!
//! ## Example
//!
//! ```no_run
//! use petra::{image, Config, StyleCatalog, Stylizer};
//!
//! # async fn run() -> petra::Result<()> {
//! let catalog = StyleCatalog::from_dir("models")?;
//! let style = catalog.resolve(Some("starry"))?;
//!
//! let stylizer = Stylizer::new(Config::default())?;
//! let content = image::load_bitmap("pet.jpg")?;
//! let stylized = stylizer.stylize(&style.model, content, None).await?;
//!
//! image::save_bitmap(&stylized, "pet-starry.png", 95)?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;

pub use error::{Error, FailureKind, Result};
pub use crate::image::{Bitmap, PixelFormat};
pub use model::{ModelLoader, OnnxLoader, StyleCatalog, StyleModel};
pub use pipeline::{Config, PendingStylization, Stage, Stylizer};
