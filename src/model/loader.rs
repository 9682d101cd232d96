//! Model compilation and loading.

use std::fs;
use std::path::{Path, PathBuf};

use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;

use crate::error::{Error, Result};
use crate::pipeline::Config;

use super::{OnnxStyleModel, StyleModel};

/// Turns a model location into a ready-to-run model.
///
/// Loading is all-or-nothing: an error never comes with a partially usable model.
pub trait ModelLoader: Send + Sync + 'static {
    type Model: StyleModel + 'static;

    /// Load the model stored at `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be compiled or instantiated.
    fn load(&self, location: &Path) -> Result<Self::Model>;
}

/// A model artifact after graph optimization, written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    /// Name of the source model (file stem).
    pub name: String,
    /// The uncompiled artifact this was compiled from.
    pub source: PathBuf,
    /// The compiled artifact.
    pub path: PathBuf,
}

/// Loads ONNX style models through ONNX Runtime.
///
/// Compilation runs the runtime's graph optimizer over the source model and
/// saves the optimized graph into the compile directory, one file per load.
/// Instantiation then opens a session on that file. Compiled artifacts are
/// never reused and are left for the system to clean up.
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    optimization_level: u8,
    intra_threads: usize,
    compile_dir: PathBuf,
}

impl OnnxLoader {
    /// Create a loader from the model-related parts of `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            optimization_level: config.optimization_level,
            intra_threads: config.intra_threads,
            compile_dir: config.compile_dir(),
        }
    }

    #[must_use]
    pub fn compile_dir(&self) -> &Path {
        &self.compile_dir
    }

    /// Compile the model at `location` into an optimized artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the source artifact is missing or malformed, or the
    /// compiled artifact cannot be written.
    pub fn compile(&self, location: &Path) -> Result<CompiledArtifact> {
        let compile_err = |reason: String| Error::ModelCompile {
            path: location.to_path_buf(),
            reason,
        };

        if !location.is_file() {
            return Err(compile_err("no model artifact at this location".to_string()));
        }

        fs::create_dir_all(&self.compile_dir).map_err(|source| Error::CompileDir {
            path: self.compile_dir.clone(),
            source,
        })?;

        let name = location
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();
        let path = self
            .compile_dir
            .join(format!("{name}-{}.onnx", uuid::Uuid::new_v4()));
        let path_str = path
            .to_str()
            .ok_or_else(|| compile_err(format!("compile path {} is not UTF-8", path.display())))?;

        tracing::info!(
            "Compiling {} (optimization level {})",
            location.display(),
            self.optimization_level
        );

        let builder = self
            .builder(compile_err)?
            .with_optimization_level(optimization_level(self.optimization_level))
            .map_err(|e| compile_err(e.to_string()))?
            .with_optimized_model_path(path_str)
            .map_err(|e| compile_err(e.to_string()))?;

        // The session is only needed for its side effect of writing the optimized graph
        let session = builder
            .commit_from_file(location)
            .map_err(|e| compile_err(e.to_string()))?;
        drop(session);

        if !path.is_file() {
            return Err(compile_err("runtime did not write a compiled artifact".to_string()));
        }

        tracing::debug!("Compiled artifact written to {}", path.display());

        Ok(CompiledArtifact {
            name,
            source: location.to_path_buf(),
            path,
        })
    }

    /// Open a session on a compiled artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot load the compiled artifact.
    pub fn instantiate(&self, artifact: &CompiledArtifact) -> Result<OnnxStyleModel> {
        let instantiate_err = |reason: String| Error::ModelInstantiate {
            path: artifact.path.clone(),
            reason,
        };

        // Already optimized at compile time
        let session = self
            .builder(instantiate_err)?
            .with_optimization_level(GraphOptimizationLevel::Disable)
            .map_err(|e| instantiate_err(e.to_string()))?
            .commit_from_file(&artifact.path)
            .map_err(|e| instantiate_err(e.to_string()))?;

        let model = OnnxStyleModel::new(artifact, session);
        tracing::debug!(
            "Instantiated {} with {} input(s), {} output(s)",
            artifact.name,
            model.description().inputs.len(),
            model.description().outputs.len()
        );

        Ok(model)
    }

    fn builder(&self, err: impl Fn(String) -> Error) -> Result<SessionBuilder> {
        let builder = Session::builder().map_err(|e| err(e.to_string()))?;
        if self.intra_threads == 0 {
            return Ok(builder);
        }
        builder
            .with_intra_threads(self.intra_threads)
            .map_err(|e| err(e.to_string()))
    }
}

impl ModelLoader for OnnxLoader {
    type Model = OnnxStyleModel;

    fn load(&self, location: &Path) -> Result<OnnxStyleModel> {
        let artifact = self.compile(location)?;
        self.instantiate(&artifact)
    }
}

const fn optimization_level(level: u8) -> GraphOptimizationLevel {
    match level {
        0 => GraphOptimizationLevel::Disable,
        1 => GraphOptimizationLevel::Level1,
        2 => GraphOptimizationLevel::Level2,
        _ => GraphOptimizationLevel::Level3,
    }
}
