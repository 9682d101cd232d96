//! Asynchronous style transfer: load, infer, and deliver exactly once.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tokio::sync::oneshot;

use crate::error::{Error, Result};
use crate::image::Bitmap;
use crate::model::{ModelLoader, OnnxLoader, StyleModel};

use super::{Config, Executor, Stage};

/// Entry point of the style transfer pipeline.
///
/// Every request loads its own model, runs one forward pass on tokio's
/// blocking pool, and resolves a [`PendingStylization`] exactly once.
/// Requests share no mutable state, so any number may run at the same time.
pub struct Stylizer<L: ModelLoader = OnnxLoader> {
    loader: Arc<L>,
    executor: Arc<Executor>,
}

impl<L: ModelLoader> Clone for Stylizer<L> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl Stylizer<OnnxLoader> {
    /// Create a stylizer that loads ONNX models.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        let loader = OnnxLoader::new(&config);
        Self::with_loader(config, loader)
    }
}

impl<L: ModelLoader> Stylizer<L> {
    /// Create a stylizer with a custom model loader.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_loader(config: Config, loader: L) -> Result<Self> {
        config.validate()?;

        tracing::debug!("Initializing stylizer with config: {config:?}");

        Ok(Self {
            loader: Arc::new(loader),
            executor: Arc::new(Executor::new(config)),
        })
    }

    #[must_use]
    pub fn loader(&self) -> &L {
        &self.loader
    }

    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Load the model at `location` and stylize `content`, on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or any inference stage fails.
    pub fn run_blocking(
        &self,
        location: &Path,
        content: &Bitmap,
        style: Option<&Bitmap>,
    ) -> Result<Bitmap> {
        process(
            self.loader.as_ref(),
            &self.executor,
            location,
            content,
            style,
        )
    }

    /// Start stylizing `content` with the model at `location`.
    ///
    /// Must be called from within a tokio runtime; otherwise the returned
    /// future resolves to a [`FailureKind::WorkerLost`](crate::FailureKind::WorkerLost) error.
    pub fn submit(
        &self,
        location: PathBuf,
        content: Bitmap,
        style: Option<Bitmap>,
    ) -> PendingStylization {
        let loader = Arc::clone(&self.loader);
        let executor = Arc::clone(&self.executor);

        spawn_delivery(move || {
            process(
                loader.as_ref(),
                &executor,
                &location,
                &content,
                style.as_ref(),
            )
        })
    }

    /// Start stylizing `content` with an already loaded model.
    pub fn submit_loaded<M: StyleModel + 'static>(
        &self,
        model: M,
        content: Bitmap,
        style: Option<Bitmap>,
    ) -> PendingStylization {
        let executor = Arc::clone(&self.executor);

        spawn_delivery(move || {
            let span = tracing::info_span!("stylize", model = %model.description().name);
            let _guard = span.enter();
            let started = Instant::now();

            let result = executor.infer(model, &content, style.as_ref());
            report(&result, started);
            result
        })
    }

    /// Stylize `content` with the model at `location`.
    ///
    /// # Errors
    ///
    /// Returns an error if loading or any inference stage fails.
    pub async fn stylize(
        &self,
        location: impl Into<PathBuf>,
        content: Bitmap,
        style: Option<Bitmap>,
    ) -> Result<Bitmap> {
        self.submit(location.into(), content, style).await
    }
}

/// The eventual result of a submitted stylization.
///
/// Resolves exactly once. Dropping it does not cancel a forward pass that is
/// already running; the result is discarded when it arrives.
#[must_use = "a stylization result is only observable by awaiting it"]
#[derive(Debug)]
pub struct PendingStylization {
    rx: oneshot::Receiver<Result<Bitmap>>,
}

impl PendingStylization {
    /// Wait for the result, collapsing every failure into `None`.
    pub async fn into_option(self) -> Option<Bitmap> {
        self.await.ok()
    }
}

impl Future for PendingStylization {
    type Output = Result<Bitmap>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(Error::WorkerLost {
                    reason: "worker stopped before delivering a result".to_string(),
                })
            })
        })
    }
}

fn spawn_delivery<F>(job: F) -> PendingStylization
where
    F: FnOnce() -> Result<Bitmap> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(move || {
                if tx.send(job()).is_err() {
                    tracing::debug!("Stylization result discarded, receiver dropped");
                }
            });
        }
        Err(err) => {
            let _ = tx.send(Err(Error::WorkerLost {
                reason: format!("no async runtime: {err}"),
            }));
        }
    }

    PendingStylization { rx }
}

fn process<L: ModelLoader>(
    loader: &L,
    executor: &Executor,
    location: &Path,
    content: &Bitmap,
    style: Option<&Bitmap>,
) -> Result<Bitmap> {
    let span = tracing::info_span!("stylize", model = %location.display());
    let _guard = span.enter();
    let started = Instant::now();

    tracing::info!(stage = ?Stage::Loading, "Loading model");
    let result = loader
        .load(location)
        .and_then(|model| executor.infer(model, content, style));

    report(&result, started);
    result
}

fn report(result: &Result<Bitmap>, started: Instant) {
    match result {
        Ok(bitmap) => tracing::info!(
            stage = ?Stage::Delivered,
            "Stylized {}x{} image in {:.2?}",
            bitmap.width(),
            bitmap.height(),
            started.elapsed()
        ),
        Err(err) => tracing::warn!(
            stage = ?Stage::Delivered,
            failed_in = ?err.kind().stage(),
            kind = ?err.kind(),
            "Stylization failed: {err}"
        ),
    }
}
