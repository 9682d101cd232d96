//! Petra CLI - apply neural style transfer to photos.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use petra::model::{ModelLoader, StyleModel};
use petra::pipeline::Executor;
use petra::{image, Config, OnnxLoader, StyleCatalog, Stylizer};

/// Apply neural style transfer to photos with ONNX style models.
#[derive(Parser, Debug)]
#[command(name = "petra")]
#[command(version, about, long_about = None)]
struct Cli {
    /// JSON configuration file. Command-line flags override its values.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a style to a content photo.
    Apply(ApplyArgs),

    /// List the styles available in a models directory.
    Styles {
        /// Directory containing one `.onnx` model per style.
        #[arg(long, default_value = "models", value_name = "DIR")]
        models_dir: PathBuf,
    },

    /// Show a model's inputs, outputs and the image constraint derived from them.
    Inspect {
        /// Path to an `.onnx` style model.
        #[arg(value_name = "MODEL")]
        model: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ApplyArgs {
    /// Content photo path.
    #[arg(value_name = "CONTENT")]
    content: PathBuf,

    /// Output image path.
    #[arg(value_name = "OUTPUT")]
    output: PathBuf,

    /// Style name from the models directory. Defaults to the preset style.
    #[arg(short, long, value_name = "NAME", conflicts_with = "model")]
    style: Option<String>,

    /// Explicit model file, bypassing the style catalog.
    #[arg(short, long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Directory containing one `.onnx` model per style.
    #[arg(long, default_value = "models", value_name = "DIR")]
    models_dir: PathBuf,

    /// Output JPEG quality (1-100).
    #[arg(short, long, value_name = "INT")]
    quality: Option<u8>,

    /// ONNX Runtime intra-op threads (0 = runtime default).
    #[arg(long, value_name = "INT")]
    threads: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("petra={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(cli).await {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path).context("Failed to load configuration")?,
        None => Config::default(),
    };

    match cli.command {
        Command::Apply(args) => apply(config, args).await,
        Command::Styles { models_dir } => list_styles(&config, &models_dir),
        Command::Inspect { model } => inspect(config, model).await,
    }
}

async fn apply(mut config: Config, args: ApplyArgs) -> Result<()> {
    if !args.content.exists() {
        anyhow::bail!("Content image does not exist: {}", args.content.display());
    }

    if let Some(quality) = args.quality {
        config.output_quality = quality;
    }
    if let Some(threads) = args.threads {
        config.intra_threads = threads;
    }

    let model_path = match args.model {
        Some(path) => path,
        None => {
            let catalog = load_catalog(&config, &args.models_dir)?;
            let entry = catalog
                .resolve(args.style.as_deref())
                .context("Failed to choose a style")?;
            tracing::info!("Applying style {:?}", entry.name);
            entry.model.clone()
        }
    };

    let content = image::load_bitmap(&args.content).context("Failed to load content image")?;
    let quality = config.output_quality;
    let stylizer = Stylizer::new(config).context("Invalid configuration")?;

    let spinner = spinner("Applying style...");
    let result = stylizer.stylize(&model_path, content, None).await;
    spinner.finish_and_clear();

    let stylized = result
        .with_context(|| format!("Could not apply the style in {}", model_path.display()))?;

    image::save_bitmap(&stylized, &args.output, quality).context("Failed to save stylized image")?;

    println!(
        "Successfully stylized {} -> {}",
        args.content.display(),
        args.output.display()
    );

    Ok(())
}

fn list_styles(config: &Config, models_dir: &Path) -> Result<()> {
    let catalog = load_catalog(config, models_dir)?;
    if catalog.is_empty() {
        println!("No style models found in {}", models_dir.display());
        return Ok(());
    }

    let default = catalog.default_style().map(|entry| entry.name.as_str());
    for entry in catalog.entries() {
        let marker = if Some(entry.name.as_str()) == default {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<20} {}", entry.name, entry.model.display());
    }

    Ok(())
}

async fn inspect(config: Config, model_path: PathBuf) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let loader = OnnxLoader::new(&config);

    let spinner = spinner("Compiling model...");
    let loaded = tokio::task::spawn_blocking(move || loader.load(&model_path))
        .await
        .context("Model loading task failed")?;
    spinner.finish_and_clear();
    let model = loaded.context("Failed to load model")?;

    let description = model.description();
    println!("Model: {}", description.name);
    println!("Inputs:");
    for slot in &description.inputs {
        println!("  {:<20} {:?} {:?}", slot.name, slot.element, slot.shape);
    }
    println!("Outputs:");
    for slot in &description.outputs {
        println!("  {:<20} {:?} {:?}", slot.name, slot.element, slot.shape);
    }

    let executor = Executor::new(config);
    match executor.input_constraint(description) {
        Ok(constraint) => println!(
            "Image constraint: {}x{} {:?}, values {:?}",
            constraint.width, constraint.height, constraint.format, constraint.value_range
        ),
        Err(err) => println!("Image constraint: unavailable ({err})"),
    }
    if description.output(&executor.config().output_slot).is_none() {
        println!(
            "Warning: no output named {:?}; set output_slot in the configuration",
            executor.config().output_slot
        );
    }

    Ok(())
}

fn load_catalog(config: &Config, models_dir: &Path) -> Result<StyleCatalog> {
    let catalog = StyleCatalog::from_dir(models_dir).context("Failed to read style models")?;
    match &config.default_style {
        Some(name) => catalog
            .with_default(name)
            .context("Configured default style is not available"),
        None => Ok(catalog),
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .expect("valid template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
