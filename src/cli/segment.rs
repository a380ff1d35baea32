// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::SegmentationConfig;
use crate::vision::{LabelColorRegistry, SegmentationResult, SegmentationSession};

/// Arguments for the segment command
#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// Image to segment
    #[arg(long, short)]
    pub input: PathBuf,

    /// Where to write the overlay image (format from extension)
    #[arg(long, short)]
    pub output: PathBuf,

    /// Also write the unblended class-color mask here
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Directory holding the model asset
    #[arg(long, env = "CAMSEG_ASSET_DIR")]
    pub assets: Option<PathBuf>,

    /// Model file name inside the asset directory
    #[arg(long, env = "CAMSEG_MODEL_FILE")]
    pub model: Option<String>,

    /// Run on the CUDA execution provider
    #[arg(long)]
    pub gpu: bool,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print a JSON summary instead of the text legend
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the labels command
#[derive(Args, Debug)]
pub struct LabelsArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

/// Merge config file, environment and flags; flags win
pub fn resolve_config(args: &SegmentArgs) -> Result<SegmentationConfig> {
    let mut config = match &args.config {
        Some(path) => SegmentationConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?
            .with_env_overrides(),
        None => SegmentationConfig::from_env(),
    };

    if let Some(dir) = &args.assets {
        config.asset_dir = dir.clone();
    }
    if let Some(model) = &args.model {
        config.model_file = model.clone();
    }
    if args.gpu {
        config.use_gpu_delegate = true;
    }

    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

/// Segment one image file and write the overlay
pub async fn segment_image(args: SegmentArgs) -> Result<()> {
    let config = resolve_config(&args)?;
    info!(
        "Segmenting {} with {}",
        args.input.display(),
        config.model_path().display()
    );

    let image = image::open(&args.input)
        .with_context(|| format!("Failed to read image {}", args.input.display()))?;

    let session = SegmentationSession::new(config);
    let outcome = run_session(&session, image).await;
    let registry = session.registry().clone();
    // Release the engine whether or not the run succeeded
    session.close().await.context("Failed to close segmentation session")?;
    let result = outcome?;

    save_image(&result.overlay, &args.output)?;
    if let Some(mask_path) = &args.mask {
        let mask = crate::vision::SegmentationPostprocessor::new(registry.clone())
            .build_mask(&result.segmentation_map)
            .context("Failed to build class mask")?;
        save_image(&mask, mask_path)?;
    }

    if args.json {
        let summary = result.summary(&registry);
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_report(&result, &registry, &args.output);
    }

    Ok(())
}

async fn run_session(
    session: &SegmentationSession,
    image: image::DynamicImage,
) -> Result<SegmentationResult> {
    session
        .initialize()
        .await
        .context("Failed to initialize segmentation model")?;
    let result = session.segment(image).await.context("Segmentation failed")?;
    Ok(result)
}

fn save_image(image: &image::RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn print_report(result: &SegmentationResult, registry: &LabelColorRegistry, output: &Path) {
    println!(
        "✅ Wrote {}x{} overlay to {}",
        result.overlay.width(),
        result.overlay.height(),
        output.display()
    );
    println!();
    println!("Labels found:");
    for entry in result.legend(registry) {
        println!("  {:<12} {}", entry.label, entry.color);
    }
    println!();
    let t = &result.timings;
    println!("Timings:");
    println!("  preprocess     {:>6} ms", t.preprocess_ms);
    println!("  inference      {:>6} ms", t.inference_ms);
    println!("  postprocess    {:>6} ms", t.postprocess_ms);
    println!("  visualization  {:>6} ms", t.visualization_ms);
}

/// Print the label registry
pub async fn list_labels(args: LabelsArgs) -> Result<()> {
    let registry = LabelColorRegistry::pascal_voc();

    if args.json {
        let entries: Vec<_> = registry
            .entries()
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "index": entry.index,
                    "label": entry.name,
                    "color": entry.color.to_hex(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in registry.entries() {
        println!("{:>3}  {:<12} {}", entry.index, entry.name, entry.color);
    }
    Ok(())
}
