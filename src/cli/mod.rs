// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod segment;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Camera semantic segmentation CLI
#[derive(Parser, Debug)]
#[command(name = "camseg-cli")]
#[command(version = crate::version::VERSION_NUMBER)]
#[command(about = "Segment images with a DeepLab model and render a color overlay", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Segment an image and write the overlay
    Segment(segment::SegmentArgs),

    /// List the class labels and their colors
    Labels(segment::LabelsArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Segment(args) => segment::segment_image(args).await,
        Commands::Labels(args) => segment::list_labels(args).await,
    }
}
