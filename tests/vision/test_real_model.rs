// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Tests against the real DeepLab ONNX model
//!
//! Place `deeplabv3_257_mv_gpu.onnx` in `./assets` (or point
//! `CAMSEG_ASSET_DIR` at it) and run with `--ignored`.

use camseg::vision::{SegmentationSession, NUM_CLASSES};
use camseg::SegmentationConfig;
use image::DynamicImage;

#[tokio::test]
#[ignore] // Requires the model asset
async fn test_real_model_segments_camera_frame() {
    let session = SegmentationSession::new(SegmentationConfig::from_env());
    session
        .initialize()
        .await
        .expect("Failed to load segmentation model");

    let result = session
        .segment(DynamicImage::new_rgb8(640, 480))
        .await
        .expect("Segmentation failed");

    assert_eq!(result.overlay.dimensions(), (257, 257));
    assert_eq!(result.segmentation_map.dim1(), 257);
    assert_eq!(result.segmentation_map.dim2(), 257);
    assert!(!result.labels.is_empty());
    assert!(result
        .segmentation_map
        .class_histogram(NUM_CLASSES)
        .iter()
        .sum::<usize>()
        == 257 * 257);

    session.close().await.unwrap();
}

#[tokio::test]
#[ignore] // Requires the model asset and a CUDA device
async fn test_real_model_on_gpu() {
    let config = SegmentationConfig {
        use_gpu_delegate: true,
        ..SegmentationConfig::from_env()
    };
    let session = SegmentationSession::new(config);
    session
        .initialize()
        .await
        .expect("Failed to initialize CUDA execution provider");

    let result = session
        .segment(DynamicImage::new_rgb8(257, 257))
        .await
        .unwrap();
    assert_eq!(result.overlay.dimensions(), (257, 257));

    session.close().await.unwrap();
}
