// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! SegmentationSession async chaining tests

use super::support::{mock_model, MockModel};
use camseg::vision::{SegmentationError, SegmentationModel, SegmentationSession};
use camseg::SegmentationConfig;
use image::DynamicImage;
use camseg::vision::{Color, LabelColorRegistry};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[tokio::test]
async fn test_initialize_then_segment() {
    let session = SegmentationSession::new(SegmentationConfig::default());
    session
        .initialize_with(Box::new(mock_model(2, 2, vec![vec![0, 3], vec![15, 0]])))
        .await
        .unwrap();
    assert!(session.is_initialized());

    let result = session
        .segment(DynamicImage::new_rgb8(640, 480))
        .await
        .unwrap();
    assert_eq!(result.overlay.dimensions(), (2, 2));
    assert_eq!(result.labels.len(), 3);

    let summary = result.summary(session.registry());
    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["width"], 2);
    assert_eq!(json["legend"][0]["label"], "background");
    assert!(json["timings"]["inference_ms"].is_u64());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_sequential_segments_reuse_model() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();

    let mut model = MockModel::new();
    model
        .expect_input_shape()
        .return_const(super::support::shape(2, 2));
    model.expect_run().returning(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(super::support::output_with_winners(&[vec![8, 8], vec![8, 8]]))
    });

    let session = SegmentationSession::new(SegmentationConfig::default());
    session.initialize_with(Box::new(model)).await.unwrap();

    for _ in 0..3 {
        let result = session.segment(DynamicImage::new_rgb8(4, 4)).await.unwrap();
        assert!(result.labels.contains("cat"));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_segment_without_initialize() {
    let session = SegmentationSession::new(SegmentationConfig::default());
    let err = session
        .segment(DynamicImage::new_rgb8(4, 4))
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentationError::UninitializedEngine));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_segment_leaves_session_usable() {
    let mut model = MockModel::new();
    model
        .expect_input_shape()
        .return_const(super::support::shape(2, 2));
    let mut calls = 0;
    model.expect_run().returning(move |_| {
        calls += 1;
        if calls == 1 {
            Err(SegmentationError::Runtime("transient".to_string()))
        } else {
            Ok(super::support::output_with_winners(&[vec![0, 0], vec![0, 0]]))
        }
    });

    let session = SegmentationSession::new(SegmentationConfig::default());
    session.initialize_with(Box::new(model)).await.unwrap();

    assert!(session.segment(DynamicImage::new_rgb8(2, 2)).await.is_err());
    assert!(session.segment(DynamicImage::new_rgb8(2, 2)).await.is_ok());

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_close_releases_model() {
    let dropped = Arc::new(AtomicUsize::new(0));

    struct DropProbe {
        inner: MockModel,
        dropped: Arc<AtomicUsize>,
    }

    impl SegmentationModel for DropProbe {
        fn input_shape(&self) -> camseg::vision::ModelInputShape {
            self.inner.input_shape()
        }

        fn run(
            &mut self,
            input: &camseg::vision::InputTensor,
        ) -> camseg::vision::Result<camseg::vision::OutputTensor> {
            self.inner.run(input)
        }
    }

    impl Drop for DropProbe {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    let session = SegmentationSession::new(SegmentationConfig::default());
    session
        .initialize_with(Box::new(DropProbe {
            inner: mock_model(2, 2, vec![vec![0, 0], vec![0, 0]]),
            dropped: dropped.clone(),
        }))
        .await
        .unwrap();
    assert_eq!(dropped.load(Ordering::SeqCst), 0);

    session.close().await.unwrap();
    assert_eq!(dropped.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_initialize_without_asset_fails() {
    let dir = tempfile::TempDir::new().unwrap();
    let session = SegmentationSession::new(SegmentationConfig {
        asset_dir: dir.path().to_path_buf(),
        ..SegmentationConfig::default()
    });

    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, SegmentationError::AssetNotFound { .. }));
    assert!(!session.is_initialized());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_custom_registry_session() {
    let registry = Arc::new(LabelColorRegistry::from_lists(&["sky", "road"], &["blue", "gray"]).unwrap());

    let mut model = MockModel::new();
    model
        .expect_input_shape()
        .return_const(super::support::shape(2, 2));
    model.expect_run().returning(|_| {
        Ok(super::support::output_with_classes(&[vec![0, 0], vec![1, 1]], 2))
    });

    let session = SegmentationSession::with_registry(SegmentationConfig::default(), registry);
    session.initialize_with(Box::new(model)).await.unwrap();

    let result = session.segment(DynamicImage::new_rgb8(2, 2)).await.unwrap();
    assert_eq!(result.segmentation_map.to_rows(), vec![vec![0u8, 0], vec![1, 1]]);
    assert_eq!(result.labels.len(), 2);
    assert!(result.labels.contains("sky") && result.labels.contains("road"));

    let legend = result.legend(session.registry());
    assert_eq!(legend[0].label, "road");
    assert_eq!(legend[0].color, Color::rgb(0x88, 0x88, 0x88));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_custom_registry_rejects_voc_model() {
    let registry = Arc::new(LabelColorRegistry::from_lists(&["sky", "road"], &["blue", "gray"]).unwrap());
    let session = SegmentationSession::with_registry(SegmentationConfig::default(), registry);
    // Emits 21 classes where 2 are registered
    session
        .initialize_with(Box::new(mock_model(2, 2, vec![vec![0, 0], vec![0, 0]])))
        .await
        .unwrap();

    let err = session
        .segment(DynamicImage::new_rgb8(2, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentationError::InvalidModel(_)));
    session.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_is_initialized_during_inference() {
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let started_tx = Mutex::new(started_tx);
    let release_rx = Mutex::new(release_rx);

    let mut model = MockModel::new();
    model
        .expect_input_shape()
        .return_const(super::support::shape(2, 2));
    model.expect_run().returning(move |_| {
        started_tx.lock().unwrap().send(()).unwrap();
        release_rx.lock().unwrap().recv().unwrap();
        Ok(super::support::output_with_winners(&[vec![0, 0], vec![0, 0]]))
    });

    let session = Arc::new(SegmentationSession::new(SegmentationConfig::default()));
    session.initialize_with(Box::new(model)).await.unwrap();

    let running = {
        let session = session.clone();
        tokio::spawn(async move { session.segment(DynamicImage::new_rgb8(2, 2)).await })
    };

    tokio::task::spawn_blocking(move || started_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .expect("inference never started");

    // The engine lock is held by the running inference
    assert!(session.is_initialized());

    release_tx.send(()).unwrap();
    assert!(running.await.unwrap().is_ok());

    let session = Arc::try_unwrap(session).unwrap();
    session.close().await.unwrap();
}
