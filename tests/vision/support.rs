// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Shared fixtures for segmentation tests

use camseg::vision::{
    InputTensor, ModelInputShape, OutputTensor, Result, SegmentationModel, NUM_CLASSES,
};
use mockall::mock;

mock! {
    pub Model {}

    impl SegmentationModel for Model {
        fn input_shape(&self) -> ModelInputShape;
        fn run(&mut self, input: &InputTensor) -> Result<OutputTensor>;
    }
}

pub fn shape(width: u32, height: u32) -> ModelInputShape {
    ModelInputShape {
        width,
        height,
        channels: 3,
    }
}

/// Logits where position (i, j) peaks at class `winners[i][j]`
pub fn output_with_winners(winners: &[Vec<usize>]) -> OutputTensor {
    output_with_classes(winners, NUM_CLASSES)
}

/// Same as [`output_with_winners`] for a model with `num_classes` outputs
pub fn output_with_classes(winners: &[Vec<usize>], num_classes: usize) -> OutputTensor {
    let dim1 = winners.len();
    let dim2 = winners[0].len();
    let mut data = vec![0.0f32; dim1 * dim2 * num_classes];
    for (i, row) in winners.iter().enumerate() {
        for (j, &class) in row.iter().enumerate() {
            let base = (i * dim2 + j) * num_classes;
            for c in 0..num_classes {
                data[base + c] = -(c as f32);
            }
            data[base + class] = 5.0;
        }
    }
    OutputTensor::new(dim1, dim2, num_classes, data).unwrap()
}

/// Mock that reports `width x height` and always returns `winners`
pub fn mock_model(width: u32, height: u32, winners: Vec<Vec<usize>>) -> MockModel {
    let mut model = MockModel::new();
    model
        .expect_input_shape()
        .return_const(shape(width, height));
    model
        .expect_run()
        .returning(move |_| Ok(output_with_winners(&winners)));
    model
}
