// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Label registry properties

use camseg::vision::labels::{COLOR_NAMES, LABELS};
use camseg::vision::{Color, LabelColorRegistry, NUM_CLASSES};

#[test]
fn test_every_label_round_trips() {
    let registry = LabelColorRegistry::pascal_voc();
    for name in registry.labels() {
        let index = registry.index_of(name).unwrap();
        assert_eq!(registry.label_for_index(index), Some(name));
        assert_eq!(registry.color_for_index(index), registry.color_for_label(name));
    }
}

#[test]
fn test_labels_in_model_order() {
    let registry = LabelColorRegistry::pascal_voc();
    let names: Vec<&str> = registry.labels().collect();
    assert_eq!(names.len(), NUM_CLASSES);
    assert_eq!(names, LABELS.to_vec());
    assert_eq!(names[0], "background");
    assert_eq!(names[15], "person");
    assert_eq!(names[20], "tv");
}

#[test]
fn test_reference_colors() {
    let registry = LabelColorRegistry::pascal_voc();
    assert_eq!(registry.color_for_label("background"), Color::rgb(0, 0, 0));
    assert_eq!(registry.color_for_label("aeroplane"), Color::rgb(0xFF, 0, 0));
    assert_eq!(registry.color_for_label("tv"), Color::rgb(0xFF, 0xFF, 0xFF));
    assert_eq!(registry.color_for_label("sofa").to_hex(), "#CCCCCC");
}

#[test]
fn test_unknown_label_soft_fails() {
    let registry = LabelColorRegistry::pascal_voc();
    assert_eq!(registry.color_for_label("unicorn"), Color::TRANSPARENT);
    assert_eq!(registry.index_of("unicorn"), None);
    assert_eq!(registry.label_for_index(NUM_CLASSES), None);
}

#[test]
fn test_custom_registry() {
    let registry = LabelColorRegistry::from_lists(&["sky", "road"], &["blue", "gray"]).unwrap();
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.color_for_index(1), Color::rgb(0x88, 0x88, 0x88));
    assert!(LabelColorRegistry::from_lists(&LABELS, &COLOR_NAMES[..20]).is_err());
}
