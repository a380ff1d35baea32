// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for camseg

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Model the defaults are tuned for
pub const DEFAULT_MODEL: &str = "deeplabv3_257_mv_gpu";

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("camseg {} ({})", VERSION_NUMBER, DEFAULT_MODEL)
}
