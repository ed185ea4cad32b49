// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Utility functions for submission bookkeeping.

const UNITS: [(u64, &str); 6] = [
    (1 << 60, "E"),
    (1 << 50, "P"),
    (1 << 40, "T"),
    (1 << 30, "G"),
    (1 << 20, "M"),
    (1 << 10, "K"),
];

/// Renders a byte count with a single-letter binary unit and at most one decimal,
/// dropping a trailing `.0`.
///
/// # Examples
///
/// ```
/// use trap_submitter::util::byte_size;
///
/// assert_eq!(byte_size(0), "0B");
/// assert_eq!(byte_size(512), "512B");
/// assert_eq!(byte_size(1536), "1.5K");
/// assert_eq!(byte_size(10 * 1024 * 1024), "10M");
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn byte_size(bytes: u64) -> String {
    for (size, unit) in UNITS {
        if bytes >= size {
            let value = format!("{:.1}", bytes as f64 / size as f64);
            let value = value.strip_suffix(".0").unwrap_or(&value);
            return format!("{value}{unit}");
        }
    }
    format!("{bytes}B")
}
