// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};

/// Single-slot "in progress" flag that keeps a periodic job from overlapping
/// with itself.
#[derive(Debug, Default)]
pub struct CycleGuard {
    running: AtomicBool,
}

/// Held for the duration of one cycle. Releases the guard on drop, including
/// when the cycle unwinds from a panic.
#[derive(Debug)]
pub struct CycleToken<'a> {
    guard: &'a CycleGuard,
}

impl CycleGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` when a cycle is already running.
    pub fn try_enter(&self) -> Option<CycleToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleToken { guard: self })
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for CycleToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}
