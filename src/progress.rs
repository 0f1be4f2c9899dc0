//! Progress reporting and cooperative cancellation

use crate::float_types::Real;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Receives progress of a long operation, in percent.
pub trait ProgressListener {
    fn set_progress(&mut self, progress: i32, task_name: Option<&str>);
}

/// Maps an accumulated quantity (for the tree builder, triangle area) onto a
/// 0-100 percentage for a [`ProgressListener`].
pub struct QuantityProgress<'a> {
    listener: &'a mut dyn ProgressListener,
    total: Real,
    scale: Real,
}

impl<'a> QuantityProgress<'a> {
    pub fn new(listener: &'a mut dyn ProgressListener, total_quantity: Real) -> Self {
        let scale = if total_quantity > 0.0 { 100.0 / total_quantity } else { 0.0 };
        Self {
            listener,
            total: 0.0,
            scale,
        }
    }

    pub fn add(&mut self, amount: Real) {
        self.total += amount;
        self.listener.set_progress((self.total * self.scale + 0.5) as i32, None);
    }
}

/// A caller-owned flag polled by long operations. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
