//! Process-wide configuration consulted during graph generation.
//!
//! Two flags live here: the grad-for-scalar switch, which makes numeric scalars
//! differentiable and changes how scalar abstract values broaden, and the sparse
//! backward-result registry raised by [`GradOperation`](crate::composite::GradOperation)
//! whenever a forward graph uses a primitive whose backward rule returns a sparse
//! result. Both are read-mostly with at most one writer per compilation session.

use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::Lazy;

use crate::settings;

static GRAD_FOR_SCALAR: Lazy<AtomicBool> =
    Lazy::new(|| AtomicBool::new(settings::settings().grad_for_scalar));

static SPARSE_RESULT: AtomicBool = AtomicBool::new(false);

/// Whether numeric scalars participate in differentiation.
pub fn grad_for_scalar() -> bool {
    GRAD_FOR_SCALAR.load(Ordering::Acquire)
}

/// Overrides the grad-for-scalar flag, returning the previous value.
pub fn set_grad_for_scalar(enabled: bool) -> bool {
    GRAD_FOR_SCALAR.swap(enabled, Ordering::AcqRel)
}

/// Registry recording that some forward graph needs sparse backward results.
///
/// The flag is set once and never cleared within a process.
pub struct SparseResultRegistry;

impl SparseResultRegistry {
    /// Raises the flag. There is no way to lower it again.
    pub fn mark() {
        SPARSE_RESULT.store(true, Ordering::Release);
    }

    pub fn get() -> bool {
        SPARSE_RESULT.load(Ordering::Acquire)
    }
}
