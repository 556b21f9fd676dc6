//! Tape-based reverse-mode differentiation for multitask training.
//!
//! Every tracked op appends a backward function to a thread-local tape.
//! `backward` walks the tape in reverse and sums gradients per [`TensorId`],
//! so a body module read by several task heads receives the sum of their
//! gradients. Clones of a tensor share its id and therefore its gradient.
//!
//! The trainer runs one tape per batch: forward every task, backward the
//! summed loss, step the optimizer, then [`clear_graph`].
//!
//! ```
//! use rebanar::autograd::{clear_graph, get_grad, Tensor};
//!
//! let x = Tensor::from_slice(&[1.0, 2.0, 3.0]).requires_grad();
//! let w = Tensor::from_slice(&[0.5, 0.5, 0.5]).requires_grad();
//!
//! let y = x.mul(&w).sum();
//! y.backward();
//!
//! let dw = get_grad(w.id()).expect("w participates in y");
//! assert_eq!(dw.data(), &[1.0, 2.0, 3.0]);
//! clear_graph();
//! ```
//!
//! # References
//!
//! - Baydin, A. G., et al. (2018). Automatic differentiation in machine
//!   learning: a survey. JMLR.

pub(crate) mod grad_fn;
mod graph;
pub(crate) mod ops;
mod tensor;

pub use tensor::{Tensor, TensorId};

use std::cell::{Cell, RefCell};

use graph::ComputationGraph;

thread_local! {
    static GRAPH: RefCell<ComputationGraph> = RefCell::new(ComputationGraph::new());

    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Restores the previous tracking flag when dropped, including on unwind.
struct TrackingGuard {
    prev: bool,
}

impl TrackingGuard {
    fn disable() -> Self {
        Self {
            prev: GRAD_ENABLED.with(|enabled| enabled.replace(false)),
        }
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|enabled| enabled.set(self.prev));
    }
}

/// Run `f` without recording anything to the tape.
///
/// Prediction and scoring run under this, so evaluating a model between
/// epochs leaves the training tape untouched.
///
/// ```
/// use rebanar::autograd::{no_grad, Tensor};
///
/// let x = Tensor::from_slice(&[1.0, 2.0]).requires_grad();
/// let y = no_grad(|| x.mul(&x).sum());
/// assert!(!y.requires_grad_enabled());
/// ```
pub fn no_grad<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = TrackingGuard::disable();
    f()
}

/// Whether ops are currently recorded to the tape.
#[must_use]
pub fn is_grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

pub(crate) fn with_graph<F, R>(f: F) -> R
where
    F: FnOnce(&mut ComputationGraph) -> R,
{
    GRAPH.with(|graph| f(&mut graph.borrow_mut()))
}

/// Drop the tape and every stored gradient.
pub fn clear_graph() {
    GRAPH.with(|graph| graph.borrow_mut().clear());
}

/// Accumulated gradient of the tensor with this id, if any.
#[must_use]
pub fn get_grad(id: TensorId) -> Option<Tensor> {
    with_graph(|graph| graph.get_grad(id))
}

/// Forget the gradient of one tensor, keeping the tape.
pub fn clear_grad(id: TensorId) {
    with_graph(|graph| graph.clear_grad(id));
}
