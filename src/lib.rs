//! A small feed-forward network engine with a replayable training trace.
//!
//! `trace-mlp` implements a dense multi-layer perceptron on top of a strided
//! [`Matrix`] primitive, trains it with full-batch gradient descent, and records
//! every training step into a compact binary trace that can be replayed later.
//!
//! # Design goals
//!
//! - One allocation per network: every weight, bias and activation matrix of both
//!   the live and the gradient slot is a view into a single packed arena.
//! - Clear contracts: shapes are explicit and validated where data enters the crate.
//! - A trace format that mirrors itself exactly between writer and reader.
//!
//! # Panics vs `Result`
//!
//! - Low-level kernels (panic on misuse):
//!   - [`Matrix::add`], [`Matrix::multiply`], [`Matrix::from_buffer`]
//!   - [`Network::forward`], [`Network::backpropagate`], [`Network::cost`]
//!     Shape mismatches are treated as programmer error and panic via `assert!`.
//!
//! - Boundary APIs (validated):
//!   - [`Network::new`], [`Samples`], [`Network::train`]
//!   - [`TraceWriter`], [`TraceReader`]
//!     These return [`Result`]; a malformed trace surfaces as [`Error::Format`].
//!
//! # Data layout and shapes
//!
//! - Scalars are `f64` ([`Scalar`]).
//! - Matrices are addressed as `(col, row)` with element `row * stride + col`.
//! - Activations are `1 x n` row vectors. The weight matrix of transition `i` has
//!   `rows = layer_sizes[i]` and `cols = layer_sizes[i + 1]`, so the forward step is
//!   `a[i + 1] = f(a[i] . W[i] + b[i])`.
//!
//! # Quick start
//!
//! ```rust
//! use trace_mlp::{Activation, Network, Samples, TrainConfig, TraceReader, TraceWriter};
//!
//! # fn main() -> trace_mlp::Result<()> {
//! let samples = Samples::from_interleaved(
//!     vec![
//!         0.0, 0.0, 0.0,
//!         0.0, 1.0, 1.0,
//!         1.0, 0.0, 1.0,
//!         1.0, 1.0, 0.0,
//!     ],
//!     2,
//!     1,
//! )?;
//!
//! let mut network = Network::new_with_seed(&[2, 2, 1], Activation::Sigmoid, 0)?;
//! let mut trace = TraceWriter::new(Vec::new(), &network)?;
//!
//! let cfg = TrainConfig {
//!     max_iterations: 10,
//!     ..TrainConfig::default()
//! };
//! let report = network.train_with_trace(&samples, cfg, &mut trace)?;
//! let bytes = trace.finish()?;
//!
//! let mut reader = TraceReader::new(bytes.as_slice())?;
//! let mut replay = Network::from_header(reader.header())?;
//! let mut frames = 0;
//! while reader.read_frame_into(&mut replay)? {
//!     frames += 1;
//! }
//! assert_eq!(frames, report.iterations);
//! # Ok(())
//! # }
//! ```

pub mod activation;
pub mod data;
pub mod error;
pub(crate) mod matmul;
pub mod matrix;
pub mod network;
pub mod trace;
pub mod train;

#[cfg(feature = "serde")]
pub mod snapshot;

/// The single numeric type used throughout the crate.
pub type Scalar = f64;

pub use activation::Activation;
pub use data::Samples;
pub use error::{Error, Result};
pub use matrix::{Matrix, MatrixView, MatrixViewMut};
pub use network::{Network, Slot};
pub use trace::{Frame, Token, TraceHeader, TraceReader, TraceWriter, TransitionParams};
pub use train::{TrainConfig, TrainReport};
