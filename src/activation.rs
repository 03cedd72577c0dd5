//! Activation functions.
//!
//! A transition computes a pre-activation row `z = a W + b` and then applies an
//! activation function element-wise: `a' = activation(z)`.
//!
//! The network only keeps the *post-activation* values. During backprop the
//! derivative is therefore computed from the cached output `a'`, never from `z`.
//! Every caller of [`Activation::grad_from_output`] must pass activated values.

use crate::{Error, Result, Scalar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Element-wise activation function, shared by every layer of a network.
pub enum Activation {
    #[default]
    Identity,
    Sigmoid,
    Tanh,
    ReLU,
}

impl Activation {
    /// Tag written to the trace header.
    #[inline]
    pub fn tag(self) -> u32 {
        match self {
            Activation::Identity => 0,
            Activation::Sigmoid => 1,
            Activation::Tanh => 2,
            Activation::ReLU => 3,
        }
    }

    /// Inverse of [`Activation::tag`].
    pub fn from_tag(tag: u32) -> Result<Self> {
        match tag {
            0 => Ok(Activation::Identity),
            1 => Ok(Activation::Sigmoid),
            2 => Ok(Activation::Tanh),
            3 => Ok(Activation::ReLU),
            other => Err(Error::InvalidData(format!("unknown activation tag {other}"))),
        }
    }

    #[inline]
    pub fn forward(self, x: Scalar) -> Scalar {
        match self {
            Activation::Identity => x,
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => x.tanh(),
            Activation::ReLU => x.max(0.0),
        }
    }

    /// Derivative of the activation with respect to its input, expressed in terms
    /// of the cached post-activation output `y`.
    #[inline]
    pub fn grad_from_output(self, y: Scalar) -> Scalar {
        match self {
            Activation::Identity => 1.0,
            Activation::Sigmoid => y * (1.0 - y),
            Activation::Tanh => 1.0 - y * y,
            Activation::ReLU => {
                if y > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[inline]
fn sigmoid(x: Scalar) -> Scalar {
    // Numerically stable sigmoid.
    if x >= 0.0 {
        let z = (-x).exp();
        1.0 / (1.0 + z)
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}
