//! The network engine.
//!
//! A [`Network`] keeps two shape-identical slots of matrices:
//! - [`Slot::Live`]: the current weights, biases and activations
//! - [`Slot::Gradient`]: partial derivatives accumulated by [`Network::backpropagate`]
//!
//! Both slots live in one packed arena allocated at construction. The arena is
//! split into two equally sized halves (live first, gradient second) and each half
//! is laid out in the same order: all weights, then all biases, then all
//! activations. A [`Region`] records where one matrix sits inside a half, so the
//! same region table addresses both slots.
//!
//! Because every activation region comes after every parameter region, and
//! `activations[i]` comes before `activations[i + 1]`, a forward step can split the
//! live half at the next activation and read everything it needs from the head.

use std::fmt;
use std::ops::Range;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Activation, Error, Matrix, MatrixView, MatrixViewMut, Result, Scalar};

/// Which half of the arena to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Live,
    Gradient,
}

/// Location of one matrix inside an arena half. Regions are always compact
/// (`stride == cols`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    offset: usize,
    cols: usize,
    rows: usize,
}

impl Region {
    #[inline]
    fn len(&self) -> usize {
        self.cols * self.rows
    }

    #[inline]
    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }

    #[inline]
    fn view<'a>(&self, half: &'a [Scalar]) -> MatrixView<'a> {
        Matrix::from_buffer(&half[self.range()], self.cols, self.rows, self.cols)
    }

    #[inline]
    fn view_mut<'a>(&self, half: &'a mut [Scalar]) -> MatrixViewMut<'a> {
        Matrix::from_buffer(&mut half[self.range()], self.cols, self.rows, self.cols)
    }
}

/// Region table shared by both slots.
#[derive(Debug, Clone)]
struct Layout {
    weights: Vec<Region>,
    biases: Vec<Region>,
    activations: Vec<Region>,
    half_len: usize,
}

impl Layout {
    fn new(layer_sizes: &[usize]) -> Result<Self> {
        if layer_sizes.len() < 2 {
            return Err(Error::InvalidConfig(
                "layer sizes must include input and output layers".to_owned(),
            ));
        }
        if let Some(idx) = layer_sizes.iter().position(|&n| n == 0) {
            return Err(Error::InvalidConfig(format!(
                "layer {idx} has 0 neurons; all layer sizes must be > 0"
            )));
        }

        let overflow = || Error::InvalidConfig("network is too large to allocate".to_owned());
        let transitions = layer_sizes.len() - 1;

        let mut weights = Vec::with_capacity(transitions);
        let mut biases = Vec::with_capacity(transitions);
        let mut activations = Vec::with_capacity(layer_sizes.len());
        let mut cursor = 0_usize;

        for w in layer_sizes.windows(2) {
            let (prev, next) = (w[0], w[1]);
            let len = prev.checked_mul(next).ok_or_else(overflow)?;
            weights.push(Region {
                offset: cursor,
                cols: next,
                rows: prev,
            });
            cursor = cursor.checked_add(len).ok_or_else(overflow)?;
        }
        for &next in &layer_sizes[1..] {
            biases.push(Region {
                offset: cursor,
                cols: next,
                rows: 1,
            });
            cursor = cursor.checked_add(next).ok_or_else(overflow)?;
        }
        for &n in layer_sizes {
            activations.push(Region {
                offset: cursor,
                cols: n,
                rows: 1,
            });
            cursor = cursor.checked_add(n).ok_or_else(overflow)?;
        }

        // Both halves must fit.
        cursor.checked_mul(2).ok_or_else(overflow)?;

        Ok(Self {
            weights,
            biases,
            activations,
            half_len: cursor,
        })
    }

    /// Every weight and bias region, in layout order.
    #[inline]
    fn parameters(&self) -> impl Iterator<Item = &Region> {
        self.weights.iter().chain(&self.biases)
    }
}

/// A fully connected feed-forward network with one activation function shared by
/// all non-input layers.
#[derive(Debug, Clone)]
pub struct Network {
    layer_sizes: Vec<usize>,
    activation: Activation,
    layout: Layout,
    arena: Vec<Scalar>,
}

impl Network {
    /// Build a network with all parameters set to zero.
    ///
    /// `layer_sizes` is `[input, hidden..., output]`; it needs at least two entries
    /// and every entry must be `> 0`.
    pub fn new(layer_sizes: &[usize], activation: Activation) -> Result<Self> {
        let layout = Layout::new(layer_sizes)?;
        let arena = vec![0.0; layout.half_len * 2];
        Ok(Self {
            layer_sizes: layer_sizes.to_vec(),
            activation,
            layout,
            arena,
        })
    }

    /// Build a network and draw its weights and biases from a seeded RNG.
    pub fn new_with_seed(layer_sizes: &[usize], activation: Activation, seed: u64) -> Result<Self> {
        let mut network = Self::new(layer_sizes, activation)?;
        network.randomize_with_seed(seed);
        Ok(network)
    }

    #[inline]
    pub fn layer_count(&self) -> usize {
        self.layer_sizes.len()
    }

    /// Number of layer transitions (`layer_count - 1`).
    #[inline]
    pub fn transition_count(&self) -> usize {
        self.layer_sizes.len() - 1
    }

    #[inline]
    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    #[inline]
    pub fn input_dim(&self) -> usize {
        self.layer_sizes[0]
    }

    #[inline]
    pub fn output_dim(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    #[inline]
    pub fn activation(&self) -> Activation {
        self.activation
    }

    #[inline]
    pub fn set_activation(&mut self, activation: Activation) {
        self.activation = activation;
    }

    /// Number of trainable scalars (all weights and biases of one slot).
    pub fn parameter_count(&self) -> usize {
        self.layout.parameters().map(Region::len).sum()
    }

    /// Total number of scalars in the packed arena (both slots).
    #[inline]
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    fn half(&self, slot: Slot) -> &[Scalar] {
        let (live, grad) = self.arena.split_at(self.layout.half_len);
        match slot {
            Slot::Live => live,
            Slot::Gradient => grad,
        }
    }

    #[inline]
    fn half_mut(&mut self, slot: Slot) -> &mut [Scalar] {
        let (live, grad) = self.arena.split_at_mut(self.layout.half_len);
        match slot {
            Slot::Live => live,
            Slot::Gradient => grad,
        }
    }

    /// Weight matrix of `transition` in `slot` (`layer_sizes[t]` rows, `layer_sizes[t + 1]` cols).
    #[inline]
    pub fn weights_in(&self, slot: Slot, transition: usize) -> MatrixView<'_> {
        self.layout.weights[transition].view(self.half(slot))
    }

    /// Bias row of `transition` in `slot`.
    #[inline]
    pub fn biases_in(&self, slot: Slot, transition: usize) -> MatrixView<'_> {
        self.layout.biases[transition].view(self.half(slot))
    }

    /// Activation row of `layer` in `slot`. Layer `0` is the input layer.
    #[inline]
    pub fn activations_in(&self, slot: Slot, layer: usize) -> MatrixView<'_> {
        self.layout.activations[layer].view(self.half(slot))
    }

    #[inline]
    pub fn weights(&self, transition: usize) -> MatrixView<'_> {
        self.weights_in(Slot::Live, transition)
    }

    #[inline]
    pub fn biases(&self, transition: usize) -> MatrixView<'_> {
        self.biases_in(Slot::Live, transition)
    }

    #[inline]
    pub fn weight_gradient(&self, transition: usize) -> MatrixView<'_> {
        self.weights_in(Slot::Gradient, transition)
    }

    #[inline]
    pub fn bias_gradient(&self, transition: usize) -> MatrixView<'_> {
        self.biases_in(Slot::Gradient, transition)
    }

    #[inline]
    pub fn weights_mut(&mut self, transition: usize) -> MatrixViewMut<'_> {
        let region = self.layout.weights[transition];
        region.view_mut(self.half_mut(Slot::Live))
    }

    #[inline]
    pub fn biases_mut(&mut self, transition: usize) -> MatrixViewMut<'_> {
        let region = self.layout.biases[transition];
        region.view_mut(self.half_mut(Slot::Live))
    }

    /// Output of the most recent forward pass.
    #[inline]
    pub fn output(&self) -> &[Scalar] {
        let region = self.layout.activations[self.layer_sizes.len() - 1];
        &self.half(Slot::Live)[region.range()]
    }

    /// Draw every live weight and bias uniformly from `[0, 1)` using a seeded RNG.
    pub fn randomize_with_seed(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        self.randomize_with_rng(&mut rng);
    }

    /// Draw every live weight and bias uniformly from `[0, 1)`.
    ///
    /// Activations and the gradient slot are left untouched.
    pub fn randomize_with_rng<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let (live, _) = self.arena.split_at_mut(self.layout.half_len);
        for region in self.layout.parameters() {
            region.view_mut(live).randomize(rng);
        }
    }

    /// Zero the whole gradient slot.
    pub fn reset_gradient(&mut self) {
        self.half_mut(Slot::Gradient).fill(0.0);
    }

    /// Forward pass for a single sample.
    ///
    /// Copies `input` into the input activation row, then for every transition `i`
    /// computes `a[i + 1] = f(a[i] . W[i] + b[i])`. Returns the output row.
    ///
    /// Shape contract: `input.len() == self.input_dim()`.
    pub fn forward(&mut self, input: &[Scalar]) -> &[Scalar] {
        assert_eq!(
            input.len(),
            self.input_dim(),
            "input len {} does not match network input_dim {}",
            input.len(),
            self.input_dim()
        );

        let layout = &self.layout;
        let act = self.activation;
        let (live, _) = self.arena.split_at_mut(layout.half_len);

        live[layout.activations[0].range()].copy_from_slice(input);

        for i in 0..layout.weights.len() {
            let next = layout.activations[i + 1];
            let (head, tail) = live.split_at_mut(next.offset);
            let head: &[Scalar] = head;

            let prev = layout.activations[i].view(head);
            let weights = layout.weights[i].view(head);
            let biases = layout.biases[i].view(head);

            let mut out = Matrix::from_buffer(&mut tail[..next.len()], next.cols, 1, next.cols);
            out.multiply(&prev, &weights);
            out.add_assign(&biases);
            out.map_inplace(|z| act.forward(z));
        }

        self.output()
    }

    /// Accumulate the mean-squared-error gradient over a batch into the gradient slot.
    ///
    /// `inputs` is `N x input_dim` and `outputs` is `N x output_dim`, one sample per
    /// row. For every sample the network runs forward, seeds the output error with
    /// `2 * (predicted - expected)` and sweeps back layer by layer, adding into the
    /// weight and bias gradients. After the batch every weight and bias gradient is
    /// divided by `N`.
    ///
    /// The gradient slot is zeroed first, so the result only reflects this batch.
    /// Live activations hold the forward pass of the last sample afterwards.
    pub fn backpropagate<A, B>(&mut self, inputs: &Matrix<A>, outputs: &Matrix<B>)
    where
        A: AsRef<[Scalar]>,
        B: AsRef<[Scalar]>,
    {
        self.assert_batch(inputs, outputs);

        let samples = inputs.rows();
        let last = self.layer_sizes.len() - 1;

        self.reset_gradient();

        for s in 0..samples {
            self.forward(inputs.row(s));

            let layout = &self.layout;
            let act = self.activation;
            let (live, grad) = self.arena.split_at_mut(layout.half_len);
            let live: &[Scalar] = live;

            for region in &layout.activations {
                grad[region.range()].fill(0.0);
            }

            let out = layout.activations[last];
            for (j, &expected) in outputs.row(s).iter().enumerate() {
                let predicted = live[out.offset + j];
                grad[out.offset + j] = 2.0 * (predicted - expected);
            }

            for layer in (1..=last).rev() {
                let cur = layout.activations[layer];
                let prev = layout.activations[layer - 1];
                let weights = layout.weights[layer - 1];
                let biases = layout.biases[layer - 1];

                for k in 0..cur.cols {
                    let g = grad[cur.offset + k];
                    let d = act.grad_from_output(live[cur.offset + k]);
                    let gd = g * d;

                    grad[biases.offset + k] += gd;

                    for l in 0..prev.cols {
                        // Row `l` (previous unit), column `k` (current unit).
                        let w = weights.offset + l * weights.cols + k;
                        grad[w] += gd * live[prev.offset + l];
                        grad[prev.offset + l] += gd * live[w];
                    }
                }
            }
        }

        let n = samples as Scalar;
        let (_, grad) = self.arena.split_at_mut(self.layout.half_len);
        for region in self.layout.parameters() {
            for v in &mut grad[region.range()] {
                *v /= n;
            }
        }
    }

    /// Gradient-descent step: `live -= learning_rate * gradient` for every weight and bias.
    ///
    /// Any rate is accepted; `0.0` leaves the parameters unchanged.
    pub fn learn(&mut self, learning_rate: Scalar) {
        let (live, grad) = self.arena.split_at_mut(self.layout.half_len);
        for region in self.layout.parameters() {
            let range = region.range();
            for (p, &g) in live[range.clone()].iter_mut().zip(&grad[range]) {
                *p -= learning_rate * g;
            }
        }
    }

    /// Mean squared error over a batch: the squared error of every output unit of
    /// every sample, summed and divided by `N * output_dim`.
    pub fn cost<A, B>(&mut self, inputs: &Matrix<A>, outputs: &Matrix<B>) -> Scalar
    where
        A: AsRef<[Scalar]>,
        B: AsRef<[Scalar]>,
    {
        self.assert_batch(inputs, outputs);

        let mut total: Scalar = 0.0;
        for s in 0..inputs.rows() {
            let predicted = self.forward(inputs.row(s));
            for (&p, &e) in predicted.iter().zip(outputs.row(s)) {
                let diff = p - e;
                total += diff * diff;
            }
        }
        total / (inputs.rows() * outputs.cols()) as Scalar
    }

    fn assert_batch<A, B>(&self, inputs: &Matrix<A>, outputs: &Matrix<B>)
    where
        A: AsRef<[Scalar]>,
        B: AsRef<[Scalar]>,
    {
        assert_eq!(
            inputs.cols(),
            self.input_dim(),
            "training inputs have {} cols, network input_dim is {}",
            inputs.cols(),
            self.input_dim()
        );
        assert_eq!(
            outputs.cols(),
            self.output_dim(),
            "training outputs have {} cols, network output_dim is {}",
            outputs.cols(),
            self.output_dim()
        );
        assert_eq!(
            inputs.rows(),
            outputs.rows(),
            "training inputs have {} rows, outputs have {}",
            inputs.rows(),
            outputs.rows()
        );
        assert!(inputs.rows() > 0, "training batch must not be empty");
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NN -> LC: {}, NC: ", self.layer_count())?;
        for (i, n) in self.layer_sizes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{n}")?;
        }
        writeln!(f)?;

        for t in 0..self.transition_count() {
            write!(f, "\t{t} -> W: ")?;
            write_joined(f, self.weights(t).iter())?;
            write!(f, " B: ")?;
            write_joined(f, self.biases(t).iter())?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, values: impl Iterator<Item = Scalar>) -> fmt::Result {
    for (i, v) in values.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v:.6}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_too_few_layers_and_empty_layers() {
        assert!(Network::new(&[], Activation::Sigmoid).is_err());
        assert!(Network::new(&[3], Activation::Sigmoid).is_err());
        assert!(Network::new(&[2, 0, 1], Activation::Sigmoid).is_err());
        assert!(Network::new(&[2, 1], Activation::Sigmoid).is_ok());
    }

    #[test]
    fn arena_is_sized_by_the_layout_prepass() {
        let net = Network::new(&[3, 4, 2], Activation::Sigmoid).unwrap();
        // weights 12 + 8, biases 4 + 2, activations 3 + 4 + 2, doubled.
        assert_eq!(net.arena_len(), 2 * (12 + 8 + 4 + 2 + 3 + 4 + 2));
        assert_eq!(net.parameter_count(), 12 + 8 + 4 + 2);
    }

    #[test]
    fn regions_tile_each_half_without_overlap() {
        let layout = Layout::new(&[5, 3, 4, 2]).unwrap();
        let mut regions: Vec<Region> = layout
            .weights
            .iter()
            .chain(&layout.biases)
            .chain(&layout.activations)
            .copied()
            .collect();
        regions.sort_by_key(|r| r.offset);

        let mut cursor = 0;
        for r in &regions {
            assert_eq!(r.offset, cursor, "gap or overlap at {r:?}");
            cursor += r.len();
        }
        assert_eq!(cursor, layout.half_len);
    }

    #[test]
    fn matrix_shapes_follow_layer_sizes() {
        let net = Network::new(&[3, 4, 2], Activation::Identity).unwrap();
        for slot in [Slot::Live, Slot::Gradient] {
            let w = net.weights_in(slot, 1);
            assert_eq!((w.cols(), w.rows()), (2, 4));
            let b = net.biases_in(slot, 0);
            assert_eq!((b.cols(), b.rows()), (4, 1));
            let a = net.activations_in(slot, 0);
            assert_eq!((a.cols(), a.rows()), (3, 1));
        }
    }

    #[test]
    fn randomize_only_touches_live_parameters() {
        let mut net = Network::new(&[2, 3, 1], Activation::Sigmoid).unwrap();
        net.randomize_with_seed(11);

        for t in 0..net.transition_count() {
            assert!(net.weights(t).iter().all(|v| (0.0..1.0).contains(&v)));
            assert!(net.weight_gradient(t).iter().all(|v| v == 0.0));
            assert!(net.bias_gradient(t).iter().all(|v| v == 0.0));
        }
        for layer in 0..net.layer_count() {
            let acts = net.activations_in(Slot::Live, layer);
            assert!(acts.iter().all(|v| v == 0.0));
        }
    }

    #[test]
    fn forward_with_identity_is_affine() {
        let mut net = Network::new(&[2, 1], Activation::Identity).unwrap();
        net.weights_mut(0).set(0, 0, 2.0);
        net.weights_mut(0).set(0, 1, -3.0);
        net.biases_mut(0).set(0, 0, 0.5);

        let y = net.forward(&[1.0, 4.0]);
        assert_eq!(y, &[2.0 - 12.0 + 0.5]);
    }

    #[test]
    fn forward_is_deterministic() {
        let mut net = Network::new_with_seed(&[3, 5, 2], Activation::Sigmoid, 3).unwrap();
        let a = net.forward(&[0.1, -0.4, 0.9]).to_vec();
        let b = net.forward(&[0.1, -0.4, 0.9]).to_vec();
        assert_eq!(a, b);
    }

    #[test]
    fn backpropagate_averages_over_the_batch() {
        // Single identity unit y = w x + b, so dC/dw = mean(2 (y - t) x).
        let mut net = Network::new(&[1, 1], Activation::Identity).unwrap();
        net.weights_mut(0).set(0, 0, 1.0);

        let inputs = Matrix::from_row_major(1, 2, vec![1.0, 2.0]).unwrap();
        let outputs = Matrix::from_row_major(1, 2, vec![0.0, 0.0]).unwrap();
        net.backpropagate(&inputs, &outputs);

        // Sample 1: 2 * 1 * 1 = 2, sample 2: 2 * 2 * 2 = 8.
        assert_eq!(net.weight_gradient(0).get(0, 0), 5.0);
        // Sample 1: 2, sample 2: 4.
        assert_eq!(net.bias_gradient(0).get(0, 0), 3.0);

        // Running twice must not accumulate across calls.
        net.backpropagate(&inputs, &outputs);
        assert_eq!(net.weight_gradient(0).get(0, 0), 5.0);
    }

    #[test]
    fn learn_subtracts_scaled_gradient() {
        let mut net = Network::new(&[1, 1], Activation::Identity).unwrap();
        net.weights_mut(0).set(0, 0, 1.0);
        let inputs = Matrix::from_row_major(1, 1, vec![1.0]).unwrap();
        let outputs = Matrix::from_row_major(1, 1, vec![0.0]).unwrap();

        net.backpropagate(&inputs, &outputs);
        net.learn(0.25);

        // grad_w = 2, grad_b = 2
        assert_eq!(net.weights(0).get(0, 0), 0.5);
        assert_eq!(net.biases(0).get(0, 0), -0.5);
    }

    #[test]
    fn learn_with_zero_rate_keeps_parameters() {
        let mut net = Network::new_with_seed(&[2, 3, 1], Activation::Sigmoid, 6).unwrap();
        let inputs = Matrix::from_row_major(2, 2, vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        let outputs = Matrix::from_row_major(1, 2, vec![1.0, 0.0]).unwrap();
        let before = net.snapshot();

        net.backpropagate(&inputs, &outputs);
        assert!(net.weight_gradient(0).iter().any(|g| g != 0.0));
        net.learn(0.0);
        assert_eq!(net.snapshot(), before);

        // A negative rate steps uphill instead of panicking.
        let w = net.weights(1).get(0, 0);
        let g = net.weight_gradient(1).get(0, 0);
        net.learn(-0.5);
        assert_eq!(net.weights(1).get(0, 0), w + 0.5 * g);
    }

    #[test]
    fn cost_is_mean_over_samples_and_units() {
        let mut net = Network::new(&[1, 2], Activation::Identity).unwrap();
        let inputs = Matrix::from_row_major(1, 2, vec![0.0, 0.0]).unwrap();
        let outputs = Matrix::from_row_major(2, 2, vec![1.0, 0.0, 1.0, 1.0]).unwrap();
        // Output is always 0: squared errors 1 + 0 + 1 + 1 over 4 cells.
        assert_eq!(net.cost(&inputs, &outputs), 0.75);
    }

    #[test]
    #[should_panic]
    fn forward_panics_on_input_shape_mismatch() {
        let mut net = Network::new(&[2, 3, 1], Activation::Sigmoid).unwrap();
        net.forward(&[0.0; 3]);
    }

    #[test]
    #[should_panic]
    fn backpropagate_panics_on_row_mismatch() {
        let mut net = Network::new(&[2, 1], Activation::Sigmoid).unwrap();
        let inputs = Matrix::new(2, 4);
        let outputs = Matrix::new(1, 3);
        net.backpropagate(&inputs, &outputs);
    }

    #[test]
    fn display_lists_topology_and_parameters() {
        let mut net = Network::new(&[1, 1], Activation::Identity).unwrap();
        net.weights_mut(0).set(0, 0, 0.5);
        let text = net.to_string();
        assert!(text.starts_with("NN -> LC: 2, NC: 1, 1\n"));
        assert!(text.contains("0 -> W: 0.500000 B: 0.000000"));
    }
}
