use trace_mlp::{Activation, Network, Samples, Scalar, TrainConfig};

fn xor() -> Samples {
    Samples::from_interleaved(
        vec![
            0.0, 0.0, 0.0, //
            0.0, 1.0, 1.0, //
            1.0, 0.0, 1.0, //
            1.0, 1.0, 0.0,
        ],
        2,
        1,
    )
    .unwrap()
}

fn cost_of(net: &mut Network, samples: &Samples) -> Scalar {
    net.cost(&samples.inputs(), &samples.outputs())
}

/// Central difference of the cost with respect to every weight and bias, compared
/// against the analytic gradient scaled by `scale`.
fn check_gradients(net: &mut Network, samples: &Samples, scale: Scalar) {
    let eps = 1e-6;
    let tol = 1e-4;

    net.backpropagate(&samples.inputs(), &samples.outputs());

    for t in 0..net.transition_count() {
        let (cols, rows) = (net.weights(t).cols(), net.weights(t).rows());
        for r in 0..rows {
            for c in 0..cols {
                let analytic = net.weight_gradient(t).get(c, r);
                let orig = net.weights(t).get(c, r);

                net.weights_mut(t).set(c, r, orig + eps);
                let plus = cost_of(net, samples);
                net.weights_mut(t).set(c, r, orig - eps);
                let minus = cost_of(net, samples);
                net.weights_mut(t).set(c, r, orig);

                let numeric = scale * (plus - minus) / (2.0 * eps);
                assert!(
                    (analytic - numeric).abs() < tol,
                    "weight t={t} ({c}, {r}): analytic={analytic} numeric={numeric}"
                );
            }
        }

        for c in 0..net.biases(t).cols() {
            let analytic = net.bias_gradient(t).get(c, 0);
            let orig = net.biases(t).get(c, 0);

            net.biases_mut(t).set(c, 0, orig + eps);
            let plus = cost_of(net, samples);
            net.biases_mut(t).set(c, 0, orig - eps);
            let minus = cost_of(net, samples);
            net.biases_mut(t).set(c, 0, orig);

            let numeric = scale * (plus - minus) / (2.0 * eps);
            assert!(
                (analytic - numeric).abs() < tol,
                "bias t={t} {c}: analytic={analytic} numeric={numeric}"
            );
        }
    }
}

#[test]
fn backpropagate_matches_finite_differences() {
    let samples = xor();
    for seed in 0..3 {
        let mut net = Network::new_with_seed(&[2, 2, 1], Activation::Sigmoid, seed).unwrap();
        check_gradients(&mut net, &samples, 1.0);
    }
}

#[test]
fn backpropagate_is_unnormalized_by_output_width() {
    // The output error is not divided by the number of output units, so with two
    // outputs the analytic gradient is twice the derivative of the mean cost.
    let samples = Samples::from_rows(
        &[vec![0.2, -0.4, 0.9], vec![-0.7, 0.1, 0.3]],
        &[vec![0.5, -0.25], vec![0.0, 0.75]],
    )
    .unwrap();
    let mut net = Network::new_with_seed(&[3, 4, 2], Activation::Tanh, 9).unwrap();
    check_gradients(&mut net, &samples, 2.0);
}

#[test]
fn xor_converges_from_a_fixed_start() {
    let samples = xor();
    let mut net = Network::new(&[2, 2, 1], Activation::Sigmoid).unwrap();

    // weights(t) is (previous unit) rows by (next unit) cols.
    let w0 = [[0.9, 0.3], [0.2, 0.8]];
    for (row, values) in w0.iter().enumerate() {
        for (col, &v) in values.iter().enumerate() {
            net.weights_mut(0).set(col, row, v);
        }
    }
    net.biases_mut(0).set(0, 0, 0.1);
    net.biases_mut(0).set(1, 0, 0.6);
    net.weights_mut(1).set(0, 0, 0.7);
    net.weights_mut(1).set(0, 1, 0.4);
    net.biases_mut(1).set(0, 0, 0.5);

    let cfg = TrainConfig {
        learning_rate: 10.0,
        cost_threshold: 1e-4,
        max_iterations: 10_000,
    };
    let report = net.train(&samples, cfg).unwrap();

    assert!(report.converged, "did not converge: {report:?}");
    assert!(report.final_cost < 1e-4);

    let inputs = samples.inputs();
    let outputs = samples.outputs();
    for s in 0..samples.len() {
        let y = net.forward(inputs.row(s))[0];
        let t = outputs.get(0, s);
        let x = inputs.row(s);
        assert!((y - t).abs() < 0.05, "xor{x:?} = {y}, expected {t}");
    }
}

#[test]
fn training_lowers_cost_from_random_starts() {
    let samples = xor();
    for seed in 0..5 {
        let mut net = Network::new_with_seed(&[2, 2, 1], Activation::Sigmoid, seed).unwrap();
        let cfg = TrainConfig {
            max_iterations: 2_000,
            cost_threshold: 0.0,
            ..TrainConfig::default()
        };
        let report = net.train(&samples, cfg).unwrap();
        assert!(
            report.final_cost < report.initial_cost,
            "seed {seed}: {report:?}"
        );
    }
}

#[test]
fn forward_is_bit_identical_across_calls() {
    let mut net = Network::new_with_seed(&[2, 4, 3], Activation::Sigmoid, 5).unwrap();
    let x = [0.25, -1.5];
    let first: Vec<u64> = net.forward(&x).iter().map(|v| v.to_bits()).collect();

    // Run something else through in between.
    net.forward(&[3.0, 3.0]);

    let second: Vec<u64> = net.forward(&x).iter().map(|v| v.to_bits()).collect();
    assert_eq!(first, second);
}

#[test]
fn backpropagate_leaves_last_sample_in_live_activations() {
    let samples = xor();
    let mut net = Network::new_with_seed(&[2, 2, 1], Activation::Sigmoid, 4).unwrap();
    net.backpropagate(&samples.inputs(), &samples.outputs());
    let after_backprop = net.output().to_vec();

    let last = samples.inputs().row(samples.len() - 1).to_vec();
    assert_eq!(net.forward(&last).to_vec(), after_backprop);
}
