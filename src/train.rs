use std::io::Write;

use crate::{Error, Network, Result, Samples, Scalar, TraceWriter};

/// Iterations between two `debug!` cost lines.
const LOG_EVERY: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainConfig {
    pub learning_rate: Scalar,
    /// Training stops once the cost is at or below this value.
    pub cost_threshold: Scalar,
    pub max_iterations: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 10.0,
            cost_threshold: 1e-4,
            max_iterations: 100_000,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        if !(self.cost_threshold.is_finite() && self.cost_threshold >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "cost_threshold must be finite and >= 0, got {}",
                self.cost_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be > 0".to_owned()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainReport {
    /// Number of backpropagate + learn steps taken.
    pub iterations: usize,
    pub initial_cost: Scalar,
    pub final_cost: Scalar,
    /// Whether the cost reached `cost_threshold` before `max_iterations`.
    pub converged: bool,
}

impl Network {
    /// Full-batch gradient descent until the cost reaches `cfg.cost_threshold`
    /// or `cfg.max_iterations` steps have run.
    pub fn train(&mut self, samples: &Samples, cfg: TrainConfig) -> Result<TrainReport> {
        self.fit_loop(samples, cfg, |_| Ok(()))
    }

    /// Like [`Network::train`], appending one trace frame after every step.
    ///
    /// The trace is left open; call [`TraceWriter::finish`] once done with it.
    pub fn train_with_trace<W: Write>(
        &mut self,
        samples: &Samples,
        cfg: TrainConfig,
        trace: &mut TraceWriter<W>,
    ) -> Result<TrainReport> {
        self.fit_loop(samples, cfg, |network| trace.write_frame(network))
    }

    fn fit_loop(
        &mut self,
        samples: &Samples,
        cfg: TrainConfig,
        mut on_step: impl FnMut(&Network) -> Result<()>,
    ) -> Result<TrainReport> {
        cfg.validate()?;
        if samples.input_dim() != self.input_dim() {
            return Err(Error::InvalidData(format!(
                "samples input_dim {} does not match network input_dim {}",
                samples.input_dim(),
                self.input_dim()
            )));
        }
        if samples.output_dim() != self.output_dim() {
            return Err(Error::InvalidData(format!(
                "samples output_dim {} does not match network output_dim {}",
                samples.output_dim(),
                self.output_dim()
            )));
        }

        let inputs = samples.inputs();
        let outputs = samples.outputs();

        let initial_cost = self.cost(&inputs, &outputs);
        let mut cost = initial_cost;
        let mut iterations = 0;

        log::info!(
            "training {:?} ({:?}) on {} samples: lr={} threshold={} max_iterations={} initial_cost={initial_cost}",
            self.layer_sizes(),
            self.activation(),
            samples.len(),
            cfg.learning_rate,
            cfg.cost_threshold,
            cfg.max_iterations
        );

        while cost > cfg.cost_threshold && iterations < cfg.max_iterations {
            self.backpropagate(&inputs, &outputs);
            self.learn(cfg.learning_rate);
            on_step(&*self)?;

            cost = self.cost(&inputs, &outputs);
            iterations += 1;

            if !cost.is_finite() {
                return Err(Error::InvalidData(format!(
                    "training diverged at iteration {iterations}: cost is {cost}"
                )));
            }
            if iterations % LOG_EVERY == 0 {
                log::debug!("iteration {iterations}: cost={cost}");
            }
        }

        let converged = cost <= cfg.cost_threshold;
        log::info!(
            "training finished after {iterations} iterations: cost={cost} converged={converged}"
        );

        Ok(TrainReport {
            iterations,
            initial_cost,
            final_cost: cost,
            converged,
        })
    }
}
