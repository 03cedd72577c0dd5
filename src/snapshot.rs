//! JSON snapshots of a network (feature: `serde`).
//!
//! Replay viewers and other external tools consume parameters as JSON rather than
//! the binary trace. A snapshot captures topology, activation and the live weights
//! and biases of every transition.
//!
//! Design notes:
//! - We do NOT serialize `Network` directly; its packed arena layout is internal.
//! - Import validates layer sizes, parameter lengths, and that all values are finite.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Activation, Error, Frame, Matrix, Network, Result, Scalar};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub format_version: u32,
    pub activation: SerializedActivation,
    pub layer_sizes: Vec<usize>,
    pub transitions: Vec<SerializedTransition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedTransition {
    /// Row-major, `layer_sizes[t]` rows by `layer_sizes[t + 1]` cols.
    pub weights: Vec<Scalar>,
    pub biases: Vec<Scalar>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedActivation {
    Identity,
    Sigmoid,
    Tanh,
    Relu,
}

impl From<Activation> for SerializedActivation {
    fn from(value: Activation) -> Self {
        match value {
            Activation::Identity => SerializedActivation::Identity,
            Activation::Sigmoid => SerializedActivation::Sigmoid,
            Activation::Tanh => SerializedActivation::Tanh,
            Activation::ReLU => SerializedActivation::Relu,
        }
    }
}

impl From<SerializedActivation> for Activation {
    fn from(value: SerializedActivation) -> Self {
        match value {
            SerializedActivation::Identity => Activation::Identity,
            SerializedActivation::Sigmoid => Activation::Sigmoid,
            SerializedActivation::Tanh => Activation::Tanh,
            SerializedActivation::Relu => Activation::ReLU,
        }
    }
}

impl NetworkSnapshot {
    pub fn validate(&self) -> Result<()> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidData(format!(
                "unsupported snapshot format_version {}; expected {}",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        if self.layer_sizes.len() < 2 {
            return Err(Error::InvalidData("snapshot must have at least two layers".to_owned()));
        }
        if self.transitions.len() != self.layer_sizes.len() - 1 {
            return Err(Error::InvalidData(format!(
                "snapshot has {} transitions, expected {}",
                self.transitions.len(),
                self.layer_sizes.len() - 1
            )));
        }

        let pairs = self.layer_sizes.windows(2).zip(&self.transitions);
        for (t, (w, tr)) in pairs.enumerate() {
            let (prev, next) = (w[0], w[1]);
            let expected_w = prev
                .checked_mul(next)
                .ok_or_else(|| Error::InvalidData("weight shape overflow".to_owned()))?;
            if tr.weights.len() != expected_w {
                return Err(Error::InvalidData(format!(
                    "transition {t} weights length {} does not match {prev} * {next}",
                    tr.weights.len()
                )));
            }
            if tr.biases.len() != next {
                return Err(Error::InvalidData(format!(
                    "transition {t} biases length {} does not match {next}",
                    tr.biases.len()
                )));
            }
            if tr.weights.iter().chain(&tr.biases).any(|v| !v.is_finite()) {
                return Err(Error::InvalidData(format!(
                    "transition {t} must contain only finite values"
                )));
            }
        }

        Ok(())
    }
}

impl From<&Network> for NetworkSnapshot {
    fn from(network: &Network) -> Self {
        let transitions = (0..network.transition_count())
            .map(|t| SerializedTransition {
                weights: network.weights(t).to_vec(),
                biases: network.biases(t).to_vec(),
            })
            .collect();
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            activation: network.activation().into(),
            layer_sizes: network.layer_sizes().to_vec(),
            transitions,
        }
    }
}

impl TryFrom<NetworkSnapshot> for Network {
    type Error = Error;

    fn try_from(value: NetworkSnapshot) -> Result<Self> {
        value.validate()?;

        let mut network = Network::new(&value.layer_sizes, value.activation.into())?;
        for (t, tr) in value.transitions.into_iter().enumerate() {
            let w = network.weights(t);
            let weights = Matrix::from_row_major(w.cols(), w.rows(), tr.weights)?;
            let biases = Matrix::from_row_major(tr.biases.len(), 1, tr.biases)?;
            network.weights_mut(t).copy_from(&weights);
            network.biases_mut(t).copy_from(&biases);
        }
        Ok(network)
    }
}

impl NetworkSnapshot {
    /// Snapshot of a replayed trace frame.
    pub fn from_frame(header: &crate::TraceHeader, frame: &Frame) -> Result<Self> {
        let mut network = Network::from_header(header)?;
        network.load_frame(frame)?;
        Ok(Self::from(&network))
    }
}

impl Network {
    /// Serialize the live parameters to a pretty-printed JSON string.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&NetworkSnapshot::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize network: {e}")))
    }

    /// Serialize the live parameters to a compact JSON string.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string(&NetworkSnapshot::from(self))
            .map_err(|e| Error::InvalidData(format!("failed to serialize network: {e}")))
    }

    /// Parse a network from a JSON snapshot.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let snapshot: NetworkSnapshot = serde_json::from_str(s)
            .map_err(|e| Error::InvalidData(format!("failed to parse network json: {e}")))?;
        snapshot.try_into()
    }

    /// Save a pretty-printed JSON snapshot.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let s = self.to_json_string_pretty()?;
        let p = path.as_ref();
        std::fs::write(p, s)
            .map_err(|e| Error::io(format_args!("failed to write {}", p.display()), e))?;
        Ok(())
    }

    /// Load a network from a JSON snapshot file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let s = std::fs::read_to_string(p)
            .map_err(|e| Error::io(format_args!("failed to read {}", p.display()), e))?;
        Self::from_json_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn golden_network() -> Network {
        let mut net = Network::new(&[2, 1], Activation::Sigmoid).unwrap();
        net.weights_mut(0).set(0, 0, 0.5);
        net.weights_mut(0).set(0, 1, -1.0);
        net.biases_mut(0).set(0, 0, 0.25);
        net
    }

    #[test]
    fn golden_json_is_stable_and_roundtrips() {
        let json = golden_network().to_json_string_pretty().unwrap();

        let golden = include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/golden/network_v1.json"
        ))
        .trim_end();
        assert_eq!(json, golden);

        let loaded = Network::from_json_str(golden).unwrap();
        assert_eq!(loaded.to_json_string_pretty().unwrap(), golden);
    }

    #[test]
    fn rejects_unknown_version() {
        let bad = r#"{"format_version":999,"activation":{"kind":"sigmoid"},"layer_sizes":[],"transitions":[]}"#;
        let err = Network::from_json_str(bad).unwrap_err();
        assert!(format!("{err}").contains("format_version"));
    }

    #[test]
    fn rejects_wrong_parameter_count() {
        let mut snap = NetworkSnapshot::from(&golden_network());
        snap.transitions[0].weights.pop();
        assert!(Network::try_from(snap).is_err());
    }

    #[test]
    fn frame_snapshot_matches_network_snapshot() {
        let net = golden_network();
        let header = crate::TraceHeader::from_network(&net);
        let snap = NetworkSnapshot::from_frame(&header, &net.snapshot()).unwrap();
        assert_eq!(snap, NetworkSnapshot::from(&net));
    }
}
