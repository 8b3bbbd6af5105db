//! The network fitted to the sine curve

use std::fmt::{self, Display};

use clap::ValueEnum;
use rand::Rng;

use crate::{
    nn::{Linear, Module, NNError, ReLU, Sequential},
    tensor::Tensor,
};

/// Width of both hidden layers
pub const HIDDEN_UNITS: usize = 100;

/// Toggles between two equivalent ways of wiring the same layers
#[derive(Debug, ValueEnum, Clone, Copy, Default, PartialEq, Eq)]
pub enum Topology {
    /// Named layers with the activations applied in `forward`
    #[default]
    Explicit,
    /// The same layers chained in a `Sequential`
    Sequential,
}

impl Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topology::Explicit => write!(f, "explicit"),
            Topology::Sequential => write!(f, "sequential"),
        }
    }
}

// linear(1 -> 100) -> ReLU -> linear(100 -> 100) -> ReLU -> linear(100 -> 1)
pub struct SineNet {
    fc1: Linear,
    fc1_relu: ReLU,
    fc2: Linear,
    fc2_relu: ReLU,
    fc3: Linear,
}

impl SineNet {
    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Result<Self, NNError> {
        Ok(Self {
            fc1: Linear::new(1, HIDDEN_UNITS, rng)?,
            fc1_relu: ReLU::new(),
            fc2: Linear::new(HIDDEN_UNITS, HIDDEN_UNITS, rng)?,
            fc2_relu: ReLU::new(),
            fc3: Linear::new(HIDDEN_UNITS, 1, rng)?,
        })
    }

    /// Dead units across both hidden layers in the last forward pass
    pub fn n_dead_neurons(&self) -> usize {
        self.fc1_relu.n_dead_neurons() + self.fc2_relu.n_dead_neurons()
    }
}

impl Module for SineNet {
    fn forward(&self, input: &Tensor) -> Result<Tensor, NNError> {
        let fc1_out = self.fc1_relu.forward(&self.fc1.forward(input)?)?;
        let fc2_out = self.fc2_relu.forward(&self.fc2.forward(&fc1_out)?)?;
        let out = self.fc3.forward(&fc2_out)?;
        log::trace!("n_dead_neurons: {}", self.n_dead_neurons());
        Ok(out)
    }

    fn parameters(&self) -> Vec<Tensor> {
        self.fc1
            .parameters()
            .into_iter()
            .chain(self.fc2.parameters())
            .chain(self.fc3.parameters())
            .collect()
    }
}

/// Builds the sequential equivalent of [`SineNet`], drawing parameters in the same order
pub fn sequential_sine_net<R: Rng + ?Sized>(rng: &mut R) -> Result<Sequential, NNError> {
    Ok(Sequential::new()
        .add(Linear::new(1, HIDDEN_UNITS, rng)?)
        .add(ReLU::new())
        .add(Linear::new(HIDDEN_UNITS, HIDDEN_UNITS, rng)?)
        .add(ReLU::new())
        .add(Linear::new(HIDDEN_UNITS, 1, rng)?))
}

/// Builds the network for the requested topology
pub fn build_model<R: Rng + ?Sized>(
    topology: Topology,
    rng: &mut R,
) -> Result<Box<dyn Module>, NNError> {
    Ok(match topology {
        Topology::Explicit => Box::new(SineNet::new(rng)?),
        Topology::Sequential => Box::new(sequential_sine_net(rng)?),
    })
}
