//! Components to build a neural network

use std::sync::atomic::{self, AtomicUsize};

use rand::Rng;
use rand_distr::{Distribution, Uniform, uniform};
use thiserror::Error;

use crate::tensor::{Tensor, TensorError};

/// Errors for the neural network
#[derive(Debug, Error)]
pub enum NNError {
    #[error("Input size mismatch: expected {expected} features, got {got}")]
    InputSizeMismatch { expected: usize, got: usize },
    #[error("Failed to initialize layer parameters: {0}")]
    Init(#[from] uniform::Error),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}

/// Represents the torch.nn.Module. NNs should implement this trait.
/// <https://github.com/pytorch/pytorch/blob/v2.6.0/torch/nn/modules/module.py#L402>
pub trait Module {
    fn zero_grad(&mut self) {
        for p in self.parameters().iter_mut() {
            p.zero_grad();
        }
    }

    fn parameters(&self) -> Vec<Tensor>;
    fn forward(&self, input: &Tensor) -> Result<Tensor, NNError>;
}

/// A fully connected layer computing `x W + b`
pub struct Linear {
    /// `(n_inputs, n_outputs)`
    pub weight: Tensor,
    /// `(1, n_outputs)`
    pub bias: Tensor,
    n_output_nans: AtomicUsize,
}

impl Linear {
    /// Creates a new layer with the given number of inputs and outputs.
    ///
    /// Weights and biases are drawn from `U(-1/sqrt(n_inputs), 1/sqrt(n_inputs))`, the
    /// same default PyTorch uses for `nn.Linear`.
    pub fn new<R: Rng + ?Sized>(
        n_inputs: usize,
        n_outputs: usize,
        rng: &mut R,
    ) -> Result<Self, NNError> {
        let bound = 1.0 / (n_inputs as f32).sqrt();
        let uniform = Uniform::new(-bound, bound)?;
        let weight = (0..n_inputs * n_outputs)
            .map(|_| uniform.sample(rng))
            .collect();
        let bias = (0..n_outputs).map(|_| uniform.sample(rng)).collect();
        Ok(Self {
            weight: Tensor::new(weight, (n_inputs, n_outputs))?,
            bias: Tensor::new(bias, (1, n_outputs))?,
            n_output_nans: AtomicUsize::new(0),
        })
    }

    // Testing utility for a deterministic and simple layer
    #[cfg(test)]
    fn new_ones(n_inputs: usize, n_outputs: usize) -> Self {
        Self {
            weight: Tensor::new(vec![1.0; n_inputs * n_outputs], (n_inputs, n_outputs)).unwrap(),
            bias: Tensor::new(vec![1.0; n_outputs], (1, n_outputs)).unwrap(),
            n_output_nans: AtomicUsize::new(0),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape().0
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape().1
    }

    /// Number of NaN outputs in the most recent forward pass (used for debugging)
    pub fn n_output_nans(&self) -> usize {
        self.n_output_nans.load(atomic::Ordering::Relaxed)
    }
}

impl Module for Linear {
    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone(), self.bias.clone()]
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, NNError> {
        let (_, got) = input.shape();
        if got != self.in_features() {
            return Err(NNError::InputSizeMismatch {
                expected: self.in_features(),
                got,
            });
        }
        let output = input.matmul(&self.weight)?.add_bias(&self.bias)?;
        let n_output_nans = output.data().iter().filter(|v| v.is_nan()).count();
        self.n_output_nans
            .store(n_output_nans, atomic::Ordering::Relaxed);
        if n_output_nans > 0 {
            log::debug!("n_output_nans: {}", n_output_nans);
        }
        Ok(output)
    }
}

/// Applies ReLU element-wise, works for arbitrary shapes
#[derive(Default)]
pub struct ReLU {
    n_dead_neurons: AtomicUsize,
}

impl ReLU {
    pub fn new() -> Self {
        Self {
            n_dead_neurons: AtomicUsize::new(0),
        }
    }

    /// Returns the number of non-positive pre-activations in the last forward pass
    pub fn n_dead_neurons(&self) -> usize {
        self.n_dead_neurons.load(atomic::Ordering::Relaxed)
    }
}

impl Module for ReLU {
    fn parameters(&self) -> Vec<Tensor> {
        vec![]
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, NNError> {
        let n_dead_neurons = input.data().iter().filter(|v| **v <= 0.0).count();
        self.n_dead_neurons
            .store(n_dead_neurons, atomic::Ordering::Relaxed);
        Ok(input.relu())
    }
}

/// Chains modules, feeding each output into the next
#[derive(Default)]
pub struct Sequential {
    layers: Vec<Box<dyn Module>>,
}

impl Sequential {
    pub fn new() -> Self {
        Self { layers: vec![] }
    }

    /// Appends a module, builder style
    pub fn add(mut self, layer: impl Module + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

impl Module for Sequential {
    fn parameters(&self) -> Vec<Tensor> {
        self.layers.iter().flat_map(|l| l.parameters()).collect()
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, NNError> {
        self.layers
            .iter()
            .try_fold(input.clone(), |x, layer| layer.forward(&x))
    }
}

impl<M: Module + ?Sized> Module for Box<M> {
    fn parameters(&self) -> Vec<Tensor> {
        (**self).parameters()
    }

    fn forward(&self, input: &Tensor) -> Result<Tensor, NNError> {
        (**self).forward(input)
    }
}
