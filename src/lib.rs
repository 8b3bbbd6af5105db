//! Fits a small feed-forward network to `sin(x)` in real time, using a minimal
//! PyTorch-like autograd library over 2-D tensors.

pub mod app;
pub mod backprop_fns;
pub mod datasets;
pub mod loss;
pub mod model;
pub mod nn;
pub mod optim;
pub mod tensor;
pub mod trainer;
pub mod ui;
