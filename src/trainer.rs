//! One full-batch gradient step per call, shared by the live display and headless runs

use crate::{
    datasets::SineDataset,
    loss::MSELoss,
    nn::{Module, NNError},
    optim::{Adam, AdamConfig, Optim},
};

/// What a single step produced, enough to redraw the chart
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// 1-based index of the step
    pub step: usize,
    pub loss: f32,
    /// network output for every dataset input, before the parameter update
    pub prediction: Vec<f32>,
}

/// Owns the model, optimizer, and dataset
pub struct Trainer {
    model: Box<dyn Module>,
    optim: Adam,
    dataset: SineDataset,
    steps: usize,
}

impl Trainer {
    pub fn new(model: Box<dyn Module>, cfg: AdamConfig) -> Self {
        let optim = Adam::new(model.parameters(), cfg);
        Self {
            model,
            optim,
            dataset: SineDataset::new(),
            steps: 0,
        }
    }

    pub fn dataset(&self) -> &SineDataset {
        &self.dataset
    }

    pub fn model(&self) -> &dyn Module {
        &*self.model
    }

    /// Number of completed steps
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Zero gradients, forward, loss, backward, optimizer step, in that order
    pub fn step(&mut self) -> Result<StepOutput, NNError> {
        // fresh column views every step, so the dataset itself never carries gradients
        let inputs = self.dataset.inputs();
        let targets = self.dataset.targets();

        self.optim.zero_grad();
        let output = self.model.forward(&inputs)?;

        let loss = MSELoss::call(&output, &targets)?;
        loss.backward();
        self.optim.step()?;

        self.steps += 1;
        let loss = loss.item()?;
        log::debug!("step: {}, loss: {}", self.steps, loss);
        Ok(StepOutput {
            step: self.steps,
            loss,
            prediction: output.data(),
        })
    }
}
