//! Optimizer(s)

use crate::tensor::{Tensor, TensorError};

/// Common interface for optimizers
/// Analogous to the torch.optim.Optimizer interface
/// <https://pytorch.org/docs/stable/optim.html#base-class>
pub trait Optim {
    /// Performs a single optimization step with accumulated gradients
    fn step(&mut self) -> Result<(), TensorError>;
    /// Zeros gradients for all parameters
    fn zero_grad(&mut self);
}

/// Hyperparameters for [`Adam`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamConfig {
    pub lr: f32,
    pub betas: [f32; 2],
    pub eps: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            lr: 1e-3,
            betas: [0.9, 0.999],
            eps: 1e-8,
        }
    }
}

/// Adam: per-parameter adaptive learning rates from bias-corrected first and second
/// moment estimates of the gradients
///
/// ```text
/// m = b1 * m + (1 - b1) * g
/// v = b2 * v + (1 - b2) * g^2
/// p -= lr * (m / (1 - b1^t)) / (sqrt(v / (1 - b2^t)) + eps)
/// ```
pub struct Adam {
    params: Vec<Tensor>,
    cfg: AdamConfig,
    /// number of steps taken so far
    t: i32,
    moment1: Vec<Vec<f32>>,
    moment2: Vec<Vec<f32>>,
}

impl Adam {
    pub fn new(params: Vec<Tensor>, cfg: AdamConfig) -> Self {
        let moment1 = params.iter().map(|p| vec![0.0; p.len()]).collect();
        let moment2 = params.iter().map(|p| vec![0.0; p.len()]).collect();
        Self {
            params,
            cfg,
            t: 0,
            moment1,
            moment2,
        }
    }

    pub fn config(&self) -> &AdamConfig {
        &self.cfg
    }

    pub fn steps(&self) -> i32 {
        self.t
    }
}

impl Optim for Adam {
    fn step(&mut self) -> Result<(), TensorError> {
        self.t += 1;
        let [beta1, beta2] = self.cfg.betas;
        let bias_correction1 = 1.0 - beta1.powi(self.t);
        let bias_correction2 = 1.0 - beta2.powi(self.t);

        for ((param, m), v) in self
            .params
            .iter_mut()
            .zip(self.moment1.iter_mut())
            .zip(self.moment2.iter_mut())
        {
            let grad = param.grad();
            let mut data = param.data();
            for (((p, g), m), v) in data
                .iter_mut()
                .zip(grad.iter())
                .zip(m.iter_mut())
                .zip(v.iter_mut())
            {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *p -= self.cfg.lr * m_hat / (v_hat.sqrt() + self.cfg.eps);
            }
            param.set_data(data)?;
        }
        Ok(())
    }

    fn zero_grad(&mut self) {
        for param in self.params.iter_mut() {
            param.zero_grad();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::assert_eq_float;

    use super::*;

    fn quadratic_loss(param: &Tensor) -> Tensor {
        // mean(p^2) over two elements, so d/dp = p
        param.powf(2.0).mean()
    }

    #[test]
    fn test_adam_first_step_moves_by_lr() {
        let param = Tensor::new(vec![1.0, -2.0], (1, 2)).unwrap();
        quadratic_loss(&param).backward();
        assert_eq!(param.grad(), vec![1.0, -2.0]);

        let cfg = AdamConfig {
            lr: 0.1,
            ..Default::default()
        };
        let mut optim = Adam::new(vec![param.clone()], cfg);
        optim.step().unwrap();

        // after bias correction m_hat = g and v_hat = g^2, so the step is lr * sign(g)
        let data = param.data();
        assert_eq_float!(data[0], 0.9);
        assert_eq_float!(data[1], -1.9);
        assert_eq!(optim.steps(), 1);
    }

    #[test]
    fn test_adam_constant_gradient() {
        let param = Tensor::new(vec![1.0, 2.0], (1, 2)).unwrap();
        quadratic_loss(&param).backward();

        let cfg = AdamConfig {
            lr: 0.1,
            ..Default::default()
        };
        let mut optim = Adam::new(vec![param.clone()], cfg);
        // gradients are not recomputed, so every step sees the same g
        optim.step().unwrap();
        optim.step().unwrap();
        let data = param.data();
        assert_eq_float!(data[0], 0.8);
        assert_eq_float!(data[1], 1.8);
    }

    #[test]
    fn test_adam_zero_grad() {
        let param = Tensor::new(vec![3.0, 4.0], (1, 2)).unwrap();
        quadratic_loss(&param).backward();
        let mut optim = Adam::new(vec![param.clone()], AdamConfig::default());
        optim.zero_grad();
        assert_eq!(param.grad(), vec![0.0, 0.0]);

        // a zero gradient leaves the parameter where it is
        optim.step().unwrap();
        assert_eq!(param.data(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_adam_reduces_loss() {
        let param = Tensor::new(vec![1.5, -0.5], (1, 2)).unwrap();
        let mut optim = Adam::new(
            vec![param.clone()],
            AdamConfig {
                lr: 0.05,
                ..Default::default()
            },
        );
        let initial = quadratic_loss(&param).item().unwrap();
        for _ in 0..50 {
            optim.zero_grad();
            quadratic_loss(&param).backward();
            optim.step().unwrap();
        }
        assert!(quadratic_loss(&param).item().unwrap() < initial);
    }
}
