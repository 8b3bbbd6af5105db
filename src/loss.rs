//! Loss function(s)

use crate::tensor::{Tensor, TensorError};

/// Mean Squared Error Loss between two tensors of the same shape
pub struct MSELoss;

impl MSELoss {
    pub fn call<T, U>(y_pred: T, y_true: U) -> Result<Tensor, TensorError>
    where
        T: AsRef<Tensor>,
        U: AsRef<Tensor>,
    {
        let diff = (y_pred.as_ref() - y_true.as_ref())?;
        Ok(diff.powf(2.0).mean())
    }
}
