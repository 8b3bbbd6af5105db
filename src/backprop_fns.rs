//! Incremental gradient update functions for backprop
//!
//! Applied depending on the operation which created outputs from inputs. Corresponds to
//! a node in the computation graph.
//!
//! Every function reads what it needs from the graph before taking a mutable borrow, so
//! the same tensor may appear as both operands (e.g. `x.matmul(&x)`).

use crate::tensor::Tensor;

/// Represents the function in the computation graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackpropFunc {
    Add,
    Sub,
    /// `(m, n) + (1, n)` broadcast over rows
    AddBias,
    MatMul,
    ReLU,
    /// element-wise power with a constant exponent
    Powf(f32),
    Mean,
}

impl BackpropFunc {
    pub fn n_operands(&self) -> usize {
        match self {
            BackpropFunc::Add => 2,
            BackpropFunc::Sub => 2,
            BackpropFunc::AddBias => 2,
            BackpropFunc::MatMul => 2,
            BackpropFunc::ReLU => 1,
            BackpropFunc::Powf(_) => 1,
            BackpropFunc::Mean => 1,
        }
    }
}

fn accumulate(target: &Tensor, delta: &[f32]) {
    let mut inner = target.0.borrow_mut();
    for (g, d) in inner.grad.iter_mut().zip(delta.iter()) {
        *g += d;
    }
}

/// Represents backprop for the operation `in1 + in2 = out`
pub fn add(in1: &Tensor, in2: &Tensor, out: &Tensor) {
    let grad = out.grad();
    accumulate(in1, &grad);
    accumulate(in2, &grad);
}

/// Represents backprop for the operation `in1 - in2 = out`
pub fn sub(in1: &Tensor, in2: &Tensor, out: &Tensor) {
    let grad = out.grad();
    let neg_grad: Vec<f32> = grad.iter().map(|g| -g).collect();
    accumulate(in1, &grad);
    accumulate(in2, &neg_grad);
}

/// Represents backprop for the operation `in1 + bias = out` where the bias row is
/// broadcast, so its gradient is the column sum of the output gradient
pub fn add_bias(in1: &Tensor, bias: &Tensor, out: &Tensor) {
    let grad = out.grad();
    let (_, n) = out.shape();
    let mut bias_grad = vec![0.0; n];
    if n > 0 {
        for row in grad.chunks_exact(n) {
            for (b, g) in bias_grad.iter_mut().zip(row.iter()) {
                *b += g;
            }
        }
    }
    accumulate(in1, &grad);
    accumulate(bias, &bias_grad);
}

/// Represents backprop for the operation `in1 x in2 = out`
///
/// `d in1 = d out x in2^T` and `d in2 = in1^T x d out`
pub fn matmul(in1: &Tensor, in2: &Tensor, out: &Tensor) {
    let grad = out.grad();
    let (m, k) = in1.shape();
    let (_, n) = in2.shape();
    let (grad_in1, grad_in2) = {
        let a = &in1.0.borrow().data;
        let b = &in2.0.borrow().data;
        let mut grad_in1 = vec![0.0; m * k];
        let mut grad_in2 = vec![0.0; k * n];
        if k > 0 && n > 0 {
            for ((g_row, a_row), ga_row) in grad
                .chunks_exact(n)
                .zip(a.chunks_exact(k))
                .zip(grad_in1.chunks_exact_mut(k))
            {
                for (((a_ip, ga_ip), b_row), gb_row) in a_row
                    .iter()
                    .zip(ga_row.iter_mut())
                    .zip(b.chunks_exact(n))
                    .zip(grad_in2.chunks_exact_mut(n))
                {
                    let mut acc = 0.0;
                    for ((g_ij, b_pj), gb_pj) in g_row.iter().zip(b_row.iter()).zip(gb_row.iter_mut())
                    {
                        acc += g_ij * b_pj;
                        *gb_pj += a_ip * g_ij;
                    }
                    *ga_ip += acc;
                }
            }
        }
        (grad_in1, grad_in2)
    };
    accumulate(in1, &grad_in1);
    accumulate(in2, &grad_in2);
}

/// Represents backprop for the operation `relu(in) = out`
pub fn relu(in1: &Tensor, out: &Tensor) {
    let grad = out.grad();
    let delta: Vec<f32> = in1
        .0
        .borrow()
        .data
        .iter()
        .zip(grad.iter())
        .map(|(x, g)| if *x > 0.0 { *g } else { 0.0 })
        .collect();
    accumulate(in1, &delta);
}

/// Represents backprop for the operation `in^e = out`
pub fn powf(in1: &Tensor, exponent: f32, out: &Tensor) {
    let grad = out.grad();
    let delta: Vec<f32> = in1
        .0
        .borrow()
        .data
        .iter()
        .zip(grad.iter())
        .map(|(x, g)| exponent * x.powf(exponent - 1.0) * g)
        .collect();
    accumulate(in1, &delta);
}

/// Represents backprop for the operation `mean(in) = out`
pub fn mean(in1: &Tensor, out: &Tensor) {
    let grad = out.grad()[0];
    let n = in1.len();
    let delta = vec![grad / n as f32; n];
    accumulate(in1, &delta);
}

/// Applies a backprop function for operators with two operands
pub fn update_gradients_two_operands(in1: &Tensor, in2: &Tensor, out: &Tensor) {
    let backprop_fn = { out.0.borrow().backprop_fn };
    match backprop_fn {
        Some(BackpropFunc::Add) => add(in1, in2, out),
        Some(BackpropFunc::Sub) => sub(in1, in2, out),
        Some(BackpropFunc::AddBias) => add_bias(in1, in2, out),
        Some(BackpropFunc::MatMul) => matmul(in1, in2, out),
        None => {}
        _ => panic!("Invalid backprop function: {:?}", backprop_fn),
    }
}

/// Applies a backprop function for operators with one operand
pub fn update_gradients_one_operand(in1: &Tensor, out: &Tensor) {
    let backprop_fn = { out.0.borrow().backprop_fn };
    match backprop_fn {
        Some(BackpropFunc::ReLU) => relu(in1, out),
        Some(BackpropFunc::Powf(exponent)) => powf(in1, exponent, out),
        Some(BackpropFunc::Mean) => mean(in1, out),
        None => {}
        _ => panic!("Invalid backprop function: {:?}", backprop_fn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_n_operands_match_dispatch() {
        assert_eq!(BackpropFunc::MatMul.n_operands(), 2);
        assert_eq!(BackpropFunc::AddBias.n_operands(), 2);
        assert_eq!(BackpropFunc::Powf(2.0).n_operands(), 1);
        assert_eq!(BackpropFunc::Mean.n_operands(), 1);
    }

    #[test]
    fn test_matmul_rectangular_grads() {
        // (1, 2) x (2, 3)
        let a = Tensor::new(vec![1.0, 2.0], (1, 2)).unwrap();
        let b = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (2, 3)).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.data(), vec![9.0, 12.0, 15.0]);

        c.backward();
        // row sums of b
        assert_eq!(a.grad(), vec![6.0, 15.0]);
        // each row of b receives the matching entry of a
        assert_eq!(b.grad(), vec![1.0, 1.0, 1.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_gradients_accumulate_across_backward_calls() {
        let a = Tensor::new(vec![2.0], (1, 1)).unwrap();
        let z = a.powf(3.0);
        z.backward();
        z.backward();
        // 2 * 3a^2
        assert_eq!(a.grad(), vec![24.0]);
    }
}
