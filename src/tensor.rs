//! Two dimensional tensors which form a computation graph
use std::{
    cell::RefCell,
    collections::HashSet,
    ops::{Add, Sub},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

use thiserror::Error;

use crate::backprop_fns::{
    BackpropFunc, update_gradients_one_operand, update_gradients_two_operands,
};

type SharedTensor = Rc<RefCell<InnerTensor>>;

/// `(rows, cols)`
pub type Shape = (usize, usize);

/// Errors raised by tensor operations
#[derive(Debug, Error, PartialEq)]
pub enum TensorError {
    #[error("Shape mismatch in {op}: {left:?} vs {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: Shape,
        right: Shape,
    },
    #[error("Data length {len} does not match shape {shape:?}")]
    DataLength { len: usize, shape: Shape },
    #[error("Expected a 1x1 tensor, got {shape:?}")]
    NotAScalar { shape: Shape },
}

/// Newtype representing a shared tensor in a computation graph
#[derive(Debug, Clone)]
pub struct Tensor(pub(crate) SharedTensor);

impl Tensor {
    /// Create a new leaf tensor from row-major data
    pub fn new(data: Vec<f32>, shape: Shape) -> Result<Self, TensorError> {
        if data.len() != shape.0 * shape.1 {
            return Err(TensorError::DataLength {
                len: data.len(),
                shape,
            });
        }
        Ok(Self::new_unchecked(data, shape, None))
    }

    /// Create an `(n, 1)` leaf tensor, the equivalent of `view(-1, 1)`
    pub fn column(values: &[f32]) -> Self {
        Self::new_unchecked(values.to_vec(), (values.len(), 1), None)
    }

    pub fn scalar(value: f32) -> Self {
        Self::new_unchecked(vec![value], (1, 1), None)
    }

    pub fn zeros(shape: Shape) -> Self {
        Self::new_unchecked(vec![0.0; shape.0 * shape.1], shape, None)
    }

    fn new_unchecked(data: Vec<f32>, shape: Shape, backprop_fn: Option<BackpropFunc>) -> Self {
        Self(Rc::new(RefCell::new(InnerTensor::new(
            data,
            shape,
            backprop_fn,
        ))))
    }

    /// Create a tensor derived from an operation (i.e. not a leaf node)
    fn new_derived(data: Vec<f32>, shape: Shape, backprop_fn: BackpropFunc) -> Self {
        Self::new_unchecked(data, shape, Some(backprop_fn))
    }

    fn add_child(&self, child: &Tensor) {
        self.0.borrow_mut().children.push(child.0.clone());
    }

    pub fn shape(&self) -> Shape {
        self.0.borrow().shape
    }

    pub fn len(&self) -> usize {
        self.0.borrow().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> Vec<f32> {
        self.0.borrow().data.clone()
    }

    pub fn grad(&self) -> Vec<f32> {
        self.0.borrow().grad.clone()
    }

    /// Reads a 1x1 tensor
    pub fn item(&self) -> Result<f32, TensorError> {
        let inner = self.0.borrow();
        if inner.shape != (1, 1) {
            return Err(TensorError::NotAScalar { shape: inner.shape });
        }
        Ok(inner.data[0])
    }

    // Strictly, &mut isn't needed since the tensor is behind a shared mutable type,
    // but it indicates that the tensor should be excusively mutable
    pub fn set_data(&mut self, data: Vec<f32>) -> Result<(), TensorError> {
        let mut inner = self.0.borrow_mut();
        if data.len() != inner.data.len() {
            return Err(TensorError::DataLength {
                len: data.len(),
                shape: inner.shape,
            });
        }
        inner.data = data;
        Ok(())
    }

    /// Unlike PyTorch which only zeros out the gradients of the leaf nodes, this zeros out
    /// all gradients in the computation graph which are children of this node
    pub fn zero_grad(&mut self) {
        let mut order = vec![];
        let mut visited: HashSet<u64> = HashSet::new();
        self.backward_inner(&mut order, &mut visited);
        for tensor in order {
            tensor.0.borrow_mut().grad.fill(0.0);
        }
    }

    pub fn backward(&self) {
        // d out / d out = 1 for every element
        self.0.borrow_mut().grad.fill(1.0);

        let mut backprop_order = vec![];
        let mut visited: HashSet<u64> = HashSet::new();

        // visit in post order
        self.backward_inner(&mut backprop_order, &mut visited);

        // apply backprop, reversed to start from root first
        for tensor in backprop_order.into_iter().rev() {
            let n_operands = tensor.0.borrow().children.len();
            if let Some(f) = tensor.0.borrow().backprop_fn {
                debug_assert!(f.n_operands() == n_operands);
            }
            match n_operands {
                0 => {}
                1 => {
                    let in1 = Tensor(tensor.0.borrow().children[0].clone());
                    update_gradients_one_operand(&in1, &tensor);
                }
                2 => {
                    let in1 = Tensor(tensor.0.borrow().children[0].clone());
                    let in2 = Tensor(tensor.0.borrow().children[1].clone());
                    update_gradients_two_operands(&in1, &in2, &tensor);
                }
                _ => {
                    panic!("Unsupported number of operands: {}", n_operands);
                }
            }
        }
    }

    fn backward_inner(&self, backprop_order: &mut Vec<Tensor>, visited: &mut HashSet<u64>) {
        for c in self.0.borrow().children.iter() {
            if visited.contains(&c.borrow().id) {
                continue;
            }
            visited.insert(c.borrow().id);
            let tensor = Tensor(c.clone());
            tensor.backward_inner(backprop_order, visited);
        }
        backprop_order.push(self.clone());
    }
}

// Various operations on tensors
impl Tensor {
    /// Matrix product `(m, k) x (k, n) -> (m, n)`
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor, TensorError> {
        let (m, k) = self.shape();
        let (k2, n) = other.shape();
        if k != k2 {
            return Err(TensorError::ShapeMismatch {
                op: "matmul",
                left: (m, k),
                right: (k2, n),
            });
        }
        let data = matmul_raw(&self.0.borrow().data, &other.0.borrow().data, m, k, n);
        let result = Tensor::new_derived(data, (m, n), BackpropFunc::MatMul);
        result.add_child(self);
        result.add_child(other);

        Ok(result)
    }

    /// Adds a `(1, n)` row to every row of an `(m, n)` tensor
    pub fn add_bias(&self, bias: &Tensor) -> Result<Tensor, TensorError> {
        let (m, n) = self.shape();
        if bias.shape() != (1, n) {
            return Err(TensorError::ShapeMismatch {
                op: "add_bias",
                left: (m, n),
                right: bias.shape(),
            });
        }
        let data = {
            let bias_data = &bias.0.borrow().data;
            let mut data = self.0.borrow().data.clone();
            for row in data.chunks_exact_mut(n) {
                for (v, b) in row.iter_mut().zip(bias_data.iter()) {
                    *v += b;
                }
            }
            data
        };
        let result = Tensor::new_derived(data, (m, n), BackpropFunc::AddBias);
        result.add_child(self);
        result.add_child(bias);

        Ok(result)
    }

    pub fn relu(&self) -> Tensor {
        let data = self.0.borrow().data.iter().map(|v| v.max(0.0)).collect();
        let result = Tensor::new_derived(data, self.shape(), BackpropFunc::ReLU);
        result.add_child(self);

        result
    }

    /// Element-wise power with a constant exponent
    pub fn powf(&self, exponent: f32) -> Tensor {
        let data = self
            .0
            .borrow()
            .data
            .iter()
            .map(|v| v.powf(exponent))
            .collect();
        let result = Tensor::new_derived(data, self.shape(), BackpropFunc::Powf(exponent));
        result.add_child(self);

        result
    }

    /// Mean over all elements, producing a 1x1 tensor
    pub fn mean(&self) -> Tensor {
        let data = {
            let inner = self.0.borrow();
            inner.data.iter().sum::<f32>() / inner.data.len() as f32
        };
        let result = Tensor::new_derived(vec![data], (1, 1), BackpropFunc::Mean);
        result.add_child(self);

        result
    }

    fn elementwise(
        &self,
        other: &Tensor,
        op: &'static str,
        backprop_fn: BackpropFunc,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Tensor, TensorError> {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                op,
                left: self.shape(),
                right: other.shape(),
            });
        }
        let data = self
            .0
            .borrow()
            .data
            .iter()
            .zip(other.0.borrow().data.iter())
            .map(|(a, b)| f(*a, *b))
            .collect();
        let result = Tensor::new_derived(data, self.shape(), backprop_fn);
        result.add_child(self);
        result.add_child(other);

        Ok(result)
    }
}

impl Add for &Tensor {
    type Output = Result<Tensor, TensorError>;

    fn add(self, other: &Tensor) -> Self::Output {
        self.elementwise(other, "add", BackpropFunc::Add, |a, b| a + b)
    }
}

impl Sub for &Tensor {
    type Output = Result<Tensor, TensorError>;

    fn sub(self, other: &Tensor) -> Self::Output {
        self.elementwise(other, "sub", BackpropFunc::Sub, |a, b| a - b)
    }
}

impl AsRef<Tensor> for Tensor {
    fn as_ref(&self) -> &Tensor {
        self
    }
}

/// Row-major `(m, k) x (k, n)` product, i-k-j order so the inner loop is contiguous
pub(crate) fn matmul_raw(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut out = vec![0.0; m * n];
    if n == 0 || k == 0 {
        return out;
    }
    for (a_row, out_row) in a.chunks_exact(k).zip(out.chunks_exact_mut(n)).take(m) {
        for (a_ik, b_row) in a_row.iter().zip(b.chunks_exact(n)) {
            for (o, b_kj) in out_row.iter_mut().zip(b_row.iter()) {
                *o += a_ik * b_kj;
            }
        }
    }
    out
}

#[derive(Debug)]
pub(crate) struct InnerTensor {
    /// row-major, `shape.0 * shape.1` elements
    pub(crate) data: Vec<f32>,
    /// gradient of the output with respect to each element
    pub(crate) grad: Vec<f32>,
    pub(crate) shape: Shape,
    /// List of the node inputs in the forward pass
    /// These nodes are "children" in the backwards pass
    children: Vec<SharedTensor>,
    /// Unique identifier for the node
    id: u64,
    /// The function which created this tensor from its children
    /// `None` when the tensor is a leaf node
    pub(crate) backprop_fn: Option<BackpropFunc>,
}

impl InnerTensor {
    fn new(data: Vec<f32>, shape: Shape, backprop_fn: Option<BackpropFunc>) -> Self {
        let grad = vec![0.0; data.len()];
        Self {
            data,
            grad,
            shape,
            children: vec![],
            id: next_id(),
            backprop_fn,
        }
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[macro_export]
    macro_rules! assert_eq_float {
        ($a:expr, $b:expr) => {
            assert!((($a) - ($b)).abs() < 1e-5, "{} != {}", $a, $b);
        };
    }

    fn tensor(data: &[f32], shape: Shape) -> Tensor {
        Tensor::new(data.to_vec(), shape).unwrap()
    }

    #[test]
    fn test_new_checks_length() {
        let err = Tensor::new(vec![1.0, 2.0, 3.0], (2, 2)).unwrap_err();
        assert_eq!(
            err,
            TensorError::DataLength {
                len: 3,
                shape: (2, 2)
            }
        );
    }

    #[test]
    fn test_add() {
        let a = tensor(&[1.0, 2.0], (1, 2));
        let b = tensor(&[3.0, 4.0], (1, 2));

        let c = (&a + &b).unwrap();
        assert_eq!(c.data(), vec![4.0, 6.0]);
        c.backward();

        assert_eq!(a.grad(), vec![1.0, 1.0]);
        assert_eq!(b.grad(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_sub() {
        let a = tensor(&[1.0, 2.0], (2, 1));
        let b = tensor(&[3.0, 5.0], (2, 1));

        let c = (&a - &b).unwrap();
        assert_eq!(c.data(), vec![-2.0, -3.0]);
        c.backward();

        assert_eq!(a.grad(), vec![1.0, 1.0]);
        assert_eq!(b.grad(), vec![-1.0, -1.0]);
    }

    #[test]
    fn test_elementwise_shape_mismatch() {
        let a = tensor(&[1.0, 2.0], (1, 2));
        let b = tensor(&[1.0, 2.0], (2, 1));
        assert!(matches!(
            &a - &b,
            Err(TensorError::ShapeMismatch { op: "sub", .. })
        ));
    }

    #[test]
    fn test_matmul() {
        // [[1, 2], [3, 4]] x [[5], [6]]
        let a = tensor(&[1.0, 2.0, 3.0, 4.0], (2, 2));
        let b = tensor(&[5.0, 6.0], (2, 1));
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape(), (2, 1));
        assert_eq!(c.data(), vec![17.0, 39.0]);

        c.backward();

        // dC/dA = 1 x B^T, dC/dB = A^T x 1
        assert_eq!(a.grad(), vec![5.0, 6.0, 5.0, 6.0]);
        assert_eq!(b.grad(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_matmul_dim_mismatch() {
        let a = tensor(&[1.0, 2.0, 3.0], (1, 3));
        let b = tensor(&[1.0, 2.0], (2, 1));
        assert_eq!(
            a.matmul(&b).unwrap_err(),
            TensorError::ShapeMismatch {
                op: "matmul",
                left: (1, 3),
                right: (2, 1)
            }
        );
    }

    #[test]
    fn test_add_bias() {
        let x = tensor(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], (3, 2));
        let b = tensor(&[10.0, 20.0], (1, 2));
        let y = x.add_bias(&b).unwrap();
        assert_eq!(y.data(), vec![11.0, 22.0, 13.0, 24.0, 15.0, 26.0]);

        y.backward();
        assert_eq!(x.grad(), vec![1.0; 6]);
        // summed over the three rows
        assert_eq!(b.grad(), vec![3.0, 3.0]);

        let wrong = tensor(&[1.0, 2.0, 3.0], (1, 3));
        assert!(x.add_bias(&wrong).is_err());
    }

    #[test]
    fn test_relu() {
        let a = tensor(&[-1.0, 0.0, 2.0], (3, 1));
        let z = a.relu();
        assert_eq!(z.data(), vec![0.0, 0.0, 2.0]);

        z.backward();
        assert_eq!(a.grad(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_powf_mean() {
        let a = tensor(&[1.0, 2.0, 3.0, 4.0], (4, 1));
        let z = a.powf(2.0).mean();
        assert_eq!(z.shape(), (1, 1));
        assert_eq_float!(z.item().unwrap(), 7.5);

        z.backward();
        // d/da mean(a^2) = 2a / n
        let grad = a.grad();
        for (g, expected) in grad.iter().zip([0.5, 1.0, 1.5, 2.0]) {
            assert_eq_float!(*g, expected);
        }
    }

    #[test]
    fn test_item_requires_scalar() {
        let a = tensor(&[1.0, 2.0], (2, 1));
        assert_eq!(
            a.item().unwrap_err(),
            TensorError::NotAScalar { shape: (2, 1) }
        );
        assert_eq!(Tensor::scalar(3.0).item().unwrap(), 3.0);
    }

    #[test]
    fn test_shared_operand_accumulates() {
        // z = x * x via matmul of a 1x1 with itself: dz/dx = 2x
        let x = Tensor::scalar(3.0);
        let z = x.matmul(&x).unwrap();
        z.backward();
        assert_eq!(x.grad(), vec![6.0]);
    }

    #[test]
    fn test_zero_grad() {
        let a = tensor(&[1.0, -2.0], (2, 1));
        let mut z = a.relu().mean();
        z.backward();
        assert_eq!(a.grad(), vec![0.5, 0.0]);

        z.zero_grad();
        assert_eq!(a.grad(), vec![0.0, 0.0]);
        assert_eq!(z.grad(), vec![0.0]);
    }

    #[test]
    fn test_set_data_checks_length() {
        let mut a = Tensor::zeros((2, 2));
        assert!(a.set_data(vec![1.0; 3]).is_err());
        a.set_data(vec![1.0; 4]).unwrap();
        assert_eq!(a.data(), vec![1.0; 4]);
    }
}
