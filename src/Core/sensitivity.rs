use nalgebra::{DMatrix, DVector};
use std::ops::{Add, Div, Mul, Sub};

/// A scalar value paired with its partial derivatives with respect to a vector
/// of independent variables (species molar amounts, titrant amounts, ...).
/// All arithmetic propagates the gradient by the corresponding calculus rule,
/// so a derivative term can never be silently dropped at a call site.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarSens {
    pub val: f64,
    pub grad: DVector<f64>,
}

impl ScalarSens {
    pub fn new(val: f64, grad: DVector<f64>) -> Self {
        Self { val, grad }
    }

    /// a constant: zero gradient over `dim` independent variables
    pub fn constant(val: f64, dim: usize) -> Self {
        Self {
            val,
            grad: DVector::zeros(dim),
        }
    }

    /// the `index`-th independent variable itself: unit gradient entry
    pub fn variable(val: f64, dim: usize, index: usize) -> Self {
        assert!(index < dim, "variable index {} out of range {}", index, dim);
        let mut grad = DVector::zeros(dim);
        grad[index] = 1.0;
        Self { val, grad }
    }

    /// number of independent variables
    pub fn dim(&self) -> usize {
        self.grad.len()
    }

    /// power rule: d(u^p) = p*u^(p-1)*du
    pub fn powf(&self, p: f64) -> Self {
        Self {
            val: self.val.powf(p),
            grad: &self.grad * (p * self.val.powf(p - 1.0)),
        }
    }

    /// chain rule through exp
    pub fn exp(&self) -> Self {
        let e = self.val.exp();
        Self {
            val: e,
            grad: &self.grad * e,
        }
    }

    /// chain rule through ln; the caller guards val > 0
    pub fn ln(&self) -> Self {
        Self {
            val: self.val.ln(),
            grad: &self.grad / self.val,
        }
    }

    /// multiply by a plain constant
    pub fn scale(&self, c: f64) -> Self {
        Self {
            val: self.val * c,
            grad: &self.grad * c,
        }
    }

    fn check_dim(&self, other: &Self, op: &str) {
        assert_eq!(
            self.grad.len(),
            other.grad.len(),
            "gradient dimension mismatch in {}: {} vs {}",
            op,
            self.grad.len(),
            other.grad.len()
        );
    }
}

impl Add for &ScalarSens {
    type Output = ScalarSens;
    fn add(self, rhs: Self) -> ScalarSens {
        self.check_dim(rhs, "add");
        ScalarSens {
            val: self.val + rhs.val,
            grad: &self.grad + &rhs.grad,
        }
    }
}

impl Sub for &ScalarSens {
    type Output = ScalarSens;
    fn sub(self, rhs: Self) -> ScalarSens {
        self.check_dim(rhs, "sub");
        ScalarSens {
            val: self.val - rhs.val,
            grad: &self.grad - &rhs.grad,
        }
    }
}

// product rule: d(uv) = v*du + u*dv
impl Mul for &ScalarSens {
    type Output = ScalarSens;
    fn mul(self, rhs: Self) -> ScalarSens {
        self.check_dim(rhs, "mul");
        ScalarSens {
            val: self.val * rhs.val,
            grad: &self.grad * rhs.val + &rhs.grad * self.val,
        }
    }
}

// quotient rule: d(u/v) = du/v - u*dv/v^2
impl Div for &ScalarSens {
    type Output = ScalarSens;
    fn div(self, rhs: Self) -> ScalarSens {
        self.check_dim(rhs, "div");
        ScalarSens {
            val: self.val / rhs.val,
            grad: &self.grad / rhs.val - &rhs.grad * (self.val / (rhs.val * rhs.val)),
        }
    }
}

/// A vector of values paired with the matrix of their partial derivatives:
/// row i of `grad` holds the derivatives of `val[i]` with respect to every
/// independent variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSens {
    pub val: DVector<f64>,
    pub grad: DMatrix<f64>,
}

impl VectorSens {
    pub fn new(val: DVector<f64>, grad: DMatrix<f64>) -> Self {
        assert_eq!(
            val.len(),
            grad.nrows(),
            "value length {} does not match gradient row count {}",
            val.len(),
            grad.nrows()
        );
        Self { val, grad }
    }

    pub fn zeros(len: usize, dim: usize) -> Self {
        Self {
            val: DVector::zeros(len),
            grad: DMatrix::zeros(len, dim),
        }
    }

    /// values that ARE the independent variables: identity gradient
    pub fn identity(val: DVector<f64>) -> Self {
        let n = val.len();
        Self {
            val,
            grad: DMatrix::identity(n, n),
        }
    }

    pub fn len(&self) -> usize {
        self.val.len()
    }

    pub fn is_empty(&self) -> bool {
        self.val.len() == 0
    }

    /// number of independent variables
    pub fn dim(&self) -> usize {
        self.grad.ncols()
    }

    /// the i-th entry together with its gradient row
    pub fn get(&self, i: usize) -> ScalarSens {
        ScalarSens {
            val: self.val[i],
            grad: self.grad.row(i).transpose(),
        }
    }

    /// overwrite the i-th entry and its gradient row
    pub fn set(&mut self, i: usize, s: &ScalarSens) {
        assert_eq!(
            s.grad.len(),
            self.grad.ncols(),
            "gradient dimension mismatch in set: {} vs {}",
            s.grad.len(),
            self.grad.ncols()
        );
        self.val[i] = s.val;
        self.grad.row_mut(i).copy_from(&s.grad.transpose());
    }
}
