//! Building blocks of the network. Every layer stores its own weights and
//! knows how to propagate a gradient back through itself. The same structs
//! are used to accumulate the gradients (a "zeroed" copy of the layer).
use crate::shared::distributions::uniform;
use crate::shared::utils::{elu, elu_derivative_from_output};
use anyhow::{anyhow, Result};
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;

/// Anything that owns named, trainable tensors.
pub trait Parametrized {
    /// Every trainable tensor, in a fixed order, with a stable name
    fn params(&self) -> Vec<(String, ArrayViewD<'_, f64>)>;
    fn params_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f64>)>;

    /// A copy of self with all the parameters set to zero, used to
    /// accumulate gradients
    fn zeroed(&self) -> Self
    where
        Self: Sized + Clone,
    {
        let mut z = self.clone();
        for (_, mut p) in z.params_mut() {
            p.fill(0.);
        }
        z
    }

    fn nb_params(&self) -> usize {
        self.params().iter().map(|(_, p)| p.len()).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    Linear,
    Elu,
}

impl Activation {
    fn apply(&self, x: &mut Array2<f64>) {
        match self {
            Activation::Linear => {}
            Activation::Elu => x.mapv_inplace(elu),
        }
    }

    /// Gradient with respect to the pre-activation, given the layer output
    fn backprop(&self, output: ArrayView2<f64>, grad_output: Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Linear => grad_output,
            Activation::Elu => grad_output * &output.mapv(elu_derivative_from_output),
        }
    }
}

/// Fully connected layer: y = activation(x W + b)
#[derive(Clone, Debug)]
pub struct Dense {
    pub name: String,
    pub kernel: Array2<f64>,
    pub bias: Array1<f64>,
    pub activation: Activation,
}

impl Dense {
    /// Glorot-uniform kernel, zero bias
    pub fn new<R: Rng>(
        name: &str,
        n_in: usize,
        n_out: usize,
        activation: Activation,
        rng: &mut R,
    ) -> Dense {
        let limit = (6. / (n_in + n_out) as f64).sqrt();
        Dense {
            name: name.to_string(),
            kernel: uniform(n_in, n_out, -limit, limit, rng),
            bias: Array1::zeros(n_out),
            activation,
        }
    }

    pub fn n_out(&self) -> usize {
        self.bias.len()
    }

    pub fn forward(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut y = x.dot(&self.kernel) + &self.bias;
        self.activation.apply(&mut y);
        y
    }

    /// Accumulate the gradients of the kernel and bias in `grad`,
    /// return the gradient with respect to the input `x`.
    pub fn backward(
        &self,
        x: ArrayView2<f64>,
        output: ArrayView2<f64>,
        grad_output: Array2<f64>,
        grad: &mut Dense,
    ) -> Array2<f64> {
        let delta = self.activation.backprop(output, grad_output);
        grad.kernel += &x.t().dot(&delta);
        grad.bias += &delta.sum_axis(Axis(0));
        delta.dot(&self.kernel.t())
    }
}

impl Parametrized for Dense {
    fn params(&self) -> Vec<(String, ArrayViewD<'_, f64>)> {
        vec![
            (format!("{}/kernel", self.name), self.kernel.view().into_dyn()),
            (format!("{}/bias", self.name), self.bias.view().into_dyn()),
        ]
    }
    fn params_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f64>)> {
        vec![
            (format!("{}/kernel", self.name), self.kernel.view_mut().into_dyn()),
            (format!("{}/bias", self.name), self.bias.view_mut().into_dyn()),
        ]
    }
}

/// Learned matrix M such that, for an input X of shape
/// (batch, length, vocabulary), the output is XM of shape
/// (batch, length, embedding_dim). No bias, no activation: each position is
/// embedded independently with the same matrix.
#[derive(Clone, Debug)]
pub struct Embedding {
    pub name: String,
    pub kernel: Array2<f64>,
}

impl Embedding {
    pub fn new<R: Rng>(name: &str, vocabulary_size: usize, embedding_dim: usize, rng: &mut R) -> Embedding {
        Embedding {
            name: name.to_string(),
            kernel: uniform(vocabulary_size, embedding_dim, -0.05, 0.05, rng),
        }
    }

    pub fn embedding_dim(&self) -> usize {
        self.kernel.ncols()
    }

    pub fn forward(&self, x: ArrayView3<f64>) -> Result<Array3<f64>> {
        let (batch, length, vocabulary) = x.dim();
        if vocabulary != self.kernel.nrows() {
            return Err(anyhow!(
                "Embedding {} expects a vocabulary of size {}, got {}",
                self.name,
                self.kernel.nrows(),
                vocabulary
            ));
        }
        let flat = x.to_shape((batch * length, vocabulary))?;
        Ok(flat
            .dot(&self.kernel)
            .into_shape_with_order((batch, length, self.embedding_dim()))?)
    }

    /// Accumulate the kernel gradient. The input is never trained so its
    /// gradient is not computed.
    pub fn backward(
        &self,
        x: ArrayView3<f64>,
        grad_output: ArrayView3<f64>,
        grad: &mut Embedding,
    ) -> Result<()> {
        let (batch, length, vocabulary) = x.dim();
        let flat_x = x.to_shape((batch * length, vocabulary))?;
        let flat_grad = grad_output.to_shape((batch * length, self.embedding_dim()))?;
        grad.kernel += &flat_x.t().dot(&flat_grad);
        Ok(())
    }
}

impl Parametrized for Embedding {
    fn params(&self) -> Vec<(String, ArrayViewD<'_, f64>)> {
        vec![(format!("{}/kernel", self.name), self.kernel.view().into_dyn())]
    }
    fn params_mut(&mut self) -> Vec<(String, ArrayViewMutD<'_, f64>)> {
        vec![(format!("{}/kernel", self.name), self.kernel.view_mut().into_dyn())]
    }
}
