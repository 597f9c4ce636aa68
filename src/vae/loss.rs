//! Training objective: reconstruction (categorical cross-entropy) + KL divergence
//!
//! Each of the three outputs contributes
//! `(elements per record) * mean(cross-entropy) + batch_size / 3 * mean(KL)`,
//! everything is summed into a single scalar. The KL part therefore adds up
//! to `batch_size * mean(KL)`.
use crate::shared::onehot::TcrTensors;
use crate::shared::utils::{log_softmax_last_axis, log_softmax_rows};
use crate::vae::decoder::Logits;
use ndarray::{Array, Array2, Array3, Axis, Dimension, Zip};
use std::ops::AddAssign;

/// Names of the reported losses, in the order of `VaeLoss::values`
pub const LOSS_NAMES: [&str; 4] = [
    "loss",
    "CDR_prob_out_loss",
    "Vgene_prob_out_loss",
    "Jgene_prob_out_loss",
];

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VaeLoss {
    // scaled reconstruction terms
    pub cdr3: f64,
    pub v_gene: f64,
    pub j_gene: f64,
    // scaled KL term, shared between the three outputs
    pub kl: f64,
}

impl VaeLoss {
    pub fn total(&self) -> f64 {
        self.cdr3 + self.v_gene + self.j_gene + self.kl
    }

    /// Loss attributed to each output (reconstruction + a third of the KL)
    pub fn per_output(&self) -> [f64; 3] {
        [
            self.cdr3 + self.kl / 3.,
            self.v_gene + self.kl / 3.,
            self.j_gene + self.kl / 3.,
        ]
    }

    /// Total followed by the per-output losses, see `LOSS_NAMES`
    pub fn values(&self) -> Vec<f64> {
        let [c, v, j] = self.per_output();
        vec![self.total(), c, v, j]
    }

    pub fn scale(&self, factor: f64) -> VaeLoss {
        VaeLoss {
            cdr3: self.cdr3 * factor,
            v_gene: self.v_gene * factor,
            j_gene: self.j_gene * factor,
            kl: self.kl * factor,
        }
    }
}

impl AddAssign for VaeLoss {
    fn add_assign(&mut self, other: VaeLoss) {
        self.cdr3 += other.cdr3;
        self.v_gene += other.v_gene;
        self.j_gene += other.j_gene;
        self.kl += other.kl;
    }
}

/// Gradients of the loss with respect to the decoder logits and the
/// posterior parameters
pub struct LossGradients {
    pub logits: Logits,
    pub z_mean: Array2<f64>,
    pub z_log_var: Array2<f64>,
}

/// Sum of the cross-entropies -sum(y log p) over every distribution
fn cross_entropy_sum<D: Dimension>(targets: &Array<f64, D>, log_probs: &Array<f64, D>) -> f64 {
    Zip::from(targets)
        .and(log_probs)
        .fold(0., |acc, &y, &lp| if y != 0. { acc - y * lp } else { acc })
}

/// KL(N(mean, exp(log_var)) || N(0, I)) of every row
pub fn kl_divergence(z_mean: &Array2<f64>, z_log_var: &Array2<f64>) -> Vec<f64> {
    z_mean
        .outer_iter()
        .zip(z_log_var.outer_iter())
        .map(|(m, lv)| {
            -0.5 * Zip::from(&m)
                .and(&lv)
                .fold(0., |acc, &m, &lv| acc + 1. + lv - m * m - lv.exp())
        })
        .collect()
}

/// Value of the composite loss on one batch. `kl_weight` is the configured
/// batch size.
pub fn composite_loss(
    targets: &TcrTensors,
    logits: &Logits,
    z_mean: &Array2<f64>,
    z_log_var: &Array2<f64>,
    kl_weight: f64,
) -> VaeLoss {
    let n = targets.len();
    if n == 0 {
        return VaeLoss::default();
    }
    let (_, max_len, n_aas) = targets.cdr3.dim();
    let n_f = n as f64;

    let log_p_cdr3 = log_softmax_last_axis(&logits.cdr3);
    let log_p_v = log_softmax_rows(&logits.v_gene);
    let log_p_j = log_softmax_rows(&logits.j_gene);

    // mean over batch and positions, scaled by the number of elements
    let xent_cdr3 = cross_entropy_sum(&targets.cdr3, &log_p_cdr3);
    let xent_v = cross_entropy_sum(&targets.v_gene, &log_p_v);
    let xent_j = cross_entropy_sum(&targets.j_gene, &log_p_j);
    let kl: f64 = kl_divergence(z_mean, z_log_var).iter().sum();

    VaeLoss {
        cdr3: (max_len * n_aas) as f64 * xent_cdr3 / (n_f * max_len as f64),
        v_gene: targets.v_gene.ncols() as f64 * xent_v / n_f,
        j_gene: targets.j_gene.ncols() as f64 * xent_j / n_f,
        kl: kl_weight * kl / n_f,
    }
}

/// d(scale * sum of cross-entropies)/d(logits) = scale * (p * sum(y) - y)
fn softmax_cross_entropy_gradient_rows(
    targets: &Array2<f64>,
    log_probs: &Array2<f64>,
    scale: f64,
) -> Array2<f64> {
    let mut grad = log_probs.mapv(f64::exp);
    for (mut g, y) in grad.outer_iter_mut().zip(targets.outer_iter()) {
        let total = y.sum();
        Zip::from(&mut g)
            .and(&y)
            .for_each(|g, &y| *g = scale * (*g * total - y));
    }
    grad
}

fn softmax_cross_entropy_gradient_3d(
    targets: &Array3<f64>,
    log_probs: &Array3<f64>,
    scale: f64,
) -> Array3<f64> {
    let mut grad = log_probs.mapv(f64::exp);
    for (mut g_seq, y_seq) in grad
        .axis_iter_mut(Axis(0))
        .zip(targets.axis_iter(Axis(0)))
    {
        for (mut g, y) in g_seq.outer_iter_mut().zip(y_seq.outer_iter()) {
            let total = y.sum();
            Zip::from(&mut g)
                .and(&y)
                .for_each(|g, &y| *g = scale * (*g * total - y));
        }
    }
    grad
}

/// Gradient of `composite_loss`
pub fn composite_loss_gradients(
    targets: &TcrTensors,
    logits: &Logits,
    z_mean: &Array2<f64>,
    z_log_var: &Array2<f64>,
    kl_weight: f64,
) -> LossGradients {
    let n_f = (targets.len() as f64).max(1.);
    let n_aas = targets.cdr3.dim().2;

    let logits_grad = Logits {
        // (max_len * n_aas) / (n * max_len)
        cdr3: softmax_cross_entropy_gradient_3d(
            &targets.cdr3,
            &log_softmax_last_axis(&logits.cdr3),
            n_aas as f64 / n_f,
        ),
        v_gene: softmax_cross_entropy_gradient_rows(
            &targets.v_gene,
            &log_softmax_rows(&logits.v_gene),
            targets.v_gene.ncols() as f64 / n_f,
        ),
        j_gene: softmax_cross_entropy_gradient_rows(
            &targets.j_gene,
            &log_softmax_rows(&logits.j_gene),
            targets.j_gene.ncols() as f64 / n_f,
        ),
    };

    let kl_scale = kl_weight / n_f;
    let grad_z_mean = z_mean * kl_scale;
    let grad_z_log_var = z_log_var.mapv(|lv| kl_scale * 0.5 * (lv.exp() - 1.));

    LossGradients {
        logits: logits_grad,
        z_mean: grad_z_mean,
        z_log_var: grad_z_log_var,
    }
}
