//! Dense encoder-decoder trained with Adam on mean squared error
//!
//! Hidden layers use ReLU, the output layer a sigmoid, matching inputs that
//! were min-max normalized into `[0, 1]`. Weights use Glorot-uniform
//! initialisation; every epoch reshuffles the mini-batches. A fixed seed
//! makes training reproducible.

use ndarray::{s, Array1, Array2, ArrayView2, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::{check_trained_bands, AutoencoderParams, ReconstructionModel};
use anomap_core::{Error, Result};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const ADAM_EPSILON: f32 = 1e-7;

/// Rows reconstructed at once when scoring
const SCORE_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Activation {
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(self, z: &mut Array2<f32>) {
        match self {
            Activation::Relu => z.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv_inplace(sigmoid),
        }
    }

    /// Scale an upstream gradient by the derivative, written in terms of
    /// the layer output
    fn backprop(self, grad: &mut Array2<f32>, output: &Array2<f32>) {
        match self {
            Activation::Relu => Zip::from(grad).and(output).for_each(|g, &a| {
                if a <= 0.0 {
                    *g = 0.0;
                }
            }),
            Activation::Sigmoid => {
                Zip::from(grad).and(output).for_each(|g, &a| *g *= a * (1.0 - a))
            }
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Fully connected layer with its Adam moment estimates
#[derive(Debug, Clone)]
struct Dense {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
    m_w: Array2<f32>,
    v_w: Array2<f32>,
    m_b: Array1<f32>,
    v_b: Array1<f32>,
}

impl Dense {
    fn glorot(fan_in: usize, fan_out: usize, activation: Activation, rng: &mut StdRng) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
        let weights = Array2::from_shape_fn((fan_in, fan_out), |_| rng.random_range(-limit..limit));
        Self {
            weights,
            bias: Array1::zeros(fan_out),
            activation,
            m_w: Array2::zeros((fan_in, fan_out)),
            v_w: Array2::zeros((fan_in, fan_out)),
            m_b: Array1::zeros(fan_out),
            v_b: Array1::zeros(fan_out),
        }
    }

    fn forward(&self, input: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut z = input.dot(&self.weights);
        z += &self.bias;
        self.activation.apply(&mut z);
        z
    }

    fn adam_step(&mut self, grad_w: &Array2<f32>, grad_b: &Array1<f32>, lr_t: f32) {
        Zip::from(&mut self.weights)
            .and(&mut self.m_w)
            .and(&mut self.v_w)
            .and(grad_w)
            .for_each(|w, m, v, &g| {
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                *w -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
            });
        Zip::from(&mut self.bias)
            .and(&mut self.m_b)
            .and(&mut self.v_b)
            .and(grad_b)
            .for_each(|b, m, v, &g| {
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                *b -= lr_t * *m / (v.sqrt() + ADAM_EPSILON);
            });
    }
}

/// Symmetric encoder-decoder scoring pixels by reconstruction error
#[derive(Debug, Clone)]
pub struct Autoencoder {
    params: AutoencoderParams,
    layers: Vec<Dense>,
    bands: Option<usize>,
    final_loss: Option<f64>,
}

impl Autoencoder {
    pub fn new(params: AutoencoderParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            layers: Vec::new(),
            bands: None,
            final_loss: None,
        })
    }

    /// Mean training loss of the last epoch
    pub fn final_loss(&self) -> Option<f64> {
        self.final_loss
    }

    fn forward(&self, pixels: ArrayView2<'_, f32>) -> Array2<f32> {
        let mut current = pixels.to_owned();
        for layer in &self.layers {
            current = layer.forward(current.view());
        }
        current
    }

    fn init_layers(&mut self, bands: usize, rng: &mut StdRng) {
        let mut widths = Vec::with_capacity(self.params.hidden.len() + 2);
        widths.push(bands);
        widths.extend_from_slice(&self.params.hidden);
        widths.push(bands);

        let last = widths.len() - 2;
        self.layers = widths
            .windows(2)
            .enumerate()
            .map(|(i, w)| {
                let activation = if i == last {
                    Activation::Sigmoid
                } else {
                    Activation::Relu
                };
                Dense::glorot(w[0], w[1], activation, rng)
            })
            .collect();
    }

    /// One forward/backward pass over a batch; returns the batch MSE
    fn train_batch(&mut self, batch: &Array2<f32>, step: i32) -> f64 {
        let mut activations: Vec<Array2<f32>> = Vec::with_capacity(self.layers.len() + 1);
        activations.push(batch.clone());
        for layer in &self.layers {
            let next = match activations.last() {
                Some(input) => layer.forward(input.view()),
                None => break,
            };
            activations.push(next);
        }

        let diff = &activations[self.layers.len()] - batch;
        let count = diff.len() as f32;
        let loss = diff.iter().map(|&d| f64::from(d) * f64::from(d)).sum::<f64>() / diff.len() as f64;
        let mut grad = diff.mapv(|d| 2.0 * d / count);

        let lr = self.params.learning_rate as f32;
        let lr_t = lr * (1.0 - BETA2.powi(step)).sqrt() / (1.0 - BETA1.powi(step));

        for (i, layer) in self.layers.iter_mut().enumerate().rev() {
            layer.activation.backprop(&mut grad, &activations[i + 1]);
            let grad_w = activations[i].t().dot(&grad);
            let grad_b = grad.sum_axis(Axis(0));
            let grad_in = grad.dot(&layer.weights.t());
            layer.adam_step(&grad_w, &grad_b, lr_t);
            grad = grad_in;
        }

        loss
    }
}

impl ReconstructionModel for Autoencoder {
    fn name(&self) -> &'static str {
        "autoencoder"
    }

    fn band_count(&self) -> Option<usize> {
        self.bands
    }

    fn train(&mut self, pixels: ArrayView2<'_, f32>) -> Result<()> {
        let (n, bands) = pixels.dim();
        if n == 0 || bands == 0 {
            return Err(Error::NoValidPixels("training set"));
        }

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        self.init_layers(bands, &mut rng);
        self.bands = Some(bands);

        tracing::info!(
            "Training autoencoder: {} pixels, {} bands, {} epochs, batch {}",
            n,
            bands,
            self.params.epochs,
            self.params.batch_size
        );

        let mut order: Vec<usize> = (0..n).collect();
        let mut step = 0i32;
        for epoch in 0..self.params.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0f64;
            for chunk in order.chunks(self.params.batch_size) {
                let batch = pixels.select(Axis(0), chunk);
                step = step.saturating_add(1);
                epoch_loss += self.train_batch(&batch, step) * chunk.len() as f64;
            }
            epoch_loss /= n as f64;

            if !epoch_loss.is_finite() {
                self.bands = None;
                return Err(Error::Model(format!(
                    "autoencoder loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            tracing::debug!("epoch {}/{} loss {:.6}", epoch + 1, self.params.epochs, epoch_loss);
            self.final_loss = Some(epoch_loss);
        }

        Ok(())
    }

    fn score(&self, pixels: ArrayView2<'_, f32>) -> Result<Vec<f64>> {
        let bands = check_trained_bands(self.bands, &pixels)?;
        let n = pixels.nrows();
        let mut scores = Vec::with_capacity(n);

        let mut start = 0;
        while start < n {
            let end = (start + SCORE_CHUNK).min(n);
            let input = pixels.slice(s![start..end, ..]);
            let output = self.forward(input);
            for (x, y) in input.outer_iter().zip(output.outer_iter()) {
                let sse: f64 = x
                    .iter()
                    .zip(y.iter())
                    .map(|(&a, &b)| {
                        let d = f64::from(a) - f64::from(b);
                        d * d
                    })
                    .sum();
                scores.push(sse / bands as f64);
            }
            start = end;
        }

        if scores.iter().any(|s| !s.is_finite()) {
            return Err(Error::Model("autoencoder produced non-finite scores".into()));
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn small_params(epochs: usize) -> AutoencoderParams {
        AutoencoderParams {
            hidden: vec![8, 4, 8],
            epochs,
            batch_size: 16,
            learning_rate: 1e-2,
            seed: 7,
        }
    }

    fn smooth_spectra(n: usize, bands: usize) -> Array2<f32> {
        Array2::from_shape_fn((n, bands), |(i, b)| {
            let t = i as f32 / n as f32;
            0.2 + 0.6 * t * (b as f32 + 1.0) / bands as f32
        })
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-7);
    }

    #[test]
    fn test_layer_shapes() {
        let mut ae = Autoencoder::new(AutoencoderParams::default()).unwrap();
        ae.train(smooth_spectra(32, 10).view()).unwrap();
        let widths: Vec<(usize, usize)> = ae.layers.iter().map(|l| l.weights.dim()).collect();
        assert_eq!(
            widths,
            vec![(10, 64), (64, 32), (32, 16), (16, 32), (32, 64), (64, 10)]
        );
        assert_eq!(ae.layers.last().map(|l| l.activation), Some(Activation::Sigmoid));
    }

    #[test]
    fn test_training_reduces_loss() {
        let x = smooth_spectra(128, 6);

        let mut short = Autoencoder::new(small_params(1)).unwrap();
        short.train(x.view()).unwrap();
        let mut long = Autoencoder::new(small_params(200)).unwrap();
        long.train(x.view()).unwrap();

        let early = short.final_loss().unwrap();
        let late = long.final_loss().unwrap();
        assert!(late < early, "loss did not drop: {} -> {}", early, late);
    }

    #[test]
    fn test_same_seed_same_scores() {
        let x = smooth_spectra(64, 5);
        let mut a = Autoencoder::new(small_params(5)).unwrap();
        let mut b = Autoencoder::new(small_params(5)).unwrap();
        a.train(x.view()).unwrap();
        b.train(x.view()).unwrap();
        assert_eq!(a.score(x.view()).unwrap(), b.score(x.view()).unwrap());
    }

    #[test]
    fn test_scores_non_negative_and_shaped() {
        let x = smooth_spectra(40, 5);
        let mut ae = Autoencoder::new(small_params(3)).unwrap();
        ae.train(x.view()).unwrap();

        let scores = ae.score(x.view()).unwrap();
        assert_eq!(scores.len(), 40);
        assert!(scores.iter().all(|&s| s >= 0.0 && s.is_finite()));
    }

    #[test]
    fn test_outlier_scores_higher() {
        let x = smooth_spectra(128, 6);
        let mut ae = Autoencoder::new(small_params(100)).unwrap();
        ae.train(x.view()).unwrap();

        let typical = ae.score(x.slice(s![60..61, ..])).unwrap()[0];
        let outlier = ae.score(Array2::from_elem((1, 6), 5.0f32).view()).unwrap()[0];
        assert!(outlier > typical);
    }

    #[test]
    fn test_invalid_params_rejected() {
        let params = AutoencoderParams {
            batch_size: 0,
            ..Default::default()
        };
        assert!(Autoencoder::new(params).is_err());
    }
}
