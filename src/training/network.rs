//! Small recurrent sequence classifier: [W, 13] feature window → 25-way
//! distribution over tiles.
//!
//! Elman layer with `tanh` over the scaled inputs, dense softmax head on the
//! last hidden state. Trained with back-propagation through time and plain SGD.
//! All matrices are row-major `Vec<f32>`.

use rand::Rng;

use crate::error::ModelError;
use crate::features::{FeatureVector, FEATURE_DIM, TILE_COUNT};

const WEIGHTS_MAGIC: &[u8; 4] = b"AMRN";
const WEIGHTS_VERSION: u32 = 1;
const HEADER_LEN: usize = 24;
/// Largest hidden layer a weights blob may declare.
pub const MAX_HIDDEN: usize = 1024;
/// Longest window a weights blob may declare.
pub const MAX_WINDOW: usize = 4096;
const GRAD_CLIP_NORM: f32 = 5.0;

/// Divisors bringing raw event features to roughly unit scale.
const FEATURE_SCALE: [f32; FEATURE_DIM] = [
    4096.0, 4096.0, 4096.0, 4096.0, 4096.0, 4096.0, 4096.0, 4096.0, // positions
    512.0, 512.0, // movement
    1.0, // pressure
    2.0, // pointer kind
    100_000.0, // timestamp mod 100000
];

#[derive(Debug, Clone, PartialEq)]
pub struct SequenceClassifier {
    window: usize,
    hidden: usize,

    // w_in: [hidden, FEATURE_DIM]
    w_in: Vec<f32>,
    // w_rec: [hidden, hidden]
    w_rec: Vec<f32>,
    b_h: Vec<f32>,

    // w_out: [TILE_COUNT, hidden]
    w_out: Vec<f32>,
    b_out: Vec<f32>,
}

/// Summary of one `fit` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitStats {
    pub epochs: usize,
    pub examples: usize,
    pub first_epoch_loss: f32,
    pub last_epoch_loss: f32,
}

struct Gradients {
    w_in: Vec<f32>,
    w_rec: Vec<f32>,
    b_h: Vec<f32>,
    w_out: Vec<f32>,
    b_out: Vec<f32>,
}

impl Gradients {
    fn zeros_like(model: &SequenceClassifier) -> Self {
        Self {
            w_in: vec![0.0; model.w_in.len()],
            w_rec: vec![0.0; model.w_rec.len()],
            b_h: vec![0.0; model.b_h.len()],
            w_out: vec![0.0; model.w_out.len()],
            b_out: vec![0.0; model.b_out.len()],
        }
    }

    fn blocks(&self) -> [&[f32]; 5] {
        [&self.w_in, &self.w_rec, &self.b_h, &self.w_out, &self.b_out]
    }

    fn norm(&self) -> f32 {
        self.blocks()
            .iter()
            .flat_map(|block| block.iter())
            .map(|g| g * g)
            .sum::<f32>()
            .sqrt()
    }
}

/// Activations kept from a forward pass for back-propagation.
struct Trace {
    inputs: Vec<[f32; FEATURE_DIM]>,
    // hidden[0] is the zero initial state, hidden[t + 1] follows input t.
    hidden: Vec<Vec<f32>>,
    probs: [f32; TILE_COUNT],
}

impl SequenceClassifier {
    /// Fresh weights, Xavier-uniform for the matrices, zero biases.
    pub fn new<R: Rng + ?Sized>(window: usize, hidden: usize, rng: &mut R) -> Self {
        let mut model = Self::zeroed(window, hidden);
        fill_uniform(&mut model.w_in, xavier_limit(FEATURE_DIM, hidden), rng);
        // Recurrent weights start smaller so early gradients do not explode.
        fill_uniform(&mut model.w_rec, 0.5 * xavier_limit(hidden, hidden), rng);
        fill_uniform(&mut model.w_out, xavier_limit(hidden, TILE_COUNT), rng);
        model
    }

    fn zeroed(window: usize, hidden: usize) -> Self {
        Self {
            window,
            hidden,
            w_in: vec![0.0; hidden * FEATURE_DIM],
            w_rec: vec![0.0; hidden * hidden],
            b_h: vec![0.0; hidden],
            w_out: vec![0.0; TILE_COUNT * hidden],
            b_out: vec![0.0; TILE_COUNT],
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// Tile distribution for one window of exactly `window()` vectors.
    pub fn predict_proba(&self, window: &[FeatureVector]) -> Result<[f32; TILE_COUNT], ModelError> {
        self.forward(window).map(|trace| trace.probs)
    }

    /// Cross-entropy of the model on a single example.
    pub fn loss(&self, window: &[FeatureVector], label: u8) -> Result<f32, ModelError> {
        let trace = self.forward(window)?;
        Ok(cross_entropy(&trace.probs, label))
    }

    /// Runs `epochs` passes of per-example SGD over `examples`.
    ///
    /// Mutates `self` in place; callers that need all-or-nothing semantics
    /// train a clone and keep the original on error.
    pub fn fit(
        &mut self,
        examples: &[(&[FeatureVector], u8)],
        epochs: usize,
        learning_rate: f32,
    ) -> Result<FitStats, ModelError> {
        let mut first_epoch_loss = f32::NAN;
        let mut last_epoch_loss = f32::NAN;

        if examples.is_empty() {
            return Ok(FitStats {
                epochs: 0,
                examples: 0,
                first_epoch_loss,
                last_epoch_loss,
            });
        }

        for (inputs, label) in examples {
            self.check_example(inputs, *label)?;
        }

        for epoch in 0..epochs {
            let mut total = 0.0f32;
            for (inputs, label) in examples {
                let trace = self.forward(inputs)?;
                total += cross_entropy(&trace.probs, *label);

                let mut grads = self.backward(&trace, *label);
                let norm = grads.norm();
                if !norm.is_finite() {
                    return Err(ModelError::Diverged { epoch });
                }
                if norm > GRAD_CLIP_NORM {
                    let scale = GRAD_CLIP_NORM / norm;
                    for block in [
                        &mut grads.w_in,
                        &mut grads.w_rec,
                        &mut grads.b_h,
                        &mut grads.w_out,
                        &mut grads.b_out,
                    ] {
                        block.iter_mut().for_each(|g| *g *= scale);
                    }
                }
                self.apply(&grads, learning_rate);
            }

            let mean = total / examples.len() as f32;
            if !mean.is_finite() || !self.is_finite() {
                return Err(ModelError::Diverged { epoch });
            }
            if epoch == 0 {
                first_epoch_loss = mean;
            }
            last_epoch_loss = mean;
        }

        Ok(FitStats {
            epochs,
            examples: examples.len(),
            first_epoch_loss,
            last_epoch_loss,
        })
    }

    pub fn is_finite(&self) -> bool {
        [&self.w_in, &self.w_rec, &self.b_h, &self.w_out, &self.b_out]
            .iter()
            .all(|block| block.iter().all(|w| w.is_finite()))
    }

    fn check_example(&self, inputs: &[FeatureVector], label: u8) -> Result<(), ModelError> {
        if inputs.len() != self.window {
            return Err(ModelError::ShapeMismatch {
                expected: format!("[{}, {FEATURE_DIM}]", self.window),
                actual: format!("[{}, {FEATURE_DIM}]", inputs.len()),
            });
        }
        if usize::from(label) >= TILE_COUNT {
            return Err(ModelError::ShapeMismatch {
                expected: format!("label < {TILE_COUNT}"),
                actual: format!("label {label}"),
            });
        }
        Ok(())
    }

    fn forward(&self, window: &[FeatureVector]) -> Result<Trace, ModelError> {
        if window.len() != self.window {
            return Err(ModelError::ShapeMismatch {
                expected: format!("[{}, {FEATURE_DIM}]", self.window),
                actual: format!("[{}, {FEATURE_DIM}]", window.len()),
            });
        }

        let h = self.hidden;
        let mut inputs = Vec::with_capacity(self.window);
        let mut hidden = Vec::with_capacity(self.window + 1);
        hidden.push(vec![0.0f32; h]);

        for vector in window {
            let mut x = [0f32; FEATURE_DIM];
            for (j, value) in vector.values().iter().enumerate() {
                x[j] = value / FEATURE_SCALE[j];
            }

            let prev = &hidden[hidden.len() - 1];
            let mut next = vec![0f32; h];
            for i in 0..h {
                let mut sum = self.b_h[i];
                let in_row = i * FEATURE_DIM;
                for j in 0..FEATURE_DIM {
                    sum += self.w_in[in_row + j] * x[j];
                }
                let rec_row = i * h;
                for k in 0..h {
                    sum += self.w_rec[rec_row + k] * prev[k];
                }
                next[i] = sum.tanh();
            }

            inputs.push(x);
            hidden.push(next);
        }

        let last = &hidden[hidden.len() - 1];
        let mut logits = [0f32; TILE_COUNT];
        for (a, logit) in logits.iter_mut().enumerate() {
            let mut s = self.b_out[a];
            let row = a * h;
            for i in 0..h {
                s += self.w_out[row + i] * last[i];
            }
            *logit = s;
        }

        Ok(Trace {
            inputs,
            hidden,
            probs: softmax(&logits),
        })
    }

    fn backward(&self, trace: &Trace, label: u8) -> Gradients {
        let h = self.hidden;
        let mut grads = Gradients::zeros_like(self);

        // d(loss)/d(logits) = p - onehot(label)
        let mut d_logits = trace.probs;
        d_logits[usize::from(label)] -= 1.0;

        let last = &trace.hidden[trace.hidden.len() - 1];
        let mut d_h = vec![0f32; h];
        for a in 0..TILE_COUNT {
            let row = a * h;
            grads.b_out[a] = d_logits[a];
            for i in 0..h {
                grads.w_out[row + i] = d_logits[a] * last[i];
                d_h[i] += self.w_out[row + i] * d_logits[a];
            }
        }

        for t in (0..trace.inputs.len()).rev() {
            let h_t = &trace.hidden[t + 1];
            let h_prev = &trace.hidden[t];
            let x = &trace.inputs[t];

            let d_a: Vec<f32> = (0..h).map(|i| d_h[i] * (1.0 - h_t[i] * h_t[i])).collect();

            let mut d_prev = vec![0f32; h];
            for i in 0..h {
                grads.b_h[i] += d_a[i];
                let in_row = i * FEATURE_DIM;
                for j in 0..FEATURE_DIM {
                    grads.w_in[in_row + j] += d_a[i] * x[j];
                }
                let rec_row = i * h;
                for k in 0..h {
                    grads.w_rec[rec_row + k] += d_a[i] * h_prev[k];
                    d_prev[k] += self.w_rec[rec_row + k] * d_a[i];
                }
            }
            d_h = d_prev;
        }

        grads
    }

    fn apply(&mut self, grads: &Gradients, learning_rate: f32) {
        let pairs = [
            (&mut self.w_in, &grads.w_in),
            (&mut self.w_rec, &grads.w_rec),
            (&mut self.b_h, &grads.b_h),
            (&mut self.w_out, &grads.w_out),
            (&mut self.b_out, &grads.b_out),
        ];
        for (weights, grad) in pairs {
            for (w, g) in weights.iter_mut().zip(grad.iter()) {
                *w -= learning_rate * g;
            }
        }
    }

    // ----------------------------
    // Serialization
    // ----------------------------

    /// Binary weights v1:
    /// magic "AMRN"(4), u32 version, u32 feature_dim, u32 window, u32 hidden,
    /// u32 classes, then f32 blocks w_in, w_rec, b_h, w_out, b_out (all LE).
    pub fn to_bytes(&self) -> Vec<u8> {
        let total = self.w_in.len() + self.w_rec.len() + self.b_h.len() + self.w_out.len()
            + self.b_out.len();
        let mut out = Vec::with_capacity(HEADER_LEN + total * 4);
        out.extend_from_slice(WEIGHTS_MAGIC);
        out.extend_from_slice(&WEIGHTS_VERSION.to_le_bytes());
        out.extend_from_slice(&(FEATURE_DIM as u32).to_le_bytes());
        out.extend_from_slice(&(self.window as u32).to_le_bytes());
        out.extend_from_slice(&(self.hidden as u32).to_le_bytes());
        out.extend_from_slice(&(TILE_COUNT as u32).to_le_bytes());

        write_f32s(&mut out, &self.w_in);
        write_f32s(&mut out, &self.w_rec);
        write_f32s(&mut out, &self.b_h);
        write_f32s(&mut out, &self.w_out);
        write_f32s(&mut out, &self.b_out);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, ModelError> {
        if buf.len() < HEADER_LEN {
            return Err(corrupt("weights blob too small"));
        }
        if &buf[0..4] != WEIGHTS_MAGIC {
            return Err(corrupt("bad magic (expected AMRN)"));
        }
        let version = u32_le(&buf[4..8]);
        if version != WEIGHTS_VERSION {
            return Err(corrupt(format!("unsupported version {version}")));
        }
        let feature_dim = u32_le(&buf[8..12]) as usize;
        let window = u32_le(&buf[12..16]) as usize;
        let hidden = u32_le(&buf[16..20]) as usize;
        let classes = u32_le(&buf[20..24]) as usize;

        if feature_dim != FEATURE_DIM {
            return Err(corrupt(format!("feature_dim {feature_dim} != {FEATURE_DIM}")));
        }
        if classes != TILE_COUNT {
            return Err(corrupt(format!("classes {classes} != {TILE_COUNT}")));
        }
        if hidden == 0 || hidden > MAX_HIDDEN {
            return Err(corrupt(format!("invalid hidden size {hidden}")));
        }
        if window == 0 || window > MAX_WINDOW {
            return Err(corrupt(format!("invalid window {window}")));
        }

        let mut model = Self::zeroed(window, hidden);
        let expected = HEADER_LEN
            + 4 * (model.w_in.len()
                + model.w_rec.len()
                + model.b_h.len()
                + model.w_out.len()
                + model.b_out.len());
        if buf.len() != expected {
            return Err(corrupt(format!(
                "blob is {} bytes, expected {expected}",
                buf.len()
            )));
        }

        let mut off = HEADER_LEN;
        off = read_f32_block(buf, off, &mut model.w_in);
        off = read_f32_block(buf, off, &mut model.w_rec);
        off = read_f32_block(buf, off, &mut model.b_h);
        off = read_f32_block(buf, off, &mut model.w_out);
        read_f32_block(buf, off, &mut model.b_out);

        if !model.is_finite() {
            return Err(corrupt("non-finite weight"));
        }
        Ok(model)
    }
}

fn corrupt(reason: impl Into<String>) -> ModelError {
    ModelError::CorruptWeights(reason.into())
}

fn xavier_limit(fan_in: usize, fan_out: usize) -> f32 {
    (6.0 / (fan_in + fan_out) as f32).sqrt()
}

fn fill_uniform<R: Rng + ?Sized>(weights: &mut [f32], limit: f32, rng: &mut R) {
    for w in weights.iter_mut() {
        *w = rng.gen_range(-limit..=limit);
    }
}

fn softmax(logits: &[f32; TILE_COUNT]) -> [f32; TILE_COUNT] {
    let maxv = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut exps = [0f64; TILE_COUNT];
    let mut expsum = 0f64;
    for (e, &logit) in exps.iter_mut().zip(logits.iter()) {
        *e = (f64::from(logit) - f64::from(maxv)).exp();
        expsum += *e;
    }
    let denom = expsum + 1e-12;

    let mut probs = [0f32; TILE_COUNT];
    for (p, e) in probs.iter_mut().zip(exps.iter()) {
        *p = (e / denom) as f32;
    }
    probs
}

fn cross_entropy(probs: &[f32; TILE_COUNT], label: u8) -> f32 {
    -(probs[usize::from(label)].max(1e-12)).ln()
}

fn u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// Caller has already checked the total length.
fn read_f32_block(buf: &[u8], mut off: usize, out: &mut [f32]) -> usize {
    for value in out.iter_mut() {
        *value = f32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        off += 4;
    }
    off
}

fn write_f32s(dst: &mut Vec<u8>, xs: &[f32]) {
    for &x in xs {
        dst.extend_from_slice(&x.to_le_bytes());
    }
}
