use burn::module::Param;
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::TensorData;
use rand::Rng;

use crate::model::bridge::float_tensor;
use crate::model::dropout::dropout;

/// Configuration for a peephole LSTM encoder.
#[derive(Config, Debug)]
pub struct PeepholeLstmConfig {
    /// Input (embedding) dimension.
    pub d_input: usize,
    /// Hidden/cell dimension.
    pub d_hidden: usize,
    /// Constant added to the forget-gate pre-activation.
    #[config(default = 2.0)]
    pub forget_bias: f64,
}

/// LSTM cell with peephole connections, unrolled over a padded sequence.
///
/// ```text
/// z   = [x_t, h_{t-1}] @ kernel + bias        gate order: i, j, f, o
/// i   = sigmoid(z_i + w_ci * c_{t-1})
/// f   = sigmoid(z_f + forget_bias + w_cf * c_{t-1})
/// c_t = f * c_{t-1} + i * tanh(z_j)
/// o   = sigmoid(z_o + w_co * c_t)
/// h_t = o * tanh(c_t)
/// ```
#[derive(Module, Debug)]
pub struct PeepholeLstm<B: Backend> {
    /// Fused kernel, shape (d_input + d_hidden, 4 * d_hidden). Glorot uniform.
    pub(crate) kernel: Param<Tensor<B, 2>>,
    /// Gate bias, shape (4 * d_hidden,). Zero initialized.
    bias: Param<Tensor<B, 1>>,
    /// Peephole from the previous cell into the input gate.
    pub(crate) w_ci: Param<Tensor<B, 1>>,
    /// Peephole from the previous cell into the forget gate.
    w_cf: Param<Tensor<B, 1>>,
    /// Peephole from the current cell into the output gate.
    w_co: Param<Tensor<B, 1>>,
    d_hidden: usize,
    forget_bias: f64,
}

/// Recurrent state `(c, h)`, each `(batch, d_hidden)`.
#[derive(Debug, Clone)]
pub struct LstmState<B: Backend> {
    pub cell: Tensor<B, 2>,
    pub hidden: Tensor<B, 2>,
}

impl<B: Backend> LstmState<B> {
    fn zeros(batch: usize, d_hidden: usize, device: &B::Device) -> Self {
        Self {
            cell: Tensor::zeros([batch, d_hidden], device),
            hidden: Tensor::zeros([batch, d_hidden], device),
        }
    }
}

fn uniform(rng: &mut impl Rng, count: usize, limit: f32) -> Vec<f32> {
    (0..count).map(|_| rng.gen_range(-limit..limit)).collect()
}

impl PeepholeLstmConfig {
    /// Glorot-uniform kernel and uniform peepholes, drawn from `rng`.
    pub fn init<B: Backend>(&self, device: &B::Device, rng: &mut impl Rng) -> PeepholeLstm<B> {
        let fan_in = self.d_input + self.d_hidden;
        let fan_out = 4 * self.d_hidden;
        let limit = (6.0 / (fan_in + fan_out) as f64).sqrt() as f32;
        let kernel = uniform(rng, fan_in * fan_out, limit);

        let peephole_limit = (3.0 / self.d_hidden as f64).sqrt() as f32;
        let w_ci = float_tensor(uniform(rng, self.d_hidden, peephole_limit), [self.d_hidden], device);
        let w_cf = float_tensor(uniform(rng, self.d_hidden, peephole_limit), [self.d_hidden], device);
        let w_co = float_tensor(uniform(rng, self.d_hidden, peephole_limit), [self.d_hidden], device);

        PeepholeLstm {
            kernel: Param::from_tensor(float_tensor(kernel, [fan_in, fan_out], device)),
            bias: Param::from_tensor(Tensor::zeros([fan_out], device)),
            w_ci: Param::from_tensor(w_ci),
            w_cf: Param::from_tensor(w_cf),
            w_co: Param::from_tensor(w_co),
            d_hidden: self.d_hidden,
            forget_bias: self.forget_bias,
        }
    }
}

impl<B: Backend> PeepholeLstm<B> {
    /// Hidden size of the encoder.
    pub fn d_hidden(&self) -> usize {
        self.d_hidden
    }

    /// One recurrence step on `(batch, d_input)` inputs.
    pub fn step(&self, x: Tensor<B, 2>, state: LstmState<B>) -> LstmState<B> {
        let h = self.d_hidden;
        let z = Tensor::cat(vec![x, state.hidden], 1).matmul(self.kernel.val())
            + self.bias.val().unsqueeze_dim::<2>(0);

        let z_i = z.clone().narrow(1, 0, h);
        let z_j = z.clone().narrow(1, h, h);
        let z_f = z.clone().narrow(1, 2 * h, h);
        let z_o = z.narrow(1, 3 * h, h);

        let c_prev = state.cell;
        let i = sigmoid(z_i + c_prev.clone() * self.w_ci.val().unsqueeze_dim::<2>(0));
        let f = sigmoid(z_f + self.forget_bias + c_prev.clone() * self.w_cf.val().unsqueeze_dim::<2>(0));
        let cell = f * c_prev + i * z_j.tanh();
        let o = sigmoid(z_o + cell.clone() * self.w_co.val().unsqueeze_dim::<2>(0));
        let hidden = o * cell.clone().tanh();

        LstmState { cell, hidden }
    }

    /// Run the recurrence over `(batch, max_length, d_input)` inputs.
    ///
    /// Position `t` of example `b` is consumed only when `t < lengths[b]`;
    /// otherwise the state is carried through unchanged, so padding never
    /// reaches the result. Dropout with `keep_prob` is drawn independently
    /// for each step's input.
    ///
    /// A zero length is not rejected: that example returns the initial
    /// all-zero state.
    pub fn forward(&self, inputs: Tensor<B, 3>, lengths: &[usize], keep_prob: f64) -> LstmState<B> {
        let [batch, max_length, d_input] = inputs.dims();
        debug_assert_eq!(lengths.len(), batch, "one length per example");
        let device = inputs.device();

        let lengths_data: Vec<i64> = lengths.iter().map(|&l| l as i64).collect();
        let lengths_tensor =
            Tensor::<B, 1, Int>::from_data(TensorData::new(lengths_data, [batch]), &device);

        let steps = lengths.iter().copied().max().unwrap_or(0).min(max_length);
        let mut state = LstmState::zeros(batch, self.d_hidden, &device);

        for t in 0..steps {
            let x_t = inputs
                .clone()
                .slice([0..batch, t..t + 1, 0..d_input])
                .reshape([batch, d_input]);
            let x_t = dropout(x_t, keep_prob);
            let next = self.step(x_t, state.clone());

            let active = lengths_tensor
                .clone()
                .greater_elem(t as i64)
                .unsqueeze_dim::<2>(1)
                .repeat_dim(1, self.d_hidden);
            state = LstmState {
                cell: state.cell.mask_where(active.clone(), next.cell),
                hidden: state.hidden.mask_where(active, next.hidden),
            };
        }

        state
    }
}
