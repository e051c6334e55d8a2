//! Epsilon-greedy agent over a small fully connected Q-value network.
//!
//! Input is the 16 cells as `log2(tile) / 16` (0 for empty), output is one value per
//! direction in [`Move::ALL`] order. Every transition triggers one Adam step on the
//! squared TD error of the chosen action's output:
//!
//! `target = r' + gamma * max_a Q(s', a)` (just `r'` when `s'` is terminal),
//! with the reward compressed as `r' = log2(1 + reward)`.

use std::fmt;
use std::iter;
use std::path::Path;

use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{BinBytesRecorder, FullPrecisionSettings, Recorder};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Agent, AgentError, AgentKind, Transition};
use crate::engine::{Grid, Move, SIZE};
use crate::model_io::{self, ModelError};

type QBackend = Autodiff<NdArray>;

const INPUTS: usize = SIZE * SIZE;
const OUTPUTS: usize = Move::ALL.len();
/// Largest TD error fed back per update.
const ERROR_CLIP: f32 = 1.0;

/// Hyperparameters for [`QNetworkAgent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QNetworkConfig {
    /// Widths of the ReLU hidden layers, input side first.
    pub hidden: Vec<usize>,
    pub learning_rate: f32,
    pub gamma: f32,
    pub epsilon_start: f32,
    pub epsilon_min: f32,
    /// Multiplied into epsilon after every episode.
    pub epsilon_decay: f32,
    pub seed: u64,
}

impl Default for QNetworkConfig {
    fn default() -> Self {
        Self {
            hidden: vec![32, 32],
            learning_rate: 1e-3,
            gamma: 0.95,
            epsilon_start: 1.0,
            epsilon_min: 0.05,
            epsilon_decay: 0.995,
            seed: 0,
        }
    }
}

impl QNetworkConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(idx) = self.hidden.iter().position(|&w| w == 0) {
            return Err(format!("hidden layer {idx} has zero width"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(format!("learning rate {} must be positive", self.learning_rate));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(format!("gamma {} outside [0, 1]", self.gamma));
        }
        Ok(())
    }

    /// `[inputs, outputs]` of every linear layer, input side first.
    fn layer_shapes(&self) -> Vec<[usize; 2]> {
        let widths: Vec<usize> = iter::once(INPUTS)
            .chain(self.hidden.iter().copied())
            .chain(iter::once(OUTPUTS))
            .collect();
        widths.windows(2).map(|w| [w[0], w[1]]).collect()
    }
}

#[derive(Module, Debug)]
struct QNetwork<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> QNetwork<B> {
    fn new(config: &QNetworkConfig, device: &B::Device) -> Self {
        let mut layers: Vec<Linear<B>> = config
            .layer_shapes()
            .into_iter()
            .map(|[inputs, outputs]| LinearConfig::new(inputs, outputs).init(device))
            .collect();
        let output = layers.pop().unwrap_or_else(|| LinearConfig::new(INPUTS, OUTPUTS).init(device));
        Self { hidden: layers, output, activation: Relu::new() }
    }

    fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = input;
        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }
        self.output.forward(x)
    }

    fn layers(&self) -> impl Iterator<Item = &Linear<B>> {
        self.hidden.iter().chain(iter::once(&self.output))
    }

    /// True iff every weight and bias has the shape `config` asks for.
    fn matches(&self, config: &QNetworkConfig) -> bool {
        let expected = config.layer_shapes();
        self.layers().count() == expected.len()
            && self.layers().zip(&expected).all(|(layer, shape)| {
                layer.weight.val().dims() == *shape
                    && layer.bias.as_ref().map_or(true, |b| b.val().dims() == [shape[1]])
            })
    }
}

trait NetworkOptimizer {
    fn update(&mut self, lr: f64, network: QNetwork<QBackend>, grads: GradientsParams) -> QNetwork<QBackend>;
}

impl<O: Optimizer<QNetwork<QBackend>, QBackend>> NetworkOptimizer for O {
    fn update(&mut self, lr: f64, network: QNetwork<QBackend>, grads: GradientsParams) -> QNetwork<QBackend> {
        self.step(lr, network, grads)
    }
}

fn adam() -> Box<dyn NetworkOptimizer> {
    Box::new(AdamConfig::new().init::<QBackend, QNetwork<QBackend>>())
}

fn encode(grid: &Grid) -> [f32; INPUTS] {
    let mut features = [0.0; INPUTS];
    for (f, &tile) in features.iter_mut().zip(grid.rows().iter().flatten()) {
        if tile > 0 {
            *f = tile.trailing_zeros() as f32 / 16.0;
        }
    }
    features
}

fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            return None;
        }
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((idx, v));
        }
    }
    best.map(|(idx, _)| idx)
}

fn recorder() -> BinBytesRecorder<FullPrecisionSettings> {
    BinBytesRecorder::<FullPrecisionSettings>::default()
}

#[derive(Serialize, Deserialize)]
struct QNetworkModel {
    config: QNetworkConfig,
    /// Network parameters as a burn binary record.
    network: Vec<u8>,
    epsilon: f32,
    updates: u64,
}

/// Learned agent; see the module docs for the update rule.
///
/// The Adam moments are not persisted, so a reloaded agent restarts them.
pub struct QNetworkAgent {
    config: QNetworkConfig,
    network: QNetwork<QBackend>,
    optimizer: Box<dyn NetworkOptimizer>,
    device: NdArrayDevice,
    epsilon: f32,
    explore: bool,
    updates: u64,
    rng: StdRng,
}

impl fmt::Debug for QNetworkAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QNetworkAgent")
            .field("config", &self.config)
            .field("epsilon", &self.epsilon)
            .field("explore", &self.explore)
            .field("updates", &self.updates)
            .finish_non_exhaustive()
    }
}

impl QNetworkAgent {
    pub fn new(config: QNetworkConfig) -> Result<Self, AgentError> {
        config.validate().map_err(AgentError::InvalidConfig)?;
        <QBackend as Backend>::seed(config.seed);
        let device = NdArrayDevice::default();
        let network = QNetwork::new(&config, &device);
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(QNetworkAgent {
            epsilon: config.epsilon_start,
            config,
            network,
            optimizer: adam(),
            device,
            explore: true,
            updates: 0,
            rng,
        })
    }

    pub fn config(&self) -> &QNetworkConfig {
        &self.config
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// Number of learning updates applied so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Q-values for `state`, one per direction in [`Move::ALL`] order.
    pub fn q_values(&self, state: &Grid) -> Result<Vec<f32>, AgentError> {
        self.network
            .forward(self.input(state))
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| AgentError::Decision(format!("unreadable Q-values: {e:?}")))
    }

    fn input(&self, state: &Grid) -> Tensor<QBackend, 2> {
        Tensor::<QBackend, 1>::from_floats(encode(state).as_slice(), &self.device).reshape([1, INPUTS])
    }
}

impl Agent for QNetworkAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::QNetwork
    }

    fn choose_action(&mut self, state: &Grid) -> Result<Move, AgentError> {
        if self.explore && self.rng.gen::<f32>() < self.epsilon {
            return Ok(Move::ALL[self.rng.gen_range(0..OUTPUTS)]);
        }
        let q = self.q_values(state)?;
        argmax(&q)
            .map(|idx| Move::ALL[idx])
            .ok_or_else(|| AgentError::Decision(format!("non-finite Q-values {q:?}")))
    }

    fn learn(&mut self, t: &Transition) -> Result<(), AgentError> {
        let reward = (1.0 + t.reward as f32).log2();
        let target = if t.done {
            reward
        } else {
            let next = self.q_values(&t.next_state)?;
            let best = next.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            reward + self.config.gamma * best
        };
        if !target.is_finite() {
            return Err(AgentError::Learn(format!("non-finite TD target {target}")));
        }

        let index = t.action.index();
        let chosen = self.network.forward(self.input(&t.state)).slice([0..1, index..index + 1]);
        let predicted = chosen
            .clone()
            .into_data()
            .to_vec::<f32>()
            .ok()
            .and_then(|v| v.first().copied())
            .ok_or_else(|| AgentError::Learn("unreadable prediction".into()))?;
        let target = predicted + (target - predicted).clamp(-ERROR_CLIP, ERROR_CLIP);
        let target = Tensor::<QBackend, 1>::from_floats([target].as_slice(), &self.device).reshape([1, 1]);

        let loss = (chosen - target).powf_scalar(2.0).mean();
        let grads = GradientsParams::from_grads(loss.backward(), &self.network);
        let lr = f64::from(self.config.learning_rate);
        self.network = self.optimizer.update(lr, self.network.clone(), grads);
        self.updates += 1;
        Ok(())
    }

    fn end_episode(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
        debug!(epsilon = self.epsilon, updates = self.updates, "episode finished");
    }

    fn set_exploration(&mut self, explore: bool) {
        self.explore = explore;
    }

    fn save_model(&self, path: &Path) -> Result<(), ModelError> {
        let network = Recorder::<QBackend>::record(&recorder(), self.network.clone().into_record(), ())
            .map_err(|e| ModelError::Record(format!("{e:?}")))?;
        let model = QNetworkModel {
            config: self.config.clone(),
            network,
            epsilon: self.epsilon,
            updates: self.updates,
        };
        model_io::save_model(path, AgentKind::QNetwork.name(), &model)
    }

    fn load_model(path: &Path) -> Result<Self, ModelError> {
        let model: QNetworkModel = model_io::load_model(path, AgentKind::QNetwork.name())?;
        if let Err(reason) = model.config.validate() {
            debug!(path = %path.display(), %reason, "rejecting stored network config");
            return Err(ModelError::Malformed);
        }
        let device = NdArrayDevice::default();
        let record = Recorder::<QBackend>::load(&recorder(), model.network, &device)
            .map_err(|e| ModelError::Record(format!("{e:?}")))?;
        let network = QNetwork::<QBackend>::new(&model.config, &device).load_record(record);
        if !network.matches(&model.config) {
            debug!(path = %path.display(), "stored network shape disagrees with its config");
            return Err(ModelError::Malformed);
        }
        let rng = StdRng::seed_from_u64(model.config.seed.wrapping_add(model.updates));
        Ok(QNetworkAgent {
            config: model.config,
            network,
            optimizer: adam(),
            device,
            epsilon: model.epsilon,
            explore: true,
            updates: model.updates,
            rng,
        })
    }
}
