use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::board::Board;
use crate::piece::{terrain_at, Cell, Terrain, BOARD_SIZE};

pub const CHANNELS: usize = 6;
const CELLS: usize = BOARD_SIZE * BOARD_SIZE;
const KERNEL: usize = 3;

/// A positional evaluator. Positive scores favour White, negative Black.
/// Implementations must be referentially transparent: the score depends on
/// the occupant grid alone.
pub trait Scorer {
    fn score(&self, board: &Board) -> f64;

    /// Evaluate a batch of positions. The default is the serial loop;
    /// implementations may override it with true batched inference.
    fn score_batch(&self, boards: &[Board]) -> Vec<f64> {
        boards.iter().map(|b| self.score(b)).collect()
    }
}

/// Encode a position as the model input: six 9×9 planes in channel-major
/// order (index = channel·81 + row·9 + col). Channels 0–2 are the constant
/// camp, castle and escape masks; channels 3–5 are the white, black and
/// king occupancy planes.
pub fn encode(board: &Board) -> Vec<f32> {
    let mut planes = vec![0.0f32; CHANNELS * CELLS];
    for row in 0..BOARD_SIZE {
        for col in 0..BOARD_SIZE {
            let cell = row * BOARD_SIZE + col;
            match terrain_at(row, col) {
                Terrain::Camp => planes[cell] = 1.0,
                Terrain::Castle => planes[CELLS + cell] = 1.0,
                Terrain::Escape => planes[2 * CELLS + cell] = 1.0,
                Terrain::Plain => {}
            }
            match board.cells[row][col] {
                Cell::White => planes[3 * CELLS + cell] = 1.0,
                Cell::Black => planes[4 * CELLS + cell] = 1.0,
                Cell::King => planes[5 * CELLS + cell] = 1.0,
                Cell::Empty => {}
            }
        }
    }
    planes
}

/// Material-count heuristic (#white + 3·has-king) − #black. Used to
/// bootstrap tests and as the degraded mode when no model artifact loads.
pub struct MaterialScorer;

impl Scorer for MaterialScorer {
    fn score(&self, board: &Board) -> f64 {
        let mut score = 0;
        for row in board.cells.iter() {
            for cell in row {
                match cell {
                    Cell::White => score += 1,
                    Cell::King => score += 3,
                    Cell::Black => score -= 1,
                    Cell::Empty => {}
                }
            }
        }
        f64::from(score)
    }
}

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("cannot read model file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse model file: {0}")]
    Format(#[from] serde_json::Error),
    #[error("model layer {layer}: {message}")]
    Shape { layer: usize, message: String },
}

/// One layer of the weight artifact.
#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum LayerSpec {
    /// 3×3 convolution, stride 1, zero padding, ReLU.
    Conv {
        filters: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
    },
    /// Fully connected layer; the first dense layer flattens the planes.
    Dense {
        outputs: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
    },
}

#[derive(Deserialize)]
struct ModelSpec {
    layers: Vec<LayerSpec>,
}

enum Layer {
    Conv {
        in_channels: usize,
        filters: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
    },
    Dense {
        inputs: usize,
        outputs: usize,
        weights: Vec<f32>,
        bias: Vec<f32>,
        relu: bool,
    },
}

/// The pre-trained convolutional regressor, evaluated on the CPU. The
/// artifact fixes the architecture as a layer list over the (6, 9, 9) input
/// tensor; all shapes are validated once at load so inference can index
/// without checks.
pub struct ConvScorer {
    layers: Vec<Layer>,
}

impl ConvScorer {
    pub fn load(path: &Path) -> Result<ConvScorer, ScorerError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<ConvScorer, ScorerError> {
        let spec: ModelSpec = serde_json::from_str(text)?;
        let mut layers = Vec::with_capacity(spec.layers.len());
        let mut channels = CHANNELS;
        let mut flattened: Option<usize> = None;
        for (index, layer) in spec.layers.into_iter().enumerate() {
            let shape_err = |message: String| ScorerError::Shape {
                layer: index,
                message,
            };
            match layer {
                LayerSpec::Conv {
                    filters,
                    weights,
                    bias,
                } => {
                    if flattened.is_some() {
                        return Err(shape_err("conv layer after a dense layer".into()));
                    }
                    let expected = filters * channels * KERNEL * KERNEL;
                    if filters == 0 || weights.len() != expected {
                        return Err(shape_err(format!(
                            "expected {expected} conv weights, found {}",
                            weights.len()
                        )));
                    }
                    if bias.len() != filters {
                        return Err(shape_err(format!(
                            "expected {filters} biases, found {}",
                            bias.len()
                        )));
                    }
                    layers.push(Layer::Conv {
                        in_channels: channels,
                        filters,
                        weights,
                        bias,
                    });
                    channels = filters;
                }
                LayerSpec::Dense {
                    outputs,
                    weights,
                    bias,
                } => {
                    let inputs = flattened.unwrap_or(channels * CELLS);
                    if outputs == 0 || weights.len() != outputs * inputs {
                        return Err(shape_err(format!(
                            "expected {} dense weights, found {}",
                            outputs * inputs,
                            weights.len()
                        )));
                    }
                    if bias.len() != outputs {
                        return Err(shape_err(format!(
                            "expected {outputs} biases, found {}",
                            bias.len()
                        )));
                    }
                    layers.push(Layer::Dense {
                        inputs,
                        outputs,
                        weights,
                        bias,
                        relu: true,
                    });
                    flattened = Some(outputs);
                }
            }
        }
        let head_layer = layers.len().saturating_sub(1);
        match layers.last_mut() {
            Some(Layer::Dense { outputs: 1, relu, .. }) => *relu = false,
            _ => {
                return Err(ScorerError::Shape {
                    layer: head_layer,
                    message: "model must end in a single-output dense layer".into(),
                })
            }
        }
        Ok(ConvScorer { layers })
    }

    fn forward(&self, input: Vec<f32>) -> f32 {
        let mut activations = input;
        for layer in &self.layers {
            activations = match layer {
                Layer::Conv {
                    in_channels,
                    filters,
                    weights,
                    bias,
                } => conv_forward(&activations, *in_channels, *filters, weights, bias),
                Layer::Dense {
                    inputs,
                    outputs,
                    weights,
                    bias,
                    relu,
                } => dense_forward(&activations, *inputs, *outputs, weights, bias, *relu),
            };
        }
        activations[0]
    }
}

impl Scorer for ConvScorer {
    fn score(&self, board: &Board) -> f64 {
        f64::from(self.forward(encode(board)))
    }
}

fn conv_forward(
    input: &[f32],
    in_channels: usize,
    filters: usize,
    weights: &[f32],
    bias: &[f32],
) -> Vec<f32> {
    let mut out = vec![0.0f32; filters * CELLS];
    for f in 0..filters {
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                let mut acc = bias[f];
                for ch in 0..in_channels {
                    for kr in 0..KERNEL {
                        for kc in 0..KERNEL {
                            let r = row as i32 + kr as i32 - 1;
                            let c = col as i32 + kc as i32 - 1;
                            if r < 0 || c < 0 || r >= BOARD_SIZE as i32 || c >= BOARD_SIZE as i32 {
                                continue;
                            }
                            let w = weights[((f * in_channels + ch) * KERNEL + kr) * KERNEL + kc];
                            acc += w * input[ch * CELLS + r as usize * BOARD_SIZE + c as usize];
                        }
                    }
                }
                out[f * CELLS + row * BOARD_SIZE + col] = acc.max(0.0);
            }
        }
    }
    out
}

fn dense_forward(
    input: &[f32],
    inputs: usize,
    outputs: usize,
    weights: &[f32],
    bias: &[f32],
    relu: bool,
) -> Vec<f32> {
    (0..outputs)
        .map(|o| {
            let mut acc = bias[o];
            for i in 0..inputs {
                acc += weights[o * inputs + i] * input[i];
            }
            if relu {
                acc.max(0.0)
            } else {
                acc
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::Color;
    use serde_json::json;

    #[test]
    fn encoding_recovers_the_occupant_grid() {
        let board = Board::new();
        let planes = encode(&board);
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                let cell = row * BOARD_SIZE + col;
                let decoded = if planes[3 * CELLS + cell] == 1.0 {
                    Cell::White
                } else if planes[4 * CELLS + cell] == 1.0 {
                    Cell::Black
                } else if planes[5 * CELLS + cell] == 1.0 {
                    Cell::King
                } else {
                    Cell::Empty
                };
                assert_eq!(decoded, board.cells[row][col], "({row}, {col})");
                assert_eq!(
                    planes[cell] == 1.0,
                    terrain_at(row, col) == Terrain::Camp,
                    "camp mask ({row}, {col})"
                );
            }
        }
        assert_eq!(planes[CELLS + 4 * BOARD_SIZE + 4], 1.0, "castle mask");
    }

    #[test]
    fn encoding_ignores_the_last_mover() {
        let mut a = Board::new();
        let mut b = Board::new();
        a.last_mover = Some(Color::White);
        b.last_mover = Some(Color::Black);
        assert_eq!(encode(&a), encode(&b));
    }

    #[test]
    fn material_scorer_counts_the_armies() {
        assert_eq!(MaterialScorer.score(&Board::new()), -5.0);
        let mut board = Board::empty();
        board.cells[0][0] = Cell::King;
        assert_eq!(MaterialScorer.score(&board), 3.0);
    }

    fn king_spotter_json() -> String {
        // a single dense head that reads the king plane at the castle
        let mut weights = vec![0.0f32; CHANNELS * CELLS];
        weights[5 * CELLS + 4 * BOARD_SIZE + 4] = 2.0;
        json!({
            "layers": [
                { "kind": "dense", "outputs": 1, "weights": weights, "bias": [0.5] }
            ]
        })
        .to_string()
    }

    #[test]
    fn dense_head_reads_the_encoded_planes() {
        let scorer = ConvScorer::from_json(&king_spotter_json()).unwrap();
        assert_eq!(scorer.score(&Board::new()), 2.5);
        assert_eq!(scorer.score(&Board::empty()), 0.5);
    }

    #[test]
    fn scores_are_stable_across_calls_and_movers() {
        let scorer = ConvScorer::from_json(&king_spotter_json()).unwrap();
        let mut board = Board::new();
        let first = scorer.score(&board);
        board.last_mover = Some(Color::Black);
        assert_eq!(scorer.score(&board), first);
        assert_eq!(scorer.score(&board), first);
    }

    #[test]
    fn conv_stack_feeds_the_dense_head() {
        // one constant-bias filter followed by an averaging head
        let model = json!({
            "layers": [
                {
                    "kind": "conv",
                    "filters": 1,
                    "weights": vec![0.0f32; CHANNELS * KERNEL * KERNEL],
                    "bias": [1.0]
                },
                {
                    "kind": "dense",
                    "outputs": 1,
                    "weights": vec![1.0f32 / CELLS as f32; CELLS],
                    "bias": [0.0]
                }
            ]
        })
        .to_string();
        let scorer = ConvScorer::from_json(&model).unwrap();
        let score = scorer.score(&Board::empty());
        assert!((score - 1.0).abs() < 1e-5, "{score}");
    }

    #[test]
    fn shape_mismatches_are_load_errors() {
        let bad = json!({
            "layers": [
                { "kind": "dense", "outputs": 1, "weights": [1.0, 2.0], "bias": [0.0] }
            ]
        })
        .to_string();
        assert!(matches!(
            ConvScorer::from_json(&bad),
            Err(ScorerError::Shape { layer: 0, .. })
        ));
    }

    #[test]
    fn model_must_end_in_a_scalar_head() {
        let headless = json!({
            "layers": [
                {
                    "kind": "conv",
                    "filters": 1,
                    "weights": vec![0.0f32; CHANNELS * KERNEL * KERNEL],
                    "bias": [0.0]
                }
            ]
        })
        .to_string();
        assert!(ConvScorer::from_json(&headless).is_err());
        assert!(ConvScorer::from_json("{\"layers\": []}").is_err());
    }

    #[test]
    fn batch_scoring_matches_single_calls() {
        let boards = vec![Board::new(), Board::empty()];
        let batch = MaterialScorer.score_batch(&boards);
        assert_eq!(batch, vec![-5.0, 3.0]);
    }
}
