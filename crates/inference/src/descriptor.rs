//! Architecture descriptor: the Keras-style JSON document describing the
//! layer composition of the classifier.
//!
//! Only the parts the service relies on are extracted: the input shape
//! (from `batch_input_shape` in Keras 2 files or `batch_shape` in Keras 3
//! files) and the width of the final scoring layer.

use crate::error::ModelLoadError;
use serde::Deserialize;
use serde_json::{Map, Value};

const DEFAULT_INPUT_SHAPE: InputShape = InputShape {
    height: 224,
    width: 224,
    channels: 3,
};

const SHAPE_KEYS: [&str; 2] = ["batch_input_shape", "batch_shape"];

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    class_name: String,
    config: RawModelConfig,
    #[serde(default)]
    keras_version: Option<String>,
    #[serde(default)]
    training_config: Option<RawTrainingConfig>,
}

#[derive(Debug, Deserialize)]
struct RawModelConfig {
    #[serde(default)]
    name: Option<String>,
    layers: Vec<RawLayer>,
}

#[derive(Debug, Deserialize)]
struct RawLayer {
    class_name: String,
    #[serde(default)]
    config: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawTrainingConfig {
    #[serde(default)]
    optimizer_config: Option<Value>,
    #[serde(default)]
    loss: Option<Value>,
    #[serde(default)]
    metrics: Option<Value>,
}

/// Per-sample input shape in NHWC order (batch axis excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

/// Optimizer/loss configuration carried over from training. Inference never reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSettings {
    pub optimizer: String,
    pub loss: String,
    pub metrics: Vec<String>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            optimizer: "adam".to_string(),
            loss: "categorical_crossentropy".to_string(),
            metrics: vec!["accuracy".to_string()],
        }
    }
}

impl CompileSettings {
    fn from_training_config(raw: RawTrainingConfig) -> Self {
        let defaults = Self::default();

        let optimizer = raw
            .optimizer_config
            .as_ref()
            .and_then(|cfg| cfg.get("class_name"))
            .and_then(Value::as_str)
            .map(|name| name.to_lowercase())
            .unwrap_or(defaults.optimizer);

        let loss = raw
            .loss
            .as_ref()
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or(defaults.loss);

        let metrics = match raw.metrics {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => defaults.metrics,
        };

        Self {
            optimizer,
            loss,
            metrics,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelDescriptor {
    pub name: Option<String>,
    pub class_name: String,
    pub keras_version: Option<String>,
    pub layer_count: usize,
    pub input_shape: InputShape,
    /// Width of the last layer declaring `units`, if any
    pub output_dim: Option<usize>,
    pub compile: CompileSettings,
}

impl ModelDescriptor {
    pub fn from_json(json: &str) -> Result<Self, ModelLoadError> {
        let raw: RawDescriptor = serde_json::from_str(json)?;

        if raw.config.layers.is_empty() {
            return Err(ModelLoadError::InvalidArchitecture(
                "descriptor declares no layers".to_string(),
            ));
        }

        let input_shape = match find_input_shape(&raw.config.layers) {
            Some(shape) => parse_input_shape(shape)?,
            None => {
                tracing::warn!(
                    default = ?DEFAULT_INPUT_SHAPE,
                    "Descriptor declares no input shape, assuming default"
                );
                DEFAULT_INPUT_SHAPE
            }
        };

        let output_dim = raw
            .config
            .layers
            .iter()
            .rev()
            .find_map(|layer| layer.config.get("units").and_then(Value::as_u64))
            .map(|units| units as usize);

        let compile = raw
            .training_config
            .map(CompileSettings::from_training_config)
            .unwrap_or_default();

        Ok(Self {
            name: raw.config.name,
            class_name: raw.class_name,
            keras_version: raw.keras_version,
            layer_count: raw.config.layers.len(),
            input_shape,
            output_dim,
            compile,
        })
    }

    /// Spatial input size as (width, height). Axes are validated to fit `u32` at parse time.
    pub fn input_size(&self) -> (u32, u32) {
        (self.input_shape.width as u32, self.input_shape.height as u32)
    }

    /// Full batch shape the model is fed: `[1, height, width, channels]`
    pub fn batch_shape(&self) -> Vec<usize> {
        vec![
            1,
            self.input_shape.height,
            self.input_shape.width,
            self.input_shape.channels,
        ]
    }

    pub fn output_dim(&self) -> Option<usize> {
        self.output_dim
    }
}

/// Prefer an explicit `InputLayer`, otherwise the first layer that declares a shape.
fn find_input_shape(layers: &[RawLayer]) -> Option<&Value> {
    layers
        .iter()
        .filter(|layer| layer.class_name == "InputLayer")
        .find_map(declared_shape)
        .or_else(|| layers.iter().find_map(declared_shape))
}

fn declared_shape(layer: &RawLayer) -> Option<&Value> {
    SHAPE_KEYS.iter().find_map(|key| layer.config.get(*key))
}

fn parse_input_shape(value: &Value) -> Result<InputShape, ModelLoadError> {
    let dims = value.as_array().ok_or_else(|| {
        ModelLoadError::InvalidArchitecture(format!("input shape {} is not a list", value))
    })?;

    if dims.len() != 4 {
        return Err(ModelLoadError::InvalidArchitecture(format!(
            "input shape {} must have 4 axes (batch, height, width, channels)",
            value
        )));
    }

    let axis = |index: usize, default: usize| -> Result<usize, ModelLoadError> {
        match &dims[index] {
            Value::Null => Ok(default),
            other => match other.as_u64() {
                Some(0) | None => Err(ModelLoadError::InvalidArchitecture(format!(
                    "input shape {} has an invalid axis {}",
                    value, other
                ))),
                Some(n) => u32::try_from(n).map(|n| n as usize).map_err(|_| {
                    ModelLoadError::InvalidArchitecture(format!(
                        "input shape {} has an axis too large for an image: {}",
                        value, n
                    ))
                }),
            },
        }
    };

    let shape = InputShape {
        height: axis(1, DEFAULT_INPUT_SHAPE.height)?,
        width: axis(2, DEFAULT_INPUT_SHAPE.width)?,
        channels: axis(3, DEFAULT_INPUT_SHAPE.channels)?,
    };

    if shape.channels != DEFAULT_INPUT_SHAPE.channels {
        return Err(ModelLoadError::InvalidArchitecture(format!(
            "model expects {} input channels, only 3-channel RGB input is supported",
            shape.channels
        )));
    }

    Ok(shape)
}
