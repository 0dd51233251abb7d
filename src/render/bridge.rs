//! Feature vector to renderer parameters
//!
//! Each mapping reads one slot and derives a scalar:
//! `value = slot / divisor * gain + offset`. The table is configuration and
//! is validated once against the slot count before the first frame.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::features::FeatureVector;
use crate::pipeline::{FeatureFrame, FrameSink};
use crate::scheduler::FrameTimestamp;

/// One named renderer parameter fed by a feature slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterMapping {
    pub name: String,
    pub slot: usize,
    pub divisor: f32,
    #[serde(default = "unit_gain")]
    pub gain: f32,
    #[serde(default)]
    pub offset: f32,
}

fn unit_gain() -> f32 {
    1.0
}

impl ParameterMapping {
    pub fn new(name: &str, slot: usize, divisor: f32, gain: f32) -> Self {
        Self {
            name: name.to_string(),
            slot,
            divisor,
            gain,
            offset: 0.0,
        }
    }

    fn apply(&self, value: u8) -> f32 {
        value as f32 / self.divisor * self.gain + self.offset
    }
}

/// Default table: sphere scale, surface roughness and background level
pub fn default_mappings() -> Vec<ParameterMapping> {
    vec![
        ParameterMapping::new("scale", 2, 255.0, 1.5),
        ParameterMapping::new("roughness", 3, 300.0, 1.0),
        ParameterMapping::new("frequency", 4, 255.0, 1.0),
    ]
}

/// Values handed to the renderer for one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderParameters {
    pub time: f32,
    pub values: BTreeMap<String, f32>,
}

impl RenderParameters {
    pub fn get(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied()
    }
}

/// Derives renderer parameters from each published frame
pub struct RenderParameterBridge {
    mappings: Vec<ParameterMapping>,
    latest: RenderParameters,
}

impl RenderParameterBridge {
    /// Validate the table against a vector of `bin_count` slots
    pub fn new(mappings: Vec<ParameterMapping>, bin_count: usize) -> Result<Self, PipelineError> {
        for mapping in &mappings {
            if mapping.slot >= bin_count {
                return Err(PipelineError::MissingFeatureSlot {
                    slot: mapping.slot,
                    len: bin_count,
                });
            }
            if mapping.divisor == 0.0 || !mapping.divisor.is_finite() {
                return Err(PipelineError::InvalidConfig(format!(
                    "Parameter '{}' has divisor {}",
                    mapping.name, mapping.divisor
                )));
            }
        }

        let latest = RenderParameters {
            time: 0.0,
            values: mappings
                .iter()
                .map(|m| (m.name.clone(), m.offset))
                .collect(),
        };

        Ok(Self { mappings, latest })
    }

    pub fn mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }

    /// Compute the parameter set for a vector and timestamp
    pub fn compute(
        &self,
        vector: &FeatureVector,
        time: FrameTimestamp,
    ) -> Result<RenderParameters, PipelineError> {
        let mut params = RenderParameters {
            time: time.seconds(),
            values: BTreeMap::new(),
        };
        for mapping in &self.mappings {
            let value = vector
                .get(mapping.slot)
                .ok_or(PipelineError::MissingFeatureSlot {
                    slot: mapping.slot,
                    len: vector.len(),
                })?;
            params.values.insert(mapping.name.clone(), mapping.apply(value));
        }
        Ok(params)
    }

    /// Parameters from the last published frame
    pub fn latest(&self) -> &RenderParameters {
        &self.latest
    }
}

impl FrameSink for RenderParameterBridge {
    fn publish(&mut self, frame: &FeatureFrame) -> Result<(), PipelineError> {
        self.latest = self.compute(&frame.vector, frame.time)?;
        Ok(())
    }
}
