//! Reconstruction sequences as the menu declares them.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::naming::{validate_name, Key, KeySet};
use crate::params::{HypoParams, Properties, PropertyValue, RecoParams};

fn default_input_maker_type() -> String {
    "InputMakerForRoI".to_string()
}

/// An external algorithm, known only by its declared keys and properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmSpec {
    pub name: String,
    pub alg_type: String,
    #[serde(default)]
    pub inputs: KeySet,
    #[serde(default)]
    pub outputs: KeySet,
    #[serde(default)]
    pub properties: Properties,
}

impl AlgorithmSpec {
    pub fn new(name: impl Into<String>, alg_type: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            alg_type: alg_type.into(),
            inputs: KeySet::new(),
            outputs: KeySet::new(),
            properties: Properties::new(),
        })
    }

    pub fn with_input(mut self, key: Key) -> Self {
        self.inputs.insert(key);
        self
    }

    pub fn with_output(mut self, key: Key) -> Self {
        self.outputs.insert(key);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub(crate) fn params(&self) -> RecoParams {
        RecoParams {
            alg_type: self.alg_type.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// The hypothesis algorithm closing a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypoAlgSpec {
    pub name: String,
    pub alg_type: String,
    /// Reconstructed collection the hypo tools cut on.
    pub feature_key: Key,
    #[serde(default)]
    pub properties: Properties,
}

impl HypoAlgSpec {
    pub fn new(name: impl Into<String>, alg_type: impl Into<String>, feature_key: Key) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            alg_type: alg_type.into(),
            feature_key,
            properties: Properties::new(),
        })
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub(crate) fn params(&self, sequence: &str, decisions: Key) -> HypoParams {
        HypoParams {
            alg_type: self.alg_type.clone(),
            sequence: sequence.to_string(),
            decisions,
            feature_key: self.feature_key.clone(),
            properties: self.properties.clone(),
        }
    }
}

/// Input maker, reconstruction algorithms and hypo of one selection stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuSequence {
    pub name: String,
    #[serde(default = "default_input_maker_type")]
    pub input_maker_type: String,
    /// Region-of-interest collection the input maker writes.
    pub roi_key: Key,
    #[serde(default)]
    pub reco: Vec<AlgorithmSpec>,
    pub hypo: HypoAlgSpec,
}

impl MenuSequence {
    pub fn new(name: impl Into<String>, roi_key: Key, hypo: HypoAlgSpec) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            input_maker_type: default_input_maker_type(),
            roi_key,
            reco: Vec::new(),
            hypo,
        })
    }

    pub fn with_reco(mut self, alg: AlgorithmSpec) -> Self {
        self.reco.push(alg);
        self
    }

    pub fn with_input_maker_type(mut self, alg_type: impl Into<String>) -> Self {
        self.input_maker_type = alg_type.into();
        self
    }

    /// Check every name that ends up in a derived key.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        validate_name(&self.hypo.name)?;
        for alg in &self.reco {
            validate_name(&alg.name)?;
        }
        Ok(())
    }
}
