//! Typed parameter sets for every node kind.
//!
//! A node's parameters are its identity: two registrations under one name
//! are the same node exactly when their parameter sets compare equal. The
//! `ParameterSet` trait adds a field-wise view used to report *which*
//! parameters differ when they do not.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub use menuflow_core_derive::ParameterSet;

use crate::hypo::LegMatching;
use crate::naming::{Key, KeySet};

/// One reported parameter field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamEntry {
    pub name: &'static str,
    pub value: Value,
}

impl ParamEntry {
    pub fn new(name: &'static str, value: Value) -> Self {
        Self { name, value }
    }
}

/// Field-wise access to a parameter struct.
///
/// Usually derived with `#[derive(ParameterSet)]`.
pub trait ParameterSet {
    /// Node kind these parameters configure.
    fn kind(&self) -> &'static str;

    /// Reported fields, in declaration order.
    fn entries(&self) -> Vec<ParamEntry>;

    /// Names of the fields whose values differ from `other`.
    fn differing(&self, other: &Self) -> Vec<&'static str>
    where
        Self: Sized,
    {
        self.entries()
            .into_iter()
            .zip(other.entries())
            .filter(|(ours, theirs)| ours.value != theirs.value)
            .map(|(ours, _)| ours.name)
            .collect()
    }
}

/// Value of one free-form algorithm property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<PropertyValue>),
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// Free-form properties, sorted by name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Kind of node in the compiled graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Filter,
    InputMaker,
    Reco,
    Hypo,
    Combo,
    Summary,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter => write!(f, "filter"),
            Self::InputMaker => write!(f, "input_maker"),
            Self::Reco => write!(f, "reco"),
            Self::Hypo => write!(f, "hypo"),
            Self::Combo => write!(f, "combo"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// Shape of a filter: what it gates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ParameterSet)]
#[parameters(kind = "Filter")]
pub struct FilterParams {
    pub step: usize,
    pub step_name: String,
    /// Sequence of every leg, in leg order.
    pub sequences: Vec<String>,
}

/// Configuration of a sequence's input maker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ParameterSet)]
#[parameters(kind = "InputMaker")]
pub struct InputMakerParams {
    pub sequence: String,
    pub alg_type: String,
    pub roi_key: Key,
}

/// Configuration of an external reconstruction algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ParameterSet)]
#[parameters(kind = "Reco")]
pub struct RecoParams {
    pub alg_type: String,
    pub inputs: KeySet,
    pub outputs: KeySet,
    pub properties: Properties,
}

/// Configuration of a single-object hypothesis algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ParameterSet)]
#[parameters(kind = "Hypo")]
pub struct HypoParams {
    pub alg_type: String,
    pub sequence: String,
    /// Decision key read from the input maker.
    pub decisions: Key,
    /// Reconstructed collection the tools cut on.
    pub feature_key: Key,
    pub properties: Properties,
}

/// Configuration of a multi-leg combination node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ParameterSet)]
#[parameters(kind = "Combo")]
pub struct ComboParams {
    pub step: usize,
    pub step_name: String,
    /// Decision key of every leg, in leg order.
    pub legs: Vec<Key>,
    pub matching: LegMatching,
}

/// Configuration of the terminal summary node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ParameterSet)]
#[parameters(kind = "Summary")]
pub struct SummaryParams {
    pub alg_type: String,
}

/// Closed set of parameter sets, one variant per node kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeParams {
    Filter(FilterParams),
    InputMaker(InputMakerParams),
    Reco(RecoParams),
    Hypo(HypoParams),
    Combo(ComboParams),
    Summary(SummaryParams),
}

impl NodeParams {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Filter(_) => NodeKind::Filter,
            Self::InputMaker(_) => NodeKind::InputMaker,
            Self::Reco(_) => NodeKind::Reco,
            Self::Hypo(_) => NodeKind::Hypo,
            Self::Combo(_) => NodeKind::Combo,
            Self::Summary(_) => NodeKind::Summary,
        }
    }

    fn as_parameter_set(&self) -> &dyn ParameterSet {
        match self {
            Self::Filter(p) => p,
            Self::InputMaker(p) => p,
            Self::Reco(p) => p,
            Self::Hypo(p) => p,
            Self::Combo(p) => p,
            Self::Summary(p) => p,
        }
    }

    pub fn entries(&self) -> Vec<ParamEntry> {
        self.as_parameter_set().entries()
    }

    /// Names of the parameters that differ; `["kind"]` across kinds.
    pub fn differing(&self, other: &Self) -> Vec<&'static str> {
        match (self, other) {
            (Self::Filter(a), Self::Filter(b)) => a.differing(b),
            (Self::InputMaker(a), Self::InputMaker(b)) => a.differing(b),
            (Self::Reco(a), Self::Reco(b)) => a.differing(b),
            (Self::Hypo(a), Self::Hypo(b)) => a.differing(b),
            (Self::Combo(a), Self::Combo(b)) => a.differing(b),
            (Self::Summary(a), Self::Summary(b)) => a.differing(b),
            _ => vec!["kind"],
        }
    }
}
