//! Evaluator for LightGBM `Booster.dump_model()` JSON.
//!
//! Only single-output binary models are supported (`binary` and
//! `cross_entropy` objectives). Trees are flattened into an arena at load
//! time so evaluation is a loop over indices.
//!
//! The `gbdt` crate only loads its own format and XGBoost dumps, not
//! LightGBM's `dump_model` JSON, so the trees are evaluated here.

use std::path::Path;

use serde::Deserialize;
use surge_models::{FEATURE_COUNT, FEATURE_NAMES};

use crate::{ModelError, SurgeClassifier};

/// Values with magnitude at or below this count as zero for
/// `missing_type = "Zero"`.
const ZERO_THRESHOLD: f64 = 1e-35;

#[derive(Debug, Deserialize)]
struct ModelDump {
    objective: String,
    #[serde(default = "one")]
    num_class: u32,
    #[serde(default = "one")]
    num_tree_per_iteration: u32,
    #[serde(default)]
    average_output: bool,
    feature_names: Vec<String>,
    tree_info: Vec<TreeInfo>,
}

const fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TreeInfo {
    tree_structure: DumpNode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DumpNode {
    Split(Box<DumpSplit>),
    Leaf(DumpLeaf),
}

#[derive(Debug, Deserialize)]
struct DumpSplit {
    split_feature: usize,
    threshold: DumpThreshold,
    decision_type: String,
    #[serde(default)]
    default_left: bool,
    #[serde(default = "missing_none")]
    missing_type: String,
    left_child: DumpNode,
    right_child: DumpNode,
}

fn missing_none() -> String {
    "None".to_string()
}

#[derive(Debug, Deserialize)]
struct DumpLeaf {
    leaf_value: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DumpThreshold {
    Numeric(f64),
    Categories(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MissingType {
    None,
    Zero,
    NaN,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Leaf(f64),
    Numerical {
        feature: usize,
        threshold: f64,
        default_left: bool,
        missing: MissingType,
        left: usize,
        right: usize,
    },
    Categorical {
        feature: usize,
        categories: Vec<i64>,
        missing: MissingType,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn compile(root: DumpNode) -> Result<Self, ModelError> {
        let mut nodes = Vec::new();
        push_node(&mut nodes, root)?;
        Ok(Self { nodes })
    }

    fn evaluate(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf(value) => return *value,
                Node::Numerical {
                    feature,
                    threshold,
                    default_left,
                    missing,
                    left,
                    right,
                } => {
                    let mut value = features[*feature];
                    if value.is_nan() && *missing != MissingType::NaN {
                        value = 0.0;
                    }
                    let is_missing = match missing {
                        MissingType::Zero => value.abs() <= ZERO_THRESHOLD,
                        MissingType::NaN => value.is_nan(),
                        MissingType::None => false,
                    };
                    let go_left = if is_missing {
                        *default_left
                    } else {
                        value <= *threshold
                    };
                    index = if go_left { *left } else { *right };
                }
                Node::Categorical {
                    feature,
                    categories,
                    missing,
                    left,
                    right,
                } => {
                    let value = features[*feature];
                    index = match category_of(value, *missing) {
                        Some(category) if categories.binary_search(&category).is_ok() => *left,
                        _ => *right,
                    };
                }
            }
        }
    }
}

/// Integer category of a feature value, or `None` if it can only go right.
#[allow(clippy::cast_possible_truncation)]
fn category_of(value: f64, missing: MissingType) -> Option<i64> {
    if value.is_nan() {
        return (missing != MissingType::NaN).then_some(0);
    }
    let category = value.trunc() as i64;
    (category >= 0).then_some(category)
}

/// Appends `node` and its subtree, returning its index.
fn push_node(nodes: &mut Vec<Node>, node: DumpNode) -> Result<usize, ModelError> {
    let index = nodes.len();
    match node {
        DumpNode::Leaf(leaf) => {
            if !leaf.leaf_value.is_finite() {
                return Err(invalid(format!("leaf value {} is not finite", leaf.leaf_value)));
            }
            nodes.push(Node::Leaf(leaf.leaf_value));
        }
        DumpNode::Split(split) => {
            let split = *split;
            if split.split_feature >= FEATURE_COUNT {
                return Err(invalid(format!(
                    "split on feature {} but the model has {FEATURE_COUNT} features",
                    split.split_feature
                )));
            }
            let missing = match split.missing_type.as_str() {
                "None" => MissingType::None,
                "Zero" => MissingType::Zero,
                "NaN" => MissingType::NaN,
                other => return Err(invalid(format!("unknown missing_type '{other}'"))),
            };

            // Reserve the slot so children land after their parent.
            nodes.push(Node::Leaf(0.0));
            let left = push_node(nodes, split.left_child)?;
            let right = push_node(nodes, split.right_child)?;

            nodes[index] = match (split.decision_type.as_str(), split.threshold) {
                ("<=", DumpThreshold::Numeric(threshold)) => Node::Numerical {
                    feature: split.split_feature,
                    threshold,
                    default_left: split.default_left,
                    missing,
                    left,
                    right,
                },
                ("==", DumpThreshold::Categories(list)) => Node::Categorical {
                    feature: split.split_feature,
                    categories: parse_categories(&list)?,
                    missing,
                    left,
                    right,
                },
                ("==", DumpThreshold::Numeric(value)) => Node::Categorical {
                    feature: split.split_feature,
                    categories: parse_categories(&value.to_string())?,
                    missing,
                    left,
                    right,
                },
                (decision, threshold) => {
                    return Err(invalid(format!(
                        "unsupported split '{decision}' with threshold {threshold:?}"
                    )));
                }
            };
        }
    }
    Ok(index)
}

/// Parses LightGBM's `"1||3||5"` category list.
fn parse_categories(list: &str) -> Result<Vec<i64>, ModelError> {
    let mut categories = list
        .split("||")
        .map(|c| {
            c.trim()
                .parse::<i64>()
                .map_err(|_| invalid(format!("invalid category '{c}' in '{list}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    categories.sort_unstable();
    categories.dedup();
    Ok(categories)
}

fn invalid(message: String) -> ModelError {
    ModelError::InvalidTree { message }
}

/// Link function applied to the summed raw score.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Link {
    Sigmoid(f64),
}

impl Link {
    fn parse(objective: &str) -> Result<Self, ModelError> {
        let mut parts = objective.split_whitespace();
        let name = parts.next().unwrap_or_default();
        match name {
            "binary" => {
                let mut scale = 1.0;
                for param in parts {
                    if let Some(value) = param.strip_prefix("sigmoid:") {
                        scale = value.parse().map_err(|_| {
                            ModelError::UnsupportedObjective(objective.to_string())
                        })?;
                    }
                }
                Ok(Self::Sigmoid(scale))
            }
            "cross_entropy" | "xentropy" => Ok(Self::Sigmoid(1.0)),
            _ => Err(ModelError::UnsupportedObjective(objective.to_string())),
        }
    }

    fn apply(self, raw: f64) -> f64 {
        match self {
            Self::Sigmoid(scale) => 1.0 / (1.0 + (-scale * raw).exp()),
        }
    }
}

/// A gradient boosted tree ensemble loaded from a LightGBM JSON dump.
#[derive(Debug, Clone, PartialEq)]
pub struct GbdtModel {
    objective: String,
    link: Link,
    average_output: bool,
    feature_names: Vec<String>,
    trees: Vec<Tree>,
}

impl GbdtModel {
    /// Reads a model dump from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the file cannot be read or is not a
    /// supported model for [`FEATURE_NAMES`].
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Parses a model dump.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the JSON is malformed, the objective is
    /// not a single-output binary objective, the feature names differ from
    /// [`FEATURE_NAMES`], or a tree is invalid.
    pub fn from_json_str(s: &str) -> Result<Self, ModelError> {
        let dump: ModelDump = serde_json::from_str(s)?;

        if dump.num_class != 1 || dump.num_tree_per_iteration != 1 {
            return Err(ModelError::UnsupportedObjective(format!(
                "{} ({} classes)",
                dump.objective, dump.num_class
            )));
        }
        let link = Link::parse(&dump.objective)?;

        if dump.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES) {
            return Err(ModelError::SchemaMismatch {
                expected: FEATURE_NAMES.iter().map(ToString::to_string).collect(),
                found: dump.feature_names,
            });
        }

        let trees = dump
            .tree_info
            .into_iter()
            .map(|t| Tree::compile(t.tree_structure))
            .collect::<Result<Vec<_>, _>>()?;
        if trees.is_empty() {
            return Err(invalid("model has no trees".to_string()));
        }

        Ok(Self {
            objective: dump.objective,
            link,
            average_output: dump.average_output,
            feature_names: dump.feature_names,
            trees,
        })
    }

    /// Objective string from the dump, e.g. `"binary sigmoid:1"`.
    #[must_use]
    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// Number of trees in the ensemble.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Feature names in input order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Sum of the tree outputs before the link function.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn raw_score(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.evaluate(features)).sum();
        if self.average_output {
            sum / self.trees.len() as f64
        } else {
            sum
        }
    }
}

impl SurgeClassifier for GbdtModel {
    fn predict_proba(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.link.apply(self.raw_score(features))
    }

    fn describe(&self) -> String {
        format!(
            "LightGBM ensemble ({}, {} trees)",
            self.objective,
            self.trees.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn dump(objective: &str, trees: &[serde_json::Value]) -> String {
        json!({
            "name": "tree",
            "version": "v4",
            "num_class": 1,
            "num_tree_per_iteration": 1,
            "max_feature_idx": 7,
            "objective": objective,
            "average_output": false,
            "feature_names": FEATURE_NAMES,
            "tree_info": trees
                .iter()
                .enumerate()
                .map(|(i, t)| json!({ "tree_index": i, "shrinkage": 1, "tree_structure": t }))
                .collect::<Vec<_>>(),
        })
        .to_string()
    }

    /// Splits on `is_rush_hour` (feature 7): +2.0 in rush hour, -1.0 otherwise.
    fn rush_tree() -> serde_json::Value {
        json!({
            "split_index": 0,
            "split_feature": 7,
            "threshold": 0.5,
            "decision_type": "<=",
            "default_left": true,
            "missing_type": "None",
            "left_child": { "leaf_index": 0, "leaf_value": -1.0 },
            "right_child": { "leaf_index": 1, "leaf_value": 2.0 }
        })
    }

    /// Categorical split on `dayofweek` (feature 5): weekend days left.
    fn weekend_tree() -> serde_json::Value {
        json!({
            "split_feature": 5,
            "threshold": "5||6",
            "decision_type": "==",
            "default_left": false,
            "missing_type": "None",
            "left_child": { "leaf_value": 0.5 },
            "right_child": { "leaf_value": -0.5 }
        })
    }

    fn sigmoid(x: f64) -> f64 {
        1.0 / (1.0 + (-x).exp())
    }

    fn row(dayofweek: f64, rush: f64) -> [f64; FEATURE_COUNT] {
        [0.0, 0.0, 0.0, 0.0, 8.0, dayofweek, 0.0, rush]
    }

    #[test]
    fn numerical_split_and_sigmoid() {
        let model = GbdtModel::from_json_str(&dump("binary sigmoid:1", &[rush_tree()])).unwrap();
        assert!((model.predict_proba(&row(0.0, 1.0)) - sigmoid(2.0)).abs() < 1e-12);
        assert!((model.predict_proba(&row(0.0, 0.0)) - sigmoid(-1.0)).abs() < 1e-12);
    }

    #[test]
    fn trees_are_summed() {
        let model = GbdtModel::from_json_str(&dump(
            "binary sigmoid:1",
            &[rush_tree(), weekend_tree()],
        ))
        .unwrap();
        assert_eq!(model.tree_count(), 2);
        assert!((model.raw_score(&row(5.0, 1.0)) - 2.5).abs() < 1e-12);
        assert!((model.raw_score(&row(2.0, 1.0)) - 1.5).abs() < 1e-12);
        assert!((model.raw_score(&row(6.0, 0.0)) - -0.5).abs() < 1e-12);
    }

    #[test]
    fn sigmoid_scale_is_applied() {
        let model = GbdtModel::from_json_str(&dump("binary sigmoid:2", &[rush_tree()])).unwrap();
        assert!((model.predict_proba(&row(0.0, 1.0)) - sigmoid(4.0)).abs() < 1e-12);
    }

    #[test]
    fn cross_entropy_objective() {
        let model = GbdtModel::from_json_str(&dump("cross_entropy", &[rush_tree()])).unwrap();
        assert!((model.predict_proba(&row(0.0, 0.0)) - sigmoid(-1.0)).abs() < 1e-12);
    }

    #[test]
    fn single_leaf_tree() {
        let model = GbdtModel::from_json_str(&dump(
            "binary sigmoid:1",
            &[json!({ "leaf_value": 0.0 })],
        ))
        .unwrap();
        assert!((model.predict_proba(&row(0.0, 0.0)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_missing_type_follows_default_direction() {
        let tree = json!({
            "split_feature": 0,
            "threshold": -5.0,
            "decision_type": "<=",
            "default_left": true,
            "missing_type": "Zero",
            "left_child": { "leaf_value": 1.0 },
            "right_child": { "leaf_value": -1.0 }
        });
        let model = GbdtModel::from_json_str(&dump("binary sigmoid:1", &[tree])).unwrap();
        let mut features = row(0.0, 0.0);
        assert!((model.raw_score(&features) - 1.0).abs() < 1e-12);
        features[0] = 3.0;
        assert!((model.raw_score(&features) - -1.0).abs() < 1e-12);
    }

    #[test]
    fn nan_missing_type() {
        let tree = json!({
            "split_feature": 3,
            "threshold": 10.0,
            "decision_type": "<=",
            "default_left": false,
            "missing_type": "NaN",
            "left_child": { "leaf_value": 1.0 },
            "right_child": { "leaf_value": -1.0 }
        });
        let model = GbdtModel::from_json_str(&dump("binary sigmoid:1", &[tree])).unwrap();
        let mut features = row(0.0, 0.0);
        features[3] = f64::NAN;
        assert!((model.raw_score(&features) - -1.0).abs() < 1e-12);
        features[3] = 5.0;
        assert!((model.raw_score(&features) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn average_output() {
        let mut value: serde_json::Value = serde_json::from_str(&dump(
            "binary sigmoid:1",
            &[rush_tree(), weekend_tree()],
        ))
        .unwrap();
        value["average_output"] = json!(true);
        let model = GbdtModel::from_json_str(&value.to_string()).unwrap();
        assert!((model.raw_score(&row(5.0, 1.0)) - 1.25).abs() < 1e-12);
    }

    #[test]
    fn rejects_feature_schema_mismatch() {
        let mut value: serde_json::Value =
            serde_json::from_str(&dump("binary sigmoid:1", &[rush_tree()])).unwrap();
        value["feature_names"][4] = json!("hour_of_day");
        let err = GbdtModel::from_json_str(&value.to_string()).unwrap_err();
        let ModelError::SchemaMismatch { found, .. } = err else {
            panic!("expected schema mismatch, got {err}");
        };
        assert_eq!(found[4], "hour_of_day");
    }

    #[test]
    fn rejects_reordered_features() {
        let mut names: Vec<&str> = FEATURE_NAMES.to_vec();
        names.swap(0, 1);
        let mut value: serde_json::Value =
            serde_json::from_str(&dump("binary sigmoid:1", &[rush_tree()])).unwrap();
        value["feature_names"] = json!(names);
        assert!(matches!(
            GbdtModel::from_json_str(&value.to_string()),
            Err(ModelError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn rejects_unsupported_objectives() {
        for objective in ["regression", "multiclass num_class:3", "lambdarank"] {
            assert!(
                matches!(
                    GbdtModel::from_json_str(&dump(objective, &[rush_tree()])),
                    Err(ModelError::UnsupportedObjective(_))
                ),
                "{objective}"
            );
        }
    }

    #[test]
    fn rejects_out_of_range_split_feature() {
        let mut tree = rush_tree();
        tree["split_feature"] = json!(8);
        assert!(matches!(
            GbdtModel::from_json_str(&dump("binary sigmoid:1", &[tree])),
            Err(ModelError::InvalidTree { .. })
        ));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            GbdtModel::from_json_str("{ not json"),
            Err(ModelError::Json(_))
        ));
    }

    #[test]
    fn rejects_empty_ensemble() {
        assert!(matches!(
            GbdtModel::from_json_str(&dump("binary sigmoid:1", &[])),
            Err(ModelError::InvalidTree { .. })
        ));
    }
}
