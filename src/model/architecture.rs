use std::fmt;

use serde_json::Value;

use crate::error::Result;

use super::{layer_type::LayerSpec, tensor_desc::TensorDesc};

/// An ordered list of layers. Order is execution order, and it alone decides
/// how the flat parameter and running statistics lists are laid out.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ArchitectureDescriptor {
    pub layers: Vec<LayerSpec>,
}

impl ArchitectureDescriptor {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn add_layer(&mut self, layer: LayerSpec) {
        self.layers.push(layer);
    }

    pub fn add_layers(&mut self, layers: Vec<LayerSpec>) {
        for layer in layers.into_iter() {
            self.add_layer(layer);
        }
    }

    /// Parses a string-tagged descriptor. Every entry is validated before this
    /// returns, so a bad entry anywhere means nothing downstream is allocated.
    pub fn from_tagged<S: AsRef<str>>(entries: &[(S, Vec<Value>)]) -> Result<Self> {
        let layers = entries.iter()
            .enumerate()
            .map(|(index, (name, params))| LayerSpec::from_tagged(index, name.as_ref(), params))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { layers })
    }

    /// Parses a JSON array of `[name, [params...]]` pairs.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<(String, Vec<Value>)> = serde_json::from_str(json)?;
        Self::from_tagged(&entries)
    }

    pub fn to_tagged(&self) -> Vec<(String, Vec<Value>)> {
        self.layers.iter()
            .map(|layer| (layer.name().to_string(), layer.tagged_params()))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_tagged())?)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of tensors in the flat parameter list.
    pub fn parameter_list_len(&self) -> usize {
        self.layers.iter()
            .filter(|layer| layer.requires_parameters())
            .count() * 2
    }

    /// Number of tensors in the running statistics list.
    pub fn running_stats_len(&self) -> usize {
        self.layers.iter()
            .filter(|layer| layer.has_running_stats())
            .count() * 2
    }

    /// Shapes of every parameter list entry, in list order.
    pub fn parameter_shapes(&self) -> Vec<TensorDesc> {
        self.layers.iter()
            .filter_map(|layer| layer.parameter_shapes())
            .flat_map(|(w, b)| [w, b])
            .collect()
    }

    pub fn total_parameter_count(&self) -> usize {
        self.layers.iter()
            .map(|layer| layer.parameter_count())
            .sum()
    }
}

impl From<Vec<LayerSpec>> for ArchitectureDescriptor {
    fn from(layers: Vec<LayerSpec>) -> Self {
        Self { layers }
    }
}

impl fmt::Display for ArchitectureDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for layer in &self.layers {
            writeln!(f, "{}", layer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::error::LearnerError;

    use super::*;

    const SCENARIO: &str = r#"[
        ["conv2d", [32, 3, 3, 3, 1, 1]],
        ["bn", [32]],
        ["relu", [true]],
        ["flatten", []],
        ["linear", [10, 2048]]
    ]"#;

    #[test]
    fn json_descriptor_list_lengths() {
        let desc = ArchitectureDescriptor::from_json(SCENARIO).unwrap();

        assert_eq!(desc.len(), 5);
        assert_eq!(desc.parameter_list_len(), 6);
        assert_eq!(desc.running_stats_len(), 2);
        assert_eq!(
            desc.parameter_shapes().iter().map(|d| d.to_dims()).collect::<Vec<_>>(),
            vec![vec![32, 3, 3, 3], vec![32], vec![32], vec![32], vec![10, 2048], vec![10]]
        );
        assert_eq!(desc.total_parameter_count(), 32 * 27 + 32 + 64 + 10 * 2048 + 10);
    }

    #[test]
    fn unsupported_kind_fails_the_whole_descriptor() {
        let entries = vec![
            ("conv2d".to_string(), vec![json!(8), json!(1), json!(3), json!(3), json!(1), json!(0)]),
            ("bn".to_string(), vec![json!(8)]),
            ("softmax".to_string(), vec![]),
        ];

        match ArchitectureDescriptor::from_tagged(&entries) {
            Err(LearnerError::UnsupportedLayerKind { index, kind }) => {
                assert_eq!(index, 2);
                assert_eq!(kind, "softmax");
            }
            other => panic!("expected UnsupportedLayerKind, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_a_descriptor_error() {
        let err = ArchitectureDescriptor::from_json("[[\"relu\"").unwrap_err();
        assert!(matches!(err, LearnerError::Descriptor(_)));
    }

    #[test]
    fn json_output_parses_back() {
        let desc = ArchitectureDescriptor::from_json(SCENARIO).unwrap();
        let again = ArchitectureDescriptor::from_json(&desc.to_json().unwrap()).unwrap();
        assert_eq!(desc, again);
    }

    #[test]
    fn display_is_one_line_per_layer() {
        let desc = ArchitectureDescriptor::from_json(SCENARIO).unwrap();
        let summary = desc.to_string();

        assert_eq!(summary.lines().count(), 5);
        assert_eq!(
            summary.lines().next(),
            Some("conv2d:(ch_in:3, ch_out:32, k:3x3, stride:1, padding:1)")
        );
        assert_eq!(summary.lines().last(), Some("linear:(in:2048, out:10)"));
    }
}
