//! Building and evaluating exported policy graphs
//!
//! [`GraphBuilder`] emits ONNX nodes in topological order while a policy is
//! traced. [`PortableGraph`] wraps a decoded model, reports its input/output
//! contract and runs it through the tract ONNX runtime, so an export can be
//! checked against the network that produced it.

use std::error::Error;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use prost::Message;
use tract_onnx::prelude::{TractError, TractResult};

use super::onnx::{
    self, AttributeProto, BATCH_DIM, ELEM_FLOAT, GraphProto, INPUT_NAME, ModelProto, NodeProto,
    OUTPUT_NAME, OperatorSetIdProto, StringStringEntryProto, TensorProto, tensor_shape_proto,
    tensor_value_info, type_proto,
};
use crate::schema::{ACTION_SIZE, Action, OBS_SIZE};

#[derive(Debug)]
pub enum GraphError {
    Decode(prost::DecodeError),
    Io(std::io::Error),
    MissingGraph,
    /// Load or evaluation failure inside the ONNX runtime
    Runtime(TractError),
    /// A value the graph was expected to produce
    MissingValue(String),
    Shape(String),
    Contract(String),
}

impl fmt::Display for GraphError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GraphError::Decode(e) => write!(formatter, "Invalid ONNX protobuf: {}", e),
            GraphError::Io(e) => write!(formatter, "I/O error: {}", e),
            GraphError::MissingGraph => write!(formatter, "Model has no graph"),
            GraphError::Runtime(e) => write!(formatter, "ONNX runtime error: {:#}", e),
            GraphError::MissingValue(name) => write!(formatter, "Missing value '{}'", name),
            GraphError::Shape(message) => write!(formatter, "Shape error: {}", message),
            GraphError::Contract(message) => write!(formatter, "Contract violation: {}", message),
        }
    }
}

impl Error for GraphError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GraphError::Decode(e) => Some(e),
            GraphError::Io(e) => Some(e),
            GraphError::Runtime(e) => Some(&**e),
            _ => None,
        }
    }
}

/// Appends nodes and initializers with unique value names
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<NodeProto>,
    initializers: Vec<TensorProto>,
    counter: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&mut self, hint: &str) -> String {
        self.counter += 1;
        format!("{}_{}", hint, self.counter)
    }

    /// Add a constant float tensor, returning its value name
    pub fn initializer(&mut self, hint: &str, dims: &[usize], values: &[f32]) -> String {
        let name = self.fresh(hint);
        self.initializers.push(TensorProto::from_f32(&name, dims, values));
        name
    }

    /// Add a single-output node, returning the output value name
    pub fn node(&mut self, op_type: &str, inputs: &[&str], attribute: Vec<AttributeProto>) -> String {
        let output = self.fresh(&op_type.to_ascii_lowercase());
        self.nodes.push(NodeProto {
            input: inputs.iter().map(|s| s.to_string()).collect(),
            output: vec![output.clone()],
            name: format!("{}_node", output),
            op_type: op_type.to_string(),
            attribute,
            ..Default::default()
        });
        output
    }

    /// Close the graph with `output` exposed as the `action` output
    pub fn finish(
        mut self,
        output: &str,
        opset: i64,
        metadata: &[(&str, String)],
    ) -> Result<ModelProto, GraphError> {
        let ir_version = onnx::ir_version_for_opset(opset)
            .ok_or_else(|| GraphError::Contract(format!("opset {} is not supported", opset)))?;

        if output == INPUT_NAME {
            self.node("Identity", &[INPUT_NAME], Vec::new());
        }
        let last = self
            .nodes
            .last_mut()
            .ok_or_else(|| GraphError::MissingValue(output.to_string()))?;
        if output != INPUT_NAME && last.output.first().map(String::as_str) != Some(output) {
            return Err(GraphError::Contract(format!(
                "'{}' is not produced by the last node",
                output
            )));
        }
        last.output = vec![OUTPUT_NAME.to_string()];

        let graph = GraphProto {
            name: "policy".to_string(),
            node: self.nodes,
            initializer: self.initializers,
            input: vec![tensor_value_info(INPUT_NAME, &[None, Some(OBS_SIZE)])],
            output: vec![tensor_value_info(OUTPUT_NAME, &[None, Some(ACTION_SIZE)])],
            ..Default::default()
        };

        Ok(ModelProto {
            ir_version,
            producer_name: env!("CARGO_PKG_NAME").to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            model_version: 1,
            graph: Some(graph),
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: opset,
            }],
            metadata_props: metadata
                .iter()
                .map(|(key, value)| StringStringEntryProto {
                    key: key.to_string(),
                    value: value.clone(),
                })
                .collect(),
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
    Fixed(usize),
    Dynamic(String),
}

/// Name, element type and shape of a graph input or output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorContract {
    pub name: String,
    pub elem_type: i32,
    pub dims: Vec<Dim>,
}

impl TensorContract {
    fn expect(&self, name: &str, width: usize) -> Result<(), GraphError> {
        let ok = self.name == name
            && self.elem_type == ELEM_FLOAT
            && matches!(self.dims.as_slice(), [Dim::Dynamic(_), Dim::Fixed(w)] if *w == width);
        if ok {
            Ok(())
        } else {
            Err(GraphError::Contract(format!(
                "expected '{}' float [{}, {}], found {:?}",
                name, BATCH_DIM, width, self
            )))
        }
    }
}

/// Decoded ONNX model with a graph
#[derive(Debug, Clone)]
pub struct PortableGraph {
    model: ModelProto,
}

impl PortableGraph {
    pub fn from_model(model: ModelProto) -> Result<Self, GraphError> {
        let graph = model.graph.as_ref().ok_or(GraphError::MissingGraph)?;
        if let Some(init) = graph.initializer.iter().find(|t| t.dims.iter().any(|&d| d < 0)) {
            return Err(GraphError::Shape(format!(
                "initializer '{}' has negative dims {:?}",
                init.name, init.dims
            )));
        }
        Ok(Self { model })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, GraphError> {
        Self::from_model(ModelProto::decode(bytes).map_err(GraphError::Decode)?)
    }

    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let bytes = std::fs::read(path).map_err(GraphError::Io)?;
        Self::decode(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.model.encode_to_vec()
    }

    pub fn model(&self) -> &ModelProto {
        &self.model
    }

    fn graph(&self) -> &GraphProto {
        static EMPTY: LazyLock<GraphProto> = LazyLock::new(GraphProto::default);
        self.model.graph.as_ref().unwrap_or(&EMPTY)
    }

    /// Default-domain opset version
    pub fn opset(&self) -> Option<i64> {
        self.model
            .opset_import
            .iter()
            .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
            .map(|o| o.version)
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.model
            .metadata_props
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.value.as_str())
    }

    pub fn inputs(&self) -> Vec<TensorContract> {
        self.graph().input.iter().map(contract).collect()
    }

    pub fn outputs(&self) -> Vec<TensorContract> {
        self.graph().output.iter().map(contract).collect()
    }

    /// Exactly one float input `obs [batch, OBS_SIZE]` and one float output
    /// `action [batch, ACTION_SIZE]`
    pub fn check_contract(&self) -> Result<(), GraphError> {
        match (self.inputs().as_slice(), self.outputs().as_slice()) {
            ([input], [output]) => {
                input.expect(INPUT_NAME, OBS_SIZE)?;
                output.expect(OUTPUT_NAME, ACTION_SIZE)
            }
            (inputs, outputs) => Err(GraphError::Contract(format!(
                "expected one input and one output, found {} and {}",
                inputs.len(),
                outputs.len()
            ))),
        }
    }

    /// Evaluate on a row-major `[batch, OBS_SIZE]` buffer with the tract
    /// ONNX runtime
    pub fn run(&self, obs: &[f32], batch: usize) -> Result<Vec<f32>, GraphError> {
        if obs.len() != batch * OBS_SIZE {
            return Err(GraphError::Shape(format!(
                "input has {} values, expected {} x {}",
                obs.len(),
                batch,
                OBS_SIZE
            )));
        }

        let (shape, values) = run_tract(&self.model, obs, batch).map_err(GraphError::Runtime)?;
        if shape != [batch, ACTION_SIZE] {
            return Err(GraphError::Shape(format!(
                "output shape {:?}, expected [{}, {}]",
                shape, batch, ACTION_SIZE
            )));
        }
        Ok(values)
    }

    /// One observation in, one action out. Shorter inputs are zero padded
    /// and longer ones truncated to `OBS_SIZE`.
    pub fn infer(&self, obs: &[f32]) -> Result<Action, GraphError> {
        let mut input = [0.0f32; OBS_SIZE];
        let n = obs.len().min(OBS_SIZE);
        input[..n].copy_from_slice(&obs[..n]);

        let output = self.run(&input, 1)?;
        let mut action = [0.0f32; ACTION_SIZE];
        action.copy_from_slice(&output);
        Ok(action)
    }
}

/// Load, optimize and run `model`, returning the first output's shape and values
fn run_tract(model: &ModelProto, obs: &[f32], batch: usize) -> TractResult<(Vec<usize>, Vec<f32>)> {
    use tract_onnx::prelude::*;

    let bytes = model.encode_to_vec();
    let plan = tract_onnx::onnx()
        .model_for_read(&mut bytes.as_slice())?
        .into_optimized()?
        .into_runnable()?;

    let input = Tensor::from_shape(&[batch, OBS_SIZE], obs)?;
    let outputs = plan.run(tvec!(input.into()))?;
    let output = outputs
        .first()
        .ok_or_else(|| TractError::msg("graph produced no outputs"))?;
    let values = output.to_array_view::<f32>()?.iter().copied().collect();
    Ok((output.shape().to_vec(), values))
}

fn contract(info: &onnx::ValueInfoProto) -> TensorContract {
    use tensor_shape_proto::dimension::Value;

    let (elem_type, dims) = match info.r#type.as_ref().and_then(|t| t.value.as_ref()) {
        Some(type_proto::Value::TensorType(tensor)) => {
            let dims = tensor
                .shape
                .iter()
                .flat_map(|shape| shape.dim.iter())
                .map(|d| match &d.value {
                    Some(Value::DimValue(v)) if *v >= 0 => Dim::Fixed(*v as usize),
                    Some(Value::DimParam(p)) => Dim::Dynamic(p.clone()),
                    _ => Dim::Dynamic(String::new()),
                })
                .collect();
            (tensor.elem_type, dims)
        }
        None => (0, Vec::new()),
    };

    TensorContract {
        name: info.name.clone(),
        elem_type,
        dims,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `action = relu(obs * 2 - 1)` restricted to the first ACTION_SIZE columns
    fn sample_graph() -> PortableGraph {
        let mut builder = GraphBuilder::new();
        let mut weight = vec![0.0f32; OBS_SIZE * ACTION_SIZE];
        for i in 0..ACTION_SIZE {
            weight[i * ACTION_SIZE + i] = 2.0;
        }
        let w = builder.initializer("w", &[OBS_SIZE, ACTION_SIZE], &weight);
        let b = builder.initializer("b", &[ACTION_SIZE], &[-1.0; ACTION_SIZE]);
        let x = builder.node("Gemm", &[INPUT_NAME, &w, &b], Vec::new());
        let y = builder.node("Relu", &[&x], Vec::new());
        let model = builder
            .finish(&y, 14, &[("algorithm", "PPO".to_string())])
            .unwrap();
        PortableGraph::from_model(model).unwrap()
    }

    #[test]
    fn test_contract() {
        let graph = sample_graph();
        graph.check_contract().unwrap();
        assert_eq!(
            graph.inputs()[0].dims,
            vec![Dim::Dynamic(BATCH_DIM.to_string()), Dim::Fixed(OBS_SIZE)]
        );
        assert_eq!(graph.opset(), Some(14));
        assert_eq!(graph.model().ir_version, 7);
        assert_eq!(graph.metadata("algorithm"), Some("PPO"));
    }

    #[test]
    fn test_run_batch() {
        let graph = sample_graph();
        let mut obs = vec![0.0f32; 2 * OBS_SIZE];
        obs[0] = 1.0;
        obs[OBS_SIZE + 1] = 3.0;
        let out = graph.run(&obs, 2).unwrap();
        assert_eq!(out.len(), 2 * ACTION_SIZE);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 0.0);
        assert_eq!(out[ACTION_SIZE + 1], 5.0);
    }

    #[test]
    fn test_run_rejects_wrong_input_length() {
        let graph = sample_graph();
        assert!(matches!(
            graph.run(&[0.0; OBS_SIZE + 1], 1),
            Err(GraphError::Shape(_))
        ));
    }

    #[test]
    fn test_decode_round_trip_preserves_outputs() {
        let graph = sample_graph();
        let decoded = PortableGraph::decode(&graph.to_bytes()).unwrap();
        let obs = [0.75f32; OBS_SIZE];
        assert_eq!(graph.run(&obs, 1).unwrap(), decoded.run(&obs, 1).unwrap());
    }

    #[test]
    fn test_infer_pads_and_truncates() {
        let graph = sample_graph();
        let short = graph.infer(&[1.0, 1.0]).unwrap();
        assert_eq!(short[0], 1.0);
        assert_eq!(short[2], 0.0);

        let long = graph.infer(&[1.0; OBS_SIZE + 10]).unwrap();
        assert_eq!(long, [1.0; ACTION_SIZE]);
    }

    #[test]
    fn test_negative_initializer_dims_are_rejected() {
        let mut model = sample_graph().model().clone();
        if let Some(graph) = model.graph.as_mut() {
            graph.initializer[0].dims = vec![-1, ACTION_SIZE as i64];
        }
        let bytes = model.encode_to_vec();
        assert!(matches!(PortableGraph::decode(&bytes), Err(GraphError::Shape(_))));
    }

    #[test]
    fn test_bad_bytes_and_missing_graph() {
        assert!(matches!(
            PortableGraph::decode(b"\xff\xff\xff"),
            Err(GraphError::Decode(_))
        ));
        assert!(matches!(
            PortableGraph::from_model(ModelProto::default()),
            Err(GraphError::MissingGraph)
        ));
    }

    #[test]
    fn test_finish_rejects_unknown_opset() {
        let mut builder = GraphBuilder::new();
        let x = builder.node("Relu", &[INPUT_NAME], Vec::new());
        assert!(builder.finish(&x, 3, &[]).is_err());
    }
}
