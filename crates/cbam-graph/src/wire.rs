//! JSON wire records exchanged with the flow-storage service
//!
//! Nodes travel as `{id, type, position:{x,y}, data:{...}, draggable, selectable, deletable}`
//! and streams as `{id, source, target, sourceHandle, targetHandle, type, data}`.
//! `type` and `data` stay untyped here so one unreadable record never fails a
//! whole flow; the typed conversion happens per record during hydration.
//! Conversions in both directions are lossless for records produced by this crate;
//! unknown `data` keys are kept in each payload's `extra` map.

use crate::types::{
    AnnotationData, Edge, EdgeId, GroupData, Handle, Node, NodeData, NodeId, NodeKind, Position,
    ProcessData, ProductData, StreamData, DEFAULT_EDGE_TYPE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn yes() -> bool {
    true
}

fn default_edge_type() -> String {
    DEFAULT_EDGE_TYPE.to_string()
}

/// Persisted node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub data: Value,
    #[serde(default = "yes")]
    pub draggable: bool,
    #[serde(default = "yes")]
    pub selectable: bool,
    #[serde(default = "yes")]
    pub deletable: bool,
}

/// Persisted stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeRecord {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
    #[serde(rename = "type", default = "default_edge_type")]
    pub edge_type: String,
    #[serde(default)]
    pub data: Value,
}

/// Absent data decodes as an empty object so payload defaults apply
fn object_or_empty(data: Value) -> Value {
    match data {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    }
}

impl TryFrom<&Node> for NodeRecord {
    type Error = serde_json::Error;

    fn try_from(node: &Node) -> Result<Self, Self::Error> {
        let data = match &node.data {
            NodeData::Product(p) => serde_json::to_value(p)?,
            NodeData::Process(p) => serde_json::to_value(p)?,
            NodeData::Group(g) => serde_json::to_value(g)?,
            NodeData::Annotation(a) => serde_json::to_value(a)?,
        };
        Ok(Self {
            id: node.id.0.clone(),
            kind: node.kind().as_str().to_string(),
            position: node.position,
            data,
            draggable: node.draggable,
            selectable: node.selectable,
            deletable: node.deletable,
        })
    }
}

/// Why a node record could not become a [`Node`]
#[derive(Debug, thiserror::Error)]
pub enum NodeRecordError {
    #[error("unknown node type {0:?}")]
    UnknownKind(String),
    #[error("invalid node data: {0}")]
    Data(#[from] serde_json::Error),
}

impl TryFrom<NodeRecord> for Node {
    type Error = NodeRecordError;

    fn try_from(record: NodeRecord) -> Result<Self, Self::Error> {
        let kind: NodeKind = record
            .kind
            .parse()
            .map_err(|()| NodeRecordError::UnknownKind(record.kind.clone()))?;
        let raw = object_or_empty(record.data);
        let data = match kind {
            NodeKind::Product => NodeData::Product(serde_json::from_value::<ProductData>(raw)?),
            NodeKind::Process => NodeData::Process(serde_json::from_value::<ProcessData>(raw)?),
            NodeKind::Group => NodeData::Group(serde_json::from_value::<GroupData>(raw)?),
            NodeKind::Annotation => {
                NodeData::Annotation(serde_json::from_value::<AnnotationData>(raw)?)
            }
        };
        Ok(Self {
            id: NodeId(record.id),
            position: record.position,
            data,
            draggable: record.draggable,
            selectable: record.selectable,
            deletable: record.deletable,
        })
    }
}

impl TryFrom<&Edge> for EdgeRecord {
    type Error = serde_json::Error;

    fn try_from(edge: &Edge) -> Result<Self, Self::Error> {
        Ok(Self {
            id: edge.id.0.clone(),
            source: edge.source.0.clone(),
            target: edge.target.0.clone(),
            source_handle: Some(edge.source_handle.to_string()),
            target_handle: Some(edge.target_handle.to_string()),
            edge_type: edge.edge_type.clone(),
            data: serde_json::to_value(&edge.stream)?,
        })
    }
}

/// Why an edge record could not become an [`Edge`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EdgeRecordError {
    #[error("missing {0} handle")]
    MissingHandle(&'static str),
    #[error("malformed {end} handle {handle:?}")]
    MalformedHandle { end: &'static str, handle: String },
    #[error("invalid stream data: {0}")]
    Data(String),
}

impl TryFrom<EdgeRecord> for Edge {
    type Error = EdgeRecordError;

    fn try_from(record: EdgeRecord) -> Result<Self, Self::Error> {
        let source_handle = parse_handle(record.source_handle, "source")?;
        let target_handle = parse_handle(record.target_handle, "target")?;
        let stream = serde_json::from_value::<StreamData>(object_or_empty(record.data))
            .map_err(|e| EdgeRecordError::Data(e.to_string()))?;
        Ok(Self {
            id: EdgeId(record.id),
            source: NodeId(record.source),
            target: NodeId(record.target),
            source_handle,
            target_handle,
            edge_type: record.edge_type,
            stream,
        })
    }
}

fn parse_handle(raw: Option<String>, end: &'static str) -> Result<Handle, EdgeRecordError> {
    let raw = raw.ok_or(EdgeRecordError::MissingHandle(end))?;
    Handle::parse(&raw).ok_or(EdgeRecordError::MalformedHandle { end, handle: raw })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundaryKind, CbamMetrics, Side, StreamKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn process_node_wire_shape() {
        let node = Node::process("p1", "Sintering")
            .at(10.0, 20.0)
            .with_metrics(CbamMetrics {
                carbon_intensity: Some(1.5),
                material_flow: None,
                energy_consumption: Some(3.0),
            });
        let record = NodeRecord::try_from(&node).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "p1",
                "type": "process",
                "position": {"x": 10.0, "y": 20.0},
                "data": {"name": "Sintering", "carbonIntensity": 1.5, "energyConsumption": 3.0},
                "draggable": true,
                "selectable": true,
                "deletable": true
            })
        );
    }

    #[test]
    fn unknown_data_keys_survive_round_trip() {
        let record: NodeRecord = serde_json::from_value(json!({
            "id": "p1",
            "type": "process",
            "position": {"x": 0, "y": 0},
            "data": {"name": "Kiln", "color": "#ff0000", "materialFlow": 4}
        }))
        .unwrap();
        let node = Node::try_from(record.clone()).unwrap();
        assert_eq!(node.data.metrics().unwrap().material_flow, Some(4.0));
        let back = NodeRecord::try_from(&node).unwrap();
        assert_eq!(back.data["color"], json!("#ff0000"));
        assert_eq!(back.data["name"], json!("Kiln"));
    }

    #[test]
    fn group_node_round_trip() {
        let node = Node::group(
            "g1",
            "Hot end",
            [NodeId::new("a"), NodeId::new("b")],
            BoundaryKind::Output,
        );
        let record = NodeRecord::try_from(&node).unwrap();
        assert_eq!(record.data["members"], json!(["a", "b"]));
        assert_eq!(record.data["boundaryKind"], json!("output"));
        assert_eq!(Node::try_from(record).unwrap(), node);
    }

    #[test]
    fn edge_record_round_trip() {
        let edge = Edge {
            id: EdgeId::new("e1"),
            source: NodeId::new("a"),
            target: NodeId::new("b"),
            source_handle: Handle::new("a", Side::Right),
            target_handle: Handle::new("b", Side::Left),
            edge_type: "smoothstep".to_string(),
            stream: StreamData {
                carbon_intensity: Some(0.4),
                ..StreamData::new(StreamKind::Energy, 12.5, "MWh")
            },
        };
        let record = EdgeRecord::try_from(&edge).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["sourceHandle"], json!("a-right"));
        assert_eq!(value["data"]["streamKind"], json!("energy"));
        assert_eq!(value["data"]["flowRate"], json!(12.5));
        let parsed: EdgeRecord = serde_json::from_value(value).unwrap();
        assert_eq!(Edge::try_from(parsed).unwrap(), edge);
    }

    #[test]
    fn edge_record_without_handle_is_rejected() {
        let record: EdgeRecord = serde_json::from_value(json!({
            "id": "e1", "source": "a", "target": "b", "targetHandle": "b-left"
        }))
        .unwrap();
        assert_eq!(
            Edge::try_from(record),
            Err(EdgeRecordError::MissingHandle("source"))
        );
    }

    #[test]
    fn unknown_node_type_is_a_record_error() {
        let record: NodeRecord = serde_json::from_value(json!({
            "id": "c", "type": "custom", "data": {"name": "C"}
        }))
        .unwrap();
        assert!(matches!(
            Node::try_from(record),
            Err(NodeRecordError::UnknownKind(kind)) if kind == "custom"
        ));
    }

    #[test]
    fn process_without_name_keeps_label() {
        let record: NodeRecord = serde_json::from_value(json!({
            "id": "q", "type": "process", "data": {"label": "Kiln"}
        }))
        .unwrap();
        let node = Node::try_from(record).unwrap();
        assert_eq!(node.data.label(), "");
        let back = NodeRecord::try_from(&node).unwrap();
        assert_eq!(back.data["label"], json!("Kiln"));
    }

    #[test]
    fn unknown_stream_kind_is_a_record_error() {
        let record: EdgeRecord = serde_json::from_value(json!({
            "id": "e1", "source": "a", "target": "b",
            "sourceHandle": "a-right", "targetHandle": "b-left",
            "data": {"streamKind": "steam", "flowRate": 1}
        }))
        .unwrap();
        assert!(matches!(Edge::try_from(record), Err(EdgeRecordError::Data(_))));
    }
}
