// coordnet/src/graphml.rs
//
// GraphML reading and writing.
//
// A deliberately small document model: attribute values travel as strings,
// `<key>` declarations carry the declared attr.type so files round-trip.
// The reader accepts our own output and networkx-style GraphML generally
// (unknown attr.types fall back to string; graph-scoped keys are ignored).

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphMlError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("malformed graphml: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    Double,
    Str,
}

impl AttrType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Double => "double",
            Self::Str => "string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDomain {
    Node,
    Edge,
}

impl KeyDomain {
    fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Edge => "edge",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyDecl {
    pub id: String,
    pub name: String,
    pub domain: KeyDomain,
    pub ty: AttrType,
}

#[derive(Debug, Clone, Default)]
pub struct GraphNode {
    pub id: String,
    pub attrs: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub attrs: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct GraphDoc {
    pub keys: Vec<KeyDecl>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl GraphDoc {
    pub fn declare_key(&mut self, name: &str, domain: KeyDomain, ty: AttrType) {
        let id = format!("d{}", self.keys.len());
        self.keys.push(KeyDecl { id, name: name.to_string(), domain, ty });
    }

    pub fn add_node(&mut self, id: &str, attrs: HashMap<String, String>) {
        self.nodes.push(GraphNode { id: id.to_string(), attrs });
    }

    pub fn add_edge(&mut self, source: &str, target: &str, attrs: HashMap<String, String>) {
        self.edges.push(GraphEdge {
            source: source.to_string(),
            target: target.to_string(),
            attrs,
        });
    }

    /// Typed access to an edge's weight attribute.
    pub fn edge_weight(&self, edge: &GraphEdge, weight_attr: &str) -> Option<f64> {
        edge.attrs.get(weight_attr)?.parse().ok()
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

pub fn write_file(doc: &GraphDoc, path: &Path) -> Result<(), GraphMlError> {
    let file = File::create(path)?;
    let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut graphml = BytesStart::new("graphml");
    graphml.push_attribute(("xmlns", "http://graphml.graphdrawing.org/xmlns"));
    writer.write_event(Event::Start(graphml))?;

    for key in &doc.keys {
        let mut k = BytesStart::new("key");
        k.push_attribute(("id", key.id.as_str()));
        k.push_attribute(("for", key.domain.as_str()));
        k.push_attribute(("attr.name", key.name.as_str()));
        k.push_attribute(("attr.type", key.ty.as_str()));
        writer.write_event(Event::Empty(k))?;
    }

    let mut graph = BytesStart::new("graph");
    graph.push_attribute(("edgedefault", "undirected"));
    writer.write_event(Event::Start(graph))?;

    for node in &doc.nodes {
        let mut n = BytesStart::new("node");
        n.push_attribute(("id", node.id.as_str()));
        if node.attrs.is_empty() {
            writer.write_event(Event::Empty(n))?;
        } else {
            writer.write_event(Event::Start(n))?;
            write_data(&mut writer, doc, KeyDomain::Node, &node.attrs)?;
            writer.write_event(Event::End(BytesEnd::new("node")))?;
        }
    }

    for edge in &doc.edges {
        let mut e = BytesStart::new("edge");
        e.push_attribute(("source", edge.source.as_str()));
        e.push_attribute(("target", edge.target.as_str()));
        if edge.attrs.is_empty() {
            writer.write_event(Event::Empty(e))?;
        } else {
            writer.write_event(Event::Start(e))?;
            write_data(&mut writer, doc, KeyDomain::Edge, &edge.attrs)?;
            writer.write_event(Event::End(BytesEnd::new("edge")))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("graph")))?;
    writer.write_event(Event::End(BytesEnd::new("graphml")))?;
    writer.into_inner().flush()?;
    Ok(())
}

fn write_data<W: Write>(
    writer: &mut Writer<W>,
    doc: &GraphDoc,
    domain: KeyDomain,
    attrs: &HashMap<String, String>,
) -> Result<(), GraphMlError> {
    // emitted in key-declaration order, keeping output deterministic
    for key in doc.keys.iter().filter(|k| k.domain == domain) {
        if let Some(value) = attrs.get(&key.name) {
            let mut d = BytesStart::new("data");
            d.push_attribute(("key", key.id.as_str()));
            writer.write_event(Event::Start(d))?;
            writer.write_event(Event::Text(BytesText::new(value)))?;
            writer.write_event(Event::End(BytesEnd::new("data")))?;
        }
    }
    Ok(())
}

// ── Reader ────────────────────────────────────────────────────────────────────

pub fn read_file(path: &Path) -> Result<GraphDoc, GraphMlError> {
    let file = File::open(path)?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.trim_text(true);

    let mut doc = GraphDoc::default();
    let mut name_by_key_id: HashMap<String, String> = HashMap::new();

    let mut current_node: Option<GraphNode> = None;
    let mut current_edge: Option<GraphEdge> = None;
    let mut current_data_key: Option<String> = None;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"key" => {
                    if let Some(key) = parse_key(&e)? {
                        name_by_key_id.insert(key.id.clone(), key.name.clone());
                        doc.keys.push(key);
                    }
                }
                b"node" => {
                    let id = require_attr(&e, b"id", "node")?;
                    current_node = Some(GraphNode { id, attrs: HashMap::new() });
                }
                b"edge" => {
                    let source = require_attr(&e, b"source", "edge")?;
                    let target = require_attr(&e, b"target", "edge")?;
                    current_edge = Some(GraphEdge { source, target, attrs: HashMap::new() });
                }
                b"data" => {
                    current_data_key = Some(require_attr(&e, b"key", "data")?);
                }
                _ => {}
            },
            // self-closing elements carry no data children
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"key" => {
                    if let Some(key) = parse_key(&e)? {
                        name_by_key_id.insert(key.id.clone(), key.name.clone());
                        doc.keys.push(key);
                    }
                }
                b"node" => {
                    let id = require_attr(&e, b"id", "node")?;
                    doc.nodes.push(GraphNode { id, attrs: HashMap::new() });
                }
                b"edge" => {
                    let source = require_attr(&e, b"source", "edge")?;
                    let target = require_attr(&e, b"target", "edge")?;
                    doc.edges.push(GraphEdge { source, target, attrs: HashMap::new() });
                }
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if let Some(key_id) = &current_data_key {
                    if let Some(name) = name_by_key_id.get(key_id) {
                        let value = t
                            .unescape()
                            .map_err(|e| GraphMlError::Malformed(e.to_string()))?
                            .into_owned();
                        if let Some(node) = current_node.as_mut() {
                            node.attrs.insert(name.clone(), value);
                        } else if let Some(edge) = current_edge.as_mut() {
                            edge.attrs.insert(name.clone(), value);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"node" => {
                    if let Some(node) = current_node.take() {
                        doc.nodes.push(node);
                    }
                }
                b"edge" => {
                    if let Some(edge) = current_edge.take() {
                        doc.edges.push(edge);
                    }
                }
                b"data" => current_data_key = None,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(GraphMlError::Malformed(e.to_string())),
        }
        buf.clear();
    }

    Ok(doc)
}

fn parse_key(e: &BytesStart<'_>) -> Result<Option<KeyDecl>, GraphMlError> {
    let mut id = None;
    let mut name = None;
    let mut domain = None;
    let mut ty = AttrType::Str;

    for attr in e.attributes() {
        let attr = attr.map_err(|e| GraphMlError::Malformed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| GraphMlError::Malformed(e.to_string()))?
            .into_owned();
        match attr.key.as_ref() {
            b"id" => id = Some(value),
            b"attr.name" => name = Some(value),
            b"for" => {
                domain = match value.as_str() {
                    "node" => Some(KeyDomain::Node),
                    "edge" => Some(KeyDomain::Edge),
                    _ => None, // graph-scoped keys are not our concern
                }
            }
            b"attr.type" => {
                if matches!(value.as_str(), "double" | "float" | "long" | "int") {
                    ty = AttrType::Double;
                }
            }
            _ => {}
        }
    }

    match (id, name, domain) {
        (Some(id), Some(name), Some(domain)) => Ok(Some(KeyDecl { id, name, domain, ty })),
        (Some(_), Some(_), None) => Ok(None),
        _ => Err(GraphMlError::Malformed("key without id/attr.name".into())),
    }
}

fn require_attr(e: &BytesStart<'_>, name: &[u8], element: &str) -> Result<String, GraphMlError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| GraphMlError::Malformed(e.to_string()))?;
        if attr.key.as_ref() == name {
            return Ok(attr
                .unescape_value()
                .map_err(|e| GraphMlError::Malformed(e.to_string()))?
                .into_owned());
        }
    }
    Err(GraphMlError::Malformed(format!(
        "<{element}> missing {} attribute",
        String::from_utf8_lossy(name)
    )))
}
