//! Road network loaded from a JSON document on disk.
//!
//! ```json
//! {
//!   "nodes": [{"id": 1, "lat": 37.79, "lon": -122.39, "address": "160 Spear St"}],
//!   "edges": [{"from": 1, "to": 2, "length_m": 84.2}]
//! }
//! ```
//!
//! `length_m` is optional and defaults to the great-circle distance.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use super::{
    kitchen_point, GeoPoint, Geography, GeographyError, GeographyProvider, RoadNetwork,
    METERS_PER_MILE,
};
use crate::config::LocationConfig;

#[derive(Debug, Deserialize)]
struct NetworkDocument {
    nodes: Vec<NodeRecord>,
    #[serde(default)]
    edges: Vec<EdgeRecord>,
}

#[derive(Debug, Deserialize)]
struct NodeRecord {
    id: u64,
    lat: f64,
    lon: f64,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EdgeRecord {
    from: u64,
    to: u64,
    #[serde(default)]
    length_m: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FileGeography {
    path: PathBuf,
}

impl FileGeography {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

/// Parses a network document. `origin` names the source in errors.
pub fn parse_network(json: &str, origin: &str) -> Result<RoadNetwork, GeographyError> {
    let doc: NetworkDocument = serde_json::from_str(json).map_err(|err| GeographyError::Parse {
        origin: origin.to_string(),
        reason: err.to_string(),
    })?;

    let mut builder = RoadNetwork::builder();
    let mut index = HashMap::with_capacity(doc.nodes.len());
    for node in doc.nodes {
        let address = node.address.filter(|a| !a.trim().is_empty());
        let id = builder.add_node(GeoPoint::new(node.lat, node.lon), address);
        if index.insert(node.id, id).is_some() {
            return Err(GeographyError::Parse {
                origin: origin.to_string(),
                reason: format!("duplicate node id {}", node.id),
            });
        }
    }
    for edge in doc.edges {
        let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) else {
            return Err(GeographyError::Parse {
                origin: origin.to_string(),
                reason: format!("edge {} -> {} references an unknown node", edge.from, edge.to),
            });
        };
        builder.add_edge(from, to, edge.length_m);
    }
    Ok(builder.build())
}

impl GeographyProvider for FileGeography {
    fn load(&self, config: &LocationConfig) -> Result<Geography, GeographyError> {
        let json = fs::read_to_string(&self.path).map_err(|source| GeographyError::Io {
            path: self.path.clone(),
            source,
        })?;
        let network = parse_network(&json, &self.path.display().to_string())?;
        Geography::from_network(
            network,
            kitchen_point(config),
            config.radius_mi * METERS_PER_MILE,
            config.address_weight,
        )
    }
}
