//! Delivery geography: a routable road network around the kitchen and the
//! catalog of delivery points customers are drawn from.
//!
//! A [`GeographyProvider`] turns a location config into a [`Geography`].
//! The network is loaded once per location and shared read-only behind an
//! `Arc`.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{GeographySource, LocationConfig};
use crate::weighting::WeightedTable;

pub mod file;
pub mod grid;
#[cfg(feature = "overpass")]
pub mod overpass;

pub const METERS_PER_MILE: f64 = 1_609.344;
const EARTH_RADIUS_M: f64 = 6_371_008.8;

pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Linear interpolation; adequate for the short segments of a street
    /// network.
    pub fn lerp(&self, other: &GeoPoint, t: f64) -> GeoPoint {
        GeoPoint {
            lat: self.lat + (other.lat - self.lat) * t,
            lon: self.lon + (other.lon - self.lon) * t,
        }
    }

    /// Point displaced by `north_m` / `east_m` metres.
    pub fn offset_m(&self, north_m: f64, east_m: f64) -> GeoPoint {
        let dlat = (north_m / EARTH_RADIUS_M).to_degrees();
        let dlon = (east_m / (EARTH_RADIUS_M * self.lat.to_radians().cos())).to_degrees();
        GeoPoint {
            lat: self.lat + dlat,
            lon: self.lon + dlon,
        }
    }
}

/// Great-circle distance in metres.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoadNode {
    pub point: GeoPoint,
    /// Street address when the node is a real delivery point.
    pub address: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoadEdge {
    pub to: NodeId,
    pub length_m: f64,
}

/// Undirected road graph with metre edge lengths.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    nodes: Vec<RoadNode>,
    adjacency: Vec<Vec<RoadEdge>>,
}

impl RoadNetwork {
    pub fn builder() -> RoadNetworkBuilder {
        RoadNetworkBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&RoadNode> {
        self.nodes.get(id)
    }

    pub fn point(&self, id: NodeId) -> Option<GeoPoint> {
        self.nodes.get(id).map(|n| n.point)
    }

    pub fn neighbors(&self, id: NodeId) -> &[RoadEdge] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    /// Closest node to `point` by great-circle distance.
    pub fn nearest_node(&self, point: GeoPoint) -> Option<(NodeId, f64)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(id, node)| (id, haversine_m(point, node.point)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Nodes reachable from `start` without leaving `allowed`.
    pub fn component_from(&self, start: NodeId, allowed: &[bool]) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        if start >= self.nodes.len() || !allowed.get(start).copied().unwrap_or(false) {
            return out;
        }
        seen[start] = true;
        queue.push_back(start);
        while let Some(id) = queue.pop_front() {
            out.push(id);
            for edge in self.neighbors(id) {
                if !seen[edge.to] && allowed.get(edge.to).copied().unwrap_or(false) {
                    seen[edge.to] = true;
                    queue.push_back(edge.to);
                }
            }
        }
        out.sort_unstable();
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoadNetworkBuilder {
    nodes: Vec<RoadNode>,
    adjacency: Vec<Vec<RoadEdge>>,
}

impl RoadNetworkBuilder {
    pub fn add_node(&mut self, point: GeoPoint, address: Option<String>) -> NodeId {
        self.nodes.push(RoadNode { point, address });
        self.adjacency.push(Vec::new());
        self.nodes.len() - 1
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_address(&mut self, id: NodeId, address: String) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.address = Some(address);
        }
    }

    pub fn has_address(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some_and(|n| n.address.is_some())
    }

    /// Undirected edge. When `length_m` is `None` the great-circle distance
    /// between the endpoints is used. Self-loops and unknown ids are ignored.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId, length_m: Option<f64>) {
        if a == b || a >= self.nodes.len() || b >= self.nodes.len() {
            return;
        }
        let length_m = length_m
            .filter(|l| l.is_finite() && *l >= 0.0)
            .unwrap_or_else(|| haversine_m(self.nodes[a].point, self.nodes[b].point));
        self.adjacency[a].push(RoadEdge { to: b, length_m });
        self.adjacency[b].push(RoadEdge { to: a, length_m });
    }

    pub fn build(self) -> RoadNetwork {
        RoadNetwork {
            nodes: self.nodes,
            adjacency: self.adjacency,
        }
    }
}

#[derive(Debug, Error)]
pub enum GeographyError {
    #[error("failed to read road network {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed road network {origin}: {reason}")]
    Parse { origin: String, reason: String },
    #[error("road network is empty")]
    EmptyNetwork,
    #[error("nearest road node is {distance_m:.0} m from the kitchen, outside the {radius_m:.0} m radius")]
    KitchenUnreachable { distance_m: f64, radius_m: f64 },
    #[error("no delivery points reachable from the kitchen")]
    EmptyComponent,
    #[error("failed to fetch road network: {0}")]
    Fetch(String),
}

/// Routable network plus the weighted set of delivery points.
#[derive(Debug, Clone)]
pub struct Geography {
    network: Arc<RoadNetwork>,
    kitchen_node: NodeId,
    kitchen: GeoPoint,
    delivery_nodes: Vec<NodeId>,
    weights: WeightedTable,
    /// Nodes a route may pass through, indexed by node id.
    routable: Arc<[bool]>,
}

impl Geography {
    /// Restricts `network` to nodes within `radius_m` of the kitchen that are
    /// connected to the kitchen's nearest node. Delivery points are that
    /// component minus the kitchen node itself.
    pub fn from_network(
        network: RoadNetwork,
        kitchen: GeoPoint,
        radius_m: f64,
        address_weight: f64,
    ) -> Result<Self, GeographyError> {
        let (kitchen_node, distance_m) = network
            .nearest_node(kitchen)
            .ok_or(GeographyError::EmptyNetwork)?;
        if distance_m > radius_m {
            return Err(GeographyError::KitchenUnreachable {
                distance_m,
                radius_m,
            });
        }
        let within: Vec<bool> = (0..network.len())
            .map(|id| {
                network
                    .point(id)
                    .is_some_and(|p| haversine_m(kitchen, p) <= radius_m)
            })
            .collect();
        let mut allowed = within;
        allowed[kitchen_node] = true;
        let delivery_nodes: Vec<NodeId> = network
            .component_from(kitchen_node, &allowed)
            .into_iter()
            .filter(|&id| id != kitchen_node)
            .collect();
        let mut routable = vec![false; network.len()];
        routable[kitchen_node] = true;
        for &id in &delivery_nodes {
            routable[id] = true;
        }
        let mut geography =
            Self::from_parts(Arc::new(network), kitchen_node, delivery_nodes, address_weight)?;
        geography.routable = routable.into();
        Ok(geography)
    }

    /// Builds a geography from an already-restricted delivery set. Routes may
    /// use the whole network.
    pub fn from_parts(
        network: Arc<RoadNetwork>,
        kitchen_node: NodeId,
        delivery_nodes: Vec<NodeId>,
        address_weight: f64,
    ) -> Result<Self, GeographyError> {
        let kitchen = network
            .point(kitchen_node)
            .ok_or(GeographyError::EmptyNetwork)?;
        if delivery_nodes.is_empty() {
            return Err(GeographyError::EmptyComponent);
        }
        let weights = WeightedTable::new(delivery_nodes.iter().map(|&id| {
            match network.node(id).and_then(|n| n.address.as_ref()) {
                Some(_) => address_weight,
                None => 1.0,
            }
        }));
        let routable = vec![true; network.len()].into();
        Ok(Self {
            network,
            kitchen_node,
            kitchen,
            delivery_nodes,
            weights,
            routable,
        })
    }

    pub fn network(&self) -> &Arc<RoadNetwork> {
        &self.network
    }

    pub fn kitchen_node(&self) -> NodeId {
        self.kitchen_node
    }

    /// Position of the kitchen's road node.
    pub fn kitchen(&self) -> GeoPoint {
        self.kitchen
    }

    /// Mask of nodes routing may traverse: the kitchen component for a
    /// radius-restricted geography.
    pub fn routable(&self) -> &Arc<[bool]> {
        &self.routable
    }

    pub fn delivery_nodes(&self) -> &[NodeId] {
        &self.delivery_nodes
    }

    pub fn addressed_count(&self) -> usize {
        self.delivery_nodes
            .iter()
            .filter(|&&id| self.network.node(id).is_some_and(|n| n.address.is_some()))
            .count()
    }

    /// Customer node, weighted toward nodes carrying a street address.
    pub fn sample_customer_node<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NodeId> {
        self.weights
            .sample(rng)
            .and_then(|idx| self.delivery_nodes.get(idx).copied())
    }

    /// Street address of a node, or its coordinates when it has none.
    pub fn address_for(&self, id: NodeId) -> String {
        match self.network.node(id) {
            Some(RoadNode {
                address: Some(address),
                ..
            }) => address.clone(),
            Some(node) => format!("{:.6}, {:.6}", node.point.lat, node.point.lon),
            None => String::new(),
        }
    }
}

/// Resolves a location descriptor to its delivery geography.
pub trait GeographyProvider: Send + Sync {
    fn load(&self, config: &LocationConfig) -> Result<Geography, GeographyError>;
}

pub fn build_geography_provider(source: &GeographySource) -> Box<dyn GeographyProvider> {
    match source {
        GeographySource::Grid {
            spacing_m,
            address_fraction,
        } => Box::new(grid::GridGeography::new(*spacing_m, *address_fraction)),
        GeographySource::File { path } => Box::new(file::FileGeography::new(path.clone())),
        #[cfg(feature = "overpass")]
        GeographySource::Overpass { endpoint } => {
            Box::new(overpass::OverpassGeography::new(endpoint))
        }
    }
}

/// Loads the geography a config asks for.
pub fn load_geography(config: &LocationConfig) -> Result<Geography, GeographyError> {
    build_geography_provider(&config.geography).load(config)
}

pub(crate) fn kitchen_point(config: &LocationConfig) -> GeoPoint {
    GeoPoint::new(config.kitchen.lat, config.kitchen.lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn line_network() -> RoadNetwork {
        // 0 - 1 - 2     3 (isolated)
        let origin = GeoPoint::new(37.79, -122.39);
        let mut builder = RoadNetwork::builder();
        let a = builder.add_node(origin, None);
        let b = builder.add_node(origin.offset_m(0.0, 100.0), Some("1 Main St".to_string()));
        let c = builder.add_node(origin.offset_m(0.0, 200.0), None);
        builder.add_node(origin.offset_m(50.0, 0.0), Some("9 Lonely Rd".to_string()));
        builder.add_edge(a, b, None);
        builder.add_edge(b, c, None);
        builder.build()
    }

    #[test]
    fn haversine_matches_offsets() {
        let origin = GeoPoint::new(41.8781, -87.6298);
        let moved = origin.offset_m(300.0, 400.0);
        let d = haversine_m(origin, moved);
        assert!((d - 500.0).abs() < 0.5, "{d}");
    }

    #[test]
    fn delivery_points_stay_in_kitchen_component() {
        let network = line_network();
        let kitchen = network.point(0).expect("node");
        let geography = Geography::from_network(network, kitchen, 1_000.0, 4.0).expect("geo");
        assert_eq!(geography.kitchen_node(), 0);
        assert_eq!(geography.delivery_nodes(), &[1, 2]);
        assert_eq!(geography.addressed_count(), 1);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let node = geography.sample_customer_node(&mut rng).expect("node");
            assert!(node == 1 || node == 2);
        }
        assert_eq!(geography.address_for(1), "1 Main St");
        assert!(geography.address_for(2).contains(','));
    }

    #[test]
    fn radius_trims_far_nodes() {
        let network = line_network();
        let kitchen = network.point(0).expect("node");
        let geography = Geography::from_network(network, kitchen, 150.0, 1.0).expect("geo");
        assert_eq!(geography.delivery_nodes(), &[1]);
        assert_eq!(&geography.routable()[..], &[true, true, false, false]);
    }

    #[test]
    fn isolated_kitchen_is_an_error() {
        let network = line_network();
        let lonely = network.point(3).expect("node");
        let err = Geography::from_network(network, lonely, 20.0, 1.0).expect_err("must fail");
        assert!(matches!(err, GeographyError::EmptyComponent));
    }

    #[test]
    fn distant_kitchen_is_an_error() {
        let network = line_network();
        let far = GeoPoint::new(38.5, -121.0);
        let err = Geography::from_network(network, far, 1_000.0, 1.0).expect_err("must fail");
        assert!(matches!(err, GeographyError::KitchenUnreachable { .. }));
    }
}
