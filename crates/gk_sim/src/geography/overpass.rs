//! Live OpenStreetMap extract via the Overpass API.
//!
//! Drivable ways within the delivery radius become the road graph; nodes
//! tagged with a house number are snapped onto the nearest road node and
//! lend it their street address.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::{
    haversine_m, kitchen_point, GeoPoint, Geography, GeographyError, GeographyProvider,
    NodeId, RoadNetwork, RoadNetworkBuilder, METERS_PER_MILE,
};
use crate::config::LocationConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
/// Address nodes further than this from any road node are dropped.
const MAX_SNAP_M: f64 = 60.0;
/// Side of a snapping bucket, in degrees (~110 m of latitude).
const BUCKET_DEG: f64 = 0.001;
const DRIVABLE: &str = "motorway|trunk|primary|secondary|tertiary|unclassified|residential|service|living_street";

pub struct OverpassGeography {
    endpoint: String,
}

impl OverpassGeography {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn query(center: GeoPoint, radius_m: f64) -> String {
        format!(
            "[out:json][timeout:80];\
             (way[\"highway\"~\"^({DRIVABLE})$\"](around:{r:.0},{lat},{lon});\
              node[\"addr:housenumber\"](around:{r:.0},{lat},{lon}););\
             (._;>;);out body;",
            r = radius_m,
            lat = center.lat,
            lon = center.lon,
        )
    }

    fn fetch(&self, center: GeoPoint, radius_m: f64) -> Result<OverpassResponse, GeographyError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| GeographyError::Fetch(err.to_string()))?;
        client
            .post(format!("{}/interpreter", self.endpoint))
            .form(&[("data", Self::query(center, radius_m))])
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|err| GeographyError::Fetch(err.to_string()))?
            .json()
            .map_err(|err| GeographyError::Fetch(err.to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct OverpassResponse {
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node {
        id: u64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    Way {
        #[serde(default)]
        nodes: Vec<u64>,
        #[serde(default)]
        tags: HashMap<String, String>,
    },
    #[serde(other)]
    Other,
}

fn format_address(tags: &HashMap<String, String>) -> Option<String> {
    let number = tags.get("addr:housenumber")?;
    let street = tags.get("addr:street")?;
    let mut address = format!("{number} {street}");
    if let Some(city) = tags.get("addr:city") {
        address.push_str(", ");
        address.push_str(city);
    }
    if let Some(postcode) = tags.get("addr:postcode") {
        address.push(' ');
        address.push_str(postcode);
    }
    Some(address)
}

fn bucket_of(point: GeoPoint) -> (i64, i64) {
    (
        (point.lat / BUCKET_DEG).floor() as i64,
        (point.lon / BUCKET_DEG).floor() as i64,
    )
}

/// Builds the road graph from an Overpass response.
pub(crate) fn network_from_response(response: OverpassResponse) -> RoadNetwork {
    let mut points = HashMap::new();
    let mut addresses = Vec::new();
    let mut ways = Vec::new();
    for element in response.elements {
        match element {
            Element::Node { id, lat, lon, tags } => {
                let point = GeoPoint::new(lat, lon);
                if let Some(address) = format_address(&tags) {
                    addresses.push((point, address));
                }
                points.insert(id, point);
            }
            Element::Way { nodes, tags } if tags.contains_key("highway") => ways.push(nodes),
            _ => {}
        }
    }

    let mut builder = RoadNetworkBuilder::default();
    let mut ids: HashMap<u64, NodeId> = HashMap::new();
    let mut buckets: HashMap<(i64, i64), Vec<NodeId>> = HashMap::new();
    let mut node_points = Vec::new();
    for way in &ways {
        let mut previous: Option<NodeId> = None;
        for osm_id in way {
            let Some(&point) = points.get(osm_id) else {
                previous = None;
                continue;
            };
            let id = *ids.entry(*osm_id).or_insert_with(|| {
                let id = builder.add_node(point, None);
                buckets.entry(bucket_of(point)).or_default().push(id);
                node_points.push(point);
                id
            });
            if let Some(prev) = previous {
                builder.add_edge(prev, id, None);
            }
            previous = Some(id);
        }
    }

    let mut snapped = 0usize;
    for (point, address) in addresses {
        let (bl, bo) = bucket_of(point);
        let nearest = (-1..=1)
            .flat_map(|dl| (-1..=1).map(move |dn| (bl + dl, bo + dn)))
            .filter_map(|key| buckets.get(&key))
            .flatten()
            .map(|&id| (id, haversine_m(point, node_points[id])))
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((id, distance)) = nearest {
            if distance <= MAX_SNAP_M && !builder.has_address(id) {
                builder.set_address(id, address);
                snapped += 1;
            }
        }
    }
    debug!(
        road_nodes = builder.node_count(),
        ways = ways.len(),
        snapped_addresses = snapped,
        "overpass extract parsed"
    );
    builder.build()
}

impl GeographyProvider for OverpassGeography {
    fn load(&self, config: &LocationConfig) -> Result<Geography, GeographyError> {
        let center = kitchen_point(config);
        let radius_m = config.radius_mi * METERS_PER_MILE;
        info!(location = %config.location_name, endpoint = %self.endpoint, "fetching road network");
        let network = network_from_response(self.fetch(center, radius_m)?);
        Geography::from_network(network, center, radius_m, config.address_weight)
    }
}
