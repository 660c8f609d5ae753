//! Shortest-path routing over the location's road network.
//!
//! Routes are computed by a [`RouteProvider`]; the default stack is a
//! Dijkstra search wrapped in an LRU cache keyed by node pair. The
//! [`TripPlanner`] resource ties routing to customer sampling: it draws a
//! delivery point, routes to it and re-draws when no path exists.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use bevy_ecs::prelude::Resource;
use lru::LruCache;
use pathfinding::prelude::dijkstra;
use rand::Rng;
use thiserror::Error;

use crate::geography::{GeoPoint, Geography, NodeId, RoadNetwork, METERS_PER_MILE};

/// Customer re-draws before an order is given up.
pub const MAX_CUSTOMER_ATTEMPTS: u32 = 8;
pub const DEFAULT_ROUTE_CACHE_CAPACITY: usize = 4_096;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// A path through the network with its polyline and running distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    nodes: Vec<NodeId>,
    points: Vec<GeoPoint>,
    /// Distance from the start to each point, metres.
    cumulative_m: Vec<f64>,
}

impl Route {
    /// Builds a route from a node path, taking segment lengths from the
    /// network's edges.
    pub fn from_path(network: &RoadNetwork, nodes: Vec<NodeId>) -> Option<Self> {
        let points = nodes
            .iter()
            .map(|&id| network.point(id))
            .collect::<Option<Vec<_>>>()?;
        let mut cumulative_m = Vec::with_capacity(nodes.len());
        let mut total = 0.0;
        for (i, &id) in nodes.iter().enumerate() {
            if i > 0 {
                let prev = nodes[i - 1];
                let segment = network
                    .neighbors(prev)
                    .iter()
                    .filter(|e| e.to == id)
                    .map(|e| e.length_m)
                    .min_by(f64::total_cmp)?;
                total += segment;
            }
            cumulative_m.push(total);
        }
        Some(Self {
            nodes,
            points,
            cumulative_m,
        })
    }

    /// Route over an explicit polyline with great-circle segment lengths.
    pub fn from_points(points: Vec<GeoPoint>) -> Self {
        let mut cumulative_m = Vec::with_capacity(points.len());
        let mut total = 0.0;
        for (i, point) in points.iter().enumerate() {
            if i > 0 {
                total += crate::geography::haversine_m(points[i - 1], *point);
            }
            cumulative_m.push(total);
        }
        Self {
            nodes: Vec::new(),
            points,
            cumulative_m,
        }
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn length_m(&self) -> f64 {
        self.cumulative_m.last().copied().unwrap_or(0.0)
    }

    pub fn length_miles(&self) -> f64 {
        self.length_m() / METERS_PER_MILE
    }

    pub fn minutes_at_mph(&self, mph: f64) -> f64 {
        if mph <= 0.0 {
            return 0.0;
        }
        self.length_miles() / mph * 60.0
    }

    /// Position after covering `fraction` of the route length.
    pub fn position_at(&self, fraction: f64) -> Option<GeoPoint> {
        let first = *self.points.first()?;
        let total = self.length_m();
        if total <= 0.0 || fraction <= 0.0 {
            return Some(first);
        }
        if fraction >= 1.0 {
            return self.points.last().copied();
        }
        let target = total * fraction;
        let idx = self.cumulative_m.partition_point(|&d| d < target);
        if idx == 0 {
            return Some(first);
        }
        if idx >= self.points.len() {
            return self.points.last().copied();
        }
        let (d0, d1) = (self.cumulative_m[idx - 1], self.cumulative_m[idx]);
        let t = if d1 > d0 { (target - d0) / (d1 - d0) } else { 1.0 };
        Some(self.points[idx - 1].lerp(&self.points[idx], t))
    }
}

/// Trait for routing backends. `Send + Sync` so a provider can live in a
/// shared ECS resource.
pub trait RouteProvider: Send + Sync {
    /// Shortest route between two nodes, or `None` when they are not
    /// connected.
    fn route(&self, from: NodeId, to: NodeId) -> Option<Route>;
}

// ---------------------------------------------------------------------------
// Dijkstra provider
// ---------------------------------------------------------------------------

/// Exact shortest path by edge length. Costs are whole centimetres so the
/// search runs on integer weights.
pub struct DijkstraRouteProvider {
    network: Arc<RoadNetwork>,
    allowed: Option<Arc<[bool]>>,
}

impl DijkstraRouteProvider {
    pub fn new(network: Arc<RoadNetwork>) -> Self {
        Self {
            network,
            allowed: None,
        }
    }

    /// Searches only nodes flagged in `allowed`.
    pub fn within(network: Arc<RoadNetwork>, allowed: Arc<[bool]>) -> Self {
        Self {
            network,
            allowed: Some(allowed),
        }
    }

    fn is_allowed(&self, node: NodeId) -> bool {
        self.allowed
            .as_ref()
            .map_or(true, |mask| mask.get(node).copied().unwrap_or(false))
    }
}

impl RouteProvider for DijkstraRouteProvider {
    fn route(&self, from: NodeId, to: NodeId) -> Option<Route> {
        if from >= self.network.len() || to >= self.network.len() {
            return None;
        }
        if !self.is_allowed(from) || !self.is_allowed(to) {
            return None;
        }
        let network: &RoadNetwork = &self.network;
        let (path, _cost) = dijkstra(
            &from,
            |&node| {
                network
                    .neighbors(node)
                    .iter()
                    .filter(|edge| self.is_allowed(edge.to))
                    .map(|edge| (edge.to, (edge.length_m * 100.0).round() as u64))
            },
            |&node| node == to,
        )?;
        Route::from_path(network, path)
    }
}

// ---------------------------------------------------------------------------
// Caching wrapper
// ---------------------------------------------------------------------------

/// LRU-cached wrapper around any [`RouteProvider`]. Keys are directional.
pub struct CachedRouteProvider {
    inner: Box<dyn RouteProvider>,
    cache: Mutex<LruCache<(NodeId, NodeId), Route>>,
}

impl CachedRouteProvider {
    pub fn new(inner: Box<dyn RouteProvider>, capacity: usize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }
}

impl RouteProvider for CachedRouteProvider {
    fn route(&self, from: NodeId, to: NodeId) -> Option<Route> {
        let key = (from, to);

        // Fast path: cache hit
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(cached) = cache.get(&key) {
                return Some(cached.clone());
            }
        }

        let result = self.inner.route(from, to);
        if let Some(ref route) = result {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(key, route.clone());
            }
        }
        result
    }
}

/// Dijkstra over the geography's routable nodes, behind an LRU cache of
/// `capacity` routes.
pub fn build_route_provider(geography: &Geography, capacity: usize) -> Box<dyn RouteProvider> {
    Box::new(CachedRouteProvider::new(
        Box::new(DijkstraRouteProvider::within(
            Arc::clone(geography.network()),
            Arc::clone(geography.routable()),
        )),
        capacity,
    ))
}

// ---------------------------------------------------------------------------
// Trip planning
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("geography has no delivery points")]
    NoDeliveryPoints,
    #[error("no route to a customer after {attempts} attempts")]
    NoPathAfterRetries { attempts: u32 },
}

/// Kitchen-to-customer trip for one order.
#[derive(Debug, Clone)]
pub struct Trip {
    pub customer_node: NodeId,
    pub customer: GeoPoint,
    pub customer_addr: String,
    pub route: Route,
    pub route_miles: f64,
    pub route_minutes: f64,
}

#[derive(Resource)]
pub struct TripPlanner {
    geography: Geography,
    provider: Box<dyn RouteProvider>,
    driver_mph: f64,
}

impl TripPlanner {
    pub fn new(geography: Geography, provider: Box<dyn RouteProvider>, driver_mph: f64) -> Self {
        Self {
            geography,
            provider,
            driver_mph,
        }
    }

    /// Planner with the default cached Dijkstra provider.
    pub fn with_default_provider(geography: Geography, driver_mph: f64) -> Self {
        let provider = build_route_provider(&geography, DEFAULT_ROUTE_CACHE_CAPACITY);
        Self::new(geography, provider, driver_mph)
    }

    pub fn geography(&self) -> &Geography {
        &self.geography
    }

    /// Draws a customer and routes to it, re-drawing up to
    /// [`MAX_CUSTOMER_ATTEMPTS`] times when no path exists.
    pub fn plan_trip<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Trip, RoutingError> {
        let kitchen = self.geography.kitchen_node();
        for _ in 0..MAX_CUSTOMER_ATTEMPTS {
            let customer_node = self
                .geography
                .sample_customer_node(rng)
                .ok_or(RoutingError::NoDeliveryPoints)?;
            let Some(route) = self.provider.route(kitchen, customer_node) else {
                continue;
            };
            let Some(customer) = self.geography.network().point(customer_node) else {
                continue;
            };
            let route_miles = route.length_miles();
            let route_minutes = route.minutes_at_mph(self.driver_mph);
            return Ok(Trip {
                customer_node,
                customer,
                customer_addr: self.geography.address_for(customer_node),
                route,
                route_miles,
                route_minutes,
            });
        }
        Err(RoutingError::NoPathAfterRetries {
            attempts: MAX_CUSTOMER_ATTEMPTS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn square() -> Arc<RoadNetwork> {
        // 0 --100-- 1
        // |         |
        // 350      100
        // |         |
        // 3 --100-- 2
        let origin = GeoPoint::new(41.8781, -87.6298);
        let mut b = RoadNetwork::builder();
        let n0 = b.add_node(origin, None);
        let n1 = b.add_node(origin.offset_m(0.0, 100.0), None);
        let n2 = b.add_node(origin.offset_m(-100.0, 100.0), None);
        let n3 = b.add_node(origin.offset_m(-100.0, 0.0), None);
        b.add_edge(n0, n1, Some(100.0));
        b.add_edge(n1, n2, Some(100.0));
        b.add_edge(n2, n3, Some(100.0));
        b.add_edge(n0, n3, Some(350.0));
        Arc::new(b.build())
    }

    #[test]
    fn dijkstra_prefers_shorter_total_length() {
        let provider = DijkstraRouteProvider::new(square());
        let route = provider.route(0, 3).expect("route");
        assert_eq!(route.nodes(), &[0, 1, 2, 3]);
        assert!((route.length_m() - 300.0).abs() < 1e-9);
    }

    #[test]
    fn dijkstra_stays_inside_the_allowed_nodes() {
        // Node 1 lies outside the delivery radius; the only way around is
        // the longer direct edge.
        let mask: Arc<[bool]> = vec![true, false, true, true].into();
        let provider = DijkstraRouteProvider::within(square(), mask);
        let route = provider.route(0, 3).expect("route");
        assert_eq!(route.nodes(), &[0, 3]);
        assert!(provider.route(0, 1).is_none());
        assert_eq!(provider.route(0, 2).expect("detour").nodes(), &[0, 3, 2]);
    }

    #[test]
    fn position_interpolates_by_distance() {
        let network = square();
        let route = Route::from_path(&network, vec![0, 1, 2]).expect("route");
        let start = route.position_at(0.0).expect("start");
        let mid = route.position_at(0.5).expect("mid");
        let end = route.position_at(1.0).expect("end");
        assert_eq!(start, network.point(0).expect("p"));
        assert_eq!(end, network.point(2).expect("p"));
        let corner = network.point(1).expect("p");
        assert!((mid.lat - corner.lat).abs() < 1e-9);
        assert!((mid.lon - corner.lon).abs() < 1e-9);
    }

    struct CountingProvider {
        inner: DijkstraRouteProvider,
        calls: Arc<AtomicUsize>,
    }

    impl RouteProvider for CountingProvider {
        fn route(&self, from: NodeId, to: NodeId) -> Option<Route> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.route(from, to)
        }
    }

    #[test]
    fn cache_avoids_repeat_searches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = CachedRouteProvider::new(
            Box::new(CountingProvider {
                inner: DijkstraRouteProvider::new(square()),
                calls: Arc::clone(&calls),
            }),
            8,
        );
        let a = cached.route(0, 2).expect("route");
        let b = cached.route(0, 2).expect("route");
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct NoRoutes;

    impl RouteProvider for NoRoutes {
        fn route(&self, _from: NodeId, _to: NodeId) -> Option<Route> {
            None
        }
    }

    #[test]
    fn planner_gives_up_after_bounded_attempts() {
        let network = square();
        let geography = Geography::from_parts(network, 0, vec![1, 2, 3], 1.0).expect("geo");
        let planner = TripPlanner::new(geography, Box::new(NoRoutes), 20.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            planner.plan_trip(&mut rng).expect_err("no path"),
            RoutingError::NoPathAfterRetries {
                attempts: MAX_CUSTOMER_ATTEMPTS
            }
        );
    }

    #[test]
    fn planner_converts_distance_to_minutes() {
        let network = square();
        let geography = Geography::from_parts(network, 0, vec![2], 1.0).expect("geo");
        let planner = TripPlanner::with_default_provider(geography, 12.0);
        let mut rng = StdRng::seed_from_u64(1);
        let trip = planner.plan_trip(&mut rng).expect("trip");
        assert_eq!(trip.customer_node, 2);
        let expected_minutes = 200.0 / METERS_PER_MILE / 12.0 * 60.0;
        assert!((trip.route_minutes - expected_minutes).abs() < 1e-9);
    }
}
