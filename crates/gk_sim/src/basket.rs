//! Basket sampling from a brand's menu.

use bevy_ecs::prelude::Resource;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{BasketParams, BrandConfig};
use crate::weighting::WeightedTable;

/// One basket line as it appears in an `order_created` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: u32,
    pub menu_id: u32,
    pub category_id: u32,
    pub brand_id: u32,
    pub name: String,
    pub price: f64,
    pub qty: u32,
}

#[derive(Debug, Clone)]
struct BrandMenu {
    brand_id: u32,
    name: String,
    items: Vec<OrderItem>,
    /// Present only when some item declares a popularity.
    popularity: Option<WeightedTable>,
}

#[derive(Debug, Clone, Resource)]
pub struct BasketSampler {
    menus: Vec<BrandMenu>,
    params: BasketParams,
}

impl BasketSampler {
    pub fn new(brands: &[BrandConfig], params: &BasketParams) -> Self {
        let menus = brands
            .iter()
            .map(|brand| {
                let items = brand
                    .items
                    .iter()
                    .map(|item| OrderItem {
                        id: item.id,
                        menu_id: item.menu_id,
                        category_id: item.category_id,
                        brand_id: brand.id,
                        name: item.name.clone(),
                        price: item.price,
                        qty: 1,
                    })
                    .collect();
                let popularity = brand
                    .items
                    .iter()
                    .any(|item| item.popularity.is_some())
                    .then(|| {
                        WeightedTable::new(
                            brand.items.iter().map(|item| item.popularity.unwrap_or(1.0)),
                        )
                    });
                BrandMenu {
                    brand_id: brand.id,
                    name: brand.name.clone(),
                    items,
                    popularity,
                }
            })
            .collect();
        Self {
            menus,
            params: params.clone(),
        }
    }

    pub fn brand_count(&self) -> usize {
        self.menus.len()
    }

    /// `(brand_id, brand_name)` for a brand index.
    pub fn brand(&self, brand_idx: usize) -> Option<(u32, &str)> {
        self.menus
            .get(brand_idx)
            .map(|menu| (menu.brand_id, menu.name.as_str()))
    }

    /// Draws a basket for the brand. Repeated draws of the same item are
    /// merged into one line with the summed quantity.
    pub fn sample_items<R: Rng + ?Sized>(&self, brand_idx: usize, rng: &mut R) -> Vec<OrderItem> {
        let Some(menu) = self.menus.get(brand_idx) else {
            return Vec::new();
        };
        if menu.items.is_empty() {
            return Vec::new();
        }
        let lines = rng.gen_range(self.params.min_items..=self.params.max_items);
        let mut basket: Vec<OrderItem> = Vec::with_capacity(lines as usize);
        for _ in 0..lines {
            let idx = match &menu.popularity {
                Some(table) => table
                    .sample(rng)
                    .unwrap_or_else(|| rng.gen_range(0..menu.items.len())),
                None => rng.gen_range(0..menu.items.len()),
            };
            let qty = rng.gen_range(1..=self.params.max_qty);
            let item = &menu.items[idx];
            match basket.iter_mut().find(|line| line.id == item.id) {
                Some(line) => line.qty += qty,
                None => basket.push(OrderItem {
                    qty,
                    ..item.clone()
                }),
            }
        }
        basket
    }
}
