//! Optional field corruption: nulls body fields at configured rates to
//! exercise downstream data-quality handling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::event::{EventRecord, EventType};

/// Mixed into the location seed for the corruption stream, so toggling
/// corruption leaves the simulated orders untouched.
pub const CORRUPTION_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorruptionRule {
    pub event_type: String,
    pub field: String,
    /// Probability of nulling the field on a matching event.
    pub rate: f64,
}

impl CorruptionRule {
    pub fn parsed_event_type(&self) -> Result<EventType, ConfigError> {
        self.event_type.parse().map_err(|err: crate::event::UnknownEventType| {
            ConfigError::Corruption {
                event_type: self.event_type.clone(),
                field: self.field.clone(),
                reason: err.to_string(),
            }
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let event_type = self.parsed_event_type()?;
        if !event_type.body_fields().contains(&self.field.as_str()) {
            return Err(ConfigError::Corruption {
                event_type: self.event_type.clone(),
                field: self.field.clone(),
                reason: format!(
                    "`{}` has no body field `{}` (expected one of {:?})",
                    event_type,
                    self.field,
                    event_type.body_fields()
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.rate) {
            return Err(ConfigError::Corruption {
                event_type: self.event_type.clone(),
                field: self.field.clone(),
                reason: format!("rate must be within [0, 1], got {}", self.rate),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    event_type: EventType,
    field: String,
    rate: f64,
}

/// Applies corruption rules to records just before they reach the writer.
#[derive(Debug, Clone)]
pub struct FieldCorruptor {
    rules: Vec<CompiledRule>,
    rng: StdRng,
}

impl FieldCorruptor {
    /// Rules that fail validation are skipped; configs are validated at load.
    pub fn new(rules: &[CorruptionRule], location_seed: u64) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| {
                let event_type = rule.parsed_event_type().ok()?;
                Some(CompiledRule {
                    event_type,
                    field: rule.field.clone(),
                    rate: rule.rate.clamp(0.0, 1.0),
                })
            })
            .filter(|rule| rule.rate > 0.0)
            .collect();
        Self {
            rules,
            rng: StdRng::seed_from_u64(location_seed ^ CORRUPTION_SEED_SALT),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.rules.is_empty()
    }

    /// Nulls matching fields; returns how many were nulled. Type, ordering
    /// and sequence are never touched.
    pub fn apply(&mut self, record: &mut EventRecord) -> usize {
        let mut nulled = 0;
        for rule in &self.rules {
            if rule.event_type != record.event_type {
                continue;
            }
            if self.rng.gen_bool(rule.rate) {
                if let Some(value) = record.body.get_mut(&rule.field) {
                    if !value.is_null() {
                        *value = serde_json::Value::Null;
                        nulled += 1;
                    }
                }
            }
        }
        nulled
    }
}
