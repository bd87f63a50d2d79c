//! Heartbeat body sanitization.

use super::entities::{
    sanitize_buildings, sanitize_units, sanitize_world, MAX_HP, MAX_PHASE_LENGTH, MAX_WAVE,
    WORLD_HEIGHT, WORLD_WIDTH,
};
use super::{opt_flag, opt_integer, opt_number, opt_text};
use coop_common::{BuildingRecord, UnitRecord, WorldSnapshot};
use serde_json::{Map, Value};
use std::f64::consts::TAU;

const MAX_RESOURCES: f64 = 1_000_000_000.0;
const MAX_TOTAL_MINERALS: f64 = 1_000_000_000_000.0;
const MAX_POPULATION: i64 = 1000;

/// A heartbeat reduced to safe values. Scalars that were absent or not
/// coercible are `None` and leave the stored value untouched; list fields
/// always replace what the player reported before.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatPayload {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub facing: Option<f64>,
    pub command_hp: Option<f64>,
    pub wave: Option<i64>,
    pub phase: Option<String>,
    pub reward_chosen: Option<bool>,
    pub resources: Option<f64>,
    pub total_minerals_earned: Option<f64>,
    pub population_used: Option<i64>,
    pub population_limit: Option<i64>,
    pub buildings: Vec<BuildingRecord>,
    pub units: Vec<UnitRecord>,
    pub world: Option<WorldSnapshot>,
}

pub fn sanitize_heartbeat(body: &Value) -> HeartbeatPayload {
    let empty = Map::new();
    let b = body.as_object().unwrap_or(&empty);
    HeartbeatPayload {
        x: opt_number(b.get("x"), 0.0, WORLD_WIDTH),
        y: opt_number(b.get("y"), 0.0, WORLD_HEIGHT),
        facing: opt_number(b.get("facing"), -TAU, TAU),
        command_hp: opt_number(b.get("commandHp"), 0.0, MAX_HP),
        wave: opt_integer(b.get("wave"), 1, MAX_WAVE),
        phase: opt_text(b.get("phase"), MAX_PHASE_LENGTH),
        reward_chosen: opt_flag(b.get("rewardChosen")),
        resources: opt_number(b.get("resources"), 0.0, MAX_RESOURCES),
        total_minerals_earned: opt_number(b.get("totalMineralsEarned"), 0.0, MAX_TOTAL_MINERALS),
        population_used: opt_integer(b.get("populationUsed"), 0, MAX_POPULATION),
        population_limit: opt_integer(b.get("populationLimit"), 0, MAX_POPULATION),
        buildings: sanitize_buildings(b.get("buildings")),
        units: sanitize_units(b.get("units")),
        world: sanitize_world(b.get("world")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heartbeat_scalars() {
        let hb = sanitize_heartbeat(&json!({
            "x": 99999, "y": "12", "facing": null, "commandHp": -5, "wave": 0,
            "phase": "  combat-phase-with-long-name ", "rewardChosen": "yes",
            "resources": 1e20, "populationUsed": 3.7, "populationLimit": "lots",
        }));
        assert_eq!(hb.x, Some(WORLD_WIDTH));
        assert_eq!(hb.y, Some(12.0));
        assert_eq!(hb.facing, None);
        assert_eq!(hb.command_hp, Some(0.0));
        assert_eq!(hb.wave, Some(1));
        assert_eq!(hb.phase.as_deref(), Some("combat-phase-wit"));
        assert_eq!(hb.reward_chosen, Some(true));
        assert_eq!(hb.resources, Some(MAX_RESOURCES));
        assert_eq!(hb.total_minerals_earned, None);
        assert_eq!(hb.population_used, Some(3));
        assert_eq!(hb.population_limit, None);
        assert!(hb.world.is_none());
    }

    #[test]
    fn test_heartbeat_on_garbage_body() {
        assert_eq!(sanitize_heartbeat(&json!("boom")), HeartbeatPayload::default());
        assert_eq!(sanitize_heartbeat(&json!([1, 2, 3])), HeartbeatPayload::default());
        let hb = sanitize_heartbeat(&json!({"buildings": "many", "units": {"kind": "scv"}}));
        assert!(hb.buildings.is_empty());
        assert!(hb.units.is_empty());
    }
}
