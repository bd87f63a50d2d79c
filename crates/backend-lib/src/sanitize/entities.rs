//! Typed parsers for the entity lists a client may report.

use super::{
    bounded_list, entity_id, flag, integer, number, required_text, text, with_object,
    DropReason, Sanitized,
};
use coop_common::{
    BuildingRecord, EnemyRecord, MineralRecord, ProjectileRecord, UnitRecord, WorldSnapshot,
    WorldState,
};
use serde_json::{Map, Value};
use std::f64::consts::TAU;

pub const MAP_COLS: i64 = 72;
pub const MAP_ROWS: i64 = 48;
pub const TILE_SIZE: f64 = 32.0;
pub const WORLD_WIDTH: f64 = MAP_COLS as f64 * TILE_SIZE;
pub const WORLD_HEIGHT: f64 = MAP_ROWS as f64 * TILE_SIZE;

pub const MAX_BUILDINGS: usize = 360;
pub const MAX_UNITS: usize = 480;
pub const MAX_ENEMIES: usize = 720;
pub const MAX_PROJECTILES: usize = 1200;
pub const MAX_MINERALS: usize = 600;

const MAX_KIND_LENGTH: usize = 24;
const MAX_TEAM_LENGTH: usize = 16;
const MAX_COLOR_LENGTH: usize = 16;
pub(crate) const MAX_PHASE_LENGTH: usize = 16;

pub(crate) const MAX_HP: f64 = 1_000_000.0;
pub(crate) const MAX_LEVEL: i64 = 10;
pub(crate) const MAX_WAVE: i64 = 999;
const MAX_FOOTPRINT: i64 = 8;
const MAX_SPEED: f64 = 4000.0;
const MAX_LIFE: f64 = 10.0;

fn discriminated<T>(
    obj: &Map<String, Value>,
    key: &str,
    max_chars: usize,
    build: impl FnOnce(String) -> T,
) -> Sanitized<T> {
    match required_text(obj.get(key), max_chars) {
        Some(kind) => Sanitized::Ok(build(kind)),
        None => Sanitized::Dropped(DropReason::MissingDiscriminator),
    }
}

pub fn parse_building(value: &Value) -> Sanitized<BuildingRecord> {
    with_object(value, |b| {
        discriminated(b, "type", MAX_KIND_LENGTH, |kind| BuildingRecord {
            id: entity_id(b.get("id")),
            kind,
            c: integer(b.get("c"), 0, 0, MAP_COLS - 1),
            r: integer(b.get("r"), 0, 0, MAP_ROWS - 1),
            w: integer(b.get("w"), 1, 1, MAX_FOOTPRINT),
            h: integer(b.get("h"), 1, 1, MAX_FOOTPRINT),
            level: integer(b.get("level"), 1, 1, MAX_LEVEL),
            hp: number(b.get("hp"), 0.0, 0.0, MAX_HP),
            max_hp: number(b.get("maxHp"), 1.0, 1.0, MAX_HP),
            is_main_command: flag(b.get("isMainCommand")),
        })
    })
}

pub fn parse_unit(value: &Value) -> Sanitized<UnitRecord> {
    with_object(value, |u| {
        discriminated(u, "kind", MAX_KIND_LENGTH, |kind| UnitRecord {
            id: entity_id(u.get("id")),
            kind,
            x: number(u.get("x"), 0.0, 0.0, WORLD_WIDTH),
            y: number(u.get("y"), 0.0, 0.0, WORLD_HEIGHT),
            hp: number(u.get("hp"), 0.0, 0.0, MAX_HP),
            max_hp: number(u.get("maxHp"), 1.0, 1.0, MAX_HP),
            level: integer(u.get("level"), 1, 1, MAX_LEVEL),
            facing: number(u.get("facing"), 0.0, -TAU, TAU),
        })
    })
}

pub fn parse_enemy(value: &Value) -> Sanitized<EnemyRecord> {
    with_object(value, |e| {
        discriminated(e, "type", MAX_KIND_LENGTH, |kind| EnemyRecord {
            id: entity_id(e.get("id")),
            kind,
            x: number(e.get("x"), 0.0, 0.0, WORLD_WIDTH),
            y: number(e.get("y"), 0.0, 0.0, WORLD_HEIGHT),
            hp: number(e.get("hp"), 0.0, 0.0, MAX_HP),
            max_hp: number(e.get("maxHp"), 1.0, 1.0, MAX_HP),
            r: number(e.get("r"), 10.0, 1.0, 64.0),
        })
    })
}

pub fn parse_projectile(value: &Value) -> Sanitized<ProjectileRecord> {
    with_object(value, |p| {
        discriminated(p, "team", MAX_TEAM_LENGTH, |team| ProjectileRecord {
            team,
            x: number(p.get("x"), 0.0, 0.0, WORLD_WIDTH),
            y: number(p.get("y"), 0.0, 0.0, WORLD_HEIGHT),
            vx: number(p.get("vx"), 0.0, -MAX_SPEED, MAX_SPEED),
            vy: number(p.get("vy"), 0.0, -MAX_SPEED, MAX_SPEED),
            radius: number(p.get("radius"), 3.0, 0.5, 32.0),
            life: number(p.get("life"), 0.0, 0.0, MAX_LIFE),
            color: text(p.get("color"), MAX_COLOR_LENGTH),
        })
    })
}

/// Minerals carry no type string; a numeric `id` is their discriminator.
pub fn parse_mineral(value: &Value) -> Sanitized<MineralRecord> {
    with_object(value, |m| {
        if super::coerce_number(m.get("id")).is_none() {
            return Sanitized::Dropped(DropReason::MissingDiscriminator);
        }
        Sanitized::Ok(MineralRecord {
            id: entity_id(m.get("id")),
            x: number(m.get("x"), 0.0, 0.0, WORLD_WIDTH),
            y: number(m.get("y"), 0.0, 0.0, WORLD_HEIGHT),
            total: number(m.get("total"), 0.0, 0.0, MAX_HP),
            radius: number(m.get("radius"), 11.0, 1.0, 64.0),
        })
    })
}

pub fn sanitize_buildings(value: Option<&Value>) -> Vec<BuildingRecord> {
    bounded_list(value, MAX_BUILDINGS, parse_building)
}

pub fn sanitize_units(value: Option<&Value>) -> Vec<UnitRecord> {
    bounded_list(value, MAX_UNITS, parse_unit)
}

pub fn sanitize_enemies(value: Option<&Value>) -> Vec<EnemyRecord> {
    bounded_list(value, MAX_ENEMIES, parse_enemy)
}

pub fn sanitize_projectiles(value: Option<&Value>) -> Vec<ProjectileRecord> {
    bounded_list(value, MAX_PROJECTILES, parse_projectile)
}

pub fn sanitize_minerals(value: Option<&Value>) -> Vec<MineralRecord> {
    bounded_list(value, MAX_MINERALS, parse_mineral)
}

/// World-phase summary; a non-object yields the neutral summary.
pub fn sanitize_world_state(value: Option<&Value>) -> WorldState {
    let empty = Map::new();
    let s = value.and_then(Value::as_object).unwrap_or(&empty);
    WorldState {
        phase: text(s.get("phase"), MAX_PHASE_LENGTH),
        wave: integer(s.get("wave"), 1, 1, MAX_WAVE),
        time_sec: number(s.get("timeSec"), 0.0, 0.0, 1_000_000.0),
        phase_time_left: number(s.get("phaseTimeLeft"), 0.0, 0.0, 3600.0),
        kills: integer(s.get("kills"), 0, 0, 1_000_000_000),
        command_hp: number(s.get("commandHp"), 0.0, 0.0, MAX_HP),
        command_max_hp: number(s.get("commandMaxHp"), 0.0, 0.0, MAX_HP),
    }
}

/// Host world snapshot. Returns `None` unless `value` is an object; the
/// source fields are left blank for the room to stamp.
pub fn sanitize_world(value: Option<&Value>) -> Option<WorldSnapshot> {
    let w = value?.as_object()?;
    Some(WorldSnapshot {
        state: sanitize_world_state(w.get("state")),
        buildings: sanitize_buildings(w.get("buildings")),
        enemies: sanitize_enemies(w.get("enemies")),
        units: sanitize_units(w.get("units")),
        minerals: sanitize_minerals(w.get("minerals")),
        projectiles: sanitize_projectiles(w.get("projectiles")),
        source_player_id: String::new(),
        source_slot: 0,
        updated_at: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hostile_buildings(len: usize) -> Value {
        let entries: Vec<Value> = (0..len)
            .map(|i| match i % 8 {
                0 => json!({"type": "wall", "id": i, "c": 1e12, "r": -40, "hp": "NaN", "maxHp": 0}),
                1 => json!("not an object"),
                2 => json!({"type": "  turret  ", "level": 99, "w": 0, "h": "3", "isMainCommand": 1}),
                3 => json!({"id": 4, "c": 3}),
                4 => json!({"type": "command", "hp": 1e308, "maxHp": -1, "c": 5.7, "r": 40.2}),
                5 => json!(null),
                6 => json!({"type": 42}),
                _ => json!({"type": "barracks", "id": -9, "hp": [1, 2], "level": {"n": 1}}),
            })
            .collect();
        Value::Array(entries)
    }

    #[test]
    fn test_buildings_are_bounded_and_clamped() {
        let input = hostile_buildings(10_000);
        let out = sanitize_buildings(Some(&input));

        assert_eq!(out.len(), MAX_BUILDINGS);
        for b in &out {
            assert!(!b.kind.is_empty());
            assert!(b.kind.chars().count() <= MAX_KIND_LENGTH);
            assert!((0..MAP_COLS).contains(&b.c));
            assert!((0..MAP_ROWS).contains(&b.r));
            assert!((1..=MAX_FOOTPRINT).contains(&b.w));
            assert!((1..=MAX_FOOTPRINT).contains(&b.h));
            assert!((1..=MAX_LEVEL).contains(&b.level));
            assert!(b.hp.is_finite() && (0.0..=MAX_HP).contains(&b.hp));
            assert!((1.0..=MAX_HP).contains(&b.max_hp));
            assert!(b.id <= 1_000_000_000);
        }
        assert_eq!(out[1].kind, "turret");
        assert!(out[1].is_main_command);
        assert_eq!(out[1].h, 3);
    }

    #[test]
    fn test_resanitizing_is_a_no_op() {
        let input = hostile_buildings(2_000);
        let once = sanitize_buildings(Some(&input));
        let twice = sanitize_buildings(Some(&serde_json::to_value(&once).unwrap()));
        assert_eq!(once, twice);

        let world = json!({
            "state": {"phase": "  combat ", "wave": 1e9, "kills": -2, "timeSec": "12.5"},
            "enemies": [{"type": "boss", "x": -10, "y": 1e9, "r": 500}, {"x": 1}],
            "projectiles": [{"team": "enemy", "vx": 1e9, "life": 99, "color": "#ff0000ff00ff00ff00"}],
            "minerals": [{"id": 3, "total": 120}, {"total": 5}],
            "units": [{"kind": "soldier", "facing": 100}],
        });
        let once = sanitize_world(Some(&world)).unwrap();
        let twice = sanitize_world(Some(&serde_json::to_value(&once).unwrap())).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_world_fields_are_clamped() {
        let world = json!({
            "state": {"phase": "build", "wave": 0, "commandHp": -1},
            "enemies": [{"type": "boss", "x": -10, "y": 1e9, "r": 500}],
            "projectiles": [{"team": "enemy", "vx": -1e9, "radius": 0}],
            "minerals": [{"id": "7", "radius": 0}, {"total": 5}],
        });
        let w = sanitize_world(Some(&world)).unwrap();
        assert_eq!(w.state.wave, 1);
        assert_eq!(w.state.command_hp, 0.0);
        assert_eq!(w.enemies[0].x, 0.0);
        assert_eq!(w.enemies[0].y, WORLD_HEIGHT);
        assert_eq!(w.enemies[0].r, 64.0);
        assert_eq!(w.projectiles[0].vx, -MAX_SPEED);
        assert_eq!(w.projectiles[0].radius, 0.5);
        assert_eq!(w.minerals.len(), 1);
        assert_eq!(w.minerals[0].id, 7);
        assert!(w.units.is_empty());
    }

    #[test]
    fn test_non_object_world_is_ignored() {
        assert!(sanitize_world(None).is_none());
        assert!(sanitize_world(Some(&json!([1, 2]))).is_none());
        assert!(sanitize_world(Some(&json!("world"))).is_none());
    }

    #[test]
    fn test_caps_per_entity_class() {
        let projectiles = Value::Array(vec![json!({"team": "friendly"}); 5_000]);
        assert_eq!(sanitize_projectiles(Some(&projectiles)).len(), MAX_PROJECTILES);
        let enemies = Value::Array(vec![json!({"type": "grunt"}); 5_000]);
        assert_eq!(sanitize_enemies(Some(&enemies)).len(), MAX_ENEMIES);
        let units = Value::Array(vec![json!({"kind": "scv"}); 5_000]);
        assert_eq!(sanitize_units(Some(&units)).len(), MAX_UNITS);
    }
}
