//! Structural and semantic validation of typed state payloads
//!
//! Validators are pure and never panic or throw: they return `Ok(())` or a
//! message the caller chooses how to surface. Validation is accept/reject,
//! never partial correction.

use chrono::{DateTime, FixedOffset};

use super::command::{TimeState, ViewportState};

/// Validate a [`TimeState`]: all three timestamps must parse, `start` must
/// not follow `end`, and `current` must lie within `[start, end]` inclusive.
pub fn validate_time_state(state: &TimeState) -> Result<(), String> {
    let current = parse_timestamp("current", &state.current)?;
    let start = parse_timestamp("start", &state.start)?;
    let end = parse_timestamp("end", &state.end)?;

    if start > end {
        return Err(format!(
            "start {} is after end {}",
            state.start, state.end
        ));
    }
    if current < start || current > end {
        return Err(format!(
            "current {} falls outside [{}, {}]",
            state.current, state.start, state.end
        ));
    }
    Ok(())
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map_err(|err| format!("{field} '{raw}' is not a valid timestamp: {err}"))
}

/// Validate a [`ViewportState`]: `bounds` must be exactly four finite
/// numbers `[west, south, east, north]` with latitudes in [-90, 90] and
/// longitudes in [-180, 180], and `south <= north`. `west > east` is
/// accepted: the box crosses the antimeridian.
pub fn validate_viewport(state: &ViewportState) -> Result<(), String> {
    let bounds = &state.bounds;
    if bounds.len() != 4 {
        return Err(format!(
            "bounds must contain exactly four numbers [west, south, east, north], got {}",
            bounds.len()
        ));
    }
    if bounds.iter().any(|value| !value.is_finite()) {
        return Err("bounds must contain finite numbers".to_string());
    }

    let (west, south, east, north) = (bounds[0], bounds[1], bounds[2], bounds[3]);
    for (name, latitude) in [("south", south), ("north", north)] {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("{name} {latitude} outside [-90, 90]"));
        }
    }
    for (name, longitude) in [("west", west), ("east", east)] {
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("{name} {longitude} outside [-180, 180]"));
        }
    }
    if south > north {
        return Err(format!("south {south} is greater than north {north}"));
    }
    Ok(())
}

/// Validate an explicit filename target: must not be empty or whitespace.
pub fn validate_filename(filename: &str) -> Result<(), String> {
    if filename.trim().is_empty() {
        Err("filename must not be empty".to_string())
    } else {
        Ok(())
    }
}
