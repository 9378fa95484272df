//! PUT/GET request handling (spec §4.5, §4.6): pure functions over
//! [`AggregatorState`] plus the wall-clock instant, so they're unit
//! testable without a socket in the loop.

use crate::codec::Request;
use crate::error::{AggError, ClientFormatError};
use crate::model::AggregatorState;
use std::time::SystemTime;

/// Header carrying the sender's view of the logical clock on both PUT and
/// GET requests (spec §4.5 step 1, §4.6 step 1).
fn parse_lamport_header(req: &Request) -> u64 {
    req.header("LamportClock")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Runs the full PUT algorithm (spec §4.5) and returns the response line.
pub fn handle_put(state: &mut AggregatorState, req: &Request, now: SystemTime) -> String {
    match try_put(state, req, now) {
        Ok(()) => "200 OK".to_string(),
        Err(e) => e.response_line(),
    }
}

fn try_put(state: &mut AggregatorState, req: &Request, now: SystemTime) -> Result<(), AggError> {
    let remote_clock = parse_lamport_header(req);
    state.clock.observe(remote_clock);

    let producer = req
        .header("ServerId")
        .filter(|v| !v.is_empty())
        .ok_or(ClientFormatError::NullServerId)?
        .to_string();

    let body: serde_json::Value =
        serde_json::from_slice(&req.body).map_err(|_| ClientFormatError::JsonError)?;

    let station = body
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or(ClientFormatError::NullStationId)?
        .to_string();

    state.apply_put(station, remote_clock, producer, body, now);
    Ok(())
}

/// Runs the full GET algorithm (spec §4.6) and returns the response line:
/// either a `404`/error line or the stored observation's raw JSON body.
pub fn handle_get(state: &mut AggregatorState, req: &Request, now: SystemTime) -> String {
    match try_get(state, req, now) {
        Ok(body) => body.to_string(),
        Err(e) => e.response_line(),
    }
}

fn try_get(
    state: &mut AggregatorState,
    req: &Request,
    now: SystemTime,
) -> Result<serde_json::Value, AggError> {
    let remote_clock = parse_lamport_header(req);
    state.clock.observe(remote_clock);

    let requested_station = req.header("StationId").filter(|v| !v.is_empty());
    let station = match requested_station {
        Some(s) => s.to_string(),
        None => {
            let (station, _) = state.most_recent.clone().ok_or(AggError::LookupMiss)?;
            station
        }
    };

    let bucket = state
        .buckets
        .get(&station)
        .filter(|b| !b.is_empty())
        .ok_or(AggError::LookupMiss)?;

    let observation = bucket
        .visible(remote_clock, &state.liveness, now, state.expiry_window)
        .ok_or(AggError::LookupMiss)?;

    Ok(observation.body.clone())
}
