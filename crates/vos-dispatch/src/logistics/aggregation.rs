//! Derived route state computed from the stop list on every mutation.
//!
//! Nothing here is cached: completion and the in-progress pointer are recomputed from the
//! stops each time, so a retried event converges on the same answer.

use std::collections::BTreeMap;

use super::domain::{JobId, Stop};
use super::status::{StopStatus, StopType};

/// A route is complete only when it has stops and every one of them is completed.
pub fn all_stops_completed(stops: &[Stop]) -> bool {
    !stops.is_empty() && stops.iter().all(|stop| stop.status == StopStatus::Completed)
}

pub fn in_progress_count(stops: &[Stop]) -> usize {
    stops
        .iter()
        .filter(|stop| stop.status == StopStatus::InProgress)
        .count()
}

fn next_pending_index(stops: &[Stop]) -> Option<usize> {
    stops
        .iter()
        .enumerate()
        .filter(|(_, stop)| stop.status == StopStatus::Pending)
        .min_by_key(|(_, stop)| stop.sequence)
        .map(|(index, _)| index)
}

/// Move the lowest-sequence pending stop to in progress unless a stop already is.
///
/// Returns the sequence of the stop that changed.
pub fn activate_first_pending(stops: &mut [Stop]) -> Option<u32> {
    if in_progress_count(stops) > 0 {
        return None;
    }
    let index = next_pending_index(stops)?;
    stops[index].status = StopStatus::InProgress;
    Some(stops[index].sequence)
}

/// Hand the in-progress pointer to the next pending stop once the current one completes.
pub fn advance_after_completion(stops: &mut [Stop]) -> Option<u32> {
    activate_first_pending(stops)
}

/// Every drop stop serving the job is completed (and there is at least one).
pub fn drop_stops_completed(stops: &[Stop], job_id: &JobId) -> bool {
    let mut drops = stops
        .iter()
        .filter(|stop| stop.stop_type == StopType::Drop && stop.serves(job_id))
        .peekable();
    drops.peek().is_some() && drops.all(|stop| stop.status == StopStatus::Completed)
}

/// Order by sequence and rewrite sequences to 1..N, keeping relative order.
pub fn renumber(stops: &mut Vec<Stop>) {
    stops.sort_by_key(|stop| stop.sequence);
    for (index, stop) in stops.iter_mut().enumerate() {
        stop.sequence = index as u32 + 1;
    }
}

/// Stops arriving without a sequence take their list position, then the list is ordered.
pub fn normalize_sequence(stops: &mut [Stop]) {
    for (index, stop) in stops.iter_mut().enumerate() {
        if stop.sequence == 0 {
            stop.sequence = index as u32 + 1;
        }
    }
    stops.sort_by_key(|stop| stop.sequence);
}

/// Drop every stop serving the job and close the gaps in the sequence.
///
/// Returns how many stops were removed.
pub fn remove_job_stops(stops: &mut Vec<Stop>, job_id: &JobId) -> usize {
    let before = stops.len();
    stops.retain(|stop| !stop.serves(job_id));
    renumber(stops);
    before - stops.len()
}

/// Violations of the stop-plan invariants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StopPlanError {
    #[error("stop sequences must run 1..{expected} without gaps, found {found:?}")]
    NonContiguousSequence { expected: usize, found: Vec<u32> },
    #[error("{stop_type} stop at sequence {sequence} must reference a transport job")]
    MissingJob { sequence: u32, stop_type: StopType },
    #[error("{stop_type} stop at sequence {sequence} cannot reference a transport job")]
    UnexpectedJob { sequence: u32, stop_type: StopType },
    #[error("transport job {job_id} needs exactly one pickup and one drop stop")]
    UnbalancedJob { job_id: JobId },
    #[error("transport job {job_id} is dropped before it is picked up")]
    DropBeforePickup { job_id: JobId },
}

#[derive(Default)]
struct JobStops {
    pickups: Vec<u32>,
    drops: Vec<u32>,
}

/// Check the route-level stop invariants. Expects sequences already normalized.
pub fn validate_stop_plan(stops: &[Stop]) -> Result<(), StopPlanError> {
    let mut sequences: Vec<u32> = stops.iter().map(|stop| stop.sequence).collect();
    sequences.sort_unstable();
    let contiguous = sequences
        .iter()
        .enumerate()
        .all(|(index, sequence)| *sequence == index as u32 + 1);
    if !contiguous {
        return Err(StopPlanError::NonContiguousSequence {
            expected: stops.len(),
            found: sequences,
        });
    }

    let mut per_job: BTreeMap<&JobId, JobStops> = BTreeMap::new();
    for stop in stops {
        match (stop.stop_type.requires_job(), stop.transport_job_id.as_ref()) {
            (true, None) => {
                return Err(StopPlanError::MissingJob {
                    sequence: stop.sequence,
                    stop_type: stop.stop_type,
                })
            }
            (false, Some(_)) => {
                return Err(StopPlanError::UnexpectedJob {
                    sequence: stop.sequence,
                    stop_type: stop.stop_type,
                })
            }
            (true, Some(job_id)) => {
                let entry = per_job.entry(job_id).or_default();
                if stop.stop_type == StopType::Pickup {
                    entry.pickups.push(stop.sequence);
                } else {
                    entry.drops.push(stop.sequence);
                }
            }
            (false, None) => {}
        }
    }

    for (job_id, job_stops) in per_job {
        match (job_stops.pickups.as_slice(), job_stops.drops.as_slice()) {
            ([pickup], [drop]) if pickup < drop => {}
            ([_], [_]) => {
                return Err(StopPlanError::DropBeforePickup {
                    job_id: job_id.clone(),
                })
            }
            _ => {
                return Err(StopPlanError::UnbalancedJob {
                    job_id: job_id.clone(),
                })
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: &str) -> JobId {
        JobId::from(id)
    }

    fn plan() -> Vec<Stop> {
        vec![
            Stop::new(StopType::Pickup, Some(job("a")), 1),
            Stop::new(StopType::Pickup, Some(job("b")), 2),
            Stop::new(StopType::Rest, None, 3),
            Stop::new(StopType::Drop, Some(job("a")), 4),
            Stop::new(StopType::Drop, Some(job("b")), 5),
        ]
    }

    #[test]
    fn completion_requires_every_stop() {
        let mut stops = plan();
        assert!(!all_stops_completed(&stops));
        for stop in &mut stops {
            stop.status = StopStatus::Completed;
        }
        assert!(all_stops_completed(&stops));
        stops[2].status = StopStatus::Skipped;
        assert!(!all_stops_completed(&stops));
        assert!(!all_stops_completed(&[]));
    }

    #[test]
    fn activation_picks_lowest_pending_sequence() {
        let mut stops = plan();
        stops.reverse();
        assert_eq!(activate_first_pending(&mut stops), Some(1));
        assert_eq!(in_progress_count(&stops), 1);
        // A second activation is a no-op while a stop is in progress.
        assert_eq!(activate_first_pending(&mut stops), None);
    }

    #[test]
    fn advance_moves_pointer_past_completed_stops() {
        let mut stops = plan();
        stops[0].status = StopStatus::Completed;
        stops[1].status = StopStatus::Skipped;
        assert_eq!(advance_after_completion(&mut stops), Some(3));
        assert_eq!(stops[2].status, StopStatus::InProgress);

        for stop in &mut stops {
            stop.status = StopStatus::Completed;
        }
        assert_eq!(advance_after_completion(&mut stops), None);
    }

    #[test]
    fn drop_completion_is_per_job() {
        let mut stops = plan();
        stops[3].status = StopStatus::Completed;
        assert!(drop_stops_completed(&stops, &job("a")));
        assert!(!drop_stops_completed(&stops, &job("b")));
        assert!(!drop_stops_completed(&stops, &job("missing")));
    }

    #[test]
    fn removing_a_job_renumbers_remaining_stops() {
        let mut stops = plan();
        assert_eq!(remove_job_stops(&mut stops, &job("a")), 2);
        let summary: Vec<(u32, StopType)> = stops
            .iter()
            .map(|stop| (stop.sequence, stop.stop_type))
            .collect();
        assert_eq!(
            summary,
            vec![(1, StopType::Pickup), (2, StopType::Rest), (3, StopType::Drop)]
        );
        assert!(validate_stop_plan(&stops).is_ok());
    }

    #[test]
    fn normalize_fills_missing_sequences_by_position() {
        let mut stops = vec![
            Stop::new(StopType::Pickup, Some(job("a")), 0),
            Stop::new(StopType::Drop, Some(job("a")), 0),
        ];
        normalize_sequence(&mut stops);
        assert_eq!(stops[0].sequence, 1);
        assert_eq!(stops[1].sequence, 2);
        assert!(validate_stop_plan(&stops).is_ok());
    }

    #[test]
    fn validation_rejects_broken_plans() {
        let mut gap = plan();
        gap[4].sequence = 7;
        assert!(matches!(
            validate_stop_plan(&gap),
            Err(StopPlanError::NonContiguousSequence { expected: 5, .. })
        ));

        let mut orphan_drop = plan();
        orphan_drop[3].transport_job_id = None;
        assert_eq!(
            validate_stop_plan(&orphan_drop),
            Err(StopPlanError::MissingJob {
                sequence: 4,
                stop_type: StopType::Drop
            })
        );

        let mut busy_break = plan();
        busy_break[2].transport_job_id = Some(job("a"));
        assert!(matches!(
            validate_stop_plan(&busy_break),
            Err(StopPlanError::UnexpectedJob { sequence: 3, .. })
        ));

        let mut missing_drop = plan();
        missing_drop.remove(4);
        assert_eq!(
            validate_stop_plan(&missing_drop),
            Err(StopPlanError::UnbalancedJob { job_id: job("b") })
        );

        let reversed = vec![
            Stop::new(StopType::Drop, Some(job("a")), 1),
            Stop::new(StopType::Pickup, Some(job("a")), 2),
        ];
        assert_eq!(
            validate_stop_plan(&reversed),
            Err(StopPlanError::DropBeforePickup { job_id: job("a") })
        );
    }
}
