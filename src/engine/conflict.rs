use crate::limits::*;
use crate::model::*;

use super::availability::{available_bed_labels, can_allocate_beds, unheld_bed_labels};
use super::EngineError;

pub(crate) fn validate_range(range: &DateRange) -> Result<(), EngineError> {
    if range.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

pub(crate) fn validate_window(range: &DateRange) -> Result<(), EngineError> {
    if range.nights() > MAX_QUERY_WINDOW_DAYS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

pub(crate) fn validate_draft(draft: &StayDraft) -> Result<(), EngineError> {
    if draft.beds == 0 {
        return Err(EngineError::Validation("a stay needs at least one bed".into()));
    }
    if draft.beds > MAX_BEDS_PER_STAY {
        return Err(EngineError::LimitExceeded("too many beds in one stay"));
    }
    if let Some(label) = &draft.bed_label
        && label.len() > MAX_LABEL_LEN {
            return Err(EngineError::LimitExceeded("bed label too long"));
        }
    if draft.total_amount.is_some_and(|t| t < 0) || draft.amount_paid < 0 {
        return Err(EngineError::Validation("amounts must not be negative".into()));
    }
    Ok(())
}

/// Re-validate occupancy under the room's write lock and pick the beds.
///
/// `existing` is the room's current overlapping occupancy. `observed_version` is the
/// version the caller's availability read saw; if the beds are gone and the room moved
/// since then, the caller lost a race and gets `ConcurrencyConflict`.
pub(crate) fn pick_beds(
    rs: &RoomState,
    range: &DateRange,
    existing: &[Occupancy],
    active: &ActiveSet,
    draft: &StayDraft,
    observed_version: u64,
) -> Result<Vec<String>, EngineError> {
    let room = &rs.room;
    let occupying = active.contains(draft.state);

    if let Some(label) = &draft.bed_label
        && !room.labels().contains(label) {
            return Err(EngineError::Validation(format!(
                "room '{}' has no bed '{label}'",
                room.name
            )));
        }

    if !occupying {
        // Never holds capacity: any bed not actively held, else the room's first beds
        let mut labels = match &draft.bed_label {
            Some(label) => vec![label.clone()],
            None => unheld_bed_labels(room, range, existing, active),
        };
        labels.truncate(draft.beds as usize);
        for label in room.labels().into_iter().cycle() {
            if labels.len() >= draft.beds as usize {
                break;
            }
            labels.push(label);
        }
        return Ok(labels);
    }

    let check = can_allocate_beds(room, range, existing, active, draft.beds);
    if !check.allowed {
        if rs.version != observed_version {
            return Err(EngineError::ConcurrencyConflict(room.id));
        }
        return Err(EngineError::Capacity {
            room: room.name.clone(),
            capacity: room.capacity_beds,
        });
    }

    let free = available_bed_labels(room, range, existing, active);
    let mut labels = Vec::with_capacity(draft.beds as usize);
    if let Some(label) = &draft.bed_label {
        if !free.contains(label) {
            return Err(EngineError::Validation(format!(
                "bed '{label}' in room '{}' is taken for {range}",
                room.name
            )));
        }
        labels.push(label.clone());
    }
    labels.extend(
        free.into_iter()
            .filter(|l| Some(l) != draft.bed_label.as_ref())
            .take(draft.beds as usize - labels.len()),
    );
    if labels.len() < draft.beds as usize {
        // Capacity allows it but duplicate legacy labels hide free beds
        return Err(EngineError::Capacity {
            room: room.name.clone(),
            capacity: room.capacity_beds,
        });
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn range(a: u32, b: u32) -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2025, 9, a).unwrap(),
            NaiveDate::from_ymd_opt(2025, 9, b).unwrap(),
        )
        .unwrap()
    }

    fn room_state(capacity: u32) -> RoomState {
        RoomState::new(Room {
            id: Ulid::new(),
            name: "Dorm".into(),
            room_type: RoomType::Dormitory,
            capacity_beds: capacity,
            price_per_night: 2000,
            max_occupancy: capacity,
            bed_labels: BedLabels::Numbered,
            status: RoomStatus::Available,
        })
    }

    fn hold(rs: &mut RoomState, label: &str, r: DateRange) {
        let room_id = rs.room.id;
        rs.insert_occupancy(Occupancy {
            assignment: BedAssignment {
                id: Ulid::new(),
                stay_id: Ulid::new(),
                room_id,
                bed_label: label.into(),
                price_per_night: 2000,
            },
            range: r,
            state: LifecycleState::Confirmed,
        });
    }

    fn existing(rs: &RoomState, r: &DateRange) -> Vec<Occupancy> {
        rs.overlapping(r).cloned().collect()
    }

    #[test]
    fn stale_read_is_a_conflict_fresh_read_is_capacity() {
        let mut rs = room_state(1);
        let observed = rs.version;
        hold(&mut rs, "1", range(1, 5));
        let ex = existing(&rs, &range(2, 3));
        let draft = StayDraft::new(Ulid::new());
        let active = ActiveSet::default();

        assert!(matches!(
            pick_beds(&rs, &range(2, 3), &ex, &active, &draft, observed),
            Err(EngineError::ConcurrencyConflict(_))
        ));
        assert!(matches!(
            pick_beds(&rs, &range(2, 3), &ex, &active, &draft, rs.version),
            Err(EngineError::Capacity { .. })
        ));
    }

    #[test]
    fn preferred_label_must_exist_and_be_free() {
        let mut rs = room_state(3);
        hold(&mut rs, "2", range(1, 5));
        let ex = existing(&rs, &range(1, 5));
        let active = ActiveSet::default();
        let mut draft = StayDraft::new(Ulid::new());

        draft.bed_label = Some("9".into());
        assert!(matches!(
            pick_beds(&rs, &range(1, 5), &ex, &active, &draft, rs.version),
            Err(EngineError::Validation(_))
        ));
        draft.bed_label = Some("2".into());
        assert!(pick_beds(&rs, &range(1, 5), &ex, &active, &draft, rs.version).is_err());
        draft.bed_label = Some("3".into());
        draft.beds = 2;
        assert_eq!(
            pick_beds(&rs, &range(1, 5), &ex, &active, &draft, rs.version).unwrap(),
            vec!["3", "1"]
        );
    }

    #[test]
    fn inactive_draft_gets_a_label_even_when_full() {
        let mut rs = room_state(1);
        hold(&mut rs, "1", range(1, 5));
        let ex = existing(&rs, &range(1, 5));
        let mut draft = StayDraft::new(Ulid::new());
        draft.state = LifecycleState::Cancelled;
        let labels =
            pick_beds(&rs, &range(1, 5), &ex, &ActiveSet::default(), &draft, rs.version).unwrap();
        assert_eq!(labels, vec!["1"]);
    }

    #[test]
    fn draft_validation() {
        let mut draft = StayDraft::new(Ulid::new());
        draft.beds = 0;
        assert!(validate_draft(&draft).is_err());
        draft.beds = MAX_BEDS_PER_STAY + 1;
        assert!(matches!(validate_draft(&draft), Err(EngineError::LimitExceeded(_))));
        draft.beds = 1;
        draft.amount_paid = -5;
        assert!(validate_draft(&draft).is_err());
    }

    #[test]
    fn overly_long_stay_rejected() {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let long = DateRange::new(start, start + chrono::Duration::days(MAX_STAY_NIGHTS + 1)).unwrap();
        assert!(matches!(validate_range(&long), Err(EngineError::LimitExceeded(_))));
    }
}
