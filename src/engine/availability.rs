use std::collections::HashSet;

use chrono::NaiveDate;

use crate::model::*;

// ── Bed allocation ────────────────────────────────────────────────

/// Outcome of a capacity check. Zero availability is a normal answer, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationCheck {
    pub allowed: bool,
    pub occupied_count: u32,
}

/// Assignments in `room` whose stay overlaps `range` and still holds its bed.
fn active_overlapping<'a>(
    room: &'a Room,
    range: &'a DateRange,
    existing: &'a [Occupancy],
    active: &'a ActiveSet,
) -> impl Iterator<Item = &'a Occupancy> + 'a {
    existing.iter().filter(move |o| {
        o.assignment.room_id == room.id && active.contains(o.state) && o.range.overlaps(range)
    })
}

pub fn occupied_count(
    room: &Room,
    range: &DateRange,
    existing: &[Occupancy],
    active: &ActiveSet,
) -> u32 {
    active_overlapping(room, range, existing, active).count() as u32
}

/// Can one more bed in `room` be taken for `range`?
pub fn can_allocate(
    room: &Room,
    range: &DateRange,
    existing: &[Occupancy],
    active: &ActiveSet,
) -> AllocationCheck {
    can_allocate_beds(room, range, existing, active, 1)
}

/// Can `beds` more beds in `room` be taken for `range`? Never for a room out of service.
pub fn can_allocate_beds(
    room: &Room,
    range: &DateRange,
    existing: &[Occupancy],
    active: &ActiveSet,
    beds: u32,
) -> AllocationCheck {
    let occupied = occupied_count(room, range, existing, active);
    AllocationCheck {
        allowed: room.status.is_bookable()
            && beds > 0
            && occupied.saturating_add(beds) <= room.capacity_beds,
        occupied_count: occupied,
    }
}

/// Bed labels free for the whole of `range`, at most `capacity - occupied` of them.
///
/// Numbered rooms yield the lowest free numbers first. Custom labels come back in
/// declaration order, which callers must not rely on.
pub fn available_bed_labels(
    room: &Room,
    range: &DateRange,
    existing: &[Occupancy],
    active: &ActiveSet,
) -> Vec<String> {
    if !room.status.is_bookable() {
        return Vec::new();
    }
    let held: HashSet<&str> = active_overlapping(room, range, existing, active)
        .map(|o| o.assignment.bed_label.as_str())
        .collect();
    let occupied = occupied_count(room, range, existing, active);
    let free_slots = room.capacity_beds.saturating_sub(occupied) as usize;
    room.labels()
        .into_iter()
        .filter(|label| !held.contains(label.as_str()))
        .take(free_slots)
        .collect()
}

/// Labels not held by any active overlapping assignment, ignoring the capacity limit.
/// Used to label stays that never occupy a bed (historical cancellations and the like).
pub fn unheld_bed_labels(
    room: &Room,
    range: &DateRange,
    existing: &[Occupancy],
    active: &ActiveSet,
) -> Vec<String> {
    let held: HashSet<&str> = active_overlapping(room, range, existing, active)
        .map(|o| o.assignment.bed_label.as_str())
        .collect();
    room.labels()
        .into_iter()
        .filter(|label| !held.contains(label.as_str()))
        .collect()
}

/// Beds held in `room` on the single night `night`, with the derived rate and status.
pub fn room_occupancy(
    room: &Room,
    night: &DateRange,
    existing: &[Occupancy],
    active: &ActiveSet,
) -> RoomOccupancy {
    let total = room.capacity_beds;
    let occupied = occupied_count(room, night, existing, active).min(total);
    RoomOccupancy {
        room_id: room.id,
        room_name: room.name.clone(),
        room_status: room.status,
        total_beds: total,
        occupied_beds: occupied,
        available_beds: if room.status.is_bookable() { total - occupied } else { 0 },
        occupation_rate: occupation_rate(occupied, total),
        status: OccupationStatus::from_counts(occupied, total),
    }
}

// ── Occupancy calendar ────────────────────────────────────────────

/// Merge sorted overlapping/adjacent ranges into disjoint ranges.
pub fn merge_adjacent(sorted: &[DateRange]) -> Vec<DateRange> {
    let mut merged: Vec<DateRange> = Vec::new();
    for &range in sorted {
        if let Some(last) = merged.last_mut()
            && range.check_in <= last.check_out {
                last.check_out = last.check_out.max(range.check_out);
                continue;
            }
        merged.push(range);
    }
    merged
}

/// Sweep line: sub-ranges of `window` where active occupancy reaches room capacity.
/// Returns sorted, merged ranges.
pub fn fully_booked_ranges(
    room: &Room,
    window: &DateRange,
    existing: &[Occupancy],
    active: &ActiveSet,
) -> Vec<DateRange> {
    if room.capacity_beds == 0 {
        return vec![*window];
    }

    // +1 at check-in, -1 at check-out, clamped to the window
    let mut events: Vec<(NaiveDate, i32)> = Vec::new();
    for o in active_overlapping(room, window, existing, active) {
        events.push((o.range.check_in.max(window.check_in), 1));
        events.push((o.range.check_out.min(window.check_out), -1));
    }
    // Departures sort before arrivals on the same day (half-open ranges)
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut result = Vec::new();
    let mut count: i64 = 0;
    let mut full_since: Option<NaiveDate> = None;
    let capacity = i64::from(room.capacity_beds);

    for (day, delta) in &events {
        count += i64::from(*delta);
        if count >= capacity && full_since.is_none() {
            full_since = Some(*day);
        } else if count < capacity
            && let Some(start) = full_since.take()
            && *day > start {
                result.push(DateRange {
                    check_in: start,
                    check_out: *day,
                });
            }
    }

    merge_adjacent(&result)
}
