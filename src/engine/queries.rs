use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::tax::{TaxRequest, TaxResult};

use super::availability::{
    available_bed_labels, can_allocate_beds, fully_booked_ranges, room_occupancy,
};
use super::conflict::{validate_range, validate_window};
use super::{Engine, EngineError};

impl Engine {
    /// Can one more bed in the room be booked for `range`, and which beds are free?
    pub async fn check_availability(
        &self,
        room_id: Ulid,
        range: DateRange,
    ) -> Result<Availability, EngineError> {
        validate_range(&range)?;
        self.availability_snapshot(room_id, &range, 1).await
    }

    /// Availability for `beds` beds, stamped with the room version it was read at.
    pub(super) async fn availability_snapshot(
        &self,
        room_id: Ulid,
        range: &DateRange,
        beds: u32,
    ) -> Result<Availability, EngineError> {
        let rs = self
            .store
            .get_room_state(&room_id)
            .ok_or_else(|| EngineError::not_found("room", room_id))?;
        let guard = rs.read().await;
        let existing: Vec<Occupancy> = guard.overlapping(range).cloned().collect();
        let active = &self.config.active;
        let check = can_allocate_beds(&guard.room, range, &existing, active, beds);
        Ok(Availability {
            room_id,
            allowed: check.allowed,
            occupied_count: check.occupied_count,
            available_bed_labels: available_bed_labels(&guard.room, range, &existing, active),
            room_version: guard.version,
        })
    }

    /// Sub-ranges of `window` where the room has no free bed.
    pub async fn fully_booked_ranges(
        &self,
        room_id: Ulid,
        window: DateRange,
    ) -> Result<Vec<DateRange>, EngineError> {
        validate_window(&window)?;
        let rs = self
            .store
            .get_room_state(&room_id)
            .ok_or_else(|| EngineError::not_found("room", room_id))?;
        let guard = rs.read().await;
        let existing: Vec<Occupancy> = guard.overlapping(&window).cloned().collect();
        Ok(fully_booked_ranges(&guard.room, &window, &existing, &self.config.active))
    }

    /// Per-room and property-wide occupancy for the night starting on `date`,
    /// rooms sorted by name.
    pub async fn occupancy_on(&self, date: NaiveDate) -> Result<OccupancyReport, EngineError> {
        let next = date
            .succ_opt()
            .ok_or_else(|| EngineError::Validation(format!("no night follows {date}")))?;
        let night = DateRange::new(date, next)?;

        let mut rooms = Vec::new();
        for room in self.list_rooms() {
            let Some(rs) = self.store.get_room_state(&room.id) else {
                continue;
            };
            let guard = rs.read().await;
            let existing: Vec<Occupancy> = guard.overlapping(&night).cloned().collect();
            rooms.push(room_occupancy(&guard.room, &night, &existing, &self.config.active));
        }

        let total_beds: u32 = rooms.iter().map(|r| r.total_beds).sum();
        let occupied_beds: u32 = rooms.iter().map(|r| r.occupied_beds).sum();
        Ok(OccupancyReport {
            date,
            total_beds,
            occupied_beds,
            available_beds: rooms.iter().map(|r| r.available_beds).sum(),
            occupation_rate: occupation_rate(occupied_beds, total_beds),
            status: OccupationStatus::from_counts(occupied_beds, total_beds),
            rooms,
        })
    }

    /// Tourist tax for a stay, using this property's rate table.
    pub fn compute_tax(&self, request: &TaxRequest) -> Result<TaxResult, EngineError> {
        self.config.tax.calculate(request)
    }

    // ── Registry lookups ─────────────────────────────────────

    pub fn get_room(&self, id: Ulid) -> Result<Room, EngineError> {
        self.store
            .get_room(&id)
            .ok_or_else(|| EngineError::not_found("room", id))
    }

    /// Rooms sorted by name.
    pub fn list_rooms(&self) -> Vec<Room> {
        let mut rooms = self.store.rooms();
        rooms.sort_by_key(|r| r.name.to_lowercase());
        rooms
    }

    /// Case-insensitive, surrounding whitespace ignored.
    pub fn find_room_by_name(&self, name: &str) -> Option<Room> {
        self.store
            .room_id_by_name(name)
            .and_then(|id| self.store.get_room(&id))
    }

    pub fn get_guest(&self, id: Ulid) -> Result<Guest, EngineError> {
        self.store
            .get_guest(&id)
            .ok_or_else(|| EngineError::not_found("guest", id))
    }

    /// Guests in creation order.
    pub fn list_guests(&self) -> Vec<Guest> {
        self.store.guests()
    }

    /// Earliest-created guest with this email, case-insensitive.
    pub fn find_guest_by_email(&self, email: &str) -> Option<Guest> {
        let needle = email.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.store.guests().into_iter().find(|g| {
            g.email
                .as_ref()
                .is_some_and(|e| e.to_lowercase() == needle)
        })
    }

    /// Earliest-created guest with this first and last name, case-insensitive.
    pub fn find_guest_by_name(&self, first_name: &str, last_name: &str) -> Option<Guest> {
        let needle = name_key(first_name, last_name);
        self.store
            .guests()
            .into_iter()
            .find(|g| g.name_key() == needle)
    }

    // ── Stays ────────────────────────────────────────────────

    pub fn get_stay(&self, id: Ulid) -> Result<Stay, EngineError> {
        self.store
            .get_stay(&id)
            .ok_or_else(|| EngineError::not_found("stay", id))
    }

    /// Every stay, by check-in then id.
    pub fn list_stays(&self) -> Vec<Stay> {
        let mut stays = self.store.stays();
        stays.sort_by_key(|s| (s.range.check_in, s.id));
        stays
    }

    /// Stays with a bed in `room_id`, optionally limited to those overlapping `range`
    /// and to a set of states. Sorted by check-in.
    pub async fn stays_for_room(
        &self,
        room_id: Ulid,
        range: Option<DateRange>,
        states: Option<&[LifecycleState]>,
    ) -> Result<Vec<Stay>, EngineError> {
        let rs = self
            .store
            .get_room_state(&room_id)
            .ok_or_else(|| EngineError::not_found("room", room_id))?;
        let guard = rs.read().await;

        let stay_ids: Vec<Ulid> = match &range {
            Some(r) => guard.overlapping(r).map(|o| o.assignment.stay_id).collect(),
            None => guard.occupancies.iter().map(|o| o.assignment.stay_id).collect(),
        };
        // Multi-bed stays appear once per bed
        let mut seen = std::collections::HashSet::new();
        let mut stays: Vec<Stay> = stay_ids
            .into_iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| self.store.get_stay(&id))
            .filter(|s| states.is_none_or(|wanted| wanted.contains(&s.state)))
            .collect();
        stays.sort_by_key(|s| (s.range.check_in, s.id));
        Ok(stays)
    }

    pub fn assignments_for_stay(&self, stay_id: Ulid) -> Result<Vec<BedAssignment>, EngineError> {
        if self.store.get_stay(&stay_id).is_none() {
            return Err(EngineError::not_found("stay", stay_id));
        }
        Ok(self.store.assignments_for_stay(&stay_id))
    }

    /// The room a stay's beds are in.
    pub fn room_for_stay(&self, stay_id: Ulid) -> Result<Room, EngineError> {
        let room_id = self
            .store
            .room_for_stay(&stay_id)
            .ok_or_else(|| EngineError::not_found("stay", stay_id))?;
        self.get_room(room_id)
    }
}
