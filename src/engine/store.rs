use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedRoomState;

/// In-memory datastore for one property. Rooms hold their occupancy behind a
/// per-room lock; everything else is plain concurrent maps.
pub struct InMemoryStore {
    rooms: DashMap<Ulid, SharedRoomState>,
    /// Lock-free copy of each room's immutable description.
    room_info: DashMap<Ulid, Room>,
    /// Lowercased room name → room id.
    room_names: DashMap<String, Ulid>,
    guests: DashMap<Ulid, Guest>,
    stays: DashMap<Ulid, Stay>,
    /// Stay id → room id.
    stay_room: DashMap<Ulid, Ulid>,
    assignments: DashMap<Ulid, Vec<BedAssignment>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            room_info: DashMap::new(),
            room_names: DashMap::new(),
            guests: DashMap::new(),
            stays: DashMap::new(),
            stay_room: DashMap::new(),
            assignments: DashMap::new(),
        }
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn insert_room(&self, room: Room) {
        self.room_names.insert(room.name.to_lowercase(), room.id);
        self.room_info.insert(room.id, room.clone());
        self.rooms.insert(room.id, Arc::new(RwLock::new(RoomState::new(room))));
    }

    pub fn get_room_state(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn get_room(&self, id: &Ulid) -> Option<Room> {
        self.room_info.get(id).map(|e| e.value().clone())
    }

    pub fn room_id_by_name(&self, name: &str) -> Option<Ulid> {
        self.room_names.get(&name.trim().to_lowercase()).map(|e| *e.value())
    }

    /// Rooms in creation order.
    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms: Vec<Room> = self.room_info.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    // ── Guests ───────────────────────────────────────────────

    pub fn insert_guest(&self, guest: Guest) {
        self.guests.insert(guest.id, guest);
    }

    pub fn get_guest(&self, id: &Ulid) -> Option<Guest> {
        self.guests.get(id).map(|e| e.value().clone())
    }

    pub fn contains_guest(&self, id: &Ulid) -> bool {
        self.guests.contains_key(id)
    }

    /// Guests in creation order.
    pub fn guests(&self) -> Vec<Guest> {
        let mut guests: Vec<Guest> = self.guests.iter().map(|e| e.value().clone()).collect();
        guests.sort_by_key(|g| g.id);
        guests
    }

    // ── Stays ────────────────────────────────────────────────

    pub fn get_stay(&self, id: &Ulid) -> Option<Stay> {
        self.stays.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_stay(&self, stay_id: &Ulid) -> Option<Ulid> {
        self.stay_room.get(stay_id).map(|e| *e.value())
    }

    pub fn assignments_for_stay(&self, stay_id: &Ulid) -> Vec<BedAssignment> {
        self.assignments
            .get(stay_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn stays(&self) -> Vec<Stay> {
        self.stays.iter().map(|e| e.value().clone()).collect()
    }

    pub fn stay_count(&self) -> usize {
        self.stays.len()
    }

    // ── Event application ────────────────────────────────────

    /// Apply a room-scoped event. Caller holds the room's write lock.
    pub fn apply_event(&self, rs: &mut RoomState, event: &Event) {
        match event {
            Event::StayCommitted {
                stay,
                room_id,
                assignments,
            } => {
                for assignment in assignments {
                    rs.insert_occupancy(Occupancy {
                        assignment: assignment.clone(),
                        range: stay.range,
                        state: stay.state,
                    });
                }
                self.stays.insert(stay.id, stay.clone());
                self.stay_room.insert(stay.id, *room_id);
                self.assignments.insert(stay.id, assignments.clone());
            }
            Event::StayStateChanged { id, state, .. } => {
                rs.set_stay_state(*id, *state);
                if let Some(mut stay) = self.stays.get_mut(id) {
                    stay.state = *state;
                }
            }
            Event::PaymentRecorded {
                id,
                amount_paid,
                payment_state,
                ..
            } => {
                if let Some(mut stay) = self.stays.get_mut(id) {
                    stay.amount_paid = *amount_paid;
                    stay.payment_state = *payment_state;
                }
            }
            Event::RoomStatusChanged { room_id, status } => {
                rs.room.status = *status;
                rs.version += 1;
                if let Some(mut room) = self.room_info.get_mut(room_id) {
                    room.status = *status;
                }
            }
            // Registry events are applied at the map level
            Event::RoomCreated { .. } | Event::GuestCreated { .. } => {}
        }
    }

    /// Minimal event list that recreates the current state.
    /// Callers must exclude concurrent writers while this runs.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .rooms()
            .into_iter()
            .map(|room| Event::RoomCreated { room })
            .collect();
        events.extend(self.guests().into_iter().map(|guest| Event::GuestCreated { guest }));

        let mut stays = self.stays();
        stays.sort_by_key(|s| s.id);
        for stay in stays {
            let Some(room_id) = self.room_for_stay(&stay.id) else {
                continue;
            };
            let assignments = self.assignments_for_stay(&stay.id);
            events.push(Event::StayCommitted {
                stay,
                room_id,
                assignments,
            });
        }
        events
    }
}

/// The room a room-scoped event belongs to.
pub(super) fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::StayCommitted { room_id, .. }
        | Event::StayStateChanged { room_id, .. }
        | Event::PaymentRecorded { room_id, .. }
        | Event::RoomStatusChanged { room_id, .. } => Some(*room_id),
        Event::RoomCreated { .. } | Event::GuestCreated { .. } => None,
    }
}
