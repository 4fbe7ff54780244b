use crate::engine::Engine;

use super::ImportTable;
use super::guests::{FIRST_NAME, LAST_NAME};
use super::rooms::{BEDS, MAX_OCCUPANCY, NAME, PRICE_PER_NIGHT, ROOM_TYPE};
use super::schema::*;

/// Export columns. Everything `reconcile_import` reads comes first; the tail is informational.
pub const EXPORT_HEADER: [&str; 13] = [
    GUEST_FIRST_NAME,
    GUEST_LAST_NAME,
    EMAIL,
    PHONE,
    ROOM_NAME,
    CHECK_IN,
    CHECK_OUT,
    STATUS,
    TOTAL_AMOUNT,
    AMOUNT_PAID,
    "bedLabel",
    "paymentStatus",
    "confirmationCode",
];

/// Room export columns, readable by `reconcile_room_import`.
pub const ROOM_EXPORT_HEADER: [&str; 6] = [NAME, ROOM_TYPE, BEDS, PRICE_PER_NIGHT, MAX_OCCUPANCY, STATUS];

/// Guest export columns, readable by `reconcile_guest_import`.
pub const GUEST_EXPORT_HEADER: [&str; 4] = [FIRST_NAME, LAST_NAME, EMAIL, PHONE];

impl Engine {
    /// Every guest as a table, in creation order.
    pub fn export_guests(&self) -> ImportTable {
        let rows = self
            .list_guests()
            .into_iter()
            .map(|g| {
                vec![
                    g.first_name,
                    g.last_name,
                    g.email.unwrap_or_default(),
                    g.phone.unwrap_or_default(),
                ]
            })
            .collect();
        ImportTable {
            header: GUEST_EXPORT_HEADER.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    /// Every room as a table, sorted by name.
    pub fn export_rooms(&self) -> ImportTable {
        let rows = self
            .list_rooms()
            .into_iter()
            .map(|room| {
                vec![
                    room.name,
                    room.room_type.as_str().to_string(),
                    room.capacity_beds.to_string(),
                    room.price_per_night.to_string(),
                    room.max_occupancy.to_string(),
                    room.status.to_string(),
                ]
            })
            .collect();
        ImportTable {
            header: ROOM_EXPORT_HEADER.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }

    /// Every stay as an import-compatible table, ordered by check-in.
    pub fn export_stays(&self) -> ImportTable {
        let rows = self
            .list_stays()
            .into_iter()
            .filter_map(|stay| {
                let room = self.room_for_stay(stay.id).ok()?;
                let guest = self.get_guest(stay.guest_id).ok()?;
                let bed_label = self
                    .assignments_for_stay(stay.id)
                    .ok()?
                    .into_iter()
                    .next()
                    .map(|a| a.bed_label)
                    .unwrap_or_default();
                Some(vec![
                    guest.first_name,
                    guest.last_name,
                    guest.email.unwrap_or_default(),
                    guest.phone.unwrap_or_default(),
                    room.name,
                    stay.range.check_in.to_string(),
                    stay.range.check_out.to_string(),
                    stay.state.to_string(),
                    stay.total_amount.to_string(),
                    stay.amount_paid.to_string(),
                    bed_label,
                    stay.payment_state.as_str().to_string(),
                    stay.confirmation_code,
                ])
            })
            .collect();

        ImportTable {
            header: EXPORT_HEADER.iter().map(|h| h.to_string()).collect(),
            rows,
        }
    }
}
