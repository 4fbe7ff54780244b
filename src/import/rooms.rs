use std::time::Instant;

use tracing::{debug, info};

use crate::engine::{Engine, EngineError, NewRoom};
use crate::model::*;

use super::schema::{STATUS, cell, check_width, normalize_header, parse_count, parse_money, position};
use super::{ImportReport, ImportTable, check_row_count};

pub const NAME: &str = "name";
pub const ROOM_TYPE: &str = "type";
pub const BEDS: &str = "beds";
pub const PRICE_PER_NIGHT: &str = "pricePerNight";
pub const MAX_OCCUPANCY: &str = "maxOccupancy";

/// Column positions for a room table.
#[derive(Debug, Clone)]
pub struct RoomColumns {
    width: usize,
    name: usize,
    room_type: usize,
    beds: usize,
    price: usize,
    max_occupancy: Option<usize>,
    status: Option<usize>,
}

impl RoomColumns {
    /// `roomName`, `capacity` and `price` are accepted for the first three columns.
    pub fn resolve(header: &[String]) -> Result<Self, EngineError> {
        let normalized = normalize_header(header)?;
        let mut missing = Vec::new();
        let mut require = |names: &[&str]| {
            let pos = position(&normalized, names);
            if pos.is_none() {
                missing.push(names[0].to_string());
            }
            pos.unwrap_or_default()
        };
        let name = require(&[NAME, super::schema::ROOM_NAME]);
        let room_type = require(&[ROOM_TYPE]);
        let beds = require(&[BEDS, "capacity"]);
        let price = require(&[PRICE_PER_NIGHT, "price"]);
        if !missing.is_empty() {
            return Err(EngineError::MissingColumns(missing));
        }

        Ok(Self {
            width: header.len(),
            name,
            room_type,
            beds,
            price,
            max_occupancy: position(&normalized, &[MAX_OCCUPANCY]),
            status: position(&normalized, &[STATUS]),
        })
    }
}

/// One room row after coercion. Range checks are left to `create_room`.
pub fn parse_room_row(columns: &RoomColumns, cells: &[String]) -> Result<NewRoom, EngineError> {
    check_width(columns.width, cells)?;
    let required = |idx: usize, field: &str| {
        cell(cells, Some(idx)).ok_or_else(|| EngineError::Validation(format!("{field} is required")))
    };

    let name = required(columns.name, NAME)?.to_string();
    let room_type: RoomType = required(columns.room_type, ROOM_TYPE)?.parse()?;
    let capacity_beds = parse_count(BEDS, Some(required(columns.beds, BEDS)?))?.unwrap_or_default();
    let price_per_night =
        parse_money(PRICE_PER_NIGHT, Some(required(columns.price, PRICE_PER_NIGHT)?))?.unwrap_or_default();
    let status = match cell(cells, columns.status) {
        Some(s) => s.parse()?,
        None => RoomStatus::Available,
    };

    Ok(NewRoom {
        name,
        room_type,
        capacity_beds,
        price_per_night,
        max_occupancy: parse_count(MAX_OCCUPANCY, cell(cells, columns.max_occupancy))?,
        bed_labels: BedLabels::Numbered,
        status,
    })
}

impl Engine {
    /// Create one room per row. A name already taken, in the property or earlier in
    /// the same table, fails that row only.
    pub async fn reconcile_room_import(&self, table: &ImportTable) -> Result<ImportReport, EngineError> {
        check_row_count(table)?;
        let columns = RoomColumns::resolve(&table.header)?;
        let started = Instant::now();
        info!(rows = table.rows.len(), "room import started");

        let mut report = ImportReport::default();
        for (i, cells) in table.rows.iter().enumerate() {
            let row_index = i + 1;
            let outcome = match parse_room_row(&columns, cells) {
                Ok(new) => self.create_room(new).await,
                Err(e) => Err(e),
            };
            if let Some(room) = report.tally("room", row_index, outcome)? {
                debug!(row_index, room = %room.name, "import row committed");
            }
        }

        metrics::histogram!(crate::observability::IMPORT_DURATION_SECONDS, "entity" => "room")
            .record(started.elapsed().as_secs_f64());
        info!(
            succeeded = report.success_count,
            failed = report.fail_count,
            "room import finished"
        );
        Ok(report)
    }
}
