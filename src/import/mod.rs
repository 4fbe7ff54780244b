mod export;
mod guests;
mod rooms;
mod schema;

pub use export::{EXPORT_HEADER, GUEST_EXPORT_HEADER, ROOM_EXPORT_HEADER};
pub use guests::{GuestColumns, GuestIndex};
pub use rooms::{RoomColumns, parse_room_row};
pub use schema::{
    Columns, GuestFields, ParsedRow, parse_count, parse_date, parse_money, parse_row,
};

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::engine::{Engine, EngineError, NewGuest};
use crate::limits::MAX_IMPORT_ROWS;
use crate::model::*;

/// Already-tokenized tabular input: one header row plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRow {
    /// 1-based position among the data rows.
    pub row_index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success_count: usize,
    pub fail_count: usize,
    pub failed_rows: Vec<FailedRow>,
}

impl ImportReport {
    /// Count one row's outcome. A journal failure ends the whole run instead.
    pub(crate) fn tally<T>(
        &mut self,
        entity: &'static str,
        row_index: usize,
        outcome: Result<T, EngineError>,
    ) -> Result<Option<T>, EngineError> {
        match outcome {
            Ok(value) => {
                self.success_count += 1;
                metrics::counter!(
                    crate::observability::IMPORT_ROWS_TOTAL,
                    "entity" => entity,
                    "outcome" => "success"
                )
                .increment(1);
                Ok(Some(value))
            }
            Err(e @ EngineError::Journal(_)) => Err(e),
            Err(e) => {
                self.fail_count += 1;
                metrics::counter!(
                    crate::observability::IMPORT_ROWS_TOTAL,
                    "entity" => entity,
                    "outcome" => e.label()
                )
                .increment(1);
                debug!(entity, row_index, reason = %e, "import row failed");
                self.failed_rows.push(FailedRow {
                    row_index,
                    reason: e.reason(),
                });
                Ok(None)
            }
        }
    }
}

/// Guard shared by every import entry point.
pub(crate) fn check_row_count(table: &ImportTable) -> Result<(), EngineError> {
    if table.rows.len() > MAX_IMPORT_ROWS {
        return Err(EngineError::LimitExceeded("too many import rows"));
    }
    Ok(())
}

impl From<GuestFields> for NewGuest {
    fn from(fields: GuestFields) -> Self {
        NewGuest {
            first_name: fields.first_name,
            last_name: fields.last_name,
            email: fields.email,
            phone: fields.phone,
        }
    }
}

impl Engine {
    /// Reconcile a batch of booking rows into committed stays.
    ///
    /// Rows run strictly in order, so each one sees the stays committed by the rows
    /// before it. A bad row lands in the report and the run carries on. Only input-level
    /// faults (missing header columns, oversized input, journal failure) return `Err`.
    pub async fn reconcile_import(&self, table: &ImportTable) -> Result<ImportReport, EngineError> {
        check_row_count(table)?;
        let columns = Columns::resolve(&table.header)?;
        let started = Instant::now();
        info!(rows = table.rows.len(), "booking import started");

        let rooms: HashMap<String, Room> = self
            .list_rooms()
            .into_iter()
            .map(|room| (room.name.to_lowercase(), room))
            .collect();
        let mut guests = GuestIndex::build(self.list_guests());

        let mut report = ImportReport::default();
        for (i, cells) in table.rows.iter().enumerate() {
            let row_index = i + 1;
            let outcome = self.import_row(&columns, cells, &rooms, &mut guests).await;
            if let Some(stay) = report.tally("stay", row_index, outcome)? {
                debug!(row_index, stay = %stay.confirmation_code, "import row committed");
            }
        }

        metrics::histogram!(crate::observability::IMPORT_DURATION_SECONDS, "entity" => "stay")
            .record(started.elapsed().as_secs_f64());
        info!(
            succeeded = report.success_count,
            failed = report.fail_count,
            "booking import finished"
        );
        Ok(report)
    }

    async fn import_row(
        &self,
        columns: &Columns,
        cells: &[String],
        rooms: &HashMap<String, Room>,
        guests: &mut GuestIndex,
    ) -> Result<Stay, EngineError> {
        let row = parse_row(columns, cells)?;

        let guest_id = match guests.resolve(&row.guest) {
            Some(guest) => guest.id,
            None => {
                let guest = self.create_guest(row.guest.clone().into()).await?;
                guests.insert(&guest);
                guest.id
            }
        };

        let room = rooms
            .get(&row.room_name.to_lowercase())
            .ok_or_else(|| EngineError::not_found("room", &row.room_name))?;

        let draft = StayDraft {
            guest_id,
            state: row.status,
            beds: 1,
            bed_label: None,
            total_amount: row.total_amount,
            amount_paid: row.amount_paid.unwrap_or(0),
        };
        self.place_stay(room.id, row.range, draft).await
    }
}
