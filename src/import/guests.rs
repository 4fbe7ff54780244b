use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info};

use crate::engine::{Engine, EngineError};
use crate::model::{Guest, name_key};

use super::schema::{
    EMAIL, GUEST_FIRST_NAME, GUEST_LAST_NAME, GuestFields, PHONE, cell, check_width,
    normalize_header, position,
};
use super::{ImportReport, ImportTable, check_row_count};

pub const FIRST_NAME: &str = "firstName";
pub const LAST_NAME: &str = "lastName";

/// Two-key guest lookup for one import run. Email beats name; on either key
/// the earliest-created guest wins.
#[derive(Debug, Default)]
pub struct GuestIndex {
    by_email: HashMap<String, Guest>,
    by_name: HashMap<String, Guest>,
}

impl GuestIndex {
    /// `guests` must be in creation order.
    pub fn build(guests: impl IntoIterator<Item = Guest>) -> Self {
        let mut index = Self::default();
        for guest in guests {
            index.insert(&guest);
        }
        index
    }

    pub fn insert(&mut self, guest: &Guest) {
        if let Some(email) = &guest.email {
            self.by_email
                .entry(email.trim().to_lowercase())
                .or_insert_with(|| guest.clone());
        }
        if !guest.first_name.is_empty() && !guest.last_name.is_empty() {
            self.by_name
                .entry(guest.name_key())
                .or_insert_with(|| guest.clone());
        }
    }

    pub fn resolve(&self, fields: &GuestFields) -> Option<&Guest> {
        let by_email = fields
            .email
            .as_ref()
            .and_then(|email| self.by_email.get(&email.trim().to_lowercase()));
        by_email.or_else(|| {
            if fields.first_name.is_empty() || fields.last_name.is_empty() {
                return None;
            }
            self.by_name.get(&name_key(&fields.first_name, &fields.last_name))
        })
    }

}

/// Column positions for a guest table. Booking-style `guestFirstName` headers work too.
#[derive(Debug, Clone)]
pub struct GuestColumns {
    width: usize,
    first_name: Option<usize>,
    last_name: Option<usize>,
    email: Option<usize>,
    phone: Option<usize>,
}

impl GuestColumns {
    pub fn resolve(header: &[String]) -> Result<Self, EngineError> {
        let normalized = normalize_header(header)?;
        let first_name = position(&normalized, &[FIRST_NAME, GUEST_FIRST_NAME]);
        let last_name = position(&normalized, &[LAST_NAME, GUEST_LAST_NAME]);
        let email = position(&normalized, &[EMAIL]);
        if email.is_none() && (first_name.is_none() || last_name.is_none()) {
            return Err(EngineError::MissingColumns(vec![format!(
                "{FIRST_NAME}+{LAST_NAME} or {EMAIL}"
            )]));
        }
        Ok(Self {
            width: header.len(),
            first_name,
            last_name,
            email,
            phone: position(&normalized, &[PHONE]),
        })
    }

    pub fn parse(&self, cells: &[String]) -> Result<GuestFields, EngineError> {
        check_width(self.width, cells)?;
        Ok(GuestFields {
            first_name: cell(cells, self.first_name).unwrap_or_default().to_string(),
            last_name: cell(cells, self.last_name).unwrap_or_default().to_string(),
            email: cell(cells, self.email).map(str::to_string),
            phone: cell(cells, self.phone).map(str::to_string),
        })
    }
}

impl Engine {
    /// Create one guest per row. A row matching an existing guest, by email or by
    /// full name, fails as a duplicate instead of creating a second record.
    pub async fn reconcile_guest_import(&self, table: &ImportTable) -> Result<ImportReport, EngineError> {
        check_row_count(table)?;
        let columns = GuestColumns::resolve(&table.header)?;
        let started = Instant::now();
        info!(rows = table.rows.len(), "guest import started");

        let mut index = GuestIndex::build(self.list_guests());
        let mut report = ImportReport::default();
        for (i, cells) in table.rows.iter().enumerate() {
            let row_index = i + 1;
            let outcome = self.import_guest_row(&columns, cells, &mut index).await;
            if let Some(guest) = report.tally("guest", row_index, outcome)? {
                debug!(row_index, guest = %guest.id, "import row committed");
            }
        }

        metrics::histogram!(crate::observability::IMPORT_DURATION_SECONDS, "entity" => "guest")
            .record(started.elapsed().as_secs_f64());
        info!(
            succeeded = report.success_count,
            failed = report.fail_count,
            "guest import finished"
        );
        Ok(report)
    }

    async fn import_guest_row(
        &self,
        columns: &GuestColumns,
        cells: &[String],
        index: &mut GuestIndex,
    ) -> Result<Guest, EngineError> {
        let fields = columns.parse(cells)?;
        if let Some(existing) = index.resolve(&fields) {
            return Err(EngineError::AlreadyExists(format!("guest {}", existing.id)));
        }
        let guest = self.create_guest(fields.into()).await?;
        index.insert(&guest);
        Ok(guest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn guest(first: &str, last: &str, email: Option<&str>) -> Guest {
        Guest {
            id: Ulid::new(),
            first_name: first.into(),
            last_name: last.into(),
            email: email.map(str::to_string),
            phone: None,
        }
    }

    fn fields(first: &str, last: &str, email: Option<&str>) -> GuestFields {
        GuestFields {
            first_name: first.into(),
            last_name: last.into(),
            email: email.map(str::to_string),
            phone: None,
        }
    }

    #[test]
    fn guest_columns_accept_both_spellings() {
        let header = |names: &[&str]| names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let cols = GuestColumns::resolve(&header(&["FirstName", "guestLastName", "phone"])).unwrap();
        let row = cols.parse(&header(&[" Ana ", "Silva", ""])).unwrap();
        assert_eq!(row, fields("Ana", "Silva", None));

        assert!(matches!(
            GuestColumns::resolve(&header(&["firstName", "phone"])),
            Err(EngineError::MissingColumns(_))
        ));
        assert!(cols.parse(&header(&["Ana"])).is_err());
    }

    #[test]
    fn email_takes_precedence_over_name() {
        let ana = guest("Ana", "Silva", Some("ana@example.com"));
        let other = guest("Rui", "Costa", None);
        let index = GuestIndex::build([ana.clone(), other.clone()]);

        let hit = index.resolve(&fields("Rui", "Costa", Some("ANA@example.com "))).unwrap();
        assert_eq!(hit.id, ana.id);

        let hit = index.resolve(&fields("rui", "COSTA", Some("nobody@example.com"))).unwrap();
        assert_eq!(hit.id, other.id);
    }

    #[test]
    fn first_created_guest_wins() {
        let first = guest("Ana", "Silva", None);
        let second = guest("ana", "silva", None);
        let index = GuestIndex::build([first.clone(), second]);
        assert_eq!(index.resolve(&fields("Ana", "Silva", None)).unwrap().id, first.id);
    }

    #[test]
    fn partial_name_never_matches() {
        let index = GuestIndex::build([guest("Ana", "", None)]);
        assert!(index.resolve(&fields("Ana", "", None)).is_none());
        assert!(index.resolve(&fields("Ana", "Silva", None)).is_none());
    }

    #[test]
    fn inserted_guests_are_found() {
        let mut index = GuestIndex::default();
        assert!(index.resolve(&fields("", "", Some("x@y.pt"))).is_none());
        index.insert(&guest("", "", Some("x@y.pt")));
        assert!(index.resolve(&fields("", "", Some("X@Y.PT"))).is_some());
        assert!(index.resolve(&fields("", "", Some("z@y.pt"))).is_none());
    }
}
