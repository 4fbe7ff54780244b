use chrono::NaiveDate;

use crate::engine::EngineError;
use crate::model::*;

pub const ROOM_NAME: &str = "roomName";
pub const CHECK_IN: &str = "checkIn";
pub const CHECK_OUT: &str = "checkOut";
pub const GUEST_FIRST_NAME: &str = "guestFirstName";
pub const GUEST_LAST_NAME: &str = "guestLastName";
pub const EMAIL: &str = "email";
pub const PHONE: &str = "phone";
pub const STATUS: &str = "status";
pub const TOTAL_AMOUNT: &str = "totalAmount";
pub const AMOUNT_PAID: &str = "amountPaid";

/// Column positions resolved from a header row.
#[derive(Debug, Clone)]
pub struct Columns {
    width: usize,
    room_name: usize,
    check_in: usize,
    check_out: usize,
    first_name: Option<usize>,
    last_name: Option<usize>,
    email: Option<usize>,
    phone: Option<usize>,
    status: Option<usize>,
    total_amount: Option<usize>,
    amount_paid: Option<usize>,
}

impl Columns {
    /// Match header names trimmed and case-insensitively. Unknown columns are ignored.
    pub fn resolve(header: &[String]) -> Result<Self, EngineError> {
        let normalized = normalize_header(header)?;
        let find = |name: &str| position(&normalized, &[name]);

        let mut missing = Vec::new();
        let mut require = |name: &str| {
            let pos = find(name);
            if pos.is_none() {
                missing.push(name.to_string());
            }
            pos.unwrap_or_default()
        };
        let room_name = require(ROOM_NAME);
        let check_in = require(CHECK_IN);
        let check_out = require(CHECK_OUT);

        let first_name = find(GUEST_FIRST_NAME);
        let last_name = find(GUEST_LAST_NAME);
        let email = find(EMAIL);
        if email.is_none() && (first_name.is_none() || last_name.is_none()) {
            missing.push(format!("{GUEST_FIRST_NAME}+{GUEST_LAST_NAME} or {EMAIL}"));
        }
        if !missing.is_empty() {
            return Err(EngineError::MissingColumns(missing));
        }

        Ok(Self {
            width: header.len(),
            room_name,
            check_in,
            check_out,
            first_name,
            last_name,
            email,
            phone: find(PHONE),
            status: find(STATUS),
            total_amount: find(TOTAL_AMOUNT),
            amount_paid: find(AMOUNT_PAID),
        })
    }
}

/// Header names trimmed and lowercased. A repeated name is malformed input.
pub(super) fn normalize_header(header: &[String]) -> Result<Vec<String>, EngineError> {
    let normalized: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
    for (i, name) in normalized.iter().enumerate() {
        if !name.is_empty() && normalized[..i].contains(name) {
            return Err(EngineError::MalformedInput(format!(
                "duplicate column '{}'",
                header[i].trim()
            )));
        }
    }
    Ok(normalized)
}

/// Position of the first of `names` (any spelling case) present in `normalized`.
pub(super) fn position(normalized: &[String], names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|name| normalized.iter().position(|h| *h == name.to_lowercase()))
}

pub(super) fn check_width(width: usize, cells: &[String]) -> Result<(), EngineError> {
    if cells.len() != width {
        return Err(EngineError::Validation(format!(
            "expected {width} cells, found {}",
            cells.len()
        )));
    }
    Ok(())
}

/// Guest identity as given on a row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestFields {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// One row after schema validation and coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub guest: GuestFields,
    pub room_name: String,
    pub range: DateRange,
    pub status: LifecycleState,
    pub total_amount: Option<Minor>,
    pub amount_paid: Option<Minor>,
}

pub(super) fn cell(cells: &[String], idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| cells.get(i))
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
}

pub fn parse_row(columns: &Columns, cells: &[String]) -> Result<ParsedRow, EngineError> {
    check_width(columns.width, cells)?;

    let room_name = cell(cells, Some(columns.room_name))
        .ok_or_else(|| EngineError::Validation(format!("{ROOM_NAME} is required")))?
        .to_string();

    let guest = GuestFields {
        first_name: cell(cells, columns.first_name).unwrap_or_default().to_string(),
        last_name: cell(cells, columns.last_name).unwrap_or_default().to_string(),
        email: cell(cells, columns.email).map(str::to_string),
        phone: cell(cells, columns.phone).map(str::to_string),
    };
    let has_name = !guest.first_name.is_empty() && !guest.last_name.is_empty();
    if !has_name && guest.email.is_none() {
        return Err(EngineError::Validation("guest name or email is required".into()));
    }

    let check_in = parse_date(CHECK_IN, cell(cells, Some(columns.check_in)))?;
    let check_out = parse_date(CHECK_OUT, cell(cells, Some(columns.check_out)))?;
    let range = DateRange::new(check_in, check_out)?;

    let status = match cell(cells, columns.status) {
        Some(s) => s.parse()?,
        None => LifecycleState::Confirmed,
    };

    Ok(ParsedRow {
        guest,
        room_name,
        range,
        status,
        total_amount: parse_money(TOTAL_AMOUNT, cell(cells, columns.total_amount))?,
        amount_paid: parse_money(AMOUNT_PAID, cell(cells, columns.amount_paid))?,
    })
}

/// Strict `YYYY-MM-DD`.
pub fn parse_date(field: &str, value: Option<&str>) -> Result<NaiveDate, EngineError> {
    let value = value.ok_or_else(|| EngineError::Validation(format!("{field} is required")))?;
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { *b == b'-' } else { b.is_ascii_digit() });
    if !shaped {
        return Err(EngineError::Validation(format!(
            "{field} must be a YYYY-MM-DD date, got '{value}'"
        )));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| EngineError::Validation(format!("{field} is not a calendar date: '{value}'")))
}

/// Non-negative whole number; blank means absent.
pub fn parse_count(field: &str, value: Option<&str>) -> Result<Option<u32>, EngineError> {
    let Some(value) = value else { return Ok(None) };
    value
        .parse()
        .map(Some)
        .map_err(|_| EngineError::Validation(format!("{field} must be a whole number, got '{value}'")))
}

/// Integer minor units; blank means absent.
pub fn parse_money(field: &str, value: Option<&str>) -> Result<Option<Minor>, EngineError> {
    let Some(value) = value else { return Ok(None) };
    let amount: Minor = value.parse().map_err(|_| {
        EngineError::Validation(format!(
            "{field} must be an integer amount in minor units, got '{value}'"
        ))
    })?;
    if amount < 0 {
        return Err(EngineError::Validation(format!("{field} must not be negative")));
    }
    Ok(Some(amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn columns() -> Columns {
        Columns::resolve(&strings(&[
            " RoomName ",
            "checkin",
            "CHECKOUT",
            "guestFirstName",
            "guestLastName",
            "email",
            "status",
            "totalAmount",
        ]))
        .unwrap()
    }

    #[test]
    fn header_matching_is_loose() {
        let cols = columns();
        assert_eq!(cols.room_name, 0);
        assert_eq!(cols.check_out, 2);
        assert_eq!(cols.total_amount, Some(7));
        assert_eq!(cols.amount_paid, None);
    }

    #[test]
    fn missing_columns_are_listed() {
        let err = Columns::resolve(&strings(&["roomName", "guestFirstName"])).unwrap_err();
        match err {
            EngineError::MissingColumns(missing) => {
                assert_eq!(missing[0], "checkIn");
                assert_eq!(missing[1], "checkOut");
                assert!(missing[2].contains("email"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn email_alone_identifies_guest() {
        assert!(Columns::resolve(&strings(&["roomName", "checkIn", "checkOut", "Email"])).is_ok());
    }

    #[test]
    fn duplicate_header_is_malformed() {
        let err = Columns::resolve(&strings(&["roomName", "checkIn", "checkOut", "email", "EMAIL"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedInput(_)));
    }

    #[test]
    fn parses_full_row() {
        let row = parse_row(
            &columns(),
            &strings(&["Dorm A", "2025-06-01", "2025-06-04", "Ana", "Silva", "", "pending", "5400"]),
        )
        .unwrap();
        assert_eq!(row.room_name, "Dorm A");
        assert_eq!(row.range.nights(), 3);
        assert_eq!(row.status, LifecycleState::Pending);
        assert_eq!(row.total_amount, Some(5400));
        assert_eq!(row.guest.email, None);
    }

    #[test]
    fn status_defaults_to_confirmed() {
        let row = parse_row(
            &columns(),
            &strings(&["Dorm A", "2025-06-01", "2025-06-02", "", "", "a@b.pt", "", ""]),
        )
        .unwrap();
        assert_eq!(row.status, LifecycleState::Confirmed);
        assert_eq!(row.total_amount, None);
    }

    #[test]
    fn row_level_failures() {
        let cols = columns();
        let bad = |cells: &[&str]| parse_row(&cols, &strings(cells)).unwrap_err();

        assert!(matches!(bad(&["Dorm A", "2025-06-01"]), EngineError::Validation(_)));
        assert!(matches!(
            bad(&["Dorm A", "01/06/2025", "2025-06-04", "Ana", "Silva", "", "", ""]),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            bad(&["Dorm A", "2025-06-04", "2025-06-04", "Ana", "Silva", "", "", ""]),
            EngineError::InvalidRange { .. }
        ));
        assert!(matches!(
            bad(&["Dorm A", "2025-06-01", "2025-06-04", "Ana", "Silva", "", "arrived", ""]),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            bad(&["Dorm A", "2025-06-01", "2025-06-04", "Ana", "", "", "", ""]),
            EngineError::Validation(_)
        ));
        assert!(matches!(
            bad(&["Dorm A", "2025-06-01", "2025-06-04", "Ana", "Silva", "", "", "54.00"]),
            EngineError::Validation(_)
        ));
    }

    #[test]
    fn counts_are_whole_numbers() {
        assert_eq!(parse_count("beds", Some("6")).unwrap(), Some(6));
        assert_eq!(parse_count("beds", None).unwrap(), None);
        assert!(parse_count("beds", Some("-1")).is_err());
        assert!(parse_count("beds", Some("2.5")).is_err());
    }

    #[test]
    fn strict_dates() {
        assert!(parse_date(CHECK_IN, Some("2025-6-1")).is_err());
        assert!(parse_date(CHECK_IN, Some("2025-02-30")).is_err());
        assert!(parse_date(CHECK_IN, None).is_err());
        assert_eq!(
            parse_date(CHECK_IN, Some("2024-02-29")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
    }
}
