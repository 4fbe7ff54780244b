use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Integer minor currency units (cents). The only money type.
pub type Minor = i64;

/// Half-open overlap test: `[a_start, a_end)` against `[b_start, b_end)`.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && a_end > b_start
}

/// Half-open stay range `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, EngineError> {
        if check_out <= check_in {
            return Err(EngineError::InvalidRange { check_in, check_out });
        }
        Ok(Self { check_in, check_out })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        overlaps(self.check_in, self.check_out, other.check_in, other.check_out)
    }

    pub fn contains_date(&self, day: NaiveDate) -> bool {
        self.check_in <= day && day < self.check_out
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

/// Where a stay is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Pending,
    Confirmed,
    CheckedIn,
    Completed,
    CheckedOut,
    Cancelled,
    NoShow,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 7] = [
        LifecycleState::Pending,
        LifecycleState::Confirmed,
        LifecycleState::CheckedIn,
        LifecycleState::Completed,
        LifecycleState::CheckedOut,
        LifecycleState::Cancelled,
        LifecycleState::NoShow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Confirmed => "confirmed",
            LifecycleState::CheckedIn => "checked_in",
            LifecycleState::Completed => "completed",
            LifecycleState::CheckedOut => "checked_out",
            LifecycleState::Cancelled => "cancelled",
            LifecycleState::NoShow => "no_show",
        }
    }

    /// Legal forward moves. Nothing leaves cancelled, no_show or completed.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending | Confirmed, CheckedIn)
                | (CheckedIn, CheckedOut)
                | (CheckedIn | CheckedOut, Completed)
                | (Pending | Confirmed | CheckedIn, Cancelled)
                | (Pending | Confirmed, NoShow)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        LifecycleState::ALL
            .into_iter()
            .find(|state| state.as_str() == needle)
            .ok_or_else(|| EngineError::Validation(format!("invalid status '{}'", s.trim())))
    }
}

/// The lifecycle states that count against room capacity.
///
/// One set is shared by every allocation path, interactive and import alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSet {
    states: Vec<LifecycleState>,
}

impl Default for ActiveSet {
    fn default() -> Self {
        Self::canonical()
    }
}

impl ActiveSet {
    /// pending, confirmed and checked_in hold a bed; everything else has released it.
    pub fn canonical() -> Self {
        Self::new([
            LifecycleState::Pending,
            LifecycleState::Confirmed,
            LifecycleState::CheckedIn,
        ])
    }

    pub fn new(states: impl IntoIterator<Item = LifecycleState>) -> Self {
        let mut states: Vec<LifecycleState> = states.into_iter().collect();
        states.sort_by_key(|s| s.as_str());
        states.dedup();
        Self { states }
    }

    /// Parse a comma-separated list such as `pending,confirmed,checked_in`.
    pub fn parse(list: &str) -> Result<Self, EngineError> {
        let states = list
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(LifecycleState::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        if states.is_empty() {
            return Err(EngineError::Config("active state set is empty".into()));
        }
        Ok(Self::new(states))
    }

    pub fn contains(&self, state: LifecycleState) -> bool {
        self.states.contains(&state)
    }

    pub fn states(&self) -> &[LifecycleState] {
        &self.states
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    Partial,
    Paid,
}

impl PaymentState {
    pub fn derive(total: Minor, paid: Minor) -> Self {
        if paid <= 0 {
            PaymentState::Pending
        } else if paid < total {
            PaymentState::Partial
        } else {
            PaymentState::Paid
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Partial => "partial",
            PaymentState::Paid => "paid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Dormitory,
    Private,
    Suite,
}

impl RoomType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::Dormitory => "dormitory",
            RoomType::Private => "private",
            RoomType::Suite => "suite",
        }
    }
}

impl FromStr for RoomType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dormitory" | "dorm" => Ok(RoomType::Dormitory),
            "private" => Ok(RoomType::Private),
            "suite" => Ok(RoomType::Suite),
            other => Err(EngineError::Validation(format!("invalid room type '{other}'"))),
        }
    }
}

/// Whether a room takes bookings at all. Only available rooms offer beds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    #[default]
    Available,
    Maintenance,
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Maintenance => "maintenance",
            RoomStatus::Closed => "closed",
        }
    }

    pub fn is_bookable(&self) -> bool {
        *self == RoomStatus::Available
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(RoomStatus::Available),
            "maintenance" => Ok(RoomStatus::Maintenance),
            "closed" => Ok(RoomStatus::Closed),
            other => Err(EngineError::Validation(format!("invalid room status '{other}'"))),
        }
    }
}

/// How the beds of a room are named.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BedLabels {
    /// `"1"..="capacity"`.
    Numbered,
    Custom(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub room_type: RoomType,
    pub capacity_beds: u32,
    pub price_per_night: Minor,
    pub max_occupancy: u32,
    pub bed_labels: BedLabels,
    pub status: RoomStatus,
}

impl Room {
    /// Every bed label of the room, numbered rooms in ascending order.
    pub fn labels(&self) -> Vec<String> {
        match &self.bed_labels {
            BedLabels::Numbered => (1..=self.capacity_beds).map(|n| n.to_string()).collect(),
            BedLabels::Custom(labels) => labels.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: Ulid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl Guest {
    /// Lowercased `"first last"`, the name-match key.
    pub fn name_key(&self) -> String {
        name_key(&self.first_name, &self.last_name)
    }
}

pub fn name_key(first: &str, last: &str) -> String {
    format!("{} {}", first.trim().to_lowercase(), last.trim().to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub id: Ulid,
    pub guest_id: Ulid,
    pub range: DateRange,
    pub state: LifecycleState,
    pub total_amount: Minor,
    pub amount_paid: Minor,
    pub payment_state: PaymentState,
    pub confirmation_code: String,
}

/// Six uppercase characters taken from the random tail of the stay id.
pub fn confirmation_code(id: Ulid) -> String {
    let s = id.to_string();
    s[s.len() - 6..].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BedAssignment {
    pub id: Ulid,
    pub stay_id: Ulid,
    pub room_id: Ulid,
    pub bed_label: String,
    pub price_per_night: Minor,
}

/// A bed assignment joined with its stay's range and state: what the allocator counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occupancy {
    pub assignment: BedAssignment,
    pub range: DateRange,
    pub state: LifecycleState,
}

/// What a caller asks for when booking a bed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StayDraft {
    pub guest_id: Ulid,
    pub state: LifecycleState,
    pub beds: u32,
    pub bed_label: Option<String>,
    /// Defaults to price × nights × beds.
    pub total_amount: Option<Minor>,
    pub amount_paid: Minor,
}

impl StayDraft {
    pub fn new(guest_id: Ulid) -> Self {
        Self {
            guest_id,
            state: LifecycleState::Confirmed,
            beds: 1,
            bed_label: None,
            total_amount: None,
            amount_paid: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// All bed assignments in the room, sorted by `range.check_in`.
    pub occupancies: Vec<Occupancy>,
    /// Bumped on every change to `occupancies`.
    pub version: u64,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            occupancies: Vec::new(),
            version: 0,
        }
    }

    /// Insert maintaining sort order by check-in.
    pub fn insert_occupancy(&mut self, occupancy: Occupancy) {
        let pos = self
            .occupancies
            .partition_point(|o| o.range.check_in <= occupancy.range.check_in);
        self.occupancies.insert(pos, occupancy);
        self.version += 1;
    }

    /// Move every assignment of a stay to `state`. Returns how many were touched.
    pub fn set_stay_state(&mut self, stay_id: Ulid, state: LifecycleState) -> usize {
        let mut touched = 0;
        for o in self.occupancies.iter_mut().filter(|o| o.assignment.stay_id == stay_id) {
            o.state = state;
            touched += 1;
        }
        if touched > 0 {
            self.version += 1;
        }
        touched
    }

    /// Occupancies whose range overlaps `query`.
    /// Uses binary search to skip everything checking in at or after `query.check_out`.
    pub fn overlapping(&self, query: &DateRange) -> impl Iterator<Item = &Occupancy> {
        let right_bound = self
            .occupancies
            .partition_point(|o| o.range.check_in < query.check_out);
        self.occupancies[..right_bound]
            .iter()
            .filter(move |o| o.range.check_out > query.check_in)
    }
}

/// Journal record format. Every state change is one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        room: Room,
    },
    GuestCreated {
        guest: Guest,
    },
    StayCommitted {
        stay: Stay,
        room_id: Ulid,
        assignments: Vec<BedAssignment>,
    },
    StayStateChanged {
        id: Ulid,
        room_id: Ulid,
        state: LifecycleState,
    },
    PaymentRecorded {
        id: Ulid,
        room_id: Ulid,
        amount_paid: Minor,
        payment_state: PaymentState,
    },
    RoomStatusChanged {
        room_id: Ulid,
        status: RoomStatus,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Result of an availability check against one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub room_id: Ulid,
    pub allowed: bool,
    pub occupied_count: u32,
    pub available_bed_labels: Vec<String>,
    /// Room version the answer was computed against.
    pub room_version: u64,
}

/// How full a room, or a whole property, is on one night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupationStatus {
    /// Nobody there.
    Available,
    Partial,
    Full,
}

impl OccupationStatus {
    pub fn from_counts(occupied: u32, total: u32) -> Self {
        if occupied == 0 {
            OccupationStatus::Available
        } else if occupied < total {
            OccupationStatus::Partial
        } else {
            OccupationStatus::Full
        }
    }
}

/// Occupied share of `total` beds as a percentage in `0.0..=100.0`.
pub fn occupation_rate(occupied: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    f64::from(occupied.min(total)) / f64::from(total) * 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOccupancy {
    pub room_id: Ulid,
    pub room_name: String,
    pub room_status: RoomStatus,
    pub total_beds: u32,
    pub occupied_beds: u32,
    /// Zero for rooms that are not bookable.
    pub available_beds: u32,
    pub occupation_rate: f64,
    pub status: OccupationStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyReport {
    pub date: NaiveDate,
    pub rooms: Vec<RoomOccupancy>,
    pub total_beds: u32,
    pub occupied_beds: u32,
    pub available_beds: u32,
    pub occupation_rate: f64,
    pub status: OccupationStatus,
}
