//! Hard ceilings. Anything past these is rejected with `LimitExceeded`.

pub const MAX_PROPERTIES: usize = 1000;
pub const MAX_PROPERTY_NAME_LEN: usize = 128;

pub const MAX_ROOMS_PER_PROPERTY: usize = 10_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_LABEL_LEN: usize = 64;
pub const MAX_BEDS_PER_ROOM: u32 = 512;

pub const MAX_BEDS_PER_STAY: u32 = 64;
pub const MAX_STAY_NIGHTS: i64 = 730;
pub const MAX_QUERY_WINDOW_DAYS: i64 = 3 * 366;

pub const MAX_IMPORT_ROWS: usize = 50_000;
/// One million in minor units per night.
pub const MAX_PRICE_PER_NIGHT: crate::model::Minor = 100_000_000;
/// Per guest per night, in minor units.
pub const MAX_TAX_RATE: crate::model::Minor = 100_000;
