mod rates;

pub use rates::{RateTable, BUILTIN_DEFAULT_RATE, check_rate, normalize};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::engine::EngineError;
use crate::model::{DateRange, Minor};

/// Statutory cap on taxable nights per stay.
pub const MAX_TAXABLE_NIGHTS: i64 = 7;
/// Guests younger than this are exempt.
pub const CHILD_AGE_LIMIT: u32 = 12;
pub const CURRENCY: &str = "EUR";
pub const LEGAL_REFERENCE: &str = "Decreto-Lei n.º 28/2023 - Taxa Municipal Turística";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExemptionKind {
    Child,
    Medical,
    Disability,
}

impl ExemptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExemptionKind::Child => "child",
            ExemptionKind::Medical => "medical",
            ExemptionKind::Disability => "disability",
        }
    }
}

/// What is known about one guest's age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AgeEvidence {
    Years(u32),
    BornOn(NaiveDate),
    DeclaredChild(bool),
}

impl AgeEvidence {
    fn is_child(&self, reference: NaiveDate) -> bool {
        match *self {
            AgeEvidence::Years(years) => years < CHILD_AGE_LIMIT,
            AgeEvidence::BornOn(born) => age_on(born, reference) < i64::from(CHILD_AGE_LIMIT),
            AgeEvidence::DeclaredChild(child) => child,
        }
    }
}

/// Whole years from `born` to `reference`, counting a birthday only once it has passed.
pub fn age_on(born: NaiveDate, reference: NaiveDate) -> i64 {
    let mut years = i64::from(reference.year() - born.year());
    if (reference.month(), reference.day()) < (born.month(), born.day()) {
        years -= 1;
    }
    years
}

/// A declared medical or disability exemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exemption {
    pub kind: ExemptionKind,
    pub description: String,
    pub guest_count: u32,
    /// `Some(false)` means eligibility was checked and refused.
    #[serde(default)]
    pub verified: Option<bool>,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxRequest {
    pub municipality: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_count: u32,
    #[serde(default)]
    pub guests: Vec<AgeEvidence>,
    #[serde(default)]
    pub exemptions: Vec<Exemption>,
    /// Date children's ages are measured on. Defaults to today, not the stay date.
    #[serde(default = "today")]
    pub age_reference_date: NaiveDate,
}

impl TaxRequest {
    pub fn new(
        municipality: impl Into<String>,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guest_count: u32,
    ) -> Self {
        Self {
            municipality: municipality.into(),
            check_in,
            check_out,
            guest_count,
            guests: Vec::new(),
            exemptions: Vec::new(),
            age_reference_date: today(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedExemption {
    pub kind: ExemptionKind,
    pub description: String,
    pub exempted_guests: u32,
    pub exempted_amount: Minor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub taxable_nights: i64,
    pub rate_per_night: Minor,
    pub taxable_guests: u32,
    pub municipality: String,
    pub exemptions: Vec<AppliedExemption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxResult {
    pub total_tax: Minor,
    pub currency: &'static str,
    pub breakdown: TaxBreakdown,
    pub legal_reference: &'static str,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MunicipalityInfo {
    pub key: String,
    pub display_name: String,
    pub region: &'static str,
    pub rate: Minor,
}

/// `guests × per_guest`, refusing amounts that do not fit.
fn tax_for(guests: u32, per_guest: Minor) -> Result<Minor, EngineError> {
    i64::from(guests)
        .checked_mul(per_guest)
        .ok_or(EngineError::LimitExceeded("tax amount overflows"))
}

fn euros(minor: Minor) -> String {
    format!("€{}.{:02}", minor / 100, (minor % 100).abs())
}

/// Tourist tax calculator over an immutable rate table.
#[derive(Debug, Clone, Default)]
pub struct TaxEngine {
    table: RateTable,
}

impl TaxEngine {
    pub fn new(table: RateTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RateTable {
        &self.table
    }

    /// A new engine with one rate replaced or added.
    pub fn with_rate(&self, municipality: &str, rate: Minor) -> Result<Self, EngineError> {
        let mut table = self.table.clone();
        table.rates.insert(normalize(municipality), check_rate(rate)?);
        Ok(Self { table })
    }

    pub fn with_default_rate(&self, rate: Minor) -> Result<Self, EngineError> {
        let mut table = self.table.clone();
        table.default = check_rate(rate)?;
        Ok(Self { table })
    }

    pub fn is_known_municipality(&self, municipality: &str) -> bool {
        self.table.get(municipality).is_some()
    }

    pub fn municipalities(&self) -> Vec<MunicipalityInfo> {
        self.table
            .rates
            .iter()
            .map(|(key, rate)| MunicipalityInfo {
                key: key.clone(),
                display_name: rates::display_name(key),
                region: rates::region(key),
                rate: *rate,
            })
            .collect()
    }

    /// The same request always yields the same result. Every call, from any
    /// caller, is counted in the tax calculation metric.
    pub fn calculate(&self, req: &TaxRequest) -> Result<TaxResult, EngineError> {
        let result = self.compute(req);
        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(crate::observability::TAX_CALCULATIONS_TOTAL, "outcome" => outcome)
            .increment(1);
        result
    }

    fn compute(&self, req: &TaxRequest) -> Result<TaxResult, EngineError> {
        let range = DateRange::new(req.check_in, req.check_out)?;
        let total_nights = range.nights();
        let municipality = normalize(&req.municipality);
        let known_rate = self.table.get(&municipality);
        let rate = known_rate.unwrap_or(self.table.default);

        if req.guest_count == 0 {
            return Ok(TaxResult {
                total_tax: 0,
                currency: CURRENCY,
                breakdown: TaxBreakdown {
                    taxable_nights: total_nights.min(MAX_TAXABLE_NIGHTS),
                    rate_per_night: rate,
                    taxable_guests: 0,
                    municipality,
                    exemptions: Vec::new(),
                },
                legal_reference: LEGAL_REFERENCE,
                warnings: Vec::new(),
            });
        }

        let taxable_nights = total_nights.min(MAX_TAXABLE_NIGHTS);
        let per_guest = taxable_nights
            .checked_mul(rate)
            .ok_or(EngineError::LimitExceeded("tax amount overflows"))?;

        let mut exemptions = Vec::new();
        let children = req
            .guests
            .iter()
            .filter(|g| g.is_child(req.age_reference_date))
            .count() as u32;
        if children > 0 {
            exemptions.push(AppliedExemption {
                kind: ExemptionKind::Child,
                description: format!("Children under {CHILD_AGE_LIMIT} years ({children} exempted)"),
                exempted_guests: children,
                exempted_amount: tax_for(children, per_guest)?,
            });
        }
        for declared in req.exemptions.iter().filter(|e| e.verified != Some(false)) {
            exemptions.push(AppliedExemption {
                kind: declared.kind,
                description: declared.description.clone(),
                exempted_guests: declared.guest_count,
                exempted_amount: tax_for(declared.guest_count, per_guest)?,
            });
        }

        // Widened so oversized declarations clamp to zero taxable guests
        let exempted: u64 = exemptions.iter().map(|e| u64::from(e.exempted_guests)).sum();
        let taxable_guests = req
            .guest_count
            .saturating_sub(u32::try_from(exempted).unwrap_or(u32::MAX));
        let total_tax = tax_for(taxable_guests, per_guest)?;

        let mut warnings = Vec::new();
        if total_nights > MAX_TAXABLE_NIGHTS {
            warnings.push(format!(
                "Stay duration capped at {MAX_TAXABLE_NIGHTS} nights (legal maximum). Original: {total_nights} nights."
            ));
        }
        if known_rate.is_none() {
            warnings.push(format!(
                "Municipality '{}' not found. Using default rate of {}/night.",
                req.municipality.trim(),
                euros(self.table.default)
            ));
        }
        if exempted >= 2 {
            warnings.push(format!(
                "{exempted} guests exempted. Please verify exemption eligibility for municipal compliance."
            ));
        }

        Ok(TaxResult {
            total_tax,
            currency: CURRENCY,
            breakdown: TaxBreakdown {
                taxable_nights,
                rate_per_night: rate,
                taxable_guests,
                municipality,
                exemptions,
            },
            legal_reference: LEGAL_REFERENCE,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, SharedString, Unit};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn request(municipality: &str, nights: i64, guests: u32) -> TaxRequest {
        let check_in = d(2025, 7, 1);
        let mut req = TaxRequest::new(
            municipality,
            check_in,
            check_in + chrono::Duration::days(nights),
            guests,
        );
        req.age_reference_date = d(2025, 6, 1);
        req
    }

    #[test]
    fn lisbon_ten_nights_capped() {
        let result = TaxEngine::default().calculate(&request("lisbon", 10, 1)).unwrap();
        assert_eq!(result.total_tax, 2800);
        assert_eq!(result.breakdown.taxable_nights, 7);
        assert_eq!(result.breakdown.rate_per_night, 400);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Original: 10 nights"));
    }

    #[test]
    fn seven_nights_or_fewer_not_capped() {
        let engine = TaxEngine::default();
        for nights in [1, 3, 7] {
            let result = engine.calculate(&request("Lisboa", nights, 2)).unwrap();
            assert!(result.warnings.is_empty(), "{nights} nights: {:?}", result.warnings);
            assert_eq!(result.total_tax, nights * 2 * 400);
        }
    }

    #[test]
    fn porto_child_exemption() {
        let mut req = request("Porto", 3, 3);
        req.guests = vec![AgeEvidence::Years(34), AgeEvidence::Years(36), AgeEvidence::Years(9)];
        let result = TaxEngine::default().calculate(&req).unwrap();
        assert_eq!(result.total_tax, 1200);
        assert_eq!(result.breakdown.taxable_guests, 2);
        assert_eq!(result.breakdown.exemptions.len(), 1);
        let child = &result.breakdown.exemptions[0];
        assert_eq!(child.kind, ExemptionKind::Child);
        assert_eq!(child.exempted_guests, 1);
        assert_eq!(child.exempted_amount, 600);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn birthday_counts_only_once_passed() {
        // Turns 12 on 2025-06-15
        let born = d(2013, 6, 15);
        assert_eq!(age_on(born, d(2025, 6, 14)), 11);
        assert_eq!(age_on(born, d(2025, 6, 15)), 12);

        let mut req = request("porto", 2, 1);
        req.guests = vec![AgeEvidence::BornOn(born)];
        req.age_reference_date = d(2025, 6, 14);
        assert_eq!(TaxEngine::default().calculate(&req).unwrap().total_tax, 0);
        req.age_reference_date = d(2025, 6, 15);
        assert_eq!(TaxEngine::default().calculate(&req).unwrap().total_tax, 400);
    }

    #[test]
    fn unknown_municipality_uses_default_with_warning() {
        let result = TaxEngine::default().calculate(&request("Braga", 2, 1)).unwrap();
        assert_eq!(result.breakdown.rate_per_night, BUILTIN_DEFAULT_RATE);
        assert_eq!(result.total_tax, 400);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("'Braga'"));
        assert!(result.warnings[0].contains("€2.00"));
    }

    #[test]
    fn known_municipality_at_default_rate_has_no_warning() {
        let result = TaxEngine::default().calculate(&request("porto", 2, 1)).unwrap();
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn zero_guests_zero_tax_no_warnings() {
        let result = TaxEngine::default().calculate(&request("nowhere", 12, 0)).unwrap();
        assert_eq!(result.total_tax, 0);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn invalid_range_fails() {
        let mut req = request("lisbon", 1, 1);
        req.check_out = req.check_in;
        assert!(matches!(
            TaxEngine::default().calculate(&req),
            Err(EngineError::InvalidRange { .. })
        ));
    }

    #[test]
    fn declared_exemptions_and_verification() {
        let mut req = request("sintra", 2, 4);
        req.exemptions = vec![
            Exemption {
                kind: ExemptionKind::Medical,
                description: "hospital stay".into(),
                guest_count: 1,
                verified: None,
            },
            Exemption {
                kind: ExemptionKind::Disability,
                description: "refused".into(),
                guest_count: 2,
                verified: Some(false),
            },
            Exemption {
                kind: ExemptionKind::Disability,
                description: "certificate".into(),
                guest_count: 1,
                verified: Some(true),
            },
        ];
        let result = TaxEngine::default().calculate(&req).unwrap();
        assert_eq!(result.breakdown.exemptions.len(), 2);
        assert_eq!(result.breakdown.taxable_guests, 2);
        assert_eq!(result.total_tax, 2 * 2 * 300);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].starts_with("2 guests exempted"));
    }

    #[test]
    fn exemptions_never_make_tax_negative() {
        let mut req = request("lisbon", 2, 1);
        req.guests = vec![AgeEvidence::DeclaredChild(true), AgeEvidence::Years(3)];
        let result = TaxEngine::default().calculate(&req).unwrap();
        assert_eq!(result.breakdown.taxable_guests, 0);
        assert_eq!(result.total_tax, 0);
    }

    #[test]
    fn calculate_is_pure() {
        let engine = TaxEngine::default();
        let mut req = request("cascais", 9, 3);
        req.guests = vec![AgeEvidence::BornOn(d(2020, 1, 1))];
        assert_eq!(engine.calculate(&req).unwrap(), engine.calculate(&req).unwrap());
    }

    #[test]
    fn with_rate_returns_new_engine() {
        let base = TaxEngine::default();
        let updated = base.with_rate("Lisbon", 500).unwrap();
        assert_eq!(updated.calculate(&request("lisbon", 1, 1)).unwrap().total_tax, 500);
        assert_eq!(base.calculate(&request("lisbon", 1, 1)).unwrap().total_tax, 400);

        let braga = base.with_rate("Braga", 100).unwrap();
        assert!(braga.is_known_municipality("BRAGA"));
        assert!(!base.is_known_municipality("braga"));
    }

    #[test]
    fn out_of_range_rates_rejected() {
        let base = TaxEngine::default();
        for rate in [-1, crate::limits::MAX_TAX_RATE + 1, i64::MAX] {
            assert!(matches!(base.with_rate("Lisbon", rate), Err(EngineError::Config(_))));
            assert!(matches!(base.with_default_rate(rate), Err(EngineError::Config(_))));
        }
        let top = base.with_rate("Lisbon", crate::limits::MAX_TAX_RATE).unwrap();
        let result = top.calculate(&request("lisbon", 30, u32::MAX)).unwrap();
        assert_eq!(
            result.total_tax,
            i64::from(u32::MAX) * MAX_TAXABLE_NIGHTS * crate::limits::MAX_TAX_RATE
        );
    }

    #[test]
    fn huge_exemption_counts_clamp() {
        let mut req = request("porto", 3, 5);
        req.exemptions = vec![
            Exemption {
                kind: ExemptionKind::Medical,
                description: "Hospital stay".into(),
                guest_count: u32::MAX,
                verified: None,
            },
            Exemption {
                kind: ExemptionKind::Disability,
                description: "Accessibility".into(),
                guest_count: u32::MAX,
                verified: Some(true),
            },
        ];
        let result = TaxEngine::default().calculate(&req).unwrap();
        assert_eq!(result.breakdown.taxable_guests, 0);
        assert_eq!(result.total_tax, 0);
        assert_eq!(result.breakdown.exemptions[0].exempted_amount, i64::from(u32::MAX) * 600);
    }

    #[test]
    fn oversized_table_rate_is_an_error_not_a_panic() {
        let table = RateTable {
            default: i64::MAX,
            rates: Default::default(),
        };
        let result = TaxEngine::new(table).calculate(&request("nowhere", 2, 1));
        assert!(matches!(result, Err(EngineError::LimitExceeded(_))));
    }

    /// Counts tax calculations by outcome; every other metric is dropped.
    #[derive(Default)]
    struct TaxTally {
        ok: Arc<AtomicU64>,
        error: Arc<AtomicU64>,
    }

    impl metrics::Recorder for TaxTally {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            if key.name() != crate::observability::TAX_CALCULATIONS_TOTAL {
                return Counter::noop();
            }
            let ok = key.labels().any(|l| l.key() == "outcome" && l.value() == "ok");
            Counter::from_arc(if ok { self.ok.clone() } else { self.error.clone() })
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn every_calculation_is_counted() {
        let tally = TaxTally::default();
        let engine = TaxEngine::default();
        let mut bad = request("porto", 2, 1);
        bad.check_out = bad.check_in;

        metrics::with_local_recorder(&tally, || {
            engine.calculate(&request("porto", 2, 1)).unwrap();
            engine.calculate(&request("lisbon", 1, 3)).unwrap();
            assert!(engine.calculate(&bad).is_err());
        });
        assert_eq!(tally.ok.load(Ordering::Relaxed), 2);
        assert_eq!(tally.error.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn municipalities_listing() {
        let all = TaxEngine::default().municipalities();
        let gaia = all.iter().find(|m| m.key == "vila_nova_de_gaia").unwrap();
        assert_eq!(gaia.display_name, "Vila Nova De Gaia");
        assert_eq!(gaia.region, "Porto");
        assert_eq!(gaia.rate, 200);
        assert!(all.iter().all(|m| m.key != "default"));
    }

    #[test]
    fn request_json_defaults_reference_date() {
        let req: TaxRequest = serde_json::from_str(
            r#"{"municipality":"lisbon","checkIn":"2025-07-01","checkOut":"2025-07-03","guestCount":2,
                "guests":[{"years":30},{"bornOn":"2019-02-01"}]}"#,
        )
        .unwrap();
        assert_eq!(req.guests.len(), 2);
        assert!(req.age_reference_date > d(2025, 1, 1));
    }
}
