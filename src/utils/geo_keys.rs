//! State geography keys
//!
//! The three sources disagree on how a state is identified:
//! - NSCH `FIPSST`: plain integer (1..56)
//! - Cartographic boundary `STATEFP`: zero-padded string ("01")
//! - BEA `GeoFips`: quoted, space-padded county-style code (` "01000"`)
//!
//! Everything is normalized to [`StateCode`] before a join.

/// Numeric state FIPS code
pub type StateCode = u32;

/// Parse a padded or quoted FIPS string into a state code
///
/// Accepts `"01"`, `" \"01000\""`, `"1"`. Five-digit codes ending in `000`
/// are BEA state-level codes and are reduced to the two-digit state.
/// Returns `None` for blanks and non-numeric text.
pub fn parse_fips(raw: &str) -> Option<StateCode> {
    let cleaned: &str = raw.trim().trim_matches('"').trim();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let code: StateCode = cleaned.parse().ok()?;
    if cleaned.len() == 5 {
        if code % 1000 == 0 {
            Some(code / 1000)
        } else {
            None // County-level row
        }
    } else {
        Some(code)
    }
}

/// BEA aggregates (US total, regions) carry state codes outside 1..=56
pub fn is_state_or_dc(code: StateCode) -> bool {
    (1..=56).contains(&code)
}
