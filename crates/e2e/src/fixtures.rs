//! Reference fixture values
//!
//! Hard-coded known-good IDs, names and times used as oracles. These are
//! immutable constants asserted against, never derived data.

/// Live CTAN API root (read-only GET endpoints).
pub const API: &str = "https://api.ctan.es/v1/Consorcios";

/// Fixed local port the static site is served on.
pub const LOCAL_PORT: u16 = 8787;

/// Default bound for UI waits, in milliseconds.
pub const UI_TIMEOUT_MS: u64 = 15_000;

/// The stop search debounces input by 350 ms client-side; tests settle
/// slightly past that window before asserting.
pub const DEBOUNCE_SETTLE_MS: u64 = 400;

/// Background departures refresh cycle on the station page.
pub const REFRESH_CYCLE_MS: u64 = 30_000;

// Verified against the live API 2026-02-19.

/// Consortium "Área de Málaga".
pub const MALAGA_ID: &str = "4";

/// Stop 149 = Terminal Muelle Heredia, zone A, Málaga.
pub const STOP_MUELLE: &str = "149";

pub const NUCLEO_MALAGA: &str = "1";
pub const NUCLEO_FUENGIROLA: &str = "111";
pub const NUCLEO_COIN: &str = "201";

/// Alhaurín el Grande.
pub const NUCLEO_ALHAURIN: &str = "83";

/// Line 1 = M-110 Málaga–Torremolinos–Benalmádena Costa.
pub const LINE_M110: &str = "1";
