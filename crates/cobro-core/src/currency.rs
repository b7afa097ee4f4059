//! # Currency Types
//!
//! Settlement currencies accepted by the payment processor, with
//! minor-unit conversion helpers.

use serde::{Deserialize, Serialize};

/// Supported settlement currencies (ISO 4217)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    ARS,
    BRL,
    CLP,
    COP,
    MXN,
    PEN,
    UYU,
    USD,
}

impl Currency {
    /// Returns the ISO 4217 currency code
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::ARS => "ARS",
            Currency::BRL => "BRL",
            Currency::CLP => "CLP",
            Currency::COP => "COP",
            Currency::MXN => "MXN",
            Currency::PEN => "PEN",
            Currency::UYU => "UYU",
            Currency::USD => "USD",
        }
    }

    /// Parse a currency code, case-insensitively. Unknown codes are `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "ARS" => Some(Currency::ARS),
            "BRL" => Some(Currency::BRL),
            "CLP" => Some(Currency::CLP),
            "COP" => Some(Currency::COP),
            "MXN" => Some(Currency::MXN),
            "PEN" => Some(Currency::PEN),
            "UYU" => Some(Currency::UYU),
            "USD" => Some(Currency::USD),
            _ => None,
        }
    }

    /// Returns the number of decimal places for this currency
    /// (CLP and COP have 0 decimals, the others have 2)
    pub fn decimal_places(&self) -> u8 {
        match self {
            Currency::CLP | Currency::COP => 0,
            _ => 2,
        }
    }

    /// Convert a decimal amount to minor currency units (centavos, etc.)
    pub fn to_minor_units(&self, amount: f64) -> i64 {
        let multiplier = 10_f64.powi(self.decimal_places() as i32);
        (amount * multiplier).round() as i64
    }

    /// Convert from minor units back to decimal
    pub fn from_minor_units(&self, amount: i64) -> f64 {
        let divisor = 10_f64.powi(self.decimal_places() as i32);
        amount as f64 / divisor
    }
}

impl Default for Currency {
    fn default() -> Self {
        Currency::ARS
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
