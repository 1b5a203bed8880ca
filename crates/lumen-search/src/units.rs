//! Unit canonicalization for quantity search.
//!
//! Search values and stored quantities frequently spell the same unit
//! differently (`lbs` vs `[lb_av]`, display codes vs UCUM codes). The table
//! maps spellings onto a canonical token and carries pairwise conversion
//! factors between canonical units. An unknown conversion is a `None`,
//! which quantity matching treats as a non-match — never an error.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct UnitConversionTable {
    /// Alias spelling (lowercased) -> canonical token.
    aliases: HashMap<String, String>,
    /// (from, to) canonical pair -> multiplicative factor.
    factors: HashMap<(String, String), f64>,
}

impl UnitConversionTable {
    /// An empty table: every unit is its own canonical form and no
    /// cross-unit conversions are known.
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
            factors: HashMap::new(),
        }
    }

    /// The default table covering the spellings and conversions common in
    /// clinical observations.
    pub fn new() -> Self {
        let mut table = Self::empty();

        // Mass
        table.add_alias("[lb_av]", "[lb_av]");
        table.add_alias("lb", "[lb_av]");
        table.add_alias("lbs", "[lb_av]");
        table.add_alias("pounds", "[lb_av]");
        table.add_alias("kgs", "kg");
        table.add_alias("kilogram", "kg");
        table.add_alias("kilograms", "kg");
        table.add_factor("[lb_av]", "kg", 0.453_592_37);
        table.add_factor("g", "kg", 0.001);
        table.add_factor("mg", "g", 0.001);

        // Length
        table.add_alias("centimeter", "cm");
        table.add_alias("centimeters", "cm");
        table.add_alias("[in_i]", "[in_i]");
        table.add_alias("in", "[in_i]");
        table.add_alias("inches", "[in_i]");
        table.add_factor("cm", "m", 0.01);
        table.add_factor("mm", "cm", 0.1);
        table.add_factor("[in_i]", "cm", 2.54);

        // Temperature spellings (no affine conversion carried)
        table.add_alias("celsius", "Cel");
        table.add_alias("fahrenheit", "[degF]");

        // Flow: MDC numeric codes used alongside UCUM spellings
        table.add_alias("265201", "cL/s");
        table.add_alias("cl/s", "cL/s");
        table.add_alias("265202", "cL/min");
        table.add_alias("cl/min", "cL/min");

        table
    }

    /// Register a spelling for a canonical unit. Lookup is case-insensitive.
    pub fn add_alias(&mut self, spelling: impl Into<String>, canonical: impl Into<String>) {
        self.aliases
            .insert(spelling.into().to_ascii_lowercase(), canonical.into());
    }

    /// Register a conversion factor; the inverse is derived.
    pub fn add_factor(&mut self, from: impl Into<String>, to: impl Into<String>, factor: f64) {
        let from = from.into();
        let to = to.into();
        if factor != 0.0 {
            self.factors
                .insert((to.clone(), from.clone()), 1.0 / factor);
        }
        self.factors.insert((from, to), factor);
    }

    /// Canonical token for a unit spelling; unknown spellings canonicalize
    /// to themselves.
    pub fn canonicalize(&self, unit: &str) -> String {
        self.aliases
            .get(&unit.to_ascii_lowercase())
            .cloned()
            .unwrap_or_else(|| unit.to_string())
    }

    /// Whether two spellings denote the same unit.
    pub fn same_unit(&self, a: &str, b: &str) -> bool {
        a == b || self.canonicalize(a) == self.canonicalize(b)
    }

    /// Convert a value between units. Returns `None` when no conversion
    /// factor is known — callers treat that as a non-match.
    pub fn convert(&self, value: f64, from: &str, to: &str) -> Option<f64> {
        let from = self.canonicalize(from);
        let to = self.canonicalize(to);
        if from == to {
            return Some(value);
        }
        self.factors
            .get(&(from, to))
            .map(|factor| value * factor)
    }
}

impl Default for UnitConversionTable {
    fn default() -> Self {
        Self::new()
    }
}
