//! Unit table for the equation evaluator.
//!
//! Each unit maps to a base unit of its dimension (meter, gram, second,
//! radian) through a scale factor; conversion between two units of the same
//! dimension goes through the base.

use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Length,
    Mass,
    Time,
    Angle,
}

impl Dimension {
    pub fn name(self) -> &'static str {
        match self {
            Dimension::Length => "length",
            Dimension::Mass => "mass",
            Dimension::Time => "time",
            Dimension::Angle => "angle",
        }
    }
}

/// Scale and dimension for one recognized unit spelling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitDef {
    pub dimension: Dimension,
    /// Multiply a value in this unit by `factor` to express it in the
    /// dimension's base unit.
    pub factor: f64,
}

pub fn lookup(name: &str) -> Option<UnitDef> {
    use Dimension::*;

    let (dimension, factor) = match name {
        "m" | "meter" | "meters" | "metre" | "metres" => (Length, 1.0),
        "km" | "kilometer" | "kilometers" => (Length, 1_000.0),
        "cm" | "centimeter" | "centimeters" => (Length, 0.01),
        "mm" | "millimeter" | "millimeters" => (Length, 0.001),
        "in" | "inch" | "inches" => (Length, 0.0254),
        "ft" | "foot" | "feet" => (Length, 0.3048),
        "yd" | "yard" | "yards" => (Length, 0.9144),
        "mi" | "mile" | "miles" => (Length, 1_609.344),

        "g" | "gram" | "grams" => (Mass, 1.0),
        "kg" | "kilogram" | "kilograms" => (Mass, 1_000.0),
        "mg" | "milligram" | "milligrams" => (Mass, 0.001),
        "lb" | "lbs" | "pound" | "pounds" => (Mass, 453.592_37),
        "oz" | "ounce" | "ounces" => (Mass, 28.349_523_125),
        "t" | "tonne" | "tonnes" => (Mass, 1_000_000.0),

        "s" | "sec" | "second" | "seconds" => (Time, 1.0),
        "ms" | "millisecond" | "milliseconds" => (Time, 0.001),
        "min" | "minute" | "minutes" => (Time, 60.0),
        "h" | "hr" | "hour" | "hours" => (Time, 3_600.0),
        "day" | "days" => (Time, 86_400.0),

        "rad" | "radian" | "radians" => (Angle, 1.0),
        "deg" | "degree" | "degrees" => (Angle, PI / 180.0),
        "grad" | "gradian" | "gradians" => (Angle, PI / 200.0),

        _ => return None,
    };

    Some(UnitDef { dimension, factor })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_share_a_definition() {
        assert_eq!(lookup("in"), lookup("inch"));
        assert_eq!(lookup("deg"), lookup("degrees"));
        assert_eq!(lookup("kg").unwrap().dimension, Dimension::Mass);
    }

    #[test]
    fn unknown_names_are_not_units() {
        assert!(lookup("parsec").is_none());
        assert!(lookup("x").is_none());
    }

    #[test]
    fn conversion_through_base_units() {
        let cm = lookup("cm").unwrap();
        let inch = lookup("inch").unwrap();
        let converted = 12.7 * cm.factor / inch.factor;
        assert!((converted - 5.0).abs() < 1e-12);
    }
}
