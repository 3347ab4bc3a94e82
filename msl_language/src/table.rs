//! Coefficient tables, stored as one binary word per line in `.mem` files.

use crate::front::expr::ConstructionError;
use crate::front::format::Value;
use crate::throw;
use crate::util::fixed::{fixed_point_exponent, float_to_fixed, MAX_FIXED_WIDTH};
use crate::util::int::{IntRepresentation, Signed};
use crate::util::range::ClosedRange;
use num_bigint::BigInt;
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    Real(RealTable),
    Int(IntTable),
}

/// Real values stored as fixed-point words with a shared exponent.
#[derive(Debug, Clone, PartialEq)]
pub struct RealTable {
    pub values: Vec<f64>,
    pub width: u64,
    pub exponent: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntTable {
    pub values: Vec<BigInt>,
    pub signed: Signed,
    pub width: u64,
}

impl RealTable {
    /// Without an explicit exponent the tightest one for the largest magnitude is used.
    pub fn new(values: Vec<f64>, width: u64, exponent: Option<i64>) -> Result<RealTable, ConstructionError> {
        if let Some(&bad) = values.iter().find(|v| !v.is_finite()) {
            throw!(ConstructionError::InvalidRange(bad));
        }
        if width < 2 {
            throw!(ConstructionError::TableWidth { width, required: 2 });
        }
        if width > MAX_FIXED_WIDTH {
            throw!(ConstructionError::TableTooWide {
                width,
                max: MAX_FIXED_WIDTH,
            });
        }
        let exponent = exponent.unwrap_or_else(|| {
            let max = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
            fixed_point_exponent(max, width)
        });
        Ok(RealTable {
            values,
            width,
            exponent,
        })
    }

    fn words(&self) -> Vec<BigInt> {
        self.values
            .iter()
            .map(|&v| BigInt::from(float_to_fixed(v, self.exponent)))
            .collect()
    }
}

impl IntTable {
    /// Without an explicit width the tightest width holding every value is used.
    pub fn new(values: Vec<i64>, signed: Signed, width: Option<u64>) -> Result<IntTable, ConstructionError> {
        let values: Vec<BigInt> = values.into_iter().map(BigInt::from).collect();
        let range = values
            .iter()
            .map(|v| ClosedRange::single(v.clone()))
            .reduce(|a, b| a.union(&b))
            .unwrap_or_else(|| ClosedRange::single(BigInt::from(0)));

        let Some(tight) = IntRepresentation::for_range(signed, &range) else {
            throw!(ConstructionError::NotUnsigned {
                format: format!("table with values in {range}"),
            });
        };
        let width = match width {
            None => tight.width,
            Some(width) if width >= tight.width => width,
            Some(width) => throw!(ConstructionError::TableWidth {
                width,
                required: tight.width,
            }),
        };
        Ok(IntTable { values, signed, width })
    }
}

impl Table {
    pub fn len(&self) -> usize {
        match self {
            Table::Real(table) => table.values.len(),
            Table::Int(table) => table.values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the file holding this table, encoding the exponent for real tables.
    pub fn file_name(&self, name: &str) -> String {
        match self {
            Table::Real(table) => format!("{name}_exp_{}.mem", table.exponent),
            Table::Int(_) => format!("{name}.mem"),
        }
    }

    /// One zero-padded two's complement word per line.
    pub fn mem_contents(&self) -> String {
        let (repr, words) = match self {
            Table::Real(table) => {
                let repr = IntRepresentation {
                    signed: Signed::Signed,
                    width: table.width,
                };
                (repr, table.words())
            }
            Table::Int(table) => {
                let repr = IntRepresentation {
                    signed: table.signed,
                    width: table.width,
                };
                (repr, table.values.clone())
            }
        };

        let mut result = String::new();
        for word in &words {
            let _ = writeln!(result, "{}", repr.to_binary_string(word));
        }
        result
    }

    /// Table entries as constants, padded with zeros to `len`.
    pub fn padded_values(&self, len: usize) -> Vec<Value> {
        let mut values: Vec<Value> = match self {
            Table::Real(table) => table.values.iter().map(|&v| Value::Real(v)).collect(),
            Table::Int(table) => table.values.iter().cloned().map(Value::Int).collect(),
        };
        let zero = match self {
            Table::Real(_) => Value::Real(0.0),
            Table::Int(_) => Value::Int(BigInt::from(0)),
        };
        if values.len() < len {
            values.resize(len, zero);
        }
        values
    }
}

#[cfg(test)]
mod test {
    use crate::front::expr::ConstructionError;
    use crate::table::{IntTable, RealTable, Table};
    use crate::util::int::Signed;

    #[test]
    fn real_table_file() {
        let table = RealTable::new(vec![0.5, -1.0, 0.25], 8, None).unwrap();
        // 1.0 / 127 needs exponent -6
        assert_eq!(table.exponent, -6);
        let table = Table::Real(table);
        assert_eq!(table.file_name("coef"), "coef_exp_-6.mem");
        assert_eq!(table.mem_contents(), "00100000\n11000000\n00010000\n");
    }

    #[test]
    fn real_table_width_bounded() {
        assert_eq!(
            RealTable::new(vec![1.0], 1, None).unwrap_err(),
            ConstructionError::TableWidth { width: 1, required: 2 }
        );
        assert_eq!(
            RealTable::new(vec![1.0], 80, None).unwrap_err(),
            ConstructionError::TableTooWide { width: 80, max: 64 }
        );
        assert_eq!(RealTable::new(vec![1.0], 64, None).unwrap().exponent, -63);
    }

    #[test]
    fn int_table_file() {
        let table = IntTable::new(vec![3, 0, 5], Signed::Unsigned, None).unwrap();
        assert_eq!(table.width, 3);
        let table = Table::Int(table);
        assert_eq!(table.file_name("lut"), "lut.mem");
        assert_eq!(table.mem_contents(), "011\n000\n101\n");

        let signed = Table::Int(IntTable::new(vec![-2, 1], Signed::Signed, Some(4)).unwrap());
        assert_eq!(signed.mem_contents(), "1110\n0001\n");
    }

    #[test]
    fn int_table_width_checked() {
        assert_eq!(
            IntTable::new(vec![9], Signed::Unsigned, Some(3)).unwrap_err(),
            ConstructionError::TableWidth { width: 3, required: 4 }
        );
        assert!(matches!(
            IntTable::new(vec![-1], Signed::Unsigned, None),
            Err(ConstructionError::NotUnsigned { .. })
        ));
    }
}
