use crate::util::range::ClosedRange;
use num_bigint::BigInt;
use num_traits::{One, Signed as _, Zero};
use std::cmp::max;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, strum::Display)]
pub enum Signed {
    #[strum(serialize = "signed")]
    Signed,
    #[strum(serialize = "unsigned")]
    Unsigned,
}

/// Bit-level representation of an integer domain.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct IntRepresentation {
    pub signed: Signed,
    pub width: u64,
}

impl IntRepresentation {
    /// The narrowest representation of the given signedness that holds every value in `range`.
    /// Widths are never zero, a single constant zero still occupies one bit.
    ///
    /// Returns `None` for unsigned representations of ranges with negative values.
    pub fn for_range(signed: Signed, range: &ClosedRange) -> Option<Self> {
        let ClosedRange { start, end } = range;
        let width = match signed {
            Signed::Unsigned => {
                if start.is_negative() {
                    return None;
                }
                end.bits()
            }
            Signed::Signed => {
                // magnitude bits for the negative side: -2^k needs k bits plus sign
                let neg_bits = if start.is_negative() {
                    (-start - BigInt::one()).bits()
                } else {
                    0
                };
                let pos_bits = if end.is_positive() { end.bits() } else { 0 };
                max(neg_bits, pos_bits) + 1
            }
        };
        Some(IntRepresentation {
            signed,
            width: max(width, 1),
        })
    }

    pub fn range(self) -> ClosedRange {
        let IntRepresentation { signed, width } = self;
        match signed {
            Signed::Unsigned => ClosedRange::new(BigInt::zero(), (BigInt::one() << width) - BigInt::one()),
            Signed::Signed => {
                let half = BigInt::one() << (width - 1);
                ClosedRange::new(-&half, &half - BigInt::one())
            }
        }
    }

    /// Wrap `value` into this representation, as fixed-width hardware arithmetic would.
    pub fn wrap(self, value: &BigInt) -> BigInt {
        use num_integer::Integer;
        let modulus = BigInt::one() << self.width;
        let wrapped = value.mod_floor(&modulus);
        match self.signed {
            Signed::Unsigned => wrapped,
            Signed::Signed => {
                if wrapped >= (BigInt::one() << (self.width - 1)) {
                    wrapped - modulus
                } else {
                    wrapped
                }
            }
        }
    }

    /// Two's complement bit string of `value`, most significant bit first.
    pub fn to_binary_string(self, value: &BigInt) -> String {
        let wrapped = self.wrap(value);
        let modulus = BigInt::one() << self.width;
        let unsigned = if wrapped.is_negative() { wrapped + modulus } else { wrapped };
        let digits = unsigned.to_str_radix(2);
        format!("{digits:0>width$}", width = self.width as usize)
    }
}

#[cfg(test)]
mod test {
    use crate::util::int::{IntRepresentation, Signed};
    use crate::util::range::ClosedRange;
    use num_bigint::BigInt;

    #[track_caller]
    fn case(start: i64, end: i64, signed: Signed, width: u64) {
        let range = ClosedRange::new(BigInt::from(start), BigInt::from(end));
        let result = IntRepresentation::for_range(signed, &range).unwrap();
        assert_eq!(result.width, width, "mismatch for {signed} {range}");
    }

    #[test]
    fn unsigned_widths() {
        case(0, 0, Signed::Unsigned, 1);
        case(0, 1, Signed::Unsigned, 1);
        case(0, 7, Signed::Unsigned, 3);
        case(0, 8, Signed::Unsigned, 4);
        case(3, 255, Signed::Unsigned, 8);
        assert!(IntRepresentation::for_range(
            Signed::Unsigned,
            &ClosedRange::new(BigInt::from(-1), BigInt::from(1))
        )
        .is_none());
    }

    #[test]
    fn signed_widths() {
        case(0, 0, Signed::Signed, 1);
        case(-1, 0, Signed::Signed, 1);
        case(-2, 1, Signed::Signed, 2);
        case(-8, 7, Signed::Signed, 4);
        case(-9, 7, Signed::Signed, 5);
        case(-8, 8, Signed::Signed, 5);
        case(0, 127, Signed::Signed, 8);
    }

    #[test]
    fn full_range_roundtrip() {
        for width in 1..12 {
            for signed in [Signed::Signed, Signed::Unsigned] {
                let repr = IntRepresentation { signed, width };
                assert_eq!(IntRepresentation::for_range(signed, &repr.range()), Some(repr));
            }
        }
    }

    #[test]
    fn wrap_and_binary() {
        let repr = IntRepresentation {
            signed: Signed::Signed,
            width: 4,
        };
        assert_eq!(repr.wrap(&BigInt::from(8)), BigInt::from(-8));
        assert_eq!(repr.wrap(&BigInt::from(-9)), BigInt::from(7));
        assert_eq!(repr.to_binary_string(&BigInt::from(-1)), "1111");
        assert_eq!(repr.to_binary_string(&BigInt::from(3)), "0011");
    }
}
