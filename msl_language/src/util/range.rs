use num_bigint::BigInt;
use std::cmp::{max, min};
use std::fmt::{Display, Formatter};

/// Closed integer interval `[start, end]`, both bounds inclusive.
/// Invariant: `start <= end`.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ClosedRange {
    pub start: BigInt,
    pub end: BigInt,
}

impl ClosedRange {
    pub fn new(start: BigInt, end: BigInt) -> Self {
        assert!(start <= end, "invalid range {start}..={end}");
        ClosedRange { start, end }
    }

    pub fn single(value: BigInt) -> Self {
        ClosedRange {
            start: value.clone(),
            end: value,
        }
    }

    pub fn contains(&self, value: &BigInt) -> bool {
        &self.start <= value && value <= &self.end
    }

    pub fn contains_range(&self, other: &ClosedRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn union(&self, other: &ClosedRange) -> ClosedRange {
        ClosedRange {
            start: min(&self.start, &other.start).clone(),
            end: max(&self.end, &other.end).clone(),
        }
    }

    pub fn add(&self, other: &ClosedRange) -> ClosedRange {
        ClosedRange {
            start: &self.start + &other.start,
            end: &self.end + &other.end,
        }
    }

    pub fn neg(&self) -> ClosedRange {
        ClosedRange {
            start: -&self.end,
            end: -&self.start,
        }
    }

    pub fn sub(&self, other: &ClosedRange) -> ClosedRange {
        self.add(&other.neg())
    }

    /// The extremes of a product of intervals are always found among the products of the bounds.
    pub fn mul(&self, other: &ClosedRange) -> ClosedRange {
        let corners = [
            &self.start * &other.start,
            &self.start * &other.end,
            &self.end * &other.start,
            &self.end * &other.end,
        ];
        let start = corners.iter().min().cloned().unwrap_or_default();
        let end = corners.iter().max().cloned().unwrap_or_default();
        ClosedRange { start, end }
    }

    pub fn min(&self, other: &ClosedRange) -> ClosedRange {
        ClosedRange {
            start: min(&self.start, &other.start).clone(),
            end: min(&self.end, &other.end).clone(),
        }
    }

    pub fn max(&self, other: &ClosedRange) -> ClosedRange {
        ClosedRange {
            start: max(&self.start, &other.start).clone(),
            end: max(&self.end, &other.end).clone(),
        }
    }

    pub fn shl(&self, amount: u64) -> ClosedRange {
        ClosedRange {
            start: &self.start << amount,
            end: &self.end << amount,
        }
    }

    /// Arithmetic shift, rounding towards negative infinity.
    pub fn shr(&self, amount: u64) -> ClosedRange {
        ClosedRange {
            start: &self.start >> amount,
            end: &self.end >> amount,
        }
    }
}

impl Display for ClosedRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

#[cfg(test)]
mod test {
    use crate::util::range::ClosedRange;
    use num_bigint::BigInt;

    fn r(start: i64, end: i64) -> ClosedRange {
        ClosedRange::new(BigInt::from(start), BigInt::from(end))
    }

    /// Brute-force the true interval of `f` over both operand ranges.
    fn brute(a: (i64, i64), b: (i64, i64), f: impl Fn(i64, i64) -> i64) -> ClosedRange {
        let mut lo = i64::MAX;
        let mut hi = i64::MIN;
        for x in a.0..=a.1 {
            for y in b.0..=b.1 {
                let v = f(x, y);
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        r(lo, hi)
    }

    #[test]
    fn exact_against_brute_force() {
        let ranges = [(-5, -2), (-3, 4), (0, 0), (0, 7), (2, 9), (-8, 0)];
        for &a in &ranges {
            for &b in &ranges {
                let ra = r(a.0, a.1);
                let rb = r(b.0, b.1);
                assert_eq!(ra.add(&rb), brute(a, b, |x, y| x + y), "add {a:?} {b:?}");
                assert_eq!(ra.sub(&rb), brute(a, b, |x, y| x - y), "sub {a:?} {b:?}");
                assert_eq!(ra.mul(&rb), brute(a, b, |x, y| x * y), "mul {a:?} {b:?}");
                assert_eq!(ra.min(&rb), brute(a, b, |x, y| x.min(y)), "min {a:?} {b:?}");
                assert_eq!(ra.max(&rb), brute(a, b, |x, y| x.max(y)), "max {a:?} {b:?}");
            }
        }
    }

    #[test]
    fn shifts() {
        assert_eq!(r(-3, 5).shl(2), r(-12, 20));
        assert_eq!(r(-3, 5).shr(1), r(-2, 2));
    }
}
