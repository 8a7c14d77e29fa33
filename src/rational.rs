//! Exact rational arithmetic for shares and slash fractions.
//!
//! Consensus-replicated accounting cannot tolerate rounding drift, so every
//! fractional quantity in the crate is an arbitrary-precision rational.
//! Addition, subtraction and multiplication are total; division is explicit
//! and fallible. The single place rationals meet integer token amounts is
//! [`Rat::to_amount`], which truncates toward zero — a burn computed from a
//! fraction can never exceed the committed fraction of the stake.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StakingError};
use crate::Amount;

/// Exact rational number backed by arbitrary-precision integers.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rat(BigRational);

impl Rat {
    /// The additive identity.
    pub fn zero() -> Self {
        Rat(BigRational::zero())
    }

    /// The multiplicative identity.
    pub fn one() -> Self {
        Rat(BigRational::one())
    }

    /// Builds `numer / denom`. A zero denominator is rejected.
    pub fn new(numer: i128, denom: i128) -> Result<Self> {
        if denom == 0 {
            return Err(StakingError::DivideByZero);
        }
        Ok(Rat(BigRational::new(
            BigInt::from(numer),
            BigInt::from(denom),
        )))
    }

    /// Lifts an integer token amount into the rationals.
    pub fn from_int(value: Amount) -> Self {
        Rat(BigRational::from_integer(BigInt::from(value)))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Exact division. Dividing by zero is an error, not a panic.
    pub fn checked_div(&self, divisor: &Rat) -> Result<Rat> {
        if divisor.is_zero() {
            return Err(StakingError::DivideByZero);
        }
        Ok(Rat(&self.0 / &divisor.0))
    }

    /// Converts to a token amount, truncating toward zero.
    ///
    /// Negative values are rejected: amounts are unsigned and a caller that
    /// ends up here with a negative rational has already broken an invariant.
    pub fn to_amount(&self) -> Result<Amount> {
        if self.0.is_negative() {
            return Err(StakingError::InvariantBroken(format!(
                "negative rational {self} where a token amount was expected"
            )));
        }
        self.0.to_integer().to_u128().ok_or(StakingError::Overflow {
            context: "rational to token amount",
            value: Amount::MAX,
        })
    }

    /// The smaller of two rationals.
    pub fn min(self, other: Rat) -> Rat {
        if self <= other {
            self
        } else {
            other
        }
    }
}

impl Default for Rat {
    fn default() -> Self {
        Rat::zero()
    }
}

impl fmt::Display for Rat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_integer() {
            write!(f, "{}", self.0.numer())
        } else {
            write!(f, "{}/{}", self.0.numer(), self.0.denom())
        }
    }
}

impl Add for Rat {
    type Output = Rat;
    fn add(self, rhs: Rat) -> Rat {
        Rat(self.0 + rhs.0)
    }
}

impl Sub for Rat {
    type Output = Rat;
    fn sub(self, rhs: Rat) -> Rat {
        Rat(self.0 - rhs.0)
    }
}

impl Mul for Rat {
    type Output = Rat;
    fn mul(self, rhs: Rat) -> Rat {
        Rat(self.0 * rhs.0)
    }
}

impl Add for &Rat {
    type Output = Rat;
    fn add(self, rhs: &Rat) -> Rat {
        Rat(&self.0 + &rhs.0)
    }
}

impl Sub for &Rat {
    type Output = Rat;
    fn sub(self, rhs: &Rat) -> Rat {
        Rat(&self.0 - &rhs.0)
    }
}

impl Mul for &Rat {
    type Output = Rat;
    fn mul(self, rhs: &Rat) -> Rat {
        Rat(&self.0 * &rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominator_rejected() {
        assert!(matches!(Rat::new(1, 0), Err(StakingError::DivideByZero)));
        let half = Rat::new(1, 2).unwrap();
        assert!(matches!(
            half.checked_div(&Rat::zero()),
            Err(StakingError::DivideByZero)
        ));
    }

    #[test]
    fn truncates_toward_zero() {
        assert_eq!(Rat::new(7, 2).unwrap().to_amount().unwrap(), 3);
        assert_eq!(Rat::new(9, 10).unwrap().to_amount().unwrap(), 0);
        assert_eq!(Rat::from_int(5).to_amount().unwrap(), 5);
    }

    #[test]
    fn negative_amount_rejected() {
        let neg = Rat::new(-1, 2).unwrap();
        assert!(neg.is_negative());
        assert!(matches!(
            neg.to_amount(),
            Err(StakingError::InvariantBroken(_))
        ));
    }

    #[test]
    fn arithmetic_is_exact() {
        // 1/3 * 3 == 1 exactly; no fixed-point or float would reproduce this.
        let third = Rat::new(1, 3).unwrap();
        assert_eq!(third * Rat::from_int(3), Rat::one());

        let half = Rat::new(1, 2).unwrap();
        let quarter = Rat::new(1, 4).unwrap();
        assert_eq!(&half - &quarter, quarter);
        assert_eq!(&half + &half, Rat::one());
    }

    #[test]
    fn ordering_and_min() {
        let half = Rat::new(1, 2).unwrap();
        let third = Rat::new(1, 3).unwrap();
        assert!(third < half);
        assert_eq!(half.clone().min(third.clone()), third);
        assert!(Rat::zero() < Rat::one());
    }

    #[test]
    fn display() {
        assert_eq!(Rat::new(1, 2).unwrap().to_string(), "1/2");
        assert_eq!(Rat::from_int(10).to_string(), "10");
    }
}
