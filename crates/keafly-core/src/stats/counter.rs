// ── Arbitrary-precision counters ──
//
// IPv6 totals routinely exceed 64 bits, so every statistic is held as a
// big integer. Values that fit are exported as `u64` so that the common
// IPv4 case stays a plain JSON number.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, ToPrimitive, Zero};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::iter::Sum;

/// A statistic value of unbounded size.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BigCounter(BigInt);

/// A counter exported in the narrowest native form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCount {
    U64(u64),
    Big(BigInt),
}

impl BigCounter {
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    pub fn from_u64(value: u64) -> Self {
        Self(BigInt::from(value))
    }

    pub fn from_i64(value: i64) -> Self {
        Self(BigInt::from(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }

    pub fn add(&mut self, other: &Self) -> &mut Self {
        self.0 += &other.0;
        self
    }

    pub fn add_u64(&mut self, value: u64) -> &mut Self {
        self.0 += value;
        self
    }

    pub fn subtract(&mut self, other: &Self) -> &mut Self {
        self.0 -= &other.0;
        self
    }

    /// `self / divisor` as a float; `0.0` when the divisor is zero.
    pub fn divide_safe_by(&self, divisor: &Self) -> f64 {
        if divisor.0.is_zero() {
            return 0.0;
        }
        match (self.0.to_f64(), divisor.0.to_f64()) {
            (Some(n), Some(d)) if d != 0.0 => n / d,
            _ => 0.0,
        }
    }

    /// `u64` when representable, otherwise the big integer.
    pub fn to_native(&self) -> NativeCount {
        self.0
            .to_u64()
            .map_or_else(|| NativeCount::Big(self.0.clone()), NativeCount::U64)
    }

    /// Read a statistic value out of a Kea response.
    ///
    /// Accepts integers, integral floats, and decimal strings.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Some(Self::from_u64(u))
                } else if let Some(i) = n.as_i64() {
                    Some(Self::from_i64(i))
                } else {
                    n.as_f64()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .and_then(BigInt::from_f64)
                        .map(Self)
                }
            }
            Value::String(s) => s.trim().parse::<BigInt>().ok().map(Self),
            _ => None,
        }
    }
}

impl From<BigInt> for BigCounter {
    fn from(value: BigInt) -> Self {
        Self(value)
    }
}

impl From<u64> for BigCounter {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl<'a> Sum<&'a BigCounter> for BigCounter {
    fn sum<I: Iterator<Item = &'a BigCounter>>(iter: I) -> Self {
        let mut total = Self::zero();
        for value in iter {
            total.add(value);
        }
        total
    }
}

impl fmt::Display for BigCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for BigCounter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(u) = self.0.to_u64() {
            serializer.serialize_u64(u)
        } else if let Some(i) = self.0.to_i64() {
            serializer.serialize_i64(i)
        } else {
            serializer.serialize_str(&self.0.to_string())
        }
    }
}

impl<'de> Deserialize<'de> for BigCounter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CounterVisitor;

        impl Visitor<'_> for CounterVisitor {
            type Value = BigCounter;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(BigCounter::from_u64(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                Ok(BigCounter::from_i64(v))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                BigCounter::from_json(&Value::from(v))
                    .ok_or_else(|| E::custom(format!("non-integral counter {v}")))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.trim()
                    .parse::<BigInt>()
                    .map(BigCounter)
                    .map_err(|e| E::custom(format!("invalid counter {v:?}: {e}")))
            }
        }

        deserializer.deserialize_any(CounterVisitor)
    }
}
