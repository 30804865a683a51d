//! Shared value-lowering rules
//!
//! Both query backends translate typed filter values through this module so
//! the date, null, and membership semantics stay identical:
//!
//! 1. null under equality lowers to `IS NULL`, never `= NULL`
//! 2. a whole-day datetime under equality covers the full day
//! 3. a whole-day datetime as an upper bound excludes the day (`<`) or
//!    includes it entirely (`<=`)
//! 4. cohorts and id sets lower to a staged membership test
//! 5. small in-memory collections lower to a literal `IN (...)`
//! 6. everything else is direct equality

use chrono::{Duration, NaiveDate, NaiveDateTime};

use chartset_core::value::{end_of_day, is_whole_day, start_of_day};
use chartset_core::{Cohort, IdSet, Value};

/// Sort direction for ORDER BY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Join flavor for nested property paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

/// A filter value before lowering: scalar, id set, or small collection
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Null,
    Scalar(Value),
    IdSet(IdSet),
    List(Vec<Value>),
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Operand::Null,
            other => Operand::Scalar(other),
        }
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<u32> for Operand {
    fn from(v: u32) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<String> for Operand {
    fn from(v: String) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<NaiveDateTime> for Operand {
    fn from(v: NaiveDateTime) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<NaiveDate> for Operand {
    fn from(v: NaiveDate) -> Self {
        Operand::Scalar(v.into())
    }
}

impl From<IdSet> for Operand {
    fn from(v: IdSet) -> Self {
        Operand::IdSet(v)
    }
}

impl From<&IdSet> for Operand {
    fn from(v: &IdSet) -> Self {
        Operand::IdSet(v.clone())
    }
}

impl From<Cohort> for Operand {
    fn from(v: Cohort) -> Self {
        Operand::IdSet(v.member_ids().clone())
    }
}

impl From<&Cohort> for Operand {
    fn from(v: &Cohort) -> Self {
        Operand::IdSet(v.member_ids().clone())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(values: Vec<T>) -> Self {
        Operand::List(values.into_iter().map(Into::into).collect())
    }
}

/// An equality filter after lowering
#[derive(Debug, Clone, PartialEq)]
pub enum Lowered {
    /// `column IS NULL`
    IsNull,
    /// `column = ?`
    Eq(Value),
    /// `column >= start AND column < end` (whole-day equality)
    DayRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// `column IN (?, ...)` with inline literals
    InList(Vec<Value>),
    /// membership test against the staged id set
    InIdSet(IdSet),
}

/// Lower an equality filter value
pub fn lower_equal(value: Operand) -> Lowered {
    match value {
        Operand::Null => Lowered::IsNull,
        Operand::Scalar(Value::DateTime(dt)) if is_whole_day(dt) => Lowered::DayRange {
            start: dt,
            end: start_of_day(dt) + Duration::days(1),
        },
        Operand::Scalar(v) => Lowered::Eq(v),
        Operand::IdSet(ids) => Lowered::InIdSet(ids),
        Operand::List(values) => Lowered::InList(values),
    }
}

/// Adjust an upper bound so a whole-day datetime covers its day as a unit.
///
/// Exclusive bounds keep the day boundary (the named day is wholly excluded);
/// inclusive bounds round to the end of the day (wholly included).
pub fn upper_bound(value: Value, inclusive: bool) -> Value {
    match value {
        Value::DateTime(dt) if is_whole_day(dt) && inclusive => Value::DateTime(end_of_day(dt)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartset_core::value::format_datetime;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn null_lowers_to_is_null() {
        assert_eq!(lower_equal(Operand::Null), Lowered::IsNull);
        assert_eq!(lower_equal(Value::Null.into()), Lowered::IsNull);
    }

    #[test]
    fn whole_day_equality_becomes_a_day_range() {
        let lowered = lower_equal(day(1).into());
        assert_eq!(
            lowered,
            Lowered::DayRange {
                start: day(1),
                end: day(2),
            }
        );
    }

    #[test]
    fn timed_equality_stays_exact() {
        let instant = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(13, 30, 0)
            .unwrap();
        assert_eq!(lower_equal(instant.into()), Lowered::Eq(instant.into()));
    }

    #[test]
    fn cohorts_lower_to_staged_membership() {
        let cohort = Cohort::new("test", [1, 2, 3].into());
        assert_eq!(
            lower_equal((&cohort).into()),
            Lowered::InIdSet([1, 2, 3].into())
        );
        assert_eq!(
            lower_equal(IdSet::from([4, 5]).into()),
            Lowered::InIdSet([4, 5].into())
        );
    }

    #[test]
    fn collections_lower_to_literal_in() {
        assert_eq!(
            lower_equal(vec![1i64, 2].into()),
            Lowered::InList(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[rstest]
    #[case(Operand::from(7i64), Value::Int(7))]
    #[case(Operand::from("M"), Value::Text("M".into()))]
    #[case(Operand::from(true), Value::Bool(true))]
    #[case(Operand::from(2.5f64), Value::Real(2.5))]
    fn scalars_lower_to_equality(#[case] operand: Operand, #[case] expected: Value) {
        assert_eq!(lower_equal(operand), Lowered::Eq(expected));
    }

    #[test]
    fn exclusive_upper_bound_keeps_the_day_boundary() {
        assert_eq!(
            upper_bound(day(5).into(), false),
            Value::DateTime(day(5))
        );
    }

    #[test]
    fn inclusive_upper_bound_rounds_to_end_of_day() {
        let Value::DateTime(rounded) = upper_bound(day(5).into(), true) else {
            panic!("expected a datetime bound");
        };
        assert_eq!(format_datetime(rounded), "2024-03-05 23:59:59.999");
    }

    #[test]
    fn timed_upper_bounds_are_unchanged() {
        let instant = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(8, 15, 0)
            .unwrap();
        assert_eq!(upper_bound(instant.into(), true), Value::DateTime(instant));
        assert_eq!(upper_bound(Value::Int(10), true), Value::Int(10));
    }
}
