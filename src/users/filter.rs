//! Translation of list-endpoint query parameters into a [`PredicateSet`].
//!
//! Inputs arrive as a loose JSON object (`filter=` query parameter) plus an
//! optional `created_at=<op><date>` parameter. Everything is checked here so
//! the stores only ever see typed, whitelisted predicates.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    Time, UtcOffset,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::users::repo_types::User;

const CREATED_AT: &str = "created_at";
const CREATED_AT_BETWEEN: &str = "created_at_between";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
}

impl CompareOp {
    pub fn parse(op: &str) -> AppResult<Self> {
        match op {
            "=" => Ok(CompareOp::Eq),
            ">" => Ok(CompareOp::Gt),
            "<" => Ok(CompareOp::Lt),
            ">=" => Ok(CompareOp::Gte),
            "<=" => Ok(CompareOp::Lte),
            other => Err(AppError::InvalidFilter(format!(
                "invalid operator '{}' for created_at",
                other
            ))),
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Gte => ">=",
            CompareOp::Lte => "<=",
        }
    }

    fn holds(self, lhs: OffsetDateTime, rhs: OffsetDateTime) -> bool {
        match self {
            CompareOp::Eq => lhs == rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Gte => lhs >= rhs,
            CompareOp::Lte => lhs <= rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Point comparison on `created_at` as received, before date parsing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedAtComparison {
    pub operator: String,
    pub value: String,
}

impl CreatedAtComparison {
    /// Splits a `created_at` query value such as `>=2024-01-01`.
    ///
    /// Two-character operators are tried first, then single-character ones.
    /// Anything else keeps its first two characters as the operator so the
    /// translator can reject it.
    pub fn from_query(raw: &str) -> Self {
        lazy_static! {
            static ref OP_RE: Regex = Regex::new(r"^(>=|<=|=|>|<)(.*)$").unwrap();
        }
        if let Some(caps) = OP_RE.captures(raw) {
            return Self {
                operator: caps[1].to_string(),
                value: caps[2].to_string(),
            };
        }
        let split = raw
            .char_indices()
            .nth(2)
            .map(|(i, _)| i)
            .unwrap_or(raw.len());
        Self {
            operator: raw[..split].to_string(),
            value: raw[split..].to_string(),
        }
    }
}

/// Equality on one of the record's public columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Equality {
    Id(Uuid),
    Name(String),
    Email(String),
    Birthdate(String),
}

impl Equality {
    pub fn column(&self) -> &'static str {
        match self {
            Equality::Id(_) => "id",
            Equality::Name(_) => "name",
            Equality::Email(_) => "email",
            Equality::Birthdate(_) => "birthdate",
        }
    }

    fn matches(&self, user: &User) -> bool {
        match self {
            Equality::Id(id) => user.id == *id,
            Equality::Name(v) => user.name == *v,
            Equality::Email(v) => user.email == *v,
            Equality::Birthdate(v) => user.birthdate.as_deref() == Some(v.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatedAtPredicate {
    Compare(CompareOp, OffsetDateTime),
    /// Inclusive on both ends.
    Between(OffsetDateTime, OffsetDateTime),
}

impl CreatedAtPredicate {
    fn matches(&self, created_at: OffsetDateTime) -> bool {
        match *self {
            CreatedAtPredicate::Compare(op, value) => op.holds(created_at, value),
            CreatedAtPredicate::Between(start, end) => start <= created_at && created_at <= end,
        }
    }
}

/// Conjunction of predicates; an empty set matches every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicateSet {
    pub equalities: Vec<Equality>,
    pub created_at: Option<CreatedAtPredicate>,
}

impl PredicateSet {
    pub fn by_id(id: Uuid) -> Self {
        Self {
            equalities: vec![Equality::Id(id)],
            created_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.equalities.is_empty() && self.created_at.is_none()
    }

    pub fn matches(&self, user: &User) -> bool {
        self.equalities.iter().all(|eq| eq.matches(user))
            && self
                .created_at
                .as_ref()
                .map_or(true, |p| p.matches(user.created_at))
    }
}

/// `null` and `""` mean the key was not given.
fn present(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        other => other,
    }
}

/// Raw listing filters: loose field map plus the structured `created_at` inputs.
#[derive(Debug, Clone, Default)]
pub struct UserFilters {
    pub fields: Map<String, Value>,
    pub created_at: Option<CreatedAtComparison>,
    pub created_at_between: Option<Value>,
}

impl UserFilters {
    /// Splits a decoded `filter` object, pulling out the `created_at` keys.
    pub fn from_json(mut fields: Map<String, Value>) -> AppResult<Self> {
        let created_at = match present(fields.remove(CREATED_AT)) {
            None => None,
            Some(v) => Some(serde_json::from_value::<CreatedAtComparison>(v).map_err(|e| {
                AppError::InvalidFilter(format!(
                    "created_at must be an object with operator and value: {}",
                    e
                ))
            })?),
        };
        let created_at_between = present(fields.remove(CREATED_AT_BETWEEN));
        Ok(Self {
            fields,
            created_at,
            created_at_between,
        })
    }

    /// Parses the `filter` query parameter; absent or blank means no filters.
    pub fn from_query(filter: Option<&str>, created_at: Option<&str>) -> AppResult<Self> {
        let fields = match filter.map(str::trim).filter(|s| !s.is_empty()) {
            None => Map::new(),
            Some(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(AppError::InvalidFilter(
                        "filter must be a JSON object".into(),
                    ))
                }
                Err(e) => {
                    return Err(AppError::InvalidFilter(format!(
                        "filter is not valid JSON: {}",
                        e
                    )))
                }
            },
        };
        let mut filters = Self::from_json(fields)?;
        if let Some(raw) = created_at.filter(|s| !s.is_empty()) {
            filters.created_at = Some(CreatedAtComparison::from_query(raw));
        }
        Ok(filters)
    }
}

/// Builds the predicate set for a listing request. Pure; no store access.
///
/// When both a point comparison and a range are given, the range wins.
pub fn translate(filters: &UserFilters) -> AppResult<PredicateSet> {
    let mut set = PredicateSet::default();

    if let Some(cmp) = &filters.created_at {
        let op = CompareOp::parse(&cmp.operator)?;
        let value = parse_instant(&cmp.value)?;
        set.created_at = Some(CreatedAtPredicate::Compare(op, value));
    }

    if let Some(range) = &filters.created_at_between {
        let (start, end) = parse_range(range)?;
        set.created_at = Some(CreatedAtPredicate::Between(start, end));
    }

    for (key, value) in &filters.fields {
        if let Some(eq) = equality(key, value)? {
            set.equalities.push(eq);
        }
    }

    Ok(set)
}

fn equality(key: &str, value: &Value) -> AppResult<Option<Equality>> {
    let text = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.is_empty() => return Ok(None),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => {
            return Err(AppError::InvalidFilter(format!(
                "filter value for '{}' must be a scalar",
                key
            )))
        }
    };

    let eq = match key {
        "id" => Equality::Id(Uuid::parse_str(&text).map_err(|_| {
            AppError::InvalidFilter(format!("'{}' is not a valid id", text))
        })?),
        "name" => Equality::Name(text),
        "email" => Equality::Email(text),
        "birthdate" => Equality::Birthdate(text),
        other => {
            return Err(AppError::InvalidFilter(format!(
                "unknown filter field '{}'",
                other
            )))
        }
    };
    Ok(Some(eq))
}

fn parse_range(range: &Value) -> AppResult<(OffsetDateTime, OffsetDateTime)> {
    let bounds = match range {
        Value::Array(items) if items.len() == 2 => items,
        _ => {
            return Err(AppError::InvalidFilter(
                "created_at_between must be a two-element array".into(),
            ))
        }
    };
    let bound = |v: &Value| -> AppResult<Date> {
        let s = v.as_str().ok_or_else(|| {
            AppError::InvalidFilter("created_at_between bounds must be date strings".into())
        })?;
        Ok(parse_instant(s)?.date())
    };
    let start = bound(&bounds[0])?.with_time(Time::MIDNIGHT).assume_utc();
    let end = bound(&bounds[1])?
        .with_hms_milli(23, 59, 59, 999)
        .map_err(|e| AppError::InvalidFilter(e.to_string()))?
        .assume_utc();
    Ok((start, end))
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC),
/// normalised to UTC.
pub fn parse_instant(raw: &str) -> AppResult<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(dt.to_offset(UtcOffset::UTC));
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(|d| d.midnight().assume_utc())
        .map_err(|_| AppError::InvalidFilter(format!("'{}' is not a valid date", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn filters(value: Value) -> UserFilters {
        match value {
            Value::Object(map) => UserFilters::from_json(map).expect("filter object"),
            _ => panic!("test filter must be an object"),
        }
    }

    fn user(name: &str, created_at: OffsetDateTime) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.into(),
            email: format!("{}@example.com", name.to_lowercase()),
            birthdate: None,
            created_at,
        }
    }

    #[test]
    fn query_operator_prefix_is_split() {
        let cmp = CreatedAtComparison::from_query(">=2024-01-01");
        assert_eq!(cmp.operator, ">=");
        assert_eq!(cmp.value, "2024-01-01");

        let cmp = CreatedAtComparison::from_query("<2024-01-01");
        assert_eq!(cmp.operator, "<");
        assert_eq!(cmp.value, "2024-01-01");

        let cmp = CreatedAtComparison::from_query("@@2024-01-01");
        assert_eq!(cmp.operator, "@@");
        assert_eq!(cmp.value, "2024-01-01");
    }

    #[test]
    fn comparison_translates_to_operator_and_instant() {
        let f = UserFilters::from_query(None, Some(">=2024-01-01")).unwrap();
        let set = translate(&f).unwrap();
        assert_eq!(
            set.created_at,
            Some(CreatedAtPredicate::Compare(
                CompareOp::Gte,
                datetime!(2024-01-01 0:00 UTC)
            ))
        );
    }

    #[test]
    fn unrecognized_operator_is_invalid_filter() {
        let f = UserFilters::from_query(None, Some("@@2024-01-01")).unwrap();
        let err = translate(&f).unwrap_err();
        assert!(matches!(err, AppError::InvalidFilter(_)));
    }

    #[test]
    fn range_is_widened_to_whole_days() {
        let f = filters(json!({ "created_at_between": ["2024-01-01", "2024-01-03"] }));
        let set = translate(&f).unwrap();
        assert_eq!(
            set.created_at,
            Some(CreatedAtPredicate::Between(
                datetime!(2024-01-01 0:00:00.000 UTC),
                datetime!(2024-01-03 23:59:59.999 UTC)
            ))
        );

        assert!(set.matches(&user("Edge", datetime!(2024-01-03 23:59:59.999 UTC))));
        assert!(set.matches(&user("Start", datetime!(2024-01-01 0:00 UTC))));
        assert!(!set.matches(&user("Late", datetime!(2024-01-04 0:00 UTC))));
        assert!(!set.matches(&user("Early", datetime!(2023-12-31 23:59:59.999 UTC))));
    }

    #[test]
    fn range_takes_precedence_over_point_comparison() {
        let mut f = filters(json!({ "created_at_between": ["2024-01-01", "2024-01-01"] }));
        f.created_at = Some(CreatedAtComparison::from_query(">2030-01-01"));
        let set = translate(&f).unwrap();
        assert!(matches!(
            set.created_at,
            Some(CreatedAtPredicate::Between(_, _))
        ));
    }

    #[test]
    fn range_floors_timestamps_to_their_date() {
        let f = filters(json!({
            "created_at_between": ["2024-02-10T15:30:00Z", "2024-02-11T01:00:00Z"]
        }));
        let set = translate(&f).unwrap();
        assert_eq!(
            set.created_at,
            Some(CreatedAtPredicate::Between(
                datetime!(2024-02-10 0:00 UTC),
                datetime!(2024-02-11 23:59:59.999 UTC)
            ))
        );
    }

    #[test]
    fn malformed_range_is_rejected() {
        for bad in [
            json!({ "created_at_between": ["2024-01-01"] }),
            json!({ "created_at_between": "2024-01-01" }),
            json!({ "created_at_between": [1, 2] }),
            json!({ "created_at_between": ["yesterday", "today"] }),
        ] {
            assert!(matches!(
                translate(&filters(bad)),
                Err(AppError::InvalidFilter(_))
            ));
        }
    }

    #[test]
    fn empty_strings_are_dropped() {
        let set = translate(&filters(json!({ "name": "", "email": null }))).unwrap();
        assert!(set.is_empty());
        assert!(set.matches(&user("Anyone", datetime!(2024-01-01 0:00 UTC))));
    }

    #[test]
    fn non_empty_values_become_equalities() {
        let set = translate(&filters(json!({ "name": "Ada", "birthdate": "1815-12-10" }))).unwrap();
        assert_eq!(set.equalities.len(), 2);
        assert!(set.equalities.contains(&Equality::Name("Ada".into())));
        assert!(set
            .equalities
            .contains(&Equality::Birthdate("1815-12-10".into())));
    }

    #[test]
    fn unknown_and_secret_columns_are_rejected() {
        for key in ["password", "nickname"] {
            let mut map = Map::new();
            map.insert(key.into(), json!("x"));
            let f = UserFilters::from_json(map).unwrap();
            assert!(matches!(translate(&f), Err(AppError::InvalidFilter(_))));
        }
    }

    #[test]
    fn id_must_be_uuid() {
        assert!(translate(&filters(json!({ "id": "42" }))).is_err());
        let id = Uuid::new_v4();
        let set = translate(&filters(json!({ "id": id.to_string() }))).unwrap();
        assert_eq!(set, PredicateSet::by_id(id));
    }

    #[test]
    fn created_at_may_come_from_filter_object() {
        let f = filters(json!({ "created_at": { "operator": "<", "value": "2024-05-01" } }));
        let set = translate(&f).unwrap();
        assert_eq!(
            set.created_at,
            Some(CreatedAtPredicate::Compare(
                CompareOp::Lt,
                datetime!(2024-05-01 0:00 UTC)
            ))
        );
    }

    #[test]
    fn blank_created_at_keys_mean_no_filter() {
        for blank in [
            json!({ "created_at": null }),
            json!({ "created_at": "" }),
            json!({ "created_at_between": null }),
            json!({ "created_at_between": "" }),
            json!({ "created_at": "", "created_at_between": null, "name": "" }),
        ] {
            let set = translate(&filters(blank.clone())).unwrap();
            assert!(set.is_empty(), "{} should not filter", blank);
        }

        let f = UserFilters::from_query(Some(r#"{"created_at_between":""}"#), Some("")).unwrap();
        assert!(translate(&f).unwrap().is_empty());
    }

    #[test]
    fn non_blank_malformed_created_at_keys_are_still_rejected() {
        let f = filters(json!({ "created_at_between": "2024-01-01" }));
        assert!(matches!(translate(&f), Err(AppError::InvalidFilter(_))));
        let f = filters(json!({ "created_at_between": ["2024-01-01"] }));
        assert!(matches!(translate(&f), Err(AppError::InvalidFilter(_))));
        let obj = json!({ "created_at": ">=2024-01-01" });
        assert!(matches!(
            UserFilters::from_json(obj.as_object().unwrap().clone()),
            Err(AppError::InvalidFilter(_))
        ));
    }

    #[test]
    fn query_parameter_replaces_filter_comparison() {
        let f = UserFilters::from_query(
            Some(r#"{"created_at":{"operator":"<","value":"2024-05-01"}}"#),
            Some("=2024-06-01T12:00:00+02:00"),
        )
        .unwrap();
        let set = translate(&f).unwrap();
        assert_eq!(
            set.created_at,
            Some(CreatedAtPredicate::Compare(
                CompareOp::Eq,
                datetime!(2024-06-01 10:00 UTC)
            ))
        );
    }

    #[test]
    fn bad_filter_json_is_invalid_filter() {
        assert!(matches!(
            UserFilters::from_query(Some("{name:"), None),
            Err(AppError::InvalidFilter(_))
        ));
        assert!(matches!(
            UserFilters::from_query(Some("[1,2]"), None),
            Err(AppError::InvalidFilter(_))
        ));
        assert!(UserFilters::from_query(Some("  "), None).unwrap().fields.is_empty());
    }

    #[test]
    fn unparseable_date_is_invalid_filter() {
        let f = UserFilters::from_query(None, Some(">=soon")).unwrap();
        assert!(matches!(translate(&f), Err(AppError::InvalidFilter(_))));
    }
}
