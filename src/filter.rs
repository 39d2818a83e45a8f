//! Store-agnostic filter predicates.
//!
//! A [`FilterTemplate`] captures everything about a connection's filter that
//! never changes (dimension values, secondary equality filters, the cursor
//! field). Each poll combines it with the current cursor into a fresh
//! [`Predicate`], which the store renders into its own query language.

use crate::error::HubError;

/// Canonical case applied to dimension values at connection setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Case {
    Lower,
    Upper,
}

impl Case {
    fn apply(self, s: &str) -> String {
        match self {
            Self::Lower => s.to_lowercase(),
            Self::Upper => s.to_uppercase(),
        }
    }
}

/// A bound parameter of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Gt,
    Gte,
    Lte,
}

/// One conjunct of a predicate. Field names are logical; the store maps them.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `field IN (values)`
    In { field: &'static str, values: Vec<String> },
    /// `a = value OR b = value`
    EitherEq { fields: [&'static str; 2], value: String },
    /// `field = value`
    Eq { field: &'static str, value: String },
    /// `field <op> value`
    Compare { field: &'static str, op: Cmp, value: FilterValue },
}

/// Conjunction of clauses. An empty predicate matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub clauses: Vec<Clause>,
}

impl Predicate {
    pub fn and(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    /// The lower bound on `field`, if this predicate carries one.
    #[cfg(test)]
    pub fn lower_bound(&self, field: &str) -> Option<&FilterValue> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Compare { field: f, op: Cmp::Gt | Cmp::Gte, value } if *f == field => {
                Some(value)
            }
            _ => None,
        })
    }
}

/// Dimension part of a connection's filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Dimension {
    /// No dimension restriction.
    All,
    /// Field value is one of `values`.
    OneOf { field: &'static str, values: Vec<String> },
    /// Either of two fields equals `value` (e.g. base or quote currency).
    EitherOf { fields: [&'static str; 2], value: String },
}

/// Split a comma-separated selector into canonical-case, de-duplicated values.
///
/// Rejects a selector with no non-blank values.
pub fn parse_values(name: &str, raw: &str, case: Case) -> Result<Vec<String>, HubError> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.split(',') {
        let v = part.trim();
        if v.is_empty() {
            continue;
        }
        let v = case.apply(v);
        if !out.contains(&v) {
            out.push(v);
        }
    }
    if out.is_empty() {
        return Err(HubError::BadRequest(format!("{name} must not be empty")));
    }
    Ok(out)
}

/// Per-connection filter, fixed at setup.
#[derive(Debug, Clone)]
pub struct FilterTemplate {
    dimension: Dimension,
    cursor_field: &'static str,
    equals: Vec<(&'static str, String)>,
}

impl FilterTemplate {
    pub fn new(dimension: Dimension, cursor_field: &'static str) -> Self {
        Self {
            dimension,
            cursor_field,
            equals: Vec::new(),
        }
    }

    /// Add an optional equality filter (source, subreddit, ...). Blank values are ignored.
    pub fn with_eq(mut self, field: &'static str, value: Option<&str>) -> Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.equals.push((field, v.to_string()));
        }
        self
    }

    /// Human-readable selector for log lines.
    pub fn describe(&self) -> String {
        match &self.dimension {
            Dimension::All => "all".to_string(),
            Dimension::OneOf { values, .. } => values.join(","),
            Dimension::EitherOf { value, .. } => value.clone(),
        }
    }

    /// Predicate without a cursor bound.
    pub fn base(&self) -> Predicate {
        let mut pred = Predicate::default();
        match &self.dimension {
            Dimension::All => {}
            Dimension::OneOf { field, values } => {
                pred = pred.and(Clause::In {
                    field: *field,
                    values: values.clone(),
                });
            }
            Dimension::EitherOf { fields, value } => {
                pred = pred.and(Clause::EitherEq {
                    fields: *fields,
                    value: value.clone(),
                });
            }
        }
        for (field, value) in &self.equals {
            pred = pred.and(Clause::Eq {
                field: *field,
                value: value.clone(),
            });
        }
        pred
    }

    /// Predicate for records strictly newer than `cursor`.
    pub fn since(&self, cursor: impl Into<FilterValue>) -> Predicate {
        self.base().and(Clause::Compare {
            field: self.cursor_field,
            op: Cmp::Gt,
            value: cursor.into(),
        })
    }
}
