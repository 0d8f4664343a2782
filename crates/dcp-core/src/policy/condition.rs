// crates/dcp-core/src/policy/condition.rs
// ============================================================================
// Module: Policy Conditions
// Description: Predicate tree, operand templates, and operator semantics.
// Purpose: Compile JSON conditions once and evaluate them without failure.
// Dependencies: regex, serde_json
// ============================================================================

//! ## Overview
//! Conditions are compiled from their JSON form into a tagged tree and
//! evaluated by recursive dispatch on the node kind. Operands are literals or
//! `{{name}}` templates resolved against [`PolicyInputs`]. Operator semantics:
//! - `gt/gte/lt/lte` coerce numbers and numeric strings (IEEE comparison).
//! - `eq` compares numerically when both sides are numeric, else by string form.
//! - `includes` tests array membership or substring; `in` is its mirror.
//! - `matches` is a regex anchored at the start of the value.
//! - `missing` is true for absent, null, or empty values; `exists` negates it.
//!
//! A missing operand makes every binary operator false.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde_json::Value;

use crate::policy::PolicyError;
use crate::policy::PolicyInputs;

// ============================================================================
// SECTION: Operators
// ============================================================================

/// Numeric and equality comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal.
    Lte,
    /// Equal.
    Eq,
    /// Not equal.
    Neq,
}

/// Collection membership tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Left collection contains right value.
    Includes,
    /// Left value is contained in right collection.
    In,
}

/// Presence tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Value is absent or empty.
    Missing,
    /// Value is present and non-empty.
    Exists,
}

// ============================================================================
// SECTION: Operands
// ============================================================================

/// Segment of an interpolated string operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Literal text.
    Text(String),
    /// Input reference.
    Variable(String),
}

/// Condition operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// JSON literal.
    Literal(Value),
    /// Whole-value input reference (`"{{name}}"`).
    Variable(String),
    /// String with embedded input references; missing inputs render empty.
    Template(Vec<TemplatePart>),
}

impl Operand {
    /// Parses an operand from its JSON form.
    #[must_use]
    pub fn parse(value: &Value) -> Self {
        let Value::String(text) = value else {
            return Self::Literal(value.clone());
        };
        let parts = parse_template(text);
        if let [TemplatePart::Variable(name)] = parts.as_slice() {
            return Self::Variable(name.clone());
        }
        if parts.iter().any(|part| matches!(part, TemplatePart::Variable(_))) {
            Self::Template(parts)
        } else {
            Self::Literal(value.clone())
        }
    }

    /// Resolves the operand; `None` means missing.
    #[must_use]
    pub fn resolve(&self, inputs: &PolicyInputs) -> Option<Value> {
        match self {
            Self::Literal(Value::Null) => None,
            Self::Literal(value) => Some(value.clone()),
            Self::Variable(name) => inputs.get(name).cloned(),
            Self::Template(parts) => {
                let mut rendered = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Text(text) => rendered.push_str(text),
                        TemplatePart::Variable(name) => {
                            if let Some(value) = inputs.get(name) {
                                rendered.push_str(&string_form(value));
                            }
                        }
                    }
                }
                Some(Value::String(rendered))
            }
        }
    }
}

/// Splits a string into text and `{{name}}` segments. Names are `[A-Za-z0-9_]+`.
fn parse_template(text: &str) -> Vec<TemplatePart> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let name_len = after.find("}}").filter(|len| {
            *len > 0 && after[..*len].chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        });
        if let Some(len) = name_len {
            literal.push_str(&rest[..start]);
            if !literal.is_empty() {
                parts.push(TemplatePart::Text(std::mem::take(&mut literal)));
            }
            parts.push(TemplatePart::Variable(after[..len].to_string()));
            rest = &after[len + 2..];
        } else {
            literal.push_str(&rest[..start + 2]);
            rest = after;
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(TemplatePart::Text(literal));
    }
    parts
}

// ============================================================================
// SECTION: Condition Tree
// ============================================================================

/// Compiled predicate tree.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Empty condition; always true.
    Always,
    /// All children hold (true when empty).
    All(Vec<Self>),
    /// Any child holds (false when empty).
    Any(Vec<Self>),
    /// Binary comparison.
    Compare {
        /// Comparator.
        op: Comparator,
        /// Left operand.
        left: Operand,
        /// Right operand.
        right: Operand,
    },
    /// Collection membership.
    Member {
        /// Membership direction.
        op: Membership,
        /// Left operand.
        left: Operand,
        /// Right operand.
        right: Operand,
    },
    /// Presence test.
    Presence {
        /// Presence test kind.
        op: Presence,
        /// Tested operand.
        operand: Operand,
    },
    /// Regex match anchored at the start of the value.
    Matches {
        /// Tested operand.
        operand: Operand,
        /// Compiled pattern.
        pattern: Regex,
    },
}

impl Condition {
    /// Compiles a JSON condition, reporting problems with their JSON path.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Invalid`] for unknown operators, wrong arity,
    /// ambiguous nodes, or invalid `matches` patterns.
    pub fn compile(value: &Value, path: &str) -> Result<Self, PolicyError> {
        let Value::Object(map) = value else {
            return Err(PolicyError::invalid(path, "condition must be an object"));
        };
        let mut entries = map.iter();
        let Some((operator, args)) = entries.next() else {
            return Ok(Self::Always);
        };
        if entries.next().is_some() {
            return Err(PolicyError::invalid(path, "condition must contain exactly one operator"));
        }
        let node_path = format!("{path}.{operator}");
        match operator.as_str() {
            "all" => Ok(Self::All(compile_children(args, &node_path)?)),
            "any" => Ok(Self::Any(compile_children(args, &node_path)?)),
            "gt" => compile_compare(Comparator::Gt, args, &node_path),
            "gte" => compile_compare(Comparator::Gte, args, &node_path),
            "lt" => compile_compare(Comparator::Lt, args, &node_path),
            "lte" => compile_compare(Comparator::Lte, args, &node_path),
            "eq" => compile_compare(Comparator::Eq, args, &node_path),
            "neq" => compile_compare(Comparator::Neq, args, &node_path),
            "includes" => compile_member(Membership::Includes, args, &node_path),
            "in" => compile_member(Membership::In, args, &node_path),
            "missing" => compile_presence(Presence::Missing, args, &node_path),
            "exists" => compile_presence(Presence::Exists, args, &node_path),
            "matches" => compile_matches(args, &node_path),
            other => Err(PolicyError::invalid(path, format!("unknown operator '{other}'"))),
        }
    }

    /// Evaluates the condition against inputs.
    #[must_use]
    pub fn evaluate(&self, inputs: &PolicyInputs) -> bool {
        match self {
            Self::Always => true,
            Self::All(children) => children.iter().all(|child| child.evaluate(inputs)),
            Self::Any(children) => children.iter().any(|child| child.evaluate(inputs)),
            Self::Compare {
                op,
                left,
                right,
            } => {
                let (Some(left), Some(right)) = (left.resolve(inputs), right.resolve(inputs))
                else {
                    return false;
                };
                compare(*op, &left, &right)
            }
            Self::Member {
                op,
                left,
                right,
            } => {
                let (Some(left), Some(right)) = (left.resolve(inputs), right.resolve(inputs))
                else {
                    return false;
                };
                match op {
                    Membership::Includes => includes(&left, &right),
                    Membership::In => includes(&right, &left),
                }
            }
            Self::Presence {
                op,
                operand,
            } => {
                let missing = is_missing(operand.resolve(inputs).as_ref());
                match op {
                    Presence::Missing => missing,
                    Presence::Exists => !missing,
                }
            }
            Self::Matches {
                operand,
                pattern,
            } => operand.resolve(inputs).is_some_and(|value| {
                pattern.find(&string_form(&value)).is_some_and(|found| found.start() == 0)
            }),
        }
    }
}

// ============================================================================
// SECTION: Compilation Helpers
// ============================================================================

/// Compiles the children of an `all`/`any` node.
fn compile_children(args: &Value, path: &str) -> Result<Vec<Condition>, PolicyError> {
    let Value::Array(items) = args else {
        return Err(PolicyError::invalid(path, "combinator requires a list of conditions"));
    };
    items
        .iter()
        .enumerate()
        .map(|(index, item)| Condition::compile(item, &format!("{path}[{index}]")))
        .collect()
}

/// Extracts exactly two operands.
fn binary_operands(args: &Value, path: &str) -> Result<(Operand, Operand), PolicyError> {
    match args {
        Value::Array(items) if items.len() == 2 => {
            Ok((Operand::parse(&items[0]), Operand::parse(&items[1])))
        }
        _ => Err(PolicyError::invalid(path, "operator requires [left, right] operands")),
    }
}

/// Compiles a comparator node.
fn compile_compare(op: Comparator, args: &Value, path: &str) -> Result<Condition, PolicyError> {
    let (left, right) = binary_operands(args, path)?;
    Ok(Condition::Compare {
        op,
        left,
        right,
    })
}

/// Compiles a membership node.
fn compile_member(op: Membership, args: &Value, path: &str) -> Result<Condition, PolicyError> {
    let (left, right) = binary_operands(args, path)?;
    Ok(Condition::Member {
        op,
        left,
        right,
    })
}

/// Compiles a presence node; accepts a bare operand or a one-element list.
fn compile_presence(op: Presence, args: &Value, path: &str) -> Result<Condition, PolicyError> {
    let operand = match args {
        Value::Array(items) if items.len() == 1 => Operand::parse(&items[0]),
        Value::Array(_) | Value::Object(_) => {
            return Err(PolicyError::invalid(path, "operator requires a single operand"));
        }
        other => Operand::parse(other),
    };
    Ok(Condition::Presence {
        op,
        operand,
    })
}

/// Compiles a `matches` node; the pattern must be a literal string.
fn compile_matches(args: &Value, path: &str) -> Result<Condition, PolicyError> {
    let (operand, pattern) = binary_operands(args, path)?;
    let Operand::Literal(Value::String(source)) = &pattern else {
        return Err(PolicyError::invalid(path, "pattern must be a literal string"));
    };
    let pattern = Regex::new(source)
        .map_err(|err| PolicyError::invalid(path, format!("invalid pattern: {err}")))?;
    Ok(Condition::Matches {
        operand,
        pattern,
    })
}

// ============================================================================
// SECTION: Operator Semantics
// ============================================================================

/// Returns the numeric view of a value (numbers and numeric strings).
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Returns the string view of a value.
fn string_form(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Applies a comparator to two present values.
fn compare(op: Comparator, left: &Value, right: &Value) -> bool {
    match op {
        Comparator::Eq => loose_eq(left, right),
        Comparator::Neq => !loose_eq(left, right),
        Comparator::Gt | Comparator::Gte | Comparator::Lt | Comparator::Lte => {
            let (Some(left), Some(right)) = (as_number(left), as_number(right)) else {
                return false;
            };
            match op {
                Comparator::Gt => left > right,
                Comparator::Gte => left >= right,
                Comparator::Lt => left < right,
                _ => left <= right,
            }
        }
    }
}

/// Equality: numeric when both sides are numeric, else string form.
#[allow(clippy::float_cmp, reason = "Policy equality uses exact IEEE comparison.")]
fn loose_eq(left: &Value, right: &Value) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(left), Some(right)) => left == right,
        _ => string_form(left) == string_form(right),
    }
}

/// Membership: array element equality or substring containment.
fn includes(collection: &Value, value: &Value) -> bool {
    match collection {
        Value::Array(items) => items.iter().any(|item| json_eq(item, value)),
        Value::String(text) => text.contains(&string_form(value)),
        _ => false,
    }
}

/// Structural JSON equality that treats numerically equal numbers as equal.
#[allow(clippy::float_cmp, reason = "Membership uses exact IEEE comparison.")]
fn json_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left), Value::Number(right)) => left.as_f64() == right.as_f64(),
        _ => left == right,
    }
}

/// Absent, null, or empty string/array/object.
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
