//! Rule document → AST.
//!
//! ```json
//! {"conditions": {"and": [
//!     {"field": "age", "operator": ">", "value": 20},
//!     {"or": [{"field": "tag", "in": ["crypto"]}, {"field": "genre", "in": ["finance"]}]}
//! ]}}
//! ```
//!
//! Every node is classified by its keys before anything else is read. A
//! node that could be read two ways (`and` next to `or`, a combinator
//! carrying `field`, a leaf with two predicates) is rejected instead of
//! picking one.

use std::str::FromStr;

use serde_json::{Map, Value as Json};

use crate::model::Value;
use crate::{Error, Result};
use super::ast::{CompareOp, Condition, Expr, Predicate, Rule};

impl Rule {
    /// Parse a `{"conditions": Expr}` document, with an optional `name`.
    pub fn from_json(doc: &Json) -> Result<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| Error::rule_format("rule must be a JSON object", doc))?;
        let conditions = obj
            .get("conditions")
            .ok_or_else(|| Error::rule_format("rule has no `conditions`", doc))?;
        let name = match obj.get("name") {
            None | Some(Json::Null) => None,
            Some(Json::String(s)) => Some(s.clone()),
            Some(_) => return Err(Error::rule_format("rule `name` must be a string", doc)),
        };
        Ok(Self { name, conditions: Expr::from_json(conditions)? })
    }
}

impl FromStr for Rule {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        Rule::from_json(&serde_json::from_str(text)?)
    }
}

impl Expr {
    pub fn from_json(doc: &Json) -> Result<Self> {
        let obj = doc
            .as_object()
            .ok_or_else(|| Error::rule_format("rule node must be a JSON object", doc))?;

        let has_and = obj.contains_key("and");
        let has_or = obj.contains_key("or");
        let has_field = obj.contains_key("field");

        match (has_and, has_or, has_field) {
            (true, true, _) => Err(Error::rule_format("rule node has both `and` and `or`", doc)),
            (true, false, false) => Ok(Expr::And(children(obj, "and", doc)?)),
            (false, true, false) => Ok(Expr::Or(children(obj, "or", doc)?)),
            (true, false, true) | (false, true, true) => {
                Err(Error::rule_format("rule node mixes a combinator with `field`", doc))
            }
            (false, false, true) => Ok(Expr::Leaf(Condition::from_json(obj, doc)?)),
            (false, false, false) => {
                Err(Error::rule_format("rule node is neither a combinator nor a condition", doc))
            }
        }
    }
}

fn children(obj: &Map<String, Json>, key: &str, doc: &Json) -> Result<Vec<Expr>> {
    let list = obj[key]
        .as_array()
        .ok_or_else(|| Error::rule_format(format!("`{key}` must be a list"), doc))?;
    if list.is_empty() {
        return Err(Error::rule_format(format!("`{key}` must not be empty"), doc));
    }
    list.iter().map(Expr::from_json).collect()
}

impl Condition {
    fn from_json(obj: &Map<String, Json>, doc: &Json) -> Result<Self> {
        let field = obj["field"]
            .as_str()
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| Error::rule_format("`field` must be a non-empty string", doc))?
            .to_owned();

        let predicates = ["operator", "in", "equals"]
            .iter()
            .filter(|k| obj.contains_key(**k))
            .count();
        if predicates != 1 {
            return Err(Error::rule_format(
                "condition needs exactly one of `operator`, `in`, `equals`",
                doc,
            ));
        }

        let predicate = if let Some(op) = obj.get("operator") {
            let op = op
                .as_str()
                .and_then(CompareOp::parse)
                .ok_or_else(|| Error::rule_format("unknown comparison operator", doc))?;
            let value = obj
                .get("value")
                .ok_or_else(|| Error::rule_format("`operator` without `value`", doc))?;
            Predicate::Compare { op, value: scalar(value, doc)? }
        } else if let Some(list) = obj.get("in") {
            let items = list
                .as_array()
                .ok_or_else(|| Error::rule_format("`in` must be a list", doc))?;
            Predicate::In(items.iter().map(|v| scalar(v, doc)).collect::<Result<_>>()?)
        } else {
            Predicate::Equals(scalar(&obj["equals"], doc)?)
        };

        Ok(Self { field, predicate })
    }
}

fn scalar(json: &Json, doc: &Json) -> Result<Value> {
    match json {
        Json::Array(_) | Json::Object(_) => Err(Error::rule_format("operand must be a scalar", doc)),
        other => Value::from_json(other).ok_or_else(|| Error::rule_format("unsupported operand", doc)),
    }
}
