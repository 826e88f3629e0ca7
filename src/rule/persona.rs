//! Flat persona objects → rule trees.
//!
//! Older extraction prompts answer with one flat object instead of a rule
//! tree; every entry is an implicit conjunct:
//!
//! ```json
//! {"persona": {
//!     "age": {"operator": ">", "value": 20},
//!     "location": ["Florida", "Georgia"],
//!     "gender": "F",
//!     "tag": ["job prep", "career"]
//! }}
//! ```

use serde_json::Value as Json;

use crate::model::Value;
use crate::{Error, Result};
use super::ast::{CompareOp, Condition, Expr, Rule};

impl Rule {
    /// Convert a flat persona object (wrapped in `persona` or bare) into an
    /// `And` of one condition per entry, in document order.
    pub fn from_persona(doc: &Json) -> Result<Self> {
        let persona = doc.get("persona").unwrap_or(doc);
        let entries = persona
            .as_object()
            .ok_or_else(|| Error::rule_format("persona must be a JSON object", persona))?;
        if entries.is_empty() {
            return Err(Error::rule_format("persona has no fields", persona));
        }

        let conditions = entries
            .iter()
            .map(|(field, spec)| persona_condition(field, spec).map(Expr::Leaf))
            .collect::<Result<Vec<_>>>()?;
        Ok(Rule::new(Expr::And(conditions)))
    }
}

fn persona_condition(field: &str, spec: &Json) -> Result<Condition> {
    match spec {
        Json::Object(obj) => {
            let op = obj
                .get("operator")
                .and_then(Json::as_str)
                .and_then(CompareOp::parse)
                .ok_or_else(|| Error::rule_format(format!("`{field}` needs a known `operator`"), spec))?;
            // Legacy prompts sometimes omit the operand; it defaults to 0.
            let value = match obj.get("value") {
                Some(v) => Value::from_json(v)
                    .filter(|v| !matches!(v, Value::List(_)))
                    .ok_or_else(|| Error::rule_format(format!("`{field}` value must be a scalar"), spec))?,
                None => Value::Int(0),
            };
            Ok(Condition::compare(field, op, value))
        }
        Json::Array(items) => {
            let values = items
                .iter()
                .map(|v| match v {
                    Json::Array(_) | Json::Object(_) => None,
                    other => Value::from_json(other),
                })
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| Error::rule_format(format!("`{field}` list must hold scalars"), spec))?;
            Ok(Condition::one_of(field, values))
        }
        Json::Null => Err(Error::rule_format(format!("`{field}` is null"), spec)),
        scalar => {
            let value = Value::from_json(scalar)
                .ok_or_else(|| Error::rule_format(format!("`{field}` has an unsupported value"), spec))?;
            Ok(Condition::equals(field, value))
        }
    }
}
