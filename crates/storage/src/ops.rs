use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value};
use shared::protocol::{DocumentUpdate, FieldOp, Precondition, UpdateOutcome};

/// Applies `update` to `document` all-or-nothing.
///
/// A failed precondition leaves the document untouched and reports
/// [`UpdateOutcome::PreconditionFailed`]. A type mismatch on any op is an
/// error and also leaves the document untouched.
pub fn apply_update(document: &mut Value, update: &DocumentUpdate) -> Result<UpdateOutcome> {
    let fields = document
        .as_object()
        .ok_or_else(|| anyhow!("document body is not a JSON object"))?;

    if let Some(precondition) = &update.precondition {
        if !precondition_holds(fields, precondition)? {
            return Ok(UpdateOutcome::PreconditionFailed);
        }
    }

    let mut next = fields.clone();
    for op in &update.ops {
        apply_op(&mut next, op)?;
    }
    *document = Value::Object(next);
    Ok(UpdateOutcome::Applied)
}

fn precondition_holds(fields: &Map<String, Value>, precondition: &Precondition) -> Result<bool> {
    match precondition {
        Precondition::ArrayExcludes { field, value } => match fields.get(field) {
            None => Ok(true),
            Some(Value::Array(items)) => Ok(!items.contains(value)),
            Some(other) => bail!("field '{field}' is not an array: {other}"),
        },
    }
}

fn apply_op(fields: &mut Map<String, Value>, op: &FieldOp) -> Result<()> {
    if op.field().is_empty() {
        bail!("field name must not be empty");
    }

    match op {
        FieldOp::Increment { field, by } => {
            let current = match fields.get(field) {
                None => 0,
                Some(value) => value
                    .as_i64()
                    .ok_or_else(|| anyhow!("field '{field}' is not an integer: {value}"))?,
            };
            let next = current
                .checked_add(*by)
                .ok_or_else(|| anyhow!("increment of '{field}' overflows"))?;
            fields.insert(field.clone(), Value::from(next));
        }
        FieldOp::ArrayUnion { field, values } => {
            let items = array_field(fields, field)?;
            for value in values {
                if !items.contains(value) {
                    items.push(value.clone());
                }
            }
        }
        FieldOp::ArrayRemove { field, values } => {
            let items = array_field(fields, field)?;
            items.retain(|item| !values.contains(item));
        }
    }
    Ok(())
}

fn array_field<'a>(fields: &'a mut Map<String, Value>, field: &str) -> Result<&'a mut Vec<Value>> {
    let slot = fields
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    match slot {
        Value::Array(items) => Ok(items),
        other => Err(anyhow!("field '{field}' is not an array: {other}")),
    }
}
