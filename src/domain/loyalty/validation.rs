use serde_json::Value;

use super::model::{MAX_POINTS_PER_ADDITION, MIN_POINTS_PER_ADDITION};
use crate::domain::ValidationError;

/// Validate the body of an add-points request: `{ "points": <int 1..=1000> }`.
///
/// Takes the raw JSON so a float, string or missing value is reported as a
/// validation problem rather than a deserialization failure.
pub fn validate_add_points(body: &Value) -> Result<i64, ValidationError> {
    let invalid = |detail: &str| ValidationError::single("Validation failed", detail);

    let Some(object) = body.as_object() else {
        return Err(invalid("body must be a JSON object"));
    };

    if let Some(unknown) = object.keys().find(|key| key.as_str() != "points") {
        return Err(invalid(&format!("\"{unknown}\" is not allowed")));
    }

    let points = match object.get("points") {
        None | Some(Value::Null) => return Err(invalid("points is required")),
        Some(value) => value,
    };

    let Some(points) = integral(points) else {
        return Err(invalid("points must be an integer"));
    };

    if !(MIN_POINTS_PER_ADDITION..=MAX_POINTS_PER_ADDITION).contains(&points) {
        return Err(invalid(&format!(
            "points must be between {MIN_POINTS_PER_ADDITION} and {MAX_POINTS_PER_ADDITION}"
        )));
    }

    Ok(points)
}

/// Integer value of a JSON number or numeric string; `5`, `5.0` and `"5"` all
/// count, `5.5` and `"five"` do not.
fn integral(value: &Value) -> Option<i64> {
    let number = match value {
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                return Some(int);
            }
            number.as_f64()?
        }
        Value::String(text) => {
            let text = text.trim();
            if let Ok(int) = text.parse::<i64>() {
                return Some(int);
            }
            text.parse::<f64>().ok()?
        }
        _ => return None,
    };

    (number.is_finite() && number.fract() == 0.0 && number.abs() <= i64::MAX as f64)
        .then_some(number as i64)
}
