use crate::err::Error;

/// Trims a required string field, rejecting absent or blank values
/// with a validation error that names the field. The first failing
/// call in a handler decides the response, so callers must check
/// fields in their documented order.
pub fn required(field: &str, value: Option<&str>) -> Result<String, Error> {
    match value.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed.to_string()),
        _ => Err(Error::missing_field(field)),
    }
}
