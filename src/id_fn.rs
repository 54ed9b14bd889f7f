//! Default identifier function.

/// The default `idOf`: an object with both `__typename` and an `id`/`_id` field is identified as
/// `"{typename}:{id}"`; anything else yields `None`, meaning the writer will synthesize a
/// generated id for it.
pub fn default_id_of(result: &serde_json::Value) -> Option<String> {
    let object = result.as_object()?;
    let typename = object.get("__typename")?.as_str()?;
    let id = object
        .get("id")
        .or_else(|| object.get("_id"))
        .and_then(scalar_id_text)?;
    Some(format!("{typename}:{id}"))
}

fn scalar_id_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
