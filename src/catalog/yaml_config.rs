use serde_yaml::Value;

pub(super) fn colorspace_names(raw: &str) -> Result<Vec<String>, String> {
    let root = serde_yaml::from_str::<Value>(raw).map_err(|e| e.to_string())?;
    let root = untag(&root);
    let Some(mapping) = root.as_mapping() else {
        return Err(String::from("config root must be a mapping"));
    };

    let Some(entries) = mapping.get("colorspaces").map(untag) else {
        return Ok(Vec::new());
    };
    if entries.is_null() {
        return Ok(Vec::new());
    }
    let entries = entries
        .as_sequence()
        .ok_or_else(|| String::from("'colorspaces' must be a sequence"))?;

    Ok(entries
        .iter()
        .filter_map(|entry| untag(entry).get("name"))
        .filter_map(name_as_string)
        .collect())
}

// OCIO entries carry tags such as `!<ColorSpace>`.
fn untag(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untag(&tagged.value),
        other => other,
    }
}

fn name_as_string(value: &Value) -> Option<String> {
    let name = match untag(value) {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!name.is_empty()).then_some(name)
}
