//! Projection of a decoded [`LabelNode`] tree onto the dynamic
//! configuration schema.
//!
//! Named collections (`routers.<name>`, `middlewares.<name>`,
//! `services.<name>`) become arrays of objects carrying a `name` field, in
//! name order. Comma-separated list labels become arrays, numeric and
//! boolean fields are parsed, and middleware `options` are projected
//! generically (indexed children become arrays). Unknown labels are
//! rejected rather than ignored.

use serde_json::{Map, Value};

use super::LabelNode;
use crate::error::DecodeError;

pub fn project(root: &LabelNode) -> Result<Value, DecodeError> {
    let path = root.name.as_str();
    if root.value.is_some() {
        return Err(invalid(path, "expected nested labels"));
    }

    let mut routers = Vec::new();
    let mut middlewares = Vec::new();
    let mut services = Vec::new();

    for (section, node) in &root.children {
        let section_path = child_path(path, section);
        match section.as_str() {
            "routers" => routers = project_named(node, &section_path, project_router)?,
            "middlewares" => {
                middlewares = project_named(node, &section_path, project_middleware)?;
            }
            "services" => services = project_named(node, &section_path, project_service)?,
            _ => return Err(DecodeError::UnknownField { path: section_path }),
        }
    }

    let mut out = Map::new();
    out.insert("routers".into(), Value::Array(routers));
    out.insert("middlewares".into(), Value::Array(middlewares));
    out.insert("services".into(), Value::Array(services));
    Ok(Value::Object(out))
}

fn project_named(
    node: &LabelNode,
    path: &str,
    project_entry: fn(&LabelNode, &str) -> Result<Map<String, Value>, DecodeError>,
) -> Result<Vec<Value>, DecodeError> {
    if node.value.is_some() {
        return Err(invalid(path, "expected named entries"));
    }
    node.children
        .iter()
        .map(|(name, entry)| {
            let entry_path = child_path(path, name);
            if name.starts_with('[') {
                return Err(invalid(&entry_path, "expected a name, not an index"));
            }
            if entry.value.is_some() {
                return Err(invalid(&entry_path, "expected nested labels"));
            }
            let mut object = Map::new();
            object.insert("name".into(), Value::String(name.clone()));
            object.extend(project_entry(entry, &entry_path)?);
            Ok(Value::Object(object))
        })
        .collect()
}

fn project_router(node: &LabelNode, path: &str) -> Result<Map<String, Value>, DecodeError> {
    let mut out = Map::new();
    for (field, child) in &node.children {
        let field_path = child_path(path, field);
        let value = leaf(child, &field_path)?;
        let projected = match field.as_str() {
            "rule" | "service" => Value::String(value.to_string()),
            "entrypoints" | "middlewares" => comma_list(value),
            "priority" => value
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| invalid(&field_path, "expected an integer"))?,
            _ => return Err(DecodeError::UnknownField { path: field_path }),
        };
        out.insert(field.clone(), projected);
    }
    Ok(out)
}

fn project_middleware(node: &LabelNode, path: &str) -> Result<Map<String, Value>, DecodeError> {
    let mut out = Map::new();
    for (field, child) in &node.children {
        let field_path = child_path(path, field);
        match field.as_str() {
            "type" => {
                out.insert("type".into(), Value::String(leaf(child, &field_path)?.to_string()));
            }
            "options" => {
                if child.value.is_some() {
                    return Err(invalid(&field_path, "expected nested labels"));
                }
                out.insert("options".into(), project_generic(child, &field_path)?);
            }
            _ => return Err(DecodeError::UnknownField { path: field_path }),
        }
    }
    Ok(out)
}

fn project_service(node: &LabelNode, path: &str) -> Result<Map<String, Value>, DecodeError> {
    let mut out = Map::new();
    for (field, child) in &node.children {
        let field_path = child_path(path, field);
        let projected = match field.as_str() {
            "servers" => Value::Array(
                indexed(child, &field_path)?
                    .into_iter()
                    .map(|(server_path, server)| project_server(server, &server_path))
                    .collect::<Result<_, _>>()?,
            ),
            "verbose" => parse_bool(leaf(child, &field_path)?, &field_path)?,
            "loadBalancer" => Value::String(leaf(child, &field_path)?.to_string()),
            _ => return Err(DecodeError::UnknownField { path: field_path }),
        };
        out.insert(field.clone(), projected);
    }
    Ok(out)
}

fn project_server(node: &LabelNode, path: &str) -> Result<Value, DecodeError> {
    if node.value.is_some() {
        return Err(invalid(path, "expected nested labels"));
    }
    let mut out = Map::new();
    for (field, child) in &node.children {
        let field_path = child_path(path, field);
        let value = leaf(child, &field_path)?;
        let projected = match field.as_str() {
            "host" | "protocol" | "tlsOptions" => Value::String(value.to_string()),
            "port" => value
                .trim()
                .parse::<u16>()
                .map(Value::from)
                .map_err(|_| invalid(&field_path, "expected a port number"))?,
            _ => return Err(DecodeError::UnknownField { path: field_path }),
        };
        out.insert(field.clone(), projected);
    }
    Ok(Value::Object(out))
}

/// Leaves become strings; all-indexed children become arrays; anything
/// else becomes an object.
fn project_generic(node: &LabelNode, path: &str) -> Result<Value, DecodeError> {
    if let Some(ref value) = node.value {
        return Ok(Value::String(value.clone()));
    }

    let index_count = node.children.keys().filter(|k| k.starts_with('[')).count();
    if index_count > 0 && index_count == node.children.len() {
        return indexed(node, path)?
            .into_iter()
            .map(|(item_path, item)| project_generic(item, &item_path))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array);
    }
    if index_count > 0 {
        return Err(invalid(path, "cannot mix indexed and named labels"));
    }

    let mut out = Map::new();
    for (name, child) in &node.children {
        out.insert(name.clone(), project_generic(child, &child_path(path, name))?);
    }
    Ok(Value::Object(out))
}

/// Children of an indexed list, ordered by numeric index.
fn indexed<'a>(node: &'a LabelNode, path: &str) -> Result<Vec<(String, &'a LabelNode)>, DecodeError> {
    if node.value.is_some() {
        return Err(invalid(path, "expected indexed labels like [0]"));
    }
    let mut items = node
        .children
        .iter()
        .map(|(name, child)| {
            name.strip_prefix('[')
                .and_then(|n| n.strip_suffix(']'))
                .and_then(|n| n.parse::<usize>().ok())
                .map(|index| (index, child_path(path, name), child))
                .ok_or_else(|| invalid(path, "expected indexed labels like [0]"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    items.sort_by_key(|(index, _, _)| *index);
    let indices: Vec<usize> = items.iter().map(|(index, _, _)| *index).collect();
    if let Some(missing) = first_gap(&indices) {
        tracing::warn!(
            path,
            missing,
            count = indices.len(),
            "indexed labels are not contiguous, entries are renumbered in order"
        );
    }
    Ok(items.into_iter().map(|(_, p, child)| (p, child)).collect())
}

/// First index absent from sorted `indices` when they do not run 0..len.
fn first_gap(indices: &[usize]) -> Option<usize> {
    indices
        .iter()
        .enumerate()
        .find(|(position, index)| position != *index)
        .map(|(position, _)| position)
}

fn leaf<'a>(node: &'a LabelNode, path: &str) -> Result<&'a str, DecodeError> {
    match node.value {
        Some(ref value) if node.children.is_empty() => Ok(value),
        _ => Err(invalid(path, "expected a value")),
    }
}

fn comma_list(value: &str) -> Value {
    Value::Array(
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    )
}

fn parse_bool(value: &str, path: &str) -> Result<Value, DecodeError> {
    match value.trim() {
        "true" => Ok(Value::Bool(true)),
        "false" => Ok(Value::Bool(false)),
        _ => Err(invalid(path, "expected true or false")),
    }
}

fn child_path(path: &str, name: &str) -> String {
    if name.starts_with('[') {
        format!("{path}{name}")
    } else {
        format!("{path}.{name}")
    }
}

fn invalid(path: &str, message: &str) -> DecodeError {
    DecodeError::InvalidValue {
        path: path.to_string(),
        message: message.to_string(),
    }
}
