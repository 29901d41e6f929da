//! Reduce pre-joined related rows to the stable subsets stored in documents.
//!
//! Every helper takes the related row as an `Option` and returns JSON `null`
//! for an absent relation, so mappers can insert the result directly.

use serde_json::{json, Map, Value};

type Object = Map<String, Value>;

/// A column of a related row, `null` when absent.
pub fn field(obj: &Object, key: &str) -> Value {
    obj.get(key).cloned().unwrap_or(Value::Null)
}

/// A string column, empty when absent or null.
fn text_or_empty(obj: &Object, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// A primary key rendered as a string.
fn id_string(obj: &Object) -> Value {
    match obj.get("id") {
        Some(Value::String(id)) => Value::String(id.clone()),
        Some(Value::Null) | None => Value::Null,
        Some(other) => Value::String(other.to_string()),
    }
}

fn related<'a>(obj: &'a Object, key: &str) -> Option<&'a Object> {
    obj.get(key).and_then(Value::as_object)
}

fn related_list<'a>(obj: &'a Object, key: &str) -> impl Iterator<Item = &'a Object> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

pub fn id_name_dict(obj: Option<&Object>) -> Value {
    obj.map_or(Value::Null, |obj| {
        json!({"id": id_string(obj), "name": field(obj, "name")})
    })
}

pub fn id_name_list_of_dicts<'a>(items: impl IntoIterator<Item = &'a Object>) -> Value {
    list_of_dicts(items, id_name_dict)
}

pub fn id_type_dict(obj: Option<&Object>) -> Value {
    obj.map_or(Value::Null, |obj| {
        json!({"id": id_string(obj), "type": field(obj, "type")})
    })
}

pub fn id_uri_dict(obj: Option<&Object>) -> Value {
    obj.map_or(Value::Null, |obj| {
        json!({"id": id_string(obj), "uri": field(obj, "uri")})
    })
}

/// The address columns `<prefix>_1`, `<prefix>_2`, `<prefix>_town`,
/// `<prefix>_county`, `<prefix>_postcode`, `<prefix>_area` and
/// `<prefix>_country` of a row as one object.
///
/// Missing text columns become empty strings. Returns `null` when every part
/// of the address is empty.
pub fn address_dict(obj: Option<&Object>, prefix: &str) -> Value {
    let Some(obj) = obj else {
        return Value::Null;
    };

    let mut address = Map::new();
    for (target, suffix) in [
        ("line_1", "1"),
        ("line_2", "2"),
        ("town", "town"),
        ("county", "county"),
        ("postcode", "postcode"),
    ] {
        let value = text_or_empty(obj, &format!("{}_{}", prefix, suffix));
        address.insert(target.to_string(), Value::String(value));
    }
    address.insert(
        "area".to_string(),
        id_name_dict(related(obj, &format!("{}_area", prefix))),
    );
    address.insert(
        "country".to_string(),
        id_name_dict(related(obj, &format!("{}_country", prefix))),
    );

    let any_set = address.values().any(|value| match value {
        Value::String(s) => !s.is_empty(),
        Value::Null => false,
        _ => true,
    });
    if any_set {
        Value::Object(address)
    } else {
        Value::Null
    }
}

pub fn company_dict(obj: Option<&Object>) -> Value {
    obj.map_or(Value::Null, |obj| {
        json!({
            "id": id_string(obj),
            "name": field(obj, "name"),
            "trading_names": obj
                .get("trading_names")
                .filter(|names| names.is_array())
                .cloned()
                .unwrap_or_else(|| json!([])),
        })
    })
}

/// First name, last name and full name of a person.
///
/// The full name is the `name` column when the row has one, otherwise the
/// non-empty name parts joined by a space. With `include_dit_team`, the
/// person's team is added (an empty object when they have none).
pub fn contact_or_adviser_dict(obj: Option<&Object>, include_dit_team: bool) -> Value {
    let Some(obj) = obj else {
        return Value::Null;
    };

    let mut data = Map::new();
    data.insert("id".to_string(), id_string(obj));
    data.insert("first_name".to_string(), field(obj, "first_name"));
    data.insert("last_name".to_string(), field(obj, "last_name"));
    data.insert("name".to_string(), Value::String(full_name(obj)));

    if include_dit_team {
        let team = match related(obj, "dit_team") {
            Some(team) => id_name_dict(Some(team)),
            None => json!({}),
        };
        data.insert("dit_team".to_string(), team);
    }
    Value::Object(data)
}

/// Display name of a person row.
pub fn full_name(obj: &Object) -> String {
    if let Some(name) = obj.get("name").and_then(Value::as_str) {
        return name.to_string();
    }
    ["first_name", "last_name"]
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn contact_or_adviser_list_of_dicts<'a>(items: impl IntoIterator<Item = &'a Object>) -> Value {
    list_of_dicts(items, |obj| contact_or_adviser_dict(obj, false))
}

pub fn adviser_dict_with_team(obj: Option<&Object>) -> Value {
    contact_or_adviser_dict(obj, true)
}

/// Apply `dict_func` to `<relation>.<field>` of a row, where both parts of
/// `path` name pre-joined related rows.
///
/// Returns `null` if either step is absent or `path` has no dot.
pub fn computed_nested_dict(obj: &Object, path: &str, dict_func: fn(Option<&Object>) -> Value) -> Value {
    let Some((relation, nested)) = path.split_once('.') else {
        return Value::Null;
    };
    match related(obj, relation).and_then(|relation| related(relation, nested)) {
        Some(nested) => dict_func(Some(nested)),
        None => Value::Null,
    }
}

pub fn computed_nested_id_name_dict(obj: &Object, path: &str) -> Value {
    computed_nested_dict(obj, path, id_name_dict)
}

pub fn computed_nested_sector_dict(obj: &Object, path: &str) -> Value {
    computed_nested_dict(obj, path, sector_dict)
}

pub fn ch_company_dict(obj: Option<&Object>) -> Value {
    obj.map_or(Value::Null, |obj| {
        json!({"id": id_string(obj), "company_number": field(obj, "company_number")})
    })
}

pub fn investment_project_dict(obj: Option<&Object>) -> Value {
    obj.map_or(Value::Null, |obj| {
        json!({
            "id": id_string(obj),
            "name": field(obj, "name"),
            "project_code": field(obj, "project_code"),
        })
    })
}

/// A sector with the ids of its ancestors, root first.
pub fn sector_dict(obj: Option<&Object>) -> Value {
    obj.map_or(Value::Null, |obj| {
        let ancestors: Vec<Value> = related_list(obj, "ancestors")
            .map(|ancestor| json!({"id": id_string(ancestor)}))
            .collect();
        json!({
            "id": id_string(obj),
            "name": field(obj, "name"),
            "ancestors": ancestors,
        })
    })
}

pub fn interaction_dict(obj: Option<&Object>) -> Value {
    obj.map_or(Value::Null, |obj| {
        json!({
            "id": id_string(obj),
            "date": field(obj, "date"),
            "subject": field(obj, "subject"),
        })
    })
}

fn list_of_dicts<'a>(
    items: impl IntoIterator<Item = &'a Object>,
    dict_factory: impl Fn(Option<&Object>) -> Value,
) -> Value {
    Value::Array(items.into_iter().map(|obj| dict_factory(Some(obj))).collect())
}
