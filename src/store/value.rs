use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::{FieldUpdate, Filter, Op, Update};

pub fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, key| current.get(key))
}

fn object_mut(v: &mut Value) -> &mut Map<String, Value> {
    if !v.is_object() {
        *v = Value::Object(Map::new());
    }
    match v {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };
    let mut current = doc;
    for key in parents.into_iter().flat_map(|p| p.split('.')) {
        current = object_mut(current)
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    object_mut(current).insert(leaf.to_string(), value);
}

fn remove_path(doc: &mut Value, path: &str) {
    let (parent, leaf) = match path.rsplit_once('.') {
        Some((parent, leaf)) => (get_path_mut(doc, parent), leaf),
        None => (Some(doc), path),
    };
    if let Some(Value::Object(map)) = parent {
        map.remove(leaf);
    }
}

fn get_path_mut<'a>(doc: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    path.split('.')
        .try_fold(doc, |current, key| current.get_mut(key))
}

/// Ordering between two values of the same JSON type; `None` across types.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => (a == b).then_some(Ordering::Equal),
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order used for sorting; missing fields sort first.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare(a, b).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
    }
}

fn matches_filter(doc: &Value, filter: &Filter) -> bool {
    let Some(actual) = get_path(doc, &filter.field) else {
        return false;
    };
    match filter.op {
        Op::Eq => actual == &filter.value,
        Op::Ne => actual != &filter.value,
        Op::ArrayContains => actual
            .as_array()
            .is_some_and(|items| items.contains(&filter.value)),
        op => match compare(actual, &filter.value) {
            Some(ord) => match op {
                Op::Lt => ord == Ordering::Less,
                Op::Le => ord != Ordering::Greater,
                Op::Gt => ord == Ordering::Greater,
                Op::Ge => ord != Ordering::Less,
                _ => false,
            },
            None => false,
        },
    }
}

pub fn matches(doc: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches_filter(doc, f))
}

pub fn apply(doc: &mut Value, update: &Update) {
    for (field, change) in &update.fields {
        match change {
            FieldUpdate::Set(value) => set_path(doc, field, value.clone()),
            FieldUpdate::Increment(by) => {
                let current = get_path(doc, field).and_then(Value::as_i64).unwrap_or(0);
                set_path(doc, field, Value::from(current + by));
            }
            FieldUpdate::ArrayUnion(values) => {
                let mut items = existing_array(doc, field);
                for v in values {
                    if !items.contains(v) {
                        items.push(v.clone());
                    }
                }
                set_path(doc, field, Value::Array(items));
            }
            FieldUpdate::ArrayRemove(values) => {
                let mut items = existing_array(doc, field);
                items.retain(|item| !values.contains(item));
                set_path(doc, field, Value::Array(items));
            }
            FieldUpdate::Delete => remove_path(doc, field),
        }
    }
}

fn existing_array(doc: &Value, field: &str) -> Vec<Value> {
    get_path(doc, field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn dotted_paths_read_nested_fields() {
        let doc = json!({ "settings": { "allowChildrenToPost": true } });
        assert_eq!(
            get_path(&doc, "settings.allowChildrenToPost"),
            Some(&json!(true))
        );
        assert_eq!(get_path(&doc, "settings.missing"), None);
    }

    #[test]
    fn missing_field_never_matches() {
        let doc = json!({ "a": 1 });
        assert!(!matches(&doc, &[Filter::new("b", Op::Ne, 5)]));
        assert!(matches(&doc, &[Filter::new("a", Op::Ne, 5)]));
    }

    #[test]
    fn range_filters_compare_numbers() {
        let doc = json!({ "expiresAt": 1_700_000_000_000_i64 });
        assert!(matches(&doc, &[Filter::new("expiresAt", Op::Gt, 1_600_000_000_000_i64)]));
        assert!(!matches(&doc, &[Filter::new("expiresAt", Op::Lt, 1_600_000_000_000_i64)]));
        assert!(matches(&doc, &[Filter::new("expiresAt", Op::Le, 1_700_000_000_000_i64)]));
        // Different types are incomparable.
        assert!(!matches(&doc, &[Filter::new("expiresAt", Op::Gt, "0")]));
    }

    #[test]
    fn array_contains() {
        let doc = json!({ "adminIds": ["a", "b"] });
        assert!(matches(&doc, &[Filter::new("adminIds", Op::ArrayContains, "b")]));
        assert!(!matches(&doc, &[Filter::new("adminIds", Op::ArrayContains, "c")]));
    }

    #[test]
    fn apply_field_transforms() {
        let mut doc = json!({
            "usedCount": 1,
            "usedBy": ["u1"],
            "settings": { "allowChildrenToPost": true, "allowChildrenToComment": true },
        });
        let update = Update::new()
            .increment("usedCount", 1)
            .increment("memberCount", -1)
            .array_union("usedBy", "u2")
            .array_union("usedBy", "u1")
            .array_remove("adminIds", "x")
            .set("settings.allowChildrenToPost", false)
            .delete_field("settings.allowChildrenToComment");
        apply(&mut doc, &update);

        assert_eq!(doc["usedCount"], json!(2));
        assert_eq!(doc["memberCount"], json!(-1));
        assert_eq!(doc["usedBy"], json!(["u1", "u2"]));
        assert_eq!(doc["adminIds"], json!([]));
        assert_eq!(
            doc["settings"],
            json!({ "allowChildrenToPost": false })
        );
    }

    #[test]
    fn sort_order_puts_missing_first() {
        let a = json!(3);
        assert_eq!(sort_order(None, Some(&a)), Ordering::Less);
        assert_eq!(sort_order(Some(&json!(1)), Some(&a)), Ordering::Less);
    }
}
