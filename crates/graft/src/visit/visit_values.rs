use super::Visit;
use crate::cursor::Cursor;
use crate::value::Value;

/// Recursively visit all nodes of a value tree, parents before children
///
/// Map entries are visited in key order so visitors observe a deterministic
/// sequence regardless of insertion order.
pub trait VisitValues {
    fn visit_values(&self, visitor: &mut dyn Visit<Value>);
}

impl VisitValues for Value {
    fn visit_values(&self, visitor: &mut dyn Visit<Value>) {
        walk(self, &mut Cursor::new(), visitor);
    }
}

fn walk(value: &Value, cursor: &mut Cursor, visitor: &mut dyn Visit<Value>) {
    visitor.visit(cursor, value);

    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                cursor.push(key.as_str());
                walk(&map[key], cursor, visitor);
                cursor.pop();
            }
        }
        Value::Array(list) => {
            for (index, element) in list.iter().enumerate() {
                cursor.push(index.to_string());
                walk(element, cursor, visitor);
                cursor.pop();
            }
        }
        _ => {}
    }
}
