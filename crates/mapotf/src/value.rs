//! type model for values handed to the DSL
//!
//! Values are plain [hcl::Value]s. Since those carry no static type, this module infers one when several values
//! have to look alike, which is the case for sibling nested blocks exposed as one list.
//!
//! The type model knows
//! - `dynamic` (unknown, compatible with everything, the type of `null`)
//! - `bool`, `number`, `string`
//! - `list(T)`, `set(T)`, `map(T)`
//! - `tuple([T, ...])`
//! - `object({ name = T, ... })` where every attribute may be optional
//!
//! The same model renders the attribute types of provider schemas (see [Type::from_cty_json]).
use hcl::value::Map;
use hcl::Value;
use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Dynamic,
    Bool,
    Number,
    String,
    List(Box<Type>),
    Set(Box<Type>),
    Map(Box<Type>),
    Tuple(Vec<Type>),
    Object(IndexMap<String, Field>),
}

/// Attribute of an object type
#[derive(Debug, Clone, PartialEq, derive_new::new)]
pub struct Field {
    pub ty: Type,
    pub optional: bool,
}

impl Type {
    /// Infers the type of a value
    ///
    /// Arrays are lists whose element type is the unification of all elements.
    pub fn of(value: &Value) -> Type {
        match value {
            Value::Null => Type::Dynamic,
            Value::Bool(_) => Type::Bool,
            Value::Number(_) => Type::Number,
            Value::String(_) => Type::String,
            Value::Array(elements) => {
                let element = elements
                    .iter()
                    .map(Type::of)
                    .reduce(|unified, next| unified.unify(&next))
                    .unwrap_or(Type::Dynamic);
                Type::List(Box::new(element))
            }
            Value::Object(object) => Type::Object(
                object
                    .iter()
                    .map(|(key, value)| (key.clone(), Field::new(Type::of(value), false)))
                    .collect(),
            ),
        }
    }

    /// Merges two types into one that can hold values of both
    ///
    /// - `dynamic` yields to the other side
    /// - objects take the union of their attributes, attributes missing on one side become optional
    /// - collections of the same kind unify their element types
    /// - every other conflict keeps `self`
    pub fn unify(&self, other: &Type) -> Type {
        match (self, other) {
            (Type::Dynamic, other) => other.clone(),
            (this, Type::Dynamic) => this.clone(),
            (Type::Object(left), Type::Object(right)) => {
                let mut fields = IndexMap::new();
                for (name, field) in left {
                    let merged = match right.get(name) {
                        Some(other) => Field::new(
                            field.ty.unify(&other.ty),
                            field.optional || other.optional,
                        ),
                        None => Field::new(field.ty.clone(), true),
                    };
                    fields.insert(name.clone(), merged);
                }
                for (name, field) in right {
                    if !fields.contains_key(name) {
                        fields.insert(name.clone(), Field::new(field.ty.clone(), true));
                    }
                }
                Type::Object(fields)
            }
            (Type::List(left), Type::List(right)) => Type::List(Box::new(left.unify(right))),
            (Type::Set(left), Type::Set(right)) => Type::Set(Box::new(left.unify(right))),
            (Type::Map(left), Type::Map(right)) => Type::Map(Box::new(left.unify(right))),
            (this, _) => this.clone(),
        }
    }

    /// Converts `value` so that it conforms to this type
    ///
    /// Optional object attributes that are missing become `null`. Primitive values convert between `string`,
    /// `number` and `bool` where the text allows it. Values that cannot be converted are returned unchanged.
    pub fn convert(&self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Type::Dynamic, value) => value,
            (Type::String, Value::Number(number)) => Value::String(number.to_string()),
            (Type::String, Value::Bool(boolean)) => Value::String(boolean.to_string()),
            (Type::Number, Value::String(text)) => match text.parse::<i64>() {
                Ok(int) => Value::from(int),
                Err(_) => match text.parse::<f64>().ok().and_then(hcl::Number::from_f64) {
                    Some(number) => Value::Number(number),
                    None => Value::String(text),
                },
            },
            (Type::Bool, Value::String(text)) => match text.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::String(text),
            },
            (Type::List(element) | Type::Set(element), Value::Array(values)) => {
                Value::Array(values.into_iter().map(|v| element.convert(v)).collect())
            }
            (Type::Tuple(elements), Value::Array(values)) => Value::Array(
                values
                    .into_iter()
                    .enumerate()
                    .map(|(index, v)| match elements.get(index) {
                        Some(ty) => ty.convert(v),
                        None => v,
                    })
                    .collect(),
            ),
            (Type::Map(element), Value::Object(object)) => Value::Object(
                object
                    .into_iter()
                    .map(|(k, v)| (k, element.convert(v)))
                    .collect(),
            ),
            (Type::Object(fields), Value::Object(mut object)) => {
                let mut converted = Map::new();
                for (name, field) in fields {
                    let value = object.shift_remove(name).unwrap_or(Value::Null);
                    converted.insert(name.clone(), field.ty.convert(value));
                }
                // attributes unknown to the type are kept as they are
                converted.extend(object);
                Value::Object(converted)
            }
            (_, value) => value,
        }
    }

    /// Parses a type in the JSON encoding used by `terraform providers schema -json`
    ///
    /// `"string"`, `["list", "string"]`, `["object", {"name": "string"}, ["name"]]`, ...
    pub fn from_cty_json(json: &serde_json::Value) -> Option<Type> {
        use serde_json::Value as Json;

        match json {
            Json::String(primitive) => match primitive.as_str() {
                "string" => Some(Type::String),
                "number" => Some(Type::Number),
                "bool" => Some(Type::Bool),
                "dynamic" => Some(Type::Dynamic),
                _ => None,
            },
            Json::Array(parts) => {
                let kind = parts.first()?.as_str()?;
                let argument = parts.get(1)?;
                match kind {
                    "list" => Some(Type::List(Box::new(Type::from_cty_json(argument)?))),
                    "set" => Some(Type::Set(Box::new(Type::from_cty_json(argument)?))),
                    "map" => Some(Type::Map(Box::new(Type::from_cty_json(argument)?))),
                    "tuple" => argument
                        .as_array()?
                        .iter()
                        .map(Type::from_cty_json)
                        .collect::<Option<Vec<_>>>()
                        .map(Type::Tuple),
                    "object" => {
                        let optional: Vec<&str> = parts
                            .get(2)
                            .and_then(Json::as_array)
                            .map(|names| names.iter().filter_map(Json::as_str).collect())
                            .unwrap_or_default();
                        let mut fields = IndexMap::new();
                        for (name, ty) in argument.as_object()? {
                            fields.insert(
                                name.clone(),
                                Field::new(
                                    Type::from_cty_json(ty)?,
                                    optional.contains(&name.as_str()),
                                ),
                            );
                        }
                        Some(Type::Object(fields))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Dynamic => f.write_str("any"),
            Type::Bool => f.write_str("bool"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::List(element) => write!(f, "list({element})"),
            Type::Set(element) => write!(f, "set({element})"),
            Type::Map(element) => write!(f, "map({element})"),
            Type::Tuple(elements) => {
                f.write_str("tuple([")?;
                for (index, element) in elements.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{element}")?;
                }
                f.write_str("])")
            }
            Type::Object(fields) => {
                f.write_str("object({")?;
                for (index, (name, field)) in fields.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    if field.optional {
                        write!(f, "{name} = optional({})", field.ty)?;
                    } else {
                        write!(f, "{name} = {}", field.ty)?;
                    }
                }
                f.write_str("})")
            }
        }
    }
}

/// Turns sibling object values into one homogeneous list
///
/// All elements are converted to the unification of their types, so every element exposes the same attributes.
pub fn list_of_object(values: Vec<Value>) -> Value {
    let unified = values
        .iter()
        .map(Type::of)
        .reduce(|unified, next| unified.unify(&next))
        .unwrap_or(Type::Dynamic);

    Value::Array(values.into_iter().map(|v| unified.convert(v)).collect())
}

/// Renders a value as the text of an HCL expression
///
/// Strings are returned as they are, which is what turns `tags = "merge(...)"` into a raw expression.
pub fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(boolean) => boolean.to_string(),
        Value::Null => "null".to_string(),
        other => hcl::Expression::from(other.clone()).to_string(),
    }
}

/// Attribute lookup for assertions, panics unless `self` is an object holding `key`
#[cfg(test)]
pub(crate) trait At {
    fn at(&self, key: &str) -> Value;
}

#[cfg(test)]
impl At for Value {
    fn at(&self, key: &str) -> Value {
        self.as_object()
            .and_then(|object| object.get(key))
            .cloned()
            .unwrap_or_else(|| panic!("no `{key}` in {self:?}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn object(entries: &[(&str, Value)]) -> Value {
        Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn union_of_attributes_widens_to_optional() {
        let one = object(&[("name", Value::from("a")), ("size", Value::from("1"))]);
        let two = object(&[("name", Value::from("b")), ("zone", Value::from("2"))]);

        let ty = Type::of(&one).unify(&Type::of(&two));

        assert_eq!(
            ty.to_string(),
            "object({name = string, size = optional(string), zone = optional(string)})"
        );
    }

    #[test]
    fn list_of_object_fills_missing_attributes() {
        let list = list_of_object(vec![
            object(&[("name", Value::from("a"))]),
            object(&[("zone", Value::from("2"))]),
        ]);

        assert_eq!(
            list,
            Value::Array(vec![
                object(&[("name", Value::from("a")), ("zone", Value::Null)]),
                object(&[("name", Value::Null), ("zone", Value::from("2"))]),
            ])
        );
    }

    #[test]
    fn nested_lists_of_objects_merge_recursively() {
        let one = object(&[(
            "top_block",
            Value::Array(vec![object(&[(
                "second_block",
                Value::Array(vec![object(&[("id", Value::from("1"))])]),
            )])]),
        )]);
        let two = object(&[(
            "top_block",
            Value::Array(vec![object(&[(
                "third_block",
                Value::Array(vec![object(&[("name", Value::from("x"))])]),
            )])]),
        )]);

        let list = list_of_object(vec![one, two]);
        let Value::Array(elements) = list else {
            panic!("must be a list")
        };

        let first_top = &elements[0].as_object().unwrap()["top_block"];
        let first_top = first_top.as_array().unwrap()[0].as_object().unwrap();
        assert_eq!(
            first_top["second_block"],
            Value::Array(vec![object(&[("id", Value::from("1"))])])
        );
        assert_eq!(first_top["third_block"], Value::Null);

        let second_top = &elements[1].as_object().unwrap()["top_block"];
        let second_top = second_top.as_array().unwrap()[0].as_object().unwrap();
        assert_eq!(second_top["second_block"], Value::Null);
        assert_eq!(
            second_top["third_block"],
            Value::Array(vec![object(&[("name", Value::from("x"))])])
        );
    }

    #[test]
    fn primitive_conflict_keeps_first_type() {
        let ty = Type::String.unify(&Type::Number);
        assert_eq!(ty, Type::String);
        assert_eq!(ty.convert(Value::from(42)), Value::from("42"));
    }

    #[test]
    fn list_conflicting_with_scalar_keeps_value() {
        let ty = Type::List(Box::new(Type::String)).unify(&Type::String);
        assert_eq!(ty, Type::List(Box::new(Type::String)));
        assert_eq!(ty.convert(Value::from("x")), Value::from("x"));
    }

    #[test]
    fn cty_json_types() {
        let json: serde_json::Value = serde_json::from_str(
            r#"["object", {"name": "string", "tags": ["map", "string"]}, ["tags"]]"#,
        )
        .unwrap();

        assert_eq!(
            Type::from_cty_json(&json).unwrap().to_string(),
            "object({name = string, tags = optional(map(string))})"
        );
        assert_eq!(
            Type::from_cty_json(&serde_json::json!(["list", ["set", "number"]]))
                .unwrap()
                .to_string(),
            "list(set(number))"
        );
        assert!(Type::from_cty_json(&serde_json::json!("unknown")).is_none());
    }

    #[test]
    fn coerce_to_string_keeps_strings_raw() {
        assert_eq!(coerce_to_string(&Value::from("merge(a, b)")), "merge(a, b)");
        assert_eq!(coerce_to_string(&Value::from(3)), "3");
        assert_eq!(coerce_to_string(&Value::from(true)), "true");
    }
}
