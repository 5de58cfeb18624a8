//! Builtin functions available to DSL expressions
//!
//! A subset of the Terraform function library. `try` and `can` are declared here as well but only act as a
//! fallback, they are normally resolved lazily before evaluation (see [crate::eval]).
use hcl::eval::{Context, FuncArgs, FuncDef, ParamType};
use hcl::value::Map;
use hcl::{Number, Value};

type Func = fn(FuncArgs) -> Result<Value, String>;

/// Declares all builtin functions in `context`
pub fn declare_builtins(context: &mut Context) {
    let fixed: &[(&str, usize, Func)] = &[
        ("keys", 1, keys),
        ("values", 1, values),
        ("length", 1, length),
        ("contains", 2, contains),
        ("flatten", 1, flatten),
        ("distinct", 1, distinct),
        ("compact", 1, compact),
        ("split", 2, split),
        ("replace", 3, replace),
        ("lower", 1, lower),
        ("upper", 1, upper),
        ("trimspace", 1, trimspace),
        ("startswith", 2, startswith),
        ("endswith", 2, endswith),
        ("tostring", 1, tostring),
        ("tonumber", 1, tonumber),
        ("tobool", 1, tobool),
        ("tolist", 1, tolist),
        ("toset", 1, toset),
        ("tomap", 1, tomap),
        ("jsonencode", 1, jsonencode),
        ("jsondecode", 1, jsondecode),
        ("regexall", 2, regexall),
        ("can", 1, can),
    ];

    // name, fixed params, variadic
    let variadic: &[(&str, usize, Func)] = &[
        ("merge", 0, merge),
        ("concat", 0, concat),
        ("coalesce", 0, coalesce),
        ("join", 1, join),
        ("format", 1, format),
        ("lookup", 2, lookup),
        ("try", 0, try_),
    ];

    for (name, params, func) in fixed {
        let builder = (0..*params).fold(FuncDef::builder(), |builder, _| builder.param(ParamType::Any));
        context.declare_func(*name, builder.build(*func));
    }

    for (name, params, func) in variadic {
        let builder = (0..*params).fold(FuncDef::builder(), |builder, _| builder.param(ParamType::Any));
        context.declare_func(*name, builder.variadic_param(ParamType::Any).build(*func));
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn expect_string<'a>(value: &'a Value, function: &str) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{function}: expected string, got {}", type_name(value)))
}

fn expect_array<'a>(value: &'a Value, function: &str) -> Result<&'a Vec<Value>, String> {
    value
        .as_array()
        .ok_or_else(|| format!("{function}: expected list, got {}", type_name(value)))
}

fn expect_object<'a>(value: &'a Value, function: &str) -> Result<&'a Map<String, Value>, String> {
    value
        .as_object()
        .ok_or_else(|| format!("{function}: expected object, got {}", type_name(value)))
}

fn merge(args: FuncArgs) -> Result<Value, String> {
    let mut merged = Map::new();
    for arg in args.iter() {
        if arg.is_null() {
            continue;
        }
        for (key, value) in expect_object(arg, "merge")? {
            merged.insert(key.clone(), value.clone());
        }
    }
    Ok(Value::Object(merged))
}

fn keys(args: FuncArgs) -> Result<Value, String> {
    let object = expect_object(&args[0], "keys")?;
    Ok(Value::Array(object.keys().cloned().map(Value::String).collect()))
}

fn values(args: FuncArgs) -> Result<Value, String> {
    let object = expect_object(&args[0], "values")?;
    Ok(Value::Array(object.values().cloned().collect()))
}

fn length(args: FuncArgs) -> Result<Value, String> {
    let length = match &args[0] {
        Value::String(string) => string.chars().count(),
        Value::Array(array) => array.len(),
        Value::Object(object) => object.len(),
        other => return Err(format!("length: cannot take the length of {}", type_name(other))),
    };
    Ok(Value::from(length))
}

fn lookup(args: FuncArgs) -> Result<Value, String> {
    let object = expect_object(&args[0], "lookup")?;
    let key = expect_string(&args[1], "lookup")?;
    match (object.get(key), args.get(2)) {
        (Some(value), _) => Ok(value.clone()),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(format!("lookup: key `{key}` not found and no default given")),
    }
}

fn contains(args: FuncArgs) -> Result<Value, String> {
    let list = expect_array(&args[0], "contains")?;
    Ok(Value::Bool(list.contains(&args[1])))
}

fn concat(args: FuncArgs) -> Result<Value, String> {
    let mut concatenated = vec![];
    for arg in args.iter() {
        concatenated.extend(expect_array(arg, "concat")?.iter().cloned());
    }
    Ok(Value::Array(concatenated))
}

fn flatten_into(values: &[Value], flat: &mut Vec<Value>) {
    for value in values {
        match value {
            Value::Array(nested) => flatten_into(nested, flat),
            other => flat.push(other.clone()),
        }
    }
}

fn flatten(args: FuncArgs) -> Result<Value, String> {
    let mut flat = vec![];
    flatten_into(expect_array(&args[0], "flatten")?, &mut flat);
    Ok(Value::Array(flat))
}

fn distinct_values(values: &[Value]) -> Vec<Value> {
    let mut distinct: Vec<Value> = vec![];
    for value in values {
        if !distinct.contains(value) {
            distinct.push(value.clone());
        }
    }
    distinct
}

fn distinct(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::Array(distinct_values(expect_array(&args[0], "distinct")?)))
}

fn compact(args: FuncArgs) -> Result<Value, String> {
    let list = expect_array(&args[0], "compact")?;
    Ok(Value::Array(
        list.iter()
            .filter(|value| !value.is_null() && value.as_str() != Some(""))
            .cloned()
            .collect(),
    ))
}

fn join(args: FuncArgs) -> Result<Value, String> {
    let separator = expect_string(&args[0], "join")?;
    let mut parts = vec![];
    for list in args.iter().skip(1) {
        for value in expect_array(list, "join")? {
            parts.push(to_string_value(value).ok_or("join: elements must be primitive")?);
        }
    }
    Ok(Value::String(parts.join(separator)))
}

fn split(args: FuncArgs) -> Result<Value, String> {
    let separator = expect_string(&args[0], "split")?;
    let string = expect_string(&args[1], "split")?;
    Ok(Value::Array(
        string.split(separator).map(|part| Value::String(part.to_string())).collect(),
    ))
}

/// Substrings wrapped in slashes are regular expressions
fn replace(args: FuncArgs) -> Result<Value, String> {
    let string = expect_string(&args[0], "replace")?;
    let search = expect_string(&args[1], "replace")?;
    let replacement = expect_string(&args[2], "replace")?;

    if search.len() > 1 && search.starts_with('/') && search.ends_with('/') {
        let pattern = regex::Regex::new(&search[1..search.len() - 1]).map_err(|err| format!("replace: {err}"))?;
        return Ok(Value::String(pattern.replace_all(string, replacement).into_owned()));
    }

    Ok(Value::String(string.replace(search, replacement)))
}

/// `%s`, `%d`, `%v`, `%q` and `%%` verbs
fn format(args: FuncArgs) -> Result<Value, String> {
    let spec = expect_string(&args[0], "format")?;
    let mut values = args.iter().skip(1);
    let mut formatted = String::new();
    let mut chars = spec.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            formatted.push(c);
            continue;
        }

        let verb = chars.next().ok_or("format: dangling %")?;
        if verb == '%' {
            formatted.push('%');
            continue;
        }

        let value = values.next().ok_or("format: not enough arguments")?;
        match verb {
            's' | 'v' | 'd' => formatted.push_str(&to_string_value(value).unwrap_or_else(|| json(value))),
            'q' => formatted.push_str(&json(value)),
            other => return Err(format!("format: unsupported verb %{other}")),
        }
    }

    Ok(Value::String(formatted))
}

fn json(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

fn lower(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::String(expect_string(&args[0], "lower")?.to_lowercase()))
}

fn upper(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::String(expect_string(&args[0], "upper")?.to_uppercase()))
}

fn trimspace(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::String(expect_string(&args[0], "trimspace")?.trim().to_string()))
}

fn startswith(args: FuncArgs) -> Result<Value, String> {
    let string = expect_string(&args[0], "startswith")?;
    let prefix = expect_string(&args[1], "startswith")?;
    Ok(Value::Bool(string.starts_with(prefix)))
}

fn endswith(args: FuncArgs) -> Result<Value, String> {
    let string = expect_string(&args[0], "endswith")?;
    let suffix = expect_string(&args[1], "endswith")?;
    Ok(Value::Bool(string.ends_with(suffix)))
}

fn to_string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(string) => Some(string.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(bool) => Some(bool.to_string()),
        _ => None,
    }
}

fn tostring(args: FuncArgs) -> Result<Value, String> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        value => to_string_value(value)
            .map(Value::String)
            .ok_or_else(|| format!("tostring: cannot convert {} to string", type_name(value))),
    }
}

fn tonumber(args: FuncArgs) -> Result<Value, String> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Number(number) => Ok(Value::Number(number.clone())),
        Value::String(string) => parse_number(string).ok_or_else(|| format!("tonumber: `{string}` is not a number")),
        other => Err(format!("tonumber: cannot convert {} to number", type_name(other))),
    }
}

fn parse_number(string: &str) -> Option<Value> {
    let string = string.trim();
    if let Ok(integer) = string.parse::<i64>() {
        return Some(Value::from(integer));
    }
    string
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn tobool(args: FuncArgs) -> Result<Value, String> {
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Bool(bool) => Ok(Value::Bool(*bool)),
        Value::String(string) if string == "true" => Ok(Value::Bool(true)),
        Value::String(string) if string == "false" => Ok(Value::Bool(false)),
        other => Err(format!("tobool: cannot convert {} to bool", type_name(other))),
    }
}

fn tolist(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::Array(expect_array(&args[0], "tolist")?.clone()))
}

fn toset(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::Array(distinct_values(expect_array(&args[0], "toset")?)))
}

fn tomap(args: FuncArgs) -> Result<Value, String> {
    Ok(Value::Object(expect_object(&args[0], "tomap")?.clone()))
}

fn jsonencode(args: FuncArgs) -> Result<Value, String> {
    serde_json::to_string(&args[0])
        .map(Value::String)
        .map_err(|err| format!("jsonencode: {err}"))
}

fn jsondecode(args: FuncArgs) -> Result<Value, String> {
    let string = expect_string(&args[0], "jsondecode")?;
    serde_json::from_str(string).map_err(|err| format!("jsondecode: {err}"))
}

fn coalesce(args: FuncArgs) -> Result<Value, String> {
    args.iter()
        .find(|value| !value.is_null() && value.as_str() != Some(""))
        .cloned()
        .ok_or_else(|| "coalesce: no non-null arguments".to_string())
}

/// All matches, capture groups become lists (unnamed) or objects (named)
fn regexall(args: FuncArgs) -> Result<Value, String> {
    let pattern = expect_string(&args[0], "regexall")?;
    let string = expect_string(&args[1], "regexall")?;
    let regex = regex::Regex::new(pattern).map_err(|err| format!("regexall: {err}"))?;

    let named: Vec<&str> = regex.capture_names().flatten().collect();
    let group = |capture: Option<regex::Match>| {
        capture
            .map(|capture| Value::String(capture.as_str().to_string()))
            .unwrap_or(Value::Null)
    };

    let matches = regex
        .captures_iter(string)
        .map(|captures| {
            if regex.captures_len() == 1 {
                group(captures.get(0))
            } else if !named.is_empty() {
                Value::Object(
                    named
                        .iter()
                        .map(|name| (name.to_string(), group(captures.name(name))))
                        .collect(),
                )
            } else {
                Value::Array((1..captures.len()).map(|index| group(captures.get(index))).collect())
            }
        })
        .collect();

    Ok(Value::Array(matches))
}

/// Only reached when `try` could not be resolved lazily
fn try_(args: FuncArgs) -> Result<Value, String> {
    args.iter()
        .find(|value| !value.is_null())
        .cloned()
        .ok_or_else(|| "try: no argument could be evaluated".to_string())
}

/// Only reached when `can` could not be resolved lazily, the argument evaluated fine
fn can(_: FuncArgs) -> Result<Value, String> {
    Ok(Value::Bool(true))
}

#[cfg(test)]
mod test {
    use super::*;
    use hcl::eval::Evaluate;
    use pretty_assertions::assert_eq;

    fn eval(expression: &str) -> Value {
        let mut context = Context::new();
        declare_builtins(&mut context);
        let expression: hcl::Expression = hcl_edit::parser::parse_expr(expression).expect("valid expression").into();
        expression.evaluate(&context).expect("evaluates")
    }

    #[test]
    fn merge_objects() {
        assert_eq!(
            eval(r#"merge({ a = 1, b = 1 }, null, { b = 2 })"#),
            eval(r#"{ a = 1, b = 2 }"#)
        );
    }

    #[test]
    fn collections() {
        assert_eq!(eval(r#"keys({ a = 1, b = 2 })"#), eval(r#"["a", "b"]"#));
        assert_eq!(eval(r#"length([1, 2, 3])"#), Value::from(3));
        assert_eq!(eval(r#"length("abc")"#), Value::from(3));
        assert_eq!(eval(r#"concat([1], [2, 3])"#), eval("[1, 2, 3]"));
        assert_eq!(eval(r#"flatten([[1], [2, [3]]])"#), eval("[1, 2, 3]"));
        assert_eq!(eval(r#"distinct([1, 2, 1])"#), eval("[1, 2]"));
        assert_eq!(eval(r#"compact(["a", "", null])"#), eval(r#"["a"]"#));
        assert_eq!(eval(r#"contains(["a"], "a")"#), Value::Bool(true));
        assert_eq!(eval(r#"lookup({ a = 1 }, "b", 2)"#), Value::from(2));
    }

    #[test]
    fn strings() {
        assert_eq!(eval(r#"join("-", ["a", "b"])"#), Value::from("a-b"));
        assert_eq!(eval(r#"split(",", "a,b")"#), eval(r#"["a", "b"]"#));
        assert_eq!(eval(r#"replace("a-b", "-", "_")"#), Value::from("a_b"));
        assert_eq!(eval(r#"replace("a1b2", "/[0-9]/", "")"#), Value::from("ab"));
        assert_eq!(eval(r#"format("%s=%d%%", "a", 1)"#), Value::from("a=1%"));
        assert_eq!(eval(r#"upper(trimspace(" a "))"#), Value::from("A"));
        assert_eq!(eval(r#"startswith("azurerm_x", "azurerm_")"#), Value::Bool(true));
    }

    #[test]
    fn conversions() {
        assert_eq!(eval(r#"tostring(1)"#), Value::from("1"));
        assert_eq!(eval(r#"tonumber("2")"#), Value::from(2));
        assert_eq!(eval(r#"tobool("true")"#), Value::Bool(true));
        assert_eq!(eval(r#"toset(["a", "a"])"#), eval(r#"["a"]"#));
        assert_eq!(eval(r#"jsondecode("{\"a\":1}")"#), eval("{ a = 1 }"));
        assert_eq!(eval(r#"jsonencode({ a = "b" })"#), Value::from(r#"{"a":"b"}"#));
        assert_eq!(eval(r#"coalesce(null, "", "x")"#), Value::from("x"));
    }

    #[test]
    fn regexall_matches() {
        assert_eq!(eval(r#"regexall("[a-z]+", "a1bc2")"#), eval(r#"["a", "bc"]"#));
        assert_eq!(
            eval(r#"regexall("([a-z])([0-9])", "a1b2")"#),
            eval(r#"[["a", "1"], ["b", "2"]]"#)
        );
    }
}
