//! Evaluation of DSL expressions
//!
//! Terraform's `try` and `can` must not evaluate their arguments eagerly. Before an expression is evaluated every
//! `try(...)`/`can(...)` call is replaced by its result, evaluating the arguments one by one. For-expressions are
//! left alone since their bodies reference variables that only exist during the iteration; the fallback
//! definitions in [crate::functions] cover them.
use crate::functions::declare_builtins;
use hcl::eval::{Context, Evaluate};
use hcl::expr::{ObjectKey, Operation, TraversalOperator};
use hcl::template::{Directive, Element};
use hcl::{Expression, Template, TemplateExpr, Value};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("failed to evaluate `{expression}`: {message}")]
pub struct EvalError {
    pub expression: String,
    pub message: String,
}

impl EvalError {
    fn new(expression: &Expression, message: impl ToString) -> Self {
        EvalError {
            expression: expression.to_string(),
            message: message.to_string(),
        }
    }
}

/// A fresh context with all builtin functions and the given variables
pub fn context<'a>(variables: impl IntoIterator<Item = (&'a str, Value)>) -> Context<'static> {
    let mut context = Context::new();
    declare_builtins(&mut context);
    for (name, value) in variables {
        context.declare_var(name, value);
    }
    context
}

/// Evaluates an expression, resolving `try` and `can` first
pub fn evaluate(expression: &Expression, context: &Context) -> Result<Value, EvalError> {
    let mut expression = expression.clone();
    resolve_lazy_calls(&mut expression, context)?;
    expression
        .evaluate(context)
        .map_err(|err| EvalError::new(&expression, err))
}

fn is_lazy_call(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::FuncCall(call) if !call.name.is_namespaced() && matches!(call.name.name.as_str(), "try" | "can")
    )
}

fn resolve_lazy_calls(expression: &mut Expression, context: &Context) -> Result<(), EvalError> {
    if is_lazy_call(expression) {
        let resolved = resolve_lazy_call(expression, context)?;
        *expression = Expression::from(resolved);
        return Ok(());
    }

    match expression {
        Expression::Array(array) => {
            for expr in array {
                resolve_lazy_calls(expr, context)?;
            }
        }
        Expression::Object(object) => {
            let entries = std::mem::take(object);
            for (mut key, mut value) in entries {
                if let ObjectKey::Expression(key) = &mut key {
                    resolve_lazy_calls(key, context)?;
                }
                resolve_lazy_calls(&mut value, context)?;
                object.insert(key, value);
            }
        }
        Expression::Traversal(traversal) => {
            resolve_lazy_calls(&mut traversal.expr, context)?;
            for operator in &mut traversal.operators {
                if let TraversalOperator::Index(index) = operator {
                    resolve_lazy_calls(index, context)?;
                }
            }
        }
        Expression::FuncCall(call) => {
            for arg in &mut call.args {
                resolve_lazy_calls(arg, context)?;
            }
        }
        Expression::Parenthesis(expr) => resolve_lazy_calls(expr, context)?,
        Expression::Conditional(cond) => {
            resolve_lazy_calls(&mut cond.cond_expr, context)?;
            resolve_lazy_calls(&mut cond.true_expr, context)?;
            resolve_lazy_calls(&mut cond.false_expr, context)?;
        }
        Expression::Operation(operation) => match operation.as_mut() {
            Operation::Binary(binop) => {
                resolve_lazy_calls(&mut binop.lhs_expr, context)?;
                resolve_lazy_calls(&mut binop.rhs_expr, context)?;
            }
            Operation::Unary(unop) => resolve_lazy_calls(&mut unop.expr, context)?,
        },
        Expression::TemplateExpr(template_expr) => {
            let Ok(mut template) = Template::from_expr(template_expr) else {
                return Ok(());
            };
            if resolve_template(&mut template, context)? {
                *template_expr = Box::new(TemplateExpr::QuotedString(template.to_string()));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Returns `true` if the template changed
fn resolve_template(template: &mut Template, context: &Context) -> Result<bool, EvalError> {
    let mut changed = false;
    for element in template.elements_mut() {
        match element {
            Element::Interpolation(interpolation) => {
                let before = interpolation.expr.clone();
                resolve_lazy_calls(&mut interpolation.expr, context)?;
                changed |= interpolation.expr != before;
            }
            Element::Directive(Directive::If(ifdir)) => {
                let before = ifdir.cond_expr.clone();
                resolve_lazy_calls(&mut ifdir.cond_expr, context)?;
                changed |= ifdir.cond_expr != before;
                changed |= resolve_template(&mut ifdir.true_template, context)?;
                if let Some(false_template) = &mut ifdir.false_template {
                    changed |= resolve_template(false_template, context)?;
                }
            }
            // the body of a for directive sees the iteration variables
            Element::Directive(Directive::For(_)) | Element::Literal(_) => {}
        }
    }
    Ok(changed)
}

fn resolve_lazy_call(expression: &Expression, context: &Context) -> Result<Value, EvalError> {
    let Expression::FuncCall(call) = expression else {
        return Err(EvalError::new(expression, "not a function call"));
    };

    match call.name.name.as_str() {
        "can" => {
            let [arg] = call.args.as_slice() else {
                return Err(EvalError::new(expression, "can takes exactly one argument"));
            };
            Ok(Value::Bool(evaluate(arg, context).is_ok()))
        }
        _ => {
            let mut last_error = None;
            for arg in &call.args {
                match evaluate(arg, context) {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        tracing::trace!(%err, "try argument failed");
                        last_error = Some(err);
                    }
                }
            }
            Err(match last_error {
                Some(err) => EvalError::new(expression, format!("no argument could be evaluated, last: {err}")),
                None => EvalError::new(expression, "try takes at least one argument"),
            })
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn eval(source: &str, variables: Value) -> Result<Value, EvalError> {
        let variables = match variables {
            Value::Object(object) => object,
            _ => Default::default(),
        };
        let context = context(variables.iter().map(|(name, value)| (name.as_str(), value.clone())));
        let expression: Expression = hcl_edit::parser::parse_expr(source).expect("valid expression").into();
        evaluate(&expression, &context)
    }

    fn vars(source: &str) -> Value {
        let expression: Expression = hcl_edit::parser::parse_expr(source).expect("valid expression").into();
        expression.evaluate(&Context::new()).expect("literal")
    }

    #[test]
    fn try_returns_first_success() {
        let value = eval(r#"try(var.missing, var.present, "fallback")"#, vars(r#"{ var = { present = "x" } }"#));
        assert_eq!(value, Ok(Value::from("x")));
    }

    #[test]
    fn try_fails_when_all_arguments_fail() {
        assert!(eval("try(var.a, var.b)", vars("{}")).is_err());
    }

    #[test]
    fn can_reports_evaluation_success() {
        let variables = vars(r#"{ var = { present = "x" } }"#);
        assert_eq!(eval("can(var.present)", variables.clone()), Ok(Value::Bool(true)));
        assert_eq!(eval("can(var.missing)", variables), Ok(Value::Bool(false)));
    }

    #[test]
    fn lazy_calls_inside_expressions_and_templates() {
        let variables = vars(r#"{ var = { tags = { a = "1" } } }"#);
        assert_eq!(
            eval(r#"merge(try(var.tags, {}), { b = "2" })"#, variables.clone()),
            eval(r#"{ a = "1", b = "2" }"#, vars("{}"))
        );
        assert_eq!(
            eval(r#""tag-${try(var.tags.c, "none")}""#, variables),
            Ok(Value::from("tag-none"))
        );
    }

    #[test]
    fn errors_name_the_expression() {
        let err = eval("var.missing", vars("{}")).unwrap_err();
        assert_eq!(err.expression, "var.missing");
    }
}
