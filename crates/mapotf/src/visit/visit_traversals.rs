use super::VisitMut;
use hcl::{
    expr::{ObjectKey, TraversalOperator},
    template::{Directive, Element},
    Body, Expression, Operation, Structure, Template, TemplateExpr, Traversal,
};

/// Recursively visit all [hcl::Traversal]s mutably
///
/// Standalone variables are visited as traversals without operators.
pub trait VisitTraversalsMut {
    fn visit_traversals_mut(&mut self, visitor: &mut dyn VisitMut<Traversal>);
}

impl VisitTraversalsMut for Body {
    fn visit_traversals_mut(&mut self, visitor: &mut dyn VisitMut<Traversal>) {
        for structure in self {
            match structure {
                Structure::Attribute(attr) => attr.expr.visit_traversals_mut(visitor),
                Structure::Block(block) => block.body.visit_traversals_mut(visitor),
            }
        }
    }
}

impl VisitTraversalsMut for Expression {
    fn visit_traversals_mut(&mut self, visitor: &mut dyn VisitMut<Traversal>) {
        match self {
            Expression::Variable(variable) => {
                let mut traversal = Traversal::new(
                    Expression::Variable(variable.clone()),
                    Vec::<TraversalOperator>::new(),
                );
                visitor.visit_mut(&mut traversal);
                *self = if traversal.operators.is_empty() {
                    traversal.expr
                } else {
                    Expression::Traversal(Box::new(traversal))
                };
            }
            Expression::Traversal(traversal) => {
                visitor.visit_mut(traversal);
                // the root variable is part of the traversal visited above
                if !matches!(traversal.expr, Expression::Variable(_)) {
                    traversal.expr.visit_traversals_mut(visitor);
                }
                for operator in &mut traversal.operators {
                    if let TraversalOperator::Index(index) = operator {
                        index.visit_traversals_mut(visitor);
                    }
                }
            }
            Expression::Array(array) => {
                for expr in array {
                    expr.visit_traversals_mut(visitor);
                }
            }
            Expression::Object(object) => {
                // keys cannot be borrowed mutably, they are rebuilt when they hold expressions
                let entries = std::mem::take(object);
                for (mut key, mut value) in entries {
                    if let ObjectKey::Expression(key) = &mut key {
                        key.visit_traversals_mut(visitor);
                    }
                    value.visit_traversals_mut(visitor);
                    object.insert(key, value);
                }
            }
            Expression::TemplateExpr(template_expr) => {
                let Ok(mut template) = Template::from_expr(template_expr) else {
                    return;
                };
                template.visit_traversals_mut(visitor);
                *template_expr = Box::new(TemplateExpr::QuotedString(template.to_string()));
            }
            Expression::FuncCall(call) => {
                for arg in &mut call.args {
                    arg.visit_traversals_mut(visitor);
                }
            }
            Expression::Parenthesis(expr) => {
                expr.visit_traversals_mut(visitor);
            }
            Expression::Conditional(cond) => {
                cond.cond_expr.visit_traversals_mut(visitor);
                cond.true_expr.visit_traversals_mut(visitor);
                cond.false_expr.visit_traversals_mut(visitor);
            }
            Expression::Operation(operation) => match operation.as_mut() {
                Operation::Binary(binop) => {
                    binop.lhs_expr.visit_traversals_mut(visitor);
                    binop.rhs_expr.visit_traversals_mut(visitor);
                }
                Operation::Unary(unop) => {
                    unop.expr.visit_traversals_mut(visitor);
                }
            },
            Expression::ForExpr(forexpr) => {
                forexpr.collection_expr.visit_traversals_mut(visitor);
                forexpr
                    .key_expr
                    .iter_mut()
                    .for_each(|e| e.visit_traversals_mut(visitor));
                forexpr.value_expr.visit_traversals_mut(visitor);
                forexpr
                    .cond_expr
                    .iter_mut()
                    .for_each(|e| e.visit_traversals_mut(visitor));
            }
            _ => {}
        }
    }
}

impl VisitTraversalsMut for Template {
    fn visit_traversals_mut(&mut self, visitor: &mut dyn VisitMut<Traversal>) {
        for element in self.elements_mut() {
            match element {
                Element::Interpolation(interpolation) => {
                    interpolation.expr.visit_traversals_mut(visitor);
                }
                Element::Directive(directive) => match directive {
                    Directive::If(ifdir) => {
                        ifdir.cond_expr.visit_traversals_mut(visitor);
                        ifdir.true_template.visit_traversals_mut(visitor);
                        ifdir
                            .false_template
                            .iter_mut()
                            .for_each(|t| t.visit_traversals_mut(visitor));
                    }
                    Directive::For(fordir) => {
                        fordir.collection_expr.visit_traversals_mut(visitor);
                        fordir.template.visit_traversals_mut(visitor);
                    }
                },
                Element::Literal(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::visit::TraversalPath;
    use pretty_assertions::assert_eq;

    fn paths(source: &str) -> Vec<String> {
        let mut body: Body = hcl::from_str(source).unwrap();
        let mut paths = vec![];
        body.visit_traversals_mut(&mut |traversal: &mut Traversal| {
            paths.push(traversal.path().join("."));
        });
        paths
    }

    #[test]
    fn finds_traversals_everywhere() {
        let found = paths(
            r#"
a = data.resource.all.result
b = merge(var.tags, { (local.key) = each.value })
c = "prefix-${transform.update_in_place.tags.id}"
d = [for x in data.variable.all.result : x.name]
e = cond ? data.output.x.result[local.index] : null
"#,
        );

        assert_eq!(
            found,
            vec![
                "data.resource.all.result",
                "var.tags",
                "local.key",
                "each.value",
                "transform.update_in_place.tags.id",
                "data.variable.all.result",
                "x.name",
                "cond",
                "data.output.x.result",
                "local.index",
            ]
        );
    }
}
