//! visitor pattern helpers
//!
//! Used to find the references of DSL declarations.
mod visit_traversals;
pub use visit_traversals::VisitTraversalsMut;

use hcl::{Expression, Traversal, TraversalOperator};

/// Visitor that visits is subjects mutably
pub trait VisitMut<T> {
    fn visit_mut(&mut self, value: &mut T);
}

// blanket impl for FnMut
impl<T, F> VisitMut<T> for F
where
    F: FnMut(&mut T),
{
    fn visit_mut(&mut self, value: &mut T) {
        self(value)
    }
}

pub trait TraversalPath {
    /// Root variable followed by the leading attribute accesses
    ///
    /// `data.resource.all.result[0].name` yields `["data", "resource", "all", "result"]`.
    fn path(&self) -> Vec<String>;
}

impl TraversalPath for Traversal {
    fn path(&self) -> Vec<String> {
        let Expression::Variable(var) = &self.expr else {
            return vec![];
        };

        let mut path = vec![var.as_str().to_string()];
        for operator in &self.operators {
            let TraversalOperator::GetAttr(ident) = operator else {
                break;
            };
            path.push(ident.as_str().to_string());
        }
        path
    }
}

/// All traversal paths in `body`
pub fn traversal_paths(body: &hcl::Body) -> Vec<Vec<String>> {
    let mut body = body.clone();
    let mut paths = vec![];
    body.visit_traversals_mut(&mut |traversal: &mut Traversal| paths.push(traversal.path()));
    paths
}
