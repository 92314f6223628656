use super::pattern::Segment;
use super::route::Route;
use std::collections::HashMap;
use std::sync::Arc;

/// One node of the radix tree. Each node may have any number of static
/// children (keyed by their exact segment text), at most one named
/// parameter child, and at most one wildcard child.
#[derive(Default)]
pub(crate) struct Node {
    static_children: HashMap<Box<str>, Node>,
    param_child: Option<(Box<str>, Box<Node>)>,
    wildcard_child: Option<Box<Node>>,
    methods: HashMap<Option<http::Method>, Arc<Route>>,
}

/// The outcome of a tree lookup, distinguishing "no path matched" from
/// "the path matched but not for this method" so the orchestrator can
/// produce 404 vs. 405.
pub(crate) enum Lookup {
    Matched {
        route: Arc<Route>,
        params: HashMap<Arc<str>, String>,
    },
    MethodNotAllowed(Vec<http::Method>),
    NotFound,
}

impl Node {
    /// Inserts `route` at the path described by `segments`. Fails if a
    /// route already exists for the same `(method, pattern)` pair, or if
    /// the node tree would otherwise be ambiguous (a wildcard is created at
    /// a node that already has a different one, etc. - in practice this
    /// can't happen because there's only ever one wildcard slot per node).
    pub(crate) fn insert(
        &mut self,
        segments: &[Segment],
        route: Arc<Route>,
    ) -> Result<(), &'static str> {
        match segments.split_first() {
            None => self.insert_terminal(route),
            Some((Segment::Static(key), rest)) => self
                .static_children
                .entry(key.clone())
                .or_default()
                .insert(rest, route),
            Some((Segment::Param(name), rest)) => {
                let child = self
                    .param_child
                    .get_or_insert_with(|| (name.clone(), Box::default()));
                if child.0 != *name {
                    return Err("conflicting parameter names at the same path position");
                }
                child.1.insert(rest, route)
            }
            Some((Segment::Wildcard, rest)) => {
                debug_assert!(rest.is_empty(), "wildcard must be the final segment");
                self.wildcard_child
                    .get_or_insert_with(Box::default)
                    .insert(rest, route)
            }
        }
    }

    fn insert_terminal(&mut self, route: Arc<Route>) -> Result<(), &'static str> {
        if self.methods.contains_key(&route.method) {
            return Err("duplicate route");
        }
        self.methods.insert(route.method.clone(), route);
        Ok(())
    }

    /// Looks up `segments` against this subtree, preferring static over
    /// parameter over wildcard children at every node, and returns bound
    /// parameters on a match.
    pub(crate) fn find(&self, segments: &[String], method: &http::Method) -> Lookup {
        match segments.split_first() {
            None => self.lookup_methods(method),
            Some((seg, rest)) => {
                if let Some(child) = self.static_children.get(seg.as_str()) {
                    if let found @ (Lookup::Matched { .. } | Lookup::MethodNotAllowed(_)) =
                        child.find(rest, method)
                    {
                        return found;
                    }
                }

                if let Some((name, child)) = &self.param_child {
                    if let found @ (Lookup::Matched { .. } | Lookup::MethodNotAllowed(_)) =
                        child.find(rest, method)
                    {
                        return with_param(found, name, seg);
                    }
                }

                if let Some(child) = &self.wildcard_child {
                    let remainder = segments.join("/");
                    if let found @ (Lookup::Matched { .. } | Lookup::MethodNotAllowed(_)) =
                        child.lookup_methods(method)
                    {
                        return with_param(found, "*", &remainder);
                    }
                }

                Lookup::NotFound
            }
        }
    }

    fn lookup_methods(&self, method: &http::Method) -> Lookup {
        if let Some(route) = self.methods.get(&Some(method.clone())) {
            return Lookup::Matched {
                route: route.clone(),
                params: HashMap::new(),
            };
        }
        if let Some(route) = self.methods.get(&None) {
            return Lookup::Matched {
                route: route.clone(),
                params: HashMap::new(),
            };
        }
        if self.methods.is_empty() {
            Lookup::NotFound
        } else {
            Lookup::MethodNotAllowed(self.methods.keys().flatten().cloned().collect())
        }
    }
}

fn with_param(found: Lookup, name: &str, value: &str) -> Lookup {
    match found {
        Lookup::Matched { route, mut params } => {
            params.insert(Arc::from(name), value.to_owned());
            Lookup::Matched { route, params }
        }
        other => other,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::router::pattern::Pattern;

    fn route(method: http::Method, pattern: &str) -> Arc<Route> {
        Arc::new(Route::for_test(
            Some(method),
            Pattern::parse(pattern, true).unwrap(),
        ))
    }

    fn split(path: &str) -> Vec<String> {
        Pattern::split_path(path, true)
    }

    #[test]
    fn static_beats_param() {
        let mut root = Node::default();
        root.insert(
            &Pattern::parse("/users/me", true).unwrap().segments,
            route(http::Method::GET, "/users/me"),
        )
        .unwrap();
        root.insert(
            &Pattern::parse("/users/:id", true).unwrap().segments,
            route(http::Method::GET, "/users/:id"),
        )
        .unwrap();

        match root.find(&split("/users/me"), &http::Method::GET) {
            Lookup::Matched { route, params } => {
                assert_eq!(route.pattern.raw.as_ref(), "/users/me");
                assert!(params.is_empty());
            }
            _ => panic!("expected a match"),
        }

        match root.find(&split("/users/42"), &http::Method::GET) {
            Lookup::Matched { route, params } => {
                assert_eq!(route.pattern.raw.as_ref(), "/users/:id");
                assert_eq!(params.get("id").map(String::as_str), Some("42"));
            }
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn wildcard_captures_remainder() {
        let mut root = Node::default();
        root.insert(
            &Pattern::parse("/a/*", true).unwrap().segments,
            route(http::Method::GET, "/a/*"),
        )
        .unwrap();

        match root.find(&split("/a/b/c"), &http::Method::GET) {
            Lookup::Matched { params, .. } => {
                assert_eq!(params.get("*").map(String::as_str), Some("b/c"));
            }
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn method_not_allowed_when_path_matches_other_method() {
        let mut root = Node::default();
        root.insert(
            &Pattern::parse("/x", true).unwrap().segments,
            route(http::Method::GET, "/x"),
        )
        .unwrap();

        match root.find(&split("/x"), &http::Method::POST) {
            Lookup::MethodNotAllowed(methods) => {
                assert_eq!(methods, vec![http::Method::GET]);
            }
            _ => panic!("expected method not allowed"),
        }
    }

    #[test]
    fn duplicate_route_rejected() {
        let mut root = Node::default();
        root.insert(
            &Pattern::parse("/x", true).unwrap().segments,
            route(http::Method::GET, "/x"),
        )
        .unwrap();
        let err = root.insert(
            &Pattern::parse("/x", true).unwrap().segments,
            route(http::Method::GET, "/x"),
        );
        assert!(err.is_err());
    }
}
