/// A HTTP entity - either the request or response half of an exchange.
///
/// This captures the handful of operations the pipeline needs on both
/// halves (raw body access) without committing to any particular body
/// parser; parsing the body into JSON, form data, or anything else is left
/// to middleware the caller installs, not this crate.
pub trait HttpEntity: Sized {
    /// Returns a mutable reference to the body.
    fn body_mut(&mut self) -> &mut hyper::Body;

    /// Replaces the body, dropping the previous one in place.
    fn set_body<I: Into<hyper::Body>>(&mut self, body: I) -> &mut Self {
        *self.body_mut() = body.into();
        self
    }

    /// Takes the body, leaving an empty body behind.
    fn take_body(&mut self) -> hyper::Body {
        std::mem::replace(self.body_mut(), hyper::Body::empty())
    }
}
