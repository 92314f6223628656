use std::convert::TryFrom;

#[derive(Debug)]
#[must_use]
/// The raw HTTP response half of an exchange.
///
/// Like [`crate::Request`], this is a thin wrapper over
/// [`http::Response<hyper::Body>`]. Endpoints and middleware do not build
/// these directly - they stage a status/body/headers onto
/// [`crate::Context`], which owns one of these and serializes it according
/// to §4.4 of the pipeline's contract once the chain unwinds.
pub struct Response(http::Response<hyper::Body>);

impl Response {
    /// Creates an empty response with status 200.
    pub fn empty_200() -> Self {
        Self::empty_status(http::StatusCode::OK)
    }

    /// Creates an empty response with status 204.
    pub fn empty_204() -> Self {
        Self::empty_status(http::StatusCode::NO_CONTENT)
    }

    /// Creates an empty response with status 404.
    pub fn empty_404() -> Self {
        Self::empty_status(http::StatusCode::NOT_FOUND)
    }

    /// Creates an empty response with status 500.
    pub fn empty_500() -> Self {
        Self::empty_status(http::StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Creates a response with an empty body and the given status. The
    /// Content-Type is not set.
    pub fn empty_status(status: http::StatusCode) -> Self {
        Response(
            http::Response::builder()
                .status(status)
                .body(hyper::Body::empty())
                .unwrap(),
        )
    }

    /// Creates a response with the given text body and a
    /// `text/plain; charset=utf-8` Content-Type.
    pub fn text<V: Into<String>>(body: V) -> Self {
        Response(
            http::Response::builder()
                .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .body(body.into().into())
                .unwrap(),
        )
    }

    /// Creates a response with the given HTML body and a
    /// `text/html; charset=utf-8` Content-Type.
    pub fn html<V: Into<String>>(body: V) -> Self {
        Response(
            http::Response::builder()
                .header(http::header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(body.into().into())
                .unwrap(),
        )
    }

    /// Creates a response with the given JSON body and an
    /// `application/json` Content-Type.
    ///
    /// # Errors
    /// Fails if serialization fails.
    pub fn json<V: serde::Serialize>(body: &V) -> Result<Self, serde_json::Error> {
        let value = serde_json::to_vec(body)?;
        Ok(Response(
            http::Response::builder()
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(value.into())
                .unwrap(),
        ))
    }

    /// Creates a redirect (303 See Other) to the given location.
    ///
    /// # Errors
    /// Fails if `location` cannot be converted into a header value, or the
    /// underlying response cannot be built.
    pub fn see_other<T>(location: T) -> Result<Self, http::Error>
    where
        http::HeaderValue: TryFrom<T>,
        <http::HeaderValue as TryFrom<T>>::Error: Into<http::Error>,
    {
        Ok(Response(
            http::Response::builder()
                .status(http::StatusCode::SEE_OTHER)
                .header(http::header::LOCATION, location)
                .body(hyper::Body::empty())?,
        ))
    }

    /// Creates a permanent redirect (301) to the given location.
    ///
    /// # Errors
    /// Fails if `location` cannot be converted into a header value, or the
    /// underlying response cannot be built.
    pub fn permanent_redirect<T>(location: T) -> Result<Self, http::Error>
    where
        http::HeaderValue: TryFrom<T>,
        <http::HeaderValue as TryFrom<T>>::Error: Into<http::Error>,
    {
        Ok(Response(
            http::Response::builder()
                .status(http::StatusCode::MOVED_PERMANENTLY)
                .header(http::header::LOCATION, location)
                .body(hyper::Body::empty())?,
        ))
    }

    /// Returns the status code.
    pub fn status(&self) -> http::StatusCode {
        self.0.status()
    }

    /// Sets the status code.
    pub fn set_status<S: Into<http::StatusCode>>(&mut self, status: S) {
        *self.0.status_mut() = status.into();
    }

    /// Returns the response with the new status code.
    #[must_use]
    pub fn with_status<S: Into<http::StatusCode>>(mut self, status: S) -> Self {
        self.set_status(status);
        self
    }

    /// Returns a reference to the associated extensions.
    pub fn extensions(&self) -> &http::Extensions {
        self.0.extensions()
    }

    /// Returns a mutable reference to the associated extensions.
    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        self.0.extensions_mut()
    }
}

impl crate::HttpEntity for Response {
    #[inline]
    fn body_mut(&mut self) -> &mut hyper::Body {
        self.0.body_mut()
    }
}

impl crate::HasHeaders for Response {
    #[inline]
    fn headers(&self) -> &http::HeaderMap<http::HeaderValue> {
        self.0.headers()
    }
    #[inline]
    fn headers_mut(&mut self) -> &mut http::HeaderMap<http::HeaderValue> {
        self.0.headers_mut()
    }
}

impl Default for Response {
    fn default() -> Self {
        Response(
            http::Response::builder()
                .body(hyper::Body::empty())
                .unwrap(),
        )
    }
}

impl From<http::Response<hyper::Body>> for Response {
    fn from(hy: http::Response<hyper::Body>) -> Self {
        Response(hy)
    }
}

impl From<Response> for http::Response<hyper::Body> {
    fn from(this: Response) -> Self {
        this.0
    }
}

has_extensions!(Response);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HasHeaders;

    #[test]
    fn empty_status_has_no_content_type() {
        let response = Response::empty_204();
        assert_eq!(response.status(), http::StatusCode::NO_CONTENT);
        assert!(response.header(http::header::CONTENT_TYPE).is_none());
    }

    #[test]
    fn text_sets_content_type() {
        let response = Response::text("hi");
        assert_eq!(
            response.header(http::header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn json_sets_content_type() {
        let response = Response::json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(
            response.header(http::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }
}
