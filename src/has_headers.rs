/// A trait implemented for both [`crate::Request`] and [`crate::Response`]
/// that allows interaction with their headers, since they both share common
/// abilities.
pub trait HasHeaders: Sized {
    /// Returns a reference to the associated header field map.
    fn headers(&self) -> &http::HeaderMap<http::HeaderValue>;
    /// Returns a mutable reference to the associated header field map.
    fn headers_mut(&mut self) -> &mut http::HeaderMap<http::HeaderValue>;

    /// Retrieves the given header.
    fn header<H: http::header::AsHeaderName>(&self, key: H) -> Option<&http::HeaderValue> {
        self.headers().get(key)
    }

    /// Sets the given header, replacing any existing value(s).
    ///
    /// # Errors
    /// Fails if the value cannot be converted into a [`http::HeaderValue`].
    fn set_header<K, V>(&mut self, key: K, value: V) -> Result<&mut Self, http::Error>
    where
        http::HeaderName: std::convert::TryFrom<K>,
        <http::HeaderName as std::convert::TryFrom<K>>::Error: Into<http::Error>,
        http::HeaderValue: std::convert::TryFrom<V>,
        <http::HeaderValue as std::convert::TryFrom<V>>::Error: Into<http::Error>,
    {
        use std::convert::TryFrom;
        let key = http::HeaderName::try_from(key).map_err(Into::into)?;
        let value = http::HeaderValue::try_from(value).map_err(Into::into)?;
        self.headers_mut().insert(key, value);
        Ok(self)
    }
}
