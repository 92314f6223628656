macro_rules! has_extensions {
    ($ty:ty) => {
        impl $ty {
            /// Retrieves a specific extension from the extensions map.
            pub fn ext<T: Send + Sync + 'static>(&self) -> Option<&T> {
                self.extensions().get::<T>()
            }

            /// Retrieves a mutable reference to a specific extension.
            pub fn ext_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
                self.extensions_mut().get_mut::<T>()
            }

            /// Sets the value of a specific extension.
            pub fn set_ext<T: Send + Sync + 'static>(&mut self, value: T) -> &mut Self {
                self.extensions_mut().insert(value);
                self
            }

            /// Sets the value of a specific extension, consuming `self`.
            #[must_use]
            pub fn with_ext<T: Send + Sync + 'static>(mut self, value: T) -> Self {
                self.set_ext(value);
                self
            }

            /// Removes a specific extension from the extensions map.
            pub fn remove_ext<T: Send + Sync + 'static>(&mut self) -> Option<T> {
                self.extensions_mut().remove::<T>()
            }
        }
    };
}
