//! Static attributes describing the service that produces telemetry.
use crate::common::{Key, KeyValue, Value};
use std::borrow::Cow;

/// Attributes attached to every span exported by this process.
///
/// A resource always carries a `service.name`; services built from
/// [`ObservabilityConfig`](crate::ObservabilityConfig) also carry their
/// `application` and `environment` labels.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    attrs: Vec<KeyValue>,
}

impl Resource {
    /// Attribute key of the logical service name.
    pub const SERVICE_NAME: &'static str = "service.name";
    /// Attribute key of the application the service belongs to.
    pub const APPLICATION: &'static str = "application";
    /// Attribute key of the deployment environment.
    pub const ENVIRONMENT: &'static str = "environment";

    const DEFAULT_SERVICE_NAME: &'static str = "unknown_service";

    /// Starts building a resource.
    ///
    /// # Examples
    ///
    /// ```
    /// use app_obs::Resource;
    ///
    /// let resource = Resource::builder()
    ///     .with_service_name("product-service")
    ///     .with_environment("staging")
    ///     .build();
    /// assert_eq!(resource.get(Resource::SERVICE_NAME).unwrap().as_str(), "product-service");
    /// ```
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder {
            resource: Resource {
                attrs: vec![KeyValue::new(Self::SERVICE_NAME, Self::DEFAULT_SERVICE_NAME)],
            },
        }
    }

    /// Returns the value for `key`, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attrs
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    /// Iterates over the attributes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.attrs.iter().map(|kv| (&kv.key, &kv.value))
    }

    /// The number of attributes.
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Returns `true` if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    fn upsert(&mut self, attribute: KeyValue) {
        match self.attrs.iter_mut().find(|kv| kv.key == attribute.key) {
            Some(existing) => existing.value = attribute.value,
            None => self.attrs.push(attribute),
        }
    }
}

impl Default for Resource {
    fn default() -> Self {
        Resource::builder().build()
    }
}

/// Builder for [`Resource`].
#[derive(Debug)]
pub struct ResourceBuilder {
    resource: Resource,
}

impl ResourceBuilder {
    /// Sets `service.name`.
    pub fn with_service_name(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with_attribute(KeyValue::new(Resource::SERVICE_NAME, name.into()))
    }

    /// Sets `application`.
    pub fn with_application(self, application: impl Into<Cow<'static, str>>) -> Self {
        self.with_attribute(KeyValue::new(Resource::APPLICATION, application.into()))
    }

    /// Sets `environment`.
    pub fn with_environment(self, environment: impl Into<Cow<'static, str>>) -> Self {
        self.with_attribute(KeyValue::new(Resource::ENVIRONMENT, environment.into()))
    }

    /// Adds an attribute, replacing any previous value for the same key.
    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.resource.upsert(attribute);
        self
    }

    /// Builds the resource.
    pub fn build(self) -> Resource {
        self.resource
    }
}
