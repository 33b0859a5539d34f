// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Typed resource decoding.

Packages only ever hand out raw payload bytes. Turning those bytes into
something meaningful is the job of a [ResourceFactory], looked up by
resource type in a [FactoryRegistry]. Packages have no knowledge of either.
*/

use {
    crate::{Error, PackageResult, ResourceKey},
    std::{any::Any, collections::HashMap},
};

/// Decodes and encodes the payload of a family of resource types.
pub trait ResourceFactory: Send + Sync {
    /// Decode raw (decompressed) payload bytes into a typed value.
    fn decode(&self, key: &ResourceKey, data: &[u8]) -> PackageResult<Box<dyn Any + Send>>;

    /// Encode a typed value back to raw payload bytes.
    fn encode(&self, key: &ResourceKey, resource: &(dyn Any + Send)) -> PackageResult<Vec<u8>>;
}

/// Maps resource type identifiers to factories.
#[derive(Default)]
pub struct FactoryRegistry {
    factories: HashMap<u32, Box<dyn ResourceFactory>>,
    fallback: Option<Box<dyn ResourceFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a resource type, replacing any existing one.
    pub fn register(&mut self, resource_type: u32, factory: Box<dyn ResourceFactory>) {
        self.factories.insert(resource_type, factory);
    }

    /// Set the factory used for types with no explicit registration.
    pub fn set_fallback(&mut self, factory: Box<dyn ResourceFactory>) {
        self.fallback = Some(factory);
    }

    /// Resolve the factory for a resource type.
    pub fn factory(&self, resource_type: u32) -> Option<&dyn ResourceFactory> {
        self.factories
            .get(&resource_type)
            .or(self.fallback.as_ref())
            .map(|f| f.as_ref())
    }

    /// Decode raw bytes for a key using the registered factory.
    pub fn decode(&self, key: &ResourceKey, data: &[u8]) -> PackageResult<Box<dyn Any + Send>> {
        self.factory(key.resource_type)
            .ok_or(Error::NoFactory(key.resource_type))?
            .decode(key, data)
    }

    /// Encode a typed value for a key using the registered factory.
    pub fn encode(&self, key: &ResourceKey, resource: &(dyn Any + Send)) -> PackageResult<Vec<u8>> {
        self.factory(key.resource_type)
            .ok_or(Error::NoFactory(key.resource_type))?
            .encode(key, resource)
    }
}

/// A factory treating payloads as plain byte vectors.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawBytesFactory;

impl ResourceFactory for RawBytesFactory {
    fn decode(&self, _key: &ResourceKey, data: &[u8]) -> PackageResult<Box<dyn Any + Send>> {
        Ok(Box::new(data.to_vec()))
    }

    fn encode(&self, _key: &ResourceKey, resource: &(dyn Any + Send)) -> PackageResult<Vec<u8>> {
        resource
            .downcast_ref::<Vec<u8>>()
            .cloned()
            .ok_or(Error::Unsupported("resource is not a byte vector"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Utf8Factory;

    impl ResourceFactory for Utf8Factory {
        fn decode(&self, _key: &ResourceKey, data: &[u8]) -> PackageResult<Box<dyn Any + Send>> {
            Ok(Box::new(String::from_utf8_lossy(data).to_string()))
        }

        fn encode(&self, _key: &ResourceKey, resource: &(dyn Any + Send)) -> PackageResult<Vec<u8>> {
            resource
                .downcast_ref::<String>()
                .map(|s| s.as_bytes().to_vec())
                .ok_or(Error::Unsupported("not a string"))
        }
    }

    #[test]
    fn lookup_by_type() -> PackageResult<()> {
        let mut registry = FactoryRegistry::new();
        registry.register(0x220557da, Box::new(Utf8Factory));

        let key = ResourceKey::new(0x220557da, 0, 1);
        let decoded = registry.decode(&key, b"hello")?;
        assert_eq!(decoded.downcast_ref::<String>().map(|s| s.as_str()), Some("hello"));
        assert_eq!(registry.encode(&key, decoded.as_ref())?, b"hello".to_vec());

        let other = ResourceKey::new(1, 0, 1);
        assert!(matches!(registry.decode(&other, b""), Err(Error::NoFactory(1))));

        Ok(())
    }

    #[test]
    fn fallback_factory() -> PackageResult<()> {
        let mut registry = FactoryRegistry::new();
        registry.set_fallback(Box::new(RawBytesFactory));

        let key = ResourceKey::new(9, 9, 9);
        let decoded = registry.decode(&key, &[1, 2, 3])?;
        assert_eq!(decoded.downcast_ref::<Vec<u8>>(), Some(&vec![1, 2, 3]));

        Ok(())
    }
}
