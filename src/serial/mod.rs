//! # Process persistence
//!
//! A [`Process`](crate::runtime::Process) is written to a versioned JSON
//! envelope that carries the compiled program alongside the scopes, so a
//! snapshot is self-contained. Values inside it use the tagged encoding of
//! [`tagged`].
//!
//! Host objects are persisted either by id (`o:`) or as a typed blob
//! (`j:`). On the way back, ids go through [`ObjectResolver`]s and blobs
//! through decoders registered by type name. [`LazyDeserializer`] defers the
//! id lookup until the program first reads the value.

use std::rc::Rc;

use crate::lang::value::HostObject;

pub mod deserializer;
pub mod error;
pub mod serializer;
pub mod tagged;

pub use deserializer::{BlobDecoder, Deserializer, LazyDeserializer};
pub use error::SerializationError;
pub use serializer::Serializer;

/// Current envelope version.
pub const FORMAT_VERSION: u64 = 1;

/// Rebuilds host objects persisted by id.
pub trait ObjectResolver {
    fn supports(&self, id: &str) -> bool;

    fn resolve(&self, id: &str) -> Rc<dyn HostObject>;
}

/// `<type>:<id>` object ids, the usual shape of a persisted reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectTypeId {
    pub type_name: String,
    pub id: String,
}

impl ObjectTypeId {
    pub fn new(type_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            id: id.into(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (type_name, id) = s.split_once(':')?;
        Some(Self::new(type_name, id))
    }
}

impl std::fmt::Display for ObjectTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}
