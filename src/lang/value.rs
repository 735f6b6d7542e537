use std::any::Any;
use std::cell::OnceCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::runtime::runtime_error::RuntimeError;
use crate::serial::ObjectResolver;

/// Runtime value.
///
/// Values are the only data that can live in a scope's variables, on its
/// operand stack or in its return slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,

    Bool(bool),

    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating-point number.
    Float(f64),

    /// UTF-8 string value.
    Str(String),

    /// Ordered list, as handed in by the host or returned by providers.
    List(Vec<Value>),

    /// Untyped record of named fields. Behaves as an object for object calls
    /// and `of` access, with the type name `record`.
    Record(IndexMap<String, Value>),

    /// Opaque host object.
    Object(ObjectRef),
}

impl Value {
    pub const RECORD_TYPE: &'static str = "record";

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Object(_) => "object",
        }
    }

    /// Loose truthiness: `null`, `false`, `0`, `0.0`, `""`, `"0"` and empty
    /// lists/records are falsy; every object is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !(s.is_empty() || s == "0"),
            Value::List(items) => !items.is_empty(),
            Value::Record(fields) => !fields.is_empty(),
            Value::Object(_) => true,
        }
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Value::Record(_) | Value::Object(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    /// String conversion used by `+` on strings and by the `.` operator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => write!(f, "1"),
            Value::Bool(false) => Ok(()),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                write!(f, "}}")
            }
            Value::Object(obj) => write!(f, "{:?}", obj),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

// =============================================================================
// Host objects
// =============================================================================

/// How a host object survives serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    /// Stored by id (`o:<id>`); a deserializer resolver rebuilds it.
    Reference(String),
    /// Stored as a self-describing blob (`j:<type>:<payload>`); decoded by a
    /// blob decoder registered under the object's type name.
    Blob(String),
}

/// An object owned by the host application.
///
/// The runtime never looks inside: it only needs a type name for provider
/// dispatch, a way to persist the object, and optional named properties for
/// `of` access.
pub trait HostObject: fmt::Debug {
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    /// `None` means the object cannot be written into a process snapshot.
    fn persist(&self) -> Option<Persisted> {
        None
    }

    fn property(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// Shared handle to a host object, possibly not yet rehydrated.
#[derive(Clone)]
pub struct ObjectRef(Rc<Slot>);

enum Slot {
    Ready(Rc<dyn HostObject>),
    Lazy {
        id: String,
        resolvers: Rc<[Rc<dyn ObjectResolver>]>,
        cell: OnceCell<Rc<dyn HostObject>>,
    },
}

impl ObjectRef {
    pub fn new<T: HostObject + 'static>(object: T) -> Self {
        Self::from_rc(Rc::new(object))
    }

    pub fn from_rc(object: Rc<dyn HostObject>) -> Self {
        ObjectRef(Rc::new(Slot::Ready(object)))
    }

    /// A reference that asks `resolvers` for the object on first use.
    pub(crate) fn lazy(id: String, resolvers: Rc<[Rc<dyn ObjectResolver>]>) -> Self {
        ObjectRef(Rc::new(Slot::Lazy {
            id,
            resolvers,
            cell: OnceCell::new(),
        }))
    }

    /// The underlying object, resolving a lazy reference if needed.
    pub fn resolve(&self) -> Result<Rc<dyn HostObject>, RuntimeError> {
        match &*self.0 {
            Slot::Ready(object) => Ok(object.clone()),
            Slot::Lazy {
                id,
                resolvers,
                cell,
            } => {
                if let Some(object) = cell.get() {
                    return Ok(object.clone());
                }

                let resolver = resolvers
                    .iter()
                    .find(|r| r.supports(id))
                    .ok_or_else(|| RuntimeError::ReferenceNotFound {
                        id: id.clone(),
                        pos: None,
                    })?;

                let object = resolver.resolve(id);
                tracing::debug!(id = %id, type_name = object.type_name(), "resolved lazy object");
                let _ = cell.set(object.clone());
                Ok(object)
            }
        }
    }

    /// Whether the object is available without a resolver lookup.
    pub fn is_resolved(&self) -> bool {
        match &*self.0 {
            Slot::Ready(_) => true,
            Slot::Lazy { cell, .. } => cell.get().is_some(),
        }
    }

    /// Persisted form. An unresolved lazy reference keeps its original id,
    /// so re-serializing never triggers a lookup.
    pub fn persisted(&self) -> Option<Persisted> {
        match &*self.0 {
            Slot::Ready(object) => object.persist(),
            Slot::Lazy { id, cell, .. } => match cell.get() {
                Some(object) => object.persist(),
                None => Some(Persisted::Reference(id.clone())),
            },
        }
    }

    /// Type name if already known.
    pub fn known_type_name(&self) -> Option<String> {
        match &*self.0 {
            Slot::Ready(object) => Some(object.type_name().to_string()),
            Slot::Lazy { cell, .. } => cell.get().map(|o| o.type_name().to_string()),
        }
    }

    /// Downcast the resolved object.
    pub fn with<T: 'static, R>(&self, f: impl FnOnce(&T) -> R) -> Result<Option<R>, RuntimeError> {
        let object = self.resolve()?;
        Ok(object.as_any().downcast_ref::<T>().map(f))
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (&*self.0, &*other.0) {
            (Slot::Ready(a), Slot::Ready(b)) => Rc::ptr_eq(a, b),
            _ => match (self.persisted(), other.persisted()) {
                (Some(Persisted::Reference(a)), Some(Persisted::Reference(b))) => a == b,
                _ => false,
            },
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.0 {
            Slot::Ready(object) => write!(f, "{:?}", object),
            Slot::Lazy { id, cell, .. } => match cell.get() {
                Some(object) => write!(f, "{:?}", object),
                None => write!(f, "<unresolved {}>", id),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug)]
    struct Account {
        id: u32,
    }

    impl HostObject for Account {
        fn type_name(&self) -> &str {
            "account"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn persist(&self) -> Option<Persisted> {
            Some(Persisted::Reference(format!("account:{}", self.id)))
        }

        fn property(&self, name: &str) -> Option<Value> {
            (name == "id").then(|| Value::Int(self.id as i64))
        }
    }

    struct CountingResolver {
        lookups: Rc<Cell<u32>>,
    }

    impl ObjectResolver for CountingResolver {
        fn supports(&self, id: &str) -> bool {
            id.starts_with("account:")
        }

        fn resolve(&self, id: &str) -> Rc<dyn HostObject> {
            self.lookups.set(self.lookups.get() + 1);
            let n = id.trim_start_matches("account:").parse().unwrap_or(0);
            Rc::new(Account { id: n })
        }
    }

    fn resolvers(lookups: &Rc<Cell<u32>>) -> Rc<[Rc<dyn ObjectResolver>]> {
        let resolver: Rc<dyn ObjectResolver> = Rc::new(CountingResolver {
            lookups: lookups.clone(),
        });
        vec![resolver].into()
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Str("0".into()).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Str("a".into()).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(Value::Object(ObjectRef::new(Account { id: 1 })).is_truthy());
    }

    #[test]
    fn test_display_follows_string_conversion() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Bool(false).to_string(), "");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
    }

    #[test]
    fn test_lazy_reference_resolves_once() {
        let lookups = Rc::new(Cell::new(0));
        let obj = ObjectRef::lazy("account:7".to_string(), resolvers(&lookups));

        assert!(!obj.is_resolved());
        assert_eq!(lookups.get(), 0);

        let id = obj.with(|a: &Account| a.id).unwrap();
        assert_eq!(id, Some(7));
        obj.resolve().unwrap();

        assert!(obj.is_resolved());
        assert_eq!(lookups.get(), 1);
    }

    #[test]
    fn test_lazy_reference_persists_without_lookup() {
        let lookups = Rc::new(Cell::new(0));
        let obj = ObjectRef::lazy("account:7".to_string(), resolvers(&lookups));

        assert_eq!(
            obj.persisted(),
            Some(Persisted::Reference("account:7".to_string()))
        );
        assert_eq!(lookups.get(), 0);
    }

    #[test]
    fn test_lazy_reference_not_found() {
        let lookups = Rc::new(Cell::new(0));
        let obj = ObjectRef::lazy("invoice:1".to_string(), resolvers(&lookups));

        let err = obj.resolve().unwrap_err();
        assert!(matches!(err, RuntimeError::ReferenceNotFound { ref id, .. } if id == "invoice:1"));
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = ObjectRef::new(Account { id: 1 });
        let b = ObjectRef::new(Account { id: 1 });
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_property() {
        let obj = ObjectRef::new(Account { id: 3 });
        let resolved = obj.resolve().unwrap();
        assert_eq!(resolved.property("id"), Some(Value::Int(3)));
        assert_eq!(resolved.property("name"), None);
    }
}
