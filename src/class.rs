//! Class descriptors: the member table tracked fields are installed into.

use std::sync::Arc;

use ahash::HashMap;

use crate::error::ConfigError;
use crate::object::TrackedObject;
use crate::runtime::Runtime;
use crate::storage::FieldKey;

/// Kind of a declared member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A plain data field.
    Data,
    /// A computed accessor (getter/setter pair).
    Accessor,
    /// A data field whose reads and writes are tracked.
    Tracked,
}

/// Member table of one class of objects.
///
/// Used to reject tracking members that are not plain data fields when a
/// [`TrackedField`](crate::TrackedField) is installed.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: Arc<str>,
    members: HashMap<FieldKey, MemberKind>,
}

impl ClassDescriptor {
    /// Create an empty descriptor.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            members: HashMap::default(),
        }
    }

    /// Class name, used as the label of instantiated objects.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a plain data field.
    pub fn define_field(&mut self, key: impl Into<FieldKey>) -> Result<(), ConfigError> {
        self.define(key.into(), MemberKind::Data)
    }

    /// Declare a computed accessor.
    pub fn define_accessor(&mut self, key: impl Into<FieldKey>) -> Result<(), ConfigError> {
        self.define(key.into(), MemberKind::Accessor)
    }

    fn define(&mut self, key: FieldKey, kind: MemberKind) -> Result<(), ConfigError> {
        if self.members.contains_key(&key) {
            return Err(ConfigError::DuplicateMember {
                class: self.name.clone(),
                key,
            });
        }
        self.members.insert(key, kind);
        Ok(())
    }

    /// Kind of the member named `key`, if declared.
    pub fn member(&self, key: &FieldKey) -> Option<MemberKind> {
        self.members.get(key).copied()
    }

    /// Keys of tracked members, sorted.
    pub fn tracked_keys(&self) -> Vec<FieldKey> {
        let mut keys: Vec<_> = self
            .members
            .iter()
            .filter(|(_, kind)| **kind == MemberKind::Tracked)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Create an object of this class, labelled with the class name.
    pub fn instantiate(&self, runtime: &Runtime) -> TrackedObject {
        runtime.create_object(self.name.clone())
    }

    pub(crate) fn mark_tracked(&mut self, key: &FieldKey) -> Result<(), ConfigError> {
        match self.members.get(key) {
            Some(MemberKind::Accessor) => Err(ConfigError::NotADataField {
                class: self.name.clone(),
                key: key.clone(),
            }),
            Some(MemberKind::Tracked) => Err(ConfigError::AlreadyTracked {
                class: self.name.clone(),
                key: key.clone(),
            }),
            Some(MemberKind::Data) | None => {
                self.members.insert(key.clone(), MemberKind::Tracked);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::TrackedField;

    fn person() -> ClassDescriptor {
        let mut class = ClassDescriptor::new("Person");
        class.define_field("firstName").unwrap();
        class.define_field("lastName").unwrap();
        class.define_accessor("fullName").unwrap();
        class
    }

    #[test]
    fn test_install_on_data_field() {
        let mut class = person();
        TrackedField::<String>::builder("firstName")
            .default_initializer()
            .install(&mut class)
            .unwrap();
        assert_eq!(class.member(&"firstName".into()), Some(MemberKind::Tracked));
        assert_eq!(class.member(&"lastName".into()), Some(MemberKind::Data));
    }

    #[test]
    fn test_install_on_undeclared_member() {
        let mut class = person();
        TrackedField::<u32>::builder("age")
            .default_initializer()
            .install(&mut class)
            .unwrap();
        assert_eq!(class.tracked_keys(), vec![FieldKey::from("age")]);
    }

    #[test]
    fn test_install_on_accessor_is_rejected() {
        let mut class = person();
        let err = TrackedField::<String>::builder("fullName")
            .default_initializer()
            .install(&mut class)
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotADataField {
                class: "Person".into(),
                key: "fullName".into(),
            }
        );
        assert_eq!(class.member(&"fullName".into()), Some(MemberKind::Accessor));
    }

    #[test]
    fn test_install_twice_is_rejected() {
        let mut class = person();
        let builder = || TrackedField::<String>::builder("lastName").default_initializer();
        builder().install(&mut class).unwrap();
        let err = builder().install(&mut class).unwrap_err();
        assert!(matches!(err, ConfigError::AlreadyTracked { .. }));
    }

    #[test]
    fn test_duplicate_member() {
        let mut class = person();
        let err = class.define_accessor("firstName").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateMember { .. }));
    }

    #[test]
    fn test_instantiate_uses_class_name() {
        let runtime = Runtime::new();
        let object = person().instantiate(&runtime);
        assert_eq!(object.label(), "Person");
    }
}
