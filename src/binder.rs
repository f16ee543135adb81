//! Message binder contracts.
//!
//! A request binder turns the positional wire values of a call into named
//! domain arguments; a response binder turns the controller's return value
//! back into a wire value. Binders keep no state between calls.

use crate::definition::Method;
use crate::error::BindError;
use crate::types::TypeRepository;
use crate::value::{DomainValue, WireValue};
use indexmap::IndexMap;

/// Dispatch key added in front of the bound arguments.
pub const CONTROLLER_KEY: &str = "_controller";

/// Binds the body of a request.
pub trait RequestMessageBinder: Send + Sync {
    fn process_message(
        &self,
        method: &Method,
        message: &[WireValue],
        repository: &TypeRepository,
    ) -> Result<Arguments, BindError>;
}

/// Binds a request header declared on a method.
pub trait RequestHeaderMessageBinder: Send + Sync {
    fn process_header(
        &self,
        method: &Method,
        header: &str,
        data: WireValue,
        repository: &TypeRepository,
    ) -> Result<DomainValue, BindError>;
}

/// Binds the return value of a method.
pub trait ResponseMessageBinder: Send + Sync {
    fn process_message(
        &self,
        method: &Method,
        value: &DomainValue,
        repository: &TypeRepository,
    ) -> Result<WireValue, BindError>;
}

/// Bound arguments, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    entries: IndexMap<String, DomainValue>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an argument, replacing (in place) one with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: DomainValue) {
        self.entries.insert(name.into(), value);
    }

    /// Insert an argument in front of the others.
    pub fn prepend(&mut self, name: impl Into<String>, value: DomainValue) {
        let name = name.into();
        self.entries.shift_remove(&name);
        self.entries.shift_insert(0, name, value);
    }

    pub fn get(&self, name: &str) -> Option<&DomainValue> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DomainValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The controller reference, once [`CONTROLLER_KEY`] has been added.
    pub fn controller(&self) -> Option<&str> {
        match self.get(CONTROLLER_KEY) {
            Some(DomainValue::String(controller)) => Some(controller),
            _ => None,
        }
    }
}

impl IntoIterator for Arguments {
    type Item = (String, DomainValue);
    type IntoIter = indexmap::map::IntoIter<String, DomainValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, DomainValue)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, DomainValue)>>(iter: I) -> Self {
        let mut arguments = Self::new();
        for (name, value) in iter {
            arguments.insert(name, value);
        }
        arguments
    }
}
