//! Type repository.
//!
//! Describes the types the message binders walk: simple types that pass
//! through unchanged, `ArrayOf` wrappers around a single `item` element, and
//! complex types made of ordered, typed and possibly nillable fields.
//!
//! Field access is resolved once, when a complex type is built, into a
//! reader/writer closure pair over an [`ObjectRef`]. Nothing is looked up by
//! name at binding time except the type itself.

use crate::converter::{
    DateTimeTypeConverter, DateTypeConverter, TypeConverter, TypeConverterCollection, XSD_NS,
};
use crate::error::BindError;
use crate::value::{DomainField, DomainValue, DynamicObject, ObjectRef};
use std::any::type_name;
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

/// Suffix turning a type name into an array of that type.
pub const ARRAY_SUFFIX: &str = "[]";

/// A resolved type.
#[derive(Debug, Clone)]
pub enum Type {
    Simple(SimpleType),
    ArrayOf(ArrayOfType),
    Complex(ComplexType),
}

impl Type {
    pub fn php_type(&self) -> &str {
        match self {
            Self::Simple(t) => &t.php_type,
            Self::ArrayOf(t) => &t.php_type,
            Self::Complex(t) => &t.php_type,
        }
    }

    pub fn xml_type(&self) -> &str {
        match self {
            Self::Simple(t) => &t.xml_type,
            Self::ArrayOf(t) => &t.xml_type,
            Self::Complex(t) => &t.xml_type,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexType> {
        match self {
            Self::Complex(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayOfType> {
        match self {
            Self::ArrayOf(t) => Some(t),
            _ => None,
        }
    }
}

/// A terminal type (string, int, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleType {
    php_type: String,
    xml_type: String,
}

impl SimpleType {
    pub fn new(php_type: impl Into<String>, xml_type: impl Into<String>) -> Self {
        Self {
            php_type: php_type.into(),
            xml_type: xml_type.into(),
        }
    }

    pub fn php_type(&self) -> &str {
        &self.php_type
    }

    pub fn xml_type(&self) -> &str {
        &self.xml_type
    }
}

/// Array wrapper whose only member, `item`, holds the element type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayOfType {
    php_type: String,
    xml_type: String,
    item: String,
}

impl ArrayOfType {
    /// `xml_item_type` names the element on the wire; it defaults to `item`.
    pub fn new(php_type: impl Into<String>, item: impl Into<String>, xml_item_type: Option<&str>) -> Self {
        let item = item.into();
        let xml_type = format!("ArrayOf{}", ucfirst(&xml_name(xml_item_type.unwrap_or(&item))));
        Self {
            php_type: php_type.into(),
            xml_type,
            item,
        }
    }

    pub fn php_type(&self) -> &str {
        &self.php_type
    }

    pub fn xml_type(&self) -> &str {
        &self.xml_type
    }

    /// Type name of the `item` member.
    pub fn item_type(&self) -> &str {
        &self.item
    }
}

type ReadFn = Arc<dyn Fn(&ObjectRef) -> Result<DomainValue, BindError> + Send + Sync>;
type WriteFn = Arc<dyn Fn(&ObjectRef, DomainValue) -> Result<(), BindError> + Send + Sync>;

/// How a field is read from and written to a domain object.
#[derive(Clone)]
pub enum FieldAccess {
    /// Direct access to a struct member.
    Property { read: ReadFn, write: WriteFn },
    /// Getter/setter pair.
    Accessor { getter: ReadFn, setter: WriteFn },
}

impl FieldAccess {
    pub fn is_property(&self) -> bool {
        matches!(self, Self::Property { .. })
    }

    fn read(&self, object: &ObjectRef) -> Result<DomainValue, BindError> {
        match self {
            Self::Property { read, .. } => read(object),
            Self::Accessor { getter, .. } => getter(object),
        }
    }

    fn write(&self, object: &ObjectRef, value: DomainValue) -> Result<(), BindError> {
        match self {
            Self::Property { write, .. } => write(object, value),
            Self::Accessor { setter, .. } => setter(object, value),
        }
    }
}

impl fmt::Debug for FieldAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property { .. } => f.write_str("Property"),
            Self::Accessor { .. } => f.write_str("Accessor"),
        }
    }
}

/// A member of a complex type.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    type_name: String,
    nillable: bool,
    access: FieldAccess,
}

impl Field {
    /// Wire name of the field.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_nillable(&self) -> bool {
        self.nillable
    }

    pub fn access(&self) -> &FieldAccess {
        &self.access
    }

    pub fn read(&self, object: &ObjectRef) -> Result<DomainValue, BindError> {
        self.access.read(object)
    }

    pub fn write(&self, object: &ObjectRef, value: DomainValue) -> Result<(), BindError> {
        self.access.write(object, value)
    }
}

type InstantiateFn = Arc<dyn Fn() -> ObjectRef + Send + Sync>;
type InstanceOfFn = Arc<dyn Fn(&ObjectRef) -> bool + Send + Sync>;

/// A named record type bound to a domain type.
#[derive(Clone)]
pub struct ComplexType {
    php_type: String,
    xml_type: String,
    fields: Vec<Field>,
    key_value: bool,
    instantiate: InstantiateFn,
    is_instance: InstanceOfFn,
}

impl ComplexType {
    /// Start a complex type bound to the Rust type `T`.
    pub fn builder<T: Default + 'static>(php_type: impl Into<String>) -> ComplexTypeBuilder<T> {
        ComplexTypeBuilder::new(
            php_type.into(),
            Arc::new(|| ObjectRef::new(T::default())),
            Arc::new(|object: &ObjectRef| object.is::<T>()),
        )
    }

    /// Start a complex type backed by [`DynamicObject`].
    pub fn dynamic(php_type: impl Into<String>) -> ComplexTypeBuilder<DynamicObject> {
        let php_type = php_type.into();
        let instance_name = php_type.clone();
        let class_name = php_type.clone();
        ComplexTypeBuilder::new(
            php_type,
            Arc::new(move || ObjectRef::new(DynamicObject::new(instance_name.clone()))),
            Arc::new(move |object: &ObjectRef| {
                object
                    .downcast::<DynamicObject>()
                    .and_then(|o| o.try_borrow().ok().map(|o| o.type_name() == class_name))
                    .unwrap_or(false)
            }),
        )
    }

    pub fn php_type(&self) -> &str {
        &self.php_type
    }

    pub fn xml_type(&self) -> &str {
        &self.xml_type
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Whether arrays of this type collapse into associative maps.
    pub fn is_key_value(&self) -> bool {
        self.key_value
    }

    /// Create a fresh domain instance.
    pub fn instantiate(&self) -> ObjectRef {
        (self.instantiate)()
    }

    pub fn is_instance(&self, object: &ObjectRef) -> bool {
        (self.is_instance)(object)
    }
}

impl fmt::Debug for ComplexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComplexType")
            .field("php_type", &self.php_type)
            .field("xml_type", &self.xml_type)
            .field("fields", &self.fields)
            .field("key_value", &self.key_value)
            .finish()
    }
}

/// Builder for [`ComplexType`].
pub struct ComplexTypeBuilder<T> {
    php_type: String,
    xml_type: Option<String>,
    fields: Vec<Field>,
    key_value: bool,
    instantiate: InstantiateFn,
    is_instance: InstanceOfFn,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> ComplexTypeBuilder<T> {
    fn new(php_type: String, instantiate: InstantiateFn, is_instance: InstanceOfFn) -> Self {
        Self {
            php_type,
            xml_type: None,
            fields: Vec::new(),
            key_value: false,
            instantiate,
            is_instance,
            _marker: PhantomData,
        }
    }

    /// Add a field accessed directly on the struct.
    pub fn property<V, G, M>(mut self, name: &str, type_name: &str, get: G, get_mut: M) -> Self
    where
        V: DomainField + 'static,
        G: Fn(&T) -> &V + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut V + Send + Sync + 'static,
    {
        let read: ReadFn = Arc::new(move |object: &ObjectRef| {
            let target = downcast::<T>(object)?;
            let target = target.try_borrow().map_err(|_| busy::<T>())?;
            Ok(get(&target).to_domain())
        });
        let write: WriteFn = Arc::new(move |object: &ObjectRef, value: DomainValue| {
            let value = V::from_domain(value)?;
            let target = downcast::<T>(object)?;
            let mut target = target.try_borrow_mut().map_err(|_| busy::<T>())?;
            *get_mut(&mut target) = value;
            Ok(())
        });
        self.push(name, type_name, FieldAccess::Property { read, write });
        self
    }

    /// Add a field accessed through a getter and a setter.
    pub fn accessor<V, G, S>(mut self, name: &str, type_name: &str, getter: G, setter: S) -> Self
    where
        V: DomainField + 'static,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let getter: ReadFn = Arc::new(move |object: &ObjectRef| {
            let target = downcast::<T>(object)?;
            let target = target.try_borrow().map_err(|_| busy::<T>())?;
            Ok(getter(&target).to_domain())
        });
        let setter: WriteFn = Arc::new(move |object: &ObjectRef, value: DomainValue| {
            let value = V::from_domain(value)?;
            let target = downcast::<T>(object)?;
            let mut target = target.try_borrow_mut().map_err(|_| busy::<T>())?;
            setter(&mut target, value);
            Ok(())
        });
        self.push(name, type_name, FieldAccess::Accessor { getter, setter });
        self
    }

    /// Mark the last added field as nillable.
    pub fn nillable(mut self) -> Self {
        if let Some(field) = self.fields.last_mut() {
            field.nillable = true;
        }
        self
    }

    /// Override the XML type name (defaults to the PHP type name).
    pub fn xml_type(mut self, xml_type: impl Into<String>) -> Self {
        self.xml_type = Some(xml_type.into());
        self
    }

    /// Flag the type as a key/value pair.
    pub fn key_value(mut self) -> Self {
        self.key_value = true;
        self
    }

    pub fn build(self) -> Result<ComplexType, BindError> {
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|other| other.name == field.name) {
                return Err(BindError::Config(format!(
                    "Field \"{}\" is declared twice on \"{}\"",
                    field.name, self.php_type
                )));
            }
        }

        if self.key_value && (!self.has_field("key") || !self.has_field("value")) {
            return Err(BindError::Config(format!(
                "Key/value type \"{}\" must declare \"key\" and \"value\" fields",
                self.php_type
            )));
        }

        let xml_type = xml_name(self.xml_type.as_deref().unwrap_or(&self.php_type));
        Ok(ComplexType {
            php_type: self.php_type,
            xml_type,
            fields: self.fields,
            key_value: self.key_value,
            instantiate: self.instantiate,
            is_instance: self.is_instance,
        })
    }

    fn push(&mut self, name: &str, type_name: &str, access: FieldAccess) {
        self.fields.push(Field {
            name: name.to_string(),
            type_name: type_name.to_string(),
            nillable: false,
            access,
        });
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }
}

impl ComplexTypeBuilder<DynamicObject> {
    /// Add a field stored by name on a [`DynamicObject`].
    pub fn field(mut self, name: &str, type_name: &str) -> Self {
        let read_name = name.to_string();
        let write_name = name.to_string();
        let read: ReadFn = Arc::new(move |object: &ObjectRef| {
            let target = downcast::<DynamicObject>(object)?;
            let target = target.try_borrow().map_err(|_| busy::<DynamicObject>())?;
            Ok(target.get(&read_name).cloned().unwrap_or_default())
        });
        let write: WriteFn = Arc::new(move |object: &ObjectRef, value: DomainValue| {
            let target = downcast::<DynamicObject>(object)?;
            let mut target = target
                .try_borrow_mut()
                .map_err(|_| busy::<DynamicObject>())?;
            target.set(write_name.clone(), value);
            Ok(())
        });
        self.push(name, type_name, FieldAccess::Property { read, write });
        self
    }
}

fn downcast<T: 'static>(object: &ObjectRef) -> Result<Rc<RefCell<T>>, BindError> {
    object
        .downcast::<T>()
        .ok_or_else(|| BindError::instance_mismatch(type_name::<T>(), &object.class_name()))
}

fn busy<T>() -> BindError {
    BindError::InvalidArgument(format!(
        "An instance of \"{}\" is already borrowed.",
        type_name::<T>()
    ))
}

fn xml_name(name: &str) -> String {
    name.replace("::", ".")
}

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Maps type names to types.
///
/// Built once at bootstrap and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct TypeRepository {
    xml_namespaces: BTreeMap<String, String>,
    types: HashMap<String, Type>,
    classmap: BTreeMap<String, String>,
    converters: TypeConverterCollection,
}

impl TypeRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository with the XML Schema namespace, the standard simple
    /// types and the date converters.
    pub fn with_defaults() -> Self {
        let mut repository = Self::new();
        repository.add_xml_namespace("xsd", XSD_NS);
        for (php_type, xml_type) in [
            ("string", "string"),
            ("boolean", "boolean"),
            ("int", "int"),
            ("float", "float"),
            ("date", "date"),
            ("dateTime", "dateTime"),
        ] {
            repository.add_type(php_type, xml_type);
        }
        repository.add_converter(Arc::new(DateTypeConverter));
        repository.add_converter(Arc::new(DateTimeTypeConverter));
        repository
    }

    pub fn add_xml_namespace(&mut self, prefix: impl Into<String>, url: impl Into<String>) {
        self.xml_namespaces.insert(prefix.into(), url.into());
    }

    pub fn xml_namespace(&self, prefix: &str) -> Option<&str> {
        self.xml_namespaces.get(prefix).map(String::as_str)
    }

    pub fn xml_namespaces(&self) -> &BTreeMap<String, String> {
        &self.xml_namespaces
    }

    /// Register a simple type.
    pub fn add_type(&mut self, php_type: impl Into<String>, xml_type: impl Into<String>) {
        let simple = SimpleType::new(php_type, xml_type);
        self.types
            .insert(simple.php_type.clone(), Type::Simple(simple));
    }

    pub fn add_complex_type(&mut self, complex: ComplexType) {
        self.classmap
            .insert(complex.xml_type.clone(), complex.php_type.clone());
        self.types
            .insert(complex.php_type.clone(), Type::Complex(complex));
    }

    pub fn add_converter(&mut self, converter: Arc<dyn TypeConverter>) {
        self.converters.add(converter);
    }

    pub fn converters(&self) -> &TypeConverterCollection {
        &self.converters
    }

    /// Converter for a simple type, matched on its XML type name.
    pub fn converter_for(&self, simple: &SimpleType) -> Option<&dyn TypeConverter> {
        self.converters.get(&simple.xml_type)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.get_type(name).is_ok()
    }

    /// Resolve a type name.
    ///
    /// `Foo[]` resolves to an array of `Foo` whenever `Foo` resolves.
    pub fn get_type(&self, name: &str) -> Result<Cow<'_, Type>, BindError> {
        if let Some(found) = self.types.get(name) {
            return Ok(Cow::Borrowed(found));
        }

        if let Some(item) = self.get_array_of(name) {
            let item_type = self
                .get_type(item)
                .map_err(|_| BindError::UnknownType(name.to_string()))?;
            let xml_item_type = item_type.as_complex().map(ComplexType::xml_type);
            return Ok(Cow::Owned(Type::ArrayOf(ArrayOfType::new(
                name,
                item,
                xml_item_type,
            ))));
        }

        Err(BindError::UnknownType(name.to_string()))
    }

    /// Element type name of an array type name, if it is one.
    pub fn get_array_of<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_suffix(ARRAY_SUFFIX)
    }

    /// Complex types, ordered by name.
    pub fn complex_types(&self) -> Vec<&ComplexType> {
        let mut types: Vec<_> = self.types.values().filter_map(Type::as_complex).collect();
        types.sort_by(|a, b| a.php_type.cmp(&b.php_type));
        types
    }

    /// XML type name to PHP type name of every complex type.
    pub fn classmap(&self) -> &BTreeMap<String, String> {
        &self.classmap
    }
}

impl fmt::Debug for TypeRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.types.keys().collect();
        names.sort();
        f.debug_struct("TypeRepository")
            .field("xml_namespaces", &self.xml_namespaces)
            .field("types", &names)
            .field("converters", &self.converters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Person {
        name: String,
        age: Option<i64>,
    }

    impl Person {
        fn age(&self) -> Option<i64> {
            self.age
        }

        fn set_age(&mut self, age: Option<i64>) {
            self.age = age;
        }
    }

    fn person_type() -> ComplexType {
        ComplexType::builder::<Person>("Person")
            .property("name", "string", |p| &p.name, |p| &mut p.name)
            .accessor("age", "int", Person::age, Person::set_age)
            .nillable()
            .build()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let repository = TypeRepository::with_defaults();
        assert_eq!(repository.xml_namespace("xsd"), Some(XSD_NS));
        assert!(repository.has_type("string"));
        assert!(repository.has_type("dateTime"));
        assert!(!repository.has_type("Person"));
        assert!(repository.converters().get("date").is_some());
    }

    #[test]
    fn test_unknown_type() {
        let repository = TypeRepository::with_defaults();
        let err = repository.get_type("Missing").unwrap_err();
        assert!(matches!(err, BindError::UnknownType(ref name) if name == "Missing"));
        assert!(repository.get_type("Missing[]").is_err());
    }

    #[test]
    fn test_array_types_are_derived() {
        let mut repository = TypeRepository::with_defaults();
        repository.add_complex_type(person_type());

        let strings = repository.get_type("string[]").unwrap();
        let strings = strings.as_array().unwrap();
        assert_eq!(strings.item_type(), "string");
        assert_eq!(strings.xml_type(), "ArrayOfString");

        let people = repository.get_type("Person[]").unwrap();
        assert_eq!(people.xml_type(), "ArrayOfPerson");

        let nested = repository.get_type("Person[][]").unwrap();
        assert_eq!(nested.as_array().unwrap().item_type(), "Person[]");
    }

    #[test]
    fn test_complex_type_fields() {
        let person = person_type();
        assert_eq!(person.php_type(), "Person");
        let names: Vec<_> = person.fields().iter().map(Field::name).collect();
        assert_eq!(names, vec!["name", "age"]);
        assert!(!person.get("name").unwrap().is_nillable());
        assert!(person.get("age").unwrap().is_nillable());
        assert!(person.get("name").unwrap().access().is_property());
        assert!(!person.get("age").unwrap().access().is_property());
    }

    #[test]
    fn test_field_read_write() {
        let person = person_type();
        let object = person.instantiate();
        assert!(person.is_instance(&object));

        let name = person.get("name").unwrap();
        name.write(&object, DomainValue::String("Ada".to_string())).unwrap();
        assert_eq!(name.read(&object).unwrap(), DomainValue::String("Ada".to_string()));

        let age = person.get("age").unwrap();
        assert_eq!(age.read(&object).unwrap(), DomainValue::Null);
        age.write(&object, DomainValue::Int(36)).unwrap();
        assert_eq!(object.downcast::<Person>().unwrap().borrow().age, Some(36));

        assert!(name.write(&object, DomainValue::Int(1)).is_err());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let result = ComplexType::builder::<Person>("Person")
            .property("name", "string", |p| &p.name, |p| &mut p.name)
            .property("name", "string", |p| &p.name, |p| &mut p.name)
            .build();
        assert!(matches!(result, Err(BindError::Config(_))));
    }

    #[test]
    fn test_key_value_requires_fields() {
        let result = ComplexType::builder::<Person>("Person")
            .property("name", "string", |p| &p.name, |p| &mut p.name)
            .key_value()
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_dynamic_type() {
        let user = ComplexType::dynamic("app::User")
            .field("login", "string")
            .build()
            .unwrap();
        assert_eq!(user.xml_type(), "app.User");

        let object = user.instantiate();
        assert!(user.is_instance(&object));
        assert_eq!(object.class_name(), "app::User");

        let other = ComplexType::dynamic("app::Group").build().unwrap();
        assert!(!other.is_instance(&object));

        let login = user.get("login").unwrap();
        login.write(&object, DomainValue::String("root".into())).unwrap();
        assert_eq!(login.read(&object).unwrap(), DomainValue::String("root".into()));
    }

    #[test]
    fn test_classmap_and_listing() {
        let mut repository = TypeRepository::new();
        repository.add_complex_type(person_type());
        repository.add_complex_type(
            ComplexType::dynamic("Group").xml_type("UserGroup").build().unwrap(),
        );
        assert_eq!(repository.classmap().get("UserGroup").map(String::as_str), Some("Group"));
        let names: Vec<_> = repository
            .complex_types()
            .iter()
            .map(|t| t.php_type().to_string())
            .collect();
        assert_eq!(names, vec!["Group", "Person"]);
    }

    #[test]
    fn test_repository_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypeRepository>();
    }
}
