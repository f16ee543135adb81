//! Service definition model.
//!
//! A [`ServiceDefinition`] lists the methods of a service together with the
//! [`TypeRepository`] their parts are typed against. It is built once at
//! bootstrap and only read while messages are bound.

use crate::config::{
    BindingStyle, BodyUse, ComplexTypeConfig, PartConfig, ServiceConfig, SoapVersion,
};
use crate::error::BindError;
use crate::types::{ComplexType, TypeRepository};
use std::collections::BTreeSet;
use tracing::debug;

/// Name of the single part of a response message.
pub const RETURN_PART: &str = "return";

/// A named, typed slot of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    name: String,
    type_name: String,
    nillable: bool,
}

impl Part {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            nillable: false,
        }
    }

    pub fn nillable(mut self) -> Self {
        self.nillable = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn is_nillable(&self) -> bool {
        self.nillable
    }
}

/// An ordered set of parts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    name: String,
    parts: Vec<Part>,
}

impl Message {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a part. A part with the same name is replaced in place.
    pub fn add(&mut self, part: Part) {
        match self.parts.iter_mut().find(|p| p.name == part.name) {
            Some(slot) => *slot = part,
            None => self.parts.push(part),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Parts in declaration order.
    pub fn all(&self) -> &[Part] {
        &self.parts
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// SOAPAction settings of a method.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodOptions {
    pub soap_action: Option<String>,
    pub soap_action_required: bool,
}

/// A service operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    name: String,
    controller: String,
    headers: Message,
    input: Message,
    output: Message,
    fault: Message,
    options: MethodOptions,
}

impl Method {
    pub fn new(name: impl Into<String>, controller: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            headers: Message::new(format!("{}Header", name)),
            input: Message::new(format!("{}Request", name)),
            output: Message::new(format!("{}Response", name)),
            fault: Message::new(format!("{}Fault", name)),
            controller: controller.into(),
            options: MethodOptions::default(),
            name,
        }
    }

    pub fn with_input(mut self, name: &str, type_name: &str) -> Self {
        self.input.add(Part::new(name, type_name));
        self
    }

    pub fn with_nillable_input(mut self, name: &str, type_name: &str) -> Self {
        self.input.add(Part::new(name, type_name).nillable());
        self
    }

    pub fn with_header(mut self, name: &str, type_name: &str) -> Self {
        self.headers.add(Part::new(name, type_name));
        self
    }

    /// Set the return type.
    pub fn with_output(mut self, type_name: &str) -> Self {
        self.output.add(Part::new(RETURN_PART, type_name));
        self
    }

    pub fn with_fault(mut self, type_name: &str) -> Self {
        self.fault.add(Part::new("fault", type_name));
        self
    }

    pub fn with_soap_action(mut self, action: impl Into<String>, required: bool) -> Self {
        self.options.soap_action = Some(action.into());
        self.options.soap_action_required = required;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller(&self) -> &str {
        &self.controller
    }

    pub fn headers(&self) -> &Message {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&Part> {
        self.headers.get(name)
    }

    pub fn input(&self) -> &Message {
        &self.input
    }

    pub fn output(&self) -> &Message {
        &self.output
    }

    pub fn fault(&self) -> &Message {
        &self.fault
    }

    pub fn options(&self) -> &MethodOptions {
        &self.options
    }

    /// SOAPAction of the method, defaulting to its name.
    pub fn soap_action(&self) -> &str {
        self.options.soap_action.as_deref().unwrap_or(&self.name)
    }

    pub fn return_type(&self) -> Option<&str> {
        self.output.get(RETURN_PART).map(Part::type_name)
    }

    /// Header, input, output and fault messages.
    pub fn messages(&self) -> [&Message; 4] {
        [&self.headers, &self.input, &self.output, &self.fault]
    }
}

/// Service-wide binding options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionOptions {
    pub version: SoapVersion,
    pub style: BindingStyle,
    pub body_use: BodyUse,
    pub location: Option<String>,
}

impl Default for DefinitionOptions {
    fn default() -> Self {
        Self {
            version: SoapVersion::Soap11,
            style: BindingStyle::Rpc,
            body_use: BodyUse::Literal,
            location: None,
        }
    }
}

/// A service: its methods and the types they use.
#[derive(Debug, Clone)]
pub struct ServiceDefinition {
    name: String,
    namespace: String,
    type_repository: TypeRepository,
    options: DefinitionOptions,
    methods: Vec<Method>,
}

impl ServiceDefinition {
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        type_repository: TypeRepository,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            type_repository,
            options: DefinitionOptions::default(),
            methods: Vec::new(),
        }
    }

    pub fn with_options(mut self, options: DefinitionOptions) -> Self {
        self.options = options;
        self
    }

    /// Set an option by name (`version`, `style`, `use`, `location`).
    pub fn set_option(&mut self, key: &str, value: &str) -> Result<(), BindError> {
        let invalid = || BindError::UnsupportedOption(format!("{} = \"{}\"", key, value));
        match key {
            "version" => {
                self.options.version = match value {
                    "1.1" => SoapVersion::Soap11,
                    "1.2" => SoapVersion::Soap12,
                    _ => return Err(invalid()),
                }
            }
            "style" => {
                self.options.style = match value {
                    "rpc" => BindingStyle::Rpc,
                    "document" => BindingStyle::Document,
                    _ => return Err(invalid()),
                }
            }
            "use" => {
                self.options.body_use = match value {
                    "literal" => BodyUse::Literal,
                    _ => return Err(invalid()),
                }
            }
            "location" => self.options.location = Some(value.to_string()),
            _ => return Err(BindError::UnsupportedOption(key.to_string())),
        }
        Ok(())
    }

    pub fn add_method(&mut self, method: Method) -> Result<(), BindError> {
        if self.get_method(method.name()).is_some() {
            return Err(BindError::DuplicateMethod(method.name().to_string()));
        }
        self.methods.push(method);
        Ok(())
    }

    pub fn get_method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Every message of every method.
    pub fn messages(&self) -> Vec<&Message> {
        self.methods.iter().flat_map(Method::messages).collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn options(&self) -> &DefinitionOptions {
        &self.options
    }

    pub fn type_repository(&self) -> &TypeRepository {
        &self.type_repository
    }

    /// Type names referenced by the definition that do not resolve.
    pub fn unresolved_types(&self) -> Vec<String> {
        let mut referenced = BTreeSet::new();
        for message in self.messages() {
            for part in message.all() {
                referenced.insert(part.type_name().to_string());
            }
        }
        for complex in self.type_repository.complex_types() {
            for field in complex.fields() {
                referenced.insert(field.type_name().to_string());
            }
        }

        referenced
            .into_iter()
            .filter(|name| !self.type_repository.has_type(name))
            .collect()
    }

    /// Check that every referenced type resolves.
    pub fn validate(&self) -> Result<(), BindError> {
        match self.unresolved_types().into_iter().next() {
            Some(name) => Err(BindError::UnknownType(name)),
            None => Ok(()),
        }
    }

    /// Build a definition from configuration.
    ///
    /// Complex types declared in configuration are added to `repository` as
    /// dynamic types.
    pub fn from_config(
        config: &ServiceConfig,
        mut repository: TypeRepository,
    ) -> Result<Self, BindError> {
        if config.options.body_use == BodyUse::Encoded {
            return Err(BindError::UnsupportedOption("use = \"encoded\"".to_string()));
        }

        for declared in &config.types {
            repository.add_complex_type(dynamic_type(declared)?);
        }

        let mut definition = Self::new(
            config.service.name.clone(),
            config.service.namespace.clone(),
            repository,
        )
        .with_options(DefinitionOptions {
            version: config.options.soap_version,
            style: config.options.style,
            body_use: config.options.body_use,
            location: config.service.location.clone(),
        });

        for declared in &config.methods {
            let mut method = Method::new(declared.name.clone(), declared.controller.clone());
            for header in &declared.headers {
                method.headers.add(part(header));
            }
            for input in &declared.input {
                method.input.add(part(input));
            }
            if let Some(output) = &declared.output {
                method = method.with_output(output);
            }
            method.options = MethodOptions {
                soap_action: declared.soap_action.clone(),
                soap_action_required: declared.soap_action_required,
            };
            definition.add_method(method)?;
        }

        debug!(
            service = %definition.name,
            methods = definition.methods.len(),
            types = config.types.len(),
            "Service definition built from configuration"
        );

        Ok(definition)
    }
}

fn part(config: &PartConfig) -> Part {
    let part = Part::new(config.name.clone(), config.type_name.clone());
    if config.nillable {
        part.nillable()
    } else {
        part
    }
}

fn dynamic_type(config: &ComplexTypeConfig) -> Result<ComplexType, BindError> {
    let mut builder = ComplexType::dynamic(config.name.clone());
    if let Some(xml_type) = &config.xml_type {
        builder = builder.xml_type(xml_type.clone());
    }
    for field in &config.fields {
        builder = builder.field(&field.name, &field.type_name);
        if field.nillable {
            builder = builder.nillable();
        }
    }
    if config.key_value {
        builder = builder.key_value();
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> TypeRepository {
        TypeRepository::with_defaults()
    }

    #[test]
    fn test_method_messages() {
        let method = Method::new("getUser", "users:get")
            .with_input("id", "int")
            .with_header("auth", "string")
            .with_output("string");

        assert_eq!(method.input().name(), "getUserRequest");
        assert_eq!(method.output().name(), "getUserResponse");
        assert_eq!(method.headers().name(), "getUserHeader");
        assert_eq!(method.fault().name(), "getUserFault");
        assert_eq!(method.return_type(), Some("string"));
        assert_eq!(method.soap_action(), "getUser");
        assert!(method.header("auth").is_some());
        assert!(method.header("missing").is_none());
    }

    #[test]
    fn test_message_add_replaces_in_place() {
        let mut message = Message::new("m");
        message.add(Part::new("a", "int"));
        message.add(Part::new("b", "int"));
        message.add(Part::new("a", "string"));
        let names: Vec<_> = message.all().iter().map(Part::name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(message.get("a").unwrap().type_name(), "string");
    }

    #[test]
    fn test_duplicate_method() {
        let mut definition = ServiceDefinition::new("Svc", "urn:svc", repository());
        definition.add_method(Method::new("ping", "c")).unwrap();
        let err = definition.add_method(Method::new("ping", "c")).unwrap_err();
        assert!(matches!(err, BindError::DuplicateMethod(ref name) if name == "ping"));
        assert_eq!(definition.messages().len(), 4);
    }

    #[test]
    fn test_set_option() {
        let mut definition = ServiceDefinition::new("Svc", "urn:svc", repository());
        definition.set_option("version", "1.2").unwrap();
        definition.set_option("style", "document").unwrap();
        definition.set_option("location", "http://localhost/soap").unwrap();
        assert_eq!(definition.options().version, SoapVersion::Soap12);
        assert_eq!(definition.options().style, BindingStyle::Document);
        assert!(definition.set_option("use", "encoded").is_err());
        assert!(matches!(
            definition.set_option("cache", "none"),
            Err(BindError::UnsupportedOption(_))
        ));
    }

    #[test]
    fn test_validate_reports_unknown_types() {
        let mut definition = ServiceDefinition::new("Svc", "urn:svc", repository());
        definition
            .add_method(Method::new("a", "c").with_input("x", "string[]").with_output("int"))
            .unwrap();
        assert!(definition.validate().is_ok());

        definition
            .add_method(Method::new("b", "c").with_input("y", "Missing[]"))
            .unwrap();
        assert_eq!(definition.unresolved_types(), vec!["Missing[]".to_string()]);
        assert!(matches!(definition.validate(), Err(BindError::UnknownType(_))));
    }

    #[test]
    fn test_from_config() {
        let config = ServiceConfig::from_yaml_str(
            r#"
service:
  name: Users
  namespace: urn:users
  location: http://localhost/users
options:
  soap_version: "1.2"
types:
  - name: User
    fields:
      - name: login
        type: string
methods:
  - name: getUser
    controller: users:get
    soap_action: urn:getUser
    input:
      - name: login
        type: string
    output: User
"#,
        )
        .unwrap();

        let definition = ServiceDefinition::from_config(&config, repository()).unwrap();
        assert_eq!(definition.name(), "Users");
        assert_eq!(definition.options().version, SoapVersion::Soap12);
        assert_eq!(definition.options().location.as_deref(), Some("http://localhost/users"));
        let method = definition.get_method("getUser").unwrap();
        assert_eq!(method.soap_action(), "urn:getUser");
        assert_eq!(method.return_type(), Some("User"));
        assert!(definition.type_repository().get_type("User").is_ok());
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn test_from_config_rejects_encoded() {
        let mut config = ServiceConfig::default();
        config.options.body_use = BodyUse::Encoded;
        let err = ServiceDefinition::from_config(&config, repository()).unwrap_err();
        assert!(matches!(err, BindError::UnsupportedOption(_)));
    }
}
