//! Configuration types for SOAP service definitions.

use crate::error::BindError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A service definition as loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Config version
    pub version: String,

    /// Service identity
    pub service: ServiceSettings,

    /// Binding options
    pub options: BindingOptions,

    /// Complex types declared without Rust code
    pub types: Vec<ComplexTypeConfig>,

    /// Service methods
    pub methods: Vec<MethodConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            service: ServiceSettings::default(),
            options: BindingOptions::default(),
            types: Vec::new(),
            methods: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Parse a configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, BindError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BindError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

/// Service identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name
    pub name: String,

    /// Target namespace
    pub namespace: String,

    /// Endpoint location
    pub location: Option<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "Service".to_string(),
            namespace: "urn:zentinel:soap".to_string(),
            location: None,
        }
    }
}

/// Binding options.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BindingOptions {
    /// SOAP version
    pub soap_version: SoapVersion,

    /// Binding style
    pub style: BindingStyle,

    /// Body use
    #[serde(rename = "use")]
    pub body_use: BodyUse,
}

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[default]
    #[serde(rename = "1.1")]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    #[serde(rename = "1.2")]
    Soap12,
}

impl SoapVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Soap11 => "1.1",
            Self::Soap12 => "1.2",
        }
    }
}

/// WSDL binding style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BindingStyle {
    /// One wire value per argument
    #[default]
    Rpc,
    /// A single wrapper element per message
    Document,
}

impl BindingStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rpc => "rpc",
            Self::Document => "document",
        }
    }
}

/// WSDL body use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyUse {
    #[default]
    Literal,
    /// Accepted in configuration, rejected when building a definition
    Encoded,
}

impl BodyUse {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Literal => "literal",
            Self::Encoded => "encoded",
        }
    }
}

/// A complex type declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ComplexTypeConfig {
    /// Type name
    pub name: String,

    /// XML type name (defaults to the type name)
    pub xml_type: Option<String>,

    /// Arrays of this type bind to associative maps
    pub key_value: bool,

    /// Fields, in wire order
    pub fields: Vec<PartConfig>,
}

/// A typed, named slot: a field, an argument or a header.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PartConfig {
    /// Name
    pub name: String,

    /// Type name (`string`, `Foo`, `Foo[]`, ...)
    #[serde(rename = "type")]
    pub type_name: String,

    /// Allow null
    pub nillable: bool,
}

/// A service method.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MethodConfig {
    /// Method name
    pub name: String,

    /// Controller reference dispatched to
    pub controller: String,

    /// SOAPAction (defaults to the method name)
    pub soap_action: Option<String>,

    /// Require the SOAPAction header
    pub soap_action_required: bool,

    /// Declared headers
    pub headers: Vec<PartConfig>,

    /// Input arguments, in order
    pub input: Vec<PartConfig>,

    /// Return type
    pub output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.options.soap_version, SoapVersion::Soap11);
        assert_eq!(config.options.style, BindingStyle::Rpc);
        assert_eq!(config.options.body_use, BodyUse::Literal);
        assert!(config.methods.is_empty());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = ServiceConfig::default();
        config.options.style = BindingStyle::Document;
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("use: literal"));
        let parsed = ServiceConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.options.style, BindingStyle::Document);
        assert_eq!(parsed.service.name, config.service.name);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
version: "1"
service:
  name: Users
  namespace: urn:users
options:
  soap_version: "1.2"
  style: rpc
types:
  - name: User
    fields:
      - name: login
        type: string
      - name: email
        type: string
        nillable: true
methods:
  - name: getUsers
    controller: users.controller:list
    input:
      - name: logins
        type: string[]
    output: User[]
"#;
        let config = ServiceConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.service.name, "Users");
        assert_eq!(config.options.soap_version, SoapVersion::Soap12);
        assert_eq!(config.types.len(), 1);
        assert!(config.types[0].fields[1].nillable);
        assert_eq!(config.methods[0].input[0].type_name, "string[]");
        assert_eq!(config.methods[0].output.as_deref(), Some("User[]"));
        assert!(!config.methods[0].soap_action_required);
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ServiceConfig::from_yaml_str("methods: 3").unwrap_err();
        assert!(matches!(err, BindError::Yaml(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ServiceConfig::from_file("/nonexistent/service.yaml").unwrap_err();
        assert!(matches!(err, BindError::Io(_)));
    }
}
