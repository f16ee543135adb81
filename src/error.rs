//! Error types for SOAP message binding.

use crate::config::SoapVersion;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Binding errors.
///
/// Only [`BindError::Fault`] is meant to reach the remote caller as-is. Every
/// other variant is a local failure (a bad definition, a controller returning
/// data that does not match its contract, ...) and is reported to the caller
/// as a generic server fault, see [`BindError::to_fault`].
#[derive(Error, Debug)]
pub enum BindError {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("SOAP fault: {0}")]
    Fault(SoapFault),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Header \"{header}\" is not declared on method \"{method}\"")]
    HeaderNotFound { method: String, header: String },

    #[error("The method \"{0}\" already exists")]
    DuplicateMethod(String),

    #[error("Unsupported option: {0}")]
    UnsupportedOption(String),

    #[error("Cannot convert {type_name}: {message}")]
    Conversion { type_name: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BindError {
    /// Inbound violation of a non-nillable field.
    pub fn complex_type_violation(type_name: &str, field: &str) -> Self {
        Self::Fault(SoapFault::new(
            FaultCode::ComplexTypeViolation,
            format!("\"{}:{}\" cannot be null.", ucfirst(type_name), field),
        ))
    }

    /// Outbound violation of a non-nillable field.
    pub fn null_field(type_name: &str, field: &str) -> Self {
        Self::InvalidArgument(format!("\"{}::{}\" cannot be null.", type_name, field))
    }

    /// Outbound value that is not an instance of the declared type.
    pub fn instance_mismatch(expected: &str, given: &str) -> Self {
        Self::InvalidArgument(format!(
            "The instance class must be \"{}\", \"{}\" given.",
            expected, given
        ))
    }

    /// Whether this error is a caller-facing protocol fault.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    /// The fault to send back to the caller.
    ///
    /// Local errors never leak their message.
    pub fn to_fault(&self) -> SoapFault {
        match self {
            Self::Fault(fault) => fault.clone(),
            _ => SoapFault::new(FaultCode::Server, "Internal server error"),
        }
    }
}

fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Fault codes produced by the binding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    /// A non-nillable complex type member was missing
    ComplexTypeViolation,
    /// Generic client error
    Client,
    /// Generic server error
    Server,
}

impl FaultCode {
    /// Get the string code for this fault.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComplexTypeViolation => "SOAP_ERROR_COMPLEX_TYPE",
            Self::Client => "CLIENT",
            Self::Server => "SERVER",
        }
    }

    fn is_sender(&self) -> bool {
        !matches!(self, Self::Server)
    }
}

/// A SOAP fault raised while binding a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoapFault {
    /// Fault code
    pub code: FaultCode,
    /// Human-readable message
    pub message: String,
}

impl SoapFault {
    /// Create a new fault.
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

/// Generate a SOAP Fault response envelope.
pub fn soap_fault_response(fault: &SoapFault, soap_version: Option<SoapVersion>) -> String {
    match soap_version.unwrap_or(SoapVersion::Soap11) {
        SoapVersion::Soap11 => soap_11_fault(fault),
        SoapVersion::Soap12 => soap_12_fault(fault),
    }
}

fn soap_11_fault(fault: &SoapFault) -> String {
    let fault_code = if fault.code.is_sender() {
        "soap:Client"
    } else {
        "soap:Server"
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Body>
    <soap:Fault>
      <faultcode>{}</faultcode>
      <faultstring>{}</faultstring>
      <detail>
        <zentinel:fault xmlns:zentinel="urn:zentinel:soap:binding" code="{}"/>
      </detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        fault_code,
        xml_escape(&fault.message),
        fault.code.as_str()
    )
}

fn soap_12_fault(fault: &SoapFault) -> String {
    let code_value = if fault.code.is_sender() {
        "soap:Sender"
    } else {
        "soap:Receiver"
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <soap:Fault>
      <soap:Code>
        <soap:Value>{}</soap:Value>
      </soap:Code>
      <soap:Reason>
        <soap:Text xml:lang="en">{}</soap:Text>
      </soap:Reason>
      <soap:Detail>
        <zentinel:fault xmlns:zentinel="urn:zentinel:soap:binding" code="{}"/>
      </soap:Detail>
    </soap:Fault>
  </soap:Body>
</soap:Envelope>"#,
        code_value,
        xml_escape(&fault.message),
        fault.code.as_str()
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_code_as_str() {
        assert_eq!(FaultCode::ComplexTypeViolation.as_str(), "SOAP_ERROR_COMPLEX_TYPE");
        assert_eq!(FaultCode::Server.as_str(), "SERVER");
    }

    #[test]
    fn test_complex_type_violation_message() {
        let err = BindError::complex_type_violation("foo", "bar");
        assert!(err.is_fault());
        let fault = err.to_fault();
        assert_eq!(fault.code, FaultCode::ComplexTypeViolation);
        assert_eq!(fault.message, "\"Foo:bar\" cannot be null.");
    }

    #[test]
    fn test_local_errors_hide_details() {
        let err = BindError::null_field("Foo", "bar");
        assert!(!err.is_fault());
        assert_eq!(err.to_string(), "Invalid argument: \"Foo::bar\" cannot be null.");

        let fault = err.to_fault();
        assert_eq!(fault.code, FaultCode::Server);
        assert!(!fault.message.contains("Foo"));
    }

    #[test]
    fn test_soap_11_fault() {
        let fault = BindError::complex_type_violation("Foo", "bar").to_fault();
        let xml = soap_fault_response(&fault, Some(SoapVersion::Soap11));
        assert!(xml.contains("http://schemas.xmlsoap.org/soap/envelope/"));
        assert!(xml.contains("soap:Client"));
        assert!(xml.contains("&quot;Foo:bar&quot; cannot be null."));
        assert!(xml.contains("SOAP_ERROR_COMPLEX_TYPE"));
    }

    #[test]
    fn test_soap_12_fault() {
        let fault = SoapFault::new(FaultCode::Server, "Internal server error");
        let xml = soap_fault_response(&fault, Some(SoapVersion::Soap12));
        assert!(xml.contains("http://www.w3.org/2003/05/soap-envelope"));
        assert!(xml.contains("soap:Receiver"));
    }

    #[test]
    fn test_default_fault_version_is_soap_11() {
        let fault = SoapFault::new(FaultCode::Client, "bad <input>");
        let xml = soap_fault_response(&fault, None);
        assert!(xml.contains("<faultcode>soap:Client</faultcode>"));
        assert!(xml.contains("bad &lt;input&gt;"));
    }
}
