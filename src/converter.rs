//! Primitive type converters.
//!
//! A converter turns the XML form of a simple type into a domain value and
//! back. Converters are registered on the type repository and applied by
//! the message binders to primitives of the matching XML type.

use crate::error::BindError;
use crate::value::DomainValue;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fmt;
use std::sync::Arc;

/// XML Schema namespace.
pub const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Converts a simple XML type to and from the domain model.
pub trait TypeConverter: Send + Sync {
    /// Namespace of the XML type.
    fn type_namespace(&self) -> &str;

    /// Local name of the XML type.
    fn type_name(&self) -> &str;

    /// Parse an XML fragment (or its bare text content).
    fn convert_xml_to_domain(&self, xml: &str) -> Result<DomainValue, BindError>;

    /// Render a value as an XML fragment.
    fn convert_domain_to_xml(&self, value: &DomainValue) -> Result<String, BindError>;
}

/// Registered converters, looked up by XML type name.
#[derive(Clone, Default)]
pub struct TypeConverterCollection {
    converters: Vec<Arc<dyn TypeConverter>>,
}

impl TypeConverterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a converter. A later converter for the same type replaces the
    /// earlier one.
    pub fn add(&mut self, converter: Arc<dyn TypeConverter>) {
        self.converters
            .retain(|existing| existing.type_name() != converter.type_name());
        self.converters.push(converter);
    }

    pub fn all(&self) -> &[Arc<dyn TypeConverter>] {
        &self.converters
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn TypeConverter> {
        self.converters
            .iter()
            .find(|converter| converter.type_name() == type_name)
            .map(|converter| converter.as_ref())
    }

    /// `(namespace, name)` of every converted type.
    pub fn typemap(&self) -> Vec<(String, String)> {
        self.converters
            .iter()
            .map(|c| (c.type_namespace().to_string(), c.type_name().to_string()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl fmt::Debug for TypeConverterCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.converters.iter().map(|c| c.type_name()))
            .finish()
    }
}

/// `xsd:date`
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTypeConverter;

impl TypeConverter for DateTypeConverter {
    fn type_namespace(&self) -> &str {
        XSD_NS
    }

    fn type_name(&self) -> &str {
        "date"
    }

    fn convert_xml_to_domain(&self, xml: &str) -> Result<DomainValue, BindError> {
        let text = text_content(self.type_name(), xml)?;
        if text.is_empty() {
            return Ok(DomainValue::Null);
        }
        parse_date(self.type_name(), &text).map(DomainValue::Date)
    }

    fn convert_domain_to_xml(&self, value: &DomainValue) -> Result<String, BindError> {
        let date = match value {
            DomainValue::Date(date) => *date,
            DomainValue::DateTime(dt) => dt.date_naive(),
            DomainValue::String(s) => parse_date(self.type_name(), s)?,
            other => return Err(unsupported(self.type_name(), other)),
        };
        Ok(format!("<{0}>{1}</{0}>", self.type_name(), date.format("%Y-%m-%d")))
    }
}

/// `xsd:dateTime`
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeTypeConverter;

impl TypeConverter for DateTimeTypeConverter {
    fn type_namespace(&self) -> &str {
        XSD_NS
    }

    fn type_name(&self) -> &str {
        "dateTime"
    }

    fn convert_xml_to_domain(&self, xml: &str) -> Result<DomainValue, BindError> {
        let text = text_content(self.type_name(), xml)?;
        if text.is_empty() {
            return Ok(DomainValue::Null);
        }
        parse_date_time(self.type_name(), &text).map(DomainValue::DateTime)
    }

    fn convert_domain_to_xml(&self, value: &DomainValue) -> Result<String, BindError> {
        let dt = match value {
            DomainValue::DateTime(dt) => *dt,
            DomainValue::String(s) => parse_date_time(self.type_name(), s)?,
            other => return Err(unsupported(self.type_name(), other)),
        };
        Ok(format!("<{0}>{1}</{0}>", self.type_name(), dt.to_rfc3339()))
    }
}

fn unsupported(type_name: &str, value: &DomainValue) -> BindError {
    BindError::Conversion {
        type_name: type_name.to_string(),
        message: format!("{} given", value.kind()),
    }
}

fn parse_date(type_name: &str, text: &str) -> Result<NaiveDate, BindError> {
    let invalid = |reason: String| BindError::Conversion {
        type_name: type_name.to_string(),
        message: format!("invalid date \"{}\": {}", text, reason),
    };

    // xsd:date may carry a timezone suffix ("2002-10-10Z", "2002-10-10+02:00")
    let (date, zone) =
        NaiveDate::parse_and_remainder(text, "%Y-%m-%d").map_err(|e| invalid(e.to_string()))?;
    if !is_timezone(zone) {
        return Err(invalid(format!("unexpected trailing \"{}\"", zone)));
    }
    Ok(date)
}

/// Empty, `Z` or a `+hh:mm` / `-hh:mm` offset.
fn is_timezone(zone: &str) -> bool {
    match zone.as_bytes() {
        [] | [b'Z'] => true,
        [b'+' | b'-', h1, h2, b':', m1, m2] => {
            [h1, h2, m1, m2].iter().all(|c| c.is_ascii_digit())
                && (h1 - b'0') * 10 + (h2 - b'0') <= 14
                && (m1 - b'0') * 10 + (m2 - b'0') < 60
        }
        _ => false,
    }
}

fn parse_date_time(type_name: &str, text: &str) -> Result<DateTime<FixedOffset>, BindError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }

    // No timezone: read as UTC
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Utc.fix().from_utc_datetime(&naive))
        .map_err(|e| BindError::Conversion {
            type_name: type_name.to_string(),
            message: format!("invalid dateTime \"{}\": {}", text, e),
        })
}

/// Text content of an XML fragment; bare text is returned trimmed.
fn text_content(type_name: &str, xml: &str) -> Result<String, BindError> {
    if !xml.trim_start().starts_with('<') {
        return Ok(xml.trim().to_string());
    }

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Text(ref e)) => {
                let unescaped = e.unescape().map_err(|e| BindError::Conversion {
                    type_name: type_name.to_string(),
                    message: format!("XML parse error: {}", e),
                })?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(BindError::Conversion {
                    type_name: type_name.to_string(),
                    message: format!("XML parse error: {}", e),
                });
            }
            _ => {}
        }

        buf.clear();
    }

    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_xml_to_domain() {
        let converter = DateTypeConverter;
        let value = converter
            .convert_xml_to_domain("<sometag>2002-10-10</sometag>")
            .unwrap();
        assert_eq!(
            value,
            DomainValue::Date(NaiveDate::from_ymd_opt(2002, 10, 10).unwrap())
        );
    }

    #[test]
    fn test_date_with_timezone_and_bare_text() {
        let converter = DateTypeConverter;
        let expected = DomainValue::Date(NaiveDate::from_ymd_opt(2002, 10, 10).unwrap());
        assert_eq!(converter.convert_xml_to_domain("2002-10-10Z").unwrap(), expected);
        assert_eq!(
            converter.convert_xml_to_domain("<d>2002-10-10+05:00</d>").unwrap(),
            expected
        );
    }

    #[test]
    fn test_date_rejects_trailing_text() {
        let converter = DateTypeConverter;
        for text in [
            "2002-10-10garbage",
            "<d>2002-10-10T10:00:00</d>",
            "2002-10-10+5:00",
            "2002-10-10+25:00",
        ] {
            let err = converter.convert_xml_to_domain(text).unwrap_err();
            assert!(matches!(err, BindError::Conversion { .. }), "{} was accepted", text);
        }
        assert!(converter.convert_xml_to_domain("2002-10-10-03:30").is_ok());
    }

    #[test]
    fn test_date_empty_is_null() {
        let converter = DateTypeConverter;
        assert_eq!(converter.convert_xml_to_domain("<date/>").unwrap(), DomainValue::Null);
        assert_eq!(converter.convert_xml_to_domain("").unwrap(), DomainValue::Null);
    }

    #[test]
    fn test_date_domain_to_xml() {
        let converter = DateTypeConverter;
        let date = DomainValue::Date(NaiveDate::from_ymd_opt(2002, 10, 10).unwrap());
        assert_eq!(
            converter.convert_domain_to_xml(&date).unwrap(),
            "<date>2002-10-10</date>"
        );
        assert!(converter.convert_domain_to_xml(&DomainValue::Int(1)).is_err());
    }

    #[test]
    fn test_date_time_xml_to_domain() {
        let converter = DateTimeTypeConverter;
        let value = converter
            .convert_xml_to_domain("<sometag>2002-10-10T12:00:00-05:00</sometag>")
            .unwrap();
        let expected = DateTime::parse_from_rfc3339("2002-10-10T12:00:00-05:00").unwrap();
        assert_eq!(value, DomainValue::DateTime(expected));
    }

    #[test]
    fn test_date_time_without_timezone_is_utc() {
        let converter = DateTimeTypeConverter;
        let value = converter.convert_xml_to_domain("2002-10-10T12:00:00").unwrap();
        let expected = DateTime::parse_from_rfc3339("2002-10-10T12:00:00+00:00").unwrap();
        assert_eq!(value, DomainValue::DateTime(expected));
    }

    #[test]
    fn test_date_time_domain_to_xml() {
        let converter = DateTimeTypeConverter;
        let dt = DateTime::parse_from_rfc3339("2002-10-10T12:00:00-05:00").unwrap();
        assert_eq!(
            converter
                .convert_domain_to_xml(&DomainValue::DateTime(dt))
                .unwrap(),
            "<dateTime>2002-10-10T12:00:00-05:00</dateTime>"
        );
    }

    #[test]
    fn test_invalid_date_time() {
        let converter = DateTimeTypeConverter;
        let err = converter.convert_xml_to_domain("<d>yesterday</d>").unwrap_err();
        assert!(matches!(err, BindError::Conversion { .. }));
    }

    #[test]
    fn test_collection_lookup_and_replace() {
        let mut collection = TypeConverterCollection::new();
        assert!(collection.is_empty());
        collection.add(Arc::new(DateTypeConverter));
        collection.add(Arc::new(DateTimeTypeConverter));
        collection.add(Arc::new(DateTypeConverter));

        assert_eq!(collection.all().len(), 2);
        assert!(collection.get("date").is_some());
        assert!(collection.get("string").is_none());
        assert!(collection
            .typemap()
            .contains(&(XSD_NS.to_string(), "dateTime".to_string())));
    }
}
