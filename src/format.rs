//! Feature-string encodings.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Wire encoding for a feature string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Values joined with single spaces, no escaping
    #[default]
    Raw,
    /// `"a" "b"`
    Quoted,
    /// `"a","b",`
    Csv,
    /// `["a","b"]`
    JsonArray,
    /// `{"1":"a","2":"b"}`
    JsonObject,
    /// `{"name":"a","other":"b"}`
    JsonFields,
}

impl OutputFormat {
    /// Returns the canonical configuration keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            OutputFormat::Raw => "raw",
            OutputFormat::Quoted => "quoted",
            OutputFormat::Csv => "csv",
            OutputFormat::JsonArray => "jsonarray",
            OutputFormat::JsonObject => "json",
            OutputFormat::JsonFields => "jsonfields",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(OutputFormat::Raw),
            "quoted" => Ok(OutputFormat::Quoted),
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::JsonObject),
            "jsonarray" => Ok(OutputFormat::JsonArray),
            "jsonfields" => Ok(OutputFormat::JsonFields),
            _ => Err(ConfigError::UnknownOutputFormat(s.to_string())),
        }
    }
}

/// Escapes backslashes and double quotes for the quoted encodings.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Renders `(name, value)` pairs in order.
///
/// Absent values render as empty strings. Positional JSON keys start at 1.
///
/// # Examples
///
/// ```
/// use classify_relay::format::{format_features, OutputFormat};
///
/// let fields = [("ua", Some("curl/8.0")), ("lang", None)];
///
/// assert_eq!(format_features(fields, OutputFormat::Raw), "curl/8.0 ");
/// assert_eq!(format_features(fields, OutputFormat::Csv), r#""curl/8.0","","#);
/// assert_eq!(format_features(fields, OutputFormat::JsonObject), r#"{"1":"curl/8.0","2":""}"#);
/// assert_eq!(format_features(fields, OutputFormat::JsonFields), r#"{"ua":"curl/8.0","lang":""}"#);
/// ```
pub fn format_features<'a, I>(fields: I, format: OutputFormat) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut out = String::new();
    let mut position = 0usize;

    match format {
        OutputFormat::JsonArray => out.push('['),
        OutputFormat::JsonObject | OutputFormat::JsonFields => out.push('{'),
        _ => {}
    }

    for (name, value) in fields {
        position += 1;
        let value = value.unwrap_or_default();
        if position > 1 {
            match format {
                OutputFormat::Raw | OutputFormat::Quoted => out.push(' '),
                OutputFormat::JsonArray | OutputFormat::JsonObject | OutputFormat::JsonFields => {
                    out.push(',')
                }
                OutputFormat::Csv => {}
            }
        }
        match format {
            OutputFormat::Raw => out.push_str(value),
            OutputFormat::Quoted | OutputFormat::JsonArray => {
                out.push('"');
                out.push_str(&escape(value));
                out.push('"');
            }
            OutputFormat::Csv => {
                out.push('"');
                out.push_str(&escape(value));
                out.push_str("\",");
            }
            OutputFormat::JsonObject => {
                out.push_str(&format!("\"{}\":\"{}\"", position, escape(value)));
            }
            OutputFormat::JsonFields => {
                out.push_str(&format!("\"{}\":\"{}\"", escape(name), escape(value)));
            }
        }
    }

    match format {
        OutputFormat::JsonArray => out.push(']'),
        OutputFormat::JsonObject | OutputFormat::JsonFields => out.push('}'),
        _ => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(values: &[(&str, Option<&str>)], format: OutputFormat) -> String {
        format_features(values.iter().copied(), format)
    }

    #[test]
    fn keywords() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::JsonObject));
        assert_eq!("jsonArray".parse::<OutputFormat>(), Ok(OutputFormat::JsonArray));
        assert_eq!("csv".parse::<OutputFormat>(), Ok(OutputFormat::Csv));
        assert_eq!(
            "xml".parse::<OutputFormat>(),
            Err(ConfigError::UnknownOutputFormat("xml".to_string()))
        );
        assert_eq!(OutputFormat::default(), OutputFormat::Raw);
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(render(&[], OutputFormat::Raw), "");
        assert_eq!(render(&[], OutputFormat::Quoted), "");
        assert_eq!(render(&[], OutputFormat::Csv), "");
        assert_eq!(render(&[], OutputFormat::JsonArray), "[]");
        assert_eq!(render(&[], OutputFormat::JsonObject), "{}");
        assert_eq!(render(&[], OutputFormat::JsonFields), "{}");
    }

    #[test]
    fn two_values() {
        let values = [("a", Some("x")), ("b", Some("y z"))];
        assert_eq!(render(&values, OutputFormat::Raw), "x y z");
        assert_eq!(render(&values, OutputFormat::Quoted), r#""x" "y z""#);
        assert_eq!(render(&values, OutputFormat::Csv), r#""x","y z","#);
        assert_eq!(render(&values, OutputFormat::JsonArray), r#"["x","y z"]"#);
        assert_eq!(render(&values, OutputFormat::JsonObject), r#"{"1":"x","2":"y z"}"#);
        assert_eq!(render(&values, OutputFormat::JsonFields), r#"{"a":"x","b":"y z"}"#);
    }

    #[test]
    fn quotes_are_escaped() {
        let values = [("say \"hi\"", Some(r#"he said "no""#))];
        assert_eq!(render(&values, OutputFormat::Raw), r#"he said "no""#);
        assert_eq!(render(&values, OutputFormat::Quoted), r#""he said \"no\"""#);
        assert_eq!(
            render(&values, OutputFormat::JsonFields),
            r#"{"say \"hi\"":"he said \"no\""}"#
        );
    }

    #[test]
    fn backslashes_are_escaped() {
        assert_eq!(escape(r"C:\tmp"), r"C:\\tmp");
        assert_eq!(render(&[("p", Some(r"a\"))], OutputFormat::JsonArray), r#"["a\\"]"#);
    }

    #[test]
    fn absent_values_are_empty() {
        let values = [("a", None), ("b", Some("1"))];
        assert_eq!(render(&values, OutputFormat::Raw), " 1");
        assert_eq!(render(&values, OutputFormat::JsonArray), r#"["","1"]"#);
    }
}
