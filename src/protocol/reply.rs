//! The decoded fields of a successful reply.

use crate::error::MalformedResponseError;

/// The named fields of a successful (`C`) reply, in wire order.
///
/// Values are kept as the text the device sent. Use [`Reply::parse`] to
/// convert a field to a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reply {
    command: String,
    raw: String,
    fields: Vec<(String, String)>,
}

impl Reply {
    pub(crate) fn new(command: &str, raw: &str, fields: Vec<(String, String)>) -> Self {
        Reply {
            command: command.to_string(),
            raw: raw.to_string(),
            fields,
        }
    }

    /// The command this reply answered.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// The reply text as received, without framing.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Get the value of a field, if the reply carried it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether the reply carried the field.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Parse the value of a field.
    ///
    /// A missing field or a value that does not parse is a
    /// [`MalformedResponseError`].
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<T, MalformedResponseError> {
        let value = self.get(name).ok_or_else(|| {
            MalformedResponseError::new(&self.command, &self.raw, format!("missing field '{name}'"))
        })?;
        value.parse().map_err(|_| {
            MalformedResponseError::new(
                &self.command,
                &self.raw,
                format!("field '{name}' has unexpected value '{value}'"),
            )
        })
    }

    /// Iterate over the `(name, value)` pairs.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the reply carried no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn reply() -> Reply {
        Reply::new(
            "read_position",
            "C 1 -20",
            vec![
                ("ax_num".to_string(), "1".to_string()),
                ("pos".to_string(), "-20".to_string()),
            ],
        )
    }

    #[test]
    fn get_and_parse() {
        let reply = reply();
        assert_eq!(reply.get("pos"), Some("-20"));
        assert_eq!(reply.parse::<i64>("pos").unwrap(), -20);
        assert_eq!(reply.parse::<u32>("ax_num").unwrap(), 1);
        assert!(reply.contains("ax_num"));
        assert!(!reply.contains("status"));
    }

    #[test]
    fn parse_failures_are_malformed() {
        let reply = reply();
        let err = reply.parse::<i64>("status").unwrap_err();
        assert_eq!(err.command(), "read_position");
        assert_eq!(err.response(), "C 1 -20");
        assert!(reply.parse::<u32>("pos").is_err());
    }

    #[test]
    fn fields_keep_wire_order() {
        let reply = reply();
        let names: Vec<_> = reply.fields().map(|(k, _)| k).collect();
        assert_eq!(names, ["ax_num", "pos"]);
    }
}
