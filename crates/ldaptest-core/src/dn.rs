//! Distinguished name utilities and bind DN templates.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Substitution marker a bind DN template must contain exactly once.
pub const TEMPLATE_MARKER: &str = "%s";

// Stand-in value used to check the template shape without a real username.
const PROBE_VALUE: &str = "ldaptest-template-probe";

/// Errors that can occur when parsing distinguished names or bind DN templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
    /// The template does not contain exactly one substitution marker.
    #[error("template must contain exactly one `%s` marker, found {0}")]
    MarkerCount(usize),
    /// The substitution marker is not inside an attribute value.
    #[error("`%s` marker must appear inside an attribute value")]
    MarkerPosition,
    /// Substituting the username changed the structure of the distinguished name.
    #[error("resolved distinguished name does not match the template structure")]
    StructureMismatch,
}

/// Relative distinguished name (single attribute/value pair).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Attribute portion of the RDN (e.g. `uid`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Attribute value portion of the RDN, unescaped.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if this RDN matches the provided attribute name (case-insensitive).
    #[must_use]
    pub fn matches_attribute(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

/// Strongly-typed distinguished name wrapper.
///
/// Keeps the original string alongside the parsed relative distinguished names. Parsing is
/// strict so malformed DNs surface before they reach the directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the distinguished name is empty or contains invalid
    /// syntax.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut rdns = Vec::new();
        for component in split_escaped(raw, ',')? {
            let mut rdn_components = Vec::new();
            for part in split_escaped(&component, '+')? {
                let (attribute, value) = split_attribute_value(&part)?;
                rdn_components.push(RelativeDistinguishedName { attribute, value });
            }
            rdns.push(rdn_components);
        }

        Ok(Self {
            raw: raw.to_string(),
            rdns,
        })
    }

    /// Borrows the distinguished name string as it will be sent to the directory.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the RDN sets in order (each set represents a `+`-joined group).
    #[must_use]
    pub fn rdns(&self) -> &[Vec<RelativeDistinguishedName>] {
        &self.rdns
    }

    /// Returns an iterator over all relative distinguished names in order.
    pub fn components(&self) -> impl Iterator<Item = &RelativeDistinguishedName> + '_ {
        self.rdns.iter().flat_map(|rdn| rdn.iter())
    }

    /// Looks up the value for the first attribute that matches `attribute` (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components()
            .find(|rdn| rdn.matches_attribute(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Attribute names per RDN, lowercased. Two DNs with the same shape differ only in values.
    fn shape(&self) -> Vec<Vec<String>> {
        self.rdns
            .iter()
            .map(|rdn| {
                rdn.iter()
                    .map(|component| component.attribute.to_ascii_lowercase())
                    .collect()
            })
            .collect()
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Bind DN template with a single `%s` substitution point for the username.
///
/// The username is escaped as an RFC 4514 attribute value before substitution, so it is always
/// treated as opaque data and can never add, remove or rename RDN components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindDnTemplate {
    raw: String,
    shape: Vec<Vec<String>>,
}

impl BindDnTemplate {
    /// Parses and validates a bind DN template.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError::MarkerCount`] unless the marker occurs exactly once,
    /// [`DistinguishedNameError::MarkerPosition`] when the marker is not inside a value, or a
    /// parse error when the template is not a distinguished name.
    pub fn parse(template: impl Into<String>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = template.into();
        let markers = raw.matches(TEMPLATE_MARKER).count();
        if markers != 1 {
            return Err(DistinguishedNameError::MarkerCount(markers));
        }

        let probe = DistinguishedName::parse(raw.replacen(TEMPLATE_MARKER, PROBE_VALUE, 1))?;
        let in_value = probe.components().any(|rdn| rdn.value.contains(PROBE_VALUE));
        let in_attribute = probe
            .components()
            .any(|rdn| rdn.attribute.contains(PROBE_VALUE));
        if !in_value || in_attribute {
            return Err(DistinguishedNameError::MarkerPosition);
        }

        Ok(Self {
            shape: probe.shape(),
            raw,
        })
    }

    /// Borrows the template string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Substitutes `username` into the template.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolved DN does not parse or its structure differs from the
    /// template.
    pub fn resolve(&self, username: &str) -> std::result::Result<DistinguishedName, DistinguishedNameError> {
        let resolved = self
            .raw
            .replacen(TEMPLATE_MARKER, &escape_value(username), 1);
        let dn = DistinguishedName::parse(resolved)?;

        if dn.shape() != self.shape {
            return Err(DistinguishedNameError::StructureMismatch);
        }
        Ok(dn)
    }
}

impl fmt::Display for BindDnTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for BindDnTemplate {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Escapes a string for use as an RFC 4514 attribute value.
#[must_use]
pub fn escape_value(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = value.chars().collect();
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in chars.iter().enumerate() {
        let is_first = idx == 0;
        let is_last = idx == chars.len() - 1;

        if *ch == '\0' {
            escaped.push_str("\\00");
            continue;
        }

        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (is_first && (*ch == ' ' || *ch == '#'))
            || (is_last && *ch == ' ');

        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(*ch);
    }

    escaped
}

// Splits on unescaped `delimiter`, keeping escape sequences intact for later unescaping.
fn split_escaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push(ch);
            escape = false;
            continue;
        }

        if ch == '\\' {
            current.push(ch);
            escape = true;
            continue;
        }

        if ch == delimiter {
            parts.push(std::mem::take(&mut current));
            continue;
        }

        current.push(ch);
    }

    if escape {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }

    parts.push(current);
    if parts.iter().any(|part| part.trim().is_empty()) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn split_attribute_value(
    component: &str,
) -> std::result::Result<(String, String), DistinguishedNameError> {
    let mut escape = false;
    let mut index = None;

    for (i, ch) in component.char_indices() {
        if escape {
            escape = false;
            continue;
        }

        if ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '=' {
            index = Some(i);
            break;
        }
    }

    let idx =
        index.ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;
    let attribute = component[..idx].trim();
    let value_part = trim_unescaped_end(component[idx + 1..].trim_start());

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.to_string(),
        ));
    }

    if attribute.contains('\\') {
        return Err(DistinguishedNameError::InvalidComponent(
            component.to_string(),
        ));
    }

    if value_part.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok((attribute.to_string(), unescape(value_part)?))
}

// Trailing whitespace is insignificant unless the last space is escaped.
fn trim_unescaped_end(value: &str) -> &str {
    let mut end = value.len();
    while end > 0 && value.as_bytes()[end - 1] == b' ' {
        let backslashes = value.as_bytes()[..end - 1]
            .iter()
            .rev()
            .take_while(|b| **b == b'\\')
            .count();
        if backslashes % 2 == 1 {
            break;
        }
        end -= 1;
    }
    &value[..end]
}

fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }

        let next = chars
            .next()
            .ok_or(DistinguishedNameError::UnterminatedEscape)?;
        let hex_pair = next
            .to_digit(16)
            .zip(chars.peek().and_then(|c| c.to_digit(16)));

        match hex_pair {
            Some((high, low)) => {
                chars.next();
                // Both digits are below 16, so the pair always fits in a byte.
                bytes.push(u8::try_from(high * 16 + low).unwrap_or_default());
            }
            None => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    String::from_utf8(bytes)
        .map_err(|_| DistinguishedNameError::InvalidComponent(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "uid=%s,ou=people,dc=example,dc=org";

    #[test]
    fn parse_simple_dn() {
        let dn = DistinguishedName::parse("cn=John Doe,ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("John Doe"));
        assert_eq!(dn.get("ou"), Some("People"));
        assert_eq!(dn.to_string(), "cn=John Doe,ou=People,dc=example,dc=com");
    }

    #[test]
    fn parse_dn_with_escape() {
        let dn = DistinguishedName::parse("cn=Smith\\, John,ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("Smith, John"));
        assert_eq!(dn.rdns().len(), 4);
    }

    #[test]
    fn parse_dn_with_hex_escape() {
        let dn = DistinguishedName::parse("cn=a\\00b,dc=example").unwrap();
        assert_eq!(dn.get("cn"), Some("a\0b"));
    }

    #[test]
    fn parse_multi_valued_rdn() {
        let dn = DistinguishedName::parse("cn=John+uid=1234,ou=People,dc=example,dc=com").unwrap();
        assert_eq!(dn.rdns()[0].len(), 2);
        assert_eq!(dn.get("uid"), Some("1234"));
    }

    #[test]
    fn invalid_trailing_delimiter() {
        let err = DistinguishedName::parse("cn=John,").unwrap_err();
        assert!(matches!(err, DistinguishedNameError::InvalidComponent(_)));
    }

    #[test]
    fn escaped_trailing_space_is_kept() {
        let dn = DistinguishedName::parse("cn=padded\\ ,dc=example").unwrap();
        assert_eq!(dn.get("cn"), Some("padded "));
    }

    #[test]
    fn template_requires_single_marker() {
        assert_eq!(
            BindDnTemplate::parse("uid=alice,dc=example,dc=org").unwrap_err(),
            DistinguishedNameError::MarkerCount(0)
        );
        assert_eq!(
            BindDnTemplate::parse("uid=%s,cn=%s,dc=example").unwrap_err(),
            DistinguishedNameError::MarkerCount(2)
        );
    }

    #[test]
    fn template_marker_must_be_a_value() {
        assert_eq!(
            BindDnTemplate::parse("%s=alice,dc=example").unwrap_err(),
            DistinguishedNameError::MarkerPosition
        );
    }

    #[test]
    fn template_must_be_a_dn() {
        assert!(BindDnTemplate::parse("%s").is_err());
        assert!(BindDnTemplate::parse("uid=%s,,dc=example").is_err());
    }

    #[test]
    fn resolve_plain_username() {
        let template = BindDnTemplate::parse(TEMPLATE).unwrap();
        let dn = template.resolve("alice").unwrap();
        assert_eq!(dn.as_str(), "uid=alice,ou=people,dc=example,dc=org");
    }

    #[test]
    fn resolve_treats_username_as_opaque() {
        let template = BindDnTemplate::parse(TEMPLATE).unwrap();
        for username in [
            "alice,ou=admins",
            "alice+cn=root",
            "uid=root",
            "back\\slash",
            "#hash",
            " leading",
            "trailing ",
            "quote\"d",
            "nul\0byte",
            "semi;colon<>",
        ] {
            let dn = template.resolve(username).unwrap();
            assert_eq!(dn.rdns().len(), 4, "{username:?}");
            assert_eq!(dn.rdns()[0].len(), 1, "{username:?}");
            assert_eq!(dn.get("uid"), Some(username));
            assert_eq!(dn.get("ou"), Some("people"));
        }
    }

    #[test]
    fn escape_value_rules() {
        assert_eq!(escape_value("a,b"), "a\\,b");
        assert_eq!(escape_value("#x"), "\\#x");
        assert_eq!(escape_value(" x "), "\\ x\\ ");
        assert_eq!(escape_value("a\0"), "a\\00");
        assert_eq!(escape_value(""), "");
    }
}
