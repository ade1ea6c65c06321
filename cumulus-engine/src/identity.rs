//! Composite resource identities.
//!
//! Some resources are addressed by several remote keys joined with a
//! delimiter, e.g. `TASK_SET_ID,SERVICE,CLUSTER`.

use serde::Serialize;
use thiserror::Error;

/// Identity parse or format failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("unexpected format of ID ({id:?}), expected {expected}")]
    Malformed { id: String, expected: String },

    #[error("ID part {field} must not be empty")]
    EmptyPart { field: &'static str },

    #[error("ID part {field} ({value:?}) must not contain '{delimiter}'")]
    DelimiterInPart {
        field: &'static str,
        value: String,
        delimiter: char,
    },

    #[error("expected {expected} ID parts, got {actual}")]
    WrongPartCount { expected: usize, actual: usize },
}

/// Layout of a composite identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdentityFormat {
    delimiter: char,
    fields: &'static [&'static str],
}

impl IdentityFormat {
    pub const fn new(delimiter: char, fields: &'static [&'static str]) -> Self {
        Self { delimiter, fields }
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    fn expected(&self) -> String {
        self.fields.join(self.delimiter.to_string().as_str())
    }

    pub fn format(&self, parts: &[&str]) -> Result<String, IdentityError> {
        if parts.len() != self.fields.len() {
            return Err(IdentityError::WrongPartCount {
                expected: self.fields.len(),
                actual: parts.len(),
            });
        }
        for (&field, part) in self.fields.iter().zip(parts) {
            if part.is_empty() {
                return Err(IdentityError::EmptyPart { field });
            }
            if part.contains(self.delimiter) {
                return Err(IdentityError::DelimiterInPart {
                    field,
                    value: part.to_string(),
                    delimiter: self.delimiter,
                });
            }
        }
        Ok(parts.join(self.delimiter.to_string().as_str()))
    }

    pub fn parse(&self, id: &str) -> Result<Vec<String>, IdentityError> {
        let parts: Vec<&str> = id.split(self.delimiter).collect();
        if parts.len() != self.fields.len() || parts.iter().any(|p| p.is_empty()) {
            return Err(IdentityError::Malformed {
                id: id.to_string(),
                expected: self.expected(),
            });
        }
        Ok(parts.into_iter().map(str::to_string).collect())
    }

    /// Parse into a fixed-size array, e.g. `let [a, b, c] = FORMAT.parse_parts(id)?;`
    pub fn parse_parts<const N: usize>(&self, id: &str) -> Result<[String; N], IdentityError> {
        let parts = self.parse(id)?;
        let actual = parts.len();
        parts
            .try_into()
            .map_err(|_| IdentityError::WrongPartCount {
                expected: N,
                actual,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASK_SET: IdentityFormat =
        IdentityFormat::new(',', &["TASK_SET_ID", "SERVICE", "CLUSTER"]);

    #[test]
    fn test_round_trip() {
        let cases = [
            ["ecs-svc/123", "web", "prod"],
            ["a", "b", "c"],
            ["id with spaces", "svc:1", "arn:aws:ecs:us-east-1:1:cluster/x"],
        ];
        for parts in cases {
            let id = TASK_SET.format(&parts).unwrap();
            let parsed: [String; 3] = TASK_SET.parse_parts(&id).unwrap();
            assert_eq!(parsed, parts.map(str::to_string));
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "a,b", "a,b,c,d", "a,,c", ",b,c", "a,b,"] {
            let err = TASK_SET.parse(bad).unwrap_err();
            assert!(
                matches!(err, IdentityError::Malformed { .. }),
                "expected malformed for {:?}, got {:?}",
                bad,
                err
            );
        }
        assert_eq!(
            TASK_SET.parse("a,b").unwrap_err().to_string(),
            "unexpected format of ID (\"a,b\"), expected TASK_SET_ID,SERVICE,CLUSTER"
        );
    }

    #[test]
    fn test_format_rejects_bad_parts() {
        assert!(matches!(
            TASK_SET.format(&["a", "", "c"]),
            Err(IdentityError::EmptyPart { field: "SERVICE" })
        ));
        assert!(matches!(
            TASK_SET.format(&["a", "b,x", "c"]),
            Err(IdentityError::DelimiterInPart { .. })
        ));
        assert!(matches!(
            TASK_SET.format(&["a", "b"]),
            Err(IdentityError::WrongPartCount {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_parse_parts_wrong_arity() {
        assert!(matches!(
            TASK_SET.parse_parts::<2>("a,b,c"),
            Err(IdentityError::WrongPartCount { .. })
        ));
    }
}
