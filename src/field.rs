//! Field-path annotated validation errors, rendered the same way the Kubernetes API machinery
//! renders them (e.g. `networking.machineNetwork[0]: Invalid value: "10.0.0.1/16": ...`), so
//! messages look familiar to anyone who has used an OpenShift installer before.

use itertools::Itertools;
use serde_json::Value;
use std::fmt::Display;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct Path(Vec<PathElement>);

#[derive(Clone, Debug, PartialEq, Eq)]
enum PathElement {
    Child(String),
    Index(usize),
    Key(String),
}

impl Path {
    pub(crate) fn new(name: &str) -> Self {
        Self(vec![PathElement::Child(name.to_string())])
    }

    pub(crate) fn child(&self, name: &str) -> Self {
        let mut path = self.clone();
        path.0.push(PathElement::Child(name.to_string()));
        path
    }

    pub(crate) fn index(&self, index: usize) -> Self {
        let mut path = self.clone();
        path.0.push(PathElement::Index(index));
        path
    }

    pub(crate) fn key(&self, key: &str) -> Self {
        let mut path = self.clone();
        path.0.push(PathElement::Key(key.to_string()));
        path
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            match element {
                PathElement::Child(name) if i == 0 => write!(f, "{}", name)?,
                PathElement::Child(name) => write!(f, ".{}", name)?,
                PathElement::Index(index) => write!(f, "[{}]", index)?,
                PathElement::Key(key) => write!(f, "[{}]", key)?,
            }
        }

        Ok(())
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{:?}", s),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_supported(supported: &[String]) -> String {
    supported.iter().map(|s| format!("{:?}", s)).join(", ")
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub(crate) enum ErrorKind {
    #[error("Required value: {0}")]
    Required(String),
    #[error("Invalid value: {}: {detail}", render_value(.value))]
    Invalid { value: Value, detail: String },
    #[error("Unsupported value: {}: supported values: {}", render_value(.value), render_supported(.supported))]
    NotSupported { value: Value, supported: Vec<String> },
    #[error("Duplicate value: {}", render_value(.0))]
    Duplicate(Value),
    #[error("Too many: {actual}: must have at most {max} items")]
    TooMany { actual: usize, max: usize },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{path}: {kind}")]
pub(crate) struct Error {
    pub(crate) path: Path,
    pub(crate) kind: ErrorKind,
}

impl Error {
    pub(crate) fn required(path: Path, detail: impl Into<String>) -> Self {
        Self {
            path,
            kind: ErrorKind::Required(detail.into()),
        }
    }

    pub(crate) fn invalid(path: Path, value: impl Into<Value>, detail: impl Into<String>) -> Self {
        Self {
            path,
            kind: ErrorKind::Invalid {
                value: value.into(),
                detail: detail.into(),
            },
        }
    }

    pub(crate) fn not_supported<S: AsRef<str>>(path: Path, value: impl Into<Value>, supported: &[S]) -> Self {
        Self {
            path,
            kind: ErrorKind::NotSupported {
                value: value.into(),
                supported: supported.iter().map(|s| s.as_ref().to_string()).collect(),
            },
        }
    }

    pub(crate) fn duplicate(path: Path, value: impl Into<Value>) -> Self {
        Self {
            path,
            kind: ErrorKind::Duplicate(value.into()),
        }
    }

    pub(crate) fn too_many(path: Path, actual: usize, max: usize) -> Self {
        Self {
            path,
            kind: ErrorKind::TooMany { actual, max },
        }
    }

    pub(crate) fn forbidden(path: Path, detail: impl Into<String>) -> Self {
        Self {
            path,
            kind: ErrorKind::Forbidden(detail.into()),
        }
    }

    pub(crate) fn internal(path: Path, detail: impl Into<String>) -> Self {
        Self {
            path,
            kind: ErrorKind::Internal(detail.into()),
        }
    }
}

/// An aggregate of validation errors. Validators return one of these rather than failing fast so
/// the user gets to see every problem with their install-config at once.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct ErrorList(pub(crate) Vec<Error>);

impl ErrorList {
    pub(crate) fn new() -> Self {
        Self(vec![])
    }

    pub(crate) fn push(&mut self, error: Error) {
        self.0.push(error);
    }

    pub(crate) fn extend(&mut self, other: ErrorList) {
        self.0.extend(other.0);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }

    pub(crate) fn into_result(self) -> anyhow::Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(anyhow::Error::new(self))
        }
    }
}

impl From<Vec<Error>> for ErrorList {
    fn from(errors: Vec<Error>) -> Self {
        Self(errors)
    }
}

impl FromIterator<Error> for ErrorList {
    fn from_iter<T: IntoIterator<Item = Error>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Display for ErrorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [single] => write!(f, "{}", single),
            many => write!(f, "[{}]", many.iter().join(", ")),
        }
    }
}

impl std::error::Error for ErrorList {}
