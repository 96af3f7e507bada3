use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const CONSTRUCTOR_BINDING: &str = "$new";
const INSTANCE_PREFIX: &str = "$instance$";
const STATIC_GET_PREFIX: &str = "$static$get$";
const STATIC_SET_PREFIX: &str = "$static$set$";
const INSTANCE_GET_PREFIX: &str = "$instance$get$";
const INSTANCE_SET_PREFIX: &str = "$instance$set$";

/// How a call target binds to its owner class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingKind {
    Static,
    Constructor,
    Instance,
    StaticGet,
    StaticSet,
    InstanceGet,
    InstanceSet,
}

impl BindingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BindingKind::Static => "static",
            BindingKind::Constructor => "constructor",
            BindingKind::Instance => "instance",
            BindingKind::StaticGet => "static-get",
            BindingKind::StaticSet => "static-set",
            BindingKind::InstanceGet => "instance-get",
            BindingKind::InstanceSet => "instance-set",
        }
    }

    pub fn is_static(self) -> bool {
        matches!(
            self,
            BindingKind::Static | BindingKind::StaticGet | BindingKind::StaticSet
        )
    }

    pub fn needs_receiver(self) -> bool {
        matches!(
            self,
            BindingKind::Instance | BindingKind::InstanceGet | BindingKind::InstanceSet
        )
    }

    pub fn is_field(self) -> bool {
        matches!(
            self,
            BindingKind::StaticGet
                | BindingKind::StaticSet
                | BindingKind::InstanceGet
                | BindingKind::InstanceSet
        )
    }

    /// Fixed argument count of field bindings.
    pub fn field_arity(self) -> Option<usize> {
        match self {
            BindingKind::StaticGet | BindingKind::InstanceGet => Some(0),
            BindingKind::StaticSet | BindingKind::InstanceSet => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetParseError {
    #[error("interop target `{0}` must have the form `owner#binding`")]
    MissingSeparator(String),
    #[error("interop target `{0}` has an empty owner class")]
    EmptyOwner(String),
    #[error("interop target `{0}` has an empty member name")]
    EmptyMember(String),
    #[error("interop target `{target}` uses unsupported binding `{binding}`")]
    UnsupportedBinding { target: String, binding: String },
}

impl TargetParseError {
    pub fn target(&self) -> &str {
        match self {
            TargetParseError::MissingSeparator(target)
            | TargetParseError::EmptyOwner(target)
            | TargetParseError::EmptyMember(target) => target,
            TargetParseError::UnsupportedBinding { target, .. } => target,
        }
    }
}

/// A named interop call site, `owner#binding`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallTarget {
    owner: String,
    member: String,
    kind: BindingKind,
}

impl CallTarget {
    pub fn new(owner: impl Into<String>, member: impl Into<String>, kind: BindingKind) -> Self {
        let member = match kind {
            BindingKind::Constructor => "<init>".to_string(),
            _ => member.into(),
        };
        Self {
            owner: owner.into(),
            member,
            kind,
        }
    }

    pub fn static_method(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(owner, name, BindingKind::Static)
    }

    pub fn constructor(owner: impl Into<String>) -> Self {
        Self::new(owner, "<init>", BindingKind::Constructor)
    }

    pub fn instance_method(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(owner, name, BindingKind::Instance)
    }

    pub fn parse(raw: &str) -> Result<Self, TargetParseError> {
        let trimmed = raw.trim();
        let Some((owner, binding)) = trimmed.split_once('#') else {
            return Err(TargetParseError::MissingSeparator(trimmed.to_string()));
        };
        let owner = owner.trim().replace('/', ".");
        if owner.is_empty() {
            return Err(TargetParseError::EmptyOwner(trimmed.to_string()));
        }
        let binding = binding.trim();
        if binding == CONSTRUCTOR_BINDING {
            return Ok(Self::constructor(owner));
        }

        // Longest prefixes first: `$instance$get$` also starts with `$instance$`.
        let prefixes = [
            (INSTANCE_GET_PREFIX, BindingKind::InstanceGet),
            (INSTANCE_SET_PREFIX, BindingKind::InstanceSet),
            (STATIC_GET_PREFIX, BindingKind::StaticGet),
            (STATIC_SET_PREFIX, BindingKind::StaticSet),
            (INSTANCE_PREFIX, BindingKind::Instance),
        ];
        let (member, kind) = prefixes
            .iter()
            .find_map(|(prefix, kind)| binding.strip_prefix(prefix).map(|rest| (rest, *kind)))
            .unwrap_or((binding, BindingKind::Static));

        if member.is_empty() {
            return Err(TargetParseError::EmptyMember(trimmed.to_string()));
        }
        if (kind == BindingKind::Static && member.starts_with('$')) || member.contains('#') {
            return Err(TargetParseError::UnsupportedBinding {
                target: trimmed.to_string(),
                binding: binding.to_string(),
            });
        }
        Ok(Self::new(owner, member, kind))
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Member name; `<init>` for constructors.
    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn kind(&self) -> BindingKind {
        self.kind
    }

    /// Binding half of the textual form.
    pub fn binding(&self) -> String {
        match self.kind {
            BindingKind::Static => self.member.clone(),
            BindingKind::Constructor => CONSTRUCTOR_BINDING.to_string(),
            BindingKind::Instance => format!("{INSTANCE_PREFIX}{}", self.member),
            BindingKind::StaticGet => format!("{STATIC_GET_PREFIX}{}", self.member),
            BindingKind::StaticSet => format!("{STATIC_SET_PREFIX}{}", self.member),
            BindingKind::InstanceGet => format!("{INSTANCE_GET_PREFIX}{}", self.member),
            BindingKind::InstanceSet => format!("{INSTANCE_SET_PREFIX}{}", self.member),
        }
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.owner, self.binding())
    }
}

impl FromStr for CallTarget {
    type Err = TargetParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw)
    }
}
