use crate::entry::{EntryOwner, SourceKind};
use crate::types::JavaType;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_VARARGS: u16 = 0x0080;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ENUM: u16 = 0x4000;

/// Where a record was found.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolOrigin {
    pub entry: usize,
    pub owner: EntryOwner,
    pub source_kind: SourceKind,
    pub location: String,
    pub member: String,
    pub module: Option<String>,
    pub package: String,
}

impl fmt::Display for SymbolOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}!/{}",
            self.owner.as_str(),
            self.location,
            self.member
        )
    }
}

/// Multi-release tag. `Base` is the unversioned entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReleaseVariant {
    Base,
    Versioned(u16),
}

impl ReleaseVariant {
    pub fn release(self) -> Option<u16> {
        match self {
            ReleaseVariant::Base => None,
            ReleaseVariant::Versioned(release) => Some(release),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Method,
    Constructor,
    Field,
}

/// Parameter and return types recovered from a `Signature` attribute.
/// For fields the parameter list is empty and `return_type` holds the field type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericSignature {
    pub parameters: Vec<JavaType>,
    pub return_type: JavaType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSignature {
    pub name: String,
    pub kind: MemberKind,
    pub access: u16,
    pub descriptor: String,
    pub parameters: Vec<JavaType>,
    pub return_type: JavaType,
    pub generic: Option<GenericSignature>,
}

impl MemberSignature {
    pub fn is_public(&self) -> bool {
        self.access & ACC_PUBLIC != 0
    }

    pub fn is_static(&self) -> bool {
        self.access & ACC_STATIC != 0
    }

    pub fn is_varargs(&self) -> bool {
        self.kind != MemberKind::Field && self.access & ACC_VARARGS != 0
    }

    pub fn is_bridge_or_synthetic(&self) -> bool {
        self.kind != MemberKind::Field && self.access & (ACC_BRIDGE | ACC_SYNTHETIC) != 0
    }

    pub fn is_abstract(&self) -> bool {
        self.access & ACC_ABSTRACT != 0
    }

    pub fn is_final(&self) -> bool {
        self.access & ACC_FINAL != 0
    }

    pub fn visibility(&self) -> &'static str {
        if self.access & ACC_PUBLIC != 0 {
            "public"
        } else if self.access & ACC_PROTECTED != 0 {
            "protected"
        } else if self.access & ACC_PRIVATE != 0 {
            "private"
        } else {
            "package-private"
        }
    }

    /// Parameter types with generic information when available.
    pub fn generic_parameters(&self) -> &[JavaType] {
        match &self.generic {
            Some(generic) if generic.parameters.len() == self.parameters.len() => {
                &generic.parameters
            }
            _ => &self.parameters,
        }
    }

    /// Field type with generic information when available.
    pub fn generic_field_type(&self) -> &JavaType {
        match &self.generic {
            Some(generic) => &generic.return_type,
            None => &self.return_type,
        }
    }

    /// Erased descriptor recomputed from parameters, used as override key.
    pub fn erased_key(&self) -> String {
        match self.kind {
            MemberKind::Field => self.name.clone(),
            _ => format!(
                "{}({})",
                self.name,
                self.parameters
                    .iter()
                    .map(JavaType::descriptor)
                    .collect::<String>()
            ),
        }
    }
}

/// Parsed shape of one class file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStub {
    pub name: String,
    pub access: u16,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub members: Vec<MemberSignature>,
    pub enum_constants: Vec<String>,
}

impl ClassStub {
    pub fn is_public(&self) -> bool {
        self.access & ACC_PUBLIC != 0
    }

    pub fn is_interface(&self) -> bool {
        self.access & ACC_INTERFACE != 0
    }

    pub fn is_enum(&self) -> bool {
        self.access & ACC_ENUM != 0
    }

    pub fn package(&self) -> &str {
        self.name
            .rsplit_once('.')
            .map(|(package, _)| package)
            .unwrap_or("")
    }

    pub fn members_named<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a MemberSignature> + 'n
    where
        'a: 'n,
    {
        self.members.iter().filter(move |member| member.name == name)
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MemberSignature> {
        self.members
            .iter()
            .filter(|member| member.kind == MemberKind::Constructor)
    }
}

/// One occurrence of a qualified class name on the classpath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRecord {
    pub qualified_name: String,
    pub origin: SymbolOrigin,
    pub variant: ReleaseVariant,
    #[serde(default)]
    pub multi_release: bool,
    pub class: ClassStub,
}

impl SymbolRecord {
    pub fn member_signatures(&self) -> impl Iterator<Item = String> + '_ {
        self.class
            .members
            .iter()
            .map(|member| format!("{}{}", member.name, member.descriptor))
    }
}
