//! Descriptive classpath index: every class occurrence with its origin,
//! release variant and member shapes, plus Maven metadata for archives.

mod builder;
mod cache;
mod classfile;
mod entry;
mod index;
mod metadata;
mod record;
mod release;
mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;


pub use builder::{ClasspathIndexer, IndexContext, IndexError};
pub use cache::{CacheError, IndexCache, IndexFingerprint};
pub use classfile::{
    parse_class, parse_field_descriptor, parse_method_descriptor, parse_module_info,
    ClassParseError, ModuleInfo,
};
pub use entry::{
    expand_classpath, ClasspathEntry, EntryKind, EntryOwner, SourceKind, RUNTIME_MODULE_PREFIX,
};
pub use index::{ClasspathIndex, EntryReport, SkippedMember, UnreadableEntry};
pub use metadata::{
    parse_pom_dependencies, parse_pom_properties, parse_properties, ArchiveMetadata,
    DeclaredDependency, LibraryCoordinate, MetadataError,
};
pub use record::{
    ClassStub, GenericSignature, MemberKind, MemberSignature, ReleaseVariant, SymbolOrigin,
    SymbolRecord, ACC_ABSTRACT, ACC_BRIDGE, ACC_ENUM, ACC_FINAL, ACC_INTERFACE, ACC_PRIVATE,
    ACC_PROTECTED, ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC, ACC_VARARGS,
};
pub use release::{select_variant, ReleaseMismatch, SelectedVariants, MIN_VERSIONED_RELEASE};
pub use types::{method_descriptor, JavaType, PrimitiveType, OBJECT_CLASS, STRING_CLASS};
