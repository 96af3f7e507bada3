use crate::record::{
    ClassStub, GenericSignature, MemberKind, MemberSignature, ACC_ENUM, ACC_STATIC,
};
use crate::types::{JavaType, PrimitiveType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassParseError {
    #[error("unexpected end of class file")]
    UnexpectedEof,
    #[error("invalid class file magic header")]
    InvalidMagic,
    #[error("unsupported constant pool tag {tag}")]
    UnsupportedConstant { tag: u8 },
    #[error("invalid constant pool index {index}")]
    InvalidConstantIndex { index: u16 },
    #[error("invalid UTF-8 string in constant pool: {0}")]
    Utf8Decode(#[from] std::string::FromUtf8Error),
    #[error("malformed descriptor: {0}")]
    InvalidDescriptor(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub exports: BTreeSet<String>,
}

/// Parse a class file into the stub kept by the index.
///
/// Every member except `<clinit>` is retained, including non-public ones, so
/// that binding resolution can explain why a candidate was rejected.
pub fn parse_class(bytes: &[u8]) -> Result<ClassStub, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let _minor_version = reader.read_u2()?;
    let _major_version = reader.read_u2()?;
    let constant_pool = ConstantPool::parse(&mut reader)?;

    let access = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        let index = reader.read_u2()?;
        interfaces.push(constant_pool.class_name(index)?.replace('/', "."));
    }

    let name = constant_pool.class_name(this_class)?.replace('/', ".");
    let super_class = if super_class == 0 {
        None
    } else {
        Some(constant_pool.class_name(super_class)?.replace('/', "."))
    };

    let mut members = Vec::new();
    let mut enum_constants = Vec::new();
    let fields_count = reader.read_u2()?;
    for _ in 0..fields_count {
        let raw = read_member(&mut reader, &constant_pool)?;
        let field_type = parse_field_descriptor(&raw.descriptor)?;
        if raw.access & ACC_ENUM != 0 && raw.access & ACC_STATIC != 0 {
            enum_constants.push(raw.name.clone());
        }
        let generic = match raw.signature.as_deref() {
            Some(signature) => parse_field_signature(signature).ok().map(|ty| GenericSignature {
                parameters: Vec::new(),
                return_type: ty,
            }),
            None => None,
        };
        members.push(MemberSignature {
            name: raw.name,
            kind: MemberKind::Field,
            access: raw.access,
            descriptor: raw.descriptor,
            parameters: Vec::new(),
            return_type: field_type,
            generic,
        });
    }

    let methods_count = reader.read_u2()?;
    for _ in 0..methods_count {
        let raw = read_member(&mut reader, &constant_pool)?;
        if raw.name == "<clinit>" {
            continue;
        }
        let (parameters, return_type) = parse_method_descriptor(&raw.descriptor)?;
        // A signature that fails to parse only loses generic detail.
        let generic = raw
            .signature
            .as_deref()
            .and_then(|signature| parse_method_signature(signature).ok());
        let kind = if raw.name == "<init>" {
            MemberKind::Constructor
        } else {
            MemberKind::Method
        };
        members.push(MemberSignature {
            name: raw.name,
            kind,
            access: raw.access,
            descriptor: raw.descriptor,
            parameters,
            return_type,
            generic,
        });
    }

    // Class attributes are not needed for symbol metadata.
    let attributes_count = reader.read_u2()?;
    skip_attributes(&mut reader, attributes_count)?;

    Ok(ClassStub {
        name,
        access,
        super_class,
        interfaces,
        members,
        enum_constants,
    })
}

pub fn parse_module_info(bytes: &[u8]) -> Result<ModuleInfo, ClassParseError> {
    let mut reader = ClassReader::new(bytes);
    reader.expect_magic()?;
    let _minor_version = reader.read_u2()?;
    let _major_version = reader.read_u2()?;
    let constant_pool = ConstantPool::parse(&mut reader)?;

    let _access_flags = reader.read_u2()?;
    let _this_class = reader.read_u2()?;
    let _super_class = reader.read_u2()?;
    let interfaces_count = reader.read_u2()?;
    for _ in 0..interfaces_count {
        reader.read_u2()?;
    }

    let fields = reader.read_u2()?;
    for _ in 0..fields {
        skip_member(&mut reader)?;
    }

    let methods = reader.read_u2()?;
    for _ in 0..methods {
        skip_member(&mut reader)?;
    }

    let attributes_count = reader.read_u2()?;
    for _ in 0..attributes_count {
        let attribute_name_index = reader.read_u2()?;
        let attribute_length = reader.read_u4()? as usize;
        let attribute_name = constant_pool.utf8(attribute_name_index)?;
        if attribute_name != "Module" {
            reader.skip(attribute_length)?;
            continue;
        }

        let slice = reader.read_slice(attribute_length)?;
        let mut sub_reader = ClassReader::new(slice);
        let module_name_index = sub_reader.read_u2()?;
        let _module_flags = sub_reader.read_u2()?;
        let _module_version_index = sub_reader.read_u2()?;

        let requires_count = sub_reader.read_u2()?;
        sub_reader.skip(requires_count as usize * 6)?;

        let exports_count = sub_reader.read_u2()?;
        let mut exports = BTreeSet::new();
        for _ in 0..exports_count {
            let exports_index = sub_reader.read_u2()?;
            sub_reader.read_u2()?; // exports_flags
            let exports_to_count = sub_reader.read_u2()?;
            sub_reader.skip(exports_to_count as usize * 2)?;
            let package = constant_pool.package_name(exports_index)?;
            exports.insert(package.replace('/', "."));
        }

        // opens/uses/provides are irrelevant for indexing.
        return Ok(ModuleInfo {
            name: constant_pool.module_name(module_name_index)?,
            exports,
        });
    }

    Err(ClassParseError::InvalidDescriptor(
        "module-info missing Module attribute".into(),
    ))
}

struct RawMember {
    access: u16,
    name: String,
    descriptor: String,
    signature: Option<String>,
}

fn read_member(
    reader: &mut ClassReader<'_>,
    constant_pool: &ConstantPool,
) -> Result<RawMember, ClassParseError> {
    let access = reader.read_u2()?;
    let name_index = reader.read_u2()?;
    let descriptor_index = reader.read_u2()?;
    let attributes_count = reader.read_u2()?;

    let mut signature = None;
    for _ in 0..attributes_count {
        let attribute_name_index = reader.read_u2()?;
        let length = reader.read_u4()? as usize;
        if constant_pool.utf8(attribute_name_index)? == "Signature" && length == 2 {
            let signature_index = reader.read_u2()?;
            signature = Some(constant_pool.utf8(signature_index)?.to_string());
        } else {
            reader.skip(length)?;
        }
    }

    Ok(RawMember {
        access,
        name: constant_pool.utf8(name_index)?.to_string(),
        descriptor: constant_pool.utf8(descriptor_index)?.to_string(),
        signature,
    })
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Class { name_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    Other,
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassParseError> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(Constant::Unusable); // index 0 unused

        let mut index = 1;
        while index < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(length)?;
                    Constant::Utf8(String::from_utf8(bytes.to_vec())?)
                }
                3 | 4 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    // Long and Double occupy two slots.
                    reader.skip(8)?;
                    entries.push(Constant::Other);
                    index += 1;
                    Constant::Unusable
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 | 16 => {
                    reader.read_u2()?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other
                }
                15 => {
                    reader.skip(3)?;
                    Constant::Other
                }
                19 => Constant::Module {
                    name_index: reader.read_u2()?,
                },
                20 => Constant::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(ClassParseError::UnsupportedConstant { tag: other }),
            };

            entries.push(entry);
            index += 1;
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassParseError> {
        self.entries
            .get(index as usize)
            .ok_or(ClassParseError::InvalidConstantIndex { index })
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassParseError> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value.as_str()),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ClassParseError> {
        match self.get(index)? {
            Constant::Class { name_index } => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn package_name(&self, index: u16) -> Result<String, ClassParseError> {
        match self.get(index)? {
            Constant::Package { name_index } | Constant::Class { name_index } => {
                Ok(self.utf8(*name_index)?.to_string())
            }
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }

    fn module_name(&self, index: u16) -> Result<String, ClassParseError> {
        match self.get(index)? {
            Constant::Module { name_index } => Ok(self.utf8(*name_index)?.to_string()),
            _ => Err(ClassParseError::InvalidConstantIndex { index }),
        }
    }
}

struct ClassReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn expect_magic(&mut self) -> Result<(), ClassParseError> {
        const MAGIC: u32 = 0xCAFEBABE;
        if self.read_u4()? != MAGIC {
            return Err(ClassParseError::InvalidMagic);
        }
        Ok(())
    }

    fn read_u1(&mut self) -> Result<u8, ClassParseError> {
        let value = *self.data.get(self.pos).ok_or(ClassParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(value)
    }

    fn read_u2(&mut self) -> Result<u16, ClassParseError> {
        let slice = self.read_slice(2)?;
        Ok(u16::from_be_bytes([slice[0], slice[1]]))
    }

    fn read_u4(&mut self) -> Result<u32, ClassParseError> {
        let slice = self.read_slice(4)?;
        Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ClassParseError> {
        if self.pos + len > self.data.len() {
            return Err(ClassParseError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<(), ClassParseError> {
        self.read_slice(len).map(|_| ())
    }
}

fn skip_attributes(reader: &mut ClassReader<'_>, count: u16) -> Result<(), ClassParseError> {
    for _ in 0..count {
        reader.read_u2()?; // attribute_name_index
        let length = reader.read_u4()? as usize;
        reader.skip(length)?;
    }
    Ok(())
}

fn skip_member(reader: &mut ClassReader<'_>) -> Result<(), ClassParseError> {
    reader.read_u2()?; // access_flags
    reader.read_u2()?; // name_index
    reader.read_u2()?; // descriptor_index
    let attributes_count = reader.read_u2()?;
    skip_attributes(reader, attributes_count)
}

pub fn parse_field_descriptor(descriptor: &str) -> Result<JavaType, ClassParseError> {
    let mut parser = DescriptorParser::new(descriptor);
    let ty = parser.parse_type()?;
    parser.expect_end()?;
    Ok(ty)
}

pub fn parse_method_descriptor(
    descriptor: &str,
) -> Result<(Vec<JavaType>, JavaType), ClassParseError> {
    let mut parser = DescriptorParser::new(descriptor);
    let (parameters, return_type) = parser.parse_method()?;
    parser.expect_end()?;
    Ok((parameters, return_type))
}

fn parse_field_signature(signature: &str) -> Result<JavaType, ClassParseError> {
    let mut parser = DescriptorParser::new(signature);
    let ty = parser.parse_type()?;
    parser.expect_end()?;
    Ok(ty)
}

fn parse_method_signature(signature: &str) -> Result<GenericSignature, ClassParseError> {
    let mut parser = DescriptorParser::new(signature);
    parser.skip_type_parameters()?;
    let (parameters, return_type) = parser.parse_method()?;
    // Trailing `^Throws` clauses carry nothing we index.
    Ok(GenericSignature {
        parameters,
        return_type,
    })
}

/// Reader for both erased descriptors and generic signatures. Generic
/// signatures are a superset: type arguments, type variables and inner
/// class suffixes.
struct DescriptorParser<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DescriptorParser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self) -> ClassParseError {
        ClassParseError::InvalidDescriptor(self.source.to_string())
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, ch: u8) -> Result<(), ClassParseError> {
        if self.peek() != Some(ch) {
            return Err(self.error());
        }
        self.pos += 1;
        Ok(())
    }

    fn expect_end(&self) -> Result<(), ClassParseError> {
        if self.pos != self.bytes.len() {
            return Err(self.error());
        }
        Ok(())
    }

    fn skip_type_parameters(&mut self) -> Result<(), ClassParseError> {
        if self.peek() != Some(b'<') {
            return Ok(());
        }
        let mut depth = 0usize;
        while let Some(byte) = self.peek() {
            self.pos += 1;
            match byte {
                b'<' => depth += 1,
                b'>' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
        Err(self.error())
    }

    fn parse_method(&mut self) -> Result<(Vec<JavaType>, JavaType), ClassParseError> {
        self.expect(b'(')?;
        let mut parameters = Vec::new();
        while self.peek() != Some(b')') {
            if self.peek().is_none() {
                return Err(self.error());
            }
            parameters.push(self.parse_type()?);
        }
        self.expect(b')')?;
        let return_type = if self.peek() == Some(b'V') {
            self.pos += 1;
            JavaType::Void
        } else {
            self.parse_type()?
        };
        if self.peek() == Some(b'^') {
            self.pos = self.bytes.len();
        }
        Ok((parameters, return_type))
    }

    fn parse_type(&mut self) -> Result<JavaType, ClassParseError> {
        let start = self.peek().ok_or_else(|| self.error())?;
        if let Some(primitive) = PrimitiveType::from_descriptor(start) {
            self.pos += 1;
            return Ok(JavaType::Primitive(primitive));
        }
        match start {
            b'L' => self.parse_reference_type(),
            b'[' => self.parse_array_type(),
            b'T' => {
                self.pos += 1;
                let name = self.read_until(b';')?;
                Ok(JavaType::TypeVariable(name))
            }
            _ => Err(self.error()),
        }
    }

    fn read_until(&mut self, terminator: u8) -> Result<String, ClassParseError> {
        let start = self.pos;
        while self.peek().ok_or_else(|| self.error())? != terminator {
            self.pos += 1;
        }
        let value = String::from_utf8(self.bytes[start..self.pos].to_vec())?;
        self.pos += 1;
        Ok(value)
    }

    fn parse_reference_type(&mut self) -> Result<JavaType, ClassParseError> {
        self.expect(b'L')?;
        let mut name = String::new();
        let mut type_args = Vec::new();
        loop {
            let byte = self.peek().ok_or_else(|| self.error())?;
            match byte {
                b';' => {
                    self.pos += 1;
                    break;
                }
                b'<' => {
                    self.pos += 1;
                    type_args = self.parse_type_arguments()?;
                }
                b'.' => {
                    // Inner class of a parameterized outer class.
                    self.pos += 1;
                    name.push('$');
                    type_args.clear();
                }
                b'/' => {
                    self.pos += 1;
                    name.push('.');
                }
                _ => {
                    self.pos += 1;
                    name.push(byte as char);
                }
            }
        }
        if name.is_empty() {
            return Err(self.error());
        }
        Ok(JavaType::Reference { name, type_args })
    }

    fn parse_type_arguments(&mut self) -> Result<Vec<JavaType>, ClassParseError> {
        let mut args = Vec::new();
        loop {
            match self.peek().ok_or_else(|| self.error())? {
                b'>' => {
                    self.pos += 1;
                    return Ok(args);
                }
                b'*' => {
                    self.pos += 1;
                    args.push(JavaType::object());
                }
                // Wildcard bounds are treated as the bound itself.
                b'+' | b'-' => {
                    self.pos += 1;
                    args.push(self.parse_type()?);
                }
                _ => args.push(self.parse_type()?),
            }
        }
    }

    fn parse_array_type(&mut self) -> Result<JavaType, ClassParseError> {
        let mut dimensions = 0u8;
        while self.peek() == Some(b'[') {
            dimensions = dimensions.saturating_add(1);
            self.pos += 1;
        }
        let element = self.parse_type()?;
        Ok(JavaType::Array {
            element: Box::new(element),
            dimensions,
        })
    }
}
