//! Structural entities recovered from one source file.
//!
//! Every entity addresses code through token indices into the owning
//! [`ParsedFile`](crate::parsed_file::ParsedFile). Classes refer to their
//! methods through [`FunctionId`]s into the file's function arena; properties
//! and constants are owned inline.

use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ============================================================================
// Ids
// ============================================================================

/// Index of a class in its file's class arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl ClassId {
    pub fn new(id: u32) -> Self {
        ClassId(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class_{}", self.0)
    }
}

/// Index of a function, method or closure in its file's function arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionId(pub u32);

impl FunctionId {
    pub fn new(id: u32) -> Self {
        FunctionId(id)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn_{}", self.0)
    }
}

// ============================================================================
// Attributes
// ============================================================================

bitflags! {
    /// Visibility and modifier bits of a declaration.
    ///
    /// Visibility bits are disjoint; modifier bits are independent. Public-ness
    /// is derived: a declaration with no visibility keyword is public.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct Attributes: u8 {
        const PUBLIC = 0b0000_0001;
        const PROTECTED = 0b0000_0010;
        const PRIVATE = 0b0000_0100;
        const STATIC = 0b0000_1000;
        const ABSTRACT = 0b0001_0000;
        const FINAL = 0b0010_0000;
    }
}

impl Attributes {
    /// Flag for a modifier keyword (`public`, `static`, ...), if it is one.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "public" | "var" => Some(Self::PUBLIC),
            "protected" => Some(Self::PROTECTED),
            "private" => Some(Self::PRIVATE),
            "static" => Some(Self::STATIC),
            "abstract" => Some(Self::ABSTRACT),
            "final" => Some(Self::FINAL),
            _ => None,
        }
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC) || !self.intersects(Self::PRIVATE | Self::PROTECTED)
    }

    pub fn is_protected(self) -> bool {
        self.contains(Self::PROTECTED)
    }

    pub fn is_private(self) -> bool {
        self.contains(Self::PRIVATE)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    pub fn is_final(self) -> bool {
        self.contains(Self::FINAL)
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A namespace block. Namespace records tile the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// First token of the record (the `namespace` keyword, or the first token
    /// of a synthetic global record).
    pub index: usize,
    /// Namespace name without a leading separator; empty for global code.
    pub name: String,
    pub body_starts: usize,
    /// Last token index covered by this record.
    pub body_ends: usize,
    /// Lowercased alias -> fully-qualified name.
    pub import_map: BTreeMap<String, String>,
}

impl Namespace {
    pub fn contains(&self, index: usize) -> bool {
        index >= self.index && index <= self.body_ends
    }

    pub fn is_global(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    Class,
    Interface,
    Trait,
}

impl ClassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassKind::Class => "class",
            ClassKind::Interface => "interface",
            ClassKind::Trait => "trait",
        }
    }
}

/// A class, interface or trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    /// The `class`/`interface`/`trait` keyword.
    pub index: usize,
    pub kind: ClassKind,
    /// Name token; `None` for anonymous classes.
    pub name_index: Option<usize>,
    /// Fully-qualified name.
    pub name: String,
    pub extends: Vec<String>,
    pub implements: Vec<String>,
    /// Trait names pulled in with `use` inside the body.
    pub uses: Vec<String>,
    pub body_starts: usize,
    pub body_ends: usize,
    pub methods: Vec<FunctionId>,
    pub properties: Vec<Property>,
    pub constants: Vec<Constant>,
    /// Only the abstract and final bits are meaningful for classes.
    pub attributes: Attributes,
}

impl Class {
    pub fn is_abstract(&self) -> bool {
        self.attributes.is_abstract()
    }

    pub fn is_final(&self) -> bool {
        self.attributes.is_final()
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.index && index <= self.body_ends
    }
}

/// A function, method or closure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// The `function`/`fn` keyword.
    pub index: usize,
    /// Fully-qualified for free functions, bare for methods, `None` for closures.
    pub name: Option<String>,
    pub name_index: Option<usize>,
    pub class_name: Option<String>,
    pub class_id: Option<ClassId>,
    /// Opening `{` of the body; `None` for body-less declarations.
    pub body_starts: Option<usize>,
    /// Closing `}` of the body, or the `;` ending a declaration.
    pub body_ends: usize,
    pub returns_reference: bool,
    pub parameters: Vec<Parameter>,
    /// Closure `use (...)` list.
    pub used_variables: Vec<Parameter>,
    pub is_declaration: bool,
    pub attributes: Attributes,
}

impl Function {
    pub fn is_closure(&self) -> bool {
        self.name.is_none()
    }

    pub fn is_method(&self) -> bool {
        self.class_id.is_some() && self.name.is_some()
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.index && index <= self.body_ends
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    /// First token of the parameter.
    pub index: usize,
    /// Variable name including `$`.
    pub name: String,
    pub type_name: Option<String>,
    pub is_passed_by_reference: bool,
    pub has_default_value: bool,
    pub is_variadic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    /// Name token.
    pub index: usize,
    pub name: String,
    pub class_name: Option<String>,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// The `$name` token.
    pub index: usize,
    /// Name including `$`.
    pub name: String,
    pub class_name: Option<String>,
    pub type_name: Option<String>,
    pub attributes: Attributes,
}
