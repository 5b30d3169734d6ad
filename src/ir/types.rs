//! Type descriptors and the value type lattice.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A type descriptor such as `I`, `J`, `Ljava/lang/String;` or `[I`.
///
/// Ordering is the lexicographic order of the descriptor string, which is
/// what the outline naming relies on for reproducible output.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DexType(String);

impl DexType {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    pub fn void() -> Self {
        Self::new("V")
    }

    pub fn boolean() -> Self {
        Self::new("Z")
    }

    pub fn int() -> Self {
        Self::new("I")
    }

    pub fn long() -> Self {
        Self::new("J")
    }

    pub fn float() -> Self {
        Self::new("F")
    }

    pub fn double() -> Self {
        Self::new("D")
    }

    pub fn object() -> Self {
        Self::new("Ljava/lang/Object;")
    }

    pub fn string() -> Self {
        Self::new("Ljava/lang/String;")
    }

    /// Class type from a binary name, `java/lang/StringBuilder` -> `Ljava/lang/StringBuilder;`
    pub fn class(binary_name: &str) -> Self {
        Self(format!("L{};", binary_name))
    }

    /// Array type with `self` as the element type
    pub fn array_of(&self) -> Self {
        Self(format!("[{}", self.0))
    }

    #[inline]
    pub fn descriptor(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        self.0 == "V"
    }

    /// Single-character descriptors other than `V`
    pub fn is_primitive(&self) -> bool {
        matches!(self.0.as_str(), "Z" | "B" | "S" | "C" | "I" | "J" | "F" | "D")
    }

    /// Long and double occupy a register pair
    #[inline]
    pub fn is_wide(&self) -> bool {
        matches!(self.0.as_str(), "J" | "D")
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        self.0.starts_with('[')
    }

    #[inline]
    pub fn is_class(&self) -> bool {
        self.0.starts_with('L')
    }

    /// Element type of an array type
    pub fn element_type(&self) -> Option<DexType> {
        self.0.strip_prefix('[').map(DexType::new)
    }

    /// Number of registers a value of this type occupies
    pub fn required_registers(&self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for DexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric type of an arithmetic operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericType {
    Int,
    Long,
    Float,
    Double,
}

impl NumericType {
    pub fn dex_type(self) -> DexType {
        match self {
            NumericType::Int => DexType::int(),
            NumericType::Long => DexType::long(),
            NumericType::Float => DexType::float(),
            NumericType::Double => DexType::double(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericType::Int => "int",
            NumericType::Long => "long",
            NumericType::Float => "float",
            NumericType::Double => "double",
        }
    }

    /// Numeric lattice type for a primitive descriptor.
    ///
    /// `Z`, `B`, `S` and `C` all collapse to `Int`.
    pub fn from_dex_type(ty: &DexType) -> Option<Self> {
        match ty.descriptor() {
            "Z" | "B" | "S" | "C" | "I" => Some(NumericType::Int),
            "J" => Some(NumericType::Long),
            "F" => Some(NumericType::Float),
            "D" => Some(NumericType::Double),
            _ => None,
        }
    }
}

/// Lattice type of an SSA value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TypeElement {
    Primitive {
        numeric: NumericType,
    },
    /// A class type. Interface types are represented as `Object` with the
    /// interface listed in `interfaces`.
    Class {
        class: DexType,
        #[serde(default)]
        interfaces: Vec<DexType>,
    },
    Array {
        element: Box<TypeElement>,
    },
    /// The type of the `null` constant
    Null,
}

impl TypeElement {
    pub fn primitive(numeric: NumericType) -> Self {
        TypeElement::Primitive { numeric }
    }

    pub fn class(class: DexType) -> Self {
        TypeElement::Class {
            class,
            interfaces: Vec::new(),
        }
    }

    /// Value of an interface type
    pub fn interface(interface: DexType) -> Self {
        TypeElement::Class {
            class: DexType::object(),
            interfaces: vec![interface],
        }
    }

    pub fn array(element: TypeElement) -> Self {
        TypeElement::Array {
            element: Box::new(element),
        }
    }

    /// Lattice type for a declared type. Returns `None` for `V`.
    pub fn from_dex_type(ty: &DexType) -> Option<Self> {
        if ty.is_void() {
            return None;
        }
        if let Some(numeric) = NumericType::from_dex_type(ty) {
            return Some(TypeElement::primitive(numeric));
        }
        if let Some(element) = ty.element_type() {
            return TypeElement::from_dex_type(&element).map(TypeElement::array);
        }
        Some(TypeElement::class(ty.clone()))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, TypeElement::Array { .. })
    }

    /// Innermost element type of a (possibly nested) array type
    pub fn base_type(&self) -> &TypeElement {
        match self {
            TypeElement::Array { element } => element.base_type(),
            other => other,
        }
    }

    /// Declared type corresponding to this lattice element.
    ///
    /// `Null` has no declared type of its own.
    pub fn to_dex_type(&self) -> Option<DexType> {
        match self {
            TypeElement::Primitive { numeric } => Some(numeric.dex_type()),
            TypeElement::Class { class, .. } => Some(class.clone()),
            TypeElement::Array { element } => element.to_dex_type().map(|t| t.array_of()),
            TypeElement::Null => None,
        }
    }

    pub fn required_registers(&self) -> usize {
        match self {
            TypeElement::Primitive {
                numeric: NumericType::Long | NumericType::Double,
            } => 2,
            _ => 1,
        }
    }
}

/// Method prototype: return type and parameter types
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Proto {
    pub return_type: DexType,
    #[serde(default)]
    pub parameters: Vec<DexType>,
}

impl Proto {
    pub fn new(return_type: DexType, parameters: Vec<DexType>) -> Self {
        Self {
            return_type,
            parameters,
        }
    }
}

impl fmt::Display for Proto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for parameter in &self.parameters {
            write!(f, "{}", parameter)?;
        }
        write!(f, "){}", self.return_type)
    }
}

/// Reference to a method: holder, name and prototype
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodRef {
    pub holder: DexType,
    pub name: String,
    pub proto: Proto,
}

impl MethodRef {
    pub fn new(holder: DexType, name: impl Into<String>, proto: Proto) -> Self {
        Self {
            holder,
            name: name.into(),
            proto,
        }
    }

    /// Instance initializer (`<init>`)
    #[inline]
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}{}", self.holder, self.name, self.proto)
    }
}
