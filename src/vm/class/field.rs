use std::fmt::{Display, Formatter};
use std::sync::{Arc, Weak};
use crate::helper::has_flag;
use crate::vm::class::access::AccessFlagField;
use crate::vm::class::class::{Class, ClassRef};

/// Size of a heap reference slot as seen by compiled code.
pub const REFERENCE_SIZE: usize = 4;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum FieldType {
    B,
    C,
    D,
    F,
    I,
    J,
    L(String),
    S,
    Z,
    A(Box<FieldType>), // [
    V
}

impl FieldType {
    pub fn is_primitive(&self) -> bool {
        !matches!(self, FieldType::L(_) | FieldType::A(_))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::L(_) | FieldType::A(_))
    }

    /// Storage width in bytes.
    pub fn size(&self) -> usize {
        match self {
            FieldType::Z | FieldType::B => 1,
            FieldType::C | FieldType::S => 2,
            FieldType::I | FieldType::F => 4,
            FieldType::J | FieldType::D => 8,
            FieldType::L(_) | FieldType::A(_) => REFERENCE_SIZE,
            FieldType::V => 0,
        }
    }

    /// Internal name of the class this type denotes: `I`, `java/lang/String`, `[J`.
    pub fn class_name(&self) -> String {
        match self {
            FieldType::L(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::B => write!(f, "B"),
            FieldType::C => write!(f, "C"),
            FieldType::D => write!(f, "D"),
            FieldType::F => write!(f, "F"),
            FieldType::I => write!(f, "I"),
            FieldType::J => write!(f, "J"),
            FieldType::L(name) => write!(f, "L{};", name),
            FieldType::S => write!(f, "S"),
            FieldType::Z => write!(f, "Z"),
            FieldType::A(component) => write!(f, "[{}", component),
            FieldType::V => write!(f, "V"),
        }
    }
}

/// A resolved field. Immutable once its class is defined and shared by every resolver.
#[derive(Debug)]
pub struct Field {
    pub(crate) declaring_class: Weak<Class>,
    pub flag: u16,
    pub name: String,
    pub descriptor: FieldType,
    /// Index into the static storage of the declaring class, or into the instance slots
    /// of an object (counting the superclass' slots first).
    pub slot: usize,
}

pub type FieldRef = Arc<Field>;

impl Field {
    pub fn declaring_class(&self) -> Option<ClassRef> {
        self.declaring_class.upgrade()
    }

    pub fn is_static(&self) -> bool {
        has_flag(self.flag, AccessFlagField::ACC_STATIC)
    }

    pub fn is_final(&self) -> bool {
        has_flag(self.flag, AccessFlagField::ACC_FINAL)
    }

    pub fn is_primitive_type(&self) -> bool {
        self.descriptor.is_primitive()
    }

    pub fn field_size(&self) -> usize {
        self.descriptor.size()
    }

    /// `int Foo.bar` style rendering used in error messages.
    pub fn pretty(&self) -> String {
        let class = self.declaring_class()
            .map(|c| c.pretty_name())
            .unwrap_or_else(|| "<unloaded>".to_string());
        format!("{} {}.{}", pretty_type(&self.descriptor), class, self.name)
    }
}

pub fn pretty_type(ty: &FieldType) -> String {
    match ty {
        FieldType::B => "byte".to_string(),
        FieldType::C => "char".to_string(),
        FieldType::D => "double".to_string(),
        FieldType::F => "float".to_string(),
        FieldType::I => "int".to_string(),
        FieldType::J => "long".to_string(),
        FieldType::S => "short".to_string(),
        FieldType::Z => "boolean".to_string(),
        FieldType::V => "void".to_string(),
        FieldType::L(name) => name.replace('/', "."),
        FieldType::A(component) => format!("{}[]", pretty_type(component)),
    }
}
