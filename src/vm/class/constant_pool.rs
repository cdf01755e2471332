/// Symbolic references of a class, addressed by the index compiled code carries.
/// Immutable once the class is defined; what they resolve to lives in the class's
/// `ResolvedSymbolCache`.
#[derive(Debug, Clone, PartialEq)]
pub enum CPEntry {
    ClassReference(String),
    /// Class reference index, field name, field descriptor
    FieldReference(u32, String, String),
    /// Class reference index, method name, method descriptor
    MethodReference(u32, String, String),
    InterfaceMethodReference(u32, String, String),
    StringConstant(String),
    Hole
}

impl CPEntry {
    pub fn class(name: impl Into<String>) -> Self {
        CPEntry::ClassReference(name.into())
    }

    pub fn field(class_index: u32, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        CPEntry::FieldReference(class_index, name.into(), descriptor.into())
    }

    pub fn method(class_index: u32, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        CPEntry::MethodReference(class_index, name.into(), descriptor.into())
    }

    pub fn interface_method(class_index: u32, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        CPEntry::InterfaceMethodReference(class_index, name.into(), descriptor.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        CPEntry::StringConstant(value.into())
    }
}
