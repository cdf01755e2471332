use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};
use strum_macros::Display;
use crate::helper::has_flag;
use crate::vm::class::access::AccessFlagMethod;
use crate::vm::class::class::{Class, ClassRef};
use crate::vm::class::field::{FieldType, pretty_type};
use crate::vm::object::Value;
use crate::vm::thread::thread::VMThread;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub ret: FieldType
}

/// How a call site invokes its target.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeType {
    #[strum(serialize = "static")]
    Static,
    #[strum(serialize = "direct")]
    Direct,
    #[strum(serialize = "virtual")]
    Virtual,
    #[strum(serialize = "super")]
    Super,
    #[strum(serialize = "interface")]
    Interface,
}

impl InvokeType {
    pub fn is_direct(self) -> bool {
        self == InvokeType::Static || self == InvokeType::Direct
    }
}

/// Native method body. Returns `None` for void, or with an exception left pending on
/// the thread.
pub type NativeFn = Arc<dyn Fn(&VMThread, &[Value]) -> Option<Value> + Send + Sync>;

pub enum MethodRepr {
    Bytecode(Code),
    Native(NativeFn),
    Abstract,
}

impl Debug for MethodRepr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodRepr::Bytecode(code) => write!(f, "Bytecode({} bytes)", code.code.len()),
            MethodRepr::Native(native) => write!(f, "Native({:p})", Arc::as_ptr(native)),
            MethodRepr::Abstract => write!(f, "Abstract"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Code {
    pub max_stack: usize,
    pub max_locals: usize,
    pub code: Vec<u8>
}

/// A resolved method, shared by reference between the declaring class, vtables of
/// subclasses and every resolved-symbol cache that refers to it.
#[derive(Debug)]
pub struct Method {
    pub(crate) declaring_class: Weak<Class>,
    pub flag: u16,
    pub name: String,
    pub descriptor: MethodDescriptor,
    /// Vtable slot for class methods, position in the interface's method table for
    /// interface methods. Unused for static and direct methods.
    pub method_index: u16,
    pub repr: MethodRepr
}

pub type MethodRef = Arc<Method>;

impl Method {
    pub fn declaring_class(&self) -> Option<ClassRef> {
        self.declaring_class.upgrade()
    }

    pub fn is_static(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_STATIC)
    }

    pub fn is_private(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_PRIVATE)
    }

    pub fn is_abstract(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_ABSTRACT) || matches!(self.repr, MethodRepr::Abstract)
    }

    pub fn is_synchronized(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_SYNCHRONIZED)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    pub fn is_class_initializer(&self) -> bool {
        self.name == "<clinit>" && self.is_static()
    }

    /// Static, private and constructor methods are bound without dispatch.
    pub fn is_direct(&self) -> bool {
        self.is_static() || self.is_private() || self.is_constructor()
    }

    pub fn invoke_type(&self) -> InvokeType {
        let in_interface = self.declaring_class().map_or(false, |c| c.is_interface());
        if self.is_static() {
            InvokeType::Static
        } else if self.is_direct() {
            InvokeType::Direct
        } else if in_interface {
            InvokeType::Interface
        } else {
            InvokeType::Virtual
        }
    }

    /// Would invoking this method with `invoke_type` be an incompatible class change?
    pub fn check_incompatible_class_change(&self, invoke_type: InvokeType) -> bool {
        let methods_class = match self.declaring_class() {
            Some(class) => class,
            None => return true,
        };
        match invoke_type {
            InvokeType::Static => !self.is_static(),
            InvokeType::Direct => !self.is_direct() || self.is_static(),
            InvokeType::Virtual => self.is_direct() || methods_class.is_interface(),
            InvokeType::Super => self.is_static() || self.is_constructor() || methods_class.is_interface(),
            InvokeType::Interface => {
                self.is_static() || (!methods_class.is_interface() && !methods_class.is_object_class())
            }
        }
    }

    pub fn matches(&self, name: &str, descriptor: &MethodDescriptor) -> bool {
        self.name == name && &self.descriptor == descriptor
    }

    /// `int Foo.bar(long, java.lang.String)` style rendering used in error messages.
    pub fn pretty(&self) -> String {
        let class = self.declaring_class()
            .map(|c| c.pretty_name())
            .unwrap_or_else(|| "<unloaded>".to_string());
        let params: Vec<String> = self.descriptor.parameters.iter().map(pretty_type).collect();
        format!("{} {}.{}({})", pretty_type(&self.descriptor.ret), class, self.name, params.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use crate::vm::class::access::{AccessFlagClass, AccessFlagMethod};
    use crate::vm::class::method::InvokeType;
    use crate::vm::class_loader::bootstrap::{BootstrapClassLoader, ClassBuilder};

    const PUBLIC: u16 = AccessFlagMethod::ACC_PUBLIC as u16;
    const STATIC: u16 = AccessFlagMethod::ACC_STATIC as u16;
    const PRIVATE: u16 = AccessFlagMethod::ACC_PRIVATE as u16;

    #[test]
    fn incompatible_class_change() {
        let loader = BootstrapClassLoader::new().unwrap();
        let iface = loader.define_class(ClassBuilder::new("t/Iface")
            .flags((AccessFlagClass::ACC_INTERFACE as u16) | (AccessFlagClass::ACC_ABSTRACT as u16))
            .abstract_method("run", "()V", PUBLIC)).unwrap();
        let class = loader.define_class(ClassBuilder::new("t/Impl")
            .native_method("stat", "()V", PUBLIC | STATIC, |_, _| None)
            .native_method("priv", "()V", PRIVATE, |_, _| None)
            .native_method("virt", "()V", PUBLIC, |_, _| None)).unwrap();

        let stat = class.find_declared_method_by_name("stat").unwrap();
        let private = class.find_declared_method_by_name("priv").unwrap();
        let virt = class.find_declared_method_by_name("virt").unwrap();
        let run = iface.find_declared_method_by_name("run").unwrap();

        assert!(!stat.check_incompatible_class_change(InvokeType::Static));
        assert!(stat.check_incompatible_class_change(InvokeType::Virtual));
        assert!(stat.check_incompatible_class_change(InvokeType::Direct));

        assert!(!private.check_incompatible_class_change(InvokeType::Direct));
        assert!(private.check_incompatible_class_change(InvokeType::Virtual));

        assert!(!virt.check_incompatible_class_change(InvokeType::Virtual));
        assert!(!virt.check_incompatible_class_change(InvokeType::Super));
        assert!(virt.check_incompatible_class_change(InvokeType::Interface));

        assert!(!run.check_incompatible_class_change(InvokeType::Interface));
        assert!(run.check_incompatible_class_change(InvokeType::Virtual));

        assert_eq!(stat.invoke_type(), InvokeType::Static);
        assert_eq!(private.invoke_type(), InvokeType::Direct);
        assert_eq!(run.invoke_type(), InvokeType::Interface);
        assert_eq!(virt.pretty(), "void t.Impl.virt()");
    }
}
