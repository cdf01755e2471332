use num_enum::IntoPrimitive;
use crate::helper::{has_flag, package_of};
use crate::vm::class::class::Class;

#[allow(non_camel_case_types)]
#[derive(IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AccessFlagClass {
    ACC_PUBLIC = 0x0001,
    ACC_FINAL = 0x0010,
    ACC_SUPER = 0x0020,
    ACC_INTERFACE = 0x0200,
    ACC_ABSTRACT = 0x0400,
    ACC_SYNTHETIC = 0x1000,
    ACC_ANNOTATION = 0x2000,
    ACC_ENUM = 0x4000,
}

#[allow(non_camel_case_types)]
#[derive(IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AccessFlagField {
    ACC_PUBLIC = 0x0001,
    ACC_PRIVATE = 0x0002,
    ACC_PROTECTED = 0x0004,
    ACC_STATIC = 0x0008,
    ACC_FINAL = 0x0010,
    ACC_VOLATILE = 0x0040,
    ACC_TRANSIENT = 0x0080,
    ACC_SYNTHETIC = 0x1000,
    ACC_ENUM = 0x4000,
}

#[allow(non_camel_case_types)]
#[derive(IntoPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum AccessFlagMethod {
    ACC_PUBLIC = 0x0001,
    ACC_PRIVATE = 0x0002,
    ACC_PROTECTED = 0x0004,
    ACC_STATIC = 0x0008,
    ACC_FINAL = 0x0010,
    ACC_SYNCHRONIZED = 0x0020,
    ACC_BRIDGE = 0x0040,
    ACC_VARARGS = 0x0080,
    ACC_NATIVE = 0x0100,
    ACC_ABSTRACT = 0x0400,
    ACC_STRICT = 0x0800,
    ACC_SYNTHETIC = 0x1000,
}

// Member visibility bits are shared between fields and methods.
const ACC_PUBLIC: u16 = 0x0001;
const ACC_PRIVATE: u16 = 0x0002;
const ACC_PROTECTED: u16 = 0x0004;

impl Class {
    pub fn is_in_same_package(&self, other: &Class) -> bool {
        if self == other {
            return true;
        }
        // Arrays live in the package of their element class.
        let lhs = self.element_class_name();
        let rhs = other.element_class_name();
        package_of(lhs) == package_of(rhs)
    }

    /// Can code in this class refer to `target` at all?
    pub fn can_access(&self, target: &Class) -> bool {
        if target.is_public() {
            return true;
        }
        self.is_in_same_package(target)
    }

    /// Can code in this class access a member of `target` carrying `access_flags`?
    /// `target` is the declaring class of the member.
    pub fn can_access_member(&self, target: &Class, access_flags: u16) -> bool {
        if has_flag(access_flags, ACC_PUBLIC) {
            return true;
        }
        if has_flag(access_flags, ACC_PRIVATE) {
            return self == target;
        }
        if has_flag(access_flags, ACC_PROTECTED) && self.is_subclass_of(target) {
            return true;
        }
        // Package-private, or protected from outside the class hierarchy.
        self.is_in_same_package(target)
    }
}

#[cfg(test)]
mod tests {
    use crate::vm::class::access::{AccessFlagClass, AccessFlagField};
    use crate::vm::class_loader::bootstrap::{BootstrapClassLoader, ClassBuilder};

    const PUBLIC: u16 = AccessFlagClass::ACC_PUBLIC as u16;

    #[test]
    fn class_visibility() {
        let loader = BootstrapClassLoader::new().unwrap();
        let public_a = loader.define_class(ClassBuilder::new("a/Public").flags(PUBLIC)).unwrap();
        let hidden_a = loader.define_class(ClassBuilder::new("a/Hidden")).unwrap();
        let b = loader.define_class(ClassBuilder::new("b/User")).unwrap();
        let a = loader.define_class(ClassBuilder::new("a/User")).unwrap();

        assert!(b.can_access(&public_a));
        assert!(!b.can_access(&hidden_a));
        assert!(a.can_access(&hidden_a));
    }

    #[test]
    fn member_visibility() {
        let loader = BootstrapClassLoader::new().unwrap();
        let base = loader.define_class(ClassBuilder::new("a/Base").flags(PUBLIC)).unwrap();
        let sub = loader.define_class(ClassBuilder::new("b/Sub").super_class("a/Base")).unwrap();
        let other = loader.define_class(ClassBuilder::new("b/Other")).unwrap();
        let neighbour = loader.define_class(ClassBuilder::new("a/Neighbour")).unwrap();

        let public = AccessFlagField::ACC_PUBLIC as u16;
        let private = AccessFlagField::ACC_PRIVATE as u16;
        let protected = AccessFlagField::ACC_PROTECTED as u16;
        let package = 0;

        assert!(other.can_access_member(&base, public));

        assert!(base.can_access_member(&base, private));
        assert!(!sub.can_access_member(&base, private));
        assert!(!neighbour.can_access_member(&base, private));

        assert!(sub.can_access_member(&base, protected));
        assert!(neighbour.can_access_member(&base, protected));
        assert!(!other.can_access_member(&base, protected));

        assert!(neighbour.can_access_member(&base, package));
        assert!(!sub.can_access_member(&base, package));
    }

    #[test]
    fn arrays_take_element_package() {
        let loader = BootstrapClassLoader::new().unwrap();
        loader.define_class(ClassBuilder::new("a/Hidden")).unwrap();
        let a = loader.define_class(ClassBuilder::new("a/User")).unwrap();
        let b = loader.define_class(ClassBuilder::new("b/User")).unwrap();
        let array = loader.find_or_create_class("[La/Hidden;").unwrap();

        assert!(a.can_access(&array));
        assert!(!b.can_access(&array));
    }
}
