/// A loadable constant, already resolved out of the constant pool.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    /// Internal class name, e.g. `java/lang/String`.
    Class(String),
}

/// A resolved `Fieldref` entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
}

impl FieldRef {
    pub fn new(class_name: &str, name: &str, descriptor: &str) -> Self {
        FieldRef {
            class_name: class_name.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

/// A resolved `Methodref` or `InterfaceMethodref` entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodRef {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub interface: bool,
}

impl MethodRef {
    pub fn new(class_name: &str, name: &str, descriptor: &str) -> Self {
        MethodRef {
            class_name: class_name.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface: false,
        }
    }

    pub fn interface(class_name: &str, name: &str, descriptor: &str) -> Self {
        MethodRef {
            interface: true,
            ..MethodRef::new(class_name, name, descriptor)
        }
    }
}

/// A resolved `InvokeDynamic` entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DynamicCallSite {
    pub bootstrap_index: u16,
    pub name: String,
    pub descriptor: String,
}
