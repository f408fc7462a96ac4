//! Attribute flag words returned by `mono_class_get_flags`,
//! `mono_method_get_flags` and `mono_field_get_flags` (ECMA-335 II.23.1).

pub mod type_attributes {
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    pub const PUBLIC: u32 = 0x0000_0001;
    pub const INTERFACE: u32 = 0x0000_0020;
    pub const ABSTRACT: u32 = 0x0000_0080;
    pub const SEALED: u32 = 0x0000_0100;
}

pub mod method_attributes {
    pub const MEMBER_ACCESS_MASK: u32 = 0x0007;
    pub const PUBLIC: u32 = 0x0006;
    pub const STATIC: u32 = 0x0010;
    pub const FINAL: u32 = 0x0020;
    pub const VIRTUAL: u32 = 0x0040;
    pub const ABSTRACT: u32 = 0x0400;
    pub const PINVOKE_IMPL: u32 = 0x2000;
}

pub mod field_attributes {
    pub const STATIC: u32 = 0x0010;
    pub const INIT_ONLY: u32 = 0x0020;
    pub const LITERAL: u32 = 0x0040;
}

/// Calling conventions reported by `mono_signature_get_call_conv`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallConv {
    Default,
    C,
    StdCall,
    ThisCall,
    FastCall,
    VarArg,
    Other(u32),
}

impl From<u32> for CallConv {
    fn from(raw: u32) -> Self {
        match raw & 0x0f {
            0x0 => CallConv::Default,
            0x1 => CallConv::C,
            0x2 => CallConv::StdCall,
            0x3 => CallConv::ThisCall,
            0x4 => CallConv::FastCall,
            0x5 => CallConv::VarArg,
            other => CallConv::Other(other),
        }
    }
}
