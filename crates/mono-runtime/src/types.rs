//! Runtime type handles (`MonoType*`).
use crate::{
    catalog::class::MonoClass,
    error::{BridgeError, Result},
    handle::mono_handle,
};
use mono_types::TypeKind;
use std::fmt::{self, Display, Formatter};

/// `MONO_TYPE_NAME_FORMAT_FULL_NAME`
const NAME_FORMAT_FULL_NAME: i32 = 2;

mono_handle! {
    pub struct MonoType {
        kind: TypeKind,
        name: String,
        layout: (usize, usize),
    }
}

impl MonoType {
    /// The raw type code. Never changes for a given type.
    pub fn kind(&self) -> Result<TypeKind> {
        self.kind
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let code = unsafe { self.runtime.api().mono_type_get_type()?(self.ptr()) };
                Ok(TypeKind::from_code(code as u32))
            })
            .copied()
    }

    /// The kind used for storage: enums resolve to their underlying integer
    /// kind.
    pub fn effective_kind(&self) -> Result<TypeKind> {
        let kind = self.kind()?;
        if !matches!(kind, TypeKind::ValueType | TypeKind::Enum) {
            return Ok(kind);
        }
        let Some(class) = self.class()? else {
            return Ok(kind);
        };
        match class.enum_base_type()? {
            Some(base) if base != *self => base.kind(),
            _ => Ok(kind),
        }
    }

    pub fn name(&self) -> Result<&str> {
        self.name
            .get_or_try_init(|| {
                let _guard = self.runtime.attach()?;
                let raw = unsafe { self.runtime.api().mono_type_get_name()?(self.ptr()) };
                self.runtime
                    .take_c_string(raw)
                    .ok_or_else(|| BridgeError::Memory(format!("type {} has no name", self.address)))
            })
            .map(String::as_str)
    }

    /// Namespace-qualified name including generic arguments.
    pub fn full_name(&self) -> Result<String> {
        match self.runtime.api().mono_type_get_name_full() {
            Ok(name_full) => {
                let _guard = self.runtime.attach()?;
                let raw = unsafe { name_full(self.ptr(), NAME_FORMAT_FULL_NAME) };
                self.runtime
                    .take_c_string(raw)
                    .ok_or_else(|| BridgeError::Memory(format!("type {} has no name", self.address)))
            }
            Err(_) => self.name().map(str::to_string),
        }
    }

    pub fn class(&self) -> Result<Option<MonoClass>> {
        let _guard = self.runtime.attach()?;
        let api = self.runtime.api();
        let class = match api.mono_class_from_mono_type() {
            Ok(from_type) => unsafe { from_type(self.ptr()) },
            Err(_) => unsafe { api.mono_type_get_class()?(self.ptr()) },
        };
        Ok(MonoClass::non_null(&self.runtime, class))
    }

    pub fn is_byref(&self) -> Result<bool> {
        let _guard = self.runtime.attach()?;
        Ok(unsafe { self.runtime.api().mono_type_is_byref()?(self.ptr()) } != 0)
    }

    /// Storage size and alignment of a value of this type.
    ///
    /// By-ref types are pointer-sized whatever they refer to. Primitive and
    /// pointer-shaped kinds come from the static size table. Other layouts
    /// are only memoized once the owning class is initialized, since Mono
    /// finalizes them lazily.
    pub fn size_and_alignment(&self) -> Result<(usize, usize)> {
        if let Some(layout) = self.layout.get() {
            return Ok(*layout);
        }
        let width = self.runtime.pointer_width();
        if self.is_byref()? {
            let word = width.bytes();
            return Ok(*self.layout.get_or_init(|| (word, word)));
        }
        let kind = self.effective_kind()?;
        if let Some(size) = kind.primitive_size(width) {
            return Ok(*self.layout.get_or_init(|| (size, size)));
        }

        let _guard = self.runtime.attach()?;
        let mut align = 0i32;
        let size = unsafe { self.runtime.api().mono_type_size()?(self.ptr(), &mut align) };
        let layout = (size.max(0) as usize, align.max(1) as usize);
        let initialized = self
            .class()?
            .is_some_and(|class| class.is_initialized());
        if initialized {
            self.layout.get_or_init(|| layout);
        }
        Ok(layout)
    }

    /// Element type of arrays, target of pointers and by-refs, the
    /// underlying type of enums and generic instances.
    pub fn element_type(&self) -> Result<Option<MonoType>> {
        match self.kind()? {
            TypeKind::Array | TypeKind::SzArray => {
                let Some(class) = self.class()? else {
                    return Ok(None);
                };
                class
                    .element_class()?
                    .map(|element| element.mono_type())
                    .transpose()
            }
            TypeKind::Ptr | TypeKind::ByRef | TypeKind::GenericInst | TypeKind::Enum => {
                let _guard = self.runtime.attach()?;
                let underlying =
                    unsafe { self.runtime.api().mono_type_get_underlying_type()?(self.ptr()) };
                Ok(MonoType::non_null(&self.runtime, underlying).filter(|u| u != self))
            }
            _ => Ok(None),
        }
    }

    /// Collects the descriptive facts about this type in one snapshot.
    pub fn describe(&self) -> Result<TypeDescriptor> {
        let (size, alignment) = self.size_and_alignment()?;
        Ok(TypeDescriptor {
            kind: self.kind()?,
            effective_kind: self.effective_kind()?,
            name: self.name()?.to_string(),
            full_name: self.full_name()?,
            size,
            alignment,
            is_byref: self.is_byref().unwrap_or(false),
            element: self
                .element_type()?
                .map(|e| e.name().map(str::to_string))
                .transpose()?,
            class: self.class()?.map(|c| c.full_name()).transpose()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    pub kind: TypeKind,
    pub effective_kind: TypeKind,
    pub name: String,
    pub full_name: String,
    pub size: usize,
    pub alignment: usize,
    pub is_byref: bool,
    pub element: Option<String>,
    pub class: Option<String>,
}

impl Display for TypeDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}", self.full_name, self.kind)?;
        if self.effective_kind != self.kind {
            write!(f, " as {:?}", self.effective_kind)?;
        }
        write!(f, ", size {}, align {}", self.size, self.alignment)?;
        if self.is_byref {
            write!(f, ", byref")?;
        }
        if let Some(element) = &self.element {
            write!(f, ", element {element}")?;
        }
        write!(f, ")")
    }
}
