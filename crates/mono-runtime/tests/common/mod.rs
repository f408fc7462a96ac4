//! An in-process stand-in for the Mono embedding API.
//!
//! Metadata lives in leaked structs whose addresses play the part of
//! `MonoClass*`, `MonoType*` and friends. Objects are leaked word buffers
//! laid out like Mono's: a class pointer and the allocation size in a
//! 16-byte header, followed by the fields.
//!
//! Per-thread state (attachment, call counters) is thread local so tests can
//! run in parallel; counters are only ever compared as deltas.
#![allow(dead_code)]

use mono_runtime::{BridgeConfig, BridgeError, ExportTable, MonoRuntime};
use std::{
    cell::Cell,
    collections::HashMap,
    ffi::{c_char, c_void, CStr, CString},
    ptr,
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc, Mutex, OnceLock,
    },
};

pub type Ptr = *mut c_void;

pub const HEADER: usize = 16;
const WORD: i32 = std::mem::size_of::<usize>() as i32;
pub const STRING_LENGTH: usize = 16;
pub const STRING_CHARS: usize = 20;
pub const ARRAY_LENGTH: usize = 24;
pub const ARRAY_DATA: usize = 32;

const PUBLIC: u32 = 0x1;
const INTERFACE: u32 = 0x20;
const ABSTRACT: u32 = 0x80;
const SEALED: u32 = 0x100;

const STATIC: u32 = 0x10;
const VIRTUAL: u32 = 0x40;

pub type Imp = fn(usize, &[usize]) -> Result<usize, usize>;

pub struct FakeTable {
    pub rows: Mutex<Vec<usize>>,
}

pub struct FakeImage {
    pub name: CString,
    pub filename: CString,
    pub classes: Mutex<Vec<usize>>,
    pub typedefs: FakeTable,
}

pub struct FakeAssemblyName {
    pub name: CString,
}

pub struct FakeAssembly {
    pub aname: FakeAssemblyName,
    pub image: usize,
}

pub struct FakeVTable {
    pub class: AtomicUsize,
}

pub struct FakeType {
    pub code: u32,
    pub byref: bool,
    pub class: AtomicUsize,
}

pub struct FakeClass {
    pub name: CString,
    pub namespace: CString,
    pub image: usize,
    pub parent: usize,
    pub flags: u32,
    pub value_type: bool,
    pub enum_base: usize,
    pub element: usize,
    pub instance_size: i32,
    pub value_size: i32,
    pub align: u32,
    pub cctor: Option<fn()>,
    pub ty: AtomicUsize,
    pub array_class: AtomicUsize,
    pub methods: Mutex<Vec<usize>>,
    pub fields: Mutex<Vec<usize>>,
    pub properties: Mutex<Vec<usize>>,
    pub interfaces: Mutex<Vec<usize>>,
    pub vtable: FakeVTable,
    pub cctor_runs: AtomicUsize,
}

impl FakeClass {
    pub fn addr(&self) -> usize {
        addr(self)
    }

    pub fn ty(&self) -> usize {
        self.ty.load(Ordering::SeqCst)
    }

    pub fn full_name(&self) -> String {
        let ns = self.namespace.to_string_lossy();
        let name = self.name.to_string_lossy();
        if ns.is_empty() {
            name.into_owned()
        } else {
            format!("{ns}.{name}")
        }
    }
}

pub struct FakeSig {
    pub params: Vec<usize>,
    pub out: Vec<bool>,
    pub ret: usize,
    pub declared: u32,
}

pub struct FakeMethod {
    pub name: CString,
    pub class: usize,
    pub flags: u32,
    pub sig: FakeSig,
    pub imp: Imp,
    pub thunk: usize,
    pub native: usize,
}

impl FakeMethod {
    pub fn addr(&self) -> usize {
        addr(self)
    }
}

pub struct FakeField {
    pub name: CString,
    pub ty: usize,
    pub parent: usize,
    pub offset: u32,
    pub flags: u32,
    pub storage: usize,
}

pub struct FakeProperty {
    pub name: CString,
    pub parent: usize,
    pub getter: usize,
    pub setter: usize,
}

fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

pub fn addr<T>(value: &T) -> usize {
    value as *const T as usize
}

#[derive(Clone, Copy)]
struct ClassDef {
    namespace: &'static str,
    name: &'static str,
    code: u32,
    parent: usize,
    flags: u32,
    value_type: bool,
    enum_base: usize,
    element: usize,
    instance_size: i32,
    value_size: i32,
    align: u32,
    cctor: Option<fn()>,
}

impl ClassDef {
    fn new(namespace: &'static str, name: &'static str, code: u32) -> Self {
        Self {
            namespace,
            name,
            code,
            parent: 0,
            flags: PUBLIC,
            value_type: false,
            enum_base: 0,
            element: 0,
            instance_size: HEADER as i32,
            value_size: 0,
            align: 1,
            cctor: None,
        }
    }

    fn value(mut self, size: i32, align: u32) -> Self {
        self.value_type = true;
        self.value_size = size;
        self.align = align;
        self.instance_size = HEADER as i32 + size;
        self
    }

    fn parent(mut self, parent: &FakeClass) -> Self {
        self.parent = parent.addr();
        self
    }
}

fn define(image: &'static FakeImage, def: ClassDef) -> &'static FakeClass {
    let class = leak(FakeClass {
        name: CString::new(def.name).unwrap(),
        namespace: CString::new(def.namespace).unwrap(),
        image: addr(image),
        parent: def.parent,
        flags: def.flags,
        value_type: def.value_type,
        enum_base: def.enum_base,
        element: def.element,
        instance_size: def.instance_size,
        value_size: def.value_size,
        align: def.align,
        cctor: def.cctor,
        ty: AtomicUsize::new(0),
        array_class: AtomicUsize::new(0),
        methods: Mutex::new(vec![]),
        fields: Mutex::new(vec![]),
        properties: Mutex::new(vec![]),
        interfaces: Mutex::new(vec![]),
        vtable: FakeVTable {
            class: AtomicUsize::new(0),
        },
        cctor_runs: AtomicUsize::new(0),
    });
    let ty = leak(FakeType {
        code: def.code,
        byref: false,
        class: AtomicUsize::new(class.addr()),
    });
    class.ty.store(addr(ty), Ordering::SeqCst);
    class.vtable.class.store(class.addr(), Ordering::SeqCst);
    image.classes.lock().unwrap().push(class.addr());
    class
}

fn byref_type(class: &FakeClass) -> usize {
    let code = unsafe { fty(class.ty() as Ptr) }.code;
    addr(leak(FakeType {
        code,
        byref: true,
        class: AtomicUsize::new(class.addr()),
    }))
}

struct MethodDef {
    name: &'static str,
    flags: u32,
    params: Vec<usize>,
    out: Vec<bool>,
    ret: usize,
    declared: Option<u32>,
    imp: Imp,
    thunk: usize,
    native: usize,
}

impl MethodDef {
    fn new(name: &'static str, flags: u32, params: Vec<usize>, ret: usize, imp: Imp) -> Self {
        Self {
            name,
            flags,
            out: vec![false; params.len()],
            params,
            ret,
            declared: None,
            imp,
            thunk: 0,
            native: 0,
        }
    }
}

fn method(class: &'static FakeClass, def: MethodDef) -> &'static FakeMethod {
    let declared = def.declared.unwrap_or(def.params.len() as u32);
    let method = leak(FakeMethod {
        name: CString::new(def.name).unwrap(),
        class: class.addr(),
        flags: def.flags,
        sig: FakeSig {
            params: def.params,
            out: def.out,
            ret: def.ret,
            declared,
        },
        imp: def.imp,
        thunk: def.thunk,
        native: def.native,
    });
    class.methods.lock().unwrap().push(method.addr());
    method
}

fn field(class: &'static FakeClass, name: &str, ty: usize, offset: u32, flags: u32) -> &'static FakeField {
    let storage = if flags & STATIC != 0 {
        Box::leak(Box::new([0u64; 2])).as_mut_ptr() as usize
    } else {
        0
    };
    let field = leak(FakeField {
        name: CString::new(name).unwrap(),
        ty,
        parent: class.addr(),
        offset,
        flags,
        storage,
    });
    class.fields.lock().unwrap().push(addr(field));
    field
}

fn property(class: &'static FakeClass, name: &str, getter: usize, setter: usize) {
    let property = leak(FakeProperty {
        name: CString::new(name).unwrap(),
        parent: class.addr(),
        getter,
        setter,
    });
    class.properties.lock().unwrap().push(addr(property));
}

pub struct World {
    pub domain: usize,
    pub thread: usize,
    pub corlib: &'static FakeImage,
    pub game: &'static FakeImage,
    pub corlib_assembly: &'static FakeAssembly,
    pub game_assembly: &'static FakeAssembly,

    pub object: &'static FakeClass,
    pub value_type: &'static FakeClass,
    pub enum_class: &'static FakeClass,
    pub string: &'static FakeClass,
    pub void: &'static FakeClass,
    pub boolean: &'static FakeClass,
    pub byte: &'static FakeClass,
    pub int32: &'static FakeClass,
    pub int64: &'static FakeClass,
    pub double: &'static FakeClass,
    pub exception: &'static FakeClass,
    pub invalid_op: &'static FakeClass,
    pub disposable: &'static FakeClass,
    pub int32_array: &'static FakeClass,

    pub counter: &'static FakeClass,
    pub counter_array: &'static FakeClass,
    pub point: &'static FakeClass,
    pub color: &'static FakeClass,
    pub calc: &'static FakeClass,
    pub binary_op: &'static FakeClass,
    pub scaler: &'static FakeClass,
    pub thrower: &'static FakeClass,

    pub counter_instances: &'static FakeField,
    pub calc_add: &'static FakeMethod,
}

pub fn world() -> &'static World {
    static WORLD: OnceLock<World> = OnceLock::new();
    WORLD.get_or_init(build_world)
}

fn image(name: &str) -> &'static FakeImage {
    leak(FakeImage {
        name: CString::new(name).unwrap(),
        filename: CString::new(format!("/fake/{name}.dll")).unwrap(),
        classes: Mutex::new(vec![]),
        typedefs: FakeTable {
            rows: Mutex::new(vec![]),
        },
    })
}

fn build_world() -> World {
    let corlib = image("mscorlib");
    let game = image("Game");

    let object = define(corlib, ClassDef::new("System", "Object", 0x1c));
    let value_type = define(corlib, ClassDef::new("System", "ValueType", 0x12).parent(object));
    let enum_class = define(corlib, ClassDef::new("System", "Enum", 0x12).parent(value_type));
    let string = define(
        corlib,
        ClassDef {
            instance_size: STRING_CHARS as i32,
            flags: PUBLIC | SEALED,
            ..ClassDef::new("System", "String", 0x0e).parent(object)
        },
    );
    let void = define(corlib, ClassDef::new("System", "Void", 0x01).parent(value_type).value(0, 1));
    let boolean = define(corlib, ClassDef::new("System", "Boolean", 0x02).parent(value_type).value(1, 1));
    let byte = define(corlib, ClassDef::new("System", "Byte", 0x05).parent(value_type).value(1, 1));
    let int32 = define(corlib, ClassDef::new("System", "Int32", 0x08).parent(value_type).value(4, 4));
    let int64 = define(corlib, ClassDef::new("System", "Int64", 0x0a).parent(value_type).value(8, 8));
    let double = define(corlib, ClassDef::new("System", "Double", 0x0d).parent(value_type).value(8, 8));
    for (name, code, size) in [
        ("Char", 0x03, 2),
        ("SByte", 0x04, 1),
        ("Int16", 0x06, 2),
        ("UInt16", 0x07, 2),
        ("UInt32", 0x09, 4),
        ("UInt64", 0x0b, 8),
        ("Single", 0x0c, 4),
        ("IntPtr", 0x18, WORD),
        ("UIntPtr", 0x19, WORD),
    ] {
        define(corlib, ClassDef::new("System", name, code).parent(value_type).value(size, size as u32));
    }
    let exception = define(
        corlib,
        ClassDef {
            instance_size: 24,
            ..ClassDef::new("System", "Exception", 0x12).parent(object)
        },
    );
    let invalid_op = define(
        corlib,
        ClassDef {
            instance_size: 24,
            ..ClassDef::new("System", "InvalidOperationException", 0x12).parent(exception)
        },
    );
    let disposable = define(
        corlib,
        ClassDef {
            flags: PUBLIC | INTERFACE | ABSTRACT,
            ..ClassDef::new("System", "IDisposable", 0x12)
        },
    );
    let int32_array = define(
        corlib,
        ClassDef {
            element: int32.addr(),
            ..ClassDef::new("System", "Int32[]", 0x1d).parent(object)
        },
    );
    int32.array_class.store(int32_array.addr(), Ordering::SeqCst);

    let counter = define(
        game,
        ClassDef {
            instance_size: 40,
            cctor: Some(counter_cctor),
            ..ClassDef::new("Game", "Counter", 0x12).parent(object)
        },
    );
    counter.interfaces.lock().unwrap().push(disposable.addr());
    let counter_array = define(
        game,
        ClassDef {
            element: counter.addr(),
            ..ClassDef::new("Game", "Counter[]", 0x1d).parent(object)
        },
    );
    counter.array_class.store(counter_array.addr(), Ordering::SeqCst);
    let point = define(game, ClassDef::new("Game", "Point", 0x11).parent(value_type).value(8, 4));
    let color = define(
        game,
        ClassDef {
            enum_base: int32.ty(),
            ..ClassDef::new("Game", "Color", 0x11).parent(enum_class).value(4, 4)
        },
    );
    let calc = define(
        game,
        ClassDef {
            flags: PUBLIC | ABSTRACT | SEALED,
            ..ClassDef::new("Game", "Calc", 0x12).parent(object)
        },
    );
    let binary_op = define(game, ClassDef::new("Game", "BinaryOp", 0x12).parent(object));
    let scaler = define(game, ClassDef::new("Game", "Scaler", 0x12).parent(object));
    let thrower = define(game, ClassDef::new("Game", "Thrower", 0x12).parent(object));

    *corlib.typedefs.rows.lock().unwrap() = corlib.classes.lock().unwrap().clone();
    *game.typedefs.rows.lock().unwrap() = vec![
        counter.addr(),
        point.addr(),
        0,
        color.addr(),
        calc.addr(),
        binary_op.addr(),
        scaler.addr(),
        thrower.addr(),
    ];

    // fields
    field(exception, "_message", string.ty(), 16, 0);
    field(counter, "count", int32.ty(), 16, 0);
    field(counter, "next", counter.ty(), 24, 0);
    field(counter, "label", string.ty(), 32, 0);
    let counter_instances = field(counter, "Instances", int32.ty(), 0, STATIC);
    field(point, "x", int32.ty(), 16, 0);
    field(point, "y", int32.ty(), 20, 0);

    // methods
    let (i4, r8, str_, obj, void_, bool_) =
        (int32.ty(), double.ty(), string.ty(), object.ty(), void.ty(), boolean.ty());
    method(object, MethodDef::new("ToString", VIRTUAL, vec![], str_, object_to_string));

    let calc_add = method(
        calc,
        MethodDef {
            native: add_native as usize,
            ..MethodDef::new("Add", STATIC, vec![i4, i4], i4, calc_add)
        },
    );
    method(calc, MethodDef::new("Add", STATIC, vec![i4, i4, i4], i4, calc_add3));
    method(calc, MethodDef::new("Concat", STATIC, vec![str_, str_], str_, calc_concat));
    method(calc, MethodDef::new("Fail", STATIC, vec![], void_, calc_fail));
    method(calc, MethodDef::new("Negate", STATIC, vec![r8], r8, calc_negate));
    method(calc, MethodDef::new("Not", STATIC, vec![bool_], bool_, calc_not));
    method(calc, MethodDef::new("Paint", STATIC, vec![color.ty()], i4, calc_paint));
    method(calc, MethodDef::new("PointSum", STATIC, vec![point.ty()], i4, calc_point_sum));
    method(
        calc,
        MethodDef {
            out: vec![false, true],
            ..MethodDef::new("TryParse", STATIC, vec![str_, byref_type(int32)], bool_, calc_try_parse)
        },
    );
    method(calc, MethodDef::new("Bump", STATIC, vec![counter.ty()], counter.ty(), calc_bump));
    method(calc, MethodDef::new("Identity", STATIC, vec![obj], obj, calc_identity));
    method(calc, MethodDef::new("MakeColor", STATIC, vec![], color.ty(), calc_make_color));
    method(calc, MethodDef::new("Nothing", STATIC, vec![], void_, calc_nothing));
    method(
        calc,
        MethodDef {
            declared: Some(3),
            ..MethodDef::new("Broken", STATIC, vec![i4, i4], void_, calc_nothing)
        },
    );

    method(counter, MethodDef::new("Increment", 0, vec![i4], void_, counter_increment));
    let get = method(counter, MethodDef::new("Get", 0, vec![], i4, counter_get));
    let get_label = method(counter, MethodDef::new("get_Label", 0, vec![], str_, counter_get_label));
    let set_label = method(counter, MethodDef::new("set_Label", 0, vec![str_], void_, counter_set_label));
    method(counter, MethodDef::new("ToString", VIRTUAL, vec![], str_, counter_to_string));
    property(counter, "Label", get_label.addr(), set_label.addr());
    property(counter, "Count", get.addr(), 0);

    method(point, MethodDef::new("Sum", 0, vec![], i4, point_sum));

    method(
        binary_op,
        MethodDef {
            thunk: binary_op_thunk as usize,
            ..MethodDef::new("Invoke", VIRTUAL, vec![i4, i4], i4, delegate_invoke)
        },
    );
    method(
        scaler,
        MethodDef {
            thunk: scaler_thunk as usize,
            ..MethodDef::new("Invoke", VIRTUAL, vec![r8], r8, delegate_invoke)
        },
    );

    let corlib_assembly = leak(FakeAssembly {
        aname: FakeAssemblyName {
            name: CString::new("mscorlib").unwrap(),
        },
        image: addr(corlib),
    });
    let game_assembly = leak(FakeAssembly {
        aname: FakeAssemblyName {
            name: CString::new("Game").unwrap(),
        },
        image: addr(game),
    });

    World {
        domain: addr(leak(0u64)),
        thread: addr(leak(0u64)),
        corlib,
        game,
        corlib_assembly,
        game_assembly,
        object,
        value_type,
        enum_class,
        string,
        void,
        boolean,
        byte,
        int32,
        int64,
        double,
        exception,
        invalid_op,
        disposable,
        int32_array,
        counter,
        counter_array,
        point,
        color,
        calc,
        binary_op,
        scaler,
        thrower,
        counter_instances,
        calc_add,
    }
}

// ---------------------------------------------------------------------------
// heap

pub unsafe fn read<T: Copy>(address: usize) -> T {
    ptr::read_unaligned(address as *const T)
}

pub unsafe fn write<T>(address: usize, value: T) {
    ptr::write_unaligned(address as *mut T, value)
}

pub fn alloc(class: &FakeClass, size: usize) -> usize {
    let size = size.max(HEADER);
    let words: &'static mut [u64] = Box::leak(vec![0u64; size.div_ceil(8)].into_boxed_slice());
    let object = words.as_mut_ptr() as usize;
    unsafe {
        write(object, class.addr());
        write(object + 8, size);
    }
    object
}

pub fn class_of(object: usize) -> &'static FakeClass {
    unsafe { &*(read::<usize>(object) as *const FakeClass) }
}

pub fn new_string_units(units: &[u16]) -> usize {
    let object = alloc(world().string, STRING_CHARS + units.len() * 2 + 2);
    unsafe {
        write(object + STRING_LENGTH, units.len() as i32);
        ptr::copy_nonoverlapping(units.as_ptr(), (object + STRING_CHARS) as *mut u16, units.len());
    }
    object
}

pub fn new_string(text: &str) -> usize {
    new_string_units(&text.encode_utf16().collect::<Vec<_>>())
}

pub fn read_string(object: usize) -> String {
    if object == 0 {
        return String::new();
    }
    unsafe {
        let len = read::<i32>(object + STRING_LENGTH) as usize;
        let units = std::slice::from_raw_parts((object + STRING_CHARS) as *const u16, len);
        String::from_utf16_lossy(units)
    }
}

pub fn box_bytes(class: &FakeClass, bytes: &[u8]) -> usize {
    let object = alloc(class, HEADER + class.value_size as usize);
    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), (object + HEADER) as *mut u8, bytes.len()) };
    object
}

pub fn box_i32(value: i32) -> usize {
    box_bytes(world().int32, &value.to_ne_bytes())
}

pub fn box_f64(value: f64) -> usize {
    box_bytes(world().double, &value.to_ne_bytes())
}

pub fn box_bool(value: bool) -> usize {
    box_bytes(world().boolean, &[value as u8])
}

/// Allocates an `InvalidOperationException` carrying `message`.
pub fn throw(message: &str) -> usize {
    let exception = alloc(world().invalid_op, 24);
    unsafe { write(exception + 16, new_string(message)) };
    exception
}

fn assignable(target: usize, mut class: usize) -> bool {
    while class != 0 {
        let c = unsafe { cls(class as Ptr) };
        if class == target || c.interfaces.lock().unwrap().contains(&target) {
            return true;
        }
        class = c.parent;
    }
    false
}

fn type_layout(ty: &FakeType) -> (usize, usize) {
    if ty.byref {
        return (8, 8);
    }
    match ty.code {
        0x01 => (0, 1),
        0x02 | 0x04 | 0x05 => (1, 1),
        0x03 | 0x06 | 0x07 => (2, 2),
        0x08 | 0x09 | 0x0c => (4, 4),
        0x0a | 0x0b | 0x0d => (8, 8),
        0x18 | 0x19 => (WORD as usize, WORD as usize),
        0x11 => {
            let class = unsafe { cls(ty.class.load(Ordering::SeqCst) as Ptr) };
            (class.value_size as usize, class.align as usize)
        }
        _ => (8, 8),
    }
}

fn type_name(ty: &FakeType) -> String {
    let class = unsafe { cls(ty.class.load(Ordering::SeqCst) as Ptr) };
    let mut name = class.full_name();
    if ty.byref {
        name.push('&');
    }
    name
}

// ---------------------------------------------------------------------------
// per-thread state

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadStats {
    pub attaches: usize,
    pub detaches: usize,
    pub exit_detaches: usize,
    pub names_allocated: usize,
    pub frees: usize,
    pub gchandles_created: usize,
    pub gchandles_freed: usize,
    pub barriers: usize,
    pub invokes: usize,
    pub class_lookups: usize,
    pub method_lookups: usize,
    pub thunk_requests: usize,
    pub type_sizes: usize,
    pub class_inits: usize,
    pub object_inits: usize,
    pub value_boxes: usize,
    /// Handles created with the pinned flag set.
    pub pins: usize,
    /// Calls into exports that need an attached thread made without one.
    pub unattached_calls: usize,
}

thread_local! {
    static ATTACHED: Cell<bool> = const { Cell::new(false) };
    static SHUTTING_DOWN: Cell<bool> = const { Cell::new(false) };
    static FAIL_ATTACH: Cell<bool> = const { Cell::new(false) };
    static STATS: Cell<ThreadStats> = Cell::new(ThreadStats::default());
}

fn bump(update: impl FnOnce(&mut ThreadStats)) {
    STATS.with(|s| {
        let mut stats = s.get();
        update(&mut stats);
        s.set(stats);
    });
}

/// Records a call into an export that requires an attached thread.
fn enter() {
    if !is_attached() {
        bump(|s| s.unattached_calls += 1);
    }
}

pub fn stats() -> ThreadStats {
    STATS.with(Cell::get)
}

pub fn is_attached() -> bool {
    ATTACHED.with(Cell::get)
}

pub fn set_attached(attached: bool) {
    ATTACHED.with(|a| a.set(attached));
}

pub fn set_shutting_down(shutting_down: bool) {
    SHUTTING_DOWN.with(|s| s.set(shutting_down));
}

pub fn set_fail_attach(fail: bool) {
    FAIL_ATTACH.with(|f| f.set(fail));
}

struct GcEntry {
    target: usize,
    weak: bool,
}

fn gc_table() -> &'static Mutex<HashMap<u32, GcEntry>> {
    static TABLE: OnceLock<Mutex<HashMap<u32, GcEntry>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

static NEXT_HANDLE: AtomicU32 = AtomicU32::new(1);

/// Simulates a collection of `object`: weak handles onto it go null.
pub fn collect(object: usize) {
    for entry in gc_table().lock().unwrap().values_mut() {
        if entry.weak && entry.target == object {
            entry.target = 0;
        }
    }
}

pub fn gchandle_is_live(id: u32) -> bool {
    gc_table().lock().unwrap().contains_key(&id)
}

fn icall_table() -> &'static Mutex<HashMap<String, usize>> {
    static TABLE: OnceLock<Mutex<HashMap<String, usize>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

pub fn icall(name: &str) -> Option<usize> {
    icall_table().lock().unwrap().get(name).copied()
}

// ---------------------------------------------------------------------------
// managed method bodies

fn counter_cctor() {
    unsafe { write(world().counter_instances.storage, 7i32) };
}

fn object_to_string(this: usize, _: &[usize]) -> Result<usize, usize> {
    Ok(new_string(&class_of(this).full_name()))
}

fn calc_add(_: usize, args: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(box_i32(read::<i32>(args[0]).wrapping_add(read::<i32>(args[1])))) }
}

fn calc_add3(_: usize, args: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(box_i32(read::<i32>(args[0]) + read::<i32>(args[1]) + read::<i32>(args[2]))) }
}

fn calc_concat(_: usize, args: &[usize]) -> Result<usize, usize> {
    Ok(new_string(&(read_string(args[0]) + &read_string(args[1]))))
}

fn calc_fail(_: usize, _: &[usize]) -> Result<usize, usize> {
    Err(throw("boom"))
}

fn calc_negate(_: usize, args: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(box_f64(-read::<f64>(args[0]))) }
}

fn calc_not(_: usize, args: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(box_bool(read::<u8>(args[0]) == 0)) }
}

fn calc_paint(_: usize, args: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(box_i32(read::<i32>(args[0]) * 10)) }
}

fn calc_point_sum(_: usize, args: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(box_i32(read::<i32>(args[0]) + read::<i32>(args[0] + 4))) }
}

fn calc_try_parse(_: usize, args: &[usize]) -> Result<usize, usize> {
    match read_string(args[0]).parse::<i32>() {
        Ok(value) => {
            if args[1] != 0 {
                unsafe { write(args[1], value) };
            }
            Ok(box_bool(true))
        }
        Err(_) => Ok(box_bool(false)),
    }
}

fn calc_bump(_: usize, args: &[usize]) -> Result<usize, usize> {
    let counter = args[0];
    unsafe { write(counter + 16, read::<i32>(counter + 16) + 1) };
    Ok(counter)
}

fn calc_identity(_: usize, args: &[usize]) -> Result<usize, usize> {
    Ok(args[0])
}

fn calc_make_color(_: usize, _: &[usize]) -> Result<usize, usize> {
    Ok(box_bytes(world().color, &2i32.to_ne_bytes()))
}

fn calc_nothing(_: usize, _: &[usize]) -> Result<usize, usize> {
    Ok(0)
}

fn counter_increment(this: usize, args: &[usize]) -> Result<usize, usize> {
    unsafe { write(this + 16, read::<i32>(this + 16) + read::<i32>(args[0])) };
    Ok(0)
}

fn counter_get(this: usize, _: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(box_i32(read::<i32>(this + 16))) }
}

fn counter_get_label(this: usize, _: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(read::<usize>(this + 32)) }
}

fn counter_set_label(this: usize, args: &[usize]) -> Result<usize, usize> {
    unsafe { write(this + 32, args[0]) };
    Ok(0)
}

fn counter_to_string(this: usize, _: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(new_string(&format!("Counter({})", read::<i32>(this + 16)))) }
}

fn point_sum(this: usize, _: &[usize]) -> Result<usize, usize> {
    unsafe { Ok(box_i32(read::<i32>(this) + read::<i32>(this + 4))) }
}

fn delegate_invoke(_: usize, _: &[usize]) -> Result<usize, usize> {
    Err(throw("delegates are called through their thunk"))
}

extern "C" fn add_native(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

unsafe extern "C" fn binary_op_thunk(_this: Ptr, a: i32, b: i32, exc: *mut Ptr) -> i32 {
    if a < 0 {
        *exc = throw("negative") as Ptr;
        return 0;
    }
    a - b
}

unsafe extern "C" fn scaler_thunk(_this: Ptr, x: f64, _exc: *mut Ptr) -> f64 {
    x * 2.5
}

pub extern "C" fn icall_log() {}

pub extern "C" fn icall_log_v2() {}

// ---------------------------------------------------------------------------
// the embedding API

unsafe fn cls<'a>(p: Ptr) -> &'a FakeClass {
    &*(p as *const FakeClass)
}

unsafe fn fty<'a>(p: Ptr) -> &'a FakeType {
    &*(p as *const FakeType)
}

unsafe fn meth<'a>(p: Ptr) -> &'a FakeMethod {
    &*(p as *const FakeMethod)
}

unsafe fn fld<'a>(p: Ptr) -> &'a FakeField {
    &*(p as *const FakeField)
}

unsafe fn prop<'a>(p: Ptr) -> &'a FakeProperty {
    &*(p as *const FakeProperty)
}

unsafe fn img<'a>(p: Ptr) -> &'a FakeImage {
    &*(p as *const FakeImage)
}

unsafe fn next_item(items: &[usize], iter: *mut Ptr) -> Ptr {
    let index = *iter as usize;
    match items.get(index) {
        Some(&item) => {
            *iter = (index + 1) as Ptr;
            item as Ptr
        }
        None => ptr::null_mut(),
    }
}

fn owned_c_string(text: String) -> *mut c_char {
    bump(|s| s.names_allocated += 1);
    CString::new(text).unwrap().into_raw()
}

extern "C" fn get_root_domain() -> Ptr {
    world().domain as Ptr
}

unsafe extern "C" fn jit_init(_name: *const c_char) -> Ptr {
    world().domain as Ptr
}

extern "C" fn thread_current() -> Ptr {
    if is_attached() {
        world().thread as Ptr
    } else {
        ptr::null_mut()
    }
}

extern "C" fn thread_attach(_domain: Ptr) -> Ptr {
    if FAIL_ATTACH.with(Cell::get) {
        return ptr::null_mut();
    }
    set_attached(true);
    bump(|s| s.attaches += 1);
    world().thread as Ptr
}

extern "C" fn thread_detach(_thread: Ptr) {
    set_attached(false);
    bump(|s| s.detaches += 1);
}

extern "C" fn thread_detach_if_exiting() -> i32 {
    set_attached(false);
    bump(|s| s.exit_detaches += 1);
    1
}

extern "C" fn runtime_is_shutting_down() -> i32 {
    SHUTTING_DOWN.with(Cell::get) as i32
}

unsafe extern "C" fn assembly_foreach(func: unsafe extern "C" fn(Ptr, Ptr), data: Ptr) {
    let w = world();
    for assembly in [addr(w.corlib_assembly), addr(w.game_assembly)] {
        func(assembly as Ptr, data);
    }
}

unsafe extern "C" fn domain_assembly_open(_domain: Ptr, path: *const c_char) -> Ptr {
    let path = CStr::from_ptr(path).to_string_lossy();
    if path.ends_with("Game.dll") {
        addr(world().game_assembly) as Ptr
    } else {
        ptr::null_mut()
    }
}

unsafe extern "C" fn assembly_get_image(assembly: Ptr) -> Ptr {
    (*(assembly as *const FakeAssembly)).image as Ptr
}

unsafe extern "C" fn assembly_get_name(assembly: Ptr) -> Ptr {
    &(*(assembly as *const FakeAssembly)).aname as *const FakeAssemblyName as Ptr
}

unsafe extern "C" fn assembly_name_get_name(name: Ptr) -> *const c_char {
    (*(name as *const FakeAssemblyName)).name.as_ptr()
}

unsafe extern "C" fn image_get_name(image: Ptr) -> *const c_char {
    img(image).name.as_ptr()
}

unsafe extern "C" fn image_get_filename(image: Ptr) -> *const c_char {
    img(image).filename.as_ptr()
}

unsafe extern "C" fn image_loaded(name: *const c_char) -> Ptr {
    let w = world();
    match CStr::from_ptr(name).to_bytes() {
        b"mscorlib" => addr(w.corlib) as Ptr,
        b"Game" => addr(w.game) as Ptr,
        _ => ptr::null_mut(),
    }
}

extern "C" fn get_corlib() -> Ptr {
    addr(world().corlib) as Ptr
}

unsafe extern "C" fn image_get_table_info(image: Ptr, table: i32) -> Ptr {
    if table == 2 {
        &img(image).typedefs as *const FakeTable as Ptr
    } else {
        ptr::null_mut()
    }
}

unsafe extern "C" fn table_info_get_rows(table: Ptr) -> i32 {
    (*(table as *const FakeTable)).rows.lock().unwrap().len() as i32
}

unsafe extern "C" fn class_get(image: Ptr, token: u32) -> Ptr {
    let row = (token & 0x00ff_ffff) as usize;
    if token >> 24 != 2 || row == 0 {
        return ptr::null_mut();
    }
    img(image).typedefs.rows.lock().unwrap().get(row - 1).copied().unwrap_or(0) as Ptr
}

unsafe extern "C" fn class_from_name(image: Ptr, namespace: *const c_char, name: *const c_char) -> Ptr {
    bump(|s| s.class_lookups += 1);
    let (namespace, name) = (CStr::from_ptr(namespace), CStr::from_ptr(name));
    img(image)
        .classes
        .lock()
        .unwrap()
        .iter()
        .copied()
        .find(|&c| {
            let c = cls(c as Ptr);
            c.namespace.as_c_str() == namespace && c.name.as_c_str() == name
        })
        .unwrap_or(0) as Ptr
}

unsafe extern "C" fn class_get_name(class: Ptr) -> *const c_char {
    cls(class).name.as_ptr()
}

unsafe extern "C" fn class_get_namespace(class: Ptr) -> *const c_char {
    cls(class).namespace.as_ptr()
}

unsafe extern "C" fn class_get_parent(class: Ptr) -> Ptr {
    cls(class).parent as Ptr
}

unsafe extern "C" fn class_get_image(class: Ptr) -> Ptr {
    cls(class).image as Ptr
}

unsafe extern "C" fn class_get_type(class: Ptr) -> Ptr {
    cls(class).ty() as Ptr
}

unsafe extern "C" fn class_get_flags(class: Ptr) -> u32 {
    cls(class).flags
}

unsafe extern "C" fn class_is_valuetype(class: Ptr) -> i32 {
    cls(class).value_type as i32
}

unsafe extern "C" fn class_is_enum(class: Ptr) -> i32 {
    (cls(class).enum_base != 0) as i32
}

unsafe extern "C" fn class_enum_basetype(class: Ptr) -> Ptr {
    cls(class).enum_base as Ptr
}

unsafe extern "C" fn class_get_element_class(class: Ptr) -> Ptr {
    match cls(class).element {
        0 => class,
        element => element as Ptr,
    }
}

unsafe extern "C" fn class_is_assignable_from(class: Ptr, other: Ptr) -> i32 {
    assignable(class as usize, other as usize) as i32
}

unsafe extern "C" fn class_instance_size(class: Ptr) -> i32 {
    enter();
    cls(class).instance_size
}

unsafe extern "C" fn class_value_size(class: Ptr, align: *mut u32) -> i32 {
    let class = cls(class);
    if !align.is_null() {
        *align = class.align;
    }
    class.value_size
}

unsafe extern "C" fn class_array_element_size(class: Ptr) -> i32 {
    let class = cls(class);
    if class.value_type {
        class.value_size
    } else {
        8
    }
}

unsafe extern "C" fn class_get_methods(class: Ptr, iter: *mut Ptr) -> Ptr {
    let items = cls(class).methods.lock().unwrap().clone();
    next_item(&items, iter)
}

unsafe extern "C" fn class_get_fields(class: Ptr, iter: *mut Ptr) -> Ptr {
    let items = cls(class).fields.lock().unwrap().clone();
    next_item(&items, iter)
}

unsafe extern "C" fn class_get_properties(class: Ptr, iter: *mut Ptr) -> Ptr {
    let items = cls(class).properties.lock().unwrap().clone();
    next_item(&items, iter)
}

unsafe extern "C" fn class_get_interfaces(class: Ptr, iter: *mut Ptr) -> Ptr {
    let items = cls(class).interfaces.lock().unwrap().clone();
    next_item(&items, iter)
}

unsafe extern "C" fn class_get_method_from_name(class: Ptr, name: *const c_char, argc: i32) -> Ptr {
    bump(|s| s.method_lookups += 1);
    let name = CStr::from_ptr(name);
    let methods = cls(class).methods.lock().unwrap().clone();
    methods
        .into_iter()
        .find(|&m| {
            let m = meth(m as Ptr);
            m.name.as_c_str() == name && (argc < 0 || m.sig.params.len() == argc as usize)
        })
        .unwrap_or(0) as Ptr
}

unsafe extern "C" fn class_get_field_from_name(class: Ptr, name: *const c_char) -> Ptr {
    let name = CStr::from_ptr(name);
    let fields = cls(class).fields.lock().unwrap().clone();
    fields
        .into_iter()
        .find(|&f| fld(f as Ptr).name.as_c_str() == name)
        .unwrap_or(0) as Ptr
}

unsafe extern "C" fn class_get_property_from_name(class: Ptr, name: *const c_char) -> Ptr {
    let name = CStr::from_ptr(name);
    let properties = cls(class).properties.lock().unwrap().clone();
    properties
        .into_iter()
        .find(|&p| prop(p as Ptr).name.as_c_str() == name)
        .unwrap_or(0) as Ptr
}

unsafe extern "C" fn class_vtable(_domain: Ptr, class: Ptr) -> Ptr {
    &cls(class).vtable as *const FakeVTable as Ptr
}

unsafe extern "C" fn runtime_class_init(vtable: Ptr) {
    bump(|s| s.class_inits += 1);
    let class = cls((*(vtable as *const FakeVTable)).class.load(Ordering::SeqCst) as Ptr);
    if class.cctor_runs.fetch_add(1, Ordering::SeqCst) == 0 {
        if let Some(cctor) = class.cctor {
            cctor();
        }
    }
}

unsafe extern "C" fn class_from_mono_type(ty: Ptr) -> Ptr {
    fty(ty).class.load(Ordering::SeqCst) as Ptr
}

unsafe extern "C" fn type_get_type(ty: Ptr) -> i32 {
    enter();
    fty(ty).code as i32
}

unsafe extern "C" fn type_get_name(ty: Ptr) -> *mut c_char {
    owned_c_string(type_name(fty(ty)))
}

unsafe extern "C" fn type_get_name_full(ty: Ptr, _format: i32) -> *mut c_char {
    owned_c_string(type_name(fty(ty)))
}

unsafe extern "C" fn type_is_byref(ty: Ptr) -> i32 {
    fty(ty).byref as i32
}

unsafe extern "C" fn type_size(ty: Ptr, align: *mut i32) -> i32 {
    enter();
    bump(|s| s.type_sizes += 1);
    let (size, alignment) = type_layout(fty(ty));
    if !align.is_null() {
        *align = alignment as i32;
    }
    size as i32
}

unsafe extern "C" fn type_get_underlying_type(ty: Ptr) -> Ptr {
    let class = cls(fty(ty).class.load(Ordering::SeqCst) as Ptr);
    match class.enum_base {
        0 => ty,
        base => base as Ptr,
    }
}

unsafe extern "C" fn mono_free(p: Ptr) {
    bump(|s| s.frees += 1);
    drop(CString::from_raw(p as *mut c_char));
}

unsafe extern "C" fn method_get_name(method: Ptr) -> *const c_char {
    meth(method).name.as_ptr()
}

unsafe extern "C" fn method_get_class(method: Ptr) -> Ptr {
    meth(method).class as Ptr
}

unsafe extern "C" fn method_get_flags(method: Ptr, iflags: *mut u32) -> u32 {
    if !iflags.is_null() {
        *iflags = 0;
    }
    meth(method).flags
}

unsafe extern "C" fn method_signature(method: Ptr) -> Ptr {
    enter();
    &meth(method).sig as *const FakeSig as Ptr
}

unsafe fn sig<'a>(p: Ptr) -> &'a FakeSig {
    &*(p as *const FakeSig)
}

unsafe extern "C" fn signature_get_param_count(s: Ptr) -> u32 {
    sig(s).declared
}

unsafe extern "C" fn signature_get_params(s: Ptr, iter: *mut Ptr) -> Ptr {
    next_item(&sig(s).params, iter)
}

unsafe extern "C" fn signature_get_return_type(s: Ptr) -> Ptr {
    sig(s).ret as Ptr
}

unsafe extern "C" fn signature_param_is_out(s: Ptr, index: i32) -> i32 {
    sig(s).out.get(index as usize).copied().unwrap_or(false) as i32
}

unsafe extern "C" fn signature_get_call_conv(_s: Ptr) -> u32 {
    0
}

unsafe extern "C" fn runtime_invoke(method: Ptr, this: Ptr, params: *mut Ptr, exc: *mut Ptr) -> Ptr {
    enter();
    bump(|s| s.invokes += 1);
    let method = meth(method);
    let count = method.sig.params.len();
    let args: Vec<usize> = if count == 0 {
        vec![]
    } else {
        std::slice::from_raw_parts(params, count).iter().map(|p| *p as usize).collect()
    };
    match (method.imp)(this as usize, &args) {
        Ok(result) => result as Ptr,
        Err(exception) => {
            if !exc.is_null() {
                *exc = exception as Ptr;
            }
            ptr::null_mut()
        }
    }
}

unsafe extern "C" fn compile_method(method: Ptr) -> Ptr {
    meth(method).native as Ptr
}

unsafe extern "C" fn method_get_unmanaged_thunk(method: Ptr) -> Ptr {
    bump(|s| s.thunk_requests += 1);
    meth(method).thunk as Ptr
}

unsafe extern "C" fn field_get_name(field: Ptr) -> *const c_char {
    fld(field).name.as_ptr()
}

unsafe extern "C" fn field_get_type(field: Ptr) -> Ptr {
    fld(field).ty as Ptr
}

unsafe extern "C" fn field_get_parent(field: Ptr) -> Ptr {
    fld(field).parent as Ptr
}

unsafe extern "C" fn field_get_offset(field: Ptr) -> u32 {
    fld(field).offset
}

unsafe extern "C" fn field_get_flags(field: Ptr) -> u32 {
    fld(field).flags
}

unsafe fn field_size(field: &FakeField) -> usize {
    type_layout(fty(field.ty as Ptr)).0
}

unsafe extern "C" fn field_set_value(object: Ptr, field: Ptr, value: Ptr) {
    let field = fld(field);
    ptr::copy_nonoverlapping(
        value as *const u8,
        (object as usize + field.offset as usize) as *mut u8,
        field_size(field),
    );
}

unsafe extern "C" fn field_static_get_value(_vtable: Ptr, field: Ptr, out: Ptr) {
    let field = fld(field);
    ptr::copy_nonoverlapping(field.storage as *const u8, out as *mut u8, field_size(field));
}

unsafe extern "C" fn field_static_set_value(_vtable: Ptr, field: Ptr, value: Ptr) {
    let field = fld(field);
    ptr::copy_nonoverlapping(value as *const u8, field.storage as *mut u8, field_size(field));
}

unsafe extern "C" fn property_get_name(property: Ptr) -> *const c_char {
    prop(property).name.as_ptr()
}

unsafe extern "C" fn property_get_parent(property: Ptr) -> Ptr {
    prop(property).parent as Ptr
}

unsafe extern "C" fn property_get_get_method(property: Ptr) -> Ptr {
    prop(property).getter as Ptr
}

unsafe extern "C" fn property_get_set_method(property: Ptr) -> Ptr {
    prop(property).setter as Ptr
}

unsafe extern "C" fn object_new(_domain: Ptr, class: Ptr) -> Ptr {
    enter();
    let class = cls(class);
    alloc(class, class.instance_size as usize) as Ptr
}

unsafe extern "C" fn object_get_class(object: Ptr) -> Ptr {
    enter();
    read::<usize>(object as usize) as Ptr
}

unsafe extern "C" fn object_unbox(object: Ptr) -> Ptr {
    enter();
    (object as usize + HEADER) as Ptr
}

unsafe extern "C" fn object_clone(object: Ptr) -> Ptr {
    let source = object as usize;
    let size = read::<usize>(source + 8);
    let copy = alloc(class_of(source), size);
    ptr::copy_nonoverlapping(source as *const u8, copy as *mut u8, size);
    copy as Ptr
}

unsafe extern "C" fn object_to_string_export(object: Ptr, exc: *mut Ptr) -> Ptr {
    let w = world();
    let class = class_of(object as usize);
    if class.addr() == w.thrower.addr() {
        if !exc.is_null() {
            *exc = throw("no string for you") as Ptr;
        }
        return ptr::null_mut();
    }
    let result = if class.addr() == w.counter.addr() {
        counter_to_string(object as usize, &[])
    } else {
        object_to_string(object as usize, &[])
    };
    result.unwrap_or(0) as Ptr
}

unsafe extern "C" fn value_box(_domain: Ptr, class: Ptr, data: Ptr) -> Ptr {
    enter();
    bump(|s| s.value_boxes += 1);
    let class = cls(class);
    let bytes = std::slice::from_raw_parts(data as *const u8, class.value_size as usize);
    box_bytes(class, bytes) as Ptr
}

unsafe extern "C" fn runtime_object_init(object: Ptr) {
    enter();
    bump(|s| s.object_inits += 1);
    if class_of(object as usize).addr() == world().counter.addr() {
        write(object as usize + 16, 1i32);
    }
}

unsafe extern "C" fn string_new(_domain: Ptr, text: *const c_char) -> Ptr {
    enter();
    new_string(&CStr::from_ptr(text).to_string_lossy()) as Ptr
}

unsafe extern "C" fn string_new_utf16(_domain: Ptr, text: *const u16, len: i32) -> Ptr {
    new_string_units(std::slice::from_raw_parts(text, len as usize)) as Ptr
}

unsafe extern "C" fn string_length(string: Ptr) -> i32 {
    enter();
    read::<i32>(string as usize + STRING_LENGTH)
}

unsafe extern "C" fn string_chars(string: Ptr) -> *mut u16 {
    (string as usize + STRING_CHARS) as *mut u16
}

unsafe extern "C" fn string_to_utf8(string: Ptr) -> *mut c_char {
    owned_c_string(read_string(string as usize))
}

unsafe extern "C" fn array_new(_domain: Ptr, element: Ptr, len: usize) -> Ptr {
    let element = cls(element);
    let array_class = element.array_class.load(Ordering::SeqCst);
    if array_class == 0 {
        return ptr::null_mut();
    }
    let element_size = class_array_element_size(element as *const FakeClass as Ptr) as usize;
    let array = alloc(cls(array_class as Ptr), ARRAY_DATA + len * element_size);
    write(array + ARRAY_LENGTH, len);
    array as Ptr
}

unsafe extern "C" fn array_length(array: Ptr) -> usize {
    read::<usize>(array as usize + ARRAY_LENGTH)
}

unsafe extern "C" fn array_addr_with_size(array: Ptr, size: i32, index: usize) -> *mut c_char {
    (array as usize + ARRAY_DATA + size as usize * index) as *mut c_char
}

unsafe extern "C" fn gc_wbarrier_set_arrayref(_array: Ptr, slot: Ptr, value: Ptr) {
    bump(|s| s.barriers += 1);
    write(slot as usize, value as usize);
}

fn new_gchandle(object: Ptr, weak: bool) -> u32 {
    bump(|s| s.gchandles_created += 1);
    let id = NEXT_HANDLE.fetch_add(1, Ordering::SeqCst);
    gc_table().lock().unwrap().insert(
        id,
        GcEntry {
            target: object as usize,
            weak,
        },
    );
    id
}

extern "C" fn gchandle_new(object: Ptr, pinned: i32) -> u32 {
    enter();
    if pinned != 0 {
        bump(|s| s.pins += 1);
    }
    new_gchandle(object, false)
}

extern "C" fn gchandle_new_weakref(object: Ptr, _track_resurrection: i32) -> u32 {
    new_gchandle(object, true)
}

extern "C" fn gchandle_get_target(id: u32) -> Ptr {
    gc_table().lock().unwrap().get(&id).map_or(0, |e| e.target) as Ptr
}

extern "C" fn gchandle_free(id: u32) {
    bump(|s| s.gchandles_freed += 1);
    gc_table().lock().unwrap().remove(&id);
}

unsafe extern "C" fn add_internal_call(name: *const c_char, function: Ptr) {
    let name = CStr::from_ptr(name).to_string_lossy().into_owned();
    icall_table().lock().unwrap().insert(name, function as usize);
}

macro_rules! export_list {
    ($($name:literal => $f:expr),* $(,)?) => {
        vec![$(($name, $f as usize)),*]
    };
}

/// Every export the fake provides. A few are registered under the alternate
/// names some Mono builds use.
pub fn exports() -> Vec<(&'static str, usize)> {
    export_list! {
        "mono_get_root_domain" => get_root_domain,
        "mono_jit_init" => jit_init,
        "mono_thread_current" => thread_current,
        "mono_thread_attach" => thread_attach,
        "mono_thread_detach" => thread_detach,
        "mono_thread_detach_if_exiting" => thread_detach_if_exiting,
        "mono_runtime_is_shutting_down" => runtime_is_shutting_down,
        "mono_assembly_foreach" => assembly_foreach,
        "mono_domain_assembly_open" => domain_assembly_open,
        "mono_assembly_get_image" => assembly_get_image,
        "mono_assembly_get_name" => assembly_get_name,
        "mono_assembly_name_get_name" => assembly_name_get_name,
        "mono_image_get_name" => image_get_name,
        "mono_image_get_filename" => image_get_filename,
        "mono_image_loaded" => image_loaded,
        "mono_get_corlib" => get_corlib,
        "mono_image_get_table_info" => image_get_table_info,
        "mono_table_info_get_rows" => table_info_get_rows,
        "mono_unity_class_get" => class_get,
        "mono_class_from_name" => class_from_name,
        "mono_class_get_name" => class_get_name,
        "mono_class_get_namespace" => class_get_namespace,
        "mono_class_get_parent" => class_get_parent,
        "mono_class_get_image" => class_get_image,
        "mono_class_get_type" => class_get_type,
        "mono_class_get_flags" => class_get_flags,
        "mono_class_is_valuetype" => class_is_valuetype,
        "mono_class_is_enum" => class_is_enum,
        "mono_class_enum_basetype" => class_enum_basetype,
        "mono_class_get_element_class" => class_get_element_class,
        "mono_class_is_assignable_from" => class_is_assignable_from,
        "mono_class_instance_size" => class_instance_size,
        "mono_class_value_size" => class_value_size,
        "mono_class_array_element_size" => class_array_element_size,
        "mono_class_get_methods" => class_get_methods,
        "mono_class_get_fields" => class_get_fields,
        "mono_class_get_properties" => class_get_properties,
        "mono_class_get_interfaces" => class_get_interfaces,
        "mono_class_get_method_from_name" => class_get_method_from_name,
        "mono_class_get_field_from_name" => class_get_field_from_name,
        "mono_class_get_property_from_name" => class_get_property_from_name,
        "mono_class_vtable" => class_vtable,
        "mono_runtime_class_init" => runtime_class_init,
        "mono_class_from_mono_type_internal" => class_from_mono_type,
        "mono_type_get_type" => type_get_type,
        "mono_type_get_name" => type_get_name,
        "mono_type_get_name_full" => type_get_name_full,
        "mono_type_is_byref" => type_is_byref,
        "mono_type_size" => type_size,
        "mono_type_get_underlying_type" => type_get_underlying_type,
        "mono_type_get_class" => class_from_mono_type,
        "mono_free" => mono_free,
        "mono_method_get_name" => method_get_name,
        "mono_method_get_class" => method_get_class,
        "mono_method_get_flags" => method_get_flags,
        "mono_method_signature" => method_signature,
        "mono_signature_get_param_count" => signature_get_param_count,
        "mono_signature_get_params" => signature_get_params,
        "mono_signature_get_return_type" => signature_get_return_type,
        "mono_signature_param_is_out" => signature_param_is_out,
        "mono_signature_get_call_conv" => signature_get_call_conv,
        "mono_runtime_invoke" => runtime_invoke,
        "mono_compile_method" => compile_method,
        "mono_method_get_unmanaged_thunk" => method_get_unmanaged_thunk,
        "mono_field_get_name" => field_get_name,
        "mono_field_get_type" => field_get_type,
        "mono_field_get_parent" => field_get_parent,
        "mono_field_get_offset" => field_get_offset,
        "mono_field_get_flags" => field_get_flags,
        "mono_field_set_value" => field_set_value,
        "mono_field_static_get_value" => field_static_get_value,
        "mono_field_static_set_value" => field_static_set_value,
        "mono_property_get_name" => property_get_name,
        "mono_property_get_parent" => property_get_parent,
        "mono_property_get_get_method" => property_get_get_method,
        "mono_property_get_set_method" => property_get_set_method,
        "mono_object_new" => object_new,
        "mono_object_get_class" => object_get_class,
        "mono_object_unbox" => object_unbox,
        "mono_object_clone" => object_clone,
        "mono_object_to_string" => object_to_string_export,
        "mono_value_box" => value_box,
        "mono_runtime_object_init" => runtime_object_init,
        "mono_string_new" => string_new,
        "mono_string_new_utf16" => string_new_utf16,
        "mono_string_length" => string_length,
        "mono_string_chars" => string_chars,
        "mono_string_to_utf8" => string_to_utf8,
        "mono_array_new" => array_new,
        "mono_array_length" => array_length,
        "mono_array_addr_with_size" => array_addr_with_size,
        "mono_gc_wbarrier_set_arrayref" => gc_wbarrier_set_arrayref,
        "mono_gchandle_new" => gchandle_new,
        "mono_gchandle_new_weakref" => gchandle_new_weakref,
        "mono_gchandle_get_target" => gchandle_get_target,
        "mono_gchandle_free" => gchandle_free,
        "mono_add_internal_call" => add_internal_call,
    }
}

pub fn export_table_without(skip: &[&str]) -> ExportTable {
    let mut table = ExportTable::absolute();
    for (name, address) in exports() {
        if !skip.contains(&name) {
            table.insert(name, address);
        }
    }
    table
}

pub fn try_runtime(config: BridgeConfig, skip: &[&str]) -> Result<Arc<MonoRuntime>, BridgeError> {
    world();
    MonoRuntime::new(export_table_without(skip), config)
}

pub fn runtime() -> Arc<MonoRuntime> {
    runtime_with(BridgeConfig::default())
}

pub fn runtime_with(config: BridgeConfig) -> Arc<MonoRuntime> {
    try_runtime(config, &[]).expect("fake runtime binds")
}

pub fn runtime_without(skip: &[&str]) -> Arc<MonoRuntime> {
    try_runtime(BridgeConfig::default(), skip).expect("fake runtime binds")
}

/// Resets the calling thread's fake attachment state when dropped.
pub struct ThreadReset;

impl Drop for ThreadReset {
    fn drop(&mut self) {
        set_attached(false);
        set_shutting_down(false);
        set_fail_attach(false);
    }
}
