//! Build-time table of native functions and classes
//!
//! A [`Registry`] is filled once at startup and is read-only afterwards; a
//! host installs it into each runtime it creates. Names are validated
//! here so installation cannot fail.

use super::callable::{Invoker, NativeArg, NativeFn, NativeMethod, NativeReturn, Receiver};
use super::instance::InstanceVTable;
use super::marshal::{marshal_property, marshal_to_native, marshal_to_script};
use super::types::{NativeValue, ScriptValue, ValueType};
use crate::allocator::ALIGNMENT;
use crate::error::{BridgeError, RegistryError};
use std::any::Any;
use std::ffi::{CStr, CString};
use std::fmt;
use std::marker::PhantomData;

/// A native function or method with its signature
pub struct NativeCallable {
    name: String,
    c_name: CString,
    params: Vec<ValueType>,
    returns: ValueType,
    is_method: bool,
    invoker: Invoker,
}

impl NativeCallable {
    fn function<Args, F: NativeFn<Args>>(name: &str, f: F) -> Result<Self, RegistryError> {
        Ok(Self {
            name: name.to_string(),
            c_name: checked_name(name)?,
            params: F::params(),
            returns: F::returns(),
            is_method: false,
            invoker: f.into_invoker(name),
        })
    }

    fn method<T, Args, F: NativeMethod<T, Args>>(name: &str, f: F) -> Result<Self, RegistryError> {
        Ok(Self {
            name: name.to_string(),
            c_name: checked_name(name)?,
            params: F::params(),
            returns: F::returns(),
            is_method: true,
            invoker: f.into_invoker(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn c_name(&self) -> &CStr {
        &self.c_name
    }

    /// Declared parameter types, receiver excluded
    pub fn params(&self) -> &[ValueType] {
        &self.params
    }

    pub fn returns(&self) -> ValueType {
        self.returns
    }

    /// Whether the callable expects an instance receiver
    pub fn is_method(&self) -> bool {
        self.is_method
    }

    /// Marshal `args`, invoke, and marshal the result back
    ///
    /// The native target is not invoked when marshalling fails.
    pub fn invoke(&self, receiver: Option<Receiver<'_>>, args: &[ScriptValue]) -> Result<Option<ScriptValue>, BridgeError> {
        if self.is_method && receiver.is_none() {
            return Err(BridgeError::ExpectedObject {
                callable: self.name.clone(),
            });
        }

        let native = marshal_to_native(&self.name, args, &self.params)?;
        let result = (self.invoker)(receiver, &native)?;
        marshal_to_script(&result)
    }
}

impl fmt::Debug for NativeCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCallable")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("is_method", &self.is_method)
            .finish()
    }
}

type Getter = Box<dyn Fn(&(dyn Any + 'static)) -> Option<NativeValue>>;
type Setter = Box<dyn Fn(Receiver<'_>, &NativeValue) -> bool>;

/// A declared, typed field of a native class
pub struct NativeProperty {
    name: String,
    ty: ValueType,
    get: Getter,
    set: Setter,
}

impl NativeProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }

    /// Read the property from an instance, marshalled for script
    pub fn read(&self, instance: &(dyn Any + 'static)) -> Result<Option<ScriptValue>, BridgeError> {
        let value = (self.get)(instance).ok_or_else(|| self.not_an_instance())?;
        marshal_to_script(&value).map_err(|_| BridgeError::PropertyType {
            property: self.name.clone(),
            expected: self.ty,
            found: value.ty().name(),
        })
    }

    /// Type-check `value` and assign it
    pub fn write(&self, instance: Receiver<'_>, value: &ScriptValue) -> Result<(), BridgeError> {
        let native = marshal_property(&self.name, value, self.ty)?;
        if (self.set)(instance, &native) {
            Ok(())
        } else {
            Err(self.not_an_instance())
        }
    }

    fn not_an_instance(&self) -> BridgeError {
        BridgeError::ExpectedObject {
            callable: self.name.clone(),
        }
    }
}

impl fmt::Debug for NativeProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeProperty")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .finish()
    }
}

/// A registered native type
pub struct NativeClass {
    name: String,
    c_name: CString,
    metatable: CString,
    vtable: InstanceVTable,
    properties: Vec<NativeProperty>,
    methods: Vec<NativeCallable>,
}

impl NativeClass {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn c_name(&self) -> &CStr {
        &self.c_name
    }

    /// Registry key of the instance metatable
    pub(crate) fn metatable(&self) -> &CStr {
        &self.metatable
    }

    pub(crate) fn vtable(&self) -> &InstanceVTable {
        &self.vtable
    }

    pub fn properties(&self) -> &[NativeProperty] {
        &self.properties
    }

    pub fn methods(&self) -> &[NativeCallable] {
        &self.methods
    }

    pub fn property(&self, name: &str) -> Option<&NativeProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&NativeCallable> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl fmt::Debug for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClass")
            .field("name", &self.name)
            .field("layout", &self.vtable.layout)
            .field("properties", &self.properties)
            .field("methods", &self.methods)
            .finish()
    }
}

/// Declares the members of a native class `T`
///
/// ```ignore
/// registry.class(
///     ClassBuilder::<Sprite>::new("Sprite")
///         .property("x", |s| s.x, |s, v| s.x = v)
///         .method("Move", |s: &mut Sprite, dx: i32, dy: i32| s.translate(dx, dy)),
/// )?;
/// ```
pub struct ClassBuilder<T> {
    name: String,
    properties: Vec<(String, ValueType, Getter, Setter)>,
    methods: Vec<Result<NativeCallable, RegistryError>>,
    _type: PhantomData<fn() -> T>,
}

impl<T: Default + 'static> ClassBuilder<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
            methods: Vec::new(),
            _type: PhantomData,
        }
    }

    /// Declare a typed property through a getter and a setter
    pub fn property<V, G, S>(mut self, name: &str, get: G, set: S) -> Self
    where
        V: NativeArg + NativeReturn,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        let getter: Getter = Box::new(move |instance: &(dyn Any + 'static)| {
            instance.downcast_ref::<T>().map(|this| get(this).into_native())
        });
        let setter: Setter = Box::new(move |instance: Receiver<'_>, value: &NativeValue| {
            match (instance.downcast_mut::<T>(), V::from_native(value)) {
                (Some(this), Some(value)) => {
                    set(this, value);
                    true
                }
                _ => false,
            }
        });
        self.properties.push((name.to_string(), <V as NativeArg>::TYPE, getter, setter));
        self
    }

    pub fn method<Args, F: NativeMethod<T, Args>>(mut self, name: &str, f: F) -> Self {
        self.methods.push(NativeCallable::method(name, f));
        self
    }

    fn build(self) -> Result<NativeClass, RegistryError> {
        let c_name = checked_name(&self.name)?;
        let vtable = InstanceVTable::of::<T>();
        if vtable.layout.align() > ALIGNMENT {
            return Err(RegistryError::UnsupportedAlignment {
                class: self.name,
                align: vtable.layout.align(),
            });
        }

        let mut seen: Vec<String> = Vec::new();
        let mut claim = |member: &str| {
            if seen.iter().any(|s| s == member) {
                Err(RegistryError::DuplicateMember {
                    class: self.name.clone(),
                    member: member.to_string(),
                })
            } else {
                seen.push(member.to_string());
                Ok(())
            }
        };

        let mut properties = Vec::with_capacity(self.properties.len());
        for (name, ty, get, set) in self.properties {
            checked_name(&name)?;
            claim(&name)?;
            properties.push(NativeProperty { name, ty, get, set });
        }

        let mut methods = Vec::with_capacity(self.methods.len());
        for method in self.methods {
            let method = method?;
            claim(&method.name)?;
            methods.push(method);
        }
        let metatable = CString::new(format!("scriptbridge.{}", self.name))
            .map_err(|_| RegistryError::InvalidName(self.name.clone()))?;

        Ok(NativeClass {
            name: self.name,
            c_name,
            metatable,
            vtable,
            properties,
            methods,
        })
    }
}

/// All native functions and classes exposed to scripts
#[derive(Debug, Default)]
pub struct Registry {
    functions: Vec<NativeCallable>,
    classes: Vec<NativeClass>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a global function
    pub fn function<Args, F: NativeFn<Args>>(&mut self, name: &str, f: F) -> Result<&mut Self, RegistryError> {
        if self.function_named(name).is_some() {
            return Err(RegistryError::DuplicateFunction(name.to_string()));
        }
        self.functions.push(NativeCallable::function(name, f)?);
        Ok(self)
    }

    /// Register a class declared through a [`ClassBuilder`]
    pub fn class<T: Default + 'static>(&mut self, builder: ClassBuilder<T>) -> Result<&mut Self, RegistryError> {
        if self.class_named(&builder.name).is_some() {
            return Err(RegistryError::DuplicateClass(builder.name));
        }
        self.classes.push(builder.build()?);
        Ok(self)
    }

    pub fn functions(&self) -> &[NativeCallable] {
        &self.functions
    }

    pub fn classes(&self) -> &[NativeClass] {
        &self.classes
    }

    pub fn function_named(&self, name: &str) -> Option<&NativeCallable> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn class_named(&self, name: &str) -> Option<&NativeClass> {
        self.classes.iter().find(|c| c.name == name)
    }
}

fn checked_name(name: &str) -> Result<CString, RegistryError> {
    if name.is_empty() {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    CString::new(name).map_err(|_| RegistryError::InvalidName(name.to_string()))
}
