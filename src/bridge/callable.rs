//! Typed closures erased into uniform invokers
//!
//! Design: a closure's parameter and return types are read off its
//! signature once, at registration, through the [`NativeFn`] and
//! [`NativeMethod`] traits. Both are implemented by macro for arities 0-6.
//! What remains at call time is a boxed [`Invoker`] over already
//! marshalled [`NativeValue`]s.

use super::types::{NativeValue, ValueType};
use crate::error::BridgeError;
use std::any::Any;

/// Instance a method is invoked on
pub type Receiver<'a> = &'a mut (dyn Any + 'static);

/// Erased call target: optional receiver plus marshalled arguments
pub type Invoker = Box<dyn Fn(Option<Receiver<'_>>, &[NativeValue]) -> Result<NativeValue, BridgeError>>;

/// A native type that can be taken as an argument
pub trait NativeArg: Sized + 'static {
    const TYPE: ValueType;

    fn from_native(value: &NativeValue) -> Option<Self>;
}

/// A native type that can be returned to script
pub trait NativeReturn: 'static {
    const TYPE: ValueType;

    fn into_native(self) -> NativeValue;
}

macro_rules! impl_native_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl NativeArg for $ty {
                const TYPE: ValueType = ValueType::$variant;

                #[inline]
                fn from_native(value: &NativeValue) -> Option<Self> {
                    match value {
                        NativeValue::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }

            impl NativeReturn for $ty {
                const TYPE: ValueType = ValueType::$variant;

                #[inline]
                fn into_native(self) -> NativeValue {
                    NativeValue::$variant(self)
                }
            }
        )*
    };
}

impl_native_value! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
}

impl NativeReturn for () {
    const TYPE: ValueType = ValueType::Void;

    #[inline]
    fn into_native(self) -> NativeValue {
        NativeValue::Void
    }
}

/// A closure usable as a global native function
pub trait NativeFn<Args>: 'static {
    fn params() -> Vec<ValueType>;

    fn returns() -> ValueType;

    fn into_invoker(self, name: &str) -> Invoker;
}

/// A closure usable as a method of `T`; the receiver comes first
pub trait NativeMethod<T, Args>: 'static {
    fn params() -> Vec<ValueType>;

    fn returns() -> ValueType;

    fn into_invoker(self, name: &str) -> Invoker;
}

fn take_arg<T: NativeArg>(args: &[NativeValue], index: usize) -> Result<T, BridgeError> {
    let value = args.get(index);
    value.and_then(T::from_native).ok_or(BridgeError::ArgumentType {
        index: index + 1,
        expected: T::TYPE,
        found: match value {
            Some(value) => value.ty().name(),
            None => "no value",
        },
    })
}

macro_rules! impl_native_callables {
    ($($arg:ident),*) => {
        impl<F, R, $($arg,)*> NativeFn<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: NativeReturn,
            $($arg: NativeArg,)*
        {
            fn params() -> Vec<ValueType> {
                vec![$($arg::TYPE),*]
            }

            fn returns() -> ValueType {
                R::TYPE
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_invoker(self, name: &str) -> Invoker {
                Box::new(move |_receiver: Option<Receiver<'_>>, args: &[NativeValue]| {
                    let mut index = 0;
                    $(
                        let $arg = take_arg::<$arg>(args, index)?;
                        index += 1;
                    )*
                    Ok(self($($arg),*).into_native())
                })
            }
        }

        impl<F, T, R, $($arg,)*> NativeMethod<T, ($($arg,)*)> for F
        where
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            T: 'static,
            R: NativeReturn,
            $($arg: NativeArg,)*
        {
            fn params() -> Vec<ValueType> {
                vec![$($arg::TYPE),*]
            }

            fn returns() -> ValueType {
                R::TYPE
            }

            #[allow(non_snake_case, unused_mut, unused_variables, unused_assignments)]
            fn into_invoker(self, name: &str) -> Invoker {
                let name = name.to_string();
                Box::new(move |receiver: Option<Receiver<'_>>, args: &[NativeValue]| {
                    let this = receiver
                        .and_then(|r| r.downcast_mut::<T>())
                        .ok_or_else(|| BridgeError::ExpectedObject { callable: name.clone() })?;
                    let mut index = 0;
                    $(
                        let $arg = take_arg::<$arg>(args, index)?;
                        index += 1;
                    )*
                    Ok(self(this, $($arg),*).into_native())
                })
            }
        }
    };
}

impl_native_callables!();
impl_native_callables!(A1);
impl_native_callables!(A1, A2);
impl_native_callables!(A1, A2, A3);
impl_native_callables!(A1, A2, A3, A4);
impl_native_callables!(A1, A2, A3, A4, A5);
impl_native_callables!(A1, A2, A3, A4, A5, A6);
