//! Conversion of typed call arguments into [`CallArgs`].

use serde::Serialize;

use crate::binding::{Arg, CallArgs};

/// An argument that can take part in key derivation.
pub trait KeyArg {
    fn key_arg(&self) -> Arg;
}

/// The full argument list of a bound function.
pub trait ArgList {
    fn call_args(&self) -> CallArgs;
}

/// Marks a request, connection or other live object. It is passed through
/// to the function but never rendered or hashed into a key.
#[derive(Debug, Clone)]
pub struct Live<T>(pub T);

/// Any serializable value used as a key argument.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T> KeyArg for Live<T> {
    fn key_arg(&self) -> Arg {
        Arg::Live
    }
}

impl<T: Serialize> KeyArg for Json<T> {
    fn key_arg(&self) -> Arg {
        encode(&self.0)
    }
}

impl<T: KeyArg> KeyArg for Option<T> {
    fn key_arg(&self) -> Arg {
        match self {
            Some(inner) => inner.key_arg(),
            None => Arg::Value(serde_json::Value::Null),
        }
    }
}

impl<T: Serialize> KeyArg for Vec<T> {
    fn key_arg(&self) -> Arg {
        encode(self)
    }
}

impl KeyArg for &str {
    fn key_arg(&self) -> Arg {
        encode(self)
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Arg {
    serde_json::to_value(value)
        .map(Arg::Value)
        .unwrap_or(Arg::Live)
}

macro_rules! scalar_key_arg {
    ($($t:ty),* $(,)?) => {
        $(
            impl KeyArg for $t {
                fn key_arg(&self) -> Arg {
                    encode(self)
                }
            }
        )*
    };
}

scalar_key_arg!(bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String);

impl ArgList for CallArgs {
    fn call_args(&self) -> CallArgs {
        self.clone()
    }
}

impl ArgList for () {
    fn call_args(&self) -> CallArgs {
        CallArgs::new()
    }
}

macro_rules! tuple_arg_list {
    ($($name:ident : $idx:tt),+) => {
        impl<$($name: KeyArg),+> ArgList for ($($name,)+) {
            fn call_args(&self) -> CallArgs {
                let mut args = CallArgs::new();
                $(args.push(self.$idx.key_arg());)+
                args
            }
        }
    };
}

tuple_arg_list!(A: 0);
tuple_arg_list!(A: 0, B: 1);
tuple_arg_list!(A: 0, B: 1, C: 2);
tuple_arg_list!(A: 0, B: 1, C: 2, D: 3);
tuple_arg_list!(A: 0, B: 1, C: 2, D: 3, E: 4);
