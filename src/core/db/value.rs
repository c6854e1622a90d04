//! Statement argument conversion.
//!
//! Arguments travel to the driver as rusqlite [`Value`]s. [`IntoValue`] covers
//! the Rust types entity code usually hands over, including `&str` which
//! `Value` has no `From` impl for. The [`args!`](crate::args) macro builds an
//! argument list from mixed expressions.

pub use rusqlite::types::Value;

/// Conversion into a statement argument.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for &Value {
    fn into_value(self) -> Value {
        self.clone()
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl IntoValue for &String {
    fn into_value(self) -> Value {
        Value::Text(self.clone())
    }
}

impl IntoValue for &[u8] {
    fn into_value(self) -> Value {
        Value::Blob(self.to_vec())
    }
}

impl IntoValue for Vec<u8> {
    fn into_value(self) -> Value {
        Value::Blob(self)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Integer(i64::from(self))
    }
}

macro_rules! into_integer {
    ($($t:ty),*) => {
        $(impl IntoValue for $t {
            fn into_value(self) -> Value {
                Value::Integer(i64::from(self))
            }
        })*
    };
}

into_integer!(i8, i16, i32, i64, u8, u16, u32);

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::Real(f64::from(self))
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Real(self)
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }
}

/// Builds a `Vec<Value>` of statement arguments.
///
/// ```
/// use transwarp::{args, Value};
///
/// let args = args!["u1", 42, 1.5, None::<i64>];
/// assert_eq!(args[0], Value::Text("u1".to_string()));
/// assert_eq!(args[1], Value::Integer(42));
/// assert_eq!(args[3], Value::Null);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($arg:expr),+ $(,)?) => {
        ::std::vec![$($crate::IntoValue::into_value($arg)),+]
    };
}
