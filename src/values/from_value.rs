use uuid::Uuid;

use crate::{ClickhouseError, Result, Value};

/// Conversion out of a dynamically typed [`Value`], for scalar reads.
///
/// Integer conversions accept any integer variant that fits losslessly;
/// everything else requires the matching variant.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

fn out_of_bounds(value: &Value, target: &str) -> ClickhouseError {
    ClickhouseError::OutOfBounds(format!("cannot convert {value:?} to {target}"))
}

macro_rules! int_from_value {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::Int8(x) => x.try_into().map_err(|_| out_of_bounds(&Value::Int8(x), stringify!($ty))),
                        Value::Int16(x) => x.try_into().map_err(|_| out_of_bounds(&Value::Int16(x), stringify!($ty))),
                        Value::Int32(x) => x.try_into().map_err(|_| out_of_bounds(&Value::Int32(x), stringify!($ty))),
                        Value::Int64(x) => x.try_into().map_err(|_| out_of_bounds(&Value::Int64(x), stringify!($ty))),
                        Value::Int128(x) => x.try_into().map_err(|_| out_of_bounds(&Value::Int128(x), stringify!($ty))),
                        Value::UInt8(x) => x.try_into().map_err(|_| out_of_bounds(&Value::UInt8(x), stringify!($ty))),
                        Value::UInt16(x) => x.try_into().map_err(|_| out_of_bounds(&Value::UInt16(x), stringify!($ty))),
                        Value::UInt32(x) => x.try_into().map_err(|_| out_of_bounds(&Value::UInt32(x), stringify!($ty))),
                        Value::UInt64(x) => x.try_into().map_err(|_| out_of_bounds(&Value::UInt64(x), stringify!($ty))),
                        Value::UInt128(x) => x.try_into().map_err(|_| out_of_bounds(&Value::UInt128(x), stringify!($ty))),
                        x => Err(out_of_bounds(&x, stringify!($ty))),
                    }
                }
            }
        )*
    };
}

int_from_value!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128);

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(x) => Ok(x),
            x => Err(out_of_bounds(&x, "f32")),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(x) => Ok(x as f64),
            Value::Float64(x) => Ok(x),
            x => Err(out_of_bounds(&x, "f64")),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(x) => Ok(x),
            Value::UInt8(x) => Ok(x != 0),
            Value::Int8(x) => Ok(x != 0),
            x => Err(out_of_bounds(&x, "bool")),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(x) | Value::Json(x) => String::from_utf8(x)
                .map_err(|e| ClickhouseError::OutOfBounds(format!("invalid utf-8 string: {e}"))),
            x => Err(out_of_bounds(&x, "String")),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(x) | Value::Json(x) => Ok(x),
            x => Err(out_of_bounds(&x, "Vec<u8>")),
        }
    }
}

impl FromValue for Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(x) => Ok(x),
            x => Err(out_of_bounds(&x, "Uuid")),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            x => T::from_value(x).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_int_conversions() {
        assert_eq!(i32::from_value(Value::UInt8(1)).unwrap(), 1);
        assert_eq!(i64::from_value(Value::Int32(-5)).unwrap(), -5);
        assert!(u8::from_value(Value::Int32(300)).is_err());
        assert!(u64::from_value(Value::Int8(-1)).is_err());
    }

    #[test]
    fn null_to_option() {
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i32>::from_value(Value::Int32(7)).unwrap(),
            Some(7)
        );
    }
}
