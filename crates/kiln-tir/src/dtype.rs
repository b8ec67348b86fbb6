use crate::TirError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a scalar data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    Int,
    UInt,
    Float,
    Handle,
    Bool,
    Void,
}

/// Element type of an IR value: kind, bit width and vector lanes.
///
/// The textual form (`int32`, `float64`, `bool`, `handle`, `void`, `float32x4`) is what
/// kernel manifests use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataType {
    pub code: TypeCode,
    pub bits: u8,
    pub lanes: u16,
}

impl DataType {
    pub const fn new(code: TypeCode, bits: u8, lanes: u16) -> Self {
        DataType { code, bits, lanes }
    }

    pub const fn int(bits: u8) -> Self {
        Self::new(TypeCode::Int, bits, 1)
    }

    pub const fn uint(bits: u8) -> Self {
        Self::new(TypeCode::UInt, bits, 1)
    }

    pub const fn float(bits: u8) -> Self {
        Self::new(TypeCode::Float, bits, 1)
    }

    pub const fn int32() -> Self {
        Self::int(32)
    }

    pub const fn int64() -> Self {
        Self::int(64)
    }

    pub const fn float64() -> Self {
        Self::float(64)
    }

    pub const fn bool() -> Self {
        Self::new(TypeCode::Bool, 1, 1)
    }

    /// Opaque pointer-sized handle.
    pub const fn handle() -> Self {
        Self::new(TypeCode::Handle, 64, 1)
    }

    pub const fn void() -> Self {
        Self::new(TypeCode::Void, 0, 0)
    }

    /// Integer type used for shapes and strides.
    pub const fn shape_index() -> Self {
        Self::int64()
    }

    pub fn is_int(&self) -> bool {
        self.code == TypeCode::Int
    }

    pub fn is_uint(&self) -> bool {
        self.code == TypeCode::UInt
    }

    pub fn is_float(&self) -> bool {
        self.code == TypeCode::Float
    }

    pub fn is_bool(&self) -> bool {
        self.code == TypeCode::Bool
    }

    pub fn is_handle(&self) -> bool {
        self.code == TypeCode::Handle
    }

    pub fn is_void(&self) -> bool {
        self.code == TypeCode::Void
    }

    /// Int, uint or bool.
    pub fn is_integral(&self) -> bool {
        matches!(self.code, TypeCode::Int | TypeCode::UInt | TypeCode::Bool)
    }

    pub fn is_scalar(&self) -> bool {
        self.lanes == 1
    }

    pub fn with_lanes(self, lanes: u16) -> Self {
        DataType { lanes, ..self }
    }

    /// Storage size of one element in bytes (bools occupy one byte).
    pub fn bytes(&self) -> u32 {
        let bits = u32::from(self.bits) * u32::from(self.lanes);
        bits.div_ceil(8)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            TypeCode::Void => return write!(f, "void"),
            TypeCode::Handle => write!(f, "handle")?,
            TypeCode::Bool => write!(f, "bool")?,
            TypeCode::Int => write!(f, "int{}", self.bits)?,
            TypeCode::UInt => write!(f, "uint{}", self.bits)?,
            TypeCode::Float => write!(f, "float{}", self.bits)?,
        }
        if self.lanes > 1 {
            write!(f, "x{}", self.lanes)?;
        }
        Ok(())
    }
}

impl FromStr for DataType {
    type Err = TirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TirError::InvalidDataType(s.to_string());
        let (base, lanes) = match s.split_once('x') {
            Some((base, lanes)) => (base, lanes.parse::<u16>().map_err(|_| invalid())?),
            None => (s, 1),
        };
        let scalar = match base {
            "void" => return Ok(DataType::void()),
            "bool" => DataType::bool(),
            "handle" => DataType::handle(),
            _ => {
                let (code, digits) = if let Some(d) = base.strip_prefix("uint") {
                    (TypeCode::UInt, d)
                } else if let Some(d) = base.strip_prefix("int") {
                    (TypeCode::Int, d)
                } else if let Some(d) = base.strip_prefix("float") {
                    (TypeCode::Float, d)
                } else {
                    return Err(invalid());
                };
                let bits = digits.parse::<u8>().map_err(|_| invalid())?;
                if !matches!(bits, 8 | 16 | 32 | 64) {
                    return Err(invalid());
                }
                DataType::new(code, bits, 1)
            }
        };
        if lanes == 0 {
            return Err(invalid());
        }
        Ok(scalar.with_lanes(lanes))
    }
}

impl TryFrom<String> for DataType {
    type Error = TirError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DataType> for String {
    fn from(value: DataType) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_names() {
        assert_eq!("int32".parse::<DataType>().unwrap(), DataType::int32());
        assert_eq!("uint8".parse::<DataType>().unwrap(), DataType::uint(8));
        assert_eq!("float64".parse::<DataType>().unwrap(), DataType::float64());
        assert_eq!("bool".parse::<DataType>().unwrap(), DataType::bool());
        assert_eq!("handle".parse::<DataType>().unwrap(), DataType::handle());
        assert_eq!("void".parse::<DataType>().unwrap(), DataType::void());
    }

    #[test]
    fn parses_vector_lanes() {
        let ty: DataType = "float32x4".parse().unwrap();
        assert_eq!(ty.lanes, 4);
        assert_eq!(ty.to_string(), "float32x4");
        assert_eq!(ty.bytes(), 16);
    }

    #[test]
    fn rejects_garbage() {
        assert!("int7".parse::<DataType>().is_err());
        assert!("complex64".parse::<DataType>().is_err());
        assert!("int32x0".parse::<DataType>().is_err());
    }

    #[test]
    fn bool_occupies_one_byte() {
        assert_eq!(DataType::bool().bytes(), 1);
        assert_eq!(DataType::handle().bytes(), 8);
    }
}
