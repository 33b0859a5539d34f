// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed field values.

use {
    crate::{DataResult, DataType, Error},
    byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
    std::io::{Cursor, Write},
};

/// A single decoded value.
#[derive(Clone, Debug, PartialEq)]
pub enum DataValue {
    Boolean(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),

    /// Bytes of a composite or unknown type, passed through untouched.
    Opaque(DataType, Vec<u8>),
}

impl DataValue {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Boolean(_) => DataType::Boolean,
            Self::Int8(_) => DataType::Int8,
            Self::UInt8(_) => DataType::UInt8,
            Self::Int16(_) => DataType::Int16,
            Self::UInt16(_) => DataType::UInt16,
            Self::Int32(_) => DataType::Int32,
            Self::UInt32(_) => DataType::UInt32,
            Self::Int64(_) => DataType::Int64,
            Self::UInt64(_) => DataType::UInt64,
            Self::Float(_) => DataType::Float,
            Self::Double(_) => DataType::Double,
            Self::String(_) => DataType::String,
            Self::Opaque(t, _) => *t,
        }
    }

    /// Write the binary representation of this value.
    ///
    /// Strings are written NUL terminated.
    pub fn encode(&self, dest: &mut impl Write) -> DataResult<()> {
        match self {
            Self::Boolean(v) => dest.write_u8(u8::from(*v))?,
            Self::Int8(v) => dest.write_i8(*v)?,
            Self::UInt8(v) => dest.write_u8(*v)?,
            Self::Int16(v) => dest.write_i16::<LittleEndian>(*v)?,
            Self::UInt16(v) => dest.write_u16::<LittleEndian>(*v)?,
            Self::Int32(v) => dest.write_i32::<LittleEndian>(*v)?,
            Self::UInt32(v) => dest.write_u32::<LittleEndian>(*v)?,
            Self::Int64(v) => dest.write_i64::<LittleEndian>(*v)?,
            Self::UInt64(v) => dest.write_u64::<LittleEndian>(*v)?,
            Self::Float(v) => dest.write_f32::<LittleEndian>(*v)?,
            Self::Double(v) => dest.write_f64::<LittleEndian>(*v)?,
            Self::String(v) => {
                if v.as_bytes().contains(&0) {
                    return Err(Error::InteriorNul(v.clone()));
                }
                dest.write_all(v.as_bytes())?;
                dest.write_u8(0)?;
            }
            Self::Opaque(_, data) => dest.write_all(data)?,
        }

        Ok(())
    }

    /// Obtain the binary representation of this value.
    pub fn to_bytes(&self) -> DataResult<Vec<u8>> {
        let mut data = Vec::new();
        self.encode(&mut data)?;

        Ok(data)
    }
}

/// Decode a field blob holding values of a given type.
///
/// Fixed size scalars are read back to back. Strings are a sequence of NUL
/// terminated UTF-8 strings. Any other type yields a single
/// [DataValue::Opaque] holding the whole blob.
pub fn decode_values(data_type: DataType, data: &[u8]) -> DataResult<Vec<DataValue>> {
    if let Some(size) = data_type.scalar_size() {
        if data.len() % size != 0 {
            return Err(Error::ValueSize {
                data_type,
                length: data.len(),
            });
        }

        let mut reader = Cursor::new(data);
        let mut values = Vec::with_capacity(data.len() / size);

        for _ in 0..data.len() / size {
            values.push(match data_type {
                DataType::Boolean => DataValue::Boolean(reader.read_u8()? != 0),
                DataType::Int8 => DataValue::Int8(reader.read_i8()?),
                DataType::UInt8 => DataValue::UInt8(reader.read_u8()?),
                DataType::Int16 => DataValue::Int16(reader.read_i16::<LittleEndian>()?),
                DataType::UInt16 => DataValue::UInt16(reader.read_u16::<LittleEndian>()?),
                DataType::Int32 => DataValue::Int32(reader.read_i32::<LittleEndian>()?),
                DataType::UInt32 => DataValue::UInt32(reader.read_u32::<LittleEndian>()?),
                DataType::Int64 => DataValue::Int64(reader.read_i64::<LittleEndian>()?),
                DataType::UInt64 => DataValue::UInt64(reader.read_u64::<LittleEndian>()?),
                DataType::Float => DataValue::Float(reader.read_f32::<LittleEndian>()?),
                DataType::Double => DataValue::Double(reader.read_f64::<LittleEndian>()?),
                _ => unreachable!("only scalar types have a fixed size"),
            });
        }

        Ok(values)
    } else if data_type == DataType::String {
        if data.is_empty() {
            return Ok(vec![]);
        }

        // Every string, including the last, must be terminated.
        let body = data
            .strip_suffix(&[0])
            .ok_or(Error::UnterminatedString)?;

        body.split(|b| *b == 0)
            .map(|s| -> DataResult<DataValue> {
                Ok(DataValue::String(std::str::from_utf8(s)?.to_string()))
            })
            .collect()
    } else {
        Ok(vec![DataValue::Opaque(data_type, data.to_vec())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars() -> DataResult<()> {
        let values = vec![
            DataValue::Int32(-2),
            DataValue::Int32(0x7fff_ffff),
            DataValue::Int32(7),
        ];

        let mut data = Vec::new();
        for v in &values {
            v.encode(&mut data)?;
        }
        assert_eq!(data.len(), 12);
        assert_eq!(&data[0..4], &[0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(decode_values(DataType::Int32, &data)?, values);

        assert_eq!(
            decode_values(DataType::Boolean, &[0, 1, 2])?,
            vec![
                DataValue::Boolean(false),
                DataValue::Boolean(true),
                DataValue::Boolean(true)
            ]
        );
        assert_eq!(
            decode_values(DataType::Double, &1.5f64.to_le_bytes())?,
            vec![DataValue::Double(1.5)]
        );

        Ok(())
    }

    #[test]
    fn scalar_size_mismatch() {
        assert!(matches!(
            decode_values(DataType::UInt16, &[1, 2, 3]),
            Err(Error::ValueSize { length: 3, .. })
        ));
    }

    #[test]
    fn strings() -> DataResult<()> {
        assert_eq!(
            decode_values(DataType::String, b"alpha\0\0beta\0")?,
            vec![
                DataValue::String("alpha".into()),
                DataValue::String("".into()),
                DataValue::String("beta".into())
            ]
        );
        assert_eq!(decode_values(DataType::String, b"")?, vec![]);
        assert!(matches!(
            decode_values(DataType::String, b"open"),
            Err(Error::UnterminatedString)
        ));
        assert!(matches!(
            DataValue::String("a\0b".into()).to_bytes(),
            Err(Error::InteriorNul(_))
        ));
        assert_eq!(DataValue::String("hi".into()).to_bytes()?, b"hi\0".to_vec());

        Ok(())
    }

    #[test]
    fn composites_are_opaque() -> DataResult<()> {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        let values = decode_values(DataType::Vector3, &data)?;

        assert_eq!(values, vec![DataValue::Opaque(DataType::Vector3, data.to_vec())]);
        assert_eq!(values[0].to_bytes()?, data.to_vec());
        assert_eq!(values[0].data_type(), DataType::Vector3);

        Ok(())
    }
}
