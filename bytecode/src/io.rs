//! Binary (de)serialization of compiled prototypes.
//!
//! The on-disk layout is little-endian and length-prefixed throughout.
//! Reading applies hard limits on every count so a malformed or hostile
//! file cannot trigger huge allocations before the data is validated.

use std::io::{Read, Write};
use std::rc::Rc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::prototype::{FunctionPrototype, OuterValueInfo, OuterValueKind};
use crate::value::Value;

pub const MAGIC: &[u8; 4] = b"VLD\x01";

const MAX_COUNT: u32 = 1_000_000;
const MAX_STRING_LEN: u32 = 65_536;
const MAX_NESTING: u32 = 256;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STRING: u8 = 4;

#[derive(Debug)]
pub enum FormatError {
    Io(std::io::Error),
    Format(String),
    Security(String),
}

impl From<std::io::Error> for FormatError {
    fn from(e: std::io::Error) -> Self {
        FormatError::Io(e)
    }
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::Io(e) => write!(f, "io error: {e}"),
            FormatError::Format(msg) => write!(f, "malformed prototype: {msg}"),
            FormatError::Security(msg) => write!(f, "refusing prototype: {msg}"),
        }
    }
}

impl std::error::Error for FormatError {}

/// Serialize a prototype tree, magic header included.
pub fn write_prototype<W: Write>(writer: &mut W, proto: &FunctionPrototype) -> Result<(), FormatError> {
    writer.write_all(MAGIC)?;
    write_proto_body(writer, proto)
}

fn write_proto_body<W: Write>(writer: &mut W, proto: &FunctionPrototype) -> Result<(), FormatError> {
    writer.write_u32::<LittleEndian>(proto.num_params)?;
    writer.write_u8(proto.variadic as u8)?;
    writer.write_u32::<LittleEndian>(proto.max_locals)?;
    writer.write_u32::<LittleEndian>(proto.max_stack_size)?;

    writer.write_u32::<LittleEndian>(proto.code.len() as u32)?;
    for &insn in proto.code.iter() {
        writer.write_u32::<LittleEndian>(insn)?;
    }

    writer.write_u32::<LittleEndian>(proto.consts.len() as u32)?;
    for constant in proto.consts.iter() {
        match constant {
            Value::Null => writer.write_u8(TAG_NULL)?,
            Value::Bool(b) => {
                writer.write_u8(TAG_BOOL)?;
                writer.write_u8(*b as u8)?;
            }
            Value::Int(i) => {
                writer.write_u8(TAG_INT)?;
                writer.write_i64::<LittleEndian>(*i)?;
            }
            Value::Float(x) => {
                writer.write_u8(TAG_FLOAT)?;
                writer.write_f64::<LittleEndian>(*x)?;
            }
            Value::String(s) => {
                writer.write_u8(TAG_STRING)?;
                write_string(writer, s)?;
            }
        }
    }

    writer.write_u32::<LittleEndian>(proto.outer_values.len() as u32)?;
    for outer in proto.outer_values.iter() {
        writer.write_u8(match outer.kind {
            OuterValueKind::Local => 0,
            OuterValueKind::Outer => 1,
        })?;
        writer.write_u32::<LittleEndian>(outer.pos)?;
        write_string(writer, &outer.name)?;
    }

    writer.write_u32::<LittleEndian>(proto.nested.len() as u32)?;
    for nested in proto.nested.iter() {
        write_proto_body(writer, nested)?;
    }
    Ok(())
}

fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<(), FormatError> {
    writer.write_u32::<LittleEndian>(s.len() as u32)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// Deserialize a prototype tree, validating the magic header.
pub fn read_prototype<R: Read>(reader: &mut R) -> Result<FunctionPrototype, FormatError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(FormatError::Format("invalid magic or version".to_string()));
    }
    read_proto_body(reader, 0)
}

fn read_proto_body<R: Read>(reader: &mut R, depth: u32) -> Result<FunctionPrototype, FormatError> {
    if depth > MAX_NESTING {
        return Err(FormatError::Security(format!(
            "prototype nesting exceeds limit of {MAX_NESTING}"
        )));
    }

    let num_params = reader.read_u32::<LittleEndian>()?;
    let variadic = reader.read_u8()? != 0;
    let max_locals = reader.read_u32::<LittleEndian>()?;
    let max_stack_size = reader.read_u32::<LittleEndian>()?;

    let code_len = checked_count(reader.read_u32::<LittleEndian>()?, "instruction")?;
    let mut code = Vec::with_capacity(code_len as usize);
    for _ in 0..code_len {
        code.push(reader.read_u32::<LittleEndian>()?);
    }

    let const_count = checked_count(reader.read_u32::<LittleEndian>()?, "constant")?;
    let mut consts = Vec::with_capacity(const_count as usize);
    for _ in 0..const_count {
        let tag = reader.read_u8()?;
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_BOOL => Value::Bool(reader.read_u8()? != 0),
            TAG_INT => Value::Int(reader.read_i64::<LittleEndian>()?),
            TAG_FLOAT => Value::Float(reader.read_f64::<LittleEndian>()?),
            TAG_STRING => Value::String(read_string(reader)?),
            _ => return Err(FormatError::Format(format!("unknown constant tag {tag}"))),
        };
        consts.push(value);
    }

    let outer_count = checked_count(reader.read_u32::<LittleEndian>()?, "outer value")?;
    let mut outer_values = Vec::with_capacity(outer_count as usize);
    for _ in 0..outer_count {
        let kind = match reader.read_u8()? {
            0 => OuterValueKind::Local,
            1 => OuterValueKind::Outer,
            other => {
                return Err(FormatError::Format(format!(
                    "unknown outer-value kind {other}"
                )))
            }
        };
        let pos = reader.read_u32::<LittleEndian>()?;
        let name = read_string(reader)?;
        outer_values.push(OuterValueInfo { name, pos, kind });
    }

    let nested_count = checked_count(reader.read_u32::<LittleEndian>()?, "nested prototype")?;
    let mut nested = Vec::with_capacity(nested_count as usize);
    for _ in 0..nested_count {
        nested.push(Rc::new(read_proto_body(reader, depth + 1)?));
    }

    Ok(FunctionPrototype {
        num_params,
        variadic,
        max_locals,
        max_stack_size,
        code: code.into_boxed_slice(),
        consts: consts.into_boxed_slice(),
        outer_values: outer_values.into_boxed_slice(),
        nested: nested.into_boxed_slice(),
    })
}

fn checked_count(count: u32, what: &str) -> Result<u32, FormatError> {
    if count > MAX_COUNT {
        return Err(FormatError::Security(format!(
            "{what} count too large: {count}"
        )));
    }
    Ok(count)
}

fn read_string<R: Read>(reader: &mut R) -> Result<String, FormatError> {
    let len = reader.read_u32::<LittleEndian>()?;
    if len > MAX_STRING_LEN {
        return Err(FormatError::Security(format!(
            "string length exceeds limit of {MAX_STRING_LEN}: {len}"
        )));
    }
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| FormatError::Format("invalid UTF-8".to_string()))
}
