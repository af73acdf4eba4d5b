//! Binary program layout, version 1. All integers are little-endian.
//!
//! ```text
//! HEADER (16 bytes)
//!   magic "TXPG" | version u16 | flags u16 | record_count u32 | input_count u16 | output_count u16
//! INPUTS   input_count  x { id u32, desc }
//! OUTPUTS  output_count x { id u32 }
//! RECORDS  record_count x {
//!   tag u8 | n_in u8 | n_out u8 | reserved u8 | param_len u16
//!   inputs [u32; n_in] | outputs [u32; n_out] | params [u8; param_len]
//! }
//! desc := dtype u8 | ndims u8 | dims [u32; ndims]
//! ```

use crate::{
    tensor::{DataType, TensorDesc},
    utils::{
        ByteReader, ByteWriter,
        error::{DecodeError, EncodeError},
    },
};

pub const MAGIC: &[u8; 4] = b"TXPG";
pub const VERSION: u16 = 1;
pub const HEADER_SIZE: usize = 16;
pub const RECORD_HEADER_SIZE: usize = 6;

pub const TAG_ALLOCATE: u8 = 0x01;
pub const TAG_TO_DEVICE: u8 = 0x02;
pub const TAG_FROM_DEVICE: u8 = 0x03;
pub const TAG_DEALLOCATE: u8 = 0x04;
pub const TAG_COMPUTE: u8 = 0x05;

pub(crate) fn read_desc(r: &mut ByteReader<'_>) -> Result<TensorDesc, DecodeError> {
    let code = r.u8()?;
    let data_type = DataType::from_code(code)
        .ok_or(DecodeError::UnsupportedDataType { record: None, code })?;
    let ndims = r.u8()? as usize;
    let mut dims = Vec::with_capacity(ndims);
    for _ in 0..ndims {
        dims.push(r.u32()?);
    }
    Ok(TensorDesc::new(dims, data_type))
}

pub(crate) fn write_desc(w: &mut ByteWriter, desc: &TensorDesc) -> Result<(), EncodeError> {
    let ndims = u8::try_from(desc.ndim()).map_err(|_| EncodeError::TooManyDims(desc.ndim()))?;
    w.u8(desc.data_type().code());
    w.u8(ndims);
    for &d in desc.dims() {
        w.u32(d);
    }
    Ok(())
}

pub(crate) fn desc_len(desc: &TensorDesc) -> usize {
    2 + 4 * desc.ndim()
}
