use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::tensor::data_type::DataType;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TensorDesc {
    dims: Vec<u32>,
    data_type: DataType,
}

impl TensorDesc {
    pub fn new(dims: Vec<u32>, data_type: DataType) -> Self {
        Self { dims, data_type }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// `None` when the element count does not fit in `usize`.
    pub fn num_elements(&self) -> Option<usize> {
        self.dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d as usize))
    }

    // Size in bytes for the tensor given its DataType
    pub fn size_in_bytes(&self) -> Option<usize> {
        self.num_elements()?
            .checked_mul(self.data_type.bytes_per_element())
    }

    pub fn dims(&self) -> &[u32] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }
}

impl Display for TensorDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:?}{:?}", self.data_type, self.dims)
    }
}
