#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataType {
    F32,
    F16,
    BF16,
    I32,
    U32,
    U16,
    U8,
}

impl DataType {
    pub fn bytes_per_element(&self) -> usize {
        match self {
            DataType::F32 | DataType::I32 | DataType::U32 => 4,
            DataType::F16 | DataType::BF16 | DataType::U16 => 2,
            DataType::U8 => 1,
        }
    }

    /// Wire code used by the program format.
    pub fn code(&self) -> u8 {
        match self {
            DataType::F32 => 0,
            DataType::F16 => 1,
            DataType::BF16 => 2,
            DataType::I32 => 3,
            DataType::U32 => 4,
            DataType::U16 => 5,
            DataType::U8 => 6,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(DataType::F32),
            1 => Some(DataType::F16),
            2 => Some(DataType::BF16),
            3 => Some(DataType::I32),
            4 => Some(DataType::U32),
            5 => Some(DataType::U16),
            6 => Some(DataType::U8),
            _ => None,
        }
    }
}
